//! Summary of the most recent completed race.

use chrono::NaiveDate;
use serde::Serialize;

use crate::types::{ResultRecord, SessionRecord};

const TOP_RESULTS: usize = 10;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LastRaceSummary {
    pub event_name: String,
    pub season_year: i32,
    pub round_number: u32,
    pub date: NaiveDate,
    /// Top classified finishers in finishing order.
    pub results: Vec<ResultRecord>,
    pub highlights: Vec<String>,
}

fn classified(session: &SessionRecord) -> Vec<&ResultRecord> {
    let mut out: Vec<&ResultRecord> = session.results.iter().filter(|r| r.is_classified()).collect();
    out.sort_by_key(|r| r.finish_position);
    out
}

/// Winner, biggest climber, podium teams, retirements; in that order.
pub fn highlights(session: &SessionRecord) -> Vec<String> {
    let finishers = classified(session);
    let mut out = Vec::new();

    if let Some(w) = finishers.first().filter(|r| r.finish_position == Some(1)) {
        out.push(format!("{} won the {} for {}", w.competitor_name, session.event_name, w.team));
    }

    let climber = finishers
        .iter()
        .filter_map(|r| {
            let gained = r.start_position? as i64 - r.finish_position? as i64;
            (gained > 0).then_some((gained, *r))
        })
        // first of equals wins
        .fold(None::<(i64, &ResultRecord)>, |best, cur| match best {
            Some(b) if b.0 >= cur.0 => Some(b),
            _ => Some(cur),
        });
    if let Some((gained, r)) = climber {
        out.push(format!(
            "{} gained {} positions from P{} to P{}",
            r.competitor_name,
            gained,
            r.start_position.unwrap_or_default(),
            r.finish_position.unwrap_or_default()
        ));
    }

    let mut podium_teams: Vec<&str> = Vec::new();
    for r in finishers.iter().take(3) {
        if !podium_teams.contains(&r.team.as_str()) {
            podium_teams.push(&r.team);
        }
    }
    if podium_teams.len() > 1 {
        out.push(format!("Podium shared between {}", podium_teams.join(", ")));
    }

    let dnfs: Vec<&str> = session
        .results
        .iter()
        .filter(|r| r.is_dnf())
        .map(|r| r.competitor_name.as_str())
        .collect();
    if !dnfs.is_empty() {
        out.push(format!("Retirements: {}", dnfs.join(", ")));
    }
    out
}

pub fn summarize(session: &SessionRecord) -> LastRaceSummary {
    LastRaceSummary {
        event_name: session.event_name.clone(),
        season_year: session.season_year,
        round_number: session.round_number,
        date: session.date,
        results: classified(session)
            .into_iter()
            .take(TOP_RESULTS)
            .cloned()
            .collect(),
        highlights: highlights(session),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn r(name: &str, team: &str, grid: Option<u32>, finish: Option<u32>, status: &str) -> ResultRecord {
        ResultRecord {
            competitor_id: name.to_lowercase(),
            competitor_name: name.into(),
            team: team.into(),
            car_number: None,
            finish_position: finish,
            start_position: grid,
            points: 0.0,
            status: status.into(),
        }
    }

    fn session(results: Vec<ResultRecord>) -> SessionRecord {
        SessionRecord {
            event_name: "Italian Grand Prix".into(),
            round_number: 16,
            season_year: 2025,
            date: NaiveDate::from_ymd_opt(2025, 9, 7).unwrap(),
            results,
        }
    }

    #[test]
    fn highlight_order() {
        let s = session(vec![
            r("Verstappen", "Red Bull", Some(1), Some(1), "Finished"),
            r("Norris", "McLaren", Some(2), Some(2), "Finished"),
            r("Piastri", "McLaren", Some(8), Some(3), "Finished"),
            r("Hamilton", "Ferrari", Some(10), Some(6), "Finished"),
            r("Bortoleto", "Sauber", Some(12), None, "DNF (Brakes)"),
        ]);
        assert_eq!(
            highlights(&s),
            vec![
                "Verstappen won the Italian Grand Prix for Red Bull",
                "Piastri gained 5 positions from P8 to P3",
                "Podium shared between Red Bull, McLaren",
                "Retirements: Bortoleto",
            ]
        );
    }

    #[test]
    fn single_team_podium_and_no_climbers() {
        let s = session(vec![
            r("Norris", "McLaren", Some(1), Some(1), "Finished"),
            r("Piastri", "McLaren", Some(2), Some(2), "Finished"),
        ]);
        assert_eq!(highlights(&s), vec!["Norris won the Italian Grand Prix for McLaren"]);
    }

    #[test]
    fn summary_keeps_top_ten_classified() {
        let mut results: Vec<ResultRecord> = (1..=12)
            .rev()
            .map(|p| r(&format!("D{}", p), "T", Some(p), Some(p), "Finished"))
            .collect();
        results.push(r("Out", "T", Some(13), None, "DNF (Engine)"));
        let summary = summarize(&session(results));
        assert_eq!(summary.results.len(), 10);
        assert_eq!(summary.results[0].finish_position, Some(1));
        assert_eq!(summary.results[9].finish_position, Some(10));
    }
}
