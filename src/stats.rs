//! Per-competitor statistics over a result window.

use serde::Serialize;
use std::collections::HashMap;

use crate::types::{ResultRecord, ResultWindow};

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct CompetitorStats {
    pub competitor_id: String,
    pub competitor_name: String,
    /// Team of the most recent session.
    pub team: String,
    pub car_number: Option<u32>,
    pub races: u32,
    pub points_total: f64,
    pub wins: u32,
    pub podiums: u32,
    pub dnfs: u32,
    pub poles: u32,
    pub front_row_starts: u32,
    /// Chronological.
    pub grid_positions: Vec<u32>,
    /// Chronological, classified finishes only.
    pub finish_positions: Vec<u32>,
}

fn mean(v: &[u32]) -> Option<f64> {
    if v.is_empty() {
        None
    } else {
        Some(v.iter().map(|x| *x as f64).sum::<f64>() / v.len() as f64)
    }
}

impl CompetitorStats {
    fn new(id: &str) -> Self {
        Self {
            competitor_id: id.to_string(),
            ..Default::default()
        }
    }

    pub fn avg_grid(&self) -> Option<f64> {
        mean(&self.grid_positions)
    }

    pub fn avg_finish(&self) -> Option<f64> {
        mean(&self.finish_positions)
    }

    pub fn dnf_rate(&self) -> f64 {
        if self.races == 0 {
            0.0
        } else {
            self.dnfs as f64 / self.races as f64
        }
    }

    fn record(&mut self, r: &ResultRecord) {
        self.competitor_name = r.competitor_name.clone();
        self.team = r.team.clone();
        if r.car_number.is_some() {
            self.car_number = r.car_number;
        }
        self.races += 1;

        if let Some(pos) = r.finish_position {
            self.points_total += r.points;
            self.finish_positions.push(pos);
            if pos == 1 {
                self.wins += 1;
            }
            if pos <= 3 {
                self.podiums += 1;
            }
        }
        if r.is_dnf() {
            self.dnfs += 1;
        }
        if let Some(grid) = r.start_position {
            self.grid_positions.push(grid);
            if grid == 1 {
                self.poles += 1;
            }
            if grid <= 3 {
                self.front_row_starts += 1;
            }
        }
    }
}

/// Stats keyed by competitor id, iterated in order of first appearance.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CompetitorTable {
    entries: Vec<CompetitorStats>,
    index: HashMap<String, usize>,
}

impl CompetitorTable {
    pub fn new() -> Self {
        Self::default()
    }

    fn entry(&mut self, id: &str) -> &mut CompetitorStats {
        let idx = match self.index.get(id) {
            Some(&i) => i,
            None => {
                self.entries.push(CompetitorStats::new(id));
                self.index.insert(id.to_string(), self.entries.len() - 1);
                self.entries.len() - 1
            }
        };
        &mut self.entries[idx]
    }

    pub fn get(&self, id: &str) -> Option<&CompetitorStats> {
        self.index.get(id).map(|&i| &self.entries[i])
    }

    pub fn iter(&self) -> std::slice::Iter<'_, CompetitorStats> {
        self.entries.iter()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl<'a> IntoIterator for &'a CompetitorTable {
    type Item = &'a CompetitorStats;
    type IntoIter = std::slice::Iter<'a, CompetitorStats>;

    fn into_iter(self) -> Self::IntoIter {
        self.entries.iter()
    }
}

/// Rebuilds the full table from the window; nothing is carried between calls.
pub fn aggregate(window: &ResultWindow) -> CompetitorTable {
    let mut table = CompetitorTable::new();
    for session in &window.sessions {
        for r in &session.results {
            table.entry(&r.competitor_id).record(r);
        }
    }
    table
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::SessionRecord;
    use chrono::NaiveDate;

    fn result(id: &str, finish: Option<u32>, grid: Option<u32>, points: f64, status: &str) -> ResultRecord {
        ResultRecord {
            competitor_id: id.into(),
            competitor_name: id.to_uppercase(),
            team: format!("{}-team", id),
            car_number: None,
            finish_position: finish,
            start_position: grid,
            points,
            status: status.into(),
        }
    }

    fn window(sessions: Vec<Vec<ResultRecord>>) -> ResultWindow {
        ResultWindow {
            sessions: sessions
                .into_iter()
                .enumerate()
                .map(|(i, results)| SessionRecord {
                    event_name: format!("GP {}", i + 1),
                    round_number: i as u32 + 1,
                    season_year: 2025,
                    date: NaiveDate::from_ymd_opt(2025, 3, 1 + i as u32).unwrap(),
                    results,
                })
                .collect(),
            ..ResultWindow::empty(2025)
        }
    }

    #[test]
    fn empty_window_gives_empty_table() {
        assert!(aggregate(&ResultWindow::empty(2025)).is_empty());
    }

    #[test]
    fn single_session_wins_and_podiums() {
        let w = window(vec![vec![
            result("a", Some(1), Some(3), 25.0, "Finished"),
            result("b", Some(2), Some(1), 18.0, "Finished"),
        ]]);
        let t = aggregate(&w);
        let a = t.get("a").unwrap();
        let b = t.get("b").unwrap();
        assert_eq!(a.wins, 1);
        assert_eq!(a.podiums, 1);
        assert_eq!(b.podiums, 1);
        assert_eq!(a.avg_finish(), Some(1.0));
        assert_eq!(b.avg_grid(), Some(1.0));
        assert_eq!(b.poles, 1);
        assert_eq!(a.front_row_starts, 1);
    }

    #[test]
    fn retirements() {
        let w = window(vec![
            vec![result("a", None, Some(4), 0.0, "DNF (Engine)")],
            vec![result("a", None, None, 0.0, "DNF (Collision)")],
            vec![result("b", Some(15), Some(12), 0.0, "DNF (Gearbox)")],
        ]);
        let t = aggregate(&w);
        let a = t.get("a").unwrap();
        assert_eq!(a.dnfs, 2);
        assert_eq!(a.avg_finish(), None);
        assert_eq!(a.avg_grid(), Some(4.0));
        assert_eq!(a.dnf_rate(), 1.0);

        // retired but classified
        let b = t.get("b").unwrap();
        assert_eq!(b.dnfs, 1);
        assert_eq!(b.finish_positions, vec![15]);
    }

    #[test]
    fn points_need_a_classified_finish() {
        let w = window(vec![vec![result("a", None, Some(1), 1.0, "Disqualified")]]);
        assert_eq!(aggregate(&w).get("a").unwrap().points_total, 0.0);
    }

    #[test]
    fn order_of_first_appearance_and_latest_team() {
        let mut moved = result("z", Some(5), Some(5), 10.0, "Finished");
        moved.team = "New Team".into();
        let w = window(vec![
            vec![
                result("z", Some(1), Some(1), 25.0, "Finished"),
                result("m", Some(2), Some(2), 18.0, "Finished"),
            ],
            vec![result("a", Some(1), Some(1), 25.0, "Finished"), moved],
        ]);
        let t = aggregate(&w);
        let ids: Vec<&str> = t.iter().map(|s| s.competitor_id.as_str()).collect();
        assert_eq!(ids, vec!["z", "m", "a"]);
        let z = t.get("z").unwrap();
        assert_eq!(z.team, "New Team");
        assert_eq!(z.points_total, 35.0);
        assert_eq!(z.grid_positions, vec![1, 5]);
    }
}
