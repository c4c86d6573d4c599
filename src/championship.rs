//! Championship contention from current standings.

use serde::Serialize;

use crate::sources::Standings;

pub const MAX_POINTS_PER_RACE: f64 = 26.0;
/// Two cars score per constructor.
pub const MAX_CONSTRUCTOR_POINTS_PER_RACE: f64 = MAX_POINTS_PER_RACE * 2.0;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ChampionshipStatus {
    InProgress,
    Completed,
    NoData,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Contender {
    pub name: String,
    pub points: f64,
    pub gap_to_leader: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Contention {
    pub leader: Option<String>,
    pub max_points_available: f64,
    /// Everyone still mathematically able to catch the leader, leader included.
    pub contenders: Vec<Contender>,
    pub decided: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ChampionshipOutlook {
    pub season: Option<String>,
    pub status: ChampionshipStatus,
    pub races_remaining: u32,
    pub drivers: Contention,
    pub constructors: Contention,
}

impl ChampionshipOutlook {
    pub fn no_data() -> Self {
        Self {
            season: None,
            status: ChampionshipStatus::NoData,
            races_remaining: 0,
            drivers: contention(&[], 0.0),
            constructors: contention(&[], 0.0),
        }
    }
}

/// `table` is (name, points) ordered by points, leader first.
fn contention(table: &[(String, f64)], max_available: f64) -> Contention {
    let Some((leader, leader_points)) = table.first() else {
        return Contention {
            leader: None,
            max_points_available: max_available,
            contenders: Vec::new(),
            decided: false,
        };
    };
    let contenders = table
        .iter()
        .filter(|(_, p)| leader_points - p <= max_available)
        .map(|(name, p)| Contender {
            name: name.clone(),
            points: *p,
            gap_to_leader: leader_points - p,
        })
        .collect();
    let decided = table
        .get(1)
        .map_or(true, |(_, second)| leader_points - second > max_available);
    Contention {
        leader: Some(leader.clone()),
        max_points_available: max_available,
        contenders,
        decided,
    }
}

pub fn outlook(standings: &Standings) -> ChampionshipOutlook {
    if standings.drivers.is_empty() && standings.constructors.is_empty() {
        return ChampionshipOutlook::no_data();
    }
    let remaining = standings.total_rounds.saturating_sub(standings.current_round);

    let mut drivers: Vec<(String, f64)> = standings
        .drivers
        .iter()
        .map(|d| (d.driver.clone(), d.points))
        .collect();
    let mut constructors: Vec<(String, f64)> = standings
        .constructors
        .iter()
        .map(|c| (c.team.clone(), c.points))
        .collect();
    drivers.sort_by(|a, b| b.1.total_cmp(&a.1));
    constructors.sort_by(|a, b| b.1.total_cmp(&a.1));

    ChampionshipOutlook {
        season: Some(standings.season.clone()),
        status: if remaining == 0 {
            ChampionshipStatus::Completed
        } else {
            ChampionshipStatus::InProgress
        },
        races_remaining: remaining,
        drivers: contention(&drivers, remaining as f64 * MAX_POINTS_PER_RACE),
        constructors: contention(
            &constructors,
            remaining as f64 * MAX_CONSTRUCTOR_POINTS_PER_RACE,
        ),
    }
}
