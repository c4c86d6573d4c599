//! Ranked candidates to the public prediction answer.

use crate::confidence::ScoredCandidate;
use crate::stats::{CompetitorStats, CompetitorTable};
use crate::types::{PredictionKind, PredictionMetadata, PredictionResult, ResultWindow, RunnerUp};

const RUNNERS_UP: usize = 2;

fn plural(n: u32, one: &str, many: &str) -> String {
    if n == 1 {
        format!("{} {}", n, one)
    } else {
        format!("{} {}", n, many)
    }
}

/// Fixed rule order: wins, podiums, grid pace, reliability.
pub fn race_reasons(s: &CompetitorStats) -> Vec<String> {
    let mut reasons = Vec::new();
    if s.wins > 0 {
        reasons.push(format!("Won {}", plural(s.wins, "recent race", "recent races")));
    }
    if s.podiums > 0 {
        reasons.push(format!(
            "Secured {} in recent races",
            plural(s.podiums, "podium", "podiums")
        ));
    }
    if s.avg_grid().is_some_and(|g| g < 3.0) {
        reasons.push("Strong qualifying performance".to_string());
    }
    if s.dnfs == 0 {
        reasons.push("Consistent reliability".to_string());
    }
    reasons
}

/// Fixed rule order: average grid, poles, front rows, reliability.
pub fn qualifying_reasons(s: &CompetitorStats) -> Vec<String> {
    let mut reasons = Vec::new();
    if let Some(g) = s.avg_grid().filter(|g| *g <= 2.0) {
        reasons.push(format!("Average starting position of {:.1}", g));
    }
    if s.poles > 0 {
        reasons.push(format!(
            "Secured {} in recent races",
            plural(s.poles, "pole position", "pole positions")
        ));
    }
    if s.front_row_starts > s.poles {
        reasons.push(format!(
            "Started from front row {} recently",
            plural(s.front_row_starts, "time", "times")
        ));
    }
    if s.dnfs == 0 {
        reasons.push("Consistent qualifying performance".to_string());
    }
    reasons
}

/// `confidence_adjustment` is advisory: the reported confidences are left as
/// ranked.
pub fn metadata(window: &ResultWindow, fallback_adjustment: f64, degraded: Vec<String>) -> PredictionMetadata {
    PredictionMetadata {
        using_fallback_season: window.using_fallback_season,
        season_used: window.season_used,
        confidence_adjustment: if window.using_fallback_season {
            fallback_adjustment
        } else {
            1.0
        },
        degraded_sources: degraded,
    }
}

fn name_of(stats: &CompetitorTable, id: &str) -> String {
    stats
        .get(id)
        .map(|s| s.competitor_name.clone())
        .unwrap_or_else(|| id.to_string())
}

/// `None` when nothing was ranked.
pub fn format(
    kind: PredictionKind,
    ranked: &[ScoredCandidate],
    stats: &CompetitorTable,
    meta: PredictionMetadata,
) -> Option<PredictionResult> {
    let (winner, rest) = ranked.split_first()?;
    let reasons = match (kind, stats.get(&winner.competitor_id)) {
        (PredictionKind::RaceWinner, Some(s)) => race_reasons(s),
        (PredictionKind::Pole, Some(s)) => qualifying_reasons(s),
        (_, None) => Vec::new(),
    };
    let other_predictions = rest
        .iter()
        .take(RUNNERS_UP)
        .map(|c| RunnerUp {
            competitor_id: c.competitor_id.clone(),
            competitor_name: name_of(stats, &c.competitor_id),
            team: c.team.clone(),
            confidence: c.confidence,
        })
        .collect();

    Some(PredictionResult {
        kind,
        winner_id: winner.competitor_id.clone(),
        winner_name: name_of(stats, &winner.competitor_id),
        confidence: winner.confidence,
        team: winner.team.clone(),
        reasons,
        other_predictions,
        metadata: meta,
    })
}
