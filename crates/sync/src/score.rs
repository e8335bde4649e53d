//! Weighted composite score against monthly targets.
//!
//! Each weighted metric contributes `actual / target * weight`. A metric
//! without a positive target contributes nothing. The total is not clamped;
//! beating every target scores above 1.0.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

/// Monthly goal and weight for one metric.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Goal {
    pub target: f64,
    pub weight: f64,
}

/// Goals keyed by metric name.
pub type TargetSet = BTreeMap<String, Goal>;

pub fn contribution(actual: f64, target: f64, weight: f64) -> f64 {
    if target > 0.0 && actual.is_finite() && weight.is_finite() {
        (actual / target) * weight
    } else {
        0.0
    }
}

/// Sum of contributions over every weighted metric.
pub fn score(
    actuals: &BTreeMap<String, f64>,
    targets: &BTreeMap<String, f64>,
    weights: &BTreeMap<String, f64>,
) -> f64 {
    weights
        .iter()
        .map(|(metric, weight)| {
            let actual = actuals.get(metric).copied().unwrap_or(0.0);
            let target = targets.get(metric).copied().unwrap_or(0.0);
            contribution(actual, target, *weight)
        })
        .sum()
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MetricScore {
    pub metric: String,
    pub actual: f64,
    pub target: f64,
    pub weight: f64,
    /// `actual / target`, absent when there is no positive target.
    pub achievement: Option<f64>,
    pub contribution: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ScoreBreakdown {
    pub metrics: Vec<MetricScore>,
    pub total: f64,
}

/// Per-metric view of [`score`], for previews and reports.
pub fn breakdown(actuals: &BTreeMap<String, f64>, targets: &TargetSet) -> ScoreBreakdown {
    let metrics: Vec<MetricScore> = targets
        .iter()
        .map(|(metric, goal)| {
            let actual = actuals.get(metric).copied().unwrap_or(0.0);
            MetricScore {
                metric: metric.clone(),
                actual,
                target: goal.target,
                weight: goal.weight,
                achievement: (goal.target > 0.0).then(|| actual / goal.target),
                contribution: contribution(actual, goal.target, goal.weight),
            }
        })
        .collect();
    let total = metrics.iter().map(|m| m.contribution).sum();
    ScoreBreakdown { metrics, total }
}

/// Split a goal table into the target and weight maps [`score`] takes.
pub fn split_goals(targets: &TargetSet) -> (BTreeMap<String, f64>, BTreeMap<String, f64>) {
    targets
        .iter()
        .map(|(m, g)| ((m.clone(), g.target), (m.clone(), g.weight)))
        .unzip()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn map(pairs: &[(&str, f64)]) -> BTreeMap<String, f64> {
        pairs.iter().map(|(k, v)| (k.to_string(), *v)).collect()
    }

    #[test]
    fn no_actuals_scores_zero() {
        let targets = map(&[("毛利", 300_000.0), ("門號", 40.0)]);
        let weights = map(&[("毛利", 0.6), ("門號", 0.4)]);
        assert_eq!(score(&BTreeMap::new(), &targets, &weights), 0.0);
    }

    #[test]
    fn zero_target_contributes_nothing() {
        let actuals = map(&[("毛利", 150_000.0), ("門號", 99.0)]);
        let targets = map(&[("毛利", 300_000.0), ("門號", 0.0)]);
        let weights = map(&[("毛利", 0.6), ("門號", 0.4)]);
        let total = score(&actuals, &targets, &weights);
        assert!((total - 0.3).abs() < 1e-12);
    }

    #[test]
    fn overshoot_is_not_clamped() {
        let actuals = map(&[("毛利", 345_000.0)]);
        let targets = map(&[("毛利", 300_000.0)]);
        let weights = map(&[("毛利", 1.0)]);
        let total = score(&actuals, &targets, &weights);
        assert!((total - 1.15).abs() < 1e-12);
    }

    #[test]
    fn unweighted_metrics_ignored() {
        let actuals = map(&[("毛利", 100.0), ("來客數", 500.0)]);
        let targets = map(&[("毛利", 100.0), ("來客數", 100.0)]);
        let weights = map(&[("毛利", 0.5)]);
        assert!((score(&actuals, &targets, &weights) - 0.5).abs() < 1e-12);
    }

    #[test]
    fn breakdown_matches_score() {
        let mut goals = TargetSet::new();
        goals.insert("毛利".into(), Goal { target: 200.0, weight: 0.7 });
        goals.insert("遠傳升續率".into(), Goal { target: 0.0, weight: 0.3 });
        let actuals = map(&[("毛利", 100.0), ("遠傳升續率", 0.8)]);

        let b = breakdown(&actuals, &goals);
        assert_eq!(b.metrics.len(), 2);
        let gross = b.metrics.iter().find(|m| m.metric == "毛利").unwrap();
        assert_eq!(gross.achievement, Some(0.5));
        assert!((gross.contribution - 0.35).abs() < 1e-12);
        let renew = b.metrics.iter().find(|m| m.metric == "遠傳升續率").unwrap();
        assert_eq!(renew.achievement, None);
        assert_eq!(renew.contribution, 0.0);

        let (targets, weights) = split_goals(&goals);
        assert!((score(&actuals, &targets, &weights) - b.total).abs() < 1e-12);
    }
}
