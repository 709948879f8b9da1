//! Weighted score aggregation.
//!
//! Both scores are pure functions of the result list and the weight tables.
//! Sums run in result order and, for sub-scores, in label order (`BTreeMap`), so
//! repeated calls return bit-identical values.

use std::collections::{BTreeMap, BTreeSet};

use crate::domain::{AnalyzerKind, RuleResult};

const DEFAULT_WEIGHT: f64 = 1.0;

/// `Σ(score·w(kind)) / Σ w(kind)`, or 0 when there is nothing to weigh.
pub fn final_score(results: &[RuleResult], weights: &BTreeMap<AnalyzerKind, f64>) -> f64 {
    weighted_mean(results.iter().map(|r| {
        let weight = weights.get(&r.analyzer).copied().unwrap_or(DEFAULT_WEIGHT);
        (r.score, weight)
    }))
}

/// Weighted mean of the named sub-scores reported by alignment-bearing analyzers.
///
/// Each label in a qualifying result's metric map is weighted by
/// `weights[label]`. Results that report no sub-scores contribute nothing.
pub fn alignment_score(
    results: &[RuleResult],
    alignment_kinds: &BTreeSet<AnalyzerKind>,
    weights: &BTreeMap<String, f64>,
) -> f64 {
    weighted_mean(
        results
            .iter()
            .filter(|r| alignment_kinds.contains(&r.analyzer))
            .flat_map(|r| r.metrics.iter())
            .map(|(label, score)| {
                let weight = weights.get(label).copied().unwrap_or(DEFAULT_WEIGHT);
                (*score, weight)
            }),
    )
}

fn weighted_mean(items: impl Iterator<Item = (f64, f64)>) -> f64 {
    let (total, total_weight) = items.fold((0.0, 0.0), |(total, weight_sum), (score, weight)| {
        (total + score * weight, weight_sum + weight)
    });
    if total_weight > 0.0 {
        total / total_weight
    } else {
        0.0
    }
}
