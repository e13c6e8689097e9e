//! Numeric helpers shared by the analyses.
//!
//! Missing cells (`None`, or NaN) are skipped everywhere, matching the usual
//! dataframe convention.

use crate::data::Column;
use std::collections::BTreeMap;

fn present(values: &[Option<f64>]) -> impl Iterator<Item = f64> + '_ {
    values.iter().flatten().copied().filter(|x| !x.is_nan())
}

/// Mean of present values; `None` when nothing is present.
pub fn mean(values: &[Option<f64>]) -> Option<f64> {
    let (sum, count) = present(values).fold((0.0, 0usize), |(s, n), x| (s + x, n + 1));
    (count > 0).then(|| sum / count as f64)
}

/// Sum of present values.
pub fn sum(values: &[Option<f64>]) -> f64 {
    present(values).sum()
}

/// Pearson correlation over pairwise-complete observations.
///
/// Returns `None` when the coefficient is undefined: fewer than two complete
/// pairs, or zero variance on either side.
pub fn pearson(xs: &[Option<f64>], ys: &[Option<f64>]) -> Option<f64> {
    let pairs: Vec<(f64, f64)> = xs
        .iter()
        .zip(ys)
        .filter_map(|(x, y)| match (x, y) {
            (Some(x), Some(y)) if !x.is_nan() && !y.is_nan() => Some((*x, *y)),
            _ => None,
        })
        .collect();

    if pairs.len() < 2 {
        return None;
    }

    let n = pairs.len() as f64;
    let mean_x = pairs.iter().map(|(x, _)| x).sum::<f64>() / n;
    let mean_y = pairs.iter().map(|(_, y)| y).sum::<f64>() / n;

    let (mut cov, mut var_x, mut var_y) = (0.0, 0.0, 0.0);
    for (x, y) in &pairs {
        let dx = x - mean_x;
        let dy = y - mean_y;
        cov += dx * dy;
        var_x += dx * dx;
        var_y += dy * dy;
    }

    if var_x == 0.0 || var_y == 0.0 {
        return None;
    }

    let r = cov / (var_x.sqrt() * var_y.sqrt());
    r.is_finite().then(|| r.clamp(-1.0, 1.0))
}

/// Round to a fixed number of decimal places.
pub fn round_to(value: f64, places: i32) -> f64 {
    let factor = 10f64.powi(places);
    (value * factor).round() / factor
}

/// Aggregate of the indicator within one group.
#[derive(Debug, Clone, PartialEq)]
pub struct GroupStats {
    pub key: String,
    /// Mean of present values; `None` if the group has none.
    pub mean: Option<f64>,
    pub sum: f64,
    /// Number of present values.
    pub count: usize,
}

/// Group `values` by the key column, ordered by key.
///
/// Rows without a key are dropped.
pub fn group_by(keys: &Column, values: &[Option<f64>]) -> Vec<GroupStats> {
    let mut groups: BTreeMap<String, (f64, usize)> = BTreeMap::new();

    for (row, value) in values.iter().enumerate() {
        let Some(key) = keys.key_at(row) else {
            continue;
        };
        let entry = groups.entry(key).or_insert((0.0, 0));
        if let Some(v) = value.filter(|v| !v.is_nan()) {
            entry.0 += v;
            entry.1 += 1;
        }
    }

    groups
        .into_iter()
        .map(|(key, (sum, count))| GroupStats {
            key,
            mean: (count > 0).then(|| sum / count as f64),
            sum,
            count,
        })
        .collect()
}

/// Count rows per distinct key, most frequent first.
///
/// Ties are broken by key so the output is deterministic.
pub fn value_counts(keys: &Column, rows: impl IntoIterator<Item = usize>) -> Vec<(String, usize)> {
    let mut counts: BTreeMap<String, usize> = BTreeMap::new();
    for row in rows {
        if let Some(key) = keys.key_at(row) {
            *counts.entry(key).or_default() += 1;
        }
    }

    let mut counts: Vec<(String, usize)> = counts.into_iter().collect();
    counts.sort_by_key(|(_, count)| std::cmp::Reverse(*count));
    counts
}
