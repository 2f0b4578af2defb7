use serde::{Deserialize, Serialize};

/// Summary of one KPI across simulation iterations.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct KpiStatistics {
    pub mean: f64,
    pub p10: f64,
    pub p50: f64,
    pub p90: f64,
    pub std_dev: f64,
    pub min: f64,
    pub max: f64,
    /// Iterations that produced a finite value
    pub samples: usize,
}

/// Summarize the finite values of `values`, skipping missing and NaN
/// entries. `None` when nothing remains.
pub fn summarize<I>(values: I) -> Option<KpiStatistics>
where
    I: IntoIterator<Item = Option<f64>>,
{
    let mut sorted: Vec<f64> = values
        .into_iter()
        .flatten()
        .filter(|v| v.is_finite())
        .collect();
    if sorted.is_empty() {
        return None;
    }
    sorted.sort_by(|a, b| a.total_cmp(b));

    let n = sorted.len() as f64;
    let mean = sorted.iter().sum::<f64>() / n;
    let variance = sorted.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / n;

    Some(KpiStatistics {
        mean,
        p10: percentile_sorted(&sorted, 10.0),
        p50: percentile_sorted(&sorted, 50.0),
        p90: percentile_sorted(&sorted, 90.0),
        std_dev: variance.sqrt(),
        min: sorted[0],
        max: sorted[sorted.len() - 1],
        samples: sorted.len(),
    })
}

/// Percentile of a **sorted**, non-empty slice using linear interpolation
/// between closest ranks.
pub fn percentile_sorted(sorted: &[f64], p: f64) -> f64 {
    match sorted.len() {
        0 => f64::NAN,
        1 => sorted[0],
        len => {
            let rank = p / 100.0 * (len - 1) as f64;
            let lower = rank.floor() as usize;
            let upper = rank.ceil() as usize;
            if lower == upper {
                sorted[lower]
            } else {
                let frac = rank - lower as f64;
                sorted[lower] * (1.0 - frac) + sorted[upper] * frac
            }
        }
    }
}
