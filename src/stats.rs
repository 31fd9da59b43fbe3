//! Descriptive statistics and the paired significance test.

use serde::{Deserialize, Serialize};
use statrs::distribution::{ContinuousCDF, StudentsT};

/// Added to the denominator of Cohen's d
pub const COHENS_D_EPSILON: f64 = 1e-9;

/// Arithmetic mean; 0.0 for an empty slice
pub fn mean(values: &[f64]) -> f64 {
    if values.is_empty() {
        return 0.0;
    }
    values.iter().sum::<f64>() / values.len() as f64
}

/// Standard deviation with `ddof` delta degrees of freedom; 0.0 when undefined
pub fn std_dev(values: &[f64], ddof: usize) -> f64 {
    if values.len() <= ddof {
        return 0.0;
    }
    let m = mean(values);
    let variance = values.iter().map(|v| (v - m).powi(2)).sum::<f64>()
        / (values.len() - ddof) as f64;
    variance.sqrt()
}

/// Sample standard deviation (n - 1 denominator)
pub fn sample_std(values: &[f64]) -> f64 {
    std_dev(values, 1)
}

/// Population standard deviation (n denominator)
pub fn population_std(values: &[f64]) -> f64 {
    std_dev(values, 0)
}

/// Paired comparison of a baseline against a treatment.
///
/// `t_stat` and `p_value` are absent when fewer than two pairs exist or the
/// differences have zero variance.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PairedTestResult {
    pub t_stat: Option<f64>,
    pub p_value: Option<f64>,
    pub cohens_d: f64,
    pub n: usize,
}

/// Paired t-test over `(baseline, treatment)` pairs.
///
/// Differences are `treatment - baseline`, so a positive t favors the treatment.
pub fn paired_t_test(pairs: &[(f64, f64)]) -> PairedTestResult {
    let diffs: Vec<f64> = pairs.iter().map(|(a, b)| b - a).collect();
    let n = diffs.len();
    let mean_diff = mean(&diffs);

    let cohens_d = if n == 0 {
        0.0
    } else {
        mean_diff / (population_std(&diffs) + COHENS_D_EPSILON)
    };

    let sd = sample_std(&diffs);
    let (t_stat, p_value) = if n < 2 || sd == 0.0 {
        (None, None)
    } else {
        let t = mean_diff / (sd / (n as f64).sqrt());
        (Some(t), students_t_two_sided_p(t, (n - 1) as f64))
    };

    PairedTestResult {
        t_stat,
        p_value,
        cohens_d,
        n,
    }
}

/// Two-sided tail probability of Student's t with `df` degrees of freedom.
///
/// `None` when `df` is not a valid parameter.
pub fn students_t_two_sided_p(t: f64, df: f64) -> Option<f64> {
    let dist = StudentsT::new(0.0, 1.0, df).ok()?;
    Some((2.0 * (1.0 - dist.cdf(t.abs()))).clamp(0.0, 1.0))
}
