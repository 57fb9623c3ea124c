//! Nonparametric comparison of two sample sets.
//!
//! Histograms compare their retained sample reservoirs with a two-sided
//! Mann-Whitney U test. The normal approximation with tie correction is
//! used throughout; the reservoirs this runs over are large enough for it.

use ordered_float::OrderedFloat;

/// The significance level used when the caller does not supply one.
pub const DEFAULT_ALPHA: f64 = 0.05;

/// Outcome of comparing two sample distributions.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Significance {
    /// The distributions differ beyond chance at the requested level.
    Significant,
    /// No difference beyond chance was found.
    Insignificant,
    /// The unit does not care about direction, so no test was run.
    DontCare,
}

/// The U statistic and p-value backing a [`Significance`] verdict.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MwuResult {
    /// The smaller of the two U statistics.
    pub u: f64,
    /// Two-sided p-value.
    pub p: f64,
    /// The verdict at the requested significance level.
    pub significance: Significance,
}

/// Two-sided Mann-Whitney U test between sample sets `a` and `b` at
/// significance level `alpha`.
///
/// Ties share their average rank and feed the tie-corrected variance.
/// Degenerate inputs (either side empty, or zero rank variance) report
/// p = 1 and are never significant.
pub fn mann_whitney_u(a: &[f64], b: &[f64], alpha: f64) -> MwuResult {
    if a.is_empty() || b.is_empty() {
        return MwuResult {
            u: 0.0,
            p: 1.0,
            significance: Significance::Insignificant,
        };
    }

    let mut pooled: Vec<(OrderedFloat<f64>, bool)> = a
        .iter()
        .map(|&value| (OrderedFloat(value), true))
        .chain(b.iter().map(|&value| (OrderedFloat(value), false)))
        .collect();
    pooled.sort_by_key(|&(value, _)| value);

    let mut rank_sum_a = 0.0;
    let mut tie_term = 0.0;
    let mut index = 0;
    while index < pooled.len() {
        let mut end = index;
        while end < pooled.len() && pooled[end].0 == pooled[index].0 {
            end += 1;
        }
        // Every member of the tie group gets the average of its ranks.
        let rank = (index + end + 1) as f64 / 2.0;
        for &(_, from_a) in &pooled[index..end] {
            if from_a {
                rank_sum_a += rank;
            }
        }
        let ties = (end - index) as f64;
        tie_term += ties * ties * ties - ties;
        index = end;
    }

    let n1 = a.len() as f64;
    let n2 = b.len() as f64;
    let n = n1 + n2;
    let u1 = rank_sum_a - n1 * (n1 + 1.0) / 2.0;
    let u2 = n1 * n2 - u1;
    let u = u1.min(u2);

    let mean_u = n1 * n2 / 2.0;
    let variance_u = n1 * n2 / 12.0 * ((n + 1.0) - tie_term / (n * (n - 1.0)));
    if variance_u <= 0.0 {
        return MwuResult {
            u,
            p: 1.0,
            significance: Significance::Insignificant,
        };
    }

    // Continuity-corrected z; u <= mean_u by construction.
    let z = (u - mean_u + 0.5) / variance_u.sqrt();
    let p = (2.0 * normal_cdf(z)).clamp(0.0, 1.0);
    MwuResult {
        u,
        p,
        significance: if p < alpha {
            Significance::Significant
        } else {
            Significance::Insignificant
        },
    }
}

fn normal_cdf(z: f64) -> f64 {
    0.5 * erfc(-z / std::f64::consts::SQRT_2)
}

/// Complementary error function, rational approximation with fractional
/// error below 1.2e-7 everywhere.
fn erfc(x: f64) -> f64 {
    let z = x.abs();
    let t = 1.0 / (1.0 + 0.5 * z);
    let answer = t
        * (-z * z - 1.26551223
            + t * (1.00002368
                + t * (0.37409196
                    + t * (0.09678418
                        + t * (-0.18628806
                            + t * (0.27886807
                                + t * (-1.13520398
                                    + t * (1.48851587
                                        + t * (-0.82215223 + t * 0.17087277)))))))))
        .exp();
    if x >= 0.0 {
        answer
    } else {
        2.0 - answer
    }
}
