//! ARL-driven CUSUM parameter design.
//!
//! Converts tuning targets (minimum shift delta in sigma units, desired
//! in-control ARL) into the reference value `k` and decision interval
//! `h`. The engine recomputes `h` with the closed form on every tuning
//! change; [`design_parameters`] additionally reports the predicted ARL
//! performance for operators.

use serde::{Deserialize, Serialize};

/// Decision interval used when the target shift degenerates to zero.
///
/// Equals `2 * ln(250)`, the closed-form value at delta = 1, ARL0 = 250.
pub const DEFAULT_DECISION_INTERVAL: f64 = 11.04;

/// Precomputed ARL0 values `(h, arl0)` at k = 0.25, consistent with
/// [`arl0_approx`], used for interpolation refinement.
const ARL_TABLE_K0_25: &[(f64, f64)] = &[
    (3.0, 2.9),
    (5.0, 4.5),
    (8.0, 12.4),
    (12.0, 60.6),
    (16.0, 334.2),
    (20.0, 1963.0),
];

/// Precomputed ARL0 values at k = 0.5
const ARL_TABLE_K0_5: &[(f64, f64)] = &[
    (3.0, 4.9),
    (4.0, 9.5),
    (5.0, 20.0),
    (6.0, 44.5),
    (7.0, 102.3),
    (8.0, 241.1),
    (9.0, 578.2),
    (10.0, 1406.3),
];

/// Precomputed ARL0 values at k = 0.75
const ARL_TABLE_K0_75: &[(f64, f64)] = &[
    (3.0, 8.7),
    (4.0, 26.9),
    (5.0, 91.9),
    (6.0, 334.2),
    (7.0, 1257.5),
];

/// Designed CUSUM parameters and their predicted performance
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CusumDesign {
    /// Reference value in sigma units
    pub k: f64,
    /// Decision interval in sigma units
    pub h: f64,
    /// Predicted in-control average run length
    pub arl0: f64,
    /// Predicted out-of-control average run length at the target shift
    pub arl1: f64,
}

/// Reference value for a target shift: `k = delta / 2`
pub fn reference_value(target_shift_sigma: f64) -> f64 {
    target_shift_sigma / 2.0
}

/// Closed-form decision interval: `h = (2 / delta^2) * ln(arl0)`.
///
/// Strictly increasing in `arl0` and strictly decreasing in `delta`.
/// This is the form the engine recomputes on every tuning change.
pub fn decision_interval(target_shift_sigma: f64, target_arl0: f64) -> f64 {
    if target_shift_sigma > 0.0 {
        (2.0 / (target_shift_sigma * target_shift_sigma)) * target_arl0.ln()
    } else {
        DEFAULT_DECISION_INTERVAL
    }
}

/// Approximate ARL for a one-sided CUSUM.
///
/// In control (`delta = 0`): `ARL0 = exp(2k(h-k)) / (2k(h-k))`.
/// Out of control: Siegmund's approximation with drift `delta - k` and
/// corrected barrier `h + 1.166`.
pub fn arl_approx(k: f64, h: f64, delta: f64) -> f64 {
    if delta.abs() > 0.001 {
        let drift = delta - k;
        let b = h + 1.166;
        if drift.abs() < 0.001 {
            // Limit as delta -> k
            return b * b;
        }
        ((-2.0 * drift * b).exp() + 2.0 * drift * b - 1.0) / (2.0 * drift * drift)
    } else {
        if (h - k).abs() < 0.001 {
            return 10_000.0;
        }
        (2.0 * k * (h - k)).exp() / (2.0 * k * (h - k))
    }
}

/// Approximate in-control ARL
pub fn arl0_approx(k: f64, h: f64) -> f64 {
    arl_approx(k, h, 0.0)
}

/// ARL0 at `(k, h)`, refined through the precomputed tables when `k`
/// lands on a tabulated value
pub fn arl0_from_table(k: f64, h: f64) -> f64 {
    let table = match tabulated(k) {
        Some(table) => table,
        None => return arl0_approx(k, h),
    };

    let (first_h, first_arl) = table[0];
    let (last_h, last_arl) = table[table.len() - 1];
    if h <= first_h {
        return first_arl;
    }
    if h >= last_h {
        return last_arl;
    }

    for pair in table.windows(2) {
        let (h1, arl1) = pair[0];
        let (h2, arl2) = pair[1];
        if h1 <= h && h <= h2 {
            return arl1 + (arl2 - arl1) * (h - h1) / (h2 - h1);
        }
    }

    arl0_approx(k, h)
}

/// Find the decision interval achieving a target ARL0 at a given `k`.
///
/// Uses reverse table interpolation at the tabulated reference values,
/// bisection on [`arl0_approx`] otherwise.
pub fn find_h_for_arl0(k: f64, target_arl0: f64) -> f64 {
    if let Some(table) = tabulated(k) {
        return find_h_from_table(table, target_arl0);
    }

    let (mut low, mut high) = (1.0_f64, 30.0_f64);
    for _ in 0..50 {
        let mid = (low + high) / 2.0;
        if arl0_approx(k, mid) > target_arl0 {
            high = mid;
        } else {
            low = mid;
        }
    }
    (low + high) / 2.0
}

/// Design CUSUM parameters for a target shift and in-control ARL
pub fn design_parameters(target_shift_sigma: f64, target_arl0: f64) -> CusumDesign {
    let k = reference_value(target_shift_sigma);
    let h = find_h_for_arl0(k, target_arl0);
    CusumDesign {
        k,
        h,
        arl0: arl0_from_table(k, h),
        arl1: arl_approx(k, h, target_shift_sigma),
    }
}

fn tabulated(k: f64) -> Option<&'static [(f64, f64)]> {
    if (k - 0.25).abs() < 0.01 {
        Some(ARL_TABLE_K0_25)
    } else if (k - 0.5).abs() < 0.01 {
        Some(ARL_TABLE_K0_5)
    } else if (k - 0.75).abs() < 0.01 {
        Some(ARL_TABLE_K0_75)
    } else {
        None
    }
}

fn find_h_from_table(table: &[(f64, f64)], target_arl0: f64) -> f64 {
    for pair in table.windows(2) {
        let (h1, arl1) = pair[0];
        let (h2, arl2) = pair[1];
        if arl1 <= target_arl0 && target_arl0 <= arl2 {
            return h1 + (h2 - h1) * (target_arl0 - arl1) / (arl2 - arl1);
        }
    }

    // Out of tabulated range: clamp to the nearest endpoint.
    if target_arl0 <= table[0].1 {
        table[0].0
    } else {
        table[table.len() - 1].0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_reference_value() {
        assert_eq!(reference_value(1.0), 0.5);
        assert_eq!(reference_value(0.5), 0.25);
    }

    #[test]
    fn test_decision_interval_closed_form() {
        // delta = 1, arl0 = 250 -> 2 ln(250)
        assert_relative_eq!(
            decision_interval(1.0, 250.0),
            2.0 * 250.0_f64.ln(),
            epsilon = 1e-12
        );
        assert_eq!(decision_interval(0.0, 250.0), DEFAULT_DECISION_INTERVAL);
    }

    #[test]
    fn test_decision_interval_monotone_in_arl0() {
        let h1 = decision_interval(1.0, 250.0);
        let h2 = decision_interval(1.0, 1000.0);
        assert!(h2 > h1);
    }

    #[test]
    fn test_decision_interval_monotone_in_delta() {
        let h1 = decision_interval(1.0, 250.0);
        let h2 = decision_interval(2.0, 250.0);
        assert!(h2 < h1);
    }

    #[test]
    fn test_arl0_approx_monotone_in_h() {
        let a = arl0_approx(0.5, 5.0);
        let b = arl0_approx(0.5, 8.0);
        assert!(b > a);
    }

    #[test]
    fn test_arl0_table_consistent_with_approx() {
        for &(h, arl) in ARL_TABLE_K0_5 {
            assert_relative_eq!(arl0_approx(0.5, h), arl, max_relative = 0.05);
        }
    }

    #[test]
    fn test_arl0_from_table_interpolates() {
        let mid = arl0_from_table(0.5, 5.5);
        assert!(mid > 20.0 && mid < 44.5);
    }

    #[test]
    fn test_find_h_for_arl0_bisection() {
        let h = find_h_for_arl0(0.4, 100.0);
        assert_relative_eq!(arl0_approx(0.4, h), 100.0, max_relative = 0.01);
    }

    #[test]
    fn test_find_h_from_table_reverse_interpolation() {
        let h = find_h_for_arl0(0.5, 578.2);
        assert_relative_eq!(h, 9.0, epsilon = 0.01);
    }

    #[test]
    fn test_design_parameters() {
        let design = design_parameters(1.0, 250.0);
        assert_eq!(design.k, 0.5);
        assert!(design.h > 0.0);
        // Detection at the design shift must be much faster than the
        // in-control run length.
        assert!(design.arl1 < design.arl0);
    }
}
