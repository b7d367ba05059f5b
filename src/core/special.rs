//! Special functions for the gamma clutter model and chi-square tests
//!
//! The regularized incomplete gamma function follows the classic split: the
//! power series converges quickly for `x < a + 1`, the continued fraction
//! (modified Lentz) everywhere else. Both reach full double precision well
//! inside the iteration cap for the shape parameters seen in SAR scenes.

use std::f64::consts::PI;

const MAX_ITERATIONS: usize = 10_000;
const EPSILON: f64 = 1e-15;
const FPMIN: f64 = 1e-300;

/// ln Γ(x) for x > 0 (Lanczos, g = 7, n = 9)
pub fn ln_gamma(x: f64) -> f64 {
    if x < 0.5 {
        // Reflection formula: Γ(x) = π / (sin(πx) · Γ(1-x))
        let reflected = ln_gamma(1.0 - x);
        (PI / (PI * x).sin()).ln() - reflected
    } else {
        let coefficients: [f64; 9] = [
            0.99999999999980993,
            676.5203681218851,
            -1259.1392167224028,
            771.32342877765313,
            -176.61502916214059,
            12.507343278686905,
            -0.13857109526572012,
            9.9843695780195716e-6,
            1.5056327351493116e-7,
        ];
        let g = 7.0_f64;
        let z = x - 1.0;
        let mut ag = coefficients[0];
        for (i, c) in coefficients.iter().enumerate().skip(1) {
            ag += c / (z + i as f64);
        }
        let t = z + g + 0.5;
        0.5 * (2.0 * PI).ln() + (z + 0.5) * t.ln() - t + ag.ln()
    }
}

/// Regularized lower incomplete gamma P(a, x)
pub fn regularized_gamma_p(a: f64, x: f64) -> f64 {
    if !valid_arguments(a, x) {
        return f64::NAN;
    }
    if x == 0.0 {
        return 0.0;
    }
    if x < a + 1.0 {
        lower_series(a, x)
    } else {
        1.0 - upper_continued_fraction(a, x)
    }
}

/// Regularized upper incomplete gamma Q(a, x) = 1 - P(a, x)
///
/// Same quantity as `scipy.special.gammaincc`. The upper tail is computed
/// directly for `x >= a + 1` so tiny false-alarm probabilities keep their
/// relative precision.
pub fn regularized_gamma_q(a: f64, x: f64) -> f64 {
    if !valid_arguments(a, x) {
        return f64::NAN;
    }
    if x == 0.0 {
        return 1.0;
    }
    if x < a + 1.0 {
        1.0 - lower_series(a, x)
    } else {
        upper_continued_fraction(a, x)
    }
}

/// Survival function of the chi-square distribution with `dof` degrees of freedom
pub fn chi_square_sf(x: f64, dof: f64) -> f64 {
    if x.is_nan() || !(dof > 0.0) {
        return f64::NAN;
    }
    if x <= 0.0 {
        return 1.0;
    }
    if x.is_infinite() {
        return 0.0;
    }
    regularized_gamma_q(dof / 2.0, x / 2.0)
}

fn valid_arguments(a: f64, x: f64) -> bool {
    a.is_finite() && a > 0.0 && !x.is_nan() && x >= 0.0
}

/// e^{-x} x^a / Γ(a)
fn prefactor(a: f64, x: f64) -> f64 {
    (-x + a * x.ln() - ln_gamma(a)).exp()
}

fn lower_series(a: f64, x: f64) -> f64 {
    let mut ap = a;
    let mut term = 1.0 / a;
    let mut sum = term;
    for _ in 0..MAX_ITERATIONS {
        ap += 1.0;
        term *= x / ap;
        sum += term;
        if term.abs() < sum.abs() * EPSILON {
            break;
        }
    }
    (sum * prefactor(a, x)).clamp(0.0, 1.0)
}

fn upper_continued_fraction(a: f64, x: f64) -> f64 {
    if x.is_infinite() {
        return 0.0;
    }
    let mut b = x + 1.0 - a;
    let mut c = 1.0 / FPMIN;
    let mut d = 1.0 / b;
    let mut h = d;
    for i in 1..=MAX_ITERATIONS {
        let an = -(i as f64) * (i as f64 - a);
        b += 2.0;
        d = an * d + b;
        if d.abs() < FPMIN {
            d = FPMIN;
        }
        c = b + an / c;
        if c.abs() < FPMIN {
            c = FPMIN;
        }
        d = 1.0 / d;
        let delta = d * c;
        h *= delta;
        if (delta - 1.0).abs() < EPSILON {
            break;
        }
    }
    (prefactor(a, x) * h).clamp(0.0, 1.0)
}
