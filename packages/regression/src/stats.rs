//! Error metrics and the Student-t quantile used for intervals.

use std::f64::consts::PI;

/// Root mean squared error between paired actual and predicted values.
///
/// Returns `None` when the slices are empty or differ in length.
#[must_use]
pub fn rmse(actual: &[f64], predicted: &[f64]) -> Option<f64> {
    if actual.is_empty() || actual.len() != predicted.len() {
        return None;
    }
    let sse: f64 = actual
        .iter()
        .zip(predicted)
        .map(|(a, p)| (a - p).powi(2))
        .sum();
    #[allow(clippy::cast_precision_loss)]
    Some((sse / actual.len() as f64).sqrt())
}

/// Coefficient of determination of `predicted` against `actual`.
///
/// A constant `actual` scores 1.0 when predicted exactly and 0.0
/// otherwise. Returns `None` when the slices are empty or differ in
/// length.
#[must_use]
pub fn r_squared(actual: &[f64], predicted: &[f64]) -> Option<f64> {
    if actual.is_empty() || actual.len() != predicted.len() {
        return None;
    }
    #[allow(clippy::cast_precision_loss)]
    let mean = actual.iter().sum::<f64>() / actual.len() as f64;

    let ss_res: f64 = actual
        .iter()
        .zip(predicted)
        .map(|(a, p)| (a - p).powi(2))
        .sum();
    let ss_tot: f64 = actual.iter().map(|a| (a - mean).powi(2)).sum();

    if ss_tot == 0.0 {
        return Some(if ss_res == 0.0 { 1.0 } else { 0.0 });
    }
    Some(1.0 - ss_res / ss_tot)
}

/// Lower-tail quantile of Student's t distribution with `df` degrees of
/// freedom: the `t` with `P(T <= t) = p`.
///
/// Returns `None` if `p` is outside `(0, 1)` or `df` is not positive.
#[must_use]
pub fn student_t_quantile(p: f64, df: f64) -> Option<f64> {
    if p.is_nan() || p <= 0.0 || p >= 1.0 || df.is_nan() || df <= 0.0 || df.is_infinite() {
        return None;
    }
    if (p - 0.5).abs() < f64::EPSILON {
        return Some(0.0);
    }
    if p < 0.5 {
        return student_t_quantile(1.0 - p, df).map(|t| -t);
    }

    let mut lo = 0.0;
    let mut hi = 1.0;
    while student_t_cdf(hi, df) < p {
        lo = hi;
        hi *= 2.0;
        if !hi.is_finite() {
            return None;
        }
    }

    for _ in 0..200 {
        let mid = f64::midpoint(lo, hi);
        if student_t_cdf(mid, df) < p {
            lo = mid;
        } else {
            hi = mid;
        }
        if hi - lo <= 1e-13 * hi.max(1.0) {
            break;
        }
    }

    Some(f64::midpoint(lo, hi))
}

/// `P(T <= t)` for Student's t with `df` degrees of freedom.
#[must_use]
pub fn student_t_cdf(t: f64, df: f64) -> f64 {
    let x = df / t.mul_add(t, df);
    let tail = 0.5 * regularized_incomplete_beta(x, df / 2.0, 0.5);
    if t >= 0.0 { 1.0 - tail } else { tail }
}

fn regularized_incomplete_beta(x: f64, a: f64, b: f64) -> f64 {
    if x <= 0.0 {
        return 0.0;
    }
    if x >= 1.0 {
        return 1.0;
    }

    let ln_front = ln_gamma(a + b) - ln_gamma(a) - ln_gamma(b)
        + a.mul_add(x.ln(), b * (1.0 - x).ln());
    let front = ln_front.exp();

    // The continued fraction converges fastest below the mean.
    if x < (a + 1.0) / (a + b + 2.0) {
        front * beta_continued_fraction(x, a, b) / a
    } else {
        1.0 - front * beta_continued_fraction(1.0 - x, b, a) / b
    }
}

/// Modified Lentz evaluation of the incomplete beta continued fraction.
fn beta_continued_fraction(x: f64, a: f64, b: f64) -> f64 {
    const MAX_ITERATIONS: u32 = 300;
    const TOLERANCE: f64 = 1e-15;
    const TINY: f64 = 1e-300;

    let guard = |v: f64| if v.abs() < TINY { TINY } else { v };

    let mut c = 1.0;
    let mut d = 1.0 / guard(1.0 - (a + b) * x / (a + 1.0));
    let mut h = d;

    for m in 1..=MAX_ITERATIONS {
        let m = f64::from(m);
        let m2 = 2.0 * m;

        let even = m * (b - m) * x / ((a - 1.0 + m2) * (a + m2));
        d = 1.0 / guard(even.mul_add(d, 1.0));
        c = guard(1.0 + even / c);
        h *= d * c;

        let odd = -(a + m) * (a + b + m) * x / ((a + m2) * (a + 1.0 + m2));
        d = 1.0 / guard(odd.mul_add(d, 1.0));
        c = guard(1.0 + odd / c);
        let delta = d * c;
        h *= delta;

        if (delta - 1.0).abs() < TOLERANCE {
            break;
        }
    }

    h
}

/// Natural log of the gamma function (Lanczos, g = 7).
fn ln_gamma(x: f64) -> f64 {
    const G: f64 = 7.0;
    const COEFFICIENTS: [f64; 9] = [
        0.999_999_999_999_809_9,
        676.520_368_121_885_1,
        -1_259.139_216_722_402_8,
        771.323_428_777_653_1,
        -176.615_029_162_140_6,
        12.507_343_278_686_905,
        -0.138_571_095_265_720_12,
        9.984_369_578_019_572e-6,
        1.505_632_735_149_311_6e-7,
    ];

    if x < 0.5 {
        return (PI / (PI * x).sin()).ln() - ln_gamma(1.0 - x);
    }

    let x = x - 1.0;
    let t = x + G + 0.5;
    let series = COEFFICIENTS
        .iter()
        .enumerate()
        .skip(1)
        .fold(COEFFICIENTS[0], |acc, (i, c)| {
            #[allow(clippy::cast_precision_loss)]
            let i = i as f64;
            acc + c / (x + i)
        });

    0.5 * (2.0 * PI).ln() + (x + 0.5) * t.ln() - t + series.ln()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn close(a: f64, b: f64, tol: f64) -> bool {
        (a - b).abs() <= tol
    }

    #[test]
    fn ln_gamma_matches_factorials() {
        assert!(close(ln_gamma(1.0), 0.0, 1e-12));
        assert!(close(ln_gamma(5.0), 24.0_f64.ln(), 1e-12));
        assert!(close(ln_gamma(0.5), PI.sqrt().ln(), 1e-12));
    }

    #[test]
    fn t_quantile_matches_tables() {
        let cases = [
            (0.975, 1.0, 12.706_204_736),
            (0.975, 2.0, 4.302_652_730),
            (0.975, 5.0, 2.570_581_836),
            (0.975, 10.0, 2.228_138_852),
            (0.975, 30.0, 2.042_272_456),
            (0.95, 20.0, 1.724_718_243),
        ];
        for (p, df, expected) in cases {
            let t = student_t_quantile(p, df).unwrap();
            assert!(close(t, expected, 1e-6), "t({p}, {df}) = {t}, expected {expected}");
        }
    }

    #[test]
    fn t_quantile_approaches_normal() {
        let t = student_t_quantile(0.975, 1e7).unwrap();
        assert!(close(t, 1.959_963_985, 1e-5), "got {t}");
    }

    #[test]
    fn t_quantile_is_symmetric() {
        let upper = student_t_quantile(0.9, 7.0).unwrap();
        let lower = student_t_quantile(0.1, 7.0).unwrap();
        assert!(close(upper, -lower, 1e-12));
        assert_eq!(student_t_quantile(0.5, 7.0), Some(0.0));
    }

    #[test]
    fn t_quantile_rejects_bad_arguments() {
        assert!(student_t_quantile(0.0, 5.0).is_none());
        assert!(student_t_quantile(1.0, 5.0).is_none());
        assert!(student_t_quantile(0.9, 0.0).is_none());
    }

    #[test]
    fn rmse_and_r_squared() {
        let actual = [1.0, 2.0, 3.0, 4.0];
        let predicted = [1.0, 2.0, 3.0, 5.0];
        assert!(close(rmse(&actual, &predicted).unwrap(), 0.5, 1e-12));
        // ss_res = 1, ss_tot = 5
        assert!(close(r_squared(&actual, &predicted).unwrap(), 0.8, 1e-12));
        assert_eq!(r_squared(&actual, &actual), Some(1.0));
        assert_eq!(r_squared(&[2.0, 2.0], &[2.0, 3.0]), Some(0.0));
        assert!(rmse(&[], &[]).is_none());
    }
}
