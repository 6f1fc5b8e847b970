//! Least squares via the SVD pseudo-inverse.
//!
//! Rank-deficient designs (an intercept next to a full one-hot block) get
//! the minimum-norm solution instead of failing.

use nalgebra::{DMatrix, DVector};

use crate::RegressionError;

/// A least squares fit and what is needed to build intervals from it.
#[derive(Debug, Clone, PartialEq)]
pub struct OlsFit {
    pub coefficients: DVector<f64>,
    /// `pinv(X) * pinv(X)'`; scaled by `sigma2` it is the parameter
    /// covariance.
    pub cov_unscaled: DMatrix<f64>,
    /// Residual variance, `SSR / (n - rank)`.
    pub sigma2: f64,
    pub rank: usize,
    /// Residual degrees of freedom, `n - rank`.
    pub df_resid: usize,
}

impl OlsFit {
    /// Point prediction for one design vector.
    #[must_use]
    pub fn mean(&self, x: &DVector<f64>) -> f64 {
        x.dot(&self.coefficients)
    }

    /// Variance of the fitted mean at `x`, `sigma2 * x' C x`.
    #[must_use]
    pub fn mean_variance(&self, x: &DVector<f64>) -> f64 {
        (self.sigma2 * x.dot(&(&self.cov_unscaled * x))).max(0.0)
    }
}

/// Fits `y ~ X` by ordinary least squares.
///
/// Singular values below `max(n, p) * sigma_max * EPSILON` are treated as
/// zero, both for the rank and for the pseudo-inverse.
///
/// # Errors
///
/// * [`RegressionError::InsufficientData`] if there are no residual degrees
///   of freedom
/// * [`RegressionError::Numerical`] if the design contains non-finite
///   values or the decomposition fails
pub fn fit(x: &DMatrix<f64>, y: &DVector<f64>) -> Result<OlsFit, RegressionError> {
    let (n, p) = x.shape();
    if n != y.len() {
        return Err(RegressionError::Numerical {
            message: format!("design has {n} rows but target has {}", y.len()),
        });
    }
    if n == 0 || p == 0 {
        return Err(RegressionError::InsufficientData {
            message: "empty design matrix".to_string(),
        });
    }
    if x.iter().chain(y.iter()).any(|v| !v.is_finite()) {
        return Err(RegressionError::Numerical {
            message: "design or target contains non-finite values".to_string(),
        });
    }

    let svd = x.clone().svd(true, true);
    #[allow(clippy::cast_precision_loss)]
    let tolerance = svd.singular_values.max() * n.max(p) as f64 * f64::EPSILON;
    let rank = svd.rank(tolerance);

    if n <= rank {
        return Err(RegressionError::InsufficientData {
            message: format!(
                "{n} rows leave no residual degrees of freedom for rank {rank}"
            ),
        });
    }
    if rank < p {
        log::debug!("Design is rank deficient ({rank} of {p} columns)");
    }

    let pinv = svd
        .pseudo_inverse(tolerance)
        .map_err(|e| RegressionError::Numerical {
            message: e.to_string(),
        })?;

    let coefficients = &pinv * y;
    let residuals = y - x * &coefficients;
    let df_resid = n - rank;
    #[allow(clippy::cast_precision_loss)]
    let sigma2 = residuals.norm_squared() / df_resid as f64;
    let cov_unscaled = &pinv * pinv.transpose();

    Ok(OlsFit {
        coefficients,
        cov_unscaled,
        sigma2,
        rank,
        df_resid,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn recovers_exact_coefficients() {
        // y = 3 + 2a - 0.5b
        let rows: Vec<[f64; 3]> = (0..12)
            .map(|i| {
                let a = f64::from(i);
                let b = f64::from((i * 7) % 5);
                [1.0, a, b]
            })
            .collect();
        let flat: Vec<f64> = rows.iter().flatten().copied().collect();
        let x = DMatrix::from_row_slice(rows.len(), 3, &flat);
        let y = DVector::from_iterator(
            rows.len(),
            rows.iter()
                .map(|r| 0.5f64.mul_add(-r[2], 2.0f64.mul_add(r[1], 3.0))),
        );

        let fit = fit(&x, &y).unwrap();
        assert_eq!(fit.rank, 3);
        assert_eq!(fit.df_resid, 9);
        let expected = [3.0, 2.0, -0.5];
        for (got, want) in fit.coefficients.iter().zip(expected) {
            assert!((got - want).abs() < 1e-9, "got {got}, want {want}");
        }
        assert!(fit.sigma2 < 1e-18);
    }

    #[test]
    fn rank_deficient_one_hot_with_intercept() {
        // const + two one-hot columns that sum to const
        let mut flat = Vec::new();
        let mut targets = Vec::new();
        for i in 0..10 {
            let a = if i % 2 == 0 { 1.0 } else { 0.0 };
            let noise = if i % 3 == 0 { 1.0 } else { -0.5 };
            flat.extend([1.0, a, 1.0 - a]);
            targets.push(10.0f64.mul_add(a, 100.0) + noise);
        }
        let x = DMatrix::from_row_slice(10, 3, &flat);
        let y = DVector::from_vec(targets);

        let fit = fit(&x, &y).unwrap();
        assert_eq!(fit.rank, 2);
        assert_eq!(fit.df_resid, 8);

        // Minimum-norm solution splits the intercept evenly, so
        // const = b_a + b_not_a.
        let c = &fit.coefficients;
        assert!((c[0] - (c[1] + c[2])).abs() < 1e-9, "{c}");

        // Group means are reproduced regardless of the parameterisation.
        let in_group = DVector::from_vec(vec![1.0, 1.0, 0.0]);
        let out_group = DVector::from_vec(vec![1.0, 0.0, 1.0]);
        let mean_in = [1.0, 1.0, -0.5, -0.5, -0.5]
            .iter()
            .map(|n| 110.0 + n)
            .sum::<f64>()
            / 5.0;
        assert!((fit.mean(&in_group) - mean_in).abs() < 1e-9);
        assert!(fit.mean(&out_group) > 99.0 && fit.mean(&out_group) < 101.0);
        assert!(fit.mean_variance(&in_group) > 0.0);
    }

    #[test]
    fn saturated_design_has_no_residual_freedom() {
        let x = DMatrix::from_row_slice(2, 2, &[1.0, 0.0, 1.0, 1.0]);
        let y = DVector::from_vec(vec![1.0, 2.0]);
        assert!(matches!(
            fit(&x, &y),
            Err(RegressionError::InsufficientData { .. })
        ));
    }

    #[test]
    fn rejects_non_finite_design() {
        let x = DMatrix::from_row_slice(3, 1, &[1.0, f64::NAN, 1.0]);
        let y = DVector::from_vec(vec![1.0, 2.0, 3.0]);
        assert!(matches!(fit(&x, &y), Err(RegressionError::Numerical { .. })));
    }
}
