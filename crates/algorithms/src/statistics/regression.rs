//! Bivariate ordinary least squares
//!
//! Fits `attribute ~ mean_value` over the rows of a region table and reports
//! fit quality, the slope's two-sided Student t p-value and per-row
//! residuals.

use idwkit_core::vector::RegionTable;
use idwkit_core::{Error, Result};
use serde::{Deserialize, Serialize};

/// Minimum number of usable rows for a fit with a defined p-value
pub const MIN_ROWS: usize = 3;

/// Result of a simple linear fit `y = intercept + slope * x`
#[derive(Debug, Clone, PartialEq)]
pub struct OlsFit {
    pub intercept: f64,
    pub slope: f64,
    /// Coefficient of determination; 0 when `y` has no variance
    pub r2: f64,
    /// Two-sided p-value of the slope under H0: slope = 0
    pub p_value_slope: f64,
    pub rmse: f64,
    pub mae: f64,
    pub fitted: Vec<f64>,
    pub residuals: Vec<f64>,
}

impl OlsFit {
    pub fn n(&self) -> usize {
        self.fitted.len()
    }
}

/// Fit `y` on `x` by ordinary least squares.
///
/// Needs at least [`MIN_ROWS`] pairs and a non-constant `x`.
pub fn ols(x: &[f64], y: &[f64]) -> Result<OlsFit> {
    if x.len() != y.len() {
        return Err(Error::Algorithm(format!("{} x values for {} y values", x.len(), y.len())));
    }
    let n = x.len();
    if n < MIN_ROWS {
        return Err(Error::Algorithm(format!(
            "Need at least {MIN_ROWS} usable rows for regression, got {n}"
        )));
    }

    let nf = n as f64;
    let mean_x = x.iter().sum::<f64>() / nf;
    let mean_y = y.iter().sum::<f64>() / nf;

    let mut sxx = 0.0;
    let mut sxy = 0.0;
    let mut ss_tot = 0.0;
    for (&xi, &yi) in x.iter().zip(y) {
        sxx += (xi - mean_x) * (xi - mean_x);
        sxy += (xi - mean_x) * (yi - mean_y);
        ss_tot += (yi - mean_y) * (yi - mean_y);
    }
    if sxx == 0.0 {
        return Err(Error::Algorithm("Predictor has zero variance".into()));
    }

    let slope = sxy / sxx;
    let intercept = mean_y - slope * mean_x;

    let fitted: Vec<f64> = x.iter().map(|&xi| intercept + slope * xi).collect();
    let residuals: Vec<f64> = y.iter().zip(&fitted).map(|(&yi, &fi)| yi - fi).collect();

    let ss_res: f64 = residuals.iter().map(|r| r * r).sum();
    let r2 = if ss_tot > 0.0 { 1.0 - ss_res / ss_tot } else { 0.0 };
    let rmse = (ss_res / nf).sqrt();
    let mae = residuals.iter().map(|r| r.abs()).sum::<f64>() / nf;

    let df = nf - 2.0;
    let se_slope = (ss_res / df / sxx).sqrt();
    let p_value_slope = if se_slope > 0.0 {
        student_t_two_sided(slope / se_slope, df)
    } else {
        0.0
    };

    Ok(OlsFit {
        intercept,
        slope,
        r2,
        p_value_slope,
        rmse,
        mae,
        fitted,
        residuals,
    })
}

/// Fitted coefficients as published
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct OlsParams {
    pub intercept: f64,
    pub slope: f64,
}

/// Summary document of a region-table regression
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RegressionSummary {
    pub rows_before: usize,
    pub rows_used: usize,
    pub n: usize,
    pub model: String,
    pub formula: String,
    pub params: OlsParams,
    pub r2: f64,
    pub p_value_slope: f64,
    pub rmse: f64,
    pub mae: f64,
}

/// One fitted region
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResidualRow {
    pub region_id: String,
    pub attribute: f64,
    pub mean_value: f64,
    pub predicted: f64,
    pub residual: f64,
}

/// Regress region attribute on aggregated mean.
///
/// Rows with an absent mean or a non-finite value are left out.
pub fn regress_table(table: &RegionTable) -> Result<(RegressionSummary, Vec<ResidualRow>)> {
    let usable: Vec<(&str, f64, f64)> = table
        .rows
        .iter()
        .filter_map(|r| {
            let mean = r.mean_value?;
            (mean.is_finite() && r.attribute.is_finite()).then_some((r.region_id.as_str(), r.attribute, mean))
        })
        .collect();

    let x: Vec<f64> = usable.iter().map(|u| u.2).collect();
    let y: Vec<f64> = usable.iter().map(|u| u.1).collect();
    let fit = ols(&x, &y)?;

    let residuals = usable
        .iter()
        .zip(fit.fitted.iter().zip(&fit.residuals))
        .map(|(&(id, attribute, mean_value), (&predicted, &residual))| ResidualRow {
            region_id: id.to_string(),
            attribute,
            mean_value,
            predicted,
            residual,
        })
        .collect();

    let summary = RegressionSummary {
        rows_before: table.len(),
        rows_used: usable.len(),
        n: fit.n(),
        model: "OLS".into(),
        formula: "attribute ~ mean_value".into(),
        params: OlsParams {
            intercept: fit.intercept,
            slope: fit.slope,
        },
        r2: fit.r2,
        p_value_slope: fit.p_value_slope,
        rmse: fit.rmse,
        mae: fit.mae,
    };
    Ok((summary, residuals))
}

/// P(|T| >= |t|) for Student's t with `df` degrees of freedom
fn student_t_two_sided(t: f64, df: f64) -> f64 {
    if !t.is_finite() {
        return 0.0;
    }
    regularized_beta(df / 2.0, 0.5, df / (df + t * t))
}

/// Regularized incomplete beta I_x(a, b)
fn regularized_beta(a: f64, b: f64, x: f64) -> f64 {
    if x <= 0.0 {
        return 0.0;
    }
    if x >= 1.0 {
        return 1.0;
    }
    let front = (ln_gamma(a + b) - ln_gamma(a) - ln_gamma(b) + a * x.ln() + b * (1.0 - x).ln()).exp();
    if x < (a + 1.0) / (a + b + 2.0) {
        front * beta_continued_fraction(a, b, x) / a
    } else {
        1.0 - front * beta_continued_fraction(b, a, 1.0 - x) / b
    }
}

/// Lentz evaluation of the incomplete beta continued fraction
fn beta_continued_fraction(a: f64, b: f64, x: f64) -> f64 {
    const MAX_ITER: usize = 300;
    const EPS: f64 = 3e-14;
    const FPMIN: f64 = 1e-300;

    let guard = |v: f64| if v.abs() < FPMIN { FPMIN } else { v };

    let (qab, qap, qam) = (a + b, a + 1.0, a - 1.0);
    let mut c = 1.0;
    let mut d = 1.0 / guard(1.0 - qab * x / qap);
    let mut h = d;

    for m in 1..=MAX_ITER {
        let m = m as f64;
        let m2 = 2.0 * m;

        let aa = m * (b - m) * x / ((qam + m2) * (a + m2));
        d = 1.0 / guard(1.0 + aa * d);
        c = guard(1.0 + aa / c);
        h *= d * c;

        let aa = -(a + m) * (qab + m) * x / ((a + m2) * (qap + m2));
        d = 1.0 / guard(1.0 + aa * d);
        c = guard(1.0 + aa / c);
        let delta = d * c;
        h *= delta;

        if (delta - 1.0).abs() < EPS {
            break;
        }
    }
    h
}

/// Lanczos approximation of ln Γ(x) for x > 0
fn ln_gamma(x: f64) -> f64 {
    const G: f64 = 7.0;
    const COEF: [f64; 9] = [
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
        // Reflection
        let pi = std::f64::consts::PI;
        return (pi / (pi * x).sin()).ln() - ln_gamma(1.0 - x);
    }
    let x = x - 1.0;
    let mut sum = COEF[0];
    for (i, &c) in COEF.iter().enumerate().skip(1) {
        sum += c / (x + i as f64);
    }
    let t = x + G + 0.5;
    0.5 * (2.0 * std::f64::consts::PI).ln() + (x + 0.5) * t.ln() - t + sum.ln()
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use idwkit_core::vector::RegionRow;

    #[test]
    fn test_ols_textbook() {
        let x = [1.0, 2.0, 3.0, 4.0, 5.0];
        let y = [2.0, 4.0, 5.0, 4.0, 5.0];
        let fit = ols(&x, &y).unwrap();

        assert_relative_eq!(fit.slope, 0.6, epsilon = 1e-12);
        assert_relative_eq!(fit.intercept, 2.2, epsilon = 1e-12);
        assert_relative_eq!(fit.r2, 0.6, epsilon = 1e-12);
        assert_relative_eq!(fit.rmse, (2.4f64 / 5.0).sqrt(), epsilon = 1e-12);
        assert_relative_eq!(fit.mae, 0.64, epsilon = 1e-12);
        assert_relative_eq!(fit.p_value_slope, 0.124027, epsilon = 1e-5);
        assert_relative_eq!(fit.residuals[0], -0.8, epsilon = 1e-12);
    }

    #[test]
    fn test_ols_perfect_line() {
        let x = [0.0, 1.0, 2.0, 3.0];
        let y = [1.0, 3.0, 5.0, 7.0];
        let fit = ols(&x, &y).unwrap();
        assert_relative_eq!(fit.slope, 2.0);
        assert_relative_eq!(fit.intercept, 1.0);
        assert_relative_eq!(fit.r2, 1.0);
        assert!(fit.p_value_slope < 1e-12);
    }

    #[test]
    fn test_ols_needs_three_rows() {
        assert!(ols(&[1.0, 2.0], &[1.0, 2.0]).is_err());
        assert!(ols(&[1.0, 1.0, 1.0], &[1.0, 2.0, 3.0]).is_err());
    }

    #[test]
    fn test_t_distribution_reference_values() {
        // df = 1 is Cauchy: P(|T| >= 1) = 0.5
        assert_relative_eq!(student_t_two_sided(1.0, 1.0), 0.5, epsilon = 1e-10);
        assert_relative_eq!(student_t_two_sided(0.0, 7.0), 1.0, epsilon = 1e-12);
        assert_relative_eq!(ln_gamma(5.0), 24.0f64.ln(), epsilon = 1e-12);
    }

    #[test]
    fn test_regress_table_skips_absent_means() {
        let mk = |id: &str, attribute: f64, mean: Option<f64>| RegionRow {
            region_id: id.into(),
            attribute,
            mean_value: mean,
        };
        let table = RegionTable {
            rows: vec![
                mk("a", 2.0, Some(1.0)),
                mk("b", 4.0, Some(2.0)),
                mk("gap", 9.0, None),
                mk("c", 5.0, Some(3.0)),
                mk("nan", f64::NAN, Some(3.5)),
                mk("d", 4.0, Some(4.0)),
                mk("e", 5.0, Some(5.0)),
            ],
        };
        let (summary, residuals) = regress_table(&table).unwrap();

        assert_eq!(summary.rows_before, 7);
        assert_eq!(summary.rows_used, 5);
        assert_eq!(summary.n, 5);
        assert_eq!(summary.model, "OLS");
        assert_relative_eq!(summary.params.slope, 0.6, epsilon = 1e-12);
        assert_eq!(residuals.len(), 5);
        assert_eq!(residuals[2].region_id, "c");
        assert_relative_eq!(residuals[2].predicted, 4.0, epsilon = 1e-12);
    }
}
