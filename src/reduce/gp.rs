//! Gaussian-process regression over (time, value) pairs.
//!
//! The covariance is SE×Linear + SE×RationalQuadratic + Periodic plus white
//! observation noise, evaluated on centred/scaled inputs and standardised
//! outputs. Hyperparameters are chosen from a small fixed grid by maximising
//! the log marginal likelihood, so the result is deterministic.

use std::f64::consts::PI;

use serde_json::json;

use super::regress::time_series;
use super::{ReduceScope, bind_opvar};
use crate::alist::{Alist, Attr, Value};
use crate::uncertainty;

const SE_LENGTHSCALES: [f64; 4] = [0.5, 1.0, 2.0, 4.0];
const PERIODS: [f64; 3] = [0.5, 1.0, 2.0];
const JITTER: f64 = 1e-8;

/// Composite covariance function.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Kernel {
    pub se_variance: f64,
    pub se_lengthscale: f64,
    pub linear_variance: f64,
    pub rq_lengthscale: f64,
    pub rq_alpha: f64,
    pub periodic_variance: f64,
    pub periodic_lengthscale: f64,
    pub period: f64,
    pub noise_variance: f64,
}

impl Default for Kernel {
    fn default() -> Self {
        Self {
            se_variance: 1.0,
            se_lengthscale: 1.0,
            linear_variance: 1.0,
            rq_lengthscale: 1.0,
            rq_alpha: 1.0,
            periodic_variance: 0.1,
            periodic_lengthscale: 1.0,
            period: 1.0,
            noise_variance: 0.1,
        }
    }
}

impl Kernel {
    /// Noise-free covariance between two inputs.
    pub fn eval(&self, a: f64, b: f64) -> f64 {
        let r2 = (a - b).powi(2);
        let se = self.se_variance * (-r2 / (2.0 * self.se_lengthscale.powi(2))).exp();
        let linear = self.linear_variance * a * b;
        let rq = (1.0 + r2 / (2.0 * self.rq_alpha * self.rq_lengthscale.powi(2))).powf(-self.rq_alpha);
        let periodic = self.periodic_variance
            * (-2.0 * (PI * (a - b).abs() / self.period).sin().powi(2) / self.periodic_lengthscale.powi(2)).exp();
        se * linear + se * rq + periodic
    }

    fn grid() -> impl Iterator<Item = Kernel> {
        SE_LENGTHSCALES.into_iter().flat_map(|l| {
            PERIODS.into_iter().map(move |p| Kernel {
                se_lengthscale: l,
                rq_lengthscale: l,
                period: p,
                ..Kernel::default()
            })
        })
    }
}

/// A conditioned Gaussian process.
#[derive(Debug, Clone)]
pub struct GaussianProcess {
    pub kernel: Kernel,
    xs: Vec<f64>,
    chol: Vec<Vec<f64>>,
    alpha: Vec<f64>,
    log_marginal_likelihood: f64,
}

impl GaussianProcess {
    /// Condition on observations. `None` if the covariance is not positive
    /// definite.
    pub fn fit(xs: &[f64], ys: &[f64], kernel: Kernel) -> Option<Self> {
        if xs.is_empty() || xs.len() != ys.len() {
            return None;
        }
        let n = xs.len();
        let mut k = vec![vec![0.0; n]; n];
        for i in 0..n {
            for j in 0..=i {
                let v = kernel.eval(xs[i], xs[j]);
                k[i][j] = v;
                k[j][i] = v;
            }
            k[i][i] += kernel.noise_variance + JITTER;
        }
        let chol = cholesky(&k)?;
        let alpha = backward(&chol, &forward(&chol, ys));
        let data_fit: f64 = ys.iter().zip(&alpha).map(|(y, a)| y * a).sum();
        let log_det: f64 = (0..n).map(|i| chol[i][i].ln()).sum();
        let log_marginal_likelihood = -0.5 * data_fit - log_det - 0.5 * n as f64 * (2.0 * PI).ln();
        Some(Self {
            kernel,
            xs: xs.to_vec(),
            chol,
            alpha,
            log_marginal_likelihood,
        })
    }

    /// Fit every kernel on the hyperparameter grid and keep the most likely.
    pub fn fit_best(xs: &[f64], ys: &[f64]) -> Option<Self> {
        Kernel::grid()
            .filter_map(|kernel| Self::fit(xs, ys, kernel))
            .filter(|gp| gp.log_marginal_likelihood.is_finite())
            .max_by(|a, b| a.log_marginal_likelihood.total_cmp(&b.log_marginal_likelihood))
    }

    pub fn log_marginal_likelihood(&self) -> f64 {
        self.log_marginal_likelihood
    }

    /// Predictive mean and variance of the latent function at `x`.
    pub fn predict(&self, x: f64) -> (f64, f64) {
        let k_star: Vec<f64> = self.xs.iter().map(|xi| self.kernel.eval(*xi, x)).collect();
        let mean = k_star.iter().zip(&self.alpha).map(|(k, a)| k * a).sum();
        let v = forward(&self.chol, &k_star);
        let variance = self.kernel.eval(x, x) - v.iter().map(|vi| vi * vi).sum::<f64>();
        (mean, variance.max(0.0))
    }
}

fn cholesky(a: &[Vec<f64>]) -> Option<Vec<Vec<f64>>> {
    let n = a.len();
    let mut l = vec![vec![0.0; n]; n];
    for i in 0..n {
        for j in 0..=i {
            let sum = a[i][j] - (0..j).map(|k| l[i][k] * l[j][k]).sum::<f64>();
            if i == j {
                if sum <= 0.0 || !sum.is_finite() {
                    return None;
                }
                l[i][i] = sum.sqrt();
            } else {
                l[i][j] = sum / l[j][j];
            }
        }
    }
    Some(l)
}

/// Solve `L z = b` for lower-triangular `L`.
fn forward(l: &[Vec<f64>], b: &[f64]) -> Vec<f64> {
    let mut z = vec![0.0; b.len()];
    for i in 0..b.len() {
        let sum: f64 = (0..i).map(|k| l[i][k] * z[k]).sum();
        z[i] = (b[i] - sum) / l[i][i];
    }
    z
}

/// Solve `Lᵀ x = z` for lower-triangular `L`.
fn backward(l: &[Vec<f64>], z: &[f64]) -> Vec<f64> {
    let n = z.len();
    let mut x = vec![0.0; n];
    for i in (0..n).rev() {
        let sum: f64 = (i + 1..n).map(|k| l[k][i] * x[k]).sum();
        x[i] = (z[i] - sum) / l[i][i];
    }
    x
}

fn mean_and_scale(values: &[f64]) -> (f64, f64) {
    let n = values.len() as f64;
    let mean = values.iter().sum::<f64>() / n;
    let std = (values.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / n).sqrt();
    (mean, if std > 0.0 { std } else { 1.0 })
}

/// Gaussian-process extrapolation to the parent's time. The predictive
/// standard deviation, relative to the prediction, becomes the coverage.
pub fn reduce_gpregress(parent: &mut Alist, children: &[Alist], scope: &mut ReduceScope<'_>) -> bool {
    let Some(x_predict) = parent.instantiation_value(&Attr::Time).and_then(Value::as_number) else {
        return false;
    };
    let points = time_series(children);
    if points.len() < 2 {
        return false;
    }
    let (raw_x, raw_y): (Vec<f64>, Vec<f64>) = points.iter().copied().unzip();
    let (x_mean, x_scale) = mean_and_scale(&raw_x);
    let (y_mean, y_scale) = mean_and_scale(&raw_y);
    let xs: Vec<f64> = raw_x.iter().map(|x| (x - x_mean) / x_scale).collect();
    let ys: Vec<f64> = raw_y.iter().map(|y| (y - y_mean) / y_scale).collect();

    let Some(gp) = GaussianProcess::fit_best(&xs, &ys) else {
        tracing::debug!(node = %parent.id, "gaussian process fit failed");
        return false;
    };
    let (mean, variance) = gp.predict((x_predict - x_mean) / x_scale);
    let y_predict = mean * y_scale + y_mean;
    let stdev = variance.sqrt() * y_scale;
    if !y_predict.is_finite() || !bind_opvar(parent, y_predict) {
        return false;
    }

    let relative = if y_predict != 0.0 { stdev / y_predict.abs() } else { 0.0 };
    parent.cov = uncertainty::inflate(relative, children.len(), scope.expected_children);
    parent.fnplot = Some(json!({
        "kernel": {
            "se_lengthscale": gp.kernel.se_lengthscale,
            "period": gp.kernel.period,
            "log_marginal_likelihood": gp.log_marginal_likelihood(),
        },
        "data": points.iter().map(|(x, y)| [*x, *y]).collect::<Vec<_>>(),
        "prediction": [x_predict, y_predict],
        "stdev": stdev,
    }));
    tracing::debug!(node = %parent.id, y_predict, stdev, "gaussian process extrapolation");
    true
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph::InferenceGraph;
    use crate::reduce::fixtures::{child, parent, series};

    fn gpregress(p: &mut Alist, children: &[Alist]) -> bool {
        let mut graph = InferenceGraph::new();
        let mut scope = ReduceScope {
            graph: &mut graph,
            expected_children: children.len(),
        };
        reduce_gpregress(p, children, &mut scope)
    }

    #[test]
    fn cholesky_solves_spd_system() {
        let a = vec![vec![4.0, 2.0], vec![2.0, 3.0]];
        let l = cholesky(&a).unwrap();
        let x = backward(&l, &forward(&l, &[2.0, 1.0]));
        assert!((4.0 * x[0] + 2.0 * x[1] - 2.0).abs() < 1e-12);
        assert!((2.0 * x[0] + 3.0 * x[1] - 1.0).abs() < 1e-12);
        assert!(cholesky(&[vec![-1.0]]).is_none());
    }

    #[test]
    fn kernel_is_symmetric_and_positive_on_diagonal() {
        let k = Kernel::default();
        assert_eq!(k.eval(0.3, -1.2), k.eval(-1.2, 0.3));
        assert!(k.eval(0.7, 0.7) > 0.0);
    }

    #[test]
    fn predicts_close_to_observations_in_sample() {
        let xs = [-1.0, -0.5, 0.0, 0.5, 1.0];
        let ys = [-1.0, -0.5, 0.0, 0.5, 1.0];
        let gp = GaussianProcess::fit_best(&xs, &ys).unwrap();
        let (mean, variance) = gp.predict(0.25);
        assert!((mean - 0.25).abs() < 0.3, "{mean}");
        assert!(variance >= 0.0);
    }

    #[test]
    fn fixture_series_extrapolates_finitely() {
        let mut p = parent("gpregress");
        assert!(gpregress(&mut p, &series()));
        let y = p.instantiation_value(&Attr::Object).and_then(Value::as_number).unwrap();
        assert!(y.is_finite() && y > 100.0 && y < 170.0, "{y}");
        assert!(p.cov.is_finite() && p.cov > 0.0);
        assert!(p.fnplot.as_ref().is_some_and(|fp| fp["stdev"].as_f64().is_some()));
    }

    #[test]
    fn constant_series_predicts_the_constant() {
        let children: Vec<Alist> = (2010..2015).map(|t| child(t, "50")).collect();
        let mut p = parent("gpregress");
        assert!(gpregress(&mut p, &children));
        let y = p.instantiation_value(&Attr::Object).and_then(Value::as_number).unwrap();
        assert!((y - 50.0).abs() < 1e-9);
    }

    #[test]
    fn needs_two_points() {
        let mut p = parent("gpregress");
        assert!(!gpregress(&mut p, &[child(2015, "128")]));
    }
}
