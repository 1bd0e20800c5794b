//! Predictor and adversary networks with hand-written gradients.
//!
//! The predictor is a one-hidden-layer ReLU network with a sigmoid output.
//! The adversary sees only the predictor's logit (squashed through a learned
//! temperature) and the true label, and predicts the protected attribute.

use crate::classifier::TrainedClassifier;
use crate::error::FairnessError;
use crate::features::schema::FeatureRecord;
use ndarray::{Array1, Array2, ArrayView1, ArrayView2, Axis};
use rand::Rng;
use serde::{Deserialize, Serialize};

pub fn sigmoid(x: f64) -> f64 {
    if x >= 0.0 {
        1.0 / (1.0 + (-x).exp())
    } else {
        let e = x.exp();
        e / (1.0 + e)
    }
}

/// Binary cross-entropy on a logit, stable for large magnitudes.
pub fn bce_with_logit(logit: f64, target: f64) -> f64 {
    logit.max(0.0) - logit * target + (-logit.abs()).exp().ln_1p()
}

fn glorot<R: Rng + ?Sized>(rng: &mut R, fan_in: usize, fan_out: usize) -> f64 {
    let limit = (6.0 / (fan_in + fan_out) as f64).sqrt();
    rng.gen_range(-limit..limit)
}

/// Intermediate values of a predictor forward pass.
#[derive(Debug, Clone)]
pub struct Forward {
    pub z1: Array2<f64>,
    pub a1: Array2<f64>,
    pub logits: Array1<f64>,
}

/// One-hidden-layer classifier over the feature schema.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MlpClassifier {
    w1: Array2<f64>,
    b1: Array1<f64>,
    w2: Array1<f64>,
    b2: f64,
}

impl MlpClassifier {
    /// Glorot-uniform weights, zero biases.
    pub fn new<R: Rng + ?Sized>(n_inputs: usize, hidden: usize, rng: &mut R) -> Self {
        let w1 = Array2::from_shape_simple_fn((n_inputs, hidden), || glorot(rng, n_inputs, hidden));
        let w2 = Array1::from_shape_simple_fn(hidden, || glorot(rng, hidden, 1));
        Self {
            w1,
            b1: Array1::zeros(hidden),
            w2,
            b2: 0.0,
        }
    }

    pub fn n_inputs(&self) -> usize {
        self.w1.nrows()
    }

    pub fn hidden_units(&self) -> usize {
        self.w1.ncols()
    }

    pub fn param_count(&self) -> usize {
        self.w1.len() + self.b1.len() + self.w2.len() + 1
    }

    pub fn forward(&self, x: &ArrayView2<f64>) -> Forward {
        let z1 = x.dot(&self.w1) + &self.b1;
        let a1 = z1.mapv(|v| v.max(0.0));
        let logits = a1.dot(&self.w2) + self.b2;
        Forward { z1, a1, logits }
    }

    pub fn logit(&self, x: &ArrayView1<f64>) -> f64 {
        let a1 = (x.dot(&self.w1) + &self.b1).mapv(|v| v.max(0.0));
        a1.dot(&self.w2) + self.b2
    }

    /// Flat parameter gradient for upstream gradient `dlogits` on the batch logits.
    pub fn backward(&self, x: &ArrayView2<f64>, fwd: &Forward, dlogits: &Array1<f64>) -> Array1<f64> {
        let gw2 = fwd.a1.t().dot(dlogits);
        let gb2 = dlogits.sum();
        let mut dz1 = dlogits
            .view()
            .insert_axis(Axis(1))
            .dot(&self.w2.view().insert_axis(Axis(0)));
        dz1.zip_mut_with(&fwd.z1, |d, z| {
            if *z <= 0.0 {
                *d = 0.0;
            }
        });
        let gw1 = x.t().dot(&dz1);
        let gb1 = dz1.sum_axis(Axis(0));

        gw1.iter()
            .chain(gb1.iter())
            .chain(gw2.iter())
            .copied()
            .chain(std::iter::once(gb2))
            .collect()
    }

    /// Parameters in `[w1, b1, w2, b2]` order, matching [`Self::backward`].
    pub fn to_flat(&self) -> Array1<f64> {
        self.w1
            .iter()
            .chain(self.b1.iter())
            .chain(self.w2.iter())
            .copied()
            .chain(std::iter::once(self.b2))
            .collect()
    }

    pub fn load_flat(&mut self, flat: &Array1<f64>) {
        let mut values = flat.iter().copied();
        for (slot, v) in self
            .w1
            .iter_mut()
            .chain(self.b1.iter_mut())
            .chain(self.w2.iter_mut())
            .zip(&mut values)
        {
            *slot = v;
        }
        if let Some(v) = values.next() {
            self.b2 = v;
        }
    }

    pub fn is_finite(&self) -> bool {
        self.to_flat().iter().all(|v| v.is_finite())
    }

    /// Check that the weights accept `n_inputs` features and agree on the
    /// hidden width, so no forward pass can hit a shape mismatch.
    pub fn validate(&self, n_inputs: usize) -> Result<(), FairnessError> {
        if self.n_inputs() != n_inputs {
            return Err(FairnessError::invalid_input(format!(
                "classifier expects {} inputs, feature schema has {n_inputs}",
                self.n_inputs()
            )));
        }
        let hidden = self.hidden_units();
        if hidden == 0 || self.b1.len() != hidden || self.w2.len() != hidden {
            return Err(FairnessError::invalid_input(format!(
                "inconsistent hidden layer: w1 has {hidden} columns, b1 has {}, w2 has {}",
                self.b1.len(),
                self.w2.len()
            )));
        }
        if !self.is_finite() {
            return Err(FairnessError::invalid_input("classifier has non-finite weights"));
        }
        Ok(())
    }
}

impl TrainedClassifier for MlpClassifier {
    fn predict_proba(&self, record: &FeatureRecord) -> f64 {
        let x = ArrayView1::from(&record.values()[..]);
        let p = sigmoid(self.logit(&x));
        if p.is_finite() { p } else { 0.0 }
    }
}

/// Output of an adversary pass on one batch.
#[derive(Debug, Clone)]
pub struct AdversaryPass {
    pub loss: f64,
    /// Gradient of the adversary loss w.r.t. the adversary's own parameters.
    pub grad: Array1<f64>,
    /// Gradient of the adversary loss w.r.t. the predictor logits.
    pub dlogits: Array1<f64>,
}

/// Logistic adversary over `[s, s·y, s·(1−y)]` with `s = σ((1+|c|)·logit)`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Adversary {
    c: f64,
    w: Array1<f64>,
    b: f64,
}

impl Adversary {
    pub const PARAMS: usize = 5;

    pub fn new<R: Rng + ?Sized>(rng: &mut R) -> Self {
        Self {
            c: 1.0,
            w: Array1::from_shape_simple_fn(3, || glorot(rng, 3, 1)),
            b: 0.0,
        }
    }

    /// Loss and gradients for predicting `protected` from the predictor's `logits`.
    pub fn pass(&self, logits: &Array1<f64>, labels: &Array1<f64>, protected: &Array1<f64>) -> AdversaryPass {
        let n = logits.len().max(1) as f64;
        let k = 1.0 + self.c.abs();
        let mut loss = 0.0;
        let mut grad = Array1::zeros(Self::PARAMS);
        let mut dlogits = Array1::zeros(logits.len());

        for i in 0..logits.len() {
            let (l, y, z) = (logits[i], labels[i], protected[i]);
            let s = sigmoid(k * l);
            let u = [s, s * y, s * (1.0 - y)];
            let adv_logit = self.w[0] * u[0] + self.w[1] * u[1] + self.w[2] * u[2] + self.b;
            loss += bce_with_logit(adv_logit, z);

            let d = (sigmoid(adv_logit) - z) / n;
            grad[1] += d * u[0];
            grad[2] += d * u[1];
            grad[3] += d * u[2];
            grad[4] += d;

            let ds = d * (self.w[0] + self.w[1] * y + self.w[2] * (1.0 - y));
            let s_prime = s * (1.0 - s);
            grad[0] += ds * s_prime * l * self.c.signum();
            dlogits[i] = ds * s_prime * k;
        }

        AdversaryPass {
            loss: loss / n,
            grad,
            dlogits,
        }
    }

    pub fn to_flat(&self) -> Array1<f64> {
        ndarray::array![self.c, self.w[0], self.w[1], self.w[2], self.b]
    }

    pub fn load_flat(&mut self, flat: &Array1<f64>) {
        if flat.len() == Self::PARAMS {
            self.c = flat[0];
            self.w.assign(&flat.slice(ndarray::s![1..4]));
            self.b = flat[4];
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::features::schema::FEATURE_WIDTH;
    use ndarray::array;
    use rand::SeedableRng;
    use rand::rngs::StdRng;

    fn numeric_grad(f: impl Fn(&Array1<f64>) -> f64, at: &Array1<f64>) -> Array1<f64> {
        let h = 1e-6;
        Array1::from_shape_fn(at.len(), |i| {
            let mut plus = at.clone();
            let mut minus = at.clone();
            plus[i] += h;
            minus[i] -= h;
            (f(&plus) - f(&minus)) / (2.0 * h)
        })
    }

    #[test]
    fn test_sigmoid_and_bce_stable() {
        assert!((sigmoid(0.0) - 0.5).abs() < 1e-12);
        assert!(sigmoid(-800.0) >= 0.0);
        assert!(sigmoid(800.0) <= 1.0);
        assert!(bce_with_logit(800.0, 1.0).abs() < 1e-12);
        assert!((bce_with_logit(0.0, 1.0) - 2f64.ln()).abs() < 1e-12);
    }

    #[test]
    fn test_predictor_gradient_matches_numeric() {
        let mut rng = StdRng::seed_from_u64(1);
        let model = MlpClassifier::new(3, 4, &mut rng);
        let x = array![[0.5, -1.0, 2.0], [1.5, 0.3, -0.7]];
        let y = array![1.0, 0.0];

        let loss = |flat: &Array1<f64>| {
            let mut m = model.clone();
            m.load_flat(flat);
            let fwd = m.forward(&x.view());
            fwd.logits
                .iter()
                .zip(y.iter())
                .map(|(l, t)| bce_with_logit(*l, *t))
                .sum::<f64>()
                / 2.0
        };

        let fwd = model.forward(&x.view());
        let dlogits = (fwd.logits.mapv(sigmoid) - &y) / 2.0;
        let analytic = model.backward(&x.view(), &fwd, &dlogits);
        let numeric = numeric_grad(loss, &model.to_flat());
        for (a, n) in analytic.iter().zip(numeric.iter()) {
            assert!((a - n).abs() < 1e-5, "analytic {a} vs numeric {n}");
        }
    }

    #[test]
    fn test_adversary_gradients_match_numeric() {
        let mut rng = StdRng::seed_from_u64(2);
        let adversary = Adversary::new(&mut rng);
        let logits = array![0.4, -1.2, 2.0];
        let labels = array![1.0, 0.0, 1.0];
        let protected = array![0.0, 1.0, 1.0];

        let pass = adversary.pass(&logits, &labels, &protected);

        let by_params = numeric_grad(
            |flat| {
                let mut a = adversary.clone();
                a.load_flat(flat);
                a.pass(&logits, &labels, &protected).loss
            },
            &adversary.to_flat(),
        );
        for (a, n) in pass.grad.iter().zip(by_params.iter()) {
            assert!((a - n).abs() < 1e-5, "param grad {a} vs {n}");
        }

        let by_logits = numeric_grad(|l| adversary.pass(l, &labels, &protected).loss, &logits);
        for (a, n) in pass.dlogits.iter().zip(by_logits.iter()) {
            assert!((a - n).abs() < 1e-5, "logit grad {a} vs {n}");
        }
    }

    #[test]
    fn test_flat_round_trip() {
        let mut rng = StdRng::seed_from_u64(3);
        let model = MlpClassifier::new(FEATURE_WIDTH, 8, &mut rng);
        let mut copy = MlpClassifier::new(FEATURE_WIDTH, 8, &mut rng);
        assert_ne!(model, copy);
        copy.load_flat(&model.to_flat());
        assert_eq!(model, copy);
        assert_eq!(model.param_count(), 12 * 8 + 8 + 8 + 1);
    }

    #[test]
    fn test_validate_rejects_mismatched_shapes() {
        let mut rng = StdRng::seed_from_u64(4);
        assert!(MlpClassifier::new(FEATURE_WIDTH, 4, &mut rng).validate(FEATURE_WIDTH).is_ok());
        assert!(MlpClassifier::new(FEATURE_WIDTH - 1, 4, &mut rng).validate(FEATURE_WIDTH).is_err());

        let mut short_bias = MlpClassifier::new(FEATURE_WIDTH, 4, &mut rng);
        short_bias.b1 = Array1::zeros(3);
        assert!(short_bias.validate(FEATURE_WIDTH).is_err());

        let mut short_output = MlpClassifier::new(FEATURE_WIDTH, 4, &mut rng);
        short_output.w2 = Array1::zeros(5);
        assert!(short_output.validate(FEATURE_WIDTH).is_err());

        let mut nan = MlpClassifier::new(FEATURE_WIDTH, 4, &mut rng);
        nan.b2 = f64::NAN;
        assert!(nan.validate(FEATURE_WIDTH).is_err());
    }
}
