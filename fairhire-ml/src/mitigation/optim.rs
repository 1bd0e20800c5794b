//! Adam over flat parameter vectors with a staircase exponential learning-rate decay.

use ndarray::Array1;
use serde::{Deserialize, Serialize};

/// Staircase schedule: `lr0 * rate^(step / steps)`.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct ExponentialDecay {
    pub initial: f64,
    pub rate: f64,
    pub steps: usize,
}

impl ExponentialDecay {
    pub fn lr_at(&self, step: u64) -> f64 {
        let exponent = step / self.steps.max(1) as u64;
        self.initial * self.rate.powi(exponent.min(i32::MAX as u64) as i32)
    }
}

/// Adam optimizer (Adaptive Moment Estimation)
#[derive(Debug, Clone)]
pub struct Adam {
    schedule: ExponentialDecay,
    beta1: f64,
    beta2: f64,
    epsilon: f64,
    t: u64,
    m: Array1<f64>,
    v: Array1<f64>,
}

impl Adam {
    pub fn new(len: usize, schedule: ExponentialDecay) -> Self {
        Self {
            schedule,
            beta1: 0.9,
            beta2: 0.999,
            epsilon: 1e-8,
            t: 0,
            m: Array1::zeros(len),
            v: Array1::zeros(len),
        }
    }

    pub fn lr(&self) -> f64 {
        self.schedule.lr_at(self.t)
    }

    /// Apply one update of `grad` to `params` in place.
    pub fn step(&mut self, params: &mut Array1<f64>, grad: &Array1<f64>) {
        let lr = self.lr();
        self.t += 1;
        let t = self.t.min(i32::MAX as u64) as i32;
        // Bias-corrected step size.
        let lr_t = lr * (1.0 - self.beta2.powi(t)).sqrt() / (1.0 - self.beta1.powi(t));

        let (beta1, beta2) = (self.beta1, self.beta2);
        // m_t = β1 * m_{t-1} + (1 - β1) * g
        self.m.zip_mut_with(grad, |m, g| *m = beta1 * *m + (1.0 - beta1) * g);
        // v_t = β2 * v_{t-1} + (1 - β2) * g²
        self.v.zip_mut_with(grad, |v, g| *v = beta2 * *v + (1.0 - beta2) * g * g);

        // θ_t = θ_{t-1} - lr_t * m_t / (√v_t + ε)
        let eps = self.epsilon;
        ndarray::Zip::from(params)
            .and(&self.m)
            .and(&self.v)
            .for_each(|p, m, v| *p -= lr_t * m / (v.sqrt() + eps));
    }
}
