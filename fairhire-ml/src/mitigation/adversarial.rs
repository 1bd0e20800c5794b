//! In-processing mitigation by adversarial debiasing.
//!
//! A predictor learns the hiring label while an adversary tries to recover the
//! protected attribute from the predictor's output. Each predictor update
//! removes the component of its gradient that would help the adversary, then
//! subtracts the adversary gradient scaled by `adversary_loss_weight`.

use crate::classifier::TrainedClassifier;
use crate::config::DebiasConfig;
use crate::data::dataset::{LabeledDataset, ProtectedAttribute};
use crate::error::{ConvergenceWarning, FairnessError};
use crate::features::schema::{FEATURE_WIDTH, FeatureRecord};
use crate::mitigation::network::{Adversary, MlpClassifier, bce_with_logit, sigmoid};
use crate::mitigation::optim::{Adam, ExponentialDecay};
use crate::training::{
    AnomalyDetectionCallback, CallbackAction, ConvergenceCallback, SeedManager, TrainingCallback,
    TrainingMetrics,
};
use ndarray::{Array1, Array2};
use rand::Rng;
use rand::seq::SliceRandom;
use serde::{Deserialize, Serialize};
use std::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// One mini-batch in array form.
#[derive(Debug, Clone)]
pub struct Batch {
    pub features: Array2<f64>,
    pub labels: Array1<f64>,
    pub protected: Array1<f64>,
    pub weights: Array1<f64>,
}

impl Batch {
    /// Gather `indices` of `dataset`, with `attribute` as the adversary target.
    pub fn gather(dataset: &LabeledDataset, indices: &[usize], attribute: ProtectedAttribute) -> Self {
        let features = dataset.features();
        let labels = dataset.labels();
        let protected = dataset.protected();
        let weights = dataset.weights();
        Self {
            features: Array2::from_shape_fn((indices.len(), FEATURE_WIDTH), |(r, c)| {
                features[indices[r]].values()[c]
            }),
            labels: indices.iter().map(|&i| f64::from(labels[i])).collect(),
            protected: indices
                .iter()
                .map(|&i| f64::from(protected[i].get(attribute)))
                .collect(),
            weights: indices.iter().map(|&i| weights[i]).collect(),
        }
    }

    pub fn len(&self) -> usize {
        self.labels.len()
    }

    pub fn is_empty(&self) -> bool {
        self.labels.is_empty()
    }
}

/// Losses of one optimization step.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct StepLosses {
    pub classifier: f64,
    pub adversary: Option<f64>,
}

/// A single optimization step over a batch.
///
/// The epoch loop owns shuffling, convergence and cancellation; implementors
/// own the parameters and their update rule.
pub trait TrainStep {
    type Model;

    fn step(&mut self, batch: &Batch) -> StepLosses;

    /// Copy of the current predictor.
    fn snapshot(&self) -> Self::Model;
}

/// Predictor/adversary pair updated with the projected gradient rule.
#[derive(Debug, Clone)]
pub struct AdversarialGradientStep {
    predictor: MlpClassifier,
    adversary: Adversary,
    predictor_opt: Adam,
    adversary_opt: Adam,
    adversary_loss_weight: f64,
    debias: bool,
}

impl AdversarialGradientStep {
    pub fn new<R: Rng + ?Sized>(config: &DebiasConfig, n_inputs: usize, rng: &mut R) -> Self {
        let predictor = MlpClassifier::new(n_inputs, config.hidden_units, rng);
        let adversary = Adversary::new(rng);
        let schedule = ExponentialDecay {
            initial: config.learning_rate,
            rate: config.lr_decay_rate,
            steps: config.lr_decay_steps,
        };
        Self {
            predictor_opt: Adam::new(predictor.param_count(), schedule),
            adversary_opt: Adam::new(Adversary::PARAMS, schedule),
            predictor,
            adversary,
            adversary_loss_weight: config.adversary_loss_weight,
            debias: config.debias,
        }
    }
}

impl TrainStep for AdversarialGradientStep {
    type Model = MlpClassifier;

    fn step(&mut self, batch: &Batch) -> StepLosses {
        let x = batch.features.view();
        let fwd = self.predictor.forward(&x);
        let total_weight = batch.weights.sum().max(f64::MIN_POSITIVE);

        let mut classifier_loss = 0.0;
        let mut dlogits = Array1::zeros(batch.len());
        for i in 0..batch.len() {
            let (l, y, w) = (fwd.logits[i], batch.labels[i], batch.weights[i]);
            classifier_loss += w * bce_with_logit(l, y);
            dlogits[i] = w * (sigmoid(l) - y) / total_weight;
        }
        classifier_loss /= total_weight;
        let mut grad = self.predictor.backward(&x, &fwd, &dlogits);

        let adversary_loss = if self.debias {
            let pass = self.adversary.pass(&fwd.logits, &batch.labels, &batch.protected);
            let grad_adv = self.predictor.backward(&x, &fwd, &pass.dlogits);

            // Drop the part of the predictor update that would help the adversary.
            let norm = grad_adv.dot(&grad_adv).sqrt();
            if norm > 0.0 {
                let unit = &grad_adv / norm;
                let along = grad.dot(&unit);
                grad.scaled_add(-along, &unit);
            }
            grad.scaled_add(-self.adversary_loss_weight, &grad_adv);

            let mut adv_params = self.adversary.to_flat();
            self.adversary_opt.step(&mut adv_params, &pass.grad);
            self.adversary.load_flat(&adv_params);
            Some(pass.loss)
        } else {
            None
        };

        let mut params = self.predictor.to_flat();
        self.predictor_opt.step(&mut params, &grad);
        self.predictor.load_flat(&params);

        StepLosses {
            classifier: classifier_loss,
            adversary: adversary_loss,
        }
    }

    fn snapshot(&self) -> MlpClassifier {
        self.predictor.clone()
    }
}

/// How a training run ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TrainingStatus {
    /// Ran the full epoch budget.
    Completed,
    /// Stopped at a convergence warning with early stopping enabled.
    StoppedEarly,
    /// Cancellation was requested between epochs.
    Cancelled,
    /// A non-finite loss ended the run.
    Aborted,
}

/// Summary of a training run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TrainingReport {
    pub status: TrainingStatus,
    pub metrics: TrainingMetrics,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub convergence_warning: Option<ConvergenceWarning>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub abort_reason: Option<String>,
    pub seed: Option<u64>,
}

impl TrainingReport {
    pub fn converged(&self) -> bool {
        self.convergence_warning.is_none()
    }
}

/// A trained predictor together with how it was trained.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DebiasedModel {
    pub classifier: MlpClassifier,
    /// `false` for the plain baseline classifier.
    pub debiased: bool,
    pub attribute: ProtectedAttribute,
    pub adversary_loss_weight: f64,
}

impl DebiasedModel {
    /// Predicted labels for every row of `dataset`, row order preserved.
    pub fn predict(&self, dataset: &LabeledDataset) -> Result<LabeledDataset, FairnessError> {
        self.predict_dataset(dataset)
    }
}

impl TrainedClassifier for DebiasedModel {
    fn predict_proba(&self, record: &FeatureRecord) -> f64 {
        self.classifier.predict_proba(record)
    }
}

/// Adversarial debiasing trainer.
#[derive(Debug, Clone)]
pub struct AdversarialDebiaser {
    config: DebiasConfig,
    attribute: ProtectedAttribute,
    cancel: Option<CancellationToken>,
}

impl AdversarialDebiaser {
    /// Debias against gender by default.
    pub fn new(config: DebiasConfig) -> Self {
        Self {
            config,
            attribute: ProtectedAttribute::Gender,
            cancel: None,
        }
    }

    pub fn with_attribute(mut self, attribute: ProtectedAttribute) -> Self {
        self.attribute = attribute;
        self
    }

    /// Check `token` between epochs and stop with the best model so far.
    pub fn with_cancellation(mut self, token: CancellationToken) -> Self {
        self.cancel = Some(token);
        self
    }

    pub fn config(&self) -> &DebiasConfig {
        &self.config
    }

    pub fn attribute(&self) -> ProtectedAttribute {
        self.attribute
    }

    /// Train on `dataset`, honoring its instance weights.
    pub fn fit(&self, dataset: &LabeledDataset) -> Result<(DebiasedModel, TrainingReport), FairnessError> {
        self.check(dataset)?;
        let mut seeds = SeedManager::new(self.config.seed);
        let mut init_rng = seeds.rng("init");
        let step = AdversarialGradientStep::new(&self.config, FEATURE_WIDTH, &mut init_rng);
        let (classifier, report) = self.fit_with(step, dataset, &mut seeds)?;
        let model = DebiasedModel {
            classifier,
            debiased: self.config.debias,
            attribute: self.attribute,
            adversary_loss_weight: if self.config.debias {
                self.config.adversary_loss_weight
            } else {
                0.0
            },
        };
        Ok((model, report))
    }

    /// Run the epoch loop with a caller-supplied step.
    ///
    /// Returns the snapshot with the lowest classifier loss, or the final
    /// state when no epoch produced a finite loss.
    pub fn fit_with<S: TrainStep>(
        &self,
        mut step: S,
        dataset: &LabeledDataset,
        seeds: &mut SeedManager,
    ) -> Result<(S::Model, TrainingReport), FairnessError> {
        self.check(dataset)?;
        let started = Instant::now();
        let mut shuffle_rng = seeds.rng("shuffle");
        let mut order: Vec<usize> = (0..dataset.len()).collect();

        let mut metrics = TrainingMetrics::default();
        // Anomaly detection runs first so a NaN epoch never reaches convergence tracking.
        let mut callbacks: Vec<Box<dyn TrainingCallback>> = vec![
            Box::new(AnomalyDetectionCallback),
            Box::new(ConvergenceCallback::new(self.config.patience, self.config.min_delta)),
        ];
        let mut best: Option<S::Model> = None;
        let mut status = TrainingStatus::Completed;
        let mut convergence_warning = None;
        let mut abort_reason = None;

        info!(
            rows = dataset.len(),
            epochs = self.config.num_epochs,
            batch_size = self.config.batch_size,
            debias = self.config.debias,
            attribute = %self.attribute,
            "Starting adversarial training"
        );

        for epoch in 1..=self.config.num_epochs {
            if self.cancel.as_ref().is_some_and(|t| t.is_cancelled()) {
                info!(epoch, "Training cancelled");
                status = TrainingStatus::Cancelled;
                break;
            }

            order.shuffle(&mut shuffle_rng);
            let mut classifier_sum = 0.0;
            let mut adversary_sum = 0.0;
            for chunk in order.chunks(self.config.batch_size) {
                let batch = Batch::gather(dataset, chunk, self.attribute);
                let losses = step.step(&batch);
                let n = batch.len() as f64;
                classifier_sum += losses.classifier * n;
                adversary_sum += losses.adversary.unwrap_or(0.0) * n;
            }
            let rows = dataset.len() as f64;
            let epoch_loss = classifier_sum / rows;
            let adversary_loss = self.config.debias.then_some(adversary_sum / rows);

            if metrics.record_epoch(epoch_loss, adversary_loss) {
                best = Some(step.snapshot());
            }
            debug!(epoch, loss = epoch_loss, adversary_loss, "Epoch finished");

            let mut stop = false;
            for callback in &mut callbacks {
                match callback.on_epoch_end(epoch, &metrics) {
                    CallbackAction::Continue => {}
                    CallbackAction::Abort(reason) => {
                        warn!(epoch, %reason, "Training aborted");
                        status = TrainingStatus::Aborted;
                        abort_reason = Some(reason);
                        stop = true;
                        break;
                    }
                    CallbackAction::Stalled(warning) => {
                        warn!(%warning, "Adversarial training did not converge");
                        convergence_warning.get_or_insert(warning);
                        if self.config.early_stopping {
                            status = TrainingStatus::StoppedEarly;
                            stop = true;
                        }
                    }
                }
            }
            if stop {
                break;
            }
        }

        metrics.total_training_time_secs = started.elapsed().as_secs_f64();
        info!(
            epochs = metrics.epochs_completed,
            best_epoch = metrics.best_epoch,
            best_loss = metrics.best_loss,
            ?status,
            "Adversarial training finished"
        );

        let model = best.unwrap_or_else(|| step.snapshot());
        Ok((
            model,
            TrainingReport {
                status,
                metrics,
                convergence_warning,
                abort_reason,
                seed: self.config.seed,
            },
        ))
    }

    fn check(&self, dataset: &LabeledDataset) -> Result<(), FairnessError> {
        if dataset.is_empty() {
            return Err(FairnessError::dataset("cannot train on an empty dataset"));
        }
        if self.config.batch_size == 0 {
            return Err(FairnessError::Config("debias.batch_size must be > 0".into()));
        }
        let positives = dataset.labels().iter().filter(|&&l| l == 1).count();
        if positives == 0 || positives == dataset.len() {
            info!(rows = dataset.len(), positives, "Training labels contain a single class");
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::dataset::ProtectedValues;

    fn config(epochs: usize) -> DebiasConfig {
        DebiasConfig {
            num_epochs: epochs,
            batch_size: 16,
            hidden_units: 8,
            learning_rate: 0.01,
            seed: Some(11),
            ..DebiasConfig::default()
        }
    }

    /// Label follows the first feature; gender is unrelated noise.
    fn separable(n: usize) -> LabeledDataset {
        let mut features = Vec::new();
        let mut labels = Vec::new();
        let mut protected = Vec::new();
        for i in 0..n {
            let x = if i % 2 == 0 { 1.5 } else { -1.5 };
            let mut values = [0.0; FEATURE_WIDTH];
            values[0] = x + (i % 7) as f64 * 0.05;
            features.push(FeatureRecord::from_values(values));
            labels.push(u8::from(x > 0.0));
            protected.push(ProtectedValues {
                gender: u8::from(i % 3 == 0),
                age_above_40: u8::from(i % 5 == 0),
            });
        }
        LabeledDataset::new(features, labels, protected, None).unwrap()
    }

    #[test]
    fn test_batch_gather() {
        let ds = separable(6);
        let batch = Batch::gather(&ds, &[0, 3], ProtectedAttribute::Gender);
        assert_eq!(batch.len(), 2);
        assert_eq!(batch.labels.to_vec(), vec![1.0, 0.0]);
        assert_eq!(batch.protected.to_vec(), vec![1.0, 1.0]);
        assert_eq!(batch.features.dim(), (2, FEATURE_WIDTH));
    }

    #[test]
    fn test_fit_learns_separable_labels() {
        let ds = separable(120);
        let (model, report) = AdversarialDebiaser::new(config(30)).fit(&ds).unwrap();
        let predicted = model.predict(&ds).unwrap();
        let correct = predicted
            .labels()
            .iter()
            .zip(ds.labels())
            .filter(|(p, t)| p == t)
            .count();
        assert!(correct as f64 / ds.len() as f64 > 0.9, "accuracy {correct}/120");
        assert_eq!(report.metrics.epochs_completed, report.metrics.loss_history.len());
        assert_eq!(report.metrics.adversary_loss_history.len(), report.metrics.epochs_completed);
        assert!(model.debiased);
    }

    #[test]
    fn test_seeded_runs_are_identical() {
        let ds = separable(40);
        let (a, _) = AdversarialDebiaser::new(config(3)).fit(&ds).unwrap();
        let (b, _) = AdversarialDebiaser::new(config(3)).fit(&ds).unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn test_baseline_records_no_adversary_loss() {
        let ds = separable(40);
        let cfg = DebiasConfig {
            debias: false,
            ..config(2)
        };
        let (model, report) = AdversarialDebiaser::new(cfg).fit(&ds).unwrap();
        assert!(!model.debiased);
        assert_eq!(model.adversary_loss_weight, 0.0);
        assert!(report.metrics.adversary_loss_history.is_empty());
    }

    #[test]
    fn test_cancelled_before_start_returns_initial_model() {
        let ds = separable(40);
        let token = CancellationToken::new();
        token.cancel();
        let (_, report) = AdversarialDebiaser::new(config(10))
            .with_cancellation(token)
            .fit(&ds)
            .unwrap();
        assert_eq!(report.status, TrainingStatus::Cancelled);
        assert_eq!(report.metrics.epochs_completed, 0);
    }

    #[test]
    fn test_single_class_trains_constant_predictor() {
        let rows: Vec<(u8, u8, u8)> = (0..12).map(|i| ((i % 2) as u8, 0, 1)).collect();
        let ds = crate::data::dataset::test_support::dataset_from(&rows);
        let cfg = DebiasConfig {
            debias: false,
            ..config(20)
        };
        let (model, report) = AdversarialDebiaser::new(cfg).fit(&ds).unwrap();
        assert_eq!(report.status, TrainingStatus::Completed);
        assert!(model.predict(&ds).unwrap().labels().iter().all(|&l| l == 1));

        let (_, debiased) = AdversarialDebiaser::new(config(3)).fit(&ds).unwrap();
        assert!(debiased.metrics.loss_history.iter().all(|l| l.is_finite()));
    }

    /// Step whose loss never moves.
    struct Flat;

    impl TrainStep for Flat {
        type Model = ();

        fn step(&mut self, _batch: &Batch) -> StepLosses {
            StepLosses {
                classifier: 0.5,
                adversary: Some(0.7),
            }
        }

        fn snapshot(&self) -> Self::Model {}
    }

    #[test]
    fn test_stall_warns_and_keeps_training() {
        let ds = separable(20);
        let cfg = DebiasConfig {
            patience: 2,
            ..config(6)
        };
        let (_, report) = AdversarialDebiaser::new(cfg)
            .fit_with(Flat, &ds, &mut SeedManager::new(Some(1)))
            .unwrap();
        assert_eq!(report.status, TrainingStatus::Completed);
        assert_eq!(report.metrics.epochs_completed, 6);
        let warning = report.convergence_warning.unwrap();
        assert_eq!(warning.epoch, 3);
        assert_eq!(warning.best_epoch, 1);
    }

    #[test]
    fn test_stall_stops_with_early_stopping() {
        let ds = separable(20);
        let cfg = DebiasConfig {
            patience: 2,
            early_stopping: true,
            ..config(6)
        };
        let (_, report) = AdversarialDebiaser::new(cfg)
            .fit_with(Flat, &ds, &mut SeedManager::new(Some(1)))
            .unwrap();
        assert_eq!(report.status, TrainingStatus::StoppedEarly);
        assert_eq!(report.metrics.epochs_completed, 3);
    }

    struct Exploding;

    impl TrainStep for Exploding {
        type Model = ();

        fn step(&mut self, _batch: &Batch) -> StepLosses {
            StepLosses {
                classifier: f64::NAN,
                adversary: None,
            }
        }

        fn snapshot(&self) -> Self::Model {}
    }

    #[test]
    fn test_nan_loss_aborts() {
        let ds = separable(20);
        let (_, report) = AdversarialDebiaser::new(config(5))
            .fit_with(Exploding, &ds, &mut SeedManager::new(Some(1)))
            .unwrap();
        assert_eq!(report.status, TrainingStatus::Aborted);
        assert!(report.abort_reason.is_some());
        assert_eq!(report.metrics.epochs_completed, 1);
    }
}
