//! Training callbacks for convergence monitoring and anomaly detection.

use crate::error::ConvergenceWarning;
use crate::training::metrics::TrainingMetrics;

/// Action a callback can request.
#[derive(Debug, Clone, PartialEq)]
pub enum CallbackAction {
    Continue,
    /// Loss stalled. Whether training actually stops is the caller's choice.
    Stalled(ConvergenceWarning),
    /// Training must stop (non-finite loss).
    Abort(String),
}

/// Trait for training callbacks.
pub trait TrainingCallback: Send + Sync {
    /// Called at the end of each epoch with epoch number and current metrics.
    fn on_epoch_end(&mut self, epoch: usize, metrics: &TrainingMetrics) -> CallbackAction;
}

/// Flags a run whose loss has not improved by `min_delta` for `patience` epochs.
#[derive(Debug, Clone)]
pub struct ConvergenceCallback {
    pub patience: usize,
    pub min_delta: f64,
    counter: usize,
    best: Option<(usize, f64)>,
}

impl ConvergenceCallback {
    pub fn new(patience: usize, min_delta: f64) -> Self {
        Self {
            patience,
            min_delta,
            counter: 0,
            best: None,
        }
    }

    /// Feed one epoch loss. A stall is reported once, when the counter reaches `patience`.
    pub fn observe(&mut self, epoch: usize, loss: f64) -> CallbackAction {
        match self.best {
            None => {
                self.best = Some((epoch, loss));
                CallbackAction::Continue
            }
            Some((_, best)) if loss < best - self.min_delta => {
                self.best = Some((epoch, loss));
                self.counter = 0;
                CallbackAction::Continue
            }
            Some((best_epoch, best_loss)) => {
                self.counter += 1;
                if self.patience > 0 && self.counter == self.patience {
                    CallbackAction::Stalled(ConvergenceWarning {
                        epoch,
                        best_epoch,
                        best_loss,
                        patience: self.patience,
                    })
                } else {
                    CallbackAction::Continue
                }
            }
        }
    }
}

impl TrainingCallback for ConvergenceCallback {
    fn on_epoch_end(&mut self, epoch: usize, metrics: &TrainingMetrics) -> CallbackAction {
        match metrics.last_loss() {
            Some(loss) => self.observe(epoch, loss),
            None => CallbackAction::Continue,
        }
    }
}

/// Aborts on non-finite loss.
#[derive(Debug, Clone, Default)]
pub struct AnomalyDetectionCallback;

impl TrainingCallback for AnomalyDetectionCallback {
    fn on_epoch_end(&mut self, epoch: usize, metrics: &TrainingMetrics) -> CallbackAction {
        match metrics.last_loss() {
            Some(loss) if !loss.is_finite() => {
                CallbackAction::Abort(format!("non-finite loss {loss} at epoch {epoch}"))
            }
            _ => CallbackAction::Continue,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_convergence_stall() {
        let mut cb = ConvergenceCallback::new(3, 0.01);
        assert_eq!(cb.observe(1, 0.5), CallbackAction::Continue); // first: sets best=0.5
        assert_eq!(cb.observe(2, 0.4), CallbackAction::Continue); // improves: best=0.4, counter=0
        assert_eq!(cb.observe(3, 0.4), CallbackAction::Continue); // no improve: counter=1
        assert_eq!(cb.observe(4, 0.4), CallbackAction::Continue); // no improve: counter=2
        match cb.observe(5, 0.4) {
            CallbackAction::Stalled(w) => {
                assert_eq!(w.epoch, 5);
                assert_eq!(w.best_epoch, 2);
                assert_eq!(w.patience, 3);
            }
            other => panic!("expected stall, got {other:?}"),
        }
        // Reported once per stall.
        assert_eq!(cb.observe(6, 0.4), CallbackAction::Continue);
    }

    #[test]
    fn test_improvement_resets_counter() {
        let mut cb = ConvergenceCallback::new(2, 0.0);
        cb.observe(1, 1.0);
        cb.observe(2, 1.0);
        assert_eq!(cb.observe(3, 0.5), CallbackAction::Continue);
        assert_eq!(cb.observe(4, 0.6), CallbackAction::Continue);
        assert!(matches!(cb.observe(5, 0.6), CallbackAction::Stalled(_)));
    }

    #[test]
    fn test_anomaly_nan() {
        let mut cb = AnomalyDetectionCallback;
        let mut metrics = TrainingMetrics::default();
        metrics.record_epoch(f64::NAN, None);
        assert!(matches!(cb.on_epoch_end(1, &metrics), CallbackAction::Abort(_)));
    }

    #[test]
    fn test_convergence_reads_metrics_through_trait() {
        let mut callbacks: Vec<Box<dyn TrainingCallback>> =
            vec![Box::new(ConvergenceCallback::new(1, 0.0))];
        let mut metrics = TrainingMetrics::default();
        metrics.record_epoch(0.3, None);
        assert_eq!(callbacks[0].on_epoch_end(1, &metrics), CallbackAction::Continue);
        metrics.record_epoch(0.3, None);
        assert!(matches!(
            callbacks[0].on_epoch_end(2, &metrics),
            CallbackAction::Stalled(w) if w.best_epoch == 1
        ));
    }
}
