//! Training metrics and evaluation

use serde::Serialize;
use std::fmt;

/// Loss and accuracy accumulated over the batches of one pass
#[derive(Debug, Clone, Default)]
pub struct Metrics {
    /// Sum of per-sample losses (batch mean times batch size)
    pub total_loss: f64,
    /// Number of correct predictions
    pub correct: usize,
    /// Total predictions
    pub total_predictions: usize,
    /// Number of batches accumulated
    pub batch_count: usize,
}

impl Metrics {
    pub fn new() -> Self {
        Self::default()
    }

    /// Update metrics with a batch result; `loss` is the batch mean
    pub fn update(&mut self, loss: f32, correct: usize, batch_size: usize) {
        self.total_loss += loss as f64 * batch_size as f64;
        self.correct += correct;
        self.total_predictions += batch_size;
        self.batch_count += 1;
    }

    /// Average loss per sample
    pub fn avg_loss(&self) -> f64 {
        if self.total_predictions == 0 {
            0.0
        } else {
            self.total_loss / self.total_predictions as f64
        }
    }

    /// Fraction of correct class predictions
    pub fn accuracy(&self) -> f64 {
        if self.total_predictions == 0 {
            0.0
        } else {
            self.correct as f64 / self.total_predictions as f64
        }
    }
}

impl fmt::Display for Metrics {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Loss: {:.4} | Acc: {:.2}%",
            self.avg_loss(),
            self.accuracy() * 100.0
        )
    }
}

/// Quantity watched by checkpointing and early stopping
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Monitor {
    Loss,
    Accuracy,
    ValLoss,
    ValAccuracy,
}

impl Monitor {
    pub fn name(&self) -> &'static str {
        match self {
            Monitor::Loss => "loss",
            Monitor::Accuracy => "accuracy",
            Monitor::ValLoss => "val_loss",
            Monitor::ValAccuracy => "val_accuracy",
        }
    }

    /// Whether `current` strictly beats `best` (anything beats no value yet)
    pub fn improved(&self, current: f64, best: Option<f64>) -> bool {
        match best {
            None => !current.is_nan(),
            Some(best) => match self {
                Monitor::Loss | Monitor::ValLoss => current < best,
                Monitor::Accuracy | Monitor::ValAccuracy => current > best,
            },
        }
    }
}

/// Values reported at the end of an epoch
///
/// Field order is the column order of the CSV training log.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct EpochLogs {
    /// Zero-based epoch index
    pub epoch: usize,
    pub accuracy: f64,
    pub loss: f64,
    pub val_accuracy: f64,
    pub val_loss: f64,
}

impl EpochLogs {
    pub fn new(epoch: usize, train: &Metrics, val: &Metrics) -> Self {
        EpochLogs {
            epoch,
            accuracy: train.accuracy(),
            loss: train.avg_loss(),
            val_accuracy: val.accuracy(),
            val_loss: val.avg_loss(),
        }
    }

    pub fn get(&self, monitor: Monitor) -> f64 {
        match monitor {
            Monitor::Loss => self.loss,
            Monitor::Accuracy => self.accuracy,
            Monitor::ValLoss => self.val_loss,
            Monitor::ValAccuracy => self.val_accuracy,
        }
    }
}

/// Training history for tracking progress
#[derive(Debug, Clone, Default)]
pub struct TrainingHistory {
    pub epochs: Vec<EpochLogs>,
}

impl TrainingHistory {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record(&mut self, logs: EpochLogs) {
        self.epochs.push(logs);
    }

    pub fn epochs_run(&self) -> usize {
        self.epochs.len()
    }

    /// Earliest epoch holding the best value of `monitor`
    pub fn best(&self, monitor: Monitor) -> Option<&EpochLogs> {
        let mut best: Option<&EpochLogs> = None;
        for logs in &self.epochs {
            if monitor.improved(logs.get(monitor), best.map(|b| b.get(monitor))) {
                best = Some(logs);
            }
        }
        best
    }

    pub fn last(&self) -> Option<&EpochLogs> {
        self.epochs.last()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn logs(epoch: usize, val_accuracy: f64) -> EpochLogs {
        EpochLogs {
            epoch,
            accuracy: 0.0,
            loss: 1.0,
            val_accuracy,
            val_loss: 1.0,
        }
    }

    #[test]
    fn test_metrics_averages() {
        let mut metrics = Metrics::new();
        metrics.update(2.0, 3, 4);
        metrics.update(1.0, 1, 4);

        assert!((metrics.avg_loss() - 1.5).abs() < 1e-9);
        assert!((metrics.accuracy() - 0.5).abs() < 1e-9);
        assert_eq!(Metrics::new().accuracy(), 0.0);
    }

    #[test]
    fn test_short_last_batch_weighs_less() {
        let mut metrics = Metrics::new();
        metrics.update(1.0, 6, 6);
        metrics.update(4.0, 0, 2);

        // (1.0 * 6 + 4.0 * 2) / 8 samples
        assert!((metrics.avg_loss() - 1.75).abs() < 1e-9);
        assert_eq!(metrics.batch_count, 2);
    }

    #[test]
    fn test_monitor_improvement_is_strict() {
        assert!(Monitor::ValAccuracy.improved(0.1, None));
        assert!(Monitor::ValAccuracy.improved(0.6, Some(0.5)));
        assert!(!Monitor::ValAccuracy.improved(0.5, Some(0.5)));
        assert!(Monitor::ValLoss.improved(0.4, Some(0.5)));
        assert!(!Monitor::ValLoss.improved(0.6, Some(0.5)));
        assert!(!Monitor::ValAccuracy.improved(f64::NAN, None));
    }

    #[test]
    fn test_history_best_prefers_first_peak() {
        let mut history = TrainingHistory::new();
        for (epoch, acc) in [0.1, 0.5, 0.49, 0.5].into_iter().enumerate() {
            history.record(logs(epoch, acc));
        }

        assert_eq!(history.epochs_run(), 4);
        assert_eq!(history.best(Monitor::ValAccuracy).unwrap().epoch, 1);
        assert_eq!(history.last().unwrap().epoch, 3);
    }
}
