//! End-of-epoch hooks: checkpointing, CSV logging and early stopping

use std::fs::File;
use std::marker::PhantomData;
use std::path::{Path, PathBuf};

use burn::tensor::backend::Backend;

use crate::model::ImageClassifier;
use crate::training::metrics::{EpochLogs, Monitor};
use crate::{Result, SvhnError};

/// What the fit loop should do after the callbacks ran
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Action {
    Continue,
    Stop,
}

/// Hook invoked once per epoch, after validation
pub trait Callback<M> {
    fn on_epoch_end(&mut self, logs: &EpochLogs, model: &M) -> Result<Action>;
}

/// Save the model weights whenever the monitored value improves
pub struct ModelCheckpoint<B> {
    path: PathBuf,
    monitor: Monitor,
    best: Option<f64>,
    best_epoch: Option<usize>,
    _backend: PhantomData<B>,
}

impl<B> ModelCheckpoint<B> {
    /// `path` is the file stem; the weights land in `path.mpk`
    pub fn new(path: &Path, monitor: Monitor) -> Self {
        ModelCheckpoint {
            path: path.to_path_buf(),
            monitor,
            best: None,
            best_epoch: None,
            _backend: PhantomData,
        }
    }

    pub fn best(&self) -> Option<f64> {
        self.best
    }

    pub fn best_epoch(&self) -> Option<usize> {
        self.best_epoch
    }
}

impl<B: Backend, M: ImageClassifier<B>> Callback<M> for ModelCheckpoint<B> {
    fn on_epoch_end(&mut self, logs: &EpochLogs, model: &M) -> Result<Action> {
        let current = logs.get(self.monitor);
        if self.monitor.improved(current, self.best) {
            log::info!(
                "  {} improved to {:.4}, saving checkpoint to {}",
                self.monitor.name(),
                current,
                self.path.with_extension("mpk").display()
            );
            model.save_weights(&self.path)?;
            self.best = Some(current);
            self.best_epoch = Some(logs.epoch);
        }
        Ok(Action::Continue)
    }
}

/// Append one row per epoch to a CSV file
pub struct CsvLogger {
    path: PathBuf,
    writer: csv::Writer<File>,
}

impl CsvLogger {
    /// Create (or truncate) the log file
    pub fn create(path: &Path) -> Result<Self> {
        let writer = csv::Writer::from_path(path).map_err(|e| csv_error(path, e))?;
        Ok(CsvLogger {
            path: path.to_path_buf(),
            writer,
        })
    }
}

impl<M> Callback<M> for CsvLogger {
    fn on_epoch_end(&mut self, logs: &EpochLogs, _model: &M) -> Result<Action> {
        self.writer
            .serialize(logs)
            .map_err(|e| csv_error(&self.path, e))?;
        self.writer
            .flush()
            .map_err(SvhnError::file_system(&self.path))?;
        Ok(Action::Continue)
    }
}

fn csv_error(path: &Path, e: csv::Error) -> SvhnError {
    SvhnError::FileSystem {
        path: path.to_path_buf(),
        source: e.into(),
    }
}

/// Stop once the monitored value has not improved for `patience` epochs
#[derive(Debug, Clone)]
pub struct EarlyStopping {
    monitor: Monitor,
    patience: usize,
    best: Option<f64>,
    wait: usize,
    stopped_epoch: Option<usize>,
}

impl EarlyStopping {
    pub fn new(monitor: Monitor, patience: usize) -> Self {
        EarlyStopping {
            monitor,
            patience,
            best: None,
            wait: 0,
            stopped_epoch: None,
        }
    }

    pub fn stopped_epoch(&self) -> Option<usize> {
        self.stopped_epoch
    }
}

impl<M> Callback<M> for EarlyStopping {
    fn on_epoch_end(&mut self, logs: &EpochLogs, _model: &M) -> Result<Action> {
        let current = logs.get(self.monitor);
        if self.monitor.improved(current, self.best) {
            self.best = Some(current);
            self.wait = 0;
            return Ok(Action::Continue);
        }

        self.wait += 1;
        if self.wait >= self.patience {
            self.stopped_epoch = Some(logs.epoch);
            log::info!(
                "  No {} improvement for {} epochs, stopping",
                self.monitor.name(),
                self.wait
            );
            return Ok(Action::Stop);
        }
        Ok(Action::Continue)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{define_mlp, InputShape, MlpModel};
    use crate::test_support::scratch_dir;
    use burn::backend::NdArray;
    use burn::tensor::Tensor;

    type TestBackend = NdArray<f32>;

    fn logs(epoch: usize, val_accuracy: f64) -> EpochLogs {
        EpochLogs {
            epoch,
            accuracy: 0.5,
            loss: 1.0,
            val_accuracy,
            val_loss: 1.0,
        }
    }

    #[test]
    fn test_early_stopping_after_patience() {
        let mut stopper = EarlyStopping::new(Monitor::ValAccuracy, 3);
        let actions: Vec<Action> = [0.10, 0.50, 0.49, 0.48, 0.47]
            .into_iter()
            .enumerate()
            .map(|(epoch, acc)| {
                Callback::<()>::on_epoch_end(&mut stopper, &logs(epoch, acc), &()).unwrap()
            })
            .collect();

        assert_eq!(
            actions,
            vec![
                Action::Continue,
                Action::Continue,
                Action::Continue,
                Action::Continue,
                Action::Stop
            ]
        );
        assert_eq!(stopper.stopped_epoch(), Some(4));
    }

    #[test]
    fn test_early_stopping_resets_on_improvement() {
        let mut stopper = EarlyStopping::new(Monitor::ValAccuracy, 2);
        for (epoch, acc) in [0.3, 0.2, 0.4, 0.3].into_iter().enumerate() {
            let action = Callback::<()>::on_epoch_end(&mut stopper, &logs(epoch, acc), &()).unwrap();
            assert_eq!(action, Action::Continue);
        }
        assert_eq!(stopper.stopped_epoch(), None);
    }

    #[test]
    fn test_checkpoint_keeps_best_epoch() {
        let dir = scratch_dir("checkpoint");
        let device = Default::default();
        let spec = define_mlp(InputShape::new(2, 2, 1));
        let stem = dir.join("ckpt");
        let mut checkpoint = ModelCheckpoint::<TestBackend>::new(&stem, Monitor::ValAccuracy);

        let models: Vec<MlpModel<TestBackend>> = (0..3)
            .map(|_| MlpModel::new(&device, &spec))
            .collect();
        for (epoch, acc) in [0.2, 0.6, 0.4].into_iter().enumerate() {
            checkpoint
                .on_epoch_end(&logs(epoch, acc), &models[epoch])
                .unwrap();
        }

        assert_eq!(checkpoint.best_epoch(), Some(1));
        assert_eq!(checkpoint.best(), Some(0.6));

        let restored = MlpModel::<TestBackend>::new(&device, &spec)
            .load_weights(&stem, &device)
            .unwrap();
        let images = Tensor::<TestBackend, 4>::ones([1, 2, 2, 1], &device);
        let expected = models[1].forward(images.clone()).to_data();
        let actual = restored.forward(images).to_data();
        assert_eq!(
            expected.as_slice::<f32>().unwrap(),
            actual.as_slice::<f32>().unwrap()
        );
    }

    #[test]
    fn test_early_stop_keeps_second_epoch_checkpoint() {
        let dir = scratch_dir("callbacks-combined");
        let device = Default::default();
        let spec = define_mlp(InputShape::new(2, 2, 1));
        let stem = dir.join("ckpt");
        let val_accuracy = [0.10, 0.50, 0.49, 0.48, 0.47];

        let models: Vec<MlpModel<TestBackend>> = val_accuracy
            .iter()
            .map(|_| MlpModel::new(&device, &spec))
            .collect();
        let mut callbacks: Vec<Box<dyn Callback<MlpModel<TestBackend>>>> = vec![
            Box::new(ModelCheckpoint::<TestBackend>::new(&stem, Monitor::ValAccuracy)),
            Box::new(EarlyStopping::new(Monitor::ValAccuracy, 3)),
        ];

        let mut stopped_at = None;
        for (epoch, acc) in val_accuracy.into_iter().enumerate() {
            let mut action = Action::Continue;
            for callback in callbacks.iter_mut() {
                if callback
                    .on_epoch_end(&logs(epoch, acc), &models[epoch])
                    .unwrap()
                    == Action::Stop
                {
                    action = Action::Stop;
                }
            }
            if action == Action::Stop {
                stopped_at = Some(epoch);
                break;
            }
        }

        assert_eq!(stopped_at, Some(4));

        let restored = MlpModel::<TestBackend>::new(&device, &spec)
            .load_weights(&stem, &device)
            .unwrap();
        let images = Tensor::<TestBackend, 4>::ones([1, 2, 2, 1], &device);
        let expected = models[1].forward(images.clone()).to_data();
        let actual = restored.forward(images).to_data();
        assert_eq!(
            expected.as_slice::<f32>().unwrap(),
            actual.as_slice::<f32>().unwrap()
        );
    }

    #[test]
    fn test_csv_logger_writes_header_and_rows() {
        let dir = scratch_dir("csv-logger");
        let path = dir.join("training_log.csv");
        let mut logger = CsvLogger::create(&path).unwrap();

        for epoch in 0..2 {
            Callback::<()>::on_epoch_end(&mut logger, &logs(epoch, 0.25), &()).unwrap();
        }

        let contents = std::fs::read_to_string(&path).unwrap();
        let lines: Vec<&str> = contents.lines().collect();
        assert_eq!(lines[0], "epoch,accuracy,loss,val_accuracy,val_loss");
        assert_eq!(lines.len(), 3);
        assert!(lines[2].starts_with("1,"));
    }
}
