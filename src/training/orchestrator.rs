//! One training run per model spec
//!
//! Splits the shared dataset, fits a freshly built model with checkpointing,
//! CSV logging and early stopping, then restores the best checkpoint and
//! saves it as the final model.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use burn::data::dataloader::DataLoaderBuilder;
use burn::module::AutodiffModule;
use burn::tensor::backend::AutodiffBackend;

use crate::data::dataset::{DatasetSplit, ImageBatcher, SvhnDataset};
use crate::data::fetch::{CHECKPOINT_PREFIX, TRAINING_LOG_NAME};
use crate::model::spec::CompileOptions;
use crate::model::{
    load_model, read_spec, save_model, CnnModel, ImageClassifier, InputShape, MlpModel, ModelSpec,
};
use crate::training::callbacks::{Callback, CsvLogger, EarlyStopping, ModelCheckpoint};
use crate::training::metrics::{Metrics, Monitor, TrainingHistory};
use crate::training::trainer::{evaluate, StopReason, Trainer};
use crate::{Architecture, Result, SvhnError, TrainingConfig};

/// Directory under the run output holding the final model
pub const MODEL_DIR_NAME: &str = "model";

/// Everything one training run leaves behind
#[derive(Debug, Clone)]
pub struct TrainingArtifact {
    pub architecture: Architecture,
    /// Best weights seen during the run (`ckpt.mpk`)
    pub checkpoint: PathBuf,
    pub training_log: PathBuf,
    /// Restored best model with its spec
    pub model_dir: PathBuf,
    pub history: TrainingHistory,
    pub stop_reason: StopReason,
    /// Zero-based epoch whose weights were kept
    pub best_epoch: usize,
    pub best_val_accuracy: f64,
    /// Filled in once the model has been scored on held-out test data
    pub test_metrics: Option<Metrics>,
}

impl TrainingArtifact {
    pub fn epochs_run(&self) -> usize {
        self.history.epochs_run()
    }
}

/// Runs training for compiled model specs on one device
pub struct TrainingOrchestrator<B: AutodiffBackend> {
    config: TrainingConfig,
    device: B::Device,
}

impl<B: AutodiffBackend> TrainingOrchestrator<B> {
    pub fn new(config: TrainingConfig, device: B::Device) -> Self {
        TrainingOrchestrator { config, device }
    }

    /// Train `spec` on `dataset`, writing everything under `output_dir`
    pub fn train(
        &self,
        spec: &ModelSpec,
        dataset: Arc<SvhnDataset>,
        output_dir: &Path,
    ) -> Result<TrainingArtifact> {
        let options = spec.compiled.as_ref().ok_or_else(|| {
            SvhnError::Training(format!(
                "{} spec must be compiled before training",
                spec.architecture
            ))
        })?;

        let data_shape = InputShape::from(dataset.images().sample_shape());
        if data_shape != spec.input_shape {
            return Err(SvhnError::Training(format!(
                "{} expects {} inputs but the data is {}",
                spec.architecture, spec.input_shape, data_shape
            )));
        }

        std::fs::create_dir_all(output_dir).map_err(SvhnError::file_system(output_dir))?;
        let (train, valid) = DatasetSplit::validation_split(dataset, self.config.validation_split)?;

        log::info!(
            "Training {} classifier into {}",
            spec.architecture,
            output_dir.display()
        );

        match spec.architecture {
            Architecture::Mlp => self.run::<MlpModel<B>>(spec, options, train, valid, output_dir),
            Architecture::Cnn => self.run::<CnnModel<B>>(spec, options, train, valid, output_dir),
        }
    }

    fn run<M>(
        &self,
        spec: &ModelSpec,
        options: &CompileOptions,
        train: DatasetSplit,
        valid: DatasetSplit,
        output_dir: &Path,
    ) -> Result<TrainingArtifact>
    where
        M: AutodiffModule<B> + ImageClassifier<B>,
        M::InnerModule: ImageClassifier<B::InnerBackend>,
    {
        let checkpoint = output_dir.join(CHECKPOINT_PREFIX);
        let training_log = output_dir.join(TRAINING_LOG_NAME);
        let model_dir = output_dir.join(MODEL_DIR_NAME);

        let mut callbacks: Vec<Box<dyn Callback<M>>> = vec![
            Box::new(ModelCheckpoint::<B>::new(&checkpoint, Monitor::ValAccuracy)),
            Box::new(CsvLogger::create(&training_log)?),
            Box::new(EarlyStopping::new(
                Monitor::ValAccuracy,
                self.config.early_stopping_patience,
            )),
        ];

        let model = M::from_spec(&self.device, spec);
        let trainer = Trainer::new(model, options, self.config.clone(), self.device.clone());
        let outcome = trainer.fit(train, valid, &mut callbacks)?;
        drop(callbacks);

        let best = outcome
            .history
            .best(Monitor::ValAccuracy)
            .copied()
            .ok_or_else(|| {
                SvhnError::Training(format!(
                    "{} never produced a usable validation accuracy",
                    spec.architecture
                ))
            })?;

        log::info!(
            "Restoring epoch {} weights (val_accuracy {:.4})",
            best.epoch + 1,
            best.val_accuracy
        );
        let model = outcome.model.load_weights(&checkpoint, &self.device)?;
        save_model(&model, spec, &model_dir)?;

        Ok(TrainingArtifact {
            architecture: spec.architecture,
            checkpoint: checkpoint.with_extension("mpk"),
            training_log,
            model_dir,
            history: outcome.history,
            stop_reason: outcome.stop_reason,
            best_epoch: best.epoch,
            best_val_accuracy: best.val_accuracy,
            test_metrics: None,
        })
    }

    /// Score a saved model directory on every sample of `dataset`
    pub fn evaluate(&self, model_dir: &Path, dataset: Arc<SvhnDataset>) -> Result<Metrics> {
        let spec = read_spec(model_dir)?;
        match spec.architecture {
            Architecture::Mlp => {
                self.evaluate_saved::<MlpModel<B::InnerBackend>>(model_dir, dataset)
            }
            Architecture::Cnn => {
                self.evaluate_saved::<CnnModel<B::InnerBackend>>(model_dir, dataset)
            }
        }
    }

    fn evaluate_saved<M: ImageClassifier<B::InnerBackend>>(
        &self,
        model_dir: &Path,
        dataset: Arc<SvhnDataset>,
    ) -> Result<Metrics> {
        let (model, spec) = load_model::<B::InnerBackend, M>(&self.device, model_dir)?;

        let split = DatasetSplit::full(dataset)?;
        let sample_shape = split.sample_shape();
        if InputShape::from(sample_shape) != model.input_shape() {
            return Err(SvhnError::Training(format!(
                "{} expects {} inputs but the data is {}",
                spec.architecture,
                model.input_shape(),
                InputShape::from(sample_shape)
            )));
        }

        let loader = DataLoaderBuilder::new(ImageBatcher::<B::InnerBackend>::new(sample_shape))
            .batch_size(self.config.batch_size)
            .set_device(self.device.clone())
            .build(split);

        Ok(evaluate(&model, loader.iter(), &self.device))
    }
}
