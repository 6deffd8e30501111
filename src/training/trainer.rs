//! Training loop and evaluation

use burn::data::dataloader::DataLoaderBuilder;
use burn::data::dataset::Dataset;
use burn::module::AutodiffModule;
use burn::nn::loss::{CrossEntropyLoss, CrossEntropyLossConfig};
use burn::optim::adaptor::OptimizerAdaptor;
use burn::optim::{Adam, AdamConfig, GradientsParams, Optimizer};
use burn::tensor::backend::{AutodiffBackend, Backend};
use burn::tensor::{ElementConversion, Int, Tensor};

use crate::data::dataset::{DatasetSplit, ImageBatch, ImageBatcher};
use crate::model::spec::CompileOptions;
use crate::model::ImageClassifier;
use crate::training::callbacks::{Action, Callback};
use crate::training::metrics::{EpochLogs, Metrics, TrainingHistory};
use crate::{Result, SvhnError, TrainingConfig};

/// Why the fit loop ended
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StopReason {
    /// A callback asked to stop after this zero-based epoch
    EarlyStopping { epoch: usize },
    /// Every configured epoch ran
    EpochLimit,
}

/// Final model state and per-epoch logs of a fit
pub struct FitOutcome<M> {
    /// Weights after the last epoch (not necessarily the best ones)
    pub model: M,
    pub history: TrainingHistory,
    pub stop_reason: StopReason,
}

/// Mini-batch trainer for any [`ImageClassifier`]
pub struct Trainer<B: AutodiffBackend, M: AutodiffModule<B>> {
    model: M,
    optimizer: OptimizerAdaptor<Adam, M, B>,
    loss_fn: CrossEntropyLoss<B>,
    learning_rate: f64,
    config: TrainingConfig,
    device: B::Device,
}

impl<B, M> Trainer<B, M>
where
    B: AutodiffBackend,
    M: AutodiffModule<B> + ImageClassifier<B>,
    M::InnerModule: ImageClassifier<B::InnerBackend>,
{
    /// Create a new trainer using the compiled optimizer settings
    pub fn new(
        model: M,
        options: &CompileOptions,
        config: TrainingConfig,
        device: B::Device,
    ) -> Self {
        Trainer {
            model,
            optimizer: AdamConfig::new().init(),
            loss_fn: CrossEntropyLossConfig::new().init(&device),
            learning_rate: options.learning_rate(),
            config,
            device,
        }
    }

    /// Train on `train`, validating on `valid` after every epoch
    ///
    /// Callbacks run in order at the end of each epoch. All of them run even
    /// when an earlier one asks to stop.
    pub fn fit(
        mut self,
        train: DatasetSplit,
        valid: DatasetSplit,
        callbacks: &mut [Box<dyn Callback<M>>],
    ) -> Result<FitOutcome<M>> {
        let sample_shape = train.sample_shape();
        let train_size = train.len();
        let valid_size = valid.len();

        let train_loader = DataLoaderBuilder::new(ImageBatcher::<B>::new(sample_shape))
            .batch_size(self.config.batch_size)
            .shuffle(self.config.seed)
            .set_device(self.device.clone())
            .build(train);

        let valid_loader = DataLoaderBuilder::new(ImageBatcher::<B::InnerBackend>::new(sample_shape))
            .batch_size(self.config.batch_size)
            .set_device(self.device.clone())
            .build(valid);

        log::info!(
            "Starting training for {} epochs ({} train / {} validation samples)",
            self.config.epochs,
            train_size,
            valid_size
        );

        let mut history = TrainingHistory::new();
        let mut stop_reason = StopReason::EpochLimit;

        for epoch in 0..self.config.epochs {
            let train_metrics = self.train_epoch(epoch, train_loader.iter())?;
            let val_metrics = evaluate(&self.model.valid(), valid_loader.iter(), &self.device);

            let logs = EpochLogs::new(epoch, &train_metrics, &val_metrics);
            history.record(logs);

            log::info!(
                "Epoch {}/{}: Train: {} | Val: {}",
                epoch + 1,
                self.config.epochs,
                train_metrics,
                val_metrics
            );

            let mut action = Action::Continue;
            for callback in callbacks.iter_mut() {
                if callback.on_epoch_end(&logs, &self.model)? == Action::Stop {
                    action = Action::Stop;
                }
            }

            if action == Action::Stop {
                log::info!("Early stopping at epoch {}", epoch + 1);
                stop_reason = StopReason::EarlyStopping { epoch };
                break;
            }
        }

        Ok(FitOutcome {
            model: self.model,
            history,
            stop_reason,
        })
    }

    /// Train one epoch
    fn train_epoch(
        &mut self,
        epoch: usize,
        loader: impl Iterator<Item = ImageBatch<B>>,
    ) -> Result<Metrics> {
        let mut metrics = Metrics::new();

        for (iteration, batch) in loader.enumerate() {
            let batch_size = batch.targets.dims()[0];

            let logits = self.model.forward(batch.images);
            let loss = self
                .loss_fn
                .forward(logits.clone(), batch.targets.clone());

            let loss_val: f32 = loss.clone().into_scalar().elem();
            if !loss_val.is_finite() {
                return Err(SvhnError::Training(format!(
                    "loss became {} at epoch {}, batch {}",
                    loss_val,
                    epoch + 1,
                    iteration + 1
                )));
            }

            let correct = count_correct(logits.detach(), batch.targets);

            let grads = loss.backward();
            let grads = GradientsParams::from_grads(grads, &self.model);
            self.model = self
                .optimizer
                .step(self.learning_rate, self.model.clone(), grads);

            metrics.update(loss_val, correct, batch_size);
        }

        Ok(metrics)
    }
}

/// Loss and accuracy of `model` over every batch of `loader`
pub fn evaluate<B: Backend, M: ImageClassifier<B>>(
    model: &M,
    loader: impl Iterator<Item = ImageBatch<B>>,
    device: &B::Device,
) -> Metrics {
    let loss_fn = CrossEntropyLossConfig::new().init(device);
    let mut metrics = Metrics::new();

    for batch in loader {
        let batch_size = batch.targets.dims()[0];
        let logits = model.forward(batch.images);
        let loss: f32 = loss_fn
            .forward(logits.clone(), batch.targets.clone())
            .into_scalar()
            .elem();
        let correct = count_correct(logits, batch.targets);
        metrics.update(loss, correct, batch_size);
    }

    metrics
}

fn count_correct<B: Backend>(logits: Tensor<B, 2>, targets: Tensor<B, 1, Int>) -> usize {
    let predictions = logits.argmax(1).squeeze::<1>(1);
    let correct: i64 = predictions
        .equal(targets)
        .int()
        .sum()
        .into_scalar()
        .elem();
    correct as usize
}
