//! End-to-end flows behind the CLI commands

use std::path::Path;
use std::sync::Arc;

use burn::tensor::backend::AutodiffBackend;

use crate::data::fetch::{extract_bundle, DataFetcher, Transport};
use crate::data::{load, reshape, to_grayscale, SvhnDataset};
use crate::model::{compile, define_cnn, define_mlp, InputShape};
use crate::training::{TrainingArtifact, TrainingOrchestrator};
use crate::{Config, Result, SvhnError};

/// Fetch the test set and the pretrained model bundles
///
/// Each bundle is extracted into `<work_dir>/<name>/`.
pub fn run_remote<T: Transport>(config: &Config, fetcher: &DataFetcher<T>) -> Result<()> {
    let work_dir = &config.data.work_dir;
    std::fs::create_dir_all(work_dir).map_err(SvhnError::file_system(work_dir))?;

    log::info!("Download test data from {}", config.data.test_data_url);
    fetcher.download(&config.data.test_data_url, &config.test_data_path())?;

    log::info!("Download pretrained models with their training logs");
    for name in &config.data.pretrained_models {
        let archive =
            fetcher.download_pretrained(&config.data.archive_url_prefix, name, work_dir)?;
        let files = extract_bundle(&archive, &work_dir.join(name), name)?;
        log::info!("Unpacked {} files for {}", files.len(), name);
    }

    Ok(())
}

/// Load a `.mat` file and turn it into single-channel, sample-leading images
pub fn prepare_dataset(path: &Path) -> Result<SvhnDataset> {
    let dataset = load(path)?
        .map_images(reshape)?
        .map_images(to_grayscale)?;
    log::info!(
        "Prepared {} samples of {:?} from {}",
        dataset.len(),
        dataset.images().sample_shape(),
        path.display()
    );
    Ok(dataset)
}

/// Fetch both datasets, train the MLP then the CNN, and score each on the test set
pub fn run_local<B: AutodiffBackend, T: Transport>(
    config: &Config,
    fetcher: &DataFetcher<T>,
    device: B::Device,
) -> Result<Vec<TrainingArtifact>> {
    log::info!("Download train and test data");
    fetcher.download(&config.data.train_data_url, &config.train_data_path())?;
    fetcher.download(&config.data.test_data_url, &config.test_data_path())?;

    log::info!("Load downloaded training data");
    let train = Arc::new(prepare_dataset(&config.train_data_path())?);
    let input_shape = InputShape::from(train.images().sample_shape());

    let orchestrator = TrainingOrchestrator::<B>::new(config.training.clone(), device);
    let mut artifacts = Vec::new();
    for spec in [define_mlp(input_shape), define_cnn(input_shape)] {
        let spec = compile(spec);
        let artifact =
            orchestrator.train(&spec, train.clone(), &config.model_dir(spec.architecture))?;
        log::info!(
            "{} finished after {} epochs, best val_accuracy {:.4} at epoch {}",
            artifact.architecture,
            artifact.epochs_run(),
            artifact.best_val_accuracy,
            artifact.best_epoch + 1
        );
        artifacts.push(artifact);
    }
    drop(train);

    log::info!("Evaluate trained models on test data");
    let test = Arc::new(prepare_dataset(&config.test_data_path())?);
    for artifact in &mut artifacts {
        let metrics = orchestrator.evaluate(&artifact.model_dir, test.clone())?;
        log::info!("{} test: {}", artifact.architecture, metrics);
        artifact.test_metrics = Some(metrics);
    }

    Ok(artifacts)
}
