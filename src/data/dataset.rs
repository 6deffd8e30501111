//! Burn Dataset implementation for SVHN digits
//!
//! The loaded dataset is shared read-only between training runs; each run
//! reads it through index-range views.

use std::marker::PhantomData;
use std::ops::Range;
use std::sync::Arc;

use burn::data::dataloader::batcher::Batcher;
use burn::data::dataset::Dataset;
use burn::tensor::backend::Backend;
use burn::tensor::{Int, Tensor};

use crate::data::preprocess::{Images, Layout, NUM_CLASSES};
use crate::{Result, SvhnError};

/// Pixels are stored as 0..=255 and fed to the models as 0..=1
pub const PIXEL_SCALE: f32 = 1.0 / 255.0;

/// Images paired with class labels
///
/// The sample count of the images always equals the label count.
#[derive(Debug, Clone)]
pub struct SvhnDataset {
    images: Images,
    labels: Vec<u8>,
}

impl SvhnDataset {
    pub fn new(images: Images, labels: Vec<u8>) -> Result<Self> {
        if images.len() != labels.len() {
            return Err(SvhnError::Parse(format!(
                "{} images but {} labels",
                images.len(),
                labels.len()
            )));
        }
        if let Some(bad) = labels.iter().find(|&&l| l as usize >= NUM_CLASSES) {
            return Err(SvhnError::Parse(format!("label {} out of range", bad)));
        }
        Ok(SvhnDataset { images, labels })
    }

    /// Derive a dataset by transforming the images, keeping the labels
    pub fn map_images<F>(self, transform: F) -> Result<Self>
    where
        F: FnOnce(Images) -> Result<Images>,
    {
        let images = transform(self.images)?;
        Self::new(images, self.labels)
    }

    pub fn images(&self) -> &Images {
        &self.images
    }

    pub fn labels(&self) -> &[u8] {
        &self.labels
    }

    pub fn len(&self) -> usize {
        self.labels.len()
    }

    pub fn is_empty(&self) -> bool {
        self.labels.is_empty()
    }
}

/// A single training sample
#[derive(Debug, Clone)]
pub struct ImageItem {
    /// `[H, W, C]` pixels in 0..=255
    pub pixels: Vec<f32>,
    pub label: u8,
}

/// Contiguous range of samples from a shared dataset
#[derive(Debug, Clone)]
pub struct DatasetSplit {
    source: Arc<SvhnDataset>,
    range: Range<usize>,
}

impl DatasetSplit {
    /// View over every sample
    pub fn full(source: Arc<SvhnDataset>) -> Result<Self> {
        if source.images().layout() != Layout::SampleLeading {
            return Err(SvhnError::Parse(
                "dataset must be reshaped to [samples, height, width, channels]".to_string(),
            ));
        }
        let range = 0..source.len();
        Ok(DatasetSplit { source, range })
    }

    /// Hold out the trailing `fraction` of samples for validation
    ///
    /// Samples are not shuffled before splitting, so the split is the same
    /// on every run.
    pub fn validation_split(source: Arc<SvhnDataset>, fraction: f64) -> Result<(Self, Self)> {
        if !(fraction > 0.0 && fraction < 1.0) {
            return Err(SvhnError::Config(format!(
                "validation split must be in (0, 1), got {}",
                fraction
            )));
        }

        let all = Self::full(source)?;
        let total = all.range.len();
        let split_at = (total as f64 * (1.0 - fraction)) as usize;
        if split_at == 0 || split_at == total {
            return Err(SvhnError::Training(format!(
                "{} samples are too few for a {:.0}% validation split",
                total,
                fraction * 100.0
            )));
        }

        let train = DatasetSplit {
            source: all.source.clone(),
            range: 0..split_at,
        };
        let valid = DatasetSplit {
            source: all.source,
            range: split_at..total,
        };
        Ok((train, valid))
    }

    /// `[height, width, channels]` of every sample
    pub fn sample_shape(&self) -> [usize; 3] {
        self.source.images().sample_shape()
    }
}

impl Dataset<ImageItem> for DatasetSplit {
    fn get(&self, index: usize) -> Option<ImageItem> {
        if index >= self.range.len() {
            return None;
        }
        let i = self.range.start + index;
        let pixels = self.source.images().sample(i)?.to_vec();
        Some(ImageItem {
            pixels,
            label: self.source.labels()[i],
        })
    }

    fn len(&self) -> usize {
        self.range.len()
    }
}

/// Batch of images for training
#[derive(Debug, Clone)]
pub struct ImageBatch<B: Backend> {
    /// Scaled pixels: [batch, height, width, channels]
    pub images: Tensor<B, 4>,
    /// Class indices: [batch]
    pub targets: Tensor<B, 1, Int>,
}

/// Batcher for creating image batches
///
/// Tensors land on whichever device the data loader was configured with.
#[derive(Clone)]
pub struct ImageBatcher<B: Backend> {
    sample_shape: [usize; 3],
    _backend: PhantomData<B>,
}

impl<B: Backend> ImageBatcher<B> {
    pub fn new(sample_shape: [usize; 3]) -> Self {
        ImageBatcher {
            sample_shape,
            _backend: PhantomData,
        }
    }
}

impl<B: Backend> Batcher<B, ImageItem, ImageBatch<B>> for ImageBatcher<B> {
    fn batch(&self, items: Vec<ImageItem>, device: &B::Device) -> ImageBatch<B> {
        let [height, width, channels] = self.sample_shape;
        let batch_size = items.len();

        let mut pixels = Vec::with_capacity(batch_size * height * width * channels);
        let mut labels = Vec::with_capacity(batch_size);
        for item in &items {
            pixels.extend_from_slice(&item.pixels);
            labels.push(item.label as i64);
        }

        let images = Tensor::<B, 1>::from_floats(pixels.as_slice(), device)
            .reshape([batch_size, height, width, channels])
            .mul_scalar(PIXEL_SCALE);
        let targets = Tensor::<B, 1, Int>::from_ints(labels.as_slice(), device);

        ImageBatch { images, targets }
    }
}
