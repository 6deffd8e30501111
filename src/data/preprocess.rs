//! Loading and reshaping of SVHN `.mat` files
//!
//! The files are MATLAB v5 matrices: `X` holds the images as
//! `[height, width, channels, samples]` in column-major order and `y` holds
//! one label per sample, with digit 0 stored as 10.

use std::io::BufReader;
use std::path::Path;

use matfile::{MatFile, NumericData};

use crate::data::dataset::SvhnDataset;
use crate::{Result, SvhnError};

/// Number of digit classes
pub const NUM_CLASSES: usize = 10;

/// ITU-R 601 luma weights for RGB → grayscale
const LUMA_WEIGHTS: [f32; 3] = [0.2989, 0.5870, 0.1140];

/// Axis ordering of an image array
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Layout {
    /// `[H, W, C, N]`, column-major, as stored in the source file
    SampleTrailing,
    /// `[N, H, W, C]`, row-major, one contiguous block per sample
    SampleLeading,
}

/// A 4-D image array tagged with its axis ordering
#[derive(Debug, Clone, PartialEq)]
pub struct Images {
    layout: Layout,
    dims: [usize; 4],
    pixels: Vec<f32>,
}

impl Images {
    /// Images in the source layout `[H, W, C, N]`
    pub fn from_source(dims: [usize; 4], pixels: Vec<f32>) -> Result<Self> {
        Self::new(Layout::SampleTrailing, dims, pixels)
    }

    /// Images in the sample-major layout `[N, H, W, C]`
    pub fn from_samples(dims: [usize; 4], pixels: Vec<f32>) -> Result<Self> {
        Self::new(Layout::SampleLeading, dims, pixels)
    }

    fn new(layout: Layout, dims: [usize; 4], pixels: Vec<f32>) -> Result<Self> {
        let expected: usize = dims.iter().product();
        if pixels.len() != expected {
            return Err(SvhnError::Parse(format!(
                "image array {:?} needs {} values, got {}",
                dims,
                expected,
                pixels.len()
            )));
        }
        Ok(Images {
            layout,
            dims,
            pixels,
        })
    }

    pub fn layout(&self) -> Layout {
        self.layout
    }

    pub fn dims(&self) -> [usize; 4] {
        self.dims
    }

    pub fn pixels(&self) -> &[f32] {
        &self.pixels
    }

    /// Number of samples
    pub fn len(&self) -> usize {
        match self.layout {
            Layout::SampleTrailing => self.dims[3],
            Layout::SampleLeading => self.dims[0],
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// `[height, width, channels]` of one sample
    pub fn sample_shape(&self) -> [usize; 3] {
        match self.layout {
            Layout::SampleTrailing => [self.dims[0], self.dims[1], self.dims[2]],
            Layout::SampleLeading => [self.dims[1], self.dims[2], self.dims[3]],
        }
    }

    /// Pixels of one sample in `[H, W, C]` order (sample-leading layout only)
    pub fn sample(&self, index: usize) -> Option<&[f32]> {
        if self.layout != Layout::SampleLeading || index >= self.len() {
            return None;
        }
        let size: usize = self.sample_shape().iter().product();
        Some(&self.pixels[index * size..(index + 1) * size])
    }
}

/// Load an SVHN `.mat` file into images (source layout) and labels
pub fn load(path: &Path) -> Result<SvhnDataset> {
    let file = std::fs::File::open(path).map_err(SvhnError::file_system(path))?;
    let mat = MatFile::parse(BufReader::new(file)).map_err(|e| {
        SvhnError::Parse(format!("{} is not a valid MAT file: {:?}", path.display(), e))
    })?;

    let x = mat
        .find_by_name("X")
        .ok_or_else(|| SvhnError::Parse(format!("{} has no 'X' variable", path.display())))?;
    let y = mat
        .find_by_name("y")
        .ok_or_else(|| SvhnError::Parse(format!("{} has no 'y' variable", path.display())))?;

    let dims: [usize; 4] = x.size().as_slice().try_into().map_err(|_| {
        SvhnError::Parse(format!(
            "'X' must be a 4-D [height, width, channels, samples] array, got {:?}",
            x.size()
        ))
    })?;
    let images = Images::from_source(dims, real_values(x.data()))?;

    let labels = real_values(y.data())
        .into_iter()
        .map(to_class_index)
        .collect::<Result<Vec<u8>>>()?;

    log::debug!(
        "Loaded {} images of shape {:?} from {}",
        images.len(),
        images.sample_shape(),
        path.display()
    );

    SvhnDataset::new(images, labels)
}

fn real_values(data: &NumericData) -> Vec<f32> {
    match data {
        NumericData::Int8 { real, .. } => real.iter().map(|&v| v as f32).collect(),
        NumericData::UInt8 { real, .. } => real.iter().map(|&v| v as f32).collect(),
        NumericData::Int16 { real, .. } => real.iter().map(|&v| v as f32).collect(),
        NumericData::UInt16 { real, .. } => real.iter().map(|&v| v as f32).collect(),
        NumericData::Int32 { real, .. } => real.iter().map(|&v| v as f32).collect(),
        NumericData::UInt32 { real, .. } => real.iter().map(|&v| v as f32).collect(),
        NumericData::Int64 { real, .. } => real.iter().map(|&v| v as f32).collect(),
        NumericData::UInt64 { real, .. } => real.iter().map(|&v| v as f32).collect(),
        NumericData::Single { real, .. } => real.clone(),
        NumericData::Double { real, .. } => real.iter().map(|&v| v as f32).collect(),
    }
}

/// SVHN labels run 1..=10, with digit 0 stored as 10
fn to_class_index(value: f32) -> Result<u8> {
    if value.fract() != 0.0 || !(1.0..=NUM_CLASSES as f32).contains(&value) {
        return Err(SvhnError::Parse(format!("invalid label {}", value)));
    }
    Ok((value as usize % NUM_CLASSES) as u8)
}

/// Move the sample axis to the front: `[H, W, C, N]` → `[N, H, W, C]`
///
/// Fails on images that are already sample-leading; callers track which
/// transforms have been applied. The pixel buffer is reordered in place.
pub fn reshape(mut images: Images) -> Result<Images> {
    if images.layout != Layout::SampleTrailing {
        return Err(SvhnError::Parse(
            "images are already in [samples, height, width, channels] layout".to_string(),
        ));
    }

    let [h, w, c, n] = images.dims;
    permute_in_place(&mut images.pixels, |dest| {
        let ch = dest % c;
        let col = (dest / c) % w;
        let row = (dest / (c * w)) % h;
        let sample = dest / (c * w * h);
        row + h * (col + w * (ch + c * sample))
    });

    Images::from_samples([n, h, w, c], images.pixels)
}

/// Reorder `values` so position `d` ends up holding the old `values[source(d)]`
///
/// `source` must be a permutation. Each cycle is walked once; a bitset marks
/// the positions already written.
fn permute_in_place(values: &mut [f32], source: impl Fn(usize) -> usize) {
    let mut done = vec![0u64; values.len().div_ceil(64)];
    for start in 0..values.len() {
        if done[start / 64] & (1u64 << (start % 64)) != 0 {
            continue;
        }
        let first = values[start];
        let mut dest = start;
        loop {
            done[dest / 64] |= 1u64 << (dest % 64);
            let src = source(dest);
            if src == start {
                values[dest] = first;
                break;
            }
            values[dest] = values[src];
            dest = src;
        }
    }
}

/// Collapse the channel axis to a single luminance channel
///
/// Three-channel input uses luma weights, anything else the channel mean.
/// Single-channel input is returned unchanged.
pub fn to_grayscale(images: Images) -> Result<Images> {
    if images.layout != Layout::SampleLeading {
        return Err(SvhnError::Parse(
            "grayscale conversion needs sample-leading images; reshape first".to_string(),
        ));
    }

    let [n, h, w, c] = images.dims;
    if c == 1 {
        return Ok(images);
    }
    if c == 0 {
        return Err(SvhnError::Parse("images have no channels".to_string()));
    }

    let gray: Vec<f32> = images
        .pixels
        .chunks_exact(c)
        .map(|pixel| {
            if c == LUMA_WEIGHTS.len() {
                pixel.iter().zip(LUMA_WEIGHTS).map(|(v, weight)| v * weight).sum()
            } else {
                pixel.iter().sum::<f32>() / c as f32
            }
        })
        .collect();

    Images::from_samples([n, h, w, 1], gray)
}
