//! Neural network architectures
//!
//! Two fixed digit classifiers built from a [`ModelSpec`]:
//! - MLP: flattened pixels into a dense head
//! - CNN: two convolution/pooling stages into the same dense head

pub mod cnn;
pub mod head;
pub mod mlp;
pub mod spec;

pub use cnn::CnnModel;
pub use mlp::MlpModel;
pub use spec::{compile, define_cnn, define_mlp, InputShape, ModelSpec};

use std::path::Path;

use burn::module::Module;
use burn::record::{FullPrecisionSettings, NamedMpkFileRecorder};
use burn::tensor::backend::Backend;
use burn::tensor::Tensor;

use crate::{Result, SvhnError};

/// Weights file stem inside a saved model directory (burn adds `.mpk`)
pub const WEIGHTS_FILE_STEM: &str = "weights";
/// Spec file inside a saved model directory
pub const SPEC_FILE_NAME: &str = "spec.json";

/// A model mapping `[batch, height, width, channels]` images to class logits
pub trait ImageClassifier<B: Backend>: Module<B> + Sized {
    /// Build freshly initialized weights for `spec`
    fn from_spec(device: &B::Device, spec: &ModelSpec) -> Self;

    /// Class logits [batch, num_classes]
    fn forward(&self, images: Tensor<B, 4>) -> Tensor<B, 2>;

    /// Input shape the first layer was built for
    fn input_shape(&self) -> InputShape;

    /// Save weights to `path` with an `.mpk` extension
    fn save_weights(&self, path: &Path) -> Result<()> {
        let recorder = NamedMpkFileRecorder::<FullPrecisionSettings>::new();
        self.clone()
            .save_file(path.to_path_buf(), &recorder)
            .map_err(|e| SvhnError::FileSystem {
                path: path.with_extension("mpk"),
                source: std::io::Error::other(e.to_string()),
            })
    }

    /// Replace the weights with the ones stored at `path` (`.mpk` implied)
    fn load_weights(self, path: &Path, device: &B::Device) -> Result<Self> {
        let recorder = NamedMpkFileRecorder::<FullPrecisionSettings>::new();
        self.load_file(path.to_path_buf(), &recorder, device)
            .map_err(|e| SvhnError::FileSystem {
                path: path.with_extension("mpk"),
                source: std::io::Error::other(e.to_string()),
            })
    }
}

/// Write `dir/weights.mpk` and `dir/spec.json`
pub fn save_model<B: Backend, M: ImageClassifier<B>>(
    model: &M,
    spec: &ModelSpec,
    dir: &Path,
) -> Result<()> {
    std::fs::create_dir_all(dir).map_err(SvhnError::file_system(dir))?;

    let spec_path = dir.join(SPEC_FILE_NAME);
    let json = serde_json::to_string_pretty(spec)
        .map_err(|e| SvhnError::Config(format!("Failed to serialize model spec: {}", e)))?;
    std::fs::write(&spec_path, json).map_err(SvhnError::file_system(&spec_path))?;

    model.save_weights(&dir.join(WEIGHTS_FILE_STEM))
}

/// Read the spec stored in a saved model directory
pub fn read_spec(dir: &Path) -> Result<ModelSpec> {
    let spec_path = dir.join(SPEC_FILE_NAME);
    let json = std::fs::read_to_string(&spec_path).map_err(SvhnError::file_system(&spec_path))?;
    serde_json::from_str(&json)
        .map_err(|e| SvhnError::Parse(format!("{}: {}", spec_path.display(), e)))
}

/// Rebuild a model saved with [`save_model`]
pub fn load_model<B: Backend, M: ImageClassifier<B>>(
    device: &B::Device,
    dir: &Path,
) -> Result<(M, ModelSpec)> {
    let spec = read_spec(dir)?;
    let model = M::from_spec(device, &spec).load_weights(&dir.join(WEIGHTS_FILE_STEM), device)?;
    Ok((model, spec))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::scratch_dir;
    use burn::backend::NdArray;

    type TestBackend = NdArray<f32>;

    #[test]
    fn test_saved_model_reloads_identical_outputs() {
        let dir = scratch_dir("model-save");
        let device = Default::default();
        let spec = compile(define_mlp(InputShape::new(4, 4, 1)));
        let model = MlpModel::<TestBackend>::from_spec(&device, &spec);

        save_model(&model, &spec, &dir.join("model")).unwrap();
        assert!(dir.join("model/weights.mpk").exists());

        let (reloaded, reloaded_spec) =
            load_model::<TestBackend, MlpModel<TestBackend>>(&device, &dir.join("model")).unwrap();
        assert_eq!(reloaded_spec, spec);

        let images = Tensor::<TestBackend, 4>::ones([2, 4, 4, 1], &device);
        let before = model.forward(images.clone()).to_data();
        let after = reloaded.forward(images).to_data();
        assert_eq!(
            before.as_slice::<f32>().unwrap(),
            after.as_slice::<f32>().unwrap()
        );
    }

    #[test]
    fn test_load_missing_weights_fails() {
        let dir = scratch_dir("model-missing");
        let device = Default::default();
        let spec = define_cnn(InputShape::new(8, 8, 1));
        let model = CnnModel::<TestBackend>::from_spec(&device, &spec);

        let err = model.load_weights(&dir.join("ckpt"), &device).unwrap_err();
        assert!(matches!(err, SvhnError::FileSystem { .. }));
    }
}
