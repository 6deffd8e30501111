//! Multilayer perceptron
//!
//! Architecture: Input[H, W, C] → Flatten(H·W·C) → DenseHead → logits(10)

use burn::module::Module;
use burn::tensor::backend::Backend;
use burn::tensor::Tensor;

use super::head::{DenseHead, DenseHeadConfig};
use super::spec::{InputShape, ModelSpec};
use super::ImageClassifier;

/// Fully-connected digit classifier
#[derive(Module, Debug)]
pub struct MlpModel<B: Backend> {
    head: DenseHead<B>,
    input_shape: [usize; 3],
}

impl<B: Backend> MlpModel<B> {
    /// Create a new MLP for the spec's input shape
    pub fn new(device: &B::Device, spec: &ModelSpec) -> Self {
        let shape = spec.input_shape;
        MlpModel {
            head: DenseHead::new(
                device,
                &DenseHeadConfig::new(shape.features(), spec.num_classes),
            ),
            input_shape: [shape.height, shape.width, shape.channels],
        }
    }

    /// Features the first dense layer consumes
    pub fn first_layer_inputs(&self) -> usize {
        self.head.input_dim()
    }
}

impl<B: Backend> ImageClassifier<B> for MlpModel<B> {
    fn from_spec(device: &B::Device, spec: &ModelSpec) -> Self {
        Self::new(device, spec)
    }

    fn forward(&self, images: Tensor<B, 4>) -> Tensor<B, 2> {
        self.head.forward(images.flatten::<2>(1, 3))
    }

    fn input_shape(&self) -> InputShape {
        InputShape::from(self.input_shape)
    }
}
