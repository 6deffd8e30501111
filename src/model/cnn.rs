//! Convolutional network
//!
//! Architecture: Input[H, W, C] → Conv3x3(32) → ReLU → MaxPool2x2
//!                              → Conv3x3(64) → ReLU → MaxPool2x2
//!                              → Flatten → DenseHead → logits(10)
//!
//! Convolutions use same-padding, so only the pooling halves the spatial
//! dimensions. Inputs need to be at least 4x4.

use burn::module::Module;
use burn::nn::conv::{Conv2d, Conv2dConfig};
use burn::nn::pool::{MaxPool2d, MaxPool2dConfig};
use burn::nn::PaddingConfig2d;
use burn::tensor::activation::relu;
use burn::tensor::backend::Backend;
use burn::tensor::Tensor;

use super::head::{DenseHead, DenseHeadConfig};
use super::spec::{InputShape, ModelSpec};
use super::ImageClassifier;

const CONV1_FILTERS: usize = 32;
const CONV2_FILTERS: usize = 64;

/// Convolutional digit classifier
#[derive(Module, Debug)]
pub struct CnnModel<B: Backend> {
    conv1: Conv2d<B>,
    conv2: Conv2d<B>,
    pool: MaxPool2d,
    head: DenseHead<B>,
    input_shape: [usize; 3],
}

impl<B: Backend> CnnModel<B> {
    /// Create a new CNN for the spec's input shape
    pub fn new(device: &B::Device, spec: &ModelSpec) -> Self {
        let shape = spec.input_shape;
        let pooled = (shape.height / 4) * (shape.width / 4);

        CnnModel {
            conv1: Conv2dConfig::new([shape.channels, CONV1_FILTERS], [3, 3])
                .with_padding(PaddingConfig2d::Same)
                .init(device),
            conv2: Conv2dConfig::new([CONV1_FILTERS, CONV2_FILTERS], [3, 3])
                .with_padding(PaddingConfig2d::Same)
                .init(device),
            pool: MaxPool2dConfig::new([2, 2]).with_strides([2, 2]).init(),
            head: DenseHead::new(
                device,
                &DenseHeadConfig::new(CONV2_FILTERS * pooled, spec.num_classes),
            ),
            input_shape: [shape.height, shape.width, shape.channels],
        }
    }

    /// Channels the first convolution consumes
    pub fn first_layer_channels(&self) -> usize {
        // Conv weights are stored [channels_out, channels_in, k1, k2]
        self.conv1.weight.val().dims()[1]
    }
}

impl<B: Backend> ImageClassifier<B> for CnnModel<B> {
    fn from_spec(device: &B::Device, spec: &ModelSpec) -> Self {
        Self::new(device, spec)
    }

    fn forward(&self, images: Tensor<B, 4>) -> Tensor<B, 2> {
        // [N, H, W, C] → [N, C, H, W]
        let x = images.swap_dims(1, 3).swap_dims(2, 3);

        let x = self.pool.forward(relu(self.conv1.forward(x)));
        let x = self.pool.forward(relu(self.conv2.forward(x)));

        self.head.forward(x.flatten::<2>(1, 3))
    }

    fn input_shape(&self) -> InputShape {
        InputShape::from(self.input_shape)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::spec::define_cnn;
    use burn::backend::NdArray;

    type TestBackend = NdArray<f32>;

    #[test]
    fn test_cnn_first_layer_matches_input_shape() {
        let device = Default::default();
        let shape = InputShape::new(32, 32, 1);
        let model = CnnModel::<TestBackend>::new(&device, &define_cnn(shape));

        assert_eq!(model.input_shape(), shape);
        assert_eq!(model.first_layer_channels(), 1);
    }

    #[test]
    fn test_cnn_forward_color_input() {
        let device = Default::default();
        let shape = InputShape::new(8, 12, 3);
        let model = CnnModel::<TestBackend>::new(&device, &define_cnn(shape));

        assert_eq!(model.first_layer_channels(), 3);

        let images = Tensor::random(
            [2, 8, 12, 3],
            burn::tensor::Distribution::Uniform(0.0, 1.0),
            &device,
        );
        let logits = model.forward(images);

        assert_eq!(logits.dims(), [2, 10]);
    }
}
