//! Dense classification head shared by both architectures
//!
//! Architecture: Input(features) → Hidden1(256) → ReLU → Dropout
//!                               → Hidden2(128) → ReLU
//!                               → Output(num_classes) logits

use burn::module::Module;
use burn::nn::{Dropout, DropoutConfig, Linear, LinearConfig};
use burn::tensor::activation::relu;
use burn::tensor::backend::Backend;
use burn::tensor::Tensor;

/// Configuration for the dense head
#[derive(Debug, Clone)]
pub struct DenseHeadConfig {
    /// Flattened input features
    pub input_dim: usize,
    /// Hidden layer widths
    pub hidden_dims: [usize; 2],
    pub num_classes: usize,
    pub dropout: f64,
}

impl DenseHeadConfig {
    pub fn new(input_dim: usize, num_classes: usize) -> Self {
        DenseHeadConfig {
            input_dim,
            hidden_dims: [256, 128],
            num_classes,
            dropout: 0.2,
        }
    }
}

/// Linear → ReLU → Dropout → Linear → ReLU → Linear
#[derive(Module, Debug)]
pub struct DenseHead<B: Backend> {
    hidden1: Linear<B>,
    dropout: Dropout,
    hidden2: Linear<B>,
    output: Linear<B>,
}

impl<B: Backend> DenseHead<B> {
    pub fn new(device: &B::Device, config: &DenseHeadConfig) -> Self {
        let [h1, h2] = config.hidden_dims;
        DenseHead {
            hidden1: LinearConfig::new(config.input_dim, h1).init(device),
            dropout: DropoutConfig::new(config.dropout).init(),
            hidden2: LinearConfig::new(h1, h2).init(device),
            output: LinearConfig::new(h2, config.num_classes).init(device),
        }
    }

    /// Forward pass
    ///
    /// # Arguments
    /// * `x` - Flattened features [batch, input_dim]
    ///
    /// # Returns
    /// Class logits [batch, num_classes]
    pub fn forward(&self, x: Tensor<B, 2>) -> Tensor<B, 2> {
        let x = relu(self.hidden1.forward(x));
        let x = self.dropout.forward(x);
        let x = relu(self.hidden2.forward(x));
        self.output.forward(x)
    }

    /// Features consumed by the first layer
    pub fn input_dim(&self) -> usize {
        // Linear weights are stored [d_input, d_output]
        self.hidden1.weight.val().dims()[0]
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use burn::backend::NdArray;

    type TestBackend = NdArray<f32>;

    #[test]
    fn test_dense_head_shapes() {
        let device = Default::default();
        let head = DenseHead::<TestBackend>::new(&device, &DenseHeadConfig::new(48, 10));

        let x = Tensor::random(
            [5, 48],
            burn::tensor::Distribution::Normal(0.0, 1.0),
            &device,
        );
        let logits = head.forward(x);

        assert_eq!(logits.dims(), [5, 10]);
        assert_eq!(head.input_dim(), 48);
    }
}
