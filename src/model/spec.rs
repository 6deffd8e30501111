//! Model specifications
//!
//! A [`ModelSpec`] names an architecture and the input shape it was defined
//! for. Compiling a spec attaches the fixed optimizer, loss and metric; the
//! burn modules are only built from a compiled spec at training time.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::data::NUM_CLASSES;
use crate::Architecture;

/// Learning rate of the Adam optimizer attached by [`compile`]
pub const ADAM_LEARNING_RATE: f64 = 1e-3;

/// Shape of one input sample
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct InputShape {
    pub height: usize,
    pub width: usize,
    pub channels: usize,
}

impl InputShape {
    pub fn new(height: usize, width: usize, channels: usize) -> Self {
        InputShape {
            height,
            width,
            channels,
        }
    }

    /// Number of values in one flattened sample
    pub fn features(&self) -> usize {
        self.height * self.width * self.channels
    }
}

impl From<[usize; 3]> for InputShape {
    fn from([height, width, channels]: [usize; 3]) -> Self {
        InputShape::new(height, width, channels)
    }
}

impl fmt::Display for InputShape {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}x{}x{}", self.height, self.width, self.channels)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum OptimizerKind {
    Adam { learning_rate: f64 },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LossKind {
    /// Cross-entropy over logits with integer class targets
    SparseCategoricalCrossEntropy,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MetricKind {
    Accuracy,
}

/// Training settings attached by [`compile`]
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CompileOptions {
    pub optimizer: OptimizerKind,
    pub loss: LossKind,
    pub metrics: Vec<MetricKind>,
}

impl CompileOptions {
    pub fn learning_rate(&self) -> f64 {
        match self.optimizer {
            OptimizerKind::Adam { learning_rate } => learning_rate,
        }
    }
}

/// Architecture + input shape (+ compiled state)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelSpec {
    pub architecture: Architecture,
    pub input_shape: InputShape,
    pub num_classes: usize,
    pub compiled: Option<CompileOptions>,
}

impl ModelSpec {
    fn new(architecture: Architecture, input_shape: InputShape) -> Self {
        ModelSpec {
            architecture,
            input_shape,
            num_classes: NUM_CLASSES,
            compiled: None,
        }
    }

    pub fn is_compiled(&self) -> bool {
        self.compiled.is_some()
    }
}

/// Fully-connected classifier: flatten followed by the dense head
pub fn define_mlp(input_shape: InputShape) -> ModelSpec {
    ModelSpec::new(Architecture::Mlp, input_shape)
}

/// Two convolution/pooling stages followed by the same dense head as the MLP
pub fn define_cnn(input_shape: InputShape) -> ModelSpec {
    ModelSpec::new(Architecture::Cnn, input_shape)
}

/// Attach Adam, sparse categorical cross-entropy and accuracy
pub fn compile(spec: ModelSpec) -> ModelSpec {
    ModelSpec {
        compiled: Some(CompileOptions {
            optimizer: OptimizerKind::Adam {
                learning_rate: ADAM_LEARNING_RATE,
            },
            loss: LossKind::SparseCategoricalCrossEntropy,
            metrics: vec![MetricKind::Accuracy],
        }),
        ..spec
    }
}
