//! Inference invoker: runs the loaded model on an encoded row and maps
//! its output to a [`Label`].

use crate::error::{ClassifyError, Result};
use crate::feature_encoder::EncodedVector;
use crate::schema::FeatureSchema;
use crate::types::verdict::{Label, Prediction};
use ort::session::Session;
use ort::value::Tensor;
use serde::{Deserialize, Serialize};
use std::sync::Mutex;
use tracing::debug;

/// How the paired model reports its decision.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "convention", rename_all = "snake_case")]
pub enum OutputConvention {
    /// Anomaly probability; strictly above `threshold` means Anomaly
    Probability {
        #[serde(default = "default_threshold")]
        threshold: f64,
    },
    /// Discrete class where 1 means Anomaly
    ClassLabel,
}

fn default_threshold() -> f64 {
    0.5
}

impl Default for OutputConvention {
    fn default() -> Self {
        OutputConvention::Probability {
            threshold: default_threshold(),
        }
    }
}

impl OutputConvention {
    /// Map a raw model output to a prediction
    pub fn interpret(&self, raw: f64) -> Prediction {
        match *self {
            OutputConvention::Probability { threshold } => Prediction {
                label: if raw > threshold {
                    Label::Anomaly
                } else {
                    Label::Normal
                },
                score: Some(raw),
            },
            OutputConvention::ClassLabel => Prediction {
                label: if (raw - 1.0).abs() < f64::EPSILON {
                    Label::Anomaly
                } else {
                    Label::Normal
                },
                score: None,
            },
        }
    }
}

/// Tensor layout the model expects for one row.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum InputLayout {
    /// `[1, n]`
    #[default]
    Flat,
    /// `[1, n, 1]`, as exported from 1-D convolutional models
    Channels,
}

impl InputLayout {
    /// Tensor shape for one row of `width` features
    pub fn shape(&self, width: usize) -> Vec<i64> {
        match self {
            InputLayout::Flat => vec![1, width as i64],
            InputLayout::Channels => vec![1, width as i64, 1],
        }
    }

    /// Number of dimensions of the input tensor
    pub fn rank(&self) -> usize {
        match self {
            InputLayout::Flat => 2,
            InputLayout::Channels => 3,
        }
    }

    /// Check the rank a model declares for its input against this layout.
    pub fn check_rank(&self, declared: usize) -> std::result::Result<(), String> {
        if declared == self.rank() {
            Ok(())
        } else {
            Err(format!(
                "model input has rank {declared} but the {self:?} layout feeds rank {}",
                self.rank()
            ))
        }
    }
}

/// A loaded scoring function.
pub trait Scorer: Send + Sync {
    fn name(&self) -> &str;

    /// Static feature width declared by the model, if any
    fn input_width(&self) -> Option<usize>;

    /// Raw output for a single row: an anomaly probability or a class id
    fn score(&self, features: &[f32]) -> Result<f64>;
}

/// ONNX Runtime model
pub struct OnnxModel {
    pub(crate) name: String,
    /// `run` needs exclusive access to the session
    pub(crate) session: Mutex<Session>,
    pub(crate) input_name: String,
    pub(crate) output_name: String,
    pub(crate) layout: InputLayout,
    pub(crate) input_width: Option<usize>,
    pub(crate) convention: OutputConvention,
}

impl OnnxModel {
    /// Get the graph input name
    pub fn input_name(&self) -> &str {
        &self.input_name
    }

    /// Get the graph output the verdict is read from
    pub fn output_name(&self) -> &str {
        &self.output_name
    }
}

impl Scorer for OnnxModel {
    fn name(&self) -> &str {
        &self.name
    }

    fn input_width(&self) -> Option<usize> {
        self.input_width
    }

    fn score(&self, features: &[f32]) -> Result<f64> {
        let shape = self.layout.shape(features.len());
        let input = Tensor::from_array((shape, features.to_vec()))
            .map_err(|e| ClassifyError::Inference(format!("failed to create input tensor: {e}")))?;

        let mut session = self
            .session
            .lock()
            .map_err(|e| ClassifyError::Inference(format!("session lock poisoned: {e}")))?;

        let outputs = session
            .run(ort::inputs![&self.input_name => input])
            .map_err(|e| ClassifyError::Inference(e.to_string()))?;

        let output = outputs.get(&self.output_name).ok_or_else(|| {
            ClassifyError::Inference(format!("model has no output named {}", self.output_name))
        })?;

        if let Ok((shape, data)) = output.try_extract_tensor::<f32>() {
            let dims: Vec<i64> = shape.iter().copied().collect();
            let values: Vec<f64> = data.iter().map(|&v| v as f64).collect();
            return anomaly_value(&dims, &values);
        }
        // Integer outputs are class ids, never probabilities.
        if matches!(self.convention, OutputConvention::ClassLabel) {
            if let Ok((shape, data)) = output.try_extract_tensor::<i64>() {
                let dims: Vec<i64> = shape.iter().copied().collect();
                let values: Vec<f64> = data.iter().map(|&v| v as f64).collect();
                return anomaly_value(&dims, &values);
            }
        }

        Err(ClassifyError::Inference(format!(
            "output {} is not a {} tensor",
            self.output_name,
            match self.convention {
                OutputConvention::Probability { .. } => "float",
                OutputConvention::ClassLabel => "float or int64",
            }
        )))
    }
}

/// Pick the anomaly value out of a single-row output tensor.
///
/// `[1, k]` or `[k]` with `k >= 2` holds per-class probabilities and the
/// anomaly class is index 1; any single-value tensor is taken as-is.
pub(crate) fn anomaly_value(dims: &[i64], data: &[f64]) -> Result<f64> {
    let classes = dims.last().copied().unwrap_or(1);
    let value = if classes >= 2 {
        data.get(1)
    } else {
        data.first()
    };
    value
        .copied()
        .ok_or_else(|| ClassifyError::Inference(format!("empty model output with shape {dims:?}")))
}

/// Calls the model on encoded rows built for its schema.
pub struct InferenceInvoker {
    scorer: Box<dyn Scorer>,
    schema: FeatureSchema,
    convention: OutputConvention,
}

impl InferenceInvoker {
    /// Create an invoker for a model trained on `schema`
    pub fn new(scorer: Box<dyn Scorer>, schema: FeatureSchema, convention: OutputConvention) -> Self {
        Self {
            scorer,
            schema,
            convention,
        }
    }

    /// Schema the model was trained on
    pub fn schema(&self) -> FeatureSchema {
        self.schema
    }

    /// How raw outputs are turned into labels
    pub fn convention(&self) -> OutputConvention {
        self.convention
    }

    /// Get the model name
    pub fn model_name(&self) -> &str {
        self.scorer.name()
    }

    /// Width the model accepts
    pub fn expected_width(&self) -> usize {
        self.scorer.input_width().unwrap_or_else(|| self.schema.width())
    }

    /// Score one encoded row. Single attempt; failures are returned as-is.
    pub fn predict(&self, vector: &EncodedVector) -> Result<Prediction> {
        if vector.schema() != self.schema {
            return Err(ClassifyError::ShapeMismatch {
                expected: format!("{} schema", self.schema),
                got: format!("{} schema", vector.schema()),
            });
        }
        let expected = self.expected_width();
        if vector.len() != expected {
            return Err(ClassifyError::ShapeMismatch {
                expected: format!("{expected} columns"),
                got: format!("{} columns", vector.len()),
            });
        }

        let raw = self.scorer.score(vector.values())?;
        if !raw.is_finite() {
            return Err(ClassifyError::Inference(format!(
                "{} returned a non-finite output",
                self.scorer.name()
            )));
        }

        let prediction = self.convention.interpret(raw);
        debug!(
            model = %self.scorer.name(),
            raw = raw,
            label = %prediction.label,
            "Model inference complete"
        );
        Ok(prediction)
    }
}
