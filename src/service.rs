//! Detection service: validate, encode and score one record at a time.

use crate::error::{ClassifyError, Result};
use crate::feature_encoder::FeatureEncoder;
use crate::models::inference::InferenceInvoker;
use crate::models::loader::{ModelBundle, ModelLoader};
use crate::schema::FeatureSchema;
use crate::types::record::{RecordSubmission, TrafficRecord};
use crate::types::verdict::{Prediction, Verdict};
use std::path::Path;
use tracing::{debug, error, info, warn};

/// Owns the loaded artifacts of one model bundle. Nothing is mutated after
/// construction, so a single instance can serve concurrent callers.
pub struct DetectionService {
    model_id: String,
    encoder: FeatureEncoder,
    invoker: InferenceInvoker,
}

impl DetectionService {
    /// Pair an encoder with an invoker built for the same schema.
    pub fn new(model_id: impl Into<String>, encoder: FeatureEncoder, invoker: InferenceInvoker) -> Result<Self> {
        if encoder.schema() != invoker.schema() {
            return Err(ClassifyError::ShapeMismatch {
                expected: format!("{} schema", invoker.schema()),
                got: format!("{} schema", encoder.schema()),
            });
        }
        Ok(Self {
            model_id: model_id.into(),
            encoder,
            invoker,
        })
    }

    /// Load a model bundle directory
    pub fn load<P: AsRef<Path>>(bundle_dir: P, onnx_threads: usize) -> Result<Self> {
        let bundle = ModelLoader::with_threads(onnx_threads).load_bundle(bundle_dir)?;
        Self::from_bundle(bundle)
    }

    /// Build the service from an already loaded bundle
    pub fn from_bundle(bundle: ModelBundle) -> Result<Self> {
        let ModelBundle {
            manifest,
            encoder,
            model,
        } = bundle;
        let invoker = InferenceInvoker::new(Box::new(model), manifest.schema, manifest.output);
        Self::new(manifest.model_id(), encoder, invoker)
    }

    /// `name@version` of the loaded bundle
    pub fn model_id(&self) -> &str {
        &self.model_id
    }

    /// Schema of the loaded model
    pub fn schema(&self) -> FeatureSchema {
        self.encoder.schema()
    }

    /// Get the feature encoder
    pub fn encoder(&self) -> &FeatureEncoder {
        &self.encoder
    }

    /// Get the inference invoker
    pub fn invoker(&self) -> &InferenceInvoker {
        &self.invoker
    }

    /// Classify one record. Invalid records are rejected before the model
    /// is called.
    pub fn classify(&self, record: &TrafficRecord) -> Result<Prediction> {
        let vector = self.encoder.encode(record)?;
        let prediction = self.invoker.predict(&vector)?;

        debug!(
            model = %self.model_id,
            label = %prediction.label,
            score = ?prediction.score,
            "Record classified"
        );
        Ok(prediction)
    }

    /// Classify a submission and build the verdict published for it. A
    /// failed classification becomes a rejected verdict carrying the
    /// error kind and message.
    pub fn verdict(&self, submission: &RecordSubmission) -> Verdict {
        let record_id = submission.record_id.clone();

        match self.classify(&submission.record) {
            Ok(prediction) => {
                if prediction.label.is_anomaly() {
                    info!(record_id = ?record_id, score = ?prediction.score, "Anomaly detected");
                }
                Verdict::classified(record_id, &self.model_id, prediction)
            }
            Err(e) => {
                if e.is_user_correctable() {
                    warn!(record_id = ?record_id, kind = e.kind(), error = %e, "Record rejected");
                } else {
                    error!(record_id = ?record_id, kind = e.kind(), error = %e, "Record could not be scored");
                }
                Verdict::rejected(record_id, &self.model_id, e.kind(), e.to_string())
            }
        }
    }
}
