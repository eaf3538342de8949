//! Model bundle loader.
//!
//! A bundle is a directory holding everything one model needs:
//! `manifest.json`, the ONNX graph, the fitted scaler and, for models
//! trained with a fitted service encoder, its class list. The manifest
//! names the feature schema and output convention so a model is never
//! paired with another model's preprocessing.

use crate::error::{ClassifyError, Result};
use crate::feature_encoder::FeatureEncoder;
use crate::models::artifacts::{read_json, LabelEncoder, MinMaxScaler, ServiceEncoder};
use crate::models::inference::{InputLayout, OnnxModel, OutputConvention, Scorer};
use crate::schema::FeatureSchema;
use ort::session::{builder::GraphOptimizationLevel, Session};
use ort::tensor::TensorElementType;
use ort::value::ValueType;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use tracing::info;

pub const MANIFEST_FILE: &str = "manifest.json";

/// How the `service` field is turned into its index column
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ServiceEncoding {
    /// Built-in sorted-name table
    #[default]
    Static,
    /// Fitted encoder shipped in the bundle
    LabelEncoder,
}

/// Bundle manifest (`manifest.json`)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BundleManifest {
    pub name: String,
    pub version: String,
    pub schema: FeatureSchema,
    #[serde(default)]
    pub service_encoding: ServiceEncoding,
    #[serde(default)]
    pub output: OutputConvention,
    #[serde(default)]
    pub input_layout: InputLayout,
    #[serde(default = "default_model_file")]
    pub model_file: String,
    #[serde(default = "default_scaler_file")]
    pub scaler_file: String,
    #[serde(default)]
    pub service_encoder_file: Option<String>,
}

fn default_model_file() -> String {
    "model.onnx".to_string()
}

fn default_scaler_file() -> String {
    "scaler.json".to_string()
}

impl BundleManifest {
    /// Read `manifest.json` from a bundle directory
    pub fn load<P: AsRef<Path>>(bundle_dir: P) -> Result<Self> {
        let manifest: Self = read_json(&bundle_dir.as_ref().join(MANIFEST_FILE))?;
        Ok(manifest)
    }

    /// `name@version`
    pub fn model_id(&self) -> String {
        format!("{}@{}", self.name, self.version)
    }

    /// Build the feature encoder from the bundle's fitted artifacts.
    pub fn load_encoder(&self, bundle_dir: &Path) -> Result<FeatureEncoder> {
        let scaler_path = bundle_dir.join(&self.scaler_file);
        let scaler = MinMaxScaler::load(&scaler_path)?;
        scaler
            .ensure_covers(&self.schema.scaled_fields())
            .map_err(|reason| ClassifyError::artifact(&scaler_path, reason))?;

        let services = match self.service_encoding {
            ServiceEncoding::Static => ServiceEncoder::Static,
            ServiceEncoding::LabelEncoder => {
                let file = self.service_encoder_file.as_deref().ok_or_else(|| {
                    ClassifyError::artifact(
                        bundle_dir.join(MANIFEST_FILE),
                        "label_encoder service encoding requires service_encoder_file",
                    )
                })?;
                ServiceEncoder::Fitted(LabelEncoder::load(bundle_dir.join(file))?)
            }
        };

        FeatureEncoder::new(self.schema, scaler, services)
    }
}

/// Everything loaded from one bundle
pub struct ModelBundle {
    pub manifest: BundleManifest,
    pub encoder: FeatureEncoder,
    pub model: OnnxModel,
}

/// Loader for ONNX models and bundles
pub struct ModelLoader {
    /// Number of threads for ONNX inference
    onnx_threads: usize,
}

impl ModelLoader {
    /// Create a new model loader with specified number of threads
    pub fn with_threads(onnx_threads: usize) -> Self {
        Self {
            onnx_threads: onnx_threads.max(1),
        }
    }

    /// Load a complete bundle. Any failure is fatal for startup.
    pub fn load_bundle<P: AsRef<Path>>(&self, bundle_dir: P) -> Result<ModelBundle> {
        let bundle_dir = bundle_dir.as_ref();
        let manifest = BundleManifest::load(bundle_dir)?;

        info!(
            bundle = %bundle_dir.display(),
            model = %manifest.model_id(),
            schema = %manifest.schema,
            output = ?manifest.output,
            "Loading model bundle"
        );

        let encoder = manifest.load_encoder(bundle_dir)?;
        let model = self.load_model(
            bundle_dir.join(&manifest.model_file),
            &manifest.name,
            &manifest.output,
            manifest.input_layout,
        )?;

        if let Some(width) = model.input_width() {
            if width != encoder.feature_count() {
                return Err(ClassifyError::artifact(
                    bundle_dir.join(&manifest.model_file),
                    format!(
                        "model expects {width} features but schema {} produces {}",
                        manifest.schema,
                        encoder.feature_count()
                    ),
                ));
            }
        }

        info!(
            model = %manifest.model_id(),
            features = encoder.feature_count(),
            "Model bundle loaded"
        );

        Ok(ModelBundle {
            manifest,
            encoder,
            model,
        })
    }

    /// Load a single ONNX model from file
    pub fn load_model(
        &self,
        path: PathBuf,
        name: &str,
        output: &OutputConvention,
        layout: InputLayout,
    ) -> Result<OnnxModel> {
        if !path.is_file() {
            return Err(ClassifyError::artifact(&path, "model file not found"));
        }

        info!(model = %name, path = %path.display(), threads = self.onnx_threads, "Loading ONNX model");

        let session = self
            .build_session(&path)
            .map_err(|e| ClassifyError::artifact(&path, format!("{e:#}")))?;

        let input = session
            .inputs
            .first()
            .ok_or_else(|| ClassifyError::artifact(&path, "model declares no inputs"))?;
        let input_name = input.name.clone();
        let input_width = match &input.input_type {
            ValueType::Tensor { shape, .. } => {
                layout
                    .check_rank(shape.len())
                    .map_err(|reason| ClassifyError::artifact(&path, reason))?;
                // Row width is dimension 1 for both [batch, n] and [batch, n, 1].
                shape.get(1).copied().filter(|&d| d > 0).map(|d| d as usize)
            }
            _ => None,
        };

        let output_names: Vec<&str> = session.outputs.iter().map(|o| o.name.as_str()).collect();
        let output_name = select_output(&output_names, output)
            .map(str::to_string)
            .ok_or_else(|| {
                ClassifyError::artifact(&path, format!("no usable output for {output:?} among {output_names:?}"))
            })?;

        if let OutputConvention::Probability { .. } = output {
            let is_float = session.outputs.iter().any(|o| {
                o.name == output_name
                    && matches!(
                        o.output_type,
                        ValueType::Tensor {
                            ty: TensorElementType::Float32,
                            ..
                        }
                    )
            });
            if !is_float {
                return Err(ClassifyError::artifact(
                    &path,
                    format!("probability output {output_name} is not a float tensor"),
                ));
            }
        }

        info!(
            model = %name,
            input = %input_name,
            output = %output_name,
            input_width = ?input_width,
            "Model loaded successfully"
        );

        Ok(OnnxModel {
            name: name.to_string(),
            session: Mutex::new(session),
            input_name,
            output_name,
            layout,
            input_width,
            convention: *output,
        })
    }
}

/// Pick the graph output that carries the verdict.
///
/// Probability models read the first output named like `prob`, then one
/// named like `output`, then the last output; `label` outputs are never
/// used as probabilities. Class-label models prefer an output named like
/// `label`.
pub fn select_output<'a>(names: &[&'a str], convention: &OutputConvention) -> Option<&'a str> {
    match convention {
        OutputConvention::Probability { .. } => {
            let candidates: Vec<&'a str> = names.iter().copied().filter(|n| !n.contains("label")).collect();
            candidates
                .iter()
                .find(|n| n.contains("prob"))
                .or_else(|| candidates.iter().find(|n| n.contains("output")))
                .or_else(|| candidates.last())
                .copied()
        }
        OutputConvention::ClassLabel => names
            .iter()
            .find(|n| n.contains("label"))
            .or_else(|| names.first())
            .copied(),
    }
}

impl ModelLoader {
    fn build_session(&self, path: &Path) -> anyhow::Result<Session> {
        let session = Session::builder()?
            .with_optimization_level(GraphOptimizationLevel::Level3)?
            .with_intra_threads(self.onnx_threads)?
            .commit_from_file(path)?;
        Ok(session)
    }
}

impl Default for ModelLoader {
    fn default() -> Self {
        Self { onnx_threads: 1 }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::SERVICES;
    use std::fs;

    fn write_scaler(dir: &Path, schema: FeatureSchema) {
        let fields = schema.scaled_fields();
        let scaler = serde_json::json!({
            "feature_names": fields,
            "data_min": vec![0.0; fields.len()],
            "data_max": vec![100.0; fields.len()],
            "n_samples_seen": 125973,
        });
        fs::write(dir.join("scaler.json"), scaler.to_string()).unwrap();
    }

    fn write_manifest(dir: &Path, manifest: serde_json::Value) {
        fs::write(dir.join(MANIFEST_FILE), manifest.to_string()).unwrap();
    }

    #[test]
    fn test_manifest_defaults() {
        let dir = tempfile::tempdir().unwrap();
        write_manifest(
            dir.path(),
            serde_json::json!({"name": "nids-cnn", "version": "1.0.0", "schema": "selected"}),
        );

        let manifest = BundleManifest::load(dir.path()).unwrap();
        assert_eq!(manifest.schema, FeatureSchema::Selected);
        assert_eq!(manifest.service_encoding, ServiceEncoding::Static);
        assert_eq!(manifest.output, OutputConvention::Probability { threshold: 0.5 });
        assert_eq!(manifest.input_layout, InputLayout::Flat);
        assert_eq!(manifest.model_file, "model.onnx");
        assert_eq!(manifest.model_id(), "nids-cnn@1.0.0");
    }

    #[test]
    fn test_manifest_explicit_fields() {
        let dir = tempfile::tempdir().unwrap();
        write_manifest(
            dir.path(),
            serde_json::json!({
                "name": "kdd-forest",
                "version": "2",
                "schema": "kdd",
                "service_encoding": "label_encoder",
                "output": {"convention": "class_label"},
                "input_layout": "channels",
                "service_encoder_file": "service_encoder.json"
            }),
        );

        let manifest = BundleManifest::load(dir.path()).unwrap();
        assert_eq!(manifest.schema, FeatureSchema::Kdd);
        assert_eq!(manifest.service_encoding, ServiceEncoding::LabelEncoder);
        assert_eq!(manifest.output, OutputConvention::ClassLabel);
        assert_eq!(manifest.input_layout, InputLayout::Channels);
    }

    #[test]
    fn test_missing_manifest_is_artifact_error() {
        let dir = tempfile::tempdir().unwrap();
        let err = BundleManifest::load(dir.path()).unwrap_err();
        assert_eq!(err.kind(), "artifact_load");
    }

    #[test]
    fn test_unknown_schema_is_artifact_error() {
        let dir = tempfile::tempdir().unwrap();
        write_manifest(
            dir.path(),
            serde_json::json!({"name": "x", "version": "1", "schema": "nine_field"}),
        );
        assert_eq!(BundleManifest::load(dir.path()).unwrap_err().kind(), "artifact_load");
    }

    #[test]
    fn test_load_encoder_with_fitted_service_encoder() {
        let dir = tempfile::tempdir().unwrap();
        write_scaler(dir.path(), FeatureSchema::Kdd);
        fs::write(
            dir.path().join("service_encoder.json"),
            serde_json::json!({ "classes": SERVICES }).to_string(),
        )
        .unwrap();
        write_manifest(
            dir.path(),
            serde_json::json!({
                "name": "kdd", "version": "1", "schema": "kdd",
                "service_encoding": "label_encoder",
                "service_encoder_file": "service_encoder.json"
            }),
        );

        let manifest = BundleManifest::load(dir.path()).unwrap();
        let encoder = manifest.load_encoder(dir.path()).unwrap();
        assert_eq!(encoder.schema(), FeatureSchema::Kdd);
        assert_eq!(encoder.feature_count(), 53);
    }

    #[test]
    fn test_label_encoder_without_file_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        write_scaler(dir.path(), FeatureSchema::Selected);
        write_manifest(
            dir.path(),
            serde_json::json!({
                "name": "x", "version": "1", "schema": "selected",
                "service_encoding": "label_encoder"
            }),
        );

        let manifest = BundleManifest::load(dir.path()).unwrap();
        let err = manifest.load_encoder(dir.path()).unwrap_err();
        assert!(err.to_string().contains("service_encoder_file"));
    }

    #[test]
    fn test_scaler_from_other_schema_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        write_scaler(dir.path(), FeatureSchema::Reduced);
        write_manifest(
            dir.path(),
            serde_json::json!({"name": "x", "version": "1", "schema": "selected"}),
        );

        let manifest = BundleManifest::load(dir.path()).unwrap();
        match manifest.load_encoder(dir.path()).unwrap_err() {
            ClassifyError::ArtifactLoad { path, reason } => {
                assert!(path.ends_with("scaler.json"));
                assert!(reason.contains("missing"));
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn test_probability_output_skips_label_outputs() {
        let probability = OutputConvention::default();
        assert_eq!(
            select_output(&["output_label", "output_probability"], &probability),
            Some("output_probability")
        );
        assert_eq!(select_output(&["label", "dense_2"], &probability), Some("dense_2"));
        assert_eq!(select_output(&["logits", "output_0"], &probability), Some("output_0"));
        assert_eq!(select_output(&["output_label"], &probability), None);
        assert_eq!(select_output(&[], &probability), None);
    }

    #[test]
    fn test_class_label_output_selection() {
        let class_label = OutputConvention::ClassLabel;
        assert_eq!(
            select_output(&["output_probability", "output_label"], &class_label),
            Some("output_label")
        );
        assert_eq!(select_output(&["y"], &class_label), Some("y"));
    }

    #[test]
    fn test_missing_model_file_fails_bundle_load() {
        let dir = tempfile::tempdir().unwrap();
        write_scaler(dir.path(), FeatureSchema::Selected);
        write_manifest(
            dir.path(),
            serde_json::json!({"name": "x", "version": "1", "schema": "selected"}),
        );

        let err = ModelLoader::default().load_bundle(dir.path()).err().unwrap();
        match err {
            ClassifyError::ArtifactLoad { path, .. } => assert!(path.ends_with("model.onnx")),
            other => panic!("unexpected error: {other:?}"),
        }
    }
}
