//! Network intrusion classifier
//!
//! Encodes KDD-style connection records into the exact input layout a
//! pre-trained model expects and scores them as `Normal` or `Anomaly`.

pub mod config;
pub mod consumer;
pub mod error;
pub mod feature_encoder;
pub mod metrics;
pub mod models;
pub mod producer;
pub mod schema;
pub mod service;
pub mod types;

pub use config::AppConfig;
pub use consumer::RecordConsumer;
pub use error::ClassifyError;
pub use feature_encoder::{EncodedVector, FeatureEncoder};
pub use models::inference::InferenceInvoker;
pub use producer::VerdictProducer;
pub use schema::FeatureSchema;
pub use service::DetectionService;
pub use types::{record::TrafficRecord, verdict::Label, verdict::Prediction, verdict::Verdict};
