//! Model artifacts, bundle loading and inference

pub mod artifacts;
pub mod inference;
pub mod loader;

pub use artifacts::{LabelEncoder, MinMaxScaler, ServiceEncoder};
pub use inference::{InferenceInvoker, InputLayout, OnnxModel, OutputConvention, Scorer};
pub use loader::{BundleManifest, ModelBundle, ModelLoader, ServiceEncoding};
