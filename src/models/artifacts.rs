//! Fitted preprocessing artifacts exported from the training pipeline.
//!
//! Both artifacts are plain JSON dumps of the fitted scikit-learn objects:
//! a `MinMaxScaler` (`data_min_`, `data_max_`, `feature_range`) and an
//! optional `LabelEncoder` (`classes_`) for the `service` field.

use crate::error::{ClassifyError, Result};
use crate::schema::{self, SERVICES};
use serde::Deserialize;
use std::collections::{HashMap, HashSet};
use std::path::Path;
use tracing::{info, warn};

#[derive(Debug, Deserialize)]
struct ScalerFile {
    feature_names: Vec<String>,
    data_min: Vec<f64>,
    data_max: Vec<f64>,
    #[serde(default = "default_feature_range")]
    feature_range: (f64, f64),
    #[serde(default)]
    n_samples_seen: Option<u64>,
    #[serde(default)]
    clip: bool,
}

fn default_feature_range() -> (f64, f64) {
    (0.0, 1.0)
}

/// Per-feature affine transform derived from the fitted range
#[derive(Debug, Clone, Copy, PartialEq)]
struct FeatureScale {
    scale: f64,
    offset: f64,
}

/// Min-max scaler fitted offline on the training distribution.
///
/// `transform(x) = x * scale + offset` with
/// `scale = (hi - lo) / (data_max - data_min)` and
/// `offset = lo - data_min * scale`. A feature with zero fitted range gets
/// `scale = hi - lo`, matching scikit-learn.
#[derive(Debug, Clone)]
pub struct MinMaxScaler {
    features: HashMap<String, FeatureScale>,
    names: Vec<String>,
    feature_range: (f64, f64),
    clip: bool,
}

impl MinMaxScaler {
    /// Load a fitted scaler from its JSON export
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let raw: ScalerFile = read_json(path)?;

        let scaler = Self::fit_from_ranges(
            raw.feature_names,
            raw.data_min,
            raw.data_max,
            raw.feature_range,
            raw.n_samples_seen,
        )
        .map_err(|reason| ClassifyError::artifact(path, reason))?
        .with_clip(raw.clip);

        info!(
            path = %path.display(),
            features = scaler.names.len(),
            clip = scaler.clip,
            "Scaler loaded"
        );
        Ok(scaler)
    }

    /// Build a scaler from fitted per-feature ranges.
    ///
    /// Rejects fits that carry no information: a fit over a single sample,
    /// or one where every feature has a zero range.
    pub fn fit_from_ranges(
        names: Vec<String>,
        data_min: Vec<f64>,
        data_max: Vec<f64>,
        feature_range: (f64, f64),
        n_samples_seen: Option<u64>,
    ) -> std::result::Result<Self, String> {
        if names.len() != data_min.len() || names.len() != data_max.len() {
            return Err(format!(
                "feature_names, data_min and data_max lengths differ ({}, {}, {})",
                names.len(),
                data_min.len(),
                data_max.len()
            ));
        }
        if names.is_empty() {
            return Err("scaler has no features".to_string());
        }
        let (lo, hi) = feature_range;
        if !(lo < hi) {
            return Err(format!("invalid feature_range ({lo}, {hi})"));
        }
        if n_samples_seen == Some(1) {
            return Err("scaler was fitted on a single sample".to_string());
        }

        let mut features = HashMap::with_capacity(names.len());
        let mut constant = Vec::new();
        for ((name, &min), &max) in names.iter().zip(&data_min).zip(&data_max) {
            if !min.is_finite() || !max.is_finite() || min > max {
                return Err(format!("invalid fitted range for {name}: [{min}, {max}]"));
            }
            let mut range = max - min;
            if range == 0.0 {
                constant.push(name.clone());
                range = 1.0;
            }
            let scale = (hi - lo) / range;
            let entry = FeatureScale {
                scale,
                offset: lo - min * scale,
            };
            if features.insert(name.clone(), entry).is_some() {
                return Err(format!("duplicate feature {name}"));
            }
        }

        if constant.len() == names.len() {
            return Err("every feature has a zero fitted range (single-row fit)".to_string());
        }
        if !constant.is_empty() {
            warn!(features = ?constant, "Scaler features with zero fitted range");
        }

        Ok(Self {
            features,
            names,
            feature_range,
            clip: false,
        })
    }

    /// Clamp transformed values to the feature range
    pub fn with_clip(mut self, clip: bool) -> Self {
        self.clip = clip;
        self
    }

    /// Scale one feature value; `None` if the scaler was not fitted on it.
    pub fn transform(&self, feature: &str, value: f64) -> Option<f64> {
        let fs = self.features.get(feature)?;
        let scaled = value * fs.scale + fs.offset;
        if self.clip {
            Some(scaled.clamp(self.feature_range.0, self.feature_range.1))
        } else {
            Some(scaled)
        }
    }

    /// Fitted feature names, in file order
    pub fn feature_names(&self) -> &[String] {
        &self.names
    }

    /// Check the scaler covers exactly the given fields.
    pub fn ensure_covers(&self, fields: &[&str]) -> std::result::Result<(), String> {
        let fitted: HashSet<&str> = self.names.iter().map(String::as_str).collect();
        let expected: HashSet<&str> = fields.iter().copied().collect();

        let mut missing: Vec<&str> = expected.difference(&fitted).copied().collect();
        let mut extra: Vec<&str> = fitted.difference(&expected).copied().collect();
        if missing.is_empty() && extra.is_empty() {
            return Ok(());
        }
        missing.sort_unstable();
        extra.sort_unstable();
        Err(format!(
            "scaler features do not match the schema (missing: {missing:?}, unexpected: {extra:?})"
        ))
    }
}

#[derive(Debug, Deserialize)]
struct LabelEncoderFile {
    classes: Vec<String>,
}

/// Fitted label encoder: a class's index is its position in `classes`.
#[derive(Debug, Clone)]
pub struct LabelEncoder {
    index: HashMap<String, usize>,
}

impl LabelEncoder {
    /// Load a fitted encoder from its JSON export
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let raw: LabelEncoderFile = read_json(path)?;
        let encoder =
            Self::from_classes(raw.classes).map_err(|reason| ClassifyError::artifact(path, reason))?;
        info!(path = %path.display(), classes = encoder.index.len(), "Service encoder loaded");
        Ok(encoder)
    }

    /// Build from fitted classes, which must be exactly the known services.
    pub fn from_classes(classes: Vec<String>) -> std::result::Result<Self, String> {
        let mut index = HashMap::with_capacity(classes.len());
        for (i, class) in classes.into_iter().enumerate() {
            if schema::service_index(&class).is_none() {
                return Err(format!("unknown service class {class:?}"));
            }
            if index.insert(class.clone(), i).is_some() {
                return Err(format!("duplicate service class {class:?}"));
            }
        }
        if index.len() != SERVICES.len() {
            let missing: Vec<&str> = SERVICES
                .iter()
                .copied()
                .filter(|s| !index.contains_key(*s))
                .collect();
            return Err(format!("service classes missing: {missing:?}"));
        }
        Ok(Self { index })
    }

    /// Index of a class, if it was seen during fitting
    pub fn encode(&self, class: &str) -> Option<usize> {
        self.index.get(class).copied()
    }
}

/// Mapping from service name to the single numeric `service` column
#[derive(Debug, Clone)]
pub enum ServiceEncoder {
    /// Built-in sorted-name table
    Static,
    /// Encoder fitted during training
    Fitted(LabelEncoder),
}

impl ServiceEncoder {
    /// Numeric value of the `service` column
    pub fn encode(&self, service: &str) -> Option<usize> {
        match self {
            ServiceEncoder::Static => schema::service_index(service),
            ServiceEncoder::Fitted(encoder) => encoder.encode(service),
        }
    }
}

pub(crate) fn read_json<T: serde::de::DeserializeOwned>(path: &Path) -> Result<T> {
    let bytes = std::fs::read(path).map_err(|e| ClassifyError::artifact(path, e))?;
    serde_json::from_slice(&bytes).map_err(|e| ClassifyError::artifact(path, e))
}
