//! Classification results

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Discrete classifier output
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Label {
    Normal,
    Anomaly,
}

impl Label {
    /// Display name used in verdicts
    pub fn as_str(&self) -> &'static str {
        match self {
            Label::Normal => "Normal",
            Label::Anomaly => "Anomaly",
        }
    }

    /// Check if this label flags an intrusion
    pub fn is_anomaly(&self) -> bool {
        matches!(self, Label::Anomaly)
    }
}

impl fmt::Display for Label {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Label plus the model's anomaly probability, when the model reports one
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Prediction {
    pub label: Label,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub score: Option<f64>,
}

/// Outcome of one submission
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "lowercase")]
pub enum Outcome {
    Classified {
        label: Label,
        #[serde(skip_serializing_if = "Option::is_none")]
        score: Option<f64>,
    },
    Rejected {
        kind: String,
        message: String,
    },
}

/// Verdict published for every decodable submission
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Verdict {
    /// Unique verdict identifier
    pub verdict_id: String,

    /// Identifier supplied with the record, if any
    #[serde(skip_serializing_if = "Option::is_none")]
    pub record_id: Option<String>,

    /// Model bundle that produced the verdict (`name@version`)
    pub model: String,

    #[serde(flatten)]
    pub outcome: Outcome,

    pub processed_at: DateTime<Utc>,
}

impl Verdict {
    /// Create a verdict for a scored record
    pub fn classified(record_id: Option<String>, model: &str, prediction: Prediction) -> Self {
        Self::new(
            record_id,
            model,
            Outcome::Classified {
                label: prediction.label,
                score: prediction.score,
            },
        )
    }

    /// Create a verdict for a record that could not be scored
    pub fn rejected(record_id: Option<String>, model: &str, kind: &str, message: String) -> Self {
        Self::new(
            record_id,
            model,
            Outcome::Rejected {
                kind: kind.to_string(),
                message,
            },
        )
    }

    fn new(record_id: Option<String>, model: &str, outcome: Outcome) -> Self {
        Self {
            verdict_id: uuid::Uuid::new_v4().to_string(),
            record_id,
            model: model.to_string(),
            outcome,
            processed_at: Utc::now(),
        }
    }

    /// Get the label, if the record was classified
    pub fn label(&self) -> Option<Label> {
        match &self.outcome {
            Outcome::Classified { label, .. } => Some(*label),
            Outcome::Rejected { .. } => None,
        }
    }
}
