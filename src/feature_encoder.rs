//! Feature encoding for intrusion model inference.
//!
//! Turns a raw traffic record into the single-row numeric vector a model
//! was trained on: column selection, one-hot expansion of `protocol_type`
//! and `flag`, service index encoding, and min-max scaling of the schema's
//! scaled fields. Column order is fixed by the [`FeatureSchema`].

use crate::error::{ClassifyError, Result};
use crate::models::artifacts::{MinMaxScaler, ServiceEncoder};
use crate::schema::{FeatureSchema, FieldKind, PROTOCOL_FIELD, PROTOCOL_TYPES};
use crate::types::record::{FieldValue, TrafficRecord};
use std::sync::Arc;

/// One encoded row, tagged with the schema it was built for.
#[derive(Debug, Clone, PartialEq)]
pub struct EncodedVector {
    schema: FeatureSchema,
    columns: Arc<[String]>,
    values: Vec<f32>,
}

impl EncodedVector {
    /// Schema the row was encoded for
    pub fn schema(&self) -> FeatureSchema {
        self.schema
    }

    /// Column names in model input order
    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    /// Column values, aligned with `columns`
    pub fn values(&self) -> &[f32] {
        &self.values
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// Value of a named column
    pub fn get(&self, column: &str) -> Option<f32> {
        self.columns
            .iter()
            .position(|c| c == column)
            .map(|i| self.values[i])
    }
}

#[derive(Debug, Clone, Copy)]
enum Step {
    Scaled(&'static str),
    Raw(&'static str),
    Service(&'static str),
    OneHot {
        field: &'static str,
        categories: &'static [&'static str],
        offset: usize,
    },
}

impl Step {
    fn field(&self) -> &'static str {
        match *self {
            Step::Scaled(f) | Step::Raw(f) | Step::Service(f) => f,
            Step::OneHot { field, .. } => field,
        }
    }

    fn is_categorical(&self) -> bool {
        matches!(self, Step::Service(_) | Step::OneHot { .. })
    }
}

/// Encoder bound to one schema and its fitted artifacts.
///
/// Immutable after construction; `encode` is a pure function of the
/// record.
#[derive(Debug, Clone)]
pub struct FeatureEncoder {
    schema: FeatureSchema,
    scaler: MinMaxScaler,
    services: ServiceEncoder,
    steps: Vec<Step>,
    columns: Arc<[String]>,
    passthrough: usize,
}

impl FeatureEncoder {
    /// Create an encoder; the scaler must cover exactly the schema's
    /// scaled fields.
    pub fn new(schema: FeatureSchema, scaler: MinMaxScaler, services: ServiceEncoder) -> Result<Self> {
        scaler
            .ensure_covers(&schema.scaled_fields())
            .map_err(|reason| ClassifyError::artifact("scaler", reason))?;

        let mut steps = Vec::with_capacity(schema.fields().len());
        let mut one_hot_width = 0;
        for &field in schema.fields() {
            let step = match schema.field_kind(field) {
                Some(FieldKind::Scaled) => Step::Scaled(field),
                Some(FieldKind::Service) => Step::Service(field),
                Some(FieldKind::OneHot(categories)) => {
                    one_hot_width += categories.len();
                    // protocol_type columns come first, then flag
                    let offset = if field == PROTOCOL_FIELD {
                        0
                    } else {
                        PROTOCOL_TYPES.len()
                    };
                    Step::OneHot {
                        field,
                        categories,
                        offset,
                    }
                }
                Some(FieldKind::Raw) | None => Step::Raw(field),
            };
            steps.push(step);
        }

        let columns: Arc<[String]> = schema.columns().into();
        let passthrough = columns.len() - one_hot_width;

        Ok(Self {
            schema,
            scaler,
            services,
            steps,
            columns,
            passthrough,
        })
    }

    /// Get the schema this encoder produces
    pub fn schema(&self) -> FeatureSchema {
        self.schema
    }

    /// Number of encoded columns
    pub fn feature_count(&self) -> usize {
        self.columns.len()
    }

    /// Encoded column names in model input order
    pub fn feature_names(&self) -> &[String] {
        &self.columns
    }

    /// Check that every field the schema reads is present, non-empty and
    /// of the right type. All problems are reported together.
    pub fn validate(&self, record: &TrafficRecord) -> Result<()> {
        let mut problems = Vec::new();

        for step in &self.steps {
            let field = step.field();
            match record.get(field) {
                None => problems.push(format!("missing field {field}")),
                Some(value) if value.is_empty() => problems.push(format!("empty field {field}")),
                Some(FieldValue::Text(_)) if step.is_categorical() => {}
                Some(_) if step.is_categorical() => problems.push(format!("field {field} must be text")),
                Some(_) => match record.number(field) {
                    Some(n) if !n.is_finite() => {
                        problems.push(format!("field {field} must be a finite number"))
                    }
                    Some(n) if !fits_f32(n) => problems.push(format!("field {field} is out of range")),
                    Some(_) => {}
                    None => problems.push(format!("field {field} must be a finite number")),
                },
            }
        }

        if problems.is_empty() {
            Ok(())
        } else {
            Err(ClassifyError::Validation { problems })
        }
    }

    /// Encode a record into the model's input row.
    pub fn encode(&self, record: &TrafficRecord) -> Result<EncodedVector> {
        self.validate(record)?;

        let mut values = vec![0.0_f32; self.columns.len()];
        let mut cursor = 0;

        for step in &self.steps {
            match *step {
                Step::Scaled(field) => {
                    let raw = number(record, field)?;
                    let scaled = self.scaler.transform(field, raw).ok_or_else(|| {
                        ClassifyError::artifact("scaler", format!("not fitted on {field}"))
                    })?;
                    values[cursor] = column_value(field, scaled)?;
                    cursor += 1;
                }
                Step::Raw(field) => {
                    values[cursor] = column_value(field, number(record, field)?)?;
                    cursor += 1;
                }
                Step::Service(field) => {
                    let name = text(record, field)?;
                    let index =
                        self.services
                            .encode(name)
                            .ok_or_else(|| ClassifyError::UnknownCategory {
                                field,
                                value: name.to_string(),
                            })?;
                    values[cursor] = index as f32;
                    cursor += 1;
                }
                Step::OneHot {
                    field,
                    categories,
                    offset,
                } => {
                    let value = text(record, field)?;
                    let position = categories.iter().position(|c| *c == value).ok_or_else(|| {
                        ClassifyError::UnknownCategory {
                            field,
                            value: value.to_string(),
                        }
                    })?;
                    values[self.passthrough + offset + position] = 1.0;
                }
            }
        }

        Ok(EncodedVector {
            schema: self.schema,
            columns: Arc::clone(&self.columns),
            values,
        })
    }
}

fn number(record: &TrafficRecord, field: &'static str) -> Result<f64> {
    record.number(field).ok_or_else(|| ClassifyError::Validation {
        problems: vec![format!("field {field} must be a finite number")],
    })
}

/// True when the value survives narrowing to the model's `f32` input.
fn fits_f32(value: f64) -> bool {
    (value as f32).is_finite()
}

fn column_value(field: &'static str, value: f64) -> Result<f32> {
    if fits_f32(value) {
        Ok(value as f32)
    } else {
        Err(ClassifyError::Validation {
            problems: vec![format!("field {field} is out of range")],
        })
    }
}

fn text<'a>(record: &'a TrafficRecord, field: &'static str) -> Result<&'a str> {
    record
        .text(field)
        .map(str::trim)
        .ok_or_else(|| ClassifyError::Validation {
            problems: vec![format!("field {field} must be text")],
        })
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::schema::{FLAGS, SERVICES};

    pub(crate) fn selected_scaler() -> MinMaxScaler {
        let fields = FeatureSchema::Selected.scaled_fields();
        MinMaxScaler::fit_from_ranges(
            fields.iter().map(|s| s.to_string()).collect(),
            vec![0.0; fields.len()],
            vec![100.0, 1000.0, 1000.0, 1.0, 100.0, 255.0, 1.0, 1.0],
            (0.0, 1.0),
            Some(125_973),
        )
        .unwrap()
    }

    fn encoder() -> FeatureEncoder {
        FeatureEncoder::new(FeatureSchema::Selected, selected_scaler(), ServiceEncoder::Static).unwrap()
    }

    pub(crate) fn sample_record() -> TrafficRecord {
        TrafficRecord::new()
            .with("protocol_type", "tcp")
            .with("service", "http")
            .with("flag", "SF")
            .with("count", 10.0)
            .with("src_bytes", 500.0)
            .with("dst_bytes", 300.0)
            .with("dst_host_same_src_port_rate", 0.1)
            .with("srv_count", 5.0)
            .with("logged_in", 1.0)
            .with("dst_host_count", 20.0)
            .with("dst_host_srv_diff_host_rate", 0.0)
            .with("same_srv_rate", 1.0)
    }

    fn one_hot_sum(vector: &EncodedVector, prefix: &str) -> f32 {
        vector
            .columns()
            .iter()
            .zip(vector.values())
            .filter(|(c, _)| c.starts_with(prefix))
            .map(|(_, v)| *v)
            .sum()
    }

    #[test]
    fn test_sample_record_encoding() {
        let encoder = encoder();
        let vector = encoder.encode(&sample_record()).unwrap();

        assert_eq!(vector.len(), encoder.feature_count());
        assert_eq!(vector.len(), 24);
        assert_eq!(vector.schema(), FeatureSchema::Selected);

        assert_eq!(vector.get("protocol_type_tcp"), Some(1.0));
        assert_eq!(vector.get("protocol_type_udp"), Some(0.0));
        assert_eq!(vector.get("protocol_type_icmp"), Some(0.0));
        assert_eq!(vector.get("flag_SF"), Some(1.0));
        assert_eq!(one_hot_sum(&vector, "flag_"), 1.0);

        assert_eq!(vector.get("service"), Some(22.0));
        assert_eq!(vector.get("count"), Some(0.1));
        assert_eq!(vector.get("src_bytes"), Some(0.5));
        assert_eq!(vector.get("dst_bytes"), Some(0.3));
        assert_eq!(vector.get("same_srv_rate"), Some(1.0));
        // logged_in is not in the scaled subset
        assert_eq!(vector.get("logged_in"), Some(1.0));
    }

    #[test]
    fn test_every_category_yields_single_hot_column() {
        let encoder = encoder();
        for protocol in PROTOCOL_TYPES {
            for flag in FLAGS {
                let mut record = sample_record();
                record.set("protocol_type", *protocol);
                record.set("flag", *flag);

                let vector = encoder.encode(&record).unwrap();
                assert_eq!(vector.columns(), encoder.feature_names());
                assert_eq!(one_hot_sum(&vector, "protocol_type_"), 1.0);
                assert_eq!(one_hot_sum(&vector, "flag_"), 1.0);
                assert_eq!(vector.get(&format!("protocol_type_{protocol}")), Some(1.0));
                assert_eq!(vector.get(&format!("flag_{flag}")), Some(1.0));
            }
        }
    }

    #[test]
    fn test_encoding_is_deterministic() {
        let encoder = encoder();
        let first = encoder.encode(&sample_record()).unwrap();
        for _ in 0..10 {
            let again = encoder.encode(&sample_record()).unwrap();
            let lhs: Vec<u32> = first.values().iter().map(|v| v.to_bits()).collect();
            let rhs: Vec<u32> = again.values().iter().map(|v| v.to_bits()).collect();
            assert_eq!(lhs, rhs);
            assert_eq!(first.columns(), again.columns());
        }
    }

    #[test]
    fn test_every_service_encodes_to_its_index() {
        let encoder = encoder();
        for (i, service) in SERVICES.iter().enumerate() {
            let record = sample_record().with("service", *service);
            let vector = encoder.encode(&record).unwrap();
            assert_eq!(vector.get("service"), Some(i as f32));
        }
    }

    #[test]
    fn test_unknown_service_is_rejected() {
        let record = sample_record().with("service", "bogus");
        let err = encoder().encode(&record).unwrap_err();

        match err {
            ClassifyError::UnknownCategory { field, value } => {
                assert_eq!(field, "service");
                assert_eq!(value, "bogus");
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn test_unknown_protocol_and_flag_are_rejected() {
        let err = encoder()
            .encode(&sample_record().with("protocol_type", "sctp"))
            .unwrap_err();
        assert_eq!(err.kind(), "unknown_category");

        let err = encoder().encode(&sample_record().with("flag", "XYZ")).unwrap_err();
        assert!(matches!(err, ClassifyError::UnknownCategory { field: "flag", .. }));
    }

    #[test]
    fn test_missing_numeric_field_fails_validation() {
        let mut record = sample_record();
        record.remove("dst_bytes");
        record.set("srv_count", FieldValue::Null);

        match encoder().encode(&record).unwrap_err() {
            ClassifyError::Validation { problems } => {
                assert_eq!(problems.len(), 2);
                assert!(problems.iter().any(|p| p.contains("dst_bytes")));
                assert!(problems.iter().any(|p| p.contains("srv_count")));
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn test_validation_precedes_category_checks() {
        let mut record = sample_record().with("service", "bogus");
        record.remove("count");
        let err = encoder().encode(&record).unwrap_err();
        assert_eq!(err.kind(), "validation");
    }

    #[test]
    fn test_type_errors_fail_validation() {
        let record = sample_record()
            .with("count", "many")
            .with("flag", 3.0)
            .with("service", "");
        match encoder().validate(&record).unwrap_err() {
            ClassifyError::Validation { problems } => assert_eq!(problems.len(), 3),
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn test_values_beyond_f32_range_fail_validation() {
        let record = sample_record().with("src_bytes", 1e300).with("logged_in", -1e39);
        match encoder().encode(&record).unwrap_err() {
            ClassifyError::Validation { problems } => {
                assert_eq!(problems.len(), 2);
                assert!(problems.iter().all(|p| p.contains("out of range")));
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn test_scaled_overflow_fails_validation() {
        let scaler = MinMaxScaler::fit_from_ranges(
            vec!["src_bytes".into(), "dst_bytes".into(), "count".into()],
            vec![0.0, 0.0, 0.0],
            vec![1e-30, 1000.0, 100.0],
            (0.0, 1.0),
            None,
        )
        .unwrap();
        let encoder =
            FeatureEncoder::new(FeatureSchema::Reduced, scaler, ServiceEncoder::Static).unwrap();
        let err = encoder.encode(&sample_record().with("src_bytes", 1e30)).unwrap_err();
        assert_eq!(err.kind(), "validation");
        assert!(err.to_string().contains("src_bytes"));
    }

    #[test]
    fn test_form_style_values() {
        let encoder = encoder();
        let plain = encoder.encode(&sample_record()).unwrap();
        let checkbox = encoder
            .encode(&sample_record().with("logged_in", true))
            .unwrap();
        assert_eq!(plain, checkbox);

        let nested = sample_record()
            .with("service", FieldValue::Other(serde_json::json!({"name": "http"})))
            .with("count", FieldValue::Other(serde_json::json!([10])));
        match encoder.validate(&nested).unwrap_err() {
            ClassifyError::Validation { problems } => {
                assert_eq!(problems.len(), 2);
                assert!(problems.iter().any(|p| p == "field service must be text"));
                assert!(problems.iter().any(|p| p == "field count must be a finite number"));
            }
            other => panic!("unexpected error: {other:?}"),
        }

        let ignored = sample_record().with("meta", FieldValue::Other(serde_json::json!({"ui": "form"})));
        assert_eq!(encoder.encode(&ignored).unwrap(), plain);
    }

    #[test]
    fn test_extra_fields_are_ignored() {
        let encoder = encoder();
        let plain = encoder.encode(&sample_record()).unwrap();
        let noisy = encoder
            .encode(&sample_record().with("duration", 12.0).with("username", "admin"))
            .unwrap();
        assert_eq!(plain, noisy);
    }

    #[test]
    fn test_scaler_must_match_schema() {
        let err = FeatureEncoder::new(FeatureSchema::Reduced, selected_scaler(), ServiceEncoder::Static)
            .unwrap_err();
        assert_eq!(err.kind(), "artifact_load");
    }

    #[test]
    fn test_reduced_schema_layout() {
        let scaler = MinMaxScaler::fit_from_ranges(
            vec!["src_bytes".into(), "dst_bytes".into(), "count".into()],
            vec![0.0, 0.0, 0.0],
            vec![1000.0, 1000.0, 100.0],
            (0.0, 1.0),
            None,
        )
        .unwrap();
        let encoder =
            FeatureEncoder::new(FeatureSchema::Reduced, scaler, ServiceEncoder::Static).unwrap();
        let vector = encoder.encode(&sample_record()).unwrap();

        assert_eq!(vector.len(), 18);
        assert_eq!(&vector.values()[..4], &[22.0, 0.5, 0.3, 0.1]);
        assert_eq!(vector.get("protocol_type_tcp"), Some(1.0));
    }
}
