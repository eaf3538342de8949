//! Feature layouts shared by the encoder and the model bundles.
//!
//! Every model is trained against one [`FeatureSchema`]. The schema fixes
//! which record fields are read, which numeric fields go through the
//! scaler, and the order of the encoded columns. Changing any of these
//! lists changes the model input and requires retraining.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Known `protocol_type` values, in one-hot column order.
pub const PROTOCOL_TYPES: &[&str] = &["icmp", "tcp", "udp"];

/// Known connection-state `flag` values, in one-hot column order.
pub const FLAGS: &[&str] = &[
    "OTH", "REJ", "RSTO", "RSTOS0", "RSTR", "S0", "S1", "S2", "S3", "SF", "SH",
];

/// Known `service` values. Position is the fixed service index, which is
/// the byte-wise sort order of the names (the order a label encoder fitted
/// on the training data produces).
pub const SERVICES: &[&str] = &[
    "IRC",         // 0
    "X11",         // 1
    "Z39_50",      // 2
    "auth",        // 3
    "bgp",         // 4
    "courier",     // 5
    "csnet_ns",    // 6
    "ctf",         // 7
    "daytime",     // 8
    "discard",     // 9
    "domain",      // 10
    "domain_u",    // 11
    "echo",        // 12
    "eco_i",       // 13
    "ecr_i",       // 14
    "efs",         // 15
    "exec",        // 16
    "finger",      // 17
    "ftp",         // 18
    "ftp_data",    // 19
    "gopher",      // 20
    "hostnames",   // 21
    "http",        // 22
    "http_443",    // 23
    "imap4",       // 24
    "iso_tsap",    // 25
    "klogin",      // 26
    "kshell",      // 27
    "ldap",        // 28
    "link",        // 29
    "login",       // 30
    "mtp",         // 31
    "name",        // 32
    "netbios_dgm", // 33
    "netbios_ns",  // 34
    "netbios_ssn", // 35
    "netstat",     // 36
    "nnsp",        // 37
    "nntp",        // 38
    "ntp_u",       // 39
    "other",       // 40
    "pm_dump",     // 41
    "pop_2",       // 42
    "pop_3",       // 43
    "printer",     // 44
    "private",     // 45
    "red_i",       // 46
    "remote_job",  // 47
    "rje",         // 48
    "shell",       // 49
    "smtp",        // 50
    "sql_net",     // 51
    "ssh",         // 52
    "sunrpc",      // 53
    "supdup",      // 54
    "systat",      // 55
    "telnet",      // 56
    "tftp_u",      // 57
    "tim_i",       // 58
    "time",        // 59
    "urh_i",       // 60
    "urp_i",       // 61
    "uucp",        // 62
    "uucp_path",   // 63
    "vmnet",       // 64
    "whois",       // 65
];

pub const PROTOCOL_FIELD: &str = "protocol_type";
pub const FLAG_FIELD: &str = "flag";
pub const SERVICE_FIELD: &str = "service";

/// Number of one-hot columns appended after the passthrough columns.
pub const ONE_HOT_WIDTH: usize = PROTOCOL_TYPES.len() + FLAGS.len();

/// Fixed service index lookup.
pub fn service_index(name: &str) -> Option<usize> {
    SERVICES.iter().position(|s| *s == name)
}

/// Fields of the full KDD Cup connection record, in dataset order.
const KDD_FIELDS: &[&str] = &[
    "duration",
    "protocol_type",
    "service",
    "flag",
    "src_bytes",
    "dst_bytes",
    "land",
    "wrong_fragment",
    "urgent",
    "hot",
    "num_failed_logins",
    "logged_in",
    "num_compromised",
    "root_shell",
    "su_attempted",
    "num_root",
    "num_file_creations",
    "num_shells",
    "num_access_files",
    "num_outbound_cmds",
    "is_host_login",
    "is_guest_login",
    "count",
    "srv_count",
    "serror_rate",
    "srv_serror_rate",
    "rerror_rate",
    "srv_rerror_rate",
    "same_srv_rate",
    "diff_srv_rate",
    "srv_diff_host_rate",
    "dst_host_count",
    "dst_host_srv_count",
    "dst_host_same_srv_rate",
    "dst_host_diff_srv_rate",
    "dst_host_same_src_port_rate",
    "dst_host_srv_diff_host_rate",
    "dst_host_serror_rate",
    "dst_host_srv_serror_rate",
    "dst_host_rerror_rate",
    "dst_host_srv_rerror_rate",
];

/// Binary indicator fields of the KDD record; passed through unscaled.
const KDD_UNSCALED: &[&str] = &[
    "land",
    "logged_in",
    "root_shell",
    "is_host_login",
    "is_guest_login",
];

const SELECTED_FIELDS: &[&str] = &[
    "count",
    "src_bytes",
    "service",
    "dst_bytes",
    "dst_host_same_src_port_rate",
    "srv_count",
    "logged_in",
    "dst_host_count",
    "protocol_type",
    "dst_host_srv_diff_host_rate",
    "same_srv_rate",
    "flag",
];

const SELECTED_SCALED: &[&str] = &[
    "count",
    "src_bytes",
    "dst_bytes",
    "dst_host_same_src_port_rate",
    "srv_count",
    "dst_host_count",
    "dst_host_srv_diff_host_rate",
    "same_srv_rate",
];

const REDUCED_FIELDS: &[&str] = &[
    "protocol_type",
    "service",
    "flag",
    "src_bytes",
    "dst_bytes",
    "count",
];

const REDUCED_SCALED: &[&str] = &["src_bytes", "dst_bytes", "count"];

/// Input layout a model was trained on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FeatureSchema {
    /// Three categorical fields plus byte counts and connection count
    Reduced,
    /// The twelve fields used by the deployed CNN model
    Selected,
    /// The complete 41-field KDD record
    Kdd,
}

/// How a single field of a schema is consumed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldKind {
    /// Expanded into indicator columns after the passthrough columns
    OneHot(&'static [&'static str]),
    /// Replaced by its service index
    Service,
    /// Numeric value run through the fitted scaler
    Scaled,
    /// Numeric value copied as-is
    Raw,
}

impl FeatureSchema {
    pub const ALL: [FeatureSchema; 3] = [
        FeatureSchema::Reduced,
        FeatureSchema::Selected,
        FeatureSchema::Kdd,
    ];

    /// Record fields read by this schema, in selection order.
    pub fn fields(self) -> &'static [&'static str] {
        match self {
            FeatureSchema::Reduced => REDUCED_FIELDS,
            FeatureSchema::Selected => SELECTED_FIELDS,
            FeatureSchema::Kdd => KDD_FIELDS,
        }
    }

    /// Numeric fields the scaler must cover.
    pub fn scaled_fields(self) -> Vec<&'static str> {
        match self {
            FeatureSchema::Reduced => REDUCED_SCALED.to_vec(),
            FeatureSchema::Selected => SELECTED_SCALED.to_vec(),
            FeatureSchema::Kdd => KDD_FIELDS
                .iter()
                .copied()
                .filter(|f| Self::is_numeric_name(f) && !KDD_UNSCALED.contains(f))
                .collect(),
        }
    }

    /// Numeric fields of this schema, in selection order.
    pub fn numeric_fields(self) -> Vec<&'static str> {
        self.fields()
            .iter()
            .copied()
            .filter(|f| Self::is_numeric_name(f))
            .collect()
    }

    /// How a field of this schema is encoded
    pub fn field_kind(self, field: &str) -> Option<FieldKind> {
        if !self.fields().iter().any(|f| *f == field) {
            return None;
        }
        let kind = match field {
            PROTOCOL_FIELD => FieldKind::OneHot(PROTOCOL_TYPES),
            FLAG_FIELD => FieldKind::OneHot(FLAGS),
            SERVICE_FIELD => FieldKind::Service,
            f if self.scaled_fields().iter().any(|s| *s == f) => FieldKind::Scaled,
            _ => FieldKind::Raw,
        };
        Some(kind)
    }

    /// Encoded column names in model input order: passthrough columns in
    /// selection order, then `protocol_type_*`, then `flag_*`.
    pub fn columns(self) -> Vec<String> {
        let mut columns: Vec<String> = self
            .fields()
            .iter()
            .filter(|f| **f != PROTOCOL_FIELD && **f != FLAG_FIELD)
            .map(|f| f.to_string())
            .collect();
        columns.extend(PROTOCOL_TYPES.iter().map(|p| format!("{PROTOCOL_FIELD}_{p}")));
        columns.extend(FLAGS.iter().map(|f| format!("{FLAG_FIELD}_{f}")));
        columns
    }

    /// Width of the encoded vector.
    pub fn width(self) -> usize {
        self.fields().len() - 2 + ONE_HOT_WIDTH
    }

    /// Name used in bundle manifests
    pub fn name(self) -> &'static str {
        match self {
            FeatureSchema::Reduced => "reduced",
            FeatureSchema::Selected => "selected",
            FeatureSchema::Kdd => "kdd",
        }
    }

    fn is_numeric_name(field: &str) -> bool {
        !matches!(field, PROTOCOL_FIELD | FLAG_FIELD | SERVICE_FIELD)
    }
}

impl fmt::Display for FeatureSchema {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}
