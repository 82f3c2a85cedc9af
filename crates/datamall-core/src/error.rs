use std::io;

use thiserror::Error;

use crate::secret_store::SecretStoreError;

#[derive(Debug, Error)]
pub enum DataMallError {
    #[error("network error requesting {url}: {source}")]
    Network {
        url: String,
        #[source]
        source: reqwest::Error,
    },
    #[error("request to {url} timed out")]
    Timeout { url: String },
    #[error("{url} responded with {status}")]
    HttpStatus {
        url: String,
        status: reqwest::StatusCode,
    },
    #[error("malformed response from {url}: {reason}")]
    MalformedResponse { url: String, reason: String },
    #[error("unknown {group} dataset '{key}' (expected one of: {expected})")]
    UnknownDataset {
        group: &'static str,
        key: String,
        expected: String,
    },
    #[error("invalid reporting period '{0}' (expected YYYYMM)")]
    InvalidPeriod(String),
    #[error("schema mismatch in {dataset}: record {row} has no '{column}' field")]
    SchemaMismatch {
        dataset: &'static str,
        column: &'static str,
        row: usize,
    },
    #[error("no report available for {dataset}{}", period_suffix(.period))]
    EmptyResult {
        dataset: &'static str,
        period: Option<String>,
    },
    #[error("failed to open {url}: {source}")]
    Browser {
        url: String,
        #[source]
        source: io::Error,
    },
    #[error("configuration error: {0}")]
    Config(String),
    #[error("secret storage error: {0}")]
    Secret(#[from] SecretStoreError),
    #[error("IO error: {0}")]
    Io(#[from] io::Error),
    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),
    #[error("{failed} of {total} steps failed")]
    PartialFailure { failed: usize, total: usize },
}

fn period_suffix(period: &Option<String>) -> String {
    match period {
        Some(period) => format!(" in period {period}"),
        None => String::new(),
    }
}

impl DataMallError {
    /// Classify a transport failure, keeping timeouts distinct from other network errors.
    pub fn from_transport(url: &str, err: reqwest::Error) -> Self {
        if err.is_timeout() {
            DataMallError::Timeout {
                url: url.to_string(),
            }
        } else {
            DataMallError::Network {
                url: url.to_string(),
                source: err,
            }
        }
    }

    pub fn malformed<T: Into<String>>(url: &str, reason: T) -> Self {
        DataMallError::MalformedResponse {
            url: url.to_string(),
            reason: reason.into(),
        }
    }
}
