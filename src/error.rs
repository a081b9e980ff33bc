use chrono::{DateTime, Utc};
use thiserror::Error;

/// Structural problems with a payload returned by a device.
#[derive(Debug, Error)]
pub enum PayloadError {
    #[error("payload is not a JSON object of columns")]
    NotAnObject,

    #[error("column {0:?} is not an object of row values")]
    ColumnNotObject(String),

    #[error("row {index} could not be decoded")]
    Row {
        index: String,
        #[source]
        source: serde_json::Error,
    },

    #[error("payload mixes readings from several devices: {0:?}")]
    MixedDevices(Vec<String>),
}

/// Failure while polling a single device.
///
/// Everything except [`PollError::Storage`] is confined to the device being
/// polled; a storage failure ends the loop.
#[derive(Debug, Error)]
pub enum PollError {
    #[error("device {0} is not registered")]
    UnknownDevice(String),

    #[error("request to {url} failed")]
    Request {
        url: String,
        #[source]
        source: reqwest::Error,
    },

    #[error("failed to read response from {url}")]
    Response {
        url: String,
        #[source]
        source: reqwest::Error,
    },

    #[error("device {polled} answered with readings of device {reported}")]
    DeviceMismatch { polled: String, reported: String },

    #[error("stored timestamp {0} is too late to poll after")]
    CursorOutOfRange(DateTime<Utc>),

    #[error("malformed payload")]
    Payload(#[from] PayloadError),

    #[error("storage failure: {0:#}")]
    Storage(anyhow::Error),
}

impl PollError {
    pub fn is_fatal(&self) -> bool {
        matches!(self, PollError::Storage(_))
    }
}
