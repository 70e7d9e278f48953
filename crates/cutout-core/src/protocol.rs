//! Messages exchanged with the background-removal web worker.
//!
//! The main thread posts a JS object with:
//! - `imageBytes`: `Uint8Array` with the encoded source image
//! - `configJson`: `String`, a JSON-serialized [`MatteConfig`]
//! - `generation`: `f64`, echoed on every reply
//!
//! The worker replies any number of times with:
//! - `generation`: `f64` matching the request
//! - `eventJson`: `String`, a JSON-serialized [`WorkerEvent`]
//! - `outputBytes`: `Uint8Array`, only alongside [`WorkerEvent::Finished`]
//!
//! Replies without a `generation` concern the worker itself rather than
//! a run: [`WorkerEvent::Ready`] once it listens for requests, or
//! [`WorkerEvent::Failed`] when its module could not be instantiated.
//! Requests posted before `ready` are lost, so the main thread holds
//! them back until it arrives.
//!
//! Image data travels as raw buffers; only the small control part is
//! JSON.

use serde::{Deserialize, Serialize};

use crate::config::MatteConfig;

/// Request field holding the source image bytes.
pub const IMAGE_BYTES: &str = "imageBytes";
/// Request field holding the JSON [`MatteConfig`].
pub const CONFIG_JSON: &str = "configJson";
/// Field present on requests and replies identifying the run.
pub const GENERATION: &str = "generation";
/// Reply field holding the JSON [`WorkerEvent`].
pub const EVENT_JSON: &str = "eventJson";
/// Reply field holding the encoded output image.
pub const OUTPUT_BYTES: &str = "outputBytes";

/// One reply from the worker.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum WorkerEvent {
    /// The worker has installed its message handler.
    Ready,
    /// Work units completed so far.
    Progress {
        /// Units done.
        current: u64,
        /// Units in total.
        total: u64,
    },
    /// The output is attached as `outputBytes`.
    Finished,
    /// The run failed. `message` is for logs only.
    Failed {
        /// Cause of the failure.
        message: String,
    },
}

impl WorkerEvent {
    /// Whether this event ends the run.
    #[must_use]
    pub const fn is_terminal(&self) -> bool {
        matches!(self, Self::Finished | Self::Failed { .. })
    }
}

/// Serialize a matte config for the `configJson` field.
///
/// # Errors
///
/// Returns the `serde_json` error if serialization fails.
pub fn encode_config(config: &MatteConfig) -> Result<String, serde_json::Error> {
    serde_json::to_string(config)
}

/// Parse the `configJson` field. An absent field means defaults.
///
/// # Errors
///
/// Returns the `serde_json` error for malformed JSON.
pub fn decode_config(json: Option<&str>) -> Result<MatteConfig, serde_json::Error> {
    json.map_or_else(|| Ok(MatteConfig::default()), serde_json::from_str)
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn events_are_tagged_by_kind() {
        let json = serde_json::to_string(&WorkerEvent::Progress { current: 3, total: 9 }).unwrap();
        assert_eq!(json, r#"{"kind":"progress","current":3,"total":9}"#);
        assert_eq!(
            serde_json::from_str::<WorkerEvent>(r#"{"kind":"finished"}"#).unwrap(),
            WorkerEvent::Finished
        );
        assert_eq!(serde_json::to_string(&WorkerEvent::Ready).unwrap(), r#"{"kind":"ready"}"#);
    }

    #[test]
    fn unknown_kind_is_rejected() {
        assert!(serde_json::from_str::<WorkerEvent>(r#"{"kind":"paused"}"#).is_err());
    }

    #[test]
    fn only_outcomes_are_terminal() {
        assert!(!WorkerEvent::Progress { current: 0, total: 1 }.is_terminal());
        assert!(!WorkerEvent::Ready.is_terminal());
        assert!(WorkerEvent::Finished.is_terminal());
        assert!(WorkerEvent::Failed { message: String::new() }.is_terminal());
    }

    #[test]
    fn missing_config_means_defaults() {
        assert_eq!(decode_config(None).unwrap(), MatteConfig::default());
        let custom = MatteConfig {
            tolerance: 12.5,
            feather: false,
        };
        let json = encode_config(&custom).unwrap();
        assert_eq!(decode_config(Some(&json)).unwrap(), custom);
        assert!(decode_config(Some("{oops")).is_err());
    }
}
