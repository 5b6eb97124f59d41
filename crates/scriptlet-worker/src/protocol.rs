//! Message vocabulary and request parsing for the host protocol.
//!
//! Every literal exchanged with the host lives in [`ProtocolVocabulary`]
//! so deployments can match a host that speaks a different dialect. The
//! defaults match the reference host byte for byte.

use serde::{Deserialize, Serialize};

/// Largest line count accepted in the legacy request shape.
pub const MAX_LEGACY_LINES: usize = 1 << 20;

/// Literal strings exchanged with the host.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct ProtocolVocabulary {
    /// Host reply that accepts the token.
    pub token_accepted: String,
    /// Host reply that rejects the token.
    pub token_declined: String,
    /// Order that starts the execute sub-protocol.
    pub order_execute: String,
    /// Orders that stop the worker.
    pub order_stop: Vec<String>,
    /// Worker acknowledgment before the request is sent.
    pub ready_to_execute: String,
    /// Worker acknowledgment of a legacy line count.
    pub length_received: String,
    /// Envelope `command` value that requests execution.
    pub execute_command: String,
    /// Status after a successful run.
    pub run_succeeded: String,
    /// Status after a failed script.
    pub run_failed: String,
    /// Status when outputs could not be persisted.
    pub finalize_failed: String,
    /// Status for a request that could not be understood.
    pub malformed_request: String,
    /// Last message before the worker disconnects.
    pub shutdown_notice: String,
}

impl Default for ProtocolVocabulary {
    fn default() -> Self {
        let run_failed = "Error when executing the script. Waiting for next task.".to_string();
        Self {
            token_accepted: "Token accepted.".into(),
            token_declined: "Token declined.".into(),
            order_execute: "executeUserscript".into(),
            order_stop: vec!["stopInstance".into(), "stopInstanceRun".into()],
            ready_to_execute: "ReadyToExecuteScript".into(),
            length_received: "ReceivedScriptLength".into(),
            execute_command: "execute".into(),
            run_succeeded: "Finished script execution successfully. Waiting for next task."
                .into(),
            malformed_request: run_failed.clone(),
            run_failed,
            finalize_failed: "Error when writing output to temporary folder.".into(),
            shutdown_notice: "Stopping instance.".into(),
        }
    }
}

/// Host order received while waiting.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Order {
    Execute,
    Stop,
    Unknown(String),
}

impl Order {
    /// Classifies an order message.
    #[must_use]
    pub fn parse(message: &str, vocabulary: &ProtocolVocabulary) -> Self {
        if message == vocabulary.order_execute {
            Self::Execute
        } else if vocabulary.order_stop.iter().any(|s| s == message) {
            Self::Stop
        } else {
            Self::Unknown(message.to_string())
        }
    }
}

/// JSON request envelope sent after the ready acknowledgment.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ExecuteRequest {
    #[serde(alias = "pythonCommand")]
    pub command: String,
    pub script: String,
}

/// Shape of the request message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RequestShape {
    /// Canonical JSON envelope.
    Envelope(ExecuteRequest),
    /// Legacy form: this many line messages follow.
    LegacyLines(usize),
    /// Neither.
    Malformed(String),
}

impl RequestShape {
    /// Classifies the request message.
    #[must_use]
    pub fn parse(message: &str) -> Self {
        let trimmed = message.trim();
        if trimmed.starts_with('{') {
            return match serde_json::from_str::<ExecuteRequest>(trimmed) {
                Ok(req) => Self::Envelope(req),
                Err(e) => Self::Malformed(format!("invalid request envelope: {e}")),
            };
        }
        match trimmed.parse::<usize>() {
            Ok(n) if n <= MAX_LEGACY_LINES => Self::LegacyLines(n),
            Ok(n) => Self::Malformed(format!(
                "line count {n} exceeds {MAX_LEGACY_LINES}"
            )),
            Err(_) => Self::Malformed("request is neither an envelope nor a line count".into()),
        }
    }
}
