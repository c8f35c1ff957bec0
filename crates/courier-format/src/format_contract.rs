//! Message and formatter contracts for the Courier format pipeline.
//!
//! Defines the universal formatted-message shape, the closed set of built-in
//! message kinds (plus the open custom extension), the formatter capability
//! traits, and the result/error types the factory returns. The pipeline never
//! interprets block internals beyond the `type` discriminator.

use std::collections::BTreeMap;
use std::sync::Arc;

use anyhow::Result;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use thiserror::Error;

use crate::format_config::EffectiveConfig;
use crate::format_validate::ValidationWarning;

pub const METADATA_FORMATTER_KEY: &str = "formatter";
pub const METADATA_FORMATTED_UNIX_MS_KEY: &str = "formatted_unix_ms";
pub const METADATA_FALLBACK_USED_KEY: &str = "fallback_used";
pub const METADATA_FALLBACK_STRATEGY_KEY: &str = "fallback_strategy";

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
/// Public struct `FormattedMessage` used across Courier components.
///
/// The universal output of formatting: ordered opaque blocks, a required
/// plain-text fallback used for accessibility and last-resort delivery, and
/// open metadata recording provenance. Mutated by the factory during
/// post-processing; treated as immutable once returned to the caller.
pub struct FormattedMessage {
    pub blocks: Vec<Value>,
    pub fallback_text: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub thread_ts: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub channel: Option<String>,
    #[serde(default)]
    pub metadata: BTreeMap<String, Value>,
}

impl FormattedMessage {
    pub fn new(blocks: Vec<Value>, fallback_text: impl Into<String>) -> Self {
        Self {
            blocks,
            fallback_text: fallback_text.into(),
            thread_ts: None,
            channel: None,
            metadata: BTreeMap::new(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
/// Enumerates supported `MessageKind` values.
///
/// Built-in kinds are a closed set; any other non-blank token normalizes to
/// `Custom` and must have a formatter registered before use.
pub enum MessageKind {
    PrUpdate,
    PrBatch,
    JiraUpdate,
    JiraBatch,
    Standup,
    Blocker,
    Custom(String),
}

impl MessageKind {
    /// Normalizes an accepted string form into the internal representation.
    ///
    /// Blank input is a typed error rather than a silent misroute.
    pub fn parse(raw: &str) -> Result<Self, FormatError> {
        let normalized = raw.trim().to_ascii_lowercase();
        if normalized.is_empty() {
            return Err(FormatError::UnknownKind(raw.to_string()));
        }
        Ok(match normalized.as_str() {
            "pr_update" => Self::PrUpdate,
            "pr_batch" => Self::PrBatch,
            "jira_update" => Self::JiraUpdate,
            "jira_batch" => Self::JiraBatch,
            "standup" => Self::Standup,
            "blocker" => Self::Blocker,
            other => Self::Custom(other.to_string()),
        })
    }

    pub fn as_str(&self) -> &str {
        match self {
            Self::PrUpdate => "pr_update",
            Self::PrBatch => "pr_batch",
            Self::JiraUpdate => "jira_update",
            Self::JiraBatch => "jira_batch",
            Self::Standup => "standup",
            Self::Blocker => "blocker",
            Self::Custom(name) => name.as_str(),
        }
    }

    /// Required top-level fields with their documented placeholder values.
    ///
    /// Missing fields are injected rather than rejected (lenient-degrade
    /// policy); custom kinds carry no declared requirements.
    pub fn required_fields(&self) -> Vec<(&'static str, Value)> {
        match self {
            Self::PrUpdate => vec![("pr", json!({"number": 0, "title": "Unknown PR"}))],
            Self::PrBatch => vec![("prs", json!([]))],
            Self::JiraUpdate => vec![
                ("ticket", json!({"key": "UNKNOWN", "summary": "Unknown ticket"})),
                ("assignee", json!("Unassigned")),
            ],
            Self::JiraBatch => vec![("tickets", json!([]))],
            Self::Standup => vec![
                ("date", json!("unknown")),
                ("team", json!("Unknown team")),
            ],
            Self::Blocker => vec![(
                "blocker",
                json!({"description": "Unknown blocker", "reporter": "Unassigned"}),
            )],
            Self::Custom(_) => Vec::new(),
        }
    }
}

/// Trait contract for `MessageFormatter` behavior.
///
/// A formatter converts one loosely-typed data record into a
/// [`FormattedMessage`]. Failure is an explicit `Err` branch; the factory
/// additionally guards invocation against panics from misbehaving
/// implementations. Instances are reused across calls and must not hold
/// per-call mutable state.
pub trait MessageFormatter: Send + Sync {
    fn name(&self) -> &str;
    fn format(&self, data: &Value) -> Result<FormattedMessage>;
}

/// Builds a formatter instance for one message kind from a resolved config.
pub type FormatterConstructor =
    Arc<dyn Fn(&EffectiveConfig) -> Arc<dyn MessageFormatter> + Send + Sync>;

#[derive(Debug, Clone, Error, PartialEq, Eq)]
/// Typed failure taxonomy for the format pipeline.
pub enum FormatError {
    #[error("unknown message kind '{0}'")]
    UnknownKind(String),
    #[error("no formatter registered for message kind '{0}'")]
    UnregisteredKind(String),
    #[error("message data must be a JSON object")]
    InvalidData,
    #[error("formatter for '{kind}' failed: {detail}")]
    Formatter { kind: String, detail: String },
    #[error("all fallback strategies failed: {0}")]
    FallbackExhausted(String),
}

#[derive(Debug, Clone, Serialize)]
/// Public struct `ProcessingResult` used across Courier components.
///
/// The factory's only response shape: callers always receive one of these,
/// never a raised error.
pub struct ProcessingResult {
    pub success: bool,
    pub message: Option<FormattedMessage>,
    pub error: Option<String>,
    pub warnings: Vec<ValidationWarning>,
    pub processing_time_ms: u64,
    pub formatter_used: String,
    pub cache_hit: bool,
}

impl ProcessingResult {
    pub(crate) fn failure(error: impl Into<String>, processing_time_ms: u64) -> Self {
        Self {
            success: false,
            message: None,
            error: Some(error.into()),
            warnings: Vec::new(),
            processing_time_ms,
            formatter_used: String::new(),
            cache_hit: false,
        }
    }
}
