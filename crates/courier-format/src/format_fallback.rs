//! Degrading-fidelity fallback chain for failed formatting.
//!
//! Five strategies are tried strictly in order until one succeeds; each is
//! attempted at most once (the chain is not a retry of the same operation
//! but a sequence of different, lower-fidelity renderings). Statistics are
//! updated on every attempt before the chain moves on. Only a failure of the
//! final strategy is unexpected; exhaustion of all five is the terminal
//! "all fallback strategies failed" state.

use std::collections::BTreeMap;
use std::sync::Arc;

use anyhow::{bail, Result};
use chrono::{TimeZone, Utc};
use courier_core::current_unix_timestamp_ms;
use serde::Serialize;
use serde_json::{json, Value};

use crate::format_builtin::{context_block, header_block, section_block, JiraUpdateFormatter};
use crate::format_config::EffectiveConfig;
use crate::format_contract::{
    FormatError, FormattedMessage, MessageFormatter, METADATA_FALLBACK_STRATEGY_KEY,
    METADATA_FALLBACK_USED_KEY,
};
use crate::format_status::priority_indicator;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "snake_case")]
/// Enumerates supported `FallbackTrigger` values.
pub enum FallbackTrigger {
    TemplateError,
    MissingData,
    Timeout,
    InvalidStructure,
    SizeLimitExceeded,
}

impl FallbackTrigger {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::TemplateError => "template_error",
            Self::MissingData => "missing_data",
            Self::Timeout => "timeout",
            Self::InvalidStructure => "invalid_structure",
            Self::SizeLimitExceeded => "size_limit_exceeded",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
/// Enumerates supported `FallbackStrategy` values, in chain order.
pub enum FallbackStrategy {
    BasicBlocks,
    JiraTemplate,
    GenericHook,
    SimpleText,
    EmergencyMinimal,
}

impl FallbackStrategy {
    pub const ORDERED: [Self; 5] = [
        Self::BasicBlocks,
        Self::JiraTemplate,
        Self::GenericHook,
        Self::SimpleText,
        Self::EmergencyMinimal,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            Self::BasicBlocks => "basic_blocks",
            Self::JiraTemplate => "jira_template",
            Self::GenericHook => "generic_hook",
            Self::SimpleText => "simple_text",
            Self::EmergencyMinimal => "emergency_minimal",
        }
    }

    /// Provenance name recorded in `ProcessingResult::formatter_used`.
    pub fn formatter_name(self) -> &'static str {
        match self {
            Self::BasicBlocks => "BasicBlocksFallback",
            Self::JiraTemplate => "JiraTemplateFallback",
            Self::GenericHook => "GenericHookFallback",
            Self::SimpleText => "SimpleTextFallback",
            Self::EmergencyMinimal => "EmergencyMinimalFallback",
        }
    }
}

#[derive(Debug)]
/// Public struct `FallbackContext` used across Courier components.
///
/// Ephemeral record built when a failure is detected and consumed by one
/// chain run. Exclusively owns the originating error for its lifetime; the
/// input data is a shared read-only copy.
pub struct FallbackContext {
    pub error: Option<anyhow::Error>,
    pub trigger: FallbackTrigger,
    pub hook_kind: String,
    pub urgency: String,
    pub team_id: Option<String>,
    pub channel_id: Option<String>,
    pub data: Value,
    pub available_sections: BTreeMap<&'static str, bool>,
}

impl FallbackContext {
    pub fn new(
        trigger: FallbackTrigger,
        hook_kind: impl Into<String>,
        data: Value,
        error: Option<anyhow::Error>,
    ) -> Self {
        let urgency = data
            .get("urgency")
            .or_else(|| data.get("event").and_then(|event| event.get("urgency")))
            .and_then(Value::as_str)
            .unwrap_or("medium")
            .to_string();
        let available_sections = [
            "ticket",
            "event",
            "execution_result",
            "transition",
            "assignment",
            "comment",
            "blocker",
        ]
        .into_iter()
        .map(|section| (section, data.get(section).is_some()))
        .collect();
        Self {
            error,
            trigger,
            hook_kind: hook_kind.into(),
            urgency,
            team_id: None,
            channel_id: None,
            data,
            available_sections,
        }
    }

    /// Records which team/channel the failed request resolved against, for
    /// handlers that render scope-aware degraded output.
    pub fn with_scope(mut self, team_id: Option<&str>, channel_id: Option<&str>) -> Self {
        self.team_id = team_id.map(str::to_string);
        self.channel_id = channel_id.map(str::to_string);
        self
    }

    fn ticket(&self) -> Option<&Value> {
        self.data
            .get("ticket")
            .or_else(|| self.data.get("event").and_then(|event| event.get("ticket")))
            .filter(|value| value.is_object())
    }

    fn ticket_key(&self) -> Option<&str> {
        self.ticket()
            .and_then(|ticket| ticket.get("key"))
            .or_else(|| {
                self.data
                    .get("event")
                    .and_then(|event| event.get("ticket_key"))
            })
            .and_then(Value::as_str)
    }

    fn event_type(&self) -> Option<&str> {
        self.data
            .get("event")
            .and_then(|event| event.get("event_type"))
            .or_else(|| self.data.get("event_type"))
            .and_then(Value::as_str)
    }

    fn execution_status(&self) -> Option<&str> {
        self.data
            .get("execution_result")
            .and_then(|result| result.get("status"))
            .or_else(|| self.data.get("status"))
            .and_then(Value::as_str)
    }

    fn duration_ms(&self) -> Option<u64> {
        self.data
            .get("execution_result")
            .and_then(|result| result.get("duration_ms"))
            .or_else(|| self.data.get("duration_ms"))
            .and_then(Value::as_u64)
    }

    fn first_error_message(&self) -> Option<String> {
        self.data
            .get("execution_result")
            .and_then(|result| result.get("errors"))
            .and_then(Value::as_array)
            .and_then(|errors| errors.first())
            .and_then(Value::as_str)
            .map(str::to_string)
            .or_else(|| self.error.as_ref().map(|error| error.to_string()))
    }

    fn timestamp_unix_ms(&self) -> u64 {
        self.data
            .get("event")
            .and_then(|event| event.get("timestamp_ms"))
            .or_else(|| self.data.get("timestamp_ms"))
            .and_then(Value::as_u64)
            .unwrap_or_else(current_unix_timestamp_ms)
    }
}

/// Caller-registered replacement for one strategy slot.
pub type FallbackHandler = Arc<dyn Fn(&FallbackContext) -> Result<FormattedMessage> + Send + Sync>;

#[derive(Debug, Default, Clone, Serialize, PartialEq)]
/// Aggregate chain statistics, kept across requests.
pub struct FallbackStats {
    pub attempts: BTreeMap<&'static str, u64>,
    pub successes: BTreeMap<&'static str, u64>,
    pub triggers: BTreeMap<&'static str, u64>,
}

impl FallbackStats {
    pub fn success_rate_percent(&self, strategy: FallbackStrategy) -> f64 {
        let attempts = self.attempts.get(strategy.as_str()).copied().unwrap_or(0);
        if attempts == 0 {
            return 0.0;
        }
        let successes = self.successes.get(strategy.as_str()).copied().unwrap_or(0);
        (successes as f64 / attempts as f64) * 100.0
    }
}

/// Public struct `FallbackChain` used across Courier components.
pub struct FallbackChain {
    custom_handlers: BTreeMap<&'static str, FallbackHandler>,
    stats: FallbackStats,
}

impl Default for FallbackChain {
    fn default() -> Self {
        Self {
            custom_handlers: BTreeMap::new(),
            stats: FallbackStats::default(),
        }
    }
}

impl FallbackChain {
    /// Registers a custom handler for one strategy slot, checked before the
    /// built-in implementation. Last registration wins.
    pub fn register_handler(&mut self, strategy: FallbackStrategy, handler: FallbackHandler) {
        self.custom_handlers.insert(strategy.as_str(), handler);
    }

    pub fn stats(&self) -> &FallbackStats {
        &self.stats
    }

    /// Runs the chain; the first successful strategy terminates it.
    pub fn handle(
        &mut self,
        context: &FallbackContext,
    ) -> Result<(FormattedMessage, FallbackStrategy), FormatError> {
        *self
            .stats
            .triggers
            .entry(context.trigger.as_str())
            .or_insert(0) += 1;

        let mut failures = Vec::new();
        for strategy in FallbackStrategy::ORDERED {
            *self.stats.attempts.entry(strategy.as_str()).or_insert(0) += 1;
            let attempt = match self.custom_handlers.get(strategy.as_str()) {
                Some(handler) => handler(context),
                None => run_builtin_strategy(strategy, context),
            };
            match attempt {
                Ok(mut message) => {
                    *self.stats.successes.entry(strategy.as_str()).or_insert(0) += 1;
                    message
                        .metadata
                        .insert(METADATA_FALLBACK_USED_KEY.to_string(), Value::Bool(true));
                    message.metadata.insert(
                        METADATA_FALLBACK_STRATEGY_KEY.to_string(),
                        Value::String(strategy.as_str().to_string()),
                    );
                    return Ok((message, strategy));
                }
                Err(error) => {
                    if strategy == FallbackStrategy::EmergencyMinimal {
                        // The final strategy is designed to be infallible; a
                        // failure here is a contract violation, not an
                        // anticipated degradation.
                        tracing::error!(
                            strategy = strategy.as_str(),
                            hook_kind = context.hook_kind.as_str(),
                            "emergency fallback strategy failed: {error:#}"
                        );
                    } else {
                        tracing::debug!(
                            strategy = strategy.as_str(),
                            hook_kind = context.hook_kind.as_str(),
                            "fallback strategy failed, trying next: {error:#}"
                        );
                    }
                    failures.push(format!("{}: {error:#}", strategy.as_str()));
                }
            }
        }

        tracing::error!(
            hook_kind = context.hook_kind.as_str(),
            trigger = context.trigger.as_str(),
            "all fallback strategies failed"
        );
        Err(FormatError::FallbackExhausted(failures.join("; ")))
    }
}

fn run_builtin_strategy(
    strategy: FallbackStrategy,
    context: &FallbackContext,
) -> Result<FormattedMessage> {
    match strategy {
        FallbackStrategy::BasicBlocks => basic_blocks_fallback(context),
        FallbackStrategy::JiraTemplate => jira_template_fallback(context),
        FallbackStrategy::GenericHook => generic_hook_fallback(context),
        FallbackStrategy::SimpleText => simple_text_fallback(context),
        FallbackStrategy::EmergencyMinimal => Ok(emergency_minimal_fallback(context)),
    }
}

/// Strategy 1: minimal but structured reconstruction from whatever
/// identifying fields survive in the input.
fn basic_blocks_fallback(context: &FallbackContext) -> Result<FormattedMessage> {
    if !context.data.is_object() {
        bail!("input data is not a structured record");
    }
    let mut lines = Vec::new();
    if let Some(key) = context.ticket_key() {
        lines.push(format!("*Ticket*: {key}"));
    }
    if let Some(event_type) = context.event_type() {
        lines.push(format!("*Event*: {event_type}"));
    }
    if let Some(status) = context.execution_status() {
        lines.push(format!("*Status*: {status}"));
    }
    if let Some(duration) = context.duration_ms() {
        lines.push(format!("*Duration*: {duration}ms"));
    }
    if lines.is_empty() {
        bail!("no identifying fields present in input data");
    }

    let mut blocks = vec![
        header_block(&format!("⚠️ {} Notification", context.hook_kind)),
        section_block(&lines.join("\n")),
    ];
    if let Some(error) = context.error.as_ref() {
        blocks.push(context_block(&format!("Original error: {error}")));
    }
    Ok(FormattedMessage::new(
        blocks,
        format!("{} notification: {}", context.hook_kind, lines.join(", ")),
    ))
}

/// Strategy 2: delegate to the JIRA formatter with a reconstructed change
/// type. Fails explicitly when no ticket data is available to build from.
fn jira_template_fallback(context: &FallbackContext) -> Result<FormattedMessage> {
    let Some(ticket) = context.ticket() else {
        bail!("no ticket data available for jira template fallback");
    };
    let change_type = ["transition", "assignment", "comment", "blocker"]
        .into_iter()
        .find(|section| context.available_sections.get(section) == Some(&true))
        .unwrap_or("updated");
    let reconstructed = json!({
        "ticket": ticket.clone(),
        "change_type": change_type,
        "assignee": context
            .data
            .get("assignee")
            .cloned()
            .unwrap_or_else(|| Value::String("Unassigned".to_string())),
    });
    let formatter = JiraUpdateFormatter::constructor()(&EffectiveConfig::default());
    formatter.format(&reconstructed)
}

/// Strategy 3: generic "hook executed" notification interpreting
/// execution-result status semantics.
fn generic_hook_fallback(context: &FallbackContext) -> Result<FormattedMessage> {
    if !context.data.is_object() {
        bail!("input data is not a structured record");
    }
    let indicator = priority_indicator(&context.urgency);
    let status = context.execution_status().unwrap_or("unknown");
    let mut summary = format!("Status: {status}");
    if let Some(duration) = context.duration_ms() {
        summary.push_str(&format!(" • Duration: {duration}ms"));
    }

    let mut blocks = vec![
        header_block(&format!("{} {} executed", indicator.symbol, context.hook_kind)),
        section_block(&summary),
    ];
    if status.eq_ignore_ascii_case("failed") || status.eq_ignore_ascii_case("failure") {
        if let Some(message) = context.first_error_message() {
            blocks.push(section_block(&format!("First error: {message}")));
        }
    }

    let mut details = Vec::new();
    if let Some(key) = context.ticket_key() {
        details.push(key.to_string());
    }
    if let Some(event_type) = context.event_type() {
        details.push(event_type.to_string());
    }
    details.push(format_timestamp(context.timestamp_unix_ms()));
    blocks.push(context_block(&details.join(" • ")));

    Ok(FormattedMessage::new(
        blocks,
        format!("{} executed: {status}", context.hook_kind),
    ))
}

/// Strategy 4: collapse everything to one plain-text section.
fn simple_text_fallback(context: &FallbackContext) -> Result<FormattedMessage> {
    let mut lines = vec![format!("Hook: {}", context.hook_kind)];
    if let Some(key) = context.ticket_key() {
        lines.push(format!("Ticket: {key}"));
    } else if let Some(event_type) = context.event_type() {
        lines.push(format!("Event: {event_type}"));
    }
    lines.push(format!(
        "Status: {}",
        context.execution_status().unwrap_or("unknown")
    ));
    let text = lines.join("\n");
    Ok(FormattedMessage::new(
        vec![section_block(&text)],
        text.replace('\n', " | "),
    ))
}

/// Strategy 5: absolute last resort, designed to be unconditionally
/// successful.
fn emergency_minimal_fallback(context: &FallbackContext) -> FormattedMessage {
    let sentence = format!(
        "⚠️ {} notification (fallback formatting)",
        context.hook_kind
    );
    FormattedMessage::new(vec![section_block(&sentence)], sentence.clone())
}

fn format_timestamp(unix_ms: u64) -> String {
    let millis = i64::try_from(unix_ms).unwrap_or(i64::MAX);
    Utc.timestamp_millis_opt(millis)
        .single()
        .map(|timestamp| timestamp.format("%Y-%m-%d %H:%M UTC").to_string())
        .unwrap_or_else(|| format!("{unix_ms}ms"))
}
