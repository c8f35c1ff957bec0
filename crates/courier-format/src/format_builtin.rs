//! Built-in Block Kit formatters behind the capability seam.
//!
//! One thin formatter per built-in message kind plus a generic formatter for
//! registered custom kinds. These are deliberately small data-to-JSON
//! mappings; the pipeline (routing, cache, validation, fallback) never
//! depends on their internals, only on the [`MessageFormatter`] contract.

use std::sync::Arc;

use anyhow::{bail, Result};
use serde_json::{json, Value};

use crate::format_config::EffectiveConfig;
use crate::format_contract::{
    FormattedMessage, FormatterConstructor, MessageFormatter,
};
use crate::format_status::{priority_indicator, status_indicator};

pub fn header_block(text: &str) -> Value {
    json!({"type": "header", "text": {"type": "plain_text", "text": text, "emoji": true}})
}

pub fn section_block(markdown: &str) -> Value {
    json!({"type": "section", "text": {"type": "mrkdwn", "text": markdown}})
}

pub fn context_block(text: &str) -> Value {
    json!({"type": "context", "elements": [{"type": "mrkdwn", "text": text}]})
}

pub fn divider_block() -> Value {
    json!({"type": "divider"})
}

pub fn button_element(text: &str, action_id: &str, url: Option<&str>) -> Value {
    let mut element = json!({
        "type": "button",
        "text": {"type": "plain_text", "text": text, "emoji": true},
        "action_id": action_id,
    });
    if let (Some(object), Some(url)) = (element.as_object_mut(), url) {
        object.insert("url".to_string(), Value::String(url.to_string()));
    }
    element
}

pub fn actions_block(elements: Vec<Value>) -> Value {
    json!({"type": "actions", "elements": elements})
}

fn text_field<'a>(data: &'a Value, key: &str) -> Option<&'a str> {
    data.get(key).and_then(Value::as_str)
}

fn branded_footer(config: &EffectiveConfig) -> Option<Value> {
    config
        .branding
        .get("footer")
        .map(|footer| context_block(footer))
}

/// Formats a single pull-request update.
pub struct PrUpdateFormatter {
    config: EffectiveConfig,
}

impl PrUpdateFormatter {
    pub fn constructor() -> FormatterConstructor {
        Arc::new(|config| Arc::new(Self {
            config: config.clone(),
        }))
    }
}

impl MessageFormatter for PrUpdateFormatter {
    fn name(&self) -> &str {
        "PrUpdateFormatter"
    }

    fn format(&self, data: &Value) -> Result<FormattedMessage> {
        let pr = data.get("pr").unwrap_or(&Value::Null);
        let number = pr.get("number").and_then(Value::as_u64).unwrap_or(0);
        let title = text_field(pr, "title").unwrap_or("Unknown PR");
        let author = text_field(pr, "author").unwrap_or("Unassigned");
        let status = text_field(pr, "status").unwrap_or("updated");
        let indicator = status_indicator(status);
        let emoji = self.config.emoji(indicator.label, indicator.symbol);

        let mut blocks = vec![
            header_block(&format!("{emoji} Pull Request Update")),
            section_block(&format!("*#{number}: {title}*")),
            context_block(&format!("{author} • {status}")),
        ];
        if self.config.interactive_elements {
            if let Some(url) = text_field(pr, "url") {
                blocks.push(actions_block(vec![button_element(
                    "View PR",
                    "pr_open",
                    Some(url),
                )]));
            }
        }
        if let Some(footer) = branded_footer(&self.config) {
            blocks.push(footer);
        }
        Ok(FormattedMessage::new(
            blocks,
            format!("PR #{number}: {title} ({status})"),
        ))
    }
}

/// Formats a batch of pull requests with dividers between entries.
pub struct PrBatchFormatter {
    config: EffectiveConfig,
}

impl PrBatchFormatter {
    pub fn constructor() -> FormatterConstructor {
        Arc::new(|config| Arc::new(Self {
            config: config.clone(),
        }))
    }
}

impl MessageFormatter for PrBatchFormatter {
    fn name(&self) -> &str {
        "PrBatchFormatter"
    }

    fn format(&self, data: &Value) -> Result<FormattedMessage> {
        let empty = Vec::new();
        let prs = data
            .get("prs")
            .and_then(Value::as_array)
            .unwrap_or(&empty);
        let mut blocks = vec![header_block(&format!(
            "📋 Pull Request Summary ({})",
            prs.len()
        ))];
        for (index, pr) in prs.iter().enumerate() {
            if index > 0 {
                blocks.push(divider_block());
            }
            let number = pr.get("number").and_then(Value::as_u64).unwrap_or(0);
            let title = text_field(pr, "title").unwrap_or("Unknown PR");
            let status = text_field(pr, "status").unwrap_or("updated");
            blocks.push(section_block(&format!(
                "{} *#{number}: {title}*",
                status_indicator(status).symbol
            )));
        }
        if prs.is_empty() {
            blocks.push(section_block("No pull requests in this batch."));
        }
        if let Some(footer) = branded_footer(&self.config) {
            blocks.push(footer);
        }
        Ok(FormattedMessage::new(
            blocks,
            format!("{} pull requests updated", prs.len()),
        ))
    }
}

/// Formats a single JIRA ticket update.
pub struct JiraUpdateFormatter {
    config: EffectiveConfig,
}

impl JiraUpdateFormatter {
    pub fn constructor() -> FormatterConstructor {
        Arc::new(|config| Arc::new(Self {
            config: config.clone(),
        }))
    }
}

impl MessageFormatter for JiraUpdateFormatter {
    fn name(&self) -> &str {
        "JiraUpdateFormatter"
    }

    fn format(&self, data: &Value) -> Result<FormattedMessage> {
        let Some(ticket) = data.get("ticket").filter(|value| value.is_object()) else {
            bail!("jira update data has no ticket object");
        };
        let key = text_field(ticket, "key").unwrap_or("UNKNOWN");
        let summary = text_field(ticket, "summary").unwrap_or("Unknown ticket");
        let status = text_field(ticket, "status").unwrap_or("updated");
        let assignee = text_field(data, "assignee")
            .or_else(|| text_field(ticket, "assignee"))
            .unwrap_or("Unassigned");
        let change_type = text_field(data, "change_type").unwrap_or("updated");
        let priority = text_field(ticket, "priority").unwrap_or("medium");
        let indicator = priority_indicator(priority);
        let emoji = self.config.emoji("jira", "🎫");

        let mut blocks = vec![
            header_block(&format!("{emoji} JIRA {change_type}")),
            section_block(&format!("*{key}*: {summary}")),
            context_block(&format!(
                "{} {priority} • {assignee} • {status}",
                indicator.symbol
            )),
        ];
        if let Some(footer) = branded_footer(&self.config) {
            blocks.push(footer);
        }
        Ok(FormattedMessage::new(
            blocks,
            format!("{key}: {summary} ({change_type})"),
        ))
    }
}

/// Formats a batch of JIRA tickets.
pub struct JiraBatchFormatter {
    config: EffectiveConfig,
}

impl JiraBatchFormatter {
    pub fn constructor() -> FormatterConstructor {
        Arc::new(|config| Arc::new(Self {
            config: config.clone(),
        }))
    }
}

impl MessageFormatter for JiraBatchFormatter {
    fn name(&self) -> &str {
        "JiraBatchFormatter"
    }

    fn format(&self, data: &Value) -> Result<FormattedMessage> {
        let empty = Vec::new();
        let tickets = data
            .get("tickets")
            .and_then(Value::as_array)
            .unwrap_or(&empty);
        let mut blocks = vec![header_block(&format!(
            "🎫 JIRA Summary ({})",
            tickets.len()
        ))];
        for (index, ticket) in tickets.iter().enumerate() {
            if index > 0 {
                blocks.push(divider_block());
            }
            let key = text_field(ticket, "key").unwrap_or("UNKNOWN");
            let summary = text_field(ticket, "summary").unwrap_or("Unknown ticket");
            blocks.push(section_block(&format!("*{key}*: {summary}")));
        }
        if tickets.is_empty() {
            blocks.push(section_block("No tickets in this batch."));
        }
        if let Some(footer) = branded_footer(&self.config) {
            blocks.push(footer);
        }
        Ok(FormattedMessage::new(
            blocks,
            format!("{} tickets updated", tickets.len()),
        ))
    }
}

/// Formats a daily standup summary.
pub struct StandupFormatter {
    config: EffectiveConfig,
}

impl StandupFormatter {
    pub fn constructor() -> FormatterConstructor {
        Arc::new(|config| Arc::new(Self {
            config: config.clone(),
        }))
    }
}

impl MessageFormatter for StandupFormatter {
    fn name(&self) -> &str {
        "StandupFormatter"
    }

    fn format(&self, data: &Value) -> Result<FormattedMessage> {
        let date = text_field(data, "date").unwrap_or("unknown");
        let team = text_field(data, "team").unwrap_or("Unknown team");
        let emoji = self.config.emoji("standup", "🌅");

        let mut blocks = vec![
            header_block(&format!("{emoji} Daily Standup - {team}")),
            context_block(&format!("Date: {date}")),
        ];
        if let Some(members) = data.get("team_members").and_then(Value::as_array) {
            for member in members {
                let name = text_field(member, "name").unwrap_or("Unassigned");
                let yesterday = text_field(member, "yesterday").unwrap_or("-");
                let today = text_field(member, "today").unwrap_or("-");
                blocks.push(divider_block());
                blocks.push(section_block(&format!(
                    "*{name}*\nYesterday: {yesterday}\nToday: {today}"
                )));
                if let Some(blockers) = text_field(member, "blockers") {
                    blocks.push(context_block(&format!("🚧 Blocked: {blockers}")));
                }
            }
        }
        if let Some(footer) = branded_footer(&self.config) {
            blocks.push(footer);
        }
        Ok(FormattedMessage::new(
            blocks,
            format!("Daily standup for {team} on {date}"),
        ))
    }
}

/// Formats a blocker escalation.
pub struct BlockerFormatter {
    config: EffectiveConfig,
}

impl BlockerFormatter {
    pub fn constructor() -> FormatterConstructor {
        Arc::new(|config| Arc::new(Self {
            config: config.clone(),
        }))
    }
}

impl MessageFormatter for BlockerFormatter {
    fn name(&self) -> &str {
        "BlockerFormatter"
    }

    fn format(&self, data: &Value) -> Result<FormattedMessage> {
        let Some(blocker) = data.get("blocker").filter(|value| value.is_object()) else {
            bail!("blocker data has no blocker object");
        };
        let description = text_field(blocker, "description").unwrap_or("Unknown blocker");
        let reporter = text_field(blocker, "reporter").unwrap_or("Unassigned");
        let severity = text_field(blocker, "severity").unwrap_or("high");
        let indicator = priority_indicator(severity);
        let emoji = self.config.emoji("blocker", indicator.symbol);

        let mut blocks = vec![
            header_block(&format!("{emoji} Blocker Reported")),
            section_block(description),
            context_block(&format!("Severity: {} • Reported by {reporter}", indicator.label)),
        ];
        if let Some(footer) = branded_footer(&self.config) {
            blocks.push(footer);
        }
        Ok(FormattedMessage::new(
            blocks,
            format!("Blocker ({severity}): {description}"),
        ))
    }
}

/// Minimal formatter for registered custom kinds: header plus a section per
/// scalar field. Registered under the caller's custom type name.
pub struct GenericFormatter {
    kind_name: String,
}

impl GenericFormatter {
    pub fn constructor(kind_name: impl Into<String>) -> FormatterConstructor {
        let kind_name = kind_name.into();
        Arc::new(move |_config| {
            Arc::new(Self {
                kind_name: kind_name.clone(),
            })
        })
    }
}

impl MessageFormatter for GenericFormatter {
    fn name(&self) -> &str {
        "GenericFormatter"
    }

    fn format(&self, data: &Value) -> Result<FormattedMessage> {
        let mut lines = Vec::new();
        if let Some(object) = data.as_object() {
            for (key, value) in object.iter().take(10) {
                if value.is_object() || value.is_array() {
                    continue;
                }
                lines.push(format!("*{key}*: {value}"));
            }
        }
        let body = if lines.is_empty() {
            "(no scalar fields)".to_string()
        } else {
            lines.join("\n")
        };
        Ok(FormattedMessage::new(
            vec![
                header_block(&format!("🔔 {} notification", self.kind_name)),
                section_block(&body),
            ],
            format!("{} notification", self.kind_name),
        ))
    }
}
