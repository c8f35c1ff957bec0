//! Advisory post-formatting checks against platform limits.
//!
//! Warnings never gate delivery: an oversized or malformed message is still
//! returned to the caller with the warning attached. Checks are independent
//! and all applied.

use serde::Serialize;
use serde_json::Value;

use crate::format_contract::FormattedMessage;

/// Soft limit on the serialized block payload accepted by the platform.
pub const PAYLOAD_SOFT_LIMIT_BYTES: usize = 50_000;
/// Hard platform limit on blocks per message.
pub const BLOCK_COUNT_LIMIT: usize = 50;
/// Below this, fallback text is useless for accessibility clients.
pub const FALLBACK_TEXT_MIN_CHARS: usize = 10;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
/// Enumerates supported `ValidationWarningKind` values.
pub enum ValidationWarningKind {
    PayloadSize,
    BlockCount,
    FallbackText,
    BlockShape,
    FallbackFormatting,
}

impl ValidationWarningKind {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::PayloadSize => "payload_size",
            Self::BlockCount => "block_count",
            Self::FallbackText => "fallback_text",
            Self::BlockShape => "block_shape",
            Self::FallbackFormatting => "fallback_formatting",
        }
    }
}

#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
/// Public struct `ValidationWarning` used across Courier components.
pub struct ValidationWarning {
    pub kind: ValidationWarningKind,
    pub detail: String,
}

impl ValidationWarning {
    pub fn new(kind: ValidationWarningKind, detail: impl Into<String>) -> Self {
        Self {
            kind,
            detail: detail.into(),
        }
    }
}

/// Runs every advisory check and returns the collected warnings.
pub fn validate_message(message: &FormattedMessage) -> Vec<ValidationWarning> {
    let mut warnings = Vec::new();

    let serialized_len = serde_json::to_string(&message.blocks)
        .map(|payload| payload.len())
        .unwrap_or(0);
    if serialized_len > PAYLOAD_SOFT_LIMIT_BYTES {
        warnings.push(ValidationWarning::new(
            ValidationWarningKind::PayloadSize,
            format!(
                "serialized blocks are {serialized_len} bytes \
                 (soft limit {PAYLOAD_SOFT_LIMIT_BYTES})"
            ),
        ));
    }

    if message.blocks.len() > BLOCK_COUNT_LIMIT {
        warnings.push(ValidationWarning::new(
            ValidationWarningKind::BlockCount,
            format!(
                "message has {} blocks (platform limit {BLOCK_COUNT_LIMIT})",
                message.blocks.len()
            ),
        ));
    }

    if message.fallback_text.trim().chars().count() < FALLBACK_TEXT_MIN_CHARS {
        warnings.push(ValidationWarning::new(
            ValidationWarningKind::FallbackText,
            format!(
                "fallback text is under {FALLBACK_TEXT_MIN_CHARS} characters; \
                 accessibility clients will see a near-empty notification"
            ),
        ));
    }

    for (index, block) in message.blocks.iter().enumerate() {
        let has_type = block
            .as_object()
            .and_then(|object| object.get("type"))
            .and_then(Value::as_str)
            .is_some();
        if !has_type {
            warnings.push(ValidationWarning::new(
                ValidationWarningKind::BlockShape,
                format!("block {index} is missing a string 'type' discriminator"),
            ));
        }
    }

    warnings
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    fn well_formed_message() -> FormattedMessage {
        FormattedMessage::new(
            vec![json!({"type": "section", "text": {"type": "mrkdwn", "text": "PR #12 merged"}})],
            "PR #12 merged into main",
        )
    }

    #[test]
    fn unit_well_formed_message_produces_no_warnings() {
        assert!(validate_message(&well_formed_message()).is_empty());
    }

    #[test]
    fn unit_oversized_payload_is_flagged_not_rejected() {
        let mut message = well_formed_message();
        message.blocks = vec![json!({"type": "section", "text": "x".repeat(60_000)})];
        let warnings = validate_message(&message);
        assert!(warnings
            .iter()
            .any(|warning| warning.kind == ValidationWarningKind::PayloadSize));
    }

    #[test]
    fn unit_block_count_over_platform_limit_is_flagged() {
        let mut message = well_formed_message();
        message.blocks = (0..51)
            .map(|index| json!({"type": "section", "text": format!("row {index}")}))
            .collect();
        let warnings = validate_message(&message);
        assert!(warnings
            .iter()
            .any(|warning| warning.kind == ValidationWarningKind::BlockCount));
    }

    #[test]
    fn unit_short_fallback_text_is_an_accessibility_warning() {
        let mut message = well_formed_message();
        message.fallback_text = "short".to_string();
        let warnings = validate_message(&message);
        assert!(warnings
            .iter()
            .any(|warning| warning.kind == ValidationWarningKind::FallbackText));
    }

    #[test]
    fn unit_blocks_without_type_discriminator_are_flagged_by_index() {
        let mut message = well_formed_message();
        message.blocks.push(json!({"text": "no type"}));
        message.blocks.push(json!("not even an object"));
        let warnings = validate_message(&message);
        let shape_warnings = warnings
            .iter()
            .filter(|warning| warning.kind == ValidationWarningKind::BlockShape)
            .collect::<Vec<_>>();
        assert_eq!(shape_warnings.len(), 2);
        assert!(shape_warnings[0].detail.contains("block 1"));
        assert!(shape_warnings[1].detail.contains("block 2"));
    }

    #[test]
    fn regression_all_checks_apply_independently() {
        let mut message = well_formed_message();
        message.fallback_text = String::new();
        message.blocks = (0..51).map(|_| json!({"no_type": true})).collect();
        let warnings = validate_message(&message);
        assert!(warnings
            .iter()
            .any(|warning| warning.kind == ValidationWarningKind::BlockCount));
        assert!(warnings
            .iter()
            .any(|warning| warning.kind == ValidationWarningKind::FallbackText));
        assert!(warnings
            .iter()
            .any(|warning| warning.kind == ValidationWarningKind::BlockShape));
    }
}
