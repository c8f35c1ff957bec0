use std::sync::Arc;

use anyhow::{anyhow, bail, Result};
use courier_format::{
    FallbackContext, FallbackStrategy, FallbackTrigger, FormattedMessage, MessageFormatFactory,
    MessageFormatter, ValidationWarningKind,
};
use serde_json::{json, Value};

struct BrokenHookFormatter;

impl MessageFormatter for BrokenHookFormatter {
    fn name(&self) -> &str {
        "BrokenHookFormatter"
    }

    fn format(&self, _data: &Value) -> Result<FormattedMessage> {
        bail!("forced exception in hook-specific formatting")
    }
}

fn factory_with_broken_hook() -> MessageFormatFactory {
    let factory = MessageFormatFactory::new();
    factory
        .register_custom_formatter("blocker_hook", Arc::new(|_| Arc::new(BrokenHookFormatter)))
        .expect("register custom formatter");
    factory
}

#[test]
fn integration_formatter_failure_degrades_to_basic_blocks() {
    let factory = factory_with_broken_hook();
    let result = factory.format(
        "blocker_hook",
        &json!({
            "hook_type": "BlockerHook",
            "event": {"ticket_key": "DEV-123", "event_type": "blocker_detected"}
        }),
        None,
        None,
        None,
    );
    assert!(result.success);
    assert_eq!(result.formatter_used, "BasicBlocksFallback");
    assert!(result
        .error
        .as_deref()
        .expect("original error")
        .contains("forced exception"));
    assert!(result
        .warnings
        .iter()
        .any(|warning| warning.kind == ValidationWarningKind::FallbackFormatting));

    let message = result.message.expect("message");
    assert_eq!(
        message.metadata.get("fallback_used"),
        Some(&Value::Bool(true))
    );
    assert_eq!(
        message.metadata.get("fallback_strategy"),
        Some(&Value::String("basic_blocks".to_string()))
    );
    assert!(message.fallback_text.contains("DEV-123"));
}

#[test]
fn integration_ticket_data_reaches_the_jira_template_strategy() {
    let factory = factory_with_broken_hook();
    factory
        .register_fallback_handler(
            FallbackStrategy::BasicBlocks,
            Arc::new(|_| bail!("handler disabled for this rollout")),
        )
        .expect("register handler");
    let result = factory.format(
        "blocker_hook",
        &json!({
            "ticket": {"key": "DEV-7", "summary": "Login flaky", "priority": "high"},
            "transition": {"from": "Open", "to": "In Progress"}
        }),
        None,
        None,
        None,
    );
    assert!(result.success);
    assert_eq!(result.formatter_used, "JiraTemplateFallback");
    let message = result.message.expect("message");
    assert!(message.fallback_text.contains("DEV-7"));
    assert!(message.fallback_text.contains("transition"));
}

#[test]
fn integration_unidentifiable_data_falls_through_to_generic_hook() {
    let factory = factory_with_broken_hook();
    let result = factory.format(
        "blocker_hook",
        &json!({"note": "nothing the earlier strategies can use"}),
        None,
        None,
        None,
    );
    assert!(result.success);
    assert_eq!(result.formatter_used, "GenericHookFallback");
    let stats = factory.fallback_stats().expect("stats");
    assert_eq!(stats.attempts.get("basic_blocks"), Some(&1));
    assert_eq!(stats.attempts.get("jira_template"), Some(&1));
    assert_eq!(stats.successes.get("generic_hook"), Some(&1));
    assert_eq!(stats.triggers.get("template_error"), Some(&1));
}

#[test]
fn integration_junk_inputs_never_panic_and_never_raise() {
    let factory = MessageFormatFactory::new();
    let junk = [
        ("pr_update", json!(null)),
        ("pr_update", json!("not a record")),
        ("jira_update", json!(3.14)),
        ("standup", json!(["a", "b"])),
        ("", json!({"ok": true})),
        ("   ", json!({})),
    ];
    for (kind, data) in junk {
        let result = factory.format(kind, &data, None, None, None);
        assert!(!result.success, "kind {kind:?} should fail cleanly");
        assert!(result.error.is_some());
        assert!(result.message.is_some() || result.formatter_used.is_empty());
    }
}

#[test]
fn integration_top_level_fallback_echoes_scalar_debug_fields() {
    let factory = MessageFormatFactory::new();
    let result = factory.format(
        "",
        &json!({"service": "api", "attempt": 3, "nested": {"hidden": true}}),
        None,
        None,
        None,
    );
    assert!(!result.success);
    assert_eq!(result.formatter_used, "FactoryFallback");
    let message = result.message.expect("debug message");
    let rendered = serde_json::to_string(&message.blocks).expect("serialize");
    assert!(rendered.contains("formatting failed"));
    assert!(rendered.contains("service"));
    assert!(rendered.contains("attempt"));
    assert!(!rendered.contains("hidden"));
}

#[test]
fn integration_direct_failure_handling_resolves_through_the_chain() {
    let factory = MessageFormatFactory::new();
    let context = FallbackContext::new(
        FallbackTrigger::MissingData,
        "JiraSyncHook",
        json!({
            "event": {"ticket_key": "DEV-55", "event_type": "sync"},
            "execution_result": {"status": "failed", "duration_ms": 310, "errors": ["boom"]}
        }),
        Some(anyhow!("payload missing required section")),
    );
    let result = factory.handle_formatting_failure(&context);
    assert!(result.success);
    assert_eq!(result.formatter_used, "BasicBlocksFallback");
    assert!(result
        .error
        .as_deref()
        .expect("error")
        .contains("missing required section"));
    let stats = factory.fallback_stats().expect("stats");
    assert_eq!(stats.triggers.get("missing_data"), Some(&1));
}

#[test]
fn integration_exhausted_chain_yields_a_failed_result_not_a_panic() {
    let factory = factory_with_broken_hook();
    for strategy in FallbackStrategy::ORDERED {
        factory
            .register_fallback_handler(strategy, Arc::new(|_| bail!("strategy offline")))
            .expect("register handler");
    }
    let result = factory.format("blocker_hook", &json!({"a": 1}), None, None, None);
    assert!(!result.success);
    assert!(result
        .error
        .as_deref()
        .expect("error")
        .contains("all fallback strategies failed"));
    let message = result.message.expect("factory fallback message");
    assert_eq!(message.metadata.get("error"), Some(&Value::Bool(true)));
}
