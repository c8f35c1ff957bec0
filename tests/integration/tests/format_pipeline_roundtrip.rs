use std::collections::BTreeMap;

use courier_format::{
    AbTestSelection, AbTestVariant, ChannelConfig, ChannelStyle, FormatOptions,
    MessageFormatFactory, ProcessingResult, TeamConfig, ValidationWarningKind,
};
use serde_json::{json, Value};

fn factory_with_eng_team() -> MessageFormatFactory {
    let factory = MessageFormatFactory::new();
    factory
        .configure_team(TeamConfig {
            team_id: "eng".to_string(),
            branding: BTreeMap::from([("footer".to_string(), "Engineering Updates".to_string())]),
            emoji_overrides: BTreeMap::from([("standup".to_string(), "🚀".to_string())]),
            color_overrides: BTreeMap::new(),
        })
        .expect("configure team");
    factory
}

fn rendered_blocks(result: &ProcessingResult) -> String {
    let message = result.message.as_ref().expect("message");
    serde_json::to_string(&message.blocks).expect("serialize blocks")
}

#[test]
fn integration_pr_update_renders_full_payload_with_team_branding() {
    let factory = factory_with_eng_team();
    let result = factory.format(
        "pr_update",
        &json!({"pr": {
            "number": 42,
            "title": "Add retry budget to outbound queue",
            "author": "sam",
            "status": "merged",
            "url": "https://example.test/pr/42"
        }}),
        None,
        Some("eng"),
        None,
    );
    assert!(result.success);
    assert!(!result.cache_hit);
    assert!(result.warnings.is_empty());
    assert_eq!(result.formatter_used, "PrUpdateFormatter");
    let rendered = rendered_blocks(&result);
    assert!(rendered.contains("Pull Request Update"));
    assert!(rendered.contains("Add retry budget to outbound queue"));
    assert!(rendered.contains("Engineering Updates"));
    assert!(rendered.contains("https://example.test/pr/42"));
    let message = result.message.expect("message");
    assert!(message.fallback_text.contains("PR #42"));
    assert_eq!(
        message.metadata.get("formatter"),
        Some(&Value::String("PrUpdateFormatter".to_string()))
    );
}

#[test]
fn integration_identical_request_is_served_from_cache() {
    let factory = factory_with_eng_team();
    let data = json!({"date": "2024-01-15", "team": "Eng", "team_members": [
        {"name": "dana", "yesterday": "reviews", "today": "cache work"}
    ]});
    let first = factory.format("standup", &data, None, Some("eng"), None);
    let second = factory.format("standup", &data, None, Some("eng"), None);
    assert!(first.success && second.success);
    assert!(!first.cache_hit);
    assert!(second.cache_hit);
    assert_eq!(first.message, second.message);

    factory.clear_cache().expect("clear cache");
    let third = factory.format("standup", &data, None, Some("eng"), None);
    assert!(!third.cache_hit);
}

#[test]
fn integration_team_emoji_override_changes_the_standup_header() {
    let factory = factory_with_eng_team();
    let data = json!({"date": "2024-01-15", "team": "Eng"});
    let default_header = rendered_blocks(&factory.format("standup", &data, None, None, None));
    let branded_header =
        rendered_blocks(&factory.format("standup", &data, None, Some("eng"), None));
    assert!(default_header.contains("🌅 Daily Standup - Eng"));
    assert!(branded_header.contains("🚀 Daily Standup - Eng"));
}

#[test]
fn integration_options_outrank_channel_which_outranks_team_defaults() {
    let factory = factory_with_eng_team();
    factory
        .configure_channel(ChannelConfig {
            channel_id: "releases".to_string(),
            formatting_style: ChannelStyle::Rich,
            interactive_elements: Some(false),
            threading_enabled: None,
            branding: BTreeMap::new(),
        })
        .expect("configure channel");
    let data = json!({"pr": {"number": 7, "title": "Fix", "url": "https://example.test/pr/7"}});

    let channel_wins = factory.format("pr_update", &data, Some("releases"), Some("eng"), None);
    assert!(!rendered_blocks(&channel_wins).contains("\"actions\""));

    let options = FormatOptions {
        interactive_elements: Some(true),
        ..FormatOptions::default()
    };
    let options_win =
        factory.format("pr_update", &data, Some("releases"), Some("eng"), Some(&options));
    assert!(rendered_blocks(&options_win).contains("\"actions\""));
}

#[test]
fn integration_minimal_channel_strips_dividers_from_batches() {
    let factory = MessageFormatFactory::new();
    factory
        .configure_channel(ChannelConfig {
            channel_id: "digest".to_string(),
            formatting_style: ChannelStyle::Minimal,
            interactive_elements: None,
            threading_enabled: None,
            branding: BTreeMap::new(),
        })
        .expect("configure channel");
    let data = json!({"tickets": [
        {"key": "DEV-1", "summary": "One"},
        {"key": "DEV-2", "summary": "Two"}
    ]});
    let rich = factory.format("jira_batch", &data, None, None, None);
    let minimal = factory.format("jira_batch", &data, Some("digest"), None, None);
    assert!(rendered_blocks(&rich).contains("divider"));
    assert!(!rendered_blocks(&minimal).contains("divider"));
    let message = minimal.message.expect("message");
    assert_eq!(message.channel.as_deref(), Some("digest"));
}

#[test]
fn integration_ab_test_variant_overlays_branding_last() {
    let factory = factory_with_eng_team();
    factory
        .setup_ab_test(
            "footer-test",
            BTreeMap::from([(
                "b".to_string(),
                AbTestVariant {
                    branding: BTreeMap::from([(
                        "footer".to_string(),
                        "Engineering Updates (B)".to_string(),
                    )]),
                    interactive_elements: None,
                },
            )]),
        )
        .expect("setup ab test");
    let options = FormatOptions {
        ab_test: Some(AbTestSelection {
            test: "footer-test".to_string(),
            variant: "b".to_string(),
        }),
        ..FormatOptions::default()
    };
    let data = json!({"blocker": {"description": "CI is down", "reporter": "dana"}});
    let control = factory.format("blocker", &data, None, Some("eng"), None);
    let variant = factory.format("blocker", &data, None, Some("eng"), Some(&options));
    assert!(rendered_blocks(&control).contains("Engineering Updates"));
    assert!(rendered_blocks(&variant).contains("Engineering Updates (B)"));
}

#[test]
fn integration_missing_required_fields_become_placeholders() {
    let factory = MessageFormatFactory::new();
    let result = factory.format("jira_update", &json!({}), None, None, None);
    assert!(result.success);
    let message = result.message.expect("message");
    assert!(message.fallback_text.contains("UNKNOWN"));
    assert!(message.fallback_text.contains("Unknown ticket"));

    let standup = factory.format("standup", &json!({}), None, None, None);
    assert!(standup.success);
    assert!(standup
        .message
        .expect("message")
        .fallback_text
        .contains("Unknown team"));
}

#[test]
fn integration_oversized_message_is_returned_with_advisory_warning() {
    let factory = MessageFormatFactory::new();
    let prs = (0..60)
        .map(|index| {
            json!({
                "number": index,
                "title": "x".repeat(1_200),
                "status": "open"
            })
        })
        .collect::<Vec<_>>();
    let result = factory.format("pr_batch", &json!({"prs": prs}), None, None, None);
    assert!(result.success);
    assert!(result
        .warnings
        .iter()
        .any(|warning| warning.kind == ValidationWarningKind::PayloadSize));
    assert!(result
        .warnings
        .iter()
        .any(|warning| warning.kind == ValidationWarningKind::BlockCount));
}

#[test]
fn integration_metrics_accumulate_across_the_pipeline() {
    let factory = MessageFormatFactory::new();
    let data = json!({"date": "2024-01-15", "team": "Eng"});
    factory.format("standup", &data, None, None, None);
    factory.format("standup", &data, None, None, None);
    factory.format("standup", &json!([]), None, None, None);

    let metrics = factory.get_metrics().expect("metrics");
    assert_eq!(metrics.total_messages, 3);
    assert_eq!(metrics.formatter_usage.get("StandupFormatter"), Some(&2));
    assert!(metrics.cache_hit_rate_percent > 0.0);
    assert!(metrics.error_rate_percent > 0.0);
    assert_eq!(metrics.cache_size, 1);

    factory.reset_metrics().expect("reset");
    let reset = factory.get_metrics().expect("metrics");
    assert_eq!(reset.total_messages, 0);
    assert!(reset.formatter_usage.is_empty());
}

#[test]
fn integration_registered_formatters_lists_all_builtins() {
    let factory = MessageFormatFactory::new();
    let registered = factory.registered_formatters().expect("registry");
    for kind in [
        "pr_update",
        "pr_batch",
        "jira_update",
        "jira_batch",
        "standup",
        "blocker",
    ] {
        assert!(registered.contains_key(kind), "missing builtin kind {kind}");
    }
}
