//! The message-format factory: routing, caching, validation, and the
//! never-throws error boundary.
//!
//! `MessageFormatFactory` owns every long-lived registry (formatters, team
//! and channel configs, A/B tests), the message and formatter-instance
//! caches, metrics, and the fallback chain. Each shared structure carries
//! its own lock so the factory can be driven from multiple threads. The
//! public `format` method is the sole error boundary: callers always get a
//! [`ProcessingResult`], never a raised error.

use std::collections::{BTreeMap, HashMap};
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Instant;

use anyhow::{anyhow, Result};
use courier_core::current_unix_timestamp_ms;
use serde_json::Value;

use crate::format_builtin::{
    header_block, section_block, BlockerFormatter, JiraBatchFormatter, JiraUpdateFormatter,
    PrBatchFormatter, PrUpdateFormatter, StandupFormatter,
};
use crate::format_cache::{compute_cache_key, MessageCache};
use crate::format_config::{
    resolve_effective_config, AbTest, ChannelConfig, ChannelStyle, EffectiveConfig, FormatOptions,
    TeamConfig,
};
use crate::format_contract::{
    FormatError, FormattedMessage, FormatterConstructor, MessageFormatter, MessageKind,
    ProcessingResult, METADATA_FORMATTED_UNIX_MS_KEY, METADATA_FORMATTER_KEY,
};
use crate::format_fallback::{
    FallbackChain, FallbackContext, FallbackHandler, FallbackStats, FallbackStrategy,
    FallbackTrigger,
};
use crate::format_metrics::{FormatMetrics, MetricsSnapshot};
use crate::format_validate::{validate_message, ValidationWarning, ValidationWarningKind};

const FACTORY_FALLBACK_NAME: &str = "FactoryFallback";
const ECHOED_DEBUG_FIELDS: usize = 5;

/// Public struct `MessageFormatFactory` used across Courier components.
pub struct MessageFormatFactory {
    formatters: Mutex<HashMap<String, FormatterConstructor>>,
    team_configs: Mutex<HashMap<String, TeamConfig>>,
    channel_configs: Mutex<HashMap<String, ChannelConfig>>,
    ab_tests: Mutex<HashMap<String, AbTest>>,
    message_cache: Mutex<MessageCache>,
    instance_cache: Mutex<HashMap<(String, u64), Arc<dyn MessageFormatter>>>,
    metrics: Mutex<FormatMetrics>,
    fallback_chain: Mutex<FallbackChain>,
}

impl Default for MessageFormatFactory {
    fn default() -> Self {
        Self::new()
    }
}

impl MessageFormatFactory {
    /// Constructs a factory with all built-in formatters registered.
    pub fn new() -> Self {
        let mut formatters: HashMap<String, FormatterConstructor> = HashMap::new();
        formatters.insert("pr_update".to_string(), PrUpdateFormatter::constructor());
        formatters.insert("pr_batch".to_string(), PrBatchFormatter::constructor());
        formatters.insert("jira_update".to_string(), JiraUpdateFormatter::constructor());
        formatters.insert("jira_batch".to_string(), JiraBatchFormatter::constructor());
        formatters.insert("standup".to_string(), StandupFormatter::constructor());
        formatters.insert("blocker".to_string(), BlockerFormatter::constructor());
        Self {
            formatters: Mutex::new(formatters),
            team_configs: Mutex::new(HashMap::new()),
            channel_configs: Mutex::new(HashMap::new()),
            ab_tests: Mutex::new(HashMap::new()),
            message_cache: Mutex::new(MessageCache::default()),
            instance_cache: Mutex::new(HashMap::new()),
            metrics: Mutex::new(FormatMetrics::default()),
            fallback_chain: Mutex::new(FallbackChain::default()),
        }
    }

    /// Associates a message kind with a formatter constructor; last
    /// registration for a given kind wins.
    pub fn register_formatter(
        &self,
        kind: MessageKind,
        constructor: FormatterConstructor,
    ) -> Result<()> {
        lock(&self.formatters, "formatter registry")?
            .insert(kind.as_str().to_string(), constructor);
        Ok(())
    }

    /// Registers a string-keyed custom kind outside the closed enum.
    pub fn register_custom_formatter(
        &self,
        type_name: &str,
        constructor: FormatterConstructor,
    ) -> Result<()> {
        let kind = MessageKind::parse(type_name)?;
        self.register_formatter(kind, constructor)
    }

    /// Upserts a team configuration (last write wins).
    pub fn configure_team(&self, config: TeamConfig) -> Result<()> {
        lock(&self.team_configs, "team config registry")?.insert(config.team_id.clone(), config);
        Ok(())
    }

    /// Upserts a channel configuration (last write wins).
    pub fn configure_channel(&self, config: ChannelConfig) -> Result<()> {
        lock(&self.channel_configs, "channel config registry")?
            .insert(config.channel_id.clone(), config);
        Ok(())
    }

    /// Registers a named experiment with its variant overrides.
    pub fn setup_ab_test(&self, test_name: &str, variants: AbTest) -> Result<()> {
        lock(&self.ab_tests, "ab test registry")?.insert(test_name.to_string(), variants);
        Ok(())
    }

    /// Replaces one fallback strategy slot with a custom handler.
    pub fn register_fallback_handler(
        &self,
        strategy: FallbackStrategy,
        handler: FallbackHandler,
    ) -> Result<()> {
        lock(&self.fallback_chain, "fallback chain")?.register_handler(strategy, handler);
        Ok(())
    }

    /// Registered kind name to formatter class name, for diagnostics.
    pub fn registered_formatters(&self) -> Result<BTreeMap<String, String>> {
        let formatters = lock(&self.formatters, "formatter registry")?;
        let config = EffectiveConfig::default();
        Ok(formatters
            .iter()
            .map(|(kind, constructor)| (kind.clone(), constructor(&config).name().to_string()))
            .collect())
    }

    /// Read-only metrics snapshot, including the current cache size.
    pub fn get_metrics(&self) -> Result<MetricsSnapshot> {
        let cache_size = lock(&self.message_cache, "message cache")?.len();
        Ok(lock(&self.metrics, "metrics")?.snapshot(cache_size))
    }

    pub fn reset_metrics(&self) -> Result<()> {
        lock(&self.metrics, "metrics")?.reset();
        Ok(())
    }

    /// Aggregate fallback-chain statistics.
    pub fn fallback_stats(&self) -> Result<FallbackStats> {
        Ok(lock(&self.fallback_chain, "fallback chain")?.stats().clone())
    }

    /// Empties the message cache. The formatter-instance cache is untouched.
    pub fn clear_cache(&self) -> Result<()> {
        lock(&self.message_cache, "message cache")?.clear();
        Ok(())
    }

    /// Formats one domain event into a message. Never panics and never
    /// returns an error: every internal failure is converted into either a
    /// fallback-produced result or a `success=false` result.
    pub fn format(
        &self,
        message_kind: &str,
        data: &Value,
        channel: Option<&str>,
        team: Option<&str>,
        options: Option<&FormatOptions>,
    ) -> ProcessingResult {
        let started = Instant::now();
        match self.format_inner(message_kind, data, channel, team, options, &started) {
            Ok(result) => result,
            Err(error) => self.factory_fallback_result(message_kind, data, error, &started),
        }
    }

    /// Direct entry into the fallback chain, for callers that detected the
    /// failure themselves.
    pub fn handle_formatting_failure(&self, context: &FallbackContext) -> ProcessingResult {
        let started = Instant::now();
        let outcome = lock(&self.fallback_chain, "fallback chain")
            .and_then(|mut chain| chain.handle(context).map_err(anyhow::Error::from));
        let elapsed = elapsed_ms(&started);
        match outcome {
            Ok((mut message, strategy)) => {
                stamp_provenance(&mut message, strategy.formatter_name());
                self.record_metrics(strategy.formatter_name(), elapsed, false, true);
                ProcessingResult {
                    success: true,
                    message: Some(message),
                    error: context.error.as_ref().map(|error| error.to_string()),
                    warnings: vec![fallback_warning()],
                    processing_time_ms: elapsed,
                    formatter_used: strategy.formatter_name().to_string(),
                    cache_hit: false,
                }
            }
            Err(error) => {
                self.record_metrics("", elapsed, false, true);
                ProcessingResult::failure(format!("{error:#}"), elapsed)
            }
        }
    }

    fn format_inner(
        &self,
        message_kind: &str,
        data: &Value,
        channel: Option<&str>,
        team: Option<&str>,
        options: Option<&FormatOptions>,
        started: &Instant,
    ) -> Result<ProcessingResult> {
        let kind = MessageKind::parse(message_kind)?;
        if !data.is_object() {
            return Err(FormatError::InvalidData.into());
        }

        // Deep copy so a formatter can never mutate caller state; missing
        // required fields become documented placeholders instead of errors.
        let mut data = data.clone();
        if let Some(object) = data.as_object_mut() {
            for (field, placeholder) in kind.required_fields() {
                object
                    .entry(field.to_string())
                    .or_insert_with(|| placeholder.clone());
            }
        }

        let config = {
            let teams = lock(&self.team_configs, "team config registry")?;
            let channels = lock(&self.channel_configs, "channel config registry")?;
            let ab_tests = lock(&self.ab_tests, "ab test registry")?;
            resolve_effective_config(&teams, &channels, &ab_tests, team, channel, options)
        };
        let channel_style = channel
            .and_then(|id| {
                lock(&self.channel_configs, "channel config registry")
                    .ok()
                    .and_then(|channels| channels.get(id).map(|config| config.formatting_style))
            })
            .unwrap_or_default();

        let formatter = match self.formatter_instance(&kind, &config) {
            Ok(formatter) => formatter,
            // A missing formatter is a formatting failure, not a pipeline
            // failure: the chain can still produce a degraded message.
            Err(error)
                if error
                    .downcast_ref::<FormatError>()
                    .is_some_and(|typed| matches!(typed, FormatError::UnregisteredKind(_))) =>
            {
                return self.formatter_failure_result(
                    &kind,
                    &data,
                    (FallbackTrigger::TemplateError, error),
                    team,
                    channel,
                    started,
                );
            }
            Err(error) => return Err(error),
        };

        let cache_key = compute_cache_key(&kind, &data, options, &config, channel_style);
        let now_ms = current_unix_timestamp_ms();
        if let Some(cached) = lock(&self.message_cache, "message cache")?.get(&cache_key, now_ms) {
            let elapsed = elapsed_ms(started);
            self.record_metrics(formatter.name(), elapsed, true, false);
            return Ok(ProcessingResult {
                success: true,
                message: Some(cached),
                error: None,
                warnings: Vec::new(),
                processing_time_ms: elapsed,
                formatter_used: formatter.name().to_string(),
                cache_hit: true,
            });
        }

        let mut message = match self.invoke_formatter(&kind, formatter.as_ref(), &data) {
            Ok(message) => message,
            Err(error) => {
                return self.formatter_failure_result(&kind, &data, error, team, channel, started)
            }
        };

        apply_channel_post_processing(&mut message, channel_style);
        if options.is_some_and(|options| options.experimental_features) {
            apply_experimental_features(&mut message);
        }
        stamp_provenance(&mut message, formatter.name());
        message.channel = channel.map(str::to_string);

        let warnings = validate_message(&message);
        if !warnings.is_empty() {
            tracing::debug!(
                kind = kind.as_str(),
                warning_count = warnings.len(),
                "formatted message carries validation warnings"
            );
        }

        lock(&self.message_cache, "message cache")?.put(cache_key, message.clone(), now_ms);
        let elapsed = elapsed_ms(started);
        self.record_metrics(formatter.name(), elapsed, false, false);

        Ok(ProcessingResult {
            success: true,
            message: Some(message),
            error: None,
            warnings,
            processing_time_ms: elapsed,
            formatter_used: formatter.name().to_string(),
            cache_hit: false,
        })
    }

    /// Fetch-or-construct the formatter instance for (kind, config).
    ///
    /// Instances are keyed by the structural config hash so repeated calls
    /// with an identical effective configuration reuse one instance.
    fn formatter_instance(
        &self,
        kind: &MessageKind,
        config: &EffectiveConfig,
    ) -> Result<Arc<dyn MessageFormatter>> {
        let key = (kind.as_str().to_string(), config.structural_hash());
        let mut instances = lock(&self.instance_cache, "instance cache")?;
        if let Some(instance) = instances.get(&key) {
            return Ok(Arc::clone(instance));
        }
        let constructor = lock(&self.formatters, "formatter registry")?
            .get(kind.as_str())
            .cloned()
            .ok_or_else(|| FormatError::UnregisteredKind(kind.as_str().to_string()))?;
        let instance = constructor(config);
        instances.insert(key, Arc::clone(&instance));
        Ok(instance)
    }

    fn invoke_formatter(
        &self,
        kind: &MessageKind,
        formatter: &dyn MessageFormatter,
        data: &Value,
    ) -> std::result::Result<FormattedMessage, (FallbackTrigger, anyhow::Error)> {
        // Safety net for misbehaving third-party formatters: a panic is
        // converted into a structured failure instead of unwinding through
        // the never-throws boundary.
        match catch_unwind(AssertUnwindSafe(|| formatter.format(data))) {
            Ok(Ok(message)) => Ok(message),
            Ok(Err(error)) => Err((
                FallbackTrigger::TemplateError,
                anyhow::Error::from(FormatError::Formatter {
                    kind: kind.as_str().to_string(),
                    detail: format!("{error:#}"),
                }),
            )),
            Err(_) => Err((
                FallbackTrigger::InvalidStructure,
                anyhow!("formatter for '{}' panicked", kind.as_str()),
            )),
        }
    }

    /// Routes a formatter failure through the five-strategy chain.
    fn formatter_failure_result(
        &self,
        kind: &MessageKind,
        data: &Value,
        (trigger, error): (FallbackTrigger, anyhow::Error),
        team: Option<&str>,
        channel: Option<&str>,
        started: &Instant,
    ) -> Result<ProcessingResult> {
        tracing::warn!(
            kind = kind.as_str(),
            trigger = trigger.as_str(),
            "formatter failed, entering fallback chain: {error:#}"
        );
        let context = FallbackContext::new(trigger, kind.as_str(), data.clone(), Some(error))
            .with_scope(team, channel);
        let (mut message, strategy) = lock(&self.fallback_chain, "fallback chain")?
            .handle(&context)
            .map_err(anyhow::Error::from)?;
        stamp_provenance(&mut message, strategy.formatter_name());
        let elapsed = elapsed_ms(started);
        self.record_metrics(strategy.formatter_name(), elapsed, false, true);
        Ok(ProcessingResult {
            success: true,
            message: Some(message),
            error: context.error.as_ref().map(|error| error.to_string()),
            warnings: vec![fallback_warning()],
            processing_time_ms: elapsed,
            formatter_used: strategy.formatter_name().to_string(),
            cache_hit: false,
        })
    }

    /// The top-level catch: a simpler, factory-owned fallback used when the
    /// pipeline fails outside formatter invocation (or the chain itself is
    /// exhausted).
    fn factory_fallback_result(
        &self,
        message_kind: &str,
        data: &Value,
        error: anyhow::Error,
        started: &Instant,
    ) -> ProcessingResult {
        tracing::warn!(
            kind = message_kind,
            "message formatting failed, using factory fallback: {error:#}"
        );
        let elapsed = elapsed_ms(started);
        self.record_metrics("", elapsed, false, true);
        match create_fallback_message(message_kind, data, &error) {
            Ok(message) => ProcessingResult {
                success: false,
                message: Some(message),
                error: Some(format!("{error:#}")),
                warnings: vec![fallback_warning()],
                processing_time_ms: elapsed,
                formatter_used: FACTORY_FALLBACK_NAME.to_string(),
                cache_hit: false,
            },
            Err(second) => ProcessingResult::failure(
                format!("{error:#}; additionally the factory fallback failed: {second:#}"),
                elapsed,
            ),
        }
    }

    fn record_metrics(
        &self,
        formatter_used: &str,
        elapsed_ms: u64,
        cache_hit: bool,
        errored: bool,
    ) {
        // Metrics must never break the never-throws boundary; a poisoned
        // lock drops the sample.
        if let Ok(mut metrics) = self.metrics.lock() {
            metrics.record_request(formatter_used, elapsed_ms, cache_hit, errored);
        }
    }

    #[cfg(test)]
    fn formatter_instance_count(&self) -> usize {
        self.instance_cache
            .lock()
            .map(|instances| instances.len())
            .unwrap_or(0)
    }
}

fn lock<'a, T>(mutex: &'a Mutex<T>, name: &str) -> Result<MutexGuard<'a, T>> {
    mutex.lock().map_err(|_| anyhow!("{name} mutex is poisoned"))
}

fn elapsed_ms(started: &Instant) -> u64 {
    u64::try_from(started.elapsed().as_millis()).unwrap_or(u64::MAX)
}

fn fallback_warning() -> ValidationWarning {
    ValidationWarning::new(
        ValidationWarningKind::FallbackFormatting,
        "used fallback formatting",
    )
}

fn stamp_provenance(message: &mut FormattedMessage, formatter_used: &str) {
    message.metadata.insert(
        METADATA_FORMATTER_KEY.to_string(),
        Value::String(formatter_used.to_string()),
    );
    message.metadata.insert(
        METADATA_FORMATTED_UNIX_MS_KEY.to_string(),
        Value::from(current_unix_timestamp_ms()),
    );
}

fn apply_channel_post_processing(message: &mut FormattedMessage, style: ChannelStyle) {
    match style {
        // Minimal channels drop structural chrome; rich is reserved for
        // future enrichment.
        ChannelStyle::Minimal => message
            .blocks
            .retain(|block| block.get("type").and_then(Value::as_str) != Some("divider")),
        ChannelStyle::Rich => {}
    }
}

/// Reserved extension point for per-call experimental features.
fn apply_experimental_features(_message: &mut FormattedMessage) {}

/// Builds the two-block debugging message for the top-level catch: a warning
/// header plus the error and the first few scalar input fields.
fn create_fallback_message(
    message_kind: &str,
    data: &Value,
    error: &anyhow::Error,
) -> Result<FormattedMessage> {
    let mut lines = vec![format!("Error: {error}")];
    if let Some(object) = data.as_object() {
        for (key, value) in object
            .iter()
            .filter(|(_, value)| !value.is_object() && !value.is_array())
            .take(ECHOED_DEBUG_FIELDS)
        {
            lines.push(format!("{key}: {value}"));
        }
    }
    let mut message = FormattedMessage::new(
        vec![
            header_block(&format!("⚠️ {message_kind} formatting failed")),
            section_block(&lines.join("\n")),
        ],
        format!("{message_kind} formatting failed: {error}"),
    );
    message
        .metadata
        .insert("error".to_string(), Value::Bool(true));
    Ok(message)
}
