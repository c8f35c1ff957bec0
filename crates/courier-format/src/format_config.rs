//! Team, channel, and A/B-test configuration plus per-request resolution.
//!
//! Registration records live for the process lifetime in the factory's
//! registries (last write wins). `resolve_effective_config` merges base
//! defaults, team, channel, and per-call options into one ephemeral
//! [`EffectiveConfig`] per request; unknown team/channel ids apply no
//! overlay. The resolver is pure over registry state and infallible.

use std::collections::{BTreeMap, HashMap};
use std::hash::{Hash, Hasher};

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
/// Public struct `TeamConfig` used across Courier components.
pub struct TeamConfig {
    pub team_id: String,
    #[serde(default)]
    pub branding: BTreeMap<String, String>,
    #[serde(default)]
    pub emoji_overrides: BTreeMap<String, String>,
    #[serde(default)]
    pub color_overrides: BTreeMap<String, String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
/// Enumerates supported `ChannelStyle` values.
pub enum ChannelStyle {
    #[default]
    Rich,
    Minimal,
}

impl ChannelStyle {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Rich => "rich",
            Self::Minimal => "minimal",
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
/// Public struct `ChannelConfig` used across Courier components.
pub struct ChannelConfig {
    pub channel_id: String,
    #[serde(default)]
    pub formatting_style: ChannelStyle,
    #[serde(default)]
    pub interactive_elements: Option<bool>,
    #[serde(default)]
    pub threading_enabled: Option<bool>,
    #[serde(default)]
    pub branding: BTreeMap<String, String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
/// Per-variant override record for a registered experiment.
pub struct AbTestVariant {
    #[serde(default)]
    pub branding: BTreeMap<String, String>,
    #[serde(default)]
    pub interactive_elements: Option<bool>,
}

/// Variant-name to override mapping for one named experiment.
pub type AbTest = BTreeMap<String, AbTestVariant>;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
/// Names a registered experiment variant selected for one request.
pub struct AbTestSelection {
    pub test: String,
    pub variant: String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
/// Public struct `FormatOptions` used across Courier components.
///
/// Per-call overrides; highest precedence in the merge order.
pub struct FormatOptions {
    #[serde(default)]
    pub interactive_elements: Option<bool>,
    #[serde(default)]
    pub accessibility_mode: Option<bool>,
    #[serde(default)]
    pub threading_enabled: Option<bool>,
    #[serde(default)]
    pub experimental_features: bool,
    #[serde(default)]
    pub ab_test: Option<AbTestSelection>,
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
/// Public struct `EffectiveConfig` used across Courier components.
///
/// Fully-merged configuration for one request. Never stored; the structural
/// `Hash` over its fields keys the formatter-instance cache.
pub struct EffectiveConfig {
    pub team_id: String,
    pub branding: BTreeMap<String, String>,
    pub emoji_overrides: BTreeMap<String, String>,
    pub color_overrides: BTreeMap<String, String>,
    pub interactive_elements: bool,
    pub accessibility_mode: bool,
    pub threading_enabled: bool,
}

impl Default for EffectiveConfig {
    fn default() -> Self {
        Self {
            team_id: "default".to_string(),
            branding: BTreeMap::new(),
            emoji_overrides: BTreeMap::new(),
            color_overrides: BTreeMap::new(),
            interactive_elements: true,
            accessibility_mode: false,
            threading_enabled: true,
        }
    }
}

impl EffectiveConfig {
    /// Deterministic structural hash over all fields.
    ///
    /// BTreeMap fields iterate in key order, so equal configs always hash
    /// identically regardless of insertion order.
    pub fn structural_hash(&self) -> u64 {
        let mut hasher = std::collections::hash_map::DefaultHasher::new();
        self.hash(&mut hasher);
        hasher.finish()
    }

    pub fn emoji(&self, key: &str, default: &str) -> String {
        self.emoji_overrides
            .get(key)
            .cloned()
            .unwrap_or_else(|| default.to_string())
    }

    pub fn color(&self, key: &str, default: &str) -> String {
        self.color_overrides
            .get(key)
            .cloned()
            .unwrap_or_else(|| default.to_string())
    }
}

/// Merges base default, team, channel, and per-call options in priority
/// order into one effective configuration.
pub fn resolve_effective_config(
    teams: &HashMap<String, TeamConfig>,
    channels: &HashMap<String, ChannelConfig>,
    ab_tests: &HashMap<String, AbTest>,
    team_id: Option<&str>,
    channel_id: Option<&str>,
    options: Option<&FormatOptions>,
) -> EffectiveConfig {
    let mut config = EffectiveConfig::default();

    if let Some(team) = team_id.and_then(|id| teams.get(id)) {
        config.team_id = team.team_id.clone();
        // Merge, not replace: later keys win on collision.
        config.branding.extend(team.branding.clone());
        config.emoji_overrides.extend(team.emoji_overrides.clone());
        config.color_overrides.extend(team.color_overrides.clone());
    }

    if let Some(channel) = channel_id.and_then(|id| channels.get(id)) {
        if let Some(interactive) = channel.interactive_elements {
            config.interactive_elements = interactive;
        }
        if let Some(threading) = channel.threading_enabled {
            config.threading_enabled = threading;
        }
        if !channel.branding.is_empty() {
            config.branding = channel.branding.clone();
        }
    }

    if let Some(options) = options {
        if let Some(interactive) = options.interactive_elements {
            config.interactive_elements = interactive;
        }
        if let Some(accessibility) = options.accessibility_mode {
            config.accessibility_mode = accessibility;
        }
        if let Some(threading) = options.threading_enabled {
            config.threading_enabled = threading;
        }
        if let Some(selection) = options.ab_test.as_ref() {
            let variant = ab_tests
                .get(selection.test.as_str())
                .and_then(|test| test.get(selection.variant.as_str()));
            if let Some(variant) = variant {
                config.branding.extend(variant.branding.clone());
                if let Some(interactive) = variant.interactive_elements {
                    config.interactive_elements = interactive;
                }
            }
        }
    }

    config
}
