//! Visual status descriptors for message rendering.
//!
//! Pure lookup from semantic status/priority/health strings to an emoji,
//! hex color, and label. Resolution is lenient: case and surrounding
//! whitespace are ignored and unknown input resolves to a neutral default
//! rather than failing.

use serde::Serialize;

pub const COLOR_SUCCESS: &str = "#2eb67d";
pub const COLOR_WARNING: &str = "#ecb22e";
pub const COLOR_DANGER: &str = "#e01e5a";
pub const COLOR_INFO: &str = "#36c5f0";
pub const COLOR_NEUTRAL: &str = "#868686";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
/// Public struct `StatusIndicator` used across Courier components.
pub struct StatusIndicator {
    pub symbol: &'static str,
    pub color: &'static str,
    pub label: &'static str,
}

const DEFAULT_INDICATOR: StatusIndicator = StatusIndicator {
    symbol: "ℹ️",
    color: COLOR_NEUTRAL,
    label: "unknown",
};

/// Resolves an execution/workflow status string to its indicator.
pub fn status_indicator(raw: &str) -> StatusIndicator {
    match normalize(raw).as_str() {
        "success" | "succeeded" | "passed" | "completed" | "done" | "merged" => StatusIndicator {
            symbol: "✅",
            color: COLOR_SUCCESS,
            label: "success",
        },
        "failure" | "failed" | "error" => StatusIndicator {
            symbol: "❌",
            color: COLOR_DANGER,
            label: "failure",
        },
        "warning" | "unstable" | "flaky" => StatusIndicator {
            symbol: "⚠️",
            color: COLOR_WARNING,
            label: "warning",
        },
        "pending" | "queued" | "waiting" => StatusIndicator {
            symbol: "⏳",
            color: COLOR_INFO,
            label: "pending",
        },
        "running" | "in_progress" | "in progress" | "started" => StatusIndicator {
            symbol: "🔄",
            color: COLOR_INFO,
            label: "running",
        },
        "skipped" | "cancelled" | "canceled" => StatusIndicator {
            symbol: "⏭️",
            color: COLOR_NEUTRAL,
            label: "skipped",
        },
        _ => DEFAULT_INDICATOR,
    }
}

/// Resolves an urgency/priority string to its indicator.
pub fn priority_indicator(raw: &str) -> StatusIndicator {
    match normalize(raw).as_str() {
        "critical" | "blocker" | "p0" => StatusIndicator {
            symbol: "🚨",
            color: COLOR_DANGER,
            label: "critical",
        },
        "high" | "urgent" | "p1" => StatusIndicator {
            symbol: "🔴",
            color: COLOR_DANGER,
            label: "high",
        },
        "medium" | "normal" | "p2" => StatusIndicator {
            symbol: "🟡",
            color: COLOR_WARNING,
            label: "medium",
        },
        "low" | "minor" | "p3" => StatusIndicator {
            symbol: "🟢",
            color: COLOR_SUCCESS,
            label: "low",
        },
        _ => DEFAULT_INDICATOR,
    }
}

/// Resolves a service/team health string to its indicator.
pub fn health_indicator(raw: &str) -> StatusIndicator {
    match normalize(raw).as_str() {
        "healthy" | "green" | "ok" => StatusIndicator {
            symbol: "💚",
            color: COLOR_SUCCESS,
            label: "healthy",
        },
        "degraded" | "yellow" => StatusIndicator {
            symbol: "💛",
            color: COLOR_WARNING,
            label: "degraded",
        },
        "unhealthy" | "red" | "down" => StatusIndicator {
            symbol: "💔",
            color: COLOR_DANGER,
            label: "unhealthy",
        },
        _ => DEFAULT_INDICATOR,
    }
}

fn normalize(raw: &str) -> String {
    raw.trim().to_ascii_lowercase()
}
