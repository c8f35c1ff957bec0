//! Layered message formatting for Courier.
//!
//! Converts structured domain events (pull requests, tickets, standups,
//! blockers, hook executions) into Block Kit payloads. The factory routes a
//! message kind to its formatter, layers team/channel/per-call configuration,
//! caches rendered messages, validates against platform limits, and degrades
//! through a five-strategy fallback chain rather than raising.
//!
//! ```rust
//! use courier_format::MessageFormatFactory;
//! use serde_json::json;
//!
//! let factory = MessageFormatFactory::new();
//! let result = factory.format(
//!     "pr_update",
//!     &json!({"pr": {"number": 12, "title": "Fix login redirect"}}),
//!     None,
//!     None,
//!     None,
//! );
//! assert!(result.success);
//! assert!(result.message.is_some());
//! ```

pub mod format_builtin;
pub mod format_cache;
pub mod format_config;
pub mod format_contract;
pub mod format_factory;
pub mod format_fallback;
pub mod format_metrics;
pub mod format_status;
pub mod format_validate;

pub use format_builtin::*;
pub use format_cache::*;
pub use format_config::*;
pub use format_contract::*;
pub use format_factory::*;
pub use format_fallback::*;
pub use format_metrics::*;
pub use format_status::*;
pub use format_validate::*;
