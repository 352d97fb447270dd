//! Dayscope - On-device reconstruction engine for daily device-usage analytics
//!
//! Dayscope converts one calendar day's unordered bag of raw device-interaction
//! events into structured usage statistics through a deterministic pipeline:
//! usage/active-time aggregation, unlock-session reconstruction, scroll-session
//! merging, and insight derivation, assembled into one immutable result bundle.
//!
//! ## Modules
//!
//! - **usage**: foreground intervals, active time, debounced app opens
//! - **unlock**: unlock/lock state machine with ghost recovery
//! - **scroll**: two-tier scroll session merging
//! - **insights**: derived daily key/value facts
//! - **pipeline**: the per-date orchestrator

pub mod adapter;
pub mod error;
pub mod insights;
pub mod pipeline;
pub mod scroll;
pub mod types;
pub mod unlock;
pub mod usage;

// FFI bindings for C interop (always available for cdylib/staticlib builds)
pub mod ffi;

pub use error::EngineError;
pub use pipeline::{process_day, process_day_json};

// Model exports
pub use types::{
    DailyAppUsageRecord, DailyDeviceSummary, DailyInsight, DailyProcessingResult, DayBatch,
    EventKind, InsightKey, NotificationRecord, RawEvent, ScrollDataTier, ScrollSessionRecord,
    SessionEndReason, SessionType, UnlockSessionRecord,
};

/// Engine version embedded in the CLI and FFI surfaces
pub const ENGINE_VERSION: &str = env!("CARGO_PKG_VERSION");

/// Producer name reported by the CLI
pub const PRODUCER_NAME: &str = "dayscope";
