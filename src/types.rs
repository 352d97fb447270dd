//! Data model for the daily reconstruction engine
//!
//! Inputs (`RawEvent`, `NotificationRecord`, `DayBatch`) are immutable,
//! append-only snapshots supplied by collaborators; outputs are produced
//! fresh per run and a run for a date fully supersedes the previous result
//! for that date.

use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};

/// Closed enumeration of raw device-interaction signals
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventKind {
    ActivityResumed,
    ActivityPaused,
    ActivityStopped,
    ScreenNonInteractive,
    UserUnlocked,
    KeyguardHidden,
    KeyguardShown,
    UserPresent,
    ServiceStarted,
    ServiceStopped,
    ScrollMeasured,
    ScrollInferred,
    Typing,
    ViewClicked,
    ViewFocused,
    GenericInteraction,
    NotificationPosted,
    NotificationRemoved,
}

impl EventKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            EventKind::ActivityResumed => "activity_resumed",
            EventKind::ActivityPaused => "activity_paused",
            EventKind::ActivityStopped => "activity_stopped",
            EventKind::ScreenNonInteractive => "screen_non_interactive",
            EventKind::UserUnlocked => "user_unlocked",
            EventKind::KeyguardHidden => "keyguard_hidden",
            EventKind::KeyguardShown => "keyguard_shown",
            EventKind::UserPresent => "user_present",
            EventKind::ServiceStarted => "service_started",
            EventKind::ServiceStopped => "service_stopped",
            EventKind::ScrollMeasured => "scroll_measured",
            EventKind::ScrollInferred => "scroll_inferred",
            EventKind::Typing => "typing",
            EventKind::ViewClicked => "view_clicked",
            EventKind::ViewFocused => "view_focused",
            EventKind::GenericInteraction => "generic_interaction",
            EventKind::NotificationPosted => "notification_posted",
            EventKind::NotificationRemoved => "notification_removed",
        }
    }

    /// Signals that the keyguard was dismissed and the user is on the device
    pub fn is_unlock_class(&self) -> bool {
        matches!(
            self,
            EventKind::UserUnlocked | EventKind::UserPresent | EventKind::KeyguardHidden
        )
    }

    /// Scroll-amount events, either data tier
    pub fn is_scroll(&self) -> bool {
        matches!(self, EventKind::ScrollMeasured | EventKind::ScrollInferred)
    }

    /// Events that carry a package-scoped payload
    pub fn requires_package(&self) -> bool {
        matches!(
            self,
            EventKind::ActivityResumed
                | EventKind::ActivityPaused
                | EventKind::ActivityStopped
                | EventKind::ScrollMeasured
                | EventKind::ScrollInferred
                | EventKind::Typing
                | EventKind::ViewClicked
                | EventKind::ViewFocused
                | EventKind::GenericInteraction
                | EventKind::NotificationPosted
                | EventKind::NotificationRemoved
        )
    }
}

/// One raw, timestamped device-interaction event. Never mutated by the engine.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RawEvent {
    /// Package the event is attributed to (may be empty for device-level events)
    #[serde(default)]
    pub package_name: String,
    pub event_kind: EventKind,
    /// UTC epoch milliseconds
    pub timestamp_millis: i64,
    /// Local-calendar-day key, `YYYY-MM-DD`
    pub date_string: String,
    /// Signed pixel delta (measured scroll schema)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub scroll_delta_x: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub scroll_delta_y: Option<i64>,
    /// Legacy magnitude-only scroll signal, pre-delta schema
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub value: Option<i64>,
    /// Producer tag (accessibility service, system listener, ...)
    #[serde(default)]
    pub source: String,
}

/// A posted notification observed during the day. Read-only input.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NotificationRecord {
    pub package_name: String,
    /// UTC epoch milliseconds
    pub post_time_utc: i64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub category: Option<String>,
}

/// One unbroken foreground occupancy, half-open `[start_time, end_time)`.
/// Engine-internal; never persisted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UsageInterval {
    pub package_name: String,
    pub start_time: i64,
    pub end_time: i64,
}

impl UsageInterval {
    pub fn duration_millis(&self) -> i64 {
        self.end_time - self.start_time
    }
}

/// Per-(package, date) usage rollup
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DailyAppUsageRecord {
    pub package_name: String,
    pub date_string: String,
    /// Sum of foreground interval durations
    pub usage_time_millis: i64,
    /// Sum of merged interaction windows, always <= usage_time_millis
    pub active_time_millis: i64,
    pub app_open_count: u32,
    pub notification_count: u32,
}

/// Behavioral classification of an unlock session
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionType {
    Glance,
    Intentional,
}

/// How an unlock session was closed
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SessionEndReason {
    Locked,
    Interrupted,
    Ghost,
}

/// One reconstructed unlock-to-lock session. A session with no
/// `lock_timestamp` spans past the processed window and is returned open.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UnlockSessionRecord {
    pub unlock_timestamp: i64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub lock_timestamp: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub duration_millis: Option<i64>,
    pub date_string: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub first_app_package_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub session_type: Option<SessionType>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub session_end_reason: Option<SessionEndReason>,
    pub is_compulsive: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub triggering_notification_package_name: Option<String>,
}

/// Scroll data-quality tier; mutually exclusive per package per run
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ScrollDataTier {
    Measured,
    Inferred,
}

/// One contiguous scroll session for a package
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScrollSessionRecord {
    pub package_name: String,
    pub session_start_time: i64,
    pub session_end_time: i64,
    /// Sum of absolute per-axis deltas across the session
    pub scroll_amount: i64,
    pub scroll_amount_x: i64,
    pub scroll_amount_y: i64,
    pub date_string: String,
    pub data_type: ScrollDataTier,
}

/// Whole-day derived rollup. Absent entirely when the day produced no data.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DailyDeviceSummary {
    pub date_string: String,
    pub total_usage_time_millis: i64,
    pub total_unlock_duration_millis: i64,
    pub unlock_count: u32,
    pub intentional_unlock_count: u32,
    pub glance_count: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub first_unlock_time: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_unlock_time: Option<i64>,
    pub notification_count: u32,
    pub total_app_opens: u32,
}

/// Keys of the sparse daily insight table. Absence of a key means
/// "not applicable for this date", never zero-by-default.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InsightKey {
    GlanceCount,
    MeaningfulUnlockCount,
    FirstUnlockTime,
    LastUnlockTime,
    FirstAppUsed,
    LastAppUsed,
    TopCompulsiveApp,
    TopNotificationDrivenApp,
    BusiestHour,
    NightOwlApp,
}

impl InsightKey {
    pub fn as_str(&self) -> &'static str {
        match self {
            InsightKey::GlanceCount => "glance_count",
            InsightKey::MeaningfulUnlockCount => "meaningful_unlock_count",
            InsightKey::FirstUnlockTime => "first_unlock_time",
            InsightKey::LastUnlockTime => "last_unlock_time",
            InsightKey::FirstAppUsed => "first_app_used",
            InsightKey::LastAppUsed => "last_app_used",
            InsightKey::TopCompulsiveApp => "top_compulsive_app",
            InsightKey::TopNotificationDrivenApp => "top_notification_driven_app",
            InsightKey::BusiestHour => "busiest_hour",
            InsightKey::NightOwlApp => "night_owl_app",
        }
    }
}

/// One derived key/value fact for a date
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DailyInsight {
    pub date_string: String,
    pub insight_key: InsightKey,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub string_value: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub long_value: Option<i64>,
}

impl DailyInsight {
    pub fn with_long(date: &str, key: InsightKey, value: i64) -> Self {
        Self {
            date_string: date.to_string(),
            insight_key: key,
            string_value: None,
            long_value: Some(value),
        }
    }

    pub fn with_string(date: &str, key: InsightKey, value: &str) -> Self {
        Self {
            date_string: date.to_string(),
            insight_key: key,
            string_value: Some(value.to_string()),
            long_value: None,
        }
    }
}

/// Everything the orchestrator needs to reconstruct one date
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DayBatch {
    /// Local calendar day, `YYYY-MM-DD`
    pub date: String,
    pub events: Vec<RawEvent>,
    #[serde(default)]
    pub notifications: Vec<NotificationRecord>,
    /// Packages excluded from all counting (launchers, system UI, ...)
    #[serde(default)]
    pub hidden_packages: HashSet<String>,
    /// Pre-aggregated by a collaborator; never recomputed by the engine
    #[serde(default)]
    pub notification_counts: HashMap<String, u32>,
    /// Seeds foreground continuity for the in-progress day
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub foreground_hint: Option<String>,
    /// Defaults to the end of the local day when absent
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub period_end_millis: Option<i64>,
    /// Device UTC offset; local-time math stays deterministic across hosts
    #[serde(default)]
    pub utc_offset_minutes: i32,
}

/// The immutable result bundle for one date
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DailyProcessingResult {
    pub date_string: String,
    pub usage_records: Vec<DailyAppUsageRecord>,
    pub unlock_sessions: Vec<UnlockSessionRecord>,
    pub scroll_sessions: Vec<ScrollSessionRecord>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub device_summary: Option<DailyDeviceSummary>,
    pub insights: Vec<DailyInsight>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_event_kind_serialization() {
        let kind = EventKind::ActivityResumed;
        let json = serde_json::to_string(&kind).unwrap();
        assert_eq!(json, "\"activity_resumed\"");

        let parsed: EventKind = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed, EventKind::ActivityResumed);
    }

    #[test]
    fn test_session_end_reason_serialization() {
        let reason = SessionEndReason::Ghost;
        let json = serde_json::to_string(&reason).unwrap();
        assert_eq!(json, "\"GHOST\"");
    }

    #[test]
    fn test_scroll_tier_serialization() {
        let tier = ScrollDataTier::Measured;
        let json = serde_json::to_string(&tier).unwrap();
        assert_eq!(json, "\"MEASURED\"");
    }

    #[test]
    fn test_raw_event_deserialization_with_defaults() {
        let json = r#"{
            "package_name": "com.example.app",
            "event_kind": "scroll_inferred",
            "timestamp_millis": 1705327200000,
            "date_string": "2024-01-15",
            "value": 340
        }"#;

        let event: RawEvent = serde_json::from_str(json).unwrap();
        assert_eq!(event.event_kind, EventKind::ScrollInferred);
        assert_eq!(event.value, Some(340));
        assert_eq!(event.scroll_delta_x, None);
        assert!(event.source.is_empty());
    }

    #[test]
    fn test_day_batch_deserialization_minimal() {
        let json = r#"{
            "date": "2024-01-15",
            "events": []
        }"#;

        let batch: DayBatch = serde_json::from_str(json).unwrap();
        assert_eq!(batch.date, "2024-01-15");
        assert!(batch.events.is_empty());
        assert!(batch.notifications.is_empty());
        assert!(batch.hidden_packages.is_empty());
        assert_eq!(batch.utc_offset_minutes, 0);
        assert_eq!(batch.period_end_millis, None);
    }

    #[test]
    fn test_unlock_kind_classes() {
        assert!(EventKind::UserUnlocked.is_unlock_class());
        assert!(EventKind::KeyguardHidden.is_unlock_class());
        assert!(!EventKind::KeyguardShown.is_unlock_class());
        assert!(EventKind::ScrollMeasured.is_scroll());
        assert!(!EventKind::Typing.is_scroll());
    }

    #[test]
    fn test_insight_key_as_str_matches_serde() {
        let key = InsightKey::TopCompulsiveApp;
        let json = serde_json::to_string(&key).unwrap();
        assert_eq!(json, format!("\"{}\"", key.as_str()));
    }
}
