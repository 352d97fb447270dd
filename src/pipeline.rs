//! Daily pipeline orchestration
//!
//! Composes the aggregator, the unlock reconstructor, the scroll merger,
//! and insight derivation for one date, producing one immutable
//! `DailyProcessingResult`. Owns no state beyond wiring; re-running on the
//! same input yields byte-identical output.

use std::collections::HashSet;

use chrono::{FixedOffset, NaiveDate, TimeZone};

use crate::error::EngineError;
use crate::insights::derive_insights;
use crate::scroll::merge_scroll_sessions;
use crate::types::{
    DailyDeviceSummary, DailyProcessingResult, DayBatch, EventKind, RawEvent, SessionType,
};
use crate::unlock::reconstruct_unlock_sessions;
use crate::usage::{aggregate, build_usage_records, count_app_opens};

/// Event kinds that open an unlock session
pub const UNLOCK_KINDS: &[EventKind] = &[EventKind::UserUnlocked, EventKind::UserPresent];

/// Event kinds that close an unlock session with a LOCKED reason
pub const LOCK_KINDS: &[EventKind] =
    &[EventKind::KeyguardShown, EventKind::ScreenNonInteractive];

const DAY_MILLIS: i64 = 86_400_000;

/// Reconstruct one calendar day.
///
/// The whole computation is a pure, synchronous, single-threaded pass over
/// the batch; independent dates can be processed in parallel by giving each
/// worker its own batch. Returns a complete bundle or an error, never a
/// partial result.
pub fn process_day(batch: &DayBatch) -> Result<DailyProcessingResult, EngineError> {
    let offset = FixedOffset::east_opt(batch.utc_offset_minutes * 60)
        .ok_or(EngineError::InvalidOffset(batch.utc_offset_minutes))?;
    let date = NaiveDate::parse_from_str(&batch.date, "%Y-%m-%d")
        .map_err(|e| EngineError::InvalidDate(format!("{}: {}", batch.date, e)))?;

    // A batch carrying another date's events would silently corrupt the
    // supersession-per-date contract; fail the whole run instead.
    if let Some(stray) = batch.events.iter().find(|e| e.date_string != batch.date) {
        return Err(EngineError::InconsistentBatch(format!(
            "event for {} in batch for {}",
            stray.date_string, batch.date
        )));
    }

    let midnight = date
        .and_hms_opt(0, 0, 0)
        .ok_or_else(|| EngineError::InvalidDate(batch.date.clone()))?;
    let day_start = offset
        .from_local_datetime(&midnight)
        .single()
        .ok_or_else(|| EngineError::InvalidDate(batch.date.clone()))?
        .timestamp_millis();
    let period_end = batch.period_end_millis.unwrap_or(day_start + DAY_MILLIS);

    let mut sorted = batch.events.clone();
    sorted.sort_by_key(|e| e.timestamp_millis);

    // 4.2 sees only the kinds unlock reconstruction cares about
    let unlock_relevant: Vec<RawEvent> = sorted
        .iter()
        .filter(|e| is_unlock_relevant(e.event_kind))
        .cloned()
        .collect();
    let unlock_sessions = reconstruct_unlock_sessions(
        &unlock_relevant,
        &batch.notifications,
        &batch.hidden_packages,
        UNLOCK_KINDS,
        LOCK_KINDS,
        &batch.date,
    );

    // 4.1 and 4.3 run over the hidden-filtered stream
    let visible: Vec<RawEvent> = sorted
        .iter()
        .filter(|e| !batch.hidden_packages.contains(&e.package_name))
        .cloned()
        .collect();
    let hint = batch
        .foreground_hint
        .as_deref()
        .filter(|p| !batch.hidden_packages.contains(*p));

    let usage = aggregate(&visible, day_start, period_end, hint);
    // the open counter reads the unfiltered stream: hidden resumes are its
    // home-return signal even though they are never counted
    let open_counts = count_app_opens(&sorted, &usage.inferred_events, &batch.hidden_packages);
    let usage_records = build_usage_records(
        &batch.date,
        &usage.per_package,
        &open_counts,
        &batch.notification_counts,
    );

    let scroll_sessions = merge_scroll_sessions(&sorted, &batch.hidden_packages, &batch.date);

    let insights = derive_insights(
        &batch.date,
        &unlock_sessions,
        &sorted,
        &batch.hidden_packages,
        offset,
    );

    let notification_total: u32 = batch.notification_counts.values().sum();
    let device_summary = if usage_records.is_empty()
        && unlock_sessions.is_empty()
        && notification_total == 0
    {
        // nothing happened: explicit no-data result, not a zero-filled one
        None
    } else {
        Some(build_device_summary(
            &batch.date,
            &usage_records,
            &unlock_sessions,
            notification_total,
        ))
    };

    log::debug!(
        "processed {}: {} usage records, {} unlock sessions, {} scroll sessions, {} insights",
        batch.date,
        usage_records.len(),
        unlock_sessions.len(),
        scroll_sessions.len(),
        insights.len()
    );

    Ok(DailyProcessingResult {
        date_string: batch.date.clone(),
        usage_records,
        unlock_sessions,
        scroll_sessions,
        device_summary,
        insights,
    })
}

/// Derived sums over the component outputs; never computed independently
fn build_device_summary(
    date: &str,
    usage_records: &[crate::types::DailyAppUsageRecord],
    unlock_sessions: &[crate::types::UnlockSessionRecord],
    notification_count: u32,
) -> DailyDeviceSummary {
    DailyDeviceSummary {
        date_string: date.to_string(),
        total_usage_time_millis: usage_records.iter().map(|r| r.usage_time_millis).sum(),
        total_unlock_duration_millis: unlock_sessions
            .iter()
            .filter_map(|s| s.duration_millis)
            .sum(),
        unlock_count: unlock_sessions.len() as u32,
        intentional_unlock_count: unlock_sessions
            .iter()
            .filter(|s| s.session_type == Some(SessionType::Intentional))
            .count() as u32,
        glance_count: unlock_sessions
            .iter()
            .filter(|s| s.session_type == Some(SessionType::Glance))
            .count() as u32,
        first_unlock_time: unlock_sessions.iter().map(|s| s.unlock_timestamp).min(),
        last_unlock_time: unlock_sessions.iter().map(|s| s.unlock_timestamp).max(),
        notification_count,
        total_app_opens: usage_records.iter().map(|r| r.app_open_count).sum(),
    }
}

/// One-shot JSON boundary: parse a `DayBatch`, process it, and serialize
/// the result bundle. Used by the FFI and CLI surfaces.
pub fn process_day_json(batch_json: &str) -> Result<String, EngineError> {
    let batch: DayBatch = serde_json::from_str(batch_json)
        .map_err(|e| EngineError::ParseError(format!("Failed to parse day batch: {}", e)))?;
    let result = process_day(&batch)?;
    serde_json::to_string(&result).map_err(|e| EngineError::EncodingError(e.to_string()))
}

/// Kinds the orchestrator forwards to unlock reconstruction
pub fn is_unlock_relevant(kind: EventKind) -> bool {
    UNLOCK_KINDS.contains(&kind)
        || LOCK_KINDS.contains(&kind)
        || kind == EventKind::ServiceStopped
        || kind == EventKind::ActivityResumed
}
