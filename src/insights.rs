//! Daily insight derivation
//!
//! A stateless pass over the reconstructed unlock sessions and the raw
//! stream producing a sparse key/value fact table. Every tie-break is
//! deterministic so re-runs reproduce the same output.

use std::collections::HashMap;
use std::collections::HashSet;

use chrono::{FixedOffset, TimeZone, Timelike};

use crate::types::{
    DailyInsight, EventKind, InsightKey, RawEvent, SessionEndReason, SessionType,
    UnlockSessionRecord,
};

/// A resume within this window after local midnight marks a night owl
pub const NIGHT_OWL_WINDOW_MS: i64 = 10_800_000;

/// Derive the day's insights. Returns an empty set when both inputs are
/// empty; keys are emitted only when applicable for the date.
pub fn derive_insights(
    date: &str,
    unlock_sessions: &[UnlockSessionRecord],
    events: &[RawEvent],
    hidden: &HashSet<String>,
    offset: FixedOffset,
) -> Vec<DailyInsight> {
    if unlock_sessions.is_empty() && events.is_empty() {
        return Vec::new();
    }

    let mut insights = Vec::new();

    let glance_count = unlock_sessions
        .iter()
        .filter(|s| s.session_type == Some(SessionType::Glance))
        .count() as i64;
    if glance_count > 0 {
        insights.push(DailyInsight::with_long(
            date,
            InsightKey::GlanceCount,
            glance_count,
        ));
    }

    // intentional, interrupted, or untyped sessions all count as meaningful
    let meaningful_count = unlock_sessions
        .iter()
        .filter(|s| {
            s.session_type == Some(SessionType::Intentional)
                || s.session_end_reason == Some(SessionEndReason::Interrupted)
                || s.session_type.is_none()
        })
        .count() as i64;
    if meaningful_count > 0 {
        insights.push(DailyInsight::with_long(
            date,
            InsightKey::MeaningfulUnlockCount,
            meaningful_count,
        ));
    }

    let first_unlock = unlock_sessions.iter().map(|s| s.unlock_timestamp).min();
    let last_unlock = unlock_sessions.iter().map(|s| s.unlock_timestamp).max();
    if let Some(first) = first_unlock {
        insights.push(DailyInsight::with_long(
            date,
            InsightKey::FirstUnlockTime,
            first,
        ));
    }
    if let Some(last) = last_unlock {
        insights.push(DailyInsight::with_long(
            date,
            InsightKey::LastUnlockTime,
            last,
        ));
    }

    let visible_resumes: Vec<&RawEvent> = events
        .iter()
        .filter(|e| e.event_kind == EventKind::ActivityResumed)
        .filter(|e| !hidden.contains(&e.package_name))
        .collect();

    if let Some(first) = first_unlock {
        if let Some(resume) = visible_resumes
            .iter()
            .find(|e| e.timestamp_millis > first)
        {
            insights.push(DailyInsight::with_string(
                date,
                InsightKey::FirstAppUsed,
                &resume.package_name,
            ));
        }
    }

    if let Some(resume) = visible_resumes.last() {
        insights.push(DailyInsight::with_string(
            date,
            InsightKey::LastAppUsed,
            &resume.package_name,
        ));
    }

    let compulsive_apps = unlock_sessions
        .iter()
        .filter(|s| s.is_compulsive)
        .filter_map(|s| s.first_app_package_name.as_deref());
    if let Some(top) = most_frequent(compulsive_apps) {
        insights.push(DailyInsight::with_string(
            date,
            InsightKey::TopCompulsiveApp,
            top,
        ));
    }

    let notification_apps = unlock_sessions
        .iter()
        .filter_map(|s| s.triggering_notification_package_name.as_deref());
    if let Some(top) = most_frequent(notification_apps) {
        insights.push(DailyInsight::with_string(
            date,
            InsightKey::TopNotificationDrivenApp,
            top,
        ));
    }

    if let Some(hour) = busiest_hour(unlock_sessions, offset) {
        insights.push(DailyInsight::with_long(date, InsightKey::BusiestHour, hour));
    }

    if let Some(package) = night_owl_app(&visible_resumes, offset) {
        insights.push(DailyInsight::with_string(
            date,
            InsightKey::NightOwlApp,
            package,
        ));
    }

    insights
}

/// Most frequent value; ties resolve to the earliest first occurrence
fn most_frequent<'a>(values: impl Iterator<Item = &'a str>) -> Option<&'a str> {
    let mut counts: HashMap<&str, (usize, usize)> = HashMap::new();
    for (index, value) in values.enumerate() {
        let entry = counts.entry(value).or_insert((0, index));
        entry.0 += 1;
    }

    counts
        .into_iter()
        .max_by(|a, b| a.1 .0.cmp(&b.1 .0).then(b.1 .1.cmp(&a.1 .1)))
        .map(|(value, _)| value)
}

/// Modal local hour of day among unlock timestamps; lowest hour wins ties
fn busiest_hour(sessions: &[UnlockSessionRecord], offset: FixedOffset) -> Option<i64> {
    let mut per_hour = [0u32; 24];
    for session in sessions {
        if let Some(dt) = offset.timestamp_millis_opt(session.unlock_timestamp).single() {
            per_hour[dt.hour() as usize] += 1;
        }
    }

    let best = per_hour.iter().copied().max().filter(|&count| count > 0)?;
    per_hour
        .iter()
        .position(|&count| count == best)
        .map(|hour| hour as i64)
}

/// Last app resumed within [`NIGHT_OWL_WINDOW_MS`] after local midnight
fn night_owl_app<'a>(resumes: &[&'a RawEvent], offset: FixedOffset) -> Option<&'a str> {
    resumes
        .iter()
        .rev()
        .find(|e| {
            offset
                .timestamp_millis_opt(e.timestamp_millis)
                .single()
                .map(|dt| (dt.num_seconds_from_midnight() as i64) * 1_000 < NIGHT_OWL_WINDOW_MS)
                .unwrap_or(false)
        })
        .map(|e| e.package_name.as_str())
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn utc() -> FixedOffset {
        FixedOffset::east_opt(0).unwrap()
    }

    fn closed_session(unlock: i64, duration: i64, session_type: SessionType) -> UnlockSessionRecord {
        UnlockSessionRecord {
            unlock_timestamp: unlock,
            lock_timestamp: Some(unlock + duration),
            duration_millis: Some(duration),
            date_string: "2024-01-15".to_string(),
            first_app_package_name: None,
            session_type: Some(session_type),
            session_end_reason: Some(SessionEndReason::Locked),
            is_compulsive: false,
            triggering_notification_package_name: None,
        }
    }

    fn resume(package: &str, ts: i64) -> RawEvent {
        RawEvent {
            package_name: package.to_string(),
            event_kind: EventKind::ActivityResumed,
            timestamp_millis: ts,
            date_string: "2024-01-15".to_string(),
            scroll_delta_x: None,
            scroll_delta_y: None,
            value: None,
            source: "test".to_string(),
        }
    }

    fn find<'a>(insights: &'a [DailyInsight], key: InsightKey) -> Option<&'a DailyInsight> {
        insights.iter().find(|i| i.insight_key == key)
    }

    #[test]
    fn test_empty_inputs_yield_no_insights() {
        let insights = derive_insights("2024-01-15", &[], &[], &HashSet::new(), utc());
        assert!(insights.is_empty());
    }

    #[test]
    fn test_glance_and_meaningful_counts() {
        let sessions = vec![
            closed_session(1_000, 2_000, SessionType::Glance),
            closed_session(10_000, 60_000, SessionType::Intentional),
            closed_session(100_000, 3_000, SessionType::Glance),
        ];

        let insights = derive_insights("2024-01-15", &sessions, &[], &HashSet::new(), utc());
        assert_eq!(
            find(&insights, InsightKey::GlanceCount).unwrap().long_value,
            Some(2)
        );
        assert_eq!(
            find(&insights, InsightKey::MeaningfulUnlockCount)
                .unwrap()
                .long_value,
            Some(1)
        );
    }

    #[test]
    fn test_untyped_open_session_is_meaningful() {
        let open = UnlockSessionRecord {
            unlock_timestamp: 5_000,
            lock_timestamp: None,
            duration_millis: None,
            date_string: "2024-01-15".to_string(),
            first_app_package_name: None,
            session_type: None,
            session_end_reason: None,
            is_compulsive: false,
            triggering_notification_package_name: None,
        };

        let insights = derive_insights("2024-01-15", &[open], &[], &HashSet::new(), utc());
        assert_eq!(
            find(&insights, InsightKey::MeaningfulUnlockCount)
                .unwrap()
                .long_value,
            Some(1)
        );
    }

    #[test]
    fn test_first_and_last_unlock_timestamps() {
        let sessions = vec![
            closed_session(50_000, 1_000, SessionType::Glance),
            closed_session(10_000, 1_000, SessionType::Glance),
        ];

        let insights = derive_insights("2024-01-15", &sessions, &[], &HashSet::new(), utc());
        assert_eq!(
            find(&insights, InsightKey::FirstUnlockTime).unwrap().long_value,
            Some(10_000)
        );
        assert_eq!(
            find(&insights, InsightKey::LastUnlockTime).unwrap().long_value,
            Some(50_000)
        );
    }

    #[test]
    fn test_first_app_excludes_hidden_and_pre_unlock() {
        let mut hidden = HashSet::new();
        hidden.insert("com.launcher".to_string());

        let sessions = vec![closed_session(10_000, 5_000, SessionType::Glance)];
        let events = vec![
            resume("app.early", 5_000),
            resume("com.launcher", 10_100),
            resume("app.x", 10_500),
        ];

        let insights = derive_insights("2024-01-15", &sessions, &events, &hidden, utc());
        assert_eq!(
            find(&insights, InsightKey::FirstAppUsed)
                .unwrap()
                .string_value
                .as_deref(),
            Some("app.x")
        );
        assert_eq!(
            find(&insights, InsightKey::LastAppUsed)
                .unwrap()
                .string_value
                .as_deref(),
            Some("app.x")
        );
    }

    #[test]
    fn test_top_compulsive_app_stable_tie_break() {
        let mut a = closed_session(1_000, 2_000, SessionType::Glance);
        a.is_compulsive = true;
        a.first_app_package_name = Some("app.a".to_string());
        let mut b = closed_session(5_000, 2_000, SessionType::Glance);
        b.is_compulsive = true;
        b.first_app_package_name = Some("app.b".to_string());

        // one occurrence each: first occurrence wins
        let insights =
            derive_insights("2024-01-15", &[a, b], &[], &HashSet::new(), utc());
        assert_eq!(
            find(&insights, InsightKey::TopCompulsiveApp)
                .unwrap()
                .string_value
                .as_deref(),
            Some("app.a")
        );
    }

    #[test]
    fn test_busiest_hour_modal_local_hour() {
        // 2024-01-15 02:xx UTC twice, 07:xx once
        let sessions = vec![
            closed_session(1_705_284_000_000, 1_000, SessionType::Glance), // 02:00
            closed_session(1_705_285_800_000, 1_000, SessionType::Glance), // 02:30
            closed_session(1_705_302_000_000, 1_000, SessionType::Glance), // 07:00
        ];

        let insights = derive_insights("2024-01-15", &sessions, &[], &HashSet::new(), utc());
        assert_eq!(
            find(&insights, InsightKey::BusiestHour).unwrap().long_value,
            Some(2)
        );
    }

    #[test]
    fn test_busiest_hour_respects_offset() {
        // 02:00 UTC is 03:00 at +01:00
        let sessions = vec![closed_session(1_705_284_000_000, 1_000, SessionType::Glance)];
        let offset = FixedOffset::east_opt(3_600).unwrap();

        let insights = derive_insights("2024-01-15", &sessions, &[], &HashSet::new(), offset);
        assert_eq!(
            find(&insights, InsightKey::BusiestHour).unwrap().long_value,
            Some(3)
        );
    }

    #[test]
    fn test_night_owl_within_window_after_midnight() {
        // 2024-01-15 00:40 UTC and 12:00 UTC
        let sessions = vec![closed_session(1_705_279_200_000, 1_000, SessionType::Glance)];
        let events = vec![
            resume("app.late", 1_705_279_200_000), // 00:40
            resume("app.noon", 1_705_320_000_000), // 12:00
        ];

        let insights = derive_insights("2024-01-15", &sessions, &events, &HashSet::new(), utc());
        assert_eq!(
            find(&insights, InsightKey::NightOwlApp)
                .unwrap()
                .string_value
                .as_deref(),
            Some("app.late")
        );
    }

    #[test]
    fn test_no_night_owl_without_early_resume() {
        let sessions = vec![closed_session(1_705_320_000_000, 1_000, SessionType::Glance)];
        let events = vec![resume("app.noon", 1_705_320_000_000)];

        let insights = derive_insights("2024-01-15", &sessions, &events, &HashSet::new(), utc());
        assert!(find(&insights, InsightKey::NightOwlApp).is_none());
    }

    #[test]
    fn test_most_frequent_prefers_count_over_order() {
        let values = vec!["a", "b", "b", "c"];
        assert_eq!(most_frequent(values.into_iter()), Some("b"));
    }
}
