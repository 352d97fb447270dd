//! Unlock session reconstruction
//!
//! A state machine over unlock/lock-class events producing classified
//! unlock sessions. The only state is the open session, encoded as a tagged
//! union so the ghost-recovery transition is a single pattern match.

use std::collections::HashSet;

use crate::types::{
    EventKind, NotificationRecord, RawEvent, SessionEndReason, SessionType, UnlockSessionRecord,
};

/// Sessions shorter than this are glances
pub const MIN_GLANCE_DURATION_MS: i64 = 10_000;

/// Upper bound on the duration of a compulsive unlock
pub const COMPULSIVE_UNLOCK_THRESHOLD_MS: i64 = 30_000;

/// A notification posted within this window before an unlock can be its trigger
pub const NOTIFICATION_UNLOCK_WINDOW_MS: i64 = 30_000;

/// Reconstruction state: either no session is open, or exactly one is
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum SessionState {
    Closed,
    Open { unlock_millis: i64 },
}

/// Reconstruct the day's unlock sessions from the sorted event stream.
///
/// On an unlock-kind event while a session is open, the stale session is a
/// ghost: it is force-closed at the new event's time before the new session
/// opens. A lock-kind or service-stop event closes the open session with a
/// LOCKED or INTERRUPTED reason. Negative-duration closes are clock
/// anomalies and emit nothing. A session still open at end of batch is
/// returned open; callers decide whether to carry it forward.
pub fn reconstruct_unlock_sessions(
    events: &[RawEvent],
    notifications: &[NotificationRecord],
    hidden: &HashSet<String>,
    unlock_kinds: &[EventKind],
    lock_kinds: &[EventKind],
    date: &str,
) -> Vec<UnlockSessionRecord> {
    let resumes: Vec<(i64, &str)> = events
        .iter()
        .filter(|e| e.event_kind == EventKind::ActivityResumed)
        .map(|e| (e.timestamp_millis, e.package_name.as_str()))
        .collect();

    let mut posted: Vec<&NotificationRecord> = notifications.iter().collect();
    posted.sort_by_key(|n| n.post_time_utc);

    let mut sessions = Vec::new();
    let mut state = SessionState::Closed;

    for event in events {
        if unlock_kinds.contains(&event.event_kind) {
            if let SessionState::Open { unlock_millis } = state {
                // missed close: recover by force-terminating the stale session
                sessions.push(ghost_record(unlock_millis, event.timestamp_millis, date));
            }
            state = SessionState::Open {
                unlock_millis: event.timestamp_millis,
            };
            continue;
        }

        let closes_by_lock = lock_kinds.contains(&event.event_kind);
        let closes_by_interrupt = event.event_kind == EventKind::ServiceStopped;
        if !closes_by_lock && !closes_by_interrupt {
            continue;
        }

        if let SessionState::Open { unlock_millis } = state {
            state = SessionState::Closed;
            let reason = if closes_by_lock {
                SessionEndReason::Locked
            } else {
                SessionEndReason::Interrupted
            };
            if let Some(record) = close_session(
                unlock_millis,
                event.timestamp_millis,
                reason,
                &resumes,
                &posted,
                hidden,
                date,
            ) {
                sessions.push(record);
            }
        }
    }

    if let SessionState::Open { unlock_millis } = state {
        sessions.push(open_record(unlock_millis, date));
    }

    sessions
}

fn ghost_record(unlock_millis: i64, close_millis: i64, date: &str) -> UnlockSessionRecord {
    UnlockSessionRecord {
        unlock_timestamp: unlock_millis,
        lock_timestamp: Some(close_millis),
        duration_millis: Some(close_millis - unlock_millis),
        date_string: date.to_string(),
        first_app_package_name: None,
        session_type: Some(SessionType::Glance),
        session_end_reason: Some(SessionEndReason::Ghost),
        is_compulsive: false,
        triggering_notification_package_name: None,
    }
}

fn open_record(unlock_millis: i64, date: &str) -> UnlockSessionRecord {
    UnlockSessionRecord {
        unlock_timestamp: unlock_millis,
        lock_timestamp: None,
        duration_millis: None,
        date_string: date.to_string(),
        first_app_package_name: None,
        session_type: None,
        session_end_reason: None,
        is_compulsive: false,
        triggering_notification_package_name: None,
    }
}

fn close_session(
    unlock_millis: i64,
    close_millis: i64,
    reason: SessionEndReason,
    resumes: &[(i64, &str)],
    posted: &[&NotificationRecord],
    hidden: &HashSet<String>,
    date: &str,
) -> Option<UnlockSessionRecord> {
    let duration = close_millis - unlock_millis;
    if duration < 0 {
        // clock anomaly, drop silently
        return None;
    }

    let session_type = if duration < MIN_GLANCE_DURATION_MS {
        SessionType::Glance
    } else {
        SessionType::Intentional
    };

    let first_app = resumes
        .iter()
        .find(|(ts, package)| {
            *ts > unlock_millis && *ts < close_millis && !hidden.contains(*package)
        })
        .copied();

    let is_compulsive = match first_app {
        Some((first_ts, first_package)) => {
            let switched_away = resumes.iter().any(|(ts, package)| {
                *ts > first_ts
                    && *ts < close_millis
                    && *package != first_package
                    && !hidden.contains(*package)
            });
            !switched_away && duration < COMPULSIVE_UNLOCK_THRESHOLD_MS
        }
        None => false,
    };

    let triggering_notification = first_app.and_then(|(_, first_package)| {
        posted
            .iter()
            .rev()
            .find(|n| {
                n.post_time_utc < unlock_millis
                    && unlock_millis - n.post_time_utc <= NOTIFICATION_UNLOCK_WINDOW_MS
            })
            .filter(|n| n.package_name == first_package)
            .map(|n| n.package_name.clone())
    });

    Some(UnlockSessionRecord {
        unlock_timestamp: unlock_millis,
        lock_timestamp: Some(close_millis),
        duration_millis: Some(duration),
        date_string: date.to_string(),
        first_app_package_name: first_app.map(|(_, package)| package.to_string()),
        session_type: Some(session_type),
        session_end_reason: Some(reason),
        is_compulsive,
        triggering_notification_package_name: triggering_notification,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    const UNLOCK_KINDS: &[EventKind] = &[EventKind::UserUnlocked, EventKind::UserPresent];
    const LOCK_KINDS: &[EventKind] =
        &[EventKind::KeyguardShown, EventKind::ScreenNonInteractive];

    fn event(package: &str, kind: EventKind, ts: i64) -> RawEvent {
        RawEvent {
            package_name: package.to_string(),
            event_kind: kind,
            timestamp_millis: ts,
            date_string: "2024-01-15".to_string(),
            scroll_delta_x: None,
            scroll_delta_y: None,
            value: None,
            source: "test".to_string(),
        }
    }

    fn notification(package: &str, ts: i64) -> NotificationRecord {
        NotificationRecord {
            package_name: package.to_string(),
            post_time_utc: ts,
            category: None,
        }
    }

    fn reconstruct(
        events: &[RawEvent],
        notifications: &[NotificationRecord],
        hidden: &HashSet<String>,
    ) -> Vec<UnlockSessionRecord> {
        reconstruct_unlock_sessions(
            events,
            notifications,
            hidden,
            UNLOCK_KINDS,
            LOCK_KINDS,
            "2024-01-15",
        )
    }

    #[test]
    fn test_basic_unlock_lock_session() {
        let mut hidden = HashSet::new();
        hidden.insert("com.launcher".to_string());

        let events = vec![
            event("", EventKind::UserUnlocked, 0),
            event("com.launcher", EventKind::ActivityResumed, 100),
            event("app.x", EventKind::ActivityResumed, 200),
            event("", EventKind::KeyguardShown, 2_000),
        ];

        let sessions = reconstruct(&events, &[], &hidden);
        assert_eq!(sessions.len(), 1);
        let s = &sessions[0];
        assert_eq!(s.duration_millis, Some(2_000));
        assert_eq!(s.first_app_package_name.as_deref(), Some("app.x"));
        assert_eq!(s.session_end_reason, Some(SessionEndReason::Locked));
        // 2000ms < glance threshold
        assert_eq!(s.session_type, Some(SessionType::Glance));
        assert!(s.is_compulsive);
    }

    #[test]
    fn test_intentional_classification_at_threshold() {
        let events = vec![
            event("", EventKind::UserUnlocked, 0),
            event("", EventKind::KeyguardShown, MIN_GLANCE_DURATION_MS),
        ];

        let sessions = reconstruct(&events, &[], &HashSet::new());
        assert_eq!(sessions[0].session_type, Some(SessionType::Intentional));
    }

    #[test]
    fn test_ghost_session_force_closed() {
        let events = vec![
            event("", EventKind::UserUnlocked, 0),
            event("", EventKind::UserUnlocked, 5_000),
            event("", EventKind::KeyguardShown, 8_000),
        ];

        let sessions = reconstruct(&events, &[], &HashSet::new());
        assert_eq!(sessions.len(), 2);

        let ghost = &sessions[0];
        assert_eq!(ghost.session_end_reason, Some(SessionEndReason::Ghost));
        assert_eq!(ghost.session_type, Some(SessionType::Glance));
        assert_eq!(ghost.lock_timestamp, Some(5_000));
        assert_eq!(ghost.first_app_package_name, None);

        let real = &sessions[1];
        assert_eq!(real.session_end_reason, Some(SessionEndReason::Locked));
        assert_eq!(real.unlock_timestamp, 5_000);
    }

    #[test]
    fn test_service_stop_interrupts_session() {
        let events = vec![
            event("", EventKind::UserUnlocked, 0),
            event("", EventKind::ServiceStopped, 15_000),
        ];

        let sessions = reconstruct(&events, &[], &HashSet::new());
        assert_eq!(sessions.len(), 1);
        assert_eq!(
            sessions[0].session_end_reason,
            Some(SessionEndReason::Interrupted)
        );
        assert_eq!(sessions[0].session_type, Some(SessionType::Intentional));
    }

    #[test]
    fn test_negative_duration_dropped_silently() {
        // Lock timestamped before the unlock it would close; sorting is the
        // caller's job, so feed the machine an unsorted stream directly.
        let events = vec![
            event("", EventKind::UserUnlocked, 10_000),
            event("", EventKind::KeyguardShown, 4_000),
        ];

        let sessions = reconstruct(&events, &[], &HashSet::new());
        assert!(sessions.is_empty());
    }

    #[test]
    fn test_unclosed_session_returned_open() {
        let events = vec![event("", EventKind::UserUnlocked, 1_000)];

        let sessions = reconstruct(&events, &[], &HashSet::new());
        assert_eq!(sessions.len(), 1);
        assert_eq!(sessions[0].lock_timestamp, None);
        assert_eq!(sessions[0].duration_millis, None);
        assert_eq!(sessions[0].session_type, None);
        assert_eq!(sessions[0].session_end_reason, None);
    }

    #[test]
    fn test_compulsive_requires_no_switch() {
        let events = vec![
            event("", EventKind::UserUnlocked, 0),
            event("app.x", EventKind::ActivityResumed, 200),
            event("app.y", EventKind::ActivityResumed, 1_000),
            event("", EventKind::KeyguardShown, 2_000),
        ];

        let sessions = reconstruct(&events, &[], &HashSet::new());
        assert_eq!(
            sessions[0].first_app_package_name.as_deref(),
            Some("app.x")
        );
        assert!(!sessions[0].is_compulsive);
    }

    #[test]
    fn test_compulsive_requires_short_duration() {
        let events = vec![
            event("", EventKind::UserUnlocked, 0),
            event("app.x", EventKind::ActivityResumed, 200),
            event("", EventKind::KeyguardShown, COMPULSIVE_UNLOCK_THRESHOLD_MS + 1),
        ];

        let sessions = reconstruct(&events, &[], &HashSet::new());
        assert!(!sessions[0].is_compulsive);
    }

    #[test]
    fn test_notification_trigger_attribution() {
        let events = vec![
            event("", EventKind::UserUnlocked, 60_000),
            event("app.x", EventKind::ActivityResumed, 60_200),
            event("", EventKind::KeyguardShown, 65_000),
        ];
        let notifications = vec![notification("app.x", 50_000)];

        let sessions = reconstruct(&events, &notifications, &HashSet::new());
        assert_eq!(
            sessions[0].triggering_notification_package_name.as_deref(),
            Some("app.x")
        );
    }

    #[test]
    fn test_notification_outside_window_not_attributed() {
        let events = vec![
            event("", EventKind::UserUnlocked, 60_000),
            event("app.x", EventKind::ActivityResumed, 60_200),
            event("", EventKind::KeyguardShown, 65_000),
        ];
        let notifications =
            vec![notification("app.x", 60_000 - NOTIFICATION_UNLOCK_WINDOW_MS - 1)];

        let sessions = reconstruct(&events, &notifications, &HashSet::new());
        assert_eq!(sessions[0].triggering_notification_package_name, None);
    }

    #[test]
    fn test_notification_for_other_package_not_attributed() {
        // Most recent in-window notification belongs to a different package
        let events = vec![
            event("", EventKind::UserUnlocked, 60_000),
            event("app.x", EventKind::ActivityResumed, 60_200),
            event("", EventKind::KeyguardShown, 65_000),
        ];
        let notifications = vec![
            notification("app.x", 40_000),
            notification("app.other", 55_000),
        ];

        let sessions = reconstruct(&events, &notifications, &HashSet::new());
        assert_eq!(sessions[0].triggering_notification_package_name, None);
    }

    #[test]
    fn test_no_emitted_session_has_negative_duration() {
        let events = vec![
            event("", EventKind::UserUnlocked, 0),
            event("", EventKind::KeyguardShown, 3_000),
            event("", EventKind::UserUnlocked, 3_500),
            event("", EventKind::UserUnlocked, 9_000),
            event("", EventKind::ServiceStopped, 12_000),
        ];

        let sessions = reconstruct(&events, &[], &HashSet::new());
        for s in &sessions {
            if let Some(d) = s.duration_millis {
                assert!(d >= 0);
            }
        }
    }
}
