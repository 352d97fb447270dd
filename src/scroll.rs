//! Scroll session merging
//!
//! Filters scroll-amount events, prioritizes measured pixel deltas over
//! inferred estimates per package, and merges the surviving events into
//! contiguous sessions.

use std::collections::HashSet;

use crate::types::{EventKind, RawEvent, ScrollDataTier, ScrollSessionRecord};

/// Maximum gap between events of one scroll session
pub const SCROLL_MERGE_GAP_MS: i64 = 5_000;

#[derive(Debug)]
struct OpenScrollSession {
    package: String,
    tier: ScrollDataTier,
    start_millis: i64,
    last_millis: i64,
    amount: i64,
    amount_x: i64,
    amount_y: i64,
}

impl OpenScrollSession {
    fn into_record(self, date: &str) -> ScrollSessionRecord {
        ScrollSessionRecord {
            package_name: self.package,
            session_start_time: self.start_millis,
            session_end_time: self.last_millis,
            scroll_amount: self.amount,
            scroll_amount_x: self.amount_x,
            scroll_amount_y: self.amount_y,
            date_string: date.to_string(),
            data_type: self.tier,
        }
    }
}

fn tier_of(kind: EventKind) -> Option<ScrollDataTier> {
    match kind {
        EventKind::ScrollMeasured => Some(ScrollDataTier::Measured),
        EventKind::ScrollInferred => Some(ScrollDataTier::Inferred),
        _ => None,
    }
}

/// Merge the day's scroll events into sessions.
///
/// A package with any MEASURED event in the batch contributes no INFERRED
/// sessions this run. An event extends the open session iff it has the same
/// package, the same tier, and follows the session's last event within
/// [`SCROLL_MERGE_GAP_MS`]; extension accumulates the amounts and advances
/// the end time, never the start. Zero-total-delta events are skipped.
pub fn merge_scroll_sessions(
    events: &[RawEvent],
    hidden: &HashSet<String>,
    date: &str,
) -> Vec<ScrollSessionRecord> {
    let mut candidates: Vec<(&RawEvent, ScrollDataTier)> = events
        .iter()
        .filter(|e| !hidden.contains(&e.package_name))
        .filter(|e| {
            e.scroll_delta_x.is_some() || e.scroll_delta_y.is_some() || e.value.is_some()
        })
        .filter_map(|e| tier_of(e.event_kind).map(|tier| (e, tier)))
        .collect();

    let measured_packages: HashSet<&str> = candidates
        .iter()
        .filter(|(_, tier)| *tier == ScrollDataTier::Measured)
        .map(|(e, _)| e.package_name.as_str())
        .collect();

    candidates.retain(|(e, tier)| {
        *tier == ScrollDataTier::Measured || !measured_packages.contains(e.package_name.as_str())
    });

    candidates.sort_by_key(|(e, _)| e.timestamp_millis);

    let mut sessions = Vec::new();
    let mut open: Option<OpenScrollSession> = None;

    for (event, tier) in candidates {
        let delta_x = event.scroll_delta_x.unwrap_or(0);
        let delta_y = event.scroll_delta_y.unwrap_or_else(|| {
            // legacy magnitude-only schema applies to inferred events only
            if tier == ScrollDataTier::Inferred {
                event.value.unwrap_or(0)
            } else {
                0
            }
        });
        let total_delta = delta_x.abs() + delta_y.abs();
        if total_delta == 0 {
            continue;
        }

        match open.as_mut() {
            Some(session)
                if session.package == event.package_name
                    && session.tier == tier
                    && event.timestamp_millis - session.last_millis <= SCROLL_MERGE_GAP_MS =>
            {
                session.amount += total_delta;
                session.amount_x += delta_x.abs();
                session.amount_y += delta_y.abs();
                session.last_millis = event.timestamp_millis;
            }
            _ => {
                if let Some(session) = open.take() {
                    sessions.push(session.into_record(date));
                }
                open = Some(OpenScrollSession {
                    package: event.package_name.clone(),
                    tier,
                    start_millis: event.timestamp_millis,
                    last_millis: event.timestamp_millis,
                    amount: total_delta,
                    amount_x: delta_x.abs(),
                    amount_y: delta_y.abs(),
                });
            }
        }
    }

    if let Some(session) = open {
        sessions.push(session.into_record(date));
    }

    sessions
}
