//! Usage & active-time aggregation
//!
//! Folds the sorted event stream into closed foreground-usage intervals,
//! computes interaction-derived active time inside each interval, and counts
//! debounced app opens. Foreground state is an explicit value threaded
//! through the fold, never shared.

use std::collections::{HashMap, HashSet};

use crate::types::{DailyAppUsageRecord, EventKind, RawEvent, UsageInterval};

/// Active-time window opened by a scroll-class event
pub const SCROLL_WINDOW_MS: i64 = 10_000;

/// Active-time window opened by a typing event
pub const TYPE_WINDOW_MS: i64 = 5_000;

/// Active-time window opened by a tap/focus-class event
pub const TAP_WINDOW_MS: i64 = 3_000;

/// Active-time window opened by a generic interaction event
pub const INTERACTION_WINDOW_MS: i64 = 2_000;

/// An open is always counted once this much time has passed since the last
/// counted open for any package
pub const APP_OPEN_DEBOUNCE_MS: i64 = 30_000;

/// Minimum per-day usage for a package to produce a record on its own
pub const MIN_SIGNIFICANT_SESSION_MS: i64 = 1_000;

/// Per-package usage and active time plus the reserved inferred-event slot
#[derive(Debug, Default)]
pub struct UsageAggregate {
    /// package -> (usage_time_millis, active_time_millis)
    pub per_package: HashMap<String, (i64, i64)>,
    /// Events synthesized during aggregation. Currently always empty; the
    /// slot is part of the contract so open counting can consume them.
    pub inferred_events: Vec<RawEvent>,
}

/// The single open foreground occupancy
#[derive(Debug, Clone)]
struct Occupancy {
    package: String,
    start_millis: i64,
}

/// Fold the sorted events into closed foreground intervals.
///
/// At most one occupancy is open at any point. A resume of a different
/// package closes the open occupancy at the resume's timestamp; a resume of
/// the same package is a no-op. Pause/stop close only their own package.
/// Screen-off closes unconditionally. An occupancy still open at the end of
/// the batch is closed at `period_end_millis` when that lies after its
/// start. Zero-length intervals are dropped.
pub fn collect_usage_intervals(
    events: &[RawEvent],
    day_start_millis: i64,
    period_end_millis: i64,
    foreground_hint: Option<&str>,
) -> Vec<UsageInterval> {
    let mut intervals = Vec::new();
    let mut open: Option<Occupancy> = foreground_hint.map(|package| Occupancy {
        package: package.to_string(),
        start_millis: day_start_millis,
    });

    for event in events {
        match event.event_kind {
            EventKind::ActivityResumed => {
                let same_package = open
                    .as_ref()
                    .is_some_and(|occ| occ.package == event.package_name);
                if same_package {
                    continue;
                }
                if let Some(occ) = open.take() {
                    close_interval(&mut intervals, occ, event.timestamp_millis);
                }
                open = Some(Occupancy {
                    package: event.package_name.clone(),
                    start_millis: event.timestamp_millis,
                });
            }
            EventKind::ActivityPaused | EventKind::ActivityStopped => {
                if open
                    .as_ref()
                    .is_some_and(|occ| occ.package == event.package_name)
                {
                    if let Some(occ) = open.take() {
                        close_interval(&mut intervals, occ, event.timestamp_millis);
                    }
                }
            }
            EventKind::ScreenNonInteractive => {
                if let Some(occ) = open.take() {
                    close_interval(&mut intervals, occ, event.timestamp_millis);
                }
            }
            _ => {}
        }
    }

    if let Some(occ) = open {
        if period_end_millis > occ.start_millis {
            intervals.push(UsageInterval {
                package_name: occ.package,
                start_time: occ.start_millis,
                end_time: period_end_millis,
            });
        }
    }

    intervals
}

fn close_interval(intervals: &mut Vec<UsageInterval>, occ: Occupancy, end_millis: i64) {
    // zero-length and clock-skewed closes are dropped
    if end_millis > occ.start_millis {
        intervals.push(UsageInterval {
            package_name: occ.package,
            start_time: occ.start_millis,
            end_time: end_millis,
        });
    }
}

/// Window length an interaction event contributes to active time
fn interaction_window_ms(kind: EventKind) -> i64 {
    match kind {
        EventKind::ScrollMeasured | EventKind::ScrollInferred => SCROLL_WINDOW_MS,
        EventKind::Typing => TYPE_WINDOW_MS,
        EventKind::ViewClicked | EventKind::ViewFocused => TAP_WINDOW_MS,
        EventKind::GenericInteraction => INTERACTION_WINDOW_MS,
        _ => 0,
    }
}

/// Active time within one interval: same-package interaction events inside
/// the interval expand to windows, overlapping windows merge
/// (`next.start < current.end`), and the merged spans are clipped to the
/// interval bounds. Always <= the interval duration.
pub fn active_time_within(interval: &UsageInterval, events: &[RawEvent]) -> i64 {
    let mut windows: Vec<(i64, i64)> = events
        .iter()
        .filter(|e| e.package_name == interval.package_name)
        .filter(|e| {
            e.timestamp_millis >= interval.start_time && e.timestamp_millis <= interval.end_time
        })
        .filter_map(|e| {
            let len = interaction_window_ms(e.event_kind);
            (len > 0).then_some((e.timestamp_millis, e.timestamp_millis + len))
        })
        .collect();

    if windows.is_empty() {
        return 0;
    }

    windows.sort_by_key(|w| w.0);

    let mut active = 0i64;
    let (mut cur_start, mut cur_end) = windows[0];
    for &(start, end) in &windows[1..] {
        if start < cur_end {
            cur_end = cur_end.max(end);
        } else {
            active += clip(cur_start, cur_end, interval);
            cur_start = start;
            cur_end = end;
        }
    }
    active += clip(cur_start, cur_end, interval);

    active
}

fn clip(start: i64, end: i64, interval: &UsageInterval) -> i64 {
    (end.min(interval.end_time) - start.max(interval.start_time)).max(0)
}

/// Usage and active time per package for the day.
///
/// `events` must already be sorted by timestamp and filtered by the hidden
/// set. The returned `inferred_events` slot is reserved and currently empty.
pub fn aggregate(
    events: &[RawEvent],
    day_start_millis: i64,
    period_end_millis: i64,
    foreground_hint: Option<&str>,
) -> UsageAggregate {
    let intervals =
        collect_usage_intervals(events, day_start_millis, period_end_millis, foreground_hint);

    let mut aggregate = UsageAggregate::default();
    for interval in &intervals {
        let active = active_time_within(interval, events);
        let entry = aggregate
            .per_package
            .entry(interval.package_name.clone())
            .or_insert((0, 0));
        entry.0 += interval.duration_millis();
        entry.1 += active;
    }

    log::debug!(
        "aggregated {} intervals across {} packages",
        intervals.len(),
        aggregate.per_package.len()
    );

    aggregate
}

/// The kind of the most recent event the open-count automaton cares about
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum RelevantKind {
    Unlock,
    HomeReturn,
    Resume,
}

/// Debounce automaton state, threaded explicitly between steps
#[derive(Debug, Default)]
struct OpenCounter {
    last_relevant_kind: Option<RelevantKind>,
    last_open_millis: Option<i64>,
    per_package_last_open: HashMap<String, i64>,
}

/// Count intentional app launches over the unfiltered sorted stream.
///
/// An `ActivityResumed` of a non-hidden package counts as an open when it is
/// the first counted open for that package, when the immediately preceding
/// relevant event was unlock-class or home-return-class (a resume of a
/// hidden package), or when more than [`APP_OPEN_DEBOUNCE_MS`] elapsed since
/// the last counted open for any package. App-switcher churn between
/// non-hidden packages stays uncounted.
pub fn count_app_opens(
    events: &[RawEvent],
    inferred_events: &[RawEvent],
    hidden: &HashSet<String>,
) -> HashMap<String, u32> {
    let mut stream: Vec<&RawEvent> = events.iter().chain(inferred_events.iter()).collect();
    if !inferred_events.is_empty() {
        stream.sort_by_key(|e| e.timestamp_millis);
    }

    let mut counts: HashMap<String, u32> = HashMap::new();
    let mut state = OpenCounter::default();

    for event in stream {
        if event.event_kind.is_unlock_class() {
            state.last_relevant_kind = Some(RelevantKind::Unlock);
            continue;
        }
        if event.event_kind != EventKind::ActivityResumed {
            continue;
        }

        if hidden.contains(&event.package_name) {
            state.last_relevant_kind = Some(RelevantKind::HomeReturn);
            continue;
        }

        let first_open = !state
            .per_package_last_open
            .contains_key(&event.package_name);
        let after_unlock_or_home = matches!(
            state.last_relevant_kind,
            Some(RelevantKind::Unlock) | Some(RelevantKind::HomeReturn)
        );
        let debounce_elapsed = state
            .last_open_millis
            .is_none_or(|last| event.timestamp_millis - last > APP_OPEN_DEBOUNCE_MS);

        if first_open || after_unlock_or_home || debounce_elapsed {
            *counts.entry(event.package_name.clone()).or_insert(0) += 1;
            state.last_open_millis = Some(event.timestamp_millis);
        }

        state
            .per_package_last_open
            .insert(event.package_name.clone(), event.timestamp_millis);
        state.last_relevant_kind = Some(RelevantKind::Resume);
    }

    counts
}

/// Assemble per-package records. A package appears only when its usage meets
/// [`MIN_SIGNIFICANT_SESSION_MS`] or it received at least one notification.
/// Records are sorted by package name so runs are reproducible byte for byte.
pub fn build_usage_records(
    date: &str,
    per_package: &HashMap<String, (i64, i64)>,
    open_counts: &HashMap<String, u32>,
    notification_counts: &HashMap<String, u32>,
) -> Vec<DailyAppUsageRecord> {
    let mut packages: Vec<&String> = per_package
        .keys()
        .chain(open_counts.keys())
        .chain(notification_counts.keys())
        .collect();
    packages.sort();
    packages.dedup();

    packages
        .into_iter()
        .filter_map(|package| {
            let (usage, active) = per_package.get(package).copied().unwrap_or((0, 0));
            let notifications = notification_counts.get(package).copied().unwrap_or(0);

            if usage < MIN_SIGNIFICANT_SESSION_MS && notifications == 0 {
                return None;
            }

            Some(DailyAppUsageRecord {
                package_name: package.clone(),
                date_string: date.to_string(),
                usage_time_millis: usage,
                active_time_millis: active,
                app_open_count: open_counts.get(package).copied().unwrap_or(0),
                notification_count: notifications,
            })
        })
        .collect()
}
