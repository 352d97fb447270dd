//! Input boundary for raw events
//!
//! Parses NDJSON or JSON-array event streams, validates individual events,
//! and groups a mixed stream into per-date batches. The event schema is the
//! contract boundary with collaborators and must remain stable across
//! engine versions.

use std::collections::BTreeMap;

use chrono::NaiveDate;

use crate::error::EngineError;
use crate::types::RawEvent;

/// One failed validation check
#[derive(Debug, Clone, serde::Serialize)]
pub struct EventValidation {
    pub index: usize,
    pub error: String,
}

/// Static adapter for the raw-event input schema
pub struct RawEventAdapter;

impl RawEventAdapter {
    /// Parse newline-delimited JSON, one event per line. Blank lines are
    /// skipped.
    pub fn parse_ndjson(data: &str) -> Result<Vec<RawEvent>, EngineError> {
        let mut events = Vec::new();
        for (line_no, line) in data.lines().enumerate() {
            let trimmed = line.trim();
            if trimmed.is_empty() {
                continue;
            }
            let event: RawEvent = serde_json::from_str(trimmed).map_err(|e| {
                EngineError::ParseError(format!("line {}: {}", line_no + 1, e))
            })?;
            events.push(event);
        }
        Ok(events)
    }

    /// Parse a JSON array of events
    pub fn parse_array(data: &str) -> Result<Vec<RawEvent>, EngineError> {
        serde_json::from_str(data)
            .map_err(|e| EngineError::ParseError(format!("Failed to parse event array: {}", e)))
    }

    /// Validate events, returning one entry per failed check
    pub fn validate_events(events: &[RawEvent]) -> Vec<EventValidation> {
        let mut failures = Vec::new();

        for (index, event) in events.iter().enumerate() {
            if event.timestamp_millis < 0 {
                failures.push(EventValidation {
                    index,
                    error: format!("negative timestamp {}", event.timestamp_millis),
                });
            }
            if NaiveDate::parse_from_str(&event.date_string, "%Y-%m-%d").is_err() {
                failures.push(EventValidation {
                    index,
                    error: format!("date_string {:?} is not YYYY-MM-DD", event.date_string),
                });
            }
            if event.event_kind.requires_package() && event.package_name.is_empty() {
                failures.push(EventValidation {
                    index,
                    error: format!("{} event without package_name", event.event_kind.as_str()),
                });
            }
            if event.event_kind.is_scroll()
                && event.scroll_delta_x.is_none()
                && event.scroll_delta_y.is_none()
                && event.value.is_none()
            {
                failures.push(EventValidation {
                    index,
                    error: "scroll event without delta or legacy value".to_string(),
                });
            }
        }

        failures
    }

    /// Group a mixed stream into per-date batches, stably ordered by date
    pub fn group_by_date(events: Vec<RawEvent>) -> BTreeMap<String, Vec<RawEvent>> {
        let mut by_date: BTreeMap<String, Vec<RawEvent>> = BTreeMap::new();
        for event in events {
            by_date.entry(event.date_string.clone()).or_default().push(event);
        }
        by_date
    }
}
