//! Dayscope CLI - Command-line interface for the daily reconstruction engine
//!
//! Commands:
//! - process: Reconstruct per-date results from a raw event stream (batch mode)
//! - validate: Validate raw event schema
//! - doctor: Diagnose engine health and configuration
//! - schema: Print schema information

use clap::{Parser, Subcommand, ValueEnum};
use std::collections::{HashMap, HashSet};
use std::fs;
use std::io::{self, Read};
use std::path::PathBuf;
use std::process::ExitCode;

use chrono::{FixedOffset, TimeZone};

use dayscope::adapter::RawEventAdapter;
use dayscope::pipeline::process_day;
use dayscope::types::{DailyProcessingResult, DayBatch, NotificationRecord, RawEvent};
use dayscope::{ENGINE_VERSION, PRODUCER_NAME};

/// Dayscope - On-device reconstruction engine for daily device-usage analytics
#[derive(Parser)]
#[command(name = "dayscope")]
#[command(version = ENGINE_VERSION)]
#[command(about = "Reconstruct daily usage statistics from raw device events", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Reconstruct per-date results from a raw event stream (batch mode)
    Process {
        /// Input file path (use - for stdin)
        #[arg(short, long)]
        input: PathBuf,

        /// Output file path (use - for stdout)
        #[arg(short, long)]
        output: PathBuf,

        /// Input format
        #[arg(long, default_value = "ndjson")]
        input_format: InputFormat,

        /// Output format
        #[arg(long, default_value = "ndjson")]
        output_format: OutputFormat,

        /// Process only this date (YYYY-MM-DD); default is every date present
        #[arg(long)]
        date: Option<String>,

        /// Notifications file (JSON array of notification records)
        #[arg(long)]
        notifications: Option<PathBuf>,

        /// Package to exclude from all counting; repeatable
        #[arg(long = "hidden")]
        hidden: Vec<String>,

        /// Device UTC offset in minutes
        #[arg(long, default_value = "0")]
        utc_offset_minutes: i32,

        /// Package currently foregrounded at the start of the day
        #[arg(long)]
        foreground_hint: Option<String>,

        /// End of the processed window in UTC epoch millis (in-progress days)
        #[arg(long)]
        period_end_millis: Option<i64>,
    },

    /// Validate raw event schema
    Validate {
        /// Input file path (use - for stdin)
        #[arg(short, long)]
        input: PathBuf,

        /// Input format
        #[arg(long, default_value = "ndjson")]
        input_format: InputFormat,

        /// Output validation report as JSON
        #[arg(long)]
        json: bool,
    },

    /// Diagnose engine health and configuration
    Doctor {
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },

    /// Print schema information
    Schema {
        /// Schema to print (input or output)
        #[arg(value_enum)]
        schema_type: SchemaType,
    },
}

#[derive(Clone, ValueEnum)]
enum InputFormat {
    /// Newline-delimited JSON (one event per line)
    Ndjson,
    /// JSON array of events
    Json,
}

#[derive(Clone, ValueEnum)]
enum OutputFormat {
    /// Newline-delimited JSON (one result bundle per line)
    Ndjson,
    /// JSON array of result bundles
    Json,
    /// Pretty-printed JSON
    JsonPretty,
}

#[derive(Clone, ValueEnum)]
enum SchemaType {
    /// Input schema (raw events)
    Input,
    /// Output schema (daily result bundle)
    Output,
}

fn main() -> ExitCode {
    env_logger::init();
    let cli = Cli::parse();

    match run(cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!(
                "{}",
                serde_json::to_string(&CliError::from(e))
                    .unwrap_or_else(|_| "Unknown error".to_string())
            );
            ExitCode::FAILURE
        }
    }
}

fn run(cli: Cli) -> Result<(), DayscopeCliError> {
    match cli.command {
        Commands::Process {
            input,
            output,
            input_format,
            output_format,
            date,
            notifications,
            hidden,
            utc_offset_minutes,
            foreground_hint,
            period_end_millis,
        } => cmd_process(
            &input,
            &output,
            input_format,
            output_format,
            date.as_deref(),
            notifications.as_deref(),
            hidden,
            utc_offset_minutes,
            foreground_hint,
            period_end_millis,
        ),

        Commands::Validate {
            input,
            input_format,
            json,
        } => cmd_validate(&input, input_format, json),

        Commands::Doctor { json } => cmd_doctor(json),

        Commands::Schema { schema_type } => cmd_schema(schema_type),
    }
}

#[allow(clippy::too_many_arguments)]
fn cmd_process(
    input: &PathBuf,
    output: &PathBuf,
    input_format: InputFormat,
    output_format: OutputFormat,
    date: Option<&str>,
    notifications: Option<&std::path::Path>,
    hidden: Vec<String>,
    utc_offset_minutes: i32,
    foreground_hint: Option<String>,
    period_end_millis: Option<i64>,
) -> Result<(), DayscopeCliError> {
    let input_data = read_input(input)?;

    let events = match input_format {
        InputFormat::Ndjson => RawEventAdapter::parse_ndjson(&input_data)?,
        InputFormat::Json => RawEventAdapter::parse_array(&input_data)?,
    };

    if events.is_empty() && date.is_none() {
        return Err(DayscopeCliError::NoEvents);
    }

    let all_notifications: Vec<NotificationRecord> = match notifications {
        Some(path) => serde_json::from_str(&fs::read_to_string(path)?)?,
        None => Vec::new(),
    };

    let offset = FixedOffset::east_opt(utc_offset_minutes * 60)
        .ok_or(DayscopeCliError::InvalidOffset(utc_offset_minutes))?;
    let hidden_packages: HashSet<String> = hidden.into_iter().collect();

    let mut by_date = RawEventAdapter::group_by_date(events);
    if let Some(only) = date {
        let retained = by_date.remove(only).unwrap_or_default();
        by_date = std::collections::BTreeMap::new();
        by_date.insert(only.to_string(), retained);
    }

    let mut results: Vec<DailyProcessingResult> = Vec::new();
    for (batch_date, batch_events) in by_date {
        let batch = build_batch(
            batch_date,
            batch_events,
            &all_notifications,
            &hidden_packages,
            offset,
            utc_offset_minutes,
            foreground_hint.clone(),
            period_end_millis,
        );
        results.push(process_day(&batch)?);
    }

    let output_data = format_output(&results, &output_format)?;
    write_output(output, &output_data)?;

    Ok(())
}

/// Assemble one day's batch, playing the persistence collaborator's role:
/// notifications are assigned to the local day they were posted on and the
/// per-package counts are pre-aggregated here, outside the engine.
#[allow(clippy::too_many_arguments)]
fn build_batch(
    date: String,
    events: Vec<RawEvent>,
    all_notifications: &[NotificationRecord],
    hidden_packages: &HashSet<String>,
    offset: FixedOffset,
    utc_offset_minutes: i32,
    foreground_hint: Option<String>,
    period_end_millis: Option<i64>,
) -> DayBatch {
    let notifications: Vec<NotificationRecord> = all_notifications
        .iter()
        .filter(|n| {
            offset
                .timestamp_millis_opt(n.post_time_utc)
                .single()
                .map(|dt| dt.format("%Y-%m-%d").to_string() == date)
                .unwrap_or(false)
        })
        .cloned()
        .collect();

    let mut notification_counts: HashMap<String, u32> = HashMap::new();
    for notification in &notifications {
        *notification_counts
            .entry(notification.package_name.clone())
            .or_insert(0) += 1;
    }

    DayBatch {
        date,
        events,
        notifications,
        hidden_packages: hidden_packages.clone(),
        notification_counts,
        foreground_hint,
        period_end_millis,
        utc_offset_minutes,
    }
}

fn cmd_validate(
    input: &PathBuf,
    input_format: InputFormat,
    json: bool,
) -> Result<(), DayscopeCliError> {
    let input_data = read_input(input)?;

    let events = match input_format {
        InputFormat::Ndjson => RawEventAdapter::parse_ndjson(&input_data)?,
        InputFormat::Json => RawEventAdapter::parse_array(&input_data)?,
    };

    let failures = RawEventAdapter::validate_events(&events);

    let report = ValidationReport {
        total_events: events.len(),
        invalid_events: failures.len(),
        errors: failures,
    };

    if json {
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else {
        println!("Validation Report");
        println!("=================");
        println!("Total events:   {}", report.total_events);
        println!("Invalid events: {}", report.invalid_events);

        if !report.errors.is_empty() {
            println!("\nErrors:");
            for err in &report.errors {
                println!("  - Event at index {}: {}", err.index, err.error);
            }
        }
    }

    if report.invalid_events > 0 {
        Err(DayscopeCliError::ValidationFailed(report.invalid_events))
    } else {
        Ok(())
    }
}

fn cmd_doctor(json: bool) -> Result<(), DayscopeCliError> {
    let mut checks: Vec<DoctorCheck> = Vec::new();

    checks.push(DoctorCheck {
        name: "engine_version".to_string(),
        status: CheckStatus::Ok,
        message: format!("Dayscope version {}", ENGINE_VERSION),
    });

    // Exercise the pipeline on an empty day so a broken build fails loudly
    let probe = dayscope::process_day_json(r#"{"date":"2024-01-01","events":[]}"#);
    checks.push(match probe {
        Ok(_) => DoctorCheck {
            name: "pipeline".to_string(),
            status: CheckStatus::Ok,
            message: "Empty-day probe produced a result bundle".to_string(),
        },
        Err(e) => DoctorCheck {
            name: "pipeline".to_string(),
            status: CheckStatus::Error,
            message: format!("Empty-day probe failed: {}", e),
        },
    });

    checks.push(match std::env::var("RUST_LOG") {
        Ok(level) => DoctorCheck {
            name: "logging".to_string(),
            status: CheckStatus::Ok,
            message: format!("RUST_LOG={}", level),
        },
        Err(_) => DoctorCheck {
            name: "logging".to_string(),
            status: CheckStatus::Warning,
            message: "RUST_LOG not set; engine logging disabled".to_string(),
        },
    });

    let stdin_check = if atty::is(atty::Stream::Stdin) {
        DoctorCheck {
            name: "stdin".to_string(),
            status: CheckStatus::Ok,
            message: "stdin is a TTY (interactive mode)".to_string(),
        }
    } else {
        DoctorCheck {
            name: "stdin".to_string(),
            status: CheckStatus::Ok,
            message: "stdin is a pipe (batch mode ready)".to_string(),
        }
    };
    checks.push(stdin_check);

    let report = DoctorReport {
        producer: PRODUCER_NAME.to_string(),
        version: ENGINE_VERSION.to_string(),
        checks,
    };

    if json {
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else {
        println!("Dayscope Doctor Report");
        println!("======================");
        println!("Producer: {}", report.producer);
        println!("Version:  {}", report.version);
        println!("\nChecks:");

        for check in &report.checks {
            let status_icon = match check.status {
                CheckStatus::Ok => "[OK]",
                CheckStatus::Warning => "[WARN]",
                CheckStatus::Error => "[ERR]",
            };
            println!("  {} {}: {}", status_icon, check.name, check.message);
        }
    }

    let has_errors = report
        .checks
        .iter()
        .any(|c| matches!(c.status, CheckStatus::Error));
    if has_errors {
        Err(DayscopeCliError::DoctorFailed)
    } else {
        Ok(())
    }
}

fn cmd_schema(schema_type: SchemaType) -> Result<(), DayscopeCliError> {
    match schema_type {
        SchemaType::Input => {
            println!("Input Schema: raw device-interaction events");
            println!();
            println!("Each event is a JSON object:");
            println!("  package_name     string (may be empty for device-level events)");
            println!("  event_kind       activity_resumed | activity_paused | activity_stopped |");
            println!("                   screen_non_interactive | user_unlocked | keyguard_hidden |");
            println!("                   keyguard_shown | user_present | service_started |");
            println!("                   service_stopped | scroll_measured | scroll_inferred |");
            println!("                   typing | view_clicked | view_focused |");
            println!("                   generic_interaction | notification_posted |");
            println!("                   notification_removed");
            println!("  timestamp_millis UTC epoch milliseconds");
            println!("  date_string      local calendar day, YYYY-MM-DD");
            println!("  scroll_delta_x   optional signed pixel delta (measured scrolls)");
            println!("  scroll_delta_y   optional signed pixel delta");
            println!("  value            optional legacy magnitude-only scroll signal");
            println!("  source           producer tag");
        }
        SchemaType::Output => {
            println!("Output Schema: daily result bundle");
            println!();
            println!("One bundle per processed date:");
            println!("  date_string     the reconstructed day");
            println!("  usage_records   per-app usage/active time, opens, notifications");
            println!("  unlock_sessions classified unlock-to-lock sessions");
            println!("  scroll_sessions merged scroll sessions (MEASURED or INFERRED)");
            println!("  device_summary  whole-day rollup; absent when the day has no data");
            println!("  insights        sparse key/value daily facts");
        }
    }

    Ok(())
}

// Helper functions

fn read_input(input: &PathBuf) -> Result<String, DayscopeCliError> {
    if input.to_string_lossy() == "-" {
        let mut buffer = String::new();
        io::stdin().read_to_string(&mut buffer)?;
        Ok(buffer)
    } else {
        Ok(fs::read_to_string(input)?)
    }
}

fn write_output(output: &PathBuf, data: &str) -> Result<(), DayscopeCliError> {
    if output.to_string_lossy() == "-" {
        print!("{}", data);
    } else {
        fs::write(output, data)?;
    }
    Ok(())
}

fn format_output(
    results: &[DailyProcessingResult],
    format: &OutputFormat,
) -> Result<String, DayscopeCliError> {
    match format {
        OutputFormat::Ndjson => {
            let mut lines: Vec<String> = Vec::new();
            for result in results {
                lines.push(serde_json::to_string(result)?);
            }
            Ok(lines.join("\n") + "\n")
        }
        OutputFormat::Json => Ok(serde_json::to_string(results)?),
        OutputFormat::JsonPretty => Ok(serde_json::to_string_pretty(results)?),
    }
}

// Error types

#[derive(Debug)]
enum DayscopeCliError {
    Io(io::Error),
    Engine(dayscope::EngineError),
    Json(serde_json::Error),
    NoEvents,
    InvalidOffset(i32),
    ValidationFailed(usize),
    DoctorFailed,
}

impl From<io::Error> for DayscopeCliError {
    fn from(e: io::Error) -> Self {
        DayscopeCliError::Io(e)
    }
}

impl From<dayscope::EngineError> for DayscopeCliError {
    fn from(e: dayscope::EngineError) -> Self {
        DayscopeCliError::Engine(e)
    }
}

impl From<serde_json::Error> for DayscopeCliError {
    fn from(e: serde_json::Error) -> Self {
        DayscopeCliError::Json(e)
    }
}

#[derive(serde::Serialize)]
struct CliError {
    code: String,
    message: String,
    hint: Option<String>,
}

impl From<DayscopeCliError> for CliError {
    fn from(e: DayscopeCliError) -> Self {
        match e {
            DayscopeCliError::Io(e) => CliError {
                code: "IO_ERROR".to_string(),
                message: e.to_string(),
                hint: Some("Check file paths and permissions".to_string()),
            },
            DayscopeCliError::Engine(e) => CliError {
                code: "ENGINE_ERROR".to_string(),
                message: e.to_string(),
                hint: Some("Run 'dayscope validate' on the input".to_string()),
            },
            DayscopeCliError::Json(e) => CliError {
                code: "JSON_ERROR".to_string(),
                message: e.to_string(),
                hint: Some("Check JSON syntax".to_string()),
            },
            DayscopeCliError::NoEvents => CliError {
                code: "NO_EVENTS".to_string(),
                message: "No events found in input".to_string(),
                hint: Some("Ensure input file is not empty".to_string()),
            },
            DayscopeCliError::InvalidOffset(minutes) => CliError {
                code: "INVALID_OFFSET".to_string(),
                message: format!("UTC offset {} minutes is out of range", minutes),
                hint: Some("Offsets must be within +/- 24 hours".to_string()),
            },
            DayscopeCliError::ValidationFailed(count) => CliError {
                code: "VALIDATION_FAILED".to_string(),
                message: format!("{} events failed validation", count),
                hint: Some("Fix validation errors and retry".to_string()),
            },
            DayscopeCliError::DoctorFailed => CliError {
                code: "DOCTOR_FAILED".to_string(),
                message: "One or more health checks failed".to_string(),
                hint: Some("Review the doctor report for details".to_string()),
            },
        }
    }
}

// Report types

#[derive(serde::Serialize)]
struct ValidationReport {
    total_events: usize,
    invalid_events: usize,
    errors: Vec<dayscope::adapter::EventValidation>,
}

#[derive(serde::Serialize)]
struct DoctorReport {
    producer: String,
    version: String,
    checks: Vec<DoctorCheck>,
}

#[derive(serde::Serialize)]
struct DoctorCheck {
    name: String,
    status: CheckStatus,
    message: String,
}

#[derive(serde::Serialize)]
enum CheckStatus {
    Ok,
    Warning,
    Error,
}
