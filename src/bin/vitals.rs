//! Vitals CLI - command-line interface for Vitals Dash
//!
//! Commands:
//! - aggregate: Sum records per calendar day for each metric
//! - sleep: Derive nightly sleep windows
//! - render: Run the full dashboard and print the recorded render commands
//! - validate: Validate a record feed
//! - doctor: Diagnose configuration and environment

use clap::{Parser, Subcommand, ValueEnum};
use chrono::NaiveDate;
use serde::Serialize;
use std::fs;
use std::io::{self, Read};
use std::path::{Path, PathBuf};
use std::process::ExitCode;

use vitals_dash::aggregate::{merge_per_day, metric_types, records_of_type, sleep_cycle_per_day};
use vitals_dash::coordinator::ChartState;
use vitals_dash::schema::{RawRecord, RecordAdapter};
use vitals_dash::types::{
    DateRange, DayAggregate, Direction, RangeUnit, Record, SleepDayAggregate, SLEEP_ANALYSIS,
};
use vitals_dash::{
    Dashboard, DashboardConfig, DashboardError, FrameRecorder, RenderCommand, PRODUCER_NAME,
    VERSION,
};

/// Vitals - aggregate health records and drive dashboard charts
#[derive(Parser)]
#[command(name = "vitals")]
#[command(version = VERSION)]
#[command(about = "Aggregate health records and drive dashboard charts", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Sum records per calendar day, one dataset per metric
    Aggregate {
        /// Input file path (use - for stdin)
        #[arg(short, long)]
        input: PathBuf,

        /// Input format
        #[arg(long, default_value = "auto")]
        input_format: InputFormat,

        /// Metric to aggregate (repeatable; defaults to the configured bar charts)
        #[arg(short, long)]
        metric: Vec<String>,

        /// Aggregate every metric type found in the feed
        #[arg(long, conflicts_with = "metric")]
        all: bool,

        /// Dashboard configuration file
        #[arg(short, long)]
        config: Option<PathBuf>,

        /// Pretty-print the JSON output
        #[arg(long)]
        pretty: bool,
    },

    /// Derive nightly sleep windows from sleep analysis records
    Sleep {
        /// Input file path (use - for stdin)
        #[arg(short, long)]
        input: PathBuf,

        /// Input format
        #[arg(long, default_value = "auto")]
        input_format: InputFormat,

        /// Dashboard configuration file (sleep thresholds)
        #[arg(short, long)]
        config: Option<PathBuf>,

        /// Pretty-print the JSON output
        #[arg(long)]
        pretty: bool,
    },

    /// Load a feed into the dashboard and print what the charts drew
    Render {
        /// Input file path (use - for stdin)
        #[arg(short, long)]
        input: PathBuf,

        /// Input format
        #[arg(long, default_value = "auto")]
        input_format: InputFormat,

        /// Dashboard configuration file
        #[arg(short, long)]
        config: Option<PathBuf>,

        /// Default range unit (overrides the configured default)
        #[arg(long)]
        unit: Option<UnitArg>,

        /// Select a range unit after loading, keeping the end date
        #[arg(long)]
        select: Option<UnitArg>,

        /// End of the default range, YYYY-MM-DD (defaults to the latest day in the feed)
        #[arg(long)]
        reference_date: Option<NaiveDate>,

        /// Navigation steps applied after loading, in order
        #[arg(long = "step", value_enum)]
        steps: Vec<StepArg>,

        /// Hover a day (DD-MM-YYYY) on the first chart after navigating
        #[arg(long)]
        hover: Option<String>,

        /// Only print commands for this chart target
        #[arg(long)]
        chart: Option<String>,

        /// Pretty-print the JSON output
        #[arg(long)]
        pretty: bool,
    },

    /// Validate a record feed
    Validate {
        /// Input file path (use - for stdin)
        #[arg(short, long)]
        input: PathBuf,

        /// Input format
        #[arg(long, default_value = "auto")]
        input_format: InputFormat,

        /// Output validation report as JSON
        #[arg(long)]
        json: bool,
    },

    /// Diagnose configuration and environment
    Doctor {
        /// Check a dashboard configuration file
        #[arg(short, long)]
        config: Option<PathBuf>,

        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
}

#[derive(Clone, Copy, ValueEnum)]
enum InputFormat {
    /// Detect from the first character
    Auto,
    /// JSON array of records
    Json,
    /// Newline-delimited JSON (one record per line)
    Ndjson,
    /// Apple Health export.xml
    Xml,
}

#[derive(Clone, Copy, ValueEnum)]
enum UnitArg {
    Week,
    Month,
}

impl From<UnitArg> for RangeUnit {
    fn from(unit: UnitArg) -> Self {
        match unit {
            UnitArg::Week => RangeUnit::Week,
            UnitArg::Month => RangeUnit::Month,
        }
    }
}

#[derive(Clone, Copy, ValueEnum)]
enum StepArg {
    Prev,
    Next,
}

impl From<StepArg> for Direction {
    fn from(step: StepArg) -> Self {
        match step {
            StepArg::Prev => Direction::Previous,
            StepArg::Next => Direction::Next,
        }
    }
}

fn main() -> ExitCode {
    init_tracing();
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

/// Log to stderr, filtered by `RUST_LOG` (default `warn`)
fn init_tracing() {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("warn")),
        )
        .with_writer(io::stderr)
        .init();
}

fn run(cli: Cli) -> Result<(), VitalsCliError> {
    match cli.command {
        Commands::Aggregate {
            input,
            input_format,
            metric,
            all,
            config,
            pretty,
        } => cmd_aggregate(&input, input_format, metric, all, config.as_deref(), pretty),

        Commands::Sleep {
            input,
            input_format,
            config,
            pretty,
        } => cmd_sleep(&input, input_format, config.as_deref(), pretty),

        Commands::Render {
            input,
            input_format,
            config,
            unit,
            select,
            reference_date,
            steps,
            hover,
            chart,
            pretty,
        } => {
            let options = RenderOptions {
                unit: unit.map(RangeUnit::from),
                select: select.map(RangeUnit::from),
                reference_date,
                steps: steps.into_iter().map(Direction::from).collect(),
                hover,
                chart,
                pretty,
            };
            cmd_render(&input, input_format, config.as_deref(), options)
        }

        Commands::Validate {
            input,
            input_format,
            json,
        } => cmd_validate(&input, input_format, json),

        Commands::Doctor { config, json } => cmd_doctor(config.as_deref(), json),
    }
}

fn cmd_aggregate(
    input: &Path,
    input_format: InputFormat,
    metrics: Vec<String>,
    all: bool,
    config: Option<&Path>,
    pretty: bool,
) -> Result<(), VitalsCliError> {
    let records = read_records(input, input_format)?;

    let metrics = if all {
        metric_types(&records)
    } else if metrics.is_empty() {
        load_config(config)?.bar_metrics()
    } else {
        metrics
    };

    let datasets: Vec<MetricDataset> = metrics
        .into_iter()
        .map(|metric| {
            MetricDataset {
                days: merge_per_day(records_of_type(&records, &metric)),
                metric,
            }
        })
        .collect();

    print_json(&datasets, pretty)
}

fn cmd_sleep(
    input: &Path,
    input_format: InputFormat,
    config: Option<&Path>,
    pretty: bool,
) -> Result<(), VitalsCliError> {
    let config = load_config(config)?;
    let records = read_records(input, input_format)?;

    let selected = records_of_type(&records, SLEEP_ANALYSIS);
    let bedtime = config.sleep.bedtime_spread()?;
    let wake = config.sleep.wake_spread()?;
    let cycles: Vec<SleepDayAggregate> = sleep_cycle_per_day(selected, &bedtime, &wake);

    print_json(&cycles, pretty)
}

struct RenderOptions {
    unit: Option<RangeUnit>,
    select: Option<RangeUnit>,
    reference_date: Option<NaiveDate>,
    steps: Vec<Direction>,
    hover: Option<String>,
    chart: Option<String>,
    pretty: bool,
}

fn cmd_render(
    input: &Path,
    input_format: InputFormat,
    config: Option<&Path>,
    options: RenderOptions,
) -> Result<(), VitalsCliError> {
    let mut config = load_config(config)?;
    if let Some(unit) = options.unit {
        config.default_unit = unit;
    }
    if options.reference_date.is_some() {
        config.reference_date = options.reference_date;
    }

    let records = read_records(input, input_format)?;
    if records.is_empty() {
        return Err(VitalsCliError::NoRecords);
    }

    let recorder = FrameRecorder::shared();
    let mut dashboard = Dashboard::new(config, recorder.clone())?;
    dashboard.load(&records)?;
    if let Some(unit) = options.select {
        dashboard.select_unit(unit)?;
    }
    for direction in options.steps {
        dashboard.navigate(direction)?;
    }
    if let Some(key) = options.hover.as_deref() {
        if let Some(first) = dashboard.charts().first() {
            let target = first.target().to_string();
            dashboard.hover(&target, key)?;
        }
    }

    let charts = dashboard
        .charts()
        .iter()
        .filter(|chart| options.chart.as_deref().map_or(true, |t| chart.target() == t))
        .map(|chart| ChartSummary {
            target: chart.target().to_string(),
            kind: chart.kind(),
            metric: chart.metric().to_string(),
            state: chart.state(),
            visible: chart.visible_keys(),
        })
        .collect();

    let commands: Vec<RenderCommand> = recorder
        .borrow()
        .commands()
        .iter()
        .filter(|command| {
            options
                .chart
                .as_deref()
                .map_or(true, |t| command.chart() == t)
        })
        .cloned()
        .collect();

    let report = RenderReport {
        range: dashboard.range(),
        charts,
        commands,
    };
    print_json(&report, options.pretty)
}

fn cmd_validate(input: &Path, input_format: InputFormat, json: bool) -> Result<(), VitalsCliError> {
    let input_data = read_input(input)?;
    let raw = parse_raw(&input_data, input_format)?;

    let results = RecordAdapter::validate_records(&raw);

    let report = ValidationReport {
        total_records: raw.len(),
        valid_records: raw.len() - results.len(),
        invalid_records: results.len(),
        metrics: metric_types(
            &raw.iter()
                .enumerate()
                .filter_map(|(i, r)| r.to_record(i).ok())
                .collect::<Vec<_>>(),
        ),
        errors: results
            .iter()
            .map(|r| ValidationErrorDetail {
                index: r.index,
                record_type: r.record_type.clone(),
                error: r.error.to_string(),
            })
            .collect(),
    };

    if json {
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else {
        println!("Validation Report");
        println!("=================");
        println!("Total records:   {}", report.total_records);
        println!("Valid records:   {}", report.valid_records);
        println!("Invalid records: {}", report.invalid_records);
        println!("Metric types:    {}", report.metrics.join(", "));

        if !report.errors.is_empty() {
            println!("\nErrors:");
            for err in &report.errors {
                let record_type = if err.record_type.is_empty() {
                    "unknown"
                } else {
                    err.record_type.as_str()
                };
                println!("  - Record {} ({}): {}", err.index, record_type, err.error);
            }
        }
    }

    if report.invalid_records > 0 {
        Err(VitalsCliError::ValidationFailed(report.invalid_records))
    } else {
        Ok(())
    }
}

fn cmd_doctor(config: Option<&Path>, json: bool) -> Result<(), VitalsCliError> {
    let mut checks: Vec<DoctorCheck> = Vec::new();

    checks.push(DoctorCheck {
        name: "version".to_string(),
        status: CheckStatus::Ok,
        message: format!("Vitals version {}", VERSION),
    });

    match config {
        Some(path) if path.exists() => {
            let check = match fs::read_to_string(path) {
                Ok(content) => match DashboardConfig::from_json(&content) {
                    Ok(config) => DoctorCheck {
                        name: "config".to_string(),
                        status: CheckStatus::Ok,
                        message: format!(
                            "Config valid ({} charts, {} range)",
                            config.charts.len(),
                            config.default_unit
                        ),
                    },
                    Err(e) => DoctorCheck {
                        name: "config".to_string(),
                        status: CheckStatus::Error,
                        message: format!("Invalid config: {}", e),
                    },
                },
                Err(e) => DoctorCheck {
                    name: "config".to_string(),
                    status: CheckStatus::Error,
                    message: format!("Cannot read config file: {}", e),
                },
            };
            checks.push(check);
        }
        Some(_) => checks.push(DoctorCheck {
            name: "config".to_string(),
            status: CheckStatus::Warning,
            message: "Config file does not exist".to_string(),
        }),
        None => checks.push(DoctorCheck {
            name: "config".to_string(),
            status: CheckStatus::Ok,
            message: "Using default config".to_string(),
        }),
    }

    let stdin_check = if atty::is(atty::Stream::Stdin) {
        DoctorCheck {
            name: "stdin".to_string(),
            status: CheckStatus::Ok,
            message: "stdin is a TTY (pass --input FILE)".to_string(),
        }
    } else {
        DoctorCheck {
            name: "stdin".to_string(),
            status: CheckStatus::Ok,
            message: "stdin is a pipe (--input - ready)".to_string(),
        }
    };
    checks.push(stdin_check);

    let report = DoctorReport {
        producer: PRODUCER_NAME.to_string(),
        version: VERSION.to_string(),
        checks,
    };

    if json {
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else {
        println!("Vitals Doctor Report");
        println!("====================");
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
        Err(VitalsCliError::DoctorFailed)
    } else {
        Ok(())
    }
}

// Input helpers

fn read_input(input: &Path) -> Result<String, VitalsCliError> {
    if input.to_string_lossy() == "-" {
        let mut buffer = String::new();
        io::stdin().read_to_string(&mut buffer)?;
        Ok(buffer)
    } else {
        Ok(fs::read_to_string(input)?)
    }
}

fn parse_raw(input: &str, format: InputFormat) -> Result<Vec<RawRecord>, VitalsCliError> {
    let raw = match format {
        InputFormat::Auto => RecordAdapter::parse_auto(input)?,
        InputFormat::Json => RecordAdapter::parse_array(input)?,
        InputFormat::Ndjson => RecordAdapter::parse_ndjson(input)?,
        InputFormat::Xml => RecordAdapter::parse_xml(input)?,
    };
    Ok(raw)
}

fn read_records(input: &Path, format: InputFormat) -> Result<Vec<Record>, VitalsCliError> {
    let input_data = read_input(input)?;
    let raw = parse_raw(&input_data, format)?;
    Ok(RecordAdapter::to_records(&raw)?)
}

fn load_config(path: Option<&Path>) -> Result<DashboardConfig, VitalsCliError> {
    match path {
        Some(path) => Ok(DashboardConfig::from_json(&fs::read_to_string(path)?)?),
        None => Ok(DashboardConfig::default()),
    }
}

fn print_json<T: Serialize>(value: &T, pretty: bool) -> Result<(), VitalsCliError> {
    let output = if pretty {
        serde_json::to_string_pretty(value)?
    } else {
        serde_json::to_string(value)?
    };
    println!("{}", output);
    Ok(())
}

// Error types

#[derive(Debug)]
enum VitalsCliError {
    Io(io::Error),
    Dashboard(DashboardError),
    Json(serde_json::Error),
    NoRecords,
    ValidationFailed(usize),
    DoctorFailed,
}

impl From<io::Error> for VitalsCliError {
    fn from(e: io::Error) -> Self {
        VitalsCliError::Io(e)
    }
}

impl From<DashboardError> for VitalsCliError {
    fn from(e: DashboardError) -> Self {
        VitalsCliError::Dashboard(e)
    }
}

impl From<serde_json::Error> for VitalsCliError {
    fn from(e: serde_json::Error) -> Self {
        VitalsCliError::Json(e)
    }
}

#[derive(Serialize)]
struct CliError {
    code: String,
    message: String,
    hint: Option<String>,
}

impl From<VitalsCliError> for CliError {
    fn from(e: VitalsCliError) -> Self {
        match e {
            VitalsCliError::Io(e) => CliError {
                code: "IO_ERROR".to_string(),
                message: e.to_string(),
                hint: Some("Check file paths and permissions".to_string()),
            },
            VitalsCliError::Dashboard(e) if e.is_load_error() => CliError {
                code: "LOAD_ERROR".to_string(),
                message: e.to_string(),
                hint: Some("Run 'vitals validate' on the feed for details".to_string()),
            },
            VitalsCliError::Dashboard(e) if e.is_config_error() => CliError {
                code: "CONFIG_ERROR".to_string(),
                message: e.to_string(),
                hint: Some("Run 'vitals doctor --config FILE' to check the config".to_string()),
            },
            VitalsCliError::Dashboard(e) if e.is_lifecycle_error() => CliError {
                code: "STATE_ERROR".to_string(),
                message: e.to_string(),
                hint: Some("Load the feed once before selecting or navigating".to_string()),
            },
            VitalsCliError::Dashboard(e) => CliError {
                code: "RANGE_ERROR".to_string(),
                message: e.to_string(),
                hint: Some("Check --reference-date and --step values".to_string()),
            },
            VitalsCliError::Json(e) => CliError {
                code: "JSON_ERROR".to_string(),
                message: e.to_string(),
                hint: Some("Check JSON syntax".to_string()),
            },
            VitalsCliError::NoRecords => CliError {
                code: "NO_RECORDS".to_string(),
                message: "No records found in input".to_string(),
                hint: Some("Ensure input file is not empty".to_string()),
            },
            VitalsCliError::ValidationFailed(count) => CliError {
                code: "VALIDATION_FAILED".to_string(),
                message: format!("{} records failed validation", count),
                hint: Some("Fix validation errors and retry".to_string()),
            },
            VitalsCliError::DoctorFailed => CliError {
                code: "DOCTOR_FAILED".to_string(),
                message: "One or more health checks failed".to_string(),
                hint: Some("Review the doctor report for details".to_string()),
            },
        }
    }
}

// Report types

#[derive(Serialize)]
struct MetricDataset {
    metric: String,
    days: Vec<DayAggregate>,
}

#[derive(Serialize)]
struct ChartSummary {
    target: String,
    kind: &'static str,
    metric: String,
    state: ChartState,
    visible: Vec<String>,
}

#[derive(Serialize)]
struct RenderReport {
    range: Option<DateRange>,
    charts: Vec<ChartSummary>,
    commands: Vec<RenderCommand>,
}

#[derive(Serialize)]
struct ValidationReport {
    total_records: usize,
    valid_records: usize,
    invalid_records: usize,
    metrics: Vec<String>,
    errors: Vec<ValidationErrorDetail>,
}

#[derive(Serialize)]
struct ValidationErrorDetail {
    index: usize,
    record_type: String,
    error: String,
}

#[derive(Serialize)]
struct DoctorReport {
    producer: String,
    version: String,
    checks: Vec<DoctorCheck>,
}

#[derive(Serialize)]
struct DoctorCheck {
    name: String,
    status: CheckStatus,
    message: String,
}

#[derive(Serialize)]
#[serde(rename_all = "lowercase")]
enum CheckStatus {
    Ok,
    Warning,
    Error,
}
