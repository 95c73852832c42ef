use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;
use std::time::Duration;

fn parse_duration(input: &str) -> Result<Duration, String> {
    let s = input.trim();
    if s.is_empty() {
        return Err("duration cannot be empty (expected e.g. 10s, 250ms, 1m)".to_string());
    }

    let number_end = s
        .char_indices()
        .find(|(_, ch)| !ch.is_ascii_digit())
        .map_or(s.len(), |(idx, _)| idx);

    if number_end == 0 {
        return Err(format!(
            "invalid duration '{s}' (expected e.g. 10s, 250ms, 1m)"
        ));
    }

    let (number_str, unit_str) = s.split_at(number_end);
    let value: u64 = number_str
        .parse()
        .map_err(|_| format!("invalid duration '{s}' (expected e.g. 10s, 250ms, 1m)"))?;

    match unit_str.trim() {
        "" | "s" | "sec" | "secs" | "second" | "seconds" => Ok(Duration::from_secs(value)),
        "ms" | "msec" | "msecs" | "millisecond" | "milliseconds" => {
            Ok(Duration::from_millis(value))
        }
        "m" | "min" | "mins" | "minute" | "minutes" => {
            let secs = value
                .checked_mul(60)
                .ok_or_else(|| format!("duration '{s}' is too large"))?;
            Ok(Duration::from_secs(secs))
        }
        _ => Err(format!(
            "invalid duration '{s}' (expected e.g. 10s, 250ms, 1m)"
        )),
    }
}

#[derive(Debug, Clone, Copy, clap::ValueEnum)]
pub enum OutputFormat {
    /// Human-readable progress and summary.
    HumanReadable,
    /// Emit JSON progress lines (NDJSON) and a final summary line to stdout.
    Json,
}

#[derive(Debug, Parser)]
#[command(
    name = "surge",
    author,
    version,
    about = "Staged load testing for HTTP services",
    long_about = "surge drives a population of virtual users through a staged load profile.\n\nA scenario file (YAML) declares the stages, the actions every VU performs per iteration, optional custom metrics and the thresholds that decide whether the run passes.\n\nURLs may reference `${NAME}` variables. They resolve from `--env KEY=VALUE`, then the process environment, then the scenario's `env` defaults.",
    after_help = "Examples:\n  surge run demos/smoke.yaml\n  surge run demos/load.yaml --env BASE_URL=http://staging:8080\n  surge run demos/spike.yaml --output json --summary-export out/spike.json\n  surge validate demos/load.yaml\n\nExit codes: 0 success, 11 thresholds failed, 20 setup failed, 30 invalid input, 40 runtime error."
)]
pub struct Cli {
    /// Increase log verbosity on stderr (-v info, -vv debug, -vvv trace). `SURGE_LOG` wins when set.
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Run a load test scenario
    #[command(
        long_about = "Run a scenario file to completion and evaluate its thresholds.\n\nCLI flags override values from the scenario file."
    )]
    Run(RunArgs),

    /// Check a scenario file without sending any load
    Validate(ScenarioArgs),
}

#[derive(Debug, Args)]
pub struct ScenarioArgs {
    /// Path to the scenario (.yaml)
    pub scenario: PathBuf,

    /// Add/override variables used for `${NAME}` substitution (repeatable, KEY=VALUE).
    /// CLI-provided vars override the process env and the scenario's `env` defaults.
    #[arg(long = "env", value_name = "KEY=VALUE")]
    pub env: Vec<String>,
}

#[derive(Debug, Args)]
pub struct RunArgs {
    #[command(flatten)]
    pub scenario: ScenarioArgs,

    /// Output format
    #[arg(long, value_enum, default_value_t = OutputFormat::HumanReadable)]
    pub output: OutputFormat,

    /// Also write the final summary as a JSON document to this path
    #[arg(long, value_name = "PATH")]
    pub summary_export: Option<PathBuf>,

    /// Seed for pacing, probabilities and weighted choices (overrides `seed`)
    #[arg(long)]
    pub seed: Option<u64>,

    /// How long VUs may finish their iteration after the last stage (e.g. 10s, 500ms)
    #[arg(long, value_parser = parse_duration)]
    pub graceful_stop: Option<Duration>,

    /// Disable live progress output
    #[arg(short, long)]
    pub quiet: bool,
}
