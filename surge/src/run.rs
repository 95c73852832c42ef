use std::path::Path;

use anyhow::Context as _;
use surge_core::{RunPlan, RunResult};

use crate::cli::{RunArgs, ScenarioArgs};
use crate::exit_codes::ExitCode;
use crate::output;
use crate::run_error::RunError;
use crate::run_support::{classify_core_error, merged_env};
use crate::scenario_yaml;

pub async fn run(args: RunArgs) -> Result<ExitCode, RunError> {
    let mut plan = load(&args.scenario).await?;
    if let Some(seed) = args.seed {
        plan.options.seed = Some(seed);
    }
    if let Some(graceful_stop) = args.graceful_stop {
        plan.options.graceful_stop = graceful_stop;
    }
    plan.validate().map_err(classify_core_error)?;

    let out = output::formatter(args.output);
    out.print_header(&args.scenario.scenario, &plan);
    let progress = if args.quiet { None } else { out.progress() };

    let result = surge_core::run(plan, progress)
        .await
        .map_err(classify_core_error)?;

    out.print_summary(&result).map_err(RunError::RuntimeError)?;

    if let Some(path) = &args.summary_export {
        write_summary_export(path, &result)
            .await
            .map_err(RunError::RuntimeError)?;
    }

    Ok(ExitCode::from_thresholds(result.passed()))
}

pub async fn validate(args: ScenarioArgs) -> Result<ExitCode, RunError> {
    let plan = load(&args).await?;
    plan.validate().map_err(classify_core_error)?;

    let thresholds: usize = plan.thresholds.iter().map(|t| t.thresholds.len()).sum();
    println!(
        "{}: ok (scenario `{}`, {} stages, max {} VUs over {}, {} thresholds)",
        args.scenario.display(),
        plan.scenario.name,
        plan.options.stages.len(),
        plan.options.max_target(),
        humantime::format_duration(plan.options.total_duration()),
        thresholds
    );
    Ok(ExitCode::Success)
}

async fn load(args: &ScenarioArgs) -> Result<RunPlan, RunError> {
    let env = merged_env(&args.env).map_err(RunError::InvalidInput)?;
    let plan = scenario_yaml::load_plan(&args.scenario, &env)
        .await
        .map_err(RunError::InvalidInput)?;
    tracing::debug!(
        scenario = %plan.scenario.name,
        path = %args.scenario.display(),
        "scenario loaded"
    );
    Ok(plan)
}

async fn write_summary_export(path: &Path, result: &RunResult) -> anyhow::Result<()> {
    let doc = output::json::build_summary(result);
    let bytes = serde_json::to_vec_pretty(&doc).context("failed to encode summary")?;

    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        tokio::fs::create_dir_all(parent).await.with_context(|| {
            format!("failed to create summary export dir: {}", parent.display())
        })?;
    }
    tokio::fs::write(path, bytes)
        .await
        .with_context(|| format!("failed to write summary export: {}", path.display()))?;

    tracing::info!(path = %path.display(), "summary exported");
    Ok(())
}
