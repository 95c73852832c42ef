use std::path::Path;
use std::sync::Arc;

use surge_core::{ProgressFn, ProgressUpdate, RunPlan, RunResult};

mod duration;
mod format;
mod progress;
mod summary;

use duration::format_duration;
use format::{format_millis_opt, format_rate};
use progress::HumanProgress;
use summary::render;

use super::OutputFormatter;

pub(crate) struct HumanReadableOutput {
    progress: Arc<HumanProgress>,
}

impl HumanReadableOutput {
    pub(crate) fn new() -> Self {
        Self {
            progress: Arc::new(HumanProgress::new()),
        }
    }
}

impl OutputFormatter for HumanReadableOutput {
    fn print_header(&self, scenario_path: &Path, plan: &RunPlan) {
        println!("scenario: {} ({})", plan.scenario.name, scenario_path.display());
        println!(
            "  stages={} max_vus={} duration={} graceful_stop={}",
            plan.options.stages.len(),
            plan.options.max_target(),
            humantime::format_duration(plan.options.total_duration()),
            humantime::format_duration(plan.options.graceful_stop)
        );
        if let Some(setup) = &plan.options.setup {
            println!("  setup: GET {} expects {}", setup.url, setup.expected_status);
        }
        let thresholds: usize = plan.thresholds.iter().map(|t| t.thresholds.len()).sum();
        if thresholds > 0 {
            println!("  thresholds: {thresholds}");
        }
        println!();
    }

    fn progress(&self) -> Option<ProgressFn> {
        let progress = self.progress.clone();

        Some(Arc::new(move |u: ProgressUpdate| {
            let stage = u
                .stage
                .as_ref()
                .map(|s| {
                    format!(
                        "stage={}/{} target={} ",
                        s.stage, s.stages, s.current_target
                    )
                })
                .unwrap_or_default();
            let failing = if u.thresholds_failing {
                " thresholds=FAILING"
            } else {
                ""
            };

            let message = format!(
                "{stage}vus={} elapsed={} rps={} iters/s={} failed={} p95={}{failing}",
                u.active_vus,
                format_duration(u.elapsed),
                format_rate(u.metrics.rps_now),
                format_rate(u.metrics.iterations_per_sec_now),
                u.metrics.failed_requests_total,
                format_millis_opt(u.metrics.latency_p95_ms),
            );

            progress.update(&u.scenario, u.total_duration, u.elapsed, message);
        }))
    }

    fn print_summary(&self, result: &RunResult) -> anyhow::Result<()> {
        self.progress.finish();
        print!("{}", render(result));

        let failed: Vec<_> = result.failed_thresholds().collect();
        if !failed.is_empty() {
            eprintln!("thresholds failed: {}", failed.len());
        }
        Ok(())
    }
}
