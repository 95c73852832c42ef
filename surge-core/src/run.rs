use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};

use surge_http::{HttpClient, HttpRequest};
use surge_metrics::{MetricKind, Registry};
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;

use crate::checks::CheckMetricIds;
use crate::config::{RunOptions, SetupCheck};
use crate::error::{Error, Result};
use crate::executor::TargetExecutor;
use crate::iteration_metrics::{ITERATIONS, IterationMetricIds, VUS};
use crate::metrics_context::MetricsContext;
use crate::progress::{LiveSampler, ProgressFn, ProgressUpdate};
use crate::request_metrics::RequestMetricIds;
use crate::scenario::Scenario;
use crate::schedule::{Population, PopulationDelta, StageSchedule};
use crate::summary::{self, RunFacts, RunResult};
use crate::thresholds::{Evaluation, ThresholdSet};
use crate::thresholds_eval::{evaluate_all, evaluate_continuous, validate_thresholds};
use crate::vu::{VuHandle, VuShared};

/// Everything needed to run one load test.
#[derive(Debug, Clone)]
pub struct RunPlan {
    pub options: RunOptions,
    pub scenario: Scenario,
    pub thresholds: Vec<ThresholdSet>,
    /// Custom metrics declared up front, so thresholds can reference them.
    pub metrics: Vec<(String, MetricKind)>,
}

impl RunPlan {
    pub fn new(options: RunOptions, scenario: Scenario) -> Self {
        Self {
            options,
            scenario,
            thresholds: Vec::new(),
            metrics: Vec::new(),
        }
    }

    #[must_use]
    pub fn with_thresholds(mut self, thresholds: Vec<ThresholdSet>) -> Self {
        self.thresholds = thresholds;
        self
    }

    #[must_use]
    pub fn with_metric(mut self, name: impl Into<String>, kind: MetricKind) -> Self {
        self.metrics.push((name.into(), kind));
        self
    }

    /// Every check [`run`] performs before sending a request, without sending one.
    pub fn validate(&self) -> Result<()> {
        self.register(&Registry::default()).map(|_| ())
    }

    fn register(&self, metrics: &Registry) -> Result<(IterationMetricIds, CheckMetricIds)> {
        self.options.validate()?;
        self.scenario.validate()?;

        RequestMetricIds::register(metrics)?;
        let iteration_metrics = IterationMetricIds::register(metrics)?;
        let check_metrics = CheckMetricIds::register(metrics)?;
        for (name, kind) in &self.metrics {
            metrics.register(name, *kind)?;
        }
        self.scenario.register_metrics(metrics)?;
        validate_thresholds(metrics, &self.thresholds)?;

        Ok((iteration_metrics, check_metrics))
    }
}

/// Execute `plan` to completion.
///
/// Configuration problems are reported before any request is sent. A failed setup check
/// returns [`Error::Setup`] without starting a VU. Failing thresholds are not an error: they
/// are reported in the returned [`RunResult`].
pub async fn run(plan: RunPlan, progress: Option<ProgressFn>) -> Result<RunResult> {
    let metrics = Arc::new(Registry::default());
    let (iteration_metrics, check_metrics) = plan.register(&metrics)?;
    let RunPlan {
        options,
        scenario,
        thresholds,
        ..
    } = plan;

    let client = HttpClient::new(options.connect_timeout);
    let executor = TargetExecutor::new(client.clone(), metrics.clone())?;

    if let Some(setup) = &options.setup {
        run_setup(&client, setup).await?;
    }

    let schedule = StageSchedule::new(options.stages.clone());
    let scenario_name: Arc<str> = Arc::from(scenario.name.as_str());
    let metrics_ctx = MetricsContext::new(
        scenario_name.clone(),
        Arc::from(scenario.tags.clone()),
    );

    if let Some(h) = metrics.get_handle(
        iteration_metrics.vus_max,
        metrics.resolve_tags(&[("scenario", &*scenario_name)]),
    ) {
        h.set_gauge(i64::try_from(schedule.max_target()).unwrap_or(i64::MAX));
    }

    let shared = Arc::new(VuShared {
        scenario: Arc::new(scenario),
        executor,
        iteration_metrics,
        check_metrics,
        metrics_ctx,
        seed: options.seed,
    });

    tracing::info!(
        scenario = %scenario_name,
        stages = schedule.stages().len(),
        max_vus = schedule.max_target(),
        duration = ?schedule.total_duration(),
        "run started"
    );

    let started = Instant::now();
    let failing = Arc::new(AtomicBool::new(false));
    let thresholds = Arc::new(thresholds);

    let monitor = spawn_threshold_monitor(
        metrics.clone(),
        thresholds.clone(),
        failing.clone(),
        started,
        options.threshold_interval,
    );
    let reporter = progress.map(|progress| {
        spawn_progress(
            progress,
            metrics.clone(),
            schedule.clone(),
            scenario_name.to_string(),
            iteration_metrics.vus,
            failing.clone(),
            started,
            options.progress_interval,
        )
    });

    let vus = drive_population(&schedule, &shared, started, options.scheduler_tick).await;
    let interrupted_vus = drain(vus, options.graceful_stop).await;

    for task in [monitor, reporter].into_iter().flatten() {
        task.abort();
        let _ = task.await;
    }

    let duration = started.elapsed();
    let outcomes = evaluate_all(&metrics, &thresholds, duration);
    for o in outcomes.iter().filter(|o| !o.passed) {
        tracing::warn!(
            selector = %o.selector,
            expression = %o.expression,
            observed = ?o.observed,
            "threshold failed"
        );
    }

    let result = summary::collect(
        &metrics,
        RunFacts {
            scenario: scenario_name.to_string(),
            duration,
            interrupted_vus,
            thresholds_failed_during_run: failing.load(Ordering::Acquire),
            thresholds: outcomes,
            iterations_metric: ITERATIONS,
            vus_metric: VUS,
        },
    );

    tracing::info!(
        scenario = %scenario_name,
        duration = ?duration,
        iterations = result.iterations,
        interrupted_vus,
        passed = result.passed(),
        "run finished"
    );

    Ok(result)
}

async fn run_setup(client: &HttpClient, setup: &SetupCheck) -> Result<()> {
    let req = HttpRequest::get(setup.url.clone()).with_timeout(setup.timeout);
    let res = client
        .request(req)
        .await
        .map_err(|e| Error::Setup(format!("{}: {e}", setup.url)))?;

    if res.status != setup.expected_status {
        return Err(Error::Setup(format!(
            "{} returned status {} (expected {})",
            setup.url, res.status, setup.expected_status
        )));
    }

    tracing::info!(url = %setup.url, status = res.status, "setup check passed");
    Ok(())
}

/// Follow the stage schedule until it ends. Returns every VU ever started, all of them
/// already asked to stop.
async fn drive_population(
    schedule: &StageSchedule,
    shared: &Arc<VuShared>,
    started: Instant,
    tick: Duration,
) -> Vec<VuHandle> {
    let mut population = Population::default();
    // Position in `active` is the VU's ordinal; the highest ordinals retire first.
    let mut active: Vec<VuHandle> = Vec::new();
    let mut retired: Vec<VuHandle> = Vec::new();
    let mut next_id = 1u64;
    let mut current_stage: Option<usize> = None;

    let mut interval = tokio::time::interval(tick);
    interval.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        interval.tick().await;
        let elapsed = started.elapsed();
        if schedule.is_done(elapsed) {
            break;
        }

        let stage = schedule.stage_index_at(elapsed);
        if stage != current_stage
            && let Some(idx) = stage
        {
            current_stage = stage;
            if let Some(s) = schedule.stages().get(idx) {
                tracing::debug!(
                    stage = idx + 1,
                    stages = schedule.stages().len(),
                    target = s.target,
                    duration = ?s.duration,
                    "stage started"
                );
            }
        }

        match population.advance(schedule.target_at(elapsed)) {
            Some(PopulationDelta::Spawn(n)) => {
                for _ in 0..n {
                    active.push(VuHandle::spawn(next_id, shared.clone()));
                    next_id += 1;
                }
            }
            Some(PopulationDelta::Retire(n)) => {
                for _ in 0..n {
                    if let Some(vu) = active.pop() {
                        tracing::trace!(vu = vu.id(), state = ?vu.state(), "retiring vu");
                        vu.request_stop();
                        retired.push(vu);
                    }
                }
            }
            None => {}
        }
    }

    for vu in &active {
        vu.request_stop();
    }
    retired.extend(active);
    retired
}

/// Wait for stopped VUs until `graceful_stop` elapses; abort the rest. Returns how many
/// had to be aborted.
async fn drain(vus: Vec<VuHandle>, graceful_stop: Duration) -> u64 {
    let deadline = tokio::time::Instant::now() + graceful_stop;
    let mut interrupted = 0u64;

    let still_running = vus.iter().filter(|vu| !vu.is_finished()).count();
    tracing::debug!(vus = vus.len(), still_running, ?graceful_stop, "draining vus");

    for vu in vus {
        let id = vu.id();
        let mut task = vu.into_task();
        match tokio::time::timeout_at(deadline, &mut task).await {
            Ok(Ok(())) => {}
            Ok(Err(e)) if e.is_panic() => {
                tracing::warn!(vu = id, error = %e, "vu panicked");
            }
            Ok(Err(_)) => {}
            Err(_) => {
                task.abort();
                let _ = task.await;
                interrupted += 1;
            }
        }
    }

    if interrupted > 0 {
        tracing::warn!(interrupted, ?graceful_stop, "vus interrupted at graceful stop");
    }
    interrupted
}

fn spawn_threshold_monitor(
    metrics: Arc<Registry>,
    thresholds: Arc<Vec<ThresholdSet>>,
    failing: Arc<AtomicBool>,
    started: Instant,
    every: Duration,
) -> Option<JoinHandle<()>> {
    let any_continuous = thresholds
        .iter()
        .flat_map(|s| &s.thresholds)
        .any(|t| t.evaluation == Evaluation::Continuous);
    if !any_continuous {
        return None;
    }

    Some(tokio::spawn(async move {
        let mut interval = tokio::time::interval(every);
        interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
        // The first tick completes immediately.
        interval.tick().await;

        loop {
            interval.tick().await;
            for o in evaluate_continuous(&metrics, &thresholds, started.elapsed()) {
                // No samples yet is not a crossing; the final evaluation still fails it.
                if o.passed || o.observed.is_none() {
                    continue;
                }
                if !failing.swap(true, Ordering::AcqRel) {
                    tracing::warn!(
                        selector = %o.selector,
                        expression = %o.expression,
                        observed = ?o.observed,
                        "threshold crossed during run"
                    );
                }
            }
        }
    }))
}

#[allow(clippy::too_many_arguments)]
fn spawn_progress(
    progress: ProgressFn,
    metrics: Arc<Registry>,
    schedule: StageSchedule,
    scenario: String,
    vus: surge_metrics::MetricId,
    failing: Arc<AtomicBool>,
    started: Instant,
    every: Duration,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(every);
        interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
        interval.tick().await;

        let mut sampler = LiveSampler::new(&metrics);
        let mut last = Instant::now();
        let mut tick = 0u64;

        loop {
            interval.tick().await;
            tick += 1;
            let now = Instant::now();
            let dt = now.duration_since(last);
            last = now;

            let elapsed = started.elapsed();
            (progress)(ProgressUpdate {
                tick,
                elapsed,
                total_duration: schedule.total_duration(),
                scenario: scenario.clone(),
                active_vus: u64::try_from(metrics.query(vus).gauge_sum()).unwrap_or(0),
                stage: schedule.stage_snapshot_at(elapsed).map(Into::into),
                thresholds_failing: failing.load(Ordering::Acquire),
                metrics: sampler.sample(&metrics, dt),
            });
        }
    })
}
