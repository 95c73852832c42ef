use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::sync::atomic::{AtomicU8, Ordering};
use std::time::{Duration, Instant};

use rand::distributions::{Distribution, WeightedIndex};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use surge_metrics::{MetricHandle, Registry, TagSet};
use tokio::sync::watch;
use tokio::task::JoinHandle;

use crate::checks::{CheckMetricIds, evaluate_checks};
use crate::executor::TargetExecutor;
use crate::iteration_metrics::{IterationMetricIds, IterationSample};
use crate::metrics_context::MetricsContext;
use crate::scenario::{Action, RequestAction, Scenario, WeightedAction};

#[derive(Debug, Clone, Copy, PartialEq, Eq, strum::Display)]
#[strum(serialize_all = "lowercase")]
pub enum VuState {
    Idle,
    Running,
    Stopping,
}

#[derive(Debug)]
pub struct VuStatus(AtomicU8);

impl VuStatus {
    fn new() -> Self {
        Self(AtomicU8::new(VuState::Idle as u8))
    }

    pub fn get(&self) -> VuState {
        match self.0.load(Ordering::Acquire) {
            0 => VuState::Idle,
            1 => VuState::Running,
            _ => VuState::Stopping,
        }
    }

    fn start(&self) {
        // A stop requested before the task got scheduled wins.
        let _ = self.0.compare_exchange(
            VuState::Idle as u8,
            VuState::Running as u8,
            Ordering::AcqRel,
            Ordering::Acquire,
        );
    }

    fn stopping(&self) {
        self.0.store(VuState::Stopping as u8, Ordering::Release);
    }
}

/// Cooperative stop flag observed by a VU.
#[derive(Debug, Clone)]
pub struct StopSignal {
    rx: watch::Receiver<bool>,
}

impl StopSignal {
    pub fn is_stopped(&self) -> bool {
        *self.rx.borrow()
    }

    /// Sleep for `d`. Returns `false` if a stop was requested first.
    pub async fn sleep(&self, d: Duration) -> bool {
        if self.is_stopped() {
            return false;
        }
        let mut rx = self.rx.clone();
        tokio::select! {
            _ = tokio::time::sleep(d) => true,
            _ = rx.wait_for(|stopped| *stopped) => false,
        }
    }
}

/// Everything the VUs of a run share.
#[derive(Debug)]
pub struct VuShared {
    pub scenario: Arc<Scenario>,
    pub executor: TargetExecutor,
    pub iteration_metrics: IterationMetricIds,
    pub check_metrics: CheckMetricIds,
    pub metrics_ctx: MetricsContext,
    pub seed: Option<u64>,
}

impl VuShared {
    fn metrics(&self) -> &Registry {
        self.executor.metrics()
    }
}

/// Coordinator-side handle of one running VU.
#[derive(Debug)]
pub struct VuHandle {
    id: u64,
    stop_tx: watch::Sender<bool>,
    status: Arc<VuStatus>,
    task: JoinHandle<()>,
}

impl VuHandle {
    pub fn spawn(id: u64, shared: Arc<VuShared>) -> Self {
        let (stop_tx, stop_rx) = watch::channel(false);
        let status = Arc::new(VuStatus::new());
        let task = tokio::spawn(run_vu(id, shared, StopSignal { rx: stop_rx }, status.clone()));
        Self {
            id,
            stop_tx,
            status,
            task,
        }
    }

    pub fn id(&self) -> u64 {
        self.id
    }

    pub fn state(&self) -> VuState {
        self.status.get()
    }

    /// Ask the VU to stop at its next safe point. In-flight requests are not cancelled.
    pub fn request_stop(&self) {
        self.status.stopping();
        self.stop_tx.send_replace(true);
    }

    pub fn is_finished(&self) -> bool {
        self.task.is_finished()
    }

    pub fn into_task(self) -> JoinHandle<()> {
        self.task
    }
}

/// Keeps the `vus` gauge in step with running VUs.
struct ActiveVuGuard {
    handle: Option<MetricHandle>,
}

impl ActiveVuGuard {
    fn enter(shared: &VuShared) -> Self {
        let metrics = shared.metrics();
        let tags = metrics.resolve_tags(&[("scenario", shared.metrics_ctx.scenario())]);
        let handle = metrics.get_handle(shared.iteration_metrics.vus, tags);
        if let Some(h) = &handle {
            h.add_gauge(1);
        }
        Self { handle }
    }
}

impl Drop for ActiveVuGuard {
    fn drop(&mut self) {
        if let Some(h) = &self.handle {
            h.add_gauge(-1);
        }
    }
}

enum Step {
    Completed { ok: bool },
    Interrupted,
}

async fn run_vu(id: u64, shared: Arc<VuShared>, stop: StopSignal, status: Arc<VuStatus>) {
    let _active = ActiveVuGuard::enter(&shared);
    status.start();

    let mut rng = match shared.seed {
        Some(seed) => StdRng::seed_from_u64(seed.wrapping_add(id)),
        None => StdRng::from_entropy(),
    };
    let ctx = shared.metrics_ctx.clone();
    let base_tags: Vec<(String, String)> = ctx
        .base_tags(&["outcome"])
        .into_iter()
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect();

    tracing::debug!(vu = id, scenario = ctx.scenario(), "vu started");

    let mut iterations = 0u64;
    while !stop.is_stopped() {
        let started = Instant::now();
        let step = run_actions(&shared, id, &shared.scenario.actions, &ctx, &mut rng, &stop).await;
        let Step::Completed { ok } = step else {
            break;
        };

        iterations += 1;
        let tags: Vec<(&str, &str)> = base_tags
            .iter()
            .map(|(k, v)| (k.as_str(), v.as_str()))
            .collect();
        shared.iteration_metrics.record_iteration(
            shared.metrics(),
            IterationSample {
                success: ok,
                duration: started.elapsed(),
            },
            &tags,
        );

        let pause = shared.scenario.pacing.sample(&mut rng);
        if pause.is_zero() {
            tokio::task::yield_now().await;
        } else if !stop.sleep(pause).await {
            break;
        }
    }

    status.stopping();
    tracing::debug!(vu = id, iterations, "vu stopped");
}

type StepFuture<'a> = Pin<Box<dyn Future<Output = Step> + Send + 'a>>;

fn run_actions<'a>(
    shared: &'a VuShared,
    vu: u64,
    actions: &'a [Action],
    ctx: &'a MetricsContext,
    rng: &'a mut StdRng,
    stop: &'a StopSignal,
) -> StepFuture<'a> {
    Box::pin(async move {
        let mut all_ok = true;
        for action in actions {
            match run_action(shared, vu, action, ctx, rng, stop).await {
                Step::Completed { ok } => all_ok &= ok,
                Step::Interrupted => return Step::Interrupted,
            }
        }
        Step::Completed { ok: all_ok }
    })
}

fn run_action<'a>(
    shared: &'a VuShared,
    vu: u64,
    action: &'a Action,
    ctx: &'a MetricsContext,
    rng: &'a mut StdRng,
    stop: &'a StopSignal,
) -> StepFuture<'a> {
    Box::pin(async move {
        match action {
            Action::Request(req) => {
                let ok = run_request(shared, vu, req, ctx).await;
                if stop.is_stopped() {
                    return Step::Interrupted;
                }
                Step::Completed { ok }
            }
            Action::Conditional {
                probability,
                action,
            } => {
                if rng.gen_bool((*probability).clamp(0.0, 1.0)) {
                    run_action(shared, vu, action, ctx, rng, stop).await
                } else {
                    Step::Completed { ok: true }
                }
            }
            Action::Sleep(range) => {
                let d = range.sample(rng);
                if d.is_zero() || stop.sleep(d).await {
                    Step::Completed { ok: true }
                } else {
                    Step::Interrupted
                }
            }
            Action::Weighted(choices) => match pick_weighted(choices, rng) {
                Some(choice) => run_action(shared, vu, &choice.action, ctx, rng, stop).await,
                None => Step::Completed { ok: true },
            },
            Action::Group { name, actions } => {
                let group_ctx = ctx.with_group(name);
                run_actions(shared, vu, actions, &group_ctx, rng, stop).await
            }
        }
    })
}

fn pick_weighted<'a>(choices: &'a [WeightedAction], rng: &mut StdRng) -> Option<&'a WeightedAction> {
    let dist = WeightedIndex::new(choices.iter().map(|c| u64::from(c.weight))).ok()?;
    choices.get(dist.sample(rng))
}

/// Execute one request and its checks. Returns "transport ok and every check passed";
/// without checks the expected-status rule decides.
async fn run_request(shared: &VuShared, vu: u64, req: &RequestAction, ctx: &MetricsContext) -> bool {
    let metrics = shared.metrics();
    let res = shared.executor.execute(req, ctx).await;

    let results = evaluate_checks(&req.checks, &res);
    let ok = if results.is_empty() {
        res.expected
    } else {
        !res.is_transport_error() && results.iter().all(|r| r.passed)
    };

    let mut tags = ctx.base_tags(&[]);
    for (k, v) in &req.tags {
        if !matches!(k.as_str(), "scenario" | "group") {
            tags.push((k.as_str(), v.as_str()));
        }
    }

    shared.check_metrics.record(metrics, &results, &tags);

    if req.success_metric.is_some() || req.duration_metric.is_some() || req.error_metric.is_some() {
        let tag_set = metrics.resolve_tags(&tags);
        if let Some(h) = custom_handle(metrics, req.success_metric.as_deref(), &tag_set) {
            h.add_rate(ok);
        }
        if let Some(h) = custom_handle(metrics, req.duration_metric.as_deref(), &tag_set) {
            h.observe(res.elapsed.as_secs_f64() * 1_000.0);
        }
        if !ok && let Some(h) = custom_handle(metrics, req.error_metric.as_deref(), &tag_set) {
            h.increment(1);
        }
    }

    if let Some(path) = &req.log_json_path {
        match res.json_path(path) {
            Some(value) => tracing::debug!(vu, path = %path, value = %value, "correlation"),
            None => tracing::debug!(vu, path = %path, status = res.status, "correlation value missing"),
        }
    }
    if !ok {
        let failed: Vec<&str> = results
            .iter()
            .filter(|r| !r.passed)
            .map(|r| r.name.as_str())
            .collect();
        tracing::debug!(
            vu,
            url = %req.url,
            status = res.status,
            failed_checks = ?failed,
            "request not successful"
        );
    }

    ok
}

fn custom_handle(metrics: &Registry, name: Option<&str>, tags: &TagSet) -> Option<MetricHandle> {
    let (id, _) = metrics.lookup_metric(name?)?;
    metrics.get_handle(id, tags.clone())
}
