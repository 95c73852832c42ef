use std::path::{Path, PathBuf};
use std::process::{Command, Output};

use anyhow::Context as _;
use surge_testserver::TestServer;

fn status_code(status: std::process::ExitStatus) -> i32 {
    status.code().unwrap_or(-1)
}

fn ensure_code(out: &Output, expected: i32) -> anyhow::Result<()> {
    anyhow::ensure!(
        status_code(out.status) == expected,
        "expected exit code {expected}, got {}\nstdout:\n{}\nstderr:\n{}",
        status_code(out.status),
        String::from_utf8_lossy(&out.stdout),
        String::from_utf8_lossy(&out.stderr)
    );
    Ok(())
}

fn write_scenario(dir: &Path, name: &str, yaml: &str) -> anyhow::Result<PathBuf> {
    let path = dir.join(name);
    std::fs::write(&path, yaml).with_context(|| format!("write {}", path.display()))?;
    Ok(path)
}

async fn run_surge(args: Vec<String>, env: Vec<(String, String)>) -> anyhow::Result<Output> {
    let exe = env!("CARGO_BIN_EXE_surge");
    tokio::task::spawn_blocking(move || {
        Command::new(exe)
            .args(&args)
            .envs(env)
            .env_remove("SURGE_LOG")
            .output()
    })
    .await
    .context("spawn_blocking join")?
    .context("run surge binary")
}

const SMOKE: &str = r#"
name: smoke
setup:
  url: ${BASE_URL}/health
stages:
  - { duration: 300ms, target: 2 }
  - { duration: 200ms, target: 0 }
pacing: 20ms
gracefulStop: 2s
actions:
  - request:
      url: ${BASE_URL}/api/process
      name: process
      checks:
        - { name: status is 200, status: 200 }
      successMetric: process_success_rate
thresholds:
  http_req_failed: rate<0.01
  process_success_rate: rate>0.99
  "http_req_duration{name:process}": p(95)<2000
"#;

#[test]
fn invalid_flags_exit_30() -> anyhow::Result<()> {
    let exe = env!("CARGO_BIN_EXE_surge");

    let out = Command::new(exe)
        .arg("run")
        .arg("./does-not-matter.yaml")
        .arg("--graceful-stop")
        .arg("10x")
        .output()
        .context("run surge binary")?;

    ensure_code(&out, 30)
}

#[test]
fn missing_scenario_exit_30() -> anyhow::Result<()> {
    let dir = tempfile::tempdir().context("tempdir")?;
    let exe = env!("CARGO_BIN_EXE_surge");

    let out = Command::new(exe)
        .arg("run")
        .arg(dir.path().join("nope.yaml"))
        .output()
        .context("run surge binary")?;

    ensure_code(&out, 30)
}

#[test]
fn unknown_threshold_metric_exit_30() -> anyhow::Result<()> {
    let dir = tempfile::tempdir().context("tempdir")?;
    let path = write_scenario(
        dir.path(),
        "bad.yaml",
        r#"
stages: [{ duration: 1s, target: 1 }]
actions:
  - request: { url: "http://127.0.0.1:1/health" }
thresholds:
  no_such_metric: count>0
"#,
    )?;

    let out = Command::new(env!("CARGO_BIN_EXE_surge"))
        .arg("validate")
        .arg(&path)
        .output()
        .context("run surge binary")?;

    ensure_code(&out, 30)?;
    anyhow::ensure!(
        String::from_utf8_lossy(&out.stderr).contains("no_such_metric"),
        "stderr should name the metric: {}",
        String::from_utf8_lossy(&out.stderr)
    );
    Ok(())
}

#[tokio::test]
async fn validate_exit_0() -> anyhow::Result<()> {
    let dir = tempfile::tempdir().context("tempdir")?;
    let path = write_scenario(dir.path(), "smoke.yaml", SMOKE)?;

    let out = run_surge(
        vec![
            "validate".to_string(),
            path.display().to_string(),
            "--env".to_string(),
            "BASE_URL=http://127.0.0.1:1".to_string(),
        ],
        Vec::new(),
    )
    .await?;

    ensure_code(&out, 0)?;
    anyhow::ensure!(String::from_utf8_lossy(&out.stdout).contains("ok (scenario `smoke`"));
    Ok(())
}

#[tokio::test]
async fn setup_failed_exit_20() -> anyhow::Result<()> {
    let server = TestServer::start().await.context("start test server")?;
    server.state().set_unhealthy(true);

    let dir = tempfile::tempdir().context("tempdir")?;
    let path = write_scenario(dir.path(), "smoke.yaml", SMOKE)?;

    let out = run_surge(
        vec!["run".to_string(), path.display().to_string(), "--quiet".to_string()],
        vec![("BASE_URL".to_string(), server.base_url().to_string())],
    )
    .await?;

    let processed = server.state().process_total();
    server.shutdown().await;

    ensure_code(&out, 20)?;
    anyhow::ensure!(processed == 0, "no load expected after a failed setup");
    Ok(())
}

#[tokio::test]
async fn thresholds_failed_exit_11() -> anyhow::Result<()> {
    let server = TestServer::start().await.context("start test server")?;

    let dir = tempfile::tempdir().context("tempdir")?;
    let path = write_scenario(
        dir.path(),
        "failing.yaml",
        r#"
stages: [{ duration: 300ms, target: 1 }]
pacing: 20ms
actions:
  - request: { url: "${BASE_URL}/status/500", name: broken }
thresholds:
  http_req_failed: rate<0.01
"#,
    )?;

    let out = run_surge(
        vec![
            "run".to_string(),
            path.display().to_string(),
            "--output".to_string(),
            "json".to_string(),
        ],
        vec![("BASE_URL".to_string(), server.base_url().to_string())],
    )
    .await?;

    server.shutdown().await;
    ensure_code(&out, 11)
}

#[tokio::test]
async fn passing_run_exit_0_and_exports_summary() -> anyhow::Result<()> {
    let server = TestServer::start().await.context("start test server")?;

    let dir = tempfile::tempdir().context("tempdir")?;
    let path = write_scenario(dir.path(), "smoke.yaml", SMOKE)?;
    let export = dir.path().join("out/summary.json");

    let out = run_surge(
        vec![
            "run".to_string(),
            path.display().to_string(),
            "--output".to_string(),
            "json".to_string(),
            "--summary-export".to_string(),
            export.display().to_string(),
            "--seed".to_string(),
            "1".to_string(),
            // `--env` wins over the process environment below.
            "--env".to_string(),
            format!("BASE_URL={}", server.base_url()),
        ],
        vec![("BASE_URL".to_string(), "http://127.0.0.1:1".to_string())],
    )
    .await?;

    let processed = server.state().process_total();
    server.shutdown().await;

    ensure_code(&out, 0)?;
    anyhow::ensure!(processed > 0, "expected /api/process traffic");

    let stdout = String::from_utf8_lossy(&out.stdout);
    let last = stdout.lines().last().context("no stdout")?;
    let line: serde_json::Value = serde_json::from_str(last).context("parse summary line")?;
    anyhow::ensure!(line.get("kind").and_then(|v| v.as_str()) == Some("summary"));

    let bytes = std::fs::read(&export).context("read summary export")?;
    let doc: serde_json::Value = serde_json::from_slice(&bytes).context("parse summary export")?;
    anyhow::ensure!(doc.get("passed").and_then(|v| v.as_bool()) == Some(true));
    anyhow::ensure!(
        doc.pointer("/metrics/http_reqs/count")
            .and_then(|v| v.as_u64())
            .is_some_and(|n| n > 0),
        "http_reqs missing from export: {doc}"
    );
    anyhow::ensure!(
        doc.pointer("/thresholds")
            .and_then(|v| v.as_array())
            .is_some_and(|t| t.len() == 3),
        "expected 3 threshold outcomes: {doc}"
    );
    Ok(())
}
