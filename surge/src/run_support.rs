use std::collections::BTreeMap;

use anyhow::Context as _;

use crate::run_error::RunError;

/// Process environment with `--env KEY=VALUE` overrides applied on top.
pub(crate) fn merged_env(overrides: &[String]) -> anyhow::Result<BTreeMap<String, String>> {
    let mut map: BTreeMap<String, String> = std::env::vars().collect();

    for raw in overrides {
        let (k, v) = parse_env_override(raw)?;
        map.insert(k, v);
    }

    Ok(map)
}

fn parse_env_override(s: &str) -> anyhow::Result<(String, String)> {
    let (k, v) = s
        .split_once('=')
        .with_context(|| format!("invalid --env (expected KEY=VALUE): {s}"))?;
    if k.is_empty() {
        anyhow::bail!("invalid --env (empty KEY): {s}");
    }
    Ok((k.to_string(), v.to_string()))
}

pub(crate) fn classify_core_error(err: surge_core::Error) -> RunError {
    let kind = match &err {
        surge_core::Error::Setup(_) => RunError::SetupFailed,
        e if e.is_config() => RunError::InvalidInput,
        _ => RunError::RuntimeError,
    };
    kind(anyhow::Error::new(err))
}
