use std::sync::Arc;

/// Tags every sample of a scenario carries: `scenario`, the optional `group` and
/// scenario-level tags.
#[derive(Debug, Clone)]
pub struct MetricsContext {
    scenario: Arc<str>,
    scenario_tags: Arc<[(String, String)]>,
    group: Option<Arc<str>>,
}

impl MetricsContext {
    #[must_use]
    pub fn new(scenario: Arc<str>, scenario_tags: Arc<[(String, String)]>) -> Self {
        Self {
            scenario,
            scenario_tags,
            group: None,
        }
    }

    #[must_use]
    pub fn scenario(&self) -> &str {
        self.scenario.as_ref()
    }

    #[must_use]
    pub fn group(&self) -> Option<&str> {
        self.group.as_deref()
    }

    /// Context for a nested group. Nested names are joined with `::`.
    #[must_use]
    pub fn with_group(&self, name: &str) -> Self {
        let group: Arc<str> = match &self.group {
            Some(parent) => Arc::from(format!("{parent}::{name}")),
            None => Arc::from(name),
        };
        Self {
            scenario: self.scenario.clone(),
            scenario_tags: self.scenario_tags.clone(),
            group: Some(group),
        }
    }

    /// Base tags for a sample. Scenario-level tags never override `scenario`/`group`
    /// or any key listed in `reserved_keys`.
    #[must_use]
    pub fn base_tags(&self, reserved_keys: &[&str]) -> Vec<(&str, &str)> {
        let mut out: Vec<(&str, &str)> = Vec::with_capacity(self.scenario_tags.len() + 2);
        for (k, v) in self.scenario_tags.iter() {
            if matches!(k.as_str(), "scenario" | "group") || reserved_keys.contains(&k.as_str()) {
                continue;
            }
            out.push((k.as_str(), v.as_str()));
        }
        out.push(("scenario", self.scenario()));
        if let Some(group) = self.group() {
            out.push(("group", group));
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn base_tags_skip_reserved_scenario_keys() {
        let ctx = MetricsContext::new(
            Arc::from("load"),
            Arc::from(vec![
                ("env".to_string(), "staging".to_string()),
                ("scenario".to_string(), "spoofed".to_string()),
                ("status".to_string(), "x".to_string()),
            ]),
        );

        let tags = ctx.base_tags(&["status"]);
        assert_eq!(tags, vec![("env", "staging"), ("scenario", "load")]);
    }

    #[test]
    fn nested_groups_join_names() {
        let ctx = MetricsContext::new(Arc::from("load"), Arc::from(Vec::new()));
        let nested = ctx.with_group("checkout").with_group("pay");
        assert_eq!(nested.group(), Some("checkout::pay"));
        assert!(nested.base_tags(&[]).contains(&("group", "checkout::pay")));
        assert_eq!(ctx.group(), None);
    }
}
