use std::collections::BTreeMap;

/// Variables visible to `${NAME}` references in a scenario file.
///
/// Lookups try `overrides` (process env plus `--env`) first, then the file's `env` defaults.
pub(crate) struct Vars<'a> {
    overrides: &'a BTreeMap<String, String>,
    defaults: &'a BTreeMap<String, String>,
}

impl<'a> Vars<'a> {
    pub(crate) fn new(
        overrides: &'a BTreeMap<String, String>,
        defaults: &'a BTreeMap<String, String>,
    ) -> Self {
        Self {
            overrides,
            defaults,
        }
    }

    pub(crate) fn get(&self, name: &str) -> Option<&str> {
        self.overrides
            .get(name)
            .or_else(|| self.defaults.get(name))
            .map(String::as_str)
    }

    /// Replace every `${NAME}` in `input`. `$$` is a literal `$`.
    pub(crate) fn expand(&self, input: &str) -> anyhow::Result<String> {
        let mut out = String::with_capacity(input.len());
        let mut rest = input;

        while let Some(pos) = rest.find('$') {
            out.push_str(&rest[..pos]);
            let after = &rest[pos + 1..];

            if let Some(tail) = after.strip_prefix('$') {
                out.push('$');
                rest = tail;
                continue;
            }

            let Some(body) = after.strip_prefix('{') else {
                out.push('$');
                rest = after;
                continue;
            };

            let end = body
                .find('}')
                .ok_or_else(|| anyhow::anyhow!("unterminated `${{` in `{input}`"))?;
            let name = &body[..end];
            if !is_var_name(name) {
                anyhow::bail!("invalid variable name `{name}` in `{input}`");
            }
            let value = self
                .get(name)
                .ok_or_else(|| anyhow::anyhow!("undefined variable `{name}` in `{input}`"))?;
            out.push_str(value);
            rest = &body[end + 1..];
        }

        out.push_str(rest);
        Ok(out)
    }
}

fn is_var_name(name: &str) -> bool {
    !name.is_empty() && name.chars().all(|c| c.is_ascii_alphanumeric() || c == '_')
}

#[cfg(test)]
mod tests {
    use super::*;

    fn map(pairs: &[(&str, &str)]) -> BTreeMap<String, String> {
        pairs
            .iter()
            .map(|(k, v)| ((*k).to_string(), (*v).to_string()))
            .collect()
    }

    #[test]
    fn overrides_win_over_file_defaults() {
        let overrides = map(&[("BASE_URL", "http://staging:8080")]);
        let defaults = map(&[
            ("BASE_URL", "http://localhost:8080"),
            ("SERVICE_A_URL", "http://localhost:8001"),
        ]);
        let vars = Vars::new(&overrides, &defaults);

        let url = vars
            .expand("${BASE_URL}/api/process?upstream=${SERVICE_A_URL}")
            .unwrap_or_else(|e| panic!("{e}"));
        assert_eq!(
            url,
            "http://staging:8080/api/process?upstream=http://localhost:8001"
        );
    }

    #[test]
    fn plain_and_escaped_dollars_are_kept() {
        let empty = BTreeMap::new();
        let vars = Vars::new(&empty, &empty);
        assert_eq!(
            vars.expand("price: $5, literal $${X}").unwrap_or_else(|e| panic!("{e}")),
            "price: $5, literal ${X}"
        );
    }

    #[test]
    fn undefined_or_malformed_references_are_errors() {
        let empty = BTreeMap::new();
        let vars = Vars::new(&empty, &empty);
        assert!(vars.expand("${MISSING}/health").is_err());
        assert!(vars.expand("${BASE_URL/health").is_err());
        assert!(vars.expand("${}").is_err());
        assert!(vars.expand("${BAD-NAME}").is_err());
    }
}
