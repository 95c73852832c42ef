use std::fmt;

use crate::error::{Error, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ThresholdOp {
    Lt,
    Lte,
    Gt,
    Gte,
    Eq,
    NotEq,
}

impl ThresholdOp {
    pub fn compare(self, observed: f64, expected: f64) -> bool {
        match self {
            Self::Lt => observed < expected,
            Self::Lte => observed <= expected,
            Self::Gt => observed > expected,
            Self::Gte => observed >= expected,
            Self::Eq => observed == expected,
            Self::NotEq => observed != expected,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ThresholdAgg {
    Avg,
    Min,
    Max,
    Med,
    Count,
    Rate,
    /// Current value of a gauge.
    Value,
    /// Percentile in `0..=100`, fractional values allowed (`p(99.9)`).
    P(f64),
}

impl fmt::Display for ThresholdAgg {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Avg => f.write_str("avg"),
            Self::Min => f.write_str("min"),
            Self::Max => f.write_str("max"),
            Self::Med => f.write_str("med"),
            Self::Count => f.write_str("count"),
            Self::Rate => f.write_str("rate"),
            Self::Value => f.write_str("value"),
            Self::P(p) => write!(f, "p({p})"),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ThresholdExpr {
    pub agg: ThresholdAgg,
    pub op: ThresholdOp,
    pub value: f64,
}

pub fn parse_threshold_expr(raw: &str) -> std::result::Result<ThresholdExpr, String> {
    let s: String = raw.chars().filter(|c| !c.is_whitespace()).collect();
    if s.is_empty() {
        return Err("empty threshold".to_string());
    }

    let ops = [
        ("<=", ThresholdOp::Lte),
        (">=", ThresholdOp::Gte),
        ("==", ThresholdOp::Eq),
        ("!=", ThresholdOp::NotEq),
        ("<", ThresholdOp::Lt),
        (">", ThresholdOp::Gt),
    ];
    let (op_pos, op_len, op) = ops
        .iter()
        .find_map(|(tok, op)| s.find(tok).map(|pos| (pos, tok.len(), *op)))
        .ok_or_else(|| "missing operator (expected one of <, <=, >, >=, ==, !=)".to_string())?;

    let (left, right_with_op) = s.split_at(op_pos);
    let right = &right_with_op[op_len..];
    if left.is_empty() {
        return Err("missing aggregate before the operator".to_string());
    }
    if right.is_empty() {
        return Err("missing value after the operator".to_string());
    }

    let agg = match left.to_ascii_lowercase().as_str() {
        "avg" => ThresholdAgg::Avg,
        "min" => ThresholdAgg::Min,
        "max" => ThresholdAgg::Max,
        "med" => ThresholdAgg::Med,
        "count" => ThresholdAgg::Count,
        "rate" => ThresholdAgg::Rate,
        "value" => ThresholdAgg::Value,
        other => {
            let Some(inner) = other.strip_prefix("p(").and_then(|v| v.strip_suffix(')')) else {
                return Err(format!("unknown aggregate `{left}`"));
            };
            let p: f64 = inner
                .parse()
                .map_err(|_| format!("invalid percentile `{inner}`"))?;
            if !(0.0..=100.0).contains(&p) {
                return Err(format!("percentile {p} out of range 0..=100"));
            }
            ThresholdAgg::P(p)
        }
    };

    let value: f64 = right
        .parse()
        .map_err(|_| format!("invalid numeric value `{right}`"))?;
    if !value.is_finite() {
        return Err(format!("invalid numeric value `{right}`"));
    }

    Ok(ThresholdExpr { agg, op, value })
}

/// `name` or `name{key:value,...}`. Values may be quoted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MetricSelector {
    pub metric: String,
    pub tags: Vec<(String, String)>,
}

impl MetricSelector {
    pub fn parse(raw: &str) -> std::result::Result<Self, String> {
        let raw = raw.trim();
        let (metric, filter) = match raw.find('{') {
            Some(open) => {
                let Some(body) = raw[open + 1..].strip_suffix('}') else {
                    return Err("unterminated tag filter, expected `}`".to_string());
                };
                (raw[..open].trim(), Some(body))
            }
            None => (raw, None),
        };

        if metric.is_empty() {
            return Err("missing metric name".to_string());
        }
        if !metric
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '.')
        {
            return Err(format!("invalid metric name `{metric}`"));
        }

        let mut tags = Vec::new();
        if let Some(body) = filter {
            for pair in body.split(',').map(str::trim).filter(|p| !p.is_empty()) {
                let Some((k, v)) = pair.split_once(':') else {
                    return Err(format!("invalid tag filter `{pair}`, expected key:value"));
                };
                let k = unquote(k.trim());
                let v = unquote(v.trim());
                if k.is_empty() {
                    return Err(format!("empty tag key in `{pair}`"));
                }
                tags.push((k.to_string(), v.to_string()));
            }
        }

        Ok(Self {
            metric: metric.to_string(),
            tags,
        })
    }
}

impl fmt::Display for MetricSelector {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.metric)?;
        if self.tags.is_empty() {
            return Ok(());
        }
        f.write_str("{")?;
        for (i, (k, v)) in self.tags.iter().enumerate() {
            if i > 0 {
                f.write_str(",")?;
            }
            write!(f, "{k}:{v}")?;
        }
        f.write_str("}")
    }
}

fn unquote(s: &str) -> &str {
    for q in ['"', '\''] {
        if let Some(inner) = s.strip_prefix(q).and_then(|v| v.strip_suffix(q)) {
            return inner;
        }
    }
    s
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, strum::Display)]
#[strum(serialize_all = "lowercase")]
pub enum Evaluation {
    /// Only at run end.
    Final,
    /// Periodically during the run as well as at run end.
    Continuous,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ThresholdDef {
    /// Source text, as written by the user.
    pub expression: String,
    pub parsed: ThresholdExpr,
    pub evaluation: Evaluation,
}

/// All thresholds declared for one selector.
#[derive(Debug, Clone, PartialEq)]
pub struct ThresholdSet {
    /// Source text of the selector.
    pub selector: String,
    pub metric: MetricSelector,
    pub thresholds: Vec<ThresholdDef>,
}

impl ThresholdSet {
    pub fn parse<I, S>(selector: &str, expressions: I) -> Result<Self>
    where
        I: IntoIterator<Item = (S, Evaluation)>,
        S: Into<String>,
    {
        let metric = MetricSelector::parse(selector).map_err(|reason| Error::Threshold {
            selector: selector.to_string(),
            expression: String::new(),
            reason,
        })?;

        let mut thresholds = Vec::new();
        for (expression, evaluation) in expressions {
            let expression = expression.into();
            let parsed = parse_threshold_expr(&expression).map_err(|reason| Error::Threshold {
                selector: selector.to_string(),
                expression: expression.clone(),
                reason,
            })?;
            thresholds.push(ThresholdDef {
                expression,
                parsed,
                evaluation,
            });
        }
        if thresholds.is_empty() {
            return Err(Error::Threshold {
                selector: selector.to_string(),
                expression: String::new(),
                reason: "no threshold expressions".to_string(),
            });
        }

        Ok(Self {
            selector: selector.trim().to_string(),
            metric,
            thresholds,
        })
    }

    /// Shorthand for final-only thresholds.
    pub fn final_only<S: Into<String>>(
        selector: &str,
        expressions: impl IntoIterator<Item = S>,
    ) -> Result<Self> {
        Self::parse(
            selector,
            expressions.into_iter().map(|e| (e, Evaluation::Final)),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_threshold_expr_trims_whitespace() {
        let expr = parse_threshold_expr("  avg  <=  123  ").unwrap_or_else(|e| panic!("{e}"));
        assert_eq!(expr.agg, ThresholdAgg::Avg);
        assert_eq!(expr.op, ThresholdOp::Lte);
        assert_eq!(expr.value, 123.0);
    }

    #[test]
    fn parse_threshold_expr_accepts_all_aggregates() {
        let cases = [
            ("p(95)<2000", ThresholdAgg::P(95.0), ThresholdOp::Lt, 2000.0),
            ("p(99.9)>=1", ThresholdAgg::P(99.9), ThresholdOp::Gte, 1.0),
            ("rate<0.1", ThresholdAgg::Rate, ThresholdOp::Lt, 0.1),
            ("count>0", ThresholdAgg::Count, ThresholdOp::Gt, 0.0),
            ("med!=0", ThresholdAgg::Med, ThresholdOp::NotEq, 0.0),
            ("MAX==5", ThresholdAgg::Max, ThresholdOp::Eq, 5.0),
            ("value<=50", ThresholdAgg::Value, ThresholdOp::Lte, 50.0),
        ];
        for (raw, agg, op, value) in cases {
            let expr = parse_threshold_expr(raw).unwrap_or_else(|e| panic!("{raw}: {e}"));
            assert_eq!(expr, ThresholdExpr { agg, op, value }, "{raw}");
        }
    }

    #[test]
    fn parse_threshold_expr_rejects_malformed_input() {
        for raw in ["", "p(101)<1", "p(x)<1", "avg 5", "<5", "avg<", "mean<5", "avg<abc"] {
            assert!(parse_threshold_expr(raw).is_err(), "{raw:?} should fail");
        }
    }

    #[test]
    fn selector_with_tag_filter() {
        let sel = MetricSelector::parse("http_req_duration{name:process, method:'POST'}")
            .unwrap_or_else(|e| panic!("{e}"));
        assert_eq!(sel.metric, "http_req_duration");
        assert_eq!(
            sel.tags,
            vec![
                ("name".to_string(), "process".to_string()),
                ("method".to_string(), "POST".to_string()),
            ]
        );
        assert_eq!(sel.to_string(), "http_req_duration{name:process,method:POST}");

        let plain = MetricSelector::parse("checks").unwrap_or_else(|e| panic!("{e}"));
        assert!(plain.tags.is_empty());
    }

    #[test]
    fn selector_rejects_malformed_filters() {
        for raw in ["", "{name:x}", "m{name:x", "m{name}", "bad name"] {
            assert!(MetricSelector::parse(raw).is_err(), "{raw:?} should fail");
        }
    }

    #[test]
    fn set_errors_carry_selector_and_expression() {
        let err = match ThresholdSet::final_only("http_req_failed", ["rate<0.1", "rate<<"]) {
            Ok(_) => panic!("expected error"),
            Err(e) => e,
        };
        assert!(err.is_config());
        match err {
            Error::Threshold {
                selector,
                expression,
                ..
            } => {
                assert_eq!(selector, "http_req_failed");
                assert_eq!(expression, "rate<<");
            }
            other => panic!("unexpected error {other:?}"),
        }
    }
}
