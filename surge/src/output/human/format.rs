pub(crate) fn format_bytes(b: u64) -> String {
    const KIB: u64 = 1024;
    const MIB: u64 = 1024 * 1024;
    const GIB: u64 = 1024 * 1024 * 1024;

    if b >= GIB {
        return format!("{:.2}GiB", (b as f64) / (GIB as f64));
    }
    if b >= MIB {
        return format!("{:.2}MiB", (b as f64) / (MIB as f64));
    }
    if b >= KIB {
        return format!("{:.2}KiB", (b as f64) / (KIB as f64));
    }

    format!("{b}B")
}

pub(crate) fn format_rate(v: f64) -> String {
    if v.is_finite() {
        format!("{v:.0}")
    } else {
        "0".to_string()
    }
}

/// Latencies are recorded in milliseconds.
pub(crate) fn format_millis_opt(ms: Option<f64>) -> String {
    match ms {
        None => "-".to_string(),
        Some(v) if !v.is_finite() => "-".to_string(),
        Some(v) if v < 1.0 => format!("{:.0}us", v * 1000.0),
        Some(v) if v < 1000.0 => format!("{v:.2}ms"),
        Some(v) => format!("{:.2}s", v / 1000.0),
    }
}

pub(crate) fn format_observed(v: Option<f64>) -> String {
    match v {
        None => "-".to_string(),
        Some(v) if v.fract() == 0.0 && v.abs() < 1e15 => format!("{v:.0}"),
        Some(v) => format!("{v:.4}"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bytes_use_binary_units() {
        assert_eq!(format_bytes(512), "512B");
        assert_eq!(format_bytes(2048), "2.00KiB");
        assert_eq!(format_bytes(3 * 1024 * 1024), "3.00MiB");
    }

    #[test]
    fn millis_pick_a_readable_unit() {
        assert_eq!(format_millis_opt(None), "-");
        assert_eq!(format_millis_opt(Some(0.25)), "250us");
        assert_eq!(format_millis_opt(Some(12.3456)), "12.35ms");
        assert_eq!(format_millis_opt(Some(2500.0)), "2.50s");
    }

    #[test]
    fn observed_values_drop_trailing_zeros_for_integers() {
        assert_eq!(format_observed(Some(40.0)), "40");
        assert_eq!(format_observed(Some(0.005)), "0.0050");
        assert_eq!(format_observed(None), "-");
    }
}
