use std::time::Duration;

/// Single rounded component in one of: ms, s, m. Keeps progress lines short.
pub(crate) fn format_duration(d: Duration) -> String {
    const MS_PER_S: u128 = 1_000;
    const MS_PER_M: u128 = 60_000;

    fn round_div(value: u128, unit: u128) -> u128 {
        (value + (unit / 2)) / unit
    }

    let total_ms = d.as_millis();
    if total_ms >= 10 * MS_PER_M {
        return format!("{}m", round_div(total_ms, MS_PER_M));
    }
    if total_ms >= MS_PER_S {
        return format!("{}s", round_div(total_ms, MS_PER_S));
    }
    format!("{total_ms}ms")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rounds_to_one_unit() {
        assert_eq!(format_duration(Duration::from_millis(250)), "250ms");
        assert_eq!(format_duration(Duration::from_millis(1_499)), "1s");
        assert_eq!(format_duration(Duration::from_millis(1_500)), "2s");
        assert_eq!(format_duration(Duration::from_secs(190)), "190s");
        assert_eq!(format_duration(Duration::from_secs(45 * 60 + 20)), "45m");
    }
}
