/// Capacity with three significant digits in SI units: "500 GB", "1.00 TB".
pub fn fmt_capacity(bytes: u64) -> String {
    const UNITS: [&str; 7] = ["B", "kB", "MB", "GB", "TB", "PB", "EB"];
    let mut v = bytes as f64;
    let mut i = 0;
    while v >= 1000.0 && i < UNITS.len() - 1 {
        v /= 1000.0;
        i += 1;
    }
    if i == 0 {
        return format!("{} B", bytes);
    }
    if v >= 100.0      { format!("{:.0} {}", v, UNITS[i]) }
    else if v >= 10.0  { format!("{:.1} {}", v, UNITS[i]) }
    else               { format!("{:.2} {}", v, UNITS[i]) }
}

/// Digits grouped by thousands: "500,107,862,016"
pub fn fmt_thousands(n: u64) -> String {
    let digits = n.to_string();
    let mut out = String::with_capacity(digits.len() + digits.len() / 3);
    for (i, c) in digits.chars().enumerate() {
        if i > 0 && (digits.len() - i) % 3 == 0 {
            out.push(',');
        }
        out.push(c);
    }
    out
}

/// Age of an epoch timestamp relative to `now`: "3d 4h", "12m"
pub fn fmt_age(then: i64, now: i64) -> String {
    let secs = (now - then).max(0);
    let (d, h, m) = (secs / 86_400, (secs % 86_400) / 3600, (secs % 3600) / 60);
    if d > 0      { format!("{}d {}h", d, h) }
    else if h > 0 { format!("{}h {}m", h, m) }
    else          { format!("{}m", m) }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn capacity_significant_digits() {
        assert_eq!(fmt_capacity(512), "512 B");
        assert_eq!(fmt_capacity(500_107_862_016), "500 GB");
        assert_eq!(fmt_capacity(80_026_361_856), "80.0 GB");
        assert_eq!(fmt_capacity(1_000_204_886_016), "1.00 TB");
    }

    #[test]
    fn thousands_grouping() {
        assert_eq!(fmt_thousands(0), "0");
        assert_eq!(fmt_thousands(999), "999");
        assert_eq!(fmt_thousands(1000), "1,000");
        assert_eq!(fmt_thousands(500_107_862_016), "500,107,862,016");
    }

    #[test]
    fn age_units() {
        assert_eq!(fmt_age(0, 59), "0m");
        assert_eq!(fmt_age(0, 3 * 3600 + 120), "3h 2m");
        assert_eq!(fmt_age(0, 2 * 86_400 + 3600), "2d 1h");
        assert_eq!(fmt_age(100, 0), "0m");
    }
}
