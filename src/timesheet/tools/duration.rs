//! Conversion between free-form duration cells and canonical minutes.
//!
//! Exports encode the same quantity in several ways: `"2:30"`, `"2.5"`, `"2"`.
//! Every encoding is normalised to an integer minute count before any
//! arithmetic happens, and totals are rendered back as `"{H}h {M}m"`.

/// Parses a raw duration cell into canonical minutes.
///
/// The function is total: anything it does not recognise counts as zero so a
/// single malformed cell cannot abort an aggregation.
///
/// * `"H:M"` is hours and minutes.
/// * `"H.F"` is decimal hours; the fraction is converted to minutes rounding
///   half-up (`"1.5"` is 90, `"7.25"` is 435).
/// * any other number, including exponent forms such as `"1e1"`, is hours
///   truncated to a whole hour.
///
/// Values whose minute count does not fit in an `i64` also count as zero.
pub fn parse_duration(raw: &str) -> i64 {
    let value = raw.trim().to_lowercase();
    if value.is_empty() {
        return 0;
    }

    let parsed = if value.contains(':') {
        parse_clock(&value)
    } else if value.contains('.') {
        parse_decimal_hours(&value)
    } else {
        parse_whole_hours(&value)
    };

    parsed.unwrap_or(0)
}

/// Renders canonical minutes as `"{H}h {M}m"`.
pub fn format_duration(minutes: i64) -> String {
    let minutes = minutes.max(0);
    format!("{}h {}m", minutes / 60, minutes % 60)
}

fn parse_clock(value: &str) -> Option<i64> {
    let mut parts = value.split(':');
    let hours = parts.next()?.trim().parse::<i64>().ok()?;
    let minutes = parts.next()?.trim().parse::<i64>().ok()?;
    if parts.next().is_some() {
        return None;
    }
    hours.checked_mul(60)?.checked_add(minutes)
}

fn parse_whole_hours(value: &str) -> Option<i64> {
    let hours = match value.parse::<i64>() {
        Ok(hours) => hours,
        Err(_) => {
            let hours = value.parse::<f64>().ok().filter(|hours| hours.is_finite())?;
            // `as` saturates, so huge values overflow in checked_mul below.
            hours.trunc() as i64
        }
    };
    hours.checked_mul(60)
}

fn parse_decimal_hours(value: &str) -> Option<i64> {
    let (whole, fraction) = value.split_once('.')?;
    let hours = if whole.is_empty() {
        0
    } else {
        whole.parse::<i64>().ok()?
    };
    if fraction.is_empty() || !fraction.chars().all(|ch| ch.is_ascii_digit()) {
        return None;
    }

    let fraction: f64 = format!("0.{fraction}").parse().ok()?;
    // f64::round rounds half away from zero, which is half-up for a
    // non-negative fraction.
    let minutes = (fraction * 60.0).round() as i64;
    let signed = if whole.starts_with('-') { -minutes } else { minutes };
    hours.checked_mul(60)?.checked_add(signed)
}
