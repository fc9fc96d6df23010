// =============================================================================
// Fixed-precision decimal helpers
// =============================================================================
//
// Spec mandates 4-dp quantities and 2-dp EUR amounts everywhere; floating
// point is reserved for display-only percentages. All persisted decimals
// round-trip as strings (`Decimal`'s `Display`/`FromStr` already do this).
// =============================================================================

use rust_decimal::Decimal;

pub const EUR_DP: u32 = 2;
pub const QTY_DP: u32 = 4;

pub fn quantize_eur(d: Decimal) -> Decimal {
    d.round_dp(EUR_DP)
}

pub fn quantize_qty(d: Decimal) -> Decimal {
    d.round_dp(QTY_DP)
}

/// Parse a European-formatted decimal token: optional sign, digits, and an
/// optional `,` or `.` fractional separator (`validator.py::parse_number`).
pub fn parse_eu_decimal(token: &str) -> Option<Decimal> {
    let t = token.trim().replace(' ', "");
    if t.is_empty() {
        return None;
    }
    let (sign, rest) = match t.strip_prefix('-') {
        Some(r) => (-1, r),
        None => (1, t.strip_prefix('+').unwrap_or(&t)),
    };
    if rest.is_empty() || !rest.chars().all(|c| c.is_ascii_digit() || c == ',' || c == '.') {
        return None;
    }
    let normalized = rest.replacen(',', ".", 1);
    if normalized.matches('.').count() > 1 {
        return None;
    }
    let parsed: Decimal = normalized.parse().ok()?;
    Some(if sign < 0 { -parsed } else { parsed })
}

/// Parse a percent token, with an optional trailing `%`.
pub fn parse_eu_percent(token: &str) -> Option<Decimal> {
    let t = token.trim().trim_end_matches('%');
    parse_eu_decimal(t)
}

/// Format a decimal percent with a leading sign, one decimal place, used by
/// `/price` and benchmark rendering (`format_signed_percent` in the router's
/// formatting service).
pub fn format_signed_percent(pct: Option<f64>, default: &str) -> String {
    match pct {
        Some(p) => format!("{p:+.1}%"),
        None => default.to_string(),
    }
}

/// Strip trailing zeroes from a fixed-precision display string, used by the
/// `/fx` rate render (precision 4, trailing zero strip per spec §4.5).
pub fn strip_trailing_zeros(s: &str) -> String {
    if !s.contains('.') {
        return s.to_string();
    }
    let trimmed = s.trim_end_matches('0');
    trimmed.trim_end_matches('.').to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn parses_comma_decimal() {
        assert_eq!(parse_eu_decimal("1,5"), Some(dec!(1.5)));
    }

    #[test]
    fn parses_dot_decimal() {
        assert_eq!(parse_eu_decimal("-2.25"), Some(dec!(-2.25)));
    }

    #[test]
    fn rejects_garbage() {
        assert_eq!(parse_eu_decimal("abc"), None);
        assert_eq!(parse_eu_decimal("1,2,3"), None);
    }

    #[test]
    fn percent_strips_sign() {
        assert_eq!(parse_eu_percent("+12,3%"), Some(dec!(12.3)));
    }

    #[test]
    fn strips_zeros() {
        assert_eq!(strip_trailing_zeros("0.5000"), "0.5");
        assert_eq!(strip_trailing_zeros("2.0000"), "2");
        assert_eq!(strip_trailing_zeros("2"), "2");
    }
}
