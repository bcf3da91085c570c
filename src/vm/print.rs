//! Number and string print formatting: scaled/unscaled notation, the
//! comma-zone and TAB column logic, and margin wrapping. Transcribed from
//! `vm.c`'s `sprint_num`/`explore_number`/`print_*_op` family.

use crate::PRINT_PRECISION_DIGITS;

/// Column width of one `PRINT` comma zone, and the number of zones per
/// line before wrapping.
pub const PRINT_COLUMN_INC: usize = 16;
pub const NPRINT_COLUMNS: usize = 5;
pub const PRINT_MARGIN: usize = 80;

/// Formats one number exactly as `PRINT` would lay it out: `" 0 "` for
/// zero, `" INF "`/`"-INF "`/`" NAN "` for the non-finite cases, unscaled
/// (`-d.dddddddd `) notation when the exponent keeps the string within
/// [`PRINT_PRECISION_DIGITS`] significant digits, and scaled
/// (`-d.dddddddE+dd `) notation otherwise.
pub fn sprint_num(d: f64) -> String {
    if d.is_infinite() {
        return if d > 0.0 { " INF ".to_string() } else { "-INF ".to_string() };
    }
    if d.is_nan() {
        return " NAN ".to_string();
    }

    let sci = format_scientific(d);
    let (zero, after, exponent) = explore_number(&sci);
    if zero {
        return " 0 ".to_string();
    }
    let digits = PRINT_PRECISION_DIGITS as i32;
    if (exponent < 0 && after as i32 - exponent <= digits) || (exponent >= 0 && 1 + exponent <= digits) {
        sprint_unscaled(d, after, exponent)
    } else {
        format!("{} ", remove_zeros_from_scaled(&sci))
    }
}

/// `% .*E`-style formatting at [`PRINT_PRECISION_DIGITS`] significant
/// digits: leading space for non-negative, a sign for negative, one
/// mantissa digit, a decimal point, `PRINT_PRECISION_DIGITS - 1` digits,
/// `E`, a sign, and at least 2 exponent digits.
fn format_scientific(d: f64) -> String {
    let s = format!("{:.*E}", PRINT_PRECISION_DIGITS as usize - 1, d);
    // Rust renders e.g. "1.23456E2"; expand to the C-style "+" sign and
    // 2-digit minimum exponent width, with a leading space for d >= 0.
    let (mantissa, exp) = s.split_once('E').unwrap_or((&s, "0"));
    let exp_val: i32 = exp.parse().unwrap_or(0);
    let sign = if exp_val < 0 { "-" } else { "+" };
    let lead = if d < 0.0 { "" } else { " " };
    format!("{}{}E{}{:02}", lead, mantissa, sign, exp_val.abs())
}

fn explore_number(num: &str) -> (bool, i32, i32) {
    let bytes = num.as_bytes();
    let zero = bytes[1] == b'0';
    let e_pos = num.find('E').unwrap();
    let mantissa = &num[1..e_pos];
    let trimmed = mantissa.trim_end_matches('0');
    let dot = trimmed.find('.').unwrap_or(trimmed.len());
    let after = (trimmed.len() as i32 - dot as i32 - 1).max(0);
    let exponent: i32 = num[e_pos + 1..].parse().unwrap_or(0);
    (zero, after, exponent)
}

fn sprint_unscaled(d: f64, after: i32, exponent: i32) -> String {
    let mut after = after - exponent;
    if after < 0 {
        after = 0;
    }
    let s = format!("{:.*}", after as usize, d);
    let s = if s.starts_with("0.") {
        s[1..].to_string()
    } else if s.starts_with("-0.") {
        format!("-{}", &s[2..])
    } else {
        s
    };
    let lead = if d < 0.0 { "" } else { " " };
    format!("{}{} ", lead, s)
}

/// Trims trailing zeros from the mantissa's decimal part and leading
/// zeros from the exponent of a [`format_scientific`]-formatted number.
fn remove_zeros_from_scaled(num: &str) -> String {
    let e_pos = num.find('E').unwrap();
    let mantissa = num[..e_pos].trim_end_matches('0');
    let mantissa = mantissa.trim_end_matches('.');
    let (sign, digits) = match &num[e_pos + 1..e_pos + 2] {
        "-" => ("-", &num[e_pos + 2..]),
        _ => ("+", &num[e_pos + 2..]),
    };
    let digits = digits.trim_start_matches('0');
    let digits = if digits.is_empty() { "0" } else { digits };
    format!("{}E{}{}", mantissa, sign, digits)
}

/// `PRINT a, b`: advance to the next comma zone, wrapping to a new line
/// after `NPRINT_COLUMNS` zones.
pub fn comma_advance(column: usize) -> (usize, bool) {
    let n = PRINT_COLUMN_INC - (column % PRINT_COLUMN_INC);
    let new_col = column + n;
    if new_col >= NPRINT_COLUMNS * PRINT_COLUMN_INC {
        (0, true)
    } else {
        (new_col, false)
    }
}

/// `PRINT TAB(n)`: the target column (0-based, wrapped modulo the
/// margin), clamped up to 1 when `n <= 0` (with the caller responsible
/// for the `INVAL_TAB` warning in that case).
pub fn tab_target_column(n: i32) -> usize {
    let n = if n <= 0 { 1 } else { n };
    let mut col = (n - 1) as usize;
    if col >= PRINT_MARGIN {
        col %= PRINT_MARGIN;
    }
    col
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn zero_prints_as_bare_zero() {
        assert_eq!(sprint_num(0.0), " 0 ");
    }

    #[test]
    fn small_integer_uses_unscaled_notation() {
        assert_eq!(sprint_num(3.0), " 3 ");
    }

    #[test]
    fn negative_integer_keeps_sign() {
        assert_eq!(sprint_num(-3.0), "-3 ");
    }

    #[test]
    fn seven_digit_integer_prints_unscaled_at_eight_digit_precision() {
        assert_eq!(sprint_num(1234567.0), " 1234567 ");
    }

    #[test]
    fn fraction_drops_the_leading_zero_but_keeps_the_lead_space() {
        assert_eq!(sprint_num(0.5), " .5 ");
        assert_eq!(sprint_num(-0.5), "-.5 ");
    }

    #[test]
    fn large_number_uses_scaled_notation() {
        let s = sprint_num(1.0e20);
        assert!(s.contains('E'), "expected scaled notation, got {:?}", s);
    }

    #[test]
    fn infinities_and_nan() {
        assert_eq!(sprint_num(f64::INFINITY), " INF ");
        assert_eq!(sprint_num(f64::NEG_INFINITY), "-INF ");
        assert_eq!(sprint_num(f64::NAN), " NAN ");
    }

    #[test]
    fn comma_wraps_after_five_zones() {
        let mut col = 0;
        let mut wrapped = false;
        for _ in 0..NPRINT_COLUMNS {
            let (c, w) = comma_advance(col);
            col = c;
            wrapped = w;
        }
        assert!(wrapped);
    }

    #[test]
    fn tab_non_positive_clamps_to_column_zero() {
        assert_eq!(tab_target_column(0), 0);
        assert_eq!(tab_target_column(-5), 0);
    }

    #[test]
    fn tab_wraps_past_margin() {
        assert_eq!(tab_target_column(PRINT_MARGIN as i32 + 5), 4);
    }
}
