//! Parses a single DATA/INPUT datum: integer, real, quoted string,
//! unquoted string, comma, EOF, or invalid character. Transcribed from
//! `datalex.c`.

use crate::{PRECISION_DIGITS, READ_PRECISION_DIGITS};

#[derive(Clone, Copy, Eq, PartialEq, Debug)]
pub enum NumType {
    None,
    Int,
    Float,
}

/// What was found, with how many bytes of the input it consumed.
#[derive(Clone, Debug, Eq, PartialEq)]
pub enum Elem<'a> {
    Eof,
    Comma,
    QuotedStr { text: &'a str, terminated: bool },
    UnquotedStr { text: &'a str },
    Num { value: NumBits },
    InvalChar(u8),
}

/// A parsed number's bit pattern, since `f64` is not `Eq`/`Hash` and our
/// tests want to compare parsed results exactly.
#[derive(Clone, Copy, Debug)]
pub struct NumBits(pub f64);

impl PartialEq for NumBits {
    fn eq(&self, other: &Self) -> bool {
        self.0.to_bits() == other.0.to_bits() || (self.0 == other.0)
    }
}
impl Eq for NumBits {}

/// Whether a numeric-looking token should instead be returned as an
/// unquoted string (used when the accepting variable is string-typed).
#[derive(Clone, Copy, Eq, PartialEq, Debug)]
pub enum ParseAs {
    AsIs,
    AsUnquotedStr,
}

fn is_unquoted_str_char(c: u8) -> bool {
    c.is_ascii_uppercase() || c.is_ascii_digit() || matches!(c, b' ' | b'+' | b'-' | b'.')
}

fn check_if_number_suffix(bytes: &[u8], mut i: usize, mut t: NumType) -> NumType {
    while i < bytes.len() && bytes[i].is_ascii_digit() {
        i += 1;
    }
    if i < bytes.len() && bytes[i] == b'E' {
        let mut j = i + 1;
        if j < bytes.len() && (bytes[j] == b'-' || bytes[j] == b'+') {
            j += 1;
        }
        if j < bytes.len() && bytes[j].is_ascii_digit() {
            t = NumType::Float;
        }
    }
    t
}

/// Whether `bytes` starting at `0` looks like a number, per BASIC's
/// restricted numeric-literal grammar (no hex/octal, unlike `strtod`).
pub fn check_if_number(bytes: &[u8]) -> NumType {
    let mut i = 0;
    let mut t = NumType::None;
    if i < bytes.len() && (bytes[i] == b'+' || bytes[i] == b'-') {
        i += 1;
    }
    if i < bytes.len() && bytes[i].is_ascii_digit() {
        t = NumType::Int;
        while i < bytes.len() && bytes[i].is_ascii_digit() {
            i += 1;
        }
        if i < bytes.len() && bytes[i] == b'.' {
            t = NumType::Float;
            i += 1;
        }
        t = check_if_number_suffix(bytes, i, t);
    } else if i < bytes.len() && bytes[i] == b'.' {
        i += 1;
        if i < bytes.len() && bytes[i].is_ascii_digit() {
            t = check_if_number_suffix(bytes, i, NumType::Float);
        }
    }
    t
}

/// Parses a floating point number per ECMA-55's digit-counting rule: only
/// the first `sig_digits` significant digits feed the mantissa; remaining
/// integer-part digits each bump the decimal exponent, and the digit
/// immediately after the cutoff rounds the mantissa up (round-half-up, not
/// banker's rounding), exactly as `strtod55` does.
fn strtod_n(s: &str, sig_digits: u32) -> (f64, usize) {
    let bytes = s.as_bytes();
    let mut p = 0usize;
    while p < bytes.len() && bytes[p].is_ascii_whitespace() {
        p += 1;
    }

    let mut sign = 1.0f64;
    if p < bytes.len() && bytes[p] == b'+' {
        p += 1;
    } else if p < bytes.len() && bytes[p] == b'-' {
        sign = -1.0;
        p += 1;
    }

    if p >= bytes.len() || !(bytes[p].is_ascii_digit() || bytes[p] == b'.') {
        return (0.0, 0);
    }

    let sdigits = sig_digits as i32;
    let mut bp = false;
    let mut num: i64 = 0;
    let mut d = 0i32;
    let mut ap = false;
    let mut ed = 0i32;

    if p < bytes.len() && bytes[p].is_ascii_digit() {
        bp = true;
    }
    while p < bytes.len() && bytes[p] == b'0' {
        p += 1;
    }
    while p < bytes.len() && bytes[p].is_ascii_digit() {
        if d < sdigits {
            num = num * 10 + (bytes[p] - b'0') as i64;
            d += 1;
        } else if d == sdigits {
            if bytes[p] >= b'5' {
                num += 1;
            }
            d += 1;
            ed += 1;
        } else {
            ed += 1;
        }
        p += 1;
    }
    if p < bytes.len() && bytes[p] == b'.' {
        p += 1;
        if p < bytes.len() && bytes[p].is_ascii_digit() {
            ap = true;
        }
        if num == 0 {
            while p < bytes.len() && bytes[p] == b'0' {
                ed -= 1;
                p += 1;
            }
        }
        while p < bytes.len() && bytes[p].is_ascii_digit() {
            if d < sdigits {
                num = num * 10 + (bytes[p] - b'0') as i64;
                d += 1;
                ed -= 1;
            } else if d == sdigits {
                if bytes[p] >= b'5' {
                    num += 1;
                }
                d += 1;
            }
            p += 1;
        }
    }

    if !bp && !ap {
        return (0.0, 0);
    }

    let q = p;
    let mut e = 0i32;
    let mut esign = 1i32;
    if p < bytes.len() && (bytes[p] == b'e' || bytes[p] == b'E') {
        let mut pp = p + 1;
        if pp < bytes.len() && bytes[pp] == b'+' {
            pp += 1;
        } else if pp < bytes.len() && bytes[pp] == b'-' {
            esign = -1;
            pp += 1;
        }
        if pp >= bytes.len() || !bytes[pp].is_ascii_digit() {
            p = q;
        } else {
            while pp < bytes.len() && bytes[pp].is_ascii_digit() {
                if e <= 308 {
                    e = e * 10 + (bytes[pp] - b'0') as i32;
                }
                pp += 1;
            }
            p = pp;
        }
    }

    let exponent = ed + e * esign;
    let dnum = sign * scale_by_pow10(num as f64, exponent);
    (dnum, p)
}

fn scale_by_pow10(num: f64, e: i32) -> f64 {
    if e == 0 {
        num
    } else if e > 0 {
        num * 10f64.powi(e)
    } else {
        num / 10f64.powi(-e)
    }
}

/// Reads a floating point number as defined by ECMA-55. Returns `(value,
/// bytes_consumed)`; `bytes_consumed == 0` means no number was present.
pub fn parse_double(s: &str) -> (f64, usize) {
    strtod_n(s, READ_PRECISION_DIGITS)
}

/// Reads a numeric literal as the compiler stores it: same digit-counting
/// rule as [`parse_double`], but truncated to [`PRECISION_DIGITS`]
/// significant digits. Overflow past a double's range comes out as an
/// infinity, same as `strtod55`'s `HUGE_VAL` behavior.
pub fn parse_const(s: &str) -> (f64, usize) {
    strtod_n(s, PRECISION_DIGITS)
}

fn parse_quoted_str(s: &str) -> (&str, bool) {
    match s.find('"') {
        Some(i) => (&s[..i], true),
        None => (s, false),
    }
}

fn parse_unquoted_str(s: &str) -> (&str, usize) {
    let bytes = s.as_bytes();
    let mut p = 0;
    while p < bytes.len() && is_unquoted_str_char(bytes[p]) {
        p += 1;
    }
    let parsed_len = p;
    let mut q = p;
    while q > 0 && bytes[q - 1] == b' ' {
        q -= 1;
    }
    (&s[..q], parsed_len)
}

/// Parses one element of a DATA/INPUT list starting at `s`. Returns the
/// element and the number of bytes consumed from `s` (so the caller can
/// advance `s` by that amount to find the next element).
pub fn parse_data_elem(s: &str, parse_as: ParseAs) -> (Elem, usize) {
    let trimmed_start = s.len() - s.trim_start_matches(' ').len();
    let rest = &s[trimmed_start..];
    let bytes = rest.as_bytes();

    if bytes.is_empty() {
        return (Elem::Eof, trimmed_start);
    }
    if bytes[0] == b',' {
        return (Elem::Comma, trimmed_start + 1);
    }
    if bytes[0] == b'"' {
        let (text, terminated) = parse_quoted_str(&rest[1..]);
        let consumed = 1 + text.len() + if terminated { 1 } else { 0 };
        return (Elem::QuotedStr { text, terminated }, trimmed_start + consumed);
    }
    if !is_unquoted_str_char(bytes[0]) {
        return (Elem::InvalChar(bytes[0]), trimmed_start + 1);
    }

    let looks_numeric = check_if_number(bytes);
    if parse_as == ParseAs::AsUnquotedStr || looks_numeric == NumType::None {
        let (text, consumed) = parse_unquoted_str(rest);
        return (Elem::UnquotedStr { text }, trimmed_start + consumed);
    }

    let (value, consumed) = parse_double(rest);
    (Elem::Num { value: NumBits(value) }, trimmed_start + consumed)
}

#[cfg(test)]
mod test {
    use super::*;

    fn elem(s: &str) -> Elem {
        parse_data_elem(s, ParseAs::AsIs).0
    }

    #[test]
    fn eof_on_empty() {
        assert_eq!(elem(""), Elem::Eof);
        assert_eq!(elem("   "), Elem::Eof);
    }

    #[test]
    fn comma_is_its_own_token() {
        assert_eq!(elem(","), Elem::Comma);
        assert_eq!(elem("  ,"), Elem::Comma);
    }

    #[test]
    fn quoted_string_happy_path() {
        assert_eq!(elem("\"AB\""), Elem::QuotedStr { text: "AB", terminated: true });
    }

    #[test]
    fn quoted_string_missing_terminator() {
        assert_eq!(elem("\"AB"), Elem::QuotedStr { text: "AB", terminated: false });
    }

    #[test]
    fn unquoted_string_trims_trailing_space() {
        assert_eq!(elem("AB  ,X"), Elem::UnquotedStr { text: "AB" });
    }

    #[test]
    fn number_parses_as_num() {
        match elem("123") {
            Elem::Num { value } => assert_eq!(value.0, 123.0),
            other => panic!("expected Num, got {:?}", other),
        }
    }

    #[test]
    fn negative_float_with_exponent() {
        match elem("-1.5E2") {
            Elem::Num { value } => assert_eq!(value.0, -150.0),
            other => panic!("expected Num, got {:?}", other),
        }
    }

    #[test]
    fn number_as_unquoted_string_when_forced() {
        let (e, _) = parse_data_elem("123", ParseAs::AsUnquotedStr);
        assert_eq!(e, Elem::UnquotedStr { text: "123" });
    }

    #[test]
    fn invalid_char_is_reported() {
        assert_eq!(elem("@"), Elem::InvalChar(b'@'));
    }

    #[test]
    fn check_if_number_rejects_bare_sign() {
        assert_eq!(check_if_number(b"+"), NumType::None);
        assert_eq!(check_if_number(b"+5"), NumType::Int);
        assert_eq!(check_if_number(b"5."), NumType::Float);
        assert_eq!(check_if_number(b".5"), NumType::Float);
        assert_eq!(check_if_number(b"."), NumType::None);
    }

    #[test]
    fn exponent_without_digits_is_not_consumed() {
        // "5E" has no digits after E, so check_if_number must not treat
        // it as a float purely because of the dangling E.
        assert_eq!(check_if_number(b"5E"), NumType::Int);
    }

    #[test]
    fn rounds_half_up_past_precision_cutoff() {
        let many_nines = "1.".to_string() + &"9".repeat(20);
        let (v, _) = parse_double(&many_nines);
        assert!(v > 1.9999999999999);
    }
}
