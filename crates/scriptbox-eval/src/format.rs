//! Number rendering and format specs (`f"{x:>8.2f}"`, `"{:,}".format(n)`).

use crate::error::{EvalResult, RuntimeError};
use crate::ops;
use crate::value::Value;

/// Shortest round-tripping float text: `1.0`, `0.1`, `1e+20`, `inf`.
pub fn float_repr(f: f64) -> String {
    if f.is_nan() {
        return "nan".to_string();
    }
    if f.is_infinite() {
        return if f > 0.0 { "inf" } else { "-inf" }.to_string();
    }
    let magnitude = f.abs();
    if magnitude != 0.0 && !(1e-4..1e16).contains(&magnitude) {
        return pad_exponent(&format!("{f:e}"));
    }
    let text = f.to_string();
    if text.contains('.') {
        text
    } else {
        format!("{text}.0")
    }
}

/// Rust writes `1e20`/`1.5e-7`; scripts expect `1e+20`/`1.5e-07`.
fn pad_exponent(text: &str) -> String {
    match text.split_once('e') {
        Some((mantissa, exponent)) => {
            let (sign, digits) = match exponent.strip_prefix('-') {
                Some(digits) => ('-', digits),
                None => ('+', exponent),
            };
            format!("{mantissa}e{sign}{digits:0>2}")
        }
        None => text.to_string(),
    }
}

// ══════════════════════════════════════════════════════════════════════════════
// Format specs
// ══════════════════════════════════════════════════════════════════════════════

#[derive(Debug, Default)]
struct Spec {
    fill: Option<char>,
    align: Option<char>,
    sign: Option<char>,
    alternate: bool,
    zero: bool,
    width: usize,
    grouping: Option<char>,
    precision: Option<usize>,
    kind: Option<char>,
}

fn parse_spec(spec: &str) -> EvalResult<Spec> {
    let invalid = || RuntimeError::Value(format!("Invalid format specifier '{spec}'"));
    let chars: Vec<char> = spec.chars().collect();
    let mut out = Spec::default();
    let mut i = 0;

    let is_align = |c: char| matches!(c, '<' | '>' | '^' | '=');
    if chars.len() >= 2 && is_align(chars[1]) {
        out.fill = Some(chars[0]);
        out.align = Some(chars[1]);
        i = 2;
    } else if chars.first().copied().is_some_and(is_align) {
        out.align = Some(chars[0]);
        i = 1;
    }
    if let Some(&c) = chars.get(i).filter(|c| matches!(c, '+' | '-' | ' ')) {
        out.sign = Some(c);
        i += 1;
    }
    if chars.get(i) == Some(&'#') {
        out.alternate = true;
        i += 1;
    }
    if chars.get(i) == Some(&'0') {
        out.zero = true;
        i += 1;
    }
    let start = i;
    while chars.get(i).is_some_and(|c| c.is_ascii_digit()) {
        i += 1;
    }
    if i > start {
        let digits: String = chars[start..i].iter().collect();
        out.width = ops::padded_width(digits.parse().map_err(|_| invalid())?)?;
    }
    if let Some(&c) = chars.get(i).filter(|c| matches!(c, ',' | '_')) {
        out.grouping = Some(c);
        i += 1;
    }
    if chars.get(i) == Some(&'.') {
        i += 1;
        let start = i;
        while chars.get(i).is_some_and(|c| c.is_ascii_digit()) {
            i += 1;
        }
        if i == start {
            return Err(invalid());
        }
        let digits: String = chars[start..i].iter().collect();
        let precision = digits.parse().map_err(|_| invalid())?;
        if precision > ops::MAX_SEQUENCE_LEN {
            return Err(RuntimeError::Overflow("format precision is too large".into()));
        }
        out.precision = Some(precision);
    }
    if let Some(&c) = chars.get(i) {
        out.kind = Some(c);
        i += 1;
    }
    if i != chars.len() {
        return Err(invalid());
    }
    Ok(out)
}

/// Apply a format spec to a value.
pub fn format_value(value: &Value, spec: &str) -> EvalResult<String> {
    if spec.is_empty() {
        return Ok(value.to_str());
    }
    let spec = parse_spec(spec)?;
    let unknown = |kind: char| {
        RuntimeError::Value(format!(
            "Unknown format code '{kind}' for object of type '{}'",
            value.type_name()
        ))
    };

    let (body, numeric) = match (value, spec.kind) {
        (Value::Str(s), None | Some('s')) => {
            let text = match spec.precision {
                Some(p) => s.chars().take(p).collect(),
                None => s.clone(),
            };
            (text, false)
        }
        (Value::Int(_) | Value::Bool(_), None | Some('d' | 'n')) if spec.precision.is_none() => {
            let n = value.as_int().unwrap_or_default();
            (group(&n.unsigned_abs().to_string(), spec.grouping), true)
        }
        (Value::Int(_) | Value::Bool(_), Some(kind @ ('x' | 'X' | 'o' | 'b'))) => {
            let n = value.as_int().unwrap_or_default().unsigned_abs();
            let (digits, prefix) = match kind {
                'x' => (format!("{n:x}"), "0x"),
                'X' => (format!("{n:X}"), "0X"),
                'o' => (format!("{n:o}"), "0o"),
                _ => (format!("{n:b}"), "0b"),
            };
            let digits = if spec.alternate {
                format!("{prefix}{digits}")
            } else {
                digits
            };
            (digits, true)
        }
        (Value::Int(_) | Value::Bool(_) | Value::Float(_), kind) => {
            let f = value.as_float().unwrap_or_default();
            if kind.is_none() && spec.precision.is_none() {
                return Ok(pad_numeric(&float_repr(f.abs()), value, &spec));
            }
            let kind = match kind {
                None => 'g',
                Some(k @ ('f' | 'F' | 'e' | 'E' | 'g' | 'G' | '%')) => k,
                Some(k) => return Err(unknown(k)),
            };
            (float_body(f.abs(), kind, &spec), true)
        }
        (_, Some(kind)) => return Err(unknown(kind)),
        (other, None) => (other.to_str(), false),
    };

    if numeric {
        Ok(pad_numeric(&body, value, &spec))
    } else {
        Ok(pad("", &body, false, &spec))
    }
}

fn pad_numeric(body: &str, value: &Value, spec: &Spec) -> String {
    let negative = match value {
        Value::Float(f) => f.is_sign_negative() && *f != 0.0,
        _ => value.as_int().is_some_and(|n| n < 0),
    };
    let sign = if negative {
        "-"
    } else {
        match spec.sign {
            Some('+') => "+",
            Some(' ') => " ",
            _ => "",
        }
    };
    pad(sign, body, true, spec)
}

fn float_body(f: f64, kind: char, spec: &Spec) -> String {
    if f.is_nan() {
        return "nan".to_string();
    }
    if f.is_infinite() {
        return "inf".to_string();
    }
    let precision = spec.precision.unwrap_or(6);
    match kind {
        'f' | 'F' => with_grouping(&format!("{f:.precision$}"), spec.grouping),
        '%' => format!(
            "{}%",
            with_grouping(&format!("{:.precision$}", f * 100.0), spec.grouping)
        ),
        'e' | 'E' => {
            let text = pad_exponent(&format!("{f:.precision$e}"));
            if kind == 'E' {
                text.to_uppercase()
            } else {
                text
            }
        }
        _ => {
            let text = general(f, spec.precision, spec.alternate);
            if kind == 'G' {
                text.to_uppercase()
            } else {
                with_grouping(&text, spec.grouping)
            }
        }
    }
}

/// `g` formatting: fixed or scientific depending on the exponent, with
/// insignificant zeros removed.
fn general(f: f64, precision: Option<usize>, keep_zeros: bool) -> String {
    if precision.is_none() && !keep_zeros {
        let repr = float_repr(f);
        return repr.strip_suffix(".0").map(str::to_string).unwrap_or(repr);
    }
    let p = precision.unwrap_or(6).max(1);
    if f == 0.0 {
        return "0".to_string();
    }
    let exponent = f.log10().floor() as i32;
    let text = if exponent < -4 || exponent >= p as i32 {
        pad_exponent(&format!("{f:.prec$e}", prec = p - 1))
    } else {
        let decimals = (p as i32 - 1 - exponent).max(0) as usize;
        format!("{f:.decimals$}")
    };
    if keep_zeros {
        return text;
    }
    match text.split_once('e') {
        Some((mantissa, exp)) => format!("{}e{exp}", trim_zeros(mantissa)),
        None => trim_zeros(&text).to_string(),
    }
}

fn trim_zeros(text: &str) -> &str {
    if text.contains('.') {
        text.trim_end_matches('0').trim_end_matches('.')
    } else {
        text
    }
}

fn with_grouping(text: &str, grouping: Option<char>) -> String {
    match text.split_once('.') {
        Some((int, frac)) => format!("{}.{frac}", group(int, grouping)),
        None => group(text, grouping),
    }
}

/// Insert a separator every three digits.
fn group(digits: &str, separator: Option<char>) -> String {
    let Some(separator) = separator else {
        return digits.to_string();
    };
    let mut out = String::with_capacity(digits.len() + digits.len() / 3);
    for (i, c) in digits.chars().enumerate() {
        if i > 0 && (digits.len() - i) % 3 == 0 {
            out.push(separator);
        }
        out.push(c);
    }
    out
}

fn pad(sign: &str, body: &str, numeric: bool, spec: &Spec) -> String {
    let len = sign.chars().count() + body.chars().count();
    if len >= spec.width {
        return format!("{sign}{body}");
    }
    let padding = spec.width - len;
    let (fill, align) = if spec.zero && spec.align.is_none() {
        ('0', '=')
    } else {
        let default_align = if numeric { '>' } else { '<' };
        (spec.fill.unwrap_or(' '), spec.align.unwrap_or(default_align))
    };
    let fill_str = |n: usize| fill.to_string().repeat(n);
    match align {
        '<' => format!("{sign}{body}{}", fill_str(padding)),
        '^' => format!(
            "{}{sign}{body}{}",
            fill_str(padding / 2),
            fill_str(padding - padding / 2)
        ),
        '=' => format!("{sign}{}{body}", fill_str(padding)),
        _ => format!("{}{sign}{body}", fill_str(padding)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fmt(value: impl Into<Value>, spec: &str) -> String {
        format_value(&value.into(), spec).unwrap()
    }

    #[test]
    fn test_float_repr() {
        assert_eq!(float_repr(1.0), "1.0");
        assert_eq!(float_repr(0.1), "0.1");
        assert_eq!(float_repr(-2.5), "-2.5");
        assert_eq!(float_repr(1e20), "1e+20");
        assert_eq!(float_repr(1.5e-7), "1.5e-07");
        assert_eq!(float_repr(f64::INFINITY), "inf");
        assert_eq!(float_repr(123456.789), "123456.789");
    }

    #[test]
    fn test_fixed_and_percent() {
        assert_eq!(fmt(3.14159, ".2f"), "3.14");
        assert_eq!(fmt(2i64, ".1f"), "2.0");
        assert_eq!(fmt(0.256, ".1%"), "25.6%");
        assert_eq!(fmt(-1.5, "+.1f"), "-1.5");
        assert_eq!(fmt(1.5, "+.1f"), "+1.5");
    }

    #[test]
    fn test_grouping() {
        assert_eq!(fmt(1234567i64, ","), "1,234,567");
        assert_eq!(fmt(-1234i64, ","), "-1,234");
        assert_eq!(fmt(1234567.891, ",.2f"), "1,234,567.89");
        assert_eq!(fmt(1000000i64, "_"), "1_000_000");
    }

    #[test]
    fn test_alignment_and_width() {
        assert_eq!(fmt("ab", ">5"), "   ab");
        assert_eq!(fmt("ab", "<5"), "ab   ");
        assert_eq!(fmt("ab", "*^6"), "**ab**");
        assert_eq!(fmt(42i64, "5"), "   42");
        assert_eq!(fmt(42i64, "05"), "00042");
        assert_eq!(fmt(-42i64, "06d"), "-00042");
    }

    #[test]
    fn test_scientific_and_general() {
        assert_eq!(fmt(12345.678, ".2e"), "1.23e+04");
        assert_eq!(fmt(0.000123, "g"), "0.000123");
        assert_eq!(fmt(1234567.0, ".3g"), "1.23e+06");
        assert_eq!(fmt(2.50, ".3g"), "2.5");
    }

    #[test]
    fn test_integer_bases() {
        assert_eq!(fmt(255i64, "x"), "ff");
        assert_eq!(fmt(255i64, "#x"), "0xff");
        assert_eq!(fmt(5i64, "b"), "101");
    }

    #[test]
    fn test_huge_width_or_precision_is_overflow() {
        let err = format_value(&Value::Int(1), ">1000000000000000000").unwrap_err();
        assert_eq!(err.kind(), "OverflowError");
        let err = format_value(&Value::Float(1.0), ".1000000000f").unwrap_err();
        assert_eq!(err.kind(), "OverflowError");
        assert_eq!(fmt("a", "^3"), " a ");
    }

    #[test]
    fn test_unknown_code_is_value_error() {
        let err = format_value(&Value::str("x"), "d").unwrap_err();
        assert_eq!(err.kind(), "ValueError");
        let err = format_value(&Value::Float(1.0), "d").unwrap_err();
        assert!(err.message().contains("'d'"));
    }
}
