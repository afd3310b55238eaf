// Numeral parsing (luaO_str2num): shared by the lexer and by runtime
// string-to-number coercion. Integers are tried first; decimal overflow
// and fractional or exponent syntax fall back to float. Hex integers wrap
// modulo 2^64; hex floats carry a binary exponent.

use crate::lua_value::LuaValue;

pub fn parse_number(s: &str) -> Option<LuaValue> {
    let s = s.trim();
    if s.is_empty() {
        return None;
    }
    let (neg, body) = match s.as_bytes()[0] {
        b'-' => (true, &s[1..]),
        b'+' => (false, &s[1..]),
        _ => (false, s),
    };
    if body.is_empty() {
        return None;
    }
    let v = if body.len() > 2 && (body.starts_with("0x") || body.starts_with("0X")) {
        parse_hex(&body[2..])?
    } else {
        parse_decimal(body)?
    };
    Some(if neg { negate(v) } else { v })
}

fn negate(v: LuaValue) -> LuaValue {
    if let Some(i) = v.as_integer() {
        LuaValue::integer(i.wrapping_neg())
    } else {
        LuaValue::float(-f64::from_bits(v.secondary))
    }
}

fn parse_decimal(s: &str) -> Option<LuaValue> {
    let bytes = s.as_bytes();
    let mut has_dot = false;
    let mut has_exp = false;
    for (i, &b) in bytes.iter().enumerate() {
        match b {
            b'0'..=b'9' => {}
            b'.' if !has_dot && !has_exp => has_dot = true,
            b'e' | b'E' if !has_exp && i > 0 => has_exp = true,
            b'+' | b'-' if i > 0 && matches!(bytes[i - 1], b'e' | b'E') => {}
            _ => return None,
        }
    }
    if !bytes.iter().any(|b| b.is_ascii_digit()) {
        return None;
    }
    if !has_dot && !has_exp {
        if let Ok(i) = s.parse::<i64>() {
            return Some(LuaValue::integer(i));
        }
        // too large for an integer: read it as a float
    }
    s.parse::<f64>().ok().map(LuaValue::float)
}

fn parse_hex(s: &str) -> Option<LuaValue> {
    let bytes = s.as_bytes();
    let mut mantissa: u64 = 0;
    let mut any_digit = false;
    let mut exponent: i32 = 0; // binary exponent from fraction digits
    let mut seen_dot = false;
    let mut i = 0;
    while i < bytes.len() {
        let b = bytes[i];
        if let Some(d) = hex_digit(b) {
            any_digit = true;
            // integer part wraps; fraction digits scale the exponent
            mantissa = mantissa.wrapping_mul(16).wrapping_add(d as u64);
            if seen_dot {
                exponent -= 4;
            }
            i += 1;
        } else if b == b'.' && !seen_dot {
            seen_dot = true;
            i += 1;
        } else {
            break;
        }
    }
    if !any_digit {
        return None;
    }
    // binary exponent part
    let mut pexp: i32 = 0;
    let mut has_p = false;
    if i < bytes.len() && (bytes[i] == b'p' || bytes[i] == b'P') {
        has_p = true;
        i += 1;
        let mut sign = 1i32;
        if i < bytes.len() && (bytes[i] == b'+' || bytes[i] == b'-') {
            if bytes[i] == b'-' {
                sign = -1;
            }
            i += 1;
        }
        let mut any = false;
        while i < bytes.len() && bytes[i].is_ascii_digit() {
            any = true;
            pexp = pexp.saturating_mul(10).saturating_add((bytes[i] - b'0') as i32);
            i += 1;
        }
        if !any {
            return None;
        }
        pexp *= sign;
    }
    if i != bytes.len() {
        return None;
    }
    if !seen_dot && !has_p {
        return Some(LuaValue::integer(mantissa as i64));
    }
    Some(LuaValue::float(
        (mantissa as f64) * 2f64.powi(exponent + pexp),
    ))
}

#[inline]
fn hex_digit(b: u8) -> Option<u8> {
    match b {
        b'0'..=b'9' => Some(b - b'0'),
        b'a'..=b'f' => Some(b - b'a' + 10),
        b'A'..=b'F' => Some(b - b'A' + 10),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn integers_first() {
        assert_eq!(parse_number("42").and_then(|v| v.as_integer()), Some(42));
        assert_eq!(parse_number("-7").and_then(|v| v.as_integer()), Some(-7));
        assert_eq!(
            parse_number("0xff").and_then(|v| v.as_integer()),
            Some(255)
        );
    }

    #[test]
    fn floats_on_fraction_or_exponent() {
        assert_eq!(parse_number("0.5").and_then(|v| v.as_float()), Some(0.5));
        assert_eq!(parse_number("1e2").and_then(|v| v.as_float()), Some(100.0));
        assert!(parse_number("3.").and_then(|v| v.as_float()).is_some());
    }

    #[test]
    fn decimal_overflow_becomes_float() {
        let v = parse_number("99999999999999999999").unwrap();
        assert!(v.is_float());
    }

    #[test]
    fn hex_integer_wraps() {
        let v = parse_number("0xFFFFFFFFFFFFFFFF").unwrap();
        assert_eq!(v.as_integer(), Some(-1));
    }

    #[test]
    fn hex_float_binary_exponent() {
        assert_eq!(
            parse_number("0x1p4").and_then(|v| v.as_float()),
            Some(16.0)
        );
        assert_eq!(
            parse_number("0x1.8p1").and_then(|v| v.as_float()),
            Some(3.0)
        );
    }

    #[test]
    fn rejects_junk() {
        assert!(parse_number("").is_none());
        assert!(parse_number("abc").is_none());
        assert!(parse_number("1x").is_none());
        assert!(parse_number("inf").is_none());
        assert!(parse_number("0x").is_none());
    }
}
