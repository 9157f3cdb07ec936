//! Normalization of loosely-typed catalog and document values
//!
//! Catalog authors write addresses and sizes in whatever notation reads best
//! for the hardware at hand: `805306368`, `"0x30000000"`, `"0b1010"`, or
//! `"0o777"`, with optional underscore separators and C-style `u`/`l`
//! suffixes. Everything funnels through [`value_to_u64`] exactly once, at the
//! point a value enters the system, so downstream code only ever sees `u64`.

use serde_json::Value;
use thiserror::Error;

#[derive(Error, Debug, PartialEq, Eq)]
pub enum ValueError {
    #[error("not an unsigned number: {0}")]
    NotANumber(String),
    #[error("not a boolean: {0}")]
    NotABool(String),
}

/// Normalize a JSON value to an unsigned integer.
///
/// Accepts native unsigned integers and strings in decimal, hex (`0x`),
/// binary (`0b`) or octal (`0o`) notation. Floats, negative numbers and other
/// value types are rejected.
pub fn value_to_u64(value: &Value) -> Result<u64, ValueError> {
    match value {
        Value::Number(n) => n
            .as_u64()
            .ok_or_else(|| ValueError::NotANumber(n.to_string())),
        Value::String(s) => str_to_u64(s),
        other => Err(ValueError::NotANumber(other.to_string())),
    }
}

/// Parse a numeric string to an unsigned integer.
///
/// Underscore digit separators and trailing `u`/`l` suffix letters are
/// tolerated; the prefix selects the base.
pub fn str_to_u64(s: &str) -> Result<u64, ValueError> {
    let trimmed = s.trim().to_ascii_lowercase();
    let stripped = trimmed.trim_end_matches(['u', 'l']);

    let (base, digits) = if let Some(rest) = stripped.strip_prefix("0x") {
        (16, rest)
    } else if let Some(rest) = stripped.strip_prefix("0b") {
        (2, rest)
    } else if let Some(rest) = stripped.strip_prefix("0o") {
        (8, rest)
    } else {
        (10, stripped)
    };

    let digits = digits.replace('_', "");
    if digits.is_empty() {
        return Err(ValueError::NotANumber(s.to_string()));
    }

    u64::from_str_radix(&digits, base).map_err(|_| ValueError::NotANumber(s.to_string()))
}

/// Normalize a JSON value to a boolean.
///
/// Accepts native booleans and the string spellings `true`/`True`/`T`/`1`
/// and `false`/`False`/`F`/`0`.
pub fn value_to_bool(value: &Value) -> Result<bool, ValueError> {
    match value {
        Value::Bool(b) => Ok(*b),
        Value::String(s) => match s.as_str() {
            "true" | "True" | "T" | "1" => Ok(true),
            "false" | "False" | "F" | "0" => Ok(false),
            other => Err(ValueError::NotABool(other.to_string())),
        },
        other => Err(ValueError::NotABool(other.to_string())),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_native_and_hex_agree() {
        let native = value_to_u64(&json!(805306368)).unwrap();
        let hex = value_to_u64(&json!("0x30000000")).unwrap();
        assert_eq!(native, hex);
        assert_eq!(native, 0x3000_0000);
    }

    #[test]
    fn test_bases_and_separators() {
        assert_eq!(str_to_u64("42").unwrap(), 42);
        assert_eq!(str_to_u64("0x8000").unwrap(), 0x8000);
        assert_eq!(str_to_u64("0b1010").unwrap(), 10);
        assert_eq!(str_to_u64("0o777").unwrap(), 0o777);
        assert_eq!(str_to_u64("1_000_000").unwrap(), 1_000_000);
        assert_eq!(str_to_u64("0x3000_0000").unwrap(), 0x3000_0000);
        assert_eq!(str_to_u64("32ul").unwrap(), 32);
        assert_eq!(str_to_u64("  0x10  ").unwrap(), 16);
    }

    #[test]
    fn test_rejects_non_numbers() {
        assert!(str_to_u64("").is_err());
        assert!(str_to_u64("flash").is_err());
        assert!(str_to_u64("0x").is_err());
        assert!(str_to_u64("-5").is_err());
        assert!(value_to_u64(&json!(-5)).is_err());
        assert!(value_to_u64(&json!(1.5)).is_err());
        assert!(value_to_u64(&json!(true)).is_err());
        assert!(value_to_u64(&json!(["0x10"])).is_err());
    }

    #[test]
    fn test_bool_spellings() {
        assert!(value_to_bool(&json!(true)).unwrap());
        assert!(value_to_bool(&json!("True")).unwrap());
        assert!(value_to_bool(&json!("1")).unwrap());
        assert!(!value_to_bool(&json!("false")).unwrap());
        assert!(!value_to_bool(&json!("0")).unwrap());
        assert!(value_to_bool(&json!("yes")).is_err());
        assert!(value_to_bool(&json!(1)).is_err());
    }
}
