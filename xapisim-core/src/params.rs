//! Typed extraction of positional call arguments.
//!
//! Every helper fails with `FIELD_TYPE_ERROR` naming the parameter, so
//! hand-written methods validate untyped input before touching any record.

use crate::error::{ApiError, Result};
use crate::value::{Record, Value};

/// Positional argument `idx`. The dispatcher has already checked arity, so
/// a missing argument is a registration bug rather than a caller error.
pub fn arg(args: &[Value], idx: usize) -> Result<&Value> {
    args.get(idx)
        .ok_or_else(|| ApiError::internal(format!("missing argument {}", idx)))
}

/// Optional trailing argument.
pub fn opt_arg(args: &[Value], idx: usize) -> Option<&Value> {
    args.get(idx)
}

pub fn expect_str<'a>(value: &'a Value, name: &str) -> Result<&'a str> {
    value.as_str().ok_or_else(|| ApiError::field_type(name))
}

pub fn expect_bool(value: &Value, name: &str) -> Result<bool> {
    value.as_bool().ok_or_else(|| ApiError::field_type(name))
}

pub fn expect_double(value: &Value, name: &str) -> Result<f64> {
    match value {
        Value::Double(d) if d.is_finite() => Ok(*d),
        _ => Err(ApiError::field_type(name)),
    }
}

pub fn expect_struct<'a>(value: &'a Value, name: &str) -> Result<&'a Record> {
    value.as_struct().ok_or_else(|| ApiError::field_type(name))
}

pub fn expect_array<'a>(value: &'a Value, name: &str) -> Result<&'a Vec<Value>> {
    value.as_array().ok_or_else(|| ApiError::field_type(name))
}

/// An int64 parameter, given either as an XML-RPC int or as the decimal
/// string XenAPI clients send. Returns the normalised decimal string.
pub fn expect_int64(value: &Value, name: &str) -> Result<String> {
    match value {
        Value::Int(i) => Ok(i.to_string()),
        Value::String(s) => s
            .trim()
            .parse::<i64>()
            .map(|i| i.to_string())
            .map_err(|_| ApiError::field_type(name)),
        _ => Err(ApiError::field_type(name)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;

    #[test]
    fn test_int64_accepts_int_and_decimal_string() {
        assert_eq!(expect_int64(&Value::Int(42), "size").unwrap(), "42");
        assert_eq!(expect_int64(&Value::from(" 1024"), "size").unwrap(), "1024");

        let err = expect_int64(&Value::from("lots"), "size").unwrap_err();
        assert_eq!(err.error_description(), vec!["FIELD_TYPE_ERROR", "size"]);
        assert!(expect_int64(&Value::Bool(true), "size").is_err());
    }

    #[test]
    fn test_type_errors_name_the_parameter() {
        let err = expect_str(&Value::Int(1), "label").unwrap_err();
        assert_eq!(err.kind, ErrorKind::FieldTypeError);
        assert_eq!(err.details, vec!["label"]);

        assert!(expect_bool(&Value::from("true"), "force").is_err());
        assert!(expect_struct(&Value::empty_list(), "args").is_err());
        assert!(expect_array(&Value::empty_map(), "tags").is_err());
        assert!(expect_double(&Value::Int(1), "multiplier").is_err());
    }

    #[test]
    fn test_missing_argument_is_internal() {
        let err = arg(&[], 0).unwrap_err();
        assert_eq!(err.kind, ErrorKind::InternalError);
        assert!(opt_arg(&[], 3).is_none());
    }
}
