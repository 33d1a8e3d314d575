use serde_json::{Number, Value as JsonValue};
use thiserror::Error;

use crate::schema::ParamType;

/// A value cast from user input.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    String(String),
    Int(i64),
    Float(f64),
    Bool(bool),
    List(Vec<Value>),
}

impl From<Value> for JsonValue {
    fn from(value: Value) -> Self {
        match value {
            Value::String(s) => JsonValue::String(s),
            Value::Int(i) => JsonValue::Number(i.into()),
            Value::Float(f) => Number::from_f64(f).map_or(JsonValue::Null, JsonValue::Number),
            Value::Bool(b) => JsonValue::Bool(b),
            Value::List(items) => JsonValue::Array(items.into_iter().map(JsonValue::from).collect()),
        }
    }
}

#[derive(Debug, Error, PartialEq)]
pub enum CastError {
    #[error("{value:?} is not a valid {ty}")]
    Invalid { value: String, ty: ParamType },

    #[error("{ty} values are not supported")]
    Unsupported { ty: ParamType },
}

/// Casts a raw string to the given type.
///
/// Arrays are comma separated and every element is cast to the item type.
/// An empty string is kept as an empty string whatever the type.
pub fn cast_str(raw: &str, ty: &ParamType) -> Result<Value, CastError> {
    if raw.is_empty() {
        return Ok(Value::String(String::new()));
    }
    match ty {
        ParamType::Array(item) if item.is_scalar() => raw
            .split(',')
            .map(|element| cast_scalar(element, item))
            .collect::<Result<Vec<_>, _>>()
            .map(Value::List),
        ParamType::Array(_) => Err(CastError::Unsupported { ty: ty.clone() }),
        _ => cast_scalar(raw, ty),
    }
}

fn cast_scalar(raw: &str, ty: &ParamType) -> Result<Value, CastError> {
    let invalid = || CastError::Invalid {
        value: raw.to_string(),
        ty: ty.clone(),
    };
    match ty {
        ParamType::Boolean => parse_bool(raw).map(Value::Bool).ok_or_else(invalid),
        ParamType::Integer => raw.parse().map(Value::Int).map_err(|_| invalid()),
        ParamType::Number => raw
            .parse::<f64>()
            .ok()
            .filter(|f| f.is_finite())
            .map(Value::Float)
            .ok_or_else(invalid),
        _ => Ok(Value::String(raw.to_string())),
    }
}

/// Accepts `1`, `t`, `true` and their false counterparts, in the usual
/// lowercase, uppercase and title-case spellings.
fn parse_bool(raw: &str) -> Option<bool> {
    match raw {
        "1" | "t" | "T" | "true" | "TRUE" | "True" => Some(true),
        "0" | "f" | "F" | "false" | "FALSE" | "False" => Some(false),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn casts_scalars() {
        assert_eq!(cast_str("true", &ParamType::Boolean), Ok(Value::Bool(true)));
        assert_eq!(cast_str("false", &ParamType::Boolean), Ok(Value::Bool(false)));
        assert_eq!(cast_str("-42", &ParamType::Integer), Ok(Value::Int(-42)));
        assert_eq!(cast_str("0.5", &ParamType::Number), Ok(Value::Float(0.5)));
        assert_eq!(
            cast_str("4,8", &ParamType::String),
            Ok(Value::String("4,8".into()))
        );
        assert_eq!(
            cast_str("{}", &ParamType::Object),
            Ok(Value::String("{}".into()))
        );
    }

    #[test]
    fn rejects_invalid_scalars() {
        let err = cast_str("invalid", &ParamType::Boolean).unwrap_err();
        assert_eq!(err.to_string(), r#""invalid" is not a valid boolean"#);

        let err = cast_str("3.2", &ParamType::Integer).unwrap_err();
        assert_eq!(err.to_string(), r#""3.2" is not a valid integer"#);

        let err = cast_str("1,7", &ParamType::Number).unwrap_err();
        assert_eq!(err.to_string(), r#""1,7" is not a valid number"#);

        let err = cast_str("NaN", &ParamType::Number).unwrap_err();
        assert_eq!(err.to_string(), r#""NaN" is not a valid number"#);
    }

    #[test]
    fn boolean_spellings() {
        for raw in ["1", "t", "T", "true", "TRUE", "True"] {
            assert_eq!(cast_str(raw, &ParamType::Boolean), Ok(Value::Bool(true)), "{raw}");
        }
        for raw in ["0", "f", "F", "false", "FALSE", "False"] {
            assert_eq!(cast_str(raw, &ParamType::Boolean), Ok(Value::Bool(false)), "{raw}");
        }
        for raw in ["yes", "no", "on", "off", "tRUE", "2", " true"] {
            assert!(cast_str(raw, &ParamType::Boolean).is_err(), "{raw}");
        }
    }

    #[test]
    fn casts_arrays_element_by_element() {
        let ty = ParamType::array_of(ParamType::Integer);
        assert_eq!(
            cast_str("4,8,15", &ty),
            Ok(Value::List(vec![Value::Int(4), Value::Int(8), Value::Int(15)]))
        );
        assert_eq!(cast_str("4", &ty), Ok(Value::List(vec![Value::Int(4)])));

        let err = cast_str("4,eight,15", &ty).unwrap_err();
        assert_eq!(err.to_string(), r#""eight" is not a valid integer"#);
    }

    #[test]
    fn empty_input_stays_empty() {
        let ty = ParamType::array_of(ParamType::Integer);
        assert_eq!(cast_str("", &ty), Ok(Value::String(String::new())));
        assert_eq!(
            cast_str("", &ParamType::Boolean),
            Ok(Value::String(String::new()))
        );
    }

    #[test]
    fn nested_arrays_are_unsupported() {
        let ty = ParamType::array_of(ParamType::array_of(ParamType::String));
        let err = cast_str("1,2", &ty).unwrap_err();
        assert_eq!(err.to_string(), "string[][] values are not supported");
    }

    #[test]
    fn converts_to_json() {
        let value = Value::List(vec![
            Value::Int(1),
            Value::Float(0.5),
            Value::Bool(true),
            Value::String("x".into()),
        ]);
        assert_eq!(JsonValue::from(value).to_string(), r#"[1,0.5,true,"x"]"#);
    }
}
