//! JSON data exchange with the host.
//!
//! Hosts often hold script inputs as JSON. This module converts between
//! `serde_json::Value` and [`Value`] so such data can be stored in an
//! [`Environment`] and results handed back. Only data crosses this boundary:
//! objects have no [`Value`] counterpart, and methods cannot be serialized.

use crate::ast::{NumberType, Value};
use crate::environment::Environment;
use crate::{Error, EvalError, ParseError, ParseErrorKind};

impl TryFrom<serde_json::Value> for Value {
    type Error = Error;

    fn try_from(json: serde_json::Value) -> Result<Value, Error> {
        match json {
            serde_json::Value::Null => Ok(Value::Placeholder),
            serde_json::Value::Bool(b) => Ok(Value::Bool(b)),
            serde_json::Value::Number(n) => n.as_i64().map(Value::Number).ok_or_else(|| {
                Error::Eval(EvalError::type_mismatch(format!(
                    "JSON number {n} is not an integer in the range of {}",
                    std::any::type_name::<NumberType>()
                )))
            }),
            serde_json::Value::String(s) => Ok(Value::String(s)),
            serde_json::Value::Array(items) => items
                .into_iter()
                .map(Value::try_from)
                .collect::<Result<Vec<_>, _>>()
                .map(Value::List),
            serde_json::Value::Object(_) => Err(Error::Eval(EvalError::type_mismatch(
                "JSON objects have no value representation",
            ))),
        }
    }
}

impl Value {
    /// Convert to JSON.
    ///
    /// Ranges become `{"start", "end", "step"}` objects, quoted forms their source
    /// text and the Placeholder `null`. Methods fail with a type mismatch.
    pub fn to_json(&self) -> Result<serde_json::Value, Error> {
        match self {
            Value::Number(n) => Ok(serde_json::Value::from(*n)),
            Value::String(s) => Ok(serde_json::Value::String(s.clone())),
            Value::Bool(b) => Ok(serde_json::Value::Bool(*b)),
            Value::List(items) => items
                .iter()
                .map(Value::to_json)
                .collect::<Result<Vec<_>, _>>()
                .map(serde_json::Value::Array),
            Value::Range(range) => Ok(serde_json::json!({
                "start": range.start,
                "end": range.end,
                "step": range.step,
            })),
            Value::Placeholder => Ok(serde_json::Value::Null),
            Value::Form(form) => Ok(serde_json::Value::String(form.to_string())),
            Value::Method(method) => Err(Error::Eval(EvalError::type_mismatch(format!(
                "method '{}' cannot be converted to JSON",
                method.name()
            )))),
        }
    }
}

/// Parse JSON text into a [`Value`]
pub fn parse_json_value(input: &str) -> Result<Value, Error> {
    let json: serde_json::Value = serde_json::from_str(input).map_err(|e| {
        ParseError::new(
            ParseErrorKind::InvalidSyntax,
            format!("Invalid JSON: {e}"),
            None,
            Some(input.chars().take(20).collect()),
        )
    })?;
    Value::try_from(json)
}

impl Environment {
    /// Parse JSON text and bind the result to `name` in the innermost frame
    pub fn store_json(&mut self, name: impl Into<String>, input: &str) -> Result<(), Error> {
        let value = parse_json_value(input)?;
        self.store_value(name, value);
        Ok(())
    }
}

#[cfg(test)]
#[expect(clippy::unwrap_used)] // test code OK
mod tests {
    use super::*;
    use crate::builtins::create_global_env;
    use crate::{EvalErrorKind, RangeValue, evaluate};
    use serde_json::json;

    #[test]
    fn test_json_to_value_data_driven() {
        let test_cases = vec![
            (json!(42), Some(Value::Number(42))),
            (json!(-7), Some(Value::Number(-7))),
            (json!("text"), Some(Value::from("text"))),
            (json!(true), Some(Value::Bool(true))),
            (json!(null), Some(Value::Placeholder)),
            (json!([1, [2, "x"]]), Some(Value::List(vec![
                Value::Number(1),
                Value::List(vec![Value::Number(2), Value::from("x")]),
            ]))),
            (json!([]), Some(Value::List(vec![]))),
            (json!(1.5), None),
            (json!(18446744073709551615u64), None),
            (json!({"a": 1}), None),
            (json!([1, {"a": 1}]), None),
        ];

        for (i, (input, expected)) in test_cases.into_iter().enumerate() {
            let test_id = format!("JSON test #{}", i + 1);
            match (Value::try_from(input), expected) {
                (Ok(actual), Some(expected)) => assert_eq!(actual, expected, "{test_id}"),
                (Err(err), None) => {
                    assert_eq!(err.eval_kind(), Some(EvalErrorKind::TypeMismatch), "{test_id}");
                }
                (actual, expected) => panic!("{test_id}: expected {expected:?}, got {actual:?}"),
            }
        }
    }

    #[test]
    fn test_value_to_json() {
        let mut env = create_global_env();
        let cases = vec![
            ("list 1 \"a\" true", json!([1, "a", true])),
            (".. --step 4 1 20", json!({"start": 1, "end": 20, "step": 4})),
            ("_", json!(null)),
            ("'(+ 1 $x)", json!("(+ 1 $x)")),
        ];
        for (input, expected) in cases {
            let value = evaluate(&mut env, input).unwrap();
            assert_eq!(value.to_json().unwrap(), expected, "{input}");
        }

        let method = env.lookup("+").unwrap();
        assert_eq!(
            method.to_json().unwrap_err().eval_kind(),
            Some(EvalErrorKind::TypeMismatch)
        );
        assert_eq!(
            Value::from(RangeValue::new(1, 2)).to_json().unwrap()["step"],
            json!(1)
        );
    }

    #[test]
    fn test_store_json_feeds_scripts() {
        let mut env = create_global_env();
        env.store_json("$scores", "[3, 9, 4, 12]").unwrap();
        let high = evaluate(&mut env, "filter $scores '(> $it 5)").unwrap();
        assert_eq!(high.to_json().unwrap(), json!([9, 12]));

        let err = env.store_json("$bad", "[1, 2").unwrap_err();
        assert_eq!(err.parse_kind(), Some(ParseErrorKind::InvalidSyntax));
        assert!(err.to_string().contains("Invalid JSON"));
        assert_eq!(env.lookup("$bad"), None);
    }
}
