//! Argument binding.
//!
//! Matches the argument forms of a call against a method's [`ParameterSpec`]:
//! `--name value` pairs fill optional parameters, other forms fill required
//! positionals left to right, and anything beyond those goes to the rest parameter.
//! Argument forms are evaluated in source order through a caller-supplied callback,
//! so the same binding rules apply whether the forms come from the parser or were
//! built by hand.

use std::collections::HashMap;
use std::collections::hash_map;

use crate::ast::{Form, Value};
use crate::method::ParameterSpec;
use crate::{Error, EvalError, EvalErrorKind};

/// Parameter name to value mapping handed to a method body
#[derive(Debug, Clone, Default, PartialEq)]
pub struct BoundArgs {
    values: HashMap<String, Value>,
}

impl BoundArgs {
    pub fn get(&self, name: &str) -> Option<&Value> {
        self.values.get(name)
    }

    /// Remove and return the value bound to `name`
    pub fn take(&mut self, name: &str) -> Result<Value, Error> {
        self.values.remove(name).ok_or_else(|| {
            Error::Eval(EvalError::new(
                EvalErrorKind::MissingArgument,
                format!("No argument bound for parameter '{name}'"),
            ))
        })
    }

    /// Remove the value bound to `name` and convert it to `T`.
    ///
    /// Conversion failures are [`EvalErrorKind::TypeMismatch`] errors naming the parameter.
    pub fn take_as<T>(&mut self, name: &str) -> Result<T, Error>
    where
        T: TryFrom<Value, Error = Error>,
    {
        T::try_from(self.take(name)?).map_err(|err| match err {
            Error::Eval(mut eval) if eval.kind == EvalErrorKind::TypeMismatch => {
                eval.message = format!("Parameter '{name}': {}", eval.message);
                Error::Eval(eval)
            }
            other => other,
        })
    }

    /// Like [`take_as`](Self::take_as), but a Placeholder yields `None`
    pub fn take_optional<T>(&mut self, name: &str) -> Result<Option<T>, Error>
    where
        T: TryFrom<Value, Error = Error>,
    {
        match self.get(name) {
            Some(Value::Placeholder) => {
                self.values.remove(name);
                Ok(None)
            }
            _ => self.take_as(name).map(Some),
        }
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub fn into_map(self) -> HashMap<String, Value> {
        self.values
    }

    pub(crate) fn insert(&mut self, name: impl Into<String>, value: Value) {
        self.values.insert(name.into(), value);
    }
}

impl IntoIterator for BoundArgs {
    type Item = (String, Value);
    type IntoIter = hash_map::IntoIter<String, Value>;

    fn into_iter(self) -> Self::IntoIter {
        self.values.into_iter()
    }
}

/// Bind the argument forms of a call to `method`'s parameters.
///
/// `evaluate` is called once per argument value form, in source order. Unfilled
/// optionals take their declared defaults; the rest parameter, when declared, is
/// always bound (to an empty list if nothing was left over).
pub fn bind(
    method: &str,
    spec: &ParameterSpec,
    args: &[Form],
    mut evaluate: impl FnMut(&Form) -> Result<Value, Error>,
) -> Result<BoundArgs, Error> {
    let mut bound = BoundArgs::default();
    let mut positionals = spec.required().iter();
    let mut rest = Vec::new();

    let mut forms = args.iter();
    while let Some(form) = forms.next() {
        match form {
            Form::Flag(flag) => {
                if spec.option(flag).is_none() {
                    return Err(EvalError::new(
                        EvalErrorKind::UnknownOption,
                        format!("Unknown option '--{flag}' for method '{method}'"),
                    )
                    .in_method(method)
                    .into());
                }
                let Some(value_form) = forms.next() else {
                    return Err(EvalError::new(
                        EvalErrorKind::MissingArgument,
                        format!("Option '--{flag}' of method '{method}' has no value"),
                    )
                    .in_method(method)
                    .into());
                };
                let value = evaluate(value_form)?;
                bound.insert(flag.as_str(), value);
            }
            form => {
                let target = positionals.next();
                if target.is_none() && spec.rest().is_none() {
                    return Err(EvalError::new(
                        EvalErrorKind::UnexpectedArgument,
                        format!(
                            "Method '{method}' takes {} positional argument(s), got more",
                            spec.required().len()
                        ),
                    )
                    .in_method(method)
                    .into());
                }
                let value = evaluate(form)?;
                match target {
                    Some(param) => bound.insert(param.as_str(), value),
                    None => rest.push(value),
                }
            }
        }
    }

    if let Some(missing) = positionals.next() {
        return Err(EvalError::new(
            EvalErrorKind::MissingArgument,
            format!(
                "Method '{method}' requires {} positional argument(s); '{missing}' was not supplied",
                spec.required().len()
            ),
        )
        .in_method(method)
        .into());
    }

    for optional in spec.optional() {
        if bound.get(&optional.name).is_none() {
            bound.insert(optional.name.as_str(), optional.default.clone());
        }
    }

    if let Some(rest_name) = spec.rest() {
        bound.insert(rest_name, Value::List(rest));
    }

    Ok(bound)
}

#[cfg(test)]
#[expect(clippy::unwrap_used)] // test code OK
mod tests {
    use super::*;
    use crate::ast::{lit, var};
    use maplit::hashmap;

    /// Evaluates literals as themselves and variables as their name, recording the order
    fn recording(log: &mut Vec<String>) -> impl FnMut(&Form) -> Result<Value, Error> + '_ {
        move |form| {
            log.push(form.to_string());
            match form {
                Form::Literal(value) => Ok(value.clone()),
                Form::Variable(name) => Ok(Value::from(name.as_str())),
                other => Err(EvalError::new(
                    EvalErrorKind::InvalidForm,
                    format!("cannot evaluate {other}"),
                )
                .into()),
            }
        }
    }

    fn range_spec() -> ParameterSpec {
        ParameterSpec::new(["low", "high"]).with_option("step", 1)
    }

    fn flag(name: &str) -> Form {
        Form::Flag(name.to_owned())
    }

    #[test]
    fn test_bind_success_data_driven() {
        let list_spec = ParameterSpec::default().with_rest("items");
        let mixed_spec = ParameterSpec::new(["head"])
            .with_option("sep", ",")
            .with_rest("tail");

        let test_cases: Vec<(&str, ParameterSpec, Vec<Form>, HashMap<String, Value>)> = vec![
            (
                "positionals with default",
                range_spec(),
                vec![lit(1), lit(10)],
                hashmap! {
                    "low".to_owned() => Value::Number(1),
                    "high".to_owned() => Value::Number(10),
                    "step".to_owned() => Value::Number(1),
                },
            ),
            (
                "flag before positionals",
                range_spec(),
                vec![flag("step"), lit(4), lit(1), lit(20)],
                hashmap! {
                    "low".to_owned() => Value::Number(1),
                    "high".to_owned() => Value::Number(20),
                    "step".to_owned() => Value::Number(4),
                },
            ),
            (
                "flag between positionals",
                range_spec(),
                vec![lit(1), flag("step"), lit(4), lit(20)],
                hashmap! {
                    "low".to_owned() => Value::Number(1),
                    "high".to_owned() => Value::Number(20),
                    "step".to_owned() => Value::Number(4),
                },
            ),
            (
                "repeated flag keeps the last value",
                range_spec(),
                vec![flag("step"), lit(2), lit(1), lit(20), flag("step"), lit(3)],
                hashmap! {
                    "low".to_owned() => Value::Number(1),
                    "high".to_owned() => Value::Number(20),
                    "step".to_owned() => Value::Number(3),
                },
            ),
            (
                "empty rest",
                list_spec.clone(),
                vec![],
                hashmap! { "items".to_owned() => Value::List(vec![]) },
            ),
            (
                "rest collects everything",
                list_spec,
                vec![lit(1), lit(2), lit(3)],
                hashmap! { "items".to_owned() => Value::from([1, 2, 3]) },
            ),
            (
                "required then flag then rest",
                mixed_spec,
                vec![var("a"), flag("sep"), lit(";"), var("b"), var("c")],
                hashmap! {
                    "head".to_owned() => Value::from("a"),
                    "sep".to_owned() => Value::from(";"),
                    "tail".to_owned() => Value::from(["b", "c"]),
                },
            ),
        ];

        for (name, spec, args, expected) in test_cases {
            let mut log = Vec::new();
            let bound = bind("m", &spec, &args, recording(&mut log))
                .unwrap_or_else(|e| panic!("{name}: unexpected error {e}"));
            assert_eq!(bound.into_map(), expected, "{name}");
        }
    }

    #[test]
    fn test_bind_errors_data_driven() {
        let test_cases = vec![
            (
                "missing positional",
                range_spec(),
                vec![lit(1)],
                EvalErrorKind::MissingArgument,
                "'high' was not supplied",
            ),
            (
                "extra positional",
                range_spec(),
                vec![lit(1), lit(2), lit(3)],
                EvalErrorKind::UnexpectedArgument,
                "takes 2 positional argument(s)",
            ),
            (
                "undeclared flag",
                range_spec(),
                vec![lit(1), lit(20), flag("stop"), lit(4)],
                EvalErrorKind::UnknownOption,
                "Unknown option '--stop' for method 'm'",
            ),
            (
                "flag without value",
                range_spec(),
                vec![lit(1), lit(20), flag("step")],
                EvalErrorKind::MissingArgument,
                "'--step' of method 'm' has no value",
            ),
        ];

        for (name, spec, args, expected_kind, expected_message) in test_cases {
            let mut log = Vec::new();
            match bind("m", &spec, &args, recording(&mut log)) {
                Err(Error::Eval(err)) => {
                    assert_eq!(err.kind, expected_kind, "{name}");
                    assert!(
                        err.message.contains(expected_message),
                        "{name}: message was {}",
                        err.message
                    );
                    assert_eq!(err.method.as_deref(), Some("m"), "{name}");
                }
                other => panic!("{name}: expected an evaluation error, got {other:?}"),
            }
        }
    }

    #[test]
    fn test_bind_evaluates_in_source_order() {
        let mut log = Vec::new();
        let spec = range_spec().with_rest("more");
        let args = vec![var("a"), flag("step"), var("s"), var("b"), var("c")];
        bind("m", &spec, &args, recording(&mut log)).unwrap();
        assert_eq!(log, vec!["a", "s", "b", "c"]);
    }

    #[test]
    fn test_extra_argument_is_rejected_before_evaluation() {
        let mut log = Vec::new();
        let spec = ParameterSpec::new(["only"]);
        let result = bind("m", &spec, &[lit(1), var("side-effect")], recording(&mut log));
        assert!(result.is_err());
        assert_eq!(log, vec!["1"]);
    }

    #[test]
    fn test_evaluation_failure_propagates() {
        let mut log = Vec::new();
        let spec = ParameterSpec::new(["x"]);
        let quoted = crate::ast::quoted(lit(1));
        let err = bind("m", &spec, &[quoted], recording(&mut log)).unwrap_err();
        assert_eq!(err.eval_kind(), Some(EvalErrorKind::InvalidForm));
    }

    #[test]
    fn test_typed_take() {
        let mut bound = BoundArgs::default();
        bound.insert("n", Value::Number(3));
        bound.insert("s", Value::from("x"));
        bound.insert("p", Value::Placeholder);
        assert_eq!(bound.len(), 3);

        assert_eq!(bound.take_as::<i64>("n").unwrap(), 3);
        assert_eq!(bound.take_optional::<i64>("p").unwrap(), None);

        let err = bound.take_as::<i64>("s").unwrap_err();
        assert!(err.to_string().contains("Parameter 's': expected number, got string"));

        let missing = bound.take("n").unwrap_err();
        assert_eq!(missing.eval_kind(), Some(EvalErrorKind::MissingArgument));
        assert!(bound.is_empty());
    }
}
