//! This module defines the runtime [`Value`] union and the parsed syntax tree [`Form`].
//!
//! Values cover numbers, strings, booleans, ordered lists, integer ranges, the
//! Placeholder sentinel, method references and unevaluated forms (the result of
//! quoting). Forms are the immutable trees produced by the parser and walked by the
//! evaluator; a quoted form evaluates to a `Value::Form` sharing the same tree.
//!
//! Conversion traits for common Rust types make it easy to build Values from literals,
//! arrays and vectors, and to pull typed data back out of them inside native methods.
//! Display logic renders forms as re-parseable source with every call parenthesized.

use std::fmt;
use std::rc::Rc;

use crate::method::Method;
use crate::{Error, EvalError};

/// Type alias for number values in interpreter
pub type NumberType = i64;

/// Inclusive integer range with a positive step
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct RangeValue {
    pub start: NumberType,
    pub end: NumberType,
    pub step: NumberType,
}

impl RangeValue {
    pub fn new(start: NumberType, end: NumberType) -> Self {
        RangeValue {
            start,
            end,
            step: 1,
        }
    }

    pub fn with_step(mut self, step: NumberType) -> Self {
        self.step = step;
        self
    }

    pub fn iter(&self) -> RangeIter {
        RangeIter {
            next: (self.start <= self.end).then_some(self.start),
            end: self.end,
            step: self.step.max(1),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.start > self.end
    }
}

impl IntoIterator for RangeValue {
    type Item = NumberType;
    type IntoIter = RangeIter;

    fn into_iter(self) -> RangeIter {
        self.iter()
    }
}

/// Iterator over the members of a [`RangeValue`]; stops instead of overflowing.
#[derive(Debug, Clone)]
pub struct RangeIter {
    next: Option<NumberType>,
    end: NumberType,
    step: NumberType,
}

impl Iterator for RangeIter {
    type Item = NumberType;

    fn next(&mut self) -> Option<NumberType> {
        let current = self.next?;
        self.next = current
            .checked_add(self.step)
            .filter(|candidate| *candidate <= self.end);
        Some(current)
    }
}

impl std::iter::FusedIterator for RangeIter {}

/// Dynamic runtime value
#[derive(Clone, Debug)]
pub enum Value {
    /// Numbers (integers only)
    Number(NumberType),
    /// String literals
    String(String),
    /// Boolean values
    Bool(bool),
    /// Ordered sequences
    List(Vec<Value>),
    /// Integer ranges
    Range(RangeValue),
    /// Sentinel whose meaning is chosen by the method receiving it
    Placeholder,
    /// A method used as a value; only `Form::Call` invokes it
    Method(Rc<Method>),
    /// An unevaluated form, produced by quoting
    Form(Rc<Form>),
}

impl Value {
    /// Short type name used in error messages
    pub fn type_name(&self) -> &'static str {
        match self {
            Value::Number(_) => "number",
            Value::String(_) => "string",
            Value::Bool(_) => "boolean",
            Value::List(_) => "list",
            Value::Range(_) => "range",
            Value::Placeholder => "placeholder",
            Value::Method(_) => "method",
            Value::Form(_) => "form",
        }
    }

    pub fn is_placeholder(&self) -> bool {
        matches!(self, Value::Placeholder)
    }

    pub fn as_method(&self) -> Option<&Rc<Method>> {
        match self {
            Value::Method(method) => Some(method),
            _ => None,
        }
    }

    pub fn as_form(&self) -> Option<&Rc<Form>> {
        match self {
            Value::Form(form) => Some(form),
            _ => None,
        }
    }

    /// Wrap a form as quoted data
    pub fn form(form: Form) -> Self {
        Value::Form(Rc::new(form))
    }
}

impl PartialEq for Value {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Value::Number(a), Value::Number(b)) => a == b,
            (Value::String(a), Value::String(b)) => a == b,
            (Value::Bool(a), Value::Bool(b)) => a == b,
            (Value::List(a), Value::List(b)) => a == b,
            (Value::Range(a), Value::Range(b)) => a == b,
            (Value::Placeholder, Value::Placeholder) => true,
            // Methods compare by identity, not by behavior
            (Value::Method(a), Value::Method(b)) => Rc::ptr_eq(a, b),
            (Value::Form(a), Value::Form(b)) => a == b,
            _ => false,
        }
    }
}

// From trait implementations for Value - enables .into() conversion
impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Value::String(s.to_owned())
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Value::String(s)
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Value::Bool(b)
    }
}

impl From<RangeValue> for Value {
    fn from(range: RangeValue) -> Self {
        Value::Range(range)
    }
}

impl From<Method> for Value {
    fn from(method: Method) -> Self {
        Value::Method(Rc::new(method))
    }
}

impl From<Form> for Value {
    fn from(form: Form) -> Self {
        Value::form(form)
    }
}

macro_rules! impl_from_integer {
    ($int_type:ty) => {
        impl From<$int_type> for Value {
            fn from(n: $int_type) -> Self {
                Value::Number(NumberType::from(n))
            }
        }
    };
}

impl_from_integer!(i8);
impl_from_integer!(i16);
impl_from_integer!(i32);
impl_from_integer!(NumberType);
impl_from_integer!(u8);
impl_from_integer!(u16);
impl_from_integer!(u32);

impl<T: Into<Value>> From<Vec<T>> for Value {
    fn from(v: Vec<T>) -> Self {
        Value::List(v.into_iter().map(Into::into).collect())
    }
}

impl<T: Into<Value>, const N: usize> From<[T; N]> for Value {
    fn from(arr: [T; N]) -> Self {
        Value::List(arr.into_iter().map(Into::into).collect())
    }
}

// Fallible conversions from `Value` back into primitive Rust types, used by
// typed argument extraction in native methods.

fn mismatch(expected: &str, found: &Value) -> Error {
    Error::Eval(EvalError::type_mismatch(format!(
        "expected {expected}, got {}",
        found.type_name()
    )))
}

impl TryFrom<Value> for NumberType {
    type Error = Error;

    fn try_from(value: Value) -> Result<NumberType, Error> {
        match value {
            Value::Number(n) => Ok(n),
            other => Err(mismatch("number", &other)),
        }
    }
}

impl TryFrom<Value> for bool {
    type Error = Error;

    fn try_from(value: Value) -> Result<bool, Error> {
        match value {
            Value::Bool(b) => Ok(b),
            other => Err(mismatch("boolean", &other)),
        }
    }
}

impl TryFrom<Value> for String {
    type Error = Error;

    fn try_from(value: Value) -> Result<String, Error> {
        match value {
            Value::String(s) => Ok(s),
            other => Err(mismatch("string", &other)),
        }
    }
}

impl TryFrom<Value> for Vec<Value> {
    type Error = Error;

    fn try_from(value: Value) -> Result<Vec<Value>, Error> {
        match value {
            Value::List(items) => Ok(items),
            Value::Range(range) => Ok(range.iter().map(Value::Number).collect()),
            other => Err(mismatch("list", &other)),
        }
    }
}

impl TryFrom<Value> for Rc<Form> {
    type Error = Error;

    fn try_from(value: Value) -> Result<Rc<Form>, Error> {
        match value {
            Value::Form(form) => Ok(form),
            other => Err(mismatch("quoted form", &other)),
        }
    }
}

impl TryFrom<Value> for Rc<Method> {
    type Error = Error;

    fn try_from(value: Value) -> Result<Rc<Method>, Error> {
        match value {
            Value::Method(method) => Ok(method),
            other => Err(mismatch("method", &other)),
        }
    }
}

fn write_escaped(f: &mut fmt::Formatter<'_>, s: &str) -> fmt::Result {
    write!(f, "\"")?;
    for ch in s.chars() {
        match ch {
            '"' => write!(f, "\\\"")?,
            '\\' => write!(f, "\\\\")?,
            '\n' => write!(f, "\\n")?,
            '\t' => write!(f, "\\t")?,
            '\r' => write!(f, "\\r")?,
            c => write!(f, "{c}")?,
        }
    }
    write!(f, "\"")
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Number(n) => write!(f, "{n}"),
            Value::String(s) => write_escaped(f, s),
            Value::Bool(b) => write!(f, "{b}"),
            Value::List(elements) => {
                write!(f, "[")?;
                for (i, elem) in elements.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{elem}")?;
                }
                write!(f, "]")
            }
            Value::Range(range) if range.step == 1 => write!(f, "{}..{}", range.start, range.end),
            Value::Range(range) => {
                write!(f, "{}..{} step {}", range.start, range.end, range.step)
            }
            Value::Placeholder => write!(f, "_"),
            Value::Method(method) => write!(f, "#<method:{}>", method.name()),
            Value::Form(form) => write!(f, "'{form}"),
        }
    }
}

/// Parsed syntax node
#[derive(Debug, Clone, PartialEq)]
pub enum Form {
    /// A self-evaluating value
    Literal(Value),
    /// A name looked up in the environment; never invoked even if it names a method
    Variable(String),
    /// A form whose evaluation is deferred; evaluates to `Value::Form`
    Quoted(Rc<Form>),
    /// A method invocation with its argument forms in source order
    Call { method: String, args: Vec<Form> },
    /// An optional-parameter marker (`--name`); only meaningful inside `Call` arguments,
    /// where it is immediately followed by the form supplying the value
    Flag(String),
}

impl Form {
    /// The name this form denotes when used as a quoted identifier: a variable
    /// reference, or a call with no arguments to a method already bound under it
    pub fn as_name(&self) -> Option<&str> {
        match self {
            Form::Variable(name) => Some(name),
            Form::Call { method, args } if args.is_empty() => Some(method),
            _ => None,
        }
    }
}

impl fmt::Display for Form {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Form::Literal(value) => write!(f, "{value}"),
            Form::Variable(name) => write!(f, "{name}"),
            Form::Quoted(inner) => write!(f, "'{inner}"),
            Form::Call { method, args } => {
                write!(f, "({method}")?;
                for arg in args {
                    write!(f, " {arg}")?;
                }
                write!(f, ")")
            }
            Form::Flag(name) => write!(f, "--{name}"),
        }
    }
}

/// Helper for building literal forms in tests
#[cfg_attr(not(test), expect(dead_code))]
pub(crate) fn lit<T: Into<Value>>(value: T) -> Form {
    Form::Literal(value.into())
}

/// Helper for building variable references in tests
#[cfg_attr(not(test), expect(dead_code))]
pub(crate) fn var<S: AsRef<str>>(name: S) -> Form {
    Form::Variable(name.as_ref().to_owned())
}

/// Helper for building calls in tests
#[cfg_attr(not(test), expect(dead_code))]
pub(crate) fn call<S: AsRef<str>>(method: S, args: Vec<Form>) -> Form {
    Form::Call {
        method: method.as_ref().to_owned(),
        args,
    }
}

/// Helper for building quoted forms in tests
#[cfg_attr(not(test), expect(dead_code))]
pub(crate) fn quoted(form: Form) -> Form {
    Form::Quoted(Rc::new(form))
}

#[cfg(test)]
#[expect(clippy::unwrap_used)] // test code OK
mod tests {
    use super::*;

    #[test]
    fn test_conversions_data_driven() {
        let test_cases = vec![
            (Value::from(42), Value::Number(42)),
            (Value::from(-17i8), Value::Number(-17)),
            (Value::from(4294967295u32), Value::Number(4294967295)),
            (Value::from(NumberType::MIN), Value::Number(NumberType::MIN)),
            (Value::from(true), Value::Bool(true)),
            (Value::from("hello"), Value::String("hello".to_owned())),
            (Value::from(String::new()), Value::String(String::new())),
            (
                Value::from([1, 2, 3]),
                Value::List(vec![Value::Number(1), Value::Number(2), Value::Number(3)]),
            ),
            (
                Value::from(vec!["a", "b"]),
                Value::List(vec![Value::from("a"), Value::from("b")]),
            ),
            (
                Value::from(RangeValue::new(1, 5)),
                Value::Range(RangeValue {
                    start: 1,
                    end: 5,
                    step: 1,
                }),
            ),
        ];

        for (i, (actual, expected)) in test_cases.iter().enumerate() {
            assert_eq!(actual, expected, "Test case {} failed", i + 1);
        }
    }

    #[test]
    fn test_typed_extraction() {
        assert_eq!(NumberType::try_from(Value::Number(3)).ok(), Some(3));
        assert_eq!(bool::try_from(Value::Bool(false)).ok(), Some(false));
        assert_eq!(
            Vec::<Value>::try_from(Value::Range(RangeValue::new(1, 3))).ok(),
            Some(vec![Value::Number(1), Value::Number(2), Value::Number(3)])
        );

        let err = NumberType::try_from(Value::from("3"));
        assert!(matches!(
            err,
            Err(Error::Eval(EvalError {
                kind: crate::EvalErrorKind::TypeMismatch,
                ..
            }))
        ));
        let message = format!("{}", bool::try_from(Value::Number(1)).unwrap_err());
        assert!(message.contains("expected boolean, got number"));
    }

    #[test]
    fn test_range_iteration() {
        let stepped: Vec<_> = RangeValue::new(1, 20).with_step(4).iter().collect();
        assert_eq!(stepped, vec![1, 5, 9, 13, 17]);

        assert_eq!(RangeValue::new(3, 3).iter().count(), 1);
        assert!(RangeValue::new(5, 1).is_empty());
        assert_eq!(RangeValue::new(5, 1).iter().count(), 0);

        // Iteration near the top of the number type ends instead of overflowing
        let top: Vec<_> = RangeValue::new(NumberType::MAX - 2, NumberType::MAX)
            .with_step(2)
            .iter()
            .collect();
        assert_eq!(top, vec![NumberType::MAX - 2, NumberType::MAX]);
    }

    #[test]
    fn test_value_equality() {
        assert_eq!(Value::Placeholder, Value::Placeholder);
        assert_ne!(Value::Number(1), Value::Bool(true));
        assert_ne!(Value::from("1"), Value::Number(1));
        assert_eq!(
            Value::form(call("+", vec![lit(1), var("$a")])),
            Value::form(call("+", vec![lit(1), var("$a")]))
        );
    }

    #[test]
    fn test_display_data_driven() {
        let test_cases = vec![
            (Value::Number(-5), "-5"),
            (Value::from("a\"b\n"), "\"a\\\"b\\n\""),
            (Value::Bool(true), "true"),
            (Value::from([1, 2]), "[1, 2]"),
            (Value::from(RangeValue::new(1, 10)), "1..10"),
            (Value::from(RangeValue::new(1, 20).with_step(4)), "1..20 step 4"),
            (Value::Placeholder, "_"),
            (
                Value::form(call(
                    "+",
                    vec![lit(1), call("*", vec![lit(3), var("$b")])],
                )),
                "'(+ 1 (* 3 $b))",
            ),
            (
                Value::form(call(
                    "..",
                    vec![Form::Flag("step".into()), lit(4), lit(1), lit(20)],
                )),
                "'(.. --step 4 1 20)",
            ),
            (Value::form(quoted(var("$x"))), "''$x"),
        ];

        for (i, (value, expected)) in test_cases.iter().enumerate() {
            assert_eq!(format!("{value}"), *expected, "Display test #{}", i + 1);
        }
    }

    #[test]
    fn test_form_as_name() {
        assert_eq!(var("$x").as_name(), Some("$x"));
        assert_eq!(call("sum", vec![]).as_name(), Some("sum"));
        assert_eq!(call("sum", vec![lit(1)]).as_name(), None);
        assert_eq!(lit(1).as_name(), None);
    }
}
