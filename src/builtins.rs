//! Standard method library.
//!
//! Every built-in is an ordinary native [`Method`]; nothing here is special to the
//! parser or evaluator. Hosts can start from [`create_global_env`], call
//! [`register_builtins`] on an environment of their own, or replace any entry by
//! registering a method under the same name.
//!
//! ```text
//! + 1 * 3 2                          ; 7
//! sum list 1 2 3 4 5                 ; 15
//! .. --step 4 1 20                   ; 1..20 step 4
//! filter (.. 1 10) '(> $it 7)        ; [8, 9, 10]
//! def 'sq '$x '(* $x $x)             ; user-defined method
//! ```
//!
//! ## Error Handling
//!
//! - **Type Safety**: arguments are extracted with typed conversions; a wrong type is a
//!   `TypeMismatch` evaluation error naming the parameter
//! - **No Coercion**: numbers never become booleans, `=` on different types is `false`
//! - **Overflow Detection**: arithmetic is checked and reports overflow as a method failure
//! - **Host Failures**: division by zero, empty lists and bad steps are [`BuiltinError`]s,
//!   surfaced by the evaluator as `MethodFailed` with the original error as source

use std::cmp::Ordering;
use std::rc::Rc;

use crate::ast::{Form, NumberType, RangeValue, Value};
use crate::binder::BoundArgs;
use crate::environment::Environment;
use crate::method::{CallContext, Method, NativeResult, ParameterSpec};
use crate::{Error, EvalError, EvalErrorKind};

/// Name bound to the Placeholder sentinel in the global environment
pub const PLACEHOLDER_NAME: &str = "_";

/// Variable bound to the current element while `filter` / `map` evaluate their form
pub const ITEM_NAME: &str = "$it";

/// Failures raised by the built-in method bodies themselves
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum BuiltinError {
    #[error("division by zero")]
    DivisionByZero,
    #[error("integer overflow in {0}")]
    Overflow(&'static str),
    #[error("{0} of an empty list")]
    EmptyList(&'static str),
    #[error("range step must be positive, got {0}")]
    InvalidStep(NumberType),
}

/// Create an environment whose root frame holds the standard methods and `_`
pub fn create_global_env() -> Environment {
    let mut env = Environment::new();
    register_builtins(&mut env);
    env
}

/// Register the standard methods and the `_` placeholder in `env`'s innermost frame
pub fn register_builtins(env: &mut Environment) {
    for method in builtin_methods() {
        env.add_method(method);
    }
    env.store_value(PLACEHOLDER_NAME, Value::Placeholder);
}

fn builtin_methods() -> Vec<Method> {
    let unary = |name: &str| ParameterSpec::new([name]);
    let binary = || ParameterSpec::new(["a", "b"]);
    let rest = |name: &str| ParameterSpec::default().with_rest(name);

    vec![
        // Math
        Method::native("+", binary(), builtin_add),
        Method::native("-", binary(), builtin_sub),
        Method::native("*", binary(), builtin_mul),
        Method::native("/", binary(), builtin_div),
        Method::native("%", binary(), builtin_rem),
        Method::native("min", binary(), builtin_min),
        Method::native("max", binary(), builtin_max),
        Method::native("sum", unary("list"), builtin_sum),
        Method::native("mul", unary("list"), builtin_product),
        // Compare
        Method::native("=", binary(), builtin_eq),
        Method::native("!=", binary(), builtin_ne),
        Method::native("<", binary(), builtin_lt),
        Method::native("<=", binary(), builtin_le),
        Method::native(">", binary(), builtin_gt),
        Method::native(">=", binary(), builtin_ge),
        // Logic
        Method::native("!", unary("b"), builtin_not),
        Method::native("&&", binary(), builtin_and),
        Method::native("||", binary(), builtin_or),
        Method::native(
            "if",
            ParameterSpec::new(["cond", "then", "else"]),
            builtin_if,
        ),
        // Collection
        Method::native("list", rest("items"), builtin_list),
        Method::native("first", unary("list"), builtin_first),
        Method::native("size", unary("list"), builtin_size),
        Method::native("filter", ParameterSpec::new(["list", "pred"]), builtin_filter),
        Method::native("map", ParameterSpec::new(["list", "transform"]), builtin_map),
        // String
        Method::native("concat", rest("parts"), builtin_concat),
        // Range
        Method::native(
            "..",
            ParameterSpec::new(["low", "high"]).with_option("step", 1),
            builtin_range,
        ),
        // System
        Method::native("def", rest("parts"), builtin_def),
        Method::native("set", ParameterSpec::new(["name", "value"]), builtin_set),
        Method::native("scope", unary("body"), builtin_scope),
    ]
}

//
// Helpers
//

fn type_error(message: String) -> Error {
    Error::Eval(EvalError::type_mismatch(message))
}

/// The elements of a list or range, without materializing ranges
fn elements(value: Value) -> Result<Box<dyn Iterator<Item = Value>>, Error> {
    match value {
        Value::List(items) => Ok(Box::new(items.into_iter())),
        Value::Range(range) => Ok(Box::new(range.iter().map(Value::Number))),
        other => Err(type_error(format!(
            "expected list or range, got {}",
            other.type_name()
        ))),
    }
}

fn numbers(value: Value) -> Result<impl Iterator<Item = Result<NumberType, Error>>, Error> {
    Ok(elements(value)?.map(NumberType::try_from))
}

/// A name given as quoted data: `'$x` or `'name` for an already bound method
fn quoted_name(value: &Value, role: &str) -> Result<String, Error> {
    value
        .as_form()
        .and_then(|form| form.as_name())
        .map(str::to_owned)
        .ok_or_else(|| type_error(format!("{role} must be a quoted name, got {value}")))
}

/// Evaluate a quoted form with `$it` bound to `item` in a fresh scope
fn eval_with_item(ctx: &mut CallContext<'_>, form: &Form, item: Value) -> Result<Value, Error> {
    ctx.scoped(|inner| {
        inner.env_mut().store_value(ITEM_NAME, item);
        inner.eval(form)
    })
}

fn compare(a: &Value, b: &Value) -> Result<Ordering, Error> {
    match (a, b) {
        (Value::Number(x), Value::Number(y)) => Ok(x.cmp(y)),
        (Value::String(x), Value::String(y)) => Ok(x.cmp(y)),
        _ => Err(type_error(format!(
            "cannot order {} against {}",
            a.type_name(),
            b.type_name()
        ))),
    }
}

//
// Builtin Method Implementations
//

// Macro to generate overflow-checked binary arithmetic
macro_rules! checked_arithmetic {
    ($name:ident, $checked:ident, $what:expr) => {
        fn $name(_: &mut CallContext<'_>, mut args: BoundArgs) -> NativeResult {
            let a: NumberType = args.take_as("a")?;
            let b: NumberType = args.take_as("b")?;
            match a.$checked(b) {
                Some(n) => Ok(Value::Number(n)),
                None => Err(BuiltinError::Overflow($what).into()),
            }
        }
    };
}

checked_arithmetic!(builtin_add, checked_add, "addition");
checked_arithmetic!(builtin_sub, checked_sub, "subtraction");
checked_arithmetic!(builtin_mul, checked_mul, "multiplication");

// Division and remainder fail on a zero divisor before overflow is considered
macro_rules! checked_division {
    ($name:ident, $checked:ident, $what:expr) => {
        fn $name(_: &mut CallContext<'_>, mut args: BoundArgs) -> NativeResult {
            let a: NumberType = args.take_as("a")?;
            let b: NumberType = args.take_as("b")?;
            if b == 0 {
                return Err(BuiltinError::DivisionByZero.into());
            }
            match a.$checked(b) {
                Some(n) => Ok(Value::Number(n)),
                None => Err(BuiltinError::Overflow($what).into()),
            }
        }
    };
}

checked_division!(builtin_div, checked_div, "division");
checked_division!(builtin_rem, checked_rem, "remainder");

fn builtin_min(_: &mut CallContext<'_>, mut args: BoundArgs) -> NativeResult {
    let a: NumberType = args.take_as("a")?;
    let b: NumberType = args.take_as("b")?;
    Ok(Value::Number(a.min(b)))
}

fn builtin_max(_: &mut CallContext<'_>, mut args: BoundArgs) -> NativeResult {
    let a: NumberType = args.take_as("a")?;
    let b: NumberType = args.take_as("b")?;
    Ok(Value::Number(a.max(b)))
}

fn builtin_sum(_: &mut CallContext<'_>, mut args: BoundArgs) -> NativeResult {
    let mut sum: NumberType = 0;
    for n in numbers(args.take("list")?)? {
        sum = sum.checked_add(n?).ok_or(BuiltinError::Overflow("sum"))?;
    }
    Ok(Value::Number(sum))
}

fn builtin_product(_: &mut CallContext<'_>, mut args: BoundArgs) -> NativeResult {
    let mut product: NumberType = 1;
    for n in numbers(args.take("list")?)? {
        product = product
            .checked_mul(n?)
            .ok_or(BuiltinError::Overflow("product"))?;
    }
    Ok(Value::Number(product))
}

fn builtin_eq(_: &mut CallContext<'_>, mut args: BoundArgs) -> NativeResult {
    Ok(Value::Bool(args.take("a")? == args.take("b")?))
}

fn builtin_ne(_: &mut CallContext<'_>, mut args: BoundArgs) -> NativeResult {
    Ok(Value::Bool(args.take("a")? != args.take("b")?))
}

// Macro to generate ordering comparisons over numbers or strings
macro_rules! ordering_comparison {
    ($name:ident, $test:ident) => {
        fn $name(_: &mut CallContext<'_>, mut args: BoundArgs) -> NativeResult {
            let a = args.take("a")?;
            let b = args.take("b")?;
            Ok(Value::Bool(compare(&a, &b)?.$test()))
        }
    };
}

ordering_comparison!(builtin_lt, is_lt);
ordering_comparison!(builtin_le, is_le);
ordering_comparison!(builtin_gt, is_gt);
ordering_comparison!(builtin_ge, is_ge);

fn builtin_not(_: &mut CallContext<'_>, mut args: BoundArgs) -> NativeResult {
    let b: bool = args.take_as("b")?;
    Ok(Value::Bool(!b))
}

fn builtin_and(_: &mut CallContext<'_>, mut args: BoundArgs) -> NativeResult {
    let a: bool = args.take_as("a")?;
    let b: bool = args.take_as("b")?;
    Ok(Value::Bool(a && b))
}

fn builtin_or(_: &mut CallContext<'_>, mut args: BoundArgs) -> NativeResult {
    let a: bool = args.take_as("a")?;
    let b: bool = args.take_as("b")?;
    Ok(Value::Bool(a || b))
}

/// Only the chosen branch is evaluated when branches are quoted
fn builtin_if(ctx: &mut CallContext<'_>, mut args: BoundArgs) -> NativeResult {
    let cond: bool = args.take_as("cond")?;
    let branch = args.take(if cond { "then" } else { "else" })?;
    match branch {
        Value::Form(form) => Ok(ctx.eval(&form)?),
        value => Ok(value),
    }
}

fn builtin_list(_: &mut CallContext<'_>, mut args: BoundArgs) -> NativeResult {
    Ok(args.take("items")?)
}

fn builtin_first(_: &mut CallContext<'_>, mut args: BoundArgs) -> NativeResult {
    let first = elements(args.take("list")?)?
        .next()
        .ok_or(BuiltinError::EmptyList("first"))?;
    Ok(first)
}

fn builtin_size(_: &mut CallContext<'_>, mut args: BoundArgs) -> NativeResult {
    match args.take("list")? {
        Value::List(items) => {
            let len = NumberType::try_from(items.len()).map_err(|_| BuiltinError::Overflow("size"))?;
            Ok(Value::Number(len))
        }
        Value::Range(range) if range.is_empty() => Ok(Value::Number(0)),
        Value::Range(range) => {
            let span = (i128::from(range.end) - i128::from(range.start)) / i128::from(range.step.max(1));
            let len = NumberType::try_from(span + 1).map_err(|_| BuiltinError::Overflow("size"))?;
            Ok(Value::Number(len))
        }
        other => Err(type_error(format!("expected list or range, got {}", other.type_name())).into()),
    }
}

fn builtin_filter(ctx: &mut CallContext<'_>, mut args: BoundArgs) -> NativeResult {
    let items = elements(args.take("list")?)?;
    let pred: Rc<Form> = args.take_as("pred")?;

    let mut kept = Vec::new();
    for item in items {
        match eval_with_item(ctx, &pred, item.clone())? {
            Value::Bool(true) => kept.push(item),
            Value::Bool(false) => {}
            other => {
                return Err(type_error(format!(
                    "filter predicate must produce a boolean, got {}",
                    other.type_name()
                ))
                .into());
            }
        }
    }
    Ok(Value::List(kept))
}

fn builtin_map(ctx: &mut CallContext<'_>, mut args: BoundArgs) -> NativeResult {
    let items = elements(args.take("list")?)?;
    let transform: Rc<Form> = args.take_as("transform")?;

    let mapped = items
        .map(|item| eval_with_item(ctx, &transform, item))
        .collect::<Result<Vec<_>, _>>()?;
    Ok(Value::List(mapped))
}

fn builtin_concat(_: &mut CallContext<'_>, mut args: BoundArgs) -> NativeResult {
    let mut result = String::new();
    for part in elements(args.take("parts")?)? {
        match part {
            Value::String(s) => result.push_str(&s),
            Value::Number(n) => result.push_str(&n.to_string()),
            other => {
                return Err(type_error(format!(
                    "concat accepts strings and numbers, got {}",
                    other.type_name()
                ))
                .into());
            }
        }
    }
    Ok(Value::String(result))
}

/// `_` as `low` means 0, as `high` means unbounded
fn builtin_range(_: &mut CallContext<'_>, mut args: BoundArgs) -> NativeResult {
    let low = args.take_optional::<NumberType>("low")?.unwrap_or(0);
    let high = args
        .take_optional::<NumberType>("high")?
        .unwrap_or(NumberType::MAX);
    let step: NumberType = args.take_as("step")?;
    if step <= 0 {
        return Err(BuiltinError::InvalidStep(step).into());
    }
    Ok(Value::Range(RangeValue::new(low, high).with_step(step)))
}

/// `def 'name 'param... 'body`
fn builtin_def(ctx: &mut CallContext<'_>, mut args: BoundArgs) -> NativeResult {
    let parts: Vec<Value> = args.take_as("parts")?;
    let Some((body, [name, params @ ..])) = parts.split_last() else {
        return Err(Error::Eval(
            EvalError::new(
                EvalErrorKind::MissingArgument,
                "def requires a quoted name and a body",
            )
            .in_method("def"),
        )
        .into());
    };

    let body = match body {
        Value::Form(form) => Rc::clone(form),
        value => Rc::new(Form::Literal(value.clone())),
    };
    let name = quoted_name(name, "method name")?;
    let params = params
        .iter()
        .map(|param| quoted_name(param, "parameter"))
        .collect::<Result<Vec<_>, _>>()?;

    let method = Value::from(Method::defined(name.as_str(), params, body, ctx.env()));
    ctx.env_mut().store_value(name, method.clone());
    Ok(method)
}

fn builtin_set(ctx: &mut CallContext<'_>, mut args: BoundArgs) -> NativeResult {
    let name = quoted_name(&args.take("name")?, "variable name")?;
    let value = args.take("value")?;
    ctx.env_mut().store_value(name, value.clone());
    Ok(value)
}

fn builtin_scope(ctx: &mut CallContext<'_>, mut args: BoundArgs) -> NativeResult {
    let body: Rc<Form> = args.take_as("body")?;
    Ok(ctx.scoped(|inner| inner.eval(&body))?)
}
