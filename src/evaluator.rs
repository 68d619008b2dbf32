//! Form evaluation.
//!
//! Literals evaluate to themselves, variables to their innermost binding (methods
//! included, without invoking them), quoted forms to `Value::Form` data, and calls by
//! binding their argument forms against the target method's parameters and invoking
//! it. Every nested evaluation counts against [`MAX_EVAL_DEPTH`].

use std::rc::Rc;

use crate::ast::{Form, Value};
use crate::binder::bind;
use crate::environment::Environment;
use crate::method::CallContext;
use crate::parser::parse_with_config;
use crate::{Error, EvalError, EvalErrorKind, MAX_EVAL_DEPTH, ParseConfig};

/// Parse `source` against `env` and evaluate the resulting form in it
///
/// ```
/// use limn::{Environment, Value, evaluate};
///
/// let mut env = Environment::new();
/// env.store_value("$greeting", "hello");
/// assert_eq!(evaluate(&mut env, "$greeting").unwrap(), Value::from("hello"));
/// ```
pub fn evaluate(env: &mut Environment, source: &str) -> Result<Value, Error> {
    evaluate_with_config(env, source, ParseConfig::default())
}

/// [`evaluate`] with explicit parser options
pub fn evaluate_with_config(
    env: &mut Environment,
    source: &str,
    config: ParseConfig,
) -> Result<Value, Error> {
    let form = parse_with_config(source, env, config)?;
    eval(&form, env)
}

/// Evaluate an already parsed form
pub fn eval(form: &Form, env: &mut Environment) -> Result<Value, Error> {
    eval_with_depth_tracking(form, env, 0)
}

/// Evaluate a form with depth tracking to prevent stack overflow
pub(crate) fn eval_with_depth_tracking(
    form: &Form,
    env: &mut Environment,
    depth: usize,
) -> Result<Value, Error> {
    if depth >= MAX_EVAL_DEPTH {
        return Err(Error::Eval(EvalError::new(
            EvalErrorKind::DepthLimit,
            format!("Evaluation depth limit exceeded (max: {MAX_EVAL_DEPTH})"),
        )));
    }
    match form {
        Form::Literal(value) => Ok(value.clone()),

        // A method reached through a variable is data, not a call
        Form::Variable(name) => env
            .lookup(name)
            .ok_or_else(|| Error::Eval(EvalError::unbound(name))),

        Form::Quoted(inner) => Ok(Value::Form(Rc::clone(inner))),

        Form::Call { method, args } => {
            eval_call(method, args, env, depth).map_err(|err| add_context(err, form))
        }

        Form::Flag(name) => Err(Error::Eval(EvalError::new(
            EvalErrorKind::InvalidForm,
            format!("Option '--{name}' can only appear among a method's arguments"),
        ))),
    }
}

fn eval_call(
    name: &str,
    args: &[Form],
    env: &mut Environment,
    depth: usize,
) -> Result<Value, Error> {
    let method = match env.lookup(name) {
        Some(Value::Method(method)) => method,
        Some(other) => {
            return Err(EvalError::new(
                EvalErrorKind::NotAMethod,
                format!("'{name}' is bound to a {}, not a method", other.type_name()),
            )
            .in_method(name)
            .into());
        }
        None => return Err(EvalError::unbound(name).in_method(name).into()),
    };

    tracing::trace!(method = name, args = args.len(), depth, "dispatching call");

    let bound = bind(name, method.spec(), args, |arg| {
        eval_with_depth_tracking(arg, env, depth + 1)
    })?;
    let mut ctx = CallContext::new(env, depth, name);
    method.invoke(&mut ctx, bound)
}

/// Record the innermost failing call on an evaluation error
fn add_context(error: Error, form: &Form) -> Error {
    match error {
        Error::Eval(mut err) if err.context.is_none() => {
            err.context = Some(format!("while evaluating: {form}"));
            Error::Eval(err)
        }
        other => other,
    }
}
