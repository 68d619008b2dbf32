//! The method contract shared by native and user-defined methods.
//!
//! Every callable in the language is a [`Method`]: a name, a [`ParameterSpec`] that
//! tells both the parser (how many forms to absorb) and the binder (how to assign
//! them), and a body. Native bodies are host closures; user-defined bodies are forms
//! evaluated in a fresh frame on top of the scope the method was defined in.

use std::fmt;
use std::rc::Rc;

use crate::ast::{Form, Value};
use crate::binder::BoundArgs;
use crate::environment::{CapturedScope, Environment};
use crate::evaluator::eval_with_depth_tracking;
use crate::{Error, EvalError};

/// Result type of native method bodies.
///
/// Any error type may be returned. Crate [`Error`]s (for example from
/// [`CallContext::eval`] or typed argument extraction) pass through unchanged;
/// everything else is reported as [`crate::EvalErrorKind::MethodFailed`].
pub type NativeResult = Result<Value, Box<dyn std::error::Error + Send + Sync>>;

/// Canonical erased native method body
pub type NativeFn = dyn Fn(&mut CallContext<'_>, BoundArgs) -> NativeResult;

/// A named optional parameter and the value it takes when its flag is omitted
#[derive(Debug, Clone, PartialEq)]
pub struct OptionalParam {
    pub name: String,
    pub default: Value,
}

/// Declared parameters of a method: required positionals in order, named optional
/// parameters with defaults, and at most one trailing rest parameter.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct ParameterSpec {
    required: Vec<String>,
    optional: Vec<OptionalParam>,
    rest: Option<String>,
}

impl ParameterSpec {
    /// A spec with the given required positional parameters
    pub fn new<I, S>(required: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        ParameterSpec {
            required: required.into_iter().map(Into::into).collect(),
            optional: Vec::new(),
            rest: None,
        }
    }

    /// Declare an optional parameter supplied as `--name value`
    pub fn with_option(mut self, name: impl Into<String>, default: impl Into<Value>) -> Self {
        self.optional.push(OptionalParam {
            name: name.into(),
            default: default.into(),
        });
        self
    }

    /// Declare the rest parameter collecting extra positional arguments
    pub fn with_rest(mut self, name: impl Into<String>) -> Self {
        self.rest = Some(name.into());
        self
    }

    pub fn required(&self) -> &[String] {
        &self.required
    }

    pub fn optional(&self) -> &[OptionalParam] {
        &self.optional
    }

    pub fn option(&self, name: &str) -> Option<&OptionalParam> {
        self.optional.iter().find(|param| param.name == name)
    }

    pub fn rest(&self) -> Option<&str> {
        self.rest.as_deref()
    }
}

enum MethodBody {
    Native(Box<NativeFn>),
    Defined { body: Rc<Form>, scope: CapturedScope },
}

/// A callable registered in an [`Environment`]
pub struct Method {
    name: String,
    spec: ParameterSpec,
    body: MethodBody,
}

impl fmt::Debug for Method {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let kind = match self.body {
            MethodBody::Native(_) => "native",
            MethodBody::Defined { .. } => "defined",
        };
        f.debug_struct("Method")
            .field("name", &self.name)
            .field("spec", &self.spec)
            .field("kind", &kind)
            .finish()
    }
}

impl Method {
    /// Create a method backed by host logic.
    ///
    /// ```
    /// use limn::{Environment, Method, ParameterSpec, Value, evaluate};
    ///
    /// let mut env = Environment::new();
    /// env.add_method(Method::native("double", ParameterSpec::new(["n"]), |_, mut args| {
    ///     let n: i64 = args.take_as("n")?;
    ///     Ok(Value::Number(n * 2))
    /// }));
    /// assert_eq!(evaluate(&mut env, "double 21").unwrap(), Value::Number(42));
    /// ```
    pub fn native<F>(name: impl Into<String>, spec: ParameterSpec, body: F) -> Self
    where
        F: Fn(&mut CallContext<'_>, BoundArgs) -> NativeResult + 'static,
    {
        Method {
            name: name.into(),
            spec,
            body: MethodBody::Native(Box::new(body)),
        }
    }

    /// Create a method whose body is evaluated on top of `defining_env`'s scope chain.
    ///
    /// Each parameter becomes a required positional parameter.
    pub fn defined(
        name: impl Into<String>,
        params: Vec<String>,
        body: Rc<Form>,
        defining_env: &Environment,
    ) -> Self {
        let name = name.into();
        tracing::debug!(method = %name, params = ?params, "defined method");
        Method {
            name,
            spec: ParameterSpec::new(params),
            body: MethodBody::Defined {
                body,
                scope: defining_env.capture(),
            },
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn spec(&self) -> &ParameterSpec {
        &self.spec
    }

    pub fn is_native(&self) -> bool {
        matches!(self.body, MethodBody::Native(_))
    }

    /// Run the method body against already bound arguments
    pub(crate) fn invoke(&self, ctx: &mut CallContext<'_>, args: BoundArgs) -> Result<Value, Error> {
        match &self.body {
            MethodBody::Native(native) => native(ctx, args).map_err(|failure| {
                match failure.downcast::<Error>() {
                    Ok(error) => *error,
                    Err(host) => {
                        tracing::debug!(method = %self.name, error = %host, "native method failed");
                        Error::Eval(EvalError::method_failed(&self.name, host))
                    }
                }
            }),
            MethodBody::Defined { body, scope } => {
                // Parameters live in a fresh frame over the defining scope, never the caller's
                let mut local = scope.restore();
                local.scoped(|env| {
                    for (name, value) in args {
                        env.store_value(name, value);
                    }
                    eval_with_depth_tracking(body, env, ctx.depth + 1)
                })
            }
        }
    }
}

/// What a native method body sees of the call in progress
pub struct CallContext<'a> {
    env: &'a mut Environment,
    depth: usize,
    method: &'a str,
}

impl<'a> CallContext<'a> {
    pub(crate) fn new(env: &'a mut Environment, depth: usize, method: &'a str) -> Self {
        CallContext { env, depth, method }
    }

    /// The environment the call is being evaluated in
    pub fn env(&self) -> &Environment {
        self.env
    }

    pub fn env_mut(&mut self) -> &mut Environment {
        self.env
    }

    /// Name of the method being invoked
    pub fn method_name(&self) -> &str {
        self.method
    }

    /// Evaluate a form in the current environment, one level deeper than this call
    pub fn eval(&mut self, form: &Form) -> Result<Value, Error> {
        eval_with_depth_tracking(form, self.env, self.depth + 1)
    }

    /// Run `body` with a fresh child frame pushed onto the current environment
    pub fn scoped<R>(&mut self, body: impl FnOnce(&mut CallContext<'_>) -> R) -> R {
        let depth = self.depth;
        let method = self.method;
        self.env.scoped(|env| body(&mut CallContext { env, depth, method }))
    }
}
