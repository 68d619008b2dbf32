//! Arity-driven recursive descent parser.
//!
//! Expression boundaries come from method declarations, not punctuation. When an
//! identifier names a method in the environment, the parser absorbs exactly as many
//! following forms as the method's [`ParameterSpec`](crate::ParameterSpec) asks for:
//! one per required parameter, one value per declared `--flag`, and everything up to
//! the enclosing `)` (or end of input) when a rest parameter is declared. Parentheses
//! only delimit a single form explicitly.
//!
//! Flags inside a call that still needs arguments are kept even if the method does not
//! declare them, so the binder can report them. Once a call is saturated, an undeclared
//! flag ends it and is left for an enclosing call to claim.

use std::rc::Rc;

use crate::ast::{Form, Value};
use crate::environment::Environment;
use crate::method::ParameterSpec;
use crate::tokenizer::{Token, TokenKind, Tokenizer};
use crate::{Error, MAX_PARSE_DEPTH, ParseConfig, ParseError, ParseErrorKind};

/// Parse `source` as exactly one top-level form, with the default configuration
pub fn parse(source: &str, env: &Environment) -> Result<Form, Error> {
    parse_with_config(source, env, ParseConfig::default())
}

/// Parse `source` as exactly one top-level form.
///
/// Anything left over after the form is an error: a stray `)` is
/// [`ParseErrorKind::UnexpectedClose`], a flag nobody declared is
/// [`ParseErrorKind::UnknownOption`], and any other token is
/// [`ParseErrorKind::TrailingContent`].
pub fn parse_with_config(
    source: &str,
    env: &Environment,
    config: ParseConfig,
) -> Result<Form, Error> {
    let mut parser = Parser::new(Tokenizer::with_config(source, config), env);
    let form = parser.parse_form()?;
    match parser.peek()?.cloned() {
        None => Ok(form),
        Some(token) => Err(parser.leftover(&token, "after the expression")),
    }
}

/// Streaming parser over a token sequence.
///
/// Each [`parse_form`](Parser::parse_form) call consumes exactly the tokens of one form,
/// consulting `env` for the parameter spec of every identifier that names a method.
pub struct Parser<'a> {
    tokens: Tokenizer<'a>,
    lookahead: Option<Token>,
    env: &'a Environment,
}

impl<'a> Parser<'a> {
    pub fn new(tokens: Tokenizer<'a>, env: &'a Environment) -> Self {
        Parser {
            tokens,
            lookahead: None,
            env,
        }
    }

    /// Parse the next complete form
    pub fn parse_form(&mut self) -> Result<Form, Error> {
        self.parse_form_at(0)
    }

    /// Whether every token has been consumed
    pub fn is_finished(&mut self) -> Result<bool, Error> {
        Ok(self.peek()?.is_none())
    }

    fn peek(&mut self) -> Result<Option<&Token>, Error> {
        if self.lookahead.is_none() {
            self.lookahead = self.tokens.next().transpose()?;
        }
        Ok(self.lookahead.as_ref())
    }

    fn advance(&mut self) -> Result<Option<Token>, Error> {
        match self.lookahead.take() {
            Some(token) => Ok(Some(token)),
            None => self.tokens.next().transpose(),
        }
    }

    fn error_at(
        &self,
        kind: ParseErrorKind,
        message: impl Into<String>,
        offset: usize,
        found: Option<String>,
    ) -> Error {
        Error::Parse(ParseError::with_context_and_found(
            kind,
            message,
            self.tokens.source(),
            offset,
            found,
        ))
    }

    fn end_of_input(&self, message: impl Into<String>) -> Error {
        self.error_at(
            ParseErrorKind::Incomplete,
            message,
            self.tokens.source().len(),
            None,
        )
    }

    /// Error for a token found where the current form should already have ended
    fn leftover(&self, token: &Token, location: &str) -> Error {
        let (kind, message) = match &token.kind {
            TokenKind::Close => (
                ParseErrorKind::UnexpectedClose,
                "Unexpected ')' with no matching '('".to_owned(),
            ),
            TokenKind::Flag(name) => (
                ParseErrorKind::UnknownOption,
                format!("Option '--{name}' is not accepted by any enclosing method"),
            ),
            _ => (
                ParseErrorKind::TrailingContent,
                format!("Unexpected input {location}"),
            ),
        };
        self.error_at(kind, message, token.offset, Some(token.kind.to_string()))
    }

    fn parse_form_at(&mut self, depth: usize) -> Result<Form, Error> {
        let Some(token) = self.advance()? else {
            return Err(self.end_of_input("Unexpected end of input"));
        };
        if depth >= MAX_PARSE_DEPTH {
            return Err(self.error_at(
                ParseErrorKind::TooDeeplyNested,
                format!("Expression too deeply nested (max depth: {MAX_PARSE_DEPTH})"),
                token.offset,
                Some(token.kind.to_string()),
            ));
        }

        match token.kind {
            TokenKind::Number(n) => Ok(Form::Literal(Value::Number(n))),
            TokenKind::String(s) => Ok(Form::Literal(Value::String(s))),
            TokenKind::Bool(b) => Ok(Form::Literal(Value::Bool(b))),
            TokenKind::Quote => {
                let inner = match self.quoted_method_name()? {
                    Some(method) => Form::Call {
                        method,
                        args: Vec::new(),
                    },
                    None => self.parse_form_at(depth + 1)?,
                };
                Ok(Form::Quoted(Rc::new(inner)))
            }
            TokenKind::Open => self.parse_group(token.offset, depth),
            TokenKind::Close => Err(self.error_at(
                ParseErrorKind::UnexpectedClose,
                "Unexpected ')' with no matching '('",
                token.offset,
                Some(")".to_owned()),
            )),
            TokenKind::Flag(name) => Err(self.error_at(
                ParseErrorKind::InvalidSyntax,
                format!("Option '--{name}' must follow a method that accepts it"),
                token.offset,
                Some(format!("--{name}")),
            )),
            TokenKind::Identifier(name) => match self.env.lookup_method(&name) {
                Some(method) => self.parse_call(name, method.spec(), token.offset, depth),
                None => Ok(Form::Variable(name)),
            },
        }
    }

    /// A quote directly before a method's name quotes the name alone; its arguments
    /// are not absorbed. Quoting a whole call takes parentheses.
    fn quoted_method_name(&mut self) -> Result<Option<String>, Error> {
        let env = self.env;
        let name = match self.peek()? {
            Some(Token {
                kind: TokenKind::Identifier(name),
                ..
            }) if env.lookup_method(name).is_some() => name.clone(),
            _ => return Ok(None),
        };
        self.advance()?;
        Ok(Some(name))
    }

    /// `( form )`, opened at `open_offset`
    fn parse_group(&mut self, open_offset: usize, depth: usize) -> Result<Form, Error> {
        let empty = self
            .peek()?
            .filter(|token| token.kind == TokenKind::Close)
            .map(|token| token.offset);
        if let Some(offset) = empty {
            return Err(self.error_at(
                ParseErrorKind::InvalidSyntax,
                "Empty group: '(' must enclose exactly one expression",
                offset,
                Some("()".to_owned()),
            ));
        }

        let form = self.parse_form_at(depth + 1)?;
        match self.advance()? {
            Some(Token {
                kind: TokenKind::Close,
                ..
            }) => Ok(form),
            Some(token) => Err(self.leftover(&token, "before ')'")),
            None => Err(self.error_at(
                ParseErrorKind::Incomplete,
                "Unterminated group: missing ')'",
                open_offset,
                Some("(".to_owned()),
            )),
        }
    }

    /// Absorb the arguments of a call to `method` according to `spec`
    fn parse_call(
        &mut self,
        method: String,
        spec: &ParameterSpec,
        offset: usize,
        depth: usize,
    ) -> Result<Form, Error> {
        let required = spec.required().len();
        let mut positional = 0;
        let mut args = Vec::new();

        loop {
            let pending = positional < required || spec.rest().is_some();
            let next = self.peek()?.map(|token| token.kind.clone());
            match next {
                None | Some(TokenKind::Close) => {
                    if positional < required {
                        let missing = &spec.required()[positional];
                        let message = format!(
                            "Method '{method}' expects {required} argument(s) but found only {positional} (missing '{missing}')"
                        );
                        return Err(self.error_at(
                            ParseErrorKind::MissingArgument,
                            message,
                            offset,
                            Some(method),
                        ));
                    }
                    break;
                }
                Some(TokenKind::Flag(flag)) => {
                    if spec.option(&flag).is_none() && !pending {
                        // Saturated: leave the flag for an enclosing call
                        break;
                    }
                    self.advance()?;
                    let value = self.parse_form_at(depth + 1)?;
                    args.push(Form::Flag(flag));
                    args.push(value);
                }
                Some(_) if pending => {
                    args.push(self.parse_form_at(depth + 1)?);
                    positional += 1;
                }
                Some(_) => break,
            }
        }

        Ok(Form::Call { method, args })
    }
}
