use std::fmt;

use nom::{
    IResult, Parser,
    branch::alt,
    bytes::complete::{take_till, take_till1, take_while},
    character::complete::{char, digit1},
    combinator::{opt, recognize, value},
    error::ErrorKind,
    sequence::pair,
};

use crate::ast::NumberType;
use crate::{Error, LexError, LexErrorKind, ParseConfig};

/// Lexical category of a token
#[derive(Debug, Clone, PartialEq)]
pub enum TokenKind {
    Number(NumberType),
    String(String),
    Bool(bool),
    /// Any other bare word, including operator names such as `+` or `..`
    Identifier(String),
    /// `'`, defers evaluation of the following form
    Quote,
    /// `--name`, supplies an optional parameter; holds the name without dashes
    Flag(String),
    /// `(`
    Open,
    /// `)`
    Close,
}

impl fmt::Display for TokenKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TokenKind::Number(n) => write!(f, "{n}"),
            TokenKind::String(s) => write!(f, "{s:?}"),
            TokenKind::Bool(b) => write!(f, "{b}"),
            TokenKind::Identifier(name) => write!(f, "{name}"),
            TokenKind::Quote => write!(f, "'"),
            TokenKind::Flag(name) => write!(f, "--{name}"),
            TokenKind::Open => write!(f, "("),
            TokenKind::Close => write!(f, ")"),
        }
    }
}

/// A token with the byte offset at which it starts in the source
#[derive(Debug, Clone, PartialEq)]
pub struct Token {
    pub kind: TokenKind,
    pub offset: usize,
}

/// Lazy token stream over a source string.
///
/// Tokens are produced one at a time as the iterator is advanced. After the first
/// error the stream is exhausted. Cloning a tokenizer restarts nothing; to start over,
/// construct a new one from the same source.
#[derive(Debug, Clone)]
pub struct Tokenizer<'a> {
    source: &'a str,
    remaining: &'a str,
    config: ParseConfig,
    failed: bool,
}

impl<'a> Tokenizer<'a> {
    pub fn new(source: &'a str) -> Self {
        Self::with_config(source, ParseConfig::default())
    }

    pub fn with_config(source: &'a str, config: ParseConfig) -> Self {
        Tokenizer {
            source,
            remaining: source,
            config,
            failed: false,
        }
    }

    /// The full source text this tokenizer reads from
    pub fn source(&self) -> &'a str {
        self.source
    }

    /// Byte offset of the next unread character
    pub fn offset(&self) -> usize {
        self.source.len() - self.remaining.len()
    }

    fn lex_error(&self, error: nom::Err<nom::error::Error<&str>>, offset: usize) -> LexError {
        let (code, at) = match error {
            nom::Err::Error(e) | nom::Err::Failure(e) => (e.code, e.input),
            nom::Err::Incomplete(_) => (ErrorKind::Eof, ""),
        };
        let word: String = self.source[offset..]
            .chars()
            .take_while(|c| !c.is_whitespace())
            .take(20)
            .collect();
        let (kind, message) = match code {
            ErrorKind::Escaped => (
                LexErrorKind::InvalidEscape,
                "Unknown escape sequence in string literal",
            ),
            ErrorKind::Char => (
                LexErrorKind::UnterminatedString,
                "Unterminated string literal",
            ),
            ErrorKind::TooLarge => (
                LexErrorKind::NumberOutOfRange,
                "Number literal out of range",
            ),
            _ => (LexErrorKind::InvalidNumber, "Malformed number literal"),
        };
        let error_offset = self.source.len() - at.len();
        LexError::at(kind, message, self.source, error_offset.max(offset), Some(word))
    }
}

impl Iterator for Tokenizer<'_> {
    type Item = Result<Token, Error>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.failed {
            return None;
        }
        self.remaining = skip_trivia(self.remaining, self.config.handle_comments);
        if self.remaining.is_empty() {
            return None;
        }

        let offset = self.offset();
        match next_token(self.remaining) {
            Ok((rest, kind)) => {
                self.remaining = rest;
                Some(Ok(Token { kind, offset }))
            }
            Err(e) => {
                self.failed = true;
                Some(Err(Error::Lex(self.lex_error(e, offset))))
            }
        }
    }
}

impl std::iter::FusedIterator for Tokenizer<'_> {}

/// Skip whitespace and, when enabled, `#` comments running to end of line
fn skip_trivia(mut input: &str, handle_comments: bool) -> &str {
    loop {
        if let Ok((rest, _)) = whitespace(input) {
            input = rest;
        }
        if !handle_comments {
            return input;
        }
        match comment(input) {
            Ok((rest, _)) => input = rest,
            Err(_) => return input,
        }
    }
}

fn whitespace(input: &str) -> IResult<&str, &str> {
    take_while(char::is_whitespace).parse(input)
}

fn comment(input: &str) -> IResult<&str, &str> {
    recognize(pair(char('#'), take_till(|c| c == '\n'))).parse(input)
}

fn next_token(input: &str) -> IResult<&str, TokenKind> {
    alt((delimiter, string_literal, word)).parse(input)
}

fn delimiter(input: &str) -> IResult<&str, TokenKind> {
    alt((
        value(TokenKind::Open, char('(')),
        value(TokenKind::Close, char(')')),
        value(TokenKind::Quote, char('\'')),
    ))
    .parse(input)
}

fn is_word_boundary(c: char) -> bool {
    c.is_whitespace() || c == '(' || c == ')' || c == '"'
}

/// Parse a bare word and classify it as number, boolean, flag or identifier
fn word(input: &str) -> IResult<&str, TokenKind> {
    let (rest, text) = take_till1(is_word_boundary).parse(input)?;

    if let Ok(("", digits)) = integer_literal(text) {
        return match digits.parse::<NumberType>() {
            Ok(n) => Ok((rest, TokenKind::Number(n))),
            Err(_) => Err(nom::Err::Failure(nom::error::Error::new(
                input,
                ErrorKind::TooLarge,
            ))),
        };
    }
    if looks_numeric(text) {
        return Err(nom::Err::Failure(nom::error::Error::new(
            input,
            ErrorKind::Digit,
        )));
    }

    let kind = match text {
        "true" => TokenKind::Bool(true),
        "false" => TokenKind::Bool(false),
        _ => match text.strip_prefix("--") {
            Some(name) if !name.is_empty() && !name.starts_with('-') => {
                TokenKind::Flag(name.to_owned())
            }
            _ => TokenKind::Identifier(text.to_owned()),
        },
    };
    Ok((rest, kind))
}

fn integer_literal(input: &str) -> IResult<&str, &str> {
    recognize(pair(opt(char('-')), digit1)).parse(input)
}

/// A word starting with a digit, or `-` and a digit, must be a number
fn looks_numeric(text: &str) -> bool {
    let mut chars = text.chars();
    match chars.next() {
        Some(c) if c.is_ascii_digit() => true,
        Some('-') => chars.next().is_some_and(|c| c.is_ascii_digit()),
        _ => false,
    }
}

/// Parse a string literal
fn string_literal(input: &str) -> IResult<&str, TokenKind> {
    let (mut remaining, _) = char('"').parse(input)?;
    let mut chars = String::new();

    loop {
        let mut char_iter = remaining.chars();
        match char_iter.next() {
            Some('"') => return Ok((char_iter.as_str(), TokenKind::String(chars))),
            Some('\\') => {
                match char_iter.next() {
                    Some('n') => chars.push('\n'),
                    Some('t') => chars.push('\t'),
                    Some('r') => chars.push('\r'),
                    Some('\\') => chars.push('\\'),
                    Some('"') => chars.push('"'),
                    Some(_) => {
                        return Err(nom::Err::Failure(nom::error::Error::new(
                            remaining,
                            ErrorKind::Escaped,
                        )));
                    }
                    // Backslash at end of input
                    None => {
                        return Err(nom::Err::Failure(nom::error::Error::new(
                            remaining,
                            ErrorKind::Char,
                        )));
                    }
                }
                remaining = char_iter.as_str();
            }
            Some(ch) => {
                chars.push(ch);
                remaining = char_iter.as_str();
            }
            None => {
                return Err(nom::Err::Failure(nom::error::Error::new(
                    remaining,
                    ErrorKind::Char,
                )));
            }
        }
    }
}
