use nom::{
    IResult, Parser,
    branch::alt,
    bytes::complete::{take_till, take_till1, take_while1},
    character::complete::char,
    combinator::{map, recognize, value},
    multi::many0,
    sequence::pair,
};

use crate::ast::{Expr, NumberType, sym};
use crate::symbol::intern;
use crate::{Config, Error, ParseError, ParseErrorKind};

/// Lexical tokens. Atoms borrow their text from the source.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Token<'a> {
    Open,
    Close,
    Quote,
    Dot,
    Atom(&'a str),
}

impl Token<'_> {
    fn describe(&self) -> String {
        match self {
            Token::Open => "(".into(),
            Token::Close => ")".into(),
            Token::Quote => "'".into(),
            Token::Dot => ".".into(),
            Token::Atom(text) => (*text).into(),
        }
    }
}

/// Characters that end an atom
fn is_delimiter(c: char) -> bool {
    c.is_whitespace() || matches!(c, '(' | ')' | '\'' | ';')
}

/// A `;` comment running to the end of the line
fn comment(input: &str) -> IResult<&str, &str> {
    recognize(pair(char(';'), take_till(|c| c == '\n'))).parse(input)
}

/// Whitespace and comments between tokens
fn blank(input: &str) -> IResult<&str, ()> {
    value((), many0(alt((take_while1(|c: char| c.is_whitespace()), comment)))).parse(input)
}

/// A single token. `.` is always a token of its own when it starts one.
fn token(input: &str) -> IResult<&str, Token<'_>> {
    alt((
        value(Token::Open, char('(')),
        value(Token::Close, char(')')),
        value(Token::Quote, char('\'')),
        value(Token::Dot, char('.')),
        map(take_till1(is_delimiter), Token::Atom),
    ))
    .parse(input)
}

/// Splits source text into tokens, with one token of push-back.
struct Tokenizer<'a> {
    input: &'a str,
    remaining: &'a str,
    pushed_back: Option<(Token<'a>, usize)>,
    /// Byte offset where the most recently returned token starts
    last_offset: usize,
}

impl<'a> Tokenizer<'a> {
    fn new(input: &'a str) -> Self {
        Tokenizer {
            input,
            remaining: input,
            pushed_back: None,
            last_offset: 0,
        }
    }

    fn offset(&self) -> usize {
        self.input.len() - self.remaining.len()
    }

    fn next_token(&mut self) -> Option<Token<'a>> {
        if let Some((token, offset)) = self.pushed_back.take() {
            self.last_offset = offset;
            return Some(token);
        }
        if let Ok((rest, ())) = blank(self.remaining) {
            self.remaining = rest;
        }
        self.last_offset = self.offset();
        let (rest, next) = token(self.remaining).ok()?;
        self.remaining = rest;
        Some(next)
    }

    fn push_back(&mut self, token: Token<'a>) {
        self.pushed_back = Some((token, self.last_offset));
    }
}

/// Reads successive expressions from source text.
///
/// ```
/// use conslisp::Reader;
///
/// let mut reader = Reader::new("(a . b) 'c ; trailing comment");
/// assert_eq!(reader.read().unwrap().unwrap().to_string(), "(A . B)");
/// assert_eq!(reader.read().unwrap().unwrap().to_string(), "(QUOTE C)");
/// assert!(reader.read().unwrap().is_none());
/// ```
pub struct Reader<'a> {
    tokens: Tokenizer<'a>,
    config: Config,
}

impl<'a> Reader<'a> {
    pub fn new(source: &'a str) -> Self {
        Self::with_config(source, Config::default())
    }

    pub fn with_config(source: &'a str, config: Config) -> Self {
        Reader {
            tokens: Tokenizer::new(source),
            config,
        }
    }

    /// Read the next expression, or `None` once only whitespace and comments remain.
    pub fn read(&mut self) -> Result<Option<Expr>, Error> {
        match self.tokens.next_token() {
            None => Ok(None),
            Some(token) => self.parse_token(token, 0).map(Some),
        }
    }

    /// Read the next expression, failing with `EmptyInput` when none remain
    pub fn read_required(&mut self) -> Result<Expr, Error> {
        self.read()?.ok_or_else(|| {
            ParseError::from_message(ParseErrorKind::EmptyInput, "No expression in input").into()
        })
    }

    fn error(&self, kind: ParseErrorKind, message: &str, found: Option<&Token<'_>>) -> Error {
        ParseError::with_context(
            kind,
            message,
            self.tokens.input,
            self.tokens.last_offset,
            found.map(Token::describe),
        )
        .into()
    }

    fn unexpected_end(&self, message: &str) -> Error {
        ParseError::with_context(
            ParseErrorKind::Incomplete,
            message,
            self.tokens.input,
            self.tokens.input.len(),
            None,
        )
        .into()
    }

    fn parse_token(&mut self, token: Token<'a>, depth: usize) -> Result<Expr, Error> {
        if let Some(max) = self.config.max_parse_depth
            && depth >= max
        {
            return Err(self.error(
                ParseErrorKind::TooDeeplyNested,
                &format!("Expression too deeply nested (max depth: {max})"),
                Some(&token),
            ));
        }

        match token {
            Token::Open => self.parse_list(depth),
            Token::Close => Err(self.error(
                ParseErrorKind::InvalidSyntax,
                "Unexpected closing parenthesis",
                Some(&token),
            )),
            Token::Dot => Err(self.error(
                ParseErrorKind::InvalidSyntax,
                "Dot outside of a list",
                Some(&token),
            )),
            Token::Quote => {
                let quoted = self.parse_required(depth + 1, "Unexpected end of input after quote")?;
                Ok(Expr::list([sym("QUOTE"), quoted]))
            }
            Token::Atom(text) => Ok(parse_atom(text)),
        }
    }

    /// Parse the expression that must follow, failing with `Incomplete` at end of input
    fn parse_required(&mut self, depth: usize, message: &str) -> Result<Expr, Error> {
        match self.tokens.next_token() {
            Some(token) => self.parse_token(token, depth),
            None => Err(self.unexpected_end(message)),
        }
    }

    /// Parse list elements after `(` up to and including the matching `)`
    fn parse_list(&mut self, depth: usize) -> Result<Expr, Error> {
        const UNTERMINATED: &str = "Unexpected end of input, missing closing parenthesis";

        let mut elements = Vec::new();
        loop {
            let Some(token) = self.tokens.next_token() else {
                return Err(self.unexpected_end(UNTERMINATED));
            };
            match token {
                Token::Close => return Ok(Expr::list(elements)),
                Token::Dot if elements.is_empty() => {
                    return Err(self.error(
                        ParseErrorKind::InvalidSyntax,
                        "Dot must follow at least one list element",
                        Some(&token),
                    ));
                }
                Token::Dot => {
                    let tail = self.parse_required(depth + 1, UNTERMINATED)?;
                    return match self.tokens.next_token() {
                        Some(Token::Close) => Ok(Expr::list_with_tail(elements, tail)),
                        Some(other) => Err(self.error(
                            ParseErrorKind::InvalidSyntax,
                            "Expected closing parenthesis after dotted pair",
                            Some(&other),
                        )),
                        None => Err(self.unexpected_end(UNTERMINATED)),
                    };
                }
                _ => {
                    self.tokens.push_back(token);
                    let element = self.parse_required(depth + 1, UNTERMINATED)?;
                    elements.push(element);
                }
            }
        }
    }
}

impl Iterator for Reader<'_> {
    type Item = Result<Expr, Error>;

    fn next(&mut self) -> Option<Self::Item> {
        self.read().transpose()
    }
}

/// Integers become numbers, everything else becomes an interned symbol
fn parse_atom(text: &str) -> Expr {
    match text.parse::<NumberType>() {
        Ok(n) => Expr::Number(n),
        Err(_) => Expr::Symbol(intern(text)),
    }
}

/// Parse the first expression in `source`
pub fn parse(source: &str) -> Result<Expr, Error> {
    Reader::new(source).read_required()
}

/// Parse every expression in `source`, stopping at the first error
pub fn parse_all(source: &str) -> Result<Vec<Expr>, Error> {
    Reader::new(source).collect()
}
