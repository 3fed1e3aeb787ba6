//! Declarative resource manifests.
//!
//! A manifest is a stream of records:
//!
//! ```text
//! // type     name          state   type-specific parameters   terminator
//! texture    "Tex1"          LOAD    "textures/tex1.dds" 0xFF00FF00 ;
//! font       "Console"               "Courier New" 14 bold ;
//! ```
//!
//! The registry reads the type, name and optional `LOAD` / `LOCK` keyword;
//! the type's factory consumes everything up to and including `;` through
//! [`Params`].

use crate::error::ParseError;
use crate::resource::ResourceState;

/// Lexical token.
#[derive(Debug, Clone, PartialEq)]
pub enum Token {
    Ident(String),
    Str(String),
    Number(f64),
    Symbol(char),
    Eof,
}

impl Token {
    fn describe(&self) -> String {
        match self {
            Token::Ident(s) => format!("identifier `{}`", s),
            Token::Str(s) => format!("string \"{}\"", s),
            Token::Number(n) => format!("number {}", n),
            Token::Symbol(c) => format!("`{}`", c),
            Token::Eof => "end of input".to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
struct Spanned {
    token: Token,
    line: u32,
    column: u32,
}

/// Splits manifest text into tokens, skipping whitespace and comments.
fn tokenize(source_name: &str, text: &str) -> Result<Vec<Spanned>, ParseError> {
    let mut tokens = Vec::new();
    let mut chars = text.chars().peekable();
    let (mut line, mut column) = (1u32, 1u32);

    let err = |line, column, message: String| ParseError {
        source_name: source_name.to_string(),
        line,
        column,
        message,
    };

    // Advances one char, keeping line/column in step.
    macro_rules! bump {
        () => {{
            let c = chars.next();
            if c == Some('\n') {
                line += 1;
                column = 1;
            } else if c.is_some() {
                column += 1;
            }
            c
        }};
    }

    while let Some(&c) = chars.peek() {
        let (start_line, start_column) = (line, column);

        if c.is_whitespace() {
            bump!();
            continue;
        }

        if c == '/' {
            bump!();
            match chars.peek() {
                Some('/') => {
                    while let Some(&c) = chars.peek() {
                        if c == '\n' {
                            break;
                        }
                        bump!();
                    }
                    continue;
                }
                Some('*') => {
                    bump!();
                    let mut prev = '\0';
                    loop {
                        match bump!() {
                            Some('/') if prev == '*' => break,
                            Some(c) => prev = c,
                            None => {
                                return Err(err(
                                    start_line,
                                    start_column,
                                    "unterminated block comment".to_string(),
                                ))
                            }
                        }
                    }
                    continue;
                }
                _ => {
                    tokens.push(Spanned {
                        token: Token::Symbol('/'),
                        line: start_line,
                        column: start_column,
                    });
                    continue;
                }
            }
        }

        let token = if c == '"' {
            bump!();
            let mut value = String::new();
            loop {
                match bump!() {
                    Some('"') => break,
                    Some('\\') => match bump!() {
                        Some('n') => value.push('\n'),
                        Some('t') => value.push('\t'),
                        Some(other) => value.push(other),
                        None => {
                            return Err(err(
                                start_line,
                                start_column,
                                "unterminated string".to_string(),
                            ))
                        }
                    },
                    Some(other) => value.push(other),
                    None => {
                        return Err(err(
                            start_line,
                            start_column,
                            "unterminated string".to_string(),
                        ))
                    }
                }
            }
            Token::Str(value)
        } else if c.is_ascii_alphabetic() || c == '_' {
            let mut value = String::new();
            while let Some(&c) = chars.peek() {
                if !(c.is_ascii_alphanumeric() || c == '_') {
                    break;
                }
                value.push(c);
                bump!();
            }
            Token::Ident(value)
        } else if c.is_ascii_digit() || (matches!(c, '-' | '+' | '.') && digit_follows(c, &chars)) {
            let mut text = String::new();
            while let Some(&c) = chars.peek() {
                let exponent_sign = (c == '-' || c == '+')
                    && matches!(text.chars().last(), Some('e' | 'E'))
                    && !text.starts_with("0x");
                if !(c.is_ascii_alphanumeric() || c == '.' || exponent_sign || text.is_empty()) {
                    break;
                }
                text.push(c);
                bump!();
            }
            Token::Number(parse_number(&text).ok_or_else(|| {
                err(
                    start_line,
                    start_column,
                    format!("invalid number `{}`", text),
                )
            })?)
        } else {
            bump!();
            Token::Symbol(c)
        };

        tokens.push(Spanned {
            token,
            line: start_line,
            column: start_column,
        });
    }

    tokens.push(Spanned {
        token: Token::Eof,
        line,
        column,
    });
    Ok(tokens)
}

/// True when the sign or dot `c` at the head of `chars` starts a number:
/// a digit follows, or for a sign, a dot and then a digit.
fn digit_follows(c: char, chars: &std::iter::Peekable<std::str::Chars<'_>>) -> bool {
    let mut ahead = chars.clone();
    ahead.next();
    match ahead.next() {
        Some(d) if d.is_ascii_digit() => true,
        Some('.') if c != '.' => ahead.next().is_some_and(|d| d.is_ascii_digit()),
        _ => false,
    }
}

fn parse_number(text: &str) -> Option<f64> {
    let (negative, digits) = match text.strip_prefix('-') {
        Some(rest) => (true, rest),
        None => (false, text.strip_prefix('+').unwrap_or(text)),
    };
    let value = match digits
        .strip_prefix("0x")
        .or_else(|| digits.strip_prefix("0X"))
    {
        Some(hex) => u64::from_str_radix(hex, 16).ok()? as f64,
        None => digits.parse::<f64>().ok()?,
    };
    Some(if negative { -value } else { value })
}

/// Cursor over manifest tokens.
///
/// Factories receive this positioned just after the record header and must
/// consume their parameters and the terminating `;` (see [`Params::finish`]).
#[derive(Debug, Clone)]
pub struct Params {
    source_name: String,
    tokens: Vec<Spanned>,
    pos: usize,
}

impl Params {
    /// Tokenizes `text`. `source_name` is used in error positions.
    pub fn parse(source_name: &str, text: &str) -> Result<Self, ParseError> {
        Ok(Self {
            source_name: source_name.to_string(),
            tokens: tokenize(source_name, text)?,
            pos: 0,
        })
    }

    fn current(&self) -> &Spanned {
        // The token list always ends with Eof and pos never passes it.
        &self.tokens[self.pos.min(self.tokens.len() - 1)]
    }

    pub fn peek(&self) -> &Token {
        &self.current().token
    }

    pub fn next_token(&mut self) -> Token {
        let token = self.current().token.clone();
        if token != Token::Eof {
            self.pos += 1;
        }
        token
    }

    pub fn at_eof(&self) -> bool {
        *self.peek() == Token::Eof
    }

    /// True when the next token ends the current record.
    pub fn at_record_end(&self) -> bool {
        matches!(self.peek(), Token::Symbol(';') | Token::Eof)
    }

    /// Builds an error positioned at the current token.
    pub fn error(&self, message: impl Into<String>) -> ParseError {
        let at = self.current();
        ParseError {
            source_name: self.source_name.clone(),
            line: at.line,
            column: at.column,
            message: message.into(),
        }
    }

    fn unexpected(&self, expected: &str) -> ParseError {
        self.error(format!("expected {}, found {}", expected, self.peek().describe()))
    }

    pub fn expect_ident(&mut self) -> Result<String, ParseError> {
        match self.peek() {
            Token::Ident(s) => {
                let s = s.clone();
                self.pos += 1;
                Ok(s)
            }
            _ => Err(self.unexpected("identifier")),
        }
    }

    pub fn expect_string(&mut self) -> Result<String, ParseError> {
        match self.peek() {
            Token::Str(s) => {
                let s = s.clone();
                self.pos += 1;
                Ok(s)
            }
            _ => Err(self.unexpected("string")),
        }
    }

    pub fn expect_number(&mut self) -> Result<f64, ParseError> {
        match *self.peek() {
            Token::Number(n) => {
                self.pos += 1;
                Ok(n)
            }
            _ => Err(self.unexpected("number")),
        }
    }

    pub fn expect_u32(&mut self) -> Result<u32, ParseError> {
        let at = self.pos;
        let n = self.expect_number()?;
        if n.fract() != 0.0 || n < 0.0 || n > u32::MAX as f64 {
            self.pos = at;
            return Err(self.error(format!("expected unsigned integer, found {}", n)));
        }
        Ok(n as u32)
    }

    pub fn expect_symbol(&mut self, symbol: char) -> Result<(), ParseError> {
        if *self.peek() == Token::Symbol(symbol) {
            self.pos += 1;
            Ok(())
        } else {
            Err(self.unexpected(&format!("`{}`", symbol)))
        }
    }

    /// Consumes the identifier `keyword` if it is next.
    pub fn try_keyword(&mut self, keyword: &str) -> bool {
        if matches!(self.peek(), Token::Ident(s) if s == keyword) {
            self.pos += 1;
            true
        } else {
            false
        }
    }

    /// Consumes the record terminator. End of input also terminates a record,
    /// so parameter strings passed programmatically may omit the `;`.
    pub fn finish(&mut self) -> Result<(), ParseError> {
        match self.peek() {
            Token::Symbol(';') => {
                self.pos += 1;
                Ok(())
            }
            Token::Eof => Ok(()),
            _ => Err(self.unexpected("`;`")),
        }
    }
}

/// Header of one manifest record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecordHeader {
    pub kind: String,
    pub name: String,
    pub initial_state: ResourceState,
}

/// Reads `type "name" [LOAD|LOCK]`, leaving the stream at the parameters.
pub fn read_record_header(params: &mut Params) -> Result<RecordHeader, ParseError> {
    let kind = params.expect_ident()?;
    let name = params.expect_string()?;
    let initial_state = if params.try_keyword("LOAD") {
        ResourceState::Loaded
    } else if params.try_keyword("LOCK") {
        ResourceState::Locked
    } else {
        ResourceState::Unloaded
    };
    Ok(RecordHeader {
        kind,
        name,
        initial_state,
    })
}
