//! Rule source lexer.
//!
//! Pull-based: the compiler asks for one token at a time and may peek one
//! ahead.  Event names after `on` are read raw (any run of non-blank
//! characters) through [`Lexer::event_name`], because labels such as
//! `timer=3` or `System#Boot` are not expression tokens.

use crate::error::{ParseError, ParseReason};
use crate::rules::token::SENSOR_PREFIX;
use crate::rules::value::Value;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Keyword {
    On,
    Then,
    End,
    If,
    ElseIf,
    Else,
    Null,
}

impl Keyword {
    fn from_word(word: &str) -> Option<Self> {
        [
            ("on", Self::On),
            ("then", Self::Then),
            ("end", Self::End),
            ("if", Self::If),
            ("elseif", Self::ElseIf),
            ("else", Self::Else),
            ("null", Self::Null),
        ]
        .into_iter()
        .find_map(|(k, kw)| k.eq_ignore_ascii_case(word).then_some(kw))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Symbol {
    Plus,
    Minus,
    Star,
    Slash,
    Percent,
    Caret,
    EqEq,
    NotEq,
    Lt,
    Le,
    Gt,
    Ge,
    AndAnd,
    OrOr,
    Bang,
    Assign,
    LParen,
    RParen,
    Comma,
    Semicolon,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Tok<'a> {
    /// Identifier text, sigil included.  Classified by the compiler.
    Word(&'a str),
    Keyword(Keyword),
    Number(Value),
    Sym(Symbol),
    Eof,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Spanned<'a> {
    pub tok: Tok<'a>,
    pub line: u32,
}

pub struct Lexer<'a> {
    src: &'a str,
    pos: usize,
    line: u32,
    peeked: Option<Spanned<'a>>,
}

impl<'a> Lexer<'a> {
    pub fn new(src: &'a str) -> Self {
        Self {
            src,
            pos: 0,
            line: 1,
            peeked: None,
        }
    }

    /// Line of the next unread token (or of the peeked one).
    pub fn line(&self) -> u32 {
        self.peeked.map_or(self.line, |p| p.line)
    }

    pub fn peek(&mut self) -> Result<Spanned<'a>, ParseError> {
        if let Some(p) = self.peeked {
            return Ok(p);
        }
        let p = self.scan()?;
        self.peeked = Some(p);
        Ok(p)
    }

    pub fn bump(&mut self) -> Result<Spanned<'a>, ParseError> {
        match self.peeked.take() {
            Some(p) => Ok(p),
            None => self.scan(),
        }
    }

    /// Read the raw event label following `on`.
    pub fn event_name(&mut self) -> Result<(&'a str, u32), ParseError> {
        if let Some(p) = self.peeked {
            return Err(ParseError::new(p.line, ParseReason::InvalidEventName, ""));
        }
        self.skip_trivia();
        let rest = &self.src[self.pos..];
        let len = rest.find(char::is_whitespace).unwrap_or(rest.len());
        if len == 0 {
            return Err(ParseError::new(self.line, ParseReason::UnexpectedEnd, ""));
        }
        self.pos += len;
        Ok((&rest[..len], self.line))
    }

    fn skip_trivia(&mut self) {
        let bytes = self.src.as_bytes();
        while self.pos < bytes.len() {
            match bytes[self.pos] {
                b'\n' => {
                    self.line += 1;
                    self.pos += 1;
                }
                b' ' | b'\t' | b'\r' => self.pos += 1,
                b'/' if bytes.get(self.pos + 1) == Some(&b'/') => {
                    while self.pos < bytes.len() && bytes[self.pos] != b'\n' {
                        self.pos += 1;
                    }
                }
                _ => break,
            }
        }
    }

    fn scan(&mut self) -> Result<Spanned<'a>, ParseError> {
        self.skip_trivia();
        let line = self.line;
        let rest = &self.src[self.pos..];
        let Some(first) = rest.bytes().next() else {
            return Ok(Spanned { tok: Tok::Eof, line });
        };

        let (tok, len) = if first.is_ascii_digit() {
            scan_number(rest).ok_or_else(|| {
                ParseError::new(line, ParseReason::InvalidNumber, number_text(rest))
            })?
        } else if let Some(len) = word_span(rest) {
            let word = &rest[..len];
            let tok = match Keyword::from_word(word) {
                Some(kw) => Tok::Keyword(kw),
                None => Tok::Word(word),
            };
            (tok, len)
        } else if let Some((sym, len)) = scan_symbol(rest) {
            (Tok::Sym(sym), len)
        } else {
            let end = rest.chars().next().map_or(1, char::len_utf8);
            return Err(ParseError::new(line, ParseReason::UnexpectedToken, &rest[..end]));
        };

        self.pos += len;
        Ok(Spanned { tok, line })
    }
}

fn is_word_byte(b: u8) -> bool {
    b.is_ascii_alphanumeric() || b == b'_'
}

fn word_span(rest: &str) -> Option<usize> {
    let bytes = rest.as_bytes();
    let prefix = SENSOR_PREFIX.len();
    if bytes
        .get(..prefix)
        .is_some_and(|p| p.eq_ignore_ascii_case(SENSOR_PREFIX.as_bytes()))
    {
        return Some(prefix + bytes[prefix..].iter().take_while(|&&b| is_word_byte(b)).count());
    }
    match bytes[0] {
        b'$' | b'#' | b'@' | b'?' => {
            Some(1 + bytes[1..].iter().take_while(|&&b| is_word_byte(b)).count())
        }
        b'%' if bytes.get(1).is_some_and(u8::is_ascii_alphabetic) => {
            Some(1 + bytes[1..].iter().take_while(|&&b| is_word_byte(b)).count())
        }
        b if b.is_ascii_alphabetic() || b == b'_' => {
            Some(bytes.iter().take_while(|&&b| is_word_byte(b)).count())
        }
        _ => None,
    }
}

fn number_text(rest: &str) -> &str {
    let len = rest
        .bytes()
        .take_while(|&b| b.is_ascii_alphanumeric() || b == b'.')
        .count();
    &rest[..len]
}

fn scan_number(rest: &str) -> Option<(Tok<'_>, usize)> {
    let bytes = rest.as_bytes();
    let mut len = bytes.iter().take_while(|b| b.is_ascii_digit()).count();
    let mut float = false;
    if bytes.get(len) == Some(&b'.') && bytes.get(len + 1).is_some_and(u8::is_ascii_digit) {
        float = true;
        len += 1 + bytes[len + 1..].iter().take_while(|b| b.is_ascii_digit()).count();
    }
    // `12abc` is neither a number nor a name.
    if bytes.get(len).is_some_and(|&b| is_word_byte(b)) {
        return None;
    }
    let text = &rest[..len];
    let value = if float {
        Value::from_float(text.parse().ok()?)
    } else {
        Value::Integer(text.parse().ok()?)
    };
    Some((Tok::Number(value), len))
}

fn scan_symbol(rest: &str) -> Option<(Symbol, usize)> {
    let bytes = rest.as_bytes();
    let two = |second: u8| bytes.get(1) == Some(&second);
    Some(match bytes[0] {
        b'+' => (Symbol::Plus, 1),
        b'-' => (Symbol::Minus, 1),
        b'*' => (Symbol::Star, 1),
        b'/' => (Symbol::Slash, 1),
        b'%' => (Symbol::Percent, 1),
        b'^' => (Symbol::Caret, 1),
        b'=' if two(b'=') => (Symbol::EqEq, 2),
        b'=' => (Symbol::Assign, 1),
        b'!' if two(b'=') => (Symbol::NotEq, 2),
        b'!' => (Symbol::Bang, 1),
        b'<' if two(b'=') => (Symbol::Le, 2),
        b'<' => (Symbol::Lt, 1),
        b'>' if two(b'=') => (Symbol::Ge, 2),
        b'>' => (Symbol::Gt, 1),
        b'&' if two(b'&') => (Symbol::AndAnd, 2),
        b'|' if two(b'|') => (Symbol::OrOr, 2),
        b'(' => (Symbol::LParen, 1),
        b')' => (Symbol::RParen, 1),
        b',' => (Symbol::Comma, 1),
        b';' => (Symbol::Semicolon, 1),
        _ => return None,
    })
}
