//! Lexer/tokenizer for the filter language.
//!
//! Tokenizing is context sensitive: bare values may contain `:`, `=`, `<`
//! and other operator characters, so the lexer tracks whether it expects an
//! operand, an operator after a key, a single value, or list items.

use winnow::ascii::{multispace0, multispace1};
use winnow::combinator::{alt, eof, peek, repeat};
use winnow::prelude::*;
use winnow::token::{one_of, take_while};

use super::ast::{CompareOp, ListOp, Scalar};
use super::error::{FilterError, Result};

/// Token types for the filter language.
#[derive(Debug, Clone, PartialEq)]
pub enum Token {
    Key(String),
    ValueOp(CompareOp),
    ListOp(ListOp),
    Value(Scalar),

    // Keywords
    Not,
    And,
    Or,

    // Punctuation
    Minus,  // -
    Comma,  // ,
    LParen, // (
    RParen, // )

    Eof,
}

/// A token and the byte offset it starts at.
#[derive(Debug, Clone, PartialEq)]
pub struct Spanned {
    pub token: Token,
    pub offset: usize,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Mode {
    Operand,
    AfterKey,
    Value,
    List,
}

// Manually define PResult for resilience against winnow version changes
type PResult<T> = std::result::Result<T, winnow::error::ErrMode<winnow::error::ContextError>>;

fn is_bare_char(c: char) -> bool {
    c.is_ascii_alphanumeric()
        || matches!(
            c,
            '-' | '^'
                | ':'
                | '['
                | ']'
                | '@'
                | '.'
                | '*'
                | '!'
                | '£'
                | '$'
                | '%'
                | '|'
                | '\\'
                | '/'
                | '_'
                | '+'
                | '='
                | '{'
                | '}'
                | ';'
                | '~'
                | '#'
                | '<'
                | '>'
                | '?'
        )
}

/// Lex one identifier segment: letter or underscore, then alphanumerics.
fn lex_segment<'a>(input: &mut &'a str) -> PResult<&'a str> {
    (
        one_of(|c: char| c.is_ascii_alphabetic() || c == '_'),
        take_while(0.., |c: char| c.is_ascii_alphanumeric() || c == '_'),
    )
        .take()
        .parse_next(input)
}

/// Lex a dotted key: `segment ("." segment)*`.
fn lex_key(input: &mut &str) -> PResult<Token> {
    let key = (lex_segment, repeat::<_, _, (), _, _>(0.., ('.', lex_segment)))
        .take()
        .parse_next(input)?;
    Ok(Token::Key(key.to_string()))
}

/// Lex `NOT`, `AND` or `OR` standing on their own.
fn lex_keyword(input: &mut &str) -> PResult<Token> {
    let token = alt((
        "NOT".value(Token::Not),
        "AND".value(Token::And),
        "OR".value(Token::Or),
    ))
    .parse_next(input)?;
    peek(alt((multispace1, "(", eof))).parse_next(input)?;
    Ok(token)
}

fn lex_operand(input: &mut &str) -> PResult<Token> {
    alt((
        "(".value(Token::LParen),
        ")".value(Token::RParen),
        "-".value(Token::Minus),
        lex_keyword,
        lex_key,
    ))
    .parse_next(input)
}

fn lex_operator(input: &mut &str) -> PResult<Token> {
    alt((
        // List operators before their single-char prefixes
        ":(".value(Token::ListOp(ListOp::Has)),
        "=(".value(Token::ListOp(ListOp::Eq)),
        "!=".value(Token::ValueOp(CompareOp::Ne)),
        "!~".value(Token::ValueOp(CompareOp::NotMatch)),
        "<=".value(Token::ValueOp(CompareOp::Le)),
        ">=".value(Token::ValueOp(CompareOp::Ge)),
        ":".value(Token::ValueOp(CompareOp::Has)),
        "=".value(Token::ValueOp(CompareOp::Eq)),
        "<".value(Token::ValueOp(CompareOp::Lt)),
        ">".value(Token::ValueOp(CompareOp::Gt)),
        "~".value(Token::ValueOp(CompareOp::Match)),
    ))
    .parse_next(input)
}

/// Lex a quoted string. A quote preceded by a backslash does not close it;
/// escapes are kept verbatim in the text.
fn lex_quoted(input: &mut &str) -> PResult<Scalar> {
    let quote = one_of(['"', '\'']).parse_next(input)?;
    let mut escaped = false;
    for (i, c) in input.char_indices() {
        if escaped {
            escaped = false;
        } else if c == '\\' {
            escaped = true;
        } else if c == quote {
            let text = input[..i].to_string();
            *input = &input[i + c.len_utf8()..];
            return Ok(Scalar::Quoted { text, quote });
        }
    }
    Err(winnow::error::ErrMode::Cut(
        winnow::error::ContextError::default(),
    ))
}

/// Lex an unquoted value. Runs that look like unsigned numbers become
/// `Scalar::Number`.
fn lex_bare(input: &mut &str) -> PResult<Scalar> {
    let text = take_while(1.., is_bare_char).parse_next(input)?;
    let numeric = text.starts_with(|c: char| c.is_ascii_digit() || c == '.')
        && super::ast::parse_number(text).is_some();
    if numeric {
        Ok(Scalar::Number(text.to_string()))
    } else {
        Ok(Scalar::Bare(text.to_string()))
    }
}

fn lex_value(input: &mut &str) -> PResult<Token> {
    alt((lex_quoted, lex_bare)).map(Token::Value).parse_next(input)
}

fn lex_list_item(input: &mut &str) -> PResult<Token> {
    alt((
        ")".value(Token::RParen),
        ",".value(Token::Comma),
        lex_value,
    ))
    .parse_next(input)
}

fn describe_failure(mode: Mode, remaining: &str) -> String {
    let found = match remaining.chars().next() {
        Some(c) => format!("'{}'", c),
        None => "end of input".to_string(),
    };
    match mode {
        Mode::Operand => format!("expected a key, '(', '-' or NOT, found {}", found),
        Mode::AfterKey => format!("expected a comparison operator after key, found {}", found),
        Mode::Value | Mode::List if remaining.starts_with(['"', '\'']) => {
            "unterminated quoted string".to_string()
        }
        Mode::Value => format!("expected a value, found {}", found),
        Mode::List => format!("expected a list value, ',' or ')', found {}", found),
    }
}

/// Tokenize the entire input.
pub fn tokenize(input: &str) -> Result<Vec<Spanned>> {
    let mut remaining = input;
    let mut tokens = Vec::new();
    let mut mode = Mode::Operand;

    loop {
        let _: PResult<&str> = multispace0.parse_next(&mut remaining);
        let offset = input.len() - remaining.len();

        if remaining.is_empty() {
            break;
        }

        let lexed = match mode {
            Mode::Operand => lex_operand(&mut remaining),
            Mode::AfterKey => lex_operator(&mut remaining),
            Mode::Value => lex_value(&mut remaining),
            Mode::List => lex_list_item(&mut remaining),
        };

        let token = match lexed {
            Ok(token) => token,
            Err(_) => {
                let rest = &input[offset..];
                return Err(FilterError::syntax(offset, describe_failure(mode, rest)));
            }
        };

        mode = match (&token, mode) {
            (Token::Key(_), _) => Mode::AfterKey,
            (Token::ValueOp(_), _) => Mode::Value,
            (Token::ListOp(_), _) => Mode::List,
            (Token::RParen, Mode::List) => Mode::Operand,
            (Token::Comma, Mode::List) | (Token::Value(_), Mode::List) => Mode::List,
            _ => Mode::Operand,
        };

        tokens.push(Spanned { token, offset });
    }

    tokens.push(Spanned {
        token: Token::Eof,
        offset: input.len(),
    });
    Ok(tokens)
}
