//! Parser for the filter language.
//!
//! Grammar (in rough EBNF):
//!
//! filter     = sequence EOF
//! sequence   = unary (("AND" | "OR")? unary)*
//! unary      = "NOT" unary | primary
//! primary    = "(" sequence ")" | term
//! term       = "-" KEY ":" "*"
//!            | KEY ":" "*"
//!            | KEY value_op VALUE
//!            | KEY list_op VALUE (","? VALUE)* ")"
//! value_op   = ":" | "=" | "!=" | "<" | "<=" | ">" | ">=" | "~" | "!~"
//! list_op    = ":(" | "=("
//!
//! A sequence keeps every operator it saw; whether they agree is checked by
//! the evaluator.

use super::ast::{BinaryOp, CompareOp, DottedKey, FilterAst, Scalar, UnaryOp};
use super::error::{FilterError, Result};
use super::lexer::{Spanned, Token, tokenize};

/// Deepest allowed nesting of parentheses and `NOT`.
const MAX_DEPTH: usize = 256;

/// Parser state.
struct Parser {
    tokens: Vec<Spanned>,
    pos: usize,
    depth: usize,
}

impl Parser {
    fn new(tokens: Vec<Spanned>) -> Self {
        Parser {
            tokens,
            pos: 0,
            depth: 0,
        }
    }

    fn descend(&mut self) -> Result<()> {
        self.depth += 1;
        if self.depth > MAX_DEPTH {
            return Err(FilterError::syntax(
                self.offset(),
                format!("nesting too deep (limit {})", MAX_DEPTH),
            ));
        }
        Ok(())
    }

    fn peek(&self) -> &Token {
        self.tokens
            .get(self.pos)
            .map(|s| &s.token)
            .unwrap_or(&Token::Eof)
    }

    fn offset(&self) -> usize {
        match self.tokens.get(self.pos) {
            Some(spanned) => spanned.offset,
            None => self.tokens.last().map(|s| s.offset).unwrap_or(0),
        }
    }

    fn advance(&mut self) -> Token {
        let tok = self
            .tokens
            .get(self.pos)
            .map(|s| s.token.clone())
            .unwrap_or(Token::Eof);
        self.pos += 1;
        tok
    }

    fn unexpected(&self, expected: &str) -> FilterError {
        FilterError::syntax(
            self.offset(),
            format!("expected {}, got {}", expected, describe(self.peek())),
        )
    }

    /// Parse the top-level filter expression.
    fn parse_filter(&mut self) -> Result<FilterAst> {
        if matches!(self.peek(), Token::Eof) {
            return Err(FilterError::syntax(0, "empty filter"));
        }
        self.parse_sequence()
    }

    /// Parse sequence: unary (("AND" | "OR")? unary)*
    fn parse_sequence(&mut self) -> Result<FilterAst> {
        let mut operands = vec![self.parse_unary()?];
        let mut operators = Vec::new();

        loop {
            let op = match self.peek() {
                Token::And => {
                    self.advance();
                    BinaryOp::And
                }
                Token::Or => {
                    self.advance();
                    BinaryOp::Or
                }
                Token::Key(_) | Token::LParen | Token::Minus | Token::Not => BinaryOp::ImplicitAnd,
                _ => break,
            };
            operators.push(op);
            operands.push(self.parse_unary()?);
        }

        if operators.is_empty() {
            Ok(operands.remove(0))
        } else {
            Ok(FilterAst::Binary {
                operands,
                operators,
            })
        }
    }

    /// Parse unary expression: "NOT" unary | primary
    fn parse_unary(&mut self) -> Result<FilterAst> {
        if matches!(self.peek(), Token::Not) {
            self.advance(); // consume NOT
            self.descend()?;
            let operand = self.parse_unary()?;
            self.depth -= 1;
            Ok(FilterAst::Unary {
                op: UnaryOp::Not,
                operand: Box::new(operand),
            })
        } else {
            self.parse_primary()
        }
    }

    /// Parse primary expression: "(" sequence ")" | term
    fn parse_primary(&mut self) -> Result<FilterAst> {
        match self.peek() {
            Token::LParen => {
                self.advance(); // consume (
                if matches!(self.peek(), Token::RParen) {
                    return Err(self.unexpected("an expression inside parentheses"));
                }
                self.descend()?;
                let expr = self.parse_sequence()?;
                self.depth -= 1;
                if !matches!(self.peek(), Token::RParen) {
                    return Err(self.unexpected("')'"));
                }
                self.advance();
                Ok(FilterAst::Group {
                    expr: Box::new(expr),
                })
            }
            Token::Minus => self.parse_not_defined(),
            Token::Key(_) => self.parse_term(),
            _ => Err(self.unexpected("a term, '(' or NOT")),
        }
    }

    /// Parse negated presence: "-" KEY ":" "*"
    fn parse_not_defined(&mut self) -> Result<FilterAst> {
        self.advance(); // consume -
        let start = self.offset();
        let key = self.parse_key()?;
        match self.parse_term_tail(key)? {
            FilterAst::IsDefined { key } => Ok(FilterAst::NotDefined { key }),
            _ => Err(FilterError::syntax(
                start,
                "'-' may only negate a presence test of the form '- key:*'",
            )),
        }
    }

    fn parse_key(&mut self) -> Result<DottedKey> {
        if let Token::Key(text) = self.peek() {
            let key = DottedKey::new(text.split('.').map(String::from).collect());
            self.advance();
            Ok(key)
        } else {
            Err(self.unexpected("a key"))
        }
    }

    /// Parse term: KEY followed by a value or list comparison.
    fn parse_term(&mut self) -> Result<FilterAst> {
        let key = self.parse_key()?;
        self.parse_term_tail(key)
    }

    fn parse_term_tail(&mut self, key: DottedKey) -> Result<FilterAst> {
        match self.advance() {
            Token::ValueOp(op) => {
                let value = self.parse_value()?;
                match (op, &value) {
                    (CompareOp::Has, Scalar::Bare(text)) if text == "*" => {
                        Ok(FilterAst::IsDefined { key })
                    }
                    _ => Ok(FilterAst::Compare { key, op, value }),
                }
            }
            Token::ListOp(op) => {
                let values = self.parse_list_items()?;
                Ok(FilterAst::CompareList { key, op, values })
            }
            _ => {
                self.pos -= 1;
                Err(self.unexpected("a comparison operator"))
            }
        }
    }

    fn parse_value(&mut self) -> Result<Scalar> {
        if let Token::Value(value) = self.peek() {
            let value = value.clone();
            self.advance();
            Ok(value)
        } else {
            Err(self.unexpected("a value"))
        }
    }

    /// Parse list items: VALUE (","? VALUE)* ")"
    fn parse_list_items(&mut self) -> Result<Vec<Scalar>> {
        let mut values = vec![self.parse_value()?];

        loop {
            match self.peek() {
                Token::RParen => {
                    self.advance();
                    return Ok(values);
                }
                Token::Comma => {
                    self.advance();
                    values.push(self.parse_value()?);
                }
                Token::Value(_) => values.push(self.parse_value()?),
                _ => return Err(self.unexpected("',' or ')' in value list")),
            }
        }
    }
}

fn describe(token: &Token) -> String {
    match token {
        Token::Key(key) => format!("key '{}'", key),
        Token::ValueOp(op) => format!("operator '{}'", op),
        Token::ListOp(op) => format!("operator '{}'", op),
        Token::Value(value) => format!("value {}", value),
        Token::Not => "NOT".to_string(),
        Token::And => "AND".to_string(),
        Token::Or => "OR".to_string(),
        Token::Minus => "'-'".to_string(),
        Token::Comma => "','".to_string(),
        Token::LParen => "'('".to_string(),
        Token::RParen => "')'".to_string(),
        Token::Eof => "end of input".to_string(),
    }
}

/// Parse a filter string into an AST.
pub fn parse_filter(input: &str) -> Result<FilterAst> {
    let tokens = tokenize(input)?;
    let mut parser = Parser::new(tokens);
    let ast = parser.parse_filter()?;

    // Ensure we consumed all tokens
    if !matches!(parser.peek(), Token::Eof) {
        return Err(parser.unexpected("end of input"));
    }

    Ok(ast)
}
