//! AST types for the filter language.

use serde::Serialize;
use std::fmt;

/// Root filter expression.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum FilterAst {
    /// Value comparison: `name=instance-1`, `tags.items~^prod`
    Compare {
        key: DottedKey,
        op: CompareOp,
        value: Scalar,
    },

    /// List comparison: `zone:(a, b)`, `status=(RUNNING STOPPED)`
    CompareList {
        key: DottedKey,
        op: ListOp,
        values: Vec<Scalar>,
    },

    /// Key presence: `zone:*`
    IsDefined { key: DottedKey },

    /// Key absence: `- zone:*`
    NotDefined { key: DottedKey },

    /// Unary logical operator: `NOT expr`
    Unary {
        op: UnaryOp,
        operand: Box<FilterAst>,
    },

    /// Flat run of operands joined by `AND`, `OR` or whitespace.
    ///
    /// `operators.len() == operands.len() - 1`; `operators[i]` sits between
    /// `operands[i]` and `operands[i + 1]`. Mixing AND and OR is only
    /// detected when the node is evaluated.
    Binary {
        operands: Vec<FilterAst>,
        operators: Vec<BinaryOp>,
    },

    /// Parenthesised sub-expression. Kept so rendering round-trips.
    Group { expr: Box<FilterAst> },
}

/// A `.`-separated key path, e.g. `scheduling.automaticRestart`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
#[serde(into = "String")]
pub struct DottedKey {
    segments: Vec<String>,
}

impl DottedKey {
    pub fn new(segments: Vec<String>) -> Self {
        DottedKey { segments }
    }

    pub fn segments(&self) -> &[String] {
        &self.segments
    }
}

impl From<DottedKey> for String {
    fn from(key: DottedKey) -> Self {
        key.to_string()
    }
}

impl fmt::Display for DottedKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.segments.join("."))
    }
}

/// A literal on the right-hand side of a comparison.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "type", content = "text", rename_all = "snake_case")]
pub enum Scalar {
    /// Unsigned integer or decimal literal, kept as written.
    Number(String),
    /// Unquoted run of permitted characters.
    Bare(String),
    /// Quoted literal with the outer quotes stripped. Inner escapes are
    /// kept verbatim.
    Quoted { text: String, quote: char },
}

impl Scalar {
    /// Text used for comparison.
    pub fn text(&self) -> &str {
        match self {
            Scalar::Number(s) | Scalar::Bare(s) => s,
            Scalar::Quoted { text, .. } => text,
        }
    }

    pub fn as_f64(&self) -> Option<f64> {
        parse_number(self.text())
    }

    pub fn as_integer(&self) -> Option<i128> {
        parse_integer(self.text())
    }
}

impl fmt::Display for Scalar {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Scalar::Number(s) | Scalar::Bare(s) => write!(f, "{}", s),
            Scalar::Quoted { text, quote } => write!(f, "{quote}{text}{quote}"),
        }
    }
}

/// Value comparison operator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum CompareOp {
    Has,      // :
    Eq,       // =
    Ne,       // !=
    Lt,       // <
    Le,       // <=
    Gt,       // >
    Ge,       // >=
    Match,    // ~
    NotMatch, // !~
}

impl fmt::Display for CompareOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CompareOp::Has => write!(f, ":"),
            CompareOp::Eq => write!(f, "="),
            CompareOp::Ne => write!(f, "!="),
            CompareOp::Lt => write!(f, "<"),
            CompareOp::Le => write!(f, "<="),
            CompareOp::Gt => write!(f, ">"),
            CompareOp::Ge => write!(f, ">="),
            CompareOp::Match => write!(f, "~"),
            CompareOp::NotMatch => write!(f, "!~"),
        }
    }
}

/// List comparison operator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ListOp {
    Has, // :(
    Eq,  // =(
}

impl ListOp {
    /// The per-candidate comparison this list operator applies.
    pub fn element_op(self) -> CompareOp {
        match self {
            ListOp::Has => CompareOp::Has,
            ListOp::Eq => CompareOp::Eq,
        }
    }
}

impl fmt::Display for ListOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ListOp::Has => write!(f, ":("),
            ListOp::Eq => write!(f, "=("),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum UnaryOp {
    Not,
    /// Any other unary keyword. The grammar has no way to produce this today.
    Other(String),
}

impl fmt::Display for UnaryOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            UnaryOp::Not => write!(f, "NOT"),
            UnaryOp::Other(name) => write!(f, "{}", name),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum BinaryOp {
    And,
    Or,
    /// Adjacent operands with no keyword between them.
    ImplicitAnd,
}

impl BinaryOp {
    pub fn is_and(self) -> bool {
        matches!(self, BinaryOp::And | BinaryOp::ImplicitAnd)
    }
}

impl fmt::Display for BinaryOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BinaryOp::And => write!(f, " AND "),
            BinaryOp::Or => write!(f, " OR "),
            BinaryOp::ImplicitAnd => write!(f, " "),
        }
    }
}

impl fmt::Display for FilterAst {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FilterAst::Compare { key, op, value } => write!(f, "{key}{op}{value}"),
            FilterAst::CompareList { key, op, values } => {
                write!(f, "{key}{op}")?;
                for (i, value) in values.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{value}")?;
                }
                write!(f, ")")
            }
            FilterAst::IsDefined { key } => write!(f, "{key}:*"),
            FilterAst::NotDefined { key } => write!(f, "- {key}:*"),
            FilterAst::Unary { op, operand } => write!(f, "{op} {operand}"),
            FilterAst::Binary {
                operands,
                operators,
            } => {
                for (i, operand) in operands.iter().enumerate() {
                    if i > 0
                        && let Some(op) = operators.get(i - 1)
                    {
                        write!(f, "{op}")?;
                    }
                    write!(f, "{operand}")?;
                }
                Ok(())
            }
            FilterAst::Group { expr } => write!(f, "({expr})"),
        }
    }
}

impl FilterAst {
    /// Dotted keys referenced anywhere in the tree, in source order.
    pub fn keys(&self) -> Vec<&DottedKey> {
        let mut out = Vec::new();
        self.collect_keys(&mut out);
        out
    }

    fn collect_keys<'a>(&'a self, out: &mut Vec<&'a DottedKey>) {
        match self {
            FilterAst::Compare { key, .. }
            | FilterAst::CompareList { key, .. }
            | FilterAst::IsDefined { key }
            | FilterAst::NotDefined { key } => out.push(key),
            FilterAst::Unary { operand, .. } => operand.collect_keys(out),
            FilterAst::Binary { operands, .. } => {
                for operand in operands {
                    operand.collect_keys(out);
                }
            }
            FilterAst::Group { expr } => expr.collect_keys(out),
        }
    }

    /// True when the tree has no logical operators at all.
    pub fn is_simple(&self) -> bool {
        match self {
            FilterAst::Unary { .. } | FilterAst::Binary { .. } => false,
            FilterAst::Group { expr } => expr.is_simple(),
            _ => true,
        }
    }
}

/// Parse a numeric literal. Rejects `inf`/`nan` spellings that `f64` accepts.
pub fn parse_number(s: &str) -> Option<f64> {
    let digits = s.strip_prefix(['+', '-']).unwrap_or(s);
    match digits.chars().next() {
        Some(c) if c.is_ascii_digit() || c == '.' => s.parse::<f64>().ok(),
        _ => None,
    }
}

/// Parse an integer literal exactly: optional sign, then ASCII digits only.
pub fn parse_integer(s: &str) -> Option<i128> {
    let digits = s.strip_prefix(['+', '-']).unwrap_or(s);
    if digits.is_empty() || !digits.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    s.parse().ok()
}
