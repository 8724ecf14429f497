//! Filter language for matching nested records, modelled on the gcloud
//! `--filter` syntax.
//!
//! Syntax:
//!   key:value               - value is one of the whitespace-separated words
//!   key=value, key!=value   - equality (numeric when both sides are numbers)
//!   key<v, key<=v, key>v... - ordering (numeric or lexical)
//!   key~regex, key!~regex   - regular expression match anchored at start
//!   key:(a, b), key=(a b)   - match any listed value
//!   key:*                   - key is present
//!   - key:*                 - key is absent
//!   a.b.c=value             - dotted keys walk nested objects
//!   'quoted value'          - single or double quotes keep whitespace
//!   NOT expr                - negation
//!   expr AND expr           - conjunction (adjacent terms are ANDed too)
//!   expr OR expr            - disjunction
//!   (expr)                  - grouping; mixing AND and OR requires it

mod ast;
mod cache;
mod error;
mod eval;
mod filter;
mod lexer;
mod parser;
mod regex_cache;

pub use ast::*;
pub use cache::{FilterCache, global_cache, match_record};
pub use error::FilterError;
pub use eval::{evaluate_filter, resolve};
pub use filter::{Filter, FilterRecords, filter_records, par_filter_records};
pub use parser::parse_filter;
