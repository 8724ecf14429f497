//! Parsed filters and record selection.

use rayon::prelude::*;
use serde_json::Value;
use std::borrow::Borrow;
use std::fmt;

use super::ast::FilterAst;
use super::error::Result;
use super::eval::evaluate_filter;
use super::parser::parse_filter;

/// A filter string together with its parsed tree.
#[derive(Debug, Clone, PartialEq)]
pub struct Filter {
    source: String,
    ast: FilterAst,
}

impl Filter {
    pub fn parse(source: &str) -> Result<Self> {
        let ast = parse_filter(source)?;
        Ok(Filter {
            source: source.to_string(),
            ast,
        })
    }

    pub fn source(&self) -> &str {
        &self.source
    }

    pub fn ast(&self) -> &FilterAst {
        &self.ast
    }

    pub fn matches(&self, record: &Value) -> Result<bool> {
        evaluate_filter(&self.ast, record)
    }
}

impl fmt::Display for Filter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.ast)
    }
}

/// Lazily yield the records that match `filter`, in input order.
///
/// An evaluation error is yielded in place of the record that caused it;
/// iteration can continue past it.
pub fn filter_records<I>(filter: &Filter, records: I) -> FilterRecords<'_, I::IntoIter>
where
    I: IntoIterator,
    I::Item: Borrow<Value>,
{
    FilterRecords {
        filter,
        inner: records.into_iter(),
    }
}

/// Iterator returned by [`filter_records`]. Cloning it restarts from the
/// same position when the source iterator can be cloned.
#[derive(Debug, Clone)]
pub struct FilterRecords<'f, I> {
    filter: &'f Filter,
    inner: I,
}

impl<I> Iterator for FilterRecords<'_, I>
where
    I: Iterator,
    I::Item: Borrow<Value>,
{
    type Item = Result<I::Item>;

    fn next(&mut self) -> Option<Self::Item> {
        for record in self.inner.by_ref() {
            match self.filter.matches(record.borrow()) {
                Ok(true) => return Some(Ok(record)),
                Ok(false) => continue,
                Err(e) => return Some(Err(e)),
            }
        }
        None
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        (0, self.inner.size_hint().1)
    }
}

/// Evaluate `filter` against every record in parallel and return the
/// matches in input order. Fails with the first error by input position.
pub fn par_filter_records<'r>(filter: &Filter, records: &'r [Value]) -> Result<Vec<&'r Value>> {
    let verdicts: Vec<Result<bool>> = records.par_iter().map(|r| filter.matches(r)).collect();

    let mut matched = Vec::new();
    for (record, verdict) in records.iter().zip(verdicts) {
        if verdict? {
            matched.push(record);
        }
    }
    Ok(matched)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dsl::FilterError;
    use serde_json::json;

    fn instances() -> Vec<Value> {
        vec![
            json!({"name": "web-1", "zone": "europe-west1-d", "status": "RUNNING"}),
            json!({"name": "web-2", "zone": "us-east1-b", "status": "RUNNING"}),
            json!({"name": "db-1", "zone": "europe-west1-d", "status": "TERMINATED"}),
            json!({"name": "web-3", "zone": "europe-west1-d", "status": "RUNNING"}),
        ]
    }

    fn names<'a>(records: impl IntoIterator<Item = &'a Value>) -> Vec<&'a str> {
        records
            .into_iter()
            .map(|r| r["name"].as_str().unwrap())
            .collect()
    }

    #[test]
    fn test_filter_preserves_order() {
        let records = instances();
        let filter = Filter::parse("zone=europe-west1-d status=RUNNING").unwrap();
        let matched: Vec<&Value> = filter_records(&filter, &records)
            .collect::<Result<_>>()
            .unwrap();
        assert_eq!(names(matched), vec!["web-1", "web-3"]);
    }

    #[test]
    fn test_filter_owned_records() {
        let filter = Filter::parse("status:TERMINATED").unwrap();
        let matched: Vec<Value> = filter_records(&filter, instances())
            .collect::<Result<_>>()
            .unwrap();
        assert_eq!(matched.len(), 1);
        assert_eq!(matched[0]["name"], "db-1");
    }

    #[test]
    fn test_filter_is_lazy_and_restartable() {
        let records = instances();
        let filter = Filter::parse("name~^web").unwrap();
        let mut iter = filter_records(&filter, records.iter());
        let first = iter.next().unwrap().unwrap();
        assert_eq!(first["name"], "web-1");

        let restarted = iter.clone();
        assert_eq!(names(iter.map(|r| r.unwrap())), vec!["web-2", "web-3"]);
        assert_eq!(names(restarted.map(|r| r.unwrap())), vec!["web-2", "web-3"]);
    }

    #[test]
    fn test_errors_are_yielded_in_place() {
        let records = vec![
            json!({"name": "a"}),
            json!({"name": "abc"}),
            json!({"other": 1}),
        ];
        let filter = Filter::parse("name:ab*").unwrap();
        let results: Vec<_> = filter_records(&filter, &records).collect();
        assert_eq!(results.len(), 2);
        assert!(matches!(results[0], Err(FilterError::NotImplemented(_))));
        assert!(matches!(results[1], Err(FilterError::NotImplemented(_))));
    }

    #[test]
    fn test_parallel_matches_sequential() {
        let records: Vec<Value> = (0..500)
            .map(|i| json!({"id": i, "parity": if i % 2 == 0 { "even" } else { "odd" }}))
            .collect();
        let filter = Filter::parse("parity=even AND id>=100").unwrap();

        let sequential: Vec<&Value> = filter_records(&filter, &records)
            .collect::<Result<_>>()
            .unwrap();
        let parallel = par_filter_records(&filter, &records).unwrap();
        assert_eq!(sequential, parallel);
        assert_eq!(parallel.len(), 200);
    }

    #[test]
    fn test_parallel_reports_first_error() {
        let records = vec![json!({"a": 1}), json!({"b": 2})];
        let filter = Filter::parse("a=1 OR a=2 AND b=3").unwrap();
        assert!(par_filter_records(&filter, &records)
            .unwrap_err()
            .is_syntax_error());
    }

    #[test]
    fn test_display_and_source() {
        let filter = Filter::parse("name != x   AND   zone:*").unwrap();
        assert_eq!(filter.source(), "name != x   AND   zone:*");
        assert_eq!(filter.to_string(), "name!=x AND zone:*");
    }
}
