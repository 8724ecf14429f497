//! Filter nested JSON records with gcloud-style `--filter` expressions.
//!
//! ```
//! use cloudfilter::dsl::{Filter, match_record};
//! use serde_json::json;
//!
//! let record = json!({"name": "web-1", "zone": "europe-west1-d"});
//! assert!(match_record("zone:(europe-west1-b europe-west1-d)", &record).unwrap());
//!
//! let filter = Filter::parse("name~^web AND - deleted:*").unwrap();
//! assert!(filter.matches(&record).unwrap());
//! ```

pub mod config;
pub mod dsl;
pub mod pipeline;
pub mod sinks;
