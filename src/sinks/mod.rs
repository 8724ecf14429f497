use anyhow::Result;
use serde_json::Value;
use std::sync::{Arc, Mutex};

pub mod jsonl;

pub use self::jsonl::JsonlSink;

/// Destination for matched records.
pub trait DataSink: Send {
    fn add_record(&mut self, record: &Value) -> Result<()>;
    fn finish(&mut self) -> Result<()>;
}

pub type SinkHandle = Arc<Mutex<Box<dyn DataSink + Send>>>;
