use anyhow::{Context, anyhow};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::Path;

use crate::dsl::Filter;

#[derive(Debug, Default, Deserialize, Serialize)]
pub struct FiltersConfig {
    #[serde(default)]
    pub filters: BTreeMap<String, NamedFilter>,
    #[serde(default)]
    pub runtime: RuntimeConfig,
}

impl FiltersConfig {
    pub fn load(path: &Path) -> anyhow::Result<Self> {
        let settings = ::config::Config::builder()
            .add_source(::config::File::from(path))
            .build()
            .with_context(|| format!("Config: Failed to read {:?}", path))?;
        Ok(settings.try_deserialize()?)
    }

    /// Parse every named filter in name order, failing on the first one that
    /// does not parse.
    pub fn compile(&self) -> anyhow::Result<CompiledConfig> {
        let mut filters = BTreeMap::new();
        let mut descriptions = BTreeMap::new();
        for (name, named) in &self.filters {
            let filter = Filter::parse(named.text())
                .map_err(|e| anyhow!("Config: Error parsing filter '{}': {}", name, e))?;
            filters.insert(name.clone(), filter);
            if let Some(description) = named.description() {
                descriptions.insert(name.clone(), description.to_string());
            }
        }
        Ok(CompiledConfig {
            filters,
            descriptions,
            runtime: self.runtime.clone(),
        })
    }
}

/// A filter in the config file, either a bare string or a table with a
/// description.
#[derive(Debug, Deserialize, Serialize, Clone)]
#[serde(untagged)]
pub enum NamedFilter {
    Text(String),
    Detailed {
        filter: String,
        #[serde(default)]
        description: Option<String>,
    },
}

impl NamedFilter {
    pub fn text(&self) -> &str {
        match self {
            NamedFilter::Text(text) => text,
            NamedFilter::Detailed { filter, .. } => filter,
        }
    }

    pub fn description(&self) -> Option<&str> {
        match self {
            NamedFilter::Text(_) => None,
            NamedFilter::Detailed { description, .. } => description.as_deref(),
        }
    }
}

#[derive(Debug)]
pub struct CompiledConfig {
    pub filters: BTreeMap<String, Filter>,
    pub descriptions: BTreeMap<String, String>,
    pub runtime: RuntimeConfig,
}

impl CompiledConfig {
    pub fn filter(&self, name: &str) -> anyhow::Result<&Filter> {
        self.filters.get(name).ok_or_else(|| {
            let known: Vec<&str> = self.filters.keys().map(String::as_str).collect();
            anyhow!(
                "Config: No filter named '{}' (known: {})",
                name,
                if known.is_empty() {
                    "none".to_string()
                } else {
                    known.join(", ")
                }
            )
        })
    }

    pub fn description(&self, name: &str) -> Option<&str> {
        self.descriptions.get(name).map(String::as_str)
    }
}

#[derive(Debug, Deserialize, Serialize, Clone)]
#[serde(default)]
pub struct RuntimeConfig {
    pub parallel: bool,
    pub batch_size: usize,
    pub channel_capacity: usize,
    pub input_format: InputFormat,
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            parallel: false,
            batch_size: 1024,
            channel_capacity: 64,
            input_format: InputFormat::Auto,
        }
    }
}

#[derive(Debug, Deserialize, Serialize, Clone, Copy, PartialEq, Eq, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum InputFormat {
    /// Detect from the first non-whitespace character
    Auto,
    /// A single JSON array of records
    Json,
    /// One JSON record per line
    #[serde(alias = "ndjson")]
    #[value(alias = "ndjson")]
    Jsonl,
}
