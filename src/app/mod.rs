use anyhow::{Context, Result};
use clap::Parser;
use std::path::{Path, PathBuf};

use cloudfilter::config::{CompiledConfig, FiltersConfig, InputFormat, RuntimeConfig};
use cloudfilter::dsl::Filter;
use cloudfilter::sinks::{DataSink, JsonlSink};

#[derive(Parser)]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Filter expression, e.g. "status=RUNNING AND zone:(europe-west1-b europe-west1-d)"
    #[arg(short, long, conflicts_with = "name")]
    pub filter: Option<String>,

    /// Use a named filter from the config file
    #[arg(short, long, requires = "config")]
    pub name: Option<String>,

    /// Configuration file (YAML, JSON or TOML)
    #[arg(short, long, env = "CLOUDFILTER_CONFIG")]
    pub config: Option<PathBuf>,

    /// Input records as a JSON array or JSON Lines ("-" for stdin)
    #[arg(short, long, default_value = "-")]
    pub input: PathBuf,

    /// Output file for matching records as JSON Lines ("-" for stdout)
    #[arg(short, long, default_value = "-")]
    pub output: PathBuf,

    /// Input format (auto-detected if omitted)
    #[arg(long, value_enum)]
    pub format: Option<InputFormat>,

    /// Evaluate records in parallel
    #[arg(long)]
    pub parallel: bool,

    /// Records per batch
    #[arg(long)]
    pub batch_size: Option<usize>,

    /// Number of threads (default: all cores)
    #[arg(short, long)]
    pub threads: Option<usize>,

    /// Only check that the filter parses, then print it in canonical form
    #[arg(long)]
    pub check: bool,

    /// Print the parsed filter tree as YAML and exit
    #[arg(long, conflicts_with = "check")]
    pub explain: bool,

    /// Enable verbose output
    #[arg(short, long)]
    pub verbose: bool,
}

pub fn load_config(cli: &Cli) -> Result<Option<CompiledConfig>> {
    let Some(path) = &cli.config else {
        return Ok(None);
    };
    let config = FiltersConfig::load(path)?;
    let compiled = config.compile()?;
    tracing::info!(
        "Config: {} named filters from {:?}",
        compiled.filters.len(),
        path
    );
    Ok(Some(compiled))
}

/// Pick the filter from `--filter` or `--name`.
pub fn resolve_filter(cli: &Cli, config: Option<&CompiledConfig>) -> Result<Filter> {
    if let Some(text) = &cli.filter {
        return Filter::parse(text).with_context(|| format!("CLI: Invalid filter {:?}", text));
    }

    match (&cli.name, config) {
        (Some(name), Some(config)) => {
            let filter = config.filter(name)?.clone();
            match config.description(name) {
                Some(description) => tracing::info!("Filter '{}': {}", name, description),
                None => tracing::info!("Filter '{}'", name),
            }
            Ok(filter)
        }
        (Some(_), None) => anyhow::bail!("CLI: --name requires --config"),
        (None, _) => anyhow::bail!("CLI: Provide a filter with --filter or --name"),
    }
}

/// Config file values overridden by command-line flags.
pub fn resolve_runtime(cli: &Cli, config: Option<&CompiledConfig>) -> RuntimeConfig {
    let mut runtime = config.map(|c| c.runtime.clone()).unwrap_or_default();
    if cli.parallel {
        runtime.parallel = true;
    }
    if let Some(batch_size) = cli.batch_size {
        runtime.batch_size = batch_size;
    }
    if let Some(format) = cli.format {
        runtime.input_format = format;
    }
    runtime
}

pub fn explain(filter: &Filter) -> Result<String> {
    serde_yaml::to_string(filter.ast()).context("CLI: Failed to render filter tree")
}

pub fn init_sink(output: &Path) -> Result<Box<dyn DataSink + Send>> {
    if output == Path::new("-") {
        tracing::info!("Sink: jsonl -> stdout");
        Ok(Box::new(JsonlSink::stdout()?))
    } else {
        tracing::info!("Sink: jsonl -> {:?}", output);
        Ok(Box::new(JsonlSink::new(output).with_context(|| {
            format!("CLI: Failed to create output {:?}", output)
        })?))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use cloudfilter::config::NamedFilter;

    fn cli(args: &[&str]) -> Cli {
        Cli::try_parse_from(std::iter::once("cloudfilter").chain(args.iter().copied())).unwrap()
    }

    #[test]
    fn test_filter_flag() {
        let cli = cli(&["--filter", "zone:*"]);
        let filter = resolve_filter(&cli, None).unwrap();
        assert_eq!(filter.source(), "zone:*");
    }

    #[test]
    fn test_missing_filter() {
        let cli = cli(&[]);
        assert!(resolve_filter(&cli, None).is_err());
    }

    #[test]
    fn test_named_filter_from_config() {
        let mut config = FiltersConfig::default();
        config.filters.insert(
            "europe".into(),
            NamedFilter::Detailed {
                filter: "zone:(europe-west1-b europe-west1-d)".into(),
                description: Some("EU zones".into()),
            },
        );
        let compiled = config.compile().unwrap();
        let cli = Cli::try_parse_from(["cloudfilter", "--config", "filters.yaml", "--name", "europe"])
            .unwrap();
        let filter = resolve_filter(&cli, Some(&compiled)).unwrap();
        assert_eq!(filter.to_string(), "zone:(europe-west1-b, europe-west1-d)");
    }

    #[test]
    fn test_name_requires_config() {
        assert!(
            Cli::try_parse_from(["cloudfilter", "--name", "running"]).is_err()
        );
    }

    #[test]
    fn test_runtime_overrides() {
        let cli = cli(&["--filter", "a:*", "--parallel", "--batch-size", "3", "--format", "jsonl"]);
        let runtime = resolve_runtime(&cli, None);
        assert!(runtime.parallel);
        assert_eq!(runtime.batch_size, 3);
        assert_eq!(runtime.input_format, InputFormat::Jsonl);
    }

    #[test]
    fn test_explain_renders_yaml() {
        let filter = Filter::parse("NOT zone:*").unwrap();
        let yaml = explain(&filter).unwrap();
        assert!(yaml.contains("kind: unary"), "{yaml}");
        assert!(yaml.contains("kind: is_defined"), "{yaml}");
        assert!(yaml.contains("key: zone"), "{yaml}");
    }
}
