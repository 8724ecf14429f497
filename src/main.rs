mod app;

use anyhow::{Context, Result};
use clap::Parser;
use std::sync::{Arc, Mutex};

use app::{Cli, explain, init_sink, load_config, resolve_filter, resolve_runtime};
use cloudfilter::pipeline::{RecordBatches, open_input, run_filter};

fn main() -> Result<()> {
    let cli = Cli::parse();

    let level = if cli.verbose {
        tracing::Level::INFO
    } else {
        tracing::Level::WARN
    };

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::builder()
                .with_default_directive(level.into())
                .from_env_lossy(),
        )
        .with_writer(std::io::stderr)
        .init();

    if let Some(threads) = cli.threads {
        rayon::ThreadPoolBuilder::new()
            .num_threads(threads)
            .build_global()
            .context("CLI: Failed to initialize thread pool")?;
    }

    let config = load_config(&cli)?;
    let filter = resolve_filter(&cli, config.as_ref())?;
    let keys: Vec<String> = filter.ast().keys().iter().map(|k| k.to_string()).collect();
    tracing::info!(
        "Filter: {} (keys: {}, {})",
        filter,
        keys.join(", "),
        if filter.ast().is_simple() {
            "single term"
        } else {
            "compound"
        }
    );

    if cli.check {
        println!("{}", filter);
        return Ok(());
    }

    if cli.explain {
        print!("{}", explain(&filter)?);
        return Ok(());
    }

    let runtime = resolve_runtime(&cli, config.as_ref());
    tracing::info!(
        "Runtime: parallel={}, batch_size={}, format={:?}",
        runtime.parallel,
        runtime.batch_size,
        runtime.input_format
    );

    let reader = open_input(&cli.input)?;
    let batches = RecordBatches::new(reader, runtime.input_format, runtime.batch_size)?;

    let sink = init_sink(&cli.output)?;
    let sink_handle = Arc::new(Mutex::new(sink));

    let start = std::time::Instant::now();
    let stats = run_filter(batches, Arc::new(filter), &runtime, sink_handle.clone())?;

    // Finalize sink
    {
        let mut sink = sink_handle
            .lock()
            .map_err(|_| anyhow::anyhow!("Pipeline: Sink lock poisoned"))?;
        sink.finish().context("Pipeline: Failed to finalize sink")?;
    }

    let elapsed = start.elapsed();
    tracing::info!(
        "Done! {} of {} records matched in {:.2}s",
        stats.matched,
        stats.scanned,
        elapsed.as_secs_f64()
    );

    Ok(())
}
