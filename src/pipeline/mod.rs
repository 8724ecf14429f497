use anyhow::{Context, Result, anyhow};
use crossbeam_channel::bounded;
use serde_json::Value;
use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::Path;
use std::sync::Arc;

use crate::config::{InputFormat, RuntimeConfig};
use crate::dsl::{Filter, filter_records, par_filter_records};
use crate::sinks::SinkHandle;

/// Counts reported after a run.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct FilterStats {
    pub scanned: u64,
    pub matched: u64,
}

/// Open a file for reading, or stdin for `-`.
pub fn open_input(path: &Path) -> Result<Box<dyn BufRead + Send>> {
    if path == Path::new("-") {
        Ok(Box::new(BufReader::new(std::io::stdin())))
    } else {
        let file = File::open(path)
            .with_context(|| format!("Pipeline: Failed to open input {:?}", path))?;
        Ok(Box::new(BufReader::new(file)))
    }
}

/// Look at the first non-whitespace byte without consuming it: `[` means a
/// JSON array, anything else JSON Lines.
pub fn detect_format(reader: &mut dyn BufRead) -> Result<InputFormat> {
    loop {
        let buf = reader
            .fill_buf()
            .context("Pipeline: Failed to read input")?;
        if buf.is_empty() {
            return Ok(InputFormat::Jsonl);
        }
        match buf.iter().position(|b| !b.is_ascii_whitespace()) {
            Some(idx) => {
                let format = if buf[idx] == b'[' {
                    InputFormat::Json
                } else {
                    InputFormat::Jsonl
                };
                reader.consume(idx);
                return Ok(format);
            }
            None => {
                let len = buf.len();
                reader.consume(len);
            }
        }
    }
}

/// Yields records in batches of at most `batch_size`.
pub struct RecordBatches {
    inner: BatchSource,
    batch_size: usize,
}

enum BatchSource {
    Array(std::vec::IntoIter<Value>),
    Lines {
        lines: std::io::Lines<Box<dyn BufRead + Send>>,
        line_no: usize,
    },
}

impl RecordBatches {
    pub fn new(
        mut reader: Box<dyn BufRead + Send>,
        format: InputFormat,
        batch_size: usize,
    ) -> Result<Self> {
        let format = match format {
            InputFormat::Auto => detect_format(&mut reader)?,
            other => other,
        };
        tracing::debug!("Input format: {:?}", format);

        let inner = match format {
            InputFormat::Json => {
                let records: Vec<Value> = serde_json::from_reader(reader)
                    .context("Pipeline: Input is not a JSON array of records")?;
                BatchSource::Array(records.into_iter())
            }
            _ => BatchSource::Lines {
                lines: reader.lines(),
                line_no: 0,
            },
        };

        Ok(Self {
            inner,
            batch_size: batch_size.max(1),
        })
    }
}

impl Iterator for RecordBatches {
    type Item = Result<Vec<Value>>;

    fn next(&mut self) -> Option<Self::Item> {
        let mut batch = Vec::with_capacity(self.batch_size);
        match &mut self.inner {
            BatchSource::Array(records) => batch.extend(records.by_ref().take(self.batch_size)),
            BatchSource::Lines { lines, line_no } => {
                while batch.len() < self.batch_size {
                    let Some(line) = lines.next() else { break };
                    *line_no += 1;
                    let line = match line {
                        Ok(line) => line,
                        Err(e) => {
                            return Some(Err(anyhow!(e).context(format!(
                                "Pipeline: Failed to read line {}",
                                line_no
                            ))));
                        }
                    };
                    if line.trim().is_empty() {
                        continue;
                    }
                    match serde_json::from_str(&line) {
                        Ok(record) => batch.push(record),
                        Err(e) => {
                            return Some(Err(anyhow!(e).context(format!(
                                "Pipeline: Invalid JSON on line {}",
                                line_no
                            ))));
                        }
                    }
                }
            }
        }

        if batch.is_empty() { None } else { Some(Ok(batch)) }
    }
}

/// Select the records of one batch that match.
fn filter_batch(
    filter: &Filter,
    batch: Vec<Value>,
    parallel: bool,
    offset: u64,
) -> Result<Vec<Value>> {
    let context = || format!("Pipeline: Failed to evaluate batch starting at record {}", offset);

    if parallel {
        let matched = par_filter_records(filter, &batch).with_context(context)?;
        return Ok(matched.into_iter().cloned().collect());
    }

    let mut matched = Vec::new();
    for result in filter_records(filter, batch) {
        matched.push(result.with_context(context)?);
    }
    Ok(matched)
}

/// Run `filter` over every record from `batches` and write matches to `sink`.
pub fn run_filter(
    batches: RecordBatches,
    filter: Arc<Filter>,
    runtime: &RuntimeConfig,
    sink: SinkHandle,
) -> Result<FilterStats> {
    let (tx, rx) = bounded::<Vec<Value>>(runtime.channel_capacity.max(1));

    let sink_handle = sink.clone();
    let writer = std::thread::spawn(move || -> Result<u64> {
        let mut sink = sink_handle
            .lock()
            .map_err(|_| anyhow!("Pipeline: Sink lock poisoned"))?;
        let mut match_count = 0u64;
        for batch in rx {
            for record in &batch {
                sink.add_record(record)?;
                match_count += 1;
            }
        }
        Ok(match_count)
    });

    let mut scanned = 0u64;
    let mut decode_result: Result<()> = Ok(());
    for batch in batches {
        let step = batch.and_then(|batch| {
            let offset = scanned;
            scanned += batch.len() as u64;
            let matched = filter_batch(&filter, batch, runtime.parallel, offset)?;
            if !matched.is_empty() {
                tx.send(matched)
                    .map_err(|err| anyhow!("Pipeline: Failed to send record batch: {}", err))?;
            }
            Ok(())
        });
        if let Err(e) = step {
            decode_result = Err(e);
            break;
        }
    }

    drop(tx);

    // Get writer thread result - it contains the root cause if there was an error
    let writer_join = writer.join();

    // Check writer thread first - it has the real error if the channel disconnected
    let matched = match writer_join {
        Ok(Ok(result)) => result,
        Ok(Err(writer_err)) => {
            return if decode_result.is_err() {
                Err(writer_err
                    .context("Pipeline: Sink writer thread failed (caused channel disconnect)"))
            } else {
                Err(writer_err)
            };
        }
        Err(panic_payload) => {
            let panic_msg = panic_payload
                .downcast_ref::<&str>()
                .map(|s| s.to_string())
                .or_else(|| panic_payload.downcast_ref::<String>().cloned())
                .unwrap_or_else(|| "unknown panic".to_string());
            return Err(anyhow!(
                "Pipeline: Sink writer thread panicked: {}",
                panic_msg
            ));
        }
    };

    // Only check decode_result if writer succeeded
    decode_result?;

    tracing::info!("Scanned {} records, {} matched", scanned, matched);
    Ok(FilterStats { scanned, matched })
}
