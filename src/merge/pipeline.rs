//! Driving a merge into matrix sinks, inline or through a writer thread.

use crate::error::{MergeError, Result};
use crate::merge::{MergeEngine, MergeSummary, Row};
use crate::sink::MatrixSink;
use crate::source::RecordReader;
use crossbeam::channel::bounded;
use std::io;
use std::panic::resume_unwind;

/// Rows buffered between the merge and the writer thread
pub const DEFAULT_CHANNEL_CAPACITY: usize = 1024;

impl<R: RecordReader> MergeEngine<R> {
    /// Run the merge to completion, writing every row to every sink on this thread
    pub fn write_to<S: MatrixSink>(&mut self, sinks: &mut [S]) -> Result<MergeSummary> {
        self.check_sinks(sinks)?;
        begin_sinks(sinks, &self.sample_labels())?;

        loop {
            let delivered = match self.next_row() {
                Ok(Some(row)) => deliver(sinks, &row),
                Ok(None) => break,
                Err(e) => Err(e),
            };
            if let Err(e) = delivered {
                close_after_failure(sinks);
                return Err(e);
            }
        }

        finish_sinks(sinks)?;
        let summary = self.summary();
        log_summary(&summary);
        Ok(summary)
    }

    /// Run the merge on this thread while one writer thread owns the sinks.
    ///
    /// Rows cross a bounded channel of `capacity` rows. A sink failure cancels
    /// the merge and is the error returned.
    pub fn write_to_threaded<S: MatrixSink + Send>(
        &mut self,
        sinks: &mut [S],
        capacity: usize,
    ) -> Result<MergeSummary> {
        self.check_sinks(sinks)?;
        begin_sinks(sinks, &self.sample_labels())?;

        let (sender, receiver) = bounded::<Row>(capacity.max(1));
        let cancel = self.cancel_token();

        let outcome = crossbeam::thread::scope(|s| {
            let writer = s.spawn(move |_| -> Result<()> {
                let mut written = Ok(());
                for row in receiver.iter() {
                    written = deliver(sinks, &row);
                    if written.is_err() {
                        break;
                    }
                }
                match written {
                    Ok(()) => finish_sinks(sinks),
                    Err(e) => {
                        cancel.cancel();
                        close_after_failure(sinks);
                        Err(e)
                    }
                }
            });

            let produced = loop {
                match self.next_row() {
                    Ok(Some(row)) => {
                        // Closed channel: the writer failed and reports why
                        if sender.send(row).is_err() {
                            break Ok(());
                        }
                    }
                    Ok(None) => break Ok(()),
                    Err(e) => break Err(e),
                }
            };
            drop(sender);

            let written = match writer.join() {
                Ok(result) => result,
                Err(panic) => resume_unwind(panic),
            };
            (produced, written)
        });

        let (produced, written) = match outcome {
            Ok(results) => results,
            Err(panic) => resume_unwind(panic),
        };
        written?;
        produced?;

        let summary = self.summary();
        log_summary(&summary);
        Ok(summary)
    }

    /// Run the merge to completion without writing anything
    pub fn drain(&mut self) -> Result<MergeSummary> {
        while self.next_row()?.is_some() {}
        let summary = self.summary();
        log_summary(&summary);
        Ok(summary)
    }

    fn check_sinks<S: MatrixSink>(&self, sinks: &[S]) -> Result<()> {
        let layers = self.rules().len();
        for sink in sinks {
            if sink.layer() >= layers {
                return Err(MergeError::InvalidParameter {
                    parameter: sink.name().to_string(),
                    reason: format!(
                        "renders extraction rule {} but only {} rules are configured",
                        sink.layer(),
                        layers
                    ),
                });
            }
        }
        Ok(())
    }
}

fn write_failure<S: MatrixSink + ?Sized>(
    sink: &S,
    at: impl Into<String>,
    error: io::Error,
) -> MergeError {
    MergeError::SinkWriteFailure {
        sink: sink.name().to_string(),
        at: at.into(),
        error,
    }
}

fn begin_sinks<S: MatrixSink>(sinks: &mut [S], labels: &[&str]) -> Result<()> {
    for sink in sinks.iter_mut() {
        if let Err(error) = sink.begin(labels) {
            return Err(write_failure(&*sink, "header", error));
        }
    }
    Ok(())
}

fn deliver<S: MatrixSink>(sinks: &mut [S], row: &Row) -> Result<()> {
    for sink in sinks.iter_mut() {
        if let Err(error) = sink.accept(row) {
            return Err(write_failure(&*sink, row.locus().to_string(), error));
        }
    }
    Ok(())
}

fn finish_sinks<S: MatrixSink>(sinks: &mut [S]) -> Result<()> {
    for sink in sinks.iter_mut() {
        if let Err(error) = sink.finish() {
            return Err(write_failure(&*sink, "end of output", error));
        }
    }
    Ok(())
}

/// Flush what was written before a fatal error; the first error is the one reported
fn close_after_failure<S: MatrixSink>(sinks: &mut [S]) {
    for sink in sinks.iter_mut() {
        if let Err(e) = sink.finish() {
            log::debug!("{}: flush after failure also failed: {}", sink.name(), e);
        }
    }
}

fn log_summary(summary: &MergeSummary) {
    log::info!(
        "Merged {} rows from {} sources; {} cells written as missing after extraction failures",
        summary.rows,
        summary.sources.len(),
        summary.recovered_cells
    );
    for source in &summary.sources {
        log::debug!(
            "{} ({}): {} records, {} recovered cells",
            source.label,
            source.id,
            source.records,
            source.recovered
        );
    }
}
