//! Record sources: one sorted, single-sample stream per matrix column.

pub mod format;
pub mod manifest;
#[cfg(test)]
pub(crate) mod testutil;
pub mod vcf;

pub use format::CompressionFormat;
pub use manifest::load_manifest;
pub use vcf::VcfRecordReader;

use crate::error::{MergeError, ReadError, Result};
use crate::record::Record;
use rayon::prelude::*;
use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::{Path, PathBuf};

/// Read buffer for plain-text sources
const SOURCE_BUFFER_SIZE: usize = 64 * 1024;

/// The "next record" operation of an underlying stream
pub trait RecordReader {
    /// Overwrite `record` with the next record; `Ok(false)` at end of stream
    fn read_record(&mut self, record: &mut Record) -> std::result::Result<bool, ReadError>;

    /// Sample name declared by the stream, if any
    fn sample_name(&self) -> Option<&str> {
        None
    }

    /// Lines consumed so far
    fn line_number(&self) -> u64 {
        0
    }
}

impl<T: RecordReader + ?Sized> RecordReader for Box<T> {
    fn read_record(&mut self, record: &mut Record) -> std::result::Result<bool, ReadError> {
        (**self).read_record(record)
    }

    fn sample_name(&self) -> Option<&str> {
        (**self).sample_name()
    }

    fn line_number(&self) -> u64 {
        (**self).line_number()
    }
}

/// Boxed input stream of a file-backed source
pub type SourceInput = Box<dyn BufRead + Send>;

/// A source opened from a VCF path
pub type VcfSource = RecordSource<VcfRecordReader<SourceInput>>;

/// One sample's stream with a single buffered record.
///
/// The slot always holds the current record until the stream is exhausted; once
/// exhausted, the reader is dropped (closing its handle) and never read again.
pub struct RecordSource<R> {
    id: String,
    label: String,
    reader: Option<R>,
    slot: Record,
    records_read: u64,
}

impl<R: RecordReader> RecordSource<R> {
    /// Wrap an opened reader and prime it with its first record
    pub fn open(id: impl Into<String>, reader: R) -> Result<Self> {
        let id = id.into();
        let mut source = Self {
            label: id.clone(),
            id,
            reader: Some(reader),
            slot: Record::default(),
            records_read: 0,
        };
        source.advance()?;
        let name = source
            .reader
            .as_ref()
            .and_then(|reader| reader.sample_name())
            .map(str::to_string);
        source.adopt_sample_name(name);
        Ok(source)
    }

    /// The buffered record, or `None` once exhausted
    pub fn current(&self) -> Option<&Record> {
        self.reader.as_ref().map(|_| &self.slot)
    }

    /// Replace the buffered record with the next one from the stream
    pub fn advance(&mut self) -> Result<Option<&Record>> {
        let Some(reader) = self.reader.as_mut() else {
            return Ok(None);
        };

        match reader.read_record(&mut self.slot) {
            Ok(true) => {
                self.records_read += 1;
                Ok(Some(&self.slot))
            }
            Ok(false) => {
                log::debug!(
                    "{}: exhausted after {} records",
                    self.id,
                    self.records_read
                );
                if let Some(reader) = self.reader.take() {
                    if self.records_read == 0 {
                        self.adopt_sample_name(reader.sample_name().map(str::to_string));
                    }
                }
                Ok(None)
            }
            Err(e) => Err(MergeError::MalformedRecord {
                source_id: self.id.clone(),
                line: e.line(),
                after: if self.records_read == 0 {
                    "start of stream".to_string()
                } else {
                    self.slot.to_string()
                },
                reason: e.reason(),
            }),
        }
    }

    fn adopt_sample_name(&mut self, name: Option<String>) {
        if let Some(name) = name.filter(|name| !name.is_empty()) {
            self.label = name;
        }
    }

    pub fn is_exhausted(&self) -> bool {
        self.reader.is_none()
    }

    /// Path or other identity used in diagnostics
    pub fn id(&self) -> &str {
        &self.id
    }

    /// Column label: the declared sample name, else the identity
    pub fn label(&self) -> &str {
        &self.label
    }

    pub fn records_read(&self) -> u64 {
        self.records_read
    }

    /// Line of the buffered record, when the reader tracks lines
    pub fn line_number(&self) -> u64 {
        self.reader.as_ref().map_or(0, RecordReader::line_number)
    }
}

/// Open a plain or BGZF-compressed VCF, detected from its first bytes
pub fn open_input(path: &Path) -> Result<SourceInput> {
    let id = path.display().to_string();
    let file = File::open(path).map_err(|e| MergeError::unavailable(&id, e))?;
    let mut reader = BufReader::with_capacity(SOURCE_BUFFER_SIZE, file);

    let head = reader
        .fill_buf()
        .map_err(|e| MergeError::unavailable(&id, e))?;
    match CompressionFormat::detect(head) {
        CompressionFormat::Bgzf => Ok(Box::new(noodles_bgzf::Reader::new(reader))),
        CompressionFormat::Gzip => Err(MergeError::unavailable(
            id,
            "gzip-compressed but not BGZF; recompress with bgzip",
        )),
        CompressionFormat::Plain => Ok(Box::new(reader)),
    }
}

/// Open and prime one VCF source
pub fn open_vcf(path: &Path) -> Result<VcfSource> {
    let input = open_input(path)?;
    RecordSource::open(path.display().to_string(), VcfRecordReader::new(input))
}

/// Open and prime every listed VCF in parallel, keeping manifest order.
///
/// All sources are opened before any merging starts; the first failure in
/// manifest order is reported.
pub fn open_vcfs(paths: &[PathBuf]) -> Result<Vec<VcfSource>> {
    let opened: Vec<Result<VcfSource>> = paths.par_iter().map(|path| open_vcf(path)).collect();
    let sources = opened.into_iter().collect::<Result<Vec<_>>>()?;

    let empty = sources.iter().filter(|s| s.is_exhausted()).count();
    if empty > 0 {
        log::warn!("{} of {} sources contain no records", empty, sources.len());
    }
    Ok(sources)
}
