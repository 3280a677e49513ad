//! Matrix sinks: where merged rows are rendered.

use crate::error::{MergeError, Result};
use crate::extract::CellRepresentation;
use crate::merge::Row;
use noodles_bgzf as bgzf;
use std::fmt::Write as FmtWrite;
use std::fs::File;
use std::io::{self, BufWriter, Write};
use std::path::{Path, PathBuf};
use std::str::FromStr;

/// Buffer size for plain-text matrix outputs
const OUTPUT_BUFFER_SIZE: usize = 128 * 1024;

/// Consumer of merged rows
pub trait MatrixSink {
    /// Name used in error messages
    fn name(&self) -> &str;

    /// Which extraction rule's cells this sink renders
    fn layer(&self) -> usize;

    /// Called once before the first row with the column labels in sample order
    fn begin(&mut self, _labels: &[&str]) -> io::Result<()> {
        Ok(())
    }

    fn accept(&mut self, row: &Row) -> io::Result<()>;

    /// Flush and finalize; called once after the last row
    fn finish(&mut self) -> io::Result<()> {
        Ok(())
    }
}

impl<S: MatrixSink + ?Sized> MatrixSink for Box<S> {
    fn name(&self) -> &str {
        (**self).name()
    }

    fn layer(&self) -> usize {
        (**self).layer()
    }

    fn begin(&mut self, labels: &[&str]) -> io::Result<()> {
        (**self).begin(labels)
    }

    fn accept(&mut self, row: &Row) -> io::Result<()> {
        (**self).accept(row)
    }

    fn finish(&mut self) -> io::Result<()> {
        (**self).finish()
    }
}

/// Byte destination that may need finalizing beyond a flush (BGZF EOF block)
pub trait MatrixWrite: Write {
    fn finish(&mut self) -> io::Result<()> {
        self.flush()
    }
}

impl MatrixWrite for Vec<u8> {}

impl<W: Write> MatrixWrite for BufWriter<W> {}

impl<T: MatrixWrite + ?Sized> MatrixWrite for Box<T> {
    fn finish(&mut self) -> io::Result<()> {
        (**self).finish()
    }
}

/// BGZF-compressed output; `finish` writes the EOF block once and flushes
pub struct BgzfOutput<W: Write> {
    writer: Option<bgzf::Writer<W>>,
}

impl<W: Write> BgzfOutput<W> {
    pub fn new(inner: W) -> Self {
        Self {
            writer: Some(bgzf::Writer::new(inner)),
        }
    }

    fn writer(&mut self) -> io::Result<&mut bgzf::Writer<W>> {
        self.writer
            .as_mut()
            .ok_or_else(|| io::Error::other("BGZF output already finished"))
    }
}

impl<W: Write> Write for BgzfOutput<W> {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.writer()?.write(buf)
    }

    fn flush(&mut self) -> io::Result<()> {
        match self.writer.as_mut() {
            Some(writer) => writer.flush(),
            None => Ok(()),
        }
    }
}

impl<W: Write> MatrixWrite for BgzfOutput<W> {
    fn finish(&mut self) -> io::Result<()> {
        match self.writer.take() {
            Some(writer) => writer.finish()?.flush(),
            None => Ok(()),
        }
    }
}

/// Open an output destination: `-` is stdout, `.gz`/`.bgz` is BGZF, anything else plain text
pub fn open_output(path: &Path) -> Result<Box<dyn MatrixWrite + Send>> {
    if path.as_os_str() == "-" {
        return Ok(Box::new(BufWriter::with_capacity(
            OUTPUT_BUFFER_SIZE,
            io::stdout(),
        )));
    }

    let file = File::create(path).map_err(|error| MergeError::SinkWriteFailure {
        sink: path.display().to_string(),
        at: "open".to_string(),
        error,
    })?;

    let compressed = matches!(
        path.extension().and_then(|ext| ext.to_str()),
        Some("gz" | "bgz")
    );
    if compressed {
        log::debug!("Writing {} as BGZF", path.display());
        Ok(Box::new(BgzfOutput::new(BufWriter::new(file))))
    } else {
        Ok(Box::new(BufWriter::with_capacity(OUTPUT_BUFFER_SIZE, file)))
    }
}

/// Tab-separated matrix: `chrom\tpos\tcell...` per row, one cell per sample
pub struct TsvMatrixSink<W> {
    name: String,
    layer: usize,
    header: bool,
    writer: W,
    line: String,
}

impl<W: MatrixWrite> TsvMatrixSink<W> {
    pub fn new(name: impl Into<String>, layer: usize, writer: W) -> Self {
        Self {
            name: name.into(),
            layer,
            header: false,
            writer,
            line: String::new(),
        }
    }

    /// Emit a `#CHROM\tPOS\t<labels>` line before the first row
    pub fn with_header(mut self, header: bool) -> Self {
        self.header = header;
        self
    }

    pub fn into_inner(self) -> W {
        self.writer
    }
}

impl<W: MatrixWrite> MatrixSink for TsvMatrixSink<W> {
    fn name(&self) -> &str {
        &self.name
    }

    fn layer(&self) -> usize {
        self.layer
    }

    fn begin(&mut self, labels: &[&str]) -> io::Result<()> {
        if !self.header {
            return Ok(());
        }
        self.line.clear();
        self.line.push_str("#CHROM\tPOS");
        for label in labels {
            self.line.push('\t');
            self.line.push_str(label);
        }
        self.line.push('\n');
        self.writer.write_all(self.line.as_bytes())
    }

    fn accept(&mut self, row: &Row) -> io::Result<()> {
        // Whole line first, then one write
        self.line.clear();
        let _ = write!(self.line, "{}\t{}", row.chromosome, row.position);
        for cell in row.cells(self.layer) {
            let _ = write!(self.line, "\t{}", cell);
        }
        self.line.push('\n');
        self.writer.write_all(self.line.as_bytes())
    }

    fn finish(&mut self) -> io::Result<()> {
        self.writer.finish()
    }
}

/// A requested output: which representation goes to which path (`REPR=PATH`)
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MatrixSpec {
    pub representation: CellRepresentation,
    pub path: PathBuf,
}

impl FromStr for MatrixSpec {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        let (representation, path) = s
            .split_once('=')
            .ok_or_else(|| format!("expected REPR=PATH, got '{}'", s))?;
        if path.is_empty() {
            return Err(format!("missing output path in '{}'", s));
        }
        Ok(Self {
            representation: representation.parse()?,
            path: PathBuf::from(path),
        })
    }
}

/// Reject two matrices aimed at the same destination, `-` included.
///
/// Paths are compared after making them absolute, so `out.tsv` and `./out.tsv` collide.
pub fn check_distinct_outputs(specs: &[MatrixSpec]) -> Result<()> {
    let mut seen: Vec<(PathBuf, &MatrixSpec)> = Vec::with_capacity(specs.len());
    for spec in specs {
        let target = if spec.path.as_os_str() == "-" {
            spec.path.clone()
        } else {
            std::path::absolute(&spec.path).unwrap_or_else(|_| spec.path.clone())
        };
        if let Some((_, earlier)) = seen.iter().find(|(path, _)| *path == target) {
            return Err(MergeError::InvalidParameter {
                parameter: "matrix".to_string(),
                reason: format!(
                    "{} and {} matrices both write to {}",
                    earlier.representation.name(),
                    spec.representation.name(),
                    spec.path.display()
                ),
            });
        }
        seen.push((target, spec));
    }
    Ok(())
}
