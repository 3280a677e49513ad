use crate::error::ReadError;
use crate::record::Record;
use crate::source::RecordReader;
use memchr::memchr_iter;
use std::io::BufRead;

/// Columns of a single-sample VCF data line
const VCF_COLUMNS: usize = 10;
const CHROM: usize = 0;
const POS: usize = 1;
const FORMAT: usize = 8;
const SAMPLE: usize = 9;

/// Reader for single-sample VCF text.
///
/// Meta lines (`##`) are skipped; the `#CHROM` line supplies the sample name and
/// rejects multi-sample input.
pub struct VcfRecordReader<R> {
    inner: R,
    line: String,
    line_number: u64,
    sample_name: Option<String>,
}

impl<R: BufRead> VcfRecordReader<R> {
    pub fn new(inner: R) -> Self {
        Self {
            inner,
            line: String::new(),
            line_number: 0,
            sample_name: None,
        }
    }

    fn malformed(&self, reason: impl Into<String>) -> ReadError {
        ReadError::Malformed {
            line: self.line_number,
            reason: reason.into(),
        }
    }

    fn read_column_header(&mut self) -> Result<(), ReadError> {
        let columns: Vec<&str> = self.line.split('\t').collect();
        match columns.len() {
            n if n <= FORMAT => Ok(()),
            VCF_COLUMNS => {
                self.sample_name = Some(columns[SAMPLE].to_string());
                Ok(())
            }
            n if n > VCF_COLUMNS => Err(self.malformed(format!(
                "multi-sample VCF with {} samples is not supported",
                n - FORMAT - 1
            ))),
            _ => Err(self.malformed("#CHROM header has FORMAT but no sample column")),
        }
    }
}

impl<R: BufRead> RecordReader for VcfRecordReader<R> {
    fn read_record(&mut self, record: &mut Record) -> Result<bool, ReadError> {
        loop {
            self.line.clear();
            let n = self
                .inner
                .read_line(&mut self.line)
                .map_err(|error| ReadError::Io {
                    line: self.line_number + 1,
                    error,
                })?;
            if n == 0 {
                return Ok(false);
            }
            self.line_number += 1;

            let trimmed = self.line.trim_end_matches(['\n', '\r']).len();
            self.line.truncate(trimmed);

            if self.line.is_empty() || self.line.starts_with("##") {
                continue;
            }
            if self.line.starts_with('#') {
                self.read_column_header()?;
                continue;
            }
            break;
        }

        let bytes = self.line.as_bytes();
        let mut bounds = [0usize; VCF_COLUMNS + 1];
        let mut columns = 1;
        for tab in memchr_iter(b'\t', bytes) {
            if columns == VCF_COLUMNS {
                columns += 1;
                break;
            }
            bounds[columns] = tab + 1;
            columns += 1;
        }
        if columns != VCF_COLUMNS {
            let found = self.line.split('\t').count();
            return Err(self.malformed(format!(
                "expected {} tab-separated columns, found {}",
                VCF_COLUMNS, found
            )));
        }
        bounds[VCF_COLUMNS] = bytes.len() + 1;

        let column = |i: usize| &self.line[bounds[i]..bounds[i + 1] - 1];

        let chromosome = column(CHROM);
        if chromosome.is_empty() {
            return Err(self.malformed("empty CHROM"));
        }
        let position = column(POS)
            .parse::<u64>()
            .map_err(|_| self.malformed(format!("POS '{}' is not a number", column(POS))))?;

        record.clear();
        record.chromosome.push_str(chromosome);
        record.position = position;
        record.format.push_str(column(FORMAT));
        record.sample_field.push_str(column(SAMPLE));
        Ok(true)
    }

    fn sample_name(&self) -> Option<&str> {
        self.sample_name.as_deref()
    }

    fn line_number(&self) -> u64 {
        self.line_number
    }
}
