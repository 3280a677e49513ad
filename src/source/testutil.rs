//! In-memory record streams for tests.

use crate::error::ReadError;
use crate::record::Record;
use crate::source::{RecordReader, RecordSource};

/// Reader over a fixed list of records, optionally failing at a given read
pub(crate) struct VecReader {
    records: std::vec::IntoIter<Record>,
    fail_at: Option<usize>,
    read: usize,
}

impl VecReader {
    pub(crate) fn new(records: Vec<Record>) -> Self {
        Self {
            records: records.into_iter(),
            fail_at: None,
            read: 0,
        }
    }

    /// Fails on the `fail_at`-th read (0-based; read 0 primes the source)
    pub(crate) fn failing(records: Vec<Record>, fail_at: usize) -> Self {
        Self {
            fail_at: Some(fail_at),
            ..Self::new(records)
        }
    }
}

impl RecordReader for VecReader {
    fn read_record(&mut self, record: &mut Record) -> Result<bool, ReadError> {
        if self.fail_at == Some(self.read) {
            return Err(ReadError::Malformed {
                line: self.read as u64 + 1,
                reason: "garbage".to_string(),
            });
        }
        self.read += 1;
        match self.records.next() {
            Some(next) => {
                *record = next;
                Ok(true)
            }
            None => Ok(false),
        }
    }

    fn line_number(&self) -> u64 {
        self.read as u64
    }
}

/// Source over `(chromosome, position, sample_field)` triples with FORMAT `GT:AD:DP`
pub(crate) fn source(id: &str, calls: &[(&str, u64, &str)]) -> RecordSource<VecReader> {
    let records = calls
        .iter()
        .map(|&(chromosome, position, sample)| Record::new(chromosome, position, "GT:AD:DP", sample))
        .collect();
    RecordSource::open(id, VecReader::new(records)).unwrap()
}
