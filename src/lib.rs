//! Merge sorted single-sample VCF streams into per-site allele-depth matrices.
//!
//! Every input is read once, front to back, with one buffered record per input.
//! Each output row is a genomic site present in at least one input; each column
//! is a sample, holding that sample's extracted depth or `.` when the sample has
//! no record at the site.

pub mod error;
pub mod extract;
pub mod key;
pub mod merge;
pub mod record;
pub mod sink;
pub mod source;

pub use error::{ExtractError, MergeError, ReadError, Result};
pub use extract::{Cell, CellRepresentation, ExtractionRule, SubfieldLocator};
pub use key::{ChromosomeOrder, ContigListOrder, KeyOrder, LexicalOrder, Locus, NaturalOrder};
pub use merge::{CancelToken, MergeEngine, MergeSummary, Row, SourceSummary};
pub use record::Record;
pub use sink::{
    BgzfOutput, MatrixSink, MatrixSpec, MatrixWrite, TsvMatrixSink, check_distinct_outputs,
    open_output,
};
pub use source::{RecordReader, RecordSource, load_manifest, open_vcf, open_vcfs};

/// Merge primed sources in natural order and write every row to every sink
pub fn run_merge<R: RecordReader, S: MatrixSink>(
    sources: Vec<RecordSource<R>>,
    rules: Vec<ExtractionRule>,
    sinks: &mut [S],
) -> Result<MergeSummary> {
    MergeEngine::new(sources, rules).write_to(sinks)
}
