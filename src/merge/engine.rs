use crate::error::{MergeError, Result};
use crate::extract::{Cell, ExtractionRule};
use crate::key::{KeyOrder, Locus, NaturalOrder};
use crate::merge::Row;
use crate::source::{RecordReader, RecordSource};
use std::cmp::Ordering;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering as AtomicOrdering};

/// Rows between progress log lines
pub const PROGRESS_INTERVAL: u64 = 1_000_000;

/// Shared flag that stops a merge between rows
#[derive(Debug, Clone, Default)]
pub struct CancelToken(Arc<AtomicBool>);

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, AtomicOrdering::Relaxed);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(AtomicOrdering::Relaxed)
    }
}

/// Per-source counters reported after a merge
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceSummary {
    pub id: String,
    pub label: String,
    pub records: u64,
    /// Cells written as missing because extraction failed
    pub recovered: u64,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MergeSummary {
    pub rows: u64,
    pub recovered_cells: u64,
    pub sources: Vec<SourceSummary>,
}

/// Synchronized k-way merge of sorted record sources.
///
/// Each call to [`next_row`](Self::next_row) finds the minimum key among the
/// sources that still hold a record, builds a row from every source tied at that
/// key (everyone else gets the missing cell), and remembers those participants.
/// Participants are advanced at the start of the following call, so a row is
/// handed out before any read error from its participants can surface.
/// Non-participants keep their buffered record untouched.
pub struct MergeEngine<R> {
    sources: Vec<RecordSource<R>>,
    rules: Vec<ExtractionRule>,
    order: Box<dyn KeyOrder + Send>,
    validate_order: bool,
    cancel: CancelToken,
    /// Sources not yet exhausted
    active: usize,
    /// Participants of the last row, still to be advanced
    pending: Vec<usize>,
    last_key: Option<(String, u64)>,
    recovered: Vec<u64>,
    rows: u64,
    finished: bool,
}

impl<R: RecordReader> MergeEngine<R> {
    /// Merge primed sources in natural chromosome order
    pub fn new(sources: Vec<RecordSource<R>>, rules: Vec<ExtractionRule>) -> Self {
        let active = sources.iter().filter(|s| !s.is_exhausted()).count();
        let recovered = vec![0; sources.len()];
        Self {
            sources,
            rules,
            order: Box::new(NaturalOrder),
            validate_order: false,
            cancel: CancelToken::new(),
            active,
            pending: Vec::new(),
            last_key: None,
            recovered,
            rows: 0,
            finished: false,
        }
    }

    /// Replace the key order; it must match the order the inputs are sorted in
    pub fn with_order(mut self, order: Box<dyn KeyOrder + Send>) -> Self {
        self.order = order;
        self
    }

    /// Fail with `MalformedRecord` when a source goes backwards or repeats a key
    pub fn validate_order(mut self, validate: bool) -> Self {
        self.validate_order = validate;
        self
    }

    pub fn with_cancel_token(mut self, token: CancelToken) -> Self {
        self.cancel = token;
        self
    }

    pub fn cancel_token(&self) -> CancelToken {
        self.cancel.clone()
    }

    pub fn rules(&self) -> &[ExtractionRule] {
        &self.rules
    }

    pub fn sample_labels(&self) -> Vec<&str> {
        self.sources.iter().map(RecordSource::label).collect()
    }

    pub fn active_sources(&self) -> usize {
        self.active
    }

    pub fn summary(&self) -> MergeSummary {
        MergeSummary {
            rows: self.rows,
            recovered_cells: self.recovered.iter().sum(),
            sources: self
                .sources
                .iter()
                .zip(&self.recovered)
                .map(|(source, &recovered)| SourceSummary {
                    id: source.id().to_string(),
                    label: source.label().to_string(),
                    records: source.records_read(),
                    recovered,
                })
                .collect(),
        }
    }

    /// Produce the next row, or `None` once every source is exhausted
    pub fn next_row(&mut self) -> Result<Option<Row>> {
        if self.finished {
            return Ok(None);
        }
        if let Err(e) = self.advance_pending() {
            self.finished = true;
            return Err(e);
        }
        if self.active == 0 {
            self.finished = true;
            return Ok(None);
        }
        if self.cancel.is_cancelled() {
            self.finished = true;
            return Err(MergeError::Cancelled { rows: self.rows });
        }

        let Some(min) = self
            .sources
            .iter()
            .enumerate()
            .filter_map(|(i, source)| source.current().map(|record| (i, record)))
            .min_by(|(_, a), (_, b)| self.order.compare(a.locus(), b.locus()))
            .map(|(i, record)| (i, record.chromosome.clone(), record.position))
        else {
            self.active = 0;
            self.finished = true;
            return Ok(None);
        };
        let (first, chromosome, position) = min;
        let key = Locus::new(&chromosome, position);

        self.pending.clear();
        self.pending.push(first);
        for (i, source) in self.sources.iter().enumerate().skip(first + 1) {
            if let Some(record) = source.current() {
                if self.order.compare(record.locus(), key) == Ordering::Equal {
                    self.pending.push(i);
                }
            }
        }

        let mut layers = Vec::with_capacity(self.rules.len());
        for rule in &self.rules {
            let mut cells = vec![Cell::Missing; self.sources.len()];
            for &i in &self.pending {
                let Some(record) = self.sources[i].current() else {
                    continue;
                };
                match rule.extract(record) {
                    Ok(cell) => cells[i] = cell,
                    Err(e) => {
                        self.recovered[i] += 1;
                        if self.recovered[i] == 1 {
                            log::warn!(
                                "{}: {} at {}; writing '.' (further cases logged at debug)",
                                self.sources[i].id(),
                                e,
                                key
                            );
                        } else {
                            log::debug!("{}: {} at {}", self.sources[i].id(), e, key);
                        }
                    }
                }
            }
            layers.push(cells);
        }

        self.rows += 1;
        if self.rows % PROGRESS_INTERVAL == 0 {
            log::info!(
                "{} rows merged, at {}; {} of {} sources active",
                self.rows,
                key,
                self.active,
                self.sources.len()
            );
        }
        log::trace!("row {} at {} with {} samples", self.rows, key, self.pending.len());

        let row = Row::new(chromosome, position, layers, self.pending.clone());
        self.last_key = Some((row.chromosome.clone(), row.position));
        Ok(Some(row))
    }

    /// Advance the previous row's participants
    fn advance_pending(&mut self) -> Result<()> {
        for &i in &self.pending {
            let source = &mut self.sources[i];
            let Some(next) = source.advance()? else {
                self.active -= 1;
                continue;
            };
            if !self.validate_order {
                continue;
            }
            let Some((chromosome, position)) = &self.last_key else {
                continue;
            };
            let previous = Locus::new(chromosome, *position);
            let reason = match self.order.compare(next.locus(), previous) {
                Ordering::Greater => continue,
                Ordering::Equal => format!("duplicate site {}", previous),
                Ordering::Less => format!(
                    "input is not sorted: {} follows {}",
                    next.locus(),
                    previous
                ),
            };
            return Err(MergeError::MalformedRecord {
                source_id: source.id().to_string(),
                line: source.line_number(),
                after: previous.to_string(),
                reason,
            });
        }
        self.pending.clear();
        Ok(())
    }
}

impl<R: RecordReader> Iterator for MergeEngine<R> {
    type Item = Result<Row>;

    fn next(&mut self) -> Option<Self::Item> {
        self.next_row().transpose()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::extract::CellRepresentation;
    use crate::key::LexicalOrder;
    use crate::record::Record;
    use crate::source::testutil::{VecReader, source};

    fn rules() -> Vec<ExtractionRule> {
        vec![
            ExtractionRule::new(CellRepresentation::Reference),
            ExtractionRule::new(CellRepresentation::Combined),
        ]
    }

    fn render(row: &Row, layer: usize) -> String {
        let mut fields = vec![row.chromosome.clone(), row.position.to_string()];
        fields.extend(row.cells(layer).iter().map(|c| c.to_string()));
        fields.join(" ")
    }

    fn collect(engine: MergeEngine<VecReader>) -> Vec<Row> {
        engine.collect::<Result<Vec<_>>>().unwrap()
    }

    #[test]
    fn test_two_source_scenario() {
        let a = source("A", &[("chr1", 100, "0/1:5,3:8")]);
        let b = source("B", &[("chr1", 100, "0/1:2,6:8"), ("chr1", 150, "1/1:0,9:9")]);
        let rows = collect(MergeEngine::new(vec![a, b], rules()));

        assert_eq!(rows.len(), 2);
        assert_eq!(render(&rows[0], 0), "chr1 100 5 2");
        assert_eq!(render(&rows[0], 1), "chr1 100 5,3 2,6");
        assert_eq!(render(&rows[1], 0), "chr1 150 . 0");
        assert_eq!(render(&rows[1], 1), "chr1 150 . 0,9");
        assert_eq!(rows[0].participants(), &[0, 1]);
        assert_eq!(rows[1].participants(), &[1]);
    }

    #[test]
    fn test_non_participants_keep_their_record() {
        let a = source("A", &[("chr1", 300, "0/1:1,1:2")]);
        let b = source(
            "B",
            &[("chr1", 100, "0/1:2,0:2"), ("chr1", 200, "0/1:3,0:3"), ("chr1", 300, "0/1:4,0:4")],
        );
        let rows = collect(MergeEngine::new(vec![a, b], rules()));

        let rendered: Vec<String> = rows.iter().map(|row| render(row, 0)).collect();
        assert_eq!(
            rendered,
            vec!["chr1 100 . 2", "chr1 200 . 3", "chr1 300 1 4"]
        );
    }

    #[test]
    fn test_natural_chromosome_order_across_sources() {
        let a = source("A", &[("2", 10, "0/1:1,0:1"), ("10", 5, "0/1:2,0:2")]);
        let b = source("B", &[("2", 20, "0/1:3,0:3"), ("X", 1, "0/1:4,0:4")]);
        let rows = collect(MergeEngine::new(vec![a, b], rules()));

        let keys: Vec<String> = rows.iter().map(|row| row.locus().to_string()).collect();
        assert_eq!(keys, vec!["2:10", "2:20", "10:5", "X:1"]);
    }

    #[test]
    fn test_injected_order_changes_result() {
        let a = source("A", &[("10", 5, "0/1:2,0:2"), ("2", 10, "0/1:1,0:1")]);
        let engine = MergeEngine::new(vec![a], rules()).with_order(Box::new(LexicalOrder));
        let keys: Vec<String> = collect(engine).iter().map(|r| r.locus().to_string()).collect();
        assert_eq!(keys, vec!["10:5", "2:10"]);
    }

    #[test]
    fn test_single_source_reproduces_its_records() {
        let calls = [
            ("chr1", 1, "0/1:1,2:3"),
            ("chr1", 7, "0/1:4,5:9"),
            ("chr2", 3, "1/1:0,6:6"),
        ];
        let rows = collect(MergeEngine::new(vec![source("A", &calls)], rules()));

        assert_eq!(rows.len(), calls.len());
        for (row, (chromosome, position, sample)) in rows.iter().zip(calls) {
            assert_eq!(row.chromosome, chromosome);
            assert_eq!(row.position, position);
            let ad = sample.split(':').nth(1).unwrap();
            assert_eq!(row.cells(1)[0].to_string(), ad);
        }
    }

    #[test]
    fn test_disjoint_sources_one_cell_per_row() {
        let a = source("A", &[("chr1", 1, "0/1:1,0:1"), ("chr1", 5, "0/1:1,0:1")]);
        let b = source("B", &[("chr1", 2, "0/1:1,0:1")]);
        let c = source("C", &[("chr1", 3, "0/1:1,0:1"), ("chr2", 1, "0/1:1,0:1")]);
        let rows = collect(MergeEngine::new(vec![a, b, c], rules()));

        assert_eq!(rows.len(), 5);
        for row in &rows {
            let present = row.cells(0).iter().filter(|c| !c.is_missing()).count();
            assert_eq!(present, 1);
        }
        for pair in rows.windows(2) {
            assert_eq!(
                NaturalOrder.compare(pair[0].locus(), pair[1].locus()),
                Ordering::Less
            );
        }
    }

    #[test]
    fn test_empty_source_only_contributes_missing() {
        let empty = source("E", &[]);
        let a = source("A", &[("chr1", 1, "0/1:1,0:1"), ("chr1", 2, "0/1:2,0:2")]);
        let engine = MergeEngine::new(vec![empty, a], rules());
        assert_eq!(engine.active_sources(), 1);

        let rows = collect(engine);
        assert_eq!(rows.len(), 2);
        assert!(rows.iter().all(|row| row.cells(0)[0].is_missing()));
        assert!(rows.iter().all(|row| !row.participants().contains(&0)));
    }

    #[test]
    fn test_all_sources_empty_or_exhausted_together() {
        let rows = collect(MergeEngine::new(vec![source("E", &[]), source("F", &[])], rules()));
        assert!(rows.is_empty());

        let a = source("A", &[("chr1", 9, "0/1:1,0:1")]);
        let b = source("B", &[("chr1", 9, "0/1:2,0:2")]);
        let mut engine = MergeEngine::new(vec![a, b], rules());
        assert!(engine.next_row().unwrap().is_some());
        assert!(engine.next_row().unwrap().is_none());
        assert!(engine.next_row().unwrap().is_none());
        assert_eq!(engine.active_sources(), 0);
    }

    #[test]
    fn test_missing_depth_field_is_recovered() {
        let a = source("A", &[("chr1", 1, "0/1"), ("chr1", 2, "0/1:3,1:4")]);
        let b = source("B", &[("chr1", 1, "0/1:x,1:4")]);
        let mut engine = MergeEngine::new(vec![a, b], rules());

        let first = engine.next_row().unwrap().unwrap();
        assert_eq!(render(&first, 0), "chr1 1 . .");
        assert_eq!(first.participants(), &[0, 1]);
        let second = engine.next_row().unwrap().unwrap();
        assert_eq!(render(&second, 1), "chr1 2 3,1 .");
        assert!(engine.next_row().unwrap().is_none());

        let summary = engine.summary();
        assert_eq!(summary.rows, 2);
        // two rules per participant at row 1
        assert_eq!(summary.recovered_cells, 4);
        assert_eq!(summary.sources[0].recovered, 2);
        assert_eq!(summary.sources[0].records, 2);
    }

    #[test]
    fn test_malformed_record_is_fatal_after_row_is_emitted() {
        let records = vec![
            Record::new("chr1", 1, "GT:AD", "0/1:1,1"),
            Record::new("chr1", 2, "GT:AD", "0/1:1,1"),
        ];
        let bad = RecordSource::open("bad", VecReader::failing(records, 1)).unwrap();
        let good = source("good", &[("chr1", 1, "0/1:2,2:4"), ("chr1", 2, "0/1:3,3:6")]);
        let mut engine = MergeEngine::new(vec![bad, good], rules());

        let row = engine.next_row().unwrap().unwrap();
        assert_eq!(row.position, 1);
        match engine.next_row() {
            Err(MergeError::MalformedRecord { source_id, after, .. }) => {
                assert_eq!(source_id, "bad");
                assert_eq!(after, "chr1:1");
            }
            other => panic!("expected MalformedRecord, got {other:?}"),
        }
        assert!(engine.next_row().unwrap().is_none());
    }

    #[test]
    fn test_order_validation() {
        let unsorted = source("A", &[("chr1", 5, "0/1:1,0:1"), ("chr1", 3, "0/1:1,0:1")]);
        let mut engine = MergeEngine::new(vec![unsorted], rules()).validate_order(true);
        engine.next_row().unwrap();
        let err = engine.next_row().unwrap_err();
        assert!(err.to_string().contains("not sorted"));

        let duplicate = source("A", &[("chr1", 5, "0/1:1,0:1"), ("chr1", 5, "0/1:1,0:1")]);
        let mut engine = MergeEngine::new(vec![duplicate], rules()).validate_order(true);
        engine.next_row().unwrap();
        let err = engine.next_row().unwrap_err();
        assert!(err.to_string().contains("duplicate site"));
    }

    #[test]
    fn test_cancellation_stops_between_rows() {
        let a = source("A", &[("chr1", 1, "0/1:1,0:1"), ("chr1", 2, "0/1:1,0:1")]);
        let token = CancelToken::new();
        let mut engine = MergeEngine::new(vec![a], rules()).with_cancel_token(token.clone());

        assert!(engine.next_row().unwrap().is_some());
        token.cancel();
        assert!(matches!(
            engine.next_row(),
            Err(MergeError::Cancelled { rows: 1 })
        ));
    }

    #[test]
    fn test_rerun_is_identical() {
        let build = || {
            let a = source("A", &[("chr1", 100, "0/1:5,3:8"), ("chr3", 1, "0/1:1,1:2")]);
            let b = source("B", &[("chr1", 100, "0/1:2,6:8"), ("chr2", 150, "1/1:0,9:9")]);
            collect(MergeEngine::new(vec![a, b], rules()))
        };
        assert_eq!(build(), build());
    }
}
