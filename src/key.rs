//! Total orders over (chromosome, position) keys.
//!
//! The merge never assumes a particular chromosome ordering; it is handed a
//! [`KeyOrder`] that must agree with the order the inputs were sorted in.

use crate::error::{MergeError, Result};
use clap::ValueEnum;
use std::cmp::Ordering;
use std::collections::HashMap;
use std::fmt;
use std::fs;
use std::path::Path;

/// A borrowed (chromosome, position) key
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Locus<'a> {
    pub chromosome: &'a str,
    pub position: u64,
}

impl<'a> Locus<'a> {
    pub fn new(chromosome: &'a str, position: u64) -> Self {
        Self {
            chromosome,
            position,
        }
    }
}

impl fmt::Display for Locus<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.chromosome, self.position)
    }
}

/// Strict total order over keys
pub trait KeyOrder {
    /// Order two chromosome names
    fn compare_chromosomes(&self, a: &str, b: &str) -> Ordering;

    /// Order two keys: chromosome first, position only when chromosomes are equal
    fn compare(&self, a: Locus<'_>, b: Locus<'_>) -> Ordering {
        self.compare_chromosomes(a.chromosome, b.chromosome)
            .then_with(|| a.position.cmp(&b.position))
    }
}

impl<T: KeyOrder + ?Sized> KeyOrder for Box<T> {
    fn compare_chromosomes(&self, a: &str, b: &str) -> Ordering {
        (**self).compare_chromosomes(a, b)
    }
}

/// Numeric runs compare by value: "2" < "10" < "X", "chr9" < "chr10"
#[derive(Debug, Clone, Copy, Default)]
pub struct NaturalOrder;

impl KeyOrder for NaturalOrder {
    fn compare_chromosomes(&self, a: &str, b: &str) -> Ordering {
        // natord treats "chr01" and "chr1" as equal; fall back to bytes so distinct
        // names never compare equal.
        natord::compare(a, b).then_with(|| a.cmp(b))
    }
}

/// Plain byte order: "10" < "2"
#[derive(Debug, Clone, Copy, Default)]
pub struct LexicalOrder;

impl KeyOrder for LexicalOrder {
    fn compare_chromosomes(&self, a: &str, b: &str) -> Ordering {
        a.cmp(b)
    }
}

/// Explicit contig order, e.g. the sequence order of a reference `.fai`.
///
/// Contigs missing from the list sort after every listed contig, in natural order.
#[derive(Debug, Clone, Default)]
pub struct ContigListOrder {
    ranks: HashMap<String, usize>,
}

impl ContigListOrder {
    pub fn new<I, S>(names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mut ranks = HashMap::new();
        for name in names {
            let next = ranks.len();
            ranks.entry(name.into()).or_insert(next);
        }
        Self { ranks }
    }

    /// Load contig names from the first tab-delimited column of each line
    pub fn from_path<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let text = fs::read_to_string(path)
            .map_err(|e| MergeError::unavailable(path.display().to_string(), e))?;

        let order = Self::new(
            text.lines()
                .filter(|line| !line.trim().is_empty() && !line.starts_with('#'))
                .filter_map(|line| line.split('\t').next())
                .map(str::trim),
        );
        if order.is_empty() {
            return Err(MergeError::InvalidParameter {
                parameter: "contig-order".to_string(),
                reason: format!("{} lists no contigs", path.display()),
            });
        }
        Ok(order)
    }

    pub fn len(&self) -> usize {
        self.ranks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ranks.is_empty()
    }
}

impl KeyOrder for ContigListOrder {
    fn compare_chromosomes(&self, a: &str, b: &str) -> Ordering {
        match (self.ranks.get(a), self.ranks.get(b)) {
            (Some(ra), Some(rb)) => ra.cmp(rb),
            (Some(_), None) => Ordering::Less,
            (None, Some(_)) => Ordering::Greater,
            (None, None) => NaturalOrder.compare_chromosomes(a, b),
        }
    }
}

/// Built-in chromosome orders selectable on the command line
#[derive(Debug, Clone, Copy, Default, ValueEnum)]
pub enum ChromosomeOrder {
    /// Natural order: numbers by value, then names ("1" < "2" < "10" < "X")
    #[default]
    #[value(name = "natural")]
    Natural,
    /// Byte order ("1" < "10" < "2" < "X")
    #[value(name = "lexical")]
    Lexical,
}

impl ChromosomeOrder {
    pub fn into_order(self) -> Box<dyn KeyOrder + Send> {
        match self {
            ChromosomeOrder::Natural => Box::new(NaturalOrder),
            ChromosomeOrder::Lexical => Box::new(LexicalOrder),
        }
    }
}
