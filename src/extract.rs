//! Allele-depth extraction from a sample's colon-delimited FORMAT values.
//!
//! Which subfield feeds which matrix is configuration, not convention: an
//! [`ExtractionRule`] names the representation and how to locate the allele-depth
//! (and, for `reference-depth`, total-depth) subfields.

use crate::error::ExtractError;
use crate::record::Record;
use clap::ValueEnum;
use std::convert::Infallible;
use std::fmt;
use std::str::FromStr;

/// Rendering of a cell with no data for its sample
pub const MISSING: &str = ".";

/// How to find a subfield within the sample column
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SubfieldLocator {
    /// Subfield named in the FORMAT column ("AD", "DP")
    Tag(String),
    /// 0-based position among the sample's colon-delimited values
    Index(usize),
}

impl SubfieldLocator {
    /// Find this subfield's text in a sample field described by `format`
    pub fn locate<'a>(&self, format: &str, sample_field: &'a str) -> Option<&'a str> {
        let index = match self {
            SubfieldLocator::Index(index) => *index,
            SubfieldLocator::Tag(tag) => format.split(':').position(|name| name == tag)?,
        };
        sample_field.split(':').nth(index)
    }
}

impl FromStr for SubfieldLocator {
    type Err = Infallible;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        Ok(match s.parse::<usize>() {
            Ok(index) => SubfieldLocator::Index(index),
            Err(_) => SubfieldLocator::Tag(s.to_string()),
        })
    }
}

impl fmt::Display for SubfieldLocator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SubfieldLocator::Tag(tag) => f.write_str(tag),
            SubfieldLocator::Index(index) => write!(f, "#{index}"),
        }
    }
}

/// Parsed allele-depth subfield: reference count followed by alternate counts
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AlleleDepth {
    counts: Vec<u32>,
}

impl AlleleDepth {
    /// Parse a comma-separated count list such as `5,3`
    pub fn parse(text: &str, subfield: &str) -> Result<Self, ExtractError> {
        if text.is_empty() || text == MISSING {
            return Err(ExtractError::MissingDepthField {
                subfield: subfield.to_string(),
            });
        }

        let counts = text
            .split(',')
            .map(|count| {
                count.parse::<u32>().map_err(|_| ExtractError::InvalidDepth {
                    subfield: subfield.to_string(),
                    text: text.to_string(),
                })
            })
            .collect::<Result<Vec<_>, _>>()?;

        Ok(Self { counts })
    }

    pub fn reference(&self) -> u32 {
        self.counts[0]
    }

    pub fn alternates(&self) -> &[u32] {
        &self.counts[1..]
    }

    pub fn counts(&self) -> &[u32] {
        &self.counts
    }

    pub fn into_counts(self) -> Vec<u32> {
        self.counts
    }
}

/// Derived value written to a matrix cell
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum Cell {
    #[default]
    Missing,
    Count(u32),
    Counts(Vec<u32>),
}

impl Cell {
    pub fn is_missing(&self) -> bool {
        matches!(self, Cell::Missing)
    }
}

impl fmt::Display for Cell {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Cell::Missing => f.write_str(MISSING),
            Cell::Count(count) => write!(f, "{count}"),
            Cell::Counts(counts) => {
                for (i, count) in counts.iter().enumerate() {
                    if i > 0 {
                        f.write_str(",")?;
                    }
                    write!(f, "{count}")?;
                }
                Ok(())
            }
        }
    }
}

/// What a matrix cell holds
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum CellRepresentation {
    /// Reference allele count (first AD value)
    #[value(name = "reference")]
    Reference,
    /// Sum of the alternate allele counts
    #[value(name = "alternate")]
    Alternate,
    /// All allele counts, comma-separated ("ref,alt")
    #[value(name = "combined")]
    Combined,
    /// Reference count and total depth, comma-separated ("ref,DP")
    #[value(name = "reference-depth")]
    ReferenceDepth,
}

impl CellRepresentation {
    pub fn name(&self) -> &'static str {
        match self {
            CellRepresentation::Reference => "reference",
            CellRepresentation::Alternate => "alternate",
            CellRepresentation::Combined => "combined",
            CellRepresentation::ReferenceDepth => "reference-depth",
        }
    }
}

impl FromStr for CellRepresentation {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        <Self as ValueEnum>::from_str(s, true)
    }
}

/// One matrix layer's extraction: representation plus subfield locations
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExtractionRule {
    representation: CellRepresentation,
    allele_depth: SubfieldLocator,
    total_depth: SubfieldLocator,
}

impl ExtractionRule {
    /// Rule reading the standard `AD` and `DP` FORMAT subfields
    pub fn new(representation: CellRepresentation) -> Self {
        Self {
            representation,
            allele_depth: SubfieldLocator::Tag("AD".to_string()),
            total_depth: SubfieldLocator::Tag("DP".to_string()),
        }
    }

    pub fn with_allele_depth(mut self, locator: SubfieldLocator) -> Self {
        self.allele_depth = locator;
        self
    }

    pub fn with_total_depth(mut self, locator: SubfieldLocator) -> Self {
        self.total_depth = locator;
        self
    }

    pub fn representation(&self) -> CellRepresentation {
        self.representation
    }

    /// Extract this rule's cell from one record
    pub fn extract(&self, record: &Record) -> Result<Cell, ExtractError> {
        self.extract_sample(&record.format, &record.sample_field)
    }

    /// Extract this rule's cell from a FORMAT column and its sample values
    pub fn extract_sample(&self, format: &str, sample_field: &str) -> Result<Cell, ExtractError> {
        let depth = self.allele_depth(format, sample_field)?;

        match self.representation {
            CellRepresentation::Reference => Ok(Cell::Count(depth.reference())),
            CellRepresentation::Alternate => {
                if depth.alternates().is_empty() {
                    return Err(ExtractError::NoAlternateCount {
                        subfield: self.allele_depth.to_string(),
                    });
                }
                depth
                    .alternates()
                    .iter()
                    .try_fold(0u32, |sum, &count| sum.checked_add(count))
                    .map(Cell::Count)
                    .ok_or_else(|| ExtractError::InvalidDepth {
                        subfield: self.allele_depth.to_string(),
                        text: format!("{}", Cell::Counts(depth.counts().to_vec())),
                    })
            }
            CellRepresentation::Combined => Ok(Cell::Counts(depth.into_counts())),
            CellRepresentation::ReferenceDepth => {
                let subfield = self.total_depth.to_string();
                let text = self
                    .total_depth
                    .locate(format, sample_field)
                    .filter(|text| !text.is_empty() && *text != MISSING)
                    .ok_or_else(|| ExtractError::MissingDepthField {
                        subfield: subfield.clone(),
                    })?;
                let total = text
                    .parse::<u32>()
                    .map_err(|_| ExtractError::InvalidDepth {
                        subfield,
                        text: text.to_string(),
                    })?;
                Ok(Cell::Counts(vec![depth.reference(), total]))
            }
        }
    }

    fn allele_depth(&self, format: &str, sample_field: &str) -> Result<AlleleDepth, ExtractError> {
        let subfield = self.allele_depth.to_string();
        match self.allele_depth.locate(format, sample_field) {
            Some(text) => AlleleDepth::parse(text, &subfield),
            None => Err(ExtractError::MissingDepthField { subfield }),
        }
    }
}

impl fmt::Display for ExtractionRule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.representation {
            CellRepresentation::ReferenceDepth => write!(
                f,
                "{} ({}, {})",
                self.representation.name(),
                self.allele_depth,
                self.total_depth
            ),
            _ => write!(f, "{} ({})", self.representation.name(), self.allele_depth),
        }
    }
}
