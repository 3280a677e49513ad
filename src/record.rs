use crate::key::Locus;
use std::fmt;

/// One single-sample variant call as read from a source
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Record {
    pub chromosome: String,
    pub position: u64,
    /// FORMAT column: colon-delimited subfield names for `sample_field`
    pub format: String,
    /// The sample column: colon-delimited subfield values
    pub sample_field: String,
}

impl Record {
    pub fn new(
        chromosome: impl Into<String>,
        position: u64,
        format: impl Into<String>,
        sample_field: impl Into<String>,
    ) -> Self {
        Self {
            chromosome: chromosome.into(),
            position,
            format: format.into(),
            sample_field: sample_field.into(),
        }
    }

    pub fn locus(&self) -> Locus<'_> {
        Locus::new(&self.chromosome, self.position)
    }

    pub(crate) fn clear(&mut self) {
        self.chromosome.clear();
        self.position = 0;
        self.format.clear();
        self.sample_field.clear();
    }
}

impl fmt::Display for Record {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.chromosome, self.position)
    }
}
