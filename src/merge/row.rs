use crate::extract::Cell;
use crate::key::Locus;

/// One matrix row: a key plus one cell per sample for every extraction rule
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Row {
    pub chromosome: String,
    pub position: u64,
    /// `layers[rule][sample]`
    layers: Vec<Vec<Cell>>,
    /// Indices of the sources whose record had this row's key
    participants: Vec<usize>,
}

impl Row {
    pub(crate) fn new(
        chromosome: String,
        position: u64,
        layers: Vec<Vec<Cell>>,
        participants: Vec<usize>,
    ) -> Self {
        Self {
            chromosome,
            position,
            layers,
            participants,
        }
    }

    pub fn locus(&self) -> Locus<'_> {
        Locus::new(&self.chromosome, self.position)
    }

    /// Cells of one extraction rule, in sample order
    pub fn cells(&self, layer: usize) -> &[Cell] {
        self.layers.get(layer).map(Vec::as_slice).unwrap_or(&[])
    }

    pub fn participants(&self) -> &[usize] {
        &self.participants
    }
}
