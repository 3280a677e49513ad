//! Compression sniffing for input files.

/// Gzip member magic
const GZIP_MAGIC: [u8; 2] = [0x1f, 0x8b];

/// Bytes needed to recognise the BGZF extra subfield
pub const SNIFF_LEN: usize = 18;

/// How an input file is compressed, judged from its first bytes
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CompressionFormat {
    /// Blocked gzip, as written by bgzip
    Bgzf,
    /// Gzip without BGZF blocks
    Gzip,
    Plain,
}

impl CompressionFormat {
    /// Classify a file from its leading bytes.
    ///
    /// BGZF is gzip with the deflate method, FEXTRA set and a `BC` subfield first
    /// in the extra field.
    pub fn detect(head: &[u8]) -> Self {
        if head.len() < 2 || head[0..2] != GZIP_MAGIC {
            return Self::Plain;
        }
        if head.len() >= SNIFF_LEN && head[2] == 0x08 && head[3] & 0x04 != 0 {
            let xlen = u16::from_le_bytes([head[10], head[11]]);
            if xlen >= 6 && head[12] == b'B' && head[13] == b'C' {
                return Self::Bgzf;
            }
        }
        Self::Gzip
    }
}
