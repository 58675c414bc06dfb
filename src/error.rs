use thiserror::Error;

/// Errors raised while building or decoding genomes.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum GenomeError {
    #[error("genome must contain at least one instruction")]
    Empty,
    #[error("byte {byte:#04x} at position {position} is not a valid instruction")]
    InvalidInstruction { position: usize, byte: u8 },
    #[error("mutation produced an empty genome")]
    MutatedToEmpty,
    #[error(transparent)]
    Catalog(#[from] CatalogError),
}

/// Errors raised by the instruction catalog.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum CatalogError {
    #[error("no opcodes are available for random selection")]
    NothingAvailable,
}

/// Errors raised by pool bookkeeping and the tick scheduler.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum WorldError {
    #[error("agent slot {0} is already empty")]
    SlotAlreadyEmpty(usize),
    #[error("agent slot {index} is out of range (capacity {capacity})")]
    SlotOutOfRange { index: usize, capacity: usize },
    #[error("agent slot {0} has no body segments")]
    NoSegments(usize),
    #[error(transparent)]
    Genome(#[from] GenomeError),
    #[error(transparent)]
    Catalog(#[from] CatalogError),
}

/// Errors raised while reading a world snapshot.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum PersistError {
    #[error("snapshot was written on a machine with different endianness")]
    ForeignEndianness,
    #[error("unsupported snapshot version {found} (expected {expected})")]
    UnsupportedVersion { found: u32, expected: u32 },
    #[error("snapshot truncated: needed {needed} bytes, found {found}")]
    Truncated { needed: usize, found: usize },
    #[error("snapshot field is invalid: {0}")]
    Corrupt(&'static str),
    #[error(transparent)]
    Genome(#[from] GenomeError),
}
