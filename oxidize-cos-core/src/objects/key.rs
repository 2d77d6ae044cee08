use crate::error::{PdfError, Result};
use std::cmp::Ordering;
use std::fmt;
use std::hash::{Hash, Hasher};

/// Identity of an indirect object: object number plus generation.
///
/// Objects stored inside a compressed object stream additionally carry their
/// index within that stream. The index is bookkeeping for the reader and is
/// ignored by equality, hashing and ordering.
#[derive(Debug, Clone, Copy)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct ObjectKey {
    number: u64,
    generation: u32,
    stream_index: Option<u32>,
}

impl ObjectKey {
    /// Create a key, rejecting negative object or generation numbers.
    pub fn new(number: i64, generation: i64) -> Result<Self> {
        if number < 0 {
            return Err(PdfError::InvalidArgument(format!(
                "object number must not be negative, got {number}"
            )));
        }
        let generation = u32::try_from(generation).map_err(|_| {
            PdfError::InvalidArgument(format!(
                "generation number out of range, got {generation}"
            ))
        })?;
        Ok(Self {
            number: number as u64,
            generation,
            stream_index: None,
        })
    }

    /// Create a key from already validated parts.
    pub const fn from_parts(number: u64, generation: u32) -> Self {
        Self {
            number,
            generation,
            stream_index: None,
        }
    }

    /// Annotate the key with its index inside an object stream.
    pub fn with_stream_index(mut self, index: u32) -> Self {
        self.stream_index = Some(index);
        self
    }

    pub fn number(&self) -> u64 {
        self.number
    }

    pub fn generation(&self) -> u32 {
        self.generation
    }

    pub fn stream_index(&self) -> Option<u32> {
        self.stream_index
    }

    /// Packed hash value: generation in the low 16 bits, number above.
    ///
    /// Generations above 65535 share a slot with their truncated value;
    /// equality still compares the full generation.
    pub fn internal_hash(&self) -> u64 {
        (self.number << 16) | u64::from(self.generation & 0xFFFF)
    }
}

impl PartialEq for ObjectKey {
    fn eq(&self, other: &Self) -> bool {
        self.number == other.number && self.generation == other.generation
    }
}

impl Eq for ObjectKey {}

impl Hash for ObjectKey {
    fn hash<H: Hasher>(&self, state: &mut H) {
        state.write_u64(self.internal_hash());
    }
}

impl Ord for ObjectKey {
    fn cmp(&self, other: &Self) -> Ordering {
        self.number
            .cmp(&other.number)
            .then(self.generation.cmp(&other.generation))
    }
}

impl PartialOrd for ObjectKey {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl fmt::Display for ObjectKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {} R", self.number, self.generation)
    }
}
