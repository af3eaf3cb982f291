use crate::block::{Contents, PrimitiveBlock};

use std::io;

/// A re-scannable sequence of primitive blocks.
///
/// Blocks are addressed by their position, so that every pass can restart
/// from the first block and workers can read blocks independently of each
/// other.
pub trait BlockSource: Sync {
    /// Number of blocks.
    fn len(&self) -> usize;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Kinds of primitives contained in the block at `idx`.
    ///
    /// Passes use this to skip blocks without reading them. Returning
    /// `Contents::ALL` is always correct.
    fn contents(&self, idx: usize) -> Contents;

    /// Reads and decodes the block at `idx`.
    fn read_block(&self, idx: usize) -> io::Result<PrimitiveBlock>;
}

/// Blocks held in memory.
#[derive(Debug, Clone, Default)]
pub struct MemorySource {
    blocks: Vec<PrimitiveBlock>,
}

impl MemorySource {
    pub fn new(blocks: Vec<PrimitiveBlock>) -> Self {
        Self { blocks }
    }

    pub fn blocks(&self) -> &[PrimitiveBlock] {
        &self.blocks
    }
}

impl From<Vec<PrimitiveBlock>> for MemorySource {
    fn from(blocks: Vec<PrimitiveBlock>) -> Self {
        Self::new(blocks)
    }
}

impl BlockSource for MemorySource {
    fn len(&self) -> usize {
        self.blocks.len()
    }

    fn contents(&self, idx: usize) -> Contents {
        self.blocks[idx].contents()
    }

    fn read_block(&self, idx: usize) -> io::Result<PrimitiveBlock> {
        self.blocks.get(idx).cloned().ok_or_else(|| {
            io::Error::new(
                io::ErrorKind::UnexpectedEof,
                format!("block {} out of range", idx),
            )
        })
    }
}
