use crate::error::Result;
use crate::Error;

/// Encoded size of a row fragment header: row id, op and column count.
pub const FRAGMENT_HEADER_SIZE: usize = 8 + 1 + 4;

/// Encoded size of one column's length prefix inside a fragment.
pub const COLUMN_HEADER_SIZE: usize = 4;

/// Capacity policy shared by the index tree, overflow lists and block store.
///
/// These values fix node and block boundaries. Changing them once data exists
/// breaks existing layouts.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EngineConfig {
    /// Maximum keys in one tree node before it splits (default: 3)
    pub max_node_keys: usize,

    /// Maximum tree height; a root split beyond it fails (default: 4)
    pub max_tree_height: u8,

    /// Byte budget of one overflow list node (default: 4KB)
    pub node_size: usize,

    /// Byte budget of one stored block (default: 4KB)
    pub block_size: usize,

    /// Bytes reserved per row fragment inside a block (default: 25)
    pub row_overhead: usize,

    /// Collection length at which an index value moves to an overflow list (default: 50)
    pub collection_threshold: usize,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            max_node_keys: 3,
            max_tree_height: 4,
            node_size: 4096,
            block_size: 4096,
            row_overhead: 25,
            collection_threshold: 50,
        }
    }
}

impl EngineConfig {
    pub fn new() -> Self {
        Self::default()
    }

    /// Set maximum keys per tree node
    pub fn max_node_keys(mut self, keys: usize) -> Self {
        self.max_node_keys = keys;
        self
    }

    /// Set maximum tree height
    pub fn max_tree_height(mut self, height: u8) -> Self {
        self.max_tree_height = height;
        self
    }

    /// Set overflow list node size
    pub fn node_size(mut self, size: usize) -> Self {
        self.node_size = size;
        self
    }

    /// Set block size
    pub fn block_size(mut self, size: usize) -> Self {
        self.block_size = size;
        self
    }

    /// Set per-row overhead
    pub fn row_overhead(mut self, overhead: usize) -> Self {
        self.row_overhead = overhead;
        self
    }

    /// Set the collection promotion threshold
    pub fn collection_threshold(mut self, threshold: usize) -> Self {
        self.collection_threshold = threshold;
        self
    }

    /// Checks that the policy can produce a working layout.
    pub fn validate(&self) -> Result<()> {
        if self.max_node_keys < 3 {
            return Err(Error::InvalidArgument(format!(
                "max_node_keys must be at least 3, got {}",
                self.max_node_keys
            )));
        }
        if self.max_tree_height == 0 {
            return Err(Error::InvalidArgument(
                "max_tree_height must be positive".to_string(),
            ));
        }
        if self.row_overhead < FRAGMENT_HEADER_SIZE {
            return Err(Error::InvalidArgument(format!(
                "row_overhead must cover the {} byte fragment header, got {}",
                FRAGMENT_HEADER_SIZE, self.row_overhead
            )));
        }
        if self.collection_threshold < 2 {
            return Err(Error::InvalidArgument(
                "collection_threshold must be at least 2".to_string(),
            ));
        }
        if self.block_size <= self.row_overhead + COLUMN_HEADER_SIZE {
            return Err(Error::InvalidArgument(format!(
                "block_size {} leaves no room for row data",
                self.block_size
            )));
        }
        if self.node_size < 64 {
            return Err(Error::InvalidArgument(format!(
                "node_size {} is too small",
                self.node_size
            )));
        }
        Ok(())
    }
}
