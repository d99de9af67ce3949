//! Index and row storage over an ordered key-value ledger.
//!
//! Three structures share one store: a B+Tree secondary index
//! ([`tree::IndexTree`]), append-only overflow lists for large value sets
//! ([`list::OverflowList`]) and a block store that packs rows into
//! fixed-capacity blocks ([`block::BlockStore`]). The services in
//! [`service`] compose them into row-level operations.

pub mod block;
pub mod cache;
pub mod config;
pub mod encoding;
pub mod error;
pub mod filter;
pub mod hasher;
pub mod list;
pub mod pointer;
pub mod service;
pub mod store;
pub mod tree;

pub use block::{BlockStore, RowFragment, RowOp, TableMeta, TableTally};
pub use config::EngineConfig;
pub use error::{Error, ErrorKind, Result};
pub use filter::Direction;
pub use hasher::Hasher;
pub use list::OverflowList;
pub use pointer::Pointer;
pub use service::{BlockService, IndexService};
pub use store::{KeyValueStore, MemoryStore};
pub use tree::{IndexEntry, IndexTree, InsertMode, OrderMode, TreeHead};
