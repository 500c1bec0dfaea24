//! Document store seam.
//!
//! [`Collection`] is the per-collection surface the service reads and
//! writes through; [`DocumentStore`] owns collections plus connection
//! lifecycle; [`StoreProvider`] opens a store for one service generation.
//! [`MemoryStore`] is the in-process engine used by the dev binary and the
//! tests; a real driver-backed store plugs in behind the same traits.

pub mod memory;
pub mod traits;

pub use memory::{MemoryStore, MemoryStoreProvider};
pub use traits::{
    Collection, DocumentStore, FindOptions, SortOrder, SortSpec, StoreError, StoreProvider,
    WriteOutcome,
};
