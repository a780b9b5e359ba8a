// # Record Store Implementations
//
// This module provides record stores that live inside the process.
// Remote providers live in their own crates.

pub mod memory;

pub use memory::{MemoryRecordStore, MemoryStoreFactory};
