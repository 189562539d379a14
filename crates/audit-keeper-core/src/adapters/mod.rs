//! # Infrastructure Adapters
//!
//! Infrastructure implementations of the ledger storage interface.

pub mod filesystem_storage;
pub mod memory_storage;

pub use filesystem_storage::FilesystemLedgerStorage;
pub use memory_storage::InMemoryLedgerStorage;
