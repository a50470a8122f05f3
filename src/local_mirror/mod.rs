//! LocalMirror - relational cache of confirmed remote structure
//!
//! ## Responsibilities
//!
//! - Account / Campaign / AdGroup records as plain data
//! - Repository interfaces decoupling allocation logic from the store
//! - MySQL implementation (`MySqlStore`) and in-process implementation (`MemoryStore`)
//! - `usednames` ledger table shares the same store
//!
//! Rows are written only after the matching remote call is confirmed; the
//! allocation engine owns that ordering.

mod memory;
mod repository;
mod types;

pub use memory::MemoryStore;
pub use repository::{LedgerRepository, MirrorRepository, MySqlStore};
pub use types::*;
