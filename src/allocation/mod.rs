//! AllocationEngine - quota-aware placement of keyword sets
//!
//! ## Responsibilities
//!
//! - Split keyword lists into ad-group-sized chunks in original order
//! - Choose the campaign (densest fit) or account for a new set
//! - Drive the remote session and record ledger entries and mirror rows
//!   after every confirmed remote call
//! - Set maintenance: drop, read, modify, bid change, reporting, account cloning
//!
//! ## Concurrency
//!
//! Capacity checks and name selection read then write without locking. One
//! engine instance must be the only writer; the HTTP layer serializes calls.

pub mod placement;
mod service;
mod types;

pub use service::AllocationEngine;
pub use types::*;

#[cfg(test)]
mod tests;
