//! Campaign Mapper Library
//!
//! Quota-aware placement of keyword sets onto a hierarchical ad platform
//! (account > campaign > ad group > keyword) driven through its web UI.
//!
//! ## Architecture (6 Components)
//!
//! 1. SessionDriver - one signed-in remote session, declarative form workflows
//! 2. LocalMirror - MySQL mirror of remote ids and structure
//! 3. NameLedger - unique, never reused campaign/ad group names
//! 4. CapacityModel - free slots per account and per set
//! 5. AllocationEngine - set creation, maintenance, reporting, cloning
//! 6. WebAPI - REST API endpoints
//!
//! ## Design Principles
//!
//! - The remote platform is authoritative for ids; the mirror records only
//!   confirmed results
//! - One engine instance is the only writer

pub mod allocation;
pub mod capacity;
pub mod error;
pub mod local_mirror;
pub mod models;
pub mod name_ledger;
pub mod session_driver;
pub mod state;
pub mod web_api;

pub use error::{Error, Result};
pub use state::AppState;
