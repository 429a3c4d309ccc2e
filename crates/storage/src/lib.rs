//! Storage layer for Tabula
//!
//! This crate implements the table substrate in memory:
//! - MemTableStore: per-table `BTreeMap` rows behind `parking_lot::RwLock`
//! - DashMap table registry, so tables never contend with each other
//! - MemScanner: batched range scanner with open-resource accounting
//!
//! It is the reference backend for tests and embedded use; a remote
//! Bigtable-style client implements the same `TableStore` trait.

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod memory;
pub mod scanner;

pub use memory::MemTableStore;
pub use scanner::MemScanner;
