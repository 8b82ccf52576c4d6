//! # Mistfall Store
//!
//! The object-store engine contract that the Mistfall runtime drives, plus
//! an in-process reference engine.
//!
//! This crate provides:
//! - The record model: [`Value`], [`Key`], and [`Row`]
//! - The engine trait family: [`StoreEngine`], [`StoreDatabase`],
//!   [`StoreTransaction`], and [`UpgradeContext`]
//! - [`HeapEngine`], a process-wide in-memory engine with the full
//!   versioned-open and transactional contract
//!
//! Engines are **structured-value stores**: each named object store holds
//! rows keyed by a key path, optionally covered by indexes. The runtime owns
//! all relational interpretation; engines do not understand tables, foreign
//! keys, or identity columns.

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod engine;
mod error;
mod heap;
mod value;

pub use engine::{
    IndexSpec, StoreDatabase, StoreEngine, StoreTransaction, TransactionMode, UpgradeContext,
};
pub use error::{StoreError, StoreResult};
pub use heap::HeapEngine;
pub use value::{Key, Row, Value};
