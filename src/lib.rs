//! rmirror - remote directory mirroring with a lock-guarded local cache
//!
//! Pulls remote directories and files over rsync/ssh into one cache
//! directory per (host, paths, filters) combination, with preflight checks,
//! per-key locking, and TTL-based cleanup.

pub mod audit;
pub mod bridge;
pub mod cache;
pub mod cli;
pub mod config;
pub mod connection;
pub mod error;
pub mod preflight;
pub mod sync;
pub mod transfer;
pub mod ui;

pub use error::{ErrorClass, RmirrorError, RmirrorResult};
