//! Drive v3 / Sheets v4 client, the remote backend behind
//! [`kpiboard_sync::SheetService`].
//!
//! Blocking reqwest client (no Tokio runtime required). Lookups go through
//! Drive `files.list`; sheet listing, range reads and batch writes through
//! the Sheets values API. Token acquisition is the caller's job.

mod client;
mod wire;

pub use client::{DriveClient, DriveOptions, DEFAULT_DRIVE_BASE, DEFAULT_SHEETS_BASE, MAX_RETRIES};
