//! Inspection pipeline common library
#![deny(clippy::unwrap_used, clippy::expect_used)]
//!
//! Shared utilities for the inspection-export ingestion workspace.
//!
//! - **Checksums**: incremental SHA-256 hashing of object bodies
//! - **Logging**: `tracing` subscriber setup shared by every binary
//!
//! # Example
//!
//! ```no_run
//! use insp_common::checksum::ContentHasher;
//!
//! let mut hasher = ContentHasher::new();
//! hasher.update(b"header\n");
//! hasher.update(b"row\n");
//! println!("digest: {}", hasher.finalize_hex());
//! ```

pub mod checksum;
pub mod logging;
