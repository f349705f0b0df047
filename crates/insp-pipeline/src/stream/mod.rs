//! Single-pass object body processing
//!
//! [`tee::Tee`] replicates the body; the consumers here run against the
//! replicated views.

pub mod tee;

use insp_common::checksum::ContentHasher;
use std::io;
use tokio::io::AsyncRead;

pub use tee::{Tee, TeeView, DEFAULT_VIEW_CAPACITY};

/// Object body as handed out by storage
pub type ByteReader = Box<dyn AsyncRead + Send + Unpin>;

/// SHA-256 hex digest of everything the view yields
pub async fn hash_view(mut view: TeeView) -> io::Result<String> {
    let mut hasher = ContentHasher::new();
    while let Some(chunk) = view.next_chunk().await {
        hasher.update(&chunk?);
    }
    Ok(hasher.finalize_hex())
}

/// Whole body as text; invalid UTF-8 sequences are replaced
pub async fn text_view(mut view: TeeView) -> io::Result<String> {
    let mut buffer = Vec::new();
    while let Some(chunk) = view.next_chunk().await {
        buffer.extend_from_slice(&chunk?);
    }
    Ok(String::from_utf8_lossy(&buffer).into_owned())
}
