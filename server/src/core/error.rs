//! Internal error type shared by the core modules
//!
//! `CoreError` is for `?`-propagation inside `core::*` before a call site
//! reduces it to the spec's externally-visible taxonomy
//! (`ValidationError`/`AuthError`/`TransportError`/`OverflowError`/`InternalError`).

use thiserror::Error;

#[derive(Error, Debug)]
pub enum CoreError {
    #[error("channel closed")]
    ChannelClosed,

    #[error("store error: {0}")]
    Store(#[from] crate::data::sqlite::SqliteError),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}
