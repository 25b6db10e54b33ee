//! # Engine Configuration
//!
//! All knobs that the original tooling exposed as process-wide flags are
//! carried here as one explicit value, constructed once through
//! [`crate::EngineBuilder`] and owned by the engine. Nothing in the crate
//! reads global mutable state.
//!
//! - [`constants`]: numeric limits with their interdependencies

pub mod constants;
pub use constants::*;

use std::path::PathBuf;

use crate::dispatch::ExecMode;
use crate::store::KeyKind;

/// How update and fetch move bytes between the caller and the engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IoPath {
    /// One call per operation; the engine copies between the caller's
    /// scatter-gather regions and its own storage synchronously.
    Copying,
    /// The four-phase begin/prepare/commit/end handshake exposing
    /// engine-owned staging buffers to the caller.
    ZeroCopy,
}

/// Engine-wide configuration. Selected once at open time; the I/O path
/// and execution mode are not per-call choices.
#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// Directory holding per-container value arena files.
    pub data_dir: PathBuf,
    /// Copying baseline or zero-copy handshake for routed update/fetch.
    pub io_path: IoPath,
    /// Inline execution or the single cooperative worker.
    pub exec_mode: ExecMode,
    /// Interpretation and ordering of dataset/attribute keys.
    pub key_kind: KeyKind,
    /// Number of pre-allocated staging buffers (bounded pool).
    pub staging_buffers: usize,
    /// Size of each staging buffer in bytes.
    pub staging_buf_size: usize,
    /// Initial size of each container's value arena, in arena pages.
    pub arena_initial_pages: u32,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            data_dir: PathBuf::from("./epodb-data"),
            io_path: IoPath::Copying,
            exec_mode: ExecMode::Inline,
            key_kind: KeyKind::Bytes,
            staging_buffers: DEFAULT_STAGING_BUFFERS,
            staging_buf_size: STAGING_BUF_SIZE,
            arena_initial_pages: DEFAULT_ARENA_INITIAL_PAGES,
        }
    }
}
