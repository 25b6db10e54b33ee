//! # epodb - Epoch-Versioned Object Store Core
//!
//! epodb is the indexing and I/O core of a persistent, epoch-versioned
//! hierarchical key-value engine. Records live under a three-level key
//! space (dataset-key, then attribute-key, then value, where a value is
//! either a single scalar or a byte-range extent) and every version carries
//! the epoch at which it became visible.
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────┐
//! │            Public API (Engine)           │
//! ├────────────────────┬────────────────────┤
//! │  Hierarchy Cursors │  Update/Fetch I/O  │
//! │  (iter)            │  (io: copy + zc)   │
//! ├────────────────────┴────────────────────┤
//! │  Dispatch (inline / cooperative worker)  │
//! ├─────────────────────────────────────────┤
//! │  Versioned Hierarchy Store (store)       │
//! │  sorted key arrays · epoch version sets  │
//! ├─────────────────────────────────────────┤
//! │  Ordered-Array Primitive (sort)          │
//! │  Memory-Mapped Value Arena               │
//! └─────────────────────────────────────────┘
//! ```
//!
//! ## Core Pieces
//!
//! - [`sort`]: in-place ordering/search over opaque records through an
//!   injected comparison/exchange capability.
//! - [`iter`]: the prepare/probe/fetch/next/finish cursor protocol over
//!   the key hierarchy, scoped to an epoch range, with a nested mode
//!   that reuses parent positioning.
//! - [`io`]: a copying baseline path and the four-phase zero-copy
//!   handshake (begin → prepare_buffers → commit → end) over
//!   engine-owned staging buffers, with an end call required on every
//!   exit path.
//! - [`dispatch`]: inline execution or one CPU-pinned cooperative
//!   worker, joined synchronously; a performance knob, never a
//!   semantic one.
//!
//! ## Quick Start
//!
//! ```ignore
//! use epodb::{Engine, IoDescriptor, ObjectAddr, RecordSpec, SgList};
//!
//! let engine = Engine::builder().data_dir("./data").open()?;
//! let cont = engine.create_container()?;
//! let addr = ObjectAddr::new(1, 0);
//!
//! let desc = IoDescriptor {
//!     dkey: epodb::KeyBuf::from_slice(b"group"),
//!     akey: epodb::KeyBuf::from_slice(b"field"),
//!     spec: RecordSpec::Single { size: 5 },
//! };
//! engine.update(cont, addr, 7, &desc, &SgList::single(b"hello"))?;
//! ```

pub mod config;
pub mod dispatch;
pub mod engine;
pub mod error;
pub mod io;
pub mod iter;
pub mod sort;
pub mod store;

pub use config::{EngineConfig, IoPath};
pub use dispatch::{DispatchExecutor, ExecMode};
pub use engine::{Engine, EngineBuilder, MaxKeyResult};
pub use error::EpodbError;
pub use io::{IoDescriptor, IoDir, IoHandle, RecordSpec, SgList, SgListMut};
pub use iter::{
    Anchor, Cursor, EntryKind, ExtentSpan, IterEntry, IterLevel, IterParams, Probe, Step,
    TraversalRecord,
};
pub use store::{ContainerHandle, Epoch, EpochRange, KeyBuf, KeyCodec, KeyKind, ObjectAddr};

/// Crate version.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
