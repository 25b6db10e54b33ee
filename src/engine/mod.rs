//! # Engine Facade
//!
//! [`Engine`] owns the containers, the staging buffer pool, the
//! dispatcher, and the configuration, and routes every public operation:
//!
//! - `update` / `fetch` move whole records over the configured I/O path
//!   (copying or zero-copy) under the configured execution mode (inline
//!   or cooperative worker).
//! - `update_begin` … `fetch_end` expose the raw zero-copy handshake for
//!   callers that drive the phases themselves.
//! - `iter_prepare` opens one hierarchy cursor; `iterate` walks a whole
//!   object, nested or flat.
//! - `query_max_key` reports the highest dataset-key (and highest
//!   extent) visible at an epoch.
//!
//! Engines are built once via [`EngineBuilder`]; mode choices are not
//! per-call.

use std::path::PathBuf;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;

use eyre::{Result, WrapErr};
use hashbrown::HashMap;
use parking_lot::RwLock;
use tracing::debug;

use crate::config::{EngineConfig, IoPath};
use crate::dispatch::{DispatchExecutor, ExecMode};
use crate::error::{invalid_arg, EpodbError};
use crate::io::staging::StagingPool;
use crate::io::{self, handle, IoDescriptor, IoDir, IoHandle, SgList, SgListMut};
use crate::iter::{self, Cursor, IterLevel, IterParams, TraversalRecord};
use crate::iter::snapshot::max_extent_span;
use crate::store::container::{ContainerHandle, ContainerShared};
use crate::store::{Epoch, EpochRange, KeyBuf, KeyCodec, KeyKind, ObjectAddr};

/// Result of [`Engine::query_max_key`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MaxKeyResult {
    /// Highest dataset-key visible at the query epoch.
    pub dkey: KeyBuf,
    /// Most recent visible epoch under that key.
    pub epoch: Epoch,
    /// Highest extent under that key, if its attributes hold extents.
    pub extent: Option<crate::iter::ExtentSpan>,
}

pub struct Engine {
    config: EngineConfig,
    codec: KeyCodec,
    containers: RwLock<HashMap<u32, Arc<ContainerShared>>>,
    next_container: AtomicU32,
    staging: StagingPool,
    executor: DispatchExecutor,
}

impl Engine {
    pub fn builder() -> EngineBuilder {
        EngineBuilder::default()
    }

    fn open(config: EngineConfig) -> Result<Self> {
        std::fs::create_dir_all(&config.data_dir).wrap_err_with(|| {
            format!("failed to create data directory '{}'", config.data_dir.display())
        })?;

        let executor = DispatchExecutor::new(config.exec_mode)?;
        let staging = StagingPool::new(config.staging_buffers, config.staging_buf_size);
        let codec = KeyCodec::new(config.key_kind);

        debug!(
            data_dir = %config.data_dir.display(),
            io_path = ?config.io_path,
            exec_mode = ?config.exec_mode,
            "engine opened"
        );

        Ok(Self {
            config,
            codec,
            containers: RwLock::new(HashMap::new()),
            next_container: AtomicU32::new(0),
            staging,
            executor,
        })
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Create a container with a fresh value arena.
    pub fn create_container(&self) -> Result<ContainerHandle> {
        let id = self.next_container.fetch_add(1, Ordering::SeqCst);
        let path = self.config.data_dir.join(format!("container-{id}.arena"));
        let shared = Arc::new(ContainerShared::create(
            &path,
            self.config.arena_initial_pages,
        )?);
        self.containers.write().insert(id, shared);
        debug!(container = id, "container created");
        Ok(ContainerHandle(id))
    }

    fn container(&self, ch: ContainerHandle) -> Result<Arc<ContainerShared>> {
        self.containers
            .read()
            .get(&ch.0)
            .cloned()
            .ok_or_else(|| invalid_arg(format!("unknown container handle {}", ch.0)))
    }

    /// Flush a container's value arena to its backing file.
    pub fn sync_container(&self, ch: ContainerHandle) -> Result<()> {
        self.container(ch)?.sync()
    }

    // ---- routed whole-record I/O ------------------------------------

    /// Write one record version at `epoch` from the caller's regions.
    pub fn update(
        &self,
        ch: ContainerHandle,
        addr: ObjectAddr,
        epoch: Epoch,
        desc: &IoDescriptor,
        sgl: &SgList<'_>,
    ) -> Result<()> {
        let need = desc.spec.transfer_len() as usize;
        if sgl.total_len() != need {
            return Err(invalid_arg(format!(
                "scatter-gather length {} does not match record length {need}",
                sgl.total_len()
            )));
        }
        if self.config.io_path == IoPath::ZeroCopy && sgl.regions().len() != 1 {
            return Err(invalid_arg(
                "zero-copy path carries exactly one scatter-gather region",
            ));
        }

        let container = self.container(ch)?;
        let staging = self.staging.clone();
        let codec = self.codec;
        let io_path = self.config.io_path;
        let desc = desc.clone();
        let data = sgl.gather();

        self.run(move || {
            io::run_update(container, staging, codec, io_path, addr, epoch, desc, data)
        })?
    }

    /// Read the record version visible at or before `epoch` into the
    /// caller's regions. Returns the byte count; zero means no visible
    /// version, which is a normal outcome.
    pub fn fetch(
        &self,
        ch: ContainerHandle,
        addr: ObjectAddr,
        epoch: Epoch,
        desc: &IoDescriptor,
        sgl: &mut SgListMut<'_>,
    ) -> Result<usize> {
        let need = desc.spec.transfer_len() as usize;
        if sgl.total_len() < need {
            return Err(invalid_arg(format!(
                "scatter-gather capacity {} below record length {need}",
                sgl.total_len()
            )));
        }
        if self.config.io_path == IoPath::ZeroCopy && sgl.region_count() != 1 {
            return Err(invalid_arg(
                "zero-copy path carries exactly one scatter-gather region",
            ));
        }

        let container = self.container(ch)?;
        let staging = self.staging.clone();
        let codec = self.codec;
        let io_path = self.config.io_path;
        let desc = desc.clone();

        let data = self.run(move || {
            io::run_fetch(container, staging, codec, io_path, addr, epoch, desc)
        })??;
        Ok(sgl.scatter(&data))
    }

    // ---- raw zero-copy handshake ------------------------------------

    /// Stage a zero-copy update. The returned handle must reach exactly
    /// one [`Engine::update_end`] call, whatever happens in between.
    pub fn update_begin(
        &self,
        ch: ContainerHandle,
        addr: ObjectAddr,
        epoch: Epoch,
        desc: &IoDescriptor,
    ) -> Result<IoHandle> {
        let container = self.container(ch)?;
        handle::begin(
            IoDir::Update,
            container,
            &self.staging,
            self.codec,
            addr,
            epoch,
            desc,
        )
    }

    /// Stage a zero-copy fetch; same end discipline as updates.
    pub fn fetch_begin(
        &self,
        ch: ContainerHandle,
        addr: ObjectAddr,
        epoch: Epoch,
        desc: &IoDescriptor,
    ) -> Result<IoHandle> {
        let container = self.container(ch)?;
        handle::begin(
            IoDir::Fetch,
            container,
            &self.staging,
            self.codec,
            addr,
            epoch,
            desc,
        )
    }

    /// Close an update handshake, threading the caller's accumulated
    /// status through; publishes only on `Ok`.
    pub fn update_end(&self, handle_: IoHandle, status: Result<()>) -> Result<()> {
        if handle_.dir() != IoDir::Update {
            return Err(invalid_arg("fetch handle passed to update_end"));
        }
        handle::end(handle_, status)
    }

    /// Close a fetch handshake; releases staged resources regardless of
    /// the threaded status.
    pub fn fetch_end(&self, handle_: IoHandle, status: Result<()>) -> Result<()> {
        if handle_.dir() != IoDir::Fetch {
            return Err(invalid_arg("update handle passed to fetch_end"));
        }
        handle::end(handle_, status)
    }

    // ---- hierarchy traversal ----------------------------------------

    /// Open a cursor over one hierarchy level. Pass the parent cursor to
    /// reuse its position (nested mode); both modes yield the same
    /// entries.
    pub fn iter_prepare(
        &self,
        ch: ContainerHandle,
        level: IterLevel,
        params: &IterParams,
        parent: Option<&Cursor>,
    ) -> Result<Cursor> {
        let container = self.container(ch)?;
        Cursor::prepare(container, self.codec, level, params, parent)
    }

    /// Walk one object's full hierarchy within `range`, in key order,
    /// extents before single values under each attribute.
    pub fn iterate(
        &self,
        ch: ContainerHandle,
        addr: ObjectAddr,
        range: EpochRange,
        nested: bool,
    ) -> Result<Vec<TraversalRecord>> {
        let container = self.container(ch)?;
        let codec = self.codec;
        self.run(move || iter::walk_object(container, codec, addr, range, nested))?
    }

    // ---- queries ----------------------------------------------------

    /// Highest dataset-key of `addr` visible at `epoch`, with the
    /// highest extent under it. `None` when nothing is visible.
    pub fn query_max_key(
        &self,
        ch: ContainerHandle,
        addr: ObjectAddr,
        epoch: Epoch,
    ) -> Result<Option<MaxKeyResult>> {
        let container = self.container(ch)?;
        let range = EpochRange::up_to(epoch);
        let objects = container.objects.read();
        let snap = crate::iter::snapshot::ObjectSnap::capture(&objects, addr, range);

        let Some(dkey_row) = snap.dkeys.last() else {
            return Ok(None);
        };
        Ok(Some(MaxKeyResult {
            dkey: dkey_row.key.clone(),
            epoch: dkey_row.max_epoch,
            extent: max_extent_span(dkey_row, range),
        }))
    }

    fn run<T, F>(&self, task: F) -> Result<T, EpodbError>
    where
        T: Send + 'static,
        F: FnOnce() -> T + Send + 'static,
    {
        self.executor.submit_and_join(task)
    }

    /// The mode every routed operation executes under.
    pub fn exec_mode(&self) -> ExecMode {
        self.executor.mode()
    }
}

/// Builder for [`Engine`]; all settings default per
/// [`EngineConfig::default`].
#[derive(Default)]
pub struct EngineBuilder {
    config: EngineConfig,
}

impl EngineBuilder {
    /// Directory for per-container arena files.
    pub fn data_dir(mut self, path: impl Into<PathBuf>) -> Self {
        self.config.data_dir = path.into();
        self
    }

    pub fn io_path(mut self, io_path: IoPath) -> Self {
        self.config.io_path = io_path;
        self
    }

    pub fn exec_mode(mut self, mode: ExecMode) -> Self {
        self.config.exec_mode = mode;
        self
    }

    pub fn key_kind(mut self, kind: KeyKind) -> Self {
        self.config.key_kind = kind;
        self
    }

    pub fn staging_buffers(mut self, count: usize) -> Self {
        self.config.staging_buffers = count;
        self
    }

    pub fn staging_buf_size(mut self, size: usize) -> Self {
        self.config.staging_buf_size = size;
        self
    }

    pub fn arena_initial_pages(mut self, pages: u32) -> Self {
        self.config.arena_initial_pages = pages;
        self
    }

    pub fn open(self) -> Result<Engine> {
        Engine::open(self.config)
    }
}
