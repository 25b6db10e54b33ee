//! # Configuration Constants
//!
//! Crate-wide numeric limits, grouped so interdependent values stay in
//! one place.
//!
//! ```text
//! STAGING_BUF_SIZE (256 KiB)
//!       │
//!       └─> Upper bound on a single record transfer. update_begin and
//!           fetch_begin reject a record spec larger than one staging
//!           buffer, so this also caps RecordSpec::transfer_len().
//!
//! ARENA_PAGE_SIZE (64 KiB)
//!       │
//!       └─> Growth granularity of the value arena file. The arena file
//!           size is always a multiple of this.
//!
//! MAX_KEY_LEN (80 bytes)
//!       │
//!       └─> ANCHOR_KEY_MAX (equal): a resumption anchor embeds a full
//!           key inline, so the anchor layout fixes the key limit.
//! ```

/// Growth granularity of the value arena, in bytes.
pub const ARENA_PAGE_SIZE: usize = 64 * 1024;

/// Default number of arena pages allocated when a container is created.
pub const DEFAULT_ARENA_INITIAL_PAGES: u32 = 4;

/// Size of one engine staging buffer. Also the upper bound on a single
/// record transfer through either I/O path.
pub const STAGING_BUF_SIZE: usize = 256 * 1024;

/// Default number of pre-allocated staging buffers. The pool is bounded:
/// when all buffers are staged in live handles, begin fails rather than
/// allocating, which is how handle leaks surface.
pub const DEFAULT_STAGING_BUFFERS: usize = 4;

/// Maximum length of a dataset-key or attribute-key, in bytes.
pub const MAX_KEY_LEN: usize = 80;

/// Key capacity of the fixed anchor layout.
pub const ANCHOR_KEY_MAX: usize = MAX_KEY_LEN;

/// Highest representable epoch.
pub const EPOCH_MAX: u64 = u64::MAX;

const _: () = assert!(ANCHOR_KEY_MAX == MAX_KEY_LEN);
const _: () = assert!(STAGING_BUF_SIZE % ARENA_PAGE_SIZE == 0);
