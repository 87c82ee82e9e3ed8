//! Resume capability for export runs
//!
//! The checkpoint is a single JSON document `{"last_index": n}` naming the next event
//! index to process. Writes are atomic (temp file + rename) and serialized with an
//! advisory lock; a separate run lock keeps two exports from sharing one checkpoint.

pub mod checkpoint;
pub mod lock;
pub mod state;

pub use checkpoint::Checkpoint;
pub use lock::{RunLock, RunLockGuard};
pub use state::{CheckpointStore, ResumeError, MAX_CHECKPOINT_FILE_SIZE};
