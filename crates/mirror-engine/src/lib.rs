//! Synchronization engine for content-mirror
//!
//! ```text
//! SyncRunner ──> SyncEngine ──> (ItemMapper ──> persist_change)* ──> prune ──> commit
//!     │                                                                  │
//!     └── RunLock, debounce, shutdown                        SyncStats, RunHooks
//! ```
//!
//! The runner decides when a run happens, the engine decides what changed,
//! and the mapper and persistence adapter decide how it is stored.

pub mod engine;
pub mod hooks;
pub mod lock;
pub mod mapper;
pub mod persist;
pub mod runner;
pub mod state;
pub mod stats;

pub use engine::{EngineOptions, RunKind, RunReport, SyncEngine};
pub use hooks::RunHooks;
pub use lock::{LockBackend, RunGuard, RunLock, RUN_LOCK_NAME};
pub use mapper::{ItemMapper, MapperOptions, DEFAULT_LOCALE};
pub use persist::persist_change;
pub use runner::{RunnerConfig, RunnerSummary, SyncMode, SyncRunner};
pub use state::SyncStateHandle;
pub use stats::SyncStats;
