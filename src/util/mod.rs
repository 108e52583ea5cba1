//! Shared ambient concerns with no single owning module: a scoped exclusive
//! file lock, a bounded-retry-with-backoff helper, and timed subprocess
//! invocation with stderr-pattern rate-limit classification.

pub mod lock;
pub mod retry;
pub mod subprocess;

pub use lock::ScanLock;
pub use retry::retry_with_backoff;
pub use subprocess::{run_with_timeout, CommandOutput};
