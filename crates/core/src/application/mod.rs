// Application Layer - Use Cases and Business Logic

pub mod admin;
pub mod queue;
pub mod recovery;
pub mod scheduler;
pub mod sync_service;
pub mod worker;

// Re-exports
pub use admin::{AdminService, SyncStats};
pub use queue::JobQueue;
pub use recovery::RecoveryService;
pub use scheduler::ReleaseScheduler;
pub use sync_service::{NoopObserver, SyncObserver, SyncOutcome, SyncService};
pub use worker::{shutdown_channel, ShutdownSender, ShutdownToken, Worker, WorkerConfig};
