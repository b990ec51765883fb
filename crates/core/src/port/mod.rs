// Port Layer - Interfaces for external dependencies

pub mod audit_log;
pub mod job_repository;
pub mod module_repository;
pub mod release_provider;
pub mod release_repository;
pub mod schedule_repository;
pub mod time_provider; // For deterministic testing

// Re-exports
pub use audit_log::AdminActionLog;
pub use job_repository::JobRepository;
pub use module_repository::ModuleSyncRepository;
pub use release_provider::{Credential, ProviderError, ReleaseProvider};
pub use release_repository::ReleaseRepository;
pub use schedule_repository::ScheduleRepository;
pub use time_provider::TimeProvider;
