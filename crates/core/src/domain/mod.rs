// Domain Layer - Pure business logic and entities

pub mod audit;
pub mod error;
pub mod job;
pub mod module_sync;
pub mod release;
pub mod schedule;

// Re-exports
pub use audit::{AdminAction, AdminActionKind, NewAdminAction, SYSTEM_ACTOR};
pub use error::DomainError;
pub use job::{
    Job, JobFilter, JobId, JobLogEntry, JobPatch, JobResults, JobStatus, JobType, LogLevel,
    NewJob, SyncBatchParams, SyncModuleParams,
};
pub use module_sync::{ModuleId, ModuleSyncConfig, SyncErrorEntry};
pub use release::{NewRelease, ProviderAsset, ProviderRelease, Release, ReleaseAsset};
pub use schedule::{ReleaseSchedule, ScheduleUpdate};
