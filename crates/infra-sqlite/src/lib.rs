// Relsync Infrastructure - SQLite Adapter
// Implements: JobRepository, ScheduleRepository, ModuleSyncRepository,
// ReleaseRepository, AdminActionLog

mod audit_log;
mod connection;
mod error;
mod job_repository;
mod migration;
mod module_repository;
mod release_repository;
mod schedule_repository;

pub use audit_log::SqliteAdminActionLog;
pub use connection::create_pool;
pub use job_repository::SqliteJobRepository;
pub use migration::run_migrations;
pub use module_repository::SqliteModuleSyncRepository;
pub use release_repository::SqliteReleaseRepository;
pub use schedule_repository::SqliteScheduleRepository;

// Note: sqlx::Error conversion is handled by `error::map_sqlx_error`
// due to Rust's orphan rules (cannot implement From<sqlx::Error> for AppError here)
