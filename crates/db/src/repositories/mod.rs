//! Repository layer.
//!
//! Each repository is a zero-sized struct providing async functions that
//! accept `&PgPool` as the first argument.

pub mod job_repo;
pub mod user_file_repo;

pub use job_repo::JobRepo;
pub use user_file_repo::UserFileRepo;
