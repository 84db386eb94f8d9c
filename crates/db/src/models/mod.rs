//! Row types and their conversions to domain types.

pub mod job;
pub mod user_file;
