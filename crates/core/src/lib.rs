//! Domain model for the mediaflow generation pipeline.
//!
//! Everything in this crate is pure: job records and their merge
//! semantics, generation options and validation, the scene splitter, and
//! poll backoff maths. Persistence seams ([`store::JobStore`],
//! [`store::FileRecorder`]) are declared here; the database crate and the
//! pipeline both depend on them and not on each other.

pub mod backoff;
pub mod error;
pub mod job;
pub mod job_events;
pub mod manifest;
pub mod options;
pub mod patch;
pub mod scene_split;
pub mod store;
pub mod types;
