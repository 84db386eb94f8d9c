//! External collaborators of the generation pipeline.
//!
//! - [`BlobStore`]: durable artifact storage ([`LocalBlobStore`] on disk,
//!   [`S3BlobStore`] on S3 with presigned URLs).
//! - [`ArtifactFetcher`]: downloads finished artifacts from provider URLs.
//! - [`Stitcher`]: concatenates ordered scene clips into one video.

pub mod blob;
pub mod fetch;
pub mod s3;
pub mod stitch;

pub use blob::{artifact_path, BlobStore, LocalBlobStore, StorageError};
pub use fetch::{Artifact, ArtifactFetcher, FetchError, HttpFetcher};
pub use s3::S3BlobStore;
pub use stitch::{HttpStitcher, StitchClip, StitchError, Stitcher};
