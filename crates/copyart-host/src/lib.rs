//! Copyart-Host: build host contracts for copyart
//!
//! This crate models the CI server a copy step runs inside: jobs, builds,
//! permissions, artifact storage and file fingerprints.
//!
//! ## Layer 0 - Host
//!
//! Focus: a narrow, synchronous interface the selection and copy logic can
//! be tested against.
//!
//! ## Key Components
//!
//! - `BuildRegistry` / `FingerprintStore`: the host services
//! - `MemoryHost` / `MemoryArchive`: in-memory implementations
//! - `load_host` / `save_state`: a host described by a JSON manifest on disk

mod error;
pub mod fakes;
pub mod host_traits;
pub mod manifest;
mod model;

pub use error::HostError;
pub use fakes::{MemoryArchive, MemoryHost};
pub use host_traits::{
    normalize_job_path, ArtifactArchive, ArtifactManager, BuildRegistry, FingerprintStore, Host,
};
pub use manifest::{load_host, save_state, HostManifest};
pub use model::{
    BuildActions, BuildOrder, BuildRecord, BuildRef, BuildResult, Cause, Composite,
    FingerprintRecord, JobKind, JobRecord, ParameterValue,
};

/// Result type for host operations
pub type Result<T> = std::result::Result<T, HostError>;
