//! Copyart-Core: build selection and artifact copying
//!
//! This crate picks a build of a job with a composable [`Selector`] and
//! [`Filter`], then copies files out of it with a [`CopyOperation`],
//! recording fingerprints against the source and copier builds.
//!
//! ## Layer 1 - Selection and copy
//!
//! Hosts are reached only through the `copyart-host` traits, so everything
//! here runs against `MemoryHost` in tests and a manifest-backed host in
//! the CLI.
//!
//! ## Key Components
//!
//! - [`PickContext`]: state of one selection pass, including the last match
//! - [`CodecRegistry`]: textual form of filters and selectors
//! - [`CopyArtifactStep`]: project resolution, selection and copy in one step

pub mod cancel;
pub mod codec;
pub mod context;
pub mod env;
pub mod error;
pub mod filter;
pub mod obs;
pub mod operation;
pub mod selector;
pub mod settings;
pub mod step;
pub mod telemetry;

pub use cancel::CancelToken;
pub use codec::CodecRegistry;
pub use context::{PickContext, StepContext};
pub use env::EnvVars;
pub use error::{CopyError, Result};
pub use filter::{DownstreamFilter, Filter, ParametersFilter};
pub use operation::{
    digest_file, ContentDigest, CopiedFile, CopyContext, CopyOperation, CopyOutcome, CopyReport,
    CopySource, FileInfo, OperationContext, PatternSet,
};
pub use selector::{FallbackEntry, Permalink, Selector, TriggeringSelector};
pub use settings::{CopySettings, UpstreamStrategy};
pub use step::{CopyArtifactStep, CopyArtifactStepConfig, StepReport, RESULT_VARIABLE_PREFIX};
pub use telemetry::init_tracing;
