//! cutout-core: The background remover's tool logic (sans-IO).
//!
//! A file enters through the [`UploadGate`], which checks size and
//! type. Accepted files are handed to a [`Workflow`], which moves
//! through `Idle → Preview → Processing → Done`, owns the preview and
//! result references, maps transformation progress to a percentage, and
//! turns failures into a retryable `Preview` state.
//!
//! This crate has **no I/O dependencies**. References are created
//! through a [`ReferenceStore`] and the removal itself is any
//! [`Transform`]; the browser implementations live in `cutout-io`.
//! [`BorderMatte`] is a self-contained transform used by the web worker
//! and the CLI.

pub mod config;
pub mod matte;
pub mod progress;
pub mod protocol;
pub mod reference;
pub mod share;
pub mod types;
pub mod upload;
pub mod workflow;

pub use config::{MatteConfig, ToolConfig};
pub use matte::{BorderMatte, remove_background};
pub use progress::ProgressTracker;
pub use protocol::WorkerEvent;
pub use reference::{MemoryReferences, Reference, ReferenceStore};
pub use types::{
    ConfigError, FileDescriptor, MatteError, SourceFile, Stage, ValidationError, format_byte_limit,
};
pub use upload::{UploadGate, describe_file, mime_type_for_name};
pub use workflow::{
    Download, OutputFormat, RunId, RunOutcome, Transform, TransformTicket, Workflow,
    WorkflowError, run_transform,
};
