//! cutout-io: Browser I/O and Dioxus component library.
//!
//! Provides the browser side of the background remover: object URLs
//! backing the workflow's references, Blob downloads, clipboard and
//! share helpers, the web worker client, and the Dioxus components
//! that render each workflow stage.

pub mod analytics;
pub mod clipboard;
pub mod components;
pub mod download;
pub mod object_url;
pub mod page;
pub mod worker;

pub use components::{FileUpload, SharePanel, ToolShell};
pub use object_url::{BlobUrl, BlobUrls};
pub use worker::{RemovalWorker, WorkerAssets, WorkerError};
