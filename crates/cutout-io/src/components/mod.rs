//! Dioxus UI components for cutout.
//!
//! Provides the upload zone, the staged tool panel, and the share
//! panel.

mod share_panel;
mod tool_shell;
mod upload;

pub use share_panel::SharePanel;
pub use tool_shell::ToolShell;
pub use upload::FileUpload;
