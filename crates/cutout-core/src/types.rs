//! Shared types for the cutout tool workflow.

use std::fmt;
use std::rc::Rc;

use serde::{Deserialize, Serialize};

/// The discrete phase of the tool workflow.
///
/// Exactly one stage is active per workflow. Transitions only move
/// forward (`Idle → Preview → Processing → Done`) except for the
/// failure edge `Processing → Preview` and the reset edge back to
/// `Idle` from anywhere.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Stage {
    /// Nothing loaded; the upload zone is shown.
    #[default]
    Idle,
    /// A file is loaded and previewed, ready to process.
    Preview,
    /// The transformation is running.
    Processing,
    /// The transformation finished; original and result are both held.
    Done,
}

impl Stage {
    /// All stages in workflow order.
    pub const ALL: [Self; 4] = [Self::Idle, Self::Preview, Self::Processing, Self::Done];

    /// Lowercase label, matching the serialized form.
    #[must_use]
    pub const fn label(self) -> &'static str {
        match self {
            Self::Idle => "idle",
            Self::Preview => "preview",
            Self::Processing => "processing",
            Self::Done => "done",
        }
    }

    /// Whether a preview reference must be held in this stage.
    #[must_use]
    pub const fn holds_preview(self) -> bool {
        matches!(self, Self::Preview | Self::Processing | Self::Done)
    }

    /// Whether a result reference must be held in this stage.
    #[must_use]
    pub const fn holds_result(self) -> bool {
        matches!(self, Self::Done)
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// Metadata of a candidate upload, as reported by the upload surface.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileDescriptor {
    /// File name including extension.
    pub name: String,
    /// Size in bytes.
    pub size: u64,
    /// MIME type (e.g. `image/png`).
    pub mime_type: String,
}

impl FileDescriptor {
    /// Create a new descriptor.
    #[must_use]
    pub fn new(name: impl Into<String>, size: u64, mime_type: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            size,
            mime_type: mime_type.into(),
        }
    }

    /// The file name without its last extension.
    ///
    /// Returns the whole name when there is no extension, and `"image"`
    /// when the name is empty.
    #[must_use]
    pub fn base_name(&self) -> &str {
        let base = match self.name.rsplit_once('.') {
            Some((base, ext)) if !base.is_empty() && !ext.is_empty() => base,
            _ => self.name.as_str(),
        };
        if base.is_empty() { "image" } else { base }
    }
}

impl AsRef<Self> for FileDescriptor {
    fn as_ref(&self) -> &Self {
        self
    }
}

/// A file that passed the upload gate, with its bytes.
///
/// The bytes are reference counted so a running transformation can
/// hold them while the workflow keeps its own copy of the handle.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceFile {
    descriptor: FileDescriptor,
    bytes: Rc<[u8]>,
}

impl SourceFile {
    /// Pair a descriptor with the bytes it describes.
    #[must_use]
    pub fn new(descriptor: FileDescriptor, bytes: impl Into<Rc<[u8]>>) -> Self {
        Self {
            descriptor,
            bytes: bytes.into(),
        }
    }

    /// The descriptor the gate validated.
    #[must_use]
    pub const fn descriptor(&self) -> &FileDescriptor {
        &self.descriptor
    }

    /// The raw file bytes.
    #[must_use]
    pub fn bytes(&self) -> &[u8] {
        &self.bytes
    }

    /// A shared handle to the raw file bytes.
    #[must_use]
    pub fn shared_bytes(&self) -> Rc<[u8]> {
        Rc::clone(&self.bytes)
    }
}

impl AsRef<FileDescriptor> for SourceFile {
    fn as_ref(&self) -> &FileDescriptor {
        &self.descriptor
    }
}

/// Render a byte count the way the upload limits are shown to users:
/// `5 MB`, `5.5 MB`, `512 KB`, rounded to one decimal and without a
/// trailing `.0`.
#[must_use]
pub fn format_byte_limit(bytes: u64) -> String {
    const KIB: u64 = 1024;
    const MIB: u64 = 1024 * KIB;

    let (scale, unit) = match bytes {
        MIB.. => (MIB, "MB"),
        KIB.. => (KIB, "KB"),
        _ => return format!("{bytes} bytes"),
    };
    let tenths = (u128::from(bytes) * 10 + u128::from(scale / 2)) / u128::from(scale);
    match tenths % 10 {
        0 => format!("{} {unit}", tenths / 10),
        frac => format!("{}.{frac} {unit}", tenths / 10),
    }
}

#[allow(clippy::trivially_copy_pass_by_ref)] // thiserror passes fields by reference
fn size_limit(max: &u64) -> String {
    format_byte_limit(*max)
}

/// Reasons the upload gate rejects a file.
///
/// The display strings are shown to the user as-is.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ValidationError {
    /// The file exceeds the configured size limit.
    #[error("File must be under {}", size_limit(.max))]
    TooLarge {
        /// Size of the rejected file in bytes.
        size: u64,
        /// Configured maximum in bytes.
        max: u64,
    },

    /// The MIME type is not in the accepted list.
    #[error("Only JPG, PNG, and WEBP files are accepted")]
    UnsupportedType {
        /// The rejected MIME type (may be empty).
        mime_type: String,
    },
}

/// Invalid [`ToolConfig`](crate::ToolConfig) values.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ConfigError {
    /// The maximum upload size must be positive.
    #[error("max_file_size must be greater than zero")]
    ZeroMaxFileSize,

    /// At least one MIME type must be accepted.
    #[error("accepted_types must not be empty")]
    NoAcceptedTypes,

    /// The matte tolerance is outside `0.0..=441.7`.
    #[error("matte tolerance {0} is out of range")]
    ToleranceOutOfRange(f32),

    /// The configuration could not be parsed.
    #[error("failed to parse config: {0}")]
    Parse(String),
}

/// Errors from the reference matte transformation.
#[derive(Debug, thiserror::Error)]
pub enum MatteError {
    /// No bytes were provided.
    #[error("input image data is empty")]
    EmptyInput,

    /// The bytes are not a decodable image.
    #[error("failed to decode image: {0}")]
    Decode(#[source] image::ImageError),

    /// The output PNG could not be encoded.
    #[error("failed to encode PNG: {0}")]
    Encode(#[source] image::ImageError),

    /// The matte configuration is invalid.
    #[error(transparent)]
    InvalidConfig(#[from] ConfigError),
}
