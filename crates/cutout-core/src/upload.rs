//! Upload validation gate.
//!
//! Decides whether a dropped or picked file may enter the workflow.
//! Only the first file of a selection is considered. A rejected file
//! never reaches the [`Workflow`](crate::Workflow).

use crate::config::ToolConfig;
use crate::types::{FileDescriptor, ValidationError};

/// Extension to MIME type table for the formats the tool reads.
const EXTENSION_TYPES: &[(&str, &str)] = &[
    ("jpg", "image/jpeg"),
    ("jpeg", "image/jpeg"),
    ("png", "image/png"),
    ("webp", "image/webp"),
];

/// Infer a MIME type from a file name's extension.
///
/// Fallback for files whose `File.type` is empty. Unknown extensions
/// yield `None`.
#[must_use]
pub fn mime_type_for_name(name: &str) -> Option<&'static str> {
    let (_, ext) = name.rsplit_once('.')?;
    EXTENSION_TYPES
        .iter()
        .find(|(known, _)| known.eq_ignore_ascii_case(ext))
        .map(|&(_, mime)| mime)
}

/// Describe a candidate from the metadata the browser reports, before
/// any of its bytes are read.
///
/// A non-empty `reported_type` (`File.type`) is used as-is; otherwise
/// the type is inferred from the extension. The gate can then reject an
/// oversized file without loading it.
#[must_use]
pub fn describe_file(name: String, size: u64, reported_type: Option<&str>) -> FileDescriptor {
    let mime_type = reported_type
        .filter(|t| !t.is_empty())
        .or_else(|| mime_type_for_name(&name))
        .unwrap_or_default()
        .to_owned();
    FileDescriptor::new(name, size, mime_type)
}

/// Size and type constraints for uploads.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UploadGate {
    max_file_size: u64,
    accepted_types: Vec<String>,
}

impl UploadGate {
    /// Build a gate from the tool configuration.
    #[must_use]
    pub fn new(config: &ToolConfig) -> Self {
        Self {
            max_file_size: config.max_file_size,
            accepted_types: config.accepted_types.clone(),
        }
    }

    /// Largest accepted size in bytes.
    #[must_use]
    pub const fn max_file_size(&self) -> u64 {
        self.max_file_size
    }

    /// Accepted MIME types, in configuration order.
    #[must_use]
    pub fn accepted_types(&self) -> &[String] {
        &self.accepted_types
    }

    /// Validate a single candidate.
    ///
    /// When both the size and the type are invalid, the size error is
    /// reported.
    ///
    /// # Errors
    ///
    /// Returns [`ValidationError::TooLarge`] or
    /// [`ValidationError::UnsupportedType`].
    pub fn check(&self, file: &FileDescriptor) -> Result<(), ValidationError> {
        if file.size > self.max_file_size {
            return Err(ValidationError::TooLarge {
                size: file.size,
                max: self.max_file_size,
            });
        }
        if !self.accepted_types.iter().any(|t| *t == file.mime_type) {
            return Err(ValidationError::UnsupportedType {
                mime_type: file.mime_type.clone(),
            });
        }
        Ok(())
    }

    /// Pick the first file of a selection and validate it.
    ///
    /// Returns `Ok(None)` for an empty selection. Files after the first
    /// are ignored.
    ///
    /// # Errors
    ///
    /// Returns the first file's [`ValidationError`].
    pub fn admit<'a, T>(&self, selection: &'a [T]) -> Result<Option<&'a T>, ValidationError>
    where
        T: AsRef<FileDescriptor>,
    {
        let Some(first) = selection.first() else {
            return Ok(None);
        };
        self.check(first.as_ref())?;
        Ok(Some(first))
    }
}

impl Default for UploadGate {
    fn default() -> Self {
        Self::new(&ToolConfig::default())
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    const MIB: u64 = 1024 * 1024;

    #[test]
    fn oversized_jpeg_is_rejected_for_size() {
        let gate = UploadGate::default();
        let err = gate
            .check(&FileDescriptor::new("big.jpg", 6 * MIB, "image/jpeg"))
            .unwrap_err();
        assert!(matches!(err, ValidationError::TooLarge { .. }));
        assert!(err.to_string().contains("5 MB"));
    }

    #[test]
    fn pdf_is_rejected_for_type() {
        let gate = UploadGate::default();
        let err = gate
            .check(&FileDescriptor::new("doc.pdf", 2 * MIB, "application/pdf"))
            .unwrap_err();
        assert_eq!(
            err,
            ValidationError::UnsupportedType {
                mime_type: "application/pdf".into()
            }
        );
    }

    #[test]
    fn small_png_is_accepted() {
        let gate = UploadGate::default();
        assert!(gate.check(&FileDescriptor::new("a.png", MIB, "image/png")).is_ok());
    }

    #[test]
    fn exact_limit_is_accepted() {
        let gate = UploadGate::default();
        assert!(gate.check(&FileDescriptor::new("a.webp", 5 * MIB, "image/webp")).is_ok());
        assert!(gate.check(&FileDescriptor::new("a.webp", 5 * MIB + 1, "image/webp")).is_err());
    }

    #[test]
    fn size_error_wins_when_both_fail() {
        let gate = UploadGate::default();
        let err = gate
            .check(&FileDescriptor::new("huge.pdf", 9 * MIB, "application/pdf"))
            .unwrap_err();
        assert!(matches!(err, ValidationError::TooLarge { size, .. } if size == 9 * MIB));
    }

    #[test]
    fn empty_mime_type_is_unsupported() {
        let gate = UploadGate::default();
        let err = gate.check(&FileDescriptor::new("noext", 10, "")).unwrap_err();
        assert!(matches!(err, ValidationError::UnsupportedType { .. }));
    }

    #[test]
    fn only_first_file_of_selection_is_considered() {
        let gate = UploadGate::default();
        let selection = [
            FileDescriptor::new("first.png", MIB, "image/png"),
            FileDescriptor::new("second.pdf", 9 * MIB, "application/pdf"),
        ];
        let admitted = gate.admit(&selection).unwrap();
        assert_eq!(admitted.map(|f| f.name.as_str()), Some("first.png"));

        let reversed = [selection[1].clone(), selection[0].clone()];
        assert!(gate.admit(&reversed).is_err());
    }

    #[test]
    fn empty_selection_is_a_no_op() {
        let gate = UploadGate::default();
        let selection: [FileDescriptor; 0] = [];
        assert_eq!(gate.admit(&selection).unwrap(), None);
    }

    #[test]
    fn custom_limits_come_from_config() {
        let config = ToolConfig {
            max_file_size: 10,
            accepted_types: vec!["image/png".into()],
            ..ToolConfig::default()
        };
        let gate = UploadGate::new(&config);
        assert_eq!(gate.max_file_size(), 10);
        assert!(gate.check(&FileDescriptor::new("a.jpg", 5, "image/jpeg")).is_err());
        assert!(gate.check(&FileDescriptor::new("a.png", 11, "image/png")).is_err());
    }

    #[test]
    fn mime_type_from_extension() {
        assert_eq!(mime_type_for_name("photo.JPG"), Some("image/jpeg"));
        assert_eq!(mime_type_for_name("photo.jpeg"), Some("image/jpeg"));
        assert_eq!(mime_type_for_name("a.b.png"), Some("image/png"));
        assert_eq!(mime_type_for_name("x.webp"), Some("image/webp"));
        assert_eq!(mime_type_for_name("scan.bmp"), None);
        assert_eq!(mime_type_for_name("README"), None);
    }

    #[test]
    fn reported_type_wins_over_extension() {
        let file = describe_file("photo.png".into(), 10, Some("image/jpeg"));
        assert_eq!(file.mime_type, "image/jpeg");

        let renamed = describe_file("report.png".into(), 10, Some("application/pdf"));
        assert!(UploadGate::default().check(&renamed).is_err());
    }

    #[test]
    fn empty_reported_type_falls_back_to_extension() {
        assert_eq!(describe_file("a.webp".into(), 1, Some("")).mime_type, "image/webp");
        assert_eq!(describe_file("a.webp".into(), 1, None).mime_type, "image/webp");
        assert_eq!(describe_file("notes".into(), 1, None).mime_type, "");
    }

    #[test]
    fn oversized_metadata_is_rejected_without_bytes() {
        let huge = describe_file("huge.png".into(), 4 * 1024 * MIB, Some("image/png"));
        let err = UploadGate::default().check(&huge).unwrap_err();
        assert_eq!(err.to_string(), "File must be under 5 MB");
    }
}
