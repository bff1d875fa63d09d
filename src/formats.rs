//! Format registry: the static catalog of accepted target formats.
//!
//! The registry is the only source of truth for which `targetFormat` values
//! the relay accepts. The orchestrator consults it before any network call so
//! an unknown format never costs a remote submission.

use crate::error::ConvertError;
use serde::Serialize;

/// One accepted target format.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SupportedFormat {
    /// Canonical value and file extension, e.g. `"png"`.
    pub value: &'static str,
    /// Human-readable label for display.
    pub label: &'static str,
    /// MIME types of this format; the first one is the canonical content type.
    pub mime_types: &'static [&'static str],
}

impl SupportedFormat {
    /// Canonical file extension (same as the value).
    pub fn extension(&self) -> &'static str {
        self.value
    }

    /// Content type used when storing an artifact of this format.
    pub fn content_type(&self) -> &'static str {
        self.mime_types
            .first()
            .copied()
            .unwrap_or("application/octet-stream")
    }
}

const FORMATS: &[SupportedFormat] = &[
    SupportedFormat {
        value: "pdf",
        label: "PDF",
        mime_types: &["application/pdf"],
    },
    SupportedFormat {
        value: "docx",
        label: "Microsoft Word",
        mime_types: &[
            "application/vnd.openxmlformats-officedocument.wordprocessingml.document",
            "application/msword",
        ],
    },
    SupportedFormat {
        value: "jpg",
        label: "JPEG Image",
        mime_types: &["image/jpeg"],
    },
    SupportedFormat {
        value: "png",
        label: "PNG Image",
        mime_types: &["image/png"],
    },
    SupportedFormat {
        value: "mp3",
        label: "Audio MP3",
        mime_types: &["audio/mpeg"],
    },
    SupportedFormat {
        value: "mp4",
        label: "Video MP4",
        mime_types: &["video/mp4"],
    },
    SupportedFormat {
        value: "txt",
        label: "Text File",
        mime_types: &["text/plain"],
    },
    SupportedFormat {
        value: "xlsx",
        label: "Excel Spreadsheet",
        mime_types: &[
            "application/vnd.openxmlformats-officedocument.spreadsheetml.sheet",
            "application/vnd.ms-excel",
        ],
    },
];

/// All accepted target formats in display order.
pub fn list_formats() -> &'static [SupportedFormat] {
    FORMATS
}

/// Look up a format by value, ignoring case and surrounding whitespace.
pub fn find_format(value: &str) -> Option<&'static SupportedFormat> {
    let value = value.trim();
    FORMATS.iter().find(|f| f.value.eq_ignore_ascii_case(value))
}

/// Comma-separated labels, used in validation messages.
pub fn supported_labels() -> String {
    FORMATS
        .iter()
        .map(|f| f.label)
        .collect::<Vec<_>>()
        .join(", ")
}

/// Resolve `value` to a registry entry or fail with a validation error.
pub fn validate_target_format(value: &str) -> Result<&'static SupportedFormat, ConvertError> {
    find_format(value).ok_or_else(|| ConvertError::UnsupportedFormat {
        format: value.to_string(),
        supported: supported_labels(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;

    #[test]
    fn order_is_insertion_order() {
        let values: Vec<_> = list_formats().iter().map(|f| f.value).collect();
        assert_eq!(
            values,
            vec!["pdf", "docx", "jpg", "png", "mp3", "mp4", "txt", "xlsx"]
        );
    }

    #[test]
    fn every_listed_format_validates() {
        for f in list_formats() {
            let found = validate_target_format(f.value).expect("listed format must validate");
            assert_eq!(found, f);
        }
    }

    #[test]
    fn lookup_ignores_case() {
        assert_eq!(find_format("PNG").map(|f| f.value), Some("png"));
        assert_eq!(find_format(" Docx ").map(|f| f.value), Some("docx"));
    }

    #[test]
    fn unknown_formats_are_rejected() {
        for bogus in ["", "bmp", "png ; rm -rf", "jpeg", "pdfx"] {
            let err = validate_target_format(bogus).unwrap_err();
            assert_eq!(err.kind(), ErrorKind::Validation, "{bogus:?}");
        }
    }

    #[test]
    fn content_type_is_first_mime() {
        let docx = find_format("docx").unwrap();
        assert_eq!(
            docx.content_type(),
            "application/vnd.openxmlformats-officedocument.wordprocessingml.document"
        );
        assert_eq!(find_format("png").unwrap().content_type(), "image/png");
        assert_eq!(find_format("png").unwrap().extension(), "png");
    }

    #[test]
    fn labels_hint() {
        let labels = supported_labels();
        assert!(labels.starts_with("PDF, Microsoft Word"));
        assert!(labels.ends_with("Excel Spreadsheet"));
    }
}
