//! Upload admission checks for the file registry.
//!
//! Two layers:
//! 1. MIME allow-list (office documents and PDF only)
//! 2. Size ceiling (`MAX_UPLOAD_SIZE_BYTES`)
//!
//! Filenames are sanitized before they become part of a storage key.

use crate::defaults::FILENAME_MAX_LEN;
use crate::error::{Error, Result};

/// MIME types accepted by the registry.
pub const ALLOWED_MIME_TYPES: &[&str] = &[
    "application/pdf",
    "application/msword",
    "application/vnd.openxmlformats-officedocument.wordprocessingml.document",
    "application/vnd.ms-excel",
    "application/vnd.openxmlformats-officedocument.spreadsheetml.sheet",
    "application/vnd.ms-powerpoint",
    "application/vnd.openxmlformats-officedocument.presentationml.presentation",
    "application/vnd.oasis.opendocument.text",
    "application/vnd.oasis.opendocument.spreadsheet",
];

/// Returns true if `mime` is on the allow-list.
///
/// Parameters such as `; charset=binary` are ignored and the comparison is
/// case-insensitive.
pub fn is_allowed_mime(mime: &str) -> bool {
    let essence = mime_essence(mime);
    ALLOWED_MIME_TYPES.iter().any(|allowed| *allowed == essence)
}

/// Strip parameters and normalize case: `Application/PDF; x=y` -> `application/pdf`.
pub fn mime_essence(mime: &str) -> String {
    mime.split(';')
        .next()
        .unwrap_or_default()
        .trim()
        .to_ascii_lowercase()
}

/// Check an upload against the allow-list and the size ceiling.
pub fn validate_upload(mime: &str, size_bytes: usize, max_size_bytes: usize) -> Result<()> {
    if !is_allowed_mime(mime) {
        return Err(Error::Validation(format!(
            "unsupported file type: {}",
            if mime.is_empty() { "<none>" } else { mime }
        )));
    }
    if size_bytes > max_size_bytes {
        return Err(Error::Validation(format!(
            "file exceeds maximum size of {} bytes",
            max_size_bytes
        )));
    }
    Ok(())
}

/// Resolve the content type of an upload.
///
/// A specific claimed type is kept as-is. When the client sends nothing
/// useful (`""` or `application/octet-stream`), magic bytes are consulted
/// through `infer`, then the file extension.
pub fn detect_content_type(filename: &str, data: &[u8], claimed: &str) -> String {
    let claimed = mime_essence(claimed);
    if !claimed.is_empty() && claimed != "application/octet-stream" {
        return claimed;
    }

    if let Some(kind) = infer::get(data) {
        let detected = kind.mime_type();
        // OOXML files are zip containers; infer may only see the zip wrapper.
        if detected != "application/zip" {
            return detected.to_string();
        }
    }

    if let Some(mime) = filename
        .rsplit_once('.')
        .and_then(|(_, ext)| mime_from_extension(ext))
    {
        return mime.to_string();
    }

    if claimed.is_empty() {
        "application/octet-stream".to_string()
    } else {
        claimed
    }
}

fn mime_from_extension(ext: &str) -> Option<&'static str> {
    match ext.to_ascii_lowercase().as_str() {
        "pdf" => Some("application/pdf"),
        "doc" => Some("application/msword"),
        "docx" => {
            Some("application/vnd.openxmlformats-officedocument.wordprocessingml.document")
        }
        "xls" => Some("application/vnd.ms-excel"),
        "xlsx" => Some("application/vnd.openxmlformats-officedocument.spreadsheetml.sheet"),
        "ppt" => Some("application/vnd.ms-powerpoint"),
        "pptx" => {
            Some("application/vnd.openxmlformats-officedocument.presentationml.presentation")
        }
        "odt" => Some("application/vnd.oasis.opendocument.text"),
        "ods" => Some("application/vnd.oasis.opendocument.spreadsheet"),
        _ => None,
    }
}

/// Sanitize filename for safe storage
pub fn sanitize_filename(filename: &str) -> String {
    sanitize_filename_to(filename, FILENAME_MAX_LEN)
}

/// Sanitize a filename and truncate it to at most `max_len` bytes, keeping a
/// short extension intact.
pub fn sanitize_filename_to(filename: &str, max_len: usize) -> String {
    // Remove path components
    let name = filename.rsplit(['/', '\\']).next().unwrap_or(filename);

    // Replace dangerous characters
    let sanitized: String = name
        .chars()
        .map(|c| match c {
            '<' | '>' | ':' | '"' | '|' | '?' | '*' | '\0' => '_',
            c if c.is_control() => '_',
            c => c,
        })
        .collect();

    let sanitized = sanitized.trim();
    if sanitized.is_empty() || sanitized == "." || sanitized == ".." {
        return "unnamed_file".to_string();
    }

    // Truncate if too long (preserve extension, respect char boundaries)
    if sanitized.len() > max_len {
        let ext = sanitized
            .rfind('.')
            .map(|pos| &sanitized[pos..])
            .filter(|ext| ext.len() < 16 && ext.len() < max_len)
            .unwrap_or("");
        let budget = max_len - ext.len();
        let mut cut = budget;
        while !sanitized.is_char_boundary(cut) {
            cut -= 1;
        }
        return format!("{}{}", &sanitized[..cut], ext);
    }

    sanitized.to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::defaults::MAX_UPLOAD_SIZE_BYTES;

    #[test]
    fn test_allows_office_and_pdf() {
        assert!(is_allowed_mime("application/pdf"));
        assert!(is_allowed_mime("application/msword"));
        assert!(is_allowed_mime(
            "application/vnd.openxmlformats-officedocument.spreadsheetml.sheet"
        ));
        assert!(is_allowed_mime("application/vnd.ms-powerpoint"));
    }

    #[test]
    fn test_allow_list_ignores_params_and_case() {
        assert!(is_allowed_mime("Application/PDF; charset=binary"));
    }

    #[test]
    fn test_rejects_other_types() {
        assert!(!is_allowed_mime("image/png"));
        assert!(!is_allowed_mime("text/plain"));
        assert!(!is_allowed_mime("application/octet-stream"));
        assert!(!is_allowed_mime(""));
    }

    #[test]
    fn test_validate_upload_rejects_mime() {
        let err = validate_upload("image/png", 10, MAX_UPLOAD_SIZE_BYTES).unwrap_err();
        assert!(matches!(err, Error::Validation(_)));
        assert!(err.to_string().contains("image/png"));
    }

    #[test]
    fn test_validate_upload_size_boundary() {
        assert!(validate_upload(
            "application/pdf",
            MAX_UPLOAD_SIZE_BYTES,
            MAX_UPLOAD_SIZE_BYTES
        )
        .is_ok());

        let err = validate_upload(
            "application/pdf",
            MAX_UPLOAD_SIZE_BYTES + 1,
            MAX_UPLOAD_SIZE_BYTES,
        )
        .unwrap_err();
        assert!(err.to_string().contains("exceeds maximum size"));
    }

    #[test]
    fn test_detect_keeps_specific_claim() {
        let result = detect_content_type("a.pdf", b"%PDF-1.4", "application/msword");
        assert_eq!(result, "application/msword");
    }

    #[test]
    fn test_detect_pdf_magic_bytes_for_octet_stream() {
        let result = detect_content_type("scan", b"%PDF-1.7 body", "application/octet-stream");
        assert_eq!(result, "application/pdf");
    }

    #[test]
    fn test_detect_falls_back_to_extension() {
        let result = detect_content_type("report.docx", b"PK\x03\x04rest", "");
        assert_eq!(
            result,
            "application/vnd.openxmlformats-officedocument.wordprocessingml.document"
        );
    }

    #[test]
    fn test_detect_unknown_stays_octet_stream() {
        let result = detect_content_type("blob.bin", b"random", "");
        assert_eq!(result, "application/octet-stream");
    }

    #[test]
    fn test_sanitize_removes_path() {
        assert_eq!(sanitize_filename("/etc/passwd"), "passwd");
        assert_eq!(sanitize_filename("C:\\Docs\\AD-2026-114.pdf"), "AD-2026-114.pdf");
    }

    #[test]
    fn test_sanitize_removes_dangerous_chars() {
        assert_eq!(sanitize_filename("file<>:test.pdf"), "file___test.pdf");
        assert_eq!(sanitize_filename("file|name?.pdf"), "file_name_.pdf");
    }

    #[test]
    fn test_sanitize_handles_empty_and_dots() {
        assert_eq!(sanitize_filename(""), "unnamed_file");
        assert_eq!(sanitize_filename("   "), "unnamed_file");
        assert_eq!(sanitize_filename("../.."), "unnamed_file");
    }

    #[test]
    fn test_sanitize_truncates_long_names() {
        let long_name = format!("{}.pdf", "a".repeat(300));
        let sanitized = sanitize_filename(&long_name);
        assert!(sanitized.len() <= FILENAME_MAX_LEN);
        assert!(sanitized.ends_with(".pdf"));
    }

    #[test]
    fn test_sanitize_to_stored_name_budget_keeps_extension() {
        use crate::defaults::STORED_NAME_MAX_LEN;

        let long_name = format!("{}.pdf", "a".repeat(FILENAME_MAX_LEN - 4));
        let sanitized = sanitize_filename_to(&long_name, STORED_NAME_MAX_LEN);
        assert_eq!(sanitized.len(), STORED_NAME_MAX_LEN);
        assert!(sanitized.ends_with(".pdf"));

        let short = sanitize_filename_to("AD-2026-114.pdf", STORED_NAME_MAX_LEN);
        assert_eq!(short, "AD-2026-114.pdf");
    }

    #[test]
    fn test_stored_name_budget_fits_temp_file_name() {
        use crate::defaults::{STORAGE_KEY_OVERHEAD_LEN, STORED_NAME_MAX_LEN};

        let id = uuid::Uuid::now_v7().as_hyphenated().to_string();
        let name = "x".repeat(STORED_NAME_MAX_LEN);
        let temp = format!(".{}_{}.tmp", id, name);
        assert_eq!(temp.len() - name.len(), STORAGE_KEY_OVERHEAD_LEN);
        assert!(temp.len() <= FILENAME_MAX_LEN);
    }

    #[test]
    fn test_sanitize_truncates_on_char_boundary() {
        let long_name = format!("{}.pdf", "é".repeat(200));
        let sanitized = sanitize_filename(&long_name);
        assert!(sanitized.len() <= FILENAME_MAX_LEN);
        assert!(sanitized.ends_with(".pdf"));
    }
}
