//! Filename to MIME type inference.

/// Fallback for files whose extension is unknown.
pub const DEFAULT_MIME_TYPE: &str = "application/octet-stream";

/// Provider hint when present and specific, otherwise inferred from the extension.
pub fn resolve_mime_type(file_name: &str, hint: Option<&str>) -> String {
    match hint.map(str::trim) {
        Some(h) if !h.is_empty() && h != DEFAULT_MIME_TYPE => h.to_ascii_lowercase(),
        _ => mime_from_extension(file_name),
    }
}

pub fn mime_from_extension(file_name: &str) -> String {
    mime_guess::from_path(file_name)
        .first_raw()
        .unwrap_or(DEFAULT_MIME_TYPE)
        .to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_extension_inference() {
        assert_eq!(mime_from_extension("report.pdf"), "application/pdf");
        assert_eq!(mime_from_extension("NOTES.TXT"), "text/plain");
        assert_eq!(mime_from_extension("no_extension"), DEFAULT_MIME_TYPE);
    }

    #[test]
    fn test_hint_wins_unless_generic() {
        assert_eq!(resolve_mime_type("a.bin", Some("Text/Plain")), "text/plain");
        assert_eq!(
            resolve_mime_type("a.pdf", Some("application/octet-stream")),
            "application/pdf"
        );
        assert_eq!(resolve_mime_type("a.pdf", Some("")), "application/pdf");
    }
}
