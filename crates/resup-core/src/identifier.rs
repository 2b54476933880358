//! File identifier derivation.
//!
//! The identifier correlates chunks server-side and detects duplicate
//! registrations, so it must be stable for the same path and size.

use std::path::Path;

/// Keeps only `[0-9A-Za-z_-]` from a path's textual form.
pub fn sanitize_path(path: &Path) -> String {
    path.to_string_lossy()
        .chars()
        .filter(|c| c.is_ascii_alphanumeric() || *c == '_' || *c == '-')
        .collect()
}

/// Default identifier: `"{size}-{sanitized path}"`.
pub fn derive_identifier(path: &Path, size: u64) -> String {
    format!("{}-{}", size, sanitize_path(path))
}

/// File name component sent as the file-name parameter; falls back to the
/// whole path when there is no final component.
pub fn display_file_name(path: &Path) -> String {
    path.file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| path.to_string_lossy().into_owned())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn strips_separators_and_dots() {
        assert_eq!(sanitize_path(Path::new("/tmp/a b/c.txt")), "tmpabctxt");
    }

    #[test]
    fn keeps_dash_and_underscore() {
        assert_eq!(sanitize_path(Path::new("my-file_v2.bin")), "my-file_v2bin");
    }

    #[test]
    fn identifier_prefixes_size() {
        assert_eq!(
            derive_identifier(Path::new("/data/testFile.txt"), 1047),
            "1047-datatestFiletxt"
        );
    }

    #[test]
    fn same_path_different_size_differs() {
        let p = Path::new("a.bin");
        assert_ne!(derive_identifier(p, 1), derive_identifier(p, 2));
    }

    #[test]
    fn file_name_is_last_component() {
        assert_eq!(display_file_name(Path::new("/x/y/report.pdf")), "report.pdf");
        assert_eq!(display_file_name(Path::new("/")), "/");
    }
}
