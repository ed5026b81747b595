//! Path normalization (§4.4). Percent-decoding is left to the HTTP layer;
//! this only collapses separators and rejects unsafe segments.

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum NormalizeError {
    #[error("path contains a '.' or '..' segment")]
    DotSegment,
    #[error("path contains a Windows drive letter")]
    DriveLetter,
}

/// Collapses repeated `/`, strips a trailing `/` (except for the root
/// itself), and rejects `.`/`..` segments and absolute Windows-style drive
/// letters (`C:\...`).
pub fn normalize(path: &str) -> Result<String, NormalizeError> {
    if path.len() >= 2 {
        let bytes = path.as_bytes();
        if bytes[0].is_ascii_alphabetic() && bytes[1] == b':' {
            return Err(NormalizeError::DriveLetter);
        }
    }

    let mut segments = Vec::new();
    for segment in path.split('/') {
        if segment.is_empty() {
            continue;
        }
        if segment == "." || segment == ".." {
            return Err(NormalizeError::DotSegment);
        }
        segments.push(segment);
    }

    if segments.is_empty() {
        Ok("/".to_string())
    } else {
        Ok(format!("/{}", segments.join("/")))
    }
}

/// Splits a normalized path into its segments (empty for the root).
pub fn segments(normalized: &str) -> Vec<&str> {
    normalized.split('/').filter(|s| !s.is_empty()).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn collapses_repeated_slashes() {
        assert_eq!(normalize("/dav//docs///a.txt").unwrap(), "/dav/docs/a.txt");
    }

    #[test]
    fn strips_trailing_slash_except_root() {
        assert_eq!(normalize("/dav/docs/").unwrap(), "/dav/docs");
        assert_eq!(normalize("/").unwrap(), "/");
        assert_eq!(normalize("").unwrap(), "/");
    }

    #[test]
    fn rejects_dot_segments() {
        assert_eq!(normalize("/dav/../etc").unwrap_err(), NormalizeError::DotSegment);
        assert_eq!(normalize("/dav/./docs").unwrap_err(), NormalizeError::DotSegment);
    }

    #[test]
    fn rejects_windows_drive_letters() {
        assert_eq!(normalize("C:\\Windows").unwrap_err(), NormalizeError::DriveLetter);
    }

    #[test]
    fn splits_into_segments() {
        assert_eq!(segments("/dav/docs/a.txt"), vec!["dav", "docs", "a.txt"]);
        assert!(segments("/").is_empty());
    }
}
