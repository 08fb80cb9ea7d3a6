//! SHA-1 content hashing.

use sha1::{Digest, Sha1};
use std::fs::File;
use std::io::{self, Read};
use std::path::Path;

const CHUNK_SIZE: usize = 8192;

/// Hex SHA-1 of a local file, read in fixed-size chunks.
pub fn sha1_file(path: &Path) -> io::Result<String> {
    let mut file = File::open(path)?;
    let mut hasher = Sha1::new();
    let mut buf = [0u8; CHUNK_SIZE];
    loop {
        let n = file.read(&mut buf)?;
        if n == 0 {
            break;
        }
        hasher.update(&buf[..n]);
    }
    Ok(hex::encode(hasher.finalize()))
}

/// Digest from `sha1sum` output (`<40 hex>  <file>`), lowercased.
pub fn parse_sha1sum(output: &str) -> Option<String> {
    let digest = output.split_whitespace().next()?;
    // sha1sum prefixes a backslash when the file name needed escaping
    let digest = digest.strip_prefix('\\').unwrap_or(digest);
    if digest.len() == 40 && digest.chars().all(|c| c.is_ascii_hexdigit()) {
        Some(digest.to_ascii_lowercase())
    } else {
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    #[test]
    fn test_sha1_of_known_content() -> io::Result<()> {
        let mut file = NamedTempFile::new()?;
        file.write_all(b"abc")?;
        file.flush()?;

        assert_eq!(
            sha1_file(file.path())?,
            "a9993e364706816aba3e25717850c26c9cd0d89d"
        );
        Ok(())
    }

    #[test]
    fn test_sha1_spans_multiple_chunks() -> io::Result<()> {
        let content: Vec<u8> = (0..(CHUNK_SIZE * 3 + 17)).map(|i| (i % 251) as u8).collect();
        let mut file = NamedTempFile::new()?;
        file.write_all(&content)?;
        file.flush()?;

        assert_eq!(sha1_file(file.path())?, hex::encode(Sha1::digest(&content)));
        Ok(())
    }

    #[test]
    fn test_missing_file_is_not_found() {
        let err = sha1_file(Path::new("/nonexistent/restore/file")).unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::NotFound);
    }

    #[test]
    fn test_parse_sha1sum() {
        assert_eq!(
            parse_sha1sum("A9993E364706816ABA3E25717850C26C9CD0D89D  /tank/f\n").as_deref(),
            Some("a9993e364706816aba3e25717850c26c9cd0d89d")
        );
        assert_eq!(
            parse_sha1sum("\\a9993e364706816aba3e25717850c26c9cd0d89d  /tank/new\\nline").as_deref(),
            Some("a9993e364706816aba3e25717850c26c9cd0d89d")
        );
        assert_eq!(parse_sha1sum("sha1sum: /tank/f: No such file or directory"), None);
        assert_eq!(parse_sha1sum(""), None);
    }
}
