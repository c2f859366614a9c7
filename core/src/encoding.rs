/// Encoding and newline preservation for game data tables
use std::path::Path;

const UTF8_BOM: [u8; 3] = [0xEF, 0xBB, 0xBF];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Newline {
    Lf,
    Crlf,
}

impl Newline {
    pub fn as_str(self) -> &'static str {
        match self {
            Newline::Lf => "\n",
            Newline::Crlf => "\r\n",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileMetadata {
    pub newline: Newline,
    pub has_bom: bool,
    /// Bytes that were not valid UTF-8 and had to be substituted.
    pub substituted_bytes: usize,
}

impl FileMetadata {
    /// Detect BOM and newline style from file content
    pub fn detect(content: &[u8]) -> Self {
        Self {
            newline: Self::detect_newline(content),
            has_bom: content.starts_with(&UTF8_BOM),
            substituted_bytes: 0,
        }
    }

    fn detect_newline(content: &[u8]) -> Newline {
        // First line terminator decides
        match content.iter().position(|&b| b == b'\n') {
            Some(pos) if pos > 0 && content[pos - 1] == b'\r' => Newline::Crlf,
            _ => Newline::Lf,
        }
    }

    /// Read file permissively: never fails on bad bytes
    pub fn read_file(path: &Path) -> Result<(String, FileMetadata), std::io::Error> {
        let bytes = std::fs::read(path)?;
        let mut metadata = Self::detect(&bytes);
        let body = if metadata.has_bom { &bytes[UTF8_BOM.len()..] } else { &bytes[..] };
        let (text, substituted) = decode_legacy(body);
        metadata.substituted_bytes = substituted;
        Ok((text, metadata))
    }

    /// Encode text back to bytes, restoring the BOM if the file had one
    pub fn encode(&self, content: &str) -> Vec<u8> {
        let mut bytes = Vec::with_capacity(content.len() + UTF8_BOM.len());
        if self.has_bom {
            bytes.extend_from_slice(&UTF8_BOM);
        }
        bytes.extend_from_slice(content.as_bytes());
        bytes
    }
}

/// Replacement for a stray Windows-1252 byte found inside UTF-8 text.
fn legacy_replacement(byte: u8) -> &'static str {
    match byte {
        0x93 | 0x94 => "\"\"",
        0x91 | 0x92 => "'",
        0x96 => "-",
        0x85 => "...",
        _ => "\u{FFFD}",
    }
}

/// Decode UTF-8, substituting the typographic bytes legacy tools leave behind.
///
/// Returns the text and the number of invalid bytes that were replaced.
pub fn decode_legacy(bytes: &[u8]) -> (String, usize) {
    let mut out = String::with_capacity(bytes.len());
    let mut substituted = 0;
    let mut rest = bytes;

    loop {
        match std::str::from_utf8(rest) {
            Ok(valid) => {
                out.push_str(valid);
                break;
            }
            Err(err) => {
                let (valid, after) = rest.split_at(err.valid_up_to());
                // valid_up_to guarantees this prefix is well-formed
                out.push_str(&String::from_utf8_lossy(valid));
                let bad_len = err.error_len().unwrap_or(after.len());
                for &byte in &after[..bad_len] {
                    out.push_str(legacy_replacement(byte));
                    substituted += 1;
                }
                rest = &after[bad_len..];
            }
        }
    }

    (out, substituted)
}

/// Normalize newlines in text
pub fn normalize_newlines(text: &str, style: Newline) -> String {
    let normalized = text.replace("\r\n", "\n");
    match style {
        Newline::Lf => normalized,
        Newline::Crlf => normalized.replace('\n', "\r\n"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::NamedTempFile;

    #[test]
    fn detects_crlf() {
        let metadata = FileMetadata::detect(b"Line1\r\nLine2\r\n");
        assert_eq!(metadata.newline, Newline::Crlf);
    }

    #[test]
    fn detects_lf() {
        let metadata = FileMetadata::detect(b"Line1\nLine2\r\n");
        assert_eq!(metadata.newline, Newline::Lf);
    }

    #[test]
    fn substitutes_windows_1252_artifacts() {
        let bytes = b"\x93Hi\x94 it\x92s \x96 done\x85 \xff";
        let (text, count) = decode_legacy(bytes);
        assert_eq!(text, "\"\"Hi\"\" it's - done... \u{FFFD}");
        assert_eq!(count, 6);
    }

    #[test]
    fn valid_utf8_is_untouched() {
        let (text, count) = decode_legacy("开火 “quoted”".as_bytes());
        assert_eq!(text, "开火 “quoted”");
        assert_eq!(count, 0);
    }

    #[test]
    fn roundtrip_with_bom() {
        let temp = NamedTempFile::new().unwrap();
        let mut content = UTF8_BOM.to_vec();
        content.extend_from_slice(b"id,name\r\n");
        std::fs::write(temp.path(), &content).unwrap();

        let (text, metadata) = FileMetadata::read_file(temp.path()).unwrap();
        assert_eq!(text, "id,name\r\n");
        assert!(metadata.has_bom);
        assert_eq!(metadata.newline, Newline::Crlf);
        assert_eq!(metadata.encode(&text), content);
    }

    #[test]
    fn normalizes_to_requested_style() {
        assert_eq!(normalize_newlines("a\r\nb\nc", Newline::Lf), "a\nb\nc");
        assert_eq!(normalize_newlines("a\r\nb\nc", Newline::Crlf), "a\r\nb\r\nc");
    }
}
