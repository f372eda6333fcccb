//! Byte strings from the command line and from files
//!
//! Report descriptors and reports are accepted either as raw binary (e.g. a
//! copy of `/sys/.../report_descriptor`) or as hex text in the usual dump
//! formats: `05 01 09 02`, `0x05, 0x01`, `05010902`. `#` and `//` start
//! comments.

use std::path::Path;

use thiserror::Error;

#[derive(Error, Debug)]
pub enum HexError {
    #[error("invalid hex {token:?} on line {line}")]
    InvalidByte { token: String, line: usize },

    #[error("odd number of hex digits in {token:?} on line {line}")]
    OddLength { token: String, line: usize },

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Parse hex text into bytes
pub fn parse_hex(text: &str) -> Result<Vec<u8>, HexError> {
    let mut out = Vec::new();
    for (n, line) in text.lines().enumerate() {
        let line = line.split('#').next().unwrap_or_default();
        let line = line.split("//").next().unwrap_or_default();

        for token in line.split(|c: char| c.is_whitespace() || c == ',') {
            if token.is_empty() {
                continue;
            }
            let digits = token
                .strip_prefix("0x")
                .or_else(|| token.strip_prefix("0X"))
                .unwrap_or(token);
            if digits.len() % 2 != 0 {
                return Err(HexError::OddLength {
                    token: token.to_string(),
                    line: n + 1,
                });
            }
            for pair in digits.as_bytes().chunks(2) {
                let byte = std::str::from_utf8(pair)
                    .ok()
                    .and_then(|s| u8::from_str_radix(s, 16).ok())
                    .ok_or_else(|| HexError::InvalidByte {
                        token: token.to_string(),
                        line: n + 1,
                    })?;
                out.push(byte);
            }
        }
    }
    Ok(out)
}

/// Read a file as hex text if it parses as such, else as raw bytes
pub fn load_bytes<P: AsRef<Path>>(path: P) -> Result<Vec<u8>, HexError> {
    let raw = std::fs::read(path)?;
    if let Ok(text) = std::str::from_utf8(&raw) {
        if let Ok(bytes) = parse_hex(text) {
            if !bytes.is_empty() {
                return Ok(bytes);
            }
        }
    }
    Ok(raw)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_parse_formats() {
        assert_eq!(parse_hex("05 01 09 02").unwrap(), vec![0x05, 0x01, 0x09, 0x02]);
        assert_eq!(parse_hex("0x05, 0x01,\n0xA1").unwrap(), vec![0x05, 0x01, 0xA1]);
        assert_eq!(parse_hex("05010902").unwrap(), vec![0x05, 0x01, 0x09, 0x02]);
        assert_eq!(
            parse_hex("05 01 # usage page\n// nothing here\nc0").unwrap(),
            vec![0x05, 0x01, 0xC0]
        );
    }

    #[test]
    fn test_parses_debug_dumps() {
        let bytes = vec![0x00, 0x7F, 0xA1, 0xFF];
        let dump = iichid_transport::hex_dump(&bytes);
        assert_eq!(dump, "00 7f a1 ff");
        assert_eq!(parse_hex(&dump).unwrap(), bytes);
    }

    #[test]
    fn test_parse_errors() {
        assert!(matches!(
            parse_hex("05 0"),
            Err(HexError::OddLength { line: 1, .. })
        ));
        assert!(matches!(
            parse_hex("05\nzz"),
            Err(HexError::InvalidByte { line: 2, .. })
        ));
    }

    #[test]
    fn test_load_binary_and_text() {
        let mut bin = tempfile::NamedTempFile::new().unwrap();
        bin.write_all(&[0x05, 0x01, 0xFF, 0x00]).unwrap();
        assert_eq!(load_bytes(bin.path()).unwrap(), vec![0x05, 0x01, 0xFF, 0x00]);

        let mut text = tempfile::NamedTempFile::new().unwrap();
        writeln!(text, "05 01 09 02").unwrap();
        assert_eq!(load_bytes(text.path()).unwrap(), vec![0x05, 0x01, 0x09, 0x02]);
    }
}
