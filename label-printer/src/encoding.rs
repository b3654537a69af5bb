//! Codepage encoding for raw printer payloads
//!
//! Label printers rarely speak UTF-8 out of the box. ZPL printers switch to
//! UTF-8 with `^CI28`, older firmware expects Windows-1252, and Chinese
//! models expect GBK. Raw payloads are encoded here right before spooling;
//! ASCII control markup is unaffected by every supported codepage.

use std::fmt;
use std::str::FromStr;
use tracing::{instrument, warn};

/// Target codepage for raw payloads
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum Codepage {
    #[default]
    Utf8,
    Windows1252,
    Gbk,
}

impl Codepage {
    fn encoding(&self) -> &'static encoding_rs::Encoding {
        match self {
            Codepage::Utf8 => encoding_rs::UTF_8,
            Codepage::Windows1252 => encoding_rs::WINDOWS_1252,
            Codepage::Gbk => encoding_rs::GBK,
        }
    }
}

impl fmt::Display for Codepage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Codepage::Utf8 => write!(f, "utf-8"),
            Codepage::Windows1252 => write!(f, "windows-1252"),
            Codepage::Gbk => write!(f, "gbk"),
        }
    }
}

impl FromStr for Codepage {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "utf8" | "utf-8" => Ok(Codepage::Utf8),
            "cp1252" | "windows-1252" | "latin1" => Ok(Codepage::Windows1252),
            "gbk" | "cp936" => Ok(Codepage::Gbk),
            other => Err(format!("Unknown codepage: {}", other)),
        }
    }
}

/// Encode text for the given codepage
///
/// Unmappable characters are replaced by the encoder (numeric character
/// references for legacy codepages) and a warning is logged.
#[instrument(skip(text), fields(len = text.len()))]
pub fn encode_text(text: &str, codepage: Codepage) -> Vec<u8> {
    let (cow, _, had_errors) = codepage.encoding().encode(text);
    if had_errors {
        warn!(%codepage, "Payload contains characters outside the codepage");
    }
    cow.into_owned()
}

/// Printed width of a string in single-byte cells for the codepage
///
/// Double-byte GBK characters count as two cells.
pub fn text_width(text: &str, codepage: Codepage) -> usize {
    match codepage {
        Codepage::Utf8 => text.chars().count(),
        _ => encode_text(text, codepage).len(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_utf8_passthrough() {
        let data = encode_text("^XA^FDµΩ^FS^XZ", Codepage::Utf8);
        assert_eq!(data, "^XA^FDµΩ^FS^XZ".as_bytes());
    }

    #[test]
    fn test_windows1252() {
        let data = encode_text("25°C", Codepage::Windows1252);
        assert_eq!(data, vec![b'2', b'5', 0xB0, b'C']);
    }

    #[test]
    fn test_gbk_width() {
        assert_eq!(text_width("AB", Codepage::Gbk), 2);
        assert_eq!(text_width("电阻", Codepage::Gbk), 4);
        assert_eq!(text_width("电阻", Codepage::Utf8), 2);
    }

    #[test]
    fn test_parse_codepage() {
        assert_eq!("UTF-8".parse::<Codepage>().unwrap(), Codepage::Utf8);
        assert_eq!("cp1252".parse::<Codepage>().unwrap(), Codepage::Windows1252);
        assert_eq!("gbk".parse::<Codepage>().unwrap(), Codepage::Gbk);
        assert!("ebcdic".parse::<Codepage>().is_err());
    }
}
