//! Hexadecimal parsing and display

use super::CodecError;

/// Hex display format
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum HexFormat {
    /// Uppercase, space separated (e.g., "01 03 00 0A")
    #[default]
    Spaced,
    /// Uppercase, no spaces (e.g., "0103000A")
    Compact,
}

/// Format bytes as uppercase hex
pub fn format_hex(data: &[u8], format: HexFormat) -> String {
    let compact = hex::encode_upper(data);
    match format {
        HexFormat::Compact => compact,
        HexFormat::Spaced => {
            let mut output = String::with_capacity(data.len() * 3);
            for (i, pair) in compact.as_bytes().chunks(2).enumerate() {
                if i > 0 {
                    output.push(' ');
                }
                output.extend(pair.iter().map(|&c| c as char));
            }
            output
        }
    }
}

/// Parse user-entered hex into bytes
///
/// Whitespace, commas and `0x`/`0X` prefixes are ignored. Anything else that
/// is not a hex digit is rejected with its position in the original text.
pub fn parse_hex(text: &str) -> Result<Vec<u8>, CodecError> {
    let mut digits = String::with_capacity(text.len());
    let mut chars = text.char_indices().peekable();

    while let Some((pos, c)) = chars.next() {
        if c.is_whitespace() || c == ',' {
            continue;
        }
        if c == '0' && matches!(chars.peek(), Some((_, 'x' | 'X'))) {
            chars.next();
            continue;
        }
        if !c.is_ascii_hexdigit() {
            return Err(CodecError::InvalidCharacter(pos, c));
        }
        digits.push(c);
    }

    if digits.len() % 2 != 0 {
        return Err(CodecError::OddLength);
    }

    // Every character was checked above
    hex::decode(&digits).map_err(|_| CodecError::OddLength)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_format_spaced() {
        assert_eq!(format_hex(&[0x01, 0x03, 0xC5, 0xcd], HexFormat::Spaced), "01 03 C5 CD");
        assert_eq!(format_hex(&[], HexFormat::Spaced), "");
    }

    #[test]
    fn test_format_compact() {
        assert_eq!(format_hex(b"Hello", HexFormat::Compact), "48656C6C6F");
    }

    #[test]
    fn test_parse() {
        assert_eq!(parse_hex("01030000000A").unwrap(), vec![1, 3, 0, 0, 0, 0x0A]);
        assert_eq!(parse_hex("01 03 00 0a").unwrap(), vec![1, 3, 0, 0x0A]);
        assert!(parse_hex("").unwrap().is_empty());
    }

    #[test]
    fn test_parse_with_prefix() {
        assert_eq!(parse_hex("0x48, 0x45, 0x4C").unwrap(), b"HEL".to_vec());
    }

    #[test]
    fn test_parse_odd_length() {
        assert_eq!(parse_hex("010"), Err(CodecError::OddLength));
    }

    #[test]
    fn test_parse_invalid_character() {
        assert_eq!(parse_hex("01 0G"), Err(CodecError::InvalidCharacter(4, 'G')));
    }
}
