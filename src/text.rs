use log::trace;

/// Longest string read when no explicit limit is given
pub const MAX_STRING_LEN: usize = 1000;

/// End-of-string marker
pub const TERMINATOR: u8 = 0xFF;

/// Line break marker
pub const NEWLINE: u8 = 0xFE;

lazy_static! {
    /// The game's 256-entry character set. Unmapped glyphs decode as '?'.
    pub static ref CHARSET: [char; 256] = {
        let mut table = ['?'; 256];
        table[0x00] = ' ';
        for (i, c) in "AAACEEEEI?IIOOOOUUUN".chars().enumerate() {
            table[0x01 + i] = c;
        }
        for (i, c) in "aa?ceeeei?iioooouuun".chars().enumerate() {
            table[0x16 + i] = c;
        }
        for (i, c) in " &+".chars().enumerate() {
            table[0x2C + i] = c;
        }
        table[0x35] = '=';
        for (i, c) in "I%()".chars().enumerate() {
            table[0x5A + i] = c;
        }
        for (i, c) in "^v<>".chars().enumerate() {
            table[0x79 + i] = c;
        }
        for (i, c) in ('0'..='9').enumerate() {
            table[0xA1 + i] = c;
        }
        for (i, c) in "!?.-*.\"\"''MF ,x/".chars().enumerate() {
            table[0xAB + i] = c;
        }
        for (i, c) in ('A'..='Z').enumerate() {
            table[0xBB + i] = c;
        }
        for (i, c) in ('a'..='z').enumerate() {
            table[0xD5 + i] = c;
        }
        for (i, c) in ">:AOUaou^v<".chars().enumerate() {
            table[0xEF + i] = c;
        }
        table[NEWLINE as usize] = '\n';
        table[TERMINATOR as usize] = '\0';
        table
    };
}

/// Decode raw game text, stopping at the first terminator
pub fn decode(raw: &[u8]) -> String {
    let end = raw
        .iter()
        .position(|&b| b == TERMINATOR)
        .unwrap_or(raw.len());
    let out: String = raw[..end].iter().map(|&b| CHARSET[b as usize]).collect();
    trace!("decoded {} bytes of text: {:?}", end, out);
    out
}

/// Decode text with line breaks flattened, for single-line listings
pub fn decode_flat(raw: &[u8]) -> String {
    decode(raw).replace('\n', " ")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_decode_letters_digits_and_terminator() {
        // "Hi 42!" then terminator then garbage
        let raw = [0xC2, 0xDD, 0x00, 0xA5, 0xA3, 0xAB, 0xFF, 0xBB];
        assert_eq!(decode(&raw), "Hi 42!");
    }

    #[test]
    fn test_decode_flat_replaces_newlines() {
        let raw = [0xBB, NEWLINE, 0xBC];
        assert_eq!(decode(&raw), "A\nB");
        assert_eq!(decode_flat(&raw), "A B");
    }

    #[test]
    fn test_unknown_glyph() {
        assert_eq!(decode(&[0x50]), "?");
    }
}
