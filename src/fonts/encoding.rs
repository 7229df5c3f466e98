//! WinAnsiEncoding (CP-1252) for simple fonts

/// Characters for codes 0x80..=0x9F; the rest of 0x20..=0xFF is Latin-1
const HIGH_CODES: [Option<char>; 32] = [
    Some('€'), None, Some('‚'), Some('ƒ'), Some('„'), Some('…'), Some('†'), Some('‡'),
    Some('ˆ'), Some('‰'), Some('Š'), Some('‹'), Some('Œ'), None, Some('Ž'), None,
    None, Some('‘'), Some('’'), Some('“'), Some('”'), Some('•'), Some('–'), Some('—'),
    Some('˜'), Some('™'), Some('š'), Some('›'), Some('œ'), None, Some('ž'), Some('Ÿ'),
];

/// Byte for `c`, if WinAnsiEncoding has one
pub fn encode_char(c: char) -> Option<u8> {
    let cp = c as u32;
    match cp {
        0x20..=0x7E | 0xA0..=0xFF => Some(cp as u8),
        _ => HIGH_CODES
            .iter()
            .position(|&m| m == Some(c))
            .map(|i| 0x80 + i as u8),
    }
}

/// Character drawn for `code`
pub fn decode_char(code: u8) -> Option<char> {
    match code {
        0x20..=0x7E | 0xA0..=0xFF => Some(code as char),
        0x80..=0x9F => HIGH_CODES[(code - 0x80) as usize],
        _ => None,
    }
}

/// Encode text for a `Tj` operand. Whitespace controls become spaces,
/// anything else without a code becomes `?`.
pub fn encode_win_ansi(text: &str) -> Vec<u8> {
    text.chars()
        .map(|c| match encode_char(c) {
            Some(code) => code,
            None if c.is_whitespace() => b' ',
            None => b'?',
        })
        .collect()
}

pub fn decode_win_ansi(bytes: &[u8]) -> String {
    bytes
        .iter()
        .map(|&b| decode_char(b).unwrap_or('\u{fffd}'))
        .collect()
}
