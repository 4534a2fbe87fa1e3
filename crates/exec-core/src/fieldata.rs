//! Fieldata: the 6-bit legacy character code used to pack names into
//! 36-bit words (six characters per word).

/// Fieldata code table, indexed by code.
const TABLE: [char; 64] = [
    '@', '[', ']', '#', '^', ' ', 'A', 'B', //
    'C', 'D', 'E', 'F', 'G', 'H', 'I', 'J', //
    'K', 'L', 'M', 'N', 'O', 'P', 'Q', 'R', //
    'S', 'T', 'U', 'V', 'W', 'X', 'Y', 'Z', //
    ')', '-', '+', '<', '=', '>', '&', '$', //
    '*', '(', '%', ':', '?', '!', ',', '\\', //
    '0', '1', '2', '3', '4', '5', '6', '7', //
    '8', '9', '\'', ';', '/', '.', '"', '_', //
];

/// Fieldata code of the space character.
pub const SPACE: u8 = 0o05;

/// Mask for a 36-bit word.
pub const WORD_MASK: u64 = (1 << 36) - 1;

/// Encode one character. Lowercase letters fold to uppercase; characters
/// without a Fieldata equivalent encode as space.
pub fn encode_char(c: char) -> u8 {
    let c = c.to_ascii_uppercase();
    TABLE
        .iter()
        .position(|&t| t == c)
        .map(|p| p as u8)
        .unwrap_or(SPACE)
}

/// Decode one 6-bit code.
pub fn decode_char(code: u8) -> char {
    TABLE[(code & 0o77) as usize]
}

/// Pack the first six characters of `name`, left-justified and space-filled,
/// into a 36-bit word.
pub fn pack_word(name: &str) -> u64 {
    let mut chars = name.chars();
    let mut word = 0u64;
    for _ in 0..6 {
        let code = chars.next().map(encode_char).unwrap_or(SPACE);
        word = (word << 6) | u64::from(code);
    }
    word & WORD_MASK
}

/// Unpack a 36-bit word into six characters (trailing spaces kept).
pub fn unpack_word(word: u64) -> String {
    (0..6)
        .rev()
        .map(|i| decode_char(((word >> (i * 6)) & 0o77) as u8))
        .collect()
}
