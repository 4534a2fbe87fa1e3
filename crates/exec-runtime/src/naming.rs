//! Unique run-name generation.
//!
//! Characters cycle `A..Z` then `0..9`. A colliding name shorter than six
//! characters first gets an `A` appended; after that the rightmost character
//! is bumped. `Z` rolls to `0` in place; `9` grows a short name by one `A`,
//! or on a six-character name rolls to `A` and carries left.

use exec_core::{ExecError, Result};

/// Names shorter than this grow before they carry.
pub const GROW_LIMIT: usize = 6;

/// Next character in the name cycle, and whether it carried.
fn bump_char(c: char) -> (char, bool) {
    match c {
        'A'..='Y' | '0'..='8' => ((c as u8 + 1) as char, false),
        'Z' => ('0', false),
        _ => ('A', true),
    }
}

/// Candidate that follows `name` in the collision sequence.
pub fn next_candidate(name: &str) -> String {
    let mut chars: Vec<char> = name.chars().collect();
    let Some(&last) = chars.last() else {
        return "A".to_string();
    };
    if last == '9' && chars.len() < GROW_LIMIT {
        chars.push('A');
        return chars.into_iter().collect();
    }
    for i in (0..chars.len()).rev() {
        let (next, carry) = bump_char(chars[i]);
        chars[i] = next;
        if !carry {
            break;
        }
    }
    chars.into_iter().collect()
}

/// First candidate tried when `base` is already taken.
pub fn first_candidate(base: &str) -> String {
    if base.chars().count() < GROW_LIMIT {
        format!("{base}A")
    } else {
        next_candidate(base)
    }
}

/// Resolve `base` to a name for which `taken` is false, trying at most
/// `limit` candidates after `base`.
///
/// Every candidate in the sequence is distinct until it wraps, so a caller
/// holding `n` names can pass `n + 1`: running past that, or arriving back at
/// the first candidate, means the name space is exhausted.
pub fn unique_name(base: &str, limit: usize, taken: impl Fn(&str) -> bool) -> Result<String> {
    if !taken(base) {
        return Ok(base.to_string());
    }
    let first = first_candidate(base);
    let mut candidate = first.clone();
    let mut tried = 1usize;
    while taken(&candidate) {
        candidate = next_candidate(&candidate);
        tried += 1;
        if tried > limit || candidate == first || candidate == base {
            return Err(ExecError::NameSpaceExhausted(base.to_string()));
        }
    }
    Ok(candidate)
}
