//! RFC 1459 case mapping.
//!
//! Network and buffer names are compared the way IRC servers compare
//! nicknames: ASCII case-insensitive, with `[]\~` folding onto `{}|^`.

#[inline]
const fn fold(c: char) -> char {
    match c {
        '[' => '{',
        ']' => '}',
        '\\' => '|',
        '~' => '^',
        'A'..='Z' => (c as u8 + 32) as char,
        _ => c,
    }
}

/// Fold a name to its RFC 1459 lowercase form, suitable as a map key.
pub fn irc_to_lower(s: &str) -> String {
    s.chars().map(fold).collect()
}

/// Compare two names ignoring RFC 1459 case.
pub fn irc_eq(a: &str, b: &str) -> bool {
    a.len() == b.len() && a.chars().zip(b.chars()).all(|(x, y)| fold(x) == fold(y))
}
