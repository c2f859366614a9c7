/// Character-class and key helpers shared by the class and table loaders
use sha2::{Digest, Sha256};

/// Marker appended to a key component that was cut short.
pub const TRUNCATION_MARK: char = '~';

/// Number of hex digits kept from the key digest.
const KEY_HASH_LEN: usize = 8;

/// Whether the text contains a source-language (ASCII Latin) letter.
pub fn contains_latin_letters(text: &str) -> bool {
    text.chars().any(|c| c.is_ascii_alphabetic())
}

/// Whether the text contains a target-language (CJK unified ideograph) character.
pub fn contains_cjk(text: &str) -> bool {
    text.chars().any(|c| ('\u{4e00}'..='\u{9fa5}').contains(&c))
}

/// Deterministic short digest used to disambiguate shortened keys.
pub fn short_hash(text: &str) -> String {
    let digest = Sha256::digest(text.as_bytes());
    let mut encoded = hex::encode(digest);
    encoded.truncate(KEY_HASH_LEN);
    encoded
}

/// Cut `text` to at most `max_chars` characters, marking the cut with `~`.
///
/// Text that already fits is returned unchanged and unmarked.
pub fn truncate_marked(text: &str, max_chars: usize) -> String {
    if text.chars().count() <= max_chars {
        return text.to_string();
    }
    let mut cut: String = text.chars().take(max_chars.saturating_sub(1)).collect();
    cut.push(TRUNCATION_MARK);
    cut
}

/// Render a composite row identifier the way the platform keys have always
/// spelled it: `('a', 'b')`, with the one-element form `('a',)`.
pub fn tuple_repr(parts: &[&str]) -> String {
    let rendered: Vec<String> = parts.iter().map(|p| quoted_repr(p)).collect();
    if rendered.len() == 1 {
        format!("({},)", rendered[0])
    } else {
        format!("({})", rendered.join(", "))
    }
}

fn quoted_repr(text: &str) -> String {
    let quote = if text.contains('\'') && !text.contains('"') {
        '"'
    } else {
        '\''
    };

    let mut out = String::with_capacity(text.len() + 2);
    out.push(quote);
    for c in text.chars() {
        match c {
            '\\' => out.push_str("\\\\"),
            '\n' => out.push_str("\\n"),
            '\r' => out.push_str("\\r"),
            '\t' => out.push_str("\\t"),
            c if c == quote => {
                out.push('\\');
                out.push(c);
            }
            c => out.push(c),
        }
    }
    out.push(quote);
    out
}
