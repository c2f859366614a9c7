//! Platform keys and contexts for class-file entries.
//!
//! A key is `<jar>:<class>#"<original>"`. Keys longer than the platform
//! limit are shortened to `<jar>:<class~>#"<text~>"@<hash>`, and the full
//! key is recovered from the context written next to it.

use once_cell::sync::Lazy;
use regex::Regex;

use crate::text::{short_hash, truncate_marked};

static SHORTENED_KEY_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r#""@([0-9a-f]{8})$"#).expect("valid shortened key regex"));

static CONTEXT_SOURCE_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?m)^Extracted from (.+):(.+?) constant #\d+$").expect("valid context regex")
});

const ORIGINAL_LINE: &str = "\nOriginal: \"";
const TRANSLATION_LINE: &str = "\"\nTranslation: \"";

/// Build the platform key for one class literal.
pub fn class_string_key(jar: &str, class_path: &str, original: &str, max_len: usize) -> String {
    let full_key = format!("{jar}:{class_path}#\"{original}\"");
    if full_key.chars().count() <= max_len {
        return full_key;
    }

    let new_len = max_len * 4 / 5;
    let path_len = new_len * 2 / 5;
    let text_len = new_len - path_len;

    format!(
        "{jar}:{}#\"{}\"@{}",
        truncate_marked(class_path, path_len),
        truncate_marked(original, text_len),
        short_hash(&full_key)
    )
}

/// One provenance block of a class entry context, without the header line.
pub fn context_block(
    jar: &str,
    class_path: &str,
    constant_index: u16,
    original: &str,
    translation: &str,
) -> String {
    format!(
        "Extracted from {jar}:{class_path} constant #{constant_index:04}\n\
         Original: \"{original}\"\n\
         Translation: \"{translation}\""
    )
}

pub fn is_shortened(key: &str) -> bool {
    SHORTENED_KEY_RE.is_match(key)
}

/// Class path as spelled in the key (possibly truncated).
pub fn class_path_in_key(key: &str) -> Option<&str> {
    let (_, rest) = key.split_once(':')?;
    let (class_path, _) = rest.split_once('#')?;
    Some(class_path)
}

/// Jar and class path named by the first provenance block of a context.
pub fn source_in_context(context: &str) -> Option<(&str, &str)> {
    let captures = CONTEXT_SOURCE_RE.captures(context)?;
    Some((captures.get(1)?.as_str(), captures.get(2)?.as_str()))
}

fn original_in_context(context: &str) -> Option<&str> {
    let start = context.find(ORIGINAL_LINE)? + ORIGINAL_LINE.len();
    let len = context[start..].find(TRANSLATION_LINE)?;
    Some(&context[start..start + len])
}

/// Recover the unshortened key from a shortened key and its context.
///
/// The rebuilt key must hash to the digest carried by the shortened key.
pub fn reconstruct_full_key(key: &str, context: &str) -> Option<String> {
    let digest = SHORTENED_KEY_RE.captures(key)?.get(1)?.as_str();
    let (jar, class_path) = source_in_context(context)?;
    let original = original_in_context(context)?;

    let full_key = format!("{jar}:{class_path}#\"{original}\"");
    if short_hash(&full_key) == digest {
        Some(full_key)
    } else {
        log::warn!("Context of {key} does not hash to its key, cannot recover full key");
        None
    }
}

/// Class path an entry belongs to, looking through shortened keys.
pub fn entry_class_path(key: &str, context: &str) -> Option<String> {
    if is_shortened(key) {
        let full_key = reconstruct_full_key(key, context)?;
        return class_path_in_key(&full_key).map(str::to_string);
    }
    class_path_in_key(key).map(str::to_string)
}
