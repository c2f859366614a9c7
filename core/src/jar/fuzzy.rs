//! Class-path normalization for matching classes across obfuscated builds.

use once_cell::sync::Lazy;
use regex::Regex;

static O_RUN_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"^[Oo0]+$").expect("valid O-run regex"));

static SINGLE_CHAR_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[a-zA-Z0-9]$").expect("valid single char regex"));

static CAMEL_CASE_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^(?:[A-Z][a-z0-9]*)+$").expect("valid camel case regex"));

fn normalize_segment(segment: &str) -> String {
    if O_RUN_RE.is_match(segment) {
        "O".to_string()
    } else if SINGLE_CHAR_RE.is_match(segment) {
        "X".to_string()
    } else if CAMEL_CASE_RE.is_match(segment) {
        segment
            .chars()
            .filter(|c| c.is_ascii_uppercase() || c.is_ascii_digit())
            .collect::<String>()
            .to_lowercase()
    } else {
        segment.to_string()
    }
}

/// Collapse identifiers an obfuscator is likely to rename between builds.
///
/// Package segments and every `$`-separated part of the class name are
/// normalized; the `.class` suffix is preserved.
pub fn normalize_class_path(class_path: &str) -> String {
    let (packages, file_name) = match class_path.rsplit_once('/') {
        Some((packages, file_name)) => (Some(packages), file_name),
        None => (None, class_path),
    };
    let class_name = file_name.strip_suffix(".class").unwrap_or(file_name);

    let normalized_name = class_name
        .split('$')
        .map(normalize_segment)
        .collect::<Vec<_>>()
        .join("$");

    let mut segments: Vec<String> = packages
        .map(|p| p.split('/').map(normalize_segment).collect())
        .unwrap_or_default();
    segments.push(format!("{normalized_name}.class"));
    segments.join("/")
}

/// Fraction of `wanted` originals found in `available`.
pub fn overlap_ratio<'a>(
    wanted: &[&str],
    available: impl IntoIterator<Item = &'a str>,
) -> f64 {
    if wanted.is_empty() {
        return 0.0;
    }
    let available: std::collections::HashSet<&str> = available.into_iter().collect();
    let hits = wanted.iter().filter(|w| available.contains(**w)).count();
    hits as f64 / wanted.len() as f64
}
