//! Translation entries and the JSON snapshot files exchanged with the
//! translation platform.
//!
//! An entry is the unit of translatable content shared by the class and
//! table loaders: a stable key, the original text, the current translation,
//! a workflow stage and a free-text context for translators.

use std::collections::HashMap;
use std::fs;
use std::io;
use std::path::Path;

use serde::{Deserialize, Serialize};

/// Workflow status of an entry on the translation platform.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "i32", into = "i32")]
pub enum Stage {
    Hidden,
    Untranslated,
    Translated,
    Questioned,
    Proofread,
    Reviewed,
    Locked,
}

impl Stage {
    pub fn code(self) -> i32 {
        match self {
            Self::Hidden => -1,
            Self::Untranslated => 0,
            Self::Translated => 1,
            Self::Questioned => 2,
            Self::Proofread => 3,
            Self::Reviewed => 5,
            Self::Locked => 9,
        }
    }

    /// Stages that count as "has a translation" for write-back.
    pub fn is_translated(self) -> bool {
        self.code() > 0
    }

    /// Stages a previous snapshot may carry over onto a fresh extraction.
    pub fn is_carried_over(self) -> bool {
        !matches!(self, Self::Untranslated)
    }
}

impl Default for Stage {
    fn default() -> Self {
        Self::Untranslated
    }
}

impl TryFrom<i32> for Stage {
    type Error = String;

    fn try_from(code: i32) -> Result<Self, Self::Error> {
        match code {
            -1 => Ok(Self::Hidden),
            0 => Ok(Self::Untranslated),
            1 => Ok(Self::Translated),
            2 => Ok(Self::Questioned),
            3 => Ok(Self::Proofread),
            5 => Ok(Self::Reviewed),
            9 => Ok(Self::Locked),
            other => Err(format!("unknown entry stage {other}")),
        }
    }
}

impl From<Stage> for i32 {
    fn from(stage: Stage) -> Self {
        stage.code()
    }
}

/// One translatable string.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "RawTranslationEntry")]
pub struct TranslationEntry {
    pub key: String,
    pub original: String,
    pub translation: String,
    pub stage: Stage,
    pub context: String,
}

impl TranslationEntry {
    pub fn new(
        key: impl Into<String>,
        original: impl Into<String>,
        translation: impl Into<String>,
        stage: Stage,
        context: impl Into<String>,
    ) -> Self {
        Self {
            key: key.into(),
            original: original.into(),
            translation: translation.into(),
            stage,
            context: context.into(),
        }
    }
}

/// Wire shape of an entry. The platform escapes newlines as a literal `\n`,
/// which is turned back into a real newline on the way in.
#[derive(Deserialize)]
struct RawTranslationEntry {
    key: String,
    original: String,
    #[serde(default)]
    translation: String,
    #[serde(default)]
    stage: Stage,
    #[serde(default)]
    context: String,
}

impl From<RawTranslationEntry> for TranslationEntry {
    fn from(raw: RawTranslationEntry) -> Self {
        Self {
            key: raw.key,
            original: raw.original.replace("\\n", "\n"),
            translation: raw.translation.replace("\\n", "\n"),
            stage: raw.stage,
            context: raw.context,
        }
    }
}

/// Counters reported by every write-back step.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct UpdateSummary {
    /// Slots or cells that received new text.
    pub updated: usize,
    /// Entries deliberately left alone (locked slot, stale context, policy).
    pub skipped: usize,
    /// Entries with no matching source location.
    pub unmatched: usize,
}

impl UpdateSummary {
    pub fn absorb(&mut self, other: &UpdateSummary) {
        self.updated += other.updated;
        self.skipped += other.skipped;
        self.unmatched += other.unmatched;
    }
}

#[derive(Debug, thiserror::Error)]
pub enum EntryFileError {
    #[error("IO error on {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: io::Error,
    },

    #[error("Invalid entry file {path}: {source}")]
    Json {
        path: String,
        #[source]
        source: serde_json::Error,
    },
}

/// Read a snapshot file (JSON array of entries).
pub fn read_entries(path: &Path) -> Result<Vec<TranslationEntry>, EntryFileError> {
    let content = fs::read_to_string(path).map_err(|source| EntryFileError::Io {
        path: path.display().to_string(),
        source,
    })?;
    serde_json::from_str(&content).map_err(|source| EntryFileError::Json {
        path: path.display().to_string(),
        source,
    })
}

/// Write a snapshot file, pretty-printed with four-space indentation and
/// non-ASCII text left unescaped.
pub fn write_entries(path: &Path, entries: &[TranslationEntry]) -> Result<(), EntryFileError> {
    let io_err = |source| EntryFileError::Io {
        path: path.display().to_string(),
        source,
    };

    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).map_err(io_err)?;
    }

    let mut buffer = Vec::new();
    let formatter = serde_json::ser::PrettyFormatter::with_indent(b"    ");
    let mut serializer = serde_json::Serializer::with_formatter(&mut buffer, formatter);
    entries
        .serialize(&mut serializer)
        .map_err(|source| EntryFileError::Json {
            path: path.display().to_string(),
            source,
        })?;

    fs::write(path, buffer).map_err(io_err)
}

/// Carry stages from a previous snapshot onto freshly extracted entries.
///
/// Returns the number of entries whose stage changed.
pub fn carry_over_stages(fresh: &mut [TranslationEntry], previous: &[TranslationEntry]) -> usize {
    let previous_stages: HashMap<&str, Stage> = previous
        .iter()
        .filter(|e| e.stage.is_carried_over())
        .map(|e| (e.key.as_str(), e.stage))
        .collect();

    let mut changed = 0;
    for entry in fresh.iter_mut() {
        if let Some(&stage) = previous_stages.get(entry.key.as_str()) {
            if entry.stage != stage {
                log::debug!("Stage of {} changed: {:?} -> {:?}", entry.key, entry.stage, stage);
                entry.stage = stage;
                changed += 1;
            }
        }
    }
    changed
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn stage_uses_platform_codes() {
        let json = serde_json::to_string(&Stage::Reviewed).unwrap();
        assert_eq!(json, "5");
        let stage: Stage = serde_json::from_str("-1").unwrap();
        assert_eq!(stage, Stage::Hidden);
        assert!(serde_json::from_str::<Stage>("4").is_err());
    }

    #[test]
    fn escaped_newlines_are_restored_on_read() {
        let json = r#"[{"key":"k","original":"a\\nb","translation":"c\\nd","stage":1}]"#;
        let entries: Vec<TranslationEntry> = serde_json::from_str(json).unwrap();
        assert_eq!(entries[0].original, "a\nb");
        assert_eq!(entries[0].translation, "c\nd");
        assert_eq!(entries[0].context, "");
    }

    #[test]
    fn snapshot_file_keeps_all_fields() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("nested").join("file.json");
        let entries = vec![TranslationEntry::new("k", "Fire", "开火", Stage::Proofread, "ctx")];

        write_entries(&path, &entries).unwrap();
        let written = fs::read_to_string(&path).unwrap();
        assert!(written.contains("开火"));
        assert!(written.contains("    {"));

        let read = read_entries(&path).unwrap();
        assert_eq!(read, entries);
    }

    #[test]
    fn carry_over_never_applies_untranslated() {
        let mut fresh = vec![
            TranslationEntry::new("a", "x", "", Stage::Untranslated, ""),
            TranslationEntry::new("b", "y", "", Stage::Translated, ""),
            TranslationEntry::new("c", "z", "", Stage::Untranslated, ""),
        ];
        let previous = vec![
            TranslationEntry::new("a", "x", "", Stage::Locked, ""),
            TranslationEntry::new("b", "y", "", Stage::Untranslated, ""),
        ];

        assert_eq!(carry_over_stages(&mut fresh, &previous), 1);
        assert_eq!(fresh[0].stage, Stage::Locked);
        assert_eq!(fresh[1].stage, Stage::Translated);
        assert_eq!(fresh[2].stage, Stage::Untranslated);
    }
}
