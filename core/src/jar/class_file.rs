//! One class member of a JAR, seen through its original and translated builds.

use std::collections::BTreeSet;
use std::ops::RangeInclusive;

use indexmap::IndexMap;

use super::constant_pool::{ConstantPool, ConstantPoolError, CONSTANT_POOL_OFFSET};
use super::key::{class_string_key, context_block};
use crate::config::ToolkitConfig;
use crate::entry::{Stage, TranslationEntry, UpdateSummary};
use crate::mapping::ClassFileMapItem;
use crate::text::{contains_cjk, contains_latin_letters};

/// Java class file magic: 0xCAFEBABE
pub const JAVA_MAGIC: [u8; 4] = [0xCA, 0xFE, 0xBA, 0xBE];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClassSide {
    Original,
    Translation,
}

impl std::fmt::Display for ClassSide {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ClassSide::Original => write!(f, "original"),
            ClassSide::Translation => write!(f, "translation"),
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ClassFileError {
    #[error("{side} class file is too short ({len} bytes)")]
    Truncated { side: ClassSide, len: usize },

    #[error("{side} class file has invalid magic {found}")]
    InvalidMagic { side: ClassSide, found: String },

    #[error("{side} class file version {major:#x} is outside {min:#x}..={max:#x}")]
    UnsupportedVersion {
        side: ClassSide,
        major: u16,
        min: u16,
        max: u16,
    },

    #[error("{side} constant pool: {source}")]
    ConstantPool {
        side: ClassSide,
        #[source]
        source: ConstantPoolError,
    },
}

/// Settings a class entry needs, copied out of the toolkit config.
#[derive(Debug, Clone)]
pub struct ClassOptions {
    pub context_prefix: String,
    pub ignore_context_prefix_mismatch: bool,
    pub max_key_length: usize,
    pub class_versions: RangeInclusive<u16>,
    pub ignore_surrounding_whitespace: bool,
    pub allow_empty_translation: bool,
}

impl From<&ToolkitConfig> for ClassOptions {
    fn from(config: &ToolkitConfig) -> Self {
        Self {
            context_prefix: config.context_prefix.clone(),
            ignore_context_prefix_mismatch: config.ignore_context_prefix_mismatch,
            max_key_length: config.max_key_length,
            class_versions: config.class_versions(),
            ignore_surrounding_whitespace: config.ignore_surrounding_whitespace,
            allow_empty_translation: config.allow_empty_translation,
        }
    }
}

fn trim_blanks(text: &str) -> &str {
    text.trim_matches(|c| c == ' ' || c == '\t')
}

#[derive(Debug, Clone)]
pub struct ClassEntry {
    jar_path: String,
    class_path: String,
    include_strings: BTreeSet<String>,
    exclude_strings: BTreeSet<String>,
    options: ClassOptions,
    original_pool: ConstantPool,
    translation_bytes: Vec<u8>,
    translation_pool: ConstantPool,
}

impl ClassEntry {
    /// Validate and parse both builds of a class.
    pub fn load(
        jar_path: &str,
        item: &ClassFileMapItem,
        original_bytes: &[u8],
        translation_bytes: Vec<u8>,
        options: ClassOptions,
    ) -> Result<Self, ClassFileError> {
        validate_header(original_bytes, ClassSide::Original, &options)?;
        validate_header(&translation_bytes, ClassSide::Translation, &options)?;

        let original_pool =
            ConstantPool::parse(original_bytes).map_err(|source| ClassFileError::ConstantPool {
                side: ClassSide::Original,
                source,
            })?;
        let translation_pool = ConstantPool::parse(&translation_bytes).map_err(|source| {
            ClassFileError::ConstantPool {
                side: ClassSide::Translation,
                source,
            }
        })?;

        let normalize = |set: &BTreeSet<String>| -> BTreeSet<String> {
            if options.ignore_surrounding_whitespace {
                set.iter().map(|s| trim_blanks(s).to_string()).collect()
            } else {
                set.clone()
            }
        };
        let include_strings = normalize(&item.include_strings);
        let exclude_strings = normalize(&item.exclude_strings);

        log::debug!("Loaded class {jar_path}:{}", item.path);

        Ok(Self {
            jar_path: jar_path.to_string(),
            class_path: item.path.clone(),
            include_strings,
            exclude_strings,
            options,
            original_pool,
            translation_bytes,
            translation_pool,
        })
    }

    pub fn path(&self) -> &str {
        &self.class_path
    }

    pub fn jar_path(&self) -> &str {
        &self.jar_path
    }

    /// Indices of string literals present in both builds, after filtering.
    fn paired_indices(&self) -> Vec<u16> {
        let mut indices = Vec::new();
        let mut found = BTreeSet::new();

        for constant in self.original_pool.string_referenced() {
            let text = constant.text();
            let compared = if self.options.ignore_surrounding_whitespace {
                trim_blanks(&text).to_string()
            } else {
                text.clone()
            };

            if !self.include_strings.is_empty() && !self.include_strings.contains(&compared) {
                continue;
            }
            if self.exclude_strings.contains(&compared) {
                continue;
            }

            let index = constant.index();
            if !self.translation_pool.is_string_referenced(index)
                || self.translation_pool.utf8(index).is_none()
            {
                log::warn!(
                    "{}:{} translation has no string constant #{index}, skipping \"{text}\"",
                    self.jar_path,
                    self.class_path
                );
                continue;
            }

            indices.push(index);
            found.insert(compared);
        }

        for missing in self
            .include_strings
            .iter()
            .filter(|s| !self.exclude_strings.contains(*s) && !found.contains(*s))
        {
            log::warn!(
                "{}:{} has no string \"{missing}\" listed in the mapping",
                self.jar_path,
                self.class_path
            );
        }

        indices
    }

    /// Paired indices grouped by original text, in first-occurrence order.
    fn groups(&self) -> IndexMap<String, Vec<u16>> {
        let mut groups: IndexMap<String, Vec<u16>> = IndexMap::new();
        for index in self.paired_indices() {
            if let Some(original) = self.original_pool.utf8(index) {
                groups.entry(original.text()).or_default().push(index);
            }
        }
        groups
    }

    fn translation_text(&self, index: u16) -> String {
        self.translation_pool
            .utf8(index)
            .map(|c| c.text())
            .unwrap_or_default()
    }

    /// One entry per distinct original literal; the first pair supplies the
    /// translation, every pair contributes a context block.
    pub fn get_strings(&self) -> Vec<TranslationEntry> {
        let header = format!("{}\n", self.options.context_prefix);

        self.groups()
            .into_iter()
            .map(|(original, indices)| {
                let translation = self.translation_text(indices[0]);
                let stage = extraction_stage(&original, &translation);

                let mut context = String::new();
                for &index in &indices {
                    context.push_str(&header);
                    context.push_str(&context_block(
                        &self.jar_path,
                        &self.class_path,
                        index,
                        &original,
                        &self.translation_text(index),
                    ));
                    context.push_str("\n\n");
                }

                let key = class_string_key(
                    &self.jar_path,
                    &self.class_path,
                    &original,
                    self.options.max_key_length,
                );
                TranslationEntry::new(key, original, translation, stage, context)
            })
            .collect()
    }

    /// Write translations into the translation-side pool.
    pub fn update_strings<'a>(
        &mut self,
        entries: impl IntoIterator<Item = &'a TranslationEntry>,
    ) -> UpdateSummary {
        let groups = self.groups();
        let mut summary = UpdateSummary::default();

        for entry in entries {
            if self.options.ignore_context_prefix_mismatch
                && !entry.context.starts_with(&self.options.context_prefix)
            {
                log::debug!(
                    "{}:{} skipping {}: context prefix differs",
                    self.jar_path,
                    self.class_path,
                    entry.key
                );
                summary.skipped += 1;
                continue;
            }

            let Some(indices) = groups.get(&entry.original) else {
                log::warn!(
                    "{}:{} has no constant \"{}\", entry {} not applied",
                    self.jar_path,
                    self.class_path,
                    entry.original,
                    entry.key
                );
                summary.unmatched += 1;
                continue;
            };

            for &index in indices {
                if self.original_pool.is_structurally_referenced(index)
                    || self.translation_pool.is_structurally_referenced(index)
                {
                    log::warn!(
                        "{}:{} constant #{index} \"{}\" is also a class or member name, \
                         update it by hand",
                        self.jar_path,
                        self.class_path,
                        entry.original
                    );
                    summary.skipped += 1;
                    continue;
                }

                let write_translation = entry.stage.is_translated()
                    && (!entry.translation.is_empty() || self.options.allow_empty_translation);
                let current = self.translation_text(index);

                let replacement = if write_translation {
                    &entry.translation
                } else if current != entry.original {
                    log::warn!(
                        "{}:{} \"{}\" is untranslated but the translation build differs, \
                         restoring the original",
                        self.jar_path,
                        self.class_path,
                        entry.original
                    );
                    &entry.original
                } else {
                    continue;
                };

                if *replacement != current {
                    if let Some(slot) = self.translation_pool.utf8_mut(index) {
                        match slot.set_text(replacement) {
                            Ok(()) => summary.updated += 1,
                            Err(err) => {
                                log::warn!(
                                    "{}:{} entry {} not applied: {err}",
                                    self.jar_path,
                                    self.class_path,
                                    entry.key
                                );
                                summary.skipped += 1;
                            }
                        }
                    }
                }
            }
        }

        summary
    }

    /// Translation class bytes with the edited pool spliced in.
    pub fn generate_translated_bytecode(&self) -> Result<Vec<u8>, ClassFileError> {
        let tail = &self.translation_bytes[self.translation_pool.end_offset()..];
        let pool = self
            .translation_pool
            .to_bytes()
            .map_err(|source| ClassFileError::ConstantPool {
                side: ClassSide::Translation,
                source,
            })?;

        let mut out = Vec::with_capacity(CONSTANT_POOL_OFFSET + pool.len() + tail.len());
        out.extend_from_slice(&self.translation_bytes[..CONSTANT_POOL_OFFSET]);
        out.extend_from_slice(&pool);
        out.extend_from_slice(tail);
        Ok(out)
    }

    /// Whether regenerating would change the stored translation bytes. A pool
    /// that no longer serializes counts as modified so saving reports it.
    pub fn is_modified(&self) -> bool {
        self.generate_translated_bytecode()
            .map_or(true, |bytes| bytes != self.translation_bytes)
    }

    /// Mapping descriptor listing every literal currently extracted.
    pub fn export_map_item(&self) -> ClassFileMapItem {
        let mut item = ClassFileMapItem::new(self.class_path.clone());
        item.include_strings = self.get_strings().into_iter().map(|e| e.original).collect();
        item
    }

    /// Literals that double as class or member names and cannot be rewritten.
    pub fn shared_strings(&self) -> BTreeSet<String> {
        self.original_pool
            .shared()
            .into_iter()
            .map(|c| c.text())
            .collect()
    }

    /// Every original literal, ignoring mapping filters.
    pub fn all_literals(&self) -> Vec<String> {
        self.original_pool
            .string_referenced()
            .into_iter()
            .map(|c| c.text())
            .collect()
    }
}

fn validate_header(
    bytes: &[u8],
    side: ClassSide,
    options: &ClassOptions,
) -> Result<(), ClassFileError> {
    if bytes.len() < CONSTANT_POOL_OFFSET + 2 {
        return Err(ClassFileError::Truncated {
            side,
            len: bytes.len(),
        });
    }
    if bytes[..4] != JAVA_MAGIC {
        return Err(ClassFileError::InvalidMagic {
            side,
            found: hex::encode_upper(&bytes[..4]),
        });
    }
    let major = u16::from_be_bytes([bytes[6], bytes[7]]);
    if !options.class_versions.contains(&major) {
        return Err(ClassFileError::UnsupportedVersion {
            side,
            major,
            min: *options.class_versions.start(),
            max: *options.class_versions.end(),
        });
    }
    Ok(())
}

/// Stage assigned at extraction time.
pub fn extraction_stage(original: &str, translation: &str) -> Stage {
    if !contains_latin_letters(original) || !contains_latin_letters(translation) {
        Stage::Translated
    } else if !contains_cjk(translation) {
        Stage::Untranslated
    } else {
        Stage::Translated
    }
}

#[cfg(test)]
mod tests {
    use super::super::constant_pool::test_support::{class_bytes, Entry, MAJOR_JAVA_8};
    use super::*;

    const HEADER: &str = "Version: 0.98-RC8 Entry format: v2\n";

    fn options() -> ClassOptions {
        ClassOptions::from(&ToolkitConfig::default())
    }

    fn item() -> ClassFileMapItem {
        ClassFileMapItem::new("pkg/Foo.class")
    }

    fn load(original: &[u8], translation: &[u8]) -> ClassEntry {
        ClassEntry::load("a.jar", &item(), original, translation.to_vec(), options()).unwrap()
    }

    /// Two equal "Fire" literals at #4 and #5; `second` is #5's text.
    fn fire_class(second: &str) -> Vec<u8> {
        class_bytes(
            MAJOR_JAVA_8,
            &[
                Entry::Utf8("pkg/Foo"), // 1
                Entry::Class(1),        // 2
                Entry::Utf8("x"),       // 3
                Entry::Utf8("Fire"),    // 4
                Entry::Utf8(second),    // 5
                Entry::String(4),       // 6
                Entry::String(5),       // 7
            ],
        )
    }

    fn fire_pair() -> (Vec<u8>, Vec<u8>) {
        (fire_class("Fire"), fire_class("Feuer"))
    }

    #[test]
    fn first_pair_wins_for_equal_literals() {
        let (original, translation) = fire_pair();
        let class = load(&original, &translation);
        let entries = class.get_strings();

        assert_eq!(entries.len(), 1);
        let entry = &entries[0];
        assert_eq!(entry.key, "a.jar:pkg/Foo.class#\"Fire\"");
        assert_eq!(entry.original, "Fire");
        assert_eq!(entry.translation, "Fire");
        assert_eq!(entry.stage, Stage::Untranslated);
        assert_eq!(
            entry.context,
            format!(
                "{HEADER}Extracted from a.jar:pkg/Foo.class constant #0004\nOriginal: \"Fire\"\nTranslation: \"Fire\"\n\n\
                 {HEADER}Extracted from a.jar:pkg/Foo.class constant #0005\nOriginal: \"Fire\"\nTranslation: \"Feuer\"\n\n"
            )
        );
    }

    #[test]
    fn update_writes_every_paired_slot() {
        let (original, translation) = fire_pair();
        let mut class = load(&original, &translation);
        let mut entry = class.get_strings().remove(0);
        entry.translation = "开火".into();
        entry.stage = Stage::Translated;

        let summary = class.update_strings([&entry]);
        assert_eq!(summary.updated, 2);
        assert!(class.is_modified());

        let rebuilt = class.generate_translated_bytecode().unwrap();
        let reloaded = load(&original, &rebuilt);
        let entries = reloaded.get_strings();
        assert_eq!(entries[0].translation, "开火");
        assert_eq!(entries[0].stage, Stage::Translated);
        assert!(entries[0].context.contains("constant #0005\nOriginal: \"Fire\"\nTranslation: \"开火\""));
        // tail after the pool is untouched
        assert_eq!(&rebuilt[rebuilt.len() - 14..], &translation[translation.len() - 14..]);
    }

    #[test]
    fn untranslated_entry_restores_drifted_slot() {
        let (original, translation) = fire_pair();
        let mut class = load(&original, &translation);
        let entry = class.get_strings().remove(0);

        let summary = class.update_strings([&entry]);
        assert_eq!(summary.updated, 1);
        let reloaded = load(&original, &class.generate_translated_bytecode().unwrap());
        assert!(reloaded.get_strings()[0].context.contains("Translation: \"Fire\"\n\n"));
        assert!(!reloaded.get_strings()[0].context.contains("Feuer"));
    }

    #[test]
    fn shared_slots_are_never_rewritten() {
        let build = || {
            class_bytes(
                MAJOR_JAVA_8,
                &[
                    Entry::Utf8("Target"),     // 1
                    Entry::Class(1),           // 2
                    Entry::String(1),          // 3
                    Entry::Utf8("Hello"),      // 4
                    Entry::String(4),          // 5
                ],
            )
        };
        let original = build();
        let mut class = load(&original, &original);
        assert_eq!(class.shared_strings(), BTreeSet::from(["Target".to_string()]));

        let entries: Vec<TranslationEntry> = class
            .get_strings()
            .into_iter()
            .map(|mut e| {
                e.translation = format!("{}译", e.original);
                e.stage = Stage::Translated;
                e
            })
            .collect();
        let summary = class.update_strings(&entries);
        assert_eq!(summary.updated, 1);
        assert_eq!(summary.skipped, 1);

        let rebuilt = class.generate_translated_bytecode().unwrap();
        let pool = ConstantPool::parse(&rebuilt).unwrap();
        assert_eq!(pool.utf8(1).unwrap().raw(), b"Target");
        assert_eq!(pool.utf8(4).unwrap().text(), "Hello译");
    }

    #[test]
    fn prefix_mismatch_and_unknown_originals_are_reported() {
        let (original, translation) = fire_pair();
        let mut class = load(&original, &translation);

        let stale = TranslationEntry::new("k", "Fire", "开火", Stage::Translated, "Version: old\n");
        let unknown = TranslationEntry::new("k2", "Gone", "走了", Stage::Translated, HEADER);
        let summary = class.update_strings([&stale, &unknown]);

        assert_eq!(summary.skipped, 1);
        assert_eq!(summary.unmatched, 1);
        assert!(!class.is_modified());
    }

    #[test]
    fn oversized_translation_leaves_slots_alone() {
        let (original, translation) = fire_pair();
        let mut class = load(&original, &translation);
        let mut entry = class.get_strings().remove(0);
        entry.translation = "é".repeat(40_000);
        entry.stage = Stage::Translated;

        let summary = class.update_strings([&entry]);
        assert_eq!(summary.updated, 0);
        assert_eq!(summary.skipped, 2);
        assert!(!class.is_modified());

        let pool = ConstantPool::parse(&class.generate_translated_bytecode().unwrap()).unwrap();
        assert_eq!(pool.utf8(4).unwrap().text(), "Fire");
        assert_eq!(pool.utf8(5).unwrap().text(), "Feuer");
    }

    #[test]
    fn filters_apply_to_trimmed_text() {
        let original = class_bytes(
            MAJOR_JAVA_8,
            &[
                Entry::Utf8(" Fire\t"),
                Entry::String(1),
                Entry::Utf8("Hold"),
                Entry::String(3),
            ],
        );
        let mut mapping = item();
        mapping.include_strings = ["Fire".to_string(), "Missing".to_string()].into();
        let class =
            ClassEntry::load("a.jar", &mapping, &original, original.clone(), options()).unwrap();

        let entries = class.get_strings();
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].original, " Fire\t");
        assert_eq!(
            class.export_map_item().include_strings,
            BTreeSet::from([" Fire\t".to_string()])
        );
    }

    #[test]
    fn rejects_bad_headers() {
        let mut data = class_bytes(MAJOR_JAVA_8, &[Entry::Utf8("a")]);
        let good = data.clone();
        data[0] = 0;
        assert!(matches!(
            ClassEntry::load("a.jar", &item(), &data, good.clone(), options()),
            Err(ClassFileError::InvalidMagic { side: ClassSide::Original, .. })
        ));

        let newer = class_bytes(0x41, &[Entry::Utf8("a")]);
        assert!(matches!(
            ClassEntry::load("a.jar", &item(), &good, newer, options()),
            Err(ClassFileError::UnsupportedVersion { side: ClassSide::Translation, major: 0x41, .. })
        ));
    }

    #[test]
    fn version_range_comes_from_config() {
        let config = ToolkitConfig {
            max_class_version: 0x33,
            ..ToolkitConfig::default()
        };
        let data = class_bytes(MAJOR_JAVA_8, &[Entry::Utf8("a")]);
        let err = ClassEntry::load("a.jar", &item(), &data, data.clone(), ClassOptions::from(&config))
            .unwrap_err();
        assert!(matches!(
            err,
            ClassFileError::UnsupportedVersion { side: ClassSide::Original, major: 0x34, min: 0x31, max: 0x33 }
        ));
    }

    #[test]
    fn stage_policy() {
        assert_eq!(extraction_stage("%s / %d", "%s / %d"), Stage::Translated);
        assert_eq!(extraction_stage("Fire", "Fire"), Stage::Untranslated);
        assert_eq!(extraction_stage("Fire", "开火"), Stage::Translated);
        assert_eq!(extraction_stage("Fire", "开火 OK"), Stage::Translated);
        assert_eq!(extraction_stage("Fire", ""), Stage::Translated);
    }
}
