//! JAR archive handling
//!
//! Pairs the original and translated builds of one JAR, loads the class
//! members named by the mapping and writes translated class files back into
//! the translated JAR.

use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::fs::File;
use std::io::{self, Cursor, Read, Write};
use std::path::{Path, PathBuf};

use chrono::{Datelike, Local, Timelike};
use indexmap::IndexMap;
use zip::read::ZipArchive;
use zip::write::{FileOptions, ZipWriter};
use zip::CompressionMethod;

use super::class_file::{ClassEntry, ClassFileError, ClassOptions};
use super::fuzzy::{normalize_class_path, overlap_ratio};
use super::key::entry_class_path;
use crate::backup::{backup_and_swap, BackupError};
use crate::config::ToolkitConfig;
use crate::entry::{TranslationEntry, UpdateSummary};
use crate::mapping::{ClassFileMapItem, ClassMappingChange, JarMapItem};

#[derive(Debug, thiserror::Error)]
pub enum ArchiveError {
    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    #[error("ZIP error: {0}")]
    Zip(#[from] zip::result::ZipError),

    #[error("Archive not found: {0}")]
    NotFound(String),

    #[error("Entry not found in archive: {0}")]
    EntryNotFound(String),

    #[error("Class {class_path}: {source}")]
    Class {
        class_path: String,
        #[source]
        source: ClassFileError,
    },

    #[error("Failed to replace archive: {0}")]
    Backup(#[from] BackupError),
}

pub type ArchiveResult<T> = Result<T, ArchiveError>;

/// What a write-back pass did to one archive.
#[derive(Debug, Clone, Default)]
pub struct ArchiveUpdate {
    pub summary: UpdateSummary,
    /// Classes found by version migration that the mapping should include.
    pub mapping_changes: Vec<ClassMappingChange>,
}

fn open_archive(path: &Path) -> ArchiveResult<ZipArchive<File>> {
    if !path.exists() {
        return Err(ArchiveError::NotFound(path.display().to_string()));
    }
    let file = File::open(path)?;
    Ok(ZipArchive::new(file)?)
}

/// Upper bound on the buffer reserved up front for one member.
const MAX_SIZE_HINT: u64 = 1 << 24;

/// Declared member sizes come from the archive and are not trusted.
fn size_hint(declared: u64) -> usize {
    declared.min(MAX_SIZE_HINT) as usize
}

fn read_member(archive: &mut ZipArchive<File>, name: &str) -> ArchiveResult<Vec<u8>> {
    let mut entry = archive
        .by_name(name)
        .map_err(|_| ArchiveError::EntryNotFound(name.to_string()))?;
    let mut contents = Vec::with_capacity(size_hint(entry.size()));
    entry.read_to_end(&mut contents)?;
    Ok(contents)
}

fn now_zip_time() -> zip::DateTime {
    let now = Local::now();
    zip::DateTime::from_date_and_time(
        now.year().clamp(1980, 2107) as u16,
        now.month() as u8,
        now.day() as u8,
        now.hour() as u8,
        now.minute() as u8,
        now.second().min(59) as u8,
    )
    .unwrap_or_default()
}

/// Both builds of one JAR plus its loaded class members.
#[derive(Debug)]
pub struct ArchiveEntry {
    item: JarMapItem,
    original_path: PathBuf,
    translation_path: PathBuf,
    options: ClassOptions,
    fuzzy_match_threshold: f64,
    keep_backups: bool,
    classes: IndexMap<String, ClassEntry>,
}

impl ArchiveEntry {
    /// Open both JARs and load every configured class.
    ///
    /// A class that cannot be loaded is logged and left out; an archive that
    /// cannot be opened fails the whole entry.
    pub fn load(item: &JarMapItem, config: &ToolkitConfig) -> ArchiveResult<Self> {
        let mut entry = Self {
            item: item.clone(),
            original_path: config.original_root().join(&item.path),
            translation_path: config.translation_root().join(&item.path),
            options: ClassOptions::from(config),
            fuzzy_match_threshold: config.fuzzy_match_threshold,
            keep_backups: config.keep_backups,
            classes: IndexMap::new(),
        };

        log::info!(
            "Loading {} configured classes from {}",
            item.class_files.len(),
            item.path
        );

        let mut original = open_archive(&entry.original_path)?;
        let mut translation = open_archive(&entry.translation_path)?;
        for class_item in &item.class_files {
            if entry.classes.contains_key(&class_item.path) {
                continue;
            }
            match entry.load_class(&mut original, &mut translation, class_item) {
                Ok(class) => {
                    entry.classes.insert(class_item.path.clone(), class);
                }
                Err(err) => log::warn!("{}: skipping class: {err}", item.path),
            }
        }

        log::info!("Loaded {} classes from {}", entry.classes.len(), item.path);
        Ok(entry)
    }

    fn load_class(
        &self,
        original: &mut ZipArchive<File>,
        translation: &mut ZipArchive<File>,
        class_item: &ClassFileMapItem,
    ) -> ArchiveResult<ClassEntry> {
        let original_bytes = read_member(original, &class_item.path)?;
        let translation_bytes = read_member(translation, &class_item.path)?;
        ClassEntry::load(
            &self.item.path,
            class_item,
            &original_bytes,
            translation_bytes,
            self.options.clone(),
        )
        .map_err(|source| ArchiveError::Class {
            class_path: class_item.path.clone(),
            source,
        })
    }

    pub fn path(&self) -> &str {
        &self.item.path
    }

    pub fn translation_path(&self) -> &Path {
        &self.translation_path
    }

    pub fn classes(&self) -> impl Iterator<Item = &ClassEntry> {
        self.classes.values()
    }

    pub fn class(&self, class_path: &str) -> Option<&ClassEntry> {
        self.classes.get(class_path)
    }

    /// Load every `.class` member of the translated JAR that is not loaded
    /// yet, without filters. Returns how many were added.
    pub fn load_all_classes(&mut self) -> ArchiveResult<usize> {
        let mut translation = open_archive(&self.translation_path)?;
        let mut original = open_archive(&self.original_path)?;

        let names: Vec<String> = translation
            .file_names()
            .filter(|name| name.ends_with(".class"))
            .map(str::to_string)
            .collect();
        log::info!("Found {} class files in {}", names.len(), self.translation_path.display());

        let mut added = 0;
        for name in names {
            if self.classes.contains_key(&name) {
                continue;
            }
            let probe = ClassFileMapItem::new(name.clone());
            match self.load_class(&mut original, &mut translation, &probe) {
                Ok(class) => {
                    self.classes.insert(name, class);
                    added += 1;
                }
                Err(err) => log::debug!("{}: cannot load {name}: {err}", self.item.path),
            }
        }
        Ok(added)
    }

    pub fn get_strings(&self) -> Vec<TranslationEntry> {
        self.classes
            .values()
            .flat_map(|class| class.get_strings())
            .collect()
    }

    /// Route entries to their classes by the class path in the key.
    ///
    /// With `version_migration`, entries whose class is gone are matched to a
    /// renamed class of the current build.
    pub fn update_strings(
        &mut self,
        entries: &[TranslationEntry],
        version_migration: bool,
    ) -> ArchiveResult<ArchiveUpdate> {
        let mut update = ArchiveUpdate::default();
        let mut by_class: IndexMap<String, Vec<&TranslationEntry>> = IndexMap::new();
        let mut orphans: BTreeMap<String, Vec<&TranslationEntry>> = BTreeMap::new();

        for entry in entries {
            let Some(class_path) = entry_class_path(&entry.key, &entry.context) else {
                log::warn!("{}: cannot tell the class of entry {}", self.item.path, entry.key);
                update.summary.unmatched += 1;
                continue;
            };

            if self.classes.contains_key(&class_path) {
                by_class.entry(class_path).or_default().push(entry);
            } else if version_migration {
                log::debug!(
                    "{}: class {class_path} of entry {} is gone, trying fuzzy match later",
                    self.item.path,
                    entry.key
                );
                orphans.entry(class_path).or_default().push(entry);
            } else {
                log::warn!(
                    "{}: class {class_path} not found, entry {} not applied",
                    self.item.path,
                    entry.key
                );
                update.summary.unmatched += 1;
            }
        }

        for (class_path, class_entries) in by_class {
            if let Some(class) = self.classes.get_mut(&class_path) {
                let summary = class.update_strings(class_entries);
                update.summary.absorb(&summary);
            }
        }

        if orphans.is_empty() {
            return Ok(update);
        }

        log::info!(
            "{}: {} classes need fuzzy matching, loading every class",
            self.item.path,
            orphans.len()
        );
        self.load_all_classes()?;

        for (class_path, class_entries) in orphans {
            let Some(matched) = self.fuzzy_match_class(&class_path, &class_entries) else {
                log::warn!(
                    "{}: no replacement found for class {class_path}, {} entries not applied",
                    self.item.path,
                    class_entries.len()
                );
                update.summary.unmatched += class_entries.len();
                continue;
            };

            if let Some(class) = self.classes.get_mut(&matched) {
                let summary = class.update_strings(class_entries.iter().copied());
                update.summary.absorb(&summary);
            }
            update.mapping_changes.push(ClassMappingChange {
                jar_path: self.item.path.clone(),
                class_path: matched,
                include_strings: class_entries.iter().map(|e| e.original.clone()).collect(),
            });
        }

        Ok(update)
    }

    /// Pick the loaded class that most likely is `class_path` renamed.
    fn fuzzy_match_class(&self, class_path: &str, entries: &[&TranslationEntry]) -> Option<String> {
        let normalized = normalize_class_path(class_path);
        let wanted: Vec<&str> = entries.iter().map(|e| e.original.as_str()).collect();

        let mut best: Option<(&str, f64)> = None;
        for class in self.classes.values() {
            if normalize_class_path(class.path()) != normalized {
                continue;
            }
            let originals: BTreeSet<String> =
                class.get_strings().into_iter().map(|e| e.original).collect();
            let ratio = overlap_ratio(&wanted, originals.iter().map(String::as_str));
            // later candidates win ties
            if best.map_or(true, |(_, best_ratio)| ratio >= best_ratio) {
                best = Some((class.path(), ratio));
            }
        }

        match best {
            None => {
                log::info!("{}: no class path resembles {class_path}", self.item.path);
                None
            }
            Some((path, ratio)) if ratio >= self.fuzzy_match_threshold => {
                log::info!(
                    "{}: matched {class_path} => {path} ({:.0}% of strings)",
                    self.item.path,
                    ratio * 100.0
                );
                Some(path.to_string())
            }
            Some((path, ratio)) => {
                log::info!(
                    "{}: {class_path} => {path} rejected, only {:.0}% of strings match",
                    self.item.path,
                    ratio * 100.0
                );
                None
            }
        }
    }

    /// Rebuild the translated JAR. Members whose bytes did not change are
    /// copied raw; returns whether the archive was rewritten.
    pub fn save_file(&self) -> ArchiveResult<bool> {
        let updated: HashMap<&str, Vec<u8>> = self
            .classes
            .values()
            .filter(|class| class.is_modified())
            .map(|class| {
                class
                    .generate_translated_bytecode()
                    .map(|bytes| (class.path(), bytes))
                    .map_err(|source| ArchiveError::Class {
                        class_path: class.path().to_string(),
                        source,
                    })
            })
            .collect::<ArchiveResult<_>>()?;

        if updated.is_empty() {
            log::info!("{}: no class changed, archive left as is", self.item.path);
            return Ok(false);
        }

        let contents = {
            let mut source = open_archive(&self.translation_path)?;
            let mut writer = ZipWriter::new(Cursor::new(Vec::new()));
            let modified = now_zip_time();

            for i in 0..source.len() {
                let (name, compression, mode) = {
                    let entry = source.by_index_raw(i)?;
                    (entry.name().to_string(), entry.compression(), entry.unix_mode())
                };

                match updated.get(name.as_str()) {
                    Some(bytes) => {
                        let method = if compression == CompressionMethod::Stored {
                            CompressionMethod::Stored
                        } else {
                            CompressionMethod::Deflated
                        };
                        let mut options = FileOptions::<()>::default()
                            .compression_method(method)
                            .last_modified_time(modified);
                        if let Some(mode) = mode {
                            options = options.unix_permissions(mode);
                        }
                        writer.start_file(name.as_str(), options)?;
                        writer.write_all(bytes)?;
                    }
                    None => {
                        let entry = source.by_index_raw(i)?;
                        writer.raw_copy_file(entry)?;
                    }
                }
            }

            writer.finish()?.into_inner()
        };

        backup_and_swap(&self.translation_path, &contents, self.keep_backups)?;
        log::info!(
            "{}: rewrote {} classes in {}",
            self.item.path,
            updated.len(),
            self.translation_path.display()
        );
        Ok(true)
    }
}
