//! Export and import runs over every configured data file.
//!
//! Export reads the game files and writes one entry snapshot per data file
//! into the platform directory; import reads those snapshots back and writes
//! the translations into the translated game files.

use std::path::PathBuf;

use crate::config::{ConfigError, LoaderKind, ToolkitConfig};
use crate::entry::{
    carry_over_stages, read_entries, write_entries, EntryFileError, TranslationEntry,
    UpdateSummary,
};
use crate::jar::{ArchiveEntry, ArchiveError, ArchiveUpdate};
use crate::mapping::{ClassMappingChange, MappingConfig, MappingError};
use crate::table::{TableEntry, TableError};

#[derive(Debug, thiserror::Error)]
pub enum SyncError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Mapping(#[from] MappingError),

    #[error(transparent)]
    Archive(#[from] ArchiveError),

    #[error(transparent)]
    Table(#[from] TableError),

    #[error(transparent)]
    Entries(#[from] EntryFileError),
}

/// Result of merging one snapshot into a data file.
#[derive(Debug, Clone, Default)]
pub struct FileUpdate {
    pub summary: UpdateSummary,
    pub mapping_changes: Vec<ClassMappingChange>,
}

impl From<ArchiveUpdate> for FileUpdate {
    fn from(update: ArchiveUpdate) -> Self {
        Self {
            summary: update.summary,
            mapping_changes: update.mapping_changes,
        }
    }
}

impl From<UpdateSummary> for FileUpdate {
    fn from(summary: UpdateSummary) -> Self {
        Self {
            summary,
            mapping_changes: Vec::new(),
        }
    }
}

/// A game file that can be turned into entries and back.
pub trait DataFile {
    /// Path relative to the game roots, as written in the mapping.
    fn path(&self) -> &str;

    fn get_strings(&self) -> Vec<TranslationEntry>;

    fn update_strings(
        &mut self,
        entries: &[TranslationEntry],
        version_migration: bool,
    ) -> Result<FileUpdate, SyncError>;

    /// Write the translated file; returns whether anything was written.
    fn save_file(&self) -> Result<bool, SyncError>;
}

impl DataFile for ArchiveEntry {
    fn path(&self) -> &str {
        ArchiveEntry::path(self)
    }

    fn get_strings(&self) -> Vec<TranslationEntry> {
        ArchiveEntry::get_strings(self)
    }

    fn update_strings(
        &mut self,
        entries: &[TranslationEntry],
        version_migration: bool,
    ) -> Result<FileUpdate, SyncError> {
        Ok(ArchiveEntry::update_strings(self, entries, version_migration)?.into())
    }

    fn save_file(&self) -> Result<bool, SyncError> {
        Ok(ArchiveEntry::save_file(self)?)
    }
}

impl DataFile for TableEntry {
    fn path(&self) -> &str {
        TableEntry::path(self)
    }

    fn get_strings(&self) -> Vec<TranslationEntry> {
        TableEntry::get_strings(self)
    }

    fn update_strings(
        &mut self,
        entries: &[TranslationEntry],
        _version_migration: bool,
    ) -> Result<FileUpdate, SyncError> {
        Ok(TableEntry::update_strings(self, entries).into())
    }

    fn save_file(&self) -> Result<bool, SyncError> {
        Ok(TableEntry::save_file(self)?)
    }
}

/// Counters for one export or import run.
#[derive(Debug, Clone, Default)]
pub struct SyncReport {
    /// Data files processed without error.
    pub files: usize,
    /// Data files that failed to load, merge or save.
    pub failed: usize,
    /// Entries written to snapshots.
    pub exported: usize,
    pub summary: UpdateSummary,
    /// Data files rewritten on disk.
    pub rewritten: usize,
    /// Classes the mapping learned from version migration.
    pub mapping_changes: usize,
}

/// Configuration plus mapping, loaded once and passed to every loader.
#[derive(Debug, Clone)]
pub struct Project {
    pub config: ToolkitConfig,
    pub mapping: MappingConfig,
}

impl Project {
    pub fn new(config: ToolkitConfig, mapping: MappingConfig) -> Self {
        Self { config, mapping }
    }

    /// Load the mapping named by the configuration.
    pub fn open(config: ToolkitConfig) -> Result<Self, SyncError> {
        let mapping = MappingConfig::load(&config.mapping_file())?;
        log::info!(
            "Loaded {} mapping items from {}",
            mapping.items.len(),
            config.mapping_file().display()
        );
        Ok(Self { config, mapping })
    }

    /// Snapshot file exchanged with the platform for one data file.
    pub fn snapshot_path(&self, data_path: &str) -> PathBuf {
        self.config
            .platform_root()
            .join(data_path)
            .with_extension("json")
    }

    /// Load every data file of the enabled kinds, in loader order.
    ///
    /// Files that fail to load are logged and counted, not returned.
    pub fn load_data_files(&self) -> (Vec<Box<dyn DataFile>>, usize) {
        let mut files: Vec<Box<dyn DataFile>> = Vec::new();
        let mut failed = 0;

        for kind in &self.config.enabled_loaders {
            match kind {
                LoaderKind::Jar => {
                    for item in self.mapping.jar_items() {
                        match ArchiveEntry::load(item, &self.config) {
                            Ok(entry) => files.push(Box::new(entry)),
                            Err(err) => {
                                log::error!("Failed to load {}: {err}", item.path);
                                failed += 1;
                            }
                        }
                    }
                }
                LoaderKind::Csv => {
                    for item in self.mapping.csv_items() {
                        match TableEntry::load(item, &self.config) {
                            Ok(entry) => files.push(Box::new(entry)),
                            Err(err) => {
                                log::error!("Failed to load {}: {err}", item.path);
                                failed += 1;
                            }
                        }
                    }
                }
            }
        }

        (files, failed)
    }

    fn export_file(&self, file: &dyn DataFile) -> Result<usize, SyncError> {
        let mut entries: Vec<TranslationEntry> = file
            .get_strings()
            .into_iter()
            .filter(|e| !e.original.is_empty())
            .collect();

        let snapshot = self.snapshot_path(file.path());
        if !self.config.override_string_status && snapshot.exists() {
            match read_entries(&snapshot) {
                Ok(previous) => {
                    let changed = carry_over_stages(&mut entries, &previous);
                    log::info!(
                        "{} exists, kept the stage of {changed} entries",
                        snapshot.display()
                    );
                }
                Err(err) => log::warn!("Ignoring unreadable previous snapshot: {err}"),
            }
        }

        write_entries(&snapshot, &entries)?;
        log::info!(
            "Exported {} entries from {} to {}",
            entries.len(),
            file.path(),
            snapshot.display()
        );
        Ok(entries.len())
    }

    /// Game files to platform snapshots.
    pub fn export_all(&self) -> SyncReport {
        let (files, failed) = self.load_data_files();
        let mut report = SyncReport {
            failed,
            ..SyncReport::default()
        };

        for file in &files {
            match self.export_file(file.as_ref()) {
                Ok(count) => {
                    report.files += 1;
                    report.exported += count;
                }
                Err(err) => {
                    log::error!("Export of {} failed: {err}", file.path());
                    report.failed += 1;
                }
            }
        }

        log::info!(
            "Export finished: {} entries from {} files, {} files failed",
            report.exported,
            report.files,
            report.failed
        );
        report
    }

    fn import_file(
        &self,
        file: &mut dyn DataFile,
        version_migration: bool,
    ) -> Result<Option<(FileUpdate, bool)>, SyncError> {
        let snapshot = self.snapshot_path(file.path());
        if !snapshot.exists() {
            log::warn!(
                "No snapshot for {} at {}, not updated",
                file.path(),
                snapshot.display()
            );
            return Ok(None);
        }

        let entries = read_entries(&snapshot)?;
        let update = file.update_strings(&entries, version_migration)?;
        log::info!(
            "Merged {} entries from {} into {}: {} updated, {} skipped, {} unmatched",
            entries.len(),
            snapshot.display(),
            file.path(),
            update.summary.updated,
            update.summary.skipped,
            update.summary.unmatched
        );
        let written = file.save_file()?;
        Ok(Some((update, written)))
    }

    /// Platform snapshots to translated game files.
    ///
    /// Classes matched during version migration are added to the mapping,
    /// which is saved once at the end.
    pub fn import_all(&mut self, version_migration: bool) -> Result<SyncReport, SyncError> {
        let (mut files, failed) = self.load_data_files();
        let mut report = SyncReport {
            failed,
            ..SyncReport::default()
        };
        let mut changes = Vec::new();

        for file in files.iter_mut() {
            match self.import_file(file.as_mut(), version_migration) {
                Ok(Some((update, written))) => {
                    report.files += 1;
                    report.summary.absorb(&update.summary);
                    if written {
                        report.rewritten += 1;
                    }
                    changes.extend(update.mapping_changes);
                }
                Ok(None) => report.files += 1,
                Err(err) => {
                    log::error!("Import into {} failed: {err}", file.path());
                    report.failed += 1;
                }
            }
        }

        if !changes.is_empty() {
            report.mapping_changes = self.mapping.apply_class_includes(&changes);
            self.mapping.save(&self.config.mapping_file())?;
            log::info!(
                "Added {} migrated classes to {}",
                report.mapping_changes,
                self.config.mapping_file().display()
            );
        }

        log::info!(
            "Import finished: {} updated, {} skipped, {} unmatched, {} files rewritten, {} files failed",
            report.summary.updated,
            report.summary.skipped,
            report.summary.unmatched,
            report.rewritten,
            report.failed
        );
        Ok(report)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::entry::Stage;
    use crate::mapping::{CsvMapItem, IdColumns, MappingItem};
    use std::fs;
    use tempfile::TempDir;

    fn csv_project(original: &str) -> (TempDir, Project) {
        let dir = TempDir::new().unwrap();
        let mut config = ToolkitConfig::default().with_project_dir(dir.path());
        config.enabled_loaders = vec![LoaderKind::Csv];

        let path = config.original_root().join("data/hulls.csv");
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(&path, original).unwrap();

        let mapping = MappingConfig {
            items: vec![MappingItem::Csv(CsvMapItem {
                path: "data/hulls.csv".to_string(),
                id_column_name: IdColumns::Single("id".to_string()),
                text_column_names: vec!["name".to_string(), "tech".to_string()],
            })],
        };
        (dir, Project::new(config, mapping))
    }

    #[test]
    fn snapshot_path_swaps_extension() {
        let (dir, project) = csv_project("id,name,tech\n");
        assert_eq!(
            project.snapshot_path("data/campaign/rules.csv"),
            dir.path().join("para_tranz/output/data/campaign/rules.json")
        );
    }

    #[test]
    fn export_skips_empty_originals_and_keeps_stages() {
        let (_dir, project) = csv_project("id,name,tech\nwolf,Wolf,\nhound,Hound,Low Tech\n");

        let report = project.export_all();
        assert_eq!(report.files, 1);
        assert_eq!(report.exported, 3);

        let snapshot = project.snapshot_path("data/hulls.csv");
        let mut entries = read_entries(&snapshot).unwrap();
        assert!(entries.iter().all(|e| !e.original.is_empty()));

        entries[0].stage = Stage::Reviewed;
        write_entries(&snapshot, &entries).unwrap();
        project.export_all();
        let entries = read_entries(&snapshot).unwrap();
        assert_eq!(entries[0].stage, Stage::Reviewed);
        assert_eq!(entries[1].stage, Stage::Untranslated);
    }

    #[test]
    fn import_writes_translations_into_the_table() {
        let (_dir, mut project) = csv_project("id,name,tech\nwolf,Wolf,\n");
        project.export_all();

        let snapshot = project.snapshot_path("data/hulls.csv");
        let mut entries = read_entries(&snapshot).unwrap();
        entries[0].translation = "狼".to_string();
        entries[0].stage = Stage::Translated;
        write_entries(&snapshot, &entries).unwrap();

        let report = project.import_all(false).unwrap();
        assert_eq!(report.summary.updated, 1);
        assert_eq!(report.rewritten, 1);
        assert_eq!(report.mapping_changes, 0);

        let written =
            fs::read_to_string(project.config.translation_root().join("data/hulls.csv")).unwrap();
        assert_eq!(written, "id,name,tech\nwolf,狼,\n");
    }

    #[test]
    fn broken_files_do_not_stop_the_run() {
        let (_dir, mut project) = csv_project("id,name,tech\nwolf,Wolf,\n");
        project.mapping.items.push(MappingItem::Csv(CsvMapItem {
            path: "data/missing.csv".to_string(),
            id_column_name: IdColumns::Single("id".to_string()),
            text_column_names: vec!["name".to_string()],
        }));

        let report = project.export_all();
        assert_eq!(report.files, 1);
        assert_eq!(report.failed, 1);
    }
}
