//! One game CSV table, original and translated side by side.

use std::path::{Path, PathBuf};

use indexmap::IndexMap;

use super::reader::{parse_records, write_records};
use super::rules::{validate_row, RuleCell, RULES_FILE_NAME, SCRIPT_COLUMN};
use super::{TableError, TableResult};
use crate::backup::backup_and_swap;
use crate::config::ToolkitConfig;
use crate::encoding::{normalize_newlines, FileMetadata, Newline};
use crate::entry::{Stage, TranslationEntry, UpdateSummary};
use crate::mapping::{CsvMapItem, IdColumns};
use crate::text::{contains_cjk, contains_latin_letters, tuple_repr};

/// Stand-in for a literal `\n` inside a cell while the table is in memory,
/// so it is not confused with a real line break.
pub const ESCAPED_NEWLINE_SENTINEL: &str = "^n";

/// Parsed rows of one side of a table.
#[derive(Debug, Clone)]
struct Table {
    header: Vec<String>,
    /// Every record after the header, blank and comment rows included.
    rows: Vec<Vec<String>>,
    /// Identifier to position in `rows`, for rows that carry data.
    index: IndexMap<String, usize>,
    metadata: FileMetadata,
}

impl Table {
    fn load(path: &Path, id_columns: &IdColumns, text_columns: &[String]) -> TableResult<Self> {
        let display = path.display().to_string();
        let (text, metadata) = FileMetadata::read_file(path).map_err(|source| TableError::Io {
            path: display.clone(),
            source,
        })?;
        if metadata.substituted_bytes > 0 {
            log::warn!(
                "{display}: substituted {} bytes that were not valid UTF-8",
                metadata.substituted_bytes
            );
        }

        let text = text
            .replace("\r\n", "\n")
            .replace("\\n", ESCAPED_NEWLINE_SENTINEL);
        let mut records = parse_records(&text).map_err(|err| TableError::Malformed {
            path: display.clone(),
            line: err.line,
            message: err.message,
        })?;
        if records.is_empty() || records[0].is_empty() {
            return Err(TableError::MissingHeader { path: display });
        }
        let header = records.remove(0);

        let mut table = Self {
            header,
            rows: records,
            index: IndexMap::new(),
            metadata,
        };

        for column in id_columns.names().into_iter().chain(text_columns.iter().map(String::as_str)) {
            if table.column(column).is_none() {
                return Err(TableError::MissingColumn {
                    path: display,
                    column: column.to_string(),
                    available: table.header.clone(),
                });
            }
        }

        table.build_index(&display, id_columns)?;
        Ok(table)
    }

    fn build_index(&mut self, display: &str, id_columns: &IdColumns) -> TableResult<()> {
        let width = self.header.len();
        let id_positions: Vec<usize> = id_columns
            .names()
            .into_iter()
            .filter_map(|name| self.column(name))
            .collect();

        for (position, row) in self.rows.iter_mut().enumerate() {
            let first = match row.first() {
                Some(first) => first,
                None => continue,
            };
            if first.is_empty() || first.starts_with('#') {
                continue;
            }

            if row.len() < width {
                log::warn!(
                    "{display} row {}: {} of {width} values present, a comma may be missing",
                    position + 1,
                    row.len()
                );
                row.resize(width, String::new());
            }

            let id = match id_columns {
                IdColumns::Single(_) => row[id_positions[0]].clone(),
                IdColumns::Composite(_) => {
                    let parts: Vec<&str> = id_positions.iter().map(|&i| row[i].as_str()).collect();
                    tuple_repr(&parts)
                }
            };

            if self.index.contains_key(&id) {
                return Err(TableError::DuplicateId {
                    path: display.to_string(),
                    row: position + 1,
                    id,
                });
            }
            self.index.insert(id, position);
        }

        Ok(())
    }

    /// Position of the first column called `name`.
    fn column(&self, name: &str) -> Option<usize> {
        self.header.iter().position(|h| h == name)
    }

    fn cell(&self, id: &str, column: &str) -> Option<&str> {
        let row = &self.rows[*self.index.get(id)?];
        row.get(self.column(column)?).map(String::as_str)
    }

    fn cell_mut(&mut self, id: &str, column: &str) -> Option<&mut String> {
        let column = self.column(column)?;
        let row = *self.index.get(id)?;
        self.rows[row].get_mut(column)
    }
}

/// Both sides of one configured CSV table.
#[derive(Debug)]
pub struct TableEntry {
    path: String,
    file_name: String,
    original_path: PathBuf,
    translation_path: PathBuf,
    id_columns: IdColumns,
    text_columns: Vec<String>,
    context_header: String,
    remove_translation_when_original_empty: bool,
    keep_backups: bool,
    original: Table,
    translation: Table,
    /// False when the translated file did not exist and was seeded from the
    /// original.
    translation_loaded: bool,
}

impl TableEntry {
    pub fn load(item: &CsvMapItem, config: &ToolkitConfig) -> TableResult<Self> {
        let original_path = config.original_root().join(&item.path);
        let translation_path = config.translation_root().join(&item.path);
        let file_name = Path::new(&item.path)
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| item.path.clone());

        let original = Table::load(&original_path, &item.id_column_name, &item.text_column_names)?;
        log::info!(
            "Loaded {} original rows from {} ({} with data)",
            original.rows.len(),
            item.path,
            original.index.len()
        );

        let translation_loaded = translation_path.exists();
        let translation = if translation_loaded {
            let table =
                Table::load(&translation_path, &item.id_column_name, &item.text_column_names)?;
            log::info!(
                "Loaded {} translated rows from {} ({} with data)",
                table.rows.len(),
                item.path,
                table.index.len()
            );
            table
        } else {
            log::info!("{} has no translated copy yet, starting from the original", item.path);
            original.clone()
        };

        if original.rows.len() != translation.rows.len() {
            log::warn!(
                "{}: {} original rows but {} translated rows",
                item.path,
                original.rows.len(),
                translation.rows.len()
            );
        }
        if original.index.len() != translation.index.len() {
            log::warn!(
                "{}: {} original rows with data but {} translated",
                item.path,
                original.index.len(),
                translation.index.len()
            );
        }

        Ok(Self {
            path: item.path.clone(),
            file_name,
            original_path,
            translation_path,
            id_columns: item.id_column_name.clone(),
            text_columns: item.text_column_names.clone(),
            context_header: config.context_header(),
            remove_translation_when_original_empty: config.remove_translation_when_original_empty,
            keep_backups: config.keep_backups,
            original,
            translation,
            translation_loaded,
        })
    }

    pub fn path(&self) -> &str {
        &self.path
    }

    pub fn original_path(&self) -> &Path {
        &self.original_path
    }

    pub fn translation_path(&self) -> &Path {
        &self.translation_path
    }

    pub fn is_rules_table(&self) -> bool {
        self.file_name == RULES_FILE_NAME
    }

    /// Number of original rows after the header, blank and comment rows included.
    pub fn row_count(&self) -> usize {
        self.original.rows.len()
    }

    fn row_context(&self, position: usize) -> String {
        let row = &self.original.rows[position];
        let mut data: IndexMap<&str, &str> = IndexMap::new();
        for (i, name) in self.original.header.iter().enumerate() {
            if name.is_empty() || data.contains_key(name.as_str()) {
                continue;
            }
            data.insert(name, row.get(i).map(String::as_str).unwrap_or(""));
        }
        let snapshot = serde_json::to_string_pretty(&data).unwrap_or_default();
        format!(
            "{}{} row {:04}\n[Row data]\n{snapshot}",
            self.context_header,
            self.file_name,
            position + 1
        )
    }

    pub fn get_strings(&self) -> Vec<TranslationEntry> {
        let mut entries = Vec::new();

        for (id, &position) in &self.original.index {
            let context = self.row_context(position);
            let has_translation = self.translation_loaded && self.translation.index.contains_key(id);

            for column in &self.text_columns {
                let original = self.original.cell(id, column).unwrap_or("").to_string();
                let mut translation = String::new();
                let mut stage = Stage::Untranslated;
                if has_translation {
                    translation = self.translation.cell(id, column).unwrap_or("").to_string();
                    stage = Stage::Translated;
                }

                if self.is_rules_table() && column == SCRIPT_COLUMN && !original.contains('"') {
                    stage = Stage::Translated;
                } else if !contains_latin_letters(&original) {
                    stage = Stage::Translated;
                } else if !contains_cjk(&translation) {
                    translation.clear();
                    stage = Stage::Untranslated;
                }

                let key = format!("{}#{id}${column}", self.file_name);
                entries.push(TranslationEntry::new(
                    key,
                    original,
                    translation,
                    stage,
                    context.clone(),
                ));
            }
        }

        entries
    }

    /// Merge entries into the translated cells, matched by identifier and column.
    pub fn update_strings<'a>(
        &mut self,
        entries: impl IntoIterator<Item = &'a TranslationEntry>,
    ) -> UpdateSummary {
        let mut summary = UpdateSummary::default();

        for entry in entries {
            let Some((id, column)) = parse_key(&entry.key) else {
                log::warn!("{}: cannot parse key {}", self.path, entry.key);
                summary.unmatched += 1;
                continue;
            };

            let Some(original) = self.original.cell(id, column).map(str::to_string) else {
                log::warn!(
                    "{}: no row with {}=\"{id}\" and column \"{column}\", not updated; the original row may have been removed",
                    self.path,
                    self.id_columns
                );
                summary.unmatched += 1;
                continue;
            };
            let remove_orphans = self.remove_translation_when_original_empty;
            let path = self.path.clone();
            let Some(cell) = self.translation.cell_mut(id, column) else {
                log::warn!(
                    "{path}: translated copy has no row with {}=\"{id}\", not updated",
                    self.id_columns
                );
                summary.unmatched += 1;
                continue;
            };

            if entry.stage.is_translated() && !entry.translation.is_empty() {
                if original.is_empty() {
                    log::warn!(
                        "{path}: \"{column}\" of row \"{id}\" has an empty original but a translation; the original may have been removed"
                    );
                    if remove_orphans && !cell.is_empty() {
                        cell.clear();
                        summary.updated += 1;
                    } else {
                        summary.skipped += 1;
                    }
                } else if *cell != entry.translation {
                    *cell = entry.translation.clone();
                    summary.updated += 1;
                }
            } else if contains_cjk(cell) {
                log::warn!(
                    "{path}: \"{column}\" of row \"{id}\" is translated but the entry is not, keeping the existing translation"
                );
                summary.skipped += 1;
            }
        }

        summary
    }

    /// Run the rules checks over every translated row of the output copy.
    fn validate_rules(&self, rows: &mut [Vec<String>]) {
        let header = &self.translation.header;
        let mut columns: Vec<&str> = self.text_columns.iter().map(String::as_str).collect();
        if !columns.contains(&SCRIPT_COLUMN) && self.translation.column(SCRIPT_COLUMN).is_some() {
            columns.push(SCRIPT_COLUMN);
        }
        let positions: Vec<Option<usize>> =
            columns.iter().map(|c| header.iter().position(|h| h == c)).collect();

        let mut checked = 0;
        let mut flagged = 0;
        for (id, &position) in &self.translation.index {
            let mut slots = Vec::new();
            let mut cells = Vec::new();
            for (column, pos) in columns.iter().zip(&positions) {
                let Some(pos) = *pos else { continue };
                let Some(translation) = rows[position].get(pos) else { continue };
                let Some(original) = self.original.cell(id, column) else { continue };
                slots.push(pos);
                cells.push(RuleCell::new(*column, original, translation.as_str()));
            }

            let violations = validate_row(&mut cells);
            checked += 1;
            if violations.is_empty() {
                continue;
            }
            flagged += 1;
            for violation in &violations {
                log::warn!("{} row \"{id}\": {violation}", self.path);
            }

            for (cell, pos) in cells.into_iter().zip(slots) {
                rows[position][pos] = cell.translation;
            }
        }

        log::info!("Checked {checked} rows of {}, {flagged} with problems", self.path);
    }

    fn render(&self) -> TableResult<Vec<u8>> {
        let mut rows = self.translation.rows.clone();
        if self.is_rules_table() {
            self.validate_rules(&mut rows);
        }

        let mut records = Vec::with_capacity(rows.len() + 1);
        records.push(self.translation.header.clone());
        records.extend(rows);
        for cell in records.iter_mut().flatten() {
            if cell.contains(ESCAPED_NEWLINE_SENTINEL) || cell.contains('\n') {
                // cell breaks stay CRLF whatever the file's row terminator
                *cell = normalize_newlines(
                    &cell.replace(ESCAPED_NEWLINE_SENTINEL, "\\n"),
                    Newline::Crlf,
                );
            }
        }

        let metadata = &self.translation.metadata;
        let text = write_records(&records, metadata.newline).map_err(|source| TableError::Write {
            path: self.translation_path.display().to_string(),
            source,
        })?;
        Ok(metadata.encode(&text))
    }

    /// Write the translated table back. Returns false when the file on disk
    /// already holds the same bytes.
    pub fn save_file(&self) -> TableResult<bool> {
        let contents = self.render()?;
        if let Ok(existing) = std::fs::read(&self.translation_path) {
            if existing == contents {
                log::debug!("{} unchanged, not rewritten", self.path);
                return Ok(false);
            }
        }

        backup_and_swap(&self.translation_path, &contents, self.keep_backups).map_err(|source| {
            TableError::Backup {
                path: self.translation_path.display().to_string(),
                source,
            }
        })?;
        log::info!("Wrote {}", self.translation_path.display());
        Ok(true)
    }
}

/// Split `<file>#<id>$<column>` into identifier and column.
fn parse_key(key: &str) -> Option<(&str, &str)> {
    let (_, rest) = key.split_once('#')?;
    rest.rsplit_once('$')
}
