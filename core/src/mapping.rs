//! Mapping configuration: which tables and which classes inside which JARs
//! carry translatable text.

use std::collections::{BTreeMap, BTreeSet};
use std::fs;
use std::io;
use std::path::Path;

use serde::{Deserialize, Serialize};

#[derive(Debug, thiserror::Error)]
pub enum MappingError {
    #[error("IO error on mapping file {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: io::Error,
    },

    #[error("Invalid mapping file: {0}")]
    Json(#[from] serde_json::Error),
}

/// Row identifier: one column, or a tuple of columns.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum IdColumns {
    Single(String),
    Composite(Vec<String>),
}

impl IdColumns {
    pub fn names(&self) -> Vec<&str> {
        match self {
            IdColumns::Single(name) => vec![name.as_str()],
            IdColumns::Composite(names) => names.iter().map(String::as_str).collect(),
        }
    }
}

impl std::fmt::Display for IdColumns {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            IdColumns::Single(name) => write!(f, "{name}"),
            IdColumns::Composite(names) => write!(f, "{}", names.join("+")),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CsvMapItem {
    pub path: String,
    pub id_column_name: IdColumns,
    pub text_column_names: Vec<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClassFileMapItem {
    pub path: String,
    #[serde(default)]
    pub include_strings: BTreeSet<String>,
    #[serde(default)]
    pub exclude_strings: BTreeSet<String>,
}

impl ClassFileMapItem {
    pub fn new(path: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            ..Self::default()
        }
    }

    /// Filter strings containing `pattern`; an excluded string is reported
    /// only as excluded.
    pub fn search_for_string(&self, pattern: &str) -> (Vec<String>, Vec<String>) {
        let excluded: Vec<String> = self
            .exclude_strings
            .iter()
            .filter(|s| s.contains(pattern))
            .cloned()
            .collect();
        let included = self
            .include_strings
            .iter()
            .filter(|s| s.contains(pattern) && !self.exclude_strings.contains(*s))
            .cloned()
            .collect();
        (included, excluded)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JarMapItem {
    pub path: String,
    pub class_files: Vec<ClassFileMapItem>,
}

impl JarMapItem {
    pub fn class_file(&self, path: &str) -> Option<&ClassFileMapItem> {
        self.class_files.iter().find(|c| c.path == path)
    }

    /// Find a class descriptor, appending an empty one when absent.
    pub fn class_file_or_insert(&mut self, path: &str) -> &mut ClassFileMapItem {
        let index = match self.class_files.iter().position(|c| c.path == path) {
            Some(index) => index,
            None => {
                self.class_files.push(ClassFileMapItem::new(path));
                self.class_files.len() - 1
            }
        };
        &mut self.class_files[index]
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum MappingItem {
    Csv(CsvMapItem),
    Jar(JarMapItem),
}

impl MappingItem {
    pub fn path(&self) -> &str {
        match self {
            MappingItem::Csv(item) => &item.path,
            MappingItem::Jar(item) => &item.path,
        }
    }
}

/// Class accepted during version migration that the mapping should learn.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClassMappingChange {
    pub jar_path: String,
    pub class_path: String,
    pub include_strings: BTreeSet<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct MappingConfig {
    pub items: Vec<MappingItem>,
}

impl MappingConfig {
    pub fn load(path: &Path) -> Result<Self, MappingError> {
        let content = fs::read_to_string(path).map_err(|source| MappingError::Io {
            path: path.display().to_string(),
            source,
        })?;
        Ok(serde_json::from_str(&content)?)
    }

    pub fn save(&self, path: &Path) -> Result<(), MappingError> {
        let content = serde_json::to_string_pretty(self)?;
        fs::write(path, content).map_err(|source| MappingError::Io {
            path: path.display().to_string(),
            source,
        })
    }

    pub fn item_by_path(&self, path: &str) -> Option<&MappingItem> {
        self.items.iter().find(|item| item.path() == path)
    }

    pub fn csv_items(&self) -> impl Iterator<Item = &CsvMapItem> {
        self.items.iter().filter_map(|item| match item {
            MappingItem::Csv(csv) => Some(csv),
            MappingItem::Jar(_) => None,
        })
    }

    pub fn jar_items(&self) -> impl Iterator<Item = &JarMapItem> {
        self.items.iter().filter_map(|item| match item {
            MappingItem::Jar(jar) => Some(jar),
            MappingItem::Csv(_) => None,
        })
    }

    pub fn jar(&self, path: &str) -> Option<&JarMapItem> {
        self.jar_items().find(|jar| jar.path == path)
    }

    fn jar_mut(&mut self, path: &str) -> Option<&mut JarMapItem> {
        self.items.iter_mut().find_map(|item| match item {
            MappingItem::Jar(jar) if jar.path == path => Some(jar),
            _ => None,
        })
    }

    pub fn jar_and_class_by_class_path(
        &self,
        class_path: &str,
    ) -> Option<(&JarMapItem, &ClassFileMapItem)> {
        self.jar_items()
            .find_map(|jar| jar.class_file(class_path).map(|class| (jar, class)))
    }

    /// Merge duplicate class descriptors inside every JAR and sort them by path.
    ///
    /// Returns how many duplicates were folded away.
    pub fn dedup_and_sort(&mut self) -> usize {
        let mut merged = 0;
        for item in self.items.iter_mut() {
            let MappingItem::Jar(jar) = item else {
                continue;
            };
            let mut seen: BTreeMap<String, ClassFileMapItem> = BTreeMap::new();
            for class in jar.class_files.drain(..) {
                match seen.get_mut(&class.path) {
                    Some(existing) => {
                        existing.include_strings.extend(class.include_strings);
                        existing.exclude_strings.extend(class.exclude_strings);
                        merged += 1;
                    }
                    None => {
                        seen.insert(class.path.clone(), class);
                    }
                }
            }
            jar.class_files = seen.into_values().collect();
        }
        merged
    }

    /// Fold migration results into the canonical mapping.
    ///
    /// Returns the number of changes applied; changes for unknown JARs are
    /// logged and dropped.
    pub fn apply_class_includes(&mut self, changes: &[ClassMappingChange]) -> usize {
        let mut applied = 0;
        for change in changes {
            let Some(jar) = self.jar_mut(&change.jar_path) else {
                log::warn!(
                    "Mapping has no jar {}, dropping class {}",
                    change.jar_path,
                    change.class_path
                );
                continue;
            };
            let class = jar.class_file_or_insert(&change.class_path);
            class
                .include_strings
                .extend(change.include_strings.iter().cloned());
            applied += 1;
        }
        applied
    }
}
