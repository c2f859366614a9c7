//! Find which classes carry a literal, in the mapping and in the JARs.

use std::cmp::Ordering;
use std::collections::BTreeSet;
use std::fmt;
use std::hash::{Hash, Hasher};

use crate::jar::ArchiveEntry;
use crate::mapping::JarMapItem;
use crate::sync::Project;

/// One literal found in one class. Identity is `(jar, class, string)`; the
/// flags only describe where it was found first.
#[derive(Debug, Clone)]
pub struct StringSearchResult {
    pub jar_path: String,
    pub class_path: String,
    pub string: String,
    pub in_mapping: bool,
    pub excluded: bool,
}

impl StringSearchResult {
    fn identity(&self) -> (&str, &str, &str) {
        (
            self.jar_path.as_str(),
            self.class_path.as_str(),
            self.string.as_str(),
        )
    }
}

impl PartialEq for StringSearchResult {
    fn eq(&self, other: &Self) -> bool {
        self.identity() == other.identity()
    }
}

impl Eq for StringSearchResult {}

impl Hash for StringSearchResult {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.identity().hash(state);
    }
}

impl PartialOrd for StringSearchResult {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for StringSearchResult {
    fn cmp(&self, other: &Self) -> Ordering {
        self.identity().cmp(&other.identity())
    }
}

impl fmt::Display for StringSearchResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mark = if self.excluded {
            " [excluded]"
        } else if self.in_mapping {
            " [mapped]"
        } else {
            ""
        };
        write!(
            f,
            "<{}:{}>\n\t\"{}\"{mark}",
            self.jar_path, self.class_path, self.string
        )
    }
}

/// Search the mapping's include/exclude lists, then every literal of every
/// class in every configured JAR. Results are sorted and de-duplicated.
pub fn search_strings(project: &Project, pattern: &str) -> Vec<StringSearchResult> {
    let mut results = BTreeSet::new();

    log::info!("Searching the mapping for \"{pattern}\"");
    for jar in project.mapping.jar_items() {
        for class in &jar.class_files {
            let (included, excluded) = class.search_for_string(pattern);
            for (string, excluded) in included
                .into_iter()
                .map(|s| (s, false))
                .chain(excluded.into_iter().map(|s| (s, true)))
            {
                results.insert(StringSearchResult {
                    jar_path: jar.path.clone(),
                    class_path: class.path.clone(),
                    string,
                    in_mapping: true,
                    excluded,
                });
            }
        }
    }

    log::info!("Searching every class file for \"{pattern}\", this can take a while");
    for jar in project.mapping.jar_items() {
        let probe = JarMapItem {
            path: jar.path.clone(),
            class_files: Vec::new(),
        };
        let mut archive = match ArchiveEntry::load(&probe, &project.config) {
            Ok(archive) => archive,
            Err(err) => {
                log::warn!("Cannot search {}: {err}", jar.path);
                continue;
            }
        };
        if let Err(err) = archive.load_all_classes() {
            log::warn!("Cannot search {}: {err}", jar.path);
            continue;
        }

        for class in archive.classes() {
            for string in class.all_literals() {
                if !string.contains(pattern) {
                    continue;
                }
                // a mapping hit keeps its flags
                results.insert(StringSearchResult {
                    jar_path: jar.path.clone(),
                    class_path: class.path().to_string(),
                    string,
                    in_mapping: false,
                    excluded: false,
                });
            }
        }
    }

    log::info!("Found {} results", results.len());
    results.into_iter().collect()
}
