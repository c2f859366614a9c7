//! Build a mapping descriptor for one class by reading it out of its JAR.

use std::collections::BTreeSet;

use crate::jar::ArchiveEntry;
use crate::mapping::{ClassFileMapItem, JarMapItem};
use crate::sync::Project;

#[derive(Debug, thiserror::Error)]
pub enum MappingGenerationError {
    #[error("Mapping has no jar {0}")]
    UnknownJar(String),

    #[error("Class {0} was not found in any configured jar")]
    ClassNotFound(String),
}

/// How a literal of the generated descriptor relates to the existing one.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StringStatus {
    Included,
    Excluded,
    New,
}

#[derive(Debug, Clone)]
pub struct GeneratedClassMapping {
    pub jar_path: String,
    /// Descriptor listing every literal of the class.
    pub generated: ClassFileMapItem,
    /// Descriptor already in the mapping, if any.
    pub existing: Option<ClassFileMapItem>,
    /// Literals that are also class or member names and cannot be written back.
    pub shared_strings: BTreeSet<String>,
}

impl GeneratedClassMapping {
    /// Every generated literal with its status against the existing descriptor
    /// and whether it is shared, sorted by literal.
    pub fn comparison(&self) -> Vec<(String, StringStatus, bool)> {
        self.generated
            .include_strings
            .iter()
            .map(|s| {
                let status = match &self.existing {
                    Some(existing) if existing.exclude_strings.contains(s) => StringStatus::Excluded,
                    Some(existing) if existing.include_strings.contains(s) => StringStatus::Included,
                    _ => StringStatus::New,
                };
                (s.clone(), status, self.shared_strings.contains(s))
            })
            .collect()
    }
}

/// Turn `com.example.Foo`, `com/example/Foo` or `com/example/Foo.class`
/// into the archive member name.
pub fn class_member_path(raw: &str) -> String {
    let trimmed = raw.trim();
    let stem = trimmed.strip_suffix(".class").unwrap_or(trimmed);
    format!("{}.class", stem.replace('.', "/"))
}

/// Generate a descriptor for `target`, written `jar:class` or just `class`.
///
/// Without a jar, the JAR already mapping the class is used, or else every
/// configured JAR is probed in order. Probes work on copies; the project's
/// mapping is never modified.
pub fn generate_class_mapping(
    project: &Project,
    target: &str,
) -> Result<GeneratedClassMapping, MappingGenerationError> {
    let (jar_path, raw_class) = match target.rsplit_once(':') {
        Some((jar, class)) => (Some(jar.trim()), class),
        None => (None, target),
    };
    let class_path = class_member_path(raw_class);

    let (candidates, existing): (Vec<&JarMapItem>, Option<ClassFileMapItem>) = match jar_path {
        Some(jar_path) => {
            let jar = project
                .mapping
                .jar(jar_path)
                .ok_or_else(|| MappingGenerationError::UnknownJar(jar_path.to_string()))?;
            (vec![jar], jar.class_file(&class_path).cloned())
        }
        None => match project.mapping.jar_and_class_by_class_path(&class_path) {
            Some((jar, class)) => (vec![jar], Some(class.clone())),
            None => (project.mapping.jar_items().collect(), None),
        },
    };

    for jar in candidates {
        let probe = JarMapItem {
            path: jar.path.clone(),
            class_files: vec![ClassFileMapItem::new(class_path.clone())],
        };
        let archive = match ArchiveEntry::load(&probe, &project.config) {
            Ok(archive) => archive,
            Err(err) => {
                log::debug!("Skipping {}: {err}", jar.path);
                continue;
            }
        };
        let Some(class) = archive.class(&class_path) else {
            continue;
        };

        log::info!("Found {class_path} in {}", jar.path);
        return Ok(GeneratedClassMapping {
            jar_path: jar.path.clone(),
            generated: class.export_map_item(),
            existing,
            shared_strings: class.shared_strings(),
        });
    }

    Err(MappingGenerationError::ClassNotFound(class_path))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn member_path_accepts_dots_and_suffix() {
        assert_eq!(class_member_path("com.fs.Foo"), "com/fs/Foo.class");
        assert_eq!(class_member_path("com/fs/Foo"), "com/fs/Foo.class");
        assert_eq!(class_member_path(" com/fs/Foo.class "), "com/fs/Foo.class");
        assert_eq!(class_member_path("com.fs.Foo$Inner.class"), "com/fs/Foo$Inner.class");
    }

    #[test]
    fn comparison_reports_status_against_existing() {
        let mut generated = ClassFileMapItem::new("p/A.class");
        generated.include_strings = BTreeSet::from(["a".to_string(), "b".to_string(), "c".to_string()]);
        let mut existing = ClassFileMapItem::new("p/A.class");
        existing.include_strings = BTreeSet::from(["a".to_string()]);
        existing.exclude_strings = BTreeSet::from(["b".to_string()]);

        let mapping = GeneratedClassMapping {
            jar_path: "x.jar".to_string(),
            generated,
            existing: Some(existing),
            shared_strings: BTreeSet::from(["c".to_string()]),
        };
        assert_eq!(
            mapping.comparison(),
            vec![
                ("a".to_string(), StringStatus::Included, false),
                ("b".to_string(), StringStatus::Excluded, false),
                ("c".to_string(), StringStatus::New, true),
            ]
        );
    }
}
