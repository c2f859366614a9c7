pub mod backup;
pub mod config;
pub mod encoding;
pub mod entry;
pub mod jar;
pub mod mapping;
pub mod mapping_generation;
pub mod search;
pub mod sync;
pub mod table;
pub mod text;

pub use config::{ConfigError, LoaderKind, ToolkitConfig};
pub use entry::{read_entries, write_entries, Stage, TranslationEntry, UpdateSummary};
pub use jar::{ArchiveEntry, ArchiveError, ClassEntry, ConstantPool};
pub use mapping::{
    ClassFileMapItem, ClassMappingChange, CsvMapItem, IdColumns, JarMapItem, MappingConfig,
    MappingItem,
};
pub use mapping_generation::{generate_class_mapping, GeneratedClassMapping, StringStatus};
pub use search::{search_strings, StringSearchResult};
pub use sync::{DataFile, Project, SyncError, SyncReport};
pub use table::{RuleViolation, TableEntry, TableError};
