//! Java archives: class-file constant pools and the JARs that carry them.

pub mod archive;
pub mod class_file;
pub mod constant_pool;
pub mod fuzzy;
pub mod key;
pub mod mutf8;

pub use archive::{ArchiveEntry, ArchiveError, ArchiveUpdate};
pub use class_file::{ClassEntry, ClassFileError, ClassOptions, ClassSide};
pub use constant_pool::{Constant, ConstantPool, ConstantPoolError, Utf8Constant};
pub use fuzzy::normalize_class_path;
