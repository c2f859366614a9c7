//! Minimal constant-pool reader/writer.
//!
//! Only the constants needed to find string literals are decoded; every
//! other kind is carried as an opaque blob so the pool re-serializes
//! byte-for-byte.

use std::collections::BTreeSet;

use super::mutf8;

/// Offset of `constant_pool_count` in a class file (magic + minor + major).
pub const CONSTANT_POOL_OFFSET: usize = 8;

/// Constant pool tags.
pub mod cp_tag {
    pub const UTF8: u8 = 1;
    pub const INTEGER: u8 = 3;
    pub const FLOAT: u8 = 4;
    pub const LONG: u8 = 5;
    pub const DOUBLE: u8 = 6;
    pub const CLASS: u8 = 7;
    pub const STRING: u8 = 8;
    pub const FIELDREF: u8 = 9;
    pub const METHODREF: u8 = 10;
    pub const INTERFACE_METHODREF: u8 = 11;
    pub const NAME_AND_TYPE: u8 = 12;
    pub const METHOD_HANDLE: u8 = 15;
    pub const METHOD_TYPE: u8 = 16;
    pub const DYNAMIC: u8 = 17;
    pub const INVOKE_DYNAMIC: u8 = 18;
    pub const MODULE: u8 = 19;
    pub const PACKAGE: u8 = 20;
}

/// Encoded size of a fixed-length constant, tag byte included.
fn fixed_length(tag: u8) -> Option<usize> {
    use cp_tag::*;
    match tag {
        CLASS | STRING | METHOD_TYPE | MODULE | PACKAGE => Some(3),
        METHOD_HANDLE => Some(4),
        INTEGER | FLOAT | FIELDREF | METHODREF | INTERFACE_METHODREF | NAME_AND_TYPE
        | DYNAMIC | INVOKE_DYNAMIC => Some(5),
        LONG | DOUBLE => Some(9),
        _ => None,
    }
}

#[derive(Debug, Clone, thiserror::Error, PartialEq, Eq)]
pub enum ConstantPoolError {
    #[error("Unknown constant tag {tag} for constant #{index} at byte {offset}")]
    UnknownTag { tag: u8, index: u16, offset: usize },

    #[error("Constant pool truncated at byte {offset} (need {needed} more bytes)")]
    Truncated { offset: usize, needed: usize },

    #[error("Constant at byte {offset} runs past the last pool index")]
    IndexOverflow { offset: usize },

    #[error("Utf8 constant #{index} would be {len} bytes, the limit is {max}", max = MAX_UTF8_LEN)]
    Utf8TooLong { index: u16, len: usize },
}

/// Largest encoded length a Utf8 constant can declare.
pub const MAX_UTF8_LEN: usize = u16::MAX as usize;

/// A `CONSTANT_Utf8_info` entry. Keeps its raw bytes so untouched constants
/// are never re-encoded.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Utf8Constant {
    index: u16,
    bytes: Vec<u8>,
}

impl Utf8Constant {
    pub fn index(&self) -> u16 {
        self.index
    }

    pub fn raw(&self) -> &[u8] {
        &self.bytes
    }

    pub fn text(&self) -> String {
        mutf8::decode(&self.bytes)
    }

    /// Replace the text. Text that does not fit a Utf8 constant is refused
    /// and the constant keeps its current bytes.
    pub fn set_text(&mut self, text: &str) -> Result<(), ConstantPoolError> {
        let bytes = mutf8::encode(text);
        if bytes.len() > MAX_UTF8_LEN {
            return Err(ConstantPoolError::Utf8TooLong {
                index: self.index,
                len: bytes.len(),
            });
        }
        self.bytes = bytes;
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Constant {
    Utf8(Utf8Constant),
    String { string_index: u16 },
    Class { name_index: u16 },
    NameAndType { name_index: u16, descriptor_index: u16 },
    /// Any other kind, stored with its tag byte.
    Opaque(Vec<u8>),
    /// Unusable second slot of a Long or Double.
    Placeholder,
}

impl Constant {
    fn write_to(&self, out: &mut Vec<u8>) -> Result<(), ConstantPoolError> {
        match self {
            Constant::Utf8(utf8) => {
                let len = u16::try_from(utf8.bytes.len()).map_err(|_| {
                    ConstantPoolError::Utf8TooLong {
                        index: utf8.index,
                        len: utf8.bytes.len(),
                    }
                })?;
                out.push(cp_tag::UTF8);
                out.extend_from_slice(&len.to_be_bytes());
                out.extend_from_slice(&utf8.bytes);
            }
            Constant::String { string_index } => {
                out.push(cp_tag::STRING);
                out.extend_from_slice(&string_index.to_be_bytes());
            }
            Constant::Class { name_index } => {
                out.push(cp_tag::CLASS);
                out.extend_from_slice(&name_index.to_be_bytes());
            }
            Constant::NameAndType {
                name_index,
                descriptor_index,
            } => {
                out.push(cp_tag::NAME_AND_TYPE);
                out.extend_from_slice(&name_index.to_be_bytes());
                out.extend_from_slice(&descriptor_index.to_be_bytes());
            }
            Constant::Opaque(bytes) => out.extend_from_slice(bytes),
            Constant::Placeholder => {}
        }
        Ok(())
    }
}

struct Reader<'a> {
    data: &'a [u8],
    offset: usize,
}

impl<'a> Reader<'a> {
    fn take(&mut self, len: usize) -> Result<&'a [u8], ConstantPoolError> {
        let end = self.offset + len;
        if end > self.data.len() {
            return Err(ConstantPoolError::Truncated {
                offset: self.offset,
                needed: end - self.data.len(),
            });
        }
        let slice = &self.data[self.offset..end];
        self.offset = end;
        Ok(slice)
    }

    fn u16_at(slice: &[u8], at: usize) -> u16 {
        u16::from_be_bytes([slice[at], slice[at + 1]])
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConstantPool {
    count: u16,
    constants: Vec<Constant>,
    end_offset: usize,
    string_refs: BTreeSet<u16>,
    structural_refs: BTreeSet<u16>,
}

impl ConstantPool {
    /// Parse the pool of a whole class file buffer.
    pub fn parse(class_bytes: &[u8]) -> Result<Self, ConstantPoolError> {
        let mut reader = Reader {
            data: class_bytes,
            offset: CONSTANT_POOL_OFFSET,
        };
        let count = Reader::u16_at(reader.take(2)?, 0);

        let mut constants = Vec::with_capacity(count as usize);
        let mut string_refs = BTreeSet::new();
        let mut structural_refs = BTreeSet::new();
        let mut index: u16 = 1;

        while index < count {
            let offset = reader.offset;
            let tag = reader.take(1)?[0];

            let constant = match tag {
                cp_tag::UTF8 => {
                    let len = Reader::u16_at(reader.take(2)?, 0) as usize;
                    Constant::Utf8(Utf8Constant {
                        index,
                        bytes: reader.take(len)?.to_vec(),
                    })
                }
                cp_tag::STRING => {
                    let string_index = Reader::u16_at(reader.take(2)?, 0);
                    string_refs.insert(string_index);
                    Constant::String { string_index }
                }
                cp_tag::CLASS => {
                    let name_index = Reader::u16_at(reader.take(2)?, 0);
                    structural_refs.insert(name_index);
                    Constant::Class { name_index }
                }
                cp_tag::NAME_AND_TYPE => {
                    let body = reader.take(4)?;
                    let name_index = Reader::u16_at(body, 0);
                    let descriptor_index = Reader::u16_at(body, 2);
                    structural_refs.insert(name_index);
                    structural_refs.insert(descriptor_index);
                    Constant::NameAndType {
                        name_index,
                        descriptor_index,
                    }
                }
                other => {
                    let len = fixed_length(other).ok_or(ConstantPoolError::UnknownTag {
                        tag: other,
                        index,
                        offset,
                    })?;
                    let body = reader.take(len - 1)?;
                    let mut bytes = Vec::with_capacity(len);
                    bytes.push(other);
                    bytes.extend_from_slice(body);
                    Constant::Opaque(bytes)
                }
            };
            constants.push(constant);
            let overflow = ConstantPoolError::IndexOverflow { offset };
            index = index.checked_add(1).ok_or(overflow.clone())?;

            if tag == cp_tag::LONG || tag == cp_tag::DOUBLE {
                constants.push(Constant::Placeholder);
                index = index.checked_add(1).ok_or(overflow)?;
            }
        }

        Ok(Self {
            count,
            constants,
            end_offset: reader.offset,
            string_refs,
            structural_refs,
        })
    }

    /// Byte offset in the class file where the pool ends.
    pub fn end_offset(&self) -> usize {
        self.end_offset
    }

    pub fn count(&self) -> u16 {
        self.count
    }

    pub fn get(&self, index: u16) -> Option<&Constant> {
        index
            .checked_sub(1)
            .and_then(|i| self.constants.get(i as usize))
    }

    pub fn utf8(&self, index: u16) -> Option<&Utf8Constant> {
        match self.get(index) {
            Some(Constant::Utf8(utf8)) => Some(utf8),
            _ => None,
        }
    }

    pub fn utf8_mut(&mut self, index: u16) -> Option<&mut Utf8Constant> {
        let slot = index.checked_sub(1)?;
        match self.constants.get_mut(slot as usize) {
            Some(Constant::Utf8(utf8)) => Some(utf8),
            _ => None,
        }
    }

    /// Utf8 constants referenced by a String constant, in pool order.
    pub fn string_referenced(&self) -> Vec<&Utf8Constant> {
        self.string_refs
            .iter()
            .filter_map(|&index| self.utf8(index))
            .collect()
    }

    /// Whether a Class or NameAndType constant points at `index`.
    pub fn is_structurally_referenced(&self, index: u16) -> bool {
        self.structural_refs.contains(&index)
    }

    pub fn is_string_referenced(&self, index: u16) -> bool {
        self.string_refs.contains(&index)
    }

    /// Utf8 constants that are both string literals and class metadata.
    pub fn shared(&self) -> Vec<&Utf8Constant> {
        self.string_refs
            .intersection(&self.structural_refs)
            .filter_map(|&index| self.utf8(index))
            .collect()
    }

    /// Serialize count followed by every constant in order.
    pub fn to_bytes(&self) -> Result<Vec<u8>, ConstantPoolError> {
        let mut out = Vec::with_capacity(self.end_offset.saturating_sub(CONSTANT_POOL_OFFSET));
        out.extend_from_slice(&self.count.to_be_bytes());
        for constant in &self.constants {
            constant.write_to(&mut out)?;
        }
        Ok(out)
    }
}


#[cfg(test)]
mod tests {
    use super::test_support::{class_bytes, Entry, MAJOR_JAVA_8};
    use super::*;

    fn sample() -> Vec<u8> {
        class_bytes(
            MAJOR_JAVA_8,
            &[
                Entry::Utf8("com/game/Weapon"), // 1
                Entry::Class(1),                // 2
                Entry::Utf8("Fire"),            // 3
                Entry::String(3),               // 4
                Entry::Long(42),                // 5, 6
                Entry::Utf8("label"),           // 7
                Entry::String(7),               // 8
                Entry::Utf8("()V"),             // 9
                Entry::NameAndType(7, 9),       // 10
                Entry::Methodref(2, 10),        // 11
                Entry::Integer(-1),             // 12
            ],
        )
    }

    #[test]
    fn unmodified_pool_is_byte_identical() {
        let data = sample();
        let pool = ConstantPool::parse(&data).unwrap();
        let serialized = pool.to_bytes().unwrap();
        assert_eq!(&data[CONSTANT_POOL_OFFSET..pool.end_offset()], &serialized[..]);
        assert_eq!(pool.end_offset(), data.len() - 14);
    }

    #[test]
    fn long_takes_two_slots() {
        let pool = ConstantPool::parse(&sample()).unwrap();
        assert_eq!(pool.count(), 13);
        assert_eq!(pool.get(6), Some(&Constant::Placeholder));
        assert_eq!(pool.utf8(7).unwrap().text(), "label");
        assert!(pool.get(0).is_none());
    }

    #[test]
    fn tracks_reference_sets() {
        let pool = ConstantPool::parse(&sample()).unwrap();
        let literals: Vec<u16> = pool.string_referenced().iter().map(|c| c.index()).collect();
        assert_eq!(literals, vec![3, 7]);
        assert!(pool.is_structurally_referenced(1));
        assert!(pool.is_structurally_referenced(7));
        assert!(!pool.is_structurally_referenced(3));

        let shared: Vec<String> = pool.shared().iter().map(|c| c.text()).collect();
        assert_eq!(shared, vec!["label".to_string()]);
    }

    #[test]
    fn edited_utf8_recomputes_byte_length() {
        let data = sample();
        let mut pool = ConstantPool::parse(&data).unwrap();
        pool.utf8_mut(3).unwrap().set_text("开火").unwrap();

        let bytes = pool.to_bytes().unwrap();
        // "Fire" (4 bytes) became 6 bytes
        assert_eq!(bytes.len(), pool.end_offset() - CONSTANT_POOL_OFFSET + 2);

        let mut rebuilt = data[..CONSTANT_POOL_OFFSET].to_vec();
        rebuilt.extend_from_slice(&bytes);
        let reparsed = ConstantPool::parse(&rebuilt).unwrap();
        assert_eq!(reparsed.utf8(3).unwrap().text(), "开火");
        assert_eq!(reparsed.utf8(1).unwrap().raw(), b"com/game/Weapon");
    }

    #[test]
    fn unknown_tag_is_fatal() {
        let mut data = sample();
        // first constant's tag
        data[10] = 2;
        let err = ConstantPool::parse(&data).unwrap_err();
        assert_eq!(
            err,
            ConstantPoolError::UnknownTag {
                tag: 2,
                index: 1,
                offset: 10
            }
        );
    }

    #[test]
    fn oversized_text_is_refused() {
        let mut pool = ConstantPool::parse(&sample()).unwrap();
        let err = pool
            .utf8_mut(3)
            .unwrap()
            .set_text(&"é".repeat(40_000))
            .unwrap_err();
        assert_eq!(err, ConstantPoolError::Utf8TooLong { index: 3, len: 80_000 });
        assert_eq!(pool.utf8(3).unwrap().text(), "Fire");

        // exactly at the limit still fits
        let at_limit = "a".repeat(MAX_UTF8_LEN);
        pool.utf8_mut(3).unwrap().set_text(&at_limit).unwrap();
        assert!(pool.to_bytes().is_ok());
    }

    #[test]
    fn oversized_constant_is_not_serialized() {
        let mut pool = ConstantPool::parse(&sample()).unwrap();
        pool.utf8_mut(3).unwrap().bytes = vec![b'a'; MAX_UTF8_LEN + 1];
        assert_eq!(
            pool.to_bytes().unwrap_err(),
            ConstantPoolError::Utf8TooLong {
                index: 3,
                len: MAX_UTF8_LEN + 1
            }
        );
    }

    #[test]
    fn wide_constant_in_last_slot_is_an_error() {
        // an Integer at #1, then Longs at #2, #4, ... #65534
        let mut data = vec![0xCA, 0xFE, 0xBA, 0xBE, 0, 0, 0, 52, 0xFF, 0xFF];
        data.extend_from_slice(&[cp_tag::INTEGER, 0, 0, 0, 1]);
        for _ in 0..32_767 {
            data.push(cp_tag::LONG);
            data.extend_from_slice(&[0; 8]);
        }
        let last_long = data.len() - 9;

        let err = ConstantPool::parse(&data).unwrap_err();
        assert_eq!(err, ConstantPoolError::IndexOverflow { offset: last_long });
    }

    #[test]
    fn truncated_pool_is_fatal() {
        let data = sample();
        let err = ConstantPool::parse(&data[..20]).unwrap_err();
        assert!(matches!(err, ConstantPoolError::Truncated { .. }));
    }
}
