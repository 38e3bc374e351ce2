//! Field tables: the typed key/value maps carried in method arguments and
//! message headers.
//!
//! Wire form is a long byte length followed by entries of
//! `short-string name | type tag | value`. Entries are kept in a `BTreeMap`
//! so encoding is deterministic and two tables compare by content.

use crate::buffer::{long_string_size, short_string_size, ByteCursor};
use crate::constants::MAX_TABLE_DEPTH;
use crate::error::{ProtocolError, ProtocolResult};
use std::collections::BTreeMap;

const TAG_LONG_STRING: u8 = b'S';
const TAG_INT: u8 = b'I';
const TAG_LONG: u8 = b'l';
const TAG_BOOL: u8 = b't';
const TAG_TABLE: u8 = b'F';
const TAG_VOID: u8 = b'V';

/// A single field table value
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum FieldValue {
    LongString(String),
    Int(i32),
    Long(i64),
    Bool(bool),
    Table(FieldTable),
    Void,
}

impl FieldValue {
    fn tag(&self) -> u8 {
        match self {
            FieldValue::LongString(_) => TAG_LONG_STRING,
            FieldValue::Int(_) => TAG_INT,
            FieldValue::Long(_) => TAG_LONG,
            FieldValue::Bool(_) => TAG_BOOL,
            FieldValue::Table(_) => TAG_TABLE,
            FieldValue::Void => TAG_VOID,
        }
    }

    /// Encoded size including the type tag
    pub fn encoded_size(&self) -> usize {
        1 + match self {
            FieldValue::LongString(s) => long_string_size(s),
            FieldValue::Int(_) => 4,
            FieldValue::Long(_) => 8,
            FieldValue::Bool(_) => 1,
            FieldValue::Table(t) => t.encoded_size(),
            FieldValue::Void => 0,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            FieldValue::LongString(s) => Some(s),
            _ => None,
        }
    }

    fn encode(&self, cursor: &mut ByteCursor) -> ProtocolResult<()> {
        cursor.put_octet(self.tag());
        match self {
            FieldValue::LongString(s) => cursor.put_long_string(s),
            FieldValue::Int(v) => cursor.put_long(*v as u32),
            FieldValue::Long(v) => cursor.put_longlong(*v as u64),
            FieldValue::Bool(v) => cursor.put_octet(u8::from(*v)),
            FieldValue::Table(t) => t.encode(cursor)?,
            FieldValue::Void => {}
        }
        Ok(())
    }

    fn decode(field: &str, cursor: &mut ByteCursor, depth: usize) -> ProtocolResult<Self> {
        let tag = cursor.get_octet()?;
        let value = match tag {
            TAG_LONG_STRING => FieldValue::LongString(cursor.get_long_string()?),
            TAG_INT => FieldValue::Int(cursor.get_long()? as i32),
            TAG_LONG => FieldValue::Long(cursor.get_longlong()? as i64),
            TAG_BOOL => FieldValue::Bool(cursor.get_octet()? != 0),
            TAG_TABLE => FieldValue::Table(FieldTable::decode_at_depth(cursor, depth + 1)?),
            TAG_VOID => FieldValue::Void,
            other => {
                return Err(ProtocolError::UnsupportedFieldType {
                    tag: other,
                    field: field.to_string(),
                })
            }
        };
        Ok(value)
    }
}

impl From<&str> for FieldValue {
    fn from(value: &str) -> Self {
        FieldValue::LongString(value.to_string())
    }
}

impl From<String> for FieldValue {
    fn from(value: String) -> Self {
        FieldValue::LongString(value)
    }
}

impl From<i32> for FieldValue {
    fn from(value: i32) -> Self {
        FieldValue::Int(value)
    }
}

impl From<i64> for FieldValue {
    fn from(value: i64) -> Self {
        FieldValue::Long(value)
    }
}

impl From<bool> for FieldValue {
    fn from(value: bool) -> Self {
        FieldValue::Bool(value)
    }
}

/// Ordered field table
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash)]
pub struct FieldTable {
    entries: BTreeMap<String, FieldValue>,
}

impl FieldTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, name: impl Into<String>, value: impl Into<FieldValue>) -> Option<FieldValue> {
        self.entries.insert(name.into(), value.into())
    }

    pub fn get(&self, name: &str) -> Option<&FieldValue> {
        self.entries.get(name)
    }

    pub fn contains_key(&self, name: &str) -> bool {
        self.entries.contains_key(name)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &FieldValue)> {
        self.entries.iter()
    }

    /// Encoded size including the leading length
    pub fn encoded_size(&self) -> usize {
        4 + self.content_size()
    }

    fn content_size(&self) -> usize {
        self.entries
            .iter()
            .map(|(name, value)| short_string_size(name) + value.encoded_size())
            .sum()
    }

    pub fn encode(&self, cursor: &mut ByteCursor) -> ProtocolResult<()> {
        cursor.put_long(self.content_size() as u32);
        for (name, value) in &self.entries {
            cursor.put_short_string(name)?;
            value.encode(cursor)?;
        }
        Ok(())
    }

    pub fn decode(cursor: &mut ByteCursor) -> ProtocolResult<Self> {
        Self::decode_at_depth(cursor, 0)
    }

    /// Entries are read in place from the enclosing cursor, bounded by the
    /// declared length
    fn decode_at_depth(cursor: &mut ByteCursor, depth: usize) -> ProtocolResult<Self> {
        if depth > MAX_TABLE_DEPTH {
            return Err(ProtocolError::TableTooDeep {
                max: MAX_TABLE_DEPTH,
            });
        }

        let len = cursor.get_long()? as usize;
        let available = cursor.available();
        if available < len {
            return Err(ProtocolError::truncated(len, available, "field table"));
        }

        let start = cursor.position();
        let end = start + len;
        let mut entries = BTreeMap::new();
        while cursor.position() < end {
            let name = cursor.get_short_string()?;
            let value = FieldValue::decode(&name, cursor, depth)?;
            entries.insert(name, value);
        }

        let consumed = cursor.position() - start;
        if consumed > len {
            return Err(ProtocolError::truncated(consumed, len, "field table entry"));
        }
        Ok(Self { entries })
    }
}

impl<K: Into<String>, V: Into<FieldValue>> FromIterator<(K, V)> for FieldTable {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        Self {
            entries: iter
                .into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_table_round_trip_with_nesting() {
        let mut nested = FieldTable::new();
        nested.insert("depth", 2i32);

        let mut table = FieldTable::new();
        table.insert("x-match", "any");
        table.insert("count", 7i32);
        table.insert("big", -5_000_000_000i64);
        table.insert("flag", true);
        table.insert("nested", FieldValue::Table(nested));
        table.insert("marker", FieldValue::Void);

        let mut cursor = ByteCursor::new();
        table.encode(&mut cursor).unwrap();
        assert_eq!(cursor.len(), table.encoded_size());

        let decoded = FieldTable::decode(&mut cursor).unwrap();
        assert_eq!(decoded, table);
        assert_eq!(cursor.available(), 0);
    }

    #[test]
    fn test_empty_table_is_four_bytes() {
        let mut cursor = ByteCursor::new();
        FieldTable::new().encode(&mut cursor).unwrap();
        assert_eq!(cursor.as_slice(), &[0, 0, 0, 0]);
    }

    #[test]
    fn test_unknown_field_type_is_rejected() {
        // length 4: name "k" (2 bytes), tag 'Z', one byte of junk
        let mut cursor = ByteCursor::from(&[0, 0, 0, 4, 1, b'k', b'Z', 0][..]);
        let err = FieldTable::decode(&mut cursor).unwrap_err();
        assert_eq!(
            err,
            ProtocolError::UnsupportedFieldType {
                tag: b'Z',
                field: "k".to_string()
            }
        );
    }

    #[test]
    fn test_declared_length_past_end_is_truncated() {
        let mut cursor = ByteCursor::from(&[0, 0, 0, 9, 1, b'k'][..]);
        assert!(matches!(
            FieldTable::decode(&mut cursor),
            Err(ProtocolError::Truncated { .. })
        ));
    }

    fn nested_table_bytes(levels: usize) -> Vec<u8> {
        // each level is `len | 1 'n' | 'F'` around the next one
        let mut inner = vec![0u8, 0, 0, 0];
        for _ in 0..levels {
            let mut outer = Vec::with_capacity(inner.len() + 7);
            outer.extend_from_slice(&((inner.len() + 3) as u32).to_be_bytes());
            outer.extend_from_slice(&[1, b'n', b'F']);
            outer.extend_from_slice(&inner);
            inner = outer;
        }
        inner
    }

    #[test]
    fn test_nesting_at_limit_decodes() {
        let bytes = nested_table_bytes(MAX_TABLE_DEPTH);
        let mut cursor = ByteCursor::from(&bytes[..]);
        let table = FieldTable::decode(&mut cursor).unwrap();
        assert_eq!(cursor.available(), 0);
        assert_eq!(table.encoded_size(), bytes.len());
    }

    #[test]
    fn test_nesting_past_limit_is_rejected() {
        let bytes = nested_table_bytes(MAX_TABLE_DEPTH + 1);
        let mut cursor = ByteCursor::from(&bytes[..]);
        let err = FieldTable::decode(&mut cursor).unwrap_err();
        assert_eq!(err, ProtocolError::TableTooDeep { max: MAX_TABLE_DEPTH });
        assert!(err.is_framing());
    }

    #[test]
    fn test_entry_overrunning_table_length_is_truncated() {
        // table claims 3 bytes but its 'I' value needs 4 more; trailing bytes
        // belong to whatever follows the table
        let mut cursor =
            ByteCursor::from(&[0, 0, 0, 3, 1, b'k', b'I', 0, 0, 0, 1, 0xAA][..]);
        assert!(matches!(
            FieldTable::decode(&mut cursor),
            Err(ProtocolError::Truncated { need: 7, got: 3, .. })
        ));
    }

    #[test]
    fn test_from_iterator() {
        let table: FieldTable = vec![("a", "1"), ("b", "2")].into_iter().collect();
        assert_eq!(table.len(), 2);
        assert_eq!(table.get("a").and_then(FieldValue::as_str), Some("1"));
    }
}
