//! PackStream value model.

use std::collections::HashMap;

/// A value carried inside a Bolt message.
///
/// Only the borrowing accessors the message layer needs are provided;
/// anything else is reached by matching on the variant.
#[derive(Debug, Clone, PartialEq)]
pub enum PackStreamValue {
    Null,
    Boolean(bool),
    Integer(i64),
    Float(f64),
    Bytes(Vec<u8>),
    String(String),
    List(Vec<PackStreamValue>),
    /// String-keyed map; key order is not preserved
    Map(HashMap<String, PackStreamValue>),
    /// Tagged structure, including every Bolt message
    Structure(PackStreamStructure),
}

/// One signature byte followed by its fields.
#[derive(Debug, Clone, PartialEq)]
pub struct PackStreamStructure {
    pub tag: u8,
    pub fields: Vec<PackStreamValue>,
}

impl PackStreamStructure {
    pub fn new(tag: u8, fields: Vec<PackStreamValue>) -> Self {
        Self { tag, fields }
    }

    pub fn field(&self, index: usize) -> Option<&PackStreamValue> {
        self.fields.get(index)
    }
}

impl PackStreamValue {
    /// Name of the variant, used in decode error messages.
    pub fn type_name(&self) -> &'static str {
        match self {
            Self::Null => "Null",
            Self::Boolean(_) => "Boolean",
            Self::Integer(_) => "Integer",
            Self::Float(_) => "Float",
            Self::Bytes(_) => "Bytes",
            Self::String(_) => "String",
            Self::List(_) => "List",
            Self::Map(_) => "Map",
            Self::Structure(_) => "Structure",
        }
    }

    pub fn as_int(&self) -> Option<i64> {
        if let Self::Integer(i) = self {
            Some(*i)
        } else {
            None
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        if let Self::String(s) = self {
            Some(s)
        } else {
            None
        }
    }

    pub fn as_list(&self) -> Option<&[PackStreamValue]> {
        if let Self::List(items) = self {
            Some(items)
        } else {
            None
        }
    }

    pub fn as_map(&self) -> Option<&HashMap<String, PackStreamValue>> {
        if let Self::Map(entries) = self {
            Some(entries)
        } else {
            None
        }
    }

    /// Owned map, for message fields that are consumed whole.
    pub fn into_map(self) -> Option<HashMap<String, PackStreamValue>> {
        if let Self::Map(entries) = self {
            Some(entries)
        } else {
            None
        }
    }

    /// Owned structure; how a decoded payload becomes a message.
    pub fn into_structure(self) -> Option<PackStreamStructure> {
        if let Self::Structure(s) = self {
            Some(s)
        } else {
            None
        }
    }
}

impl From<i64> for PackStreamValue {
    fn from(v: i64) -> Self {
        Self::Integer(v)
    }
}

impl From<&str> for PackStreamValue {
    fn from(v: &str) -> Self {
        Self::String(v.to_owned())
    }
}

impl From<String> for PackStreamValue {
    fn from(v: String) -> Self {
        Self::String(v)
    }
}

impl From<Vec<PackStreamValue>> for PackStreamValue {
    fn from(v: Vec<PackStreamValue>) -> Self {
        Self::List(v)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_accessors_match_kind() {
        assert_eq!(PackStreamValue::from(7i64).as_int(), Some(7));
        assert_eq!(PackStreamValue::from("x").as_str(), Some("x"));
        assert!(PackStreamValue::from("x").as_int().is_none());
        assert!(PackStreamValue::Boolean(true).as_str().is_none());
        assert_eq!(PackStreamValue::Null.type_name(), "Null");
    }

    #[test]
    fn test_into_structure() {
        let s = PackStreamStructure::new(0x70, vec![PackStreamValue::Null]);
        let value = PackStreamValue::Structure(s.clone());
        assert_eq!(value.into_structure(), Some(s));
        assert_eq!(PackStreamValue::Null.into_structure(), None);
    }
}
