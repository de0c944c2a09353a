use crate::storage::error::{StorageError, StorageResult};

/// Data types supported by the engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DataType {
    Int32,
    Varchar,
    Boolean,
}

/// A single typed value.
///
/// Values are tagged on the wire with a one-byte discriminant so tuple
/// payloads are self-describing independent of the schema:
/// 0 = null, 1 = int32, 2 = length-prefixed UTF-8 string, 3 = bool.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Value {
    Null,
    Int32(i32),
    String(String),
    Boolean(bool),
}

const TAG_NULL: u8 = 0;
const TAG_INT: u8 = 1;
const TAG_STRING: u8 = 2;
const TAG_BOOL: u8 = 3;

impl Value {
    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    pub fn data_type(&self) -> Option<DataType> {
        match self {
            Value::Null => None,
            Value::Int32(_) => Some(DataType::Int32),
            Value::String(_) => Some(DataType::Varchar),
            Value::Boolean(_) => Some(DataType::Boolean),
        }
    }

    /// NULL is compatible with every column type.
    pub fn is_compatible_with(&self, data_type: DataType) -> bool {
        match self.data_type() {
            None => true,
            Some(ty) => ty == data_type,
        }
    }

    /// Serialized size in bytes, tag included.
    pub fn serialized_size(&self) -> usize {
        match self {
            Value::Null => 1,
            Value::Int32(_) => 1 + 4,
            Value::String(s) => 1 + 4 + s.len(),
            Value::Boolean(_) => 1 + 1,
        }
    }
}

/// Append one tagged value to `out`.
pub fn serialize_value(value: &Value, out: &mut Vec<u8>) {
    match value {
        Value::Null => out.push(TAG_NULL),
        Value::Int32(i) => {
            out.push(TAG_INT);
            out.extend_from_slice(&i.to_le_bytes());
        }
        Value::String(s) => {
            out.push(TAG_STRING);
            let bytes = s.as_bytes();
            out.extend_from_slice(&(bytes.len() as u32).to_le_bytes());
            out.extend_from_slice(bytes);
        }
        Value::Boolean(b) => {
            out.push(TAG_BOOL);
            out.push(u8::from(*b));
        }
    }
}

/// Serialize a row of values in order.
pub fn serialize_values(values: &[Value]) -> Vec<u8> {
    let size = values.iter().map(Value::serialized_size).sum();
    let mut out = Vec::with_capacity(size);
    for value in values {
        serialize_value(value, &mut out);
    }
    out
}

/// Deserialize one tagged value starting at `offset`, returning the value
/// and the offset just past it.
pub fn deserialize_value(data: &[u8], offset: usize) -> StorageResult<(Value, usize)> {
    let tag = *data
        .get(offset)
        .ok_or_else(|| StorageError::Corrupted("value tag past end of tuple".into()))?;
    let mut pos = offset + 1;

    let value = match tag {
        TAG_NULL => Value::Null,
        TAG_INT => {
            let bytes = read_bytes(data, pos, 4)?;
            pos += 4;
            Value::Int32(i32::from_le_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]))
        }
        TAG_STRING => {
            let len_bytes = read_bytes(data, pos, 4)?;
            let len =
                u32::from_le_bytes([len_bytes[0], len_bytes[1], len_bytes[2], len_bytes[3]])
                    as usize;
            pos += 4;
            let bytes = read_bytes(data, pos, len)?;
            pos += len;
            let s = String::from_utf8(bytes.to_vec())
                .map_err(|e| StorageError::Corrupted(format!("invalid UTF-8 string: {}", e)))?;
            Value::String(s)
        }
        TAG_BOOL => {
            let bytes = read_bytes(data, pos, 1)?;
            pos += 1;
            Value::Boolean(bytes[0] != 0)
        }
        other => return Err(StorageError::UnknownValueTag(other)),
    };

    Ok((value, pos))
}

/// Deserialize a row, one value per schema column, in schema order.
pub fn deserialize_values(data: &[u8], schema: &[DataType]) -> StorageResult<Vec<Value>> {
    let mut values = Vec::with_capacity(schema.len());
    let mut offset = 0;

    for _ in schema {
        let (value, next) = deserialize_value(data, offset)?;
        values.push(value);
        offset = next;
    }

    Ok(values)
}

fn read_bytes(data: &[u8], offset: usize, len: usize) -> StorageResult<&[u8]> {
    data.get(offset..offset + len)
        .ok_or_else(|| StorageError::Corrupted("value payload past end of tuple".into()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_round_trip_all_kinds() -> StorageResult<()> {
        let values = vec![
            Value::Int32(42),
            Value::String("Hello".to_string()),
            Value::Boolean(true),
            Value::Null,
        ];
        let schema = vec![
            DataType::Int32,
            DataType::Varchar,
            DataType::Boolean,
            DataType::Varchar,
        ];

        let bytes = serialize_values(&values);
        let decoded = deserialize_values(&bytes, &schema)?;
        assert_eq!(values, decoded);

        Ok(())
    }

    #[test]
    fn test_wire_tags() {
        let mut out = Vec::new();
        serialize_value(&Value::Null, &mut out);
        assert_eq!(out, vec![0]);

        out.clear();
        serialize_value(&Value::Int32(1), &mut out);
        assert_eq!(out, vec![1, 1, 0, 0, 0]);

        out.clear();
        serialize_value(&Value::String("ab".into()), &mut out);
        assert_eq!(out, vec![2, 2, 0, 0, 0, b'a', b'b']);

        out.clear();
        serialize_value(&Value::Boolean(false), &mut out);
        assert_eq!(out, vec![3, 0]);
    }

    #[test]
    fn test_serialized_size_matches() {
        let values = vec![
            Value::Null,
            Value::Int32(-7),
            Value::String("abc".into()),
            Value::Boolean(true),
        ];
        let bytes = serialize_values(&values);
        let expected: usize = values.iter().map(Value::serialized_size).sum();
        assert_eq!(bytes.len(), expected);
    }

    #[test]
    fn test_unknown_tag_is_an_error() {
        let data = vec![9u8];
        let err = deserialize_value(&data, 0).unwrap_err();
        assert!(matches!(err, StorageError::UnknownValueTag(9)));
    }

    #[test]
    fn test_truncated_payload_is_an_error() {
        // String claiming 10 bytes but carrying 2.
        let data = vec![2u8, 10, 0, 0, 0, b'a', b'b'];
        assert!(deserialize_value(&data, 0).is_err());
    }

    #[test]
    fn test_empty_string_round_trip() -> StorageResult<()> {
        let values = vec![Value::String(String::new())];
        let bytes = serialize_values(&values);
        let decoded = deserialize_values(&bytes, &[DataType::Varchar])?;
        assert_eq!(values, decoded);
        Ok(())
    }

    #[test]
    fn test_compatibility() {
        assert!(Value::Null.is_compatible_with(DataType::Int32));
        assert!(Value::Int32(1).is_compatible_with(DataType::Int32));
        assert!(!Value::Int32(1).is_compatible_with(DataType::Varchar));
        assert!(Value::String("x".into()).is_compatible_with(DataType::Varchar));
        assert!(Value::Boolean(true).is_compatible_with(DataType::Boolean));
    }
}
