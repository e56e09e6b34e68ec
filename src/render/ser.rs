//! `serde` serializer producing a [`Value`] tree.
//!
//! Strings come out exactly as the caller's data holds them; escaping and
//! image detection happen afterwards in [`super::data`].

use std::collections::BTreeMap;
use std::fmt::Display;

use serde::ser::{self, Impossible, Serialize};
use thiserror::Error;

use crate::error::{Error as DocError, ErrorKind};
use crate::template::Value;

/// Nesting limit; deeper data is assumed to be cyclic
pub const MAX_DEPTH: usize = 128;

#[derive(Debug, Error, Clone, PartialEq)]
pub enum DataError {
    #[error("{0}")]
    Custom(String),

    #[error("map keys must be strings, numbers, booleans or chars, got {0}")]
    KeyType(&'static str),

    #[error("data is nested deeper than {0} levels")]
    TooDeep(usize),

    #[error("integer {0} does not fit in 64 bits")]
    IntegerRange(String),
}

impl ser::Error for DataError {
    fn custom<T: Display>(msg: T) -> Self {
        Self::Custom(msg.to_string())
    }
}

impl From<DataError> for DocError {
    fn from(err: DataError) -> Self {
        let mut out = DocError::new(ErrorKind::DataConversion, err.to_string());
        if matches!(err, DataError::TooDeep(_)) {
            out = out.with_suggestion("check the data for reference cycles");
        }
        out.with_cause(err)
    }
}

type Result<T> = std::result::Result<T, DataError>;

/// Serialises `value` without escaping strings
pub fn to_raw_value<T: Serialize + ?Sized>(value: &T) -> Result<Value> {
    value.serialize(ValueSerializer { depth: 0 })
}

#[derive(Clone, Copy)]
struct ValueSerializer {
    depth: usize,
}

impl ValueSerializer {
    fn nested(self) -> Result<Self> {
        if self.depth >= MAX_DEPTH {
            return Err(DataError::TooDeep(MAX_DEPTH));
        }
        Ok(Self {
            depth: self.depth + 1,
        })
    }
}

impl ser::Serializer for ValueSerializer {
    type Ok = Value;
    type Error = DataError;
    type SerializeSeq = SeqBuilder;
    type SerializeTuple = SeqBuilder;
    type SerializeTupleStruct = SeqBuilder;
    type SerializeTupleVariant = VariantBuilder<SeqBuilder>;
    type SerializeMap = MapBuilder;
    type SerializeStruct = MapBuilder;
    type SerializeStructVariant = VariantBuilder<MapBuilder>;

    fn serialize_bool(self, v: bool) -> Result<Value> {
        Ok(Value::Bool(v))
    }

    fn serialize_i8(self, v: i8) -> Result<Value> {
        Ok(Value::Int(v.into()))
    }

    fn serialize_i16(self, v: i16) -> Result<Value> {
        Ok(Value::Int(v.into()))
    }

    fn serialize_i32(self, v: i32) -> Result<Value> {
        Ok(Value::Int(v.into()))
    }

    fn serialize_i64(self, v: i64) -> Result<Value> {
        Ok(Value::Int(v))
    }

    fn serialize_i128(self, v: i128) -> Result<Value> {
        i64::try_from(v)
            .map(Value::Int)
            .map_err(|_| DataError::IntegerRange(v.to_string()))
    }

    fn serialize_u8(self, v: u8) -> Result<Value> {
        Ok(Value::Int(v.into()))
    }

    fn serialize_u16(self, v: u16) -> Result<Value> {
        Ok(Value::Int(v.into()))
    }

    fn serialize_u32(self, v: u32) -> Result<Value> {
        Ok(Value::Int(v.into()))
    }

    fn serialize_u64(self, v: u64) -> Result<Value> {
        i64::try_from(v)
            .map(Value::Int)
            .map_err(|_| DataError::IntegerRange(v.to_string()))
    }

    fn serialize_u128(self, v: u128) -> Result<Value> {
        i64::try_from(v)
            .map(Value::Int)
            .map_err(|_| DataError::IntegerRange(v.to_string()))
    }

    fn serialize_f32(self, v: f32) -> Result<Value> {
        Ok(Value::Float(v.into()))
    }

    fn serialize_f64(self, v: f64) -> Result<Value> {
        Ok(Value::Float(v))
    }

    fn serialize_char(self, v: char) -> Result<Value> {
        Ok(Value::String(v.to_string()))
    }

    fn serialize_str(self, v: &str) -> Result<Value> {
        Ok(Value::String(v.to_string()))
    }

    fn serialize_bytes(self, v: &[u8]) -> Result<Value> {
        Ok(Value::Seq(v.iter().map(|b| Value::Int((*b).into())).collect()))
    }

    fn serialize_none(self) -> Result<Value> {
        Ok(Value::Null)
    }

    fn serialize_some<T: Serialize + ?Sized>(self, value: &T) -> Result<Value> {
        value.serialize(self)
    }

    fn serialize_unit(self) -> Result<Value> {
        Ok(Value::Null)
    }

    fn serialize_unit_struct(self, _name: &'static str) -> Result<Value> {
        Ok(Value::Null)
    }

    fn serialize_unit_variant(
        self,
        _name: &'static str,
        _index: u32,
        variant: &'static str,
    ) -> Result<Value> {
        Ok(Value::String(variant.to_string()))
    }

    fn serialize_newtype_struct<T: Serialize + ?Sized>(
        self,
        _name: &'static str,
        value: &T,
    ) -> Result<Value> {
        value.serialize(self)
    }

    fn serialize_newtype_variant<T: Serialize + ?Sized>(
        self,
        _name: &'static str,
        _index: u32,
        variant: &'static str,
        value: &T,
    ) -> Result<Value> {
        let inner = value.serialize(self.nested()?)?;
        Ok(Value::Map(BTreeMap::from([(variant.to_string(), inner)])))
    }

    fn serialize_seq(self, len: Option<usize>) -> Result<SeqBuilder> {
        Ok(SeqBuilder {
            items: Vec::with_capacity(len.unwrap_or(0)),
            child: self.nested()?,
        })
    }

    fn serialize_tuple(self, len: usize) -> Result<SeqBuilder> {
        self.serialize_seq(Some(len))
    }

    fn serialize_tuple_struct(self, _name: &'static str, len: usize) -> Result<SeqBuilder> {
        self.serialize_seq(Some(len))
    }

    fn serialize_tuple_variant(
        self,
        _name: &'static str,
        _index: u32,
        variant: &'static str,
        len: usize,
    ) -> Result<VariantBuilder<SeqBuilder>> {
        Ok(VariantBuilder {
            variant,
            inner: self.nested()?.serialize_seq(Some(len))?,
        })
    }

    fn serialize_map(self, _len: Option<usize>) -> Result<MapBuilder> {
        Ok(MapBuilder {
            map: BTreeMap::new(),
            next_key: None,
            child: self.nested()?,
        })
    }

    fn serialize_struct(self, _name: &'static str, len: usize) -> Result<MapBuilder> {
        self.serialize_map(Some(len))
    }

    fn serialize_struct_variant(
        self,
        _name: &'static str,
        _index: u32,
        variant: &'static str,
        len: usize,
    ) -> Result<VariantBuilder<MapBuilder>> {
        Ok(VariantBuilder {
            variant,
            inner: self.nested()?.serialize_map(Some(len))?,
        })
    }
}

pub struct SeqBuilder {
    items: Vec<Value>,
    child: ValueSerializer,
}

impl ser::SerializeSeq for SeqBuilder {
    type Ok = Value;
    type Error = DataError;

    fn serialize_element<T: Serialize + ?Sized>(&mut self, value: &T) -> Result<()> {
        self.items.push(value.serialize(self.child)?);
        Ok(())
    }

    fn end(self) -> Result<Value> {
        Ok(Value::Seq(self.items))
    }
}

impl ser::SerializeTuple for SeqBuilder {
    type Ok = Value;
    type Error = DataError;

    fn serialize_element<T: Serialize + ?Sized>(&mut self, value: &T) -> Result<()> {
        ser::SerializeSeq::serialize_element(self, value)
    }

    fn end(self) -> Result<Value> {
        ser::SerializeSeq::end(self)
    }
}

impl ser::SerializeTupleStruct for SeqBuilder {
    type Ok = Value;
    type Error = DataError;

    fn serialize_field<T: Serialize + ?Sized>(&mut self, value: &T) -> Result<()> {
        ser::SerializeSeq::serialize_element(self, value)
    }

    fn end(self) -> Result<Value> {
        ser::SerializeSeq::end(self)
    }
}

pub struct MapBuilder {
    map: BTreeMap<String, Value>,
    next_key: Option<String>,
    child: ValueSerializer,
}

impl ser::SerializeMap for MapBuilder {
    type Ok = Value;
    type Error = DataError;

    fn serialize_key<T: Serialize + ?Sized>(&mut self, key: &T) -> Result<()> {
        self.next_key = Some(key.serialize(KeySerializer)?);
        Ok(())
    }

    fn serialize_value<T: Serialize + ?Sized>(&mut self, value: &T) -> Result<()> {
        let key = self
            .next_key
            .take()
            .ok_or_else(|| DataError::Custom("map value without a key".to_string()))?;
        self.map.insert(key, value.serialize(self.child)?);
        Ok(())
    }

    fn end(self) -> Result<Value> {
        Ok(Value::Map(self.map))
    }
}

impl ser::SerializeStruct for MapBuilder {
    type Ok = Value;
    type Error = DataError;

    fn serialize_field<T: Serialize + ?Sized>(&mut self, key: &'static str, value: &T) -> Result<()> {
        self.map.insert(key.to_string(), value.serialize(self.child)?);
        Ok(())
    }

    fn end(self) -> Result<Value> {
        Ok(Value::Map(self.map))
    }
}

/// Enum variant with content, serialised as `{variant: content}`
pub struct VariantBuilder<B> {
    variant: &'static str,
    inner: B,
}

impl ser::SerializeTupleVariant for VariantBuilder<SeqBuilder> {
    type Ok = Value;
    type Error = DataError;

    fn serialize_field<T: Serialize + ?Sized>(&mut self, value: &T) -> Result<()> {
        ser::SerializeSeq::serialize_element(&mut self.inner, value)
    }

    fn end(self) -> Result<Value> {
        let inner = ser::SerializeSeq::end(self.inner)?;
        Ok(Value::Map(BTreeMap::from([(self.variant.to_string(), inner)])))
    }
}

impl ser::SerializeStructVariant for VariantBuilder<MapBuilder> {
    type Ok = Value;
    type Error = DataError;

    fn serialize_field<T: Serialize + ?Sized>(&mut self, key: &'static str, value: &T) -> Result<()> {
        ser::SerializeStruct::serialize_field(&mut self.inner, key, value)
    }

    fn end(self) -> Result<Value> {
        let inner = ser::SerializeStruct::end(self.inner)?;
        Ok(Value::Map(BTreeMap::from([(self.variant.to_string(), inner)])))
    }
}

/// Map keys become strings; composite keys are rejected
struct KeySerializer;

impl ser::Serializer for KeySerializer {
    type Ok = String;
    type Error = DataError;
    type SerializeSeq = Impossible<String, DataError>;
    type SerializeTuple = Impossible<String, DataError>;
    type SerializeTupleStruct = Impossible<String, DataError>;
    type SerializeTupleVariant = Impossible<String, DataError>;
    type SerializeMap = Impossible<String, DataError>;
    type SerializeStruct = Impossible<String, DataError>;
    type SerializeStructVariant = Impossible<String, DataError>;

    fn serialize_bool(self, v: bool) -> Result<String> {
        Ok(v.to_string())
    }

    fn serialize_i8(self, v: i8) -> Result<String> {
        Ok(v.to_string())
    }

    fn serialize_i16(self, v: i16) -> Result<String> {
        Ok(v.to_string())
    }

    fn serialize_i32(self, v: i32) -> Result<String> {
        Ok(v.to_string())
    }

    fn serialize_i64(self, v: i64) -> Result<String> {
        Ok(v.to_string())
    }

    fn serialize_u8(self, v: u8) -> Result<String> {
        Ok(v.to_string())
    }

    fn serialize_u16(self, v: u16) -> Result<String> {
        Ok(v.to_string())
    }

    fn serialize_u32(self, v: u32) -> Result<String> {
        Ok(v.to_string())
    }

    fn serialize_u64(self, v: u64) -> Result<String> {
        Ok(v.to_string())
    }

    fn serialize_f32(self, _v: f32) -> Result<String> {
        Err(DataError::KeyType("float"))
    }

    fn serialize_f64(self, _v: f64) -> Result<String> {
        Err(DataError::KeyType("float"))
    }

    fn serialize_char(self, v: char) -> Result<String> {
        Ok(v.to_string())
    }

    fn serialize_str(self, v: &str) -> Result<String> {
        Ok(v.to_string())
    }

    fn serialize_bytes(self, _v: &[u8]) -> Result<String> {
        Err(DataError::KeyType("bytes"))
    }

    fn serialize_none(self) -> Result<String> {
        Err(DataError::KeyType("none"))
    }

    fn serialize_some<T: Serialize + ?Sized>(self, value: &T) -> Result<String> {
        value.serialize(self)
    }

    fn serialize_unit(self) -> Result<String> {
        Err(DataError::KeyType("unit"))
    }

    fn serialize_unit_struct(self, _name: &'static str) -> Result<String> {
        Err(DataError::KeyType("unit struct"))
    }

    fn serialize_unit_variant(
        self,
        _name: &'static str,
        _index: u32,
        variant: &'static str,
    ) -> Result<String> {
        Ok(variant.to_string())
    }

    fn serialize_newtype_struct<T: Serialize + ?Sized>(
        self,
        _name: &'static str,
        value: &T,
    ) -> Result<String> {
        value.serialize(self)
    }

    fn serialize_newtype_variant<T: Serialize + ?Sized>(
        self,
        _name: &'static str,
        _index: u32,
        _variant: &'static str,
        _value: &T,
    ) -> Result<String> {
        Err(DataError::KeyType("enum variant with data"))
    }

    fn serialize_seq(self, _len: Option<usize>) -> Result<Self::SerializeSeq> {
        Err(DataError::KeyType("sequence"))
    }

    fn serialize_tuple(self, _len: usize) -> Result<Self::SerializeTuple> {
        Err(DataError::KeyType("tuple"))
    }

    fn serialize_tuple_struct(
        self,
        _name: &'static str,
        _len: usize,
    ) -> Result<Self::SerializeTupleStruct> {
        Err(DataError::KeyType("tuple struct"))
    }

    fn serialize_tuple_variant(
        self,
        _name: &'static str,
        _index: u32,
        _variant: &'static str,
        _len: usize,
    ) -> Result<Self::SerializeTupleVariant> {
        Err(DataError::KeyType("enum variant with data"))
    }

    fn serialize_map(self, _len: Option<usize>) -> Result<Self::SerializeMap> {
        Err(DataError::KeyType("map"))
    }

    fn serialize_struct(self, _name: &'static str, _len: usize) -> Result<Self::SerializeStruct> {
        Err(DataError::KeyType("struct"))
    }

    fn serialize_struct_variant(
        self,
        _name: &'static str,
        _index: u32,
        _variant: &'static str,
        _len: usize,
    ) -> Result<Self::SerializeStructVariant> {
        Err(DataError::KeyType("enum variant with data"))
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use serde::Serialize;

    use super::*;

    #[derive(Serialize)]
    struct Invoice {
        number: u32,
        customer: Option<String>,
        #[serde(skip)]
        #[allow(dead_code)]
        secret: String,
        lines: Vec<Line>,
        status: Status,
    }

    #[derive(Serialize)]
    struct Line {
        item: &'static str,
        price: f64,
    }

    #[derive(Serialize)]
    enum Status {
        Paid,
    }

    #[test]
    fn test_struct_becomes_map() {
        let invoice = Invoice {
            number: 7,
            customer: None,
            secret: "x".to_string(),
            lines: vec![Line {
                item: "<bolt>",
                price: 1.5,
            }],
            status: Status::Paid,
        };
        let value = to_raw_value(&invoice).unwrap();
        assert_eq!(value.get("number"), Some(&Value::Int(7)));
        assert_eq!(value.get("customer"), Some(&Value::Null));
        assert_eq!(value.get("secret"), None);
        assert_eq!(value.get("status"), Some(&Value::String("Paid".to_string())));
        let Some(Value::Seq(lines)) = value.get("lines") else {
            panic!("lines should be a sequence")
        };
        // not escaped yet
        assert_eq!(lines[0].get("item"), Some(&Value::String("<bolt>".to_string())));
    }

    #[test]
    fn test_non_string_keys_are_stringified() {
        let map: HashMap<u32, &str> = HashMap::from([(1, "one")]);
        let value = to_raw_value(&map).unwrap();
        assert_eq!(value.get("1"), Some(&Value::String("one".to_string())));
    }

    #[test]
    fn test_composite_keys_are_rejected() {
        let map: BTreeMap<(u8, u8), u8> = BTreeMap::from([((1, 2), 3)]);
        assert_eq!(to_raw_value(&map).unwrap_err(), DataError::KeyType("tuple"));
    }

    #[test]
    fn test_depth_limit() {
        let mut value = serde_json::json!(1);
        for _ in 0..(MAX_DEPTH + 5) {
            value = serde_json::json!([value]);
        }
        assert_eq!(to_raw_value(&value).unwrap_err(), DataError::TooDeep(MAX_DEPTH));
    }

    #[test]
    fn test_json_value_input() {
        let value = to_raw_value(&serde_json::json!({"a": {"b": [true, 2.5]}})).unwrap();
        assert_eq!(
            value.get("a").and_then(|a| a.get("b")),
            Some(&Value::Seq(vec![Value::Bool(true), Value::Float(2.5)]))
        );
    }
}
