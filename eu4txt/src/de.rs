//! Serde deserialization from parsed values.
//!
//! Every scalar is text, so numbers and `yes`/`no` booleans are parsed on
//! demand. A single value is accepted where a sequence is expected, which
//! lets a field typed `Vec<T>` read both `key = a` and a repeated key.

use serde::de::value::BorrowedStrDeserializer;
use serde::de::{self, DeserializeSeed, IntoDeserializer, Visitor};
use serde::{Deserialize, forward_to_deserialize_any};
use thiserror::Error;

use crate::value::{Block, Value};

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{0}")]
pub struct DeError(String);

impl de::Error for DeError {
    fn custom<T: std::fmt::Display>(msg: T) -> Self {
        DeError(msg.to_string())
    }
}

#[derive(Clone, Copy)]
enum Input<'de> {
    Value(&'de Value),
    Block(&'de Block),
}

pub struct Deserializer<'de> {
    input: Input<'de>,
}

impl<'de> Deserializer<'de> {
    pub fn from_value(value: &'de Value) -> Self {
        Self {
            input: Input::Value(value),
        }
    }

    pub fn from_block(block: &'de Block) -> Self {
        Self {
            input: Input::Block(block),
        }
    }

    fn scalar(&self) -> Result<&'de str, DeError> {
        match self.input {
            Input::Value(Value::Scalar(s)) => Ok(s.as_str()),
            Input::Value(other) => Err(DeError(format!("expected a scalar, found {}", other.describe()))),
            Input::Block(_) => Err(DeError("expected a scalar, found block".to_string())),
        }
    }
}

/// Deserializes `T` from a parsed value.
pub fn from_value<'a, T>(value: &'a Value) -> Result<T, DeError>
where
    T: Deserialize<'a>,
{
    T::deserialize(Deserializer::from_value(value))
}

/// Deserializes `T` from a block, typically a whole parsed file.
pub fn from_block<'a, T>(block: &'a Block) -> Result<T, DeError>
where
    T: Deserialize<'a>,
{
    T::deserialize(Deserializer::from_block(block))
}

macro_rules! deserialize_number {
    ($method:ident, $visit:ident, $ty:ty) => {
        fn $method<V>(self, visitor: V) -> Result<V::Value, Self::Error>
        where
            V: Visitor<'de>,
        {
            let s = self.scalar()?;
            let n = s
                .trim()
                .parse::<$ty>()
                .map_err(|_| DeError(format!("invalid {} '{}'", stringify!($ty), s)))?;
            visitor.$visit(n)
        }
    };
}

impl<'de> de::Deserializer<'de> for Deserializer<'de> {
    type Error = DeError;

    fn deserialize_any<V>(self, visitor: V) -> Result<V::Value, Self::Error>
    where
        V: Visitor<'de>,
    {
        match self.input {
            Input::Block(block) | Input::Value(Value::Block(block)) => visitor.visit_map(Entries::new(block)),
            Input::Value(Value::Scalar(s)) => visitor.visit_borrowed_str(s),
            Input::Value(Value::Tuple(items)) | Input::Value(Value::List(items)) => {
                visitor.visit_seq(Items { iter: items.iter() })
            }
            Input::Value(Value::Empty) => visitor.visit_unit(),
        }
    }

    fn deserialize_bool<V>(self, visitor: V) -> Result<V::Value, Self::Error>
    where
        V: Visitor<'de>,
    {
        match self.scalar()? {
            "yes" => visitor.visit_bool(true),
            "no" => visitor.visit_bool(false),
            other => Err(DeError(format!("invalid bool '{}'", other))),
        }
    }

    deserialize_number!(deserialize_i8, visit_i8, i8);
    deserialize_number!(deserialize_i16, visit_i16, i16);
    deserialize_number!(deserialize_i32, visit_i32, i32);
    deserialize_number!(deserialize_i64, visit_i64, i64);
    deserialize_number!(deserialize_u8, visit_u8, u8);
    deserialize_number!(deserialize_u16, visit_u16, u16);
    deserialize_number!(deserialize_u32, visit_u32, u32);
    deserialize_number!(deserialize_u64, visit_u64, u64);
    deserialize_number!(deserialize_f32, visit_f32, f32);
    deserialize_number!(deserialize_f64, visit_f64, f64);

    fn deserialize_option<V>(self, visitor: V) -> Result<V::Value, Self::Error>
    where
        V: Visitor<'de>,
    {
        match self.input {
            Input::Value(Value::Empty) => visitor.visit_none(),
            _ => visitor.visit_some(self),
        }
    }

    fn deserialize_seq<V>(self, visitor: V) -> Result<V::Value, Self::Error>
    where
        V: Visitor<'de>,
    {
        match self.input {
            Input::Value(Value::Tuple(items)) | Input::Value(Value::List(items)) => {
                visitor.visit_seq(Items { iter: items.iter() })
            }
            Input::Value(Value::Empty) => visitor.visit_seq(Items {
                iter: Default::default(),
            }),
            Input::Value(single) => visitor.visit_seq(Items {
                iter: std::slice::from_ref(single).iter(),
            }),
            Input::Block(_) => Err(DeError("expected a sequence, found block".to_string())),
        }
    }

    fn deserialize_tuple<V>(self, _len: usize, visitor: V) -> Result<V::Value, Self::Error>
    where
        V: Visitor<'de>,
    {
        self.deserialize_seq(visitor)
    }

    fn deserialize_map<V>(self, visitor: V) -> Result<V::Value, Self::Error>
    where
        V: Visitor<'de>,
    {
        match self.input {
            Input::Block(block) | Input::Value(Value::Block(block)) => visitor.visit_map(Entries::new(block)),
            Input::Value(Value::Empty) => visitor.visit_map(Entries {
                iter: Default::default(),
                value: None,
            }),
            Input::Value(other) => Err(DeError(format!("expected a block, found {}", other.describe()))),
        }
    }

    fn deserialize_struct<V>(
        self,
        _name: &'static str,
        _fields: &'static [&'static str],
        visitor: V,
    ) -> Result<V::Value, Self::Error>
    where
        V: Visitor<'de>,
    {
        self.deserialize_map(visitor)
    }

    fn deserialize_enum<V>(
        self,
        _name: &'static str,
        _variants: &'static [&'static str],
        visitor: V,
    ) -> Result<V::Value, Self::Error>
    where
        V: Visitor<'de>,
    {
        let s = self.scalar()?;
        visitor.visit_enum(s.into_deserializer())
    }

    fn deserialize_newtype_struct<V>(
        self,
        _name: &'static str,
        visitor: V,
    ) -> Result<V::Value, Self::Error>
    where
        V: Visitor<'de>,
    {
        visitor.visit_newtype_struct(self)
    }

    fn deserialize_ignored_any<V>(self, visitor: V) -> Result<V::Value, Self::Error>
    where
        V: Visitor<'de>,
    {
        visitor.visit_unit()
    }

    forward_to_deserialize_any! {
        i128 u128 char str string bytes byte_buf unit unit_struct tuple_struct
        identifier
    }
}

struct Items<'de> {
    iter: std::slice::Iter<'de, Value>,
}

impl<'de> de::SeqAccess<'de> for Items<'de> {
    type Error = DeError;

    fn next_element_seed<T>(&mut self, seed: T) -> Result<Option<T::Value>, Self::Error>
    where
        T: DeserializeSeed<'de>,
    {
        match self.iter.next() {
            Some(value) => seed.deserialize(Deserializer::from_value(value)).map(Some),
            None => Ok(None),
        }
    }

    fn size_hint(&self) -> Option<usize> {
        Some(self.iter.len())
    }
}

struct Entries<'de> {
    iter: std::slice::Iter<'de, (String, Value)>,
    value: Option<&'de Value>,
}

impl<'de> Entries<'de> {
    fn new(block: &'de Block) -> Self {
        Self {
            iter: block.into_iter(),
            value: None,
        }
    }
}

impl<'de> de::MapAccess<'de> for Entries<'de> {
    type Error = DeError;

    fn next_key_seed<K>(&mut self, seed: K) -> Result<Option<K::Value>, Self::Error>
    where
        K: DeserializeSeed<'de>,
    {
        match self.iter.next() {
            Some((key, value)) => {
                self.value = Some(value);
                seed.deserialize(BorrowedStrDeserializer::<DeError>::new(key))
                    .map(Some)
            }
            None => Ok(None),
        }
    }

    fn next_value_seed<V>(&mut self, seed: V) -> Result<V::Value, Self::Error>
    where
        V: DeserializeSeed<'de>,
    {
        let value = self
            .value
            .take()
            .ok_or_else(|| DeError("value requested before key".to_string()))?;
        seed.deserialize(Deserializer::from_value(value))
    }
}
