// Copyright (C) 2021 Scott Lamb <slamb@slamb.org>
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Untyped field values exchanged between models and mappers.
//!
//! Serialization turns a model into a [`Record`] of [`Value`]s which the
//! mappers then write out; deserialization collects what the mappers found
//! into a `Record` and builds the model from it. Field types take part via
//! [`IntoValue`] and [`FromValue`].

use std::collections::BTreeMap;

use base64::Engine as _;

use crate::de::{ParseText, SimpleError};
use crate::encode::{DefaultEncoder, Encoder, Scalar, ToScalar};
use crate::BoxedStdError;

#[derive(Clone, Debug, PartialEq)]
pub enum Value {
    Scalar(Scalar),
    List(Vec<Value>),
    Record(Record),
}

impl Value {
    pub(crate) fn kind(&self) -> &'static str {
        match self {
            Value::Scalar(_) => "scalar",
            Value::List(_) => "list",
            Value::Record(_) => "record",
        }
    }
}

/// Field values of one model, keyed by constructor name.
///
/// Keys are normalized with [`constructor_key`], so `_field` and `field`
/// refer to the same entry.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Record(BTreeMap<String, Value>);

impl Record {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, name: &str, value: Value) {
        self.0.insert(constructor_key(name).to_owned(), value);
    }

    pub fn get(&self, name: &str) -> Option<&Value> {
        self.0.get(constructor_key(name))
    }

    pub fn remove(&mut self, name: &str) -> Option<Value> {
        self.0.remove(constructor_key(name))
    }

    /// Removes and converts the named value, if present.
    pub fn take<T: FromValue>(&mut self, name: &str) -> Result<Option<T>, BoxedStdError> {
        self.remove(name).map(T::from_value).transpose()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &Value)> {
        self.0.iter().map(|(k, v)| (k.as_str(), v))
    }
}

impl Extend<(String, Value)> for Record {
    fn extend<I: IntoIterator<Item = (String, Value)>>(&mut self, iter: I) {
        for (k, v) in iter {
            self.insert(&k, v);
        }
    }
}

impl IntoIterator for Record {
    type Item = (String, Value);
    type IntoIter = std::collections::btree_map::IntoIter<String, Value>;

    fn into_iter(self) -> Self::IntoIter {
        self.0.into_iter()
    }
}

/// Returns the constructor name for field `name`: without a raw identifier
/// marker or leading underscores.
///
/// ```rust
/// use xmlmap::value::constructor_key;
/// assert_eq!(constructor_key("__field2"), "field2");
/// assert_eq!(constructor_key("r#type"), "type");
/// ```
pub fn constructor_key(name: &str) -> &str {
    name.strip_prefix("r#").unwrap_or(name).trim_start_matches('_')
}

/// Conversion of a field value for serialization.
///
/// `None` means the field is absent (e.g. an unset `Option`).
pub trait IntoValue {
    fn to_value(&self) -> Option<Value>;
}

/// Conversion of a deserialized value back to a field value.
pub trait FromValue: Sized {
    fn from_value(value: Value) -> Result<Self, BoxedStdError>;
}

impl<T: IntoValue> IntoValue for Option<T> {
    fn to_value(&self) -> Option<Value> {
        self.as_ref().and_then(IntoValue::to_value)
    }
}

impl<T: FromValue> FromValue for Option<T> {
    fn from_value(value: Value) -> Result<Self, BoxedStdError> {
        T::from_value(value).map(Some)
    }
}

impl<T: IntoValue> IntoValue for Vec<T> {
    fn to_value(&self) -> Option<Value> {
        Some(Value::List(
            self.iter().filter_map(IntoValue::to_value).collect(),
        ))
    }
}

impl<T: FromValue> FromValue for Vec<T> {
    fn from_value(value: Value) -> Result<Self, BoxedStdError> {
        match value {
            Value::List(items) => items.into_iter().map(T::from_value).collect(),
            other => Err(unexpected(&other, "list")),
        }
    }
}

impl<T: IntoValue> IntoValue for Box<T> {
    fn to_value(&self) -> Option<Value> {
        (**self).to_value()
    }
}

impl<T: FromValue> FromValue for Box<T> {
    fn from_value(value: Value) -> Result<Self, BoxedStdError> {
        T::from_value(value).map(Box::new)
    }
}

/// Implements [`IntoValue`] and [`FromValue`] for a type with [`ToScalar`] and
/// [`ParseText`] impls.
///
/// ```rust
/// use xmlmap::{de::ParseText, BoxedStdError, Scalar, ToScalar};
///
/// #[derive(Debug, PartialEq)]
/// struct Celsius(f64);
///
/// impl ToScalar for Celsius {
///     fn to_scalar(&self) -> Scalar {
///         Scalar::Other(format!("{}C", self.0))
///     }
/// }
///
/// impl ParseText for Celsius {
///     fn parse(text: String) -> Result<Self, BoxedStdError> {
///         Ok(Celsius(text.trim_end_matches('C').parse()?))
///     }
/// }
///
/// xmlmap::scalar_value!(Celsius);
/// ```
#[macro_export]
macro_rules! scalar_value {
    ( $t:ty ) => {
        impl $crate::value::IntoValue for $t {
            fn to_value(&self) -> ::std::option::Option<$crate::value::Value> {
                ::std::option::Option::Some($crate::value::Value::Scalar(
                    $crate::encode::ToScalar::to_scalar(self),
                ))
            }
        }

        impl $crate::value::FromValue for $t {
            fn from_value(
                value: $crate::value::Value,
            ) -> ::std::result::Result<Self, $crate::BoxedStdError> {
                <$t as $crate::de::ParseText>::parse($crate::value::expect_text(value)?)
            }
        }
    };
}

scalar_value!(String);
scalar_value!(bool);
scalar_value!(i8);
scalar_value!(u8);
scalar_value!(i16);
scalar_value!(u16);
scalar_value!(i32);
scalar_value!(u32);
scalar_value!(i64);
scalar_value!(u64);
scalar_value!(i128);
scalar_value!(u128);
scalar_value!(isize);
scalar_value!(usize);
scalar_value!(f32);
scalar_value!(f64);
scalar_value!(chrono::NaiveDate);
scalar_value!(chrono::NaiveDateTime);
scalar_value!(chrono::DateTime<chrono::FixedOffset>);
scalar_value!(chrono::DateTime<chrono::Utc>);
scalar_value!(Binary);

/// Binary data, written as base64 by [`DefaultEncoder`].
#[derive(Clone, Debug, Default, Eq, Hash, PartialEq)]
pub struct Binary(pub Vec<u8>);

impl ToScalar for Binary {
    fn to_scalar(&self) -> Scalar {
        Scalar::Bytes(self.0.clone())
    }
}

impl ParseText for Binary {
    fn parse(text: String) -> Result<Self, BoxedStdError> {
        let text: String = text.split_ascii_whitespace().collect();
        Ok(Binary(
            base64::engine::general_purpose::STANDARD.decode(text)?,
        ))
    }
}

fn unexpected(value: &Value, expected: &str) -> BoxedStdError {
    Box::new(SimpleError(format!(
        "expected {}, got {}",
        expected,
        value.kind()
    )))
}

/// Returns the text of a scalar value.
///
/// Values read from a document are already text; values taken straight from
/// a model are rendered with [`DefaultEncoder`].
#[doc(hidden)]
pub fn expect_text(value: Value) -> Result<String, BoxedStdError> {
    match value {
        Value::Scalar(Scalar::Text(s)) | Value::Scalar(Scalar::Other(s)) => Ok(s),
        Value::Scalar(other) => Ok(DefaultEncoder.encode(&other)),
        other => Err(unexpected(&other, "scalar")),
    }
}

/// Returns the fields of a record value.
#[doc(hidden)]
pub fn into_record(value: Value) -> Result<Record, BoxedStdError> {
    match value {
        Value::Record(r) => Ok(r),
        other => Err(unexpected(&other, "record")),
    }
}

/// A failure to convert one field of a model.
#[derive(Debug)]
struct FieldError {
    field: &'static str,
    source: BoxedStdError,
}

impl std::fmt::Display for FieldError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "field {}: {}", self.field, &self.source)
    }
}

impl std::error::Error for FieldError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        Some(&*self.source)
    }
}

/// Helper for macros: attributes a conversion error to `field`.
#[doc(hidden)]
pub fn field_error(field: &'static str, source: BoxedStdError) -> BoxedStdError {
    Box::new(FieldError { field, source })
}

/// Helper for macros: reports a required field with no value.
#[doc(hidden)]
pub fn missing_field(field: &'static str) -> BoxedStdError {
    Box::new(SimpleError(format!("missing field {}", field)))
}
