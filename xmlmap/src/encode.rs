// Copyright (C) 2021 Scott Lamb <slamb@slamb.org>
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Conversion of scalar field values to text.

use base64::Engine as _;
use chrono::{DateTime, FixedOffset, NaiveDate, NaiveDateTime, Utc};

/// A leaf value, as taken from a model field before encoding to text.
///
/// Values read from a document are always [`Scalar::Text`]; the other variants
/// let an [`Encoder`] choose a representation by type.
#[derive(Clone, Debug, Eq, PartialEq)]
pub enum Scalar {
    Text(String),
    Bytes(Vec<u8>),
    Date(NaiveDate),
    DateTime(NaiveDateTime),
    ZonedDateTime(DateTime<FixedOffset>),

    /// Any other value, already rendered (numbers, booleans, enums).
    Other(String),
}

/// Renders scalars as attribute values and element text.
pub trait Encoder {
    fn encode(&self, value: &Scalar) -> String;
}

impl<F: Fn(&Scalar) -> String> Encoder for F {
    fn encode(&self, value: &Scalar) -> String {
        self(value)
    }
}

/// The standard text forms.
///
/// ```rust
/// use xmlmap::{DefaultEncoder, Encoder, Scalar};
/// assert_eq!(DefaultEncoder.encode(&Scalar::Bytes(b"data".to_vec())), "ZGF0YQ==");
/// let date = chrono::NaiveDate::from_ymd_opt(2019, 3, 25).unwrap();
/// assert_eq!(DefaultEncoder.encode(&Scalar::Date(date)), "2019-03-25");
/// ```
#[derive(Copy, Clone, Debug, Default)]
pub struct DefaultEncoder;

impl Encoder for DefaultEncoder {
    fn encode(&self, value: &Scalar) -> String {
        match value {
            Scalar::Text(s) | Scalar::Other(s) => s.clone(),
            Scalar::Bytes(b) => base64::engine::general_purpose::STANDARD.encode(b),
            Scalar::Date(d) => d.format("%Y-%m-%d").to_string(),
            Scalar::DateTime(dt) => dt.format("%Y-%m-%dT%H:%M:%S%.f").to_string(),
            Scalar::ZonedDateTime(dt) => dt.to_rfc3339(),
        }
    }
}

/// Conversion of a field value to a [`Scalar`].
pub trait ToScalar {
    fn to_scalar(&self) -> Scalar;
}

impl ToScalar for String {
    fn to_scalar(&self) -> Scalar {
        Scalar::Text(self.clone())
    }
}

impl ToScalar for NaiveDate {
    fn to_scalar(&self) -> Scalar {
        Scalar::Date(*self)
    }
}

impl ToScalar for NaiveDateTime {
    fn to_scalar(&self) -> Scalar {
        Scalar::DateTime(*self)
    }
}

impl ToScalar for DateTime<FixedOffset> {
    fn to_scalar(&self) -> Scalar {
        Scalar::ZonedDateTime(*self)
    }
}

impl ToScalar for DateTime<Utc> {
    fn to_scalar(&self) -> Scalar {
        Scalar::ZonedDateTime((*self).into())
    }
}

macro_rules! to_scalar_via_display {
    ( $($t:ty),* ) => {
        $(
            impl ToScalar for $t {
                fn to_scalar(&self) -> Scalar {
                    Scalar::Other(self.to_string())
                }
            }
        )*
    }
}

to_scalar_via_display!(bool, i8, u8, i16, u16, i32, u32, i64, u64, i128, u128, isize, usize, f32, f64);
