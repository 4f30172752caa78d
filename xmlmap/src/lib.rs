// Copyright (C) 2021 Scott Lamb <slamb@slamb.org>
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Declarative mapping between XML documents and Rust models.
//!
//! A model is a struct whose fields each carry a [`Mapper`]: an attribute, a
//! leaf element, a wrapping element path, a list, or a nested model. The
//! mapping engine walks those bindings against an in-memory [`Element`] tree
//! in either direction.
//!
//! ```rust
//! use xmlmap_derive::Model;
//!
//! #[derive(Debug, PartialEq, Model)]
//! #[xmlmap(rename = "user", prefix = "doc", namespace = "doc: http://www.test1.org")]
//! struct User {
//!     #[xmlmap(attribute)]
//!     name: String,
//!
//!     #[xmlmap(wrapper("contacts", list(element(rename = "email"))))]
//!     emails: Vec<String>,
//! }
//!
//! let user: User = xmlmap::de::from_str(
//!     r#"<doc:user xmlns:doc="http://www.test1.org" name="Alexey">
//!            <doc:contacts>
//!                <doc:email>alex@gmail.com</doc:email>
//!                <doc:email>alex@mail.ru</doc:email>
//!            </doc:contacts>
//!        </doc:user>"#,
//! )
//! .unwrap();
//! assert_eq!(user.emails, ["alex@gmail.com", "alex@mail.ru"]);
//!
//! let out = xmlmap::ser::serialize(&user).to_string().unwrap().unwrap();
//! let round_tripped: User = xmlmap::de::from_str(&out).unwrap();
//! assert_eq!(user, round_tripped);
//! ```

pub mod de;
pub mod encode;
pub mod mapper;
pub mod model;
pub mod ns;
pub mod ser;
mod tree;
pub mod value;

pub use de::{from_str, read};
pub use encode::{DefaultEncoder, Encoder, Scalar, ToScalar};
pub use mapper::Mapper;
pub use model::{DeclarationError, Model, ModelDescriptor};
pub use ns::NsMap;
pub use ser::serialize;
pub use tree::Element;
pub use value::{Binary, FromValue, IntoValue, Record, Value};

const XML_NS: &str = "http://www.w3.org/XML/1998/namespace";

pub use xml::common::TextPosition;

/// A reference to an "expanded name": namespace and local name.
///
/// See [Namespaces in XML 1.1 (Second Edition) section 2.1: Basic
/// Concepts](https://www.w3.org/TR/2006/REC-xml-names11-20060816/#concepts).
///
/// The owned version is called [`ExpandedName`].
#[derive(Copy, Clone, Debug, Eq, Hash, Ord, PartialEq, PartialOrd)]
pub struct ExpandedNameRef<'a> {
    pub namespace: &'a str,
    pub local_name: &'a str,
}

impl<'a> ExpandedNameRef<'a> {
    fn from_xml_name(name: &xml::name::Name<'a>) -> Self {
        Self {
            namespace: match name.namespace {
                // Work around xml-rs's erroneous lack of builtin
                // xmlns:xml="http://www.w3.org/XML/1998/namespace" mapping.
                None if name.prefix == Some("xml") => XML_NS,
                None => "",
                Some(ns) => ns,
            },
            local_name: name.local_name,
        }
    }
}

impl<'a> From<ExpandedNameRef<'a>> for ExpandedName {
    fn from(name: ExpandedNameRef<'a>) -> Self {
        ExpandedName::new(name.namespace, name.local_name)
    }
}

impl<'a> std::fmt::Display for ExpandedNameRef<'a> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        if self.namespace.is_empty() {
            write!(f, "{}", self.local_name)
        } else {
            write!(f, "{{{}}}{}", self.namespace, self.local_name)
        }
    }
}

/// An owned version of an "expanded name": namespace and local name.
///
/// The borrowed version is called [`ExpandedNameRef`].
#[derive(Clone, Debug, Default, Eq, Hash, Ord, PartialEq, PartialOrd)]
pub struct ExpandedName {
    pub namespace: String,
    pub local_name: String,
}

impl ExpandedName {
    pub fn new(namespace: &str, local_name: &str) -> Self {
        ExpandedName {
            namespace: namespace.to_owned(),
            local_name: local_name.to_owned(),
        }
    }

    pub fn as_ref(&self) -> ExpandedNameRef {
        ExpandedNameRef {
            namespace: &self.namespace,
            local_name: &self.local_name,
        }
    }
}

impl std::fmt::Display for ExpandedName {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        self.as_ref().fmt(f)
    }
}

/// Shorthand for `Box<dyn std::error::Error + Send + Sync + 'static>`.
pub type BoxedStdError = Box<dyn std::error::Error + Send + Sync + 'static>;
