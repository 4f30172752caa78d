// Copyright (C) 2021 Scott Lamb <slamb@slamb.org>
// SPDX-License-Identifier: MIT OR Apache-2.0

use log::trace;

use super::{expect_scalar, Path, Scope};
use crate::encode::{Encoder, Scalar};
use crate::ns::{self, NsMap};
use crate::value::Value;
use crate::{de, ser, Element, ExpandedName};

/// Maps a field to an attribute of the enclosing element.
///
/// Unprefixed attributes are never in a namespace, so unlike elements an
/// attribute doesn't inherit the enclosing model's namespace.
#[derive(Clone, Debug)]
pub struct AttributeMapper {
    name: Option<String>,
    ns: Option<String>,
    pub(super) required: bool,
}

impl Default for AttributeMapper {
    fn default() -> Self {
        AttributeMapper {
            name: None,
            ns: None,
            required: true,
        }
    }
}

impl AttributeMapper {
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the attribute name; defaults to the field name.
    pub fn name(mut self, name: &str) -> Self {
        self.name = Some(name.to_owned());
        self
    }

    /// Sets the attribute's namespace prefix.
    pub fn ns(mut self, ns: &str) -> Self {
        self.ns = Some(ns.to_owned());
        self
    }

    pub fn required(mut self, required: bool) -> Self {
        self.required = required;
        self
    }

    fn qualified_name(&self, name: &str, ns_map: &NsMap) -> ExpandedName {
        match self.ns.as_deref() {
            Some(prefix) if !prefix.is_empty() => ns::qualify(Some(prefix), name, ns_map),
            _ => ExpandedName::new("", name),
        }
    }

    pub(super) fn serialize(
        &self,
        value: Option<&Value>,
        root: &mut Element,
        scope: Scope,
        encoder: &dyn Encoder,
    ) -> Result<bool, ser::Error> {
        let name = self.name.as_deref().unwrap_or(scope.name);
        let value = match value {
            Some(v) => v,
            None if self.required => return Err(ser::Error::missing_attribute(name)),
            None => return Ok(false),
        };
        let text = encoder.encode(expect_scalar(value, name)?);
        let qname = self.qualified_name(name, scope.ns_map);
        trace!("setting attribute {} on {}", &qname, &root.name);
        root.set_attribute(qname, text);
        Ok(true)
    }

    pub(super) fn deserialize(
        &self,
        root: &Element,
        scope: Scope,
        path: &Path,
    ) -> Result<Option<Value>, de::Error> {
        let name = self.name.as_deref().unwrap_or(scope.name);
        let qname = self.qualified_name(name, scope.ns_map);
        match root.attribute(qname.as_ref()) {
            Some(v) => Ok(Some(Value::Scalar(Scalar::Text(v.to_owned())))),
            None if self.required => Err(de::Error::missing_attribute(
                path.display(&ns::tag_name(self.ns.as_deref(), name, None)),
            )),
            None => Ok(None),
        }
    }
}
