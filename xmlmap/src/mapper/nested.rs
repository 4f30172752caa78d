// Copyright (C) 2021 Scott Lamb <slamb@slamb.org>
// SPDX-License-Identifier: MIT OR Apache-2.0

use log::trace;

use super::{check_index, Path, Scope};
use crate::encode::Encoder;
use crate::model::{Model, ModelDescriptor};
use crate::ns::{self, NsMap};
use crate::value::{Record, Value};
use crate::{de, ser, Element, ExpandedName};

/// Maps a field (or a whole document) to an element holding a nested model.
#[derive(Clone, Debug)]
pub struct ModelMapper {
    descriptor: fn() -> &'static ModelDescriptor,
    name: Option<String>,
    ns: Option<String>,
    ns_map: NsMap,
    idx: Option<usize>,
    pub(super) required: bool,
}

/// The element name and namespace settings in effect for one call.
struct Resolved<'a> {
    descriptor: &'static ModelDescriptor,
    name: &'a str,
    ns: Option<&'a str>,
    ns_map: NsMap,
    idx: usize,
}

impl ModelMapper {
    pub fn of<M: Model>() -> Self {
        ModelMapper {
            descriptor: M::descriptor,
            name: None,
            ns: None,
            ns_map: NsMap::new(),
            idx: None,
            required: true,
        }
    }

    /// Overrides the model's element name.
    pub fn name(mut self, name: &str) -> Self {
        self.name = Some(name.to_owned());
        self
    }

    /// Overrides the model's namespace prefix.
    pub fn ns(mut self, ns: &str) -> Self {
        self.ns = Some(ns.to_owned());
        self
    }

    /// Adds a prefix which takes precedence over the model's own.
    pub fn namespace(mut self, prefix: &str, uri: &str) -> Self {
        self.ns_map.insert(prefix.to_owned(), uri.to_owned());
        self
    }

    /// Adds all of `ns_map`, as with [`ModelMapper::namespace`].
    pub fn namespaces(mut self, ns_map: NsMap) -> Self {
        self.ns_map.extend(ns_map);
        self
    }

    /// Selects the `idx`th (1-based) same-named sibling.
    pub fn index(mut self, idx: usize) -> Self {
        self.idx = Some(idx);
        self
    }

    pub fn required(mut self, required: bool) -> Self {
        self.required = required;
        self
    }

    pub fn descriptor(&self) -> &'static ModelDescriptor {
        (self.descriptor)()
    }

    fn resolve<'a>(&'a self, scope: Scope<'a>) -> Resolved<'a> {
        let descriptor = self.descriptor();
        Resolved {
            descriptor,
            name: self.name.as_deref().unwrap_or_else(|| descriptor.name()),
            ns: self.ns.as_deref().or_else(|| descriptor.ns()).or(scope.ns),
            ns_map: ns::merge(
                &ns::merge(&self.ns_map, descriptor.ns_map()),
                scope.ns_map,
            ),
            idx: scope.idx.or(self.idx).unwrap_or(1),
        }
    }

    pub(super) fn qualified_name(&self, scope: Scope) -> ExpandedName {
        let r = self.resolve(scope);
        ns::qualify(r.ns, r.name, &r.ns_map)
    }

    pub(crate) fn serialize(
        &self,
        value: Option<&Value>,
        root: &mut Element,
        scope: Scope,
        encoder: &dyn Encoder,
    ) -> Result<bool, ser::Error> {
        let r = self.resolve(scope);
        let qname = ns::qualify(r.ns, r.name, &r.ns_map);
        check_index(root, &qname, r.name, r.idx)?;
        let record = match value {
            Some(Value::Record(record)) => record,
            Some(other) => return Err(ser::Error::unexpected_value(r.name, "a record", other)),
            None if self.required => return Err(ser::Error::missing_element(r.name)),
            None => return Ok(false),
        };
        let mut element = Element::new(qname);
        let written = serialize_fields(&r, record, &mut element, encoder)?;
        if !written {
            trace!("dropping empty {}", &element.name);
            return Ok(false);
        }
        trace!("appending {}[{}] to {}", &element.name, r.idx, &root.name);
        root.push_child(element);
        Ok(true)
    }

    pub(crate) fn deserialize(
        &self,
        root: &Element,
        scope: Scope,
        path: &Path,
    ) -> Result<Option<Value>, de::Error> {
        let r = self.resolve(scope);
        let qname = ns::qualify(r.ns, r.name, &r.ns_map);
        let tag = ns::tag_name(r.ns, r.name, Some(r.idx));
        let element = match root.find(qname.as_ref(), r.idx) {
            Some(e) => e,
            None if self.required => return Err(de::Error::missing_element(path.display(&tag))),
            None => return Ok(None),
        };
        let path = path.child(&tag);
        let mut record = Record::new();
        for binding in r.descriptor.fields() {
            let scope = Scope {
                name: binding.name(),
                ns: r.ns,
                ns_map: &r.ns_map,
                idx: None,
            };
            if let Some(value) = binding.mapper().deserialize(element, scope, &path)? {
                record.insert(binding.name(), value);
            }
        }
        Ok(Some(Value::Record(record)))
    }
}

/// Writes each field of `record` into `element` in resolved order.
fn serialize_fields(
    r: &Resolved,
    record: &Record,
    element: &mut Element,
    encoder: &dyn Encoder,
) -> Result<bool, ser::Error> {
    let mut written = false;
    for binding in r.descriptor.ordered() {
        let scope = Scope {
            name: binding.name(),
            ns: r.ns,
            ns_map: &r.ns_map,
            idx: None,
        };
        written |= binding
            .mapper()
            .serialize(record.get(binding.name()), element, scope, encoder)?;
    }
    Ok(written)
}
