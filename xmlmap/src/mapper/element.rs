// Copyright (C) 2021 Scott Lamb <slamb@slamb.org>
// SPDX-License-Identifier: MIT OR Apache-2.0

use log::trace;

use super::{check_index, expect_scalar, Path, Scope};
use crate::encode::{Encoder, Scalar};
use crate::ns::{self, NsMap};
use crate::value::Value;
use crate::{de, ser, Element, ExpandedName};

/// Maps a field to the text of a leaf child element.
#[derive(Clone, Debug)]
pub struct ElementMapper {
    name: Option<String>,
    ns: Option<String>,
    ns_map: NsMap,
    idx: Option<usize>,
    pub(super) required: bool,
}

impl Default for ElementMapper {
    fn default() -> Self {
        ElementMapper {
            name: None,
            ns: None,
            ns_map: NsMap::new(),
            idx: None,
            required: true,
        }
    }
}

impl ElementMapper {
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the element name; defaults to the field name.
    pub fn name(mut self, name: &str) -> Self {
        self.name = Some(name.to_owned());
        self
    }

    /// Sets the namespace prefix; defaults to the enclosing model's.
    pub fn ns(mut self, ns: &str) -> Self {
        self.ns = Some(ns.to_owned());
        self
    }

    /// Adds a prefix to this element's namespace map.
    pub fn namespace(mut self, prefix: &str, uri: &str) -> Self {
        self.ns_map.insert(prefix.to_owned(), uri.to_owned());
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

    pub(super) fn qualified_name(&self, scope: Scope) -> ExpandedName {
        let name = self.name.as_deref().unwrap_or(scope.name);
        let ns = self.ns.as_deref().or(scope.ns);
        ns::qualify(ns, name, &ns::merge(&self.ns_map, scope.ns_map))
    }

    pub(super) fn serialize(
        &self,
        value: Option<&Value>,
        root: &mut Element,
        scope: Scope,
        encoder: &dyn Encoder,
    ) -> Result<bool, ser::Error> {
        let name = self.name.as_deref().unwrap_or(scope.name);
        let idx = scope.idx.or(self.idx).unwrap_or(1);
        let qname = self.qualified_name(scope);
        check_index(root, &qname, name, idx)?;
        let value = match value {
            Some(v) => v,
            None if self.required => return Err(ser::Error::missing_element(name)),
            None => return Ok(false),
        };
        let mut element = Element::new(qname);
        element.set_text(encoder.encode(expect_scalar(value, name)?));
        trace!("appending {}[{}] to {}", &element.name, idx, &root.name);
        root.push_child(element);
        Ok(true)
    }

    pub(super) fn deserialize(
        &self,
        root: &Element,
        scope: Scope,
        path: &Path,
    ) -> Result<Option<Value>, de::Error> {
        let name = self.name.as_deref().unwrap_or(scope.name);
        let idx = scope.idx.or(self.idx).unwrap_or(1);
        let qname = self.qualified_name(scope);
        match root.find(qname.as_ref(), idx).and_then(|e| e.text.as_ref()) {
            Some(text) => Ok(Some(Value::Scalar(Scalar::Text(text.clone())))),
            None if self.required => {
                let ns = self.ns.as_deref().or(scope.ns);
                Err(de::Error::missing_element(
                    path.display(&ns::tag_name(ns, name, Some(idx))),
                ))
            }
            None => Ok(None),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::de::ErrorKind;
    use assert_matches::assert_matches;
    use std::str::FromStr;

    fn text(s: &str) -> Value {
        Value::Scalar(Scalar::Text(s.to_owned()))
    }

    #[test]
    fn index_gap() {
        let empty = NsMap::new();
        let scope = Scope {
            name: "element",
            ..Scope::root(&empty)
        };
        let mut root = Element::new(ExpandedName::new("", "root"));
        let second = ElementMapper::new().index(2);
        let e = second
            .serialize(Some(&text("2")), &mut root, scope, &crate::DefaultEncoder)
            .unwrap_err();
        assert_eq!(
            e.to_string(),
            "serialization can't be completed because element[2] is going to be \
             serialized, but element[1] is not serialized."
        );
        assert!(ElementMapper::new()
            .serialize(Some(&text("1")), &mut root, scope, &crate::DefaultEncoder)
            .unwrap());
        assert!(second
            .serialize(Some(&text("2")), &mut root, scope, &crate::DefaultEncoder)
            .unwrap());
        assert_eq!(root.count(ExpandedName::new("", "element").as_ref()), 2);
    }

    #[test]
    fn gap_beats_optional() {
        let empty = NsMap::new();
        let scope = Scope {
            name: "element",
            ..Scope::root(&empty)
        };
        let mut root = Element::new(ExpandedName::new("", "root"));
        let e = ElementMapper::new()
            .index(3)
            .required(false)
            .serialize(None, &mut root, scope, &crate::DefaultEncoder)
            .unwrap_err();
        assert!(e.to_string().contains("element[3]"));
    }

    #[test]
    fn empty_text_is_absent() {
        let mut ns_map = NsMap::new();
        ns_map.insert("data".to_owned(), "http://data".to_owned());
        let scope = Scope {
            name: "element",
            ns: Some("data"),
            ns_map: &ns_map,
            idx: None,
        };
        let root =
            Element::from_str(r#"<root xmlns:data="http://data"><data:element/></root>"#).unwrap();
        let segments = ["root"];
        let path = Path::root(&segments);
        assert_matches!(
            ElementMapper::new()
                .required(false)
                .deserialize(&root, scope, &path),
            Ok(None)
        );
        let e = ElementMapper::new()
            .deserialize(&root, scope, &path)
            .unwrap_err();
        assert_matches!(
            e.kind(),
            ErrorKind::MissingElement { path } if path == "/root/data:element[1]"
        );
    }

    #[test]
    fn list_index_beats_own_index() {
        let empty = NsMap::new();
        let scope = Scope {
            name: "e",
            ..Scope::root(&empty)
        };
        let root = Element::from_str("<root><e>1</e><e>2</e></root>").unwrap();
        let path = Path::root(&[]);
        let mapper = ElementMapper::new().index(2);
        assert_matches!(
            mapper.deserialize(&root, scope, &path),
            Ok(Some(Value::Scalar(Scalar::Text(t)))) if t == "2"
        );
        assert_matches!(
            mapper.deserialize(&root, scope.with_idx(1), &path),
            Ok(Some(Value::Scalar(Scalar::Text(t)))) if t == "1"
        );
    }
}
