// Copyright (C) 2021 Scott Lamb <slamb@slamb.org>
// SPDX-License-Identifier: MIT OR Apache-2.0

use log::debug;

use super::{Mapper, Path, Scope};
use crate::encode::Encoder;
use crate::value::Value;
use crate::{de, ser, Element};

/// Maps a sequence field to repeated siblings, item `i` (1-based) at index `i`.
#[derive(Clone, Debug)]
pub struct ListMapper {
    wrapped: Box<Mapper>,
}

impl ListMapper {
    pub fn new(inner: impl Into<Mapper>) -> Self {
        ListMapper {
            wrapped: Box::new(inner.into()),
        }
    }

    pub(super) fn required(&self) -> bool {
        self.wrapped.required()
    }

    pub(super) fn serialize(
        &self,
        value: Option<&Value>,
        root: &mut Element,
        scope: Scope,
        encoder: &dyn Encoder,
    ) -> Result<bool, ser::Error> {
        let items = match value {
            None => return Ok(false),
            Some(Value::List(items)) => items,
            Some(other) => return Err(ser::Error::unexpected_value(scope.name, "a list", other)),
        };
        let mut written = false;
        for (i, item) in items.iter().enumerate() {
            written |= self
                .wrapped
                .serialize(Some(item), root, scope.with_idx(i + 1), encoder)?;
        }
        Ok(written)
    }

    pub(super) fn deserialize(
        &self,
        root: &Element,
        scope: Scope,
        path: &Path,
    ) -> Result<Option<Value>, de::Error> {
        let name = match self.wrapped.repeated_name(scope) {
            Some(n) => n,
            None => {
                debug!("list of {:?} has nothing to repeat", &self.wrapped);
                return Ok(Some(Value::List(Vec::new())));
            }
        };
        let count = root.count(name.as_ref());
        let mut items = Vec::with_capacity(count);
        for idx in 1..=count {
            if let Some(item) = self.wrapped.deserialize(root, scope.with_idx(idx), path)? {
                items.push(item);
            }
        }
        Ok(Some(Value::List(items)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::encode::Scalar;
    use crate::mapper::{AttributeMapper, ElementMapper, WrapperMapper};
    use crate::ns::NsMap;
    use crate::ExpandedName;
    use assert_matches::assert_matches;
    use std::str::FromStr;

    fn texts(items: &[&str]) -> Value {
        Value::List(
            items
                .iter()
                .map(|s| Value::Scalar(Scalar::Text((*s).to_owned())))
                .collect(),
        )
    }

    #[test]
    fn round_trip_through_wrappers() {
        let empty = NsMap::new();
        let scope = Scope {
            name: "element",
            ..Scope::root(&empty)
        };
        let mapper = ListMapper::new(WrapperMapper::builder("wrapper").wrap(ElementMapper::new()));
        let mut root = Element::new(ExpandedName::new("", "root"));
        let value = texts(&["1", "2", "3"]);
        assert!(mapper
            .serialize(Some(&value), &mut root, scope, &crate::DefaultEncoder)
            .unwrap());
        assert_eq!(root.children.len(), 3);
        assert!(root.children.iter().all(|c| c.children.len() == 1));

        let path = Path::root(&[]);
        assert_eq!(mapper.deserialize(&root, scope, &path).unwrap(), Some(value));
    }

    #[test]
    fn empty() {
        let empty = NsMap::new();
        let scope = Scope {
            name: "element",
            ..Scope::root(&empty)
        };
        let mut root = Element::new(ExpandedName::new("", "root"));
        let mapper = ListMapper::new(ElementMapper::new());
        assert!(!mapper
            .serialize(Some(&texts(&[])), &mut root, scope, &crate::DefaultEncoder)
            .unwrap());
        assert!(!mapper
            .serialize(None, &mut root, scope, &crate::DefaultEncoder)
            .unwrap());
        let path = Path::root(&[]);
        assert_eq!(
            mapper.deserialize(&root, scope, &path).unwrap(),
            Some(texts(&[]))
        );
    }

    #[test]
    fn skips_empty_items() {
        let empty = NsMap::new();
        let scope = Scope {
            name: "e",
            ..Scope::root(&empty)
        };
        let root = Element::from_str("<root><e>1</e><e/><e>3</e></root>").unwrap();
        let path = Path::root(&[]);
        let mapper = ListMapper::new(ElementMapper::new().required(false));
        assert_eq!(
            mapper.deserialize(&root, scope, &path).unwrap(),
            Some(texts(&["1", "3"]))
        );
    }

    #[test]
    fn attributes_do_not_repeat() {
        let empty = NsMap::new();
        let scope = Scope {
            name: "a",
            ..Scope::root(&empty)
        };
        let root = Element::from_str(r#"<root a="1"/>"#).unwrap();
        let path = Path::root(&[]);
        assert_matches!(
            ListMapper::new(AttributeMapper::new()).deserialize(&root, scope, &path),
            Ok(Some(Value::List(items))) if items.is_empty()
        );
    }
}
