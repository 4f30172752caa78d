// Copyright (C) 2021 Scott Lamb <slamb@slamb.org>
// SPDX-License-Identifier: MIT OR Apache-2.0

//! The mapping engine: how one model field is found in, and written into, an
//! element tree.
//!
//! A field's [`Mapper`] is a small tree of variants, e.g. the field
//! `emails` of
//!
//! ```text
//! <user><contacts><email>a</email><email>b</email></contacts></user>
//! ```
//!
//! is `Wrapper("contacts", List(Element("email")))`. Each variant knows two
//! operations. Serialization writes into the parent element and reports
//! whether anything was written, so that empty wrappers and models are
//! dropped rather than emitted as empty shells. Deserialization reads from the
//! parent element and yields a [`Value`], or nothing for an absent optional
//! node.
//!
//! Names, namespaces and indices not set on a mapper are inherited from the
//! context it's called in: the field name, the enclosing model's namespace and
//! namespace map, and (within a list) the item's position.

mod attribute;
mod element;
mod list;
mod nested;
mod wrapper;

pub use attribute::AttributeMapper;
pub use element::ElementMapper;
pub use list::ListMapper;
pub use nested::ModelMapper;
pub use wrapper::{WrapperBuilder, WrapperMapper};

use crate::encode::{Encoder, Scalar};
use crate::ns::NsMap;
use crate::value::Value;
use crate::{de, ser, Element, ExpandedName};

/// Mapping of one model field to a part of the element tree.
#[derive(Clone, Debug)]
pub enum Mapper {
    Attribute(AttributeMapper),
    Element(ElementMapper),
    Wrapper(WrapperMapper),
    List(ListMapper),
    Model(ModelMapper),
}

impl Mapper {
    /// True if absence of this mapper's node is an error.
    ///
    /// Wrappers and lists report the requiredness of what they wrap.
    pub fn required(&self) -> bool {
        match self {
            Mapper::Attribute(m) => m.required,
            Mapper::Element(m) => m.required,
            Mapper::Wrapper(m) => m.required(),
            Mapper::List(m) => m.required(),
            Mapper::Model(m) => m.required,
        }
    }

    /// Writes `value` into `root`, returning true iff something was written.
    pub(crate) fn serialize(
        &self,
        value: Option<&Value>,
        root: &mut Element,
        scope: Scope,
        encoder: &dyn Encoder,
    ) -> Result<bool, ser::Error> {
        match self {
            Mapper::Attribute(m) => m.serialize(value, root, scope, encoder),
            Mapper::Element(m) => m.serialize(value, root, scope, encoder),
            Mapper::Wrapper(m) => m.serialize(value, root, scope, encoder),
            Mapper::List(m) => m.serialize(value, root, scope, encoder),
            Mapper::Model(m) => m.serialize(value, root, scope, encoder),
        }
    }

    /// Reads this mapper's value from `root`, returning `None` if it's absent
    /// and optional.
    pub(crate) fn deserialize(
        &self,
        root: &Element,
        scope: Scope,
        path: &Path,
    ) -> Result<Option<Value>, de::Error> {
        match self {
            Mapper::Attribute(m) => m.deserialize(root, scope, path),
            Mapper::Element(m) => m.deserialize(root, scope, path),
            Mapper::Wrapper(m) => m.deserialize(root, scope, path),
            Mapper::List(m) => m.deserialize(root, scope, path),
            Mapper::Model(m) => m.deserialize(root, scope, path),
        }
    }

    /// Returns the name of the sibling elements a list of this mapper iterates over.
    ///
    /// `None` for mappers which aren't repeatable elements.
    fn repeated_name(&self, scope: Scope) -> Option<ExpandedName> {
        match self {
            Mapper::Attribute(_) => None,
            Mapper::Element(m) => Some(m.qualified_name(scope)),
            Mapper::Wrapper(m) => Some(m.qualified_name(scope)),
            Mapper::List(_) => None,
            Mapper::Model(m) => Some(m.qualified_name(scope)),
        }
    }
}

impl From<AttributeMapper> for Mapper {
    fn from(m: AttributeMapper) -> Self {
        Mapper::Attribute(m)
    }
}

impl From<ElementMapper> for Mapper {
    fn from(m: ElementMapper) -> Self {
        Mapper::Element(m)
    }
}

impl From<WrapperMapper> for Mapper {
    fn from(m: WrapperMapper) -> Self {
        Mapper::Wrapper(m)
    }
}

impl From<ListMapper> for Mapper {
    fn from(m: ListMapper) -> Self {
        Mapper::List(m)
    }
}

impl From<ModelMapper> for Mapper {
    fn from(m: ModelMapper) -> Self {
        Mapper::Model(m)
    }
}

/// Ambient context a mapper is invoked in.
#[derive(Copy, Clone, Debug)]
pub(crate) struct Scope<'a> {
    /// The field name, used when the mapper has no name of its own.
    pub(crate) name: &'a str,

    /// The inherited namespace prefix.
    pub(crate) ns: Option<&'a str>,
    pub(crate) ns_map: &'a NsMap,

    /// The position assigned by an enclosing list, which beats the mapper's own index.
    pub(crate) idx: Option<usize>,
}

impl<'a> Scope<'a> {
    pub(crate) fn root(ns_map: &'a NsMap) -> Self {
        Scope {
            name: "",
            ns: None,
            ns_map,
            idx: None,
        }
    }

    fn with_idx(self, idx: usize) -> Self {
        Scope {
            idx: Some(idx),
            ..self
        }
    }
}

/// Tags leading to the current element, for diagnostics.
#[derive(Copy, Clone, Debug)]
pub(crate) enum Path<'a> {
    /// The envelope segments (if any) above the top-level model.
    Root(&'a [&'a str]),
    Child(&'a Path<'a>, &'a str),
}

impl<'a> Path<'a> {
    pub(crate) fn root(segments: &'a [&'a str]) -> Self {
        Path::Root(segments)
    }

    fn child(&'a self, tag: &'a str) -> Path<'a> {
        Path::Child(self, tag)
    }

    fn push_segments(&self, out: &mut Vec<&'a str>) {
        match *self {
            Path::Root(segments) => out.extend_from_slice(segments),
            Path::Child(parent, tag) => {
                parent.push_segments(out);
                out.push(tag);
            }
        }
    }

    /// Returns the slash-joined path to `last` below this path, e.g. `/a[1]/b[1]/last`.
    fn display(&self, last: &str) -> String {
        let mut segments = Vec::new();
        self.push_segments(&mut segments);
        let mut out = String::new();
        for segment in segments.into_iter().chain(std::iter::once(last)) {
            out.push('/');
            out.push_str(segment);
        }
        out
    }
}

/// Checks that writing the `idx`th `name` under `root` leaves no gap, returning
/// the number of such elements already present.
fn check_index(
    root: &Element,
    name: &ExpandedName,
    local_name: &str,
    idx: usize,
) -> Result<usize, ser::Error> {
    let count = root.count(name.as_ref());
    if idx > count + 1 {
        return Err(ser::Error::index_gap(local_name, idx));
    }
    Ok(count)
}

fn expect_scalar<'v>(value: &'v Value, name: &str) -> Result<&'v Scalar, ser::Error> {
    match value {
        Value::Scalar(s) => Ok(s),
        other => Err(ser::Error::unexpected_value(name, "a scalar", other)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn path_display() {
        let root = Path::root(&["envelope"]);
        assert_eq!(root.display("test_model[1]"), "/envelope/test_model[1]");
        let child = root.child("test_model[1]");
        let grandchild = child.child("wrapper[1]");
        assert_eq!(
            grandchild.display("element[1]"),
            "/envelope/test_model[1]/wrapper[1]/element[1]"
        );
        assert_eq!(Path::root(&[]).display("attribute"), "/attribute");
    }
}
