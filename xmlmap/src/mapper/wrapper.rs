// Copyright (C) 2021 Scott Lamb <slamb@slamb.org>
// SPDX-License-Identifier: MIT OR Apache-2.0

use log::trace;

use super::{check_index, Mapper, Path, Scope};
use crate::encode::Encoder;
use crate::ns::{self, NsMap};
use crate::value::Value;
use crate::{de, ser, Element, ExpandedName};

/// Maps a field through a container element.
///
/// A multi-segment path such as `a/b/c` is a chain of single-segment
/// wrappers. The index applies to the first segment only.
#[derive(Clone, Debug)]
pub struct WrapperMapper {
    name: String,
    ns: Option<String>,
    ns_map: NsMap,
    idx: Option<usize>,
    wrapped: Box<Mapper>,
}

/// Builds a [`WrapperMapper`] chain; see [`WrapperMapper::builder`].
#[derive(Clone, Debug)]
pub struct WrapperBuilder {
    path: String,
    ns: Option<String>,
    ns_map: NsMap,
    idx: Option<usize>,
}

impl WrapperMapper {
    /// Starts a wrapper along `path`, a `/`-separated list of element names.
    ///
    /// A segment may carry its own `prefix:` which beats the builder's [`ns`](WrapperBuilder::ns).
    pub fn builder(path: &str) -> WrapperBuilder {
        WrapperBuilder {
            path: path.to_owned(),
            ns: None,
            ns_map: NsMap::new(),
            idx: None,
        }
    }

    pub(super) fn required(&self) -> bool {
        self.wrapped.required()
    }

    pub(super) fn qualified_name(&self, scope: Scope) -> ExpandedName {
        ns::qualify(
            self.ns.as_deref().or(scope.ns),
            &self.name,
            &ns::merge(&self.ns_map, scope.ns_map),
        )
    }

    pub(super) fn serialize(
        &self,
        value: Option<&Value>,
        root: &mut Element,
        scope: Scope,
        encoder: &dyn Encoder,
    ) -> Result<bool, ser::Error> {
        let ns = self.ns.as_deref().or(scope.ns);
        let ns_map = ns::merge(&self.ns_map, scope.ns_map);
        let idx = scope.idx.or(self.idx).unwrap_or(1);
        let qname = ns::qualify(ns, &self.name, &ns_map);
        let count = check_index(root, &qname, &self.name, idx)?;
        let inner = Scope {
            name: scope.name,
            ns,
            ns_map: &ns_map,
            idx: None,
        };
        if idx <= count {
            trace!("reusing {}[{}] in {}", &qname, idx, &root.name);
            return match root.find_mut(qname.as_ref(), idx) {
                Some(container) => self.wrapped.serialize(value, container, inner, encoder),
                None => Ok(false),
            };
        }
        let mut container = Element::new(qname);
        if !self.wrapped.serialize(value, &mut container, inner, encoder)? {
            return Ok(false);
        }
        trace!("appending {}[{}] to {}", &container.name, idx, &root.name);
        root.push_child(container);
        Ok(true)
    }

    pub(super) fn deserialize(
        &self,
        root: &Element,
        scope: Scope,
        path: &Path,
    ) -> Result<Option<Value>, de::Error> {
        let ns = self.ns.as_deref().or(scope.ns);
        let ns_map = ns::merge(&self.ns_map, scope.ns_map);
        let idx = scope.idx.or(self.idx).unwrap_or(1);
        let qname = ns::qualify(ns, &self.name, &ns_map);
        let tag = ns::tag_name(ns, &self.name, Some(idx));
        let container = match root.find(qname.as_ref(), idx) {
            Some(c) => c,
            None if self.required() => return Err(de::Error::missing_element(path.display(&tag))),
            None => return Ok(None),
        };
        let inner = Scope {
            name: scope.name,
            ns,
            ns_map: &ns_map,
            idx: None,
        };
        self.wrapped.deserialize(container, inner, &path.child(&tag))
    }
}

impl WrapperBuilder {
    /// Sets the namespace prefix of every segment without its own.
    pub fn ns(mut self, ns: &str) -> Self {
        self.ns = Some(ns.to_owned());
        self
    }

    /// Adds a prefix to the namespace map of every segment.
    pub fn namespace(mut self, prefix: &str, uri: &str) -> Self {
        self.ns_map.insert(prefix.to_owned(), uri.to_owned());
        self
    }

    /// Selects the `idx`th (1-based) same-named container for the first segment.
    pub fn index(mut self, idx: usize) -> Self {
        self.idx = Some(idx);
        self
    }

    /// Finishes the chain around `inner`.
    ///
    /// An empty path wraps nothing and returns `inner` itself.
    pub fn wrap(self, inner: impl Into<Mapper>) -> Mapper {
        let segments: Vec<&str> = self.path.split('/').filter(|s| !s.is_empty()).collect();
        let mut mapper = inner.into();
        for (i, segment) in segments.iter().enumerate().rev() {
            let (prefix, local) = ns::split_tag(segment);
            mapper = Mapper::Wrapper(WrapperMapper {
                name: local.to_owned(),
                ns: prefix.map(str::to_owned).or_else(|| self.ns.clone()),
                ns_map: self.ns_map.clone(),
                idx: if i == 0 { self.idx } else { None },
                wrapped: Box::new(mapper),
            });
        }
        mapper
    }
}
