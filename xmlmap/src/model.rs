// Copyright (C) 2021 Scott Lamb <slamb@slamb.org>
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Models and their descriptors.

use std::collections::BTreeSet;

use crate::mapper::Mapper;
use crate::ns::NsMap;
use crate::value::{constructor_key, Record};
use crate::BoxedStdError;

/// A type mapped to an XML element.
///
/// Usually implemented via `#[derive(xmlmap_derive::Model)]`.
pub trait Model: Sized {
    /// Returns the type's descriptor, built once.
    fn descriptor() -> &'static ModelDescriptor;

    /// Returns the values of all fields which are set.
    fn to_record(&self) -> Record;

    /// Builds the model, taking its fields' values out of `record`.
    ///
    /// Entries not belonging to this model are left in place; a flattened base
    /// model's fields are taken by the base's `from_record`.
    fn from_record(record: &mut Record) -> Result<Self, BoxedStdError>;
}

/// One field of a model and how it's mapped.
#[derive(Clone, Debug)]
pub struct Binding {
    name: String,
    mapper: Mapper,
}

impl Binding {
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn mapper(&self) -> &Mapper {
        &self.mapper
    }
}

/// A model's element name, namespace settings, and field bindings.
#[derive(Debug)]
pub struct ModelDescriptor {
    type_name: &'static str,
    name: Option<String>,
    ns: Option<String>,
    ns_map: NsMap,
    fields: Vec<Binding>,

    /// Indices into `fields` in serialization order.
    order: Vec<usize>,
}

impl ModelDescriptor {
    pub fn builder(type_name: &'static str) -> ModelBuilder {
        ModelBuilder {
            type_name,
            name: None,
            ns: None,
            ns_map: NsMap::new(),
            order: None,
            fields: Vec::new(),
        }
    }

    pub fn type_name(&self) -> &'static str {
        self.type_name
    }

    /// Returns the element name: the declared name, or else the type name.
    pub fn name(&self) -> &str {
        self.name.as_deref().unwrap_or(self.type_name)
    }

    pub fn ns(&self) -> Option<&str> {
        self.ns.as_deref()
    }

    pub fn ns_map(&self) -> &NsMap {
        &self.ns_map
    }

    /// Returns the bindings in declaration order (flattened bases first).
    pub fn fields(&self) -> &[Binding] {
        &self.fields
    }

    /// Returns the bindings in serialization order.
    ///
    /// With a declared order, the named fields come first as listed and the
    /// rest follow in declaration order.
    pub fn ordered(&self) -> impl Iterator<Item = &Binding> + '_ {
        self.order.iter().map(move |&i| &self.fields[i])
    }
}

/// Builds a [`ModelDescriptor`].
#[must_use]
pub struct ModelBuilder {
    type_name: &'static str,
    name: Option<String>,
    ns: Option<String>,
    ns_map: NsMap,
    order: Option<Vec<String>>,
    fields: Vec<Binding>,
}

impl ModelBuilder {
    pub fn name(mut self, name: &str) -> Self {
        self.name = Some(name.to_owned());
        self
    }

    pub fn ns(mut self, ns: &str) -> Self {
        self.ns = Some(ns.to_owned());
        self
    }

    pub fn namespace(mut self, prefix: &str, uri: &str) -> Self {
        self.ns_map.insert(prefix.to_owned(), uri.to_owned());
        self
    }

    /// Declares the serialization order by field name.
    pub fn order<I, S>(mut self, order: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.order = Some(order.into_iter().map(Into::into).collect());
        self
    }

    pub fn field(mut self, name: &str, mapper: impl Into<Mapper>) -> Self {
        self.fields.push(Binding {
            name: name.to_owned(),
            mapper: mapper.into(),
        });
        self
    }

    /// Splices in the bindings of a base model at this point, in the base's
    /// serialization order.
    ///
    /// The base's name and namespace don't carry over.
    pub fn flatten(mut self, base: fn() -> &'static ModelDescriptor) -> Self {
        self.fields.extend(base().ordered().cloned());
        self
    }

    pub fn build(self) -> Result<ModelDescriptor, DeclarationError> {
        let mut seen = BTreeSet::new();
        for f in &self.fields {
            if !seen.insert(constructor_key(&f.name)) {
                return Err(DeclarationError::DuplicateField {
                    model: self.type_name,
                    field: f.name.clone(),
                });
            }
        }
        let order = match self.order {
            None => (0..self.fields.len()).collect(),
            Some(names) => {
                let mut order = Vec::with_capacity(self.fields.len());
                for n in &names {
                    let i = self
                        .fields
                        .iter()
                        .position(|f| f.name == *n)
                        .ok_or_else(|| DeclarationError::UnknownOrderField {
                            model: self.type_name,
                            field: n.clone(),
                        })?;
                    if order.contains(&i) {
                        return Err(DeclarationError::DuplicateOrderField {
                            model: self.type_name,
                            field: n.clone(),
                        });
                    }
                    order.push(i);
                }
                for i in 0..self.fields.len() {
                    if !order.contains(&i) {
                        order.push(i);
                    }
                }
                order
            }
        };
        Ok(ModelDescriptor {
            type_name: self.type_name,
            name: self.name,
            ns: self.ns,
            ns_map: self.ns_map,
            fields: self.fields,
            order,
        })
    }
}

/// An inconsistent model declaration.
#[derive(Clone, Debug, Eq, PartialEq)]
pub enum DeclarationError {
    UnknownOrderField { model: &'static str, field: String },
    DuplicateOrderField { model: &'static str, field: String },

    /// Two fields share a constructor name, e.g. `_a` and `a`.
    DuplicateField { model: &'static str, field: String },
}

impl std::fmt::Display for DeclarationError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            DeclarationError::UnknownOrderField { model, field } => {
                write!(f, "{}: order names unknown field {}", model, field)
            }
            DeclarationError::DuplicateOrderField { model, field } => {
                write!(f, "{}: order names field {} twice", model, field)
            }
            DeclarationError::DuplicateField { model, field } => {
                write!(f, "{}: field {} duplicates another field's name", model, field)
            }
        }
    }
}

impl std::error::Error for DeclarationError {}
