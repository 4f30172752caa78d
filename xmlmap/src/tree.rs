// Copyright (C) 2021 Scott Lamb <slamb@slamb.org>
// SPDX-License-Identifier: MIT OR Apache-2.0

//! In-memory element tree which the mappers read from and write into.

use log::trace;
use xml::{common::Position, reader::XmlEvent};

use crate::de::{Error, StackElement};
use crate::{ExpandedName, ExpandedNameRef};

/// An XML element with its attributes, leading text, and child elements.
///
/// `text` is the character data before the first child element, if any. Text
/// following child elements is not retained; mapped leaf elements have no
/// children, and container elements don't carry text.
#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct Element {
    pub name: ExpandedName,
    pub attributes: Vec<(ExpandedName, String)>,
    pub text: Option<String>,
    pub children: Vec<Element>,
}

impl Element {
    pub fn new(name: ExpandedName) -> Self {
        Element {
            name,
            ..Default::default()
        }
    }

    /// Returns an unnamed element, used to hold a document's root element so
    /// that the root can be looked up like any other child.
    pub fn anonymous() -> Self {
        Element::default()
    }

    /// Parses a whole document, returning its root element.
    pub fn parse<R: std::io::Read>(source: R) -> Result<Element, Error> {
        let mut reader = xml::reader::EventReader::new(source);
        let mut stack: Vec<StackElement> = Vec::new();
        let mut open: Vec<Element> = Vec::new();
        let mut root = None;
        loop {
            match reader.next() {
                Ok(XmlEvent::StartElement {
                    name, attributes, ..
                }) => {
                    let pos = reader.position();
                    trace!("Starting {}, new depth {}", &name, open.len() + 1);
                    let mut element =
                        Element::new(ExpandedNameRef::from_xml_name(&name.borrow()).into());
                    element.attributes = attributes
                        .iter()
                        .map(|a| {
                            (
                                ExpandedNameRef::from_xml_name(&a.name.borrow()).into(),
                                a.value.clone(),
                            )
                        })
                        .collect();
                    stack.push(StackElement { name, pos });
                    open.push(element);
                }
                Ok(XmlEvent::EndElement { name }) => {
                    trace!("Ending {}, new depth {}", &name, open.len().saturating_sub(1));
                    let element = match open.pop() {
                        Some(e) => e,
                        None => {
                            return Err(Error::msg(
                                &stack,
                                reader.position(),
                                format!("unbalanced end element {}", &name),
                            ))
                        }
                    };
                    stack.pop();
                    match open.last_mut() {
                        Some(parent) => parent.children.push(element),
                        None => root = Some(element),
                    }
                }
                Ok(XmlEvent::Characters(s))
                | Ok(XmlEvent::CData(s))
                | Ok(XmlEvent::Whitespace(s)) => {
                    if let Some(current) = open.last_mut() {
                        current.push_text(&s);
                    }
                }
                Ok(XmlEvent::EndDocument) => break,
                Ok(XmlEvent::StartDocument { .. })
                | Ok(XmlEvent::Comment(_))
                | Ok(XmlEvent::ProcessingInstruction { .. }) => continue,
                Err(e) => return Err(Error::xml(&stack, e)),
            }
        }
        root.ok_or_else(|| {
            Error::msg(
                &[],
                reader.position(),
                "document has no root element".to_owned(),
            )
        })
    }

    /// Appends character data, unless a child element has already been seen.
    fn push_text(&mut self, s: &str) {
        if !self.children.is_empty() {
            return;
        }
        match self.text {
            Some(ref mut text) => text.push_str(s),
            None => self.text = Some(s.to_owned()),
        }
    }

    pub fn set_text(&mut self, text: String) {
        self.text = Some(text);
    }

    pub fn push_child(&mut self, child: Element) {
        self.children.push(child);
    }

    /// Returns the value of the given attribute, if present.
    pub fn attribute(&self, name: ExpandedNameRef) -> Option<&str> {
        self.attributes
            .iter()
            .find(|(n, _)| n.as_ref() == name)
            .map(|(_, v)| v.as_str())
    }

    /// Sets the given attribute, replacing any existing value.
    pub fn set_attribute(&mut self, name: ExpandedName, value: String) {
        match self.attributes.iter_mut().find(|(n, _)| *n == name) {
            Some((_, v)) => *v = value,
            None => self.attributes.push((name, value)),
        }
    }

    /// Iterates over child elements with the given name, in document order.
    pub fn find_all<'a>(
        &'a self,
        name: ExpandedNameRef<'a>,
    ) -> impl Iterator<Item = &'a Element> + 'a {
        self.children.iter().filter(move |c| c.name.as_ref() == name)
    }

    /// Returns the `idx`th (1-based) child element with the given name.
    pub fn find(&self, name: ExpandedNameRef, idx: usize) -> Option<&Element> {
        let skip = idx.checked_sub(1)?;
        self.children
            .iter()
            .filter(|c| c.name.as_ref() == name)
            .nth(skip)
    }

    /// Like [`Element::find`] but mutable.
    pub fn find_mut(&mut self, name: ExpandedNameRef, idx: usize) -> Option<&mut Element> {
        let skip = idx.checked_sub(1)?;
        self.children
            .iter_mut()
            .filter(|c| c.name.as_ref() == name)
            .nth(skip)
    }

    /// Returns the number of child elements with the given name.
    pub fn count(&self, name: ExpandedNameRef) -> usize {
        self.find_all(name).count()
    }

    /// Returns the first descendant reached by following `path` one child
    /// level per segment, searching depth-first in document order.
    pub fn find_path(&self, path: &[ExpandedName]) -> Option<&Element> {
        let (first, rest) = match path.split_first() {
            None => return Some(self),
            Some(p) => p,
        };
        self.children
            .iter()
            .filter(|c| c.name == *first)
            .find_map(|child| child.find_path(rest))
    }
}

impl std::str::FromStr for Element {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Element::parse(s.as_bytes())
    }
}
