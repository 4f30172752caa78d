// Copyright (C) 2021 Scott Lamb <slamb@slamb.org>
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Serialization from models to XML.
//!
//! The mappers first build an [`Element`] tree; it's then written out with
//! prefixes chosen from the namespace registry (the caller's namespace map
//! merged over the model's). Namespaces not in the registry get generated
//! prefixes `ns`, `ns2`, and so on.

use std::{
    borrow::Cow,
    collections::{BTreeMap, BTreeSet},
    io::Write,
};

use log::debug;
use xml::writer::XmlEvent;

use crate::encode::{DefaultEncoder, Encoder};
use crate::mapper::{ModelMapper, Scope};
use crate::model::Model;
use crate::ns::{self, NsMap};
use crate::value::Value;
use crate::{Element, ExpandedNameRef, XML_NS};

/// An error while serializing.
#[derive(Clone, Debug)]
pub struct Error(pub String);

impl Error {
    pub fn missing_attribute(name: &str) -> Error {
        Error(format!("required attribute '{}' is not set", name))
    }

    pub fn missing_element(name: &str) -> Error {
        Error(format!("required element '{}' is not set", name))
    }

    /// Writing the `idx`th `name` would skip the `idx - 1`th.
    pub fn index_gap(name: &str, idx: usize) -> Error {
        Error(format!(
            "serialization can't be completed because {name}[{cur}] is going to be serialized, \
             but {name}[{prev}] is not serialized.",
            name = name,
            cur = idx,
            prev = idx - 1
        ))
    }

    pub(crate) fn unexpected_value(name: &str, expected: &str, got: &Value) -> Error {
        Error(format!(
            "field '{}' expected {}, got {}",
            name,
            expected,
            got.kind()
        ))
    }
}

impl std::error::Error for Error {}

impl std::fmt::Display for Error {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> Result<(), std::fmt::Error> {
        self.0.fmt(f)
    }
}

struct WrappedWriter<W: std::io::Write> {
    inner: xml::writer::EventWriter<W>,

    /// When `Some`, all futures writes and the overall operation should fail with this error.
    poison: Option<Error>,
}

/// A type-erased version of [`WrappedWriter`], to avoid monomorphization bloat.
trait ErasedEventWriter {
    /// Writes the element, poisoning the writer on failure.
    fn write(&mut self, event: XmlEvent) -> Result<(), Error>;
}

impl<W: Write> ErasedEventWriter for WrappedWriter<W> {
    fn write(&mut self, event: XmlEvent) -> Result<(), Error> {
        if let Some(ref poison) = self.poison {
            return Err(poison.clone());
        }
        if let Err(e) = self.inner.write(event) {
            let wrapped = Error(e.to_string());
            self.poison = Some(wrapped.clone());
            return Err(wrapped);
        }
        Ok(())
    }
}

/// Builds the start tag for an element: name, namespace mappings, and attributes.
///
/// The element's parent constructs it with its name and inherited prefix
/// mappings; [`write_element`] adds attributes and any missing namespace
/// declarations, then starts it.
struct ElementBuilder<'a> {
    name: ExpandedNameRef<'a>,
    namespaces: NamespacesBuilder<'a>,
    attributes: Vec<(ExpandedNameRef<'a>, &'a str)>,
    writer: &'a mut dyn ErasedEventWriter,
}

impl<'a> ElementBuilder<'a> {
    fn root(name: ExpandedNameRef<'a>, writer: &'a mut dyn ErasedEventWriter) -> Self {
        ElementBuilder {
            name,
            namespaces: NamespacesBuilder::default(),
            attributes: Vec::new(),
            writer,
        }
    }

    fn namespace(&mut self, requested_prefix: &'a str, url: &'a str) {
        self.namespaces.insert(requested_prefix, url);
    }

    /// Ensures `url` has some mapping, requesting prefix `ns` if it must be added.
    fn declare(&mut self, url: &'a str) {
        if !url.is_empty() && url != XML_NS && !self.namespaces.0.contains_key(url) {
            self.namespaces.insert("ns", url);
        }
    }

    fn attribute(&mut self, name: ExpandedNameRef<'a>, value: &'a str) {
        self.declare(name.namespace);
        self.namespaces.attribute(name.namespace);
        self.attributes.push((name, value));
    }

    /// Writes the start event, returning a writer that must be used to finish
    /// the element.
    fn start(self) -> Result<ElementWriter<'a>, Error> {
        let namespaces = self.namespaces.finalize();
        let name = namespaces.resolve_element(&self.name)?;
        let attributes = self
            .attributes
            .iter()
            .map(|(k, v)| {
                Ok(xml::attribute::Attribute {
                    name: namespaces.resolve_attribute(k)?,
                    value: v,
                })
            })
            .collect::<Result<Vec<_>, Error>>()?;
        self.writer.write(XmlEvent::StartElement {
            name,
            attributes: Cow::Owned(attributes),
            namespace: Cow::Borrowed(&namespaces.by_prefix),
        })?;
        Ok(ElementWriter {
            namespaces,
            writer: self.writer,
        })
    }
}

/// Builds the body (element and text node children) of an element.
struct ElementWriter<'a> {
    namespaces: Namespaces<'a>,
    writer: &'a mut dyn ErasedEventWriter,
}

impl<'a> ElementWriter<'a> {
    /// Returns an [`ElementBuilder`] for a child element.
    fn element<'b>(&'b mut self, name: ExpandedNameRef<'b>) -> ElementBuilder<'b>
    where
        'a: 'b,
    {
        ElementBuilder {
            name,
            namespaces: self.namespaces.child(name.namespace),
            attributes: Vec::new(),
            writer: &mut *self.writer,
        }
    }

    fn text(&mut self, text: &str) -> Result<(), Error> {
        self.writer.write(XmlEvent::Characters(text))
    }

    fn finish(self) -> Result<(), Error> {
        self.writer.write(XmlEvent::EndElement { name: None })
    }
}

#[derive(Clone, Debug, Default, Eq, PartialEq)]
struct NamespacesBuilder<'a>(
    /// A mapping from the URL to the assigned prefix.
    ///
    /// `assigned_prefix` is empty in all of the values.
    BTreeMap<&'a str, Namespace<'a>>,
);

impl<'a> NamespacesBuilder<'a> {
    /// Ensures there's at least one mapping for `url`, preferably called `prefix`.
    ///
    /// An empty `prefix` represents the default namespace. `prefix` must not start
    /// with `xml`.
    fn insert(&mut self, requested_prefix: &'a str, url: &'a str) {
        debug_assert!(
            !requested_prefix.starts_with("xml"),
            "prefix {:?} must not start with xml",
            requested_prefix
        );
        use std::collections::btree_map::Entry;
        match self.0.entry(url) {
            Entry::Vacant(e) => {
                e.insert(Namespace {
                    requested_prefix,
                    required: true,
                    assigned_prefix: None,
                    needs_prefix: false,
                });
            }
            Entry::Occupied(mut e) => {
                let e = e.get_mut();
                if !e.required {
                    e.requested_prefix = requested_prefix;
                }
                e.required = true;
            }
        }
    }

    /// Requests that the existing mapping for `url` be usable by attributes.
    fn attribute(&mut self, url: &str) {
        if let Some(ns) = self.0.get_mut(url) {
            ns.required = true;
            ns.needs_prefix = true;
        }
    }

    /// Finalizes the chosen prefixes, returning an immutable `Namespaces`.
    fn finalize(mut self) -> Namespaces<'a> {
        let mut by_prefix = xml::namespace::Namespace::empty();

        // Required mappings go first and always get some prefix, even if the
        // requested one is taken or (for an attribute's namespace) empty.
        for (url, ns) in &mut self.0 {
            if !ns.required {
                continue;
            }

            if !(ns.needs_prefix && ns.requested_prefix.is_empty())
                && by_prefix.put(ns.requested_prefix.to_owned(), url.to_owned())
            {
                ns.assigned_prefix = Some(Cow::Borrowed(ns.requested_prefix));
                continue;
            }

            let (prefix, mut i) = match ns.requested_prefix {
                "" => ("ns", 1),
                p => (p, 2),
            };
            while !by_prefix.put(format!("{}{}", prefix, i), url.to_owned()) {
                i += 1;
            }
            ns.assigned_prefix = Some(Cow::Owned(format!("{}{}", prefix, i)));
        }

        // Inherited mappings keep their prefix only if it's still free.
        for (url, ns) in &mut self.0 {
            if ns.required {
                continue;
            }

            if by_prefix.put(ns.requested_prefix.to_owned(), url.to_owned()) {
                ns.assigned_prefix = Some(Cow::Borrowed(ns.requested_prefix));
            }
        }

        Namespaces {
            by_url: self.0,
            by_prefix,
        }
    }
}

struct Namespaces<'a> {
    /// A mapping from URL to `Namespace` objects with their `requested_prefix` finalized.
    by_url: BTreeMap<&'a str, Namespace<'a>>,

    by_prefix: xml::namespace::Namespace,
}

impl<'a> Namespaces<'a> {
    fn child(&self, namespace: &str) -> NamespacesBuilder {
        let mut child = NamespacesBuilder::default();
        let mut found_namespace = false;
        for (prefix, ns) in &self.by_prefix {
            let required = !found_namespace && ns == namespace;
            found_namespace |= required;
            child.0.insert(
                ns,
                Namespace {
                    requested_prefix: prefix,
                    assigned_prefix: None,
                    required,
                    needs_prefix: false,
                },
            );
        }
        child
    }

    fn resolve_element<'b>(&'b self, name: &ExpandedNameRef<'b>) -> Result<xml::name::Name<'b>, Error>
    where
        'a: 'b,
    {
        let prefix: &str = match self.by_url.get(name.namespace) {
            Some(Namespace {
                assigned_prefix: Some(p),
                required: true,
                ..
            }) => p,
            None if name.namespace == XML_NS => "xml",
            _ if name.namespace.is_empty() => {
                if self.by_prefix.get("").is_some() {
                    return Err(Error(format!(
                        "element {} has no namespace, but a default namespace is set",
                        name
                    )));
                }
                ""
            }
            _ => return Err(Error(format!("element {} uses undeclared namespace", name))),
        };
        Ok(prefixed(name.local_name, prefix))
    }

    fn resolve_attribute<'b>(&'b self, name: &ExpandedNameRef<'b>) -> Result<xml::name::Name<'b>, Error>
    where
        'a: 'b,
    {
        let prefix: &str = if name.namespace.is_empty() {
            ""
        } else {
            match self.by_url.get(name.namespace) {
                Some(Namespace {
                    assigned_prefix: Some(p),
                    ..
                }) if !p.is_empty() => p,
                None if name.namespace == XML_NS => "xml",
                _ => {
                    return Err(Error(format!(
                        "attribute {} uses undeclared namespace",
                        name
                    )))
                }
            }
        };
        Ok(prefixed(name.local_name, prefix))
    }
}

fn prefixed<'b>(local_name: &'b str, prefix: &'b str) -> xml::name::Name<'b> {
    xml::name::Name {
        local_name,
        namespace: None, // unused by xml::writer
        prefix: if prefix.is_empty() { None } else { Some(prefix) },
    }
}

#[derive(Clone, Debug, Default, Eq, PartialEq)]
struct Namespace<'a> {
    /// The prefix which was requested; empty for the default namespace.
    ///
    /// Multiple URLs in a [`Namespaces`] may request the same prefix, but
    /// only one will actually get it.
    requested_prefix: &'a str,

    /// The actual prefix assigned by [`NamespacesBuilder::finalize`].
    ///
    /// May be `None` iff `!required`.
    assigned_prefix: Option<Cow<'a, str>>,

    /// True iff this is an entry expected by the element or an attribute.
    /// False if it's inherited from a parent and should be dropped if the prefix
    /// is unavailable.
    required: bool,

    /// True if `assigned_prefix` must be non-empty; implies `required`.
    ///
    /// Unprefixed attributes (unlike unprefixed elements) are always
    /// unnamespaced.  Thus, a prefix must always be used for a namespace
    /// attribute.
    needs_prefix: bool,
}

/// Writes `element` and its descendants.
fn write_element<'b>(element: &'b Element, mut builder: ElementBuilder<'b>) -> Result<(), Error> {
    builder.declare(&element.name.namespace);
    for (name, value) in &element.attributes {
        builder.attribute(name.as_ref(), value);
    }
    let mut writer = builder.start()?;
    if let Some(text) = element.text.as_deref() {
        writer.text(text)?;
    }
    for child in &element.children {
        let builder = writer.element(child.name.as_ref());
        write_element(child, builder)?;
    }
    writer.finish()
}

fn collect_namespaces<'e>(element: &'e Element, out: &mut BTreeSet<&'e str>) {
    out.insert(&element.name.namespace);
    for (name, _) in &element.attributes {
        out.insert(&name.namespace);
    }
    for child in &element.children {
        collect_namespaces(child, out);
    }
}

const DECLARATION: &str = r#"<?xml version="1.0" encoding="utf-8"?>"#;

/// Writes a whole document rooted at `root`.
///
/// The XML declaration is written here rather than by xml-rs, whose spelling
/// of the encoding varies between releases.
///
/// The root declares each registry prefix whose namespace is used anywhere in the tree.
fn write_document<W: Write>(
    root: &Element,
    registry: &NsMap,
    mut writer: W,
    perform_indent: bool,
) -> Result<(), Error> {
    let io_error = |e: std::io::Error| Error(e.to_string());
    writer.write_all(DECLARATION.as_bytes()).map_err(io_error)?;
    if perform_indent {
        writer.write_all(b"\n").map_err(io_error)?;
    }
    let mut writer = WrappedWriter {
        inner: xml::writer::EventWriter::new_with_config(
            writer,
            xml::writer::EmitterConfig {
                perform_indent,
                write_document_declaration: false,
                ..Default::default()
            },
        ),
        poison: None,
    };
    let mut used = BTreeSet::new();
    collect_namespaces(root, &mut used);
    let mut builder = ElementBuilder::root(root.name.as_ref(), &mut writer);
    for (prefix, url) in registry {
        if !prefix.starts_with("xml") && !url.is_empty() && used.contains(url.as_str()) {
            builder.namespace(prefix, url);
        }
    }
    write_element(root, builder)
}

static DEFAULT_ENCODER: DefaultEncoder = DefaultEncoder;

/// Serializer for a model; returned by [`serialize`].
///
/// ```rust
/// use xmlmap_derive::Model;
///
/// #[derive(Model)]
/// #[xmlmap(rename = "user")]
/// struct User {
///     #[xmlmap(attribute)]
///     name: String,
/// }
///
/// let out = xmlmap::ser::serialize(&User { name: "Alexey".to_owned() })
///     .envelope("soap:Envelope/soap:Body")
///     .namespace("soap", "http://schemas.xmlsoap.org/soap/envelope/")
///     .to_string()
///     .unwrap()
///     .unwrap();
/// assert_eq!(
///     out,
///     "<?xml version=\"1.0\" encoding=\"utf-8\"?>\
///      <soap:Envelope xmlns:soap=\"http://schemas.xmlsoap.org/soap/envelope/\">\
///      <soap:Body><user name=\"Alexey\" /></soap:Body></soap:Envelope>"
/// );
/// ```
#[must_use]
pub struct Serializer<'a> {
    value: Value,
    mapper: ModelMapper,
    envelope: Option<&'a str>,
    name: Option<&'a str>,
    ns: Option<&'a str>,
    ns_map: NsMap,
    encoder: &'a dyn Encoder,
    perform_indent: bool,
}

impl<'a> Serializer<'a> {
    /// Nests the model's element under a `/`-separated path of elements.
    pub fn envelope(self, envelope: &'a str) -> Self {
        Self {
            envelope: Some(envelope),
            ..self
        }
    }

    /// Overrides the model's element name.
    pub fn name(self, name: &'a str) -> Self {
        Self {
            name: Some(name),
            ..self
        }
    }

    /// Overrides the model's namespace prefix.
    pub fn ns(self, prefix: &'a str) -> Self {
        Self {
            ns: Some(prefix),
            ..self
        }
    }

    /// Adds a prefix mapping, overriding the model's own mapping for `prefix`.
    pub fn namespace(mut self, prefix: &str, uri: &str) -> Self {
        self.ns_map.insert(prefix.to_owned(), uri.to_owned());
        self
    }

    /// Sets the encoder for scalar values; defaults to [`DefaultEncoder`].
    pub fn encoder(self, encoder: &'a dyn Encoder) -> Self {
        Self { encoder, ..self }
    }

    /// Sets if the output should be indented; defaults to false.
    #[inline]
    pub fn perform_indent(self, perform_indent: bool) -> Self {
        Self {
            perform_indent,
            ..self
        }
    }

    /// The namespace map used to choose prefixes when writing.
    fn registry(&self) -> NsMap {
        ns::merge(&self.ns_map, self.mapper.descriptor().ns_map())
    }

    /// Builds the element tree, returning `None` if the model wrote nothing.
    ///
    /// With an envelope, the returned element is the envelope's outermost element.
    pub fn to_element(&self) -> Result<Option<Element>, Error> {
        debug!("serializing {}", self.mapper.descriptor().type_name());
        let mut mapper = self.mapper.clone().namespaces(self.ns_map.clone());
        if let Some(name) = self.name {
            mapper = mapper.name(name);
        }
        if let Some(ns) = self.ns {
            mapper = mapper.ns(ns);
        }
        let empty = NsMap::new();
        let mut container = Element::anonymous();
        if !mapper.serialize(
            Some(&self.value),
            &mut container,
            Scope::root(&empty),
            self.encoder,
        )? {
            return Ok(None);
        }
        let mut element = match container.children.pop() {
            Some(e) => e,
            None => return Ok(None),
        };
        if let Some(envelope) = self.envelope {
            for name in ns::qualify_path(envelope, &self.registry()).into_iter().rev() {
                let mut outer = Element::new(name);
                outer.push_child(element);
                element = outer;
            }
        }
        Ok(Some(element))
    }

    /// Serializes to any `Write` impl, returning false (having written
    /// nothing) if the model wrote nothing.
    pub fn to<W: Write>(&self, writer: W) -> Result<bool, Error> {
        let root = match self.to_element()? {
            Some(r) => r,
            None => return Ok(false),
        };
        write_document(&root, &self.registry(), writer, self.perform_indent)?;
        Ok(true)
    }

    /// Serializes to a `String`.
    pub fn to_string(&self) -> Result<Option<String>, Error> {
        let mut out = Vec::new();
        if !self.to(&mut out)? {
            return Ok(None);
        }
        String::from_utf8(out)
            .map(Some)
            .map_err(|e| Error(format!("xml-rs produced invalid UTF-8: {}", e)))
    }
}

/// Serializes the given model.
pub fn serialize<'a, M: Model>(model: &M) -> Serializer<'a> {
    Serializer {
        value: Value::Record(model.to_record()),
        mapper: ModelMapper::of::<M>(),
        envelope: None,
        name: None,
        ns: None,
        ns_map: NsMap::new(),
        encoder: &DEFAULT_ENCODER,
        perform_indent: false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ExpandedName;

    fn init() {
        let _ = env_logger::Builder::new().is_test(true).try_init();
    }

    fn write(root: &Element, registry: &[(&str, &str)]) -> String {
        let registry: NsMap = registry
            .iter()
            .map(|&(p, u)| (p.to_owned(), u.to_owned()))
            .collect();
        let mut out = Vec::new();
        write_document(root, &registry, &mut out, false).unwrap();
        String::from_utf8(out).unwrap()
    }

    fn element(namespace: &str, local_name: &str) -> Element {
        Element::new(ExpandedName::new(namespace, local_name))
    }

    #[test]
    fn registry_prefixes() {
        init();
        let mut root = element("http://www.test1.org", "user");
        root.set_attribute(ExpandedName::new("", "name"), "Alexey".to_owned());
        let mut email = element("http://www.test1.org", "email");
        email.set_text("alex@gmail.com".to_owned());
        root.push_child(email);
        let out = write(
            &root,
            &[("doc", "http://www.test1.org"), ("unused", "http://unused")],
        );
        assert_eq!(
            out,
            r#"<?xml version="1.0" encoding="utf-8"?><doc:user xmlns:doc="http://www.test1.org" name="Alexey"><doc:email>alex@gmail.com</doc:email></doc:user>"#
        );
    }

    /// If an attribute's namespace has no requested prefix, a prefix should get used anyway.
    ///
    /// This follows from a weird XML namespacing rule: unprefixed attributes are always
    /// unnamespaced, unlike elements.
    #[test]
    fn unprefixed_attr_namespace() {
        init();
        let mut root = element("", "foo");
        root.set_attribute(
            ExpandedName::new("http://example.com/default", "attr"),
            "value".to_owned(),
        );
        let out = write(&root, &[("", "http://example.com/default")]);
        assert_eq!(
            out,
            r#"<?xml version="1.0" encoding="utf-8"?><foo xmlns:ns1="http://example.com/default" ns1:attr="value" />"#
        );
    }

    /// Namespaces missing from the registry get generated prefixes.
    #[test]
    fn generated_prefixes() {
        init();
        let mut root = element("http://a", "root");
        root.push_child(element("http://b", "child"));
        let out = write(&root, &[]);
        assert_eq!(
            out,
            r#"<?xml version="1.0" encoding="utf-8"?><ns:root xmlns:ns="http://a"><ns:child xmlns:ns="http://b" /></ns:root>"#
        );

        let mut root = element("http://a", "root");
        root.set_attribute(ExpandedName::new("http://b", "attr"), "v".to_owned());
        let out = write(&root, &[]);
        assert_eq!(
            out,
            r#"<?xml version="1.0" encoding="utf-8"?><ns:root xmlns:ns="http://a" xmlns:ns2="http://b" ns2:attr="v" />"#
        );
    }

    /// An element's own namespace is declared where first needed.
    #[test]
    fn namespace_declared_on_child() {
        init();
        let mut root = element("", "root");
        root.set_attribute(
            ExpandedName::new("http://example.com/default", "attr"),
            "value".to_owned(),
        );
        let mut child = element("http://example.com/default", "child");
        child.set_attribute(
            ExpandedName::new("http://example.com/override", "attr"),
            "value".to_owned(),
        );
        root.push_child(child);
        let out = write(&root, &[("foo", "http://example.com/default")]);
        assert_eq!(
            out,
            r#"<?xml version="1.0" encoding="utf-8"?><root xmlns:foo="http://example.com/default" foo:attr="value"><foo:child xmlns:ns="http://example.com/override" ns:attr="value" /></root>"#
        );
    }

    #[test]
    fn unqualified_under_default_namespace() {
        init();
        let mut root = element("http://default", "root");
        root.push_child(element("", "plain"));
        let registry: NsMap = [("".to_owned(), "http://default".to_owned())]
            .into_iter()
            .collect();
        let e = write_document(&root, &registry, Vec::new(), false).unwrap_err();
        assert_eq!(
            e.to_string(),
            "element plain has no namespace, but a default namespace is set"
        );
    }

    #[test]
    fn declaration() {
        init();
        let mut root = element("", "root");
        root.push_child(element("", "child"));
        let mut out = Vec::new();
        write_document(&root, &NsMap::new(), &mut out, true).unwrap();
        let out = String::from_utf8(out).unwrap();
        let mut lines = out.lines();
        assert_eq!(lines.next(), Some(DECLARATION));
        assert_eq!(lines.next(), Some("<root>"));
        assert_eq!(out.matches("<?xml").count(), 1);
    }

    #[test]
    fn xml_namespace() {
        init();
        let mut root = element("", "root");
        root.set_attribute(ExpandedName::new(XML_NS, "lang"), "ru".to_owned());
        assert_eq!(
            write(&root, &[]),
            r#"<?xml version="1.0" encoding="utf-8"?><root xml:lang="ru" />"#
        );
    }
}
