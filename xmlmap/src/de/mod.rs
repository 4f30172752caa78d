// Copyright (C) 2021 Scott Lamb <slamb@slamb.org>
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Deserialization from XML to models.

use std::sync::Arc;

use log::debug;
use xml::common::{Position, TextPosition};

use crate::mapper::{ModelMapper, Path, Scope};
use crate::model::Model;
use crate::ns::{self, NsMap};
use crate::value;
use crate::Element;

/// A single element in the XML stack; see [`Error::stack`].
#[derive(Clone, Debug)]
pub struct StackElement {
    /// The full name of the element, including its namespace and prefix (if any) and local name.
    pub name: xml::name::OwnedName,

    /// The position of this element's `StartElement` event within the underlying document.
    pub pos: TextPosition,
}

/// A simple `Error` impl for use by internal conversions.
#[derive(Debug)]
pub(crate) struct SimpleError(pub(crate) String);

impl std::fmt::Display for SimpleError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        self.0.fmt(f)
    }
}

impl std::error::Error for SimpleError {}

/// Helper for macros.
#[doc(hidden)]
pub fn no_such_variant(enum_: &str, t: &str) -> crate::BoxedStdError {
    Box::new(SimpleError(format!("no such {} variant {:?}", enum_, t))) as crate::BoxedStdError
}

/// An error encountered while deserializing.
///
/// Mapping failures name the structural path of the missing node, with
/// 1-based indices:
///
/// ```text
/// required element '/envelope/test_model[1]/element[1]' not found
/// ```
///
/// Syntax errors show the position and the XML element stack instead, printing
/// the qname and line:column of each open element.
///
/// Cloning an `Error` is cheap.
#[derive(Clone, Debug)]
pub struct Error(Arc<ErrorInner>);

impl Error {
    /// Returns what went wrong.
    pub fn kind(&self) -> &ErrorKind {
        &self.0.kind
    }

    /// Returns the stack of XML elements as of when a syntax error occurred.
    ///
    /// `stack()[0]` is the root; `stack.last()` is the current element. Empty
    /// for mapping errors, which carry a path instead.
    pub fn stack(&self) -> &[StackElement] {
        &self.0.stack
    }

    /// Returns the structural path of a missing attribute or element.
    pub fn path(&self) -> Option<&str> {
        match self.0.kind {
            ErrorKind::MissingAttribute { ref path } | ErrorKind::MissingElement { ref path } => {
                Some(path)
            }
            _ => None,
        }
    }

    fn new(kind: ErrorKind, stack: &[StackElement], pos: Option<TextPosition>) -> Self {
        Error(Arc::new(ErrorInner {
            kind,
            stack: stack.to_vec(),
            pos,
        }))
    }

    pub(crate) fn xml(stack: &[StackElement], e: xml::reader::Error) -> Self {
        let pos = e.position();
        Error::new(ErrorKind::Xml(e), stack, Some(pos))
    }

    pub(crate) fn msg(stack: &[StackElement], pos: TextPosition, msg: String) -> Self {
        Error::new(ErrorKind::Msg(msg), stack, Some(pos))
    }

    pub(crate) fn missing_attribute(path: String) -> Self {
        Error::new(ErrorKind::MissingAttribute { path }, &[], None)
    }

    pub(crate) fn missing_element(path: String) -> Self {
        Error::new(ErrorKind::MissingElement { path }, &[], None)
    }

    pub(crate) fn value(e: crate::BoxedStdError) -> Self {
        Error::new(ErrorKind::Value(e), &[], None)
    }
}

impl std::fmt::Display for Error {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let inner = &*self.0;
        match (&inner.kind, inner.pos) {
            (ErrorKind::Msg(_), Some(pos)) => write!(f, "{} @ {}", &inner.kind, pos)?,
            (kind, _) => kind.fmt(f)?,
        }
        if !inner.stack.is_empty() {
            write!(f, "\n\nXML element stack:\n")?;
            for (i, element) in inner.stack.iter().enumerate().rev() {
                writeln!(
                    f,
                    "{:4x}: <{}> @ {}",
                    i,
                    element.name.borrow().repr_display(),
                    &element.pos
                )?;
            }
        }
        Ok(())
    }
}

impl std::error::Error for Error {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self.0.kind {
            ErrorKind::Xml(ref e) => Some(e),
            ErrorKind::Value(ref e) => Some(e.as_ref()),
            _ => None,
        }
    }
}

/// Information about an error, which should be enclosed in an `Arc` to make cloning cheap.
#[derive(Debug)]
struct ErrorInner {
    kind: ErrorKind,
    stack: Vec<StackElement>,
    pos: Option<TextPosition>,
}

#[derive(Debug)]
pub enum ErrorKind {
    /// An error produced by `xml-rs`, including I/O errors and syntax errors.
    Xml(xml::reader::Error),

    /// A required attribute was absent.
    MissingAttribute { path: String },

    /// A required element, wrapper, nested model or envelope was absent (or,
    /// for a leaf element, had no text).
    MissingElement { path: String },

    /// A value failed conversion or validation while building the model.
    Value(crate::BoxedStdError),

    Msg(String),
}

impl std::fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ErrorKind::Xml(e) => e.fmt(f),
            ErrorKind::MissingAttribute { path } => {
                write!(f, "required attribute '{}' not found", path)
            }
            ErrorKind::MissingElement { path } => {
                write!(f, "required element '{}' not found", path)
            }
            ErrorKind::Value(e) => e.fmt(f),
            ErrorKind::Msg(msg) => msg.fmt(f),
        }
    }
}

/// Deserializer for a model; see [`from_str`] and [`read`] for the common case.
///
/// ```rust
/// # use xmlmap_derive::Model;
/// #[derive(Model)]
/// #[xmlmap(rename = "user", prefix = "doc")]
/// struct User {
///     #[xmlmap(attribute)]
///     name: String,
/// }
///
/// let user: User = xmlmap::de::Deserializer::new()
///     .envelope("doc:envelope")
///     .namespace("doc", "http://www.test1.org")
///     .from_str(r#"<doc:envelope xmlns:doc="http://www.test1.org"><doc:user name="Alexey"/></doc:envelope>"#)
///     .unwrap()
///     .unwrap();
/// assert_eq!(user.name, "Alexey");
/// ```
#[derive(Clone, Debug)]
pub struct Deserializer<'a> {
    envelope: Option<&'a str>,
    name: Option<&'a str>,
    ns: Option<&'a str>,
    ns_map: NsMap,
    required: bool,
}

impl<'a> Default for Deserializer<'a> {
    fn default() -> Self {
        Deserializer {
            envelope: None,
            name: None,
            ns: None,
            ns_map: NsMap::new(),
            required: true,
        }
    }
}

impl<'a> Deserializer<'a> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets a `/`-separated path of elements under which the model's element
    /// is found, e.g. `soap:Envelope/soap:Body`.
    ///
    /// The envelope is always required, whatever [`Deserializer::required`] says.
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

    /// Sets if the model's element must be present; defaults to true.
    ///
    /// When false, a missing element yields `Ok(None)`.
    pub fn required(self, required: bool) -> Self {
        Self { required, ..self }
    }

    /// Deserializes from a document held in a string.
    pub fn from_str<M: Model>(&self, source: &str) -> Result<Option<M>, Error> {
        self.read(source.as_bytes())
    }

    /// Deserializes from any `Read` impl.
    pub fn read<M: Model, R: std::io::Read>(&self, source: R) -> Result<Option<M>, Error> {
        let document = Element::parse(source)?;
        let mut root = Element::anonymous();
        root.push_child(document);
        self.from_element(&root)
    }

    /// Deserializes from an already-parsed tree.
    ///
    /// `root` is the *parent* of the envelope (or of the model's element, if
    /// there's no envelope). [`Deserializer::from_str`] wraps the document
    /// element in an anonymous parent to achieve this.
    pub fn from_element<M: Model>(&self, root: &Element) -> Result<Option<M>, Error> {
        debug!("deserializing {}", std::any::type_name::<M>());
        let segments: Vec<&str> = self
            .envelope
            .map(|e| e.split('/').filter(|s| !s.is_empty()).collect())
            .unwrap_or_default();
        let start = match self.envelope {
            None => root,
            Some(envelope) => {
                let ns_map = ns::merge(&self.ns_map, M::descriptor().ns_map());
                root.find_path(&ns::qualify_path(envelope, &ns_map))
                    .ok_or_else(|| Error::missing_element(format!("/{}", segments.join("/"))))?
            }
        };

        let mut mapper = ModelMapper::of::<M>()
            .namespaces(self.ns_map.clone())
            .required(self.required);
        if let Some(name) = self.name {
            mapper = mapper.name(name);
        }
        if let Some(ns) = self.ns {
            mapper = mapper.ns(ns);
        }
        let empty = NsMap::new();
        let found = mapper.deserialize(start, Scope::root(&empty), &Path::root(&segments))?;
        match found {
            None => Ok(None),
            Some(v) => {
                let mut record = value::into_record(v).map_err(Error::value)?;
                M::from_record(&mut record).map(Some).map_err(Error::value)
            }
        }
    }
}

/// Turns a missing top-level model into the error a required model produces.
fn expect_found<M: Model>(found: Option<M>) -> Result<M, Error> {
    found.ok_or_else(|| {
        let d = M::descriptor();
        Error::missing_element(format!("/{}", ns::tag_name(d.ns(), d.name(), Some(1))))
    })
}

/// Reads a model from the root element of the given XML document.
pub fn read<R: std::io::Read, M: Model>(source: R) -> Result<M, Error> {
    expect_found(Deserializer::new().read(source)?)
}

/// Reads a model from the root element of the given XML document enclosed in a string.
///
/// This is simply `read(source.as_bytes())`; it's common enough to a merit a
/// convenience method.
#[inline]
pub fn from_str<M: Model>(source: &str) -> Result<M, Error> {
    read(source.as_bytes())
}

/// Deserializes text data, whether character nodes or attribute values.
///
/// This matches the XML schema concept of "simple type", and is the inverse of
/// [`crate::ToScalar`].
pub trait ParseText: Sized {
    /// Parses the given text, which has *not* passed through whitespace normalization.
    ///
    /// The caller can use [`normalize`] as desired.
    fn parse(text: String) -> Result<Self, crate::BoxedStdError>;
}

/// Type of [white space normalization](https://www.w3.org/TR/xmlschema11-1/#sec-wsnormalization).
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum WhiteSpace {
    Preserve,
    Replace,
    Collapse,
}

/// Performs white space normalization on a string.
///
/// ```rust
/// # use xmlmap::de::{WhiteSpace, normalize};
/// assert_eq!(normalize("\n foo\t bar\n\n".to_owned(), WhiteSpace::Preserve), "\n foo\t bar\n\n");
/// assert_eq!(normalize("\n foo\t bar\n\n".to_owned(), WhiteSpace::Replace), "  foo  bar  ");
/// assert_eq!(normalize("\n foo\t bar\n\n".to_owned(), WhiteSpace::Collapse), "foo bar");
/// ```
pub fn normalize(s: String, whitespace: WhiteSpace) -> String {
    let is_whitespace = |c: char| matches!(c, '\x09' | '\x0A' | '\x0D' | '\x20');
    match whitespace {
        WhiteSpace::Preserve => s,
        WhiteSpace::Replace => s
            .chars()
            .map(|c| if is_whitespace(c) { ' ' } else { c })
            .collect(),
        WhiteSpace::Collapse => {
            let mut out = String::with_capacity(s.len());
            for word in s.split(is_whitespace).filter(|w| !w.is_empty()) {
                if !out.is_empty() {
                    out.push(' ');
                }
                out.push_str(word);
            }
            out
        }
    }
}

const XML_WHITESPACE: &[char] = &['\x09', '\x0A', '\x0D', '\x20'];

impl ParseText for bool {
    fn parse(text: String) -> Result<Self, crate::BoxedStdError> {
        // https://www.w3.org/TR/xmlschema11-2/#boolean: "booleanRep ::= 'true' | 'false' | '1' | '0'
        match text.trim_matches(XML_WHITESPACE) {
            "true" | "1" => Ok(true),
            "false" | "0" => Ok(false),
            _ => Err(Box::new(SimpleError(format!("invalid bool {:?}", &text)))),
        }
    }
}

/// Parses via `FromStr` after trimming; the whitespace facet of non-string
/// atomic types is always collapse.
macro_rules! text_from_str {
    ( $t:ty ) => {
        impl ParseText for $t {
            fn parse(text: String) -> Result<Self, crate::BoxedStdError> {
                let text = text.trim_matches(XML_WHITESPACE);
                <$t as std::str::FromStr>::from_str(text).map_err(Into::into)
            }
        }
    };
}

text_from_str!(i8);
text_from_str!(u8);
text_from_str!(i16);
text_from_str!(u16);
text_from_str!(i32);
text_from_str!(u32);
text_from_str!(i64);
text_from_str!(u64);
text_from_str!(i128);
text_from_str!(u128);
text_from_str!(isize);
text_from_str!(usize);
text_from_str!(f32);
text_from_str!(f64);
text_from_str!(chrono::NaiveDate);
text_from_str!(chrono::NaiveDateTime);
text_from_str!(chrono::DateTime<chrono::FixedOffset>);
text_from_str!(chrono::DateTime<chrono::Utc>);

impl ParseText for String {
    fn parse(text: String) -> Result<Self, crate::BoxedStdError> {
        Ok(text)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{NaiveDate, TimeZone};

    #[derive(Debug)]
    struct Empty;

    impl Model for Empty {
        fn descriptor() -> &'static crate::ModelDescriptor {
            static DESCRIPTOR: std::sync::OnceLock<crate::ModelDescriptor> =
                std::sync::OnceLock::new();
            DESCRIPTOR.get_or_init(|| {
                crate::ModelDescriptor::builder("Empty")
                    .name("empty")
                    .ns("doc")
                    .build()
                    .unwrap()
            })
        }

        fn to_record(&self) -> crate::Record {
            crate::Record::new()
        }

        fn from_record(_: &mut crate::Record) -> Result<Self, crate::BoxedStdError> {
            Ok(Empty)
        }
    }

    #[test]
    fn missing_top_level_model() {
        assert!(expect_found(Some(Empty)).is_ok());
        let e = expect_found::<Empty>(None).unwrap_err();
        assert_eq!(e.path(), Some("/doc:empty[1]"));

        let found = Deserializer::new()
            .required(false)
            .from_str::<Empty>("<other/>")
            .map(|m| m.is_none());
        assert_matches::assert_matches!(found, Ok(true));
    }

    #[test]
    fn bool() {
        assert!(bool::parse("true".to_owned()).unwrap());
        assert!(!bool::parse("false".to_owned()).unwrap());
        assert!(bool::parse(" 1 ".to_owned()).unwrap());
        assert!(!bool::parse("\n0\t".to_owned()).unwrap());
        let e = bool::parse("yes".to_owned()).unwrap_err();
        assert_eq!(e.to_string(), "invalid bool \"yes\"");
    }

    #[test]
    fn numbers() {
        assert_eq!(u32::parse(" 8854\n".to_owned()).unwrap(), 8854);
        assert_eq!(i8::parse("-3".to_owned()).unwrap(), -3);
        assert_eq!(f64::parse("2.5".to_owned()).unwrap(), 2.5);
        u8::parse("256".to_owned()).unwrap_err();
        i32::parse("12a".to_owned()).unwrap_err();
    }

    #[test]
    fn dates() {
        assert_eq!(
            NaiveDate::parse("1992-06-14".to_owned()).unwrap(),
            NaiveDate::from_ymd_opt(1992, 6, 14).unwrap()
        );
        let dt = chrono::NaiveDateTime::parse("1992-06-14T10:30:00".to_owned()).unwrap();
        assert_eq!(
            dt,
            NaiveDate::from_ymd_opt(1992, 6, 14)
                .unwrap()
                .and_hms_opt(10, 30, 0)
                .unwrap()
        );
        let zoned =
            chrono::DateTime::<chrono::FixedOffset>::parse("1992-06-14T10:30:00+03:00".to_owned())
                .unwrap();
        assert_eq!(
            zoned,
            chrono::FixedOffset::east_opt(3 * 3600)
                .unwrap()
                .with_ymd_and_hms(1992, 6, 14, 10, 30, 0)
                .unwrap()
        );
        NaiveDate::parse("1992-13-01".to_owned()).unwrap_err();
    }

    #[test]
    fn whitespace() {
        assert_eq!(normalize(" a \t b ".to_owned(), WhiteSpace::Collapse), "a b");
        assert_eq!(normalize("a\nb".to_owned(), WhiteSpace::Replace), "a b");
        assert_eq!(normalize("".to_owned(), WhiteSpace::Collapse), "");
    }
}
