// Copyright (C) 2021 Scott Lamb <slamb@slamb.org>
// SPDX-License-Identifier: MIT OR Apache-2.0

use std::cell::RefCell;

use proc_macro2::TokenStream;
use quote::{quote, ToTokens};
use syn::{Lit, LitStr, Meta, MetaNameValue, NestedMeta};
use xmlmap::de::WhiteSpace;

// See serde/serde_derive/src/internals/attr.rs and yaserde_derive/src/common/field.rs

/// Accumulates compiler errors. Similar to `serde_derive`'s `Ctxt`.
pub(crate) struct Errors(RefCell<Option<Vec<syn::Error>>>);

impl Errors {
    pub(crate) fn new() -> Self {
        Errors(RefCell::new(Some(Vec::new())))
    }

    pub(crate) fn push(&self, err: syn::Error) {
        if let Some(errors) = self.0.borrow_mut().as_mut() {
            errors.push(err);
        }
    }

    pub(crate) fn take_compile_errors(&self) -> TokenStream {
        let errors = self
            .0
            .borrow_mut()
            .take()
            .unwrap_or_default()
            .into_iter()
            .map(syn::Error::into_compile_error);
        quote! {
            #(#errors)*
        }
    }
}

impl Drop for Errors {
    fn drop(&mut self) {
        if self.0.borrow().is_some() && !std::thread::panicking() {
            panic!("Errors dropped without take_compile_errors call");
        }
    }
}

const XMLMAP: &str = "xmlmap";

// Stolen from serde/serde_derive/src/internals/attr.rs.
pub(crate) fn get_meta_items(errors: &Errors, attrs: &[syn::Attribute]) -> Vec<NestedMeta> {
    let mut out = Vec::new();
    for attr in attrs {
        if !attr.path.is_ident(XMLMAP) {
            continue;
        }

        match attr.parse_meta() {
            Ok(Meta::List(meta)) => out.extend(meta.nested.into_iter()),
            Ok(other) => errors.push(syn::Error::new_spanned(other, "expected #[xmlmap(...)]")),
            Err(err) => errors.push(err),
        }
    }
    out
}

pub(crate) fn with_lit_str(
    errors: &Errors,
    name_value: &MetaNameValue,
    f: &mut dyn FnMut(&LitStr),
) {
    if let Lit::Str(s) = &name_value.lit {
        f(s);
    } else {
        errors.push(syn::Error::new_spanned(
            &name_value.lit,
            format!(
                "{:?} expects a string literal",
                name_value.path.to_token_stream().to_string()
            ),
        ));
    }
}

pub(crate) fn set_whitespace(
    errors: &Errors,
    whitespace: &mut WhiteSpace,
    name_value: &MetaNameValue,
) {
    with_lit_str(errors, name_value, &mut |l| match l.value().as_str() {
        "preserve" => *whitespace = WhiteSpace::Preserve,
        "replace" => *whitespace = WhiteSpace::Replace,
        "collapse" => *whitespace = WhiteSpace::Collapse,
        _ => errors.push(syn::Error::new_spanned(
            l,
            "expected preserve, replace, or collapse",
        )),
    });
}

/// Parses `"prefix: uri"` (or a bare `"uri"` for the default namespace).
pub(crate) fn parse_namespace(errors: &Errors, nv: &MetaNameValue) -> Option<(String, String)> {
    let mut out = None;
    with_lit_str(errors, nv, &mut |l| {
        let value = l.value();
        let (prefix, url) = match value.split_once(": ") {
            Some((p, u)) => (p.trim(), u.trim()),
            None => ("", value.trim()),
        };
        if prefix.starts_with("xml") {
            errors.push(syn::Error::new_spanned(
                l,
                format!("prefix {:?} is reserved", prefix),
            ));
            return;
        }
        out = Some((prefix.to_owned(), url.to_owned()));
    });
    out
}

/// Parses a positive (1-based) `index = N`.
fn parse_index(errors: &Errors, nv: &MetaNameValue) -> Option<usize> {
    match &nv.lit {
        Lit::Int(i) => match i.base10_parse::<usize>() {
            Ok(0) => {
                errors.push(syn::Error::new_spanned(i, "indices start at 1"));
                None
            }
            Ok(n) => Some(n),
            Err(e) => {
                errors.push(e);
                None
            }
        },
        other => {
            errors.push(syn::Error::new_spanned(other, "index expects an integer"));
            None
        }
    }
}

/// Name and namespace options of one mapper.
#[derive(Default)]
pub(crate) struct MapperOpts {
    pub(crate) rename: Option<LitStr>,
    pub(crate) prefix: Option<LitStr>,
    pub(crate) namespaces: Vec<(String, String)>,
    pub(crate) index: Option<usize>,
}

impl MapperOpts {
    /// Consumes `item` if it's a mapper option, returning false otherwise.
    pub(crate) fn parse_item(&mut self, errors: &Errors, item: &NestedMeta) -> bool {
        let nv = match item {
            NestedMeta::Meta(Meta::NameValue(nv)) => nv,
            _ => return false,
        };
        if nv.path.is_ident("rename") {
            with_lit_str(errors, nv, &mut |l| self.rename = Some(l.clone()));
        } else if nv.path.is_ident("prefix") {
            with_lit_str(errors, nv, &mut |l| self.prefix = Some(l.clone()));
        } else if nv.path.is_ident("namespace") {
            self.namespaces.extend(parse_namespace(errors, nv));
        } else if nv.path.is_ident("index") {
            self.index = parse_index(errors, nv);
        } else {
            return false;
        }
        true
    }

    fn is_empty(&self) -> bool {
        self.rename.is_none()
            && self.prefix.is_none()
            && self.namespaces.is_empty()
            && self.index.is_none()
    }
}

/// How a field maps to XML, as declared in `#[xmlmap(...)]`.
pub(crate) enum MapperSpec {
    Attribute(MapperOpts),
    Element(MapperOpts),
    Nested(MapperOpts),
    Wrapper {
        path: LitStr,
        opts: MapperOpts,
        inner: Box<MapperSpec>,
    },
    List(Box<MapperSpec>),
}

impl MapperSpec {
    /// Returns true if `meta` names a mapper kind.
    pub(crate) fn is_kind(meta: &Meta) -> bool {
        ["attribute", "element", "nested", "wrapper", "list"]
            .iter()
            .any(|k| meta.path().is_ident(k))
    }

    /// Parses a kind without options, e.g. `element`.
    pub(crate) fn from_path(errors: &Errors, path: &syn::Path, opts: MapperOpts) -> Option<Self> {
        if path.is_ident("attribute") {
            if !opts.namespaces.is_empty() || opts.index.is_some() {
                errors.push(syn::Error::new_spanned(
                    path,
                    "attributes take neither namespace nor index",
                ));
            }
            Some(MapperSpec::Attribute(opts))
        } else if path.is_ident("element") {
            Some(MapperSpec::Element(opts))
        } else if path.is_ident("nested") {
            Some(MapperSpec::Nested(opts))
        } else {
            errors.push(syn::Error::new_spanned(
                path,
                "expected attribute, element or nested; wrapper and list take arguments",
            ));
            None
        }
    }

    /// Parses a kind, e.g. `wrapper("a/b", prefix = "p", list(element))`.
    pub(crate) fn parse(errors: &Errors, meta: &Meta) -> Option<Self> {
        let list = match meta {
            Meta::Path(p) => return Self::from_path(errors, p, MapperOpts::default()),
            Meta::List(l) => l,
            Meta::NameValue(nv) => {
                errors.push(syn::Error::new_spanned(nv, "expected a mapping kind"));
                return None;
            }
        };
        let mut opts = MapperOpts::default();
        let mut path = None;
        let mut inner = None;
        for item in &list.nested {
            if opts.parse_item(errors, item) {
                continue;
            }
            match item {
                NestedMeta::Lit(Lit::Str(s)) if path.is_none() => path = Some(s.clone()),
                NestedMeta::Meta(m) if Self::is_kind(m) && inner.is_none() => {
                    inner = Self::parse(errors, m).map(Box::new);
                    if inner.is_none() {
                        return None;
                    }
                }
                i => {
                    errors.push(syn::Error::new_spanned(i, "item not understood"));
                    return None;
                }
            }
        }
        let ident = &list.path;
        if ident.is_ident("wrapper") {
            let path = match path {
                Some(p) => p,
                None => {
                    errors.push(syn::Error::new_spanned(list, "wrapper needs a \"path\""));
                    return None;
                }
            };
            let inner = match inner {
                Some(i) => i,
                None => {
                    errors.push(syn::Error::new_spanned(list, "wrapper needs a mapping to wrap"));
                    return None;
                }
            };
            if opts.rename.is_some() {
                errors.push(syn::Error::new_spanned(list, "a wrapper is named by its path"));
            }
            return Some(MapperSpec::Wrapper { path, opts, inner });
        }
        if ident.is_ident("list") {
            let inner = match inner {
                Some(i) => i,
                None => {
                    errors.push(syn::Error::new_spanned(list, "list needs a mapping to repeat"));
                    return None;
                }
            };
            if !opts.is_empty() || path.is_some() {
                errors.push(syn::Error::new_spanned(
                    list,
                    "list takes no options; set them on the repeated mapping",
                ));
            }
            if matches!(*inner, MapperSpec::Attribute(_) | MapperSpec::List(_)) {
                errors.push(syn::Error::new_spanned(
                    list,
                    "list items must be elements, wrappers or nested models",
                ));
                return None;
            }
            return Some(MapperSpec::List(inner));
        }
        if let Some(p) = path {
            errors.push(syn::Error::new_spanned(p, "only wrapper takes a path"));
        }
        if inner.is_some() {
            errors.push(syn::Error::new_spanned(list, "only wrapper and list take a mapping"));
        }
        Self::from_path(errors, ident, opts)
    }
}

/// Parsed `#[xmlmap(...)]` on a text type.
pub(crate) struct TextAttr {
    pub(crate) whitespace: WhiteSpace,
    pub(crate) mode: TextMode,
}

#[derive(Copy, Clone, Eq, PartialEq)]
pub(crate) enum TextMode {
    /// Similar to `<xsd:restriction>`: one of several fixed strings, and optionally a catch-all
    /// for unknown values.
    Restriction,

    /// Via the type's `FromStr` and `Display` impls.
    Std,
}

impl TextAttr {
    pub(crate) fn new(errors: &Errors, input: &syn::DeriveInput) -> Self {
        let mut whitespace = WhiteSpace::Preserve;
        let mut mode = TextMode::Restriction;
        for item in get_meta_items(errors, &input.attrs) {
            match &item {
                NestedMeta::Meta(Meta::NameValue(nv @ MetaNameValue { ref path, .. }))
                    if path.is_ident("whitespace") =>
                {
                    set_whitespace(errors, &mut whitespace, nv);
                }
                NestedMeta::Meta(Meta::NameValue(nv @ MetaNameValue { ref path, .. }))
                    if path.is_ident("mode") =>
                {
                    with_lit_str(errors, nv, &mut |l| match l.value().as_str() {
                        "restriction" => mode = TextMode::Restriction,
                        "std" => mode = TextMode::Std,
                        _ => errors.push(syn::Error::new_spanned(l, "expected restriction or std")),
                    });
                }
                i => errors.push(syn::Error::new_spanned(i, "item not understood")),
            }
        }
        TextAttr { whitespace, mode }
    }
}

/// Common description of an `enum` that represents text.
pub(crate) struct TextEnum<'a> {
    pub(crate) input: &'a syn::DeriveInput,
    pub(crate) whitespace: WhiteSpace,
    pub(crate) variants: Vec<RestrictionVariant<'a>>,
    pub(crate) unknown_variant: Option<usize>, // index within variants.
}

pub(crate) struct RestrictionVariant<'a> {
    pub(crate) inner: &'a syn::Variant,
    pub(crate) mode: TextVariantMode,
}

pub(crate) enum TextVariantMode {
    Known { text: String },
    Unknown,
}

impl<'a> TextEnum<'a> {
    pub(crate) fn new(
        errors: &Errors,
        input: &'a syn::DeriveInput,
        attr: TextAttr,
        enum_: &'a syn::DataEnum,
    ) -> Self {
        let mut unknown_variant = None;
        let variants = enum_
            .variants
            .iter()
            .enumerate()
            .map(|(i, v)| {
                let mut text = None;
                let mut unknown = false;
                for item in get_meta_items(errors, &v.attrs) {
                    match &item {
                        NestedMeta::Meta(Meta::Path(p)) if p.is_ident("unknown") => unknown = true,
                        NestedMeta::Meta(Meta::NameValue(nv @ MetaNameValue { path, .. }))
                            if path.is_ident("rename") =>
                        {
                            with_lit_str(errors, nv, &mut |l| text = Some(l.value()));
                        }
                        i => errors.push(syn::Error::new_spanned(i, "item not understood")),
                    }
                }
                let mode = if unknown {
                    if text.is_some() {
                        errors.push(syn::Error::new_spanned(
                            &v.ident,
                            "unknown and rename are mutually exclusive",
                        ));
                    }
                    if single_unnamed_field(&v.fields).is_none() {
                        errors.push(syn::Error::new_spanned(
                            &v.ident,
                            "unknown variant should have a single field",
                        ));
                    }
                    if unknown_variant.is_some() {
                        errors.push(syn::Error::new_spanned(&v.ident, "duplicate unknown variant"));
                    } else {
                        unknown_variant = Some(i);
                    }
                    TextVariantMode::Unknown
                } else {
                    if !matches!(v.fields, syn::Fields::Unit) {
                        errors.push(syn::Error::new_spanned(
                            &v.ident,
                            "known variants should have no fields",
                        ));
                    }
                    TextVariantMode::Known {
                        text: text.unwrap_or_else(|| v.ident.to_string()),
                    }
                };
                RestrictionVariant { inner: v, mode }
            })
            .collect();
        TextEnum {
            input,
            whitespace: attr.whitespace,
            variants,
            unknown_variant,
        }
    }
}

pub(crate) fn single_unnamed_field(fields: &syn::Fields) -> Option<&syn::Field> {
    if let syn::Fields::Unnamed(f) = fields {
        if f.unnamed.len() == 1 {
            return Some(&f.unnamed[0]);
        }
    }
    None
}

/// Returns `T` if `ty` is `wrapper<T>` (by last path segment, e.g. `Option`).
pub(crate) fn generic_arg<'a>(ty: &'a syn::Type, wrapper: &str) -> Option<&'a syn::Type> {
    let path = match ty {
        syn::Type::Path(p) if p.qself.is_none() => &p.path,
        _ => return None,
    };
    let last = path.segments.last()?;
    if last.ident != wrapper {
        return None;
    }
    match &last.arguments {
        syn::PathArguments::AngleBracketed(args) if args.args.len() == 1 => match &args.args[0] {
            syn::GenericArgument::Type(t) => Some(t),
            _ => None,
        },
        _ => None,
    }
}
