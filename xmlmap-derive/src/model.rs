// Copyright (C) 2021 Scott Lamb <slamb@slamb.org>
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Logic to derive the `xmlmap::Model` trait.

use std::collections::BTreeMap;

use proc_macro2::TokenStream;
use quote::{quote, quote_spanned};
use syn::{ext::IdentExt, spanned::Spanned, Data, Fields, Meta, MetaNameValue, NestedMeta};

use crate::common::{
    generic_arg, get_meta_items, parse_namespace, with_lit_str, Errors, MapperOpts, MapperSpec,
};

/// Parsed top-level attributes of a model struct.
#[derive(Default)]
struct ModelAttr {
    rename: Option<syn::LitStr>,
    prefix: Option<syn::LitStr>,
    namespaces: Vec<(String, String)>,
    order: Option<Vec<syn::Ident>>,
}

impl ModelAttr {
    fn new(errors: &Errors, input: &syn::DeriveInput) -> Self {
        let mut attr = ModelAttr::default();
        for item in get_meta_items(errors, &input.attrs) {
            match &item {
                NestedMeta::Meta(Meta::NameValue(nv @ MetaNameValue { path, .. }))
                    if path.is_ident("rename") =>
                {
                    with_lit_str(errors, nv, &mut |l| attr.rename = Some(l.clone()));
                }
                NestedMeta::Meta(Meta::NameValue(nv @ MetaNameValue { path, .. }))
                    if path.is_ident("prefix") =>
                {
                    with_lit_str(errors, nv, &mut |l| attr.prefix = Some(l.clone()));
                }
                NestedMeta::Meta(Meta::NameValue(nv @ MetaNameValue { path, .. }))
                    if path.is_ident("namespace") =>
                {
                    attr.namespaces.extend(parse_namespace(errors, nv));
                }
                NestedMeta::Meta(Meta::NameValue(nv @ MetaNameValue { path, .. }))
                    if path.is_ident("default_namespace") =>
                {
                    with_lit_str(errors, nv, &mut |l| {
                        attr.namespaces.push((String::new(), l.value().trim().to_owned()))
                    });
                }
                NestedMeta::Meta(Meta::List(l)) if l.path.is_ident("order") => {
                    let mut order = Vec::new();
                    for n in &l.nested {
                        match n {
                            NestedMeta::Meta(Meta::Path(p)) if p.get_ident().is_some() => {
                                order.extend(p.get_ident().map(IdentExt::unraw));
                            }
                            other => errors.push(syn::Error::new_spanned(
                                other,
                                "expected a field name",
                            )),
                        }
                    }
                    attr.order = Some(order);
                }
                i => errors.push(syn::Error::new_spanned(i, "item not understood")),
            }
        }
        attr
    }
}

/// How a field takes part in the model.
enum FieldMode {
    Mapped(MapperSpec),

    /// Bindings spliced in from another model.
    Flatten,

    /// Not mapped; always built from its default.
    Skip,
}

/// A field's `default` option.
enum FieldDefault {
    None,
    Trait,
    Path(syn::ExprPath),
}

struct ModelField<'a> {
    inner: &'a syn::Field,
    ident: &'a syn::Ident,

    /// The field name without a raw identifier marker.
    name: String,
    mode: FieldMode,
    default: FieldDefault,
    validate: Option<syn::ExprPath>,
}

fn parse_expr_path(errors: &Errors, nv: &MetaNameValue) -> Option<syn::ExprPath> {
    let mut out = None;
    with_lit_str(errors, nv, &mut |l| match l.parse() {
        Ok(p) => out = Some(p),
        Err(e) => errors.push(e),
    });
    out
}

impl<'a> ModelField<'a> {
    fn new(errors: &Errors, inner: &'a syn::Field, ident: &'a syn::Ident) -> Option<Self> {
        let mut opts = MapperOpts::default();
        let mut kind = None;
        let mut flatten = false;
        let mut skip = false;
        let mut default = FieldDefault::None;
        let mut validate = None;
        for item in get_meta_items(errors, &inner.attrs) {
            if opts.parse_item(errors, &item) {
                continue;
            }
            match &item {
                NestedMeta::Meta(Meta::Path(p)) if p.is_ident("default") => {
                    default = FieldDefault::Trait;
                }
                NestedMeta::Meta(Meta::NameValue(nv @ MetaNameValue { path, .. }))
                    if path.is_ident("default") =>
                {
                    if let Some(p) = parse_expr_path(errors, nv) {
                        default = FieldDefault::Path(p);
                    }
                }
                NestedMeta::Meta(Meta::NameValue(nv @ MetaNameValue { path, .. }))
                    if path.is_ident("validate") =>
                {
                    validate = parse_expr_path(errors, nv);
                }
                NestedMeta::Meta(Meta::Path(p)) if p.is_ident("flatten") => flatten = true,
                NestedMeta::Meta(Meta::Path(p)) if p.is_ident("skip") => skip = true,
                NestedMeta::Meta(m) if MapperSpec::is_kind(m) => {
                    if kind.is_some() {
                        errors.push(syn::Error::new_spanned(m, "more than one mapping"));
                        return None;
                    }
                    kind = Some(m.clone());
                }
                i => errors.push(syn::Error::new_spanned(i, "item not understood")),
            }
        }
        let mode = match (flatten, skip, kind) {
            (true, true, _) | (true, _, Some(_)) | (_, true, Some(_)) => {
                errors.push(syn::Error::new_spanned(
                    inner,
                    "flatten, skip, and a mapping are mutually exclusive",
                ));
                return None;
            }
            (true, false, None) => FieldMode::Flatten,
            (false, true, None) => FieldMode::Skip,
            (false, false, None) => FieldMode::Mapped(MapperSpec::Element(opts)),
            (false, false, Some(Meta::Path(p))) => {
                FieldMode::Mapped(MapperSpec::from_path(errors, &p, opts)?)
            }
            (false, false, Some(m)) => {
                if opts.rename.is_some()
                    || opts.prefix.is_some()
                    || !opts.namespaces.is_empty()
                    || opts.index.is_some()
                {
                    errors.push(syn::Error::new_spanned(
                        &m,
                        "with a composed mapping, set options inside it",
                    ));
                }
                FieldMode::Mapped(MapperSpec::parse(errors, &m)?)
            }
        };
        if matches!(mode, FieldMode::Flatten) && !matches!(default, FieldDefault::None) {
            errors.push(syn::Error::new_spanned(
                inner,
                "default and flatten are mutually exclusive",
            ));
        }
        Some(ModelField {
            inner,
            ident,
            name: ident.unraw().to_string(),
            mode,
            default,
            validate,
        })
    }

    fn is_option(&self) -> bool {
        generic_arg(&self.inner.ty, "Option").is_some()
    }

    fn required(&self) -> bool {
        !self.is_option() && matches!(self.default, FieldDefault::None)
    }

    fn default_expr(&self) -> TokenStream {
        match &self.default {
            FieldDefault::Path(p) => quote_spanned! { p.span() => #p() },
            _ => quote! { ::std::default::Default::default() },
        }
    }

    /// Returns the expression building this field's mapper.
    fn quote_mapper(&self, errors: &Errors, spec: &MapperSpec) -> Option<TokenStream> {
        let ty = generic_arg(&self.inner.ty, "Option").unwrap_or(&self.inner.ty);
        quote_spec(errors, spec, ty, self.required())
    }
}

/// Strips `Option` then `Box` from a nested model's field type.
fn model_type(ty: &syn::Type) -> &syn::Type {
    let ty = generic_arg(ty, "Option").unwrap_or(ty);
    generic_arg(ty, "Box").unwrap_or(ty)
}

fn quote_opts(opts: &MapperOpts, with_name: bool) -> TokenStream {
    let mut out = TokenStream::new();
    if with_name {
        if let Some(n) = &opts.rename {
            out.extend(quote! { .name(#n) });
        }
    }
    if let Some(p) = &opts.prefix {
        out.extend(quote! { .ns(#p) });
    }
    for (prefix, url) in &opts.namespaces {
        out.extend(quote! { .namespace(#prefix, #url) });
    }
    if let Some(i) = opts.index {
        out.extend(quote! { .index(#i) });
    }
    out
}

/// Builds the mapper for `spec`, where `ty` is the (non-`Option`) type of the
/// value it maps.
fn quote_spec(
    errors: &Errors,
    spec: &MapperSpec,
    ty: &syn::Type,
    required: bool,
) -> Option<TokenStream> {
    Some(match spec {
        MapperSpec::Attribute(opts) => {
            let opts = quote_opts(opts, true);
            quote! { ::xmlmap::mapper::AttributeMapper::new() #opts .required(#required) }
        }
        MapperSpec::Element(opts) => {
            let opts = quote_opts(opts, true);
            quote! { ::xmlmap::mapper::ElementMapper::new() #opts .required(#required) }
        }
        MapperSpec::Nested(opts) => {
            let model = model_type(ty);
            if !matches!(model, syn::Type::Path(_)) {
                errors.push(syn::Error::new_spanned(
                    ty,
                    "nested fields must be of a model type, optionally in Option, Vec or Box",
                ));
                return None;
            }
            let opts = quote_opts(opts, true);
            quote_spanned! {
                ty.span() =>
                ::xmlmap::mapper::ModelMapper::of::<#model>() #opts .required(#required)
            }
        }
        MapperSpec::Wrapper { path, opts, inner } => {
            let opts = quote_opts(opts, false);
            let inner = quote_spec(errors, inner, ty, required)?;
            quote! { ::xmlmap::mapper::WrapperMapper::builder(#path) #opts .wrap(#inner) }
        }
        MapperSpec::List(inner) => {
            let item = match generic_arg(ty, "Vec") {
                Some(t) => t,
                None => {
                    errors.push(syn::Error::new_spanned(ty, "list fields must be a Vec"));
                    return None;
                }
            };
            let inner = quote_spec(errors, inner, item, required)?;
            quote! { ::xmlmap::mapper::ListMapper::new(#inner) }
        }
    })
}

/// Returns `(i, earlier)` for each name at position `i` whose constructor
/// name (see `xmlmap::value::constructor_key`) was already taken by `earlier`.
fn constructor_collisions<'a>(names: impl Iterator<Item = &'a str>) -> Vec<(usize, &'a str)> {
    let mut seen = BTreeMap::new();
    let mut collisions = Vec::new();
    for (i, name) in names.enumerate() {
        if let Some(earlier) = seen.insert(xmlmap::value::constructor_key(name), name) {
            collisions.push((i, earlier));
        }
    }
    collisions
}

fn do_struct(
    errors: &Errors,
    input: &syn::DeriveInput,
    struct_: &syn::DataStruct,
) -> Result<TokenStream, ()> {
    let named = match struct_.fields {
        Fields::Named(ref fields) => &fields.named,
        _ => {
            errors.push(syn::Error::new_spanned(
                &input.ident,
                "#[derive(Model)] only supports structs with named fields",
            ));
            return Err(());
        }
    };
    let attr = ModelAttr::new(errors, input);
    let fields: Vec<ModelField> = named
        .iter()
        .filter_map(|f| f.ident.as_ref().and_then(|i| ModelField::new(errors, f, i)))
        .collect();
    if fields.len() != named.len() {
        return Err(());
    }

    let mapped: Vec<&ModelField> = fields
        .iter()
        .filter(|f| matches!(f.mode, FieldMode::Mapped(_)))
        .collect();
    for (i, other) in constructor_collisions(mapped.iter().map(|f| f.name.as_str())) {
        let f = mapped[i];
        errors.push(syn::Error::new_spanned(
            f.ident,
            format!("field {} has the same constructor name as {}", f.name, other),
        ));
    }

    let has_flatten = fields.iter().any(|f| matches!(f.mode, FieldMode::Flatten));
    let mut order_tokens = TokenStream::new();
    if let Some(ref order) = attr.order {
        let mut names = Vec::new();
        for o in order {
            let s = o.to_string();
            let known = fields
                .iter()
                .any(|f| f.name == s && matches!(f.mode, FieldMode::Mapped(_)));
            if !known && !has_flatten {
                errors.push(syn::Error::new_spanned(o, format!("no mapped field {}", s)));
            }
            if names.contains(&s) {
                errors.push(syn::Error::new_spanned(o, format!("{} is ordered twice", s)));
            }
            names.push(s);
        }
        order_tokens = quote! { .order([#(#names),*]) };
    }

    let mut builder = TokenStream::new();
    if let Some(ref n) = attr.rename {
        builder.extend(quote! { .name(#n) });
    }
    if let Some(ref p) = attr.prefix {
        builder.extend(quote! { .ns(#p) });
    }
    for (prefix, url) in &attr.namespaces {
        builder.extend(quote! { .namespace(#prefix, #url) });
    }
    builder.extend(order_tokens);

    let mut to_record = Vec::new();
    let mut from_record = Vec::new();
    let mut idents = Vec::new();
    for f in &fields {
        let ident = f.ident;
        let name = &f.name;
        let ty = &f.inner.ty;
        idents.push(ident);
        match &f.mode {
            FieldMode::Skip => {
                let default = f.default_expr();
                from_record.push(quote_spanned! { ident.span() => let #ident: #ty = #default; });
            }
            FieldMode::Flatten => {
                builder.extend(quote_spanned! {
                    ty.span() => .flatten(<#ty as ::xmlmap::Model>::descriptor)
                });
                to_record.push(quote_spanned! {
                    ident.span() => __record.extend(::xmlmap::Model::to_record(&self.#ident));
                });
                from_record.push(quote_spanned! {
                    ident.span() => let #ident = <#ty as ::xmlmap::Model>::from_record(__record)?;
                });
            }
            FieldMode::Mapped(spec) => {
                let mapper = f.quote_mapper(errors, spec).ok_or(())?;
                builder.extend(quote! { .field(#name, #mapper) });
                to_record.push(quote_spanned! {
                    ident.span() =>
                    if let Some(v) = ::xmlmap::IntoValue::to_value(&self.#ident) {
                        __record.insert(#name, v);
                    }
                });
                let (taken_ty, present, absent) = match generic_arg(ty, "Option") {
                    Some(inner) => {
                        let absent = match f.default {
                            FieldDefault::None => quote! { None },
                            _ => f.default_expr(),
                        };
                        (inner, quote! { Some(v) }, absent)
                    }
                    None => {
                        let absent = match f.default {
                            FieldDefault::None => quote! {
                                return Err(::xmlmap::value::missing_field(#name))
                            },
                            _ => f.default_expr(),
                        };
                        (ty, quote! { v }, absent)
                    }
                };
                from_record.push(quote_spanned! {
                    ident.span() =>
                    let #ident: #ty = match __record
                        .take::<#taken_ty>(#name)
                        .map_err(|e| ::xmlmap::value::field_error(#name, e))?
                    {
                        Some(v) => #present,
                        None => #absent,
                    };
                });
                if let Some(ref validate) = f.validate {
                    let check = quote_spanned! {
                        validate.span() =>
                        #validate(v).map_err(|e| {
                            ::xmlmap::value::field_error(#name, ::std::convert::Into::into(e))
                        })?;
                    };

                    // Validators see the value itself; an absent optional value isn't checked.
                    from_record.push(if f.is_option() {
                        quote! { if let Some(ref v) = #ident { #check } }
                    } else {
                        quote! { { let v = &#ident; #check } }
                    });
                }
            }
        }
    }

    let ident = &input.ident;
    let type_name = ident.to_string();
    Ok(quote! {
        impl ::xmlmap::Model for #ident {
            fn descriptor() -> &'static ::xmlmap::ModelDescriptor {
                static DESCRIPTOR: ::std::sync::OnceLock<::xmlmap::ModelDescriptor> =
                    ::std::sync::OnceLock::new();
                DESCRIPTOR.get_or_init(|| {
                    match ::xmlmap::ModelDescriptor::builder(#type_name) #builder .build() {
                        Ok(d) => d,
                        Err(e) => panic!("invalid model declaration: {}", e),
                    }
                })
            }

            fn to_record(&self) -> ::xmlmap::Record {
                let mut __record = ::xmlmap::Record::new();
                #(#to_record)*
                __record
            }

            fn from_record(
                __record: &mut ::xmlmap::Record,
            ) -> ::std::result::Result<Self, ::xmlmap::BoxedStdError> {
                #(#from_record)*
                Ok(Self { #(#idents),* })
            }
        }

        impl ::xmlmap::IntoValue for #ident {
            fn to_value(&self) -> ::std::option::Option<::xmlmap::Value> {
                Some(::xmlmap::Value::Record(::xmlmap::Model::to_record(self)))
            }
        }

        impl ::xmlmap::FromValue for #ident {
            fn from_value(
                value: ::xmlmap::Value,
            ) -> ::std::result::Result<Self, ::xmlmap::BoxedStdError> {
                let mut record = ::xmlmap::value::into_record(value)?;
                <Self as ::xmlmap::Model>::from_record(&mut record)
            }
        }
    })
}

pub(crate) fn derive(errors: &Errors, input: syn::DeriveInput) -> Result<TokenStream, ()> {
    if !input.generics.params.is_empty() {
        errors.push(syn::Error::new_spanned(
            &input.generics,
            "generic models are not supported",
        ));
        return Err(());
    }
    match input.data {
        Data::Struct(ref s) => do_struct(errors, &input, s),
        _ => {
            errors.push(syn::Error::new_spanned(
                &input.ident,
                "#[derive(Model)] only supports structs",
            ));
            Err(())
        }
    }
}
