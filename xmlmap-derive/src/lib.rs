// Copyright (C) 2021 Scott Lamb <slamb@slamb.org>
// SPDX-License-Identifier: MIT OR Apache-2.0

mod common;
mod model;
mod text;

use common::Errors;
use quote::quote;
use syn::{parse_macro_input, DeriveInput};

fn derive(
    input: proc_macro::TokenStream,
    f: fn(&Errors, syn::DeriveInput) -> Result<proc_macro2::TokenStream, ()>,
) -> proc_macro::TokenStream {
    let errors = Errors::new();
    let input = parse_macro_input!(input as DeriveInput);
    let out = f(&errors, input).unwrap_or_default();
    let errors = errors.take_compile_errors();
    proc_macro::TokenStream::from(quote! {
        const _: () = {
            #errors
            #out
        };
    })
}

/// Derives `xmlmap::Model` for a struct with named fields.
///
/// Struct options: `rename`, `prefix`, `namespace = "prefix: uri"`,
/// `default_namespace`, `order(field, ...)`.
///
/// Field mappings: `attribute`, `element` (the default), `nested`,
/// `wrapper("a/b", ...)`, `list(...)`. Flat mappings accept `rename`,
/// `prefix`, `namespace` and `index` alongside. Other field options:
/// `default`, `default = "path"`, `validate = "path"`, `skip`, `flatten`.
#[proc_macro_derive(Model, attributes(xmlmap))]
pub fn derive_model(input: proc_macro::TokenStream) -> proc_macro::TokenStream {
    derive(input, model::derive)
}

/// Derives text conversions for a fixed set of strings (an `enum`) or, with
/// `#[xmlmap(mode = "std")]`, via `FromStr` and `Display`.
#[proc_macro_derive(Text, attributes(xmlmap))]
pub fn derive_text(input: proc_macro::TokenStream) -> proc_macro::TokenStream {
    derive(input, text::derive)
}
