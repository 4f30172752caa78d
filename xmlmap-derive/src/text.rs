// Copyright (C) 2021 Scott Lamb <slamb@slamb.org>
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Logic to derive `ParseText`, `ToScalar`, and the value conversions for
//! types which map to element or attribute text.

use proc_macro2::TokenStream;
use quote::{quote, quote_spanned};
use syn::Data;
use xmlmap::de::WhiteSpace;

use crate::common::{Errors, TextAttr, TextEnum, TextMode, TextVariantMode};

fn do_restriction(enum_: &TextEnum) -> TokenStream {
    let ident = &enum_.input.ident;
    let mut parse_arms = Vec::new();
    let mut to_text_arms = Vec::new();
    for v in &enum_.variants {
        let vident = &v.inner.ident;
        match v.mode {
            TextVariantMode::Known { ref text } => {
                parse_arms.push(quote_spanned! { vident.span() => #text => Ok(Self::#vident) });
                to_text_arms.push(quote_spanned! {
                    vident.span() => Self::#vident => ::std::borrow::ToOwned::to_owned(#text)
                });
            }
            TextVariantMode::Unknown => {
                to_text_arms.push(quote_spanned! {
                    vident.span() =>
                    Self::#vident(text) => ::std::string::ToString::to_string(text)
                });
            }
        }
    }
    let fallthrough = match enum_.unknown_variant {
        Some(i) => {
            let vident = &enum_.variants[i].inner.ident;
            quote_spanned! { vident.span() => _ => Ok(Self::#vident(text)) }
        }
        None => quote! { t => Err(::xmlmap::de::no_such_variant(stringify!(#ident), t)) },
    };
    let normalize = normalize(enum_.whitespace);
    quote! {
        impl ::xmlmap::de::ParseText for #ident {
            fn parse(text: String) -> Result<Self, ::xmlmap::BoxedStdError> {
                #normalize
                match text.as_str() {
                    #(#parse_arms, )*
                    #fallthrough
                }
            }
        }

        impl ::xmlmap::ToScalar for #ident {
            fn to_scalar(&self) -> ::xmlmap::Scalar {
                ::xmlmap::Scalar::Other(match self {
                    #(#to_text_arms, )*
                })
            }
        }

        ::xmlmap::scalar_value!(#ident);
    }
}

fn do_std(ident: &proc_macro2::Ident, attr: &TextAttr) -> TokenStream {
    let normalize = normalize(attr.whitespace);
    quote! {
        impl ::xmlmap::de::ParseText for #ident {
            fn parse(text: String) -> Result<Self, ::xmlmap::BoxedStdError> {
                #normalize
                ::std::str::FromStr::from_str(text.as_str())
                    .map_err(|e| Box::new(e) as ::xmlmap::BoxedStdError)
            }
        }

        impl ::xmlmap::ToScalar for #ident {
            fn to_scalar(&self) -> ::xmlmap::Scalar {
                ::xmlmap::Scalar::Other(::std::string::ToString::to_string(self))
            }
        }

        ::xmlmap::scalar_value!(#ident);
    }
}

fn normalize(whitespace: WhiteSpace) -> TokenStream {
    match whitespace {
        WhiteSpace::Preserve => TokenStream::new(),
        WhiteSpace::Replace => {
            quote! { let text = ::xmlmap::de::normalize(text, ::xmlmap::de::WhiteSpace::Replace); }
        }
        WhiteSpace::Collapse => {
            quote! { let text = ::xmlmap::de::normalize(text, ::xmlmap::de::WhiteSpace::Collapse); }
        }
    }
}

pub(crate) fn derive(errors: &Errors, input: syn::DeriveInput) -> Result<TokenStream, ()> {
    if !input.generics.params.is_empty() {
        errors.push(syn::Error::new_spanned(
            &input.generics,
            "generic text types are not supported",
        ));
        return Err(());
    }
    let attr = TextAttr::new(errors, &input);
    if attr.mode == TextMode::Std {
        return Ok(do_std(&input.ident, &attr));
    }
    match input.data {
        Data::Enum(ref data) => Ok(do_restriction(&TextEnum::new(errors, &input, attr, data))),
        _ => {
            errors.push(syn::Error::new_spanned(
                input.ident,
                "restriction mode requires an enum; use mode = \"std\" for other types",
            ));
            Err(())
        }
    }
}
