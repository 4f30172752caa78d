// Copyright (C) 2021 Scott Lamb <slamb@slamb.org>
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Helpers shared by the integration tests.

#![allow(dead_code)]

use std::str::FromStr;

use xmlmap::Element;

/// Sets up the logger.
///
/// Run with e.g. `RUST_LOG=xmlmap=trace cargo test --test serialization -- --nocapture`
/// to see the mappers at work.
pub fn init() {
    let _ = env_logger::Builder::from_default_env()
        .is_test(true)
        .try_init();
}

/// Drops whitespace-only text and puts attributes in a canonical order.
fn canonicalize(mut e: Element) -> Element {
    if e.text.as_deref().map_or(false, |t| t.trim().is_empty()) {
        e.text = None;
    }
    e.attributes.sort();
    e.children = e.children.into_iter().map(canonicalize).collect();
    e
}

pub fn parse(xml: &str) -> Element {
    canonicalize(Element::from_str(xml).unwrap())
}

/// Compares two documents by expanded names, attributes and text, ignoring
/// prefix choices and indentation.
#[track_caller]
pub fn assert_same_xml(actual: &str, expected: &str) {
    log::debug!("comparing:\n{}", actual);
    let a = parse(actual);
    let e = parse(expected);
    assert_eq!(a, e, "actual document:\n{}", actual);
}
