// Copyright (C) 2021 Scott Lamb <slamb@slamb.org>
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Namespace-prefix maps and qualified tag helpers.
//!
//! Mappers refer to namespaces by prefix. A prefix is only turned into a URI
//! at the point of use, against the namespace map in effect there: the
//! model's own map merged with whatever the enclosing mappers and the caller
//! supplied.

use std::collections::BTreeMap;

use crate::ExpandedName;

/// Mapping of prefix to namespace URI.
///
/// The empty prefix, if present, is the default namespace.
pub type NsMap = BTreeMap<String, String>;

/// Returns the tag used in diagnostic paths: `prefix:name[idx]`.
///
/// An unset or empty prefix yields the bare name; no index yields no suffix.
pub fn tag_name(ns: Option<&str>, name: &str, idx: Option<usize>) -> String {
    let mut tag = match ns {
        Some(prefix) if !prefix.is_empty() => format!("{}:{}", prefix, name),
        _ => name.to_owned(),
    };
    if let Some(idx) = idx {
        tag.push_str(&format!("[{}]", idx));
    }
    tag
}

/// Splits `prefix:local` into its parts. A segment without a colon has no prefix.
pub fn split_tag(tag: &str) -> (Option<&str>, &str) {
    match tag.split_once(':') {
        Some((prefix, local)) => (Some(prefix), local),
        None => (None, tag),
    }
}

/// Returns the namespace URI of `prefix`, or `""` for no namespace.
///
/// An unset prefix looks up the default (`""`) entry. A prefix missing from the
/// map also means no namespace.
pub fn resolve<'a>(ns_map: &'a NsMap, prefix: Option<&str>) -> &'a str {
    ns_map
        .get(prefix.unwrap_or(""))
        .map(String::as_str)
        .unwrap_or("")
}

/// Builds the expanded name for `name` in namespace `ns` as seen through `ns_map`.
pub fn qualify(ns: Option<&str>, name: &str, ns_map: &NsMap) -> ExpandedName {
    ExpandedName::new(resolve(ns_map, ns), name)
}

/// Merges two maps; entries of `inner` override same-prefix entries of `outer`.
pub fn merge(inner: &NsMap, outer: &NsMap) -> NsMap {
    if inner.is_empty() {
        return outer.clone();
    }
    let mut merged = outer.clone();
    merged.extend(inner.iter().map(|(p, u)| (p.clone(), u.clone())));
    merged
}

/// Qualifies each `/`-separated segment of `path` (e.g. an envelope such as
/// `soap:Envelope/soap:Body`).
pub fn qualify_path(path: &str, ns_map: &NsMap) -> Vec<ExpandedName> {
    path.split('/')
        .filter(|s| !s.is_empty())
        .map(|segment| {
            let (prefix, local) = split_tag(segment);
            qualify(prefix, local, ns_map)
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn map(entries: &[(&str, &str)]) -> NsMap {
        entries
            .iter()
            .map(|&(p, u)| (p.to_owned(), u.to_owned()))
            .collect()
    }

    #[test]
    fn tags() {
        assert_eq!(tag_name(None, "element", None), "element");
        assert_eq!(tag_name(Some(""), "element", Some(1)), "element[1]");
        assert_eq!(tag_name(Some("doc"), "user", Some(2)), "doc:user[2]");
        assert_eq!(split_tag("doc:envelope"), (Some("doc"), "envelope"));
        assert_eq!(split_tag("envelope"), (None, "envelope"));
    }

    #[test]
    fn inner_map_wins() {
        let outer = map(&[("a", "http://outer/a"), ("b", "http://outer/b")]);
        let inner = map(&[("b", "http://inner/b")]);
        let merged = merge(&inner, &outer);
        assert_eq!(resolve(&merged, Some("a")), "http://outer/a");
        assert_eq!(resolve(&merged, Some("b")), "http://inner/b");
    }

    #[test]
    fn unknown_prefix_is_no_namespace() {
        let m = map(&[("a", "http://a")]);
        assert_eq!(resolve(&m, Some("zzz")), "");
        assert_eq!(resolve(&m, None), "");
        assert_eq!(qualify(Some(""), "x", &m), ExpandedName::new("", "x"));

        let with_default = map(&[("", "http://default")]);
        assert_eq!(resolve(&with_default, None), "http://default");
    }

    #[test]
    fn paths() {
        let m = map(&[("soap", "http://soap")]);
        assert_eq!(
            qualify_path("soap:Envelope/Body", &m),
            vec![
                ExpandedName::new("http://soap", "Envelope"),
                ExpandedName::new("", "Body"),
            ]
        );
    }
}
