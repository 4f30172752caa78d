// Copyright (C) 2021 Scott Lamb <slamb@slamb.org>
// SPDX-License-Identifier: MIT OR Apache-2.0

mod common;

use common::{assert_same_xml, init};
use xmlmap::de::ParseText;
use xmlmap::{de, ser, Scalar, ToScalar};
use xmlmap_derive::{Model, Text};

#[derive(Clone, Debug, PartialEq, Text)]
#[xmlmap(whitespace = "collapse")]
enum Status {
    #[xmlmap(rename = "active")]
    Active,

    #[xmlmap(rename = "on hold")]
    OnHold,

    #[xmlmap(unknown)]
    Other(String),
}

#[derive(Clone, Debug, PartialEq, Text)]
enum Strict {
    Yes,
    No,
}

/// A type with `FromStr` and `Display` impls.
#[derive(Clone, Debug, PartialEq, Text)]
#[xmlmap(mode = "std", whitespace = "collapse")]
struct Version(u32, u32);

impl std::str::FromStr for Version {
    type Err = std::num::ParseIntError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (major, minor) = s.split_once('.').unwrap_or((s, "0"));
        Ok(Version(major.parse()?, minor.parse()?))
    }
}

impl std::fmt::Display for Version {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}.{}", self.0, self.1)
    }
}

#[test]
fn restriction() {
    init();
    assert_eq!(Status::parse(" on\n hold ".to_owned()).unwrap(), Status::OnHold);
    assert_eq!(
        Status::parse("retired".to_owned()).unwrap(),
        Status::Other("retired".to_owned())
    );
    assert_eq!(Status::OnHold.to_scalar(), Scalar::Other("on hold".to_owned()));
    assert_eq!(
        Status::Other("retired".to_owned()).to_scalar(),
        Scalar::Other("retired".to_owned())
    );

    assert_eq!(Strict::parse("Yes".to_owned()).unwrap(), Strict::Yes);
    let e = Strict::parse("yes".to_owned()).unwrap_err();
    assert_eq!(e.to_string(), "no such Strict variant \"yes\"");
}

#[test]
fn std_mode() {
    init();
    assert_eq!(Version::parse(" 1.2\n".to_owned()).unwrap(), Version(1, 2));
    assert!(Version::parse("x".to_owned()).is_err());
    assert_eq!(Version(3, 0).to_scalar(), Scalar::Other("3.0".to_owned()));
}

#[test]
fn as_fields() {
    init();

    #[derive(Debug, PartialEq, Model)]
    #[xmlmap(rename = "project")]
    struct Project {
        #[xmlmap(attribute)]
        status: Status,

        #[xmlmap(list(element(rename = "supports")))]
        versions: Vec<Version>,

        strict: Option<Strict>,
    }

    let project = Project {
        status: Status::OnHold,
        versions: vec![Version(1, 0), Version(2, 1)],
        strict: Some(Strict::No),
    };
    let out = ser::serialize(&project).to_string().unwrap().unwrap();
    assert_same_xml(
        &out,
        r#"<project status="on hold">
            <supports>1.0</supports>
            <supports>2.1</supports>
            <strict>No</strict>
        </project>"#,
    );
    let parsed: Project = de::from_str(&out).unwrap();
    assert_eq!(parsed, project);
}
