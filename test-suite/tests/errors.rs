// Copyright (C) 2021 Scott Lamb <slamb@slamb.org>
// SPDX-License-Identifier: MIT OR Apache-2.0

mod common;

use std::sync::OnceLock;

use assert_matches::assert_matches;
use common::init;
use xmlmap::de::{self, ErrorKind};
use xmlmap::mapper::AttributeMapper;
use xmlmap::{ser, BoxedStdError, IntoValue, Model, ModelDescriptor, Record};
use xmlmap_derive::Model;

#[derive(Debug, Model)]
#[xmlmap(rename = "test_model")]
struct TestModel {
    element: String,
}

#[test]
fn missing_model() {
    init();
    let doc = r#"<?xml version="1.0" encoding="utf-8"?>
        <envelope>
            <test_model1/>
        </envelope>"#;
    let e = de::Deserializer::new()
        .envelope("envelope")
        .from_str::<TestModel>(doc)
        .unwrap_err();
    assert_eq!(
        e.to_string(),
        "required element '/envelope/test_model[1]' not found"
    );
    assert_eq!(e.path(), Some("/envelope/test_model[1]"));

    // Errors are cheap to clone and keep their message.
    let cloned = e.clone();
    assert_eq!(cloned.to_string(), e.to_string());
}

#[test]
fn missing_element() {
    init();
    let e = de::from_str::<TestModel>("<test_model><element1/></test_model>").unwrap_err();
    assert_matches!(
        e.kind(),
        ErrorKind::MissingElement { path } if path == "/test_model[1]/element[1]"
    );

    // An empty element counts as missing.
    let e = de::from_str::<TestModel>("<test_model><element/></test_model>").unwrap_err();
    assert_eq!(
        e.to_string(),
        "required element '/test_model[1]/element[1]' not found"
    );
}

#[test]
fn missing_attribute() {
    init();

    #[derive(Debug, Model)]
    #[xmlmap(rename = "test_model")]
    struct TestModel {
        #[xmlmap(attribute)]
        attribute: String,
    }

    let e = de::from_str::<TestModel>(r#"<test_model attribute1="value1"/>"#).unwrap_err();
    assert_matches!(
        e.kind(),
        ErrorKind::MissingAttribute { path } if path == "/test_model[1]/attribute"
    );
    assert_eq!(
        e.to_string(),
        "required attribute '/test_model[1]/attribute' not found"
    );
}

#[test]
fn missing_wrapper() {
    init();
    let doc = r#"<test_model>
            <wrapper>
                <wrapper>
                    <element1>value</element1>
                </wrapper>
            </wrapper>
        </test_model>"#;

    #[derive(Debug, Model)]
    #[xmlmap(rename = "test_model")]
    struct Inner {
        #[xmlmap(wrapper("wrapper/wrapper", element))]
        element: String,
    }

    #[derive(Debug, Model)]
    #[xmlmap(rename = "test_model")]
    struct Outer {
        #[xmlmap(wrapper("wrapper1", wrapper("wrapper", element)))]
        element: String,
    }

    let e = de::from_str::<Inner>(doc).unwrap_err();
    assert_eq!(
        e.path(),
        Some("/test_model[1]/wrapper[1]/wrapper[1]/element[1]")
    );
    let e = de::from_str::<Outer>(doc).unwrap_err();
    assert_eq!(
        e.to_string(),
        "required element '/test_model[1]/wrapper1[1]' not found"
    );
}

#[test]
fn missing_nested() {
    init();

    #[derive(Debug, Model)]
    #[xmlmap(rename = "nested_model1")]
    struct NestedModel {}

    #[derive(Debug, Model)]
    #[xmlmap(rename = "test_model")]
    struct TestModel {
        #[xmlmap(nested)]
        element: NestedModel,
    }

    let e = de::from_str::<TestModel>("<test_model><nested_model/></test_model>").unwrap_err();
    assert_eq!(
        e.to_string(),
        "required element '/test_model[1]/nested_model1[1]' not found"
    );
}

#[test]
fn conversion() {
    init();

    #[derive(Debug, Model)]
    #[xmlmap(rename = "user")]
    struct User {
        #[xmlmap(attribute)]
        age: u32,
    }

    let e = de::from_str::<User>(r#"<user age="old"/>"#).unwrap_err();
    assert_matches!(e.kind(), ErrorKind::Value(_));
    assert!(e.to_string().starts_with("field age: "), "{}", e);
    assert!(std::error::Error::source(&e).is_some());
}

fn check_phone(phone: &str) -> Result<(), &'static str> {
    let digits = phone.strip_prefix('+').unwrap_or_default();
    if (11..=13).contains(&digits.len()) && digits.chars().all(|c| c.is_ascii_digit()) {
        Ok(())
    } else {
        Err("phone number is incorrect")
    }
}

#[test]
fn validation() {
    init();

    #[derive(Debug, Model)]
    #[xmlmap(rename = "user")]
    struct User {
        #[xmlmap(validate = "check_phone")]
        phone: String,

        #[xmlmap(validate = "check_phone")]
        fax: Option<String>,
    }

    let user: User = de::from_str("<user><phone>+79204563539</phone></user>").unwrap();
    assert_eq!(user.phone, "+79204563539");
    assert!(user.fax.is_none());

    let e = de::from_str::<User>("<user><phone>12345</phone></user>").unwrap_err();
    assert_eq!(e.to_string(), "field phone: phone number is incorrect");

    let e = de::from_str::<User>(
        "<user><phone>+79204563539</phone><fax>555</fax></user>",
    )
    .unwrap_err();
    assert_eq!(e.to_string(), "field fax: phone number is incorrect");
}

#[test]
fn syntax() {
    init();
    let e = de::from_str::<TestModel>("<test_model><element>value</test_model>").unwrap_err();
    assert_matches!(e.kind(), ErrorKind::Xml(_));
    assert_eq!(e.path(), None);
}

#[test]
fn index_gap() {
    init();

    #[derive(Model)]
    #[xmlmap(rename = "root")]
    struct TestModel {
        #[xmlmap(element, rename = "element", index = 2)]
        second: String,
    }

    let e = ser::serialize(&TestModel {
        second: "value".to_owned(),
    })
    .to_string()
    .unwrap_err();
    assert_eq!(
        e.to_string(),
        "serialization can't be completed because element[2] is going to be serialized, \
         but element[1] is not serialized."
    );
}

/// A model declared without the derive, whose attribute may be unset.
struct Manual {
    name: Option<String>,
}

impl Model for Manual {
    fn descriptor() -> &'static ModelDescriptor {
        static DESCRIPTOR: OnceLock<ModelDescriptor> = OnceLock::new();
        DESCRIPTOR.get_or_init(|| {
            ModelDescriptor::builder("Manual")
                .name("manual")
                .field("name", AttributeMapper::new())
                .build()
                .unwrap()
        })
    }

    fn to_record(&self) -> Record {
        let mut record = Record::new();
        if let Some(v) = self.name.to_value() {
            record.insert("name", v);
        }
        record
    }

    fn from_record(record: &mut Record) -> Result<Self, BoxedStdError> {
        Ok(Manual {
            name: record.take("name")?,
        })
    }
}

#[test]
fn missing_required_value() {
    init();
    let out = ser::serialize(&Manual {
        name: Some("Alexey".to_owned()),
    })
    .to_string()
    .unwrap()
    .unwrap();
    assert_eq!(
        out,
        r#"<?xml version="1.0" encoding="utf-8"?><manual name="Alexey" />"#
    );

    let e = ser::serialize(&Manual { name: None })
        .to_string()
        .unwrap_err();
    assert_eq!(e.to_string(), "required attribute 'name' is not set");

    let m: Manual = de::from_str(r#"<manual name="Alexey"/>"#).unwrap();
    assert_eq!(m.name.as_deref(), Some("Alexey"));
}
