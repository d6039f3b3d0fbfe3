//! Purpose: Lock converter contract expectations with corpus + fuzzed coverage.
//! Exports: Integration tests only (no runtime exports).
//! Role: Catch drift in conversion semantics and failure behavior.
//! Invariants: Truncated documents always fail cleanly, never panic.
//! Invariants: Conversion is deterministic for identical input.

use serde_json::json;
use xylem::api::{ErrorKind, convert};

#[test]
fn corpus_documents_convert_to_expected_values() {
    let cases = [
        (
            "<event><id>1</id><v>2</v></event>",
            json!({"id": "1", "v": "2"}),
        ),
        (
            "<event><id>evt-001</id><payload><value1>Data A</value1><value2>123.45</value2></payload><meta key=\"source\">test</meta></event>",
            // A leaf at the root layer contributes its text only; the root
            // layer drops attributes, so meta's key attribute is gone.
            json!({
                "id": "evt-001",
                "payload": {"value1": "Data A", "value2": "123.45"},
                "meta": "test"
            }),
        ),
        (
            "<wrap><a><b>1</b><b>2</b><b>3</b></a></wrap>",
            json!({"a": {"b": ["1", "2", "3"]}}),
        ),
        (
            "<wrap><item sku=\"X\" qty=\"2\"><name>P</name></item></wrap>",
            json!({"item": {"@sku": "X", "@qty": "2", "name": "P"}}),
        ),
    ];

    for (xml, expected) in cases {
        let value = convert(xml).expect("convert");
        assert_eq!(value, expected, "input: {xml}");
    }
}

#[test]
fn root_mapping_keys_are_the_root_child_tags() {
    let value = convert("<r><x>1</x><y><z>2</z></y><w/></r>").expect("convert");
    let keys: Vec<&str> = value
        .as_object()
        .expect("object")
        .keys()
        .map(String::as_str)
        .collect();
    assert_eq!(keys, ["w", "x", "y"]);
}

#[test]
fn every_truncation_of_a_valid_document_fails_cleanly() {
    let doc = "<event><id>1</id><payload><value1>Data A</value1></payload></event>";
    for end in 0..doc.len() {
        let prefix = &doc[..end];
        let err = convert(prefix)
            .err()
            .unwrap_or_else(|| panic!("prefix of length {end} unexpectedly converted"));
        assert_eq!(err.kind(), ErrorKind::Parse);
        assert_eq!(err.input(), Some(prefix));
    }
}

#[test]
fn truncations_of_multibyte_documents_fail_cleanly() {
    let doc = "<note><msg>caf\u{e9} \u{2615}</msg><n>1</n></note>";
    for (end, _) in doc.char_indices() {
        let prefix = &doc[..end];
        assert!(
            convert(prefix).is_err(),
            "prefix of length {end} unexpectedly converted"
        );
    }
}

#[test]
fn conversion_is_deterministic() {
    let doc = "<order><items><item sku=\"A\"><name>P</name></item><item sku=\"B\"><name>Q</name></item></items><total>45.50</total></order>";
    let first = convert(doc).expect("first");
    let second = convert(doc).expect("second");
    assert_eq!(first, second);
    assert_eq!(
        serde_json::to_string(&first).expect("encode"),
        serde_json::to_string(&second).expect("encode")
    );
}
