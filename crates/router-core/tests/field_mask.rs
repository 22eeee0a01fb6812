// crates/router-core/tests/field_mask.rs

use std::collections::BTreeMap;

use router_core::{FieldMaskTree, FieldValue, MapKey, Record};

fn nested() -> FieldValue {
    FieldValue::Msg(
        Record::new()
            .with("p1", FieldValue::Int(1))
            .with("p2", FieldValue::Int(2)),
    )
}

fn mask_fixture() -> Record {
    Record::new()
        .with("name", FieldValue::str("test"))
        .with("msg", nested())
        .with("list", FieldValue::List(vec![nested(), nested()]))
        .with(
            "kv1",
            FieldValue::Map(BTreeMap::from([(MapKey::Int(10), nested())])),
        )
        .with(
            "kv2",
            FieldValue::Map(BTreeMap::from([(
                MapKey::Int(100),
                FieldValue::str("hello"),
            )])),
        )
}

#[test]
fn empty_mask_keeps_everything() {
    let rec = mask_fixture();
    let filtered = FieldMaskTree::new().filter_record(&rec);
    assert_eq!(filtered, rec);
}

#[test]
fn top_level_mask_keeps_one_field() {
    let filtered = FieldMaskTree::from_paths(&["name"]).filter_record(&mask_fixture());
    assert_eq!(filtered.len(), 1);
    assert_eq!(filtered.get("name").unwrap().as_str(), Some("test"));
}

#[test]
fn nested_mask_descends_into_records() {
    let filtered = FieldMaskTree::from_paths(&["msg.p1"]).filter_record(&mask_fixture());
    let FieldValue::Msg(msg) = filtered.get("msg").unwrap() else {
        panic!("msg must survive as a record");
    };
    assert_eq!(msg.len(), 1);
    assert_eq!(msg.get("p1"), Some(&FieldValue::Int(1)));
}

#[test]
fn list_mask_applies_per_element() {
    let filtered = FieldMaskTree::from_paths(&["list.p2"]).filter_record(&mask_fixture());
    let items = filtered.get("list").unwrap().as_list().unwrap();
    assert_eq!(items.len(), 2);
    for item in items {
        let FieldValue::Msg(rec) = item else {
            panic!("list elements must stay records");
        };
        assert_eq!(rec.len(), 1);
        assert_eq!(rec.get("p2"), Some(&FieldValue::Int(2)));
    }
}

#[test]
fn map_mask_applies_inside_each_value() {
    let filtered = FieldMaskTree::from_paths(&["kv1.p1"]).filter_record(&mask_fixture());
    let kv1 = filtered.get("kv1").unwrap().as_map().unwrap();
    let FieldValue::Msg(rec) = kv1.get(&MapKey::Int(10)).unwrap() else {
        panic!("map values must stay records");
    };
    assert_eq!(rec.len(), 1);
    assert_eq!(rec.get("p1"), Some(&FieldValue::Int(1)));
}

#[test]
fn missing_paths_short_circuit() {
    let filtered =
        FieldMaskTree::from_paths(&["absent", "msg.p3", "kv2.a"]).filter_record(&mask_fixture());
    // "absent" names no field, "msg.p3" reaches past the record's fields,
    // and "kv2.a" descends into scalar map values: nothing matches.
    assert!(filtered.is_empty());
}

#[test]
fn several_masks_combine() {
    let filtered =
        FieldMaskTree::from_paths(&["name", "kv1"]).filter_record(&mask_fixture());
    assert_eq!(filtered.len(), 2);
    // A leaf mask keeps the whole subtree.
    let kv1 = filtered.get("kv1").unwrap().as_map().unwrap();
    assert_eq!(kv1.get(&MapKey::Int(10)), Some(&nested()));
}

#[test]
fn filtering_does_not_mutate_the_source() {
    let rec = mask_fixture();
    let _ = FieldMaskTree::from_paths(&["name"]).filter_record(&rec);
    assert_eq!(rec, mask_fixture());
}
