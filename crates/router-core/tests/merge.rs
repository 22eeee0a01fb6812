// crates/router-core/tests/merge.rs

use std::collections::BTreeMap;

use router_core::{merge_with_options, FieldValue, MapKey, MergeOptions, Record};

fn list_of(items: &[&str]) -> FieldValue {
    FieldValue::List(items.iter().map(|s| FieldValue::str(*s)).collect())
}

fn wrapper(content: &str) -> FieldValue {
    FieldValue::Msg(Record::new().with("content", FieldValue::str(content)))
}

fn merge_fixture() -> (Record, Record) {
    let dst = Record::new()
        .with("list", list_of(&["a", "b", "c"]))
        .with(
            "kv",
            FieldValue::Map(BTreeMap::from([
                (MapKey::Int(1), wrapper("aa")),
                (MapKey::Int(2), wrapper("bb")),
            ])),
        );
    let src = Record::new()
        .with("list", list_of(&["d", "e"]))
        .with(
            "kv",
            FieldValue::Map(BTreeMap::from([
                (MapKey::Int(1), FieldValue::Null),
                (MapKey::Int(2), wrapper("bbb")),
            ])),
        );
    (dst, src)
}

fn list_strings(v: &FieldValue) -> Vec<&str> {
    v.as_list()
        .unwrap()
        .iter()
        .map(|e| e.as_str().unwrap())
        .collect()
}

#[test]
fn replace_repeated_swaps_the_list() {
    let (mut dst, src) = merge_fixture();
    merge_with_options(
        &mut dst,
        &src,
        &MergeOptions {
            replace_repeated: true,
            ..Default::default()
        },
    );
    assert_eq!(list_strings(dst.get("list").unwrap()), ["d", "e"]);
}

#[test]
fn list_size_limit_keeps_the_tail() {
    let (mut dst, src) = merge_fixture();
    merge_with_options(
        &mut dst,
        &src,
        &MergeOptions {
            list_size_limit: 4,
            ..Default::default()
        },
    );
    assert_eq!(list_strings(dst.get("list").unwrap()), ["b", "c", "d", "e"]);
}

#[test]
fn list_limit_composes_with_replace() {
    // replace then limit: min(N, |src|); append then limit: min(N, |dst|+|src|).
    let (mut dst, src) = merge_fixture();
    merge_with_options(
        &mut dst,
        &src,
        &MergeOptions {
            replace_repeated: true,
            list_size_limit: 4,
            ..Default::default()
        },
    );
    assert_eq!(list_strings(dst.get("list").unwrap()).len(), 2);

    let (mut dst, src) = merge_fixture();
    merge_with_options(
        &mut dst,
        &src,
        &MergeOptions {
            list_size_limit: 3,
            ..Default::default()
        },
    );
    assert_eq!(list_strings(dst.get("list").unwrap()), ["c", "d", "e"]);
}

#[test]
fn zero_list_limit_is_unbounded() {
    let (mut dst, src) = merge_fixture();
    merge_with_options(&mut dst, &src, &MergeOptions::default());
    assert_eq!(
        list_strings(dst.get("list").unwrap()),
        ["a", "b", "c", "d", "e"]
    );
}

#[test]
fn nil_map_value_deletes_when_enabled() {
    let (mut dst, src) = merge_fixture();
    merge_with_options(
        &mut dst,
        &src,
        &MergeOptions {
            delete_nil_map_value: true,
            ..Default::default()
        },
    );
    let kv = dst.get("kv").unwrap().as_map().unwrap();
    assert_eq!(kv.len(), 1);
    assert!(!kv.contains_key(&MapKey::Int(1)));
    assert_eq!(kv.get(&MapKey::Int(2)).unwrap(), &wrapper("bbb"));
}

#[test]
fn nil_map_value_preserved_by_default() {
    let (mut dst, src) = merge_fixture();
    merge_with_options(&mut dst, &src, &MergeOptions::default());
    let kv = dst.get("kv").unwrap().as_map().unwrap();
    assert_eq!(kv.len(), 2);
    // The nil-valued key keeps its previous value untouched.
    assert_eq!(kv.get(&MapKey::Int(1)).unwrap(), &wrapper("aa"));
    assert_eq!(kv.get(&MapKey::Int(2)).unwrap(), &wrapper("bbb"));
}

#[test]
fn map_record_values_merge_recursively() {
    let mut dst = Record::new().with(
        "kv",
        FieldValue::Map(BTreeMap::from([(
            MapKey::Str("player".into()),
            FieldValue::Msg(
                Record::new()
                    .with("hp", FieldValue::Int(100))
                    .with("pos", FieldValue::Int(3)),
            ),
        )])),
    );
    let src = Record::new().with(
        "kv",
        FieldValue::Map(BTreeMap::from([(
            MapKey::Str("player".into()),
            FieldValue::Msg(Record::new().with("pos", FieldValue::Int(4))),
        )])),
    );
    merge_with_options(&mut dst, &src, &MergeOptions::default());
    let kv = dst.get("kv").unwrap().as_map().unwrap();
    let FieldValue::Msg(player) = kv.get(&MapKey::Str("player".into())).unwrap() else {
        panic!("player entry must stay a record");
    };
    assert_eq!(player.get("hp"), Some(&FieldValue::Int(100)));
    assert_eq!(player.get("pos"), Some(&FieldValue::Int(4)));
}

#[test]
fn absent_and_null_fields_leave_dst_untouched() {
    let mut dst = Record::new()
        .with("text", FieldValue::str("keep"))
        .with("num", FieldValue::Int(1));
    let src = Record::new()
        .with("num", FieldValue::Int(2))
        .with("text", FieldValue::Null);
    merge_with_options(&mut dst, &src, &MergeOptions::default());
    assert_eq!(dst.get("text").unwrap().as_str(), Some("keep"));
    assert_eq!(dst.get("num"), Some(&FieldValue::Int(2)));
}

#[test]
fn scalars_overwrite_and_records_recurse() {
    let mut dst = Record::new()
        .with("num", FieldValue::Int(1))
        .with(
            "nested",
            FieldValue::Msg(
                Record::new()
                    .with("p1", FieldValue::Int(1))
                    .with("p2", FieldValue::Int(2)),
            ),
        );
    let src = Record::new()
        .with("num", FieldValue::Int(9))
        .with(
            "nested",
            FieldValue::Msg(Record::new().with("p2", FieldValue::Int(20))),
        );
    merge_with_options(&mut dst, &src, &MergeOptions::default());
    assert_eq!(dst.get("num"), Some(&FieldValue::Int(9)));
    let FieldValue::Msg(nested) = dst.get("nested").unwrap() else {
        panic!("nested field must stay a record");
    };
    assert_eq!(nested.get("p1"), Some(&FieldValue::Int(1)));
    assert_eq!(nested.get("p2"), Some(&FieldValue::Int(20)));
}
