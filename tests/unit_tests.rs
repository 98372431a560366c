//! Unit tests for container identity

use ldict::hosh::{Etype, Hosh};
use ldict::identity::field_hosh;
use ldict::{ldict, Ldict, LdictError};
use serde_json::json;

#[test]
fn test_insert_order_independence() {
    let a = Ldict::new()
        .insert("x", json!(5))
        .unwrap()
        .insert("y", json!(3))
        .unwrap();
    let b = Ldict::new()
        .insert("y", json!(3))
        .unwrap()
        .insert("x", json!(5))
        .unwrap();

    let expected = Hosh::identity() * field_hosh("x", &json!(5)).unwrap() * field_hosh("y", &json!(3)).unwrap();
    assert_eq!(a.hosh(), expected);
    assert_eq!(b.hosh(), expected);
    assert_eq!(a, b);

    let mut keys: Vec<_> = a.keys().collect();
    keys.sort();
    assert_eq!(keys, vec!["x", "y"]);
}

#[test]
fn test_empty_container_has_identity() {
    let d = Ldict::new();
    assert!(d.hosh().is_identity());
    assert!(d.is_empty());
    assert_eq!(d.id(), "0".repeat(64));
}

#[test]
fn test_field_ids_are_hybrid() {
    let d = ldict! {x: 1, name: "text"}.unwrap();
    for (name, hosh) in d.ids() {
        assert_eq!(hosh.etype(), Etype::Hybrid, "field {name}");
    }
}

#[test]
fn test_reinsert_same_value_is_noop() {
    let d = ldict! {x: 5}.unwrap();
    let e = d.insert("x", json!(5)).unwrap();
    assert_eq!(d.id(), e.id());
    assert_eq!(e.len(), 1);
}

#[test]
fn test_reinsert_different_value_is_overwrite() {
    let d = ldict! {x: 5}.unwrap();
    let err = d.insert("x", json!(6)).unwrap_err();
    assert!(matches!(err, LdictError::Overwrite(ref f) if f == "x"));
}

#[test]
fn test_delete_inverts_insert() {
    let d = ldict! {x: 5, y: 3}.unwrap();
    let e = d.insert("z", json!([1, 2])).unwrap();
    let back = e.delete("z").unwrap();
    assert_eq!(back.hosh(), d.hosh());
    assert_eq!(back.keys().collect::<Vec<_>>(), vec!["x", "y"]);
}

#[test]
fn test_delete_missing_key() {
    let d = ldict! {x: 5}.unwrap();
    assert!(matches!(d.delete("nope"), Err(LdictError::KeyNotFound(_))));
}

#[test]
fn test_delete_everything_returns_identity() {
    let d = ldict! {x: 5, y: 3}.unwrap();
    let e = d.delete("x").unwrap().delete("y").unwrap();
    assert!(e.hosh().is_identity());
}

#[test]
fn test_value_changes_identity() {
    let a = ldict! {x: 5}.unwrap();
    let b = ldict! {x: 6}.unwrap();
    let c = ldict! {y: 5}.unwrap();
    assert_ne!(a, b);
    assert_ne!(a, c);
}

#[test]
fn test_nested_values_ignore_key_order() {
    let a = Ldict::new().insert("m", json!({"a": 1, "b": [1, 2]})).unwrap();
    let b = Ldict::new().insert("m", json!({"b": [1, 2], "a": 1})).unwrap();
    assert_eq!(a, b);
}

#[test]
fn test_roundtrip_through_serialized_form() {
    let d = ldict! {x: 5, y: "text", z: [1, 2, 3]}.unwrap();
    let value = d.to_value().unwrap();
    let text = serde_json::to_string(&value).unwrap();
    assert!(text.starts_with("{\"id\":"));

    let back = Ldict::from_value(&value).unwrap();
    assert_eq!(back.id(), d.id());
    assert_eq!(serde_json::to_string(&back.to_value().unwrap()).unwrap(), text);
}

#[test]
fn test_serde_roundtrip() {
    let d = ldict! {a: 1, b: 2}.unwrap();
    let text = serde_json::to_string(&d).unwrap();
    let back: Ldict = serde_json::from_str(&text).unwrap();
    assert_eq!(back, d);
}

#[test]
fn test_from_value_validation() {
    let d = ldict! {x: 5, y: 3}.unwrap();
    let good = d.to_value().unwrap();

    let mut missing_ids = good.clone();
    missing_ids.as_object_mut().unwrap().remove("ids");
    assert!(matches!(Ldict::from_value(&missing_ids), Err(LdictError::MissingIds)));

    let mut numeric_id = good.clone();
    numeric_id["id"] = json!(42);
    assert!(matches!(Ldict::from_value(&numeric_id), Err(LdictError::WrongId(_))));

    let mut wrong_value = good.clone();
    wrong_value["id"] = json!(ldict! {x: 1}.unwrap().id());
    assert!(matches!(Ldict::from_value(&wrong_value), Err(LdictError::InconsistentIds(_))));

    let reordered = json!({
        "id": good["id"],
        "ids": {"y": good["ids"]["y"], "x": good["ids"]["x"]},
        "x": 5,
        "y": 3,
    });
    assert!(matches!(Ldict::from_value(&reordered), Err(LdictError::InconsistentIds(_))));
}

#[test]
fn test_plain_object_construction() {
    let d = Ldict::from_value(&json!({"y": 3, "x": 5})).unwrap();
    assert_eq!(d, ldict! {x: 5, y: 3}.unwrap());
}

#[test]
fn test_equality_is_identity_based() {
    use std::collections::HashSet;
    let mut set = HashSet::new();
    set.insert(ldict! {x: 1, y: 2}.unwrap());
    set.insert(ldict! {y: 2, x: 1}.unwrap());
    assert_eq!(set.len(), 1);
}

#[test]
fn test_in_place_set_replaces() {
    let mut d = ldict! {x: 1}.unwrap();
    d.set("x", 2).unwrap();
    assert_eq!(d, ldict! {x: 2}.unwrap());
    d.set("y", "b").unwrap();
    d.remove("x").unwrap();
    assert_eq!(d, ldict! {y: "b"}.unwrap());
}

#[test]
fn test_history_records_steps() {
    let d = Ldict::with_config(ldict::Config::default().with_history(true))
        .insert("x", json!(1))
        .unwrap()
        .insert("y", json!(2))
        .unwrap();
    let history = d.history().expect("history enabled");
    assert_eq!(history.len(), 1);
    assert_eq!(history.product(), d.hosh());

    let e = d.delete("x").unwrap();
    assert_eq!(e.history().unwrap().product(), e.hosh());
}
