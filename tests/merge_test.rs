//! Merge policy: leaf overwrite, object recursion, array concatenation,
//! and child ordering.

use datatree::util::testing::init_test_setup;
use datatree::{DataTree, TreeError};

// ============================================================
// Object Merging
// ============================================================

#[test]
fn given_disjoint_keys_when_merging_then_destination_order_then_source_order() {
    init_test_setup();
    let dst = DataTree::new();
    dst.child("e").set("1").unwrap();

    let src = DataTree::new();
    src.child("b").set("2").unwrap();
    src.child("c").set("3").unwrap();

    dst.merge(&src).unwrap();

    assert_eq!(dst.as_data().get_keys().unwrap(), vec!["e", "b", "c"]);
    assert_eq!(dst.child("e").get::<i64>().unwrap(), 1);
    assert_eq!(dst.child("c").get::<i64>().unwrap(), 3);
}

#[test]
fn given_overlapping_leaf_when_merging_then_leaf_overwrites_and_siblings_survive() {
    let dst = DataTree::new();
    dst.from_json(r#"{"a": {"b": "2", "c": "3"}}"#).unwrap();

    let src = DataTree::new();
    src.from_json(r#"{"a": {"b": "1"}}"#).unwrap();

    dst.merge(&src).unwrap();

    assert_eq!(dst.child("a").child("b").get::<i64>().unwrap(), 1);
    assert_eq!(dst.child("a").child("c").get::<i64>().unwrap(), 3);
    assert_eq!(dst.child("a").get_keys().unwrap(), vec!["b", "c"]);
}

#[test]
fn given_nested_new_keys_when_merging_then_subtrees_accumulate() {
    let dst = DataTree::new();
    dst.from_json(r#"{"server": {"host": "a"}}"#).unwrap();

    let src = DataTree::new();
    src.from_json(r#"{"server": {"port": "81"}, "extra": "1"}"#).unwrap();

    dst.merge(&src).unwrap();

    assert_eq!(dst.child("server").get_keys().unwrap(), vec!["host", "port"]);
    assert_eq!(dst.child("server").child("host").get::<String>().unwrap(), "a");
    assert_eq!(dst.child("extra").get::<i64>().unwrap(), 1);
}

#[test]
fn given_scalar_source_child_when_merging_then_destination_subtree_is_replaced() {
    let dst = DataTree::new();
    dst.from_json(r#"{"cfg": {"deep": {"x": "1"}}}"#).unwrap();

    let src = DataTree::new();
    src.child("cfg").set("flat").unwrap();

    dst.merge(&src).unwrap();

    assert_eq!(dst.child("cfg").get::<String>().unwrap(), "flat");
    assert!(!dst.child("cfg").child("deep").exists());
}

#[test]
fn given_source_with_own_scalar_when_merging_then_destination_value_is_kept() {
    let dst = DataTree::new();
    dst.child("node").set("dst-value").unwrap();

    let src = DataTree::new();
    src.child("node").set("src-value").unwrap();

    dst.child("node").merge(&src.child("node")).unwrap();

    // only children travel; the node's own text stays
    assert_eq!(dst.child("node").get::<String>().unwrap(), "dst-value");
}

// ============================================================
// Array Merging
// ============================================================

#[test]
fn given_two_arrays_when_merging_then_elements_concatenate() {
    let dst = DataTree::new();
    dst.child("ary").from_vec(&[1, 2, 3]).unwrap();

    let src = DataTree::new();
    src.child("ary").from_vec(&[4, 5]).unwrap();

    dst.child("ary").merge(&src.child("ary")).unwrap();

    assert_eq!(dst.child("ary").to_vec::<i64>().unwrap(), vec![1, 2, 3, 4, 5]);
}

#[test]
fn given_array_source_when_merging_into_fresh_node_then_elements_copy_over() {
    let src = DataTree::new();
    src.child("list").push("x").unwrap();
    src.child("list").push("y").unwrap();

    let dst = DataTree::new();
    dst.child("list").merge(&src.child("list")).unwrap();

    assert_eq!(dst.child("list").to_vec::<String>().unwrap(), vec!["x", "y"]);
}

// ============================================================
// Destinations, Sources & Aliasing
// ============================================================

#[test]
fn given_absent_destination_when_merging_then_node_is_created() {
    let dst = DataTree::new();

    let src = DataTree::new();
    src.child("payload").child("x").set("1").unwrap();

    dst.child("slot").merge(&src.child("payload")).unwrap();

    assert!(dst.child("slot").exists());
    assert_eq!(dst.child("slot").child("x").get::<i64>().unwrap(), 1);
}

#[test]
fn given_absent_source_when_merging_then_path_not_found_and_no_writes() {
    let dst = DataTree::new();
    let src = DataTree::new();

    let err = dst.child("slot").merge(&src.child("missing")).unwrap_err();

    assert!(matches!(err, TreeError::PathNotFound(_)));
    assert!(!dst.child("slot").exists(), "a failed merge must not create the destination");
}

#[test]
fn given_same_tree_when_merging_sibling_subtrees_then_source_is_untouched() {
    let tree = DataTree::new();
    tree.from_json(r#"{"src": {"k": "v"}, "dst": {"old": "1"}}"#).unwrap();

    tree.child("dst").merge(&tree.child("src")).unwrap();

    assert_eq!(tree.child("dst").child("k").get::<String>().unwrap(), "v");
    assert_eq!(tree.child("dst").child("old").get::<i64>().unwrap(), 1);
    assert_eq!(tree.child("src").child("k").get::<String>().unwrap(), "v");
}

#[test]
fn given_tree_argument_when_merging_then_root_contents_land_at_view() {
    let dst = DataTree::new();

    let src = DataTree::new();
    src.child("x").set("1").unwrap();

    dst.child("slot").merge_tree(&src).unwrap();

    assert_eq!(dst.child("slot").child("x").get::<i64>().unwrap(), 1);
}

#[test]
fn given_repeated_merges_when_overriding_then_last_source_wins() {
    let base = DataTree::new();
    base.from_json(r#"{"env": {"level": "info", "color": "auto"}}"#).unwrap();

    let first = DataTree::new();
    first.from_json(r#"{"env": {"level": "debug"}}"#).unwrap();
    let second = DataTree::new();
    second.from_json(r#"{"env": {"level": "trace"}}"#).unwrap();

    base.merge(&first).unwrap();
    base.merge(&second).unwrap();

    assert_eq!(base.child("env").child("level").get::<String>().unwrap(), "trace");
    assert_eq!(base.child("env").child("color").get::<String>().unwrap(), "auto");
    assert_eq!(base.child("env").get_keys().unwrap(), vec!["level", "color"]);
}
