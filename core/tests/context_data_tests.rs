// tests/context_data_tests.rs
use souk_flow::ContextData;

#[derive(Clone, Debug, Default, PartialEq)]
struct Basket {
  items: Vec<&'static str>,
}

#[test]
fn test_clones_share_the_same_data() {
  let ctx = ContextData::new(Basket::default());
  let other = ctx.clone();
  other.update(|b| b.items.push("apple"));
  assert_eq!(ctx.inspect(|b| b.items.len()), 1);
}

#[test]
fn test_snapshot_is_detached() {
  let ctx = ContextData::new(Basket { items: vec!["pear"] });
  let snap = ctx.snapshot();
  ctx.write().items.clear();
  assert_eq!(snap.items, vec!["pear"]);
  assert!(ctx.read().items.is_empty());
}
