use super::*;

fn lit_int(ids: &mut IdGenerator, n: i64) -> IrNode {
    IrBuilder::new(ids).literal(IrLiteral::Integer(n))
}

#[test]
fn test_id_generator_restarts_after_reset() {
    let mut ids = IdGenerator::new();
    assert_eq!(ids.next_id().get(), 1);
    assert_eq!(ids.next_id().get(), 2);
    assert_eq!(ids.issued(), 2);
    ids.reset();
    assert_eq!(ids.next_id().get(), 1);
}

#[test]
fn test_equality_ignores_ids_and_locations() {
    let mut a_ids = IdGenerator::new();
    let a = lit_int(&mut a_ids, 7);

    let mut b_ids = IdGenerator::new();
    b_ids.next_id();
    b_ids.next_id();
    let b = lit_int(&mut b_ids, 7).with_location(Some(SourceLocation::new(3, 4)));

    assert_ne!(a.id, b.id);
    assert_eq!(a, b);
}

#[test]
fn test_renumber_is_preorder() {
    let mut ids = IdGenerator::new();
    let left = lit_int(&mut ids, 1);
    let right = lit_int(&mut ids, 2);
    let mut b = IrBuilder::new(&mut ids);
    let mut root = b.comparison(ComparisonOp::Lt, left, right);
    assert_eq!(root.id.get(), 3);

    root.renumber();
    let mut order = Vec::new();
    root.walk(&mut |n| order.push(n.id.get()));
    assert_eq!(order, vec![1, 2, 3]);
}

#[test]
fn test_references_result() {
    let mut ids = IdGenerator::new();
    let mut b = IrBuilder::new(&mut ids);
    let result = b.node(IrKind::ResultValue {
        property: Some("balance".into()),
    });
    let zero = b.literal(IrLiteral::Integer(0));
    let cmp = b.comparison(ComparisonOp::Ge, result, zero);
    assert!(cmp.references_result());
    assert_eq!(cmp.size(), 3);

    let input = b.node(IrKind::InputValue {
        property: "amount".into(),
    });
    assert!(!input.references_result());
}

#[test]
fn test_comparison_mirroring() {
    assert_eq!(ComparisonOp::Gt.mirrored(), ComparisonOp::Lt);
    assert_eq!(ComparisonOp::Le.mirrored(), ComparisonOp::Ge);
}

#[test]
fn test_serializes_with_node_tag() {
    let mut ids = IdGenerator::new();
    let node = IrBuilder::new(&mut ids).variable("x");
    let json = serde_json::to_value(&node).unwrap();
    assert_eq!(json["kind"]["node"], "variable");
    assert_eq!(json["kind"]["name"], "x");
}
