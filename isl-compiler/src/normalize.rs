//! IR normalization
//!
//! Rewrites compiled IR into a canonical shape without changing what it
//! evaluates to. Rules are applied bottom-up in a single pass; because every
//! rule produces output that is already canonical, `normalize` is idempotent.
//! Node ids are renumbered pre-order from 1 at the end.

use crate::render::render;
use isl_core::ir::{ComparisonOp, IdGenerator, IrBuilder, IrKind, IrLiteral, IrNode};
use tracing::trace;

pub fn normalize(node: IrNode) -> IrNode {
    let before = node.size();
    let mut ids = IdGenerator::new();
    let mut out = Normalizer {
        b: IrBuilder::new(&mut ids),
    }
    .canon(node);
    out.renumber();
    trace!(before, after = out.size(), "normalized expression");
    out
}

struct Normalizer<'a> {
    b: IrBuilder<'a>,
}

#[derive(Clone, Copy, PartialEq, Eq)]
enum Junction {
    And,
    Or,
}

impl<'a> Normalizer<'a> {
    fn canon(&mut self, node: IrNode) -> IrNode {
        let IrNode { id, kind, location } = node;
        let rebuilt = |kind: IrKind| IrNode {
            id,
            kind,
            location: location.clone(),
        };

        match kind {
            IrKind::LogicalAnd { operands } => {
                let node = self.junction(Junction::And, operands);
                node.with_location(location.clone())
            }
            IrKind::LogicalOr { operands } => {
                let node = self.junction(Junction::Or, operands);
                node.with_location(location.clone())
            }
            IrKind::Not { operand } => {
                let operand = self.canon(*operand);
                self.fold_not(operand, rebuilt)
            }
            IrKind::Equality {
                left,
                right,
                negated,
            } => {
                let left = self.canon(*left);
                let right = self.canon(*right);
                if right.is_null_literal() {
                    return self.b.exists(left, negated).with_location(location.clone());
                }
                if left.is_null_literal() {
                    return self.b.exists(right, negated).with_location(location.clone());
                }
                let (left, right) = if render(&left) <= render(&right) {
                    (left, right)
                } else {
                    (right, left)
                };
                rebuilt(IrKind::Equality {
                    left: Box::new(left),
                    right: Box::new(right),
                    negated,
                })
            }
            IrKind::Comparison { op, left, right } => {
                let left = self.canon(*left);
                let right = self.canon(*right);
                let (op, left, right) = match op {
                    ComparisonOp::Gt | ComparisonOp::Ge => (op.mirrored(), right, left),
                    _ => (op, left, right),
                };
                rebuilt(IrKind::Comparison {
                    op,
                    left: Box::new(left),
                    right: Box::new(right),
                })
            }
            IrKind::InSet {
                value,
                set,
                negated,
            } => {
                let value = self.canon(*value);
                let set = self.canon_set(*set);
                rebuilt(IrKind::InSet {
                    value: Box::new(value),
                    set: Box::new(set),
                    negated,
                })
            }
            IrKind::Conditional {
                condition,
                then_branch,
                else_branch,
            } => {
                let condition = self.canon(*condition);
                match condition.as_bool_literal() {
                    Some(true) => self.canon(*then_branch),
                    Some(false) => self.canon(*else_branch),
                    None => rebuilt(IrKind::Conditional {
                        condition: Box::new(condition),
                        then_branch: Box::new(self.canon(*then_branch)),
                        else_branch: Box::new(self.canon(*else_branch)),
                    }),
                }
            }
            kind => {
                let mut node = rebuilt(kind);
                self.canon_children(&mut node);
                node
            }
        }
    }

    /// Canonicalize the children of a node whose own shape has no rule.
    fn canon_children(&mut self, node: &mut IrNode) {
        let mut slots: Vec<&mut IrNode> = Vec::new();
        collect_children(&mut node.kind, &mut slots);
        for slot in slots {
            let child = std::mem::replace(slot, placeholder());
            *slot = self.canon(child);
        }
    }

    fn junction(&mut self, junction: Junction, operands: Vec<IrNode>) -> IrNode {
        let (identity, absorbing) = match junction {
            Junction::And => (true, false),
            Junction::Or => (false, true),
        };

        let mut flat: Vec<(String, IrNode)> = Vec::new();
        let mut pending = operands;
        pending.reverse();
        while let Some(operand) = pending.pop() {
            let operand = self.canon(operand);
            match (junction, operand.kind) {
                (Junction::And, IrKind::LogicalAnd { operands })
                | (Junction::Or, IrKind::LogicalOr { operands }) => {
                    // Already canonical; splice without re-normalizing.
                    for nested in operands {
                        flat.push((render(&nested), nested));
                    }
                }
                (_, kind) => {
                    let operand = IrNode { kind, ..operand };
                    match operand.as_bool_literal() {
                        Some(b) if b == absorbing => return self.b.boolean(absorbing),
                        Some(b) if b == identity => {}
                        _ => flat.push((render(&operand), operand)),
                    }
                }
            }
        }

        flat.sort_by(|a, b| a.0.cmp(&b.0));
        flat.dedup_by(|a, b| a.0 == b.0);

        let mut operands: Vec<IrNode> = flat.into_iter().map(|(_, n)| n).collect();
        match operands.len() {
            0 => self.b.boolean(identity),
            1 => operands.remove(0),
            _ => match junction {
                Junction::And => self.b.and(operands),
                Junction::Or => self.b.or(operands),
            },
        }
    }

    fn fold_not<F>(&mut self, operand: IrNode, rebuilt: F) -> IrNode
    where
        F: FnOnce(IrKind) -> IrNode,
    {
        match operand.kind {
            IrKind::Not { operand: inner } => *inner,
            IrKind::Literal {
                value: IrLiteral::Boolean(b),
            } => IrNode {
                kind: IrKind::Literal {
                    value: IrLiteral::Boolean(!b),
                },
                ..operand
            },
            IrKind::InSet {
                value,
                set,
                negated,
            } => IrNode {
                kind: IrKind::InSet {
                    value,
                    set,
                    negated: !negated,
                },
                ..operand
            },
            IrKind::Exists { target, expected } => IrNode {
                kind: IrKind::Exists {
                    target,
                    expected: !expected,
                },
                ..operand
            },
            IrKind::Equality {
                left,
                right,
                negated,
            } => IrNode {
                kind: IrKind::Equality {
                    left,
                    right,
                    negated: !negated,
                },
                ..operand
            },
            kind => rebuilt(IrKind::Not {
                operand: Box::new(IrNode { kind, ..operand }),
            }),
        }
    }

    /// Literal sets are sorted and deduplicated; other sets are left as is.
    fn canon_set(&mut self, set: IrNode) -> IrNode {
        let set = self.canon(set);
        match set.kind {
            IrKind::List { elements } if elements.iter().all(IrNode::is_literal) => {
                let mut keyed: Vec<(String, IrNode)> =
                    elements.into_iter().map(|e| (render(&e), e)).collect();
                keyed.sort_by(|a, b| a.0.cmp(&b.0));
                keyed.dedup_by(|a, b| a.0 == b.0);
                IrNode {
                    kind: IrKind::List {
                        elements: keyed.into_iter().map(|(_, e)| e).collect(),
                    },
                    ..set
                }
            }
            kind => IrNode { kind, ..set },
        }
    }
}

fn placeholder() -> IrNode {
    let mut ids = IdGenerator::new();
    IrBuilder::new(&mut ids).literal(IrLiteral::Null)
}

fn collect_children<'n>(kind: &'n mut IrKind, out: &mut Vec<&'n mut IrNode>) {
    use IrKind::*;
    match kind {
        Literal { .. } | Variable { .. } | InputValue { .. } | ResultValue { .. } => {}
        PropertyAccess { object, .. } => out.push(object),
        Old { inner } => out.push(inner),
        LogicalAnd { operands } | LogicalOr { operands } => out.extend(operands.iter_mut()),
        Not { operand } | Negate { operand } => out.push(operand),
        Equality { left, right, .. }
        | Comparison { left, right, .. }
        | Arithmetic { left, right, .. } => {
            out.push(left);
            out.push(right);
        }
        Exists { target, .. } => out.push(target),
        InSet { value, set, .. } => {
            out.push(value);
            out.push(set);
        }
        StringIncludes { string, needle: other }
        | StringStartsWith { string, prefix: other }
        | StringEndsWith { string, suffix: other }
        | StringMatches { string, pattern: other } => {
            out.push(string);
            out.push(other);
        }
        StringLength { string } => out.push(string),
        ArrayIncludes { array, element } => {
            out.push(array);
            out.push(element);
        }
        ArrayEvery {
            array, predicate, ..
        }
        | ArraySome {
            array, predicate, ..
        }
        | ArrayFilter {
            array, predicate, ..
        }
        | ArrayMap {
            array,
            mapper: predicate,
            ..
        } => {
            out.push(array);
            out.push(predicate);
        }
        ArrayLength { array } => out.push(array),
        Quantifier {
            collection,
            predicate,
            ..
        } => {
            out.push(collection);
            out.push(predicate);
        }
        Conditional {
            condition,
            then_branch,
            else_branch,
        } => {
            out.push(condition);
            out.push(then_branch);
            out.push(else_branch);
        }
        Call { args, .. } => out.extend(args.iter_mut()),
        EntityExists { key, .. } | EntityLookup { key, .. } | EntityCount { key, .. } => {
            if let Some(key) = key {
                out.push(key);
            }
        }
        Index { object, index } => {
            out.push(object);
            out.push(index);
        }
        List { elements } => out.extend(elements.iter_mut()),
        Map { entries } => out.extend(entries.iter_mut().map(|(_, v)| v)),
    }
}

#[cfg(test)]
#[path = "normalize/normalize_tests.rs"]
mod tests;
