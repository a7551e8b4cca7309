use tracing::trace;

use crate::deps::{Cond, Deps, NodeSet};
#[cfg(test)]
use crate::deps::UseNode;
#[cfg(test)]
use crate::name::Name;

/// Forward chaining over the conditional edge map.
///
/// Repeatedly discharges the unconditional entry: its nodes are known used,
/// so they are removed from every remaining condition, which may in turn
/// produce a new unconditional entry. Terminates because each round either
/// shrinks some condition or empties the map of its `true` key; conditions
/// only ever shrink, so the result is the least fixed point.
///
/// Returns the residual edges (conditions that never fully discharged,
/// useful for debugging) and the minimal set of nodes implied by the empty
/// condition.
pub fn forward_chain(mut deps: Deps) -> (Deps, NodeSet) {
    let mut used = NodeSet::new();
    let empty = Cond::new();

    while let Some(trivial) = deps.remove(&empty) {
        trace!(target: "solve", "discharging {} unconditional nodes", trivial.len());
        let mut next = Deps::with_capacity(deps.len());
        for (cond, nodes) in deps {
            let stripped: Cond = cond.difference(&trivial).cloned().collect();
            next.entry(stripped).or_default().extend(nodes);
        }
        used.extend(trivial);
        deps = next;
    }

    (deps, used)
}

#[cfg(test)]
fn node(s: &str) -> UseNode {
    UseNode::result(Name::user(s))
}

#[cfg(test)]
fn set(names: &[&str]) -> NodeSet {
    names.iter().map(|s| node(s)).collect()
}

#[cfg(test)]
fn edge(deps: &mut Deps, cond: &[&str], nodes: &[&str]) {
    deps.entry(set(cond)).or_default().extend(set(nodes));
}

/// Every edge whose condition is satisfied must have fired.
#[cfg(test)]
fn assert_closed(input: &Deps, used: &NodeSet) {
    for (cond, nodes) in input {
        if cond.is_subset(used) {
            assert!(
                nodes.is_subset(used),
                "unsatisfied closure: {cond:?} => {nodes:?}"
            );
        }
    }
}

#[test]
fn chains_through_conjunctive_conditions() {
    let mut deps = Deps::new();
    edge(&mut deps, &[], &["a"]);
    edge(&mut deps, &["a"], &["b"]);
    edge(&mut deps, &["a", "b"], &["c"]);
    edge(&mut deps, &["d"], &["e"]);
    let input = deps.clone();

    let (residual, used) = forward_chain(deps);
    assert_eq!(used, set(&["a", "b", "c"]));
    assert_closed(&input, &used);
    // the d-edge survives with its condition intact
    assert_eq!(residual.len(), 1);
    assert!(residual.contains_key(&set(&["d"])));
}

#[test]
fn empty_input_solves_to_nothing() {
    let (residual, used) = forward_chain(Deps::new());
    assert!(residual.is_empty());
    assert!(used.is_empty());
}

#[test]
fn cycles_converge() {
    let mut deps = Deps::new();
    edge(&mut deps, &[], &["a"]);
    edge(&mut deps, &["a"], &["b"]);
    edge(&mut deps, &["b"], &["a"]);
    let (residual, used) = forward_chain(deps);
    assert_eq!(used, set(&["a", "b"]));
    assert!(residual.is_empty());
}

#[test]
fn partially_satisfied_conditions_do_not_fire() {
    let mut deps = Deps::new();
    edge(&mut deps, &[], &["a"]);
    edge(&mut deps, &["a", "x"], &["y"]);
    let (residual, used) = forward_chain(deps);
    assert_eq!(used, set(&["a"]));
    // the residual condition has been stripped down to the missing part
    assert!(residual.contains_key(&set(&["x"])));
}

#[test]
fn solution_is_minimal() {
    let mut deps = Deps::new();
    edge(&mut deps, &[], &["a"]);
    edge(&mut deps, &["a"], &["b"]);
    edge(&mut deps, &["q"], &["r"]);
    let input = deps.clone();
    let (_, used) = forward_chain(deps);

    // removing any single node from the solution breaks closure
    for gone in &used {
        let smaller: NodeSet = used.iter().filter(|m| *m != gone).cloned().collect();
        let broken = input.iter().any(|(cond, nodes)| {
            cond.is_subset(&smaller) && !nodes.is_subset(&smaller)
        }) || !input
            .get(&Cond::new())
            .is_none_or(|nodes| nodes.is_subset(&smaller));
        assert!(broken, "{gone} is not needed for closure");
    }
}

#[test]
fn adding_unconditional_edges_is_monotone() {
    let mut deps = Deps::new();
    edge(&mut deps, &[], &["a"]);
    edge(&mut deps, &["a"], &["b"]);
    let (_, base) = forward_chain(deps.clone());

    edge(&mut deps, &[], &["x"]);
    edge(&mut deps, &["x"], &["y"]);
    let (_, grown) = forward_chain(deps);

    assert!(base.is_subset(&grown));
    assert!(grown.contains(&node("x")) && grown.contains(&node("y")));
}
