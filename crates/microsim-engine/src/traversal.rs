use crate::resolve::resolve;
use crate::route::RouteNode;
use crate::topology::ServiceTopology;
use rand::Rng;

/// Source of the per-child draws used for branch selection.
pub trait BranchSelector: Send + Sync {
    /// Uniform integer in `[0, 100)`.
    fn draw(&self) -> u8;
}

#[derive(Clone, Copy, Debug, Default)]
pub struct RandomSelector;

impl BranchSelector for RandomSelector {
    fn draw(&self) -> u8 {
        rand::thread_rng().gen_range(0..100)
    }
}

/// A child edge survives when the draw falls under the parent's probability,
/// so 100 keeps every child and 0 keeps none.
pub fn retains(probability: u8, draw: u8) -> bool {
    draw < probability
}

pub fn prepare(tree: &RouteNode, topology: &ServiceTopology) -> RouteNode {
    prepare_with(tree, topology, &RandomSelector)
}

/// Builds this round's plan: resolves designations and prunes children,
/// depth-first and pre-order. The declared tree is left untouched.
pub fn prepare_with(
    tree: &RouteNode,
    topology: &ServiceTopology,
    selector: &dyn BranchSelector,
) -> RouteNode {
    let designation = resolve(&tree.designation, topology);
    let routes = tree
        .routes
        .iter()
        .filter(|_| retains(tree.probability, selector.draw()))
        .map(|child| prepare_with(child, topology, selector))
        .collect();

    RouteNode {
        designation,
        faults: tree.faults.clone(),
        probability: tree.probability,
        routes,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::VecDeque;
    use std::sync::Mutex;

    struct ScriptedSelector {
        draws: Mutex<VecDeque<u8>>,
    }

    impl ScriptedSelector {
        fn new(draws: &[u8]) -> Self {
            Self {
                draws: Mutex::new(draws.iter().copied().collect()),
            }
        }
    }

    impl BranchSelector for ScriptedSelector {
        fn draw(&self) -> u8 {
            self.draws
                .lock()
                .expect("selector mutex poisoned")
                .pop_front()
                .expect("test script ran out of draws")
        }
    }

    fn topology() -> ServiceTopology {
        ServiceTopology::new("cafebabe")
            .with_service("a", "http://a/")
            .with_service("b", "http://b/")
            .with_service("c", "http://c/")
    }

    fn wide_tree(probability: u8) -> RouteNode {
        RouteNode::new("a")
            .with_probability(probability)
            .with_child(
                RouteNode::new("b")
                    .with_probability(probability)
                    .with_child(RouteNode::new("c")),
            )
            .with_child(RouteNode::new("c"))
            .with_child(RouteNode::new("http://literal/"))
    }

    #[test]
    fn prepare_probability_100_everywhere_expected_shape_preserved() {
        let tree = wide_tree(100);
        for _ in 0..50 {
            let prepared = prepare(&tree, &topology());
            assert_eq!(prepared.node_count(), tree.node_count());
            assert_eq!(prepared.depth(), tree.depth());
        }
    }

    #[test]
    fn prepare_probability_0_expected_no_children() {
        let tree = wide_tree(0);
        for _ in 0..50 {
            let prepared = prepare(&tree, &topology());
            assert!(prepared.routes.is_empty());
        }
    }

    #[test]
    fn prepare_expected_designations_resolved_and_source_untouched() {
        let tree = wide_tree(100);
        let before = tree.clone();

        let prepared = prepare(&tree, &topology());

        assert_eq!(tree, before);
        assert_eq!(prepared.designation, "http://a/");
        assert_eq!(prepared.routes[0].designation, "http://b/");
        assert_eq!(prepared.routes[0].routes[0].designation, "http://c/");
        assert_eq!(prepared.routes[2].designation, "http://literal/");
    }

    #[test]
    fn prepare_scripted_draws_expected_parent_probability_controls_children() {
        // root has probability 50: draws 10 keep, 50 drop, 49 keep.
        // b (kept) has probability 50 and one child: draw 99 drops it.
        let tree = wide_tree(50);
        let selector = ScriptedSelector::new(&[10, 99, 50, 49]);

        let prepared = prepare_with(&tree, &topology(), &selector);

        let kept: Vec<&str> = prepared
            .routes
            .iter()
            .map(|route| route.designation.as_str())
            .collect();
        assert_eq!(kept, vec!["http://b/", "http://literal/"]);
        assert!(prepared.routes[0].routes.is_empty());
    }

    #[test]
    fn retains_probability_above_100_expected_always_kept() {
        assert!((0..100).all(|draw| retains(200, draw)));
        assert!((0..100).all(|draw| !retains(0, draw)));
    }
}
