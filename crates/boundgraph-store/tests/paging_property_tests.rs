use boundgraph_exec::{Direction, GraphBackend};
use boundgraph_store::MemoryGraph;
use proptest::prelude::*;

const MAX_ENTITIES: usize = 30;
const MAX_EDGES: usize = 60;

fn build(entity_count: usize, edges: &[(usize, usize)]) -> MemoryGraph {
    let mut g = MemoryGraph::new();
    for i in 0..entity_count {
        g.add_entity(&format!("n{i}"), "Node", Vec::<(&str, &str)>::new())
            .unwrap();
    }
    for (src, dst) in edges {
        g.add_relation(&format!("n{src}"), "r", &format!("n{dst}"))
            .unwrap();
    }
    g
}

fn case_strategy() -> impl Strategy<Value = (usize, Vec<(usize, usize)>)> {
    (1usize..=MAX_ENTITIES).prop_flat_map(|n| {
        (
            Just(n),
            prop::collection::vec((0usize..n, 0usize..n), 0..=MAX_EDGES),
        )
    })
}

proptest! {
    #[test]
    fn scan_pages_concatenate_to_full_scan((n, edges) in case_strategy(), page in 1usize..7) {
        let g = build(n, &edges);
        let full = g.scan_type("Node", None, usize::MAX, None).unwrap();
        prop_assert_eq!(full.next_cursor.clone(), None);

        let mut paged = Vec::new();
        let mut cursor: Option<String> = None;
        loop {
            let p = g.scan_type("Node", None, page, cursor.as_deref()).unwrap();
            prop_assert!(p.entity_ids.len() <= page);
            paged.extend(p.entity_ids);
            match p.next_cursor {
                Some(next) => cursor = Some(next),
                None => break,
            }
        }
        prop_assert_eq!(paged, full.entity_ids);
    }

    #[test]
    fn neighbor_pages_concatenate_to_full_adjacency(
        (n, edges) in case_strategy(),
        page in 1usize..5,
        source in 0usize..MAX_ENTITIES,
    ) {
        let g = build(n, &edges);
        let source = format!("n{}", source % n);
        let full = g.neighbors(&source, None, Direction::Both, usize::MAX, None).unwrap();

        let mut paged = Vec::new();
        let mut cursor: Option<String> = None;
        loop {
            let p = g.neighbors(&source, None, Direction::Both, page, cursor.as_deref()).unwrap();
            prop_assert!(p.edges.len() <= page);
            paged.extend(p.edges);
            match p.next_cursor {
                Some(next) => cursor = Some(next),
                None => break,
            }
        }
        prop_assert_eq!(paged, full.edges);
    }
}
