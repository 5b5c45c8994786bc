//! Weighted graph over planar-graph vertices, used for street and canal
//! pathfinding.
//!
//! Built once from a patch subset: every interior half-edge that carries no
//! crossing-type tag contributes a link between its endpoints weighted by its
//! length. A cost policy can additionally admit tagged edges at a premium,
//! which is how a canal course is allowed to cross finished streets. Vertices
//! and segments can then be excluded to keep new paths off walls, reserved
//! gate vertices, and previously routed courses. The owner rebuilds the graph
//! whenever the underlying cell set or its edge tags change.

use std::cmp::Ordering;
use std::collections::{BinaryHeap, HashMap};

use crate::geom::Point;
use crate::planar::{EdgeKind, FaceId, HalfEdgeId, PlanarGraph, VertexId};

#[derive(Clone, Debug)]
pub struct Topology {
    nodes: Vec<VertexId>,
    points: Vec<Point>,
    index: HashMap<VertexId, usize>,
    links: Vec<Vec<(usize, f64)>>,
    blocked: Vec<bool>,
}

impl Topology {
    /// Build from the usable interior edges of the given faces. An edge is
    /// usable when it carries no kind tag; tagged edges (walls, coasts,
    /// canals, finished roads) are not walkable.
    pub fn build(graph: &PlanarGraph, faces: &[FaceId]) -> Self {
        Self::build_with(graph, faces, |_| None)
    }

    /// Like [`Topology::build`], but the cost policy may also admit tagged
    /// edges: it maps an edge kind to a length multiplier, or `None` to keep
    /// that kind out of the graph. Untagged edges always cost their plain
    /// length.
    pub fn build_with(
        graph: &PlanarGraph,
        faces: &[FaceId],
        cost: impl Fn(EdgeKind) -> Option<f64>,
    ) -> Self {
        let mut topo = Topology {
            nodes: Vec::new(),
            points: Vec::new(),
            index: HashMap::new(),
            links: Vec::new(),
            blocked: Vec::new(),
        };
        let mut seen: HashMap<(usize, usize), ()> = HashMap::new();
        for &f in faces {
            for e in graph.face_edges(f) {
                let factor = match graph.kind(e) {
                    None => 1.0,
                    Some(kind) => match cost(kind) {
                        Some(c) => c,
                        None => continue,
                    },
                };
                let a = graph.origin(e);
                let b = graph.dest(e);
                let ia = topo.intern(graph, a);
                let ib = topo.intern(graph, b);
                let key = (ia.min(ib), ia.max(ib));
                if seen.insert(key, ()).is_none() {
                    let w = graph.point(a).distance(graph.point(b)) * factor;
                    topo.links[ia].push((ib, w));
                    topo.links[ib].push((ia, w));
                }
            }
        }
        topo
    }

    fn intern(&mut self, graph: &PlanarGraph, v: VertexId) -> usize {
        if let Some(&i) = self.index.get(&v) {
            return i;
        }
        let i = self.nodes.len();
        self.nodes.push(v);
        self.points.push(graph.point(v));
        self.links.push(Vec::new());
        self.blocked.push(false);
        self.index.insert(v, i);
        i
    }

    pub fn contains(&self, v: VertexId) -> bool {
        self.index.contains_key(&v)
    }

    pub fn num_nodes(&self) -> usize {
        self.nodes.len()
    }

    /// Make the given vertices unusable for future path queries.
    pub fn exclude_points(&mut self, verts: &[VertexId]) {
        for v in verts {
            if let Some(&i) = self.index.get(v) {
                self.blocked[i] = true;
            }
        }
    }

    /// Remove the links along a vertex chain without blocking the vertices
    /// themselves; paths may still touch the chain, just not run along it.
    pub fn exclude_segments(&mut self, chain: &[VertexId]) {
        for pair in chain.windows(2) {
            let (Some(&a), Some(&b)) = (self.index.get(&pair[0]), self.index.get(&pair[1]))
            else {
                continue;
            };
            self.links[a].retain(|&(n, _)| n != b);
            self.links[b].retain(|&(n, _)| n != a);
        }
    }

    /// A* shortest path. Returns the vertex list from `from` to `to`, or
    /// `None` when the two are not connected through usable links.
    pub fn build_path(&self, from: VertexId, to: VertexId) -> Option<Vec<VertexId>> {
        let (&start, &goal) = (self.index.get(&from)?, self.index.get(&to)?);
        if self.blocked[start] || self.blocked[goal] {
            return None;
        }
        let path = astar(
            start,
            goal,
            |n| {
                self.links[n]
                    .iter()
                    .filter(|&&(m, _)| !self.blocked[m])
                    .copied()
                    .collect::<Vec<_>>()
            },
            |n| self.points[n].distance(self.points[goal]),
        )?;
        Some(path.into_iter().map(|i| self.nodes[i]).collect())
    }

    /// Nearest usable node to an arbitrary point.
    pub fn nearest_node(&self, p: Point) -> Option<VertexId> {
        let mut best = None;
        let mut best_d = f64::INFINITY;
        for (i, &pt) in self.points.iter().enumerate() {
            if self.blocked[i] {
                continue;
            }
            let d = pt.distance(p);
            if d < best_d {
                best_d = d;
                best = Some(self.nodes[i]);
            }
        }
        best
    }
}

// ── Generic A\* ───────────────────────────────────────────────────────────────

#[derive(Debug)]
struct OpenEntry {
    f: f64,
    node: usize,
}

impl PartialEq for OpenEntry {
    fn eq(&self, other: &Self) -> bool {
        self.f == other.f && self.node == other.node
    }
}
impl Eq for OpenEntry {}

impl Ord for OpenEntry {
    fn cmp(&self, other: &Self) -> Ordering {
        // Min-heap on f, with node index as a deterministic tie-breaker.
        other
            .f
            .total_cmp(&self.f)
            .then_with(|| other.node.cmp(&self.node))
    }
}
impl PartialOrd for OpenEntry {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

/// Textbook A* over usize node ids.
pub fn astar(
    start: usize,
    goal: usize,
    mut neighbours: impl FnMut(usize) -> Vec<(usize, f64)>,
    mut heuristic: impl FnMut(usize) -> f64,
) -> Option<Vec<usize>> {
    let mut open = BinaryHeap::new();
    let mut came: HashMap<usize, usize> = HashMap::new();
    let mut g_score: HashMap<usize, f64> = HashMap::new();

    g_score.insert(start, 0.0);
    open.push(OpenEntry { f: heuristic(start), node: start });

    while let Some(OpenEntry { node, .. }) = open.pop() {
        if node == goal {
            let mut path = vec![node];
            let mut cur = node;
            while let Some(&p) = came.get(&cur) {
                path.push(p);
                cur = p;
            }
            path.reverse();
            return Some(path);
        }
        let g_here = g_score[&node];
        for (next, w) in neighbours(node) {
            let tentative = g_here + w;
            if tentative < *g_score.get(&next).unwrap_or(&f64::INFINITY) {
                came.insert(next, node);
                g_score.insert(next, tentative);
                open.push(OpenEntry { f: tentative + heuristic(next), node: next });
            }
        }
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::geom::Polygon;

    /// 3×1 strip of unit squares.
    fn strip() -> (PlanarGraph, Vec<FaceId>) {
        let cells: Vec<Polygon> = (0..3)
            .map(|i| {
                let x = i as f64;
                Polygon::new(vec![
                    Point::new(x, 0.0),
                    Point::new(x + 1.0, 0.0),
                    Point::new(x + 1.0, 1.0),
                    Point::new(x, 1.0),
                ])
            })
            .collect();
        PlanarGraph::from_cells(&cells)
    }

    #[test]
    fn path_follows_the_strip() {
        let (g, faces) = strip();
        let topo = Topology::build(&g, &faces);
        let a = g.live_vertices().find(|&v| g.point(v) == Point::new(0.0, 0.0)).unwrap();
        let b = g.live_vertices().find(|&v| g.point(v) == Point::new(3.0, 0.0)).unwrap();
        let path = topo.build_path(a, b).unwrap();
        assert_eq!(path.first(), Some(&a));
        assert_eq!(path.last(), Some(&b));
        // Straight along the bottom: 4 vertices, length 3.
        assert_eq!(path.len(), 4);
    }

    #[test]
    fn excluded_point_forces_detour() {
        let (g, faces) = strip();
        let mut topo = Topology::build(&g, &faces);
        let a = g.live_vertices().find(|&v| g.point(v) == Point::new(0.0, 0.0)).unwrap();
        let b = g.live_vertices().find(|&v| g.point(v) == Point::new(3.0, 0.0)).unwrap();
        let mid = g.live_vertices().find(|&v| g.point(v) == Point::new(1.0, 0.0)).unwrap();
        topo.exclude_points(&[mid]);
        let path = topo.build_path(a, b).unwrap();
        assert!(!path.contains(&mid));
        assert!(path.len() > 4);
    }

    #[test]
    fn excluded_segment_keeps_vertices_usable() {
        let (g, faces) = strip();
        let mut topo = Topology::build(&g, &faces);
        let a = g.live_vertices().find(|&v| g.point(v) == Point::new(0.0, 0.0)).unwrap();
        let b = g.live_vertices().find(|&v| g.point(v) == Point::new(3.0, 0.0)).unwrap();
        let m1 = g.live_vertices().find(|&v| g.point(v) == Point::new(1.0, 0.0)).unwrap();
        let m2 = g.live_vertices().find(|&v| g.point(v) == Point::new(2.0, 0.0)).unwrap();
        topo.exclude_segments(&[m1, m2]);
        let path = topo.build_path(a, b).unwrap();
        // The bottom-middle link is gone but its endpoints may still appear.
        let along = path.windows(2).any(|w| {
            (w[0] == m1 && w[1] == m2) || (w[0] == m2 && w[1] == m1)
        });
        assert!(!along);
    }

    #[test]
    fn unreachable_returns_none() {
        let (g, faces) = strip();
        let topo = Topology::build(&g, &faces[..1]);
        let a = g.live_vertices().find(|&v| g.point(v) == Point::new(0.0, 0.0)).unwrap();
        let far = g.live_vertices().find(|&v| g.point(v) == Point::new(3.0, 0.0)).unwrap();
        assert!(topo.build_path(a, far).is_none());
    }

    #[test]
    fn tagged_edges_are_not_walkable() {
        let (mut g, faces) = strip();
        use crate::planar::EdgeKind;
        // Tag every edge of the middle cell as wall: the middle square
        // contributes no links at all.
        for e in g.face_edges(faces[1]) {
            g.set_kind(e, Some(EdgeKind::Wall));
        }
        let topo = Topology::build(&g, &faces);
        let a = g.live_vertices().find(|&v| g.point(v) == Point::new(0.0, 0.0)).unwrap();
        let b = g.live_vertices().find(|&v| g.point(v) == Point::new(3.0, 0.0)).unwrap();
        assert!(topo.build_path(a, b).is_none());
    }

    #[test]
    fn priced_tags_stay_walkable_at_a_premium() {
        let (mut g, faces) = strip();
        use crate::planar::EdgeKind;
        for e in g.face_edges(faces[1]) {
            g.set_kind(e, Some(EdgeKind::Road));
        }
        let topo = Topology::build_with(&g, &faces, |k| match k {
            EdgeKind::Road => Some(4.0),
            _ => None,
        });
        let a = g.live_vertices().find(|&v| g.point(v) == Point::new(0.0, 0.0)).unwrap();
        let b = g.live_vertices().find(|&v| g.point(v) == Point::new(3.0, 0.0)).unwrap();
        let path = topo.build_path(a, b).expect("road edges priced in, not blocked");
        assert_eq!(path.first(), Some(&a));
        assert_eq!(path.last(), Some(&b));
    }
}
