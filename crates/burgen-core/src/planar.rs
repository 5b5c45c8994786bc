//! Half-edge planar graph (DCEL) over the city partition.
//!
//! Every undirected edge is a pair of directed half-edges (twins). A half-edge
//! on the outer boundary of the partition has no twin. All records live in
//! flat arenas addressed by typed indices, so twin/next/face links are plain
//! index pairs and the cyclic structure carries no ownership.
//!
//! Invariants:
//! * following `next` around a face returns to the start;
//! * `twin.twin == self` whenever both exist;
//! * `dest(e) == origin(next(e))` inside every face cycle.
//!
//! Mutations (`collapse_edge`, `split_edge`, `split_face`) preserve these
//! invariants or fail with `InvalidTopology`; they never leave a half-built
//! graph behind for callers to observe.

use std::collections::HashMap;
use std::fmt;

use crate::error::{BuildError, Result};
use crate::geom::{Point, Polygon};

// ── Index types ───────────────────────────────────────────────────────────────

macro_rules! idx {
    ($name:ident) => {
        #[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
        pub struct $name(pub usize);

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}({})", stringify!($name), self.0)
            }
        }
    };
}

idx!(VertexId);
idx!(HalfEdgeId);
idx!(FaceId);

/// Functional tag of an undirected edge. Tags live on both twins.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum EdgeKind {
    /// Outer limit of the generated area.
    Horizon,
    /// Land/water boundary.
    Coast,
    /// A street artery runs along this edge.
    Road,
    /// A curtain-wall segment.
    Wall,
    /// A canal bank.
    Canal,
}

// ── Records ───────────────────────────────────────────────────────────────────

#[derive(Clone, Debug)]
pub struct Vertex {
    pub point: Point,
    /// Outgoing half-edges (unordered).
    pub out: Vec<HalfEdgeId>,
    pub alive: bool,
}

#[derive(Clone, Debug)]
pub struct HalfEdge {
    pub origin: VertexId,
    pub next: HalfEdgeId,
    pub prev: HalfEdgeId,
    pub twin: Option<HalfEdgeId>,
    pub face: FaceId,
    pub kind: Option<EdgeKind>,
    pub alive: bool,
}

#[derive(Clone, Debug)]
pub struct Face {
    /// Any half-edge on this face's cycle.
    pub edge: HalfEdgeId,
    pub alive: bool,
}

// ── Graph ─────────────────────────────────────────────────────────────────────

#[derive(Clone, Debug, Default)]
pub struct PlanarGraph {
    vertices: Vec<Vertex>,
    edges: Vec<HalfEdge>,
    faces: Vec<Face>,
}

/// Coordinate quantisation for vertex sharing between adjacent cells.
fn quantize(p: Point) -> (i64, i64) {
    ((p.x * 1e6).round() as i64, (p.y * 1e6).round() as i64)
}

impl PlanarGraph {
    /// Build the graph from a set of counter-clockwise cell polygons.
    /// Vertices are shared between cells by quantised coordinate; twins are
    /// linked wherever two cells walk the same undirected edge in opposite
    /// directions. Returns the graph and one face per input polygon.
    pub fn from_cells(cells: &[Polygon]) -> (Self, Vec<FaceId>) {
        let mut graph = PlanarGraph::default();
        let mut vertex_of: HashMap<(i64, i64), VertexId> = HashMap::new();
        let mut edge_of: HashMap<(VertexId, VertexId), HalfEdgeId> = HashMap::new();
        let mut face_ids = Vec::with_capacity(cells.len());

        for cell in cells {
            let face = FaceId(graph.faces.len());
            let first_edge = HalfEdgeId(graph.edges.len());
            graph.faces.push(Face { edge: first_edge, alive: true });
            face_ids.push(face);

            let mut ring: Vec<VertexId> = cell
                .0
                .iter()
                .map(|&p| {
                    *vertex_of.entry(quantize(p)).or_insert_with(|| {
                        let id = VertexId(graph.vertices.len());
                        graph.vertices.push(Vertex { point: p, out: Vec::new(), alive: true });
                        id
                    })
                })
                .collect();
            // Quantisation can merge near-coincident corners; drop the
            // zero-length edges that would create.
            ring.dedup();
            while ring.len() > 1 && ring.first() == ring.last() {
                ring.pop();
            }
            let n = ring.len();

            let base = graph.edges.len();
            for (i, &v) in ring.iter().enumerate() {
                let id = HalfEdgeId(base + i);
                let next = HalfEdgeId(base + (i + 1) % n);
                let prev = HalfEdgeId(base + (i + n - 1) % n);
                graph.edges.push(HalfEdge {
                    origin: v,
                    next,
                    prev,
                    twin: None,
                    face,
                    kind: None,
                    alive: true,
                });
                graph.vertices[v.0].out.push(id);
                edge_of.insert((v, ring[(i + 1) % n]), id);
            }
        }

        // Twin linking by (origin, dest) lookup.
        let ids: Vec<(VertexId, VertexId, HalfEdgeId)> = edge_of
            .iter()
            .map(|(&(a, b), &e)| (a, b, e))
            .collect();
        for (a, b, e) in ids {
            if let Some(&t) = edge_of.get(&(b, a)) {
                graph.edges[e.0].twin = Some(t);
                graph.edges[t.0].twin = Some(e);
            }
        }

        (graph, face_ids)
    }

    // ── Accessors ───────────────────────────────────────────────────────────

    pub fn point(&self, v: VertexId) -> Point {
        self.vertices[v.0].point
    }

    pub fn set_point(&mut self, v: VertexId, p: Point) {
        self.vertices[v.0].point = p;
    }

    pub fn vertex(&self, v: VertexId) -> &Vertex {
        &self.vertices[v.0]
    }

    pub fn he(&self, e: HalfEdgeId) -> &HalfEdge {
        &self.edges[e.0]
    }

    pub fn origin(&self, e: HalfEdgeId) -> VertexId {
        self.edges[e.0].origin
    }

    pub fn dest(&self, e: HalfEdgeId) -> VertexId {
        self.edges[self.edges[e.0].next.0].origin
    }

    pub fn next(&self, e: HalfEdgeId) -> HalfEdgeId {
        self.edges[e.0].next
    }

    pub fn prev(&self, e: HalfEdgeId) -> HalfEdgeId {
        self.edges[e.0].prev
    }

    pub fn twin(&self, e: HalfEdgeId) -> Option<HalfEdgeId> {
        self.edges[e.0].twin
    }

    pub fn face_of(&self, e: HalfEdgeId) -> FaceId {
        self.edges[e.0].face
    }

    pub fn face_alive(&self, f: FaceId) -> bool {
        self.faces[f.0].alive
    }

    pub fn kind(&self, e: HalfEdgeId) -> Option<EdgeKind> {
        self.edges[e.0].kind
    }

    /// Tag a half-edge and its twin.
    pub fn set_kind(&mut self, e: HalfEdgeId, kind: Option<EdgeKind>) {
        self.edges[e.0].kind = kind;
        if let Some(t) = self.edges[e.0].twin {
            self.edges[t.0].kind = kind;
        }
    }

    pub fn edge_length(&self, e: HalfEdgeId) -> f64 {
        self.point(self.origin(e)).distance(self.point(self.dest(e)))
    }

    pub fn num_vertices(&self) -> usize {
        self.vertices.iter().filter(|v| v.alive).count()
    }

    pub fn num_faces(&self) -> usize {
        self.faces.iter().filter(|f| f.alive).count()
    }

    pub fn live_vertices(&self) -> impl Iterator<Item = VertexId> + '_ {
        self.vertices
            .iter()
            .enumerate()
            .filter(|(_, v)| v.alive)
            .map(|(i, _)| VertexId(i))
    }

    /// Directed edge from `a` to `b`, if the two vertices are adjacent.
    pub fn edge_between(&self, a: VertexId, b: VertexId) -> Option<HalfEdgeId> {
        self.vertices[a.0]
            .out
            .iter()
            .copied()
            .find(|&e| self.edges[e.0].alive && self.dest(e) == b)
    }

    /// Half-edges of a face cycle, starting at the face's entry edge.
    pub fn face_edges(&self, f: FaceId) -> Vec<HalfEdgeId> {
        let start = self.faces[f.0].edge;
        let mut out = Vec::new();
        let mut cur = start;
        loop {
            out.push(cur);
            cur = self.edges[cur.0].next;
            if cur == start || out.len() > self.edges.len() {
                break;
            }
        }
        out
    }

    pub fn face_vertices(&self, f: FaceId) -> Vec<VertexId> {
        self.face_edges(f).iter().map(|&e| self.origin(e)).collect()
    }

    pub fn face_polygon(&self, f: FaceId) -> Polygon {
        Polygon::new(self.face_edges(f).iter().map(|&e| self.point(self.origin(e))).collect())
    }

    /// Faces incident to a vertex.
    pub fn vertex_faces(&self, v: VertexId) -> Vec<FaceId> {
        let mut out: Vec<FaceId> = self.vertices[v.0]
            .out
            .iter()
            .filter(|&&e| self.edges[e.0].alive)
            .map(|&e| self.edges[e.0].face)
            .collect();
        out.sort_unstable();
        out.dedup();
        out
    }

    /// Neighbouring vertices reachable over one edge.
    pub fn adjacent_vertices(&self, v: VertexId) -> Vec<VertexId> {
        let mut out: Vec<VertexId> = self.vertices[v.0]
            .out
            .iter()
            .filter(|&&e| self.edges[e.0].alive)
            .map(|&e| self.dest(e))
            .collect();
        out.sort_unstable();
        out.dedup();
        out
    }

    // ── Circumference ───────────────────────────────────────────────────────

    /// Ordered outer boundary of a face set: the half-edges whose twin is
    /// absent or belongs to a face outside the set, chained head-to-tail.
    pub fn circumference(&self, faces: &[FaceId]) -> Result<Vec<HalfEdgeId>> {
        let in_set = |f: FaceId| faces.contains(&f);
        let is_boundary = |e: HalfEdgeId| {
            self.edges[e.0].alive
                && in_set(self.edges[e.0].face)
                && match self.edges[e.0].twin {
                    Some(t) => !in_set(self.edges[t.0].face),
                    None => true,
                }
        };

        let start = faces
            .iter()
            .flat_map(|&f| self.face_edges(f))
            .find(|&e| is_boundary(e))
            .ok_or(BuildError::NoHorizon)?;

        let mut out = Vec::new();
        let mut cur = start;
        loop {
            out.push(cur);
            // Rotate around dest(cur) until the next boundary edge shows up.
            let mut e = self.edges[cur.0].next;
            let mut guard = 0;
            while !is_boundary(e) {
                let t = self.edges[e.0]
                    .twin
                    .ok_or(BuildError::InvalidTopology("open edge inside face set"))?;
                e = self.edges[t.0].next;
                guard += 1;
                if guard > self.edges.len() {
                    return Err(BuildError::InvalidTopology("circumference walk diverged"));
                }
            }
            if e == start {
                break;
            }
            cur = e;
            if out.len() > self.edges.len() {
                return Err(BuildError::InvalidTopology("circumference not closed"));
            }
        }
        Ok(out)
    }

    /// Reconstruct the half-edge chain along an ordered vertex list.
    /// Fails when two consecutive vertices share no edge.
    pub fn vertices_to_chain(&self, verts: &[VertexId]) -> Result<Vec<HalfEdgeId>> {
        let mut out = Vec::with_capacity(verts.len().saturating_sub(1));
        for pair in verts.windows(2) {
            let e = self
                .edge_between(pair[0], pair[1])
                .ok_or(BuildError::InvalidTopology("vertex chain skips non-adjacent pair"))?;
            out.push(e);
        }
        Ok(out)
    }

    // ── Mutations ───────────────────────────────────────────────────────────

    /// Collapse an edge: its endpoints merge at their midpoint, all half-edges
    /// incident to the vanishing endpoint are relinked, and any 2-gon left
    /// behind is dissolved. Returns the faces whose cached polygons the caller
    /// must refresh.
    pub fn collapse_edge(&mut self, e: HalfEdgeId) -> Result<Vec<FaceId>> {
        if !self.edges[e.0].alive {
            return Err(BuildError::InvalidTopology("collapse of a dead edge"));
        }
        let keep = self.origin(e);
        let drop = self.dest(e);
        if keep == drop {
            return Err(BuildError::InvalidTopology("collapse of a loop edge"));
        }
        let mid = self.point(keep).lerp(self.point(drop), 0.5);
        self.vertices[keep.0].point = mid;

        let mut affected: Vec<FaceId> = Vec::new();
        let twin = self.edges[e.0].twin;
        for pair_edge in [Some(e), twin].into_iter().flatten() {
            affected.push(self.edges[pair_edge.0].face);
            self.unlink_from_cycle(pair_edge);
        }

        // Re-home the vanishing vertex's remaining out-edges.
        let moved: Vec<HalfEdgeId> = self.vertices[drop.0]
            .out
            .iter()
            .copied()
            .filter(|&o| self.edges[o.0].alive)
            .collect();
        for o in &moved {
            self.edges[o.0].origin = keep;
            self.vertices[keep.0].out.push(*o);
        }
        self.vertices[drop.0].out.clear();
        self.vertices[drop.0].alive = false;

        // Both endpoints moved, so every face around the merged vertex needs a
        // polygon refresh.
        let around: Vec<HalfEdgeId> = self.vertices[keep.0].out.clone();
        for o in around {
            if self.edges[o.0].alive {
                affected.push(self.edges[o.0].face);
            }
        }

        affected.sort_unstable();
        affected.dedup();
        affected.retain(|&f| self.faces[f.0].alive);

        // A triangle that lost an edge is now a 2-gon; dissolve it.
        let mut extra = Vec::new();
        for &f in &affected {
            if self.face_edges(f).len() == 2 {
                extra.extend(self.dissolve_two_gon(f)?);
            }
        }
        affected.extend(extra);
        affected.sort_unstable();
        affected.dedup();
        affected.retain(|&f| self.faces[f.0].alive);
        Ok(affected)
    }

    fn unlink_from_cycle(&mut self, e: HalfEdgeId) {
        let prev = self.edges[e.0].prev;
        let next = self.edges[e.0].next;
        self.edges[prev.0].next = next;
        self.edges[next.0].prev = prev;
        let face = self.edges[e.0].face;
        if self.faces[face.0].edge == e {
            self.faces[face.0].edge = next;
        }
        self.edges[e.0].alive = false;
        let origin = self.edges[e.0].origin;
        self.vertices[origin.0].out.retain(|&o| o != e);
    }

    /// Remove a degenerate two-edge face by stitching its outer twins together.
    fn dissolve_two_gon(&mut self, f: FaceId) -> Result<Vec<FaceId>> {
        let ring = self.face_edges(f);
        if ring.len() != 2 {
            return Err(BuildError::InvalidTopology("dissolve called on a non-2-gon"));
        }
        let (a, b) = (ring[0], ring[1]);
        let ta = self.edges[a.0].twin;
        let tb = self.edges[b.0].twin;
        let kind = self.edges[a.0].kind.or(self.edges[b.0].kind);
        if let Some(ta) = ta {
            self.edges[ta.0].twin = tb;
            if self.edges[ta.0].kind.is_none() {
                self.edges[ta.0].kind = kind;
            }
        }
        if let Some(tb) = tb {
            self.edges[tb.0].twin = ta;
            if self.edges[tb.0].kind.is_none() {
                self.edges[tb.0].kind = kind;
            }
        }
        for e in [a, b] {
            self.edges[e.0].alive = false;
            let origin = self.edges[e.0].origin;
            self.vertices[origin.0].out.retain(|&o| o != e);
        }
        self.faces[f.0].alive = false;
        let mut touched = Vec::new();
        if let Some(ta) = ta {
            touched.push(self.edges[ta.0].face);
        }
        if let Some(tb) = tb {
            touched.push(self.edges[tb.0].face);
        }
        Ok(touched)
    }

    /// Insert a vertex at `p` on edge `e` (and its twin). Returns the new
    /// vertex. Edge kinds carry over to both fragments.
    pub fn split_edge(&mut self, e: HalfEdgeId, p: Point) -> Result<VertexId> {
        if !self.edges[e.0].alive {
            return Err(BuildError::InvalidTopology("split of a dead edge"));
        }
        let v = VertexId(self.vertices.len());
        self.vertices.push(Vertex { point: p, out: Vec::new(), alive: true });

        let kind = self.edges[e.0].kind;
        let face = self.edges[e.0].face;
        let next = self.edges[e.0].next;

        // e becomes origin→v; e2 is v→dest.
        let e2 = HalfEdgeId(self.edges.len());
        self.edges.push(HalfEdge {
            origin: v,
            next,
            prev: e,
            twin: None,
            face,
            kind,
            alive: true,
        });
        self.edges[next.0].prev = e2;
        self.edges[e.0].next = e2;
        self.vertices[v.0].out.push(e2);

        if let Some(t) = self.edges[e.0].twin {
            // t was dest→origin; it becomes dest→v, t2 is v→origin.
            let t_face = self.edges[t.0].face;
            let t_next = self.edges[t.0].next;
            let t2 = HalfEdgeId(self.edges.len());
            self.edges.push(HalfEdge {
                origin: v,
                next: t_next,
                prev: t,
                twin: Some(e),
                face: t_face,
                kind,
                alive: true,
            });
            self.edges[t_next.0].prev = t2;
            self.edges[t.0].next = t2;
            self.vertices[v.0].out.push(t2);

            self.edges[e.0].twin = Some(t2);
            self.edges[t.0].twin = Some(e2);
            self.edges[e2.0].twin = Some(t);
        }
        Ok(v)
    }

    /// Split a face along the chord `v1 → v2`. Both vertices must lie on the
    /// face cycle and must not be adjacent on it. The cycle containing the
    /// face's entry edge keeps the old id; the other side gets a fresh face.
    /// Returns `(new_face, chord, chord_twin)`.
    pub fn split_face(
        &mut self,
        f: FaceId,
        v1: VertexId,
        v2: VertexId,
    ) -> Result<(FaceId, HalfEdgeId, HalfEdgeId)> {
        let ring = self.face_edges(f);
        let e1 = ring
            .iter()
            .copied()
            .find(|&e| self.origin(e) == v1)
            .ok_or(BuildError::InvalidTopology("chord endpoint not on face"))?;
        let e2 = ring
            .iter()
            .copied()
            .find(|&e| self.origin(e) == v2)
            .ok_or(BuildError::InvalidTopology("chord endpoint not on face"))?;
        if self.dest(e1) == v2 || self.dest(e2) == v1 {
            return Err(BuildError::InvalidTopology("chord duplicates an existing edge"));
        }

        let p1 = self.edges[e1.0].prev;
        let p2 = self.edges[e2.0].prev;

        let c1 = HalfEdgeId(self.edges.len());
        let c2 = HalfEdgeId(self.edges.len() + 1);
        self.edges.push(HalfEdge {
            origin: v1,
            next: e2,
            prev: p1,
            twin: Some(c2),
            face: f,
            kind: None,
            alive: true,
        });
        self.edges.push(HalfEdge {
            origin: v2,
            next: e1,
            prev: p2,
            twin: Some(c1),
            face: f,
            kind: None,
            alive: true,
        });
        self.edges[p1.0].next = c1;
        self.edges[e2.0].prev = c1;
        self.edges[p2.0].next = c2;
        self.edges[e1.0].prev = c2;
        self.vertices[v1.0].out.push(c1);
        self.vertices[v2.0].out.push(c2);

        // Decide which cycle keeps the old face id.
        let entry = self.faces[f.0].edge;
        let cycle_a = self.cycle_from(c1);
        let (old_cycle, new_cycle) = if cycle_a.contains(&entry) {
            (c1, c2)
        } else {
            (c2, c1)
        };
        self.faces[f.0].edge = old_cycle;
        for e in self.cycle_from(old_cycle) {
            self.edges[e.0].face = f;
        }
        let nf = FaceId(self.faces.len());
        self.faces.push(Face { edge: new_cycle, alive: true });
        for e in self.cycle_from(new_cycle) {
            self.edges[e.0].face = nf;
        }
        Ok((nf, c1, c2))
    }

    fn cycle_from(&self, start: HalfEdgeId) -> Vec<HalfEdgeId> {
        let mut out = Vec::new();
        let mut cur = start;
        loop {
            out.push(cur);
            cur = self.edges[cur.0].next;
            if cur == start || out.len() > self.edges.len() {
                break;
            }
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// 2×1 strip of two unit squares sharing the edge x = 1.
    fn two_squares() -> (PlanarGraph, Vec<FaceId>) {
        let left = Polygon::new(vec![
            Point::new(0.0, 0.0),
            Point::new(1.0, 0.0),
            Point::new(1.0, 1.0),
            Point::new(0.0, 1.0),
        ]);
        let right = Polygon::new(vec![
            Point::new(1.0, 0.0),
            Point::new(2.0, 0.0),
            Point::new(2.0, 1.0),
            Point::new(1.0, 1.0),
        ]);
        PlanarGraph::from_cells(&[left, right])
    }

    #[test]
    fn shared_edge_gets_twins() {
        let (g, faces) = two_squares();
        assert_eq!(g.num_vertices(), 6);
        assert_eq!(g.num_faces(), 2);

        let mut twinned = 0;
        for &f in &faces {
            for e in g.face_edges(f) {
                if let Some(t) = g.twin(e) {
                    assert_eq!(g.twin(t), Some(e));
                    assert_eq!(g.origin(e), g.dest(t));
                    twinned += 1;
                }
            }
        }
        assert_eq!(twinned, 2, "exactly one shared undirected edge");
    }

    #[test]
    fn face_cycles_close() {
        let (g, faces) = two_squares();
        for &f in &faces {
            let ring = g.face_edges(f);
            assert_eq!(ring.len(), 4);
            for w in ring.windows(2) {
                assert_eq!(g.dest(w[0]), g.origin(w[1]));
            }
            assert_eq!(g.dest(ring[3]), g.origin(ring[0]));
        }
    }

    #[test]
    fn circumference_of_pair_is_outer_hexagon() {
        let (g, faces) = two_squares();
        let ring = g.circumference(&faces).unwrap();
        assert_eq!(ring.len(), 6);
        for w in ring.windows(2) {
            assert_eq!(g.dest(w[0]), g.origin(w[1]));
        }
        assert_eq!(g.dest(*ring.last().unwrap()), g.origin(ring[0]));
        // Boundary edges must not have an in-set twin.
        for &e in &ring {
            if let Some(t) = g.twin(e) {
                assert!(!faces.contains(&g.face_of(t)));
            }
        }
    }

    #[test]
    fn circumference_of_single_face() {
        let (g, faces) = two_squares();
        let ring = g.circumference(&faces[..1]).unwrap();
        assert_eq!(ring.len(), 4);
    }

    #[test]
    fn vertices_to_chain_round_trips() {
        let (g, faces) = two_squares();
        let verts = g.face_vertices(faces[0]);
        let chain = g.vertices_to_chain(&verts).unwrap();
        assert_eq!(chain.len(), verts.len() - 1);
        for (i, &e) in chain.iter().enumerate() {
            assert_eq!(g.origin(e), verts[i]);
            assert_eq!(g.dest(e), verts[i + 1]);
        }
    }

    #[test]
    fn vertices_to_chain_rejects_non_adjacent() {
        let (g, faces) = two_squares();
        let verts = g.face_vertices(faces[0]);
        // Skip a vertex: 0 → 2 are opposite square corners, not adjacent.
        let bad = vec![verts[0], verts[2]];
        assert!(matches!(
            g.vertices_to_chain(&bad),
            Err(BuildError::InvalidTopology(_))
        ));
    }

    #[test]
    fn split_edge_preserves_twins() {
        let (mut g, faces) = two_squares();
        let shared = g
            .face_edges(faces[0])
            .into_iter()
            .find(|&e| g.twin(e).is_some())
            .unwrap();
        let before = g.face_edges(faces[0]).len();
        let v = g.split_edge(shared, Point::new(1.0, 0.5)).unwrap();
        assert_eq!(g.point(v), Point::new(1.0, 0.5));
        assert_eq!(g.face_edges(faces[0]).len(), before + 1);
        assert_eq!(g.face_edges(faces[1]).len(), 5);
        for f in [faces[0], faces[1]] {
            for e in g.face_edges(f) {
                if let Some(t) = g.twin(e) {
                    assert_eq!(g.twin(t), Some(e));
                    assert_eq!(g.origin(e), g.dest(t));
                }
            }
        }
    }

    #[test]
    fn split_face_divides_square() {
        let (mut g, faces) = two_squares();
        let verts = g.face_vertices(faces[0]);
        // Chord between opposite corners.
        let (nf, c1, c2) = g.split_face(faces[0], verts[0], verts[2]).unwrap();
        assert_eq!(g.twin(c1), Some(c2));
        assert_eq!(g.face_edges(faces[0]).len(), 3);
        assert_eq!(g.face_edges(nf).len(), 3);
        let a0 = g.face_polygon(faces[0]).area();
        let a1 = g.face_polygon(nf).area();
        assert!((a0 + a1 - 1.0).abs() < 1e-9);
    }

    #[test]
    fn collapse_edge_merges_endpoints() {
        let (mut g, faces) = two_squares();
        // Collapse the left square's bottom edge (no twin).
        let e = g
            .face_edges(faces[0])
            .into_iter()
            .find(|&e| g.twin(e).is_none())
            .unwrap();
        let keep = g.origin(e);
        let affected = g.collapse_edge(e).unwrap();
        assert!(affected.contains(&faces[0]));
        assert_eq!(g.face_edges(faces[0]).len(), 3);
        assert!(g.vertex(keep).alive);
        assert_eq!(g.num_vertices(), 5);
        // Cycle still closes.
        let ring = g.face_edges(faces[0]);
        for w in ring.windows(2) {
            assert_eq!(g.dest(w[0]), g.origin(w[1]));
        }
    }

    #[test]
    fn collapse_dissolves_resulting_two_gon() {
        let tri = Polygon::new(vec![
            Point::new(0.0, 0.0),
            Point::new(1.0, 0.0),
            Point::new(0.5, 1.0),
        ]);
        let tri2 = Polygon::new(vec![
            Point::new(0.0, 0.0),
            Point::new(0.5, -1.0),
            Point::new(1.0, 0.0),
        ]);
        let (mut g, faces) = PlanarGraph::from_cells(&[tri, tri2]);
        let shared = g
            .face_edges(faces[0])
            .into_iter()
            .find(|&e| g.twin(e).is_some())
            .unwrap();
        // Collapsing the shared edge turns both triangles into 2-gons, which
        // must be dissolved rather than left degenerate.
        let _ = g.collapse_edge(shared).unwrap();
        for f in faces {
            assert!(!g.face_alive(f), "2-gon faces must be dissolved");
        }
    }
}
