//! Curtain wall: the closed boundary around a patch set, with gates and
//! towers.
//!
//! The wall shape is the planar-graph circumference of the patch set. A real
//! wall tags its edges, smooths the outline (reserved and coastal vertices
//! stay pinned) and suppresses segments that run along the shore so the
//! coastline is not double-walled. Gates are drawn by weighted random
//! selection over admissible boundary vertices with a cosine falloff around
//! already-chosen gates to spread them apart.

use crate::error::{BuildError, Result};
use crate::geom::{Point, Polygon};
use crate::partition::Partition;
use crate::planar::{EdgeKind, FaceId, HalfEdgeId, VertexId};
use crate::random::Gen;

#[derive(Debug, Clone)]
pub struct CurtainWall {
    /// False for a mere city limit (no built wall, no towers).
    pub real: bool,
    pub shape: Polygon,
    /// Boundary half-edges in cycle order.
    pub edges: Vec<HalfEdgeId>,
    /// Boundary vertices in cycle order; `vertices[i]` is the origin of
    /// `edges[i]`.
    pub vertices: Vec<VertexId>,
    /// Whether a wall segment is actually present on `edges[i]`; false along
    /// the shore.
    pub segments: Vec<bool>,
    pub gates: Vec<VertexId>,
    pub towers: Vec<VertexId>,
    /// Towers that would stand in the water line; kept apart so renderers can
    /// treat the shoreline differently.
    pub shore_towers: Vec<VertexId>,
}

/// Gate count when the blueprint leaves it to us: grows with the patch count,
/// one fewer on a coastal wall (the harbour replaces a land gate).
pub fn auto_gate_count(patches: usize, coastal: bool) -> usize {
    let base = (patches as f64).sqrt().round() as usize;
    let penalty = usize::from(coastal);
    base.saturating_sub(penalty).clamp(2, 6)
}

impl CurtainWall {
    /// Build the wall (or bare city limit) around `faces`.
    ///
    /// `reserved` vertices are never smoothed and never become gates.
    /// `requested_gates < 0` means derive the count; `0` builds a gateless
    /// limit on purpose. Otherwise ending up with zero gates is fatal.
    pub fn build(
        gen: &mut Gen,
        partition: &mut Partition,
        real: bool,
        faces: &[FaceId],
        reserved: &[VertexId],
        requested_gates: i32,
    ) -> Result<CurtainWall> {
        let mut edges = partition.graph.circumference(faces)?;
        if edges.len() < 3 {
            return Err(BuildError::ShortHorizon(edges.len()));
        }

        if real {
            smooth_boundary(partition, &edges, reserved);
            collapse_short_edges(partition, &edges, reserved);
            // The collapse pass invalidates stored half-edge ids.
            edges = partition.graph.circumference(faces)?;
            if edges.len() < 3 {
                return Err(BuildError::ShortHorizon(edges.len()));
            }
        }
        let vertices: Vec<VertexId> = edges.iter().map(|&e| partition.graph.origin(e)).collect();

        // Coastal boundary edges carry no wall segment.
        let segments: Vec<bool> = edges
            .iter()
            .map(|&e| partition.graph.kind(e) != Some(EdgeKind::Coast))
            .collect();
        let coastal = segments.iter().any(|&s| !s);

        let mut wall = CurtainWall {
            real,
            shape: Polygon::default(),
            edges,
            vertices,
            segments,
            gates: Vec::new(),
            towers: Vec::new(),
            shore_towers: Vec::new(),
        };

        if real {
            for (i, &e) in wall.edges.iter().enumerate() {
                if wall.segments[i] {
                    partition.graph.set_kind(e, Some(EdgeKind::Wall));
                }
            }
        }
        wall.shape = Polygon::new(
            wall.vertices
                .iter()
                .map(|&v| partition.graph.point(v))
                .collect(),
        );

        let count = if requested_gates < 0 {
            auto_gate_count(faces.len(), coastal)
        } else {
            requested_gates as usize
        };
        if count > 0 {
            wall.place_gates(gen, partition, faces, reserved, count)?;
        }
        if real {
            wall.place_towers();
        }
        Ok(wall)
    }

    fn place_gates(
        &mut self,
        gen: &mut Gen,
        partition: &mut Partition,
        faces: &[FaceId],
        reserved: &[VertexId],
        count: usize,
    ) -> Result<()> {
        let n = self.vertices.len();
        // Admissible: not reserved, wall segment on both sides (a shore vertex
        // cannot carry a land gate), reachable from outside over land, and
        // opening onto an interior street edge so a road can actually pass
        // through.
        let admissible: Vec<usize> = (0..n)
            .filter(|&i| {
                let v = self.vertices[i];
                !reserved.contains(&v)
                    && self.segments[i]
                    && self.segments[(i + n - 1) % n]
                    && self.outer_land_face(partition, faces, v).is_some()
                    && has_inner_edge(partition, faces, v)
            })
            .collect();
        if admissible.is_empty() {
            return Err(BuildError::NoGates);
        }

        let realized = count.min(admissible.len());
        let mut weights: Vec<f64> = admissible.iter().map(|_| 1.0).collect();
        let spread = n as f64 / (realized + 1) as f64;

        for _ in 0..realized {
            let pick = gen.weighted(&weights);
            let boundary_idx = admissible[pick];
            self.gates.push(self.vertices[boundary_idx]);
            // Cosine falloff: zero at the pick, back to full weight one
            // spread away along the boundary.
            for (w, &j) in weights.iter_mut().zip(admissible.iter()) {
                let d = index_distance(boundary_idx, j, n) as f64;
                let t = (d / spread).min(1.0);
                *w *= 0.5 - 0.5 * (std::f64::consts::PI * t).cos();
            }
        }
        if self.gates.is_empty() {
            return Err(BuildError::NoGates);
        }

        // Align each gate with a desire line by splitting the outer cell
        // toward its far side. Failure here is local; the gate stays either
        // way.
        let gates = self.gates.clone();
        for v in gates {
            self.split_outer_cell(partition, faces, v);
        }
        Ok(())
    }

    /// The face outside the wall at `v` that is dry land, if any.
    fn outer_land_face(
        &self,
        partition: &Partition,
        faces: &[FaceId],
        v: VertexId,
    ) -> Option<FaceId> {
        partition
            .graph
            .vertex_faces(v)
            .into_iter()
            .find(|f| {
                !faces.contains(f)
                    && partition
                        .cell_index(*f)
                        .map(|c| !partition.cells[c].water)
                        .unwrap_or(false)
            })
    }

    fn split_outer_cell(&self, partition: &mut Partition, faces: &[FaceId], v: VertexId) {
        let Some(outer) = self.outer_land_face(partition, faces, v) else {
            return;
        };
        let Some(parent) = partition.cell_index(outer) else {
            return;
        };
        let ring = partition.graph.face_vertices(outer);
        if ring.len() < 5 {
            return;
        }
        let pv = partition.graph.point(v);
        let away = (pv - partition.center).norm();
        // Far vertex along the outward desire line, skipping the gate's
        // cycle neighbours (a chord to those would duplicate an edge).
        let pos = ring.iter().position(|&r| r == v);
        let Some(pos) = pos else { return };
        let m = ring.len();
        let target = ring
            .iter()
            .enumerate()
            .filter(|&(i, _)| i != pos && i != (pos + 1) % m && i != (pos + m - 1) % m)
            .max_by(|&(_, &a), &(_, &b)| {
                let da = (partition.graph.point(a) - pv).dot(away);
                let db = (partition.graph.point(b) - pv).dot(away);
                da.total_cmp(&db)
            })
            .map(|(_, &w)| w);
        let Some(w) = target else { return };
        if let Ok((new_face, _, _)) = partition.graph.split_face(outer, v, w) {
            partition.adopt_face(parent, new_face);
            partition.refresh_shapes(&[outer, new_face]);
        }
    }

    fn place_towers(&mut self) {
        let n = self.vertices.len();
        for (i, &v) in self.vertices.iter().enumerate() {
            if self.gates.contains(&v) {
                continue;
            }
            let walled = self.segments[i] || self.segments[(i + n - 1) % n];
            let shore = !self.segments[i] && !self.segments[(i + n - 1) % n];
            if shore {
                self.shore_towers.push(v);
            } else if walled {
                self.towers.push(v);
            }
        }
    }

    /// Consecutive vertex pairs of the present wall segments, wrap included.
    pub fn vertices_windows(&self) -> Vec<(VertexId, VertexId)> {
        let n = self.vertices.len();
        (0..n)
            .filter(|&i| self.segments[i])
            .map(|i| (self.vertices[i], self.vertices[(i + 1) % n]))
            .collect()
    }

    /// Gate positions in model space.
    pub fn gate_points(&self, partition: &Partition) -> Vec<Point> {
        self.gates
            .iter()
            .map(|&v| partition.graph.point(v))
            .collect()
    }

    /// True when the boundary cycle is closed edge-to-edge.
    pub fn is_closed(&self, partition: &Partition) -> bool {
        let n = self.edges.len();
        (0..n).all(|i| {
            partition.graph.dest(self.edges[i]) == partition.graph.origin(self.edges[(i + 1) % n])
        })
    }
}

fn index_distance(a: usize, b: usize, n: usize) -> usize {
    let d = a.abs_diff(b);
    d.min(n - d)
}

/// Whether the vertex carries an untagged edge between two enclosed faces.
/// A boundary vertex without one opens onto nothing inside and could never
/// connect its gate to the city centre.
fn has_inner_edge(partition: &Partition, faces: &[FaceId], v: VertexId) -> bool {
    partition.graph.vertex(v).out.iter().any(|&e| {
        partition.graph.he(e).alive
            && partition.graph.kind(e).is_none()
            && faces.contains(&partition.graph.face_of(e))
            && partition
                .graph
                .twin(e)
                .map(|t| faces.contains(&partition.graph.face_of(t)))
                .unwrap_or(false)
    })
}

/// Pull boundary vertices toward their neighbours. Reserved vertices and
/// coast vertices keep their positions; every touched cell polygon is
/// refreshed afterwards.
fn smooth_boundary(partition: &mut Partition, edges: &[HalfEdgeId], reserved: &[VertexId]) {
    let vertices: Vec<VertexId> = edges.iter().map(|&e| partition.graph.origin(e)).collect();
    let shape = Polygon::new(
        vertices
            .iter()
            .map(|&v| partition.graph.point(v))
            .collect(),
    );
    let n = vertices.len();
    let mut touched: Vec<FaceId> = Vec::new();
    for (i, &v) in vertices.iter().enumerate() {
        if reserved.contains(&v) {
            continue;
        }
        // A vertex where the boundary meets the shore belongs to the coast;
        // moving it would open the water line.
        let coastal = partition.graph.kind(edges[i]) == Some(EdgeKind::Coast)
            || partition.graph.kind(edges[(i + n - 1) % n]) == Some(EdgeKind::Coast);
        if coastal {
            continue;
        }
        partition.graph.set_point(v, shape.smoothed_vertex(i, 0.3));
        touched.extend(partition.graph.vertex_faces(v));
    }
    touched.sort_unstable();
    touched.dedup();
    partition.refresh_shapes(&touched);
}

/// Collapse boundary edges the smoothing pass left too short to carry a wall
/// segment of their own. Collapsing merges the endpoints and relinks the
/// incident faces; the caller must re-extract the circumference afterwards.
fn collapse_short_edges(partition: &mut Partition, edges: &[HalfEdgeId], reserved: &[VertexId]) {
    let avg = edges
        .iter()
        .map(|&e| partition.graph.edge_length(e))
        .sum::<f64>()
        / edges.len() as f64;
    let threshold = avg * 0.25;

    for &e in edges {
        if !partition.graph.he(e).alive || partition.graph.edge_length(e) >= threshold {
            continue;
        }
        let a = partition.graph.origin(e);
        let b = partition.graph.dest(e);
        if reserved.contains(&a) || reserved.contains(&b) {
            continue;
        }
        // Never collapse a face down to a triangle's edge of survival.
        let left_ok = partition.graph.face_edges(partition.graph.face_of(e)).len() > 3;
        let right_ok = partition
            .graph
            .twin(e)
            .map(|t| partition.graph.face_edges(partition.graph.face_of(t)).len() > 3)
            .unwrap_or(true);
        if !(left_ok && right_ok) {
            continue;
        }
        if let Ok(affected) = partition.graph.collapse_edge(e) {
            partition.refresh_shapes(&affected);
        }
    }
}
