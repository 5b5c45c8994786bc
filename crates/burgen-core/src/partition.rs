//! Patch partition: the Voronoi-like tessellation the whole city is built on.
//!
//! Seeds a polar spray of sites (angle accumulates, radius grows with index),
//! computes their Voronoi cells from a Delaunay triangulation, discards
//! degenerate outer cells, and sorts the survivors by distance from the
//! centre. An optional coastline carve flags cells as water using layered
//! value noise against a directional gradient; the carve runs under a
//! generator checkpoint so it never perturbs the stream consumed by later
//! stages.

use std::collections::HashMap;

use noise::{NoiseFn, Perlin};
use spade::{DelaunayTriangulation, Point2, Triangulation};

use crate::error::{BuildError, Result};
use crate::geom::{Point, Polygon};
use crate::planar::{EdgeKind, FaceId, PlanarGraph};
use crate::random::Gen;
use crate::ward::Ward;

// ── Model entities ────────────────────────────────────────────────────────────

/// One polygon region of the partition, the atomic unit later assigned a Ward.
#[derive(Clone, Debug)]
pub struct Cell {
    pub face: FaceId,
    /// Cached face polygon; refreshed after planar-graph mutations.
    pub shape: Polygon,
    pub water: bool,
    pub within_city: bool,
    pub within_walls: bool,
    /// Land cell bordering water.
    pub landing: bool,
    pub ward: Option<Ward>,
    pub district: Option<usize>,
}

/// Output of the partition stage: the planar graph plus the distance-ordered
/// cell list and the special picks made here.
#[derive(Debug)]
pub struct Partition {
    pub graph: PlanarGraph,
    pub cells: Vec<Cell>,
    pub center: Point,
    /// Index of the oversized plaza cell, when requested.
    pub plaza: Option<usize>,
    /// Index of the citadel cell, when requested.
    pub citadel: Option<usize>,
    pub has_coast: bool,
    face_to_cell: HashMap<FaceId, usize>,
}

#[derive(Debug, Clone)]
pub struct PartitionParams {
    pub n_patches: usize,
    pub plaza: bool,
    pub coast: bool,
    pub citadel: bool,
    pub urban_castle: bool,
}

impl Partition {
    pub fn cell_index(&self, face: FaceId) -> Option<usize> {
        self.face_to_cell.get(&face).copied()
    }

    /// Indices of cells sharing an edge with `idx`.
    pub fn neighbours(&self, idx: usize) -> Vec<usize> {
        let mut out = Vec::new();
        for e in self.graph.face_edges(self.cells[idx].face) {
            if let Some(t) = self.graph.twin(e) {
                if let Some(&c) = self.face_to_cell.get(&self.graph.face_of(t)) {
                    if !out.contains(&c) {
                        out.push(c);
                    }
                }
            }
        }
        out
    }

    /// Re-read the cached polygons of the given faces from the graph.
    pub fn refresh_shapes(&mut self, faces: &[FaceId]) {
        for &f in faces {
            if !self.graph.face_alive(f) {
                continue;
            }
            if let Some(&c) = self.face_to_cell.get(&f) {
                self.cells[c].shape = self.graph.face_polygon(f);
            }
        }
    }

    /// Register a face created by a split, cloning the flags of its parent
    /// cell. Returns the new cell index.
    pub fn adopt_face(&mut self, parent: usize, face: FaceId) -> usize {
        let mut cell = self.cells[parent].clone();
        cell.face = face;
        cell.shape = self.graph.face_polygon(face);
        cell.ward = None;
        let idx = self.cells.len();
        self.cells.push(cell);
        self.face_to_cell.insert(face, idx);
        idx
    }

    pub fn urban_faces(&self) -> Vec<FaceId> {
        self.cells
            .iter()
            .filter(|c| c.within_city)
            .map(|c| c.face)
            .collect()
    }

    pub fn walled_faces(&self) -> Vec<FaceId> {
        self.cells
            .iter()
            .filter(|c| c.within_walls)
            .map(|c| c.face)
            .collect()
    }

    pub fn land_faces(&self) -> Vec<FaceId> {
        self.cells
            .iter()
            .filter(|c| !c.water)
            .map(|c| c.face)
            .collect()
    }
}

// ── Stage entry point ─────────────────────────────────────────────────────────

pub fn build(gen: &mut Gen, params: &PartitionParams) -> Result<Partition> {
    let n = params.n_patches.max(4);
    // Enough surplus sites for a rural ring around the urban core.
    let count = n * 2 + 10;

    let sites = seed_points(gen, count, params.plaza);
    let mut polys = voronoi_cells(&sites)?;

    // Derived perimeter bound: degenerate outer cells blow far past the
    // median and get discarded.
    let mut perims: Vec<f64> = polys.iter().map(|(_, p)| p.perimeter()).collect();
    perims.sort_by(f64::total_cmp);
    let median = perims[perims.len() / 2];
    polys.retain(|(_, p)| p.perimeter() <= median * 4.0);
    if polys.len() < n {
        return Err(BuildError::ShortHorizon(polys.len()));
    }

    let center = Point::default();
    polys.sort_by(|a, b| a.0.distance(center).total_cmp(&b.0.distance(center)));

    // Water carve under a checkpoint: the draws it takes are rolled back so
    // the stream later stages see does not depend on the coast flag.
    let mark = gen.save();
    let water = if params.coast {
        carve_coast(gen, &polys)
    } else {
        vec![false; polys.len()]
    };
    gen.restore(mark);

    let shapes: Vec<Polygon> = polys.iter().map(|(_, p)| p.clone()).collect();
    let (mut graph, faces) = PlanarGraph::from_cells(&shapes);

    let mut cells: Vec<Cell> = shapes
        .iter()
        .zip(faces.iter())
        .zip(water.iter())
        .map(|((shape, &face), &water)| Cell {
            face,
            shape: shape.clone(),
            water,
            within_city: false,
            within_walls: false,
            landing: false,
            ward: None,
            district: None,
        })
        .collect();

    // Urban core: first n non-water cells in distance order.
    let mut taken = 0;
    for cell in cells.iter_mut() {
        if taken == n {
            break;
        }
        if !cell.water {
            cell.within_city = true;
            cell.within_walls = true;
            taken += 1;
        }
    }
    if taken < n {
        return Err(BuildError::ShortHorizon(taken));
    }

    let face_to_cell: HashMap<FaceId, usize> =
        cells.iter().enumerate().map(|(i, c)| (c.face, i)).collect();

    tag_boundaries(&mut graph, &cells, &face_to_cell);
    mark_landings(&graph, &mut cells, &face_to_cell);

    let mut partition = Partition {
        graph,
        cells,
        center,
        plaza: None,
        citadel: None,
        has_coast: water.iter().any(|&w| w),
        face_to_cell,
    };

    if params.plaza {
        // The reserved site sits at the centre; its cell is the closest one.
        partition.plaza = partition
            .cells
            .iter()
            .position(|c| c.within_city && !c.water);
    }
    if params.citadel {
        partition.citadel = Some(pick_citadel(&partition, params.urban_castle)?);
    }
    Ok(partition)
}

/// Polar site spray: angle accumulates with the square root of the index,
/// radius grows linearly with jitter. Index 0 is the reserved plaza lot.
fn seed_points(gen: &mut Gen, count: usize, plaza: bool) -> Vec<Point> {
    let start_angle = gen.float() * std::f64::consts::TAU;
    let mut out = Vec::with_capacity(count);
    for i in 0..count {
        let a = start_angle + (i as f64).sqrt() * 5.0;
        let r = if i == 0 {
            if plaza {
                0.0
            } else {
                4.0 * gen.float()
            }
        } else {
            10.0 + i as f64 * (2.0 + gen.float())
        };
        out.push(Point::new(r * a.cos(), r * a.sin()));
    }
    out
}

/// Voronoi cells of the bounded sites, via the Delaunay dual. Each cell is
/// the ring of adjacent-triangle circumcenters ordered by angle around the
/// site; sites on the convex hull have unbounded cells and are skipped.
/// Circumcenters are computed once per triangle (walking from the face's
/// fixed adjacent edge) so neighbouring cells share bit-identical corners.
fn voronoi_cells(sites: &[Point]) -> Result<Vec<(Point, Polygon)>> {
    let mut tri: DelaunayTriangulation<Point2<f64>> = DelaunayTriangulation::new();
    for s in sites {
        tri.insert(Point2::new(s.x, s.y))
            .map_err(|_| BuildError::InvalidTopology("site rejected by triangulation"))?;
    }

    let mut out = Vec::new();
    for vertex in tri.vertices() {
        let site = vertex.position();
        let site = Point::new(site.x, site.y);

        let mut corners: Vec<Point> = Vec::new();
        let mut bounded = true;
        for edge in vertex.out_edges() {
            let face = edge.face();
            if face.is_outer() {
                bounded = false;
                break;
            }
            let Some(start) = face.adjacent_edge() else {
                bounded = false;
                break;
            };
            let mut pts = Vec::with_capacity(3);
            let mut cur = start;
            loop {
                let p = cur.from().position();
                pts.push(Point::new(p.x, p.y));
                cur = cur.next();
                if cur == start || pts.len() > 3 {
                    break;
                }
            }
            match circumcenter(pts[0], pts[1], pts[2]) {
                Some(c) => corners.push(c),
                None => {
                    bounded = false;
                    break;
                }
            }
        }
        if !bounded || corners.len() < 3 {
            continue;
        }
        corners.sort_by(|a, b| (*a - site).atan().total_cmp(&(*b - site).atan()));
        corners.dedup_by(|a, b| a.distance(*b) < 1e-9);
        if corners.len() < 3 {
            continue;
        }
        let mut poly = Polygon::new(corners);
        poly.orient_ccw();
        out.push((site, poly));
    }
    if out.is_empty() {
        Err(BuildError::NoHorizon)
    } else {
        Ok(out)
    }
}

fn circumcenter(a: Point, b: Point, c: Point) -> Option<Point> {
    let d = 2.0 * (a.x * (b.y - c.y) + b.x * (c.y - a.y) + c.x * (a.y - b.y));
    if d.abs() < 1e-12 {
        return None;
    }
    let a2 = a.dot(a);
    let b2 = b.dot(b);
    let c2 = c.dot(c);
    let ux = (a2 * (b.y - c.y) + b2 * (c.y - a.y) + c2 * (a.y - b.y)) / d;
    let uy = (a2 * (c.x - b.x) + b2 * (a.x - c.x) + c2 * (b.x - a.x)) / d;
    Some(Point::new(ux, uy))
}

/// Layered value noise against a directional gradient. Cells where the
/// combined signal goes negative become water.
fn carve_coast(gen: &mut Gen, polys: &[(Point, Polygon)]) -> Vec<bool> {
    let angle = gen.float() * std::f64::consts::TAU;
    let dir = Point::new(angle.cos(), angle.sin());
    let offset = 0.25 + gen.float() * 0.25;
    let perlin = Perlin::new(gen.int(1, i32::MAX) as u32);

    let r_max = polys
        .iter()
        .map(|(s, _)| s.distance(Point::default()))
        .fold(1.0_f64, f64::max);

    polys
        .iter()
        .map(|(site, _)| {
            let grad = site.dot(dir) / r_max; // -1 .. 1 across the map
            let freq = 1.6 / r_max;
            let n = perlin.get([site.x * freq, site.y * freq])
                + 0.5 * perlin.get([site.x * freq * 2.0, site.y * freq * 2.0]);
            grad + offset + n * 0.35 < 0.0
        })
        .collect()
}

/// Tag the land/water boundary as coast and the outer boundary of all cells
/// as horizon.
fn tag_boundaries(
    graph: &mut PlanarGraph,
    cells: &[Cell],
    face_to_cell: &HashMap<FaceId, usize>,
) {
    let all: Vec<FaceId> = cells.iter().map(|c| c.face).collect();
    let mut coast_edges = Vec::new();
    for cell in cells {
        if cell.water {
            continue;
        }
        for e in graph.face_edges(cell.face) {
            if let Some(t) = graph.twin(e) {
                let other = face_to_cell[&graph.face_of(t)];
                if cells[other].water {
                    coast_edges.push(e);
                }
            }
        }
    }
    for e in coast_edges {
        graph.set_kind(e, Some(EdgeKind::Coast));
    }
    if let Ok(horizon) = graph.circumference(&all) {
        for e in horizon {
            graph.set_kind(e, Some(EdgeKind::Horizon));
        }
    }
}

fn mark_landings(
    graph: &PlanarGraph,
    cells: &mut [Cell],
    face_to_cell: &HashMap<FaceId, usize>,
) {
    let mut landings = Vec::new();
    for (i, cell) in cells.iter().enumerate() {
        if cell.water {
            continue;
        }
        let wet = graph.face_edges(cell.face).into_iter().any(|e| {
            graph
                .twin(e)
                .map(|t| cells[face_to_cell[&graph.face_of(t)]].water)
                .unwrap_or(false)
        });
        if wet {
            landings.push(i);
        }
    }
    for i in landings {
        cells[i].landing = true;
    }
}

/// Citadel pick: the innermost fully-enclosed urban patch for an urban
/// castle, otherwise the farthest urban patch. A pick whose shape is too
/// stringy to wall is a structural failure.
fn pick_citadel(partition: &Partition, urban_castle: bool) -> Result<usize> {
    let urban: Vec<usize> = partition
        .cells
        .iter()
        .enumerate()
        .filter(|(_, c)| c.within_city)
        .map(|(i, _)| i)
        .collect();

    let pick = if urban_castle {
        urban
            .iter()
            .copied()
            .skip(1) // never the plaza/centre cell itself
            .find(|&i| {
                partition
                    .neighbours(i)
                    .iter()
                    .all(|&nb| partition.cells[nb].within_city)
            })
            .or_else(|| urban.last().copied())
    } else {
        urban.last().copied()
    };
    let idx = pick.ok_or(BuildError::DegenerateCitadel)?;
    if partition.cells[idx].shape.compactness() < 0.25 {
        return Err(BuildError::DegenerateCitadel);
    }
    Ok(idx)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn params(n: usize) -> PartitionParams {
        PartitionParams {
            n_patches: n,
            plaza: true,
            coast: false,
            citadel: false,
            urban_castle: false,
        }
    }

    #[test]
    fn urban_core_has_requested_count() {
        let mut gen = Gen::new(1234);
        let p = build(&mut gen, &params(15)).unwrap();
        let urban = p.cells.iter().filter(|c| c.within_city).count();
        assert_eq!(urban, 15);
        assert!(p.cells.len() > 15, "a rural ring must remain");
    }

    #[test]
    fn cells_sorted_by_distance() {
        let mut gen = Gen::new(7);
        let p = build(&mut gen, &params(12)).unwrap();
        let dists: Vec<f64> = p
            .cells
            .iter()
            .map(|c| c.shape.center().distance(p.center))
            .collect();
        // Distance ordering was applied to sites; cell centres track it
        // loosely, so only check the coarse trend.
        let first: f64 = dists[..4].iter().sum();
        let last: f64 = dists[dists.len() - 4..].iter().sum();
        assert!(first < last);
    }

    #[test]
    fn determinism_same_seed_same_partition() {
        let prm = params(10);
        let mut g1 = Gen::new(42);
        let mut g2 = Gen::new(42);
        let p1 = build(&mut g1, &prm).unwrap();
        let p2 = build(&mut g2, &prm).unwrap();
        assert_eq!(p1.cells.len(), p2.cells.len());
        for (a, b) in p1.cells.iter().zip(p2.cells.iter()) {
            assert_eq!(a.shape, b.shape);
            assert_eq!(a.water, b.water);
            assert_eq!(a.within_city, b.within_city);
        }
    }

    #[test]
    fn coast_carve_does_not_shift_later_stream() {
        let mut with_coast = Gen::new(555);
        let mut without = Gen::new(555);
        let mut prm = params(10);
        prm.coast = true;
        if build(&mut with_coast, &prm).is_err() {
            // Too much water for this seed; the stream comparison still holds.
        }
        prm.coast = false;
        let _ = build(&mut without, &prm);
        assert_eq!(with_coast.save(), without.save());
    }

    #[test]
    fn coastal_cells_get_landing_flags() {
        // Seeds vary in how much water they produce; find one that works.
        let mut prm = params(24);
        prm.coast = true;
        for seed in 1..40 {
            let mut gen = Gen::new(seed);
            let Ok(p) = build(&mut gen, &prm) else { continue };
            if p.has_coast {
                assert!(p.cells.iter().any(|c| c.landing));
                let landing_ok = p
                    .cells
                    .iter()
                    .enumerate()
                    .filter(|(_, c)| c.landing)
                    .all(|(i, _)| {
                        p.neighbours(i).iter().any(|&nb| p.cells[nb].water)
                    });
                assert!(landing_ok);
                return;
            }
        }
        panic!("no seed under 40 produced a coast");
    }

    #[test]
    fn citadel_is_urban() {
        let mut prm = params(20);
        prm.citadel = true;
        for seed in 1..20 {
            let mut gen = Gen::new(seed);
            if let Ok(p) = build(&mut gen, &prm) {
                let idx = p.citadel.unwrap();
                assert!(p.cells[idx].within_city);
                return;
            }
        }
        panic!("no seed under 20 produced a citadel");
    }

    #[test]
    fn neighbours_are_symmetric() {
        let mut gen = Gen::new(9);
        let p = build(&mut gen, &params(10)).unwrap();
        for i in 0..p.cells.len() {
            for nb in p.neighbours(i) {
                assert!(p.neighbours(nb).contains(&i));
            }
        }
    }
}
