//! District seeding and growth.
//!
//! Fixed seeds for the notable patches (centre, citadel, gates, bridges,
//! banks, parks, docks) are topped up with random seeds, then grown one
//! patch at a time until every urban patch belongs to exactly one district.

use std::cell::OnceCell;

use crate::error::{BuildError, Result};
use crate::geom::Point;
use crate::partition::Partition;
use crate::planar::{EdgeKind, FaceId, HalfEdgeId, VertexId};
use crate::random::Gen;
use crate::ward::Ward;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DistrictKind {
    Center,
    Castle,
    Docks,
    Bridge,
    Gate,
    Bank,
    Park,
    Sprawl,
    Regular,
}

impl DistrictKind {
    pub fn label(self) -> &'static str {
        match self {
            DistrictKind::Center => "center",
            DistrictKind::Castle => "castle",
            DistrictKind::Docks => "docks",
            DistrictKind::Bridge => "bridge",
            DistrictKind::Gate => "gate",
            DistrictKind::Bank => "bank",
            DistrictKind::Park => "park",
            DistrictKind::Sprawl => "sprawl",
            DistrictKind::Regular => "regular",
        }
    }
}

#[derive(Debug, Clone)]
pub struct District {
    pub kind: DistrictKind,
    /// Cell indices, seed first, in claim order.
    pub cells: Vec<usize>,
    pub boundary: Vec<HalfEdgeId>,
    equator: OnceCell<(Point, Point)>,
    ridge: OnceCell<(Point, Point)>,
}

impl District {
    fn new(kind: DistrictKind, seed: usize) -> Self {
        District {
            kind,
            cells: vec![seed],
            boundary: Vec::new(),
            equator: OnceCell::new(),
            ridge: OnceCell::new(),
        }
    }

    pub fn centroid(&self, partition: &Partition) -> Point {
        let mut c = Point::new(0.0, 0.0);
        for &i in &self.cells {
            c = c + partition.cells[i].shape.center();
        }
        c * (1.0 / self.cells.len() as f64)
    }

    /// Longest-extent line through the district, cached after first use.
    pub fn equator(&self, partition: &Partition) -> (Point, Point) {
        *self.equator.get_or_init(|| self.axis_line(partition, false))
    }

    /// Perpendicular counterpart of the equator.
    pub fn ridge(&self, partition: &Partition) -> (Point, Point) {
        *self.ridge.get_or_init(|| self.axis_line(partition, true))
    }

    fn axis_line(&self, partition: &Partition, perpendicular: bool) -> (Point, Point) {
        let c = self.centroid(partition);
        let mut bounds = partition.cells[self.cells[0]].shape.bounds();
        for &i in &self.cells[1..] {
            bounds = bounds.union(&partition.cells[i].shape.bounds());
        }
        let wide = bounds.w >= bounds.h;
        let mut axis = if wide { Point::new(1.0, 0.0) } else { Point::new(0.0, 1.0) };
        if perpendicular {
            axis = axis.perp();
        }
        let r = (bounds.w * bounds.w + bounds.h * bounds.h).sqrt() / 2.0;
        (c - axis * r, c + axis * r)
    }
}

/// Fixed seed inputs collected from the earlier stages.
#[derive(Debug, Default)]
pub struct SeedPoints {
    pub gates: Vec<VertexId>,
    pub bridges: Vec<Point>,
    pub banks: Vec<Point>,
    pub docks: Option<usize>,
}

pub fn build(gen: &mut Gen, partition: &mut Partition, seeds: &SeedPoints) -> Result<Vec<District>> {
    let urban: Vec<usize> = (0..partition.cells.len())
        .filter(|&i| partition.cells[i].within_city)
        .collect();
    if urban.is_empty() {
        return Err(BuildError::InvalidTopology("no urban cells to district"));
    }

    let mut districts: Vec<District> = Vec::new();
    let claim = |districts: &mut Vec<District>, partition: &mut Partition, kind, cell: usize| {
        if partition.cells[cell].district.is_some() {
            return;
        }
        partition.cells[cell].district = Some(districts.len());
        districts.push(District::new(kind, cell));
    };

    // Fixed seeds, most significant first so ties resolve the same way on
    // every run.
    let center_cell = partition
        .plaza
        .or_else(|| urban_cell_at_point(partition, partition.center))
        .unwrap_or(urban[0]);
    claim(&mut districts, partition, DistrictKind::Center, center_cell);
    if let Some(citadel) = partition.citadel {
        claim(&mut districts, partition, DistrictKind::Castle, citadel);
    }
    if let Some(docks) = seeds.docks {
        claim(&mut districts, partition, DistrictKind::Docks, docks);
    }
    for &g in &seeds.gates {
        if let Some(cell) = urban_cell_at_vertex(partition, g) {
            claim(&mut districts, partition, DistrictKind::Gate, cell);
        }
    }
    for &p in &seeds.bridges {
        if let Some(cell) = urban_cell_at_point(partition, p) {
            claim(&mut districts, partition, DistrictKind::Bridge, cell);
        }
    }
    for &p in &seeds.banks {
        if let Some(cell) = urban_cell_at_point(partition, p) {
            claim(&mut districts, partition, DistrictKind::Bank, cell);
        }
    }
    for &i in &urban {
        if partition.cells[i].ward == Some(Ward::Park) {
            claim(&mut districts, partition, DistrictKind::Park, i);
        }
    }

    // Top up with random seeds until sqrt(urban patch count) districts
    // exist. The rural ring and water cells never take a district, so they
    // do not count toward the target.
    let target = ((urban.len() as f64).sqrt().round() as usize).max(1);
    while districts.len() < target {
        let free: Vec<usize> = urban
            .iter()
            .copied()
            .filter(|&i| partition.cells[i].district.is_none())
            .collect();
        if free.is_empty() {
            break;
        }
        let cell = free[gen.index(free.len())];
        let kind = leftover_kind(partition, cell);
        claim(&mut districts, partition, kind, cell);
    }

    grow(gen, partition, &mut districts, &urban);

    for d in &mut districts {
        let faces: Vec<FaceId> = d.cells.iter().map(|&i| partition.cells[i].face).collect();
        d.boundary = partition.graph.circumference(&faces)?;
    }

    order_by_proximity(partition, &mut districts);
    Ok(districts)
}

fn leftover_kind(partition: &Partition, cell: usize) -> DistrictKind {
    if partition.cells[cell].within_walls {
        DistrictKind::Regular
    } else {
        DistrictKind::Sprawl
    }
}

fn urban_cell_at_vertex(partition: &Partition, v: VertexId) -> Option<usize> {
    partition
        .graph
        .vertex_faces(v)
        .into_iter()
        .filter_map(|f| partition.cell_index(f))
        .find(|&c| partition.cells[c].within_city)
}

fn urban_cell_at_point(partition: &Partition, p: Point) -> Option<usize> {
    (0..partition.cells.len())
        .find(|&c| partition.cells[c].within_city && partition.cells[c].shape.contains(p))
}

/// One claimed patch per grower per round. A fresh district is seeded only
/// once every frontier has emptied with patches still left over; a round
/// where the growers merely lost their acceptance draws is repeated.
fn grow(gen: &mut Gen, partition: &mut Partition, districts: &mut Vec<District>, urban: &[usize]) {
    let mut active: Vec<bool> = vec![true; districts.len()];
    loop {
        let remaining = urban
            .iter()
            .filter(|&&i| partition.cells[i].district.is_none())
            .count();
        if remaining == 0 {
            return;
        }

        let mut order: Vec<usize> = (0..districts.len()).collect();
        gen.shuffle(&mut order);

        let mut any_frontier = false;
        for d in order {
            if !active[d] {
                continue;
            }
            let eligible = eligible_neighbours(partition, &districts[d]);
            if eligible.is_empty() {
                active[d] = false;
                continue;
            }
            any_frontier = true;
            let pick = eligible[gen.index(eligible.len())];
            let p = acceptance(partition, &districts[d], pick);
            if gen.chance(p) {
                partition.cells[pick].district = Some(d);
                districts[d].cells.push(pick);
            }
        }

        if !any_frontier {
            let free: Vec<usize> = urban
                .iter()
                .copied()
                .filter(|&i| partition.cells[i].district.is_none())
                .collect();
            let cell = free[gen.index(free.len())];
            let kind = leftover_kind(partition, cell);
            partition.cells[cell].district = Some(districts.len());
            districts.push(District::new(kind, cell));
            active.push(true);
        }
    }
}

fn eligible_neighbours(partition: &Partition, district: &District) -> Vec<usize> {
    let mut out: Vec<usize> = Vec::new();
    for &i in &district.cells {
        for n in partition.neighbours(i) {
            let cell = &partition.cells[n];
            if !cell.within_city || cell.district.is_some() || out.contains(&n) {
                continue;
            }
            if admits(district.kind, cell.ward, cell.landing) {
                out.push(n);
            }
        }
    }
    out
}

/// Type-specific membership filters.
fn admits(kind: DistrictKind, ward: Option<Ward>, landing: bool) -> bool {
    match kind {
        DistrictKind::Docks => landing && ward == Some(Ward::Alleys),
        DistrictKind::Park => ward == Some(Ward::Park),
        _ => true,
    }
}

/// Edge-kind acceptance: open edges grow freely, roads slow growth a
/// little, walls and canals nearly block it.
fn acceptance(partition: &Partition, district: &District, cell: usize) -> f64 {
    let face = partition.cells[cell].face;
    let mut best: f64 = 0.0;
    for &i in &district.cells {
        for e in partition.graph.face_edges(partition.cells[i].face) {
            let across = partition.graph.twin(e).map(|t| partition.graph.face_of(t));
            if across != Some(face) {
                continue;
            }
            let p = match partition.graph.kind(e) {
                None => 1.0,
                Some(EdgeKind::Road) => 0.6,
                Some(EdgeKind::Coast) => 0.2,
                Some(EdgeKind::Wall) | Some(EdgeKind::Canal) => 0.05,
                Some(EdgeKind::Horizon) => 0.0,
            };
            best = best.max(p);
        }
    }
    best
}

/// Chain districts by nearest-centroid hops starting from the centre
/// district, then renumber cell back-references to the new order.
fn order_by_proximity(partition: &mut Partition, districts: &mut Vec<District>) {
    let Some(start) = districts.iter().position(|d| d.kind == DistrictKind::Center) else {
        return;
    };
    let n = districts.len();
    let centroids: Vec<Point> = districts.iter().map(|d| d.centroid(partition)).collect();

    let mut order = vec![start];
    let mut used = vec![false; n];
    used[start] = true;
    while order.len() < n {
        let last = centroids[*order.last().unwrap_or(&start)];
        let next = (0..n)
            .filter(|&i| !used[i])
            .min_by(|&a, &b| centroids[a].distance(last).total_cmp(&centroids[b].distance(last)));
        let Some(next) = next else { break };
        used[next] = true;
        order.push(next);
    }

    let mut remap = vec![0usize; n];
    for (new, &old) in order.iter().enumerate() {
        remap[old] = new;
    }
    let mut reordered: Vec<District> = Vec::with_capacity(n);
    for &old in &order {
        reordered.push(districts[old].clone());
    }
    *districts = reordered;
    for cell in &mut partition.cells {
        if let Some(d) = cell.district {
            cell.district = Some(remap[d]);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::partition::{self, PartitionParams};
    use crate::ward;

    fn districted(seed: u64, n: usize) -> (Partition, Vec<District>) {
        let mut gen = Gen::new(seed);
        let params = PartitionParams {
            n_patches: n,
            plaza: true,
            coast: false,
            citadel: false,
            urban_castle: false,
        };
        let mut p = partition::build(&mut gen, &params).unwrap();
        ward::assign(&mut gen, &mut p, &[], &ward::WardOptions::default());
        let districts = build(&mut gen, &mut p, &SeedPoints::default()).unwrap();
        (p, districts)
    }

    #[test]
    fn every_urban_cell_lands_in_exactly_one_district() {
        let (p, districts) = districted(1234, 18);
        let urban = p.cells.iter().filter(|c| c.within_city).count();
        let total: usize = districts.iter().map(|d| d.cells.len()).sum();
        assert_eq!(total, urban);
        for (i, c) in p.cells.iter().enumerate() {
            if c.within_city {
                let d = c.district.expect("urban cell must be districted");
                assert!(districts[d].cells.contains(&i));
            }
        }
    }

    #[test]
    fn plaza_district_comes_first() {
        let (p, districts) = districted(1234, 18);
        let plaza = p.plaza.expect("plaza requested");
        assert_eq!(p.cells[plaza].district, Some(0));
        assert_eq!(districts[0].kind, DistrictKind::Center);
    }

    #[test]
    fn district_count_tracks_the_urban_square_root() {
        for seed in [1, 7, 42] {
            let (p, districts) = districted(seed, 25);
            let urban = p.cells.iter().filter(|c| c.within_city).count();
            let target = ((urban as f64).sqrt().round() as usize).max(1);
            // With only the centre fixed-seeded, the top-up brings the count
            // to the target exactly; a genuine growth stall may add one.
            assert!(districts.len() >= target, "seed {seed}");
            assert!(districts.len() <= target + 1, "seed {seed}");
        }
    }

    #[test]
    fn boundaries_are_closed_cycles() {
        let (p, districts) = districted(42, 16);
        for d in &districts {
            let n = d.boundary.len();
            assert!(n >= 3);
            for i in 0..n {
                assert_eq!(
                    p.graph.dest(d.boundary[i]),
                    p.graph.origin(d.boundary[(i + 1) % n])
                );
            }
        }
    }

    #[test]
    fn equator_and_ridge_are_perpendicular() {
        let (p, districts) = districted(42, 16);
        let d = &districts[0];
        let (a1, a2) = d.equator(&p);
        let (b1, b2) = d.ridge(&p);
        let dot = (a2 - a1).norm().dot((b2 - b1).norm());
        assert!(dot.abs() < 1e-9);
    }
}
