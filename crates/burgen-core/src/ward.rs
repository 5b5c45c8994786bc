//! Ward assignment and ward geometry.
//!
//! Every cell receives exactly one ward once generation completes. Alley
//! cells are then clustered into ward groups that share one recursive block
//! subdivision; the other ward kinds synthesize their geometry per cell.

use std::collections::HashSet;

use crate::blocks::{self, Block};
use crate::district::District;
use crate::error::BuildError;
use crate::geom::{Point, Polygon};
use crate::partition::Partition;
use crate::planar::{EdgeKind, FaceId, HalfEdgeId};
use crate::random::{self, Gen};

/// Functional role of a cell.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Ward {
    Alleys,
    Castle,
    Cathedral,
    Market,
    Farm,
    Harbour,
    Park,
    Wilderness,
    Generic,
}

impl Ward {
    pub fn label(self) -> &'static str {
        match self {
            Ward::Alleys => "alleys",
            Ward::Castle => "castle",
            Ward::Cathedral => "cathedral",
            Ward::Market => "market",
            Ward::Farm => "farm",
            Ward::Harbour => "harbour",
            Ward::Park => "park",
            Ward::Wilderness => "wilderness",
            Ward::Generic => "generic",
        }
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct WardOptions {
    pub temple: bool,
    pub green: bool,
    pub shantytown: bool,
    pub hub: bool,
}

/// Assign a ward to every cell. Urban cells default to alleys; the notable
/// wards claim their cells first. Shantytown extends the city past the
/// walls before the defaults apply.
pub fn assign(gen: &mut Gen, partition: &mut Partition, harbour_cells: &[usize], opts: &WardOptions) {
    if opts.shantytown {
        let walled: Vec<usize> = (0..partition.cells.len())
            .filter(|&i| partition.cells[i].within_walls)
            .collect();
        let mut sprawl: Vec<usize> = Vec::new();
        for &i in &walled {
            for n in partition.neighbours(i) {
                let c = &partition.cells[n];
                if !c.water && !c.within_city && !sprawl.contains(&n) {
                    sprawl.push(n);
                }
            }
        }
        for i in sprawl {
            if gen.chance(0.6) {
                partition.cells[i].within_city = true;
            }
        }
    }

    if let Some(plaza) = partition.plaza {
        partition.cells[plaza].ward = Some(Ward::Market);
    }
    if let Some(citadel) = partition.citadel {
        partition.cells[citadel].ward = Some(Ward::Castle);
    }
    if opts.temple {
        let near_plaza = partition
            .plaza
            .map(|p| partition.neighbours(p))
            .unwrap_or_default()
            .into_iter()
            .find(|&n| partition.cells[n].within_city && partition.cells[n].ward.is_none());
        if let Some(i) = near_plaza {
            partition.cells[i].ward = Some(Ward::Cathedral);
        }
    }
    for &i in harbour_cells {
        partition.cells[i].ward = Some(Ward::Harbour);
    }

    if opts.green {
        let open: Vec<usize> = (0..partition.cells.len())
            .filter(|&i| {
                let c = &partition.cells[i];
                c.within_city && c.ward.is_none()
            })
            .collect();
        let parks = 1 + open.len() / 10;
        for _ in 0..parks {
            if open.is_empty() {
                break;
            }
            let i = open[gen.index(open.len())];
            if partition.cells[i].ward.is_none() {
                partition.cells[i].ward = Some(Ward::Park);
            }
        }
    }

    if opts.hub {
        let open: Vec<usize> = (0..partition.cells.len())
            .filter(|&i| partition.cells[i].within_city && partition.cells[i].ward.is_none())
            .collect();
        if !open.is_empty() {
            let i = open[gen.index(open.len())];
            partition.cells[i].ward = Some(Ward::Market);
        }
    }

    for i in 0..partition.cells.len() {
        let cell = &partition.cells[i];
        if cell.water || cell.ward.is_some() {
            continue;
        }
        let ward = if cell.within_city {
            Ward::Alleys
        } else if borders_city(partition, i) {
            if gen.chance(0.7) {
                Ward::Farm
            } else {
                Ward::Wilderness
            }
        } else {
            Ward::Wilderness
        };
        partition.cells[i].ward = Some(ward);
    }
}

fn borders_city(partition: &Partition, i: usize) -> bool {
    partition
        .neighbours(i)
        .into_iter()
        .any(|n| partition.cells[n].within_city)
}

/// First coastal alley cell, used as the docks district seed.
pub fn docks_seed(partition: &Partition) -> Option<usize> {
    (0..partition.cells.len()).find(|&i| {
        let c = &partition.cells[i];
        c.within_city && c.landing && c.ward == Some(Ward::Alleys)
    })
}

// ── Ward groups ───────────────────────────────────────────────────────────────

/// Contiguous alley cells of one district sharing a single subdivision.
#[derive(Debug, Clone)]
pub struct WardGroup {
    pub district: usize,
    pub cells: Vec<usize>,
    pub shape: Polygon,
    /// Buildable area after wall/canal/road clearances.
    pub available: Polygon,
    pub blocks: Vec<Block>,
}

const GROUP_FLOOD_ATTEMPTS: usize = 3;
const GEOMETRY_ATTEMPTS: usize = 3;

/// Cluster each district's alley cells into groups and synthesize their
/// blocks. `block_size` is the target block area in model units.
pub fn build_groups(
    gen: &mut Gen,
    partition: &Partition,
    districts: &[District],
    block_size: f64,
) -> Vec<WardGroup> {
    let mut groups = Vec::new();
    for (d, district) in districts.iter().enumerate() {
        let mut pool: Vec<usize> = district
            .cells
            .iter()
            .copied()
            .filter(|&i| partition.cells[i].ward == Some(Ward::Alleys))
            .collect();
        while !pool.is_empty() {
            let cells = flood_group(gen, partition, &mut pool);
            if let Some(group) = make_group(gen, partition, d, cells, block_size) {
                groups.push(group);
            }
        }
    }
    groups
}

/// Random flood-fill over the remaining pool. A fill that traps a hole is
/// re-rolled; the final fallback is the bare seed cell.
fn flood_group(gen: &mut Gen, partition: &Partition, pool: &mut Vec<usize>) -> Vec<usize> {
    let seed = pool[gen.index(pool.len())];
    for _ in 0..GROUP_FLOOD_ATTEMPTS {
        let mut cells = vec![seed];
        loop {
            if !gen.chance(0.5) {
                break;
            }
            let frontier: Vec<usize> = cells
                .iter()
                .flat_map(|&i| partition.neighbours(i))
                .filter(|n| pool.contains(n) && !cells.contains(n))
                .collect();
            if frontier.is_empty() {
                break;
            }
            cells.push(frontier[gen.index(frontier.len())]);
        }
        if !has_hole(partition, &cells) {
            pool.retain(|i| !cells.contains(i));
            return cells;
        }
    }
    pool.retain(|&i| i != seed);
    vec![seed]
}

/// A group has a hole when its outer ring is shorter than its boundary
/// half-edge count.
fn has_hole(partition: &Partition, cells: &[usize]) -> bool {
    let faces: HashSet<FaceId> = cells.iter().map(|&i| partition.cells[i].face).collect();
    let mut boundary = 0usize;
    for &f in &faces {
        for e in partition.graph.face_edges(f) {
            let internal = partition
                .graph
                .twin(e)
                .map(|t| faces.contains(&partition.graph.face_of(t)))
                .unwrap_or(false);
            if !internal {
                boundary += 1;
            }
        }
    }
    let faces: Vec<FaceId> = faces.into_iter().collect();
    match partition.graph.circumference(&faces) {
        Ok(ring) => ring.len() != boundary,
        Err(_) => true,
    }
}

fn make_group(
    gen: &mut Gen,
    partition: &Partition,
    district: usize,
    cells: Vec<usize>,
    block_size: f64,
) -> Option<WardGroup> {
    let faces: Vec<FaceId> = cells.iter().map(|&i| partition.cells[i].face).collect();
    let ring = partition.graph.circumference(&faces).ok()?;
    let shape = Polygon::new(
        ring.iter()
            .map(|&e| partition.graph.point(partition.graph.origin(e)))
            .collect(),
    );
    // Clearances can consume a sliver group entirely; such a group keeps
    // its raw outline rather than dropping its cells from the model.
    let available = {
        let inset = available_area(partition, &shape, &ring);
        if inset.len() >= 3 {
            inset
        } else {
            shape.clone()
        }
    };

    let blocks = random::retry(gen, GEOMETRY_ATTEMPTS, "ward geometry", |gen| {
        let blocks = blocks::subdivide(gen, &available, block_size, 0.3);
        if blocks.is_empty() {
            Err(BuildError::InvalidTopology("empty subdivision"))
        } else {
            Ok(blocks)
        }
    })
    .unwrap_or_else(|_| coarse_fallback(&available));

    Some(WardGroup { district, cells, shape, available, blocks })
}

/// When subdivision keeps failing the whole area becomes one block.
fn coarse_fallback(available: &Polygon) -> Vec<Block> {
    vec![Block {
        shape: available.clone(),
        church: false,
        lots: Vec::new(),
        buildings: blocks::fit_rect(available, 0.7).into_iter().collect(),
    }]
}

/// Inset buildable polygon: each boundary edge steps in by a clearance set
/// by its kind.
pub fn available_area(partition: &Partition, shape: &Polygon, ring: &[HalfEdgeId]) -> Polygon {
    let mut ccw = shape.clone();
    let flipped = ccw.signed_area() < 0.0;
    ccw.orient_ccw();
    let n = ring.len();
    let mut dist: Vec<f64> = (0..n)
        .map(|i| clearance(partition.graph.kind(ring[i])))
        .collect();
    if flipped {
        // Edge i of the reversed ring is edge n-2-i of the original.
        dist.reverse();
        dist.rotate_left(1);
    }
    ccw.shrink(&dist)
}

fn clearance(kind: Option<EdgeKind>) -> f64 {
    match kind {
        Some(EdgeKind::Wall) => 1.2,
        Some(EdgeKind::Canal) => 1.5,
        Some(EdgeKind::Road) => 0.8,
        Some(EdgeKind::Coast) => 1.0,
        Some(EdgeKind::Horizon) | None => 0.4,
    }
}

// ── Per-cell geometry ─────────────────────────────────────────────────────────

/// Geometry of a non-alley ward cell.
#[derive(Debug, Clone, Default)]
pub struct CellGeometry {
    pub buildings: Vec<Polygon>,
    pub trees: Vec<Point>,
}

/// Pattern-matched geometry synthesis for the solitary ward kinds. Alley
/// cells get their geometry through ward groups instead.
pub fn cell_geometry(gen: &mut Gen, partition: &Partition, cell: usize) -> CellGeometry {
    let shape = partition.cells[cell].shape.clone();
    match partition.cells[cell].ward {
        Some(Ward::Castle) | Some(Ward::Cathedral) => CellGeometry {
            buildings: blocks::fit_rect(&shape, 0.55).into_iter().collect(),
            trees: Vec::new(),
        },
        Some(Ward::Farm) => {
            let house = blocks::fit_rect(&shape, 0.2);
            CellGeometry { buildings: house.into_iter().collect(), trees: Vec::new() }
        }
        Some(Ward::Harbour) => {
            let sheds = blocks::grow_building(gen, &shape.buffer(0.6));
            CellGeometry { buildings: sheds.into_iter().collect(), trees: Vec::new() }
        }
        Some(Ward::Park) => CellGeometry {
            buildings: Vec::new(),
            trees: spawn_trees(gen, &shape, 0.08),
        },
        Some(Ward::Wilderness) => CellGeometry {
            buildings: Vec::new(),
            trees: spawn_trees(gen, &shape, 0.03),
        },
        _ => CellGeometry::default(),
    }
}

/// Deterministic point scatter inside a polygon; used for green wards.
pub fn spawn_trees(gen: &mut Gen, shape: &Polygon, density: f64) -> Vec<Point> {
    let count = (shape.area() * density) as usize;
    if count == 0 {
        return Vec::new();
    }
    let bounds = shape.bounds();
    let mut trees = Vec::with_capacity(count);
    let mut attempts = 0;
    while trees.len() < count && attempts < count * 10 {
        attempts += 1;
        let p = Point::new(
            bounds.x + gen.float() * bounds.w,
            bounds.y + gen.float() * bounds.h,
        );
        if shape.contains(p) {
            trees.push(p);
        }
    }
    trees
}
