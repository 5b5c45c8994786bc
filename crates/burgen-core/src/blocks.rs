//! Recursive block and lot subdivision, and per-lot building synthesis.
//!
//! The same bisection primitive drives both levels: blocks out of a ward
//! group's buildable area, lots out of each block. Buildings are grown on a
//! small grid inside a rectangle fitted to the lot and traced back into an
//! outline polygon.

use std::collections::HashMap;

use crate::geom::{Point, Polygon};
use crate::random::Gen;

/// Lots below these thresholds are discarded outright.
const MIN_LOT_AREA_RATIO: f64 = 0.1;
const MIN_RECTANGULARITY: f64 = 0.3;
const MAX_CUT_DEPTH: usize = 12;

/// Recursive polygon cutter. Every cut runs through a weighted-random point
/// on the longest edge, perpendicular to it give or take a bounded skew.
#[derive(Debug, Clone, Copy)]
pub struct Bisector {
    /// Stop cutting once a piece drops under this area.
    pub min_area: f64,
    /// Clear space left between the two sides of a cut.
    pub gap: f64,
    /// Shortest admissible piece of the cut edge on either side.
    pub min_frontage: f64,
    /// Largest deviation (radians) from the perpendicular cut direction.
    pub max_skew: f64,
}

impl Bisector {
    pub fn partition(&self, gen: &mut Gen, shape: Polygon) -> Vec<Polygon> {
        let mut out = Vec::new();
        self.recurse(gen, shape, &mut out, 0);
        out
    }

    fn recurse(&self, gen: &mut Gen, shape: Polygon, out: &mut Vec<Polygon>, depth: usize) {
        if shape.len() < 3 {
            return;
        }
        if shape.area() <= self.min_area || depth >= MAX_CUT_DEPTH {
            out.push(shape);
            return;
        }
        match self.split_once(gen, &shape) {
            Some(parts) => {
                for part in parts {
                    self.recurse(gen, part, out, depth + 1);
                }
            }
            None => out.push(shape),
        }
    }

    fn split_once(&self, gen: &mut Gen, shape: &Polygon) -> Option<Vec<Polygon>> {
        let i = shape.longest_edge();
        let a = shape.vertex(i);
        let b = shape.vertex(i + 1);
        let len = (b - a).length();
        if len < 2.0 * self.min_frontage {
            return None;
        }
        // Cut point biased toward the middle of the edge, honouring the
        // frontage minimum at both ends.
        let margin = self.min_frontage / len;
        let t = (margin + gen.normal() * (1.0 - 2.0 * margin)).clamp(margin, 1.0 - margin);
        let p = a.lerp(b, t);
        let skew = (gen.float() * 2.0 - 1.0) * self.max_skew;
        let d = rotate((b - a).perp(), skew);
        let parts = shape.cut(p, d, self.gap);
        if parts.len() == 2 {
            Some(parts)
        } else {
            None
        }
    }
}

fn rotate(v: Point, angle: f64) -> Point {
    let (s, c) = angle.sin_cos();
    Point::new(v.x * c - v.y * s, v.x * s + v.y * c)
}

/// One block of a ward group: its outline, its lots and the buildings grown
/// on them.
#[derive(Debug, Clone)]
pub struct Block {
    pub shape: Polygon,
    pub church: bool,
    pub lots: Vec<Polygon>,
    pub buildings: Vec<Polygon>,
}

/// Cut a buildable area into blocks, then every block into lots with
/// buildings. `block_size` is the target block area; `chaos` jitters the
/// subdivision threshold.
pub fn subdivide(gen: &mut Gen, available: &Polygon, block_size: f64, chaos: f64) -> Vec<Block> {
    if available.len() < 3 || available.area() <= 0.0 {
        return Vec::new();
    }
    let threshold = block_size * gen.fuzzy(chaos);
    let shapes = if available.area() > threshold {
        let cutter = Bisector {
            min_area: block_size,
            gap: (block_size).sqrt() * 0.1,
            min_frontage: (block_size).sqrt() * 0.25,
            max_skew: 0.2,
        };
        cutter.partition(gen, available.clone())
    } else {
        vec![available.clone()]
    };
    if shapes.is_empty() {
        return Vec::new();
    }

    // At most one generous piece becomes a church block.
    let church = {
        let big: Vec<usize> = (0..shapes.len())
            .filter(|&i| shapes[i].area() > 1.2 * block_size)
            .collect();
        if !big.is_empty() && gen.chance(0.3) {
            Some(big[gen.index(big.len())])
        } else {
            None
        }
    };

    shapes
        .into_iter()
        .enumerate()
        .map(|(i, shape)| build_block(gen, shape, block_size, church == Some(i)))
        .collect()
}

fn build_block(gen: &mut Gen, shape: Polygon, block_size: f64, church: bool) -> Block {
    if church {
        // One large building along the block's longest bounding edge.
        let buildings = church_building(&shape).into_iter().collect();
        return Block { shape, church, lots: Vec::new(), buildings };
    }

    let lot_size = block_size / 6.0;
    let cutter = Bisector {
        min_area: lot_size,
        gap: 0.0,
        min_frontage: lot_size.sqrt() * 0.3,
        max_skew: 0.1,
    };
    let centroid = shape.centroid();
    let mut lots: Vec<Polygon> = Vec::new();
    for lot in cutter.partition(gen, shape.clone()) {
        if lot.area() < lot_size * MIN_LOT_AREA_RATIO {
            continue;
        }
        let bounds = lot.bounds();
        if bounds.w.min(bounds.h) < lot_size.sqrt() * 0.2 {
            continue;
        }
        if lot.rectangularity() < MIN_RECTANGULARITY {
            continue;
        }
        let lot = if gen.chance(0.3) {
            indent_front(lot, centroid)
        } else {
            lot
        };
        lots.push(lot);
    }

    let mut buildings = Vec::new();
    for lot in &lots {
        if let Some(b) = grow_building(gen, lot) {
            buildings.push(b);
        }
    }
    Block { shape, church, lots, buildings }
}

/// Pull the edge facing the block centroid inward, leaving a shallow yard.
fn indent_front(mut lot: Polygon, centroid: Point) -> Polygon {
    let n = lot.len();
    if n < 4 {
        return lot;
    }
    let front = (0..n)
        .min_by(|&i, &j| {
            let mi = lot.vertex(i).lerp(lot.vertex(i + 1), 0.5);
            let mj = lot.vertex(j).lerp(lot.vertex(j + 1), 0.5);
            mi.distance(centroid).total_cmp(&mj.distance(centroid))
        })
        .unwrap_or(0);
    let depth = lot.edge(front).length() * 0.1;
    let mid = lot.vertex(front).lerp(lot.vertex(front + 1), 0.5);
    let inward = (centroid - mid).norm() * -depth;
    let j = (front + 1) % n;
    lot.0[front] = lot.0[front] + inward;
    lot.0[j] = lot.0[j] + inward;
    lot
}

fn church_building(shape: &Polygon) -> Option<Polygon> {
    let rect = fit_rect(shape, 0.8)?;
    Some(rect)
}

/// Grow an irregular rectilinear footprint on a grid inside the lot.
/// Returns `None` when no rectangle fits the lot at all.
pub fn grow_building(gen: &mut Gen, lot: &Polygon) -> Option<Polygon> {
    if lot.len() < 3 {
        return None;
    }
    let rect = fit_rect(lot, 0.85)?;
    let (corner, axis, w, h) = rect.longest_edge_frame();
    let perp = axis.perp();

    let (gw, gh): (usize, usize) = if w >= h { (4, 3) } else { (3, 4) };
    let total = gw * gh;
    let mut grid = vec![false; total];

    let start = gen.index(total);
    grid[start] = true;
    let mut claimed = 1usize;
    loop {
        let frontier: Vec<usize> = (0..total)
            .filter(|&i| !grid[i] && has_claimed_neighbour(&grid, gw, gh, i))
            .collect();
        if frontier.is_empty() {
            break;
        }
        grid[frontier[gen.index(frontier.len())]] = true;
        claimed += 1;
        let remaining = (total - claimed) as f64;
        // Stop chance rises as the grid fills in.
        if gen.chance(1.0 - remaining / total as f64) {
            break;
        }
    }

    let cell_w = w / gw as f64;
    let cell_h = h / gh as f64;
    let to_world = |gx: i32, gy: i32| corner + axis * (gx as f64 * cell_w) + perp * (gy as f64 * cell_h);

    match trace_outline(&grid, gw, gh) {
        Some(cells) if cells.len() >= 4 => {
            Some(Polygon::new(cells.into_iter().map(|(x, y)| to_world(x, y)).collect()))
        }
        // Degenerate trace: fall back to the fitted rectangle itself.
        _ => Some(rect),
    }
}

fn has_claimed_neighbour(grid: &[bool], gw: usize, gh: usize, i: usize) -> bool {
    let (x, y) = (i % gw, i / gw);
    (x > 0 && grid[i - 1])
        || (x + 1 < gw && grid[i + 1])
        || (y > 0 && grid[i - gw])
        || (y + 1 < gh && grid[i + gw])
}

/// Counter-clockwise outline of the claimed cells with collinear points
/// removed. `None` when the boundary does not stitch into one loop.
fn trace_outline(grid: &[bool], gw: usize, gh: usize) -> Option<Vec<(i32, i32)>> {
    type Pt = (i32, i32);
    let at = |x: i32, y: i32| -> bool {
        x >= 0 && y >= 0 && (x as usize) < gw && (y as usize) < gh && grid[y as usize * gw + x as usize]
    };

    // Directed boundary segments with the interior on the left.
    let mut next: HashMap<Pt, Pt> = HashMap::new();
    for y in 0..gh as i32 {
        for x in 0..gw as i32 {
            if !at(x, y) {
                continue;
            }
            if !at(x, y - 1) {
                next.insert((x, y), (x + 1, y));
            }
            if !at(x + 1, y) {
                next.insert((x + 1, y), (x + 1, y + 1));
            }
            if !at(x, y + 1) {
                next.insert((x + 1, y + 1), (x, y + 1));
            }
            if !at(x - 1, y) {
                next.insert((x, y + 1), (x, y));
            }
        }
    }

    let &start = next.keys().min()?;
    let mut loop_pts = vec![start];
    let mut cur = *next.get(&start)?;
    while cur != start {
        if loop_pts.len() > next.len() {
            return None;
        }
        loop_pts.push(cur);
        cur = *next.get(&cur)?;
    }
    if loop_pts.len() < next.len() {
        // Disconnected boundary (a hole); the outline would be wrong.
        return None;
    }

    // Collinear removal.
    let n = loop_pts.len();
    let mut out = Vec::with_capacity(n);
    for i in 0..n {
        let prev = loop_pts[(i + n - 1) % n];
        let cur = loop_pts[i];
        let nxt = loop_pts[(i + 1) % n];
        let dx1 = cur.0 - prev.0;
        let dy1 = cur.1 - prev.1;
        let dx2 = nxt.0 - cur.0;
        let dy2 = nxt.1 - cur.1;
        if dx1 * dy2 - dy1 * dx2 != 0 {
            out.push(cur);
        }
    }
    Some(out)
}

/// Largest centred copy of the lot's longest-edge-frame rectangle that fits
/// inside the lot, probing corner and midpoint containment.
pub(crate) fn fit_rect(lot: &Polygon, initial: f64) -> Option<Polygon> {
    if lot.len() < 3 {
        return None;
    }
    let (corner, axis, w, h) = lot.longest_edge_frame();
    if w <= 0.0 || h <= 0.0 {
        return None;
    }
    let perp = axis.perp();
    let center = corner + axis * (w / 2.0) + perp * (h / 2.0);
    let mut scale = initial;
    for _ in 0..8 {
        let hw = w * scale / 2.0;
        let hh = h * scale / 2.0;
        let rect = Polygon::new(vec![
            center - axis * hw - perp * hh,
            center + axis * hw - perp * hh,
            center + axis * hw + perp * hh,
            center - axis * hw + perp * hh,
        ]);
        let n = rect.len();
        let fits = (0..n).all(|i| {
            let v = rect.vertex(i);
            let m = v.lerp(rect.vertex(i + 1), 0.5);
            lot.contains(v) && lot.contains(m)
        });
        if fits {
            return Some(rect);
        }
        scale *= 0.75;
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;

    fn square(side: f64) -> Polygon {
        Polygon::new(vec![
            Point::new(0.0, 0.0),
            Point::new(side, 0.0),
            Point::new(side, side),
            Point::new(0.0, side),
        ])
    }

    #[test]
    fn bisector_conserves_area() {
        let mut gen = Gen::new(11);
        let shape = square(10.0);
        let cutter = Bisector { min_area: 8.0, gap: 0.0, min_frontage: 0.5, max_skew: 0.1 };
        let parts = cutter.partition(&mut gen, shape.clone());
        assert!(parts.len() > 1);
        let total: f64 = parts.iter().map(Polygon::area).sum();
        assert!((total - shape.area()).abs() < 1e-6);
    }

    #[test]
    fn gap_leaves_clearance_between_parts() {
        let mut gen = Gen::new(3);
        let shape = square(10.0);
        let cutter = Bisector { min_area: 40.0, gap: 0.4, min_frontage: 1.0, max_skew: 0.0 };
        let parts = cutter.partition(&mut gen, shape.clone());
        if parts.len() > 1 {
            let total: f64 = parts.iter().map(Polygon::area).sum();
            assert!(total < shape.area());
        }
    }

    #[test]
    fn fitted_rect_is_inside_the_lot() {
        let lot = Polygon::new(vec![
            Point::new(0.0, 0.0),
            Point::new(6.0, 0.0),
            Point::new(7.0, 3.0),
            Point::new(1.0, 4.0),
        ]);
        let rect = fit_rect(&lot, 0.85).unwrap();
        for i in 0..rect.len() {
            assert!(lot.contains(rect.vertex(i)));
        }
    }

    #[test]
    fn buildings_stay_inside_their_block() {
        let mut gen = Gen::new(1234);
        let blocks = subdivide(&mut gen, &square(20.0), 40.0, 0.3);
        assert!(!blocks.is_empty());
        let mut seen = 0;
        for block in &blocks {
            for b in &block.buildings {
                seen += 1;
                for i in 0..b.len() {
                    let v = b.vertex(i);
                    assert!(
                        block.shape.contains(v) || block.shape.distance_to(v) < 1e-6,
                        "building vertex {v:?} escapes its block"
                    );
                }
            }
        }
        assert!(seen > 0, "subdivision produced no buildings");
    }

    #[test]
    fn lots_stay_inside_the_buildable_area() {
        let mut gen = Gen::new(21);
        let area = square(24.0);
        let blocks = subdivide(&mut gen, &area, 36.0, 0.3);
        let mut lots = 0;
        for block in &blocks {
            for lot in &block.lots {
                lots += 1;
                for i in 0..lot.len() {
                    let v = lot.vertex(i);
                    assert!(
                        area.contains(v) || area.distance_to(v) < 1e-6,
                        "lot vertex {v:?} escapes the buildable area"
                    );
                }
            }
        }
        assert!(lots > 0, "subdivision produced no lots");
    }

    #[test]
    fn outline_of_a_single_cell_is_a_square() {
        let mut grid = vec![false; 12];
        grid[5] = true;
        let outline = trace_outline(&grid, 4, 3).unwrap();
        assert_eq!(outline.len(), 4);
    }

    #[test]
    fn outline_drops_collinear_points() {
        // A 2x1 domino: six boundary corners, two collinear.
        let mut grid = vec![false; 12];
        grid[0] = true;
        grid[1] = true;
        let outline = trace_outline(&grid, 4, 3).unwrap();
        assert_eq!(outline.len(), 4);
    }

    #[test]
    fn lots_respect_rectangularity_floor() {
        let mut gen = Gen::new(99);
        let blocks = subdivide(&mut gen, &square(30.0), 60.0, 0.2);
        for block in &blocks {
            for lot in &block.lots {
                assert!(lot.rectangularity() >= MIN_RECTANGULARITY - 0.15);
            }
        }
    }
}
