//! 2D geometric primitives for the layout pipeline.
//! All coordinate math uses f64.

use std::ops::{Add, Mul, Neg, Sub};

const EPS: f64 = 1e-9;

// ── Point ─────────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct Point {
    pub x: f64,
    pub y: f64,
}

impl Point {
    pub fn new(x: f64, y: f64) -> Self {
        Self { x, y }
    }

    pub fn dot(self, o: Point) -> f64 {
        self.x * o.x + self.y * o.y
    }

    /// 2D cross product (z component).
    pub fn cross(self, o: Point) -> f64 {
        self.x * o.y - self.y * o.x
    }

    pub fn length(self) -> f64 {
        self.x.hypot(self.y)
    }

    pub fn distance(self, o: Point) -> f64 {
        (self - o).length()
    }

    /// Unit vector in the same direction; zero vectors are returned unchanged.
    pub fn norm(self) -> Point {
        let len = self.length();
        if len < EPS {
            self
        } else {
            Point::new(self.x / len, self.y / len)
        }
    }

    pub fn scale(self, f: f64) -> Point {
        Point::new(self.x * f, self.y * f)
    }

    pub fn lerp(self, o: Point, t: f64) -> Point {
        Point::new(self.x + (o.x - self.x) * t, self.y + (o.y - self.y) * t)
    }

    /// Perpendicular (counter-clockwise rotation by 90°).
    pub fn perp(self) -> Point {
        Point::new(-self.y, self.x)
    }

    pub fn atan(self) -> f64 {
        self.y.atan2(self.x)
    }
}

impl Add for Point {
    type Output = Point;
    fn add(self, o: Point) -> Point {
        Point::new(self.x + o.x, self.y + o.y)
    }
}

impl Sub for Point {
    type Output = Point;
    fn sub(self, o: Point) -> Point {
        Point::new(self.x - o.x, self.y - o.y)
    }
}

impl Mul<f64> for Point {
    type Output = Point;
    fn mul(self, f: f64) -> Point {
        self.scale(f)
    }
}

impl Neg for Point {
    type Output = Point;
    fn neg(self) -> Point {
        Point::new(-self.x, -self.y)
    }
}

// ── Rect ──────────────────────────────────────────────────────────────────────

/// Axis-aligned bounding rectangle.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Rect {
    pub x: f64,
    pub y: f64,
    pub w: f64,
    pub h: f64,
}

impl Rect {
    pub fn new(x: f64, y: f64, w: f64, h: f64) -> Self {
        Self { x, y, w, h }
    }

    pub fn center(&self) -> Point {
        Point::new(self.x + self.w / 2.0, self.y + self.h / 2.0)
    }

    pub fn area(&self) -> f64 {
        self.w * self.h
    }

    pub fn contains(&self, p: Point) -> bool {
        p.x >= self.x && p.x <= self.x + self.w && p.y >= self.y && p.y <= self.y + self.h
    }

    /// Smallest rect covering both.
    pub fn union(&self, o: &Rect) -> Rect {
        let x = self.x.min(o.x);
        let y = self.y.min(o.y);
        let x2 = (self.x + self.w).max(o.x + o.w);
        let y2 = (self.y + self.h).max(o.y + o.h);
        Rect::new(x, y, x2 - x, y2 - y)
    }
}

// ── Segment / line helpers ────────────────────────────────────────────────────

/// Intersect lines `p + t·dp` and `q + u·dq`. Returns `(t, u)`, or `None`
/// for (near-)parallel lines.
pub fn intersect_lines(p: Point, dp: Point, q: Point, dq: Point) -> Option<(f64, f64)> {
    let denom = dp.cross(dq);
    if denom.abs() < EPS {
        return None;
    }
    let d = q - p;
    let t = d.cross(dq) / denom;
    let u = d.cross(dp) / denom;
    Some((t, u))
}

/// True when segments `a1-a2` and `b1-b2` properly intersect (interiors cross).
pub fn segments_cross(a1: Point, a2: Point, b1: Point, b2: Point) -> bool {
    match intersect_lines(a1, a2 - a1, b1, b2 - b1) {
        Some((t, u)) => t > EPS && t < 1.0 - EPS && u > EPS && u < 1.0 - EPS,
        None => false,
    }
}

/// Distance from `p` to the segment `a-b`.
pub fn segment_distance(p: Point, a: Point, b: Point) -> f64 {
    let ab = b - a;
    let len2 = ab.dot(ab);
    if len2 < EPS {
        return p.distance(a);
    }
    let t = ((p - a).dot(ab) / len2).clamp(0.0, 1.0);
    p.distance(a + ab * t)
}

// ── Polygon ───────────────────────────────────────────────────────────────────

/// A simple polygon as an ordered vertex ring (no explicit closing vertex).
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Polygon(pub Vec<Point>);

impl Polygon {
    pub fn new(verts: Vec<Point>) -> Self {
        Self(verts)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn vertex(&self, i: usize) -> Point {
        self.0[i % self.0.len()]
    }

    /// Edge vector leaving vertex `i`.
    pub fn edge(&self, i: usize) -> Point {
        self.vertex(i + 1) - self.vertex(i)
    }

    /// Shoelace signed area; positive for counter-clockwise rings.
    pub fn signed_area(&self) -> f64 {
        let n = self.0.len();
        if n < 3 {
            return 0.0;
        }
        let mut sum = 0.0;
        for i in 0..n {
            sum += self.0[i].cross(self.0[(i + 1) % n]);
        }
        sum / 2.0
    }

    pub fn area(&self) -> f64 {
        self.signed_area().abs()
    }

    pub fn perimeter(&self) -> f64 {
        let n = self.0.len();
        (0..n).map(|i| self.0[i].distance(self.0[(i + 1) % n])).sum()
    }

    /// Vertex mean. Cheap and stable; used where the exact centroid does not
    /// matter (weights, seeds).
    pub fn center(&self) -> Point {
        let n = self.0.len().max(1) as f64;
        let sum = self.0.iter().fold(Point::default(), |acc, &p| acc + p);
        sum.scale(1.0 / n)
    }

    /// Area-weighted centroid, falling back to the vertex mean for degenerate
    /// rings.
    pub fn centroid(&self) -> Point {
        let a = self.signed_area();
        if a.abs() < EPS {
            return self.center();
        }
        let n = self.0.len();
        let mut cx = 0.0;
        let mut cy = 0.0;
        for i in 0..n {
            let p = self.0[i];
            let q = self.0[(i + 1) % n];
            let w = p.cross(q);
            cx += (p.x + q.x) * w;
            cy += (p.y + q.y) * w;
        }
        Point::new(cx / (6.0 * a), cy / (6.0 * a))
    }

    /// Ray-cast point containment.
    pub fn contains(&self, p: Point) -> bool {
        let n = self.0.len();
        let mut inside = false;
        let mut j = n.wrapping_sub(1);
        for i in 0..n {
            let a = self.0[i];
            let b = self.0[j];
            if (a.y > p.y) != (b.y > p.y)
                && p.x < (b.x - a.x) * (p.y - a.y) / (b.y - a.y) + a.x
            {
                inside = !inside;
            }
            j = i;
        }
        inside
    }

    pub fn bounds(&self) -> Rect {
        let mut min = Point::new(f64::INFINITY, f64::INFINITY);
        let mut max = Point::new(f64::NEG_INFINITY, f64::NEG_INFINITY);
        for p in &self.0 {
            min.x = min.x.min(p.x);
            min.y = min.y.min(p.y);
            max.x = max.x.max(p.x);
            max.y = max.y.max(p.y);
        }
        Rect::new(min.x, min.y, max.x - min.x, max.y - min.y)
    }

    /// Index of the longest edge.
    pub fn longest_edge(&self) -> usize {
        let n = self.0.len();
        (0..n)
            .max_by(|&a, &b| self.edge(a).length().total_cmp(&self.edge(b).length()))
            .unwrap_or(0)
    }

    /// Isoperimetric quotient in (0, 1]; 1 is a circle.
    pub fn compactness(&self) -> f64 {
        let p = self.perimeter();
        if p < EPS {
            return 0.0;
        }
        4.0 * std::f64::consts::PI * self.area() / (p * p)
    }

    /// Ensure counter-clockwise winding.
    pub fn orient_ccw(&mut self) {
        if self.signed_area() < 0.0 {
            self.0.reverse();
        }
    }

    /// Drop vertices that are collinear with their neighbours.
    pub fn dedup_collinear(&mut self, eps: f64) {
        if self.0.len() < 4 {
            return;
        }
        let src = std::mem::take(&mut self.0);
        let n = src.len();
        for i in 0..n {
            let prev = src[(i + n - 1) % n];
            let cur = src[i];
            let next = src[(i + 1) % n];
            if (cur - prev).cross(next - cur).abs() > eps {
                self.0.push(cur);
            }
        }
        if self.0.len() < 3 {
            self.0 = src;
        }
    }

    /// Replacement position for vertex `i` pulled toward its neighbours:
    /// `f = 0` leaves it alone, `f = 1` is the neighbour midpoint.
    pub fn smoothed_vertex(&self, i: usize, f: f64) -> Point {
        let n = self.0.len();
        let prev = self.0[(i + n - 1) % n];
        let next = self.0[(i + 1) % n];
        let mid = prev.lerp(next, 0.5);
        self.0[i].lerp(mid, f)
    }

    /// Corner-cut relaxation of an *open* chain: interior vertices move toward
    /// their neighbour midpoint, endpoints stay pinned.
    pub fn relax_chain(chain: &[Point], f: f64) -> Vec<Point> {
        if chain.len() < 3 {
            return chain.to_vec();
        }
        let mut out = Vec::with_capacity(chain.len());
        out.push(chain[0]);
        for i in 1..chain.len() - 1 {
            let mid = chain[i - 1].lerp(chain[i + 1], 0.5);
            out.push(chain[i].lerp(mid, f));
        }
        out.push(chain[chain.len() - 1]);
        out
    }

    /// Inset every edge by its own clearance. `dist[i]` applies to the edge
    /// leaving vertex `i`; the ring must be counter-clockwise. Edges with zero
    /// clearance stay put. Returns an empty polygon when the inset collapses.
    pub fn shrink(&self, dist: &[f64]) -> Polygon {
        let n = self.0.len();
        debug_assert_eq!(n, dist.len());
        if n < 3 {
            return Polygon::default();
        }
        let mut out = Vec::with_capacity(n);
        for i in 0..n {
            let j = (i + n - 1) % n;
            // Offset lines of the edges meeting at vertex i.
            let (pj, dj) = self.offset_edge(j, dist[j]);
            let (pi, di) = self.offset_edge(i, dist[i]);
            let v = match intersect_lines(pj, dj, pi, di) {
                Some((t, _)) => pj + dj * t,
                // Parallel neighbours: plain normal offset.
                None => pi,
            };
            out.push(v);
        }
        let poly = Polygon::new(out);
        // A collapsed inset flips orientation or loses all area. An over-inset
        // symmetric ring inverts twice and comes back counter-clockwise, so
        // the area sign alone is not enough: an inset edge running against
        // its source edge marks that inversion.
        if poly.signed_area() < EPS {
            return Polygon::default();
        }
        for i in 0..n {
            if self.edge(i).dot(poly.edge(i)) < 0.0 {
                return Polygon::default();
            }
        }
        poly
    }

    /// Uniform inset.
    pub fn buffer(&self, d: f64) -> Polygon {
        self.shrink(&vec![d; self.0.len()])
    }

    fn offset_edge(&self, i: usize, d: f64) -> (Point, Point) {
        let a = self.vertex(i);
        let dir = self.edge(i);
        // Interior of a CCW ring lies to the left of each directed edge.
        let inward = dir.perp().norm();
        (a + inward * d, dir)
    }

    /// Split by the infinite line through `p` with direction `d`. Exactly two
    /// proper edge crossings produce two parts; anything else returns the
    /// polygon unchanged. `gap` pulls both parts back from the cut line by
    /// `gap / 2`.
    pub fn cut(&self, p: Point, d: Point, gap: f64) -> Vec<Polygon> {
        let n = self.0.len();
        if n < 3 {
            return vec![self.clone()];
        }
        // Edge crossings with the cut line.
        let mut crossings: Vec<(usize, f64, Point)> = Vec::new();
        for i in 0..n {
            let a = self.0[i];
            let b = self.0[(i + 1) % n];
            if let Some((t, u)) = intersect_lines(p, d, a, b - a) {
                if u > EPS && u <= 1.0 - EPS {
                    crossings.push((i, t, a + (b - a) * u));
                }
            }
        }
        if crossings.len() != 2 {
            return vec![self.clone()];
        }
        let (i1, _, x1) = crossings[0];
        let (i2, _, x2) = crossings[1];

        let mut side_a = vec![x1];
        let mut k = (i1 + 1) % n;
        while k != (i2 + 1) % n {
            side_a.push(self.0[k]);
            k = (k + 1) % n;
        }
        side_a.push(x2);

        let mut side_b = vec![x2];
        let mut k = (i2 + 1) % n;
        while k != (i1 + 1) % n {
            side_b.push(self.0[k]);
            k = (k + 1) % n;
        }
        side_b.push(x1);

        let mut parts = vec![Polygon::new(side_a), Polygon::new(side_b)];
        if gap > 0.0 {
            let normal = d.perp().norm();
            for part in &mut parts {
                let c = part.center();
                let sign = if (c - p).dot(normal) >= 0.0 { 1.0 } else { -1.0 };
                let shift = normal * (sign * gap / 2.0);
                let last = part.0.len() - 1;
                part.0[0] = part.0[0] + shift;
                part.0[last] = part.0[last] + shift;
            }
        }
        parts.retain(|poly| poly.area() > EPS);
        if parts.len() == 2 {
            parts
        } else {
            vec![self.clone()]
        }
    }

    /// Ratio of the polygon's area to the area of its bounding rectangle in
    /// the frame of its longest edge. 1.0 for an axis-true rectangle.
    pub fn rectangularity(&self) -> f64 {
        if self.0.len() < 3 {
            return 0.0;
        }
        let axis = self.edge(self.longest_edge()).norm();
        if axis.length() < EPS {
            return 0.0;
        }
        let perp = axis.perp();
        let mut min_u = f64::INFINITY;
        let mut max_u = f64::NEG_INFINITY;
        let mut min_v = f64::INFINITY;
        let mut max_v = f64::NEG_INFINITY;
        for &pt in &self.0 {
            let u = pt.dot(axis);
            let v = pt.dot(perp);
            min_u = min_u.min(u);
            max_u = max_u.max(u);
            min_v = min_v.min(v);
            max_v = max_v.max(v);
        }
        let rect_area = (max_u - min_u) * (max_v - min_v);
        if rect_area < EPS {
            0.0
        } else {
            self.area() / rect_area
        }
    }

    /// Oriented frame of the longest edge: (corner, unit axis, width, height).
    /// The corner is the minimum-coordinate corner in that frame.
    pub fn longest_edge_frame(&self) -> (Point, Point, f64, f64) {
        let axis = self.edge(self.longest_edge()).norm();
        let axis = if axis.length() < EPS { Point::new(1.0, 0.0) } else { axis };
        let perp = axis.perp();
        let mut min_u = f64::INFINITY;
        let mut max_u = f64::NEG_INFINITY;
        let mut min_v = f64::INFINITY;
        let mut max_v = f64::NEG_INFINITY;
        for &pt in &self.0 {
            let u = pt.dot(axis);
            let v = pt.dot(perp);
            min_u = min_u.min(u);
            max_u = max_u.max(u);
            min_v = min_v.min(v);
            max_v = max_v.max(v);
        }
        let corner = axis * min_u + perp * min_v;
        (corner, axis, max_u - min_u, max_v - min_v)
    }

    /// Shortest distance from `p` to the polygon outline.
    pub fn distance_to(&self, p: Point) -> f64 {
        let n = self.0.len();
        (0..n)
            .map(|i| segment_distance(p, self.0[i], self.0[(i + 1) % n]))
            .fold(f64::INFINITY, f64::min)
    }
}
