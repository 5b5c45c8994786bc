//! Street network: topology-graph paths from every gate to the city centre,
//! spliced with country roads outside the wall and merged into smoothed
//! arteries.

use std::collections::HashSet;

use crate::error::{BuildError, Result};
use crate::geom::{Point, Polygon};
use crate::partition::Partition;
use crate::planar::{EdgeKind, FaceId, VertexId};
use crate::topology::Topology;

/// A merged, smoothed street. `vertices` is the underlying planar-graph
/// chain; `points` is the display geometry after corner-cut relaxation with
/// gate positions pinned.
#[derive(Debug, Clone)]
pub struct Artery {
    pub vertices: Vec<VertexId>,
    pub points: Vec<Point>,
}

#[derive(Debug, Default)]
pub struct StreetNetwork {
    pub arteries: Vec<Artery>,
    /// Cells turned into coastal harbour alleys because their gate had no
    /// land route out.
    pub harbour_cells: Vec<usize>,
}

/// Build the street network. `entries` are the gate (or entry landmark)
/// vertices; `pinned` vertices keep their exact position through smoothing.
pub fn build(
    partition: &mut Partition,
    entries: &[VertexId],
    center: VertexId,
    reserved: &[VertexId],
) -> Result<StreetNetwork> {
    if entries.is_empty() {
        return Ok(StreetNetwork::default());
    }

    let urban = partition.urban_faces();
    let mut inner = Topology::build(&partition.graph, &urban);
    inner.exclude_points(reserved);

    let outer_faces: Vec<FaceId> = partition
        .cells
        .iter()
        .filter(|c| !c.within_city && !c.water)
        .map(|c| c.face)
        .collect();
    let outer = Topology::build(&partition.graph, &outer_faces);

    let horizon = horizon_vertices(partition);

    let mut chains: Vec<Vec<VertexId>> = Vec::new();
    let mut network = StreetNetwork::default();
    let mut connected = 0usize;

    for &gate in entries {
        let street = match inner.build_path(gate, center) {
            Some(street) => street,
            None => {
                // A gate pinched off behind tagged or reserved edges can
                // still reach the centre through an interior neighbour.
                let detour = partition
                    .graph
                    .adjacent_vertices(gate)
                    .into_iter()
                    .find_map(|v| {
                        inner.build_path(v, center).filter(|p| !p.contains(&gate))
                    });
                match detour {
                    Some(mut street) => {
                        street.insert(0, gate);
                        street
                    }
                    // This gate simply stays unconnected.
                    None => continue,
                }
            }
        };
        connected += 1;

        // Country road: nearest reachable horizon vertex, spliced onto the
        // street at the first shared vertex (normally the gate itself).
        let road = nearest_outer_route(partition, &outer, &horizon, gate);
        match road {
            Some(road) => chains.push(splice(road, street)),
            None => {
                // No land route out of this gate; the outside cells become
                // harbour alleys instead of a road.
                for f in partition.graph.vertex_faces(gate) {
                    if let Some(c) = partition.cell_index(f) {
                        let cell = &partition.cells[c];
                        if !cell.within_city && !cell.water && cell.landing {
                            network.harbour_cells.push(c);
                        }
                    }
                }
                chains.push(street);
            }
        }
    }

    if connected == 0 {
        return Err(BuildError::NoPath);
    }

    let merged = merge_chains(chains);
    let pins: HashSet<VertexId> = entries.iter().copied().collect();
    for chain in merged {
        tag_road(partition, &chain);
        let points = smooth_chain(partition, &chain, &pins);
        network.arteries.push(Artery { vertices: chain, points });
    }
    Ok(network)
}

fn horizon_vertices(partition: &Partition) -> Vec<VertexId> {
    let mut out = Vec::new();
    for v in partition.graph.live_vertices() {
        let on_horizon = partition
            .graph
            .vertex(v)
            .out
            .iter()
            .any(|&e| partition.graph.he(e).alive && partition.graph.kind(e) == Some(EdgeKind::Horizon));
        if on_horizon {
            out.push(v);
        }
    }
    out
}

/// Route from the nearest reachable horizon vertex to the gate.
fn nearest_outer_route(
    partition: &Partition,
    outer: &Topology,
    horizon: &[VertexId],
    gate: VertexId,
) -> Option<Vec<VertexId>> {
    if !outer.contains(gate) {
        return None;
    }
    let gp = partition.graph.point(gate);
    let mut candidates: Vec<VertexId> = horizon
        .iter()
        .copied()
        .filter(|&v| outer.contains(v))
        .collect();
    candidates.sort_by(|&a, &b| {
        partition
            .graph
            .point(a)
            .distance(gp)
            .total_cmp(&partition.graph.point(b).distance(gp))
    });
    for v in candidates {
        if let Some(path) = outer.build_path(v, gate) {
            return Some(path);
        }
    }
    None
}

/// Join an incoming road and an outgoing street at their first shared
/// vertex, dropping whatever hangs past the splice point.
fn splice(road: Vec<VertexId>, street: Vec<VertexId>) -> Vec<VertexId> {
    let in_street: HashSet<VertexId> = street.iter().copied().collect();
    let mut out: Vec<VertexId> = Vec::new();
    for v in road {
        out.push(v);
        if in_street.contains(&v) {
            break;
        }
    }
    let start = out
        .last()
        .and_then(|j| street.iter().position(|v| v == j))
        .map_or(0, |i| i + 1);
    out.extend(street[start..].iter().copied());
    out
}

/// Stitch chains whose endpoints touch into single arteries.
fn merge_chains(mut chains: Vec<Vec<VertexId>>) -> Vec<Vec<VertexId>> {
    let mut merged = true;
    while merged {
        merged = false;
        'outer: for i in 0..chains.len() {
            for j in 0..chains.len() {
                if i == j {
                    continue;
                }
                if chains[i].last() == chains[j].first() {
                    let tail = chains.remove(j);
                    let i = if j < i { i - 1 } else { i };
                    chains[i].extend(tail.into_iter().skip(1));
                    merged = true;
                    break 'outer;
                }
            }
        }
    }
    chains
}

fn tag_road(partition: &mut Partition, chain: &[VertexId]) {
    if let Ok(edges) = partition.graph.vertices_to_chain(chain) {
        for e in edges {
            // Streets share vertices with walls at gates, but an edge that is
            // already a wall or coast keeps its kind.
            if partition.graph.kind(e).is_none() {
                partition.graph.set_kind(e, Some(EdgeKind::Road));
            }
        }
    }
}

/// Corner-cut relaxation with pinned vertices (gates) left in place.
fn smooth_chain(
    partition: &Partition,
    chain: &[VertexId],
    pins: &HashSet<VertexId>,
) -> Vec<Point> {
    let raw: Vec<Point> = chain.iter().map(|&v| partition.graph.point(v)).collect();
    if raw.len() < 3 {
        return raw;
    }
    let relaxed = Polygon::relax_chain(&raw, 0.5);
    chain
        .iter()
        .enumerate()
        .map(|(i, v)| if pins.contains(v) { raw[i] } else { relaxed[i] })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::partition::{self, PartitionParams};
    use crate::random::Gen;
    use crate::wall::CurtainWall;

    fn city_with_streets(seed: u64) -> (Partition, CurtainWall, StreetNetwork) {
        let mut gen = Gen::new(seed);
        let params = PartitionParams {
            n_patches: 16,
            plaza: true,
            coast: false,
            citadel: false,
            urban_castle: false,
        };
        let mut p = partition::build(&mut gen, &params).unwrap();
        let faces = p.walled_faces();
        let wall = CurtainWall::build(&mut gen, &mut p, true, &faces, &[], -1).unwrap();
        let center = nearest_vertex(&p, p.center);
        let non_gate: Vec<VertexId> = wall
            .vertices
            .iter()
            .copied()
            .filter(|v| !wall.gates.contains(v))
            .collect();
        let net = build(&mut p, &wall.gates.clone(), center, &non_gate).unwrap();
        (p, wall, net)
    }

    fn nearest_vertex(p: &Partition, pt: Point) -> VertexId {
        p.graph
            .live_vertices()
            .min_by(|&a, &b| {
                p.graph.point(a).distance(pt).total_cmp(&p.graph.point(b).distance(pt))
            })
            .unwrap()
    }

    #[test]
    fn arteries_exist_and_are_tagged() {
        let (p, _, net) = city_with_streets(1234);
        assert!(!net.arteries.is_empty());
        for artery in &net.arteries {
            assert!(artery.vertices.len() >= 2);
            for w in artery.vertices.windows(2) {
                let e = p.graph.edge_between(w[0], w[1]).expect("artery edge exists");
                assert!(matches!(
                    p.graph.kind(e),
                    Some(EdgeKind::Road) | Some(EdgeKind::Wall) | Some(EdgeKind::Coast)
                ));
            }
        }
    }

    #[test]
    fn arteries_touch_their_gates() {
        let (_, wall, net) = city_with_streets(1234);
        let on_arteries: HashSet<VertexId> = net
            .arteries
            .iter()
            .flat_map(|a| a.vertices.iter().copied())
            .collect();
        let reached = wall.gates.iter().filter(|g| on_arteries.contains(g)).count();
        assert!(reached > 0, "at least one gate must be connected");
    }

    #[test]
    fn gate_points_are_pinned_by_smoothing() {
        let (p, wall, net) = city_with_streets(77);
        for artery in &net.arteries {
            for (i, v) in artery.vertices.iter().enumerate() {
                if wall.gates.contains(v) {
                    assert_eq!(artery.points[i], p.graph.point(*v));
                }
            }
        }
    }

    #[test]
    fn splice_joins_at_first_shared_vertex() {
        let a = VertexId(1);
        let b = VertexId(2);
        let c = VertexId(3);
        let d = VertexId(4);
        let e = VertexId(5);
        let road = vec![a, b, c];
        let street = vec![c, d, e];
        assert_eq!(splice(road, street), vec![a, b, c, d, e]);
    }

    #[test]
    fn merge_chains_stitches_endpoints() {
        let v: Vec<VertexId> = (0..6).map(VertexId).collect();
        let chains = vec![
            vec![v[0], v[1], v[2]],
            vec![v[2], v[3]],
            vec![v[4], v[5]],
        ];
        let merged = merge_chains(chains);
        assert_eq!(merged.len(), 2);
        assert!(merged.contains(&vec![v[0], v[1], v[2], v[3]]));
    }

    #[test]
    fn no_entries_builds_empty_network() {
        let mut gen = Gen::new(5);
        let params = PartitionParams {
            n_patches: 10,
            plaza: false,
            coast: false,
            citadel: false,
            urban_castle: false,
        };
        let mut p = partition::build(&mut gen, &params).unwrap();
        let center = nearest_vertex(&p, p.center);
        let net = build(&mut p, &[], center, &[]).unwrap();
        assert!(net.arteries.is_empty());
    }
}
