use crate::core::geometry::Polygon;
use crate::types::{GeoTransform, SarMask, SarResult};
use ndarray::Array2;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Polygon extraction parameters
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct PolygonParams {
    /// Smallest polygon area kept, in map units squared
    pub min_area: f64,
    /// Buffer distance used to merge polygons touching at corners
    pub merge_buffer: f64,
}

impl Default for PolygonParams {
    fn default() -> Self {
        Self {
            min_area: 2025.0,
            merge_buffer: 0.1,
        }
    }
}

/// Vectorized outlier region
#[derive(Debug, Clone, PartialEq)]
pub struct CandidatePolygon {
    pub index: usize,
    pub polygon: Polygon,
    pub area: f64,
}

/// Pixel cell in raster order with its connected-component label
#[derive(Debug, Clone, Copy)]
struct LabelledCell {
    row: usize,
    col: usize,
    label: u32,
}

/// Directed boundary edge between two pixel corners, interior on its right
/// in (col, row) space
#[derive(Debug, Clone, Copy)]
struct BoundaryEdge {
    start: (i64, i64),
    end: (i64, i64),
    /// Local grid cell the edge belongs to
    owner: (usize, usize),
}

/// Converts an outlier mask into candidate polygons in map coordinates
pub struct PolygonExtractor {
    params: PolygonParams,
}

impl PolygonExtractor {
    pub fn new(params: PolygonParams) -> Self {
        Self { params }
    }

    pub fn params(&self) -> &PolygonParams {
        &self.params
    }

    /// Label, vectorize, filter by area and merge corner-touching regions
    pub fn extract(&self, mask: &SarMask, geo_transform: &GeoTransform) -> SarResult<Vec<CandidatePolygon>> {
        let (labels, count) = label_components(mask);
        log::debug!("Found {} connected outlier regions", count);
        if count == 0 {
            return Ok(Vec::new());
        }

        let mut components: Vec<Vec<LabelledCell>> = vec![Vec::new(); count];
        for ((row, col), &label) in labels.indexed_iter() {
            if label > 0 {
                components[label as usize - 1].push(LabelledCell { row, col, label });
            }
        }

        let traced = trace_all(&components, geo_transform);
        let survivors: Vec<(usize, Polygon)> = traced
            .into_iter()
            .enumerate()
            .filter_map(|(component, polygon)| polygon.map(|p| (component, p)))
            .filter(|(_, polygon)| polygon.area() >= self.params.min_area)
            .collect();
        log::debug!(
            "{} of {} regions reach the minimum area of {}",
            survivors.len(),
            count,
            self.params.min_area
        );

        let groups = group_within_distance(&survivors, 2.0 * self.params.merge_buffer);
        let tolerance = 1e-6 * geo_transform.pixel_area().sqrt().max(1.0);

        let mut merged: Vec<Polygon> = Vec::with_capacity(groups.len());
        for group in groups {
            if group.len() == 1 {
                merged.push(survivors[group[0]].1.clone());
                continue;
            }

            let cells: Vec<LabelledCell> = group
                .iter()
                .flat_map(|&member| components[survivors[member].0].iter().copied())
                .collect();
            match trace_exterior(&cells, geo_transform) {
                Some(union)
                    if group
                        .iter()
                        .all(|&member| union.within_distance(&survivors[member].1, tolerance)) =>
                {
                    merged.push(union)
                }
                _ => {
                    log::warn!("Could not merge {} touching regions, keeping them separate", group.len());
                    merged.extend(group.iter().map(|&member| survivors[member].1.clone()));
                }
            }
        }

        let candidates: Vec<CandidatePolygon> = merged
            .into_iter()
            .enumerate()
            .map(|(index, polygon)| CandidatePolygon {
                index,
                area: polygon.area(),
                polygon,
            })
            .collect();
        log::info!("Extracted {} candidate polygons", candidates.len());
        Ok(candidates)
    }
}

fn trace_all(components: &[Vec<LabelledCell>], geo_transform: &GeoTransform) -> Vec<Option<Polygon>> {
    #[cfg(feature = "parallel")]
    let traced: Vec<Option<Polygon>> = {
        use rayon::prelude::*;
        components
            .par_iter()
            .map(|cells| trace_exterior(cells, geo_transform))
            .collect()
    };

    #[cfg(not(feature = "parallel"))]
    let traced: Vec<Option<Polygon>> = components
        .iter()
        .map(|cells| trace_exterior(cells, geo_transform))
        .collect();

    traced
}

/// 4-connected component labelling (two-pass union-find)
///
/// Labels are 1..=count in raster order of each component's first pixel,
/// 0 is background.
pub fn label_components(mask: &SarMask) -> (Array2<u32>, usize) {
    let (height, width) = mask.dim();
    let mut labels = Array2::<u32>::zeros((height, width));
    let mut parent: Vec<u32> = vec![0];

    fn find(parent: &mut [u32], mut x: u32) -> u32 {
        while parent[x as usize] != x {
            parent[x as usize] = parent[parent[x as usize] as usize];
            x = parent[x as usize];
        }
        x
    }

    fn union(parent: &mut [u32], a: u32, b: u32) {
        let ra = find(parent, a);
        let rb = find(parent, b);
        if ra < rb {
            parent[rb as usize] = ra;
        } else if rb < ra {
            parent[ra as usize] = rb;
        }
    }

    for row in 0..height {
        for col in 0..width {
            if mask[[row, col]] == 0 {
                continue;
            }
            let left = if col > 0 { labels[[row, col - 1]] } else { 0 };
            let above = if row > 0 { labels[[row - 1, col]] } else { 0 };

            labels[[row, col]] = match (left, above) {
                (0, 0) => {
                    let label = parent.len() as u32;
                    parent.push(label);
                    label
                }
                (l, 0) => l,
                (0, a) => a,
                (l, a) => {
                    union(&mut parent, l, a);
                    l.min(a)
                }
            };
        }
    }

    // Resolve to dense labels in raster order
    let mut dense = vec![0u32; parent.len()];
    let mut count = 0u32;
    for label in labels.iter_mut() {
        if *label == 0 {
            continue;
        }
        let root = find(&mut parent, *label) as usize;
        if dense[root] == 0 {
            count += 1;
            dense[root] = count;
        }
        *label = dense[root];
    }

    (labels, count as usize)
}

/// Trace the exterior ring of a set of labelled cells and move it to map
/// coordinates
///
/// Cells with equal labels never connect through a shared corner. Cells
/// with different labels do, which is how corner-touching regions are
/// merged into a single ring. Interior holes are dropped.
fn trace_exterior(cells: &[LabelledCell], geo_transform: &GeoTransform) -> Option<Polygon> {
    let row0 = cells.iter().map(|c| c.row).min()?;
    let col0 = cells.iter().map(|c| c.col).min()?;
    let row1 = cells.iter().map(|c| c.row).max()?;
    let col1 = cells.iter().map(|c| c.col).max()?;

    // Local grid padded by one background cell on each side
    let mut grid = Array2::<u32>::zeros((row1 - row0 + 3, col1 - col0 + 3));
    for cell in cells {
        grid[[cell.row - row0 + 1, cell.col - col0 + 1]] = cell.label;
    }

    let edges = boundary_edges(&grid);
    let mut outgoing: HashMap<(i64, i64), Vec<usize>> = HashMap::new();
    for (idx, edge) in edges.iter().enumerate() {
        outgoing.entry(edge.start).or_default().push(idx);
    }

    let next_edge = |incoming: usize| -> Option<usize> {
        let edge = &edges[incoming];
        let candidates = outgoing.get(&edge.end)?;
        match candidates.as_slice() {
            [only] => Some(*only),
            [a, b] => {
                let (same, other) = if edges[*a].owner == edge.owner { (*a, *b) } else { (*b, *a) };
                let own_label = grid[edge.owner];
                if grid[edges[other].owner] == own_label {
                    Some(same)
                } else {
                    Some(other)
                }
            }
            _ => None,
        }
    };

    let mut used = vec![false; edges.len()];
    let mut best: Option<(f64, Vec<(i64, i64)>)> = None;
    for start in 0..edges.len() {
        if used[start] {
            continue;
        }
        let mut ring = Vec::new();
        let mut current = start;
        loop {
            used[current] = true;
            ring.push(edges[current].start);
            current = next_edge(current)?;
            if current == start {
                break;
            }
            if used[current] || ring.len() > edges.len() {
                log::debug!("Inconsistent boundary while tracing region");
                return None;
            }
        }

        let area = pixel_signed_area(&ring);
        if area > 0.0 && best.as_ref().map_or(true, |(best_area, _)| area > *best_area) {
            best = Some((area, ring));
        }
    }

    let (_, ring) = best?;
    let exterior = drop_collinear(&ring)
        .into_iter()
        .map(|(x, y)| {
            let col = x - 1 + col0 as i64;
            let row = y - 1 + row0 as i64;
            geo_transform.apply(col as f64, row as f64)
        })
        .collect();
    Polygon::new(exterior)
}

/// Directed edges between foreground cells and background, clockwise
/// around each cell in (col, row) space
fn boundary_edges(grid: &Array2<u32>) -> Vec<BoundaryEdge> {
    let (rows, cols) = grid.dim();
    let mut edges = Vec::new();
    for r in 1..rows - 1 {
        for c in 1..cols - 1 {
            if grid[[r, c]] == 0 {
                continue;
            }
            let (x, y) = (c as i64, r as i64);
            let owner = (r, c);
            if grid[[r - 1, c]] == 0 {
                edges.push(BoundaryEdge { start: (x, y), end: (x + 1, y), owner });
            }
            if grid[[r, c + 1]] == 0 {
                edges.push(BoundaryEdge { start: (x + 1, y), end: (x + 1, y + 1), owner });
            }
            if grid[[r + 1, c]] == 0 {
                edges.push(BoundaryEdge { start: (x + 1, y + 1), end: (x, y + 1), owner });
            }
            if grid[[r, c - 1]] == 0 {
                edges.push(BoundaryEdge { start: (x, y + 1), end: (x, y), owner });
            }
        }
    }
    edges
}

fn pixel_signed_area(ring: &[(i64, i64)]) -> f64 {
    let n = ring.len();
    let twice: i64 = (0..n)
        .map(|i| {
            let (x0, y0) = ring[i];
            let (x1, y1) = ring[(i + 1) % n];
            x0 * y1 - x1 * y0
        })
        .sum();
    twice as f64 / 2.0
}

/// Remove vertices in the middle of straight runs
fn drop_collinear(ring: &[(i64, i64)]) -> Vec<(i64, i64)> {
    let n = ring.len();
    (0..n)
        .filter(|&i| {
            let prev = ring[(i + n - 1) % n];
            let here = ring[i];
            let next = ring[(i + 1) % n];
            let cross = (here.0 - prev.0) * (next.1 - here.1) - (here.1 - prev.1) * (next.0 - here.0);
            cross != 0
        })
        .map(|i| ring[i])
        .collect()
}

/// Union-find grouping of polygons lying within `max_distance` of each other
///
/// Groups are returned in order of their first member, members in input order.
fn group_within_distance(polygons: &[(usize, Polygon)], max_distance: f64) -> Vec<Vec<usize>> {
    let n = polygons.len();
    let mut parent: Vec<usize> = (0..n).collect();

    fn find(parent: &mut [usize], mut x: usize) -> usize {
        while parent[x] != x {
            parent[x] = parent[parent[x]];
            x = parent[x];
        }
        x
    }

    let boxes: Vec<_> = polygons.iter().map(|(_, p)| p.bounding_box()).collect();
    let mut order: Vec<usize> = (0..n).collect();
    order.sort_by(|&a, &b| boxes[a].min_x.total_cmp(&boxes[b].min_x));

    // Sweep along x so only overlapping bounding-box slabs are compared
    for (k, &i) in order.iter().enumerate() {
        for &j in &order[k + 1..] {
            if boxes[j].min_x > boxes[i].max_x + max_distance {
                break;
            }
            if polygons[i].1.within_distance(&polygons[j].1, max_distance) {
                let (ri, rj) = (find(&mut parent, i), find(&mut parent, j));
                if ri != rj {
                    parent[ri.max(rj)] = ri.min(rj);
                }
            }
        }
    }

    let mut groups: Vec<Vec<usize>> = Vec::new();
    let mut group_of_root: HashMap<usize, usize> = HashMap::new();
    for i in 0..n {
        let root = find(&mut parent, i);
        let slot = *group_of_root.entry(root).or_insert_with(|| {
            groups.push(Vec::new());
            groups.len() - 1
        });
        groups[slot].push(i);
    }
    groups
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use ndarray::s;

    fn unit_transform() -> GeoTransform {
        GeoTransform::north_up(0.0, 0.0, 1.0)
    }

    #[test]
    fn test_labels_are_four_connected() {
        let mut mask = SarMask::zeros((5, 5));
        mask[[0, 0]] = 1;
        mask[[1, 1]] = 1; // diagonal only
        mask[[3, 1]] = 1;
        mask[[3, 2]] = 1;
        mask[[4, 2]] = 1;
        let (labels, count) = label_components(&mask);
        assert_eq!(count, 3);
        assert_eq!(labels[[0, 0]], 1);
        assert_eq!(labels[[1, 1]], 2);
        assert_eq!(labels[[4, 2]], labels[[3, 1]]);
    }

    #[test]
    fn test_u_shape_merges_under_union_find() {
        let mut mask = SarMask::zeros((4, 5));
        mask.slice_mut(s![0..3, 0]).fill(1);
        mask.slice_mut(s![0..3, 4]).fill(1);
        mask.slice_mut(s![3, ..]).fill(1);
        let (_, count) = label_components(&mask);
        assert_eq!(count, 1);
    }

    #[test]
    fn test_block_traces_to_rectangle() {
        let mut mask = SarMask::zeros((10, 10));
        mask.slice_mut(s![2..5, 3..8]).fill(1);
        let extractor = PolygonExtractor::new(PolygonParams { min_area: 1.0, merge_buffer: 0.1 });
        let polygons = extractor.extract(&mask, &unit_transform()).unwrap();
        assert_eq!(polygons.len(), 1);
        assert_eq!(polygons[0].polygon.exterior().len(), 4);
        assert_relative_eq!(polygons[0].area, 15.0);
    }

    #[test]
    fn test_holes_are_filled() {
        let mut mask = SarMask::zeros((7, 7));
        mask.slice_mut(s![1..6, 1..6]).fill(1);
        mask[[3, 3]] = 0;
        let extractor = PolygonExtractor::new(PolygonParams { min_area: 1.0, merge_buffer: 0.1 });
        let polygons = extractor.extract(&mask, &unit_transform()).unwrap();
        assert_eq!(polygons.len(), 1);
        assert_relative_eq!(polygons[0].area, 25.0);
    }

    #[test]
    fn test_self_touching_component_keeps_outer_ring() {
        // Ring of cells whose gap is closed only by a diagonal, leaving the
        // enclosed pocket connected to the outside through a corner
        let mut mask = SarMask::zeros((6, 6));
        mask.slice_mut(s![1, 1..4]).fill(1);
        mask.slice_mut(s![1..4, 1]).fill(1);
        mask.slice_mut(s![3, 1..3]).fill(1);
        mask[[2, 3]] = 1;
        mask[[4, 4]] = 1;
        mask[[3, 4]] = 1;
        mask[[2, 4]] = 1;
        let (_, count) = label_components(&mask);
        assert_eq!(count, 1);
        let extractor = PolygonExtractor::new(PolygonParams { min_area: 1.0, merge_buffer: 0.1 });
        let polygons = extractor.extract(&mask, &unit_transform()).unwrap();
        assert_eq!(polygons.len(), 1);
        assert!(polygons[0].area >= 10.0);
    }

    #[test]
    fn test_small_regions_dropped() {
        let mut mask = SarMask::zeros((20, 20));
        mask.slice_mut(s![2..4, 2..4]).fill(1);
        mask.slice_mut(s![10..17, 10..17]).fill(1);
        let extractor = PolygonExtractor::new(PolygonParams::default());
        let polygons = extractor.extract(&mask, &GeoTransform::north_up(0.0, 0.0, 40.0)).unwrap();
        // 2x2 pixels of 40 m = 6400 m2 passes; shrink the pixel to drop it
        assert_eq!(polygons.len(), 2);
        let polygons = extractor.extract(&mask, &GeoTransform::north_up(0.0, 0.0, 10.0)).unwrap();
        assert_eq!(polygons.len(), 1);
        assert_relative_eq!(polygons[0].area, 4900.0);
    }

    #[test]
    fn test_corner_touching_regions_merge() {
        let mut mask = SarMask::zeros((12, 12));
        mask.slice_mut(s![1..4, 1..4]).fill(1);
        mask.slice_mut(s![4..7, 4..7]).fill(1);
        let extractor = PolygonExtractor::new(PolygonParams { min_area: 1.0, merge_buffer: 0.1 });
        let polygons = extractor.extract(&mask, &unit_transform()).unwrap();
        assert_eq!(polygons.len(), 1);
        assert_eq!(polygons[0].index, 0);
        assert_relative_eq!(polygons[0].area, 18.0);
    }

    #[test]
    fn test_empty_mask() {
        let mask = SarMask::zeros((8, 8));
        let extractor = PolygonExtractor::new(PolygonParams::default());
        assert!(extractor.extract(&mask, &unit_transform()).unwrap().is_empty());
    }
}
