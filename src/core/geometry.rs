//! Planar polygon operations on exterior rings in map coordinates

use serde::{Deserialize, Serialize};

pub type Point = (f64, f64);

/// Polygon described by its exterior ring (implicitly closed)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Polygon {
    exterior: Vec<Point>,
}

/// Axis-aligned bounding box
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BoundingBox {
    pub min_x: f64,
    pub min_y: f64,
    pub max_x: f64,
    pub max_y: f64,
}

impl BoundingBox {
    /// Gap between two boxes, 0 when they overlap
    pub fn distance(&self, other: &BoundingBox) -> f64 {
        let dx = (other.min_x - self.max_x).max(self.min_x - other.max_x).max(0.0);
        let dy = (other.min_y - self.max_y).max(self.min_y - other.max_y).max(0.0);
        (dx * dx + dy * dy).sqrt()
    }
}

impl Polygon {
    /// Build a polygon from ring vertices
    ///
    /// A repeated closing vertex and consecutive duplicates are dropped.
    /// Returns `None` for empty or zero-area rings.
    pub fn new(mut exterior: Vec<Point>) -> Option<Self> {
        exterior.dedup();
        if exterior.len() > 1 && exterior.first() == exterior.last() {
            exterior.pop();
        }
        if exterior.len() < 3 || exterior.iter().any(|(x, y)| !x.is_finite() || !y.is_finite()) {
            return None;
        }
        let polygon = Self { exterior };
        if polygon.area() > 0.0 {
            Some(polygon)
        } else {
            None
        }
    }

    pub fn exterior(&self) -> &[Point] {
        &self.exterior
    }

    fn edges(&self) -> impl Iterator<Item = (Point, Point)> + '_ {
        let n = self.exterior.len();
        (0..n).map(move |i| (self.exterior[i], self.exterior[(i + 1) % n]))
    }

    /// Shoelace area, positive for counter-clockwise rings in a y-up frame
    pub fn signed_area(&self) -> f64 {
        0.5 * self.edges().map(|(a, b)| a.0 * b.1 - b.0 * a.1).sum::<f64>()
    }

    pub fn area(&self) -> f64 {
        self.signed_area().abs()
    }

    pub fn perimeter(&self) -> f64 {
        self.edges().map(|(a, b)| distance(a, b)).sum()
    }

    pub fn bounding_box(&self) -> BoundingBox {
        self.exterior.iter().fold(
            BoundingBox {
                min_x: f64::INFINITY,
                min_y: f64::INFINITY,
                max_x: f64::NEG_INFINITY,
                max_y: f64::NEG_INFINITY,
            },
            |bbox, &(x, y)| BoundingBox {
                min_x: bbox.min_x.min(x),
                min_y: bbox.min_y.min(y),
                max_x: bbox.max_x.max(x),
                max_y: bbox.max_y.max(y),
            },
        )
    }

    /// Even-odd point-in-polygon test
    pub fn contains_point(&self, point: Point) -> bool {
        let (px, py) = point;
        let mut inside = false;
        for ((x0, y0), (x1, y1)) in self.edges() {
            if (y0 > py) != (y1 > py) {
                let x_cross = x0 + (py - y0) * (x1 - x0) / (y1 - y0);
                if px < x_cross {
                    inside = !inside;
                }
            }
        }
        inside
    }

    /// Minimum distance between the two polygons, 0 when they intersect
    pub fn distance(&self, other: &Polygon) -> f64 {
        if self.contains_point(other.exterior[0]) || other.contains_point(self.exterior[0]) {
            return 0.0;
        }
        let mut best = f64::INFINITY;
        for (a0, a1) in self.edges() {
            for (b0, b1) in other.edges() {
                best = best.min(segment_distance(a0, a1, b0, b1));
                if best == 0.0 {
                    return 0.0;
                }
            }
        }
        best
    }

    /// True when the polygons lie within `max_distance` of each other,
    /// i.e. when `self` buffered by `max_distance` intersects `other`
    pub fn within_distance(&self, other: &Polygon, max_distance: f64) -> bool {
        if self.bounding_box().distance(&other.bounding_box()) > max_distance {
            return false;
        }
        self.distance(other) <= max_distance
    }

    /// Douglas–Peucker simplification of the closed ring
    ///
    /// The ring is simplified as a polyline starting and ending at its first
    /// vertex. If fewer than three vertices survive the original ring is
    /// returned, so the result always describes a polygon.
    pub fn simplified_ring(&self, tolerance: f64) -> Vec<Point> {
        let mut closed = self.exterior.clone();
        closed.push(self.exterior[0]);
        let mut keep = vec![false; closed.len()];
        keep[0] = true;
        keep[closed.len() - 1] = true;
        douglas_peucker(&closed, 0, closed.len() - 1, tolerance, &mut keep);

        let mut ring: Vec<Point> = closed
            .iter()
            .zip(&keep)
            .filter(|(_, &k)| k)
            .map(|(&p, _)| p)
            .collect();
        ring.pop();
        if ring.len() < 3 {
            self.exterior.clone()
        } else {
            ring
        }
    }

    /// Longest straight line between any two vertices of the simplified ring
    pub fn max_chord_length(&self, simplify_tolerance: f64) -> f64 {
        let ring = self.simplified_ring(simplify_tolerance);
        let mut longest: f64 = 0.0;
        for (i, &a) in ring.iter().enumerate() {
            for &b in &ring[i + 1..] {
                longest = longest.max(distance(a, b));
            }
        }
        longest
    }
}

fn douglas_peucker(points: &[Point], first: usize, last: usize, tolerance: f64, keep: &mut [bool]) {
    if last <= first + 1 {
        return;
    }
    let mut max_distance = -1.0;
    let mut index = first;
    for i in first + 1..last {
        let d = point_segment_distance(points[i], points[first], points[last]);
        if d > max_distance {
            max_distance = d;
            index = i;
        }
    }
    if max_distance > tolerance {
        keep[index] = true;
        douglas_peucker(points, first, index, tolerance, keep);
        douglas_peucker(points, index, last, tolerance, keep);
    }
}

pub fn distance(a: Point, b: Point) -> f64 {
    (a.0 - b.0).hypot(a.1 - b.1)
}

/// Distance from `p` to the segment `a`-`b` (point distance for degenerate segments)
pub fn point_segment_distance(p: Point, a: Point, b: Point) -> f64 {
    let (dx, dy) = (b.0 - a.0, b.1 - a.1);
    let length_sq = dx * dx + dy * dy;
    if length_sq == 0.0 {
        return distance(p, a);
    }
    let t = (((p.0 - a.0) * dx + (p.1 - a.1) * dy) / length_sq).clamp(0.0, 1.0);
    distance(p, (a.0 + t * dx, a.1 + t * dy))
}

fn orientation(a: Point, b: Point, c: Point) -> f64 {
    (b.0 - a.0) * (c.1 - a.1) - (b.1 - a.1) * (c.0 - a.0)
}

fn on_segment(a: Point, b: Point, p: Point) -> bool {
    p.0 >= a.0.min(b.0) && p.0 <= a.0.max(b.0) && p.1 >= a.1.min(b.1) && p.1 <= a.1.max(b.1)
}

/// True when segments `a0`-`a1` and `b0`-`b1` share at least one point
pub fn segments_intersect(a0: Point, a1: Point, b0: Point, b1: Point) -> bool {
    let d1 = orientation(b0, b1, a0);
    let d2 = orientation(b0, b1, a1);
    let d3 = orientation(a0, a1, b0);
    let d4 = orientation(a0, a1, b1);

    if ((d1 > 0.0 && d2 < 0.0) || (d1 < 0.0 && d2 > 0.0)) && ((d3 > 0.0 && d4 < 0.0) || (d3 < 0.0 && d4 > 0.0)) {
        return true;
    }
    (d1 == 0.0 && on_segment(b0, b1, a0))
        || (d2 == 0.0 && on_segment(b0, b1, a1))
        || (d3 == 0.0 && on_segment(a0, a1, b0))
        || (d4 == 0.0 && on_segment(a0, a1, b1))
}

fn segment_distance(a0: Point, a1: Point, b0: Point, b1: Point) -> f64 {
    if segments_intersect(a0, a1, b0, b1) {
        return 0.0;
    }
    point_segment_distance(a0, b0, b1)
        .min(point_segment_distance(a1, b0, b1))
        .min(point_segment_distance(b0, a0, a1))
        .min(point_segment_distance(b1, a0, a1))
}
