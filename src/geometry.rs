//! Geometry values produced by the extraction.
//!
//! Rings are stored as `geo` line strings with `x` being the longitude and
//! `y` the latitude, in degrees. Every polygon carries a bounding box which
//! has to be recomputed explicitly after its ring changed.

use geo::{BoundingRect, Coord, LineString, Rect};

/// A coordinate in degrees.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct Point {
    pub lat: f64,
    pub lon: f64,
}

impl Point {
    pub fn new(lat: f64, lon: f64) -> Self {
        Self { lat, lon }
    }

    /// Snaps the point to the canonical 32 bit coordinate grid.
    pub fn snapped(self) -> Self {
        Self {
            lat: snap_lat(self.lat),
            lon: snap_lon(self.lon),
        }
    }
}

impl From<Point> for Coord<f64> {
    fn from(p: Point) -> Self {
        Coord { x: p.lon, y: p.lat }
    }
}

impl From<Coord<f64>> for Point {
    fn from(c: Coord<f64>) -> Self {
        Point::new(c.y, c.x)
    }
}

const GRID_STEPS: f64 = u32::MAX as f64;

fn snap(value: f64, min: f64, max: f64) -> f64 {
    let value = value.clamp(min, max);
    let step = ((value - min) / (max - min) * GRID_STEPS).round();
    min + step / GRID_STEPS * (max - min)
}

/// Quantizes a latitude to 2^32 - 1 steps over [-90, 90].
pub fn snap_lat(lat: f64) -> f64 {
    snap(lat, -90.0, 90.0)
}

/// Quantizes a longitude to 2^32 - 1 steps over [-180, 180].
pub fn snap_lon(lon: f64) -> f64 {
    snap(lon, -180.0, 180.0)
}

fn merge_rects(a: Option<Rect<f64>>, b: Option<Rect<f64>>) -> Option<Rect<f64>> {
    match (a, b) {
        (Some(a), Some(b)) => Some(Rect::new(
            Coord {
                x: a.min().x.min(b.min().x),
                y: a.min().y.min(b.min().y),
            },
            Coord {
                x: a.max().x.max(b.max().x),
                y: a.max().y.max(b.max().y),
            },
        )),
        (a, None) => a,
        (None, b) => b,
    }
}

/// A simple polygon given by its ring.
#[derive(Debug, Clone, PartialEq)]
pub struct Polygon {
    ring: LineString<f64>,
    boundary: Option<Rect<f64>>,
}

impl Default for Polygon {
    fn default() -> Self {
        Self::new(Vec::new())
    }
}

impl Polygon {
    /// Creates a polygon and computes its boundary.
    pub fn new(points: Vec<Point>) -> Self {
        Self::from_ring(points.into_iter().map(Coord::from).collect())
    }

    pub fn from_ring(ring: LineString<f64>) -> Self {
        let mut polygon = Self {
            ring,
            boundary: None,
        };
        polygon.recalculate_boundary();
        polygon
    }

    pub fn ring(&self) -> &LineString<f64> {
        &self.ring
    }

    /// Mutable access to the ring. Call `recalculate_boundary` afterwards.
    pub fn ring_mut(&mut self) -> &mut LineString<f64> {
        &mut self.ring
    }

    pub fn into_ring(self) -> LineString<f64> {
        self.ring
    }

    pub fn point(&self, idx: usize) -> Option<Point> {
        self.ring.0.get(idx).map(|&c| Point::from(c))
    }

    pub fn points(&self) -> impl Iterator<Item = Point> + '_ {
        self.ring.coords().map(|&c| Point::from(c))
    }

    /// Bounding box of the ring, `None` if it has no points.
    pub fn boundary(&self) -> Option<Rect<f64>> {
        self.boundary
    }

    pub fn recalculate_boundary(&mut self) {
        self.boundary = self.ring.bounding_rect();
    }

    pub fn len(&self) -> usize {
        self.ring.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ring.0.is_empty()
    }

    /// Whether the first and the last point coincide.
    pub fn is_closed(&self) -> bool {
        self.len() > 1 && self.ring.is_closed()
    }
}

/// Polygon with holes, possibly consisting of several outer rings.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct MultiPolygon {
    inner: Vec<Polygon>,
    outer: Vec<Polygon>,
    boundary: Option<Rect<f64>>,
}

impl MultiPolygon {
    pub fn new(inner: Vec<Polygon>, outer: Vec<Polygon>) -> Self {
        let mut result = Self {
            inner,
            outer,
            boundary: None,
        };
        result.recalculate_boundary();
        result
    }

    pub fn inner(&self) -> &[Polygon] {
        &self.inner
    }

    pub fn outer(&self) -> &[Polygon] {
        &self.outer
    }

    pub fn boundary(&self) -> Option<Rect<f64>> {
        self.boundary
    }

    /// Recomputes the boundary of every ring and the aggregate boundary.
    ///
    /// Inner rings lie inside of the outer ones, still they are included so
    /// that broken input does not produce a box missing some points.
    pub fn recalculate_boundary(&mut self) {
        let mut boundary = None;
        for polygon in self.outer.iter_mut().chain(self.inner.iter_mut()) {
            polygon.recalculate_boundary();
            boundary = merge_rects(boundary, polygon.boundary());
        }
        self.boundary = boundary;
    }
}

/// An extracted area: either a simple polygon or a multipolygon.
#[derive(Debug, Clone, PartialEq)]
pub enum Area {
    Polygon(Polygon),
    MultiPolygon(MultiPolygon),
}

impl Area {
    pub fn boundary(&self) -> Option<Rect<f64>> {
        match self {
            Area::Polygon(p) => p.boundary(),
            Area::MultiPolygon(mp) => mp.boundary(),
        }
    }

    pub fn as_polygon(&self) -> Option<&Polygon> {
        match self {
            Area::Polygon(p) => Some(p),
            Area::MultiPolygon(_) => None,
        }
    }

    pub fn as_multi_polygon(&self) -> Option<&MultiPolygon> {
        match self {
            Area::Polygon(_) => None,
            Area::MultiPolygon(mp) => Some(mp),
        }
    }

    /// Total number of points over all rings.
    pub fn num_points(&self) -> usize {
        match self {
            Area::Polygon(p) => p.len(),
            Area::MultiPolygon(mp) => {
                mp.inner().iter().chain(mp.outer()).map(Polygon::len).sum()
            }
        }
    }
}
