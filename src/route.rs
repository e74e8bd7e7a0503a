//! Route geometry and arc-length caches
//!
//! Every leaf gets one path through its ancestors' screen points. Each hop
//! between two consecutive points is drawn as a straight lead-in, a cubic
//! transition with horizontal tangents, and a straight lead-out, so the
//! route bends smoothly at branch points while flowing left to right.
//!
//! The path is then sampled at unit arc-length steps. A position `p`
//! along the route resolves to `points[floor(p)]`, interpolated toward the
//! next point by the fractional part of `p`.

use std::collections::HashMap;
use std::fmt::Write;

use serde::Serialize;

use crate::error::{FlowError, FlowResult};
use crate::layout::{Layout, Point};

/// Chords a cubic segment starts with before refinement
const CUBIC_FLATTEN_STEPS: usize = 64;

/// Refinement stops doubling chords here
const CUBIC_FLATTEN_MAX_STEPS: usize = 1 << 14;

/// A cubic is flat enough once doubling its chords changes its length by
/// less than this
const FLATTEN_TOLERANCE: f64 = 1e-6;

/// Route geometry parameters
#[derive(Debug, Clone, PartialEq)]
pub struct RouteConfig {
    /// Share of each hop spent in the curved transition, in `[0, 1)`
    pub curvature: f64,
}

impl Default for RouteConfig {
    fn default() -> Self {
        Self { curvature: 0.6 }
    }
}

/// One piece of a route path
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Segment {
    Line { from: Point, to: Point },
    Cubic {
        from: Point,
        c1: Point,
        c2: Point,
        to: Point,
    },
}

impl Segment {
    /// Point at parameter `t` in `[0, 1]`
    fn at(&self, t: f64) -> Point {
        match *self {
            Segment::Line { from, to } => from.lerp(to, t),
            Segment::Cubic { from, c1, c2, to } => {
                let mt = 1.0 - t;
                let a = mt * mt * mt;
                let b = 3.0 * mt * mt * t;
                let c = 3.0 * mt * t * t;
                let d = t * t * t;
                Point::new(
                    a * from.x + b * c1.x + c * c2.x + d * to.x,
                    a * from.y + b * c1.y + c * c2.y + d * to.y,
                )
            }
        }
    }

    /// Length of the polyline through `steps + 1` evenly spaced parameters
    fn chord_length(&self, steps: usize) -> f64 {
        (0..steps)
            .map(|i| {
                let a = self.at(i as f64 / steps as f64);
                let b = self.at((i + 1) as f64 / steps as f64);
                a.distance_to(b)
            })
            .sum()
    }

    /// Chords needed before the polyline length settles on the curve's
    fn flatten_steps(&self) -> usize {
        if let Segment::Line { .. } = self {
            return 1;
        }
        let mut steps = CUBIC_FLATTEN_STEPS;
        let mut length = self.chord_length(steps);
        while steps < CUBIC_FLATTEN_MAX_STEPS {
            let finer = self.chord_length(steps * 2);
            steps *= 2;
            if (finer - length).abs() < FLATTEN_TOLERANCE {
                break;
            }
            length = finer;
        }
        steps
    }
}

/// A smooth path through a sequence of points
#[derive(Debug, Clone, PartialEq)]
pub struct RoutePath {
    start: Point,
    segments: Vec<Segment>,
}

impl RoutePath {
    /// Build the path through `points` with the given curvature.
    ///
    /// An empty slice yields a degenerate path at the origin.
    pub fn through(points: &[Point], curvature: f64) -> Self {
        let start = points.first().copied().unwrap_or(Point::new(0.0, 0.0));
        let mut segments = Vec::with_capacity(points.len().saturating_sub(1) * 3);

        for pair in points.windows(2) {
            let (p0, p1) = (pair[0], pair[1]);
            let dx = p1.x - p0.x;
            let lead = dx * (1.0 - curvature) / 2.0;
            let bend = dx * curvature / 2.0;

            let a = Point::new(p0.x + lead, p0.y);
            let b = Point::new(p1.x - lead, p1.y);

            if lead != 0.0 {
                segments.push(Segment::Line { from: p0, to: a });
            }
            segments.push(Segment::Cubic {
                from: a,
                c1: Point::new(a.x + bend, a.y),
                c2: Point::new(b.x - bend, b.y),
                to: b,
            });
            if lead != 0.0 {
                segments.push(Segment::Line { from: b, to: p1 });
            }
        }

        Self { start, segments }
    }

    pub fn segments(&self) -> &[Segment] {
        &self.segments
    }

    /// Render as an SVG path `d` attribute
    pub fn to_svg(&self) -> String {
        let mut d = format!("M{},{}", self.start.x, self.start.y);
        for segment in &self.segments {
            // Writing to a String cannot fail
            let _ = match *segment {
                Segment::Line { to, .. } => write!(d, "L{},{}", to.x, to.y),
                Segment::Cubic { c1, c2, to, .. } => write!(
                    d,
                    "C{},{} {},{} {},{}",
                    c1.x, c1.y, c2.x, c2.y, to.x, to.y
                ),
            };
        }
        d
    }

    /// Dense polyline approximation of the path.
    ///
    /// Cubics are subdivided until further subdivision no longer changes
    /// their length, so the polyline length matches the curve's.
    fn flatten(&self) -> Vec<Point> {
        let mut out = vec![self.start];
        for segment in &self.segments {
            let steps = segment.flatten_steps();
            for i in 1..=steps {
                out.push(segment.at(i as f64 / steps as f64));
            }
        }
        out
    }

    /// Total arc length of the path
    pub fn length(&self) -> f64 {
        self.flatten()
            .windows(2)
            .map(|w| w[0].distance_to(w[1]))
            .sum()
    }

    /// Points at arc lengths `0, 1, ..., floor(length) - 1`
    pub fn sample(&self) -> Vec<Point> {
        let polyline = self.flatten();
        let mut cumulative = Vec::with_capacity(polyline.len());
        let mut total = 0.0;
        cumulative.push(0.0);
        for w in polyline.windows(2) {
            total += w[0].distance_to(w[1]);
            cumulative.push(total);
        }

        let count = total.floor() as usize;
        let mut points = Vec::with_capacity(count);
        let mut seg = 0usize;
        for step in 0..count {
            let s = step as f64;
            while seg + 2 < cumulative.len() && cumulative[seg + 1] < s {
                seg += 1;
            }
            let span = cumulative[seg + 1] - cumulative[seg];
            let t = if span > 0.0 {
                ((s - cumulative[seg]) / span).clamp(0.0, 1.0)
            } else {
                0.0
            };
            points.push(polyline[seg].lerp(polyline[seg + 1], t));
        }
        points
    }
}

/// A leaf's path and its arc-length point cache
#[derive(Debug, Clone, PartialEq)]
pub struct Route {
    pub leaf: String,
    pub path: RoutePath,
    pub points: Vec<Point>,
}

impl Route {
    /// Route length in cached points
    pub fn len(&self) -> usize {
        self.points.len()
    }

    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }

    /// Interpolated position at distance `pos` along the route.
    ///
    /// # Errors
    ///
    /// Returns [`FlowError::GeometryLookupMiss`] if `floor(pos)` is past the
    /// cached points.
    pub fn point_at(&self, pos: f64) -> FlowResult<Point> {
        let index = pos.max(0.0).floor() as usize;
        let here = self
            .points
            .get(index)
            .copied()
            .ok_or_else(|| FlowError::GeometryLookupMiss {
                route: self.leaf.clone(),
                index,
                len: self.points.len(),
            })?;

        Ok(match self.points.get(index + 1) {
            Some(&next) => here.lerp(next, pos - index as f64),
            None => here,
        })
    }
}

/// Serializable route summary for renderers
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RouteDescriptor {
    pub leaf: String,
    pub d: String,
    pub length: usize,
}

/// All routes of a layout, indexed by leaf name
#[derive(Debug, Clone, PartialEq)]
pub struct RouteCache {
    routes: Vec<Route>,
    index: HashMap<String, usize>,
}

impl RouteCache {
    /// Build paths and point caches for every leaf of `layout`
    pub fn build(layout: &Layout, config: &RouteConfig) -> Self {
        let routes: Vec<Route> = layout
            .routes()
            .into_iter()
            .map(|(leaf, points)| {
                let path = RoutePath::through(&points, config.curvature);
                let points = path.sample();
                tracing::debug!(leaf = %leaf, length = points.len(), "sampled route");
                Route { leaf, path, points }
            })
            .collect();

        let index = routes
            .iter()
            .enumerate()
            .map(|(i, r)| (r.leaf.clone(), i))
            .collect();

        Self { routes, index }
    }

    pub fn routes(&self) -> &[Route] {
        &self.routes
    }

    pub fn index_of(&self, leaf: &str) -> Option<usize> {
        self.index.get(leaf).copied()
    }

    pub fn route(&self, index: usize) -> Option<&Route> {
        self.routes.get(index)
    }

    pub fn descriptors(&self) -> Vec<RouteDescriptor> {
        self.routes
            .iter()
            .map(|r| RouteDescriptor {
                leaf: r.leaf.clone(),
                d: r.path.to_svg(),
                length: r.len(),
            })
            .collect()
    }
}
