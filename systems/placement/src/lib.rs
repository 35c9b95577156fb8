#![deny(
    unsafe_code,
    missing_docs,
    dead_code,
    unused_results,
    non_snake_case,
    unreachable_pub
)]

//! Anti-clustering spawn placement.
//!
//! Candidates are sampled inside a padded sub-rectangle of the play area and
//! scored by their distance to recently used positions. The first candidate
//! clearing the minimum distance wins; otherwise the best-spread candidate is
//! kept. Free placement alternates between the left and right halves, while
//! zone-directed placement samples inside one cell of a fixed zone grid.

use glam::Vec2;
use reflex_director_core::{DeterministicRng, RollingMemory, ZoneId};

/// Axis-aligned rectangle in host pixels, with `top` growing downward.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct AreaRect {
    /// Left edge.
    pub left: f32,
    /// Top edge.
    pub top: f32,
    /// Horizontal extent.
    pub width: f32,
    /// Vertical extent.
    pub height: f32,
}

impl AreaRect {
    /// Creates a new rectangle.
    #[must_use]
    pub const fn new(left: f32, top: f32, width: f32, height: f32) -> Self {
        Self {
            left,
            top,
            width,
            height,
        }
    }

    /// Centre point of the rectangle.
    #[must_use]
    pub fn center(&self) -> Vec2 {
        Vec2::new(self.left + self.width * 0.5, self.top + self.height * 0.5)
    }

    /// Reports whether the rectangle contains `point`, edges included.
    #[must_use]
    pub fn contains(&self, point: Vec2) -> bool {
        point.x >= self.left
            && point.x <= self.left + self.width
            && point.y >= self.top
            && point.y <= self.top + self.height
    }

    /// Rectangle shrunk by `padding` on every side.
    ///
    /// An axis that cannot absorb the padding collapses onto its centre line.
    #[must_use]
    pub fn padded(&self, padding: f32) -> Self {
        let padding = padding.max(0.0);
        let center = self.center();
        let (left, width) = if self.width > 2.0 * padding {
            (self.left + padding, self.width - 2.0 * padding)
        } else {
            (center.x, 0.0)
        };
        let (top, height) = if self.height > 2.0 * padding {
            (self.top + padding, self.height - 2.0 * padding)
        } else {
            (center.y, 0.0)
        };
        Self::new(left, top, width, height)
    }

    /// Left or right half of the rectangle.
    #[must_use]
    pub fn half(&self, side: Side) -> Self {
        let half = self.width * 0.5;
        match side {
            Side::Left => Self::new(self.left, self.top, half, self.height),
            Side::Right => Self::new(self.left + half, self.top, half, self.height),
        }
    }

    fn sanitized(&self) -> Self {
        let finite = |value: f32| if value.is_finite() { value } else { 0.0 };
        Self::new(
            finite(self.left),
            finite(self.top),
            finite(self.width).max(0.0),
            finite(self.height).max(0.0),
        )
    }

    fn sample(&self, rng: &mut DeterministicRng) -> Vec2 {
        let x = self.left + self.width * rng.next_unit();
        let y = self.top + self.height * rng.next_unit();
        Vec2::new(x, y)
    }
}

/// Half of the play area preferred by the next free placement.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Side {
    /// Left half.
    Left,
    /// Right half.
    Right,
}

impl Side {
    /// Opposite half.
    #[must_use]
    pub const fn flip(self) -> Self {
        match self {
            Self::Left => Self::Right,
            Self::Right => Self::Left,
        }
    }
}

/// Regular grid that partitions the play area into numbered zones.
///
/// Zones are numbered row-major from the top-left cell.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ZoneGrid {
    columns: u8,
    rows: u8,
}

impl ZoneGrid {
    /// Creates a grid; zero dimensions are raised to one.
    ///
    /// Rows are reduced until every zone fits in a [`ZoneId`].
    #[must_use]
    pub fn new(columns: u8, rows: u8) -> Self {
        let columns = columns.max(1);
        Self {
            columns,
            rows: rows.max(1).min(u8::MAX / columns),
        }
    }

    /// Number of zones in the grid.
    #[must_use]
    pub fn count(&self) -> u8 {
        self.columns.saturating_mul(self.rows)
    }

    /// Sub-rectangle covered by `zone`, or `None` when the zone is outside the grid.
    #[must_use]
    pub fn zone_rect(&self, area: &AreaRect, zone: ZoneId) -> Option<AreaRect> {
        if zone.get() >= self.count() {
            return None;
        }
        let column = zone.get() % self.columns;
        let row = zone.get() / self.columns;
        let width = area.width / f32::from(self.columns);
        let height = area.height / f32::from(self.rows);
        Some(AreaRect::new(
            area.left + width * f32::from(column),
            area.top + height * f32::from(row),
            width,
            height,
        ))
    }

    /// Zone containing `point`; points outside the area snap to the nearest cell.
    #[must_use]
    pub fn zone_of(&self, area: &AreaRect, point: Vec2) -> ZoneId {
        let cell = |offset: f32, extent: f32, cells: u8| -> u8 {
            if extent <= 0.0 || !offset.is_finite() {
                return 0;
            }
            let scaled = (offset / extent * f32::from(cells)).floor();
            scaled.clamp(0.0, f32::from(cells - 1)) as u8
        };
        let column = cell(point.x - area.left, area.width, self.columns);
        let row = cell(point.y - area.top, area.height, self.rows);
        let index = u16::from(row) * u16::from(self.columns) + u16::from(column);
        ZoneId::new(u8::try_from(index).unwrap_or(u8::MAX))
    }
}

impl Default for ZoneGrid {
    fn default() -> Self {
        Self::new(3, 2)
    }
}

/// Tuning knobs for spatial placement.
#[derive(Clone, Debug, PartialEq)]
pub struct PlacementTuning {
    /// Candidates sampled per placement.
    pub attempts: u32,
    /// Minimum distance to recent points that accepts a candidate immediately.
    pub min_distance_px: f32,
    /// Extra minimum distance per pixel of object size.
    pub size_distance_factor: f32,
    /// Fixed padding kept between objects and the area edges.
    pub edge_padding_px: f32,
    /// Additional edge padding per pixel of object size.
    pub size_padding: f32,
    /// Number of recent positions remembered.
    pub memory: usize,
    /// Zone layout used for zone-directed placement.
    pub grid: ZoneGrid,
}

impl Default for PlacementTuning {
    fn default() -> Self {
        Self {
            attempts: 12,
            min_distance_px: 90.0,
            size_distance_factor: 0.15,
            edge_padding_px: 18.0,
            size_padding: 0.55,
            memory: 6,
            grid: ZoneGrid::default(),
        }
    }
}

/// Chooses spawn positions that stay spread out over time.
#[derive(Clone, Debug)]
pub struct SpatialPlacement {
    tuning: PlacementTuning,
    recent: RollingMemory<Vec2>,
    side: Side,
}

impl SpatialPlacement {
    /// Creates a placement system that starts on the left half.
    #[must_use]
    pub fn new(tuning: PlacementTuning) -> Self {
        Self {
            recent: RollingMemory::with_capacity(tuning.memory),
            side: Side::Left,
            tuning,
        }
    }

    /// Zone layout used for zone-directed placement.
    #[must_use]
    pub fn grid(&self) -> ZoneGrid {
        self.tuning.grid
    }

    /// Recently used positions, oldest first.
    #[must_use]
    pub fn recent(&self) -> &RollingMemory<Vec2> {
        &self.recent
    }

    /// Chooses a position for an object of `size_px` anywhere in `area`.
    pub fn choose_position(
        &mut self,
        area: &AreaRect,
        size_px: f32,
        rng: &mut DeterministicRng,
    ) -> Vec2 {
        let inner = self.inner(area, size_px);
        let region = inner.half(self.side);
        let point = self.search(&region, size_px, rng);
        self.side = self.side.flip();
        point
    }

    /// Chooses a position for an object of `size_px` inside `zone`.
    ///
    /// Unknown zones fall back to the whole padded area.
    pub fn choose_in_zone(
        &mut self,
        area: &AreaRect,
        zone: ZoneId,
        size_px: f32,
        rng: &mut DeterministicRng,
    ) -> Vec2 {
        let inner = self.inner(area, size_px);
        let region = self
            .tuning
            .grid
            .zone_rect(&area.sanitized(), zone)
            .map_or(inner, |cell| intersect(&cell, &inner));
        let point = self.search(&region, size_px, rng);
        self.side = if point.x < inner.center().x {
            Side::Right
        } else {
            Side::Left
        };
        point
    }

    fn inner(&self, area: &AreaRect, size_px: f32) -> AreaRect {
        let size = finite_size(size_px);
        area.sanitized()
            .padded(self.tuning.edge_padding_px + size * self.tuning.size_padding)
    }

    fn search(&mut self, region: &AreaRect, size_px: f32, rng: &mut DeterministicRng) -> Vec2 {
        let threshold =
            self.tuning.min_distance_px + finite_size(size_px) * self.tuning.size_distance_factor;
        let mut best: Option<(Vec2, f32)> = None;
        for _ in 0..self.tuning.attempts.max(1) {
            let candidate = region.sample(rng);
            let spread = self.spread(candidate);
            if spread >= threshold {
                best = Some((candidate, spread));
                break;
            }
            if best.map_or(true, |(_, current)| spread > current) {
                best = Some((candidate, spread));
            }
        }
        let point = best.map_or_else(|| region.center(), |(point, _)| point);
        self.recent.push(point);
        point
    }

    /// Minimum distance from `candidate` to any remembered position.
    fn spread(&self, candidate: Vec2) -> f32 {
        self.recent
            .iter()
            .map(|recent| recent.distance(candidate))
            .fold(f32::INFINITY, f32::min)
    }
}

fn intersect(a: &AreaRect, b: &AreaRect) -> AreaRect {
    let left = a.left.max(b.left);
    let top = a.top.max(b.top);
    let right = (a.left + a.width).min(b.left + b.width);
    let bottom = (a.top + a.height).min(b.top + b.height);
    if right < left || bottom < top {
        let center = a.center();
        let x = center.x.clamp(b.left, b.left + b.width);
        let y = center.y.clamp(b.top, b.top + b.height);
        return AreaRect::new(x, y, 0.0, 0.0);
    }
    AreaRect::new(left, top, right - left, bottom - top)
}

fn finite_size(size_px: f32) -> f32 {
    if size_px.is_finite() {
        size_px.max(0.0)
    } else {
        0.0
    }
}
