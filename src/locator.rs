//! Uniform-grid spatial index over island rectangles (spec §4.7).

use std::collections::{HashMap, HashSet};

use crate::key::IslandKey;

/// Axis-aligned rectangle in device pixels.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Rect {
    pub x: f64,
    pub y: f64,
    pub w: f64,
    pub h: f64,
}

impl Rect {
    #[must_use]
    pub fn contains(self, px: f64, py: f64) -> bool {
        px >= self.x && px <= self.x + self.w && py >= self.y && py <= self.y + self.h
    }

    /// Squared distance from `(px, py)` to the nearest point of this rect.
    #[must_use]
    pub fn distance_sq(self, px: f64, py: f64) -> f64 {
        let cx = px.clamp(self.x, self.x + self.w);
        let cy = py.clamp(self.y, self.y + self.h);
        let dx = px - cx;
        let dy = py - cy;
        dx.mul_add(dx, dy * dy)
    }
}

/// A candidate produced by the locator for a given frame.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Candidate {
    pub key: IslandKey,
    pub rect: Rect,
}

fn cell_hash(cx: i64, cy: i64) -> i64 {
    (cy << 16) | (cx & 0xFFFF)
}

/// Uniform grid index. Must be rebuilt (`rebuild`) after any rect update;
/// queries between rebuilds see a stable snapshot.
#[derive(Debug, Clone)]
pub struct SpatialLocator {
    cell_size_px: f64,
    cells: HashMap<i64, Vec<Candidate>>,
    scratch_seen: HashSet<IslandKey>,
}

impl SpatialLocator {
    #[must_use]
    pub fn new(cell_size_px: f64) -> Self {
        Self {
            cell_size_px: cell_size_px.max(1.0),
            cells: HashMap::new(),
            scratch_seen: HashSet::new(),
        }
    }

    #[must_use]
    pub fn cell_size_px(&self) -> f64 {
        self.cell_size_px
    }

    pub fn set_cell_size_px(&mut self, cell_size_px: f64) {
        self.cell_size_px = cell_size_px.max(1.0);
    }

    fn cell_of(&self, x: f64, y: f64) -> (i64, i64) {
        #[allow(clippy::cast_possible_truncation)]
        {
            ((x / self.cell_size_px).floor() as i64, (y / self.cell_size_px).floor() as i64)
        }
    }

    /// Rebuild the index from scratch. Each island key is inserted into every
    /// cell its rect overlaps.
    pub fn rebuild(&mut self, islands: impl IntoIterator<Item = Candidate>) {
        self.cells.clear();
        for candidate in islands {
            let (cx0, cy0) = self.cell_of(candidate.rect.x, candidate.rect.y);
            let (cx1, cy1) =
                self.cell_of(candidate.rect.x + candidate.rect.w, candidate.rect.y + candidate.rect.h);
            for cy in cy0..=cy1 {
                for cx in cx0..=cx1 {
                    self.cells.entry(cell_hash(cx, cy)).or_default().push(candidate);
                }
            }
        }
    }

    /// Visit cells within `ceil(radius / cell_size)` rings of `(px, py)`
    /// (default radius yields a single ring, i.e. a 3x3 scan), deduping keys
    /// into `out`. `out` is cleared first; callers reuse the same buffer
    /// across frames to avoid per-frame allocation.
    pub fn query_nearby(&mut self, px: f64, py: f64, radius: Option<f64>, out: &mut Vec<Candidate>) {
        out.clear();
        self.scratch_seen.clear();
        let (cx, cy) = self.cell_of(px, py);
        #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
        let r = radius
            .map(|r| (r / self.cell_size_px).ceil().max(1.0) as i64)
            .unwrap_or(1);
        for dy in -r..=r {
            for dx in -r..=r {
                let Some(bucket) = self.cells.get(&cell_hash(cx + dx, cy + dy)) else {
                    continue;
                };
                for candidate in bucket {
                    if self.scratch_seen.insert(candidate.key) {
                        out.push(*candidate);
                    }
                }
            }
        }
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.cells.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn candidate(type_id: u16, x: f64, y: f64, w: f64, h: f64) -> Candidate {
        Candidate {
            key: IslandKey::pack(type_id, 0, 0).unwrap(),
            rect: Rect { x, y, w, h },
        }
    }

    #[test]
    fn query_finds_overlapping_island() {
        let mut locator = SpatialLocator::new(400.0);
        locator.rebuild([candidate(1, 10.0, 10.0, 50.0, 50.0)]);
        let mut out = Vec::new();
        locator.query_nearby(20.0, 20.0, None, &mut out);
        assert_eq!(out.len(), 1);
    }

    #[test]
    fn query_dedupes_island_spanning_multiple_cells() {
        let mut locator = SpatialLocator::new(400.0);
        // Spans four cells around the (0,0) grid boundary.
        locator.rebuild([candidate(1, -10.0, -10.0, 20.0, 20.0)]);
        let mut out = Vec::new();
        locator.query_nearby(0.0, 0.0, None, &mut out);
        assert_eq!(out.len(), 1);
    }

    #[test]
    fn query_respects_radius() {
        let mut locator = SpatialLocator::new(100.0);
        locator.rebuild([candidate(1, 1000.0, 1000.0, 10.0, 10.0)]);
        let mut out = Vec::new();
        locator.query_nearby(0.0, 0.0, None, &mut out);
        assert!(out.is_empty());
        locator.query_nearby(0.0, 0.0, Some(2000.0), &mut out);
        assert_eq!(out.len(), 1);
    }

    #[test]
    fn rebuild_clears_stale_entries() {
        let mut locator = SpatialLocator::new(400.0);
        locator.rebuild([candidate(1, 0.0, 0.0, 10.0, 10.0)]);
        locator.rebuild([candidate(2, 1000.0, 1000.0, 10.0, 10.0)]);
        let mut out = Vec::new();
        locator.query_nearby(0.0, 0.0, None, &mut out);
        assert!(out.is_empty());
    }

    #[test]
    fn distance_sq_clamps_into_rect() {
        let rect = Rect { x: 0.0, y: 0.0, w: 10.0, h: 10.0 };
        assert_eq!(rect.distance_sq(5.0, 5.0), 0.0);
        assert_eq!(rect.distance_sq(20.0, 0.0), 100.0);
    }
}
