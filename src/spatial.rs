//! Grid-bucketed proximity index over segment positions on the unit sphere.
//!
//! The cube [-1, 1]^3 is split into `dim^3` cells. Each cell owns a small list
//! of entries; a link table addressed by [`SegmentId`] records which cell and
//! slot hold every registered segment, so removal is a swap-remove plus one
//! back-link fixup and moves within a cell only rewrite the stored location.

use crate::agent::AgentId;
use crate::constants::{GRID_DIM, MAX_SEGMENTS};
use glam::Vec3;

/// Stable handle of one body segment: `agent * MAX_SEGMENTS + index`.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SegmentId(pub u32);

impl SegmentId {
    #[inline]
    pub fn new(agent: AgentId, index: usize) -> Self {
        debug_assert!(index < MAX_SEGMENTS);
        Self((agent.index() * MAX_SEGMENTS + index) as u32)
    }

    #[inline]
    pub fn agent(self) -> AgentId {
        AgentId(self.0 / MAX_SEGMENTS as u32)
    }

    #[inline]
    pub fn index(self) -> usize {
        self.0 as usize % MAX_SEGMENTS
    }
}

/// A query hit: the segment and the location the index holds for it.
#[derive(Debug, Copy, Clone, PartialEq)]
pub struct Neighbor {
    pub segment: SegmentId,
    pub location: Vec3,
}

#[derive(Debug, Copy, Clone, PartialEq, Eq)]
struct Link {
    cell: u32,
    slot: u32,
}

pub struct SpatialIndex {
    dim: usize,
    cells: Vec<Vec<Neighbor>>,
    links: Vec<Option<Link>>,
    len: usize,
}

/// Chebyshev (max-axis) distance, the metric used by every proximity test.
#[inline]
pub fn chebyshev(a: Vec3, b: Vec3) -> f32 {
    (a - b).abs().max_element()
}

impl SpatialIndex {
    pub fn new(agent_capacity: usize) -> Self {
        Self::with_dim(GRID_DIM, agent_capacity)
    }

    pub fn with_dim(dim: usize, agent_capacity: usize) -> Self {
        let dim = dim.max(1);
        Self {
            dim,
            cells: vec![Vec::new(); dim * dim * dim],
            links: vec![None; agent_capacity * MAX_SEGMENTS],
            len: 0,
        }
    }

    #[inline]
    pub fn dim(&self) -> usize {
        self.dim
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.len
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    pub fn clear(&mut self) {
        for cell in &mut self.cells {
            cell.clear();
        }
        self.links.iter_mut().for_each(|link| *link = None);
        self.len = 0;
    }

    #[inline]
    fn axis_cell(&self, coord: f32) -> usize {
        let scaled = ((coord + 1.0) * 0.5 * self.dim as f32).floor() as i64;
        scaled.clamp(0, self.dim as i64 - 1) as usize
    }

    #[inline]
    pub fn cell_coords(&self, location: Vec3) -> [usize; 3] {
        [
            self.axis_cell(location.x),
            self.axis_cell(location.y),
            self.axis_cell(location.z),
        ]
    }

    #[inline]
    fn flat(&self, [x, y, z]: [usize; 3]) -> usize {
        (z * self.dim + y) * self.dim + x
    }

    #[inline]
    pub fn cell_of(&self, location: Vec3) -> usize {
        self.flat(self.cell_coords(location))
    }

    /// Flat cell index the segment is currently linked into.
    pub fn linked_cell(&self, id: SegmentId) -> Option<usize> {
        self.links
            .get(id.0 as usize)
            .copied()
            .flatten()
            .map(|link| link.cell as usize)
    }

    pub fn contains(&self, id: SegmentId) -> bool {
        self.linked_cell(id).is_some()
    }

    pub fn location_of(&self, id: SegmentId) -> Option<Vec3> {
        let link = self.links.get(id.0 as usize).copied().flatten()?;
        Some(self.cells[link.cell as usize][link.slot as usize].location)
    }

    fn link_into(&mut self, id: SegmentId, location: Vec3) {
        let cell = self.cell_of(location);
        let slot = self.cells[cell].len();
        self.cells[cell].push(Neighbor {
            segment: id,
            location,
        });
        self.links[id.0 as usize] = Some(Link {
            cell: cell as u32,
            slot: slot as u32,
        });
        self.len += 1;
    }

    /// Registers a segment. Re-inserting a registered segment relocates it.
    pub fn insert(&mut self, id: SegmentId, location: Vec3) {
        if self.contains(id) {
            self.move_entity(id, location);
            return;
        }
        self.link_into(id, location);
    }

    /// Deregisters a segment. Returns false if it was not registered.
    pub fn remove(&mut self, id: SegmentId) -> bool {
        let Some(link) = self.links.get_mut(id.0 as usize).and_then(Option::take) else {
            return false;
        };
        let cell = &mut self.cells[link.cell as usize];
        cell.swap_remove(link.slot as usize);
        if let Some(moved) = cell.get(link.slot as usize) {
            if let Some(moved_link) = self.links[moved.segment.0 as usize].as_mut() {
                moved_link.slot = link.slot;
            }
        }
        self.len -= 1;
        true
    }

    /// Updates a segment's location, relinking only when its cell changes.
    pub fn move_entity(&mut self, id: SegmentId, location: Vec3) {
        let Some(link) = self.links.get(id.0 as usize).copied().flatten() else {
            self.link_into(id, location);
            return;
        };
        if self.cell_of(location) == link.cell as usize {
            self.cells[link.cell as usize][link.slot as usize].location = location;
        } else {
            self.remove(id);
            self.link_into(id, location);
        }
    }

    /// Appends to `out` every segment within Chebyshev distance `radius` of
    /// `point` (exact coincidences always match), skipping `exclude`'s
    /// segments and stopping once `max_results` hits have been appended.
    /// Returns the number of hits appended.
    pub fn query_near(
        &self,
        point: Vec3,
        radius: f32,
        max_results: usize,
        exclude: Option<AgentId>,
        out: &mut Vec<Neighbor>,
    ) -> usize {
        if max_results == 0 {
            return 0;
        }
        let reach = Vec3::splat(radius.max(0.0));
        let lo = self.cell_coords(point - reach);
        let hi = self.cell_coords(point + reach);
        let mut found = 0;
        for z in lo[2]..=hi[2] {
            for y in lo[1]..=hi[1] {
                for x in lo[0]..=hi[0] {
                    for entry in &self.cells[self.flat([x, y, z])] {
                        if exclude == Some(entry.segment.agent()) {
                            continue;
                        }
                        let distance = chebyshev(entry.location, point);
                        if distance < radius || distance == 0.0 {
                            out.push(*entry);
                            found += 1;
                            if found == max_results {
                                return found;
                            }
                        }
                    }
                }
            }
        }
        found
    }

    /// Verifies every registered entry sits in the cell its location maps to
    /// and that the link table agrees with cell contents.
    pub fn is_consistent(&self) -> bool {
        let mut seen = 0;
        for (cell_index, cell) in self.cells.iter().enumerate() {
            for (slot, entry) in cell.iter().enumerate() {
                if self.cell_of(entry.location) != cell_index {
                    log::warn!(
                        "segment {:?} at {:?} is filed under cell {} instead of {}",
                        entry.segment,
                        entry.location,
                        cell_index,
                        self.cell_of(entry.location)
                    );
                    return false;
                }
                let expected = Link {
                    cell: cell_index as u32,
                    slot: slot as u32,
                };
                if self.links.get(entry.segment.0 as usize).copied().flatten() != Some(expected) {
                    log::warn!("segment {:?} has a stale back-link", entry.segment);
                    return false;
                }
                seen += 1;
            }
        }
        let linked = self.links.iter().filter(|link| link.is_some()).count();
        seen == self.len && linked == self.len
    }
}
