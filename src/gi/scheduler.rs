//! Picks which probes get retraced this frame.
//!
//! Three passes share one budget and stop the moment it runs out, so the
//! order of cascades and probes matters: earlier candidates win. That's
//! first-come-first-served, not a top-K by priority.

use glam::IVec3;
use rand::rngs::SmallRng;
use rand::{Rng, SeedableRng};

use crate::gi::cascade::Cascade;

/// Frame rate assumed when turning probe age into seconds.
pub const ASSUMED_FRAME_RATE: f32 = 60.0;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ProbeUpdate {
    pub cascade: usize,
    pub coord: IVec3,
}

/// Fixed capacity list of probes to retrace this frame.
#[derive(Debug, Clone)]
pub struct UpdateList {
    entries: Vec<ProbeUpdate>,
    capacity: usize,
}

impl UpdateList {
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            entries: Vec::with_capacity(capacity),
            capacity,
        }
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn is_full(&self) -> bool {
        self.entries.len() >= self.capacity
    }

    pub fn remaining(&self) -> usize {
        self.capacity.saturating_sub(self.entries.len())
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }

    /// Returns false, and drops the update, once the list is full.
    pub fn push(&mut self, update: ProbeUpdate) -> bool {
        if self.is_full() {
            return false;
        }
        self.entries.push(update);
        true
    }

    pub fn as_slice(&self) -> &[ProbeUpdate] {
        &self.entries
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct UpdateStats {
    pub exposed: u32,
    pub invalid: u32,
    pub stale: u32,
}

impl UpdateStats {
    pub fn total(&self) -> u32 {
        self.exposed + self.invalid + self.stale
    }
}

/// Each cascade's share of the summed update priorities.
pub fn normalized_priorities(cascades: &[Cascade]) -> Vec<f32> {
    let total: f32 = cascades.iter().map(|cascade| cascade.update_priority).sum();
    cascades
        .iter()
        .map(|cascade| {
            if total > 0.0 {
                cascade.update_priority / total
            } else {
                0.0
            }
        })
        .collect()
}

/// Fills `list` for `frame`. The random draws are seeded from the frame
/// index, so a given frame sequence always selects the same probes.
pub fn schedule_updates(cascades: &mut [Cascade], frame: u32, list: &mut UpdateList) -> UpdateStats {
    list.clear();

    let mut rng = SmallRng::seed_from_u64(frame as u64);
    let priorities = normalized_priorities(cascades);

    let mut stats = UpdateStats {
        exposed: select_exposed(cascades, frame, list),
        ..UpdateStats::default()
    };

    if !list.is_full() {
        stats.invalid = select_invalid(cascades, &priorities, frame, &mut rng, list);
    }

    if !list.is_full() {
        stats.stale = select_stale(cascades, &priorities, frame, &mut rng, list);
    }

    stats
}

fn select(cascade: &mut Cascade, index: usize, cascade_index: usize, frame: u32, list: &mut UpdateList) -> bool {
    let coord = cascade.extent().coord_of(index);
    if !list.push(ProbeUpdate {
        cascade: cascade_index,
        coord,
    }) {
        return false;
    }

    let probe = &mut cascade.grid_mut().probes_mut()[index];
    probe.is_valid = true;
    probe.last_update_frame = frame;
    true
}

/// Probes scrolled into view by this frame's movement. Whatever doesn't fit
/// stays invalid and is picked up by the later passes on future frames.
pub fn select_exposed(cascades: &mut [Cascade], frame: u32, list: &mut UpdateList) -> u32 {
    let mut selected = 0;
    for (cascade_index, cascade) in cascades.iter_mut().enumerate() {
        let extent = cascade.extent();
        let exposed: Vec<usize> = cascade
            .newly_exposed()
            .filter_map(|coord| extent.index_of(coord))
            .collect();

        for index in exposed {
            if !select(cascade, index, cascade_index, frame, list) {
                return selected;
            }
            selected += 1;
        }
    }
    selected
}

/// Each invalid probe is picked with probability equal to its cascade's
/// normalized priority.
pub fn select_invalid(
    cascades: &mut [Cascade],
    priorities: &[f32],
    frame: u32,
    rng: &mut SmallRng,
    list: &mut UpdateList,
) -> u32 {
    let mut selected = 0;
    for (cascade_index, cascade) in cascades.iter_mut().enumerate() {
        let priority = priorities[cascade_index];
        for index in 0..cascade.extent().probe_count() {
            if cascade.grid().probes()[index].is_valid {
                continue;
            }

            let roll: f32 = rng.gen();
            if roll < priority {
                if !select(cascade, index, cascade_index, frame, list) {
                    return selected;
                }
                selected += 1;
            }
        }
    }
    selected
}

/// Every probe scores `ln(age in seconds) * priority`, so nothing younger
/// than a second is retraced and old probes approach certainty. Probes picked
/// earlier this frame have age zero and are never picked twice.
pub fn select_stale(
    cascades: &mut [Cascade],
    priorities: &[f32],
    frame: u32,
    rng: &mut SmallRng,
    list: &mut UpdateList,
) -> u32 {
    let mut selected = 0;
    for (cascade_index, cascade) in cascades.iter_mut().enumerate() {
        let priority = priorities[cascade_index];
        if priority <= 0.0 {
            continue;
        }

        for index in 0..cascade.extent().probe_count() {
            // The frame counter wraps, so age does too
            let age_frames = frame.wrapping_sub(cascade.grid().probes()[index].last_update_frame);
            if age_frames == 0 {
                continue;
            }

            let age_seconds = age_frames as f32 / ASSUMED_FRAME_RATE;
            let score = age_seconds.ln() * priority;
            let roll: f32 = rng.gen();
            if roll < score {
                if !select(cascade, index, cascade_index, frame, list) {
                    return selected;
                }
                selected += 1;
            }
        }
    }
    selected
}
