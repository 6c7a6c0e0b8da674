//! Monitor bookkeeping for in-flight captures.
//!
//! Frames refer to monitors through generational handles. When an output is
//! removed its slot generation is bumped, so every handle still held by an
//! in-flight frame resolves to `None` instead of dangling.

use crate::geometry::Rect;

/// Output transform as reported by `wl_output`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Transform {
    #[default]
    Normal,
    Rotate90,
    Rotate180,
    Rotate270,
    Flipped,
    Flipped90,
    Flipped180,
    Flipped270,
}

impl Transform {
    /// Counter-clockwise rotation (degrees) that brings a captured frame upright.
    ///
    /// Flips are not undone; flipped transforms rotate like their unflipped
    /// counterparts.
    pub fn rotation_degrees(self) -> u32 {
        match self {
            Transform::Normal | Transform::Flipped => 0,
            Transform::Rotate90 | Transform::Flipped90 => 270,
            Transform::Rotate180 | Transform::Flipped180 => 180,
            Transform::Rotate270 | Transform::Flipped270 => 90,
        }
    }

    pub fn is_flipped(self) -> bool {
        matches!(
            self,
            Transform::Flipped | Transform::Flipped90 | Transform::Flipped180 | Transform::Flipped270
        )
    }
}

/// Read-only description of one output.
#[derive(Debug, Clone, PartialEq)]
pub struct Monitor {
    /// Stable identifier (the `wl_output` global name).
    pub id: u32,
    pub name: String,
    /// Position and size in logical compositor coordinates.
    pub logical: Rect,
    /// Physical pixels per logical pixel.
    pub scale: f64,
    pub transform: Transform,
}

/// Non-owning reference into a [`MonitorTable`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct MonitorHandle {
    index: usize,
    generation: u32,
}

#[derive(Debug, Default)]
struct Slot {
    generation: u32,
    monitor: Option<Monitor>,
}

/// Stable table of known monitors.
#[derive(Debug, Default)]
pub struct MonitorTable {
    slots: Vec<Slot>,
}

impl MonitorTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a monitor, reusing a vacant slot when possible.
    pub fn insert(&mut self, monitor: Monitor) -> MonitorHandle {
        if let Some(index) = self.slots.iter().position(|slot| slot.monitor.is_none()) {
            let slot = &mut self.slots[index];
            slot.monitor = Some(monitor);
            return MonitorHandle {
                index,
                generation: slot.generation,
            };
        }

        self.slots.push(Slot {
            generation: 0,
            monitor: Some(monitor),
        });
        MonitorHandle {
            index: self.slots.len() - 1,
            generation: 0,
        }
    }

    /// Replaces the description of a live monitor (mode or position change).
    ///
    /// Returns false if the handle is stale.
    pub fn update(&mut self, handle: MonitorHandle, monitor: Monitor) -> bool {
        match self.slot_mut(handle) {
            Some(slot) => {
                slot.monitor = Some(monitor);
                true
            }
            None => false,
        }
    }

    /// Removes a monitor and invalidates every handle pointing at it.
    pub fn remove(&mut self, handle: MonitorHandle) -> Option<Monitor> {
        let slot = self.slot_mut(handle)?;
        slot.generation = slot.generation.wrapping_add(1);
        slot.monitor.take()
    }

    /// Resolves a handle; `None` once the monitor is gone.
    pub fn get(&self, handle: MonitorHandle) -> Option<&Monitor> {
        self.slots
            .get(handle.index)
            .filter(|slot| slot.generation == handle.generation)
            .and_then(|slot| slot.monitor.as_ref())
    }

    pub fn iter(&self) -> impl Iterator<Item = (MonitorHandle, &Monitor)> {
        self.slots.iter().enumerate().filter_map(|(index, slot)| {
            slot.monitor.as_ref().map(|monitor| {
                (
                    MonitorHandle {
                        index,
                        generation: slot.generation,
                    },
                    monitor,
                )
            })
        })
    }

    pub fn len(&self) -> usize {
        self.iter().count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn slot_mut(&mut self, handle: MonitorHandle) -> Option<&mut Slot> {
        self.slots
            .get_mut(handle.index)
            .filter(|slot| slot.generation == handle.generation && slot.monitor.is_some())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn monitor(id: u32) -> Monitor {
        Monitor {
            id,
            name: format!("OUT-{id}"),
            logical: Rect::new(0, 0, 100, 100).unwrap(),
            scale: 1.0,
            transform: Transform::Normal,
        }
    }

    #[test]
    fn rotation_map_matches_transforms() {
        assert_eq!(Transform::Normal.rotation_degrees(), 0);
        assert_eq!(Transform::Flipped.rotation_degrees(), 0);
        assert_eq!(Transform::Rotate90.rotation_degrees(), 270);
        assert_eq!(Transform::Flipped90.rotation_degrees(), 270);
        assert_eq!(Transform::Rotate180.rotation_degrees(), 180);
        assert_eq!(Transform::Flipped180.rotation_degrees(), 180);
        assert_eq!(Transform::Rotate270.rotation_degrees(), 90);
        assert_eq!(Transform::Flipped270.rotation_degrees(), 90);
    }

    #[test]
    fn removed_monitor_handles_go_stale() {
        let mut table = MonitorTable::new();
        let handle = table.insert(monitor(1));
        assert_eq!(table.get(handle).map(|m| m.id), Some(1));

        assert!(table.remove(handle).is_some());
        assert!(table.get(handle).is_none());
        assert!(table.remove(handle).is_none());
    }

    #[test]
    fn reused_slot_does_not_revive_old_handles() {
        let mut table = MonitorTable::new();
        let old = table.insert(monitor(1));
        table.remove(old);
        let new = table.insert(monitor(2));

        assert_ne!(old, new);
        assert!(table.get(old).is_none());
        assert_eq!(table.get(new).map(|m| m.id), Some(2));
        assert_eq!(table.len(), 1);
    }

    #[test]
    fn update_keeps_handle_valid() {
        let mut table = MonitorTable::new();
        let handle = table.insert(monitor(1));
        let mut moved = monitor(1);
        moved.logical = Rect::new(1920, 0, 100, 100).unwrap();
        assert!(table.update(handle, moved));
        assert_eq!(table.get(handle).unwrap().logical.x, 1920);
    }
}
