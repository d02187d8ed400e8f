use std::collections::HashMap;

use crate::overlay::surface::Surface;

/// Owns one overlay surface per active media slot.
///
/// Slots are keyed by the mode's slot id. At most one surface exists per
/// slot; re-acquiring resizes the existing surface in place, and releasing
/// removes it with nothing left behind.
#[derive(Default)]
pub struct SurfaceManager {
    slots: HashMap<String, Surface>,
}

impl SurfaceManager {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the slot's surface, creating it on first use, sized to the
    /// element's current rendered box.
    pub fn acquire(&mut self, slot: &str, width: u32, height: u32) -> &mut Surface {
        let surface = self
            .slots
            .entry(slot.to_string())
            .or_insert_with(|| Surface::new(width, height));
        surface.resize(width, height);
        surface
    }

    pub fn get(&self, slot: &str) -> Option<&Surface> {
        self.slots.get(slot)
    }

    /// Removes the slot's surface. Safe to call when absent.
    pub fn release(&mut self, slot: &str) {
        self.slots.remove(slot);
    }

    pub fn release_all(&mut self) {
        self.slots.clear();
    }

    pub fn len(&self) -> usize {
        self.slots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }
}
