//! Generational arena used to store split nodes and tabulated entries.
//!
//! Slots are addressed by `ArenaIndex` (slot + generation). A removed slot is recycled,
//! but its generation is bumped so that stale handles resolve to `None` instead of
//! silently pointing at a newer value.
use super::tab_error::invariant_violation;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ArenaIndex {
    pub(crate) slot: u32,
    pub(crate) generation: u32,
}

#[derive(Debug, Clone)]
struct Slot<T> {
    generation: u32,
    value: Option<T>,
}

#[derive(Debug, Clone)]
pub struct Arena<T> {
    slots: Vec<Slot<T>>,
    free: Vec<u32>,
    len: usize,
}

/// slot numbers are 32 bit; running past them would alias live handles
fn slot_number(position: usize) -> u32 {
    match u32::try_from(position) {
        Ok(slot) => slot,
        Err(_) => invariant_violation(format!(
            "arena slot {} does not fit into a 32 bit index",
            position
        )),
    }
}

impl<T> Default for Arena<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> Arena<T> {
    pub fn new() -> Self {
        Self {
            slots: Vec::new(),
            free: Vec::new(),
            len: 0,
        }
    }

    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            slots: Vec::with_capacity(capacity),
            free: Vec::new(),
            len: 0,
        }
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    pub fn insert(&mut self, value: T) -> ArenaIndex {
        self.len += 1;
        if let Some(slot) = self.free.pop() {
            let entry = &mut self.slots[slot as usize];
            entry.value = Some(value);
            return ArenaIndex {
                slot,
                generation: entry.generation,
            };
        }
        let slot = slot_number(self.slots.len());
        self.slots.push(Slot {
            generation: 0,
            value: Some(value),
        });
        ArenaIndex {
            slot,
            generation: 0,
        }
    }

    pub fn get(&self, index: ArenaIndex) -> Option<&T> {
        self.slots
            .get(index.slot as usize)
            .filter(|s| s.generation == index.generation)
            .and_then(|s| s.value.as_ref())
    }

    pub fn get_mut(&mut self, index: ArenaIndex) -> Option<&mut T> {
        self.slots
            .get_mut(index.slot as usize)
            .filter(|s| s.generation == index.generation)
            .and_then(|s| s.value.as_mut())
    }

    pub fn contains(&self, index: ArenaIndex) -> bool {
        self.get(index).is_some()
    }

    pub fn remove(&mut self, index: ArenaIndex) -> Option<T> {
        let entry = self.slots.get_mut(index.slot as usize)?;
        if entry.generation != index.generation {
            return None;
        }
        let value = entry.value.take()?;
        entry.generation = entry.generation.wrapping_add(1);
        self.free.push(index.slot);
        self.len -= 1;
        Some(value)
    }

    /// all live (index, value) pairs in slot order
    pub fn iter(&self) -> impl Iterator<Item = (ArenaIndex, &T)> {
        self.slots.iter().enumerate().filter_map(|(i, s)| {
            s.value.as_ref().map(|v| {
                (
                    ArenaIndex {
                        slot: slot_number(i),
                        generation: s.generation,
                    },
                    v,
                )
            })
        })
    }
}
