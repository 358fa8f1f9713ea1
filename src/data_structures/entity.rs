//! Entity identity allocation.

/// Numeric identity shared by game objects, components, meshes, materials
/// and scenes.
pub type EntityId = u32;

/// One lifetime of an id. A handle goes stale once its id is destroyed,
/// even if the id is handed out again afterwards.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct EntityHandle {
    pub id: EntityId,
    pub generation: u32,
}

/// Issues ids from a counter starting at 0 and reuses destroyed ids, most
/// recently destroyed first.
#[derive(Debug, Default)]
pub struct EntityAllocator {
    next: EntityId,
    recycled: Vec<EntityId>,
    generations: Vec<u32>,
}

impl EntityAllocator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn create(&mut self) -> EntityId {
        let id = match self.recycled.pop() {
            Some(id) => id,
            None => {
                let id = self.next;
                self.next += 1;
                id
            }
        };
        let slot = id as usize;
        if self.generations.len() <= slot {
            self.generations.resize(slot + 1, 0);
        }
        id
    }

    /// Returns `id` to the pool. Liveness is not checked.
    pub fn destroy(&mut self, id: EntityId) {
        if let Some(generation) = self.generations.get_mut(id as usize) {
            *generation = generation.wrapping_add(1);
        }
        self.recycled.push(id);
    }

    pub fn generation(&self, id: EntityId) -> u32 {
        self.generations.get(id as usize).copied().unwrap_or(0)
    }

    pub fn handle(&self, id: EntityId) -> EntityHandle {
        EntityHandle {
            id,
            generation: self.generation(id),
        }
    }

    /// True while the id behind `handle` has not been destroyed since the
    /// handle was taken.
    pub fn is_current(&self, handle: EntityHandle) -> bool {
        (handle.id as usize) < self.generations.len()
            && self.generation(handle.id) == handle.generation
            && !self.recycled.contains(&handle.id)
    }

    /// Number of distinct ids ever issued.
    pub fn issued(&self) -> u32 {
        self.next
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn counter_starts_at_zero() {
        let mut ids = EntityAllocator::new();
        assert_eq!(ids.create(), 0);
        assert_eq!(ids.create(), 1);
        assert_eq!(ids.issued(), 2);
    }

    #[test]
    fn recycled_ids_come_back_last_in_first_out() {
        let mut ids = EntityAllocator::new();
        let a = ids.create();
        let b = ids.create();
        ids.destroy(a);
        ids.destroy(b);
        assert_eq!(ids.create(), b);
        assert_eq!(ids.create(), a);
        assert_eq!(ids.create(), 2);
    }

    #[test]
    fn handles_go_stale_after_destroy() {
        let mut ids = EntityAllocator::new();
        let id = ids.create();
        let handle = ids.handle(id);
        assert!(ids.is_current(handle));
        ids.destroy(id);
        assert!(!ids.is_current(handle));
        let again = ids.create();
        assert_eq!(again, id);
        assert!(!ids.is_current(handle));
        assert!(ids.is_current(ids.handle(again)));
    }
}
