/// State of one arena slot
#[derive(Clone, Debug)]
struct ClusterSlot {
    ccf: f64,
    size: usize,

    /// Position of this slot in the active list, None if the slot is free
    active_pos: Option<usize>,
}

/// Storage for a variable number of mixture components
///
/// Clusters are addressed by slot id. Slots of destroyed clusters are recycled, so an id is only
/// meaningful while its cluster is active. Creation and destruction are O(1).
///
#[derive(Clone, Debug, Default)]
pub struct ClusterArena {
    slots: Vec<ClusterSlot>,
    free: Vec<usize>,
    active: Vec<usize>,
}

impl ClusterArena {
    /// Create a cluster holding a single member
    ///
    /// Returns the new cluster id
    ///
    pub fn create_with_member(&mut self, ccf: f64) -> usize {
        let slot = ClusterSlot {
            ccf,
            size: 1,
            active_pos: Some(self.active.len()),
        };
        let id = match self.free.pop() {
            Some(id) => {
                self.slots[id] = slot;
                id
            }
            None => {
                self.slots.push(slot);
                self.slots.len() - 1
            }
        };
        self.active.push(id);
        id
    }

    pub fn add_member(&mut self, id: usize) {
        let slot = &mut self.slots[id];
        assert!(slot.active_pos.is_some(), "adding member to inactive cluster {id}");
        slot.size += 1;
    }

    /// Remove one member from the cluster, destroying the cluster if it becomes empty
    ///
    /// Returns true if the cluster was destroyed
    ///
    pub fn remove_member(&mut self, id: usize) -> bool {
        let slot = &mut self.slots[id];
        assert!(slot.size > 0, "removing member from empty cluster {id}");
        slot.size -= 1;
        if slot.size > 0 {
            return false;
        }

        let pos = slot.active_pos.take().unwrap();
        self.active.swap_remove(pos);
        if let Some(&moved_id) = self.active.get(pos) {
            self.slots[moved_id].active_pos = Some(pos);
        }
        self.free.push(id);
        true
    }

    /// Ids of all clusters with at least one member
    pub fn active_ids(&self) -> &[usize] {
        &self.active
    }

    pub fn active_count(&self) -> usize {
        self.active.len()
    }

    /// Upper bound on cluster ids handed out so far
    pub fn slot_count(&self) -> usize {
        self.slots.len()
    }

    pub fn is_active(&self, id: usize) -> bool {
        self.slots.get(id).is_some_and(|x| x.active_pos.is_some())
    }

    pub fn ccf(&self, id: usize) -> f64 {
        self.slots[id].ccf
    }

    pub fn set_ccf(&mut self, id: usize, ccf: f64) {
        debug_assert!(self.is_active(id));
        self.slots[id].ccf = ccf;
    }

    pub fn size(&self, id: usize) -> usize {
        self.slots[id].size
    }
}
