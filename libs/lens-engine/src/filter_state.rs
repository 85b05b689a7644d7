use lens_api::{FilterPatch, FilterSpec};

/// Pending vs applied filter. Dirty-tracking is a whole-structure
/// comparison; the filter has a small fixed field set.
#[derive(Debug, Clone, Default)]
pub struct FilterTracker {
    pending: FilterSpec,
    applied: FilterSpec,
}

impl FilterTracker {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn update(&mut self, patch: FilterPatch) {
        self.pending.merge(patch);
    }

    pub fn is_dirty(&self) -> bool {
        self.pending != self.applied
    }

    pub fn commit(&mut self) {
        self.applied = self.pending.clone();
    }

    pub fn reset(&mut self) {
        self.pending = FilterSpec::default();
        self.applied = FilterSpec::default();
    }

    pub fn pending(&self) -> &FilterSpec {
        &self.pending
    }

    pub fn applied(&self) -> &FilterSpec {
        &self.applied
    }
}

#[cfg(test)]
mod tests {
    use lens_api::{PartitionSelector, StartPosition};

    use super::*;

    #[test]
    fn any_field_change_makes_dirty_and_commit_clears_it() {
        let patches = [
            FilterPatch::default().partition(PartitionSelector::Partition(2)),
            FilterPatch::default().start_offset(Some(5)),
            FilterPatch::default().start_position(StartPosition::Newest),
            FilterPatch::default().key_filter("k"),
            FilterPatch::default().payload_filter("p"),
        ];
        for patch in patches {
            let mut t = FilterTracker::new();
            assert!(!t.is_dirty());
            t.update(patch.clone());
            assert!(t.is_dirty(), "{patch:?} should make the tracker dirty");
            t.commit();
            assert!(!t.is_dirty());
            assert_eq!(t.pending(), t.applied());
        }
    }

    #[test]
    fn reverting_pending_is_not_dirty() {
        let mut t = FilterTracker::new();
        t.update(FilterPatch::default().key_filter("k"));
        t.update(FilterPatch::default().clear_text_filters());
        assert!(!t.is_dirty());
    }

    #[test]
    fn reset_drops_both_sides() {
        let mut t = FilterTracker::new();
        t.update(FilterPatch::default().key_filter("k"));
        t.commit();
        t.reset();
        assert_eq!(t.applied(), &FilterSpec::default());
        assert!(!t.is_dirty());
    }
}
