use crate::types::PointerId;
use tracing::trace;

/// Active pointers in touch order. The front is the oldest.
#[derive(Debug, Clone, Default)]
pub struct PointerCoordinator {
    active: Vec<PointerId>,
}

impl PointerCoordinator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.active.len()
    }

    pub fn is_empty(&self) -> bool {
        self.active.is_empty()
    }

    pub fn contains(&self, pointer: PointerId) -> bool {
        self.active.contains(&pointer)
    }

    pub fn active(&self) -> &[PointerId] {
        &self.active
    }

    pub fn add(&mut self, pointer: PointerId) {
        if !self.contains(pointer) {
            self.active.push(pointer);
        }
        trace!(pointer, active = ?self.active, "pointer added");
    }

    pub fn remove(&mut self, pointer: PointerId) {
        self.active.retain(|&p| p != pointer);
        trace!(pointer, active = ?self.active, "pointer removed");
    }

    pub fn oldest(&self) -> Option<PointerId> {
        self.active.first().copied()
    }

    /// Pointers older than `pointer`. All of them if it is not active.
    pub fn older_than(&self, pointer: PointerId) -> &[PointerId] {
        let end = self
            .active
            .iter()
            .position(|&p| p == pointer)
            .unwrap_or(self.active.len());
        &self.active[..end]
    }

    /// Remove and return the non-modifier pointers older than `pointer`, in
    /// touch order. Older modifiers stay down.
    pub fn take_older_than(&mut self, pointer: PointerId, is_modifier: impl Fn(PointerId) -> bool) -> Vec<PointerId> {
        let older = self.older_than(pointer).len();
        let mut taken = Vec::new();
        let mut index = 0;
        self.active.retain(|&p| {
            let keep = index >= older || is_modifier(p);
            if !keep {
                taken.push(p);
            }
            index += 1;
            keep
        });
        taken
    }

    /// Remove and return every pointer except `keep`, in touch order.
    pub fn take_all_except(&mut self, keep: Option<PointerId>) -> Vec<PointerId> {
        let mut taken = Vec::new();
        self.active.retain(|&p| {
            if Some(p) == keep {
                true
            } else {
                taken.push(p);
                false
            }
        });
        taken
    }

    pub fn has_modifier_older_than(&self, pointer: PointerId, is_modifier: impl Fn(PointerId) -> bool) -> bool {
        self.older_than(pointer).iter().any(|&p| is_modifier(p))
    }

    pub fn any(&self, pred: impl Fn(PointerId) -> bool) -> bool {
        self.active.iter().any(|&p| pred(p))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn coordinator(ids: &[PointerId]) -> PointerCoordinator {
        let mut c = PointerCoordinator::new();
        for &id in ids {
            c.add(id);
        }
        c
    }

    #[test]
    fn test_touch_order_and_duplicates() {
        let mut c = coordinator(&[3, 1, 2]);
        c.add(1);
        assert_eq!(c.active(), &[3, 1, 2]);
        assert_eq!(c.oldest(), Some(3));
        c.remove(3);
        assert_eq!(c.oldest(), Some(1));
        assert_eq!(c.len(), 2);
    }

    #[test]
    fn test_take_older_keeps_modifiers() {
        // 0 is a modifier (shift held), 1 a letter, 2 lifts now.
        let mut c = coordinator(&[0, 1, 2, 3]);
        let taken = c.take_older_than(2, |p| p == 0);
        assert_eq!(taken, vec![1]);
        assert_eq!(c.active(), &[0, 2, 3]);
    }

    #[test]
    fn test_take_older_of_unknown_pointer_takes_all() {
        let mut c = coordinator(&[0, 1]);
        let taken = c.take_older_than(9, |_| false);
        assert_eq!(taken, vec![0, 1]);
        assert!(c.is_empty());
    }

    #[test]
    fn test_take_all_except() {
        let mut c = coordinator(&[0, 1, 2]);
        assert_eq!(c.take_all_except(Some(1)), vec![0, 2]);
        assert_eq!(c.active(), &[1]);
        assert_eq!(c.take_all_except(None), vec![1]);
    }

    #[test]
    fn test_older_modifier_lookup() {
        let c = coordinator(&[0, 1, 2]);
        assert!(c.has_modifier_older_than(2, |p| p == 1));
        assert!(!c.has_modifier_older_than(1, |p| p == 1));
        assert!(!c.has_modifier_older_than(0, |_| true));
        assert!(c.any(|p| p == 2));
    }
}
