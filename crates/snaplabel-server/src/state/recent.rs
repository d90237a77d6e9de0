use bytes::Bytes;
use parking_lot::RwLock;
use std::collections::VecDeque;
use uuid::Uuid;

/// Bounded in-memory store of recently classified images, encoded as PNG.
///
/// Oldest entries are evicted first. Nothing is persisted.
pub struct RecentImages {
    capacity: usize,
    entries: RwLock<VecDeque<(Uuid, Bytes)>>,
}

impl RecentImages {
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity,
            entries: RwLock::new(VecDeque::new()),
        }
    }

    /// A zero capacity store keeps nothing
    pub fn is_enabled(&self) -> bool {
        self.capacity > 0
    }

    pub fn insert(&self, id: Uuid, png: Bytes) {
        if !self.is_enabled() {
            return;
        }

        let mut entries = self.entries.write();
        entries.push_front((id, png));
        entries.truncate(self.capacity);
    }

    pub fn get(&self, id: &Uuid) -> Option<Bytes> {
        self.entries
            .read()
            .iter()
            .find(|(entry_id, _)| entry_id == id)
            .map(|(_, png)| png.clone())
    }

    pub fn len(&self) -> usize {
        self.entries.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.read().is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_evicts_oldest() {
        let recent = RecentImages::new(2);
        let ids: Vec<Uuid> = (0..3).map(|_| Uuid::new_v4()).collect();
        for (i, id) in ids.iter().enumerate() {
            recent.insert(*id, Bytes::from(vec![i as u8]));
        }

        assert_eq!(recent.len(), 2);
        assert!(recent.get(&ids[0]).is_none());
        assert_eq!(recent.get(&ids[2]).unwrap(), Bytes::from(vec![2u8]));
    }

    #[test]
    fn test_zero_capacity_keeps_nothing() {
        let recent = RecentImages::new(0);
        let id = Uuid::new_v4();
        recent.insert(id, Bytes::from_static(b"png"));

        assert!(!recent.is_enabled());
        assert!(recent.is_empty());
        assert!(recent.get(&id).is_none());
    }

    #[test]
    fn test_large_capacity_allocates_lazily() {
        let recent = RecentImages::new(usize::MAX);
        recent.insert(Uuid::new_v4(), Bytes::from_static(b"png"));
        assert_eq!(recent.len(), 1);
    }
}
