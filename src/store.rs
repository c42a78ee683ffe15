//! In-memory band collection
//!
//! Holds the ordered sequence of bands plus an id -> owner index used for
//! authorization lookups. The dispatcher only calls the mutating methods
//! after the matching persistence call has succeeded.

use crate::error::{BandHubError, Result};
use crate::model::{Band, BandFields};
use std::collections::HashMap;

#[derive(Debug, Default)]
pub struct CollectionStore {
    bands: Vec<Band>,
    owners: HashMap<i64, String>,
}

impl CollectionStore {
    /// Create an empty store
    pub fn new() -> Self {
        Self::default()
    }

    /// Build the store from rows read at startup
    pub fn hydrate(bands: Vec<Band>) -> Self {
        let owners = bands
            .iter()
            .map(|band| (band.id, band.owner_username.clone()))
            .collect();
        Self { bands, owners }
    }

    pub fn len(&self) -> usize {
        self.bands.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bands.is_empty()
    }

    /// Read-only copy of the collection
    pub fn snapshot(&self) -> Vec<Band> {
        self.bands.clone()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Band> {
        self.bands.iter()
    }

    pub fn owner_of(&self, id: i64) -> Option<&str> {
        self.owners.get(&id).map(String::as_str)
    }

    pub fn get(&self, id: i64) -> Option<&Band> {
        self.bands.iter().find(|band| band.id == id)
    }

    /// Insert at `index`, which may equal the current length
    pub fn insert_at(&mut self, index: usize, band: Band) -> Result<()> {
        if index > self.bands.len() {
            return Err(BandHubError::Validation(format!(
                "index must be between 0 and {}, got {}",
                self.bands.len(),
                index
            )));
        }
        self.owners.insert(band.id, band.owner_username.clone());
        self.bands.insert(index, band);
        Ok(())
    }

    pub fn remove_by_id(&mut self, id: i64) -> Option<Band> {
        let position = self.bands.iter().position(|band| band.id == id)?;
        self.owners.remove(&id);
        Some(self.bands.remove(position))
    }

    /// Replace the mutable fields of band `id`, returning the previous value
    pub fn replace_by_id(&mut self, id: i64, fields: BandFields) -> Option<Band> {
        let band = self.bands.iter_mut().find(|band| band.id == id)?;
        let previous = band.clone();
        band.apply(fields);
        Some(previous)
    }

    /// Remove every band matching `predicate`, returning the removed bands
    pub fn clear_matching<F>(&mut self, mut predicate: F) -> Vec<Band>
    where
        F: FnMut(&Band) -> bool,
    {
        let (removed, kept): (Vec<Band>, Vec<Band>) =
            std::mem::take(&mut self.bands).into_iter().partition(|band| predicate(band));
        for band in &removed {
            self.owners.remove(&band.id);
        }
        self.bands = kept;
        removed
    }

    pub fn min(&self) -> Option<&Band> {
        self.bands.iter().min_by(|a, b| a.ordering(b))
    }

    pub fn max(&self) -> Option<&Band> {
        self.bands.iter().max_by(|a, b| a.ordering(b))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::BandDraft;
    use chrono::Utc;

    fn band(id: i64, owner: &str, participants: i64) -> Band {
        let fields = BandDraft::new(format!("band{}", id), 0.0, 0.0, participants, 0)
            .validate()
            .unwrap();
        Band::from_fields(id, Utc::now(), owner, fields)
    }

    #[test]
    fn test_hydrate_and_lookup() {
        let store = CollectionStore::hydrate(vec![band(1, "alice", 2), band(2, "bob", 3)]);
        assert_eq!(store.len(), 2);
        assert_eq!(store.owner_of(2), Some("bob"));
        assert_eq!(store.owner_of(3), None);
        assert_eq!(store.get(1).unwrap().name, "band1");
    }

    #[test]
    fn test_insert_at_bounds() {
        let mut store = CollectionStore::new();
        store.insert_at(0, band(1, "alice", 1)).unwrap();
        store.insert_at(1, band(2, "alice", 1)).unwrap();
        store.insert_at(0, band(3, "alice", 1)).unwrap();
        let ids: Vec<i64> = store.iter().map(|b| b.id).collect();
        assert_eq!(ids, vec![3, 1, 2]);

        let err = store.insert_at(5, band(4, "alice", 1)).unwrap_err();
        assert!(matches!(err, BandHubError::Validation(_)));
        assert!(store.owner_of(4).is_none());
    }

    #[test]
    fn test_remove_and_replace() {
        let mut store = CollectionStore::hydrate(vec![band(1, "alice", 2), band(2, "bob", 3)]);
        let fields = BandDraft::new("new", 1.0, 1.0, 9, 9).validate().unwrap();
        let previous = store.replace_by_id(2, fields).unwrap();
        assert_eq!(previous.name, "band2");
        assert_eq!(store.get(2).unwrap().name, "new");
        assert_eq!(store.owner_of(2), Some("bob"));

        assert!(store.remove_by_id(1).is_some());
        assert!(store.remove_by_id(1).is_none());
        assert!(store.owner_of(1).is_none());
        assert_eq!(store.len(), 1);
    }

    #[test]
    fn test_clear_matching_owner() {
        let mut store = CollectionStore::hydrate(vec![
            band(1, "alice", 1),
            band(2, "bob", 1),
            band(3, "alice", 1),
        ]);
        let removed = store.clear_matching(|b| b.owner_username == "alice");
        assert_eq!(removed.len(), 2);
        assert_eq!(store.len(), 1);
        assert_eq!(store.owner_of(2), Some("bob"));
        assert_eq!(store.owner_of(3), None);
    }

    #[test]
    fn test_extremes() {
        let store = CollectionStore::hydrate(vec![
            band(1, "alice", 5),
            band(2, "alice", 2),
            band(3, "alice", 8),
        ]);
        assert_eq!(store.min().unwrap().id, 2);
        assert_eq!(store.max().unwrap().id, 3);
        assert!(CollectionStore::new().min().is_none());
    }
}
