use crate::types::EntityKey;
use std::collections::HashMap;
use std::sync::RwLock;

/// User-declared associations from logical entities to external player ids
///
/// Read by every synthesis cycle, mutated only through [`replace`]. A cycle
/// takes one [`snapshot`] up front, so it observes either the old or the
/// new table entirely, never a partial update.
///
/// [`replace`]: MappingStore::replace
/// [`snapshot`]: MappingStore::snapshot
#[derive(Debug, Default)]
pub struct MappingStore {
    inner: RwLock<HashMap<EntityKey, String>>,
}

impl MappingStore {
    pub fn new(initial: HashMap<EntityKey, String>) -> Self {
        Self {
            inner: RwLock::new(initial),
        }
    }

    /// Consistent view of the whole table
    pub fn snapshot(&self) -> HashMap<EntityKey, String> {
        self.inner.read().unwrap().clone()
    }

    /// Mapped external id for one entity
    pub fn get(&self, key: &EntityKey) -> Option<String> {
        self.inner.read().unwrap().get(key).cloned()
    }

    /// Replace the whole table atomically
    pub fn replace(&self, mappings: HashMap<EntityKey, String>) {
        *self.inner.write().unwrap() = mappings;
    }

    pub fn len(&self) -> usize {
        self.inner.read().unwrap().len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.read().unwrap().is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::ServiceScope;

    #[test]
    fn replace_swaps_the_whole_table() {
        let key_a = EntityKey::service(ServiceScope::User, "mpd.service");
        let key_b = EntityKey::client("tunnel_for_bobby_desktop");

        let store = MappingStore::new(HashMap::from([(
            key_a.clone(),
            "media_player.living_room".to_string(),
        )]));
        assert_eq!(store.get(&key_a).as_deref(), Some("media_player.living_room"));

        store.replace(HashMap::from([(key_b.clone(), "media_player.kitchen".to_string())]));
        assert_eq!(store.get(&key_a), None);
        assert_eq!(store.get(&key_b).as_deref(), Some("media_player.kitchen"));

        store.replace(HashMap::new());
        assert!(store.is_empty());
    }
}
