//! Multi-index object store.
//!
//! [`IndexedRegistry`] backs both the component list of a game object and the
//! game object list of a scene. Objects are addressed by id and can also be
//! found by a unique name, any number of tags, a kind and a group.

use std::{collections::HashMap, hash::Hash};

use crate::{data_structures::entity::EntityId, error::EngineError};

/// Secondary keys an object is indexed under.
#[derive(Clone, Debug)]
pub struct RegistryKeys<K, G> {
    pub kind: Option<K>,
    pub name: Option<String>,
    pub tags: Vec<String>,
    pub group: Option<G>,
}

impl<K, G> Default for RegistryKeys<K, G> {
    fn default() -> Self {
        Self {
            kind: None,
            name: None,
            tags: Vec::new(),
            group: None,
        }
    }
}

impl<K, G> RegistryKeys<K, G> {
    pub fn named(name: impl Into<String>) -> Self {
        Self {
            name: Some(name.into()),
            ..Default::default()
        }
    }

    pub fn with_kind(mut self, kind: K) -> Self {
        self.kind = Some(kind);
        self
    }

    pub fn with_group(mut self, group: G) -> Self {
        self.group = Some(group);
        self
    }

    pub fn with_tags<I, S>(mut self, tags: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.tags.extend(tags.into_iter().map(Into::into));
        self
    }
}

#[derive(Debug)]
struct Entry<T, K, G> {
    object: T,
    name: Option<String>,
    tags: Vec<String>,
    kind: Option<K>,
    group: Option<G>,
}

#[derive(Debug)]
pub struct IndexedRegistry<T, K = String, G = String> {
    entries: HashMap<EntityId, Entry<T, K, G>>,
    order: Vec<EntityId>,
    names: HashMap<String, EntityId>,
    tags: HashMap<String, Vec<EntityId>>,
    kinds: HashMap<K, Vec<EntityId>>,
    groups: HashMap<G, Vec<EntityId>>,
}

impl<T, K, G> Default for IndexedRegistry<T, K, G> {
    fn default() -> Self {
        Self {
            entries: HashMap::new(),
            order: Vec::new(),
            names: HashMap::new(),
            tags: HashMap::new(),
            kinds: HashMap::new(),
            groups: HashMap::new(),
        }
    }
}

fn push_once(bucket: &mut Vec<EntityId>, id: EntityId) {
    if !bucket.contains(&id) {
        bucket.push(id);
    }
}

fn evict<Q: Hash + Eq>(index: &mut HashMap<Q, Vec<EntityId>>, key: &Q, id: EntityId) {
    if let Some(bucket) = index.get_mut(key) {
        bucket.retain(|other| *other != id);
        if bucket.is_empty() {
            index.remove(key);
        }
    }
}

impl<T, K, G> IndexedRegistry<T, K, G>
where
    K: Hash + Eq + Clone,
    G: Hash + Eq + Clone,
{
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers `object` under `id` and every key in `keys`.
    ///
    /// A taken name is suffixed with `_1`, `_2`, ... until it is unique. A
    /// duplicate id is refused without touching any index.
    pub fn add(
        &mut self,
        id: EntityId,
        object: T,
        keys: RegistryKeys<K, G>,
    ) -> Result<(), EngineError> {
        if self.entries.contains_key(&id) {
            log::error!("Object {} is already registered", id);
            return Err(EngineError::DuplicateId(id));
        }

        let name = keys.name.map(|requested| self.unique_name(&requested));
        if let Some(name) = &name {
            self.names.insert(name.clone(), id);
        }
        let mut tags: Vec<String> = Vec::new();
        for tag in keys.tags {
            push_once(self.tags.entry(tag.clone()).or_default(), id);
            if !tags.contains(&tag) {
                tags.push(tag);
            }
        }
        if let Some(kind) = &keys.kind {
            push_once(self.kinds.entry(kind.clone()).or_default(), id);
        }
        if let Some(group) = &keys.group {
            push_once(self.groups.entry(group.clone()).or_default(), id);
        }

        self.order.push(id);
        self.entries.insert(
            id,
            Entry {
                object,
                name,
                tags,
                kind: keys.kind,
                group: keys.group,
            },
        );
        Ok(())
    }

    fn unique_name(&self, requested: &str) -> String {
        if !self.names.contains_key(requested) {
            return requested.to_string();
        }
        let mut suffix = 1;
        loop {
            let candidate = format!("{}_{}", requested, suffix);
            if !self.names.contains_key(&candidate) {
                return candidate;
            }
            suffix += 1;
        }
    }

    /// Removes `id` from every index. Unknown ids are ignored.
    pub fn remove(&mut self, id: EntityId) -> Option<T> {
        let entry = self.entries.remove(&id)?;
        self.order.retain(|other| *other != id);
        if let Some(name) = &entry.name {
            self.names.remove(name);
        }
        for tag in &entry.tags {
            evict(&mut self.tags, tag, id);
        }
        if let Some(kind) = &entry.kind {
            evict(&mut self.kinds, kind, id);
        }
        if let Some(group) = &entry.group {
            evict(&mut self.groups, group, id);
        }
        Some(entry.object)
    }

    /// Adds a tag to an already registered object.
    pub fn tag(&mut self, id: EntityId, tag: impl Into<String>) -> bool {
        let tag = tag.into();
        let Some(entry) = self.entries.get_mut(&id) else {
            return false;
        };
        if !entry.tags.contains(&tag) {
            entry.tags.push(tag.clone());
        }
        push_once(self.tags.entry(tag).or_default(), id);
        true
    }

    pub fn get(&self, id: EntityId) -> Option<&T> {
        self.entries.get(&id).map(|entry| &entry.object)
    }

    pub fn get_mut(&mut self, id: EntityId) -> Option<&mut T> {
        self.entries.get_mut(&id).map(|entry| &mut entry.object)
    }

    pub fn contains(&self, id: EntityId) -> bool {
        self.entries.contains_key(&id)
    }

    pub fn id_by_name(&self, name: &str) -> Option<EntityId> {
        self.names.get(name).copied()
    }

    pub fn get_by_name(&self, name: &str) -> Option<&T> {
        self.id_by_name(name).and_then(|id| self.get(id))
    }

    /// The stored, possibly disambiguated, name of `id`.
    pub fn name_of(&self, id: EntityId) -> Option<&str> {
        self.entries.get(&id).and_then(|entry| entry.name.as_deref())
    }

    pub fn ids_by_tag(&self, tag: &str) -> &[EntityId] {
        self.tags.get(tag).map(Vec::as_slice).unwrap_or(&[])
    }

    pub fn by_tag(&self, tag: &str) -> Vec<&T> {
        self.resolve(self.ids_by_tag(tag))
    }

    pub fn ids_by_kind(&self, kind: &K) -> &[EntityId] {
        self.kinds.get(kind).map(Vec::as_slice).unwrap_or(&[])
    }

    pub fn by_kind(&self, kind: &K) -> Vec<&T> {
        self.resolve(self.ids_by_kind(kind))
    }

    pub fn ids_by_group(&self, group: &G) -> &[EntityId] {
        self.groups.get(group).map(Vec::as_slice).unwrap_or(&[])
    }

    pub fn by_group(&self, group: &G) -> Vec<&T> {
        self.resolve(self.ids_by_group(group))
    }

    fn resolve(&self, ids: &[EntityId]) -> Vec<&T> {
        ids.iter().filter_map(|id| self.get(*id)).collect()
    }

    /// Ids in insertion order.
    pub fn ids(&self) -> &[EntityId] {
        &self.order
    }

    /// Objects in insertion order.
    pub fn iter(&self) -> impl Iterator<Item = (EntityId, &T)> {
        self.order
            .iter()
            .filter_map(|id| self.entries.get(id).map(|entry| (*id, &entry.object)))
    }

    pub fn values_mut(&mut self) -> impl Iterator<Item = &mut T> {
        self.entries.values_mut().map(|entry| &mut entry.object)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    type Registry = IndexedRegistry<&'static str>;

    #[test]
    fn colliding_names_get_numeric_suffixes() {
        let mut registry = Registry::new();
        registry.add(1, "a", RegistryKeys::named("X")).unwrap();
        registry.add(2, "b", RegistryKeys::named("X")).unwrap();
        registry.add(3, "c", RegistryKeys::named("X")).unwrap();
        assert_eq!(registry.name_of(1), Some("X"));
        assert_eq!(registry.name_of(2), Some("X_1"));
        assert_eq!(registry.name_of(3), Some("X_2"));
        assert_eq!(registry.get_by_name("X_1"), Some(&"b"));
    }

    #[test]
    fn duplicate_id_leaves_indexes_untouched() {
        let mut registry = Registry::new();
        registry
            .add(1, "a", RegistryKeys::named("first").with_tags(["t"]))
            .unwrap();
        let err = registry
            .add(1, "b", RegistryKeys::named("second").with_tags(["u"]))
            .unwrap_err();
        assert!(matches!(err, EngineError::DuplicateId(1)));
        assert_eq!(registry.get(1), Some(&"a"));
        assert!(registry.get_by_name("second").is_none());
        assert!(registry.by_tag("u").is_empty());
    }

    #[test]
    fn repeated_tags_index_once() {
        let mut registry = Registry::new();
        registry
            .add(7, "a", RegistryKeys::default().with_tags(["enemy", "enemy"]))
            .unwrap();
        registry.tag(7, "enemy");
        assert_eq!(registry.ids_by_tag("enemy"), &[7]);
    }

    #[test]
    fn removal_evicts_every_index() {
        let mut registry = Registry::new();
        let keys = RegistryKeys::named("X")
            .with_tags(["t"])
            .with_kind("kind".to_string())
            .with_group("group".to_string());
        registry.add(1, "a", keys.clone()).unwrap();
        registry.add(2, "b", keys).unwrap();

        assert_eq!(registry.remove(1), Some("a"));
        assert_eq!(registry.remove(1), None);
        assert!(registry.get_by_name("X").is_none());
        assert_eq!(registry.get_by_name("X_1"), Some(&"b"));
        assert_eq!(registry.ids_by_tag("t"), &[2]);
        assert_eq!(registry.ids_by_kind(&"kind".to_string()), &[2]);
        assert_eq!(registry.ids_by_group(&"group".to_string()), &[2]);
        assert_eq!(registry.ids(), &[2]);
    }
}
