//! Object store.
//!
//! Holds the current state of every object keyed by id, in insertion order
//! (the order the rendering surface draws them and the document saves them).
//! Pure data: the store knows nothing about bindings or propagation.

use crate::graph::object::{Bridge, Object, SequencedBlock, Slider};
use crate::types::ObjectId;
use std::collections::HashMap;

#[derive(Debug, Clone, Default)]
pub struct ObjectStore {
    objects: Vec<Object>,
    index: HashMap<ObjectId, usize>,
}

impl ObjectStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a store from a list. Later duplicates replace earlier ones.
    pub fn from_objects(objects: impl IntoIterator<Item = Object>) -> Self {
        let mut store = Self::new();
        for obj in objects {
            store.insert(obj);
        }
        store
    }

    /// Insert an object, replacing (in place) any object with the same id.
    pub fn insert(&mut self, object: Object) -> Option<Object> {
        match self.index.get(object.id()) {
            Some(&idx) => Some(std::mem::replace(&mut self.objects[idx], object)),
            None => {
                self.index.insert(object.id().clone(), self.objects.len());
                self.objects.push(object);
                None
            }
        }
    }

    pub fn remove(&mut self, id: &ObjectId) -> Option<Object> {
        let idx = self.index.remove(id)?;
        let removed = self.objects.remove(idx);
        for slot in self.index.values_mut() {
            if *slot > idx {
                *slot -= 1;
            }
        }
        Some(removed)
    }

    pub fn get(&self, id: &ObjectId) -> Option<&Object> {
        self.index.get(id).map(|&idx| &self.objects[idx])
    }

    pub fn get_mut(&mut self, id: &ObjectId) -> Option<&mut Object> {
        match self.index.get(id) {
            Some(&idx) => Some(&mut self.objects[idx]),
            None => None,
        }
    }

    pub fn contains(&self, id: &ObjectId) -> bool {
        self.index.contains_key(id)
    }

    pub fn len(&self) -> usize {
        self.objects.len()
    }

    pub fn is_empty(&self) -> bool {
        self.objects.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Object> {
        self.objects.iter()
    }

    pub fn sliders(&self) -> impl Iterator<Item = &Slider> {
        self.objects.iter().filter_map(Object::as_slider)
    }

    pub fn blocks(&self) -> impl Iterator<Item = &SequencedBlock> {
        self.objects.iter().filter_map(Object::as_block)
    }

    pub fn bridges(&self) -> impl Iterator<Item = &Bridge> {
        self.objects.iter().filter_map(Object::as_bridge)
    }

    pub fn slider(&self, id: &ObjectId) -> Option<&Slider> {
        self.get(id).and_then(Object::as_slider)
    }

    pub fn block(&self, id: &ObjectId) -> Option<&SequencedBlock> {
        self.get(id).and_then(Object::as_block)
    }

    pub fn bridge(&self, id: &ObjectId) -> Option<&Bridge> {
        self.get(id).and_then(Object::as_bridge)
    }

    /// Owned copy of every object in store order.
    pub fn to_vec(&self) -> Vec<Object> {
        self.objects.clone()
    }
}
