//! The in-memory object store a fetch decodes into.
//!
//! Git objects form a DAG keyed by identifier; representing the store as
//! an identifier-to-record map (rather than a pointer graph) means cycles
//! — which cannot occur in a valid Git history anyway — need no special
//! handling.

use std::collections::HashMap;

use gitfetch_hash::ObjectId;
use gitfetch_object::ObjectType;
use gitfetch_pack::PackedObject;

/// A bounded, in-memory map of every object materialised by a fetch.
///
/// Never spills to disk and is never shared implicitly across requests —
/// each `load_subdirectory` call owns its own store.
#[derive(Debug, Clone, Default)]
pub struct ObjectStore {
    objects: HashMap<ObjectId, (ObjectType, Vec<u8>)>,
}

impl ObjectStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_packed_objects(objects: Vec<PackedObject>) -> Self {
        let mut store = Self::new();
        for obj in objects {
            store.insert(obj.id, obj.obj_type, obj.data);
        }
        store
    }

    pub fn insert(&mut self, id: ObjectId, obj_type: ObjectType, data: Vec<u8>) {
        self.objects.insert(id, (obj_type, data));
    }

    pub fn get(&self, id: &ObjectId) -> Option<(ObjectType, &[u8])> {
        self.objects.get(id).map(|(t, d)| (*t, d.as_slice()))
    }

    pub fn contains(&self, id: &ObjectId) -> bool {
        self.objects.contains_key(id)
    }

    pub fn len(&self) -> usize {
        self.objects.len()
    }

    pub fn is_empty(&self) -> bool {
        self.objects.is_empty()
    }
}
