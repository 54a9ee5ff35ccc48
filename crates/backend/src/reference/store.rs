use crate::error::BackendError;
use crate::object::{ObjectKind, ObjectRef};
use crate::param::ParamValue;
use std::collections::{BTreeMap, BTreeSet};

/// Per-object state kept by the reference device.
#[derive(Debug, Clone)]
pub(crate) struct ObjectEntry {
    /// Writes waiting for the next commit. `None` stages a removal.
    pub staged: BTreeMap<String, Option<ParamValue>>,
    pub committed: BTreeMap<String, ParamValue>,
    /// References held through handles (not through parent parameters).
    pub public_refs: u32,
    pub commits: u64,
}

impl ObjectEntry {
    /// Committed parameters with staged writes applied on top.
    pub fn candidate(&self) -> BTreeMap<String, ParamValue> {
        let mut params = self.committed.clone();
        for (name, value) in &self.staged {
            match value {
                Some(v) => {
                    params.insert(name.clone(), v.clone());
                }
                None => {
                    params.remove(name);
                }
            }
        }
        params
    }

    fn children(&self) -> impl Iterator<Item = ObjectRef> + '_ {
        self.committed
            .values()
            .chain(self.staged.values().flatten())
            .flat_map(|v| v.objects().iter().copied())
    }
}

/// Object table with handle and parameter reference tracking.
///
/// BTreeMap keeps iteration order stable, which keeps traces and collection
/// order deterministic.
#[derive(Debug, Default)]
pub(crate) struct ObjectStore {
    next_id: u64,
    entries: BTreeMap<ObjectRef, ObjectEntry>,
}

impl ObjectStore {
    pub fn insert(&mut self, kind: ObjectKind) -> ObjectRef {
        self.next_id += 1;
        let object = ObjectRef {
            id: self.next_id,
            kind,
        };
        self.entries.insert(
            object,
            ObjectEntry {
                staged: BTreeMap::new(),
                committed: BTreeMap::new(),
                public_refs: 1,
                commits: 0,
            },
        );
        object
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Any live object, owned or not. Used for resolving graph references.
    pub fn get(&self, object: ObjectRef) -> Option<&ObjectEntry> {
        self.entries.get(&object)
    }

    /// An object the caller still owns a handle to.
    pub fn owned(&self, object: ObjectRef) -> Result<&ObjectEntry, BackendError> {
        match self.entries.get(&object) {
            None => Err(BackendError::UnknownObject(object)),
            Some(e) if e.public_refs == 0 => Err(BackendError::Released(object)),
            Some(e) => Ok(e),
        }
    }

    pub fn owned_mut(&mut self, object: ObjectRef) -> Result<&mut ObjectEntry, BackendError> {
        match self.entries.get_mut(&object) {
            None => Err(BackendError::UnknownObject(object)),
            Some(e) if e.public_refs == 0 => Err(BackendError::Released(object)),
            Some(e) => Ok(e),
        }
    }

    /// Drop one handle reference and free whatever became unreachable.
    pub fn release(&mut self, object: ObjectRef) -> Result<Vec<ObjectRef>, BackendError> {
        let entry = self.owned_mut(object)?;
        entry.public_refs -= 1;
        Ok(self.collect())
    }

    /// Remove every object not reachable from an owned handle.
    fn collect(&mut self) -> Vec<ObjectRef> {
        let mut live = BTreeSet::new();
        let mut stack: Vec<ObjectRef> = self
            .entries
            .iter()
            .filter(|(_, e)| e.public_refs > 0)
            .map(|(o, _)| *o)
            .collect();
        while let Some(object) = stack.pop() {
            if !live.insert(object) {
                continue;
            }
            if let Some(entry) = self.entries.get(&object) {
                stack.extend(entry.children().filter(|c| !live.contains(c)));
            }
        }
        let dead: Vec<ObjectRef> = self
            .entries
            .keys()
            .filter(|o| !live.contains(o))
            .copied()
            .collect();
        for object in &dead {
            self.entries.remove(object);
        }
        dead
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn released_object_is_freed() {
        let mut store = ObjectStore::default();
        let cam = store.insert(ObjectKind::Camera);
        let freed = store.release(cam).unwrap();
        assert_eq!(freed, vec![cam]);
        assert!(store.get(cam).is_none());
    }

    #[test]
    fn child_survives_while_parent_refers_to_it() {
        let mut store = ObjectStore::default();
        let surface = store.insert(ObjectKind::Surface);
        let mesh = store.insert(ObjectKind::Geometry);
        store
            .owned_mut(surface)
            .unwrap()
            .staged
            .insert("geometry".into(), Some(ParamValue::Object(mesh)));

        assert!(store.release(mesh).unwrap().is_empty());
        assert!(store.get(mesh).is_some());
        assert!(matches!(
            store.owned(mesh),
            Err(BackendError::Released(_))
        ));

        let freed = store.release(surface).unwrap();
        assert_eq!(freed.len(), 2);
        assert_eq!(store.len(), 0);
    }

    #[test]
    fn double_release_is_rejected() {
        let mut store = ObjectStore::default();
        let world = store.insert(ObjectKind::World);
        let keep = store.insert(ObjectKind::Frame);
        store
            .owned_mut(keep)
            .unwrap()
            .committed
            .insert("world".into(), ParamValue::Object(world));
        store.release(world).unwrap();
        assert!(matches!(
            store.release(world),
            Err(BackendError::Released(_))
        ));
    }

    #[test]
    fn candidate_applies_staged_removals() {
        let mut store = ObjectStore::default();
        let cam = store.insert(ObjectKind::Camera);
        let entry = store.owned_mut(cam).unwrap();
        entry
            .committed
            .insert("aspect".into(), ParamValue::Float(1.0));
        entry.staged.insert("aspect".into(), None);
        entry
            .staged
            .insert("fovy".into(), Some(ParamValue::Float(0.5)));
        let c = entry.candidate();
        assert!(!c.contains_key("aspect"));
        assert_eq!(c.get("fovy"), Some(&ParamValue::Float(0.5)));
    }
}
