//! In-memory manifest object store.
//!
//! Objects are indexed by id, by type and by declaring application. Every
//! mutation bumps a zero-payload change signal; observers re-run their
//! queries and diff the results themselves.

use crate::manifest::model::{ManifestObject, ManifestObjectFilter};
use crate::qualifier::{is_equal, QualifierMatcher};
use std::collections::HashMap;
use tokio::sync::watch;
use tracing::trace;

/// Indexed repository of capabilities or intentions.
pub struct ManifestObjectStore<T: ManifestObject> {
    /// Objects by id
    objects: HashMap<String, T>,
    /// Ids in insertion order
    order: Vec<String>,
    /// Ids by type
    by_type: HashMap<String, Vec<String>>,
    /// Ids by declaring application
    by_app: HashMap<String, Vec<String>>,
    /// Change signal
    changes: watch::Sender<()>,
}

impl<T: ManifestObject> ManifestObjectStore<T> {
    /// Create an empty store.
    pub fn new() -> Self {
        let (changes, _) = watch::channel(());
        Self {
            objects: HashMap::new(),
            order: Vec::new(),
            by_type: HashMap::new(),
            by_app: HashMap::new(),
            changes,
        }
    }

    /// Add an object, replacing any object with the same id.
    pub fn add(&mut self, object: T) {
        let id = object.id().to_string();
        self.unindex(&id);

        self.by_type
            .entry(object.object_type().to_string())
            .or_default()
            .push(id.clone());
        self.by_app
            .entry(object.app_symbolic_name().to_string())
            .or_default()
            .push(id.clone());
        self.order.push(id.clone());
        trace!(id = %id, object_type = object.object_type(), "manifest object added");
        self.objects.insert(id, object);

        self.changes.send_replace(());
    }

    /// Find objects matching the filter.
    ///
    /// The filter's qualifier is compared against each stored qualifier with
    /// `matcher(stored, filter)`; other criteria compare exactly.
    pub fn find(&self, filter: &ManifestObjectFilter, matcher: QualifierMatcher) -> Vec<&T> {
        self.candidates(filter)
            .iter()
            .filter_map(|id| self.objects.get(id))
            .filter(|object| Self::matches(object, filter, matcher))
            .collect()
    }

    /// Remove objects whose stored fields equal the filter's criteria.
    ///
    /// The qualifier criterion uses exact equality, so a wildcard filter only
    /// removes objects whose stored qualifier is literally that wildcard.
    pub fn remove(&mut self, filter: &ManifestObjectFilter) -> Vec<T> {
        self.remove_if(filter, |_| true)
    }

    /// Like [`remove`](Self::remove), additionally requiring `predicate`.
    pub fn remove_if(&mut self, filter: &ManifestObjectFilter, predicate: impl Fn(&T) -> bool) -> Vec<T> {
        let doomed: Vec<String> = self
            .find(filter, is_equal)
            .into_iter()
            .filter(|object| predicate(*object))
            .map(|object| object.id().to_string())
            .collect();

        let removed: Vec<T> = doomed.iter().filter_map(|id| self.unindex(id)).collect();
        if !removed.is_empty() {
            trace!(count = removed.len(), "manifest objects removed");
            self.changes.send_replace(());
        }
        removed
    }

    /// Get an object by id.
    pub fn get(&self, id: &str) -> Option<&T> {
        self.objects.get(id)
    }

    /// Number of stored objects.
    pub fn len(&self) -> usize {
        self.objects.len()
    }

    /// Whether the store is empty.
    pub fn is_empty(&self) -> bool {
        self.objects.is_empty()
    }

    /// Subscribe to the change signal.
    pub fn subscribe(&self) -> watch::Receiver<()> {
        self.changes.subscribe()
    }

    fn candidates(&self, filter: &ManifestObjectFilter) -> Vec<String> {
        if let Some(id) = &filter.id {
            return vec![id.clone()];
        }
        let by_type = filter
            .object_type
            .as_ref()
            .map(|t| self.by_type.get(t).cloned().unwrap_or_default());
        let by_app = filter
            .app_symbolic_name
            .as_ref()
            .map(|a| self.by_app.get(a).cloned().unwrap_or_default());

        match (by_type, by_app) {
            (Some(types), Some(apps)) => types.into_iter().filter(|id| apps.contains(id)).collect(),
            (Some(ids), None) | (None, Some(ids)) => ids,
            (None, None) => self.order.clone(),
        }
    }

    fn matches(object: &T, filter: &ManifestObjectFilter, matcher: QualifierMatcher) -> bool {
        if let Some(id) = &filter.id {
            if object.id() != id.as_str() {
                return false;
            }
        }

        if let Some(object_type) = &filter.object_type {
            if object.object_type() != object_type.as_str() {
                return false;
            }
        }

        if let Some(app) = &filter.app_symbolic_name {
            if object.app_symbolic_name() != app.as_str() {
                return false;
            }
        }

        match &filter.qualifier {
            Some(qualifier) => matcher(Some(object.qualifier()), Some(qualifier)),
            None => true,
        }
    }

    fn unindex(&mut self, id: &str) -> Option<T> {
        let object = self.objects.remove(id)?;
        self.order.retain(|i| i != id);
        Self::unindex_from(&mut self.by_type, object.object_type(), id);
        Self::unindex_from(&mut self.by_app, object.app_symbolic_name(), id);
        Some(object)
    }

    fn unindex_from(index: &mut HashMap<String, Vec<String>>, key: &str, id: &str) {
        if let Some(ids) = index.get_mut(key) {
            ids.retain(|i| i != id);
            if ids.is_empty() {
                index.remove(key);
            }
        }
    }
}

impl<T: ManifestObject> Default for ManifestObjectStore<T> {
    fn default() -> Self {
        Self::new()
    }
}
