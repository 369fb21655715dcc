//! NamedRegistry - 名前付きエントリの登録と管理
//!
//! # 設計原則
//! - HashMap での型消去された trait object の管理
//! - `Any` へのダウンキャストで具体的なハンドル型を復元
//! - Arc による共有所有権
//!
//! One registry per entry kind (debounce, throttle, queue, process). Entries are stored
//! as `Arc<dyn Entry>` and downcast back to their concrete handle type on lookup, so one
//! registry can hold `TaskQueue<String>` and `TaskQueue<u64>` under different names.
//! Reusing a name with another type is reported as `RegistryError::TypeMismatch`.
//!
//! The lock is only held for map operations; entry construction must not run user code.

use std::any::Any;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use crate::error::RegistryError;
use crate::guard::lock;

/// Something a registry can own.
pub(crate) trait Entry: Any + Send + Sync {
    /// Release timers and pending work; called by `Flow::reset`.
    fn dispose(&self);

    fn into_any(self: Arc<Self>) -> Arc<dyn Any + Send + Sync>;
}

pub(crate) struct NamedRegistry {
    kind: &'static str,
    entries: Mutex<HashMap<String, Arc<dyn Entry>>>,
}

impl NamedRegistry {
    pub(crate) fn new(kind: &'static str) -> Arc<Self> {
        Arc::new(Self {
            kind,
            entries: Mutex::new(HashMap::new()),
        })
    }

    fn downcast<E: Entry + Clone>(
        &self,
        name: &str,
        entry: &Arc<dyn Entry>,
    ) -> Result<E, RegistryError> {
        Arc::clone(entry)
            .into_any()
            .downcast::<E>()
            .map(|entry| E::clone(&entry))
            .map_err(|_| {
                tracing::warn!(kind = self.kind, name, "registry type mismatch");
                RegistryError::TypeMismatch {
                    kind: self.kind,
                    name: name.to_string(),
                }
            })
    }

    pub(crate) fn get<E: Entry + Clone>(&self, name: &str) -> Result<Option<E>, RegistryError> {
        let entries = lock(&self.entries);
        entries
            .get(name)
            .map(|entry| self.downcast(name, entry))
            .transpose()
    }

    /// Return the entry under `name` when `keep` accepts it, otherwise insert `make()`.
    /// The flag is `true` when a new entry was created.
    pub(crate) fn lookup_or_insert<E, K, M>(
        &self,
        name: &str,
        keep: K,
        make: M,
    ) -> Result<(E, bool), RegistryError>
    where
        E: Entry + Clone,
        K: FnOnce(&E) -> bool,
        M: FnOnce() -> E,
    {
        let mut entries = lock(&self.entries);
        if let Some(existing) = entries.get(name) {
            let existing: E = self.downcast(name, existing)?;
            if keep(&existing) {
                return Ok((existing, false));
            }
        }

        let created = make();
        entries.insert(name.to_string(), Arc::new(created.clone()));
        Ok((created, true))
    }

    /// Remove the entry under `name` if it is an `E` and `matches` accepts it.
    pub(crate) fn remove_if<E, P>(&self, name: &str, matches: P) -> bool
    where
        E: Entry + Clone,
        P: FnOnce(&E) -> bool,
    {
        let mut entries = lock(&self.entries);
        let hit = entries
            .get(name)
            .and_then(|entry| Arc::clone(entry).into_any().downcast::<E>().ok())
            .is_some_and(|entry| matches(entry.as_ref()));
        if hit {
            entries.remove(name);
        }
        hit
    }

    pub(crate) fn contains(&self, name: &str) -> bool {
        lock(&self.entries).contains_key(name)
    }

    /// Sorted entry names.
    pub(crate) fn names(&self) -> Vec<String> {
        let mut names: Vec<String> = lock(&self.entries).keys().cloned().collect();
        names.sort_unstable();
        names
    }

    /// Drop every entry, disposing each one outside the lock.
    pub(crate) fn clear(&self) -> usize {
        let drained: Vec<Arc<dyn Entry>> = lock(&self.entries).drain().map(|(_, e)| e).collect();
        for entry in &drained {
            entry.dispose();
        }
        drained.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[derive(Clone)]
    struct Counter {
        id: u32,
        disposed: Arc<AtomicUsize>,
    }

    impl Entry for Counter {
        fn dispose(&self) {
            self.disposed.fetch_add(1, Ordering::SeqCst);
        }

        fn into_any(self: Arc<Self>) -> Arc<dyn Any + Send + Sync> {
            self
        }
    }

    #[derive(Clone)]
    struct Other;

    impl Entry for Other {
        fn dispose(&self) {}

        fn into_any(self: Arc<Self>) -> Arc<dyn Any + Send + Sync> {
            self
        }
    }

    fn counter(id: u32) -> Counter {
        Counter {
            id,
            disposed: Arc::new(AtomicUsize::new(0)),
        }
    }

    #[test]
    fn first_insert_wins() {
        let registry = NamedRegistry::new("test");

        let (a, created) = registry
            .lookup_or_insert("x", |_| true, || counter(1))
            .unwrap();
        assert!(created);
        assert_eq!(a.id, 1);

        let (b, created) = registry
            .lookup_or_insert("x", |_| true, || counter(2))
            .unwrap();
        assert!(!created);
        assert_eq!(b.id, 1);
    }

    #[test]
    fn rejected_entry_is_replaced() {
        let registry = NamedRegistry::new("test");
        registry
            .lookup_or_insert("x", |_| true, || counter(1))
            .unwrap();

        let (c, created) = registry
            .lookup_or_insert("x", |c: &Counter| c.id != 1, || counter(2))
            .unwrap();
        assert!(created);
        assert_eq!(c.id, 2);
    }

    #[test]
    fn type_mismatch_is_an_error() {
        let registry = NamedRegistry::new("test");
        registry
            .lookup_or_insert("x", |_| true, || counter(1))
            .unwrap();

        let err = registry
            .lookup_or_insert("x", |_| true, || Other)
            .err()
            .unwrap();
        assert!(matches!(err, RegistryError::TypeMismatch { kind: "test", .. }));
        assert!(registry.get::<Other>("x").is_err());
    }

    #[test]
    fn remove_if_checks_the_predicate() {
        let registry = NamedRegistry::new("test");
        registry
            .lookup_or_insert("x", |_| true, || counter(1))
            .unwrap();

        assert!(!registry.remove_if("x", |c: &Counter| c.id == 2));
        assert!(!registry.remove_if("x", |_: &Other| true));
        assert!(registry.contains("x"));

        assert!(registry.remove_if("x", |c: &Counter| c.id == 1));
        assert!(!registry.contains("x"));
        assert!(registry.get::<Counter>("x").unwrap().is_none());
    }

    #[test]
    fn clear_disposes_everything() {
        let registry = NamedRegistry::new("test");
        let (a, _) = registry.lookup_or_insert("b", |_| true, || counter(1)).unwrap();
        let (b, _) = registry.lookup_or_insert("a", |_| true, || counter(2)).unwrap();
        assert_eq!(registry.names(), vec!["a".to_string(), "b".to_string()]);

        assert_eq!(registry.clear(), 2);
        assert_eq!(a.disposed.load(Ordering::SeqCst), 1);
        assert_eq!(b.disposed.load(Ordering::SeqCst), 1);
        assert!(registry.names().is_empty());
    }
}
