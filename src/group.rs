//! One guard per protected resource.

use std::sync::Arc;

use dashmap::DashMap;

/// Lazily built, named instances of `T`.
///
/// The first [`get`](Group::get) for a name runs the factory; later calls
/// share the same instance. Typical use is one breaker per downstream
/// operation.
///
/// ```rust
/// use admission_control::breaker::{CircuitBreaker, SreBreaker};
/// use admission_control::group::Group;
///
/// let breakers = Group::new(SreBreaker::default);
/// breakers.get("/user.v1.User/Get").mark_success();
/// ```
pub struct Group<T> {
    factory: Box<dyn Fn() -> T + Send + Sync>,
    members: DashMap<String, Arc<T>>,
}

impl<T> Group<T> {
    pub fn new<F>(factory: F) -> Self
    where
        F: Fn() -> T + Send + Sync + 'static,
    {
        Self {
            factory: Box::new(factory),
            members: DashMap::new(),
        }
    }

    /// Returns the instance for `name`, creating it on first use.
    pub fn get(&self, name: &str) -> Arc<T> {
        if let Some(member) = self.members.get(name) {
            return Arc::clone(member.value());
        }

        let member = self
            .members
            .entry(name.to_owned())
            .or_insert_with(|| Arc::new((self.factory)()));

        Arc::clone(member.value())
    }

    /// Forgets the instance for `name`; the next `get` builds a fresh one.
    pub fn reset(&self, name: &str) -> Option<Arc<T>> {
        self.members.remove(name).map(|(_, member)| member)
    }

    pub fn clear(&self) {
        self.members.clear();
    }

    pub fn len(&self) -> usize {
        self.members.len()
    }

    pub fn is_empty(&self) -> bool {
        self.members.is_empty()
    }
}

impl<T> std::fmt::Debug for Group<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Group")
            .field("len", &self.members.len())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};

    use tokio_test::{assert_err, assert_ok};

    use super::*;
    use crate::breaker::{CircuitBreaker, SreBreaker, State};
    use crate::cpu;
    use crate::limiter::{Bbr, BbrSettings, Limiter};

    #[test]
    fn builds_once_per_name() {
        let built = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&built);
        let group = Group::new(move || counter.fetch_add(1, Ordering::SeqCst));

        let a = group.get("a");
        let again = group.get("a");
        let b = group.get("b");

        assert!(Arc::ptr_eq(&a, &again));
        assert!(!Arc::ptr_eq(&a, &b));
        assert_eq!(built.load(Ordering::SeqCst), 2);
        assert_eq!(group.len(), 2);
    }

    #[test]
    fn reset_and_clear() {
        let group = Group::new(SreBreaker::default);

        let first = group.get("op");
        assert!(group.reset("op").is_some());
        assert!(group.reset("op").is_none());

        let second = group.get("op");
        assert!(!Arc::ptr_eq(&first, &second));

        group.clear();
        assert!(group.is_empty());
    }

    #[test]
    fn breakers_are_independent() {
        let group = Group::new(SreBreaker::default);

        for _ in 0..10_000 {
            group.get("failing").mark_failed();
            group.get("healthy").mark_success();
        }

        let _ = group.get("failing").allow();
        assert_eq!(group.get("failing").state(), State::Open);

        assert_ok!(group.get("healthy").allow());
        assert_eq!(group.get("healthy").state(), State::Closed);
    }

    #[test]
    fn limiters_share_cpu_feed() {
        let feed = cpu::constant(1000);
        let group = Group::new(move || Bbr::new(BbrSettings::default(), feed.clone()));

        let _a = (0..2).map(|_| assert_ok!(group.get("a").allow())).collect::<Vec<_>>();
        assert_err!(group.get("a").allow());

        // a different resource has its own in-flight count
        assert!(group.get("b").allow().is_ok());
    }
}
