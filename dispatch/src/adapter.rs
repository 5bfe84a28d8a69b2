use std::collections::HashMap;
use std::hash::Hash;
use std::sync::{Arc, Weak};

use parking_lot::Mutex;
use tracing::{debug, trace};

use dt_model::{ModelObject, Tag, VariantTable};

use super::error::SwitchError;
use super::switch::Switch;

/// Anything a factory can be asked about with [`AdapterFactory::is_applicable`].
#[derive(Copy, Clone)]
pub enum Subject<'a> {
    Table(&'a VariantTable),
    Tag(Tag),
    Object(&'a dyn ModelObject),
}

impl<'a> From<&'a VariantTable> for Subject<'a> {
    fn from(table: &'a VariantTable) -> Self {
        Self::Table(table)
    }
}

impl From<Tag> for Subject<'_> {
    fn from(tag: Tag) -> Self {
        Self::Tag(tag)
    }
}

impl<'a> From<&'a dyn ModelObject> for Subject<'a> {
    fn from(object: &'a dyn ModelObject) -> Self {
        Self::Object(object)
    }
}

impl<'a> From<&'a Arc<dyn ModelObject>> for Subject<'a> {
    fn from(object: &'a Arc<dyn ModelObject>) -> Self {
        Self::Object(object.as_ref())
    }
}

/// Instances are identified by address. The entry's weak reference keeps the allocation around,
/// so no other instance can take over the address while the entry exists.
#[derive(Clone, PartialEq, Eq, Hash)]
struct CacheKey<K> {
    address: usize,
    key: K,
}

struct CacheEntry<A> {
    object: Weak<dyn ModelObject>,
    /// `None` records that no adapter applies
    adapter: Option<Arc<A>>,
}

fn address_of(object: &Arc<dyn ModelObject>) -> usize {
    Arc::as_ptr(object) as *const () as usize
}

/// Creates adapters for model instances and remembers them per instance and key.
///
/// The underlying [`Switch`] decides which adapter a variant gets; typically only a few variants
/// have handlers and all others fall through to the default, which yields no adapter. Requesting
/// the adapter of the same live instance under the same key again returns the same `Arc`, and a
/// variant without adapter is remembered as such.
///
/// Handlers run without holding the cache lock. When two threads miss on the same instance at
/// once, both may construct an adapter, but only the first one stored is ever handed out.
pub struct AdapterFactory<A, K = ()> {
    switch: Switch<A>,
    cache: Mutex<HashMap<CacheKey<K>, CacheEntry<A>>>,
}

impl<A, K> AdapterFactory<A, K>
where
    K: Hash + Eq + Clone,
{
    pub fn new(switch: Switch<A>) -> Self {
        Self {
            switch,
            cache: Mutex::new(HashMap::new()),
        }
    }

    pub fn switch(&self) -> &Switch<A> {
        &self.switch
    }

    /// Whether the subject belongs to the variant family this factory was built for.
    pub fn is_applicable<'a>(&self, subject: impl Into<Subject<'a>>) -> bool {
        let table = self.switch.table();
        match subject.into() {
            Subject::Table(other) => other.family() == table.family(),
            Subject::Tag(tag) => table.contains(tag),
            Subject::Object(object) => table.contains(object.variant()),
        }
    }

    /// Returns the adapter of `object` for `key`, creating it on first request.
    pub fn create_adapter(
        &self,
        object: &Arc<dyn ModelObject>,
        key: K,
    ) -> Result<Option<Arc<A>>, SwitchError> {
        let cache_key = CacheKey {
            address: address_of(object),
            key,
        };

        if let Some(entry) = self.cache.lock().get(&cache_key) {
            trace!(variant = ?object.variant(), "adapter cache hit");
            return Ok(entry.adapter.clone());
        }

        let adapter = self.switch.dispatch(object.as_ref())?.map(Arc::new);
        debug!(
            variant = ?object.variant(),
            adapted = adapter.is_some(),
            "created adapter"
        );

        // Another thread may have stored an adapter in the meantime; that one wins
        let mut cache = self.cache.lock();
        let entry = cache.entry(cache_key).or_insert_with(|| CacheEntry {
            object: Arc::downgrade(object),
            adapter,
        });
        Ok(entry.adapter.clone())
    }

    /// Drops every cached adapter of `object`.
    pub fn forget(&self, object: &Arc<dyn ModelObject>) {
        let address = address_of(object);
        self.cache
            .lock()
            .retain(|cache_key, _| cache_key.address != address);
    }

    /// Drops the entries of instances that no longer exist, releasing their allocations.
    pub fn purge(&self) {
        self.cache
            .lock()
            .retain(|_, entry| entry.object.strong_count() > 0);
    }

    pub fn clear(&self) {
        self.cache.lock().clear();
    }

    pub fn len(&self) -> usize {
        self.cache.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.cache.lock().is_empty()
    }
}

impl<A, K> AdapterFactory<A, K>
where
    K: Hash + Eq + Clone + Default,
{
    /// [`create_adapter`](Self::create_adapter) with the default key.
    pub fn adapt(&self, object: &Arc<dyn ModelObject>) -> Result<Option<Arc<A>>, SwitchError> {
        self.create_adapter(object, K::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    use dt_model::DynamicObject;

    use crate::switch::Outcome;

    #[derive(Debug, PartialEq, Eq)]
    struct Label(String);

    fn table() -> Arc<VariantTable> {
        Arc::new(
            VariantTable::builder(Some("urn:test"))
                .variant("Base", None)
                .variant("Geometry", Some("Base"))
                .variant("Point", Some("Geometry"))
                .variant("Inert", None)
                .variant("Opaque", None)
                .build()
                .unwrap(),
        )
    }

    fn object(table: &VariantTable, local: &str) -> Arc<dyn ModelObject> {
        Arc::new(DynamicObject::new(table.tag_by_local_name(local).unwrap()))
    }

    /// Labels geometries, explicitly refuses `Opaque`, leaves the rest inert.
    fn factory(table: &Arc<VariantTable>, calls: &Arc<AtomicUsize>) -> AdapterFactory<Label> {
        let geometry_calls = calls.clone();
        let opaque_calls = calls.clone();
        let switch = Switch::builder(table.clone())
            .case_local("Geometry", move |_| {
                geometry_calls.fetch_add(1, Ordering::SeqCst);
                Ok(Outcome::Concrete(Label("geometry".into())))
            })
            .unwrap()
            .case_local("Opaque", move |_| {
                opaque_calls.fetch_add(1, Ordering::SeqCst);
                Ok(Outcome::Absent)
            })
            .unwrap()
            .build();
        AdapterFactory::new(switch)
    }

    #[test]
    fn repeated_requests_return_the_same_adapter() {
        let table = table();
        let calls = Arc::new(AtomicUsize::new(0));
        let factory = factory(&table, &calls);
        let point = object(&table, "Point");

        let first = factory.adapt(&point).unwrap().unwrap();
        let second = factory.adapt(&point).unwrap().unwrap();
        assert!(Arc::ptr_eq(&first, &second));
        assert_eq!(*first, Label("geometry".into()));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn distinct_instances_get_distinct_adapters() {
        let table = table();
        let calls = Arc::new(AtomicUsize::new(0));
        let factory = factory(&table, &calls);
        let a = object(&table, "Point");
        let b = object(&table, "Point");

        let adapter_a = factory.adapt(&a).unwrap().unwrap();
        let adapter_b = factory.adapt(&b).unwrap().unwrap();
        assert!(!Arc::ptr_eq(&adapter_a, &adapter_b));
        assert_eq!(factory.len(), 2);
    }

    #[test]
    fn absent_adapters_are_cached() {
        let table = table();
        let calls = Arc::new(AtomicUsize::new(0));
        let factory = factory(&table, &calls);
        let opaque = object(&table, "Opaque");

        assert!(factory.adapt(&opaque).unwrap().is_none());
        assert!(factory.adapt(&opaque).unwrap().is_none());
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert_eq!(factory.len(), 1);
    }

    #[test]
    fn inert_variants_have_no_adapter() {
        let table = table();
        let calls = Arc::new(AtomicUsize::new(0));
        let factory = factory(&table, &calls);

        assert!(factory.adapt(&object(&table, "Inert")).unwrap().is_none());
        assert!(factory.adapt(&object(&table, "Base")).unwrap().is_none());
        assert_eq!(calls.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn keys_scope_the_cache() {
        let table = table();
        let calls = Arc::new(AtomicUsize::new(0));
        let geometry_calls = calls.clone();
        let switch = Switch::builder(table.clone())
            .case_local("Geometry", move |_| {
                geometry_calls.fetch_add(1, Ordering::SeqCst);
                Ok(Outcome::Concrete(Label("geometry".into())))
            })
            .unwrap()
            .build();
        let factory: AdapterFactory<Label, &'static str> = AdapterFactory::new(switch);
        let point = object(&table, "Point");

        let render = factory.create_adapter(&point, "render").unwrap().unwrap();
        let edit = factory.create_adapter(&point, "edit").unwrap().unwrap();
        assert!(!Arc::ptr_eq(&render, &edit));
        let again = factory.create_adapter(&point, "render").unwrap().unwrap();
        assert!(Arc::ptr_eq(&render, &again));
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn dropped_instances_are_never_served_from_cache() {
        let table = table();
        let calls = Arc::new(AtomicUsize::new(0));
        let factory = factory(&table, &calls);

        for _ in 0..8 {
            let point = object(&table, "Point");
            let adapter = factory.adapt(&point).unwrap().unwrap();
            assert!(Arc::ptr_eq(&adapter, &factory.adapt(&point).unwrap().unwrap()));
        }
        // Every fresh instance required a fresh adapter
        assert_eq!(calls.load(Ordering::SeqCst), 8);

        factory.purge();
        assert!(factory.is_empty());
    }

    #[test]
    fn forget_and_clear_invalidate() {
        let table = table();
        let calls = Arc::new(AtomicUsize::new(0));
        let factory = factory(&table, &calls);
        let point = object(&table, "Point");
        let other = object(&table, "Point");

        let first = factory.adapt(&point).unwrap().unwrap();
        factory.adapt(&other).unwrap();
        factory.forget(&point);
        assert_eq!(factory.len(), 1);
        let second = factory.adapt(&point).unwrap().unwrap();
        assert!(!Arc::ptr_eq(&first, &second));

        factory.clear();
        assert!(factory.is_empty());
    }

    #[test]
    fn unknown_variant_is_not_defaulted() {
        let table = table();
        let foreign = self::table();
        let calls = Arc::new(AtomicUsize::new(0));
        let factory = factory(&table, &calls);

        let err = factory.adapt(&object(&foreign, "Point")).unwrap_err();
        assert!(matches!(err, SwitchError::UnknownVariant { .. }));
        assert!(factory.is_empty());
    }

    #[test]
    fn failures_are_not_cached() {
        let table = table();
        let calls = Arc::new(AtomicUsize::new(0));
        let counter = calls.clone();
        let switch = Switch::<Label>::builder(table.clone())
            .case_local("Point", move |_| {
                if counter.fetch_add(1, Ordering::SeqCst) == 0 {
                    Err("first attempt fails".into())
                } else {
                    Ok(Outcome::Concrete(Label("point".into())))
                }
            })
            .unwrap()
            .build();
        let factory: AdapterFactory<Label> = AdapterFactory::new(switch);
        let point = object(&table, "Point");

        assert!(matches!(
            factory.adapt(&point),
            Err(SwitchError::HandlerFailure { .. })
        ));
        assert!(factory.is_empty());
        assert_eq!(
            factory.adapt(&point).unwrap().as_deref(),
            Some(&Label("point".into()))
        );
    }

    #[test]
    fn applicability_follows_the_family() {
        let table = table();
        let foreign = self::table();
        let calls = Arc::new(AtomicUsize::new(0));
        let factory = factory(&table, &calls);

        assert!(factory.is_applicable(table.as_ref()));
        assert!(!factory.is_applicable(foreign.as_ref()));
        assert!(factory.is_applicable(table.root()));
        assert!(!factory.is_applicable(foreign.root()));
        assert!(factory.is_applicable(&object(&table, "Inert")));
        assert!(!factory.is_applicable(&object(&foreign, "Inert")));
    }

    #[test]
    fn switch_is_shared_with_the_factory() {
        let table = table();
        let calls = Arc::new(AtomicUsize::new(0));
        let factory = factory(&table, &calls);
        let tag = |local| table.tag_by_local_name(local).unwrap();

        assert!(Arc::ptr_eq(factory.switch().table(), &table));
        assert!(factory.switch().has_handler(tag("Geometry")));
        assert!(!factory.switch().has_handler(tag("Point")));

        let point = DynamicObject::new(tag("Point"));
        assert_eq!(
            factory.switch().dispatch(&point).unwrap(),
            Some(Label("geometry".into()))
        );
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        // Dispatching directly bypasses the cache
        assert!(factory.is_empty());
    }

    #[test]
    fn concurrent_requests_observe_one_adapter() {
        let table = table();
        let calls = Arc::new(AtomicUsize::new(0));
        let factory = factory(&table, &calls);
        let point = object(&table, "Point");

        let adapters: Vec<_> = std::thread::scope(|scope| {
            let handles: Vec<_> = (0..8)
                .map(|_| scope.spawn(|| factory.adapt(&point).unwrap().unwrap()))
                .collect();
            handles.into_iter().map(|h| h.join().unwrap()).collect()
        });

        let first = factory.adapt(&point).unwrap().unwrap();
        assert!(adapters.iter().all(|a| Arc::ptr_eq(a, &first)));
        assert_eq!(factory.len(), 1);
    }
}
