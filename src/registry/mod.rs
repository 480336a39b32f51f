//! Tag-indexed data source registry
//!
//! The registry maps exact [`Tag`]s to [`DataSource`]s. It is the one mutable
//! structure shared between producers and the UI update pass.
//!
//! # Concurrency
//!
//! - Readers load the current [`RegistrySnapshot`] from an [`ArcSwap`] and never
//!   block. A pinned snapshot stays valid (and unchanged) for as long as it is held.
//! - Writers serialize on a single mutex, clone the entry map, apply their change
//!   and publish the new snapshot.
//! - Producer threads that must not touch the registry mid-cycle push mutations
//!   into a [`RegistryQueue`]; the consumer applies them with
//!   [`Registry::apply_queued`] between cycles.
//!
//! Every structural change and every [`Registry::mark_dirty`] call is recorded in
//! the registry's [`ChangeNotifier`].

mod queue;

pub use queue::{QueuedMutation, RegistryQueue};

use crate::config::settings::DatasourceSettings;
use crate::notifier::{ChangeKind, ChangeNotifier, Invalidations};
use crate::schema::Schema;
use crate::tag::{Tag, TagError};
use crate::view::{SharedInstance, StructInstance, StructViewMut};
use arc_swap::ArcSwap;
use crossbeam_channel::{Receiver, Sender};
use parking_lot::{Mutex, RwLock};
use std::collections::BTreeMap;
use std::fmt;
use std::ops::Bound;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};
use thiserror::Error;

/// Errors from registry mutations
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum RegistryError {
    #[error("data source for '{tag}' is no longer alive")]
    SourceExpired { tag: String },

    #[error("no data source registered at '{tag}'")]
    NotRegistered { tag: String },

    #[error("registry queue is full")]
    QueueFull,

    #[error("registry queue is closed")]
    QueueClosed,

    #[error(transparent)]
    InvalidTag(#[from] TagError),
}

/// Unique, monotonically increasing id of one registration
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct RegistrationId(pub u64);

impl fmt::Display for RegistrationId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Returned by a registration; needed to unregister it
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct RegistrationHandle {
    tag: Tag,
    id: RegistrationId,
}

impl RegistrationHandle {
    pub fn tag(&self) -> Tag {
        self.tag
    }

    pub fn id(&self) -> RegistrationId {
        self.id
    }
}

#[derive(Clone)]
enum SourceRef {
    Weak(Weak<RwLock<StructInstance>>),
    Owned(SharedInstance),
}

/// One struct instance exposed to the binding system
///
/// By default a data source only holds a weak reference: the producer keeps the
/// instance alive and is expected to unregister before dropping it. Reads
/// through an expired source fail instead of touching freed memory.
#[derive(Clone)]
pub struct DataSource {
    schema: Arc<Schema>,
    instance: SourceRef,
}

impl DataSource {
    /// Non-owning source over a producer's instance
    pub fn new(instance: &SharedInstance) -> Self {
        Self {
            schema: instance.read().schema().clone(),
            instance: SourceRef::Weak(Arc::downgrade(instance)),
        }
    }

    /// Source that keeps its instance alive for as long as it is registered
    pub fn owned(instance: SharedInstance) -> Self {
        let schema = instance.read().schema().clone();
        Self {
            schema,
            instance: SourceRef::Owned(instance),
        }
    }

    pub fn schema(&self) -> &Arc<Schema> {
        &self.schema
    }

    pub fn is_owned(&self) -> bool {
        matches!(self.instance, SourceRef::Owned(_))
    }

    pub fn is_alive(&self) -> bool {
        match &self.instance {
            SourceRef::Weak(weak) => weak.strong_count() > 0,
            SourceRef::Owned(_) => true,
        }
    }

    /// The live instance, or `None` if a weak source's producer dropped it
    pub fn instance(&self) -> Option<SharedInstance> {
        match &self.instance {
            SourceRef::Weak(weak) => weak.upgrade(),
            SourceRef::Owned(strong) => Some(strong.clone()),
        }
    }
}

impl fmt::Debug for DataSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DataSource")
            .field("schema", &self.schema.name())
            .field("owned", &self.is_owned())
            .field("alive", &self.is_alive())
            .finish()
    }
}

/// A registry entry: the data source plus the registration that placed it
#[derive(Debug, Clone)]
pub struct RegisteredSource {
    tag: Tag,
    id: RegistrationId,
    source: DataSource,
}

impl RegisteredSource {
    pub fn tag(&self) -> Tag {
        self.tag
    }

    pub fn id(&self) -> RegistrationId {
        self.id
    }

    pub fn source(&self) -> &DataSource {
        &self.source
    }

    pub fn schema(&self) -> &Arc<Schema> {
        self.source.schema()
    }
}

/// Immutable published registry state
#[derive(Debug, Default)]
pub struct RegistrySnapshot {
    entries: BTreeMap<Tag, Arc<RegisteredSource>>,
    version: u64,
}

impl RegistrySnapshot {
    pub fn get(&self, tag: Tag) -> Option<&Arc<RegisteredSource>> {
        self.entries.get(&tag)
    }

    pub fn contains(&self, tag: Tag) -> bool {
        self.entries.contains_key(&tag)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Incremented by every published mutation
    pub fn version(&self) -> u64 {
        self.version
    }

    /// All entries in ascending tag order
    pub fn iter(&self) -> impl Iterator<Item = &Arc<RegisteredSource>> {
        self.entries.values()
    }

    /// Lazy iterator over `prefix` and its descendants, pinned to this snapshot
    pub fn prefix(self: &Arc<Self>, prefix: Tag) -> PrefixIter {
        PrefixIter {
            snapshot: self.clone(),
            prefix,
            cursor: None,
            done: false,
        }
    }

    /// Registered strict descendants of `tag`
    pub(crate) fn descendants(&self, tag: Tag) -> impl Iterator<Item = Tag> + '_ {
        self.entries
            .range((Bound::Excluded(tag), Bound::Unbounded))
            .map(|(t, _)| *t)
            .take_while(move |t| tag.is_ancestor_of(t))
    }
}

/// Ascending, restartable iteration over a tag subtree
///
/// Holds its own snapshot, so concurrent registrations never change what an
/// iteration yields.
#[derive(Debug, Clone)]
pub struct PrefixIter {
    snapshot: Arc<RegistrySnapshot>,
    prefix: Tag,
    cursor: Option<Tag>,
    done: bool,
}

impl PrefixIter {
    /// Start over from the first entry
    pub fn restart(&mut self) {
        self.cursor = None;
        self.done = false;
    }

    pub fn prefix(&self) -> Tag {
        self.prefix
    }
}

impl Iterator for PrefixIter {
    type Item = Arc<RegisteredSource>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.done {
            return None;
        }
        let lower = match self.cursor {
            None => Bound::Included(self.prefix),
            Some(last) => Bound::Excluded(last),
        };
        match self.snapshot.entries.range((lower, Bound::Unbounded)).next() {
            Some((tag, entry)) if self.prefix.contains(tag) => {
                self.cursor = Some(*tag);
                Some(entry.clone())
            }
            _ => {
                self.done = true;
                None
            }
        }
    }
}

impl std::iter::FusedIterator for PrefixIter {}

/// The runtime registry
pub struct Registry {
    current: ArcSwap<RegistrySnapshot>,
    write_lock: Mutex<()>,
    next_id: Arc<AtomicU64>,
    notifier: ChangeNotifier,
    queue_tx: Sender<QueuedMutation>,
    queue_rx: Receiver<QueuedMutation>,
}

impl Default for Registry {
    fn default() -> Self {
        Self::new()
    }
}

impl Registry {
    pub fn new() -> Self {
        Self::with_settings(&DatasourceSettings::default())
    }

    pub fn with_settings(settings: &DatasourceSettings) -> Self {
        let (queue_tx, queue_rx) = match settings.queue_capacity {
            Some(capacity) => crossbeam_channel::bounded(capacity),
            None => crossbeam_channel::unbounded(),
        };
        Self {
            current: ArcSwap::from_pointee(RegistrySnapshot::default()),
            write_lock: Mutex::new(()),
            next_id: Arc::new(AtomicU64::new(1)),
            notifier: ChangeNotifier::new(settings.event_log_capacity),
            queue_tx,
            queue_rx,
        }
    }

    pub fn notifier(&self) -> &ChangeNotifier {
        &self.notifier
    }

    /// Pin the current state
    pub fn snapshot(&self) -> Arc<RegistrySnapshot> {
        self.current.load_full()
    }

    pub fn len(&self) -> usize {
        self.current.load().len()
    }

    pub fn is_empty(&self) -> bool {
        self.current.load().is_empty()
    }

    /// Register `source` at `tag`, replacing any existing entry.
    pub fn register(&self, tag: Tag, source: DataSource) -> Result<RegistrationHandle, RegistryError> {
        let id = allocate_id(&self.next_id);
        self.register_with_id(tag, id, source)
    }

    pub(crate) fn register_with_id(
        &self,
        tag: Tag,
        id: RegistrationId,
        source: DataSource,
    ) -> Result<RegistrationHandle, RegistryError> {
        if !source.is_alive() {
            return Err(RegistryError::SourceExpired {
                tag: tag.to_string(),
            });
        }

        let schema = source.schema().name().to_string();
        let entry = Arc::new(RegisteredSource { tag, id, source });
        let replaced = self.publish(|entries| entries.insert(tag, entry).is_some());

        let kind = if replaced {
            ChangeKind::Replaced
        } else {
            ChangeKind::Registered
        };
        self.notifier.record(tag, kind);
        tracing::debug!("{:?} {} as {} ({})", kind, tag, schema, id);

        Ok(RegistrationHandle { tag, id })
    }

    /// Remove the registration behind `handle`.
    ///
    /// Returns `false` if the entry was already replaced or removed; the current
    /// occupant of the tag is left alone in that case.
    pub fn unregister(&self, handle: RegistrationHandle) -> bool {
        let removed = self.publish(|entries| {
            match entries.get(&handle.tag) {
                Some(entry) if entry.id == handle.id => {}
                _ => return false,
            }
            entries.remove(&handle.tag);
            true
        });

        if removed {
            self.notifier.record(handle.tag, ChangeKind::Unregistered);
            tracing::debug!("Unregistered {} ({})", handle.tag, handle.id);
        } else {
            tracing::debug!("Ignoring stale handle for {} ({})", handle.tag, handle.id);
        }
        removed
    }

    /// Data source registered exactly at `tag`
    pub fn lookup(&self, tag: Tag) -> Option<DataSource> {
        self.current.load().get(tag).map(|entry| entry.source.clone())
    }

    /// Every data source at `prefix` or below it, in ascending tag order
    pub fn lookup_prefix(&self, prefix: Tag) -> PrefixIter {
        self.snapshot().prefix(prefix)
    }

    /// Mutate the instance registered at `tag` and mark it dirty.
    pub fn update<R>(
        &self,
        tag: Tag,
        f: impl FnOnce(&mut StructViewMut<'_>) -> R,
    ) -> Result<R, RegistryError> {
        let source = self.lookup(tag).ok_or_else(|| RegistryError::NotRegistered {
            tag: tag.to_string(),
        })?;
        let instance = source.instance().ok_or_else(|| RegistryError::SourceExpired {
            tag: tag.to_string(),
        })?;

        let result = {
            let mut guard = instance.write();
            let mut view = guard.view_mut();
            f(&mut view)
        };
        self.mark_dirty(tag);
        Ok(result)
    }

    /// Record that the instance at `tag` was mutated by its producer.
    pub fn mark_dirty(&self, tag: Tag) {
        self.notifier.record(tag, ChangeKind::ValueSet);
    }

    /// Collect and clear this cycle's dirty set.
    pub fn drain_invalidations(&self) -> Invalidations {
        self.notifier.drain(&self.current.load())
    }

    /// A handle producer threads can use to queue mutations
    pub fn queue(&self) -> RegistryQueue {
        RegistryQueue::new(self.queue_tx.clone(), self.next_id.clone())
    }

    /// Apply every queued mutation in arrival order; returns how many were applied.
    pub fn apply_queued(&self) -> usize {
        let mut applied = 0;
        for mutation in self.queue_rx.try_iter() {
            match mutation {
                QueuedMutation::Register { tag, id, source } => {
                    if let Err(e) = self.register_with_id(tag, id, source) {
                        tracing::warn!("Dropping queued registration: {}", e);
                    }
                }
                QueuedMutation::Unregister(handle) => {
                    self.unregister(handle);
                }
                QueuedMutation::MarkDirty(tag) => self.mark_dirty(tag),
            }
            applied += 1;
        }
        if applied > 0 {
            tracing::debug!("Applied {} queued registry mutations", applied);
        }
        applied
    }

    /// Clone the entry map, let `f` edit it, then publish the result.
    fn publish<R>(&self, f: impl FnOnce(&mut BTreeMap<Tag, Arc<RegisteredSource>>) -> R) -> R {
        let _guard = self.write_lock.lock();
        let current = self.current.load_full();
        let mut entries = current.entries.clone();
        let result = f(&mut entries);
        self.current.store(Arc::new(RegistrySnapshot {
            entries,
            version: current.version + 1,
        }));
        result
    }
}

impl fmt::Debug for Registry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let snapshot = self.current.load();
        f.debug_struct("Registry")
            .field("entries", &snapshot.len())
            .field("version", &snapshot.version())
            .finish()
    }
}

pub(crate) fn allocate_id(counter: &AtomicU64) -> RegistrationId {
    RegistrationId(counter.fetch_add(1, Ordering::Relaxed))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::{FieldDef, FieldKind};
    use crate::types::TypedValue;

    fn schema() -> Arc<Schema> {
        Arc::new(Schema::from_fields(
            "Counter",
            4,
            vec![FieldDef {
                name: Arc::from("value"),
                kind: FieldKind::Int {
                    signed: true,
                    width: 4,
                },
                offset: 0,
                size: 4,
            }],
        ))
    }

    fn tag(text: &str) -> Tag {
        Tag::new(text).unwrap()
    }

    fn owned() -> DataSource {
        DataSource::owned(StructInstance::zeroed(schema()).into_shared())
    }

    #[test]
    fn test_register_and_lookup() {
        let registry = Registry::new();
        let handle = registry.register(tag("player.stats"), owned()).unwrap();
        assert_eq!(handle.tag(), tag("player.stats"));
        assert!(registry.lookup(tag("player.stats")).is_some());
        assert!(registry.lookup(tag("player")).is_none());
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn test_replace_and_stale_unregister() {
        let registry = Registry::new();
        let first = registry.register(tag("hud.score"), owned()).unwrap();
        let second = registry.register(tag("hud.score"), owned()).unwrap();
        assert!(second.id() > first.id());
        assert_eq!(registry.len(), 1);

        // The first handle no longer owns the entry.
        assert!(!registry.unregister(first));
        assert!(registry.lookup(tag("hud.score")).is_some());
        assert!(registry.unregister(second));
        assert!(registry.lookup(tag("hud.score")).is_none());
        assert!(!registry.unregister(second));
    }

    #[test]
    fn test_prefix_order_and_bounds() {
        let registry = Registry::new();
        for t in ["player.stats", "player", "playerx", "player.inventory", "enemy", "player.stats.buffs"] {
            registry.register(tag(t), owned()).unwrap();
        }
        let tags: Vec<String> = registry
            .lookup_prefix(tag("player"))
            .map(|e| e.tag().to_string())
            .collect();
        assert_eq!(
            tags,
            vec!["player", "player.inventory", "player.stats", "player.stats.buffs"]
        );
    }

    #[test]
    fn test_prefix_iter_is_pinned_and_restartable() {
        let registry = Registry::new();
        registry.register(tag("ui.a"), owned()).unwrap();
        registry.register(tag("ui.b"), owned()).unwrap();

        let mut iter = registry.lookup_prefix(tag("ui"));
        assert_eq!(iter.next().unwrap().tag(), tag("ui.a"));

        registry.register(tag("ui.c"), owned()).unwrap();
        assert_eq!(iter.next().unwrap().tag(), tag("ui.b"));
        assert!(iter.next().is_none());
        assert!(iter.next().is_none());

        iter.restart();
        assert_eq!(iter.count(), 2);
        assert_eq!(registry.lookup_prefix(tag("ui")).count(), 3);
    }

    #[test]
    fn test_snapshot_unaffected_by_later_writes() {
        let registry = Registry::new();
        let handle = registry.register(tag("a"), owned()).unwrap();
        let pinned = registry.snapshot();
        registry.unregister(handle);
        assert!(pinned.contains(tag("a")));
        assert!(!registry.snapshot().contains(tag("a")));
        assert!(registry.snapshot().version() > pinned.version());
    }

    #[test]
    fn test_weak_source_expiry() {
        let registry = Registry::new();
        let instance = StructInstance::zeroed(schema()).into_shared();
        let source = DataSource::new(&instance);
        assert!(!source.is_owned());
        registry.register(tag("weak"), source.clone()).unwrap();
        assert!(registry.lookup(tag("weak")).unwrap().is_alive());

        drop(instance);
        assert!(!registry.lookup(tag("weak")).unwrap().is_alive());
        assert_eq!(
            registry.update(tag("weak"), |_| ()),
            Err(RegistryError::SourceExpired {
                tag: "weak".to_string()
            })
        );
        assert!(matches!(
            registry.register(tag("weak2"), source),
            Err(RegistryError::SourceExpired { .. })
        ));
    }

    #[test]
    fn test_update_writes_and_marks_dirty() {
        let registry = Registry::new();
        let instance = StructInstance::zeroed(schema()).into_shared();
        registry.register(tag("counter"), DataSource::new(&instance)).unwrap();
        registry.drain_invalidations();

        registry
            .update(tag("counter"), |view| {
                view.write_by_name("value", &TypedValue::Int(42))
            })
            .unwrap()
            .unwrap();

        assert_eq!(
            instance.read().view().read_by_name("value").unwrap(),
            TypedValue::Int(42)
        );
        let invalidations = registry.drain_invalidations();
        assert!(invalidations.contains(tag("counter")));

        assert!(matches!(
            registry.update(tag("missing"), |_| ()),
            Err(RegistryError::NotRegistered { .. })
        ));
    }

    #[test]
    fn test_concurrent_registration() {
        let registry = Arc::new(Registry::new());
        let threads: Vec<_> = (0..4)
            .map(|t| {
                let registry = registry.clone();
                std::thread::spawn(move || {
                    for i in 0..25 {
                        let name = format!("worker{}.item{}", t, i);
                        registry.register(tag(&name), owned()).unwrap();
                    }
                })
            })
            .collect();
        for handle in threads {
            handle.join().unwrap();
        }
        assert_eq!(registry.len(), 100);
        assert_eq!(registry.lookup_prefix(tag("worker2")).count(), 25);
    }
}
