//! Change notification
//!
//! Producers mark tags dirty after mutating a data source; registry mutations
//! record their own changes. Once per cycle the consumer drains the dirty set
//! into an [`Invalidations`] value and resets every binding it affects.
//!
//! Invalidation is coarse: any change to a data source invalidates every binding
//! into that source's tag (and into its registered descendants), regardless of
//! which field changed.

use crate::registry::RegistrySnapshot;
use crate::tag::Tag;
use crossbeam_channel::{Receiver, Sender};
use parking_lot::Mutex;
use serde::Serialize;
use std::collections::{BTreeMap, BTreeSet, VecDeque};

/// Why a tag was invalidated
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ChangeKind {
    /// First registration at the tag
    Registered,
    /// Registration replaced an existing entry
    Replaced,
    Unregistered,
    /// Producer mutated the instance
    ValueSet,
}

impl ChangeKind {
    pub fn is_structural(&self) -> bool {
        !matches!(self, ChangeKind::ValueSet)
    }
}

/// One drained change
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ChangeEvent {
    pub tag: Tag,
    pub kind: ChangeKind,
    /// Cycle in which the change was drained
    pub cycle: u64,
}

/// Tags invalidated by one drain
#[derive(Debug, Clone, Default)]
pub struct Invalidations {
    tags: BTreeSet<Tag>,
    roots: BTreeSet<Tag>,
    cycle: u64,
}

impl Invalidations {
    /// True if `tag` itself was dirty or is a registered descendant of a dirty tag
    pub fn contains(&self, tag: Tag) -> bool {
        self.tags.contains(&tag)
    }

    /// True if `tag` is, or lies below, any dirty tag.
    ///
    /// Unlike [`contains`](Self::contains) this also covers tags that are not
    /// currently registered.
    pub fn affects(&self, tag: Tag) -> bool {
        self.tags.contains(&tag) || tag.ancestors().any(|a| self.roots.contains(&a))
    }

    pub fn tags(&self) -> impl Iterator<Item = Tag> + '_ {
        self.tags.iter().copied()
    }

    /// The tags that were marked dirty, before descendant expansion
    pub fn roots(&self) -> impl Iterator<Item = Tag> + '_ {
        self.roots.iter().copied()
    }

    pub fn len(&self) -> usize {
        self.tags.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tags.is_empty()
    }

    pub fn cycle(&self) -> u64 {
        self.cycle
    }
}

struct Subscriber {
    prefix: Tag,
    sender: Sender<ChangeEvent>,
}

struct NotifierState {
    dirty: BTreeMap<Tag, ChangeKind>,
    log: VecDeque<ChangeEvent>,
    log_capacity: usize,
    cycle: u64,
    subscribers: Vec<Subscriber>,
}

/// Per-cycle dirty tracking plus a bounded change log
pub struct ChangeNotifier {
    state: Mutex<NotifierState>,
}

impl ChangeNotifier {
    pub fn new(log_capacity: usize) -> Self {
        Self {
            state: Mutex::new(NotifierState {
                dirty: BTreeMap::new(),
                log: VecDeque::with_capacity(log_capacity),
                log_capacity,
                cycle: 0,
                subscribers: Vec::new(),
            }),
        }
    }

    /// Record a change to `tag` for the current cycle.
    ///
    /// A structural change is never downgraded by a later value write in the same cycle.
    pub fn record(&self, tag: Tag, kind: ChangeKind) {
        let mut state = self.state.lock();
        state
            .dirty
            .entry(tag)
            .and_modify(|existing| {
                if kind.is_structural() {
                    *existing = kind;
                }
            })
            .or_insert(kind);
    }

    pub fn mark_dirty(&self, tag: Tag) {
        self.record(tag, ChangeKind::ValueSet);
    }

    pub fn is_dirty(&self, tag: Tag) -> bool {
        self.state.lock().dirty.contains_key(&tag)
    }

    /// Number of dirty tags waiting for the next drain
    pub fn pending(&self) -> usize {
        self.state.lock().dirty.len()
    }

    /// Number of drains performed so far
    pub fn cycle(&self) -> u64 {
        self.state.lock().cycle
    }

    /// Receive every future drained event at `prefix` or below it.
    pub fn subscribe(&self, prefix: Tag) -> Receiver<ChangeEvent> {
        let (sender, receiver) = crossbeam_channel::unbounded();
        self.state.lock().subscribers.push(Subscriber { prefix, sender });
        receiver
    }

    /// Most recent drained events, oldest first
    pub fn recent_events(&self) -> Vec<ChangeEvent> {
        self.state.lock().log.iter().cloned().collect()
    }

    /// Clear the dirty set and expand it against `snapshot`.
    pub fn drain(&self, snapshot: &RegistrySnapshot) -> Invalidations {
        let mut state = self.state.lock();
        state.cycle += 1;
        let cycle = state.cycle;
        let dirty = std::mem::take(&mut state.dirty);

        let mut tags = BTreeSet::new();
        for &tag in dirty.keys() {
            tags.insert(tag);
            tags.extend(snapshot.descendants(tag));
        }
        let roots: BTreeSet<Tag> = dirty.keys().copied().collect();

        for (tag, kind) in dirty {
            let event = ChangeEvent { tag, kind, cycle };
            state
                .subscribers
                .retain(|s| !s.prefix.contains(&event.tag) || s.sender.send(event.clone()).is_ok());
            if state.log_capacity > 0 {
                if state.log.len() == state.log_capacity {
                    state.log.pop_front();
                }
                state.log.push_back(event);
            }
        }

        if !tags.is_empty() {
            tracing::debug!(
                "Cycle {}: {} dirty tags invalidate {} tags",
                cycle,
                roots.len(),
                tags.len()
            );
        }

        Invalidations { tags, roots, cycle }
    }
}

impl std::fmt::Debug for ChangeNotifier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let state = self.state.lock();
        f.debug_struct("ChangeNotifier")
            .field("pending", &state.dirty.len())
            .field("cycle", &state.cycle)
            .field("subscribers", &state.subscribers.len())
            .finish()
    }
}
