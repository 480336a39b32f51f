//! Bindings
//!
//! A [`Binding`] is a consumer's `(tag, field path)` declaration together with
//! its cached resolution. Bindings live in a [`BindingSet`]; all resolution and
//! reading goes through a [`Cycle`] obtained from [`BindingSet::begin_cycle`],
//! which first applies queued registry mutations and this cycle's invalidations.
//! A binding therefore never reads through a cache that a registry change made
//! stale.
//!
//! # States
//!
//! - `Unresolved`: resolved lazily on the next read
//! - `Resolved`: holds the data source and the walked path; reads skip all lookups
//! - `Invalid`: the last resolution or read failed; stays invalid until an
//!   invalidation touches its tag
//!
//! Tag or path syntax errors are permanent.

pub mod resolver;

pub use resolver::{walk, PathStep, Resolved, ResolvedPath, Resolver};

use crate::notifier::Invalidations;
use crate::path::{FieldPath, PathError};
use crate::registry::{Registry, RegistrySnapshot};
use crate::tag::{Tag, TagError};
use crate::types::{TypeTag, TypedValue};
use std::fmt;
use std::sync::Arc;
use thiserror::Error;

/// Recoverable failures of binding resolution and typed field access
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ResolutionError {
    #[error(transparent)]
    InvalidTag(#[from] TagError),

    #[error(transparent)]
    InvalidPath(#[from] PathError),

    #[error("no data source registered at '{tag}'")]
    TagNotFound { tag: String },

    #[error("data source at '{tag}' is no longer alive")]
    SourceExpired { tag: String },

    #[error("'{schema}' has no field '{field}'")]
    FieldNotFound { schema: String, field: String },

    #[error("'{field}' is {found}, not a struct")]
    NotAStruct { field: String, found: TypeTag },

    #[error("'{field}' is {found}, not an array")]
    NotAnArray { field: String, found: TypeTag },

    #[error("index {index} out of bounds for '{field}' of length {count}")]
    IndexOutOfBounds {
        field: String,
        index: usize,
        count: usize,
    },

    #[error("'{field}' is {expected}, got {found}")]
    TypeMismatch {
        field: String,
        expected: TypeTag,
        found: TypeTag,
    },

    #[error("'{field}' holds {expected}, got {found}")]
    SchemaMismatch {
        field: String,
        expected: String,
        found: String,
    },

    #[error("value for '{field}' out of range: {detail}")]
    ValueOutOfRange { field: String, detail: String },

    #[error("'{schema}' needs {expected} bytes, buffer has {actual}")]
    BufferSize {
        schema: String,
        expected: usize,
        actual: usize,
    },

    #[error("unknown binding {id}")]
    UnknownBinding { id: BindingId },

    #[error("binding has not been resolved")]
    NotResolved,
}

/// Index into a [`BindingSet`]
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default)]
pub struct BindingId(pub u32);

impl BindingId {
    pub const INVALID: BindingId = BindingId(u32::MAX);

    #[inline]
    pub fn is_valid(self) -> bool {
        self != Self::INVALID
    }

    #[inline]
    pub fn index(self) -> usize {
        self.0 as usize
    }
}

impl fmt::Debug for BindingId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if *self == Self::INVALID {
            write!(f, "BindingId(INVALID)")
        } else {
            write!(f, "BindingId({})", self.0)
        }
    }
}

impl fmt::Display for BindingId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}

/// Resolution state of a binding
#[derive(Debug, Clone)]
pub enum BindingState {
    Unresolved,
    Resolved(Resolved),
    Invalid(ResolutionError),
}

/// Parse a binding's tag and field path with the same rules the validator uses.
pub fn parse_target(tag: &str, path: &str) -> Result<(Tag, FieldPath), ResolutionError> {
    let tag = Tag::new(tag)?;
    let path = FieldPath::parse(path)?;
    Ok((tag, path))
}

/// A consumer's declared tag and field path
#[derive(Debug, Clone)]
pub struct Binding {
    tag_text: String,
    path_text: String,
    target: Result<(Tag, FieldPath), ResolutionError>,
    expected: Option<TypeTag>,
    fallback: Option<TypedValue>,
    state: BindingState,
}

impl Binding {
    pub fn new(tag: &str, path: &str) -> Self {
        let target = parse_target(tag, path);
        let state = match &target {
            Ok(_) => BindingState::Unresolved,
            Err(e) => BindingState::Invalid(e.clone()),
        };
        Self {
            tag_text: tag.to_string(),
            path_text: path.to_string(),
            target,
            expected: None,
            fallback: None,
            state,
        }
    }

    /// Require the leaf field to have type `tag`
    pub fn expect(mut self, tag: TypeTag) -> Self {
        self.expected = Some(tag);
        self
    }

    /// Value shown while the binding cannot be read
    pub fn with_fallback(mut self, value: TypedValue) -> Self {
        self.fallback = Some(value);
        self
    }

    pub fn tag_text(&self) -> &str {
        &self.tag_text
    }

    pub fn path_text(&self) -> &str {
        &self.path_text
    }

    /// The parsed tag, if the tag and path were well formed
    pub fn target_tag(&self) -> Option<Tag> {
        self.target.as_ref().ok().map(|(tag, _)| *tag)
    }

    pub fn expected(&self) -> Option<TypeTag> {
        self.expected
    }

    pub fn state(&self) -> &BindingState {
        &self.state
    }

    pub fn is_resolved(&self) -> bool {
        matches!(self.state, BindingState::Resolved(_))
    }

    pub fn is_invalid(&self) -> bool {
        matches!(self.state, BindingState::Invalid(_))
    }

    pub fn error(&self) -> Option<&ResolutionError> {
        match &self.state {
            BindingState::Invalid(e) => Some(e),
            _ => None,
        }
    }

    /// Fallback, else the blank value of the expected type
    pub fn default_value(&self) -> Option<TypedValue> {
        self.fallback
            .clone()
            .or_else(|| self.expected.and_then(|t| t.default_value()))
    }

    /// Drop the cached resolution if `invalidations` touch this binding's tag.
    fn invalidate(&mut self, invalidations: &Invalidations) -> bool {
        let Ok((tag, _)) = &self.target else {
            return false;
        };
        let hit = match &self.state {
            BindingState::Unresolved => false,
            BindingState::Resolved(resolved) => invalidations.affects(resolved.tag()),
            BindingState::Invalid(_) => invalidations.affects(*tag),
        };
        if hit {
            self.state = BindingState::Unresolved;
        }
        hit
    }

    fn ensure_resolved(
        &mut self,
        resolver: &Resolver,
        snapshot: &RegistrySnapshot,
    ) -> Result<&Resolved, ResolutionError> {
        if let BindingState::Unresolved = self.state {
            let result = match &self.target {
                Ok((tag, path)) => resolver.resolve(snapshot, *tag, path, self.expected),
                Err(e) => Err(e.clone()),
            };
            self.state = match result {
                Ok(resolved) => {
                    tracing::debug!(
                        "Resolved {}:{} to {} @{}",
                        self.tag_text,
                        self.path_text,
                        resolved.value_tag(),
                        resolved.path().offset()
                    );
                    BindingState::Resolved(resolved)
                }
                Err(e) => {
                    tracing::warn!("Binding {}:{} is invalid: {}", self.tag_text, self.path_text, e);
                    BindingState::Invalid(e)
                }
            };
        }

        match &self.state {
            BindingState::Resolved(resolved) => Ok(resolved),
            BindingState::Invalid(e) => Err(e.clone()),
            BindingState::Unresolved => Err(ResolutionError::NotResolved),
        }
    }
}

/// Consumer-owned collection of bindings
#[derive(Debug, Default)]
pub struct BindingSet {
    bindings: Vec<Option<Binding>>,
    resolver: Resolver,
}

impl BindingSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&mut self, binding: Binding) -> BindingId {
        let id = BindingId(self.bindings.len() as u32);
        self.bindings.push(Some(binding));
        id
    }

    /// Remove a binding. Its id is not reused.
    pub fn remove(&mut self, id: BindingId) -> Option<Binding> {
        self.bindings.get_mut(id.index()).and_then(Option::take)
    }

    pub fn get(&self, id: BindingId) -> Option<&Binding> {
        self.bindings.get(id.index()).and_then(Option::as_ref)
    }

    pub fn len(&self) -> usize {
        self.bindings.iter().flatten().count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn iter(&self) -> impl Iterator<Item = (BindingId, &Binding)> {
        self.bindings
            .iter()
            .enumerate()
            .filter_map(|(i, b)| b.as_ref().map(|b| (BindingId(i as u32), b)))
    }

    pub fn resolver(&self) -> &Resolver {
        &self.resolver
    }

    /// Reset every binding touched by `invalidations`; returns how many were reset.
    pub fn apply_invalidations(&mut self, invalidations: &Invalidations) -> usize {
        self.bindings
            .iter_mut()
            .flatten()
            .map(|binding| binding.invalidate(invalidations))
            .filter(|reset| *reset)
            .count()
    }

    /// Start a consumption cycle.
    ///
    /// Applies queued registry mutations, drains and applies invalidations, then
    /// pins the registry snapshot every read in the cycle resolves against.
    pub fn begin_cycle<'a>(&'a mut self, registry: &'a Registry) -> Cycle<'a> {
        registry.apply_queued();
        let invalidations = registry.drain_invalidations();
        let reset = self.apply_invalidations(&invalidations);
        if reset > 0 {
            tracing::debug!("Cycle {}: {} bindings invalidated", invalidations.cycle(), reset);
        }
        Cycle {
            bindings: self,
            registry,
            snapshot: registry.snapshot(),
            invalidations,
        }
    }
}

/// One consumption cycle over a [`BindingSet`]
pub struct Cycle<'a> {
    bindings: &'a mut BindingSet,
    registry: &'a Registry,
    snapshot: Arc<RegistrySnapshot>,
    invalidations: Invalidations,
}

impl<'a> Cycle<'a> {
    /// Cycle number, as counted by the registry's notifier
    pub fn number(&self) -> u64 {
        self.invalidations.cycle()
    }

    /// What was invalidated at the start of this cycle
    pub fn invalidations(&self) -> &Invalidations {
        &self.invalidations
    }

    pub fn snapshot(&self) -> &Arc<RegistrySnapshot> {
        &self.snapshot
    }

    pub fn binding(&self, id: BindingId) -> Option<&Binding> {
        self.bindings.get(id)
    }

    /// Resolve a binding, reusing its cached resolution when present.
    pub fn resolve(&mut self, id: BindingId) -> Result<&Resolved, ResolutionError> {
        let set = &mut *self.bindings;
        let binding = set
            .bindings
            .get_mut(id.index())
            .and_then(Option::as_mut)
            .ok_or(ResolutionError::UnknownBinding { id })?;
        binding.ensure_resolved(&set.resolver, &self.snapshot)
    }

    pub fn read(&mut self, id: BindingId) -> Result<TypedValue, ResolutionError> {
        let set = &mut *self.bindings;
        let binding = set
            .bindings
            .get_mut(id.index())
            .and_then(Option::as_mut)
            .ok_or(ResolutionError::UnknownBinding { id })?;

        let result = binding
            .ensure_resolved(&set.resolver, &self.snapshot)
            .and_then(Resolved::read);
        if let Err(e) = &result {
            if binding.is_resolved() {
                tracing::warn!("Read of {}:{} failed: {}", binding.tag_text, binding.path_text, e);
                binding.state = BindingState::Invalid(e.clone());
            }
        }
        result
    }

    /// `None` when the binding is invalid or cannot be resolved
    pub fn try_read(&mut self, id: BindingId) -> Option<TypedValue> {
        self.read(id).ok()
    }

    /// The value, or the binding's documented default when it cannot be read
    pub fn read_or_default(&mut self, id: BindingId) -> Option<TypedValue> {
        match self.read(id) {
            Ok(value) => Some(value),
            Err(_) => self.bindings.get(id).and_then(Binding::default_value),
        }
    }

    /// Write through a binding and mark its data source dirty.
    ///
    /// An expired source makes the binding invalid, as it does for reads.
    pub fn write(&mut self, id: BindingId, value: &TypedValue) -> Result<(), ResolutionError> {
        let resolved = self.resolve(id)?;
        let tag = resolved.tag();
        match resolved.write(value) {
            Ok(()) => {
                self.registry.mark_dirty(tag);
                Ok(())
            }
            Err(e @ ResolutionError::SourceExpired { .. }) => {
                let slot = self.bindings.bindings.get_mut(id.index());
                if let Some(binding) = slot.and_then(Option::as_mut) {
                    tracing::warn!(
                        "Write to {}:{} failed: {}",
                        binding.tag_text,
                        binding.path_text,
                        e
                    );
                    binding.state = BindingState::Invalid(e.clone());
                }
                Err(e)
            }
            Err(e) => Err(e),
        }
    }

    /// Read every binding in id order, falling back to defaults
    pub fn read_all(&mut self) -> Vec<(BindingId, Option<TypedValue>)> {
        let ids: Vec<BindingId> = self.bindings.iter().map(|(id, _)| id).collect();
        ids.into_iter()
            .map(|id| (id, self.read_or_default(id)))
            .collect()
    }
}
