//! Deferred registry mutations from producer threads

use super::{allocate_id, DataSource, RegistrationHandle, RegistryError};
use crate::tag::Tag;
use crossbeam_channel::{Sender, TrySendError};
use std::sync::atomic::AtomicU64;
use std::sync::Arc;

/// A mutation waiting for [`Registry::apply_queued`](super::Registry::apply_queued)
#[derive(Debug)]
pub enum QueuedMutation {
    Register {
        tag: Tag,
        id: super::RegistrationId,
        source: DataSource,
    },
    Unregister(RegistrationHandle),
    MarkDirty(Tag),
}

/// Cloneable producer-side sender of registry mutations
///
/// Registration ids are allocated when the mutation is queued, so the returned
/// handle is usable (for a later queued unregister) before the registration
/// has been applied.
#[derive(Debug, Clone)]
pub struct RegistryQueue {
    sender: Sender<QueuedMutation>,
    next_id: Arc<AtomicU64>,
}

impl RegistryQueue {
    pub(super) fn new(sender: Sender<QueuedMutation>, next_id: Arc<AtomicU64>) -> Self {
        Self { sender, next_id }
    }

    pub fn register(&self, tag: Tag, source: DataSource) -> Result<RegistrationHandle, RegistryError> {
        let id = allocate_id(&self.next_id);
        self.send(QueuedMutation::Register { tag, id, source })?;
        Ok(RegistrationHandle { tag, id })
    }

    pub fn unregister(&self, handle: RegistrationHandle) -> Result<(), RegistryError> {
        self.send(QueuedMutation::Unregister(handle))
    }

    pub fn mark_dirty(&self, tag: Tag) -> Result<(), RegistryError> {
        self.send(QueuedMutation::MarkDirty(tag))
    }

    /// Mutations waiting to be applied
    pub fn pending(&self) -> usize {
        self.sender.len()
    }

    fn send(&self, mutation: QueuedMutation) -> Result<(), RegistryError> {
        self.sender.try_send(mutation).map_err(|e| match e {
            TrySendError::Full(_) => RegistryError::QueueFull,
            TrySendError::Disconnected(_) => RegistryError::QueueClosed,
        })
    }
}
