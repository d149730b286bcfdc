use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Mutex, MutexGuard};

use tracing::debug;

use crate::error::{BridgeError, Result};

use super::token::{HandleKind, Token};

static NEXT_REGISTRY_ID: AtomicU32 = AtomicU32::new(1);

/// Anything the registry can own. Cloning must be cheap (an `Arc` bump).
pub(crate) trait Resource: Clone + Send {
    fn kind(&self) -> HandleKind;
}

/// Arena of live handles plus their ownership tree.
///
/// Releasing a handle releases its whole subtree. Descendant sync futures are
/// left as cancelled tombstones instead of vanishing, so whoever waits on
/// them next learns the operation was cancelled. A tombstone owns nothing but
/// its slot; the slot is reclaimed by the next `get` or `release` of that
/// token and stays reserved until then. Tombstones are not counted by `live`.
/// The resources removed by a release are handed back to the caller and
/// dropped outside the lock.
pub(crate) struct Registry<R> {
    id: u32,
    table: Mutex<HandleTable<R>>,
}

struct HandleTable<R> {
    slots: Vec<Slot<R>>,
    free: Vec<u32>,
    live: usize,
}

struct Slot<R> {
    generation: u32,
    state: SlotState<R>,
}

enum SlotState<R> {
    Vacant,
    Live(Entry<R>),
    Cancelled,
}

struct Entry<R> {
    resource: R,
    parent: Option<Token>,
    children: Vec<Token>,
}

impl<R: Resource> Registry<R> {
    pub(crate) fn new() -> Self {
        Self {
            id: NEXT_REGISTRY_ID.fetch_add(1, Ordering::Relaxed),
            table: Mutex::new(HandleTable {
                slots: Vec::new(),
                free: Vec::new(),
                live: 0,
            }),
        }
    }

    fn lock(&self) -> MutexGuard<'_, HandleTable<R>> {
        match self.table.lock() {
            Ok(guard) => guard,
            // The table is only mutated through whole-entry moves, so a panic
            // elsewhere cannot leave it half-written.
            Err(poisoned) => poisoned.into_inner(),
        }
    }

    /// Register `resource`, optionally as a child of `parent`.
    ///
    /// # Errors
    /// `Cancelled` if the parent was released while the resource was being
    /// produced; the resource is dropped after the lock is released.
    pub(crate) fn insert(&self, parent: Option<Token>, resource: R) -> Result<Token> {
        let kind = resource.kind();
        let mut table = self.lock();
        if let Some(parent) = parent {
            if self.entry_mut(&mut table, parent).is_none() {
                drop(table);
                return Err(BridgeError::Cancelled(format!(
                    "{parent} was released before the {kind} could be registered"
                )));
            }
        }

        let entry = Entry {
            resource,
            parent,
            children: Vec::new(),
        };
        let index = if let Some(index) = table.free.pop() {
            table.slots[index as usize].state = SlotState::Live(entry);
            index
        } else {
            let index = u32::try_from(table.slots.len())
                .map_err(|_| BridgeError::RuntimeError("handle table exhausted".to_string()))?;
            table.slots.push(Slot {
                generation: 0,
                state: SlotState::Live(entry),
            });
            index
        };
        table.live += 1;

        let token = Token {
            registry: self.id,
            index,
            generation: table.slots[index as usize].generation,
            kind,
        };
        if let Some(parent) = parent {
            if let Some(parent_entry) = self.entry_mut(&mut table, parent) {
                parent_entry.children.push(token);
            }
        }
        debug!(%token, "handle registered");
        Ok(token)
    }

    /// Clone the resource behind `token` out of the table.
    ///
    /// # Errors
    /// `StaleHandle` for released, foreign, or mis-kinded tokens. `Cancelled`
    /// (once) for a tombstoned sync future, which is vacated by this call.
    pub(crate) fn get(&self, token: Token) -> Result<R> {
        let mut table = self.lock();
        if self.is_tombstone(&table, token) {
            Self::vacate(&mut table, token.index);
            return Err(BridgeError::Cancelled(format!(
                "{token} was cancelled when its owner was released"
            )));
        }
        self.entry_mut(&mut table, token)
            .map(|entry| entry.resource.clone())
            .ok_or_else(|| stale(token))
    }

    /// Release `token` and every descendant.
    ///
    /// # Errors
    /// `StaleHandle` if the token is not live. Releasing a tombstone succeeds
    /// and returns nothing.
    pub(crate) fn release(&self, token: Token) -> Result<Vec<R>> {
        let mut table = self.lock();
        if self.is_tombstone(&table, token) {
            Self::vacate(&mut table, token.index);
            return Ok(Vec::new());
        }
        let parent = self
            .entry_mut(&mut table, token)
            .ok_or_else(|| stale(token))?
            .parent;
        if let Some(parent) = parent {
            if let Some(parent_entry) = self.entry_mut(&mut table, parent) {
                parent_entry.children.retain(|child| *child != token);
            }
        }
        let released = Self::remove_subtree(&mut table, token);
        debug!(%token, released = released.len(), "handle released");
        Ok(released)
    }

    /// Release the children of `token` that are of `kind`, keeping `token`.
    pub(crate) fn release_children(&self, token: Token, kind: HandleKind) -> Result<Vec<R>> {
        let mut table = self.lock();
        let entry = self.entry_mut(&mut table, token).ok_or_else(|| stale(token))?;
        let (matching, rest): (Vec<Token>, Vec<Token>) =
            entry.children.drain(..).partition(|child| child.kind == kind);
        entry.children = rest;

        let mut released = Vec::new();
        for child in matching {
            released.extend(Self::remove_subtree(&mut table, child));
        }
        Ok(released)
    }

    /// Live children of `token`, in registration order.
    pub(crate) fn children(&self, token: Token) -> Result<Vec<Token>> {
        let mut table = self.lock();
        self.entry_mut(&mut table, token)
            .map(|entry| entry.children.clone())
            .ok_or_else(|| stale(token))
    }

    pub(crate) fn live_count(&self) -> usize {
        self.lock().live
    }

    fn entry_mut<'t>(&self, table: &'t mut HandleTable<R>, token: Token) -> Option<&'t mut Entry<R>> {
        if token.registry != self.id {
            return None;
        }
        let slot = table.slots.get_mut(token.index as usize)?;
        if slot.generation != token.generation {
            return None;
        }
        match &mut slot.state {
            SlotState::Live(entry) if entry.resource.kind() == token.kind => Some(entry),
            _ => None,
        }
    }

    fn is_tombstone(&self, table: &HandleTable<R>, token: Token) -> bool {
        token.registry == self.id
            && table.slots.get(token.index as usize).is_some_and(|slot| {
                slot.generation == token.generation && matches!(slot.state, SlotState::Cancelled)
            })
    }

    fn vacate(table: &mut HandleTable<R>, index: u32) {
        let slot = &mut table.slots[index as usize];
        slot.state = SlotState::Vacant;
        slot.generation = slot.generation.wrapping_add(1);
        table.free.push(index);
    }

    /// Remove `root` and its descendants. `root` is vacated; descendant sync
    /// futures become tombstones, everything else is vacated.
    fn remove_subtree(table: &mut HandleTable<R>, root: Token) -> Vec<R> {
        let mut released = Vec::new();
        let mut pending = vec![root];
        while let Some(token) = pending.pop() {
            let slot = &mut table.slots[token.index as usize];
            if slot.generation != token.generation || !matches!(slot.state, SlotState::Live(_)) {
                continue;
            }
            let SlotState::Live(entry) = std::mem::replace(&mut slot.state, SlotState::Vacant)
            else {
                continue;
            };
            table.live -= 1;
            if token != root && token.kind == HandleKind::SyncFuture {
                table.slots[token.index as usize].state = SlotState::Cancelled;
            } else {
                Self::vacate(table, token.index);
            }
            pending.extend(entry.children.iter().copied());
            released.push(entry.resource);
        }
        released
    }
}

fn stale(token: Token) -> BridgeError {
    BridgeError::StaleHandle(format!("{token} is not a live handle"))
}
