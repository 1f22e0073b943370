//! Session store: one session slot per user, each behind its own lock.
//!
//! A caller that holds a [`SessionGuard`] has exclusive access to that user's
//! session until the guard is dropped, so two events from the same user are
//! handled one after the other. Different users never contend.

use std::collections::HashMap;
use std::sync::{Arc, MutexGuard, PoisonError};

use secrecy::SecretString;
use tokio::sync::{Mutex, OwnedMutexGuard};
use tracing::debug;

use super::draft::SignalDraft;
use super::state::WizardState;

/// Everything the bot remembers about a user between two messages.
///
/// State and draft live together so they are created, advanced and
/// discarded as one unit.
#[derive(Debug)]
pub struct Session {
    pub state: WizardState,
    pub draft: SignalDraft,
    /// Credential entered in the preset flow, waiting for its name.
    pub pending_preset_credential: Option<SecretString>,
}

impl Session {
    /// A fresh signal wizard waiting for the credential.
    pub fn signal_wizard() -> Self {
        Self::at(WizardState::AwaitingCredential)
    }

    /// A fresh preset-creation flow waiting for the credential.
    pub fn preset_wizard() -> Self {
        Self::at(WizardState::AwaitingPresetCredential)
    }

    fn at(state: WizardState) -> Self {
        Self {
            state,
            draft: SignalDraft::new(),
            pending_preset_credential: None,
        }
    }

    /// Move to the next state of the current flow. Returns `None` when the
    /// flow has no further step; the state is left unchanged in that case.
    pub fn advance(&mut self) -> Option<WizardState> {
        let next = self.state.next()?;
        debug_assert!(self.state.can_transition_to(next));
        self.state = next;
        Some(next)
    }
}

type Slot = Arc<Mutex<Option<Session>>>;
type SlotMap = Arc<std::sync::Mutex<HashMap<String, Slot>>>;

/// Process-wide map from user id to that user's session slot.
///
/// A slot only exists while the user has a session or while some task holds
/// or waits for its lock. The last guard to release an empty slot removes it.
#[derive(Default)]
pub struct SessionStore {
    slots: SlotMap,
}

fn lock_map(slots: &SlotMap) -> MutexGuard<'_, HashMap<String, Slot>> {
    slots.lock().unwrap_or_else(PoisonError::into_inner)
}

impl SessionStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn slot(&self, user_id: &str) -> Slot {
        let mut slots = lock_map(&self.slots);
        Arc::clone(slots.entry(user_id.to_string()).or_default())
    }

    /// Take exclusive access to a user's session. Waits while another event
    /// for the same user is being handled.
    pub async fn lock(&self, user_id: &str) -> SessionGuard {
        let slot = self.slot(user_id);
        SessionGuard {
            user_id: user_id.to_string(),
            slots: Arc::clone(&self.slots),
            slot: Arc::clone(&slot),
            guard: slot.lock_owned().await,
        }
    }

    /// Current wizard state, or `None` when the user is idle.
    pub async fn get(&self, user_id: &str) -> Option<WizardState> {
        self.lock(user_id).await.state()
    }

    /// Put the user in `state`, creating an empty session if they were idle.
    pub async fn set(&self, user_id: &str, state: WizardState) {
        let mut guard = self.lock(user_id).await;
        match guard.session_mut() {
            Some(session) => session.state = state,
            None => {
                guard.start(Session::at(state));
            }
        }
    }

    /// Return the user to idle, discarding any draft.
    pub async fn clear(&self, user_id: &str) {
        self.lock(user_id).await.clear();
    }

    /// Number of users with an active session.
    pub async fn active_count(&self) -> usize {
        let slots: Vec<Slot> = lock_map(&self.slots).values().cloned().collect();
        let mut count = 0;
        for slot in slots {
            if slot.lock().await.is_some() {
                count += 1;
            }
        }
        count
    }

    /// Number of slots currently kept in memory.
    pub fn slot_count(&self) -> usize {
        lock_map(&self.slots).len()
    }
}

/// Exclusive handle on one user's session slot.
pub struct SessionGuard {
    user_id: String,
    slots: SlotMap,
    slot: Slot,
    guard: OwnedMutexGuard<Option<Session>>,
}

impl SessionGuard {
    pub fn user_id(&self) -> &str {
        &self.user_id
    }

    pub fn state(&self) -> Option<WizardState> {
        (*self.guard).as_ref().map(|s| s.state)
    }

    pub fn session(&self) -> Option<&Session> {
        (*self.guard).as_ref()
    }

    pub fn session_mut(&mut self) -> Option<&mut Session> {
        (*self.guard).as_mut()
    }

    /// Replace whatever the user had with `session`.
    pub fn start(&mut self, session: Session) -> &mut Session {
        debug!(user_id = %self.user_id, state = %session.state, "Session started");
        self.guard.insert(session)
    }

    /// Remove the session and hand it to the caller.
    pub fn take(&mut self) -> Option<Session> {
        self.guard.take()
    }

    pub fn clear(&mut self) {
        if let Some(session) = self.guard.take() {
            debug!(user_id = %self.user_id, state = %session.state, "Session cleared");
        }
    }
}

impl Drop for SessionGuard {
    fn drop(&mut self) {
        if self.guard.is_some() {
            return;
        }
        let mut slots = lock_map(&self.slots);
        // References: the map, `self.slot`, and the one inside `self.guard`.
        // Any more means another task is waiting on this slot.
        let unshared = Arc::strong_count(&self.slot) == 3;
        let ours = slots
            .get(&self.user_id)
            .is_some_and(|slot| Arc::ptr_eq(slot, &self.slot));
        if unshared && ours {
            slots.remove(&self.user_id);
        }
    }
}
