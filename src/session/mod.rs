//! Per-user conversation sessions: wizard state plus the signal draft.

pub mod draft;
pub mod state;
pub mod store;

pub use draft::{CompletedSignal, SignalDraft, SignalField, parse_positive_decimal};
pub use state::WizardState;
pub use store::{Session, SessionGuard, SessionStore};
