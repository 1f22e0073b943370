//! Conversation controller: turns commands, text and button presses into
//! session changes, preset-store calls and signal dispatches.
//!
//! Every handler runs with the user's [`SessionGuard`] held, so a user's
//! events are applied one at a time. Storage errors propagate out of the
//! handlers untouched and are converted into a generic reply by
//! [`Controller::handle`]; the session stays where it was so the user can
//! simply retry.

use std::sync::Arc;

use secrecy::{ExposeSecret, SecretString};
use tracing::{debug, error, info, warn};

use super::actions::{ButtonAction, MAX_PRESET_NAME_BYTES};
use super::keyboard;
use crate::channels::{Command, EventKind, IncomingEvent, Reply};
use crate::dispatch::{self, SignalSink};
use crate::error::{DraftError, Result};
use crate::session::{
    Session, SessionGuard, SessionStore, SignalField, WizardState, parse_positive_decimal,
};
use crate::store::PresetStore;

/// Behaviour switches for the signal wizard.
#[derive(Debug, Clone, Copy, Default)]
pub struct WizardOptions {
    /// Require risk, stop price and take profit to be positive decimals.
    pub strict_numbers: bool,
}

/// Drives the wizard for every user.
pub struct Controller {
    presets: Arc<dyn PresetStore>,
    sink: Arc<dyn SignalSink>,
    sessions: SessionStore,
    options: WizardOptions,
}

impl Controller {
    pub fn new(presets: Arc<dyn PresetStore>, sink: Arc<dyn SignalSink>) -> Self {
        Self {
            presets,
            sink,
            sessions: SessionStore::new(),
            options: WizardOptions::default(),
        }
    }

    pub fn with_options(mut self, options: WizardOptions) -> Self {
        self.options = options;
        self
    }

    pub fn sessions(&self) -> &SessionStore {
        &self.sessions
    }

    /// Handle one inbound event. `None` means the event gets no reply.
    pub async fn handle(&self, event: &IncomingEvent) -> Option<Reply> {
        let mut session = self.sessions.lock(&event.user_id).await;

        let result = match &event.kind {
            EventKind::Command(command) => self.on_command(&mut session, command).await,
            EventKind::Text(text) => self.on_text(&mut session, text).await,
            EventKind::Button(payload) => self.on_button(&mut session, payload).await,
        };

        match result {
            Ok(reply) => reply,
            Err(e) => {
                error!(
                    user_id = %event.user_id,
                    state = ?session.state(),
                    error = %e,
                    "Failed to handle event"
                );
                Some(Reply::text(keyboard::UNEXPECTED_ERROR))
            }
        }
    }

    /// `/start`, `/newsignal`, `/managepresets`.
    pub async fn on_command(
        &self,
        session: &mut SessionGuard,
        command: &Command,
    ) -> Result<Option<Reply>> {
        match command {
            Command::Start => {
                session.clear();
                Ok(Some(keyboard::main_menu()))
            }
            Command::NewSignal => self.start_signal(session).await.map(Some),
            Command::ManagePresets => {
                session.clear();
                Ok(Some(keyboard::manage_presets()))
            }
            Command::Other(name) => {
                debug!(user_id = %session.user_id(), command = %name, "Ignoring unknown command");
                Ok(None)
            }
        }
    }

    /// Free text answers the current prompt. Idle users get no reply.
    pub async fn on_text(&self, session: &mut SessionGuard, text: &str) -> Result<Option<Reply>> {
        let Some(state) = session.state() else {
            debug!(user_id = %session.user_id(), "Ignoring text from idle user");
            return Ok(None);
        };

        match state {
            WizardState::AwaitingCredential => {
                // A preset name resolves to its credential; anything else is
                // taken as the credential itself.
                let stored = self
                    .presets
                    .fetch_credential(session.user_id(), text)
                    .await?;
                let credential = if stored.is_empty() {
                    text.to_string()
                } else {
                    stored
                };
                self.record_and_advance(session, SignalField::Credential, credential)
                    .await
            }
            WizardState::AwaitingPresetCredential => {
                if let Some(current) = session.session_mut() {
                    current.pending_preset_credential = Some(SecretString::from(text.to_string()));
                    current.advance();
                }
                Ok(Some(keyboard::prompt_for(WizardState::AwaitingPresetName)))
            }
            WizardState::AwaitingPresetName => self.save_preset(session, text).await,
            _ => {
                let Some(field) = state.field() else {
                    return Ok(None);
                };
                if self.options.strict_numbers && field.is_numeric() {
                    if let Err(DraftError::InvalidValue { reason, .. }) =
                        parse_positive_decimal(field, text)
                    {
                        debug!(user_id = %session.user_id(), %field, "Rejected non-numeric input");
                        return Ok(Some(keyboard::invalid_number(state, &reason)));
                    }
                }
                self.record_and_advance(session, field, text).await
            }
        }
    }

    /// A button press. Step-bound buttons pressed outside their step are
    /// answered as expired and leave the session untouched.
    pub async fn on_button(
        &self,
        session: &mut SessionGuard,
        payload: &str,
    ) -> Result<Option<Reply>> {
        let Some(action) = ButtonAction::parse(payload) else {
            warn!(user_id = %session.user_id(), "Unknown button payload");
            return Ok(Some(Reply::text(keyboard::BUTTON_EXPIRED)));
        };
        let state = session.state();
        let user_id = session.user_id().to_string();

        match action {
            ButtonAction::NewSignal => self.start_signal(session).await.map(Some),
            ButtonAction::BackToMain | ButtonAction::MainMenu => {
                session.clear();
                Ok(Some(keyboard::main_menu()))
            }
            ButtonAction::ManagePresets => {
                session.clear();
                Ok(Some(keyboard::manage_presets()))
            }
            ButtonAction::SelectPreset(name) => {
                if state != Some(WizardState::AwaitingCredential) {
                    return Ok(Some(expired(&user_id, state)));
                }
                let credential = self.presets.fetch_credential(&user_id, &name).await?;
                if credential.is_empty() {
                    info!(user_id = %user_id, preset = %name, "Selected preset no longer exists");
                    let names = self.presets.list_preset_names(&user_id).await?;
                    return Ok(Some(keyboard::preset_missing(&name, &names)));
                }
                self.record_and_advance(session, SignalField::Credential, credential)
                    .await
            }
            ButtonAction::InputManually => {
                if state != Some(WizardState::AwaitingCredential) {
                    return Ok(Some(expired(&user_id, state)));
                }
                Ok(Some(keyboard::prompt_for(WizardState::AwaitingCredential)))
            }
            ButtonAction::AddPreset => {
                session.start(Session::preset_wizard());
                Ok(Some(keyboard::prompt_for(
                    WizardState::AwaitingPresetCredential,
                )))
            }
            ButtonAction::ListPresets => {
                let presets = self.presets.list_presets(&user_id).await?;
                Ok(Some(keyboard::preset_list(&presets)))
            }
            ButtonAction::DeletePreset => {
                let names = self.presets.list_preset_names(&user_id).await?;
                Ok(Some(keyboard::delete_selection(&names)))
            }
            ButtonAction::Delete(name) => {
                if !self.presets.preset_exists(&user_id, &name).await? {
                    return Ok(Some(Reply::text(keyboard::PRESET_DELETE_MISSING)));
                }
                self.presets.delete_preset(&user_id, &name).await?;
                info!(user_id = %user_id, preset = %name, "Preset deleted");
                Ok(Some(keyboard::preset_deleted(&name)))
            }
            ButtonAction::SkipStopPrice => {
                self.skip(session, WizardState::AwaitingStopPrice).await
            }
            ButtonAction::SkipTakeProfit => {
                self.skip(session, WizardState::AwaitingTakeProfit).await
            }
            ButtonAction::SkipComment => self.skip(session, WizardState::AwaitingComment).await,
        }
    }

    // ── Steps ───────────────────────────────────────────────────────

    /// Fresh wizard at the credential step, offering the user's presets.
    async fn start_signal(&self, session: &mut SessionGuard) -> Result<Reply> {
        let names = self.presets.list_preset_names(session.user_id()).await?;
        session.start(Session::signal_wizard());
        Ok(keyboard::preset_selection(&names))
    }

    async fn skip(&self, session: &mut SessionGuard, step: WizardState) -> Result<Option<Reply>> {
        let state = session.state();
        if state != Some(step) {
            return Ok(Some(expired(session.user_id(), state)));
        }
        let Some(field) = step.field() else {
            return Ok(None);
        };
        let skipped = match session.session_mut() {
            Some(current) => current.draft.skip(field),
            None => return Ok(None),
        };
        if let Err(e) = skipped {
            return Ok(Some(abandon(session, e)));
        }
        self.advance_or_dispatch(session).await
    }

    async fn record_and_advance(
        &self,
        session: &mut SessionGuard,
        field: SignalField,
        value: impl Into<String>,
    ) -> Result<Option<Reply>> {
        let recorded = match session.session_mut() {
            Some(current) => current.draft.record(field, value),
            None => return Ok(None),
        };
        if let Err(e) = recorded {
            return Ok(Some(abandon(session, e)));
        }
        self.advance_or_dispatch(session).await
    }

    /// Prompt for the next step, or dispatch once the last step is answered.
    /// The session is gone after a dispatch whatever its outcome.
    async fn advance_or_dispatch(&self, session: &mut SessionGuard) -> Result<Option<Reply>> {
        let Some(current) = session.session_mut() else {
            return Ok(None);
        };
        if let Some(next) = current.advance() {
            return Ok(Some(keyboard::prompt_for(next)));
        }

        let Some(finished) = session.take() else {
            return Ok(None);
        };
        let signal = match finished.draft.complete() {
            Ok(signal) => signal,
            Err(e) => {
                warn!(user_id = %session.user_id(), error = %e, "Draft incomplete at dispatch");
                return Ok(Some(Reply::text(keyboard::DRAFT_LOST)));
            }
        };

        let outcome = dispatch::dispatch(self.sink.as_ref(), signal).await;
        debug!(user_id = %session.user_id(), sent = outcome.is_sent(), "Wizard finished");
        Ok(Some(Reply::text(outcome.user_message())))
    }

    async fn save_preset(&self, session: &mut SessionGuard, name: &str) -> Result<Option<Reply>> {
        if name.len() > MAX_PRESET_NAME_BYTES {
            return Ok(Some(keyboard::preset_name_too_long()));
        }

        let credential = session
            .session()
            .and_then(|s| s.pending_preset_credential.as_ref())
            .map(|c| c.expose_secret().to_string());
        let Some(credential) = credential else {
            return Ok(Some(abandon(
                session,
                DraftError::MissingField(SignalField::Credential),
            )));
        };

        self.presets
            .upsert_preset(session.user_id(), name, &credential)
            .await?;
        info!(user_id = %session.user_id(), preset = %name, "Preset saved");
        session.clear();
        Ok(Some(keyboard::preset_saved(name)))
    }
}

fn expired(user_id: &str, state: Option<WizardState>) -> Reply {
    debug!(user_id = %user_id, state = ?state, "Stale button pressed");
    Reply::text(keyboard::BUTTON_EXPIRED)
}

/// Drop a session whose draft is inconsistent and ask the user to start over.
fn abandon(session: &mut SessionGuard, e: DraftError) -> Reply {
    warn!(user_id = %session.user_id(), error = %e, "Discarding inconsistent session");
    session.clear();
    Reply::text(keyboard::DRAFT_LOST)
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;

    use async_trait::async_trait;

    use super::*;
    use crate::error::DispatchError;
    use crate::store::LibSqlBackend;

    #[derive(Default)]
    struct RecordingSink {
        payloads: Mutex<Vec<String>>,
    }

    #[async_trait]
    impl SignalSink for RecordingSink {
        fn name(&self) -> &str {
            "recording"
        }

        async fn deliver(&self, payload: &str) -> std::result::Result<(), DispatchError> {
            self.payloads.lock().unwrap().push(payload.to_string());
            Ok(())
        }
    }

    async fn controller() -> (Controller, Arc<LibSqlBackend>, Arc<RecordingSink>) {
        let store = Arc::new(LibSqlBackend::new_memory().await.unwrap());
        let sink = Arc::new(RecordingSink::default());
        let controller = Controller::new(store.clone(), sink.clone());
        (controller, store, sink)
    }

    fn text(body: &str) -> IncomingEvent {
        IncomingEvent::from_text("test", "u1", body)
    }

    fn press(action: ButtonAction) -> IncomingEvent {
        IncomingEvent::button("test", "u1", &action.encode())
    }

    #[tokio::test]
    async fn start_shows_main_menu_and_clears() {
        let (c, _, _) = controller().await;
        c.handle(&text("/newsignal")).await;
        assert!(c.sessions().get("u1").await.is_some());

        let reply = c.handle(&text("/start")).await.unwrap();
        assert_eq!(reply.text, "Choose an option:");
        assert_eq!(c.sessions().get("u1").await, None);
    }

    #[tokio::test]
    async fn idle_text_is_ignored() {
        let (c, _, _) = controller().await;
        assert!(c.handle(&text("hello")).await.is_none());
        assert_eq!(c.sessions().get("u1").await, None);
    }

    #[tokio::test]
    async fn unknown_command_is_ignored() {
        let (c, _, _) = controller().await;
        assert!(c.handle(&text("/help")).await.is_none());
    }

    #[tokio::test]
    async fn new_signal_offers_presets() {
        let (c, store, _) = controller().await;
        store.upsert_preset("u1", "main", "key-1").await.unwrap();

        let reply = c.handle(&press(ButtonAction::NewSignal)).await.unwrap();
        assert_eq!(
            reply.payloads(),
            vec!["preset:main", "input_manually", "back_to_main"]
        );
        assert_eq!(
            c.sessions().get("u1").await,
            Some(WizardState::AwaitingCredential)
        );
    }

    #[tokio::test]
    async fn selected_preset_puts_credential_in_draft() {
        let (c, store, _) = controller().await;
        store.upsert_preset("u1", "main", "key-1").await.unwrap();
        c.handle(&text("/newsignal")).await;

        let reply = c
            .handle(&press(ButtonAction::SelectPreset("main".into())))
            .await
            .unwrap();
        assert_eq!(reply.text, "Enter trade side (long/short):");

        let guard = c.sessions().lock("u1").await;
        let session = guard.session().unwrap();
        assert_eq!(session.state, WizardState::AwaitingSide);
        assert_eq!(session.draft.expose_credential(), Some("key-1"));
    }

    #[tokio::test]
    async fn vanished_preset_reoffers_selection() {
        let (c, store, _) = controller().await;
        store.upsert_preset("u1", "other", "key-2").await.unwrap();
        c.handle(&text("/newsignal")).await;

        let reply = c
            .handle(&press(ButtonAction::SelectPreset("gone".into())))
            .await
            .unwrap();
        assert!(reply.text.contains("no longer exists"));
        assert!(reply.payloads().contains(&"preset:other"));
        assert_eq!(
            c.sessions().get("u1").await,
            Some(WizardState::AwaitingCredential)
        );
    }

    #[tokio::test]
    async fn preset_button_outside_credential_step_is_stale() {
        let (c, store, _) = controller().await;
        store.upsert_preset("u1", "main", "key-1").await.unwrap();
        c.handle(&text("/newsignal")).await;
        c.handle(&text("literal-key")).await;

        let reply = c
            .handle(&press(ButtonAction::SelectPreset("main".into())))
            .await
            .unwrap();
        assert_eq!(reply.text, keyboard::BUTTON_EXPIRED);
        let guard = c.sessions().lock("u1").await;
        let session = guard.session().unwrap();
        assert_eq!(session.state, WizardState::AwaitingSide);
        assert_eq!(session.draft.expose_credential(), Some("literal-key"));
    }

    #[tokio::test]
    async fn input_manually_keeps_credential_step() {
        let (c, _, _) = controller().await;
        c.handle(&text("/newsignal")).await;
        let reply = c.handle(&press(ButtonAction::InputManually)).await.unwrap();
        assert_eq!(reply.text, "Enter API key:");
        assert_eq!(
            c.sessions().get("u1").await,
            Some(WizardState::AwaitingCredential)
        );
    }

    #[tokio::test]
    async fn skip_only_works_at_its_step() {
        let (c, _, _) = controller().await;
        c.handle(&text("/newsignal")).await;
        c.handle(&text("key")).await;
        c.handle(&text("long")).await;

        let reply = c.handle(&press(ButtonAction::SkipStopPrice)).await.unwrap();
        assert_eq!(reply.text, keyboard::BUTTON_EXPIRED);
        assert_eq!(c.sessions().get("u1").await, Some(WizardState::AwaitingSymbol));
    }

    #[tokio::test]
    async fn unknown_payload_is_stale() {
        let (c, _, _) = controller().await;
        let reply = c
            .handle(&IncomingEvent::button("test", "u1", "preset_main"))
            .await
            .unwrap();
        assert_eq!(reply.text, keyboard::BUTTON_EXPIRED);
    }

    #[tokio::test]
    async fn add_preset_flow_saves_and_ends() {
        let (c, store, _) = controller().await;
        c.handle(&press(ButtonAction::ManagePresets)).await;
        let reply = c.handle(&press(ButtonAction::AddPreset)).await.unwrap();
        assert_eq!(reply.text, "Please enter the API Key:");

        let reply = c.handle(&text("key-9")).await.unwrap();
        assert_eq!(reply.text, "Please provide a friendly name for this API Key:");

        let reply = c.handle(&text("live_acct")).await.unwrap();
        assert_eq!(reply.text, "API Key preset saved with name: live_acct");
        assert_eq!(c.sessions().get("u1").await, None);
        assert_eq!(
            store.fetch_credential("u1", "live_acct").await.unwrap(),
            "key-9"
        );
    }

    #[tokio::test]
    async fn overlong_preset_name_is_asked_again() {
        let (c, store, _) = controller().await;
        c.handle(&press(ButtonAction::AddPreset)).await;
        c.handle(&text("key-9")).await;

        let long_name = "x".repeat(MAX_PRESET_NAME_BYTES + 1);
        let reply = c.handle(&text(&long_name)).await.unwrap();
        assert!(reply.text.contains("too long"));
        assert_eq!(
            c.sessions().get("u1").await,
            Some(WizardState::AwaitingPresetName)
        );
        assert!(store.list_preset_names("u1").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn delete_existing_and_missing() {
        let (c, store, _) = controller().await;
        store.upsert_preset("u1", "old", "k").await.unwrap();

        let reply = c
            .handle(&press(ButtonAction::Delete("old".into())))
            .await
            .unwrap();
        assert_eq!(reply.text, "Preset 'old' deleted.");
        assert!(!store.preset_exists("u1", "old").await.unwrap());

        let reply = c
            .handle(&press(ButtonAction::Delete("old".into())))
            .await
            .unwrap();
        assert_eq!(reply.text, keyboard::PRESET_DELETE_MISSING);
    }

    #[tokio::test]
    async fn strict_numbers_reprompts_then_advances() {
        let (c, _, _) = controller().await;
        let c = c.with_options(WizardOptions {
            strict_numbers: true,
        });
        for step in ["/newsignal", "key", "long", "BTCUSD"] {
            c.handle(&text(step)).await;
        }

        let reply = c.handle(&text("banana")).await.unwrap();
        assert!(reply.text.starts_with("Invalid number"));
        assert_eq!(c.sessions().get("u1").await, Some(WizardState::AwaitingRisk));

        let reply = c.handle(&text("1.5")).await.unwrap();
        assert_eq!(reply.text, "Enter stop price:");
    }

    #[tokio::test]
    async fn lenient_mode_accepts_anything() {
        let (c, _, sink) = controller().await;
        for step in ["/newsignal", "key", "long", "BTCUSD", "1", "banana", "x", "y"] {
            c.handle(&text(step)).await;
        }
        assert_eq!(
            *sink.payloads.lock().unwrap(),
            vec!["key,long,BTCUSD,risk=1,sl=banana,tp=x,comment=\"y\""]
        );
    }
}
