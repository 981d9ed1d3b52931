use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{mpsc, watch};
use tokio::time::Instant;
use tracing::{error, info, warn};

use super::locks::LockTracker;
use super::store::CardStore;
use crate::models::{ClientEvent, FlashcardDraft, ServerEvent, StoreError};

/// Quiet period after the last local mutation before a save starts.
pub const DEFAULT_DEBOUNCE: Duration = Duration::from_millis(1000);

/// Save cycle states of one editor session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SaveState {
    /// No unsaved local changes.
    Idle,
    /// Local mutation pending, debounce running.
    Dirty,
    /// Persistence call in flight.
    Saving,
}

/// User-visible session outcomes, for the rendering layer to surface.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionNotice {
    Saved,
    SaveFailed(String),
}

/// Commands from the rendering layer.
#[derive(Debug)]
enum EditorCommand {
    EditTerm { card_id: String, value: String },
    EditDefinition { card_id: String, value: String },
    AddCard { card: FlashcardDraft },
    RemoveCard { card_id: String },
    Focus { card_id: String },
    Blur { card_id: String },
    Progress { value: u32 },
    Save,
}

struct SaveOutcome {
    /// Snapshot as it stood when the save was initiated; reconciliation
    /// classifies against this, not the possibly-further-mutated list.
    basis: Vec<FlashcardDraft>,
    result: Result<Vec<FlashcardDraft>, StoreError>,
}

/// Handle to a running [`EditorSession`] actor.
///
/// Mutations apply to the in-memory snapshot immediately (the watch
/// channels update without waiting on the network); persistence and
/// broadcast happen asynchronously behind the debounce.
pub struct EditorHandle {
    commands: mpsc::UnboundedSender<EditorCommand>,
    cards: watch::Receiver<Vec<FlashcardDraft>>,
    locks: watch::Receiver<HashSet<String>>,
    state: watch::Receiver<SaveState>,
    notices: mpsc::UnboundedReceiver<SessionNotice>,
}

impl EditorHandle {
    pub fn edit_term(&self, card_id: &str, value: &str) {
        self.send(EditorCommand::EditTerm {
            card_id: card_id.to_string(),
            value: value.to_string(),
        });
    }

    pub fn edit_definition(&self, card_id: &str, value: &str) {
        self.send(EditorCommand::EditDefinition {
            card_id: card_id.to_string(),
            value: value.to_string(),
        });
    }

    /// Add a blank card under a fresh temporary id and return that id.
    pub fn add_card(&self) -> String {
        let card = FlashcardDraft::new_temp();
        let id = card.id.clone();
        self.send(EditorCommand::AddCard { card });
        id
    }

    pub fn remove_card(&self, card_id: &str) {
        self.send(EditorCommand::RemoveCard {
            card_id: card_id.to_string(),
        });
    }

    /// A term/definition input gained focus; hints peers off the card.
    pub fn focus(&self, card_id: &str) {
        self.send(EditorCommand::Focus {
            card_id: card_id.to_string(),
        });
    }

    pub fn blur(&self, card_id: &str) {
        self.send(EditorCommand::Blur {
            card_id: card_id.to_string(),
        });
    }

    pub fn report_progress(&self, value: u32) {
        self.send(EditorCommand::Progress { value });
    }

    /// Persist now instead of waiting out the debounce. This is also the
    /// recovery path after a failed save: the session sits dirty with no
    /// timer armed until the next mutation or an explicit save. No-op
    /// when there is nothing unsaved.
    pub fn save(&self) {
        self.send(EditorCommand::Save);
    }

    pub fn cards(&self) -> Vec<FlashcardDraft> {
        self.cards.borrow().clone()
    }

    /// Card ids held by remote editors; inputs for these are disabled.
    pub fn locked_cards(&self) -> HashSet<String> {
        self.locks.borrow().clone()
    }

    pub fn save_state(&self) -> SaveState {
        *self.state.borrow()
    }

    pub async fn next_notice(&mut self) -> Option<SessionNotice> {
        self.notices.recv().await
    }

    fn send(&self, cmd: EditorCommand) {
        if self.commands.send(cmd).is_err() {
            warn!("Editor session gone, dropping command");
        }
    }
}

/// Per-open-editor actor: owns the optimistic card list, merges inbound
/// broadcast events, and drives debounced persistence.
pub struct EditorSession {
    set_id: String,
    user_id: String,
    cards: Vec<FlashcardDraft>,
    locks: LockTracker,
    state: SaveState,
    dirty_during_save: bool,
    debounce: Duration,
    store: Arc<dyn CardStore>,
    outbound: mpsc::UnboundedSender<ClientEvent>,
    cards_tx: watch::Sender<Vec<FlashcardDraft>>,
    locks_tx: watch::Sender<HashSet<String>>,
    state_tx: watch::Sender<SaveState>,
    notices: mpsc::UnboundedSender<SessionNotice>,
}

impl EditorSession {
    /// Start a session actor for one open editor view.
    ///
    /// `outbound` goes to the client transport; `remote` carries the
    /// broadcast events the transport receives for us.
    pub fn spawn(
        set_id: impl Into<String>,
        user_id: impl Into<String>,
        initial: Vec<FlashcardDraft>,
        store: Arc<dyn CardStore>,
        outbound: mpsc::UnboundedSender<ClientEvent>,
        remote: mpsc::UnboundedReceiver<ServerEvent>,
    ) -> EditorHandle {
        Self::spawn_with_debounce(set_id, user_id, initial, store, outbound, remote, DEFAULT_DEBOUNCE)
    }

    pub fn spawn_with_debounce(
        set_id: impl Into<String>,
        user_id: impl Into<String>,
        initial: Vec<FlashcardDraft>,
        store: Arc<dyn CardStore>,
        outbound: mpsc::UnboundedSender<ClientEvent>,
        remote: mpsc::UnboundedReceiver<ServerEvent>,
        debounce: Duration,
    ) -> EditorHandle {
        let (cmd_tx, cmd_rx) = mpsc::unbounded_channel();
        let (notice_tx, notice_rx) = mpsc::unbounded_channel();
        let (cards_tx, cards_rx) = watch::channel(initial.clone());
        let (locks_tx, locks_rx) = watch::channel(HashSet::new());
        let (state_tx, state_rx) = watch::channel(SaveState::Idle);

        let session = EditorSession {
            set_id: set_id.into(),
            user_id: user_id.into(),
            cards: initial,
            locks: LockTracker::new(),
            state: SaveState::Idle,
            dirty_during_save: false,
            debounce,
            store,
            outbound,
            cards_tx,
            locks_tx,
            state_tx,
            notices: notice_tx,
        };
        tokio::spawn(session.run(cmd_rx, remote));

        EditorHandle {
            commands: cmd_tx,
            cards: cards_rx,
            locks: locks_rx,
            state: state_rx,
            notices: notice_rx,
        }
    }

    async fn run(
        mut self,
        mut commands: mpsc::UnboundedReceiver<EditorCommand>,
        mut remote: mpsc::UnboundedReceiver<ServerEvent>,
    ) {
        let (save_tx, mut save_done) = mpsc::channel::<SaveOutcome>(1);
        let mut deadline: Option<Instant> = None;

        loop {
            let debounce = tokio::time::sleep_until(deadline.unwrap_or_else(Instant::now));
            tokio::select! {
                cmd = commands.recv() => match cmd {
                    Some(EditorCommand::Save) => {
                        if self.state == SaveState::Dirty {
                            deadline = None;
                            self.begin_save(save_tx.clone());
                        }
                    }
                    Some(cmd) => {
                        if self.apply_command(cmd) {
                            if self.state == SaveState::Saving {
                                self.dirty_during_save = true;
                            } else {
                                self.set_state(SaveState::Dirty);
                            }
                            // Debounce restarts on every dirty-causing
                            // mutation
                            deadline = Some(Instant::now() + self.debounce);
                        }
                    }
                    // Handle dropped (view unmounted). Exiting here is the
                    // liveness guard: any in-flight save completes in its
                    // own task and its outcome is simply never applied.
                    None => break,
                },
                Some(event) = remote.recv() => self.apply_remote(event),
                _ = debounce, if deadline.is_some() && self.state == SaveState::Dirty => {
                    deadline = None;
                    self.begin_save(save_tx.clone());
                }
                Some(outcome) = save_done.recv() => self.finish_save(outcome),
            }
        }
    }

    /// Apply one local mutation; returns whether it dirties the session.
    fn apply_command(&mut self, cmd: EditorCommand) -> bool {
        match cmd {
            EditorCommand::EditTerm { card_id, value } => {
                self.edit(&card_id, |card| card.term = Some(value))
            }
            EditorCommand::EditDefinition { card_id, value } => {
                self.edit(&card_id, |card| card.definition = Some(value))
            }
            EditorCommand::AddCard { card } => {
                self.cards.push(card);
                self.publish_cards();
                true
            }
            EditorCommand::RemoveCard { card_id } => {
                let before = self.cards.len();
                self.cards.retain(|card| card.id != card_id);
                if self.cards.len() == before {
                    return false;
                }
                // Not debounced: peers drop the card right away instead
                // of waiting on the save cycle
                self.emit(ClientEvent::FlashcardDelete {
                    user_id: self.user_id.clone(),
                    flashcard_id: card_id,
                });
                self.publish_cards();
                true
            }
            EditorCommand::Focus { card_id } => {
                // Fire-and-forget advisory lock; never added to our own
                // lock set
                self.emit(ClientEvent::FlashcardLock {
                    user_id: self.user_id.clone(),
                    flashcard_id: card_id,
                });
                false
            }
            EditorCommand::Blur { card_id } => {
                self.emit(ClientEvent::FlashcardUnlock {
                    user_id: self.user_id.clone(),
                    flashcard_id: card_id,
                });
                false
            }
            EditorCommand::Progress { value } => {
                self.emit(ClientEvent::TestProgress {
                    user_id: self.user_id.clone(),
                    progress: value,
                });
                false
            }
            // Intercepted by the run loop before dispatch
            EditorCommand::Save => false,
        }
    }

    fn edit(&mut self, card_id: &str, apply: impl FnOnce(&mut FlashcardDraft)) -> bool {
        match self.cards.iter_mut().find(|card| card.id == card_id) {
            Some(card) => {
                apply(card);
                self.publish_cards();
                true
            }
            None => {
                warn!("Edit for unknown card {}", card_id);
                false
            }
        }
    }

    /// Remote changes land immediately, even while a save is in flight;
    /// whichever state is applied later wins.
    fn apply_remote(&mut self, event: ServerEvent) {
        match event {
            ServerEvent::FlashcardCreated { flashcard, .. }
            | ServerEvent::FlashcardUpdated { flashcard, .. } => self.upsert(flashcard),
            ServerEvent::FlashcardDeleted { flashcard_id, .. } => {
                self.cards.retain(|card| card.id != flashcard_id);
                self.publish_cards();
            }
            ServerEvent::FlashcardLocked { flashcard_id, .. } => {
                self.locks.lock(&flashcard_id);
                self.publish_locks();
            }
            ServerEvent::FlashcardUnlocked { flashcard_id, .. } => {
                self.locks.unlock(&flashcard_id);
                self.publish_locks();
            }
            // Quiz views watch progress through their own subscription
            ServerEvent::TestProgressUpdated { .. } => {}
        }
    }

    fn upsert(&mut self, card: FlashcardDraft) {
        match self.cards.iter_mut().find(|c| c.id == card.id) {
            Some(existing) => *existing = card,
            None => self.cards.push(card),
        }
        self.publish_cards();
    }

    fn begin_save(&mut self, done: mpsc::Sender<SaveOutcome>) {
        self.set_state(SaveState::Saving);
        self.dirty_during_save = false;

        let basis = self.cards.clone();
        let store = self.store.clone();
        let set_id = self.set_id.clone();
        info!("Saving {} cards for set {}", basis.len(), set_id);

        tokio::spawn(async move {
            let result = store.replace_cards(&set_id, basis.clone()).await;
            let _ = done.send(SaveOutcome { basis, result }).await;
        });
    }

    fn finish_save(&mut self, outcome: SaveOutcome) {
        match outcome.result {
            Ok(authoritative) => {
                self.reconcile(&outcome.basis, authoritative);
                let _ = self.notices.send(SessionNotice::Saved);
                if self.dirty_during_save {
                    // Edits arrived mid-save; their debounce deadline is
                    // still armed
                    self.set_state(SaveState::Dirty);
                } else {
                    self.set_state(SaveState::Idle);
                }
            }
            Err(e) => {
                // Edits are retained so the user can retry; peers are not
                // told about a change that did not commit
                error!("Failed to save flashcards for set {}: {}", self.set_id, e);
                let _ = self.notices.send(SessionNotice::SaveFailed(e.to_string()));
                self.set_state(SaveState::Dirty);
            }
        }
    }

    /// Replace provisional state with the authoritative post-save list
    /// and tell peers what actually committed: records absent from the
    /// save basis broadcast as created, records with changed content as
    /// updated. Last-writer-wins; a richer merge strategy would replace
    /// this function alone.
    fn reconcile(&mut self, basis: &[FlashcardDraft], authoritative: Vec<FlashcardDraft>) {
        for card in &authoritative {
            match basis.iter().find(|b| b.id == card.id) {
                None => self.emit(ClientEvent::FlashcardCreate {
                    user_id: self.user_id.clone(),
                    flashcard: card.clone(),
                }),
                Some(before)
                    if before.term != card.term || before.definition != card.definition =>
                {
                    self.emit(ClientEvent::FlashcardUpdate {
                        user_id: self.user_id.clone(),
                        flashcard: card.clone(),
                    })
                }
                Some(_) => {}
            }
        }
        self.cards = authoritative;
        self.publish_cards();
    }

    fn emit(&self, event: ClientEvent) {
        if self.outbound.send(event).is_err() {
            warn!("Transport gone, dropping event");
        }
    }

    fn set_state(&mut self, state: SaveState) {
        self.state = state;
        let _ = self.state_tx.send(state);
    }

    fn publish_cards(&self) {
        let _ = self.cards_tx.send(self.cards.clone());
    }

    fn publish_locks(&self) {
        let _ = self.locks_tx.send(self.locks.snapshot());
    }
}
