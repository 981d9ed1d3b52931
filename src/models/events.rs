use serde::{Deserialize, Serialize};

use super::flashcard::FlashcardDraft;

/// Frames a client sends to the relay.
///
/// Every outbound kind maps to a past-tense inbound kind in
/// [`ServerEvent`]; `user:join` only updates the connection registry and
/// is never rebroadcast.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(tag = "type")]
pub enum ClientEvent {
    #[serde(rename = "user:join", rename_all = "camelCase")]
    Join { user_id: String },
    #[serde(rename = "flashcard:create", rename_all = "camelCase")]
    FlashcardCreate {
        user_id: String,
        flashcard: FlashcardDraft,
    },
    #[serde(rename = "flashcard:update", rename_all = "camelCase")]
    FlashcardUpdate {
        user_id: String,
        flashcard: FlashcardDraft,
    },
    #[serde(rename = "flashcard:delete", rename_all = "camelCase")]
    FlashcardDelete {
        user_id: String,
        flashcard_id: String,
    },
    #[serde(rename = "flashcard:lock", rename_all = "camelCase")]
    FlashcardLock {
        user_id: String,
        flashcard_id: String,
    },
    #[serde(rename = "flashcard:unlock", rename_all = "camelCase")]
    FlashcardUnlock {
        user_id: String,
        flashcard_id: String,
    },
    #[serde(rename = "test:progress", rename_all = "camelCase")]
    TestProgress { user_id: String, progress: u32 },
}

/// Frames the relay fans out to every connected client except the sender.
///
/// These are transient: never persisted, never replayed to late joiners.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(tag = "type")]
pub enum ServerEvent {
    #[serde(rename = "flashcard:created", rename_all = "camelCase")]
    FlashcardCreated {
        user_id: String,
        flashcard: FlashcardDraft,
    },
    #[serde(rename = "flashcard:updated", rename_all = "camelCase")]
    FlashcardUpdated {
        user_id: String,
        flashcard: FlashcardDraft,
    },
    #[serde(rename = "flashcard:deleted", rename_all = "camelCase")]
    FlashcardDeleted {
        user_id: String,
        flashcard_id: String,
    },
    #[serde(rename = "flashcard:locked", rename_all = "camelCase")]
    FlashcardLocked {
        user_id: String,
        flashcard_id: String,
    },
    #[serde(rename = "flashcard:unlocked", rename_all = "camelCase")]
    FlashcardUnlocked {
        user_id: String,
        flashcard_id: String,
    },
    #[serde(rename = "test:progress:updated", rename_all = "camelCase")]
    TestProgressUpdated { user_id: String, progress: u32 },
}

impl ClientEvent {
    /// The inbound event peers should see for this frame, if any.
    /// The acting user and payload are carried over unmodified.
    pub fn into_broadcast(self) -> Option<ServerEvent> {
        match self {
            ClientEvent::Join { .. } => None,
            ClientEvent::FlashcardCreate { user_id, flashcard } => {
                Some(ServerEvent::FlashcardCreated { user_id, flashcard })
            }
            ClientEvent::FlashcardUpdate { user_id, flashcard } => {
                Some(ServerEvent::FlashcardUpdated { user_id, flashcard })
            }
            ClientEvent::FlashcardDelete {
                user_id,
                flashcard_id,
            } => Some(ServerEvent::FlashcardDeleted {
                user_id,
                flashcard_id,
            }),
            ClientEvent::FlashcardLock {
                user_id,
                flashcard_id,
            } => Some(ServerEvent::FlashcardLocked {
                user_id,
                flashcard_id,
            }),
            ClientEvent::FlashcardUnlock {
                user_id,
                flashcard_id,
            } => Some(ServerEvent::FlashcardUnlocked {
                user_id,
                flashcard_id,
            }),
            ClientEvent::TestProgress { user_id, progress } => {
                Some(ServerEvent::TestProgressUpdated { user_id, progress })
            }
        }
    }
}
