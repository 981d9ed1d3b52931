use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Reserved prefix marking client-generated ids for cards that have not
/// been persisted yet. The persistence layer replaces these with durable
/// identifiers on the next save.
pub const TEMP_ID_PREFIX: &str = "temp_";

/// One editable flashcard as held by an editor session.
///
/// `term` and `definition` may both be blank while a card is being typed
/// into; the save cycle persists whatever the user left behind.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct FlashcardDraft {
    pub id: String,
    pub term: Option<String>,
    pub definition: Option<String>,
}

impl FlashcardDraft {
    /// A blank card under a fresh temporary id.
    pub fn new_temp() -> Self {
        Self {
            id: format!("{}{}", TEMP_ID_PREFIX, Uuid::new_v4()),
            term: Some(String::new()),
            definition: Some(String::new()),
        }
    }

    pub fn is_temp(&self) -> bool {
        self.id.starts_with(TEMP_ID_PREFIX)
    }
}
