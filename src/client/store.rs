use std::future::Future;
use std::pin::Pin;
use std::time::Duration;

use reqwest::Client;
use tracing::info;

use crate::models::{FlashcardDraft, StoreError};

pub type StoreFuture<T> = Pin<Box<dyn Future<Output = Result<T, StoreError>> + Send>>;

/// Persistence collaborator for flashcard sets.
///
/// Both calls are all-or-nothing network calls: either the full
/// authoritative list comes back or the call failed.
pub trait CardStore: Send + Sync {
    /// Fetch the authoritative card list for a set.
    fn list_cards(&self, set_id: &str) -> StoreFuture<Vec<FlashcardDraft>>;

    /// Bulk upsert + delete-by-diff against the full submitted list.
    /// Returns the authoritative post-save list with durable identifiers.
    fn replace_cards(
        &self,
        set_id: &str,
        cards: Vec<FlashcardDraft>,
    ) -> StoreFuture<Vec<FlashcardDraft>>;
}

/// `CardStore` backed by the external flashcard CRUD API.
#[derive(Debug, Clone)]
pub struct HttpCardStore {
    client: Client,
    base_url: String,
}

impl HttpCardStore {
    pub fn new(base_url: impl Into<String>) -> Self {
        let client = Client::builder()
            .timeout(Duration::from_secs(10))
            .build()
            .expect("Failed to build reqwest client");

        Self {
            client,
            base_url: base_url.into(),
        }
    }

    fn cards_url(&self, set_id: &str) -> String {
        format!("{}/api/sets/{}/flashcards", self.base_url, set_id)
    }
}

impl CardStore for HttpCardStore {
    fn list_cards(&self, set_id: &str) -> StoreFuture<Vec<FlashcardDraft>> {
        let client = self.client.clone();
        let url = self.cards_url(set_id);
        Box::pin(async move {
            let resp = client.get(&url).send().await?;
            if !resp.status().is_success() {
                return Err(StoreError::Status(resp.status().as_u16()));
            }
            Ok(resp.json().await?)
        })
    }

    fn replace_cards(
        &self,
        set_id: &str,
        cards: Vec<FlashcardDraft>,
    ) -> StoreFuture<Vec<FlashcardDraft>> {
        let this = self.clone();
        let set_id = set_id.to_string();
        Box::pin(async move {
            let url = this.cards_url(&set_id);
            let resp = this.client.put(&url).json(&cards).send().await?;
            if !resp.status().is_success() {
                return Err(StoreError::Status(resp.status().as_u16()));
            }
            info!("Saved {} cards for set {}", cards.len(), set_id);

            // Durable identifiers only come back on a fresh read
            this.list_cards(&set_id).await
        })
    }
}
