use std::{collections::BTreeMap, fmt::Debug, sync::Arc};

use anyhow::{Context, Result};
use async_trait::async_trait;
use serde_json::Value as Json;
use thiserror::Error;
use tokio::sync::Mutex;

use crate::core::{
    identifiers::{RequestId, TransactionId},
    presentation::Presentation,
};

/// A write that would replace a presentation which already completed.
#[derive(Debug, Error)]
#[error("presentation {0} is already {1}")]
pub struct StoreConflict(pub TransactionId, pub &'static str);

/// Storage interface for presentations.
#[async_trait]
pub trait PresentationStore: Debug {
    async fn load_by_id(&self, id: &TransactionId) -> Result<Option<Presentation>>;

    /// Timed out presentations no longer answer to their request id.
    async fn load_by_request_id(&self, request_id: &RequestId) -> Result<Option<Presentation>>;

    /// Every presentation that is neither submitted nor timed out.
    async fn load_incomplete(&self) -> Result<Vec<Presentation>>;

    /// Inserts or replaces the presentation with the same id.
    ///
    /// Writes race between concurrent requests, so the replacement MUST be
    /// a compare-and-set against the stored state: a presentation that is
    /// already submitted or timed out is never replaced, and the write fails
    /// with [StoreConflict].
    async fn store(&self, presentation: &Presentation) -> Result<()>;
}

/// A local in-memory store. Not for production use!
///
/// Presentations are kept in their wire form, so everything stored goes
/// through the same encoding a persistent store would use.
///
/// # Warning
/// This in-memory store should only be used for test purposes, it will not work for a distributed
/// deployment.
#[derive(Debug, Clone, Default)]
pub struct MemoryStore {
    store: Arc<Mutex<BTreeMap<TransactionId, Json>>>,
}

fn decode(id: &TransactionId, value: &Json) -> Result<Presentation> {
    Presentation::from_json(value).with_context(|| format!("stored presentation {id} is corrupt"))
}

#[async_trait]
impl PresentationStore for MemoryStore {
    async fn load_by_id(&self, id: &TransactionId) -> Result<Option<Presentation>> {
        self.store
            .lock()
            .await
            .get(id)
            .map(|value| decode(id, value))
            .transpose()
    }

    async fn load_by_request_id(&self, request_id: &RequestId) -> Result<Option<Presentation>> {
        for (id, value) in self.store.lock().await.iter() {
            let presentation = decode(id, value)?;
            if presentation.request_id() == Some(request_id) {
                return Ok(Some(presentation));
            }
        }
        Ok(None)
    }

    async fn load_incomplete(&self) -> Result<Vec<Presentation>> {
        let mut incomplete = Vec::new();
        for (id, value) in self.store.lock().await.iter() {
            let presentation = decode(id, value)?;
            if !presentation.is_terminal() {
                incomplete.push(presentation);
            }
        }
        Ok(incomplete)
    }

    async fn store(&self, presentation: &Presentation) -> Result<()> {
        let value = presentation
            .to_json()
            .context("presentation could not be encoded")?;
        let id = presentation.id();
        let mut store = self.store.lock().await;
        if let Some(stored) = store.get(id) {
            let stored = decode(id, stored)?;
            if stored.is_terminal() {
                return Err(StoreConflict(id.clone(), stored.kind()).into());
            }
        }
        store.insert(id.clone(), value);
        Ok(())
    }
}
