use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;
use tracing::info;

use crate::error::{PosterError, PosterResult};
use crate::llm::{GeminiImageClient, KeyGate};
use crate::poster::{GeneratedArtifact, GenerationRequest, PosterSession, SessionDefaults};

/// Sessions are per user per chat, so two members of a group never share one.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SessionKey {
    pub chat_id: i64,
    pub user_id: u64,
}

impl SessionKey {
    pub fn new(chat_id: i64, user_id: u64) -> Self {
        Self { chat_id, user_id }
    }
}

pub struct PreparedGeneration {
    request: GenerationRequest,
    client: GeminiImageClient,
    epoch: u64,
}

/// `epoch` changes whenever the session is reset, so results of calls started
/// before the reset can be recognised and dropped.
struct SessionEntry {
    session: PosterSession,
    client: GeminiImageClient,
    epoch: u64,
}

#[derive(Clone)]
pub struct AppState {
    sessions: Arc<Mutex<HashMap<SessionKey, SessionEntry>>>,
    pub key_gate: KeyGate,
    gemini: GeminiImageClient,
    defaults: SessionDefaults,
    next_epoch: Arc<AtomicU64>,
}

impl AppState {
    pub fn new(gemini: GeminiImageClient, key_gate: KeyGate, defaults: SessionDefaults) -> Self {
        AppState {
            sessions: Arc::new(Mutex::new(HashMap::new())),
            key_gate,
            gemini,
            defaults,
            next_epoch: Arc::new(AtomicU64::new(0)),
        }
    }

    fn fresh_entry(&self, client: GeminiImageClient) -> SessionEntry {
        SessionEntry {
            session: PosterSession::new(self.defaults),
            client,
            epoch: self.next_epoch.fetch_add(1, Ordering::Relaxed),
        }
    }

    fn with_entry<R>(&self, key: SessionKey, f: impl FnOnce(&mut SessionEntry) -> R) -> R {
        let mut sessions = self.sessions.lock();
        let entry = sessions
            .entry(key)
            .or_insert_with(|| self.fresh_entry(self.gemini.fork()));
        f(entry)
    }

    /// Runs `f` on the caller's session, creating it with defaults on first use.
    pub fn with_session<R>(&self, key: SessionKey, f: impl FnOnce(&mut PosterSession) -> R) -> R {
        self.with_entry(key, |entry| f(&mut entry.session))
    }

    /// Like [`AppState::with_session`] but never creates a session.
    pub fn read_session<R>(&self, key: SessionKey, f: impl FnOnce(&PosterSession) -> R) -> Option<R> {
        self.sessions.lock().get(&key).map(|entry| f(&entry.session))
    }

    /// Discards the session and its artifact. While a call is still running the
    /// entry keeps its client, so the in-flight guard survives the reset and
    /// the late result is dropped by epoch.
    pub fn reset_session(&self, key: SessionKey) -> bool {
        let mut sessions = self.sessions.lock();
        let Some(entry) = sessions.remove(&key) else {
            return false;
        };
        if entry.client.is_busy() {
            let replacement = self.fresh_entry(entry.client);
            sessions.insert(key, replacement);
        }
        true
    }

    pub fn is_busy(&self, key: SessionKey) -> bool {
        self.sessions
            .lock()
            .get(&key)
            .map(|entry| entry.client.is_busy())
            .unwrap_or(false)
    }

    fn store_artifact(
        &self,
        key: SessionKey,
        epoch: u64,
        artifact: GeneratedArtifact,
    ) -> PosterResult<GeneratedArtifact> {
        match self.sessions.lock().get_mut(&key) {
            Some(entry) if entry.epoch == epoch => {
                entry.session.apply_artifact(artifact.clone());
                Ok(artifact)
            }
            _ => {
                info!(chat_id = key.chat_id, "Session reset while a poster call was running");
                Err(PosterError::SessionReset)
            }
        }
    }

    /// Key gate then input validation; nothing is sent yet.
    pub async fn prepare_generation(&self, key: SessionKey) -> PosterResult<PreparedGeneration> {
        self.key_gate.ensure_credential().await?;

        let (request, client, epoch) = self.with_entry(key, |entry| {
            (
                entry.session.generation_request(),
                entry.client.clone(),
                entry.epoch,
            )
        });
        Ok(PreparedGeneration {
            request: request?,
            client,
            epoch,
        })
    }

    /// Calls the image model and stores the result. On failure the session,
    /// including its previous artifact, is left untouched. A result that arrives
    /// after the session was reset is discarded with `SessionReset`.
    pub async fn run_generation(
        &self,
        key: SessionKey,
        prepared: PreparedGeneration,
    ) -> PosterResult<GeneratedArtifact> {
        let PreparedGeneration {
            request,
            client,
            epoch,
        } = prepared;
        let image_uri = client.generate(&request).await?;
        self.store_artifact(key, epoch, GeneratedArtifact::new(image_uri, request.prompt))
    }

    pub async fn generate_poster(&self, key: SessionKey) -> PosterResult<GeneratedArtifact> {
        let prepared = self.prepare_generation(key).await?;
        self.run_generation(key, prepared).await
    }

    /// Refines the displayed artifact; the edit instruction becomes its prompt.
    pub async fn edit_poster(
        &self,
        key: SessionKey,
        instruction: &str,
    ) -> PosterResult<GeneratedArtifact> {
        let instruction = instruction.trim();
        if instruction.is_empty() {
            return Err(PosterError::EmptyInput);
        }

        let (source, client, epoch) = self.with_entry(key, |entry| {
            (
                entry.session.artifact().map(|artifact| artifact.image_uri.clone()),
                entry.client.clone(),
                entry.epoch,
            )
        });
        let source = source.ok_or(PosterError::NoArtifact)?;

        let image_uri = client.edit(&source, instruction).await?;
        self.store_artifact(
            key,
            epoch,
            GeneratedArtifact::new(image_uri, instruction.to_string()),
        )
    }
}
