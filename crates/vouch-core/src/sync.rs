//! The synchronization engine.
//!
//! All multi-step flows live here: session creation with its compensating
//! delete, webhook ingestion, and the proxied provider calls. The engine
//! owns the ordering rules; the store owns atomicity of individual steps.
//!
//! No local lock is ever held across a provider call. Creation writes a
//! provisional row, talks to the provider, then confirms or rolls back.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::{
  Error, Result,
  provider::{CreateRemoteSession, Decision, KycFields, ProviderClient, RemoteSession},
  session::NewSession,
  signature::SignatureVerifier,
  status::SessionStatus,
  store::{ConfirmOutcome, SessionStore, SessionUpdate, UpdateOutcome},
  webhook::WebhookEvent,
};

/// Feature flags requested from the provider when the caller names none.
pub const DEFAULT_FEATURES: &str = "OCR";

// ─── Request / response shapes ───────────────────────────────────────────────

/// Body of `POST /sessions`.
///
/// Every field is optional at the serde level; required fields are checked by
/// the engine so a missing one yields a validation error rather than a
/// deserialization rejection.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CreateSessionRequest {
  pub first_name:    Option<String>,
  pub last_name:     Option<String>,
  pub document_id:   Option<String>,
  pub document_type: Option<String>,
  /// Provider feature flags; defaults to [`DEFAULT_FEATURES`].
  pub features:      Option<String>,
  /// Correlation tag passed to the provider; defaults to the document id.
  pub vendor_data:   Option<String>,
}

/// Response body for a created session.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreatedSession {
  /// The provider's external identifier; all later lookups use this.
  pub session_id:       String,
  /// Hosted flow URL for the end user.
  pub verification_url: String,
  pub expires_at:       Option<DateTime<Utc>>,
}

/// Response body for a processed webhook delivery.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WebhookOutcome {
  pub message:    String,
  /// The stored status after this delivery, which for stale deliveries is
  /// not the status the webhook carried.
  pub status:     SessionStatus,
  pub session_id: String,
}

// ─── Engine ──────────────────────────────────────────────────────────────────

/// Orchestrates the local store, the provider client, and signature checks.
pub struct SyncEngine<S, P> {
  store:        Arc<S>,
  provider:     Arc<P>,
  verifier:     SignatureVerifier,
  callback_url: String,
}

impl<S, P> SyncEngine<S, P>
where
  S: SessionStore,
  P: ProviderClient,
{
  pub fn new(
    store: Arc<S>,
    provider: Arc<P>,
    verifier: SignatureVerifier,
    callback_url: impl Into<String>,
  ) -> Self {
    Self {
      store,
      provider,
      verifier,
      callback_url: callback_url.into(),
    }
  }

  // ── Creation ──────────────────────────────────────────────────────────

  /// Open a verification session: validate input, write a provisional local
  /// anchor, register the session with the provider, then attach the
  /// provider's identifier.
  ///
  /// If anything after the provisional insert fails, the anchor is deleted
  /// again so no session ever lingers without a provider counterpart.
  pub async fn create_session(
    &self,
    request: CreateSessionRequest,
  ) -> Result<CreatedSession> {
    let first_name = required(request.first_name.as_deref(), "first_name")?;
    let last_name = required(request.last_name.as_deref(), "last_name")?;
    let document_id = required(request.document_id.as_deref(), "document_id")?;

    let record = self
      .store
      .create_session(NewSession {
        first_name:    first_name.to_owned(),
        last_name:     last_name.to_owned(),
        document_id:   document_id.to_owned(),
        document_type: request.document_type.clone(),
      })
      .await
      .map_err(|e| Error::Store(Box::new(e)))?;
    let session_id = record.session.session_id;

    let remote_request = CreateRemoteSession {
      features:     non_blank_or(request.features, DEFAULT_FEATURES),
      callback_url: self.callback_url.clone(),
      vendor_data:  non_blank_or(request.vendor_data, document_id),
    };

    // No local lock is held here; the provisional row is already committed.
    let remote = match self.provider.create_session(&remote_request).await {
      Ok(remote) => remote,
      Err(e) => {
        tracing::warn!(%session_id, error = %e, "provider rejected session creation");
        self.roll_back(session_id).await;
        return Err(Error::Provider(Box::new(e)));
      }
    };

    match self.store.confirm_session(session_id, &remote.session_id).await {
      Ok(ConfirmOutcome::Confirmed) => {}
      Ok(ConfirmOutcome::ExternalIdTaken) => {
        tracing::error!(
          external_id = %remote.session_id,
          "provider issued an external identifier that is already in use"
        );
        self.roll_back(session_id).await;
        return Err(Error::Conflict(format!(
          "external identifier {:?} is already in use",
          remote.session_id
        )));
      }
      Ok(ConfirmOutcome::AlreadyConfirmed) => {
        tracing::error!(%session_id, "provisional session was confirmed concurrently");
        return Err(Error::Conflict(
          "session already carries a different external identifier".into(),
        ));
      }
      Err(e) => {
        self.roll_back(session_id).await;
        return Err(Error::Store(Box::new(e)));
      }
    }

    tracing::info!(
      %session_id,
      external_id = %remote.session_id,
      "verification session created"
    );

    Ok(CreatedSession {
      session_id:       remote.session_id,
      verification_url: remote.verification_url,
      expires_at:       remote.expires_at,
    })
  }

  /// Remove the provisional anchor after a failed creation. A rollback
  /// failure is logged, not returned; the caller already has an error.
  async fn roll_back(&self, session_id: Uuid) {
    if let Err(e) = self.store.delete_session(session_id).await {
      tracing::error!(%session_id, error = %e, "failed to remove provisional session");
    }
  }

  // ── Webhook ingestion ─────────────────────────────────────────────────

  /// Process one webhook delivery: verify the signature over the exact raw
  /// bytes, parse the payload, map the status, and apply it atomically.
  ///
  /// Webhooks only ever update existing confirmed sessions; an unknown or
  /// provisional identifier is a not-found error, never an insert.
  pub async fn ingest_webhook(
    &self,
    body: &[u8],
    signature: Option<&str>,
  ) -> Result<WebhookOutcome> {
    self.verifier.verify(body, signature)?;
    let event = WebhookEvent::parse(body)?;
    let status = SessionStatus::from_provider_label(&event.status);

    let update = SessionUpdate {
      status,
      refinements: event.refinements(),
    };
    let outcome = self
      .store
      .apply_update(&event.session_id, update)
      .await
      .map_err(|e| Error::Store(Box::new(e)))?
      .ok_or_else(|| {
        Error::NotFound(format!(
          "no session with external identifier {:?}",
          event.session_id
        ))
      })?;

    match &outcome {
      UpdateOutcome::Applied { previous, record } => {
        tracing::info!(
          external_id = %event.session_id,
          from = %previous,
          to = %record.session.status,
          "session status updated"
        );
      }
      UpdateOutcome::Corrected { previous, record } => {
        tracing::warn!(
          external_id = %event.session_id,
          from = %previous,
          to = %record.session.status,
          "conflicting terminal status accepted as a provider correction"
        );
      }
      UpdateOutcome::NoOp { .. } => {
        tracing::debug!(
          external_id = %event.session_id,
          status = %status,
          "duplicate status delivery"
        );
      }
      UpdateOutcome::Ignored { record } => {
        tracing::debug!(
          external_id = %event.session_id,
          current = %record.session.status,
          incoming = %status,
          "stale status update ignored"
        );
      }
    }

    // An approval webhook carries no document details; those live in the
    // decision report. The status write has already committed, so a failed
    // fetch costs only the enrichment.
    let fresh_approval = matches!(
      &outcome,
      UpdateOutcome::Applied { record, .. } | UpdateOutcome::Corrected { record, .. }
        if record.session.status == SessionStatus::Approved
    );
    if fresh_approval {
      self.enrich_from_decision(&event.session_id).await;
    }

    Ok(WebhookOutcome {
      message:    "webhook processed".into(),
      status:     outcome.record().session.status,
      session_id: event.session_id,
    })
  }

  /// Best-effort: pull the decision report and merge any verified subject
  /// fields it carries.
  async fn enrich_from_decision(&self, external_id: &str) {
    let decision = match self.provider.retrieve_decision(external_id).await {
      Ok(decision) => decision,
      Err(e) => {
        tracing::warn!(
          external_id,
          error = %e,
          "decision retrieval failed; session keeps its webhook-derived state"
        );
        return;
      }
    };
    let refinements = decision
      .kyc
      .as_ref()
      .map(KycFields::to_refinements)
      .unwrap_or_default();
    if refinements.is_empty() {
      return;
    }
    match self.store.refine_subject(external_id, refinements).await {
      Ok(true) => {}
      Ok(false) => {
        tracing::warn!(external_id, "session vanished before decision refinements landed");
      }
      Err(e) => {
        tracing::warn!(external_id, error = %e, "failed to persist decision refinements");
      }
    }
  }

  // ── Proxied provider calls ────────────────────────────────────────────

  /// Ask the provider to change a session's status. Local state is left
  /// untouched; the provider confirms the change through its webhook.
  pub async fn override_status(
    &self,
    external_id: &str,
    new_status: Option<&str>,
    comment: Option<&str>,
  ) -> Result<RemoteSession> {
    let new_status = required(new_status, "status")?;
    let remote = self
      .provider
      .update_status(external_id, new_status, comment)
      .await
      .map_err(|e| Error::Provider(Box::new(e)))?;
    tracing::info!(external_id, new_status, "status override requested");
    Ok(remote)
  }

  /// Fetch the provider's decision report for a session.
  pub async fn fetch_decision(&self, external_id: &str) -> Result<Decision> {
    self
      .provider
      .retrieve_decision(external_id)
      .await
      .map_err(|e| Error::Provider(Box::new(e)))
  }
}

fn required<'a>(value: Option<&'a str>, field: &str) -> Result<&'a str> {
  match value {
    Some(v) if !v.trim().is_empty() => Ok(v),
    _ => Err(Error::Validation(format!("missing required field {field:?}"))),
  }
}

fn non_blank_or(value: Option<String>, fallback: impl Into<String>) -> String {
  value
    .filter(|v| !v.trim().is_empty())
    .unwrap_or_else(|| fallback.into())
}

// ─── Tests ───────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
  use std::sync::Mutex;

  use chrono::NaiveDate;
  use secrecy::SecretString;

  use super::*;
  use crate::{
    session::{SessionRecord, VerificationSession},
    status::{Transition, plan_transition},
    subject::{Subject, SubjectRefinements},
  };

  // ── In-memory store double ────────────────────────────────────────────

  #[derive(Debug, thiserror::Error)]
  #[error("memory store failure")]
  struct StoreFailure;

  #[derive(Clone, Default)]
  struct MemoryStore {
    records:      Arc<Mutex<Vec<SessionRecord>>>,
    fail_confirm: bool,
  }

  impl MemoryStore {
    fn records(&self) -> Vec<SessionRecord> {
      self.records.lock().unwrap().clone()
    }

    fn by_external(&self, external_id: &str) -> Option<SessionRecord> {
      self
        .records
        .lock()
        .unwrap()
        .iter()
        .find(|r| r.session.external_id.as_deref() == Some(external_id))
        .cloned()
    }
  }

  impl SessionStore for MemoryStore {
    type Error = StoreFailure;

    async fn create_session(
      &self,
      input: NewSession,
    ) -> Result<SessionRecord, StoreFailure> {
      let now = Utc::now();
      let record = SessionRecord {
        session: VerificationSession {
          session_id:  Uuid::new_v4(),
          external_id: None,
          status:      SessionStatus::Pending,
          created_at:  now,
          updated_at:  now,
        },
        subject: Subject {
          subject_id:    Uuid::new_v4(),
          first_name:    input.first_name,
          last_name:     input.last_name,
          document_id:   input.document_id,
          document_type: input.document_type,
          nationality:   None,
          date_of_birth: None,
        },
      };
      self.records.lock().unwrap().push(record.clone());
      Ok(record)
    }

    async fn confirm_session(
      &self,
      session_id: Uuid,
      external_id: &str,
    ) -> Result<ConfirmOutcome, StoreFailure> {
      if self.fail_confirm {
        return Err(StoreFailure);
      }
      let mut records = self.records.lock().unwrap();
      if records.iter().any(|r| {
        r.session.session_id != session_id
          && r.session.external_id.as_deref() == Some(external_id)
      }) {
        return Ok(ConfirmOutcome::ExternalIdTaken);
      }
      let record = records
        .iter_mut()
        .find(|r| r.session.session_id == session_id)
        .ok_or(StoreFailure)?;
      match &record.session.external_id {
        Some(existing) if existing == external_id => Ok(ConfirmOutcome::Confirmed),
        Some(_) => Ok(ConfirmOutcome::AlreadyConfirmed),
        None => {
          record.session.external_id = Some(external_id.to_owned());
          record.session.updated_at = Utc::now();
          Ok(ConfirmOutcome::Confirmed)
        }
      }
    }

    async fn delete_session(
      &self,
      session_id: Uuid,
    ) -> Result<bool, StoreFailure> {
      let mut records = self.records.lock().unwrap();
      let before = records.len();
      records.retain(|r| r.session.session_id != session_id);
      Ok(records.len() < before)
    }

    async fn apply_update(
      &self,
      external_id: &str,
      update: SessionUpdate,
    ) -> Result<Option<UpdateOutcome>, StoreFailure> {
      let mut records = self.records.lock().unwrap();
      let Some(record) = records
        .iter_mut()
        .find(|r| r.session.external_id.as_deref() == Some(external_id))
      else {
        return Ok(None);
      };
      let previous = record.session.status;
      let outcome = match plan_transition(previous, update.status) {
        Transition::Ignore => UpdateOutcome::Ignored {
          record: record.clone(),
        },
        Transition::NoOp => {
          if record.subject.refine(&update.refinements) {
            record.session.updated_at = Utc::now();
          }
          UpdateOutcome::NoOp {
            record: record.clone(),
          }
        }
        Transition::Enter => {
          record.session.status = update.status;
          record.subject.refine(&update.refinements);
          record.session.updated_at = Utc::now();
          UpdateOutcome::Applied {
            previous,
            record: record.clone(),
          }
        }
        Transition::Correct => {
          record.session.status = update.status;
          record.subject.refine(&update.refinements);
          record.session.updated_at = Utc::now();
          UpdateOutcome::Corrected {
            previous,
            record: record.clone(),
          }
        }
      };
      Ok(Some(outcome))
    }

    async fn refine_subject(
      &self,
      external_id: &str,
      refinements: SubjectRefinements,
    ) -> Result<bool, StoreFailure> {
      let mut records = self.records.lock().unwrap();
      let Some(record) = records
        .iter_mut()
        .find(|r| r.session.external_id.as_deref() == Some(external_id))
      else {
        return Ok(false);
      };
      if record.subject.refine(&refinements) {
        record.session.updated_at = Utc::now();
      }
      Ok(true)
    }

    async fn get_by_external_id(
      &self,
      external_id: &str,
    ) -> Result<Option<SessionRecord>, StoreFailure> {
      Ok(self.by_external(external_id))
    }

    async fn get_by_document_id(
      &self,
      document_id: &str,
    ) -> Result<Option<SessionRecord>, StoreFailure> {
      let records = self.records.lock().unwrap();
      Ok(
        records
          .iter()
          .filter(|r| r.subject.document_id == document_id)
          .max_by_key(|r| r.session.created_at)
          .cloned(),
      )
    }
  }

  // ── Scripted provider double ──────────────────────────────────────────

  #[derive(Debug, thiserror::Error)]
  #[error("provider unavailable")]
  struct ProviderDown;

  #[derive(Clone)]
  struct ScriptedProvider {
    external_id:    String,
    fail_create:    bool,
    fail_decision:  bool,
    kyc:            Option<KycFields>,
    create_calls:   Arc<Mutex<Vec<CreateRemoteSession>>>,
    decision_calls: Arc<Mutex<u32>>,
  }

  impl Default for ScriptedProvider {
    fn default() -> Self {
      Self {
        external_id:    "prov-1".into(),
        fail_create:    false,
        fail_decision:  false,
        kyc:            None,
        create_calls:   Arc::default(),
        decision_calls: Arc::default(),
      }
    }
  }

  impl ScriptedProvider {
    fn create_calls(&self) -> Vec<CreateRemoteSession> {
      self.create_calls.lock().unwrap().clone()
    }

    fn decision_calls(&self) -> u32 { *self.decision_calls.lock().unwrap() }
  }

  impl ProviderClient for ScriptedProvider {
    type Error = ProviderDown;

    async fn create_session(
      &self,
      request: &CreateRemoteSession,
    ) -> Result<RemoteSession, ProviderDown> {
      self.create_calls.lock().unwrap().push(request.clone());
      if self.fail_create {
        return Err(ProviderDown);
      }
      Ok(RemoteSession {
        session_id:       self.external_id.clone(),
        verification_url: format!("https://verify.example/{}", self.external_id),
        expires_at:       None,
        status:           Some("Not Started".into()),
      })
    }

    async fn retrieve_decision(
      &self,
      external_id: &str,
    ) -> Result<Decision, ProviderDown> {
      *self.decision_calls.lock().unwrap() += 1;
      if self.fail_decision {
        return Err(ProviderDown);
      }
      Ok(Decision {
        session_id: external_id.to_owned(),
        status:     "Approved".into(),
        kyc:        self.kyc.clone(),
      })
    }

    async fn update_status(
      &self,
      external_id: &str,
      new_status: &str,
      _comment: Option<&str>,
    ) -> Result<RemoteSession, ProviderDown> {
      Ok(RemoteSession {
        session_id:       external_id.to_owned(),
        verification_url: String::new(),
        expires_at:       None,
        status:           Some(new_status.to_owned()),
      })
    }
  }

  // ── Helpers ───────────────────────────────────────────────────────────

  fn engine(
    store: &MemoryStore,
    provider: &ScriptedProvider,
  ) -> SyncEngine<MemoryStore, ScriptedProvider> {
    SyncEngine::new(
      Arc::new(store.clone()),
      Arc::new(provider.clone()),
      SignatureVerifier::disabled(),
      "https://vouch.example/webhook",
    )
  }

  fn signing_engine(
    store: &MemoryStore,
    provider: &ScriptedProvider,
    secret: &str,
  ) -> SyncEngine<MemoryStore, ScriptedProvider> {
    SyncEngine::new(
      Arc::new(store.clone()),
      Arc::new(provider.clone()),
      SignatureVerifier::new(SecretString::from(secret)),
      "https://vouch.example/webhook",
    )
  }

  fn request() -> CreateSessionRequest {
    CreateSessionRequest {
      first_name: Some("Ana".into()),
      last_name: Some("Ruiz".into()),
      document_id: Some("X1".into()),
      ..Default::default()
    }
  }

  fn webhook_body(external_id: &str, status: &str) -> Vec<u8> {
    serde_json::to_vec(&serde_json::json!({
      "session_id": external_id,
      "status": status,
    }))
    .unwrap()
  }

  // ── Creation ──────────────────────────────────────────────────────────

  #[tokio::test]
  async fn create_session_returns_the_provider_identifiers() {
    let (store, provider) = (MemoryStore::default(), ScriptedProvider::default());
    let created = engine(&store, &provider)
      .create_session(request())
      .await
      .unwrap();

    assert_eq!(created.session_id, "prov-1");
    assert_eq!(created.verification_url, "https://verify.example/prov-1");

    let record = store.by_external("prov-1").unwrap();
    assert_eq!(record.session.status, SessionStatus::Pending);
    assert_eq!(record.subject.first_name, "Ana");
    assert_eq!(record.subject.document_id, "X1");
  }

  #[tokio::test]
  async fn create_session_fills_provider_defaults() {
    let (store, provider) = (MemoryStore::default(), ScriptedProvider::default());
    engine(&store, &provider)
      .create_session(request())
      .await
      .unwrap();

    let calls = provider.create_calls();
    assert_eq!(calls.len(), 1);
    assert_eq!(calls[0].features, DEFAULT_FEATURES);
    assert_eq!(calls[0].vendor_data, "X1");
    assert_eq!(calls[0].callback_url, "https://vouch.example/webhook");
  }

  #[tokio::test]
  async fn create_session_honours_explicit_features_and_vendor_data() {
    let (store, provider) = (MemoryStore::default(), ScriptedProvider::default());
    engine(&store, &provider)
      .create_session(CreateSessionRequest {
        features: Some("OCR,FACE".into()),
        vendor_data: Some("corr-77".into()),
        ..request()
      })
      .await
      .unwrap();

    let calls = provider.create_calls();
    assert_eq!(calls[0].features, "OCR,FACE");
    assert_eq!(calls[0].vendor_data, "corr-77");
  }

  #[tokio::test]
  async fn create_session_rejects_missing_fields() {
    let (store, provider) = (MemoryStore::default(), ScriptedProvider::default());
    let result = engine(&store, &provider)
      .create_session(CreateSessionRequest {
        first_name: Some("Ana".into()),
        ..Default::default()
      })
      .await;

    assert!(matches!(result, Err(Error::Validation(_))));
    // Validation happens before any side effect.
    assert!(store.records().is_empty());
    assert!(provider.create_calls().is_empty());
  }

  #[tokio::test]
  async fn create_session_rejects_blank_fields() {
    let (store, provider) = (MemoryStore::default(), ScriptedProvider::default());
    let result = engine(&store, &provider)
      .create_session(CreateSessionRequest {
        document_id: Some("   ".into()),
        ..request()
      })
      .await;

    assert!(matches!(result, Err(Error::Validation(_))));
    assert!(store.records().is_empty());
  }

  #[tokio::test]
  async fn provider_failure_removes_the_provisional_session() {
    let store = MemoryStore::default();
    let provider = ScriptedProvider {
      fail_create: true,
      ..Default::default()
    };
    let result = engine(&store, &provider).create_session(request()).await;

    assert!(matches!(result, Err(Error::Provider(_))));
    assert!(store.records().is_empty());
  }

  #[tokio::test]
  async fn identifier_collision_removes_the_provisional_session() {
    let store = MemoryStore::default();
    let provider = ScriptedProvider::default();
    let engine = engine(&store, &provider);

    engine.create_session(request()).await.unwrap();
    // The scripted provider hands out the same identifier again.
    let result = engine
      .create_session(CreateSessionRequest {
        document_id: Some("X2".into()),
        ..request()
      })
      .await;

    assert!(matches!(result, Err(Error::Conflict(_))));
    // The first session keeps its identifier; the second left no trace.
    let records = store.records();
    assert_eq!(records.len(), 1);
    assert_eq!(records[0].session.external_id.as_deref(), Some("prov-1"));
  }

  #[tokio::test]
  async fn store_failure_after_the_provider_call_unwinds() {
    let store = MemoryStore {
      fail_confirm: true,
      ..Default::default()
    };
    let provider = ScriptedProvider::default();
    let result = engine(&store, &provider).create_session(request()).await;

    assert!(matches!(result, Err(Error::Store(_))));
    assert!(store.records().is_empty());
  }

  // ── Webhook ingestion ─────────────────────────────────────────────────

  #[tokio::test]
  async fn webhook_applies_a_terminal_status() {
    let (store, provider) = (MemoryStore::default(), ScriptedProvider::default());
    let engine = engine(&store, &provider);
    engine.create_session(request()).await.unwrap();

    let outcome = engine
      .ingest_webhook(&webhook_body("prov-1", "COMPLETED"), None)
      .await
      .unwrap();

    assert_eq!(outcome.status, SessionStatus::Approved);
    assert_eq!(outcome.session_id, "prov-1");
    let record = store.by_external("prov-1").unwrap();
    assert_eq!(record.session.status, SessionStatus::Approved);
  }

  #[tokio::test]
  async fn webhook_redelivery_is_idempotent() {
    let (store, provider) = (MemoryStore::default(), ScriptedProvider::default());
    let engine = engine(&store, &provider);
    engine.create_session(request()).await.unwrap();

    let body = webhook_body("prov-1", "REJECTED");
    engine.ingest_webhook(&body, None).await.unwrap();
    let after_first = store.by_external("prov-1").unwrap();

    let outcome = engine.ingest_webhook(&body, None).await.unwrap();
    assert_eq!(outcome.status, SessionStatus::Rejected);

    let after_second = store.by_external("prov-1").unwrap();
    assert_eq!(after_first, after_second);
  }

  #[tokio::test]
  async fn webhook_never_regresses_a_terminal_status() {
    let (store, provider) = (MemoryStore::default(), ScriptedProvider::default());
    let engine = engine(&store, &provider);
    engine.create_session(request()).await.unwrap();
    engine
      .ingest_webhook(&webhook_body("prov-1", "COMPLETED"), None)
      .await
      .unwrap();
    let before = store.by_external("prov-1").unwrap();

    // A stale in-flight delivery, complete with refinements.
    let stale = serde_json::to_vec(&serde_json::json!({
      "session_id": "prov-1",
      "status": "Not Started",
      "decision": { "kyc": { "nationality": "FRA" } },
    }))
    .unwrap();
    let outcome = engine.ingest_webhook(&stale, None).await.unwrap();

    // The response reports the stored status, and nothing moved.
    assert_eq!(outcome.status, SessionStatus::Approved);
    let after = store.by_external("prov-1").unwrap();
    assert_eq!(after, before);
    assert!(after.subject.nationality.is_none());
  }

  #[tokio::test]
  async fn conflicting_terminal_statuses_are_corrections() {
    let (store, provider) = (MemoryStore::default(), ScriptedProvider::default());
    let engine = engine(&store, &provider);
    engine.create_session(request()).await.unwrap();
    engine
      .ingest_webhook(&webhook_body("prov-1", "COMPLETED"), None)
      .await
      .unwrap();

    let outcome = engine
      .ingest_webhook(&webhook_body("prov-1", "REJECTED"), None)
      .await
      .unwrap();

    assert_eq!(outcome.status, SessionStatus::Rejected);
    let record = store.by_external("prov-1").unwrap();
    assert_eq!(record.session.status, SessionStatus::Rejected);
  }

  #[tokio::test]
  async fn webhook_for_an_unknown_session_is_not_found() {
    let (store, provider) = (MemoryStore::default(), ScriptedProvider::default());
    let engine = engine(&store, &provider);
    engine.create_session(request()).await.unwrap();

    let result = engine
      .ingest_webhook(&webhook_body("who-dis", "COMPLETED"), None)
      .await;

    assert!(matches!(result, Err(Error::NotFound(_))));
    // Webhooks never create sessions.
    assert_eq!(store.records().len(), 1);
  }

  #[tokio::test]
  async fn webhook_never_matches_a_provisional_session() {
    let store = MemoryStore::default();
    let provider = ScriptedProvider::default();
    // Seed a provisional row directly; it has no external identifier yet.
    store
      .create_session(NewSession {
        first_name:    "Ana".into(),
        last_name:     "Ruiz".into(),
        document_id:   "X1".into(),
        document_type: None,
      })
      .await
      .unwrap();

    let result = engine(&store, &provider)
      .ingest_webhook(&webhook_body("prov-1", "COMPLETED"), None)
      .await;

    assert!(matches!(result, Err(Error::NotFound(_))));
    let records = store.records();
    assert_eq!(records.len(), 1);
    assert_eq!(records[0].session.status, SessionStatus::Pending);
  }

  #[tokio::test]
  async fn signed_webhooks_are_verified_over_the_exact_bytes() {
    let (store, provider) = (MemoryStore::default(), ScriptedProvider::default());
    let engine = signing_engine(&store, &provider, "hook-secret");
    engine.create_session(request()).await.unwrap();

    let body = webhook_body("prov-1", "COMPLETED");
    let signature = SignatureVerifier::sign("hook-secret", &body);

    // Tampered body under a valid signature: rejected, state untouched.
    let mut tampered = body.clone();
    let last = tampered.len() - 2;
    tampered[last] ^= 1;
    let result = engine.ingest_webhook(&tampered, Some(&signature)).await;
    assert!(matches!(result, Err(Error::Authentication(_))));
    assert_eq!(
      store.by_external("prov-1").unwrap().session.status,
      SessionStatus::Pending
    );

    // The genuine delivery goes through.
    let outcome = engine.ingest_webhook(&body, Some(&signature)).await.unwrap();
    assert_eq!(outcome.status, SessionStatus::Approved);
  }

  #[tokio::test]
  async fn malformed_webhook_bodies_are_rejected() {
    let (store, provider) = (MemoryStore::default(), ScriptedProvider::default());
    let result = engine(&store, &provider)
      .ingest_webhook(b"{\"status\": ", None)
      .await;
    assert!(matches!(result, Err(Error::MalformedPayload(_))));
  }

  #[tokio::test]
  async fn webhook_refinements_update_the_subject() {
    let (store, provider) = (MemoryStore::default(), ScriptedProvider::default());
    let engine = engine(&store, &provider);
    engine.create_session(request()).await.unwrap();

    let body = serde_json::to_vec(&serde_json::json!({
      "session_id": "prov-1",
      "status": "COMPLETED",
      "decision": {
        "kyc": {
          "last_name": "Ruiz-Gomez",
          "document_number": "X1-VERIFIED",
          "document_type": "passport",
          "nationality": "ESP",
          "date_of_birth": "1990-05-04",
        }
      },
    }))
    .unwrap();
    engine.ingest_webhook(&body, None).await.unwrap();

    // The document number changed, so the new value is the lookup key.
    let record = store.by_external("prov-1").unwrap();
    assert_eq!(record.subject.last_name, "Ruiz-Gomez");
    assert_eq!(record.subject.document_id, "X1-VERIFIED");
    assert_eq!(record.subject.document_type.as_deref(), Some("passport"));
    assert_eq!(record.subject.nationality.as_deref(), Some("ESP"));
    assert_eq!(
      record.subject.date_of_birth,
      NaiveDate::from_ymd_opt(1990, 5, 4)
    );
    // First name is never provider-refined.
    assert_eq!(record.subject.first_name, "Ana");
  }

  // ── Decision enrichment ───────────────────────────────────────────────

  #[tokio::test]
  async fn a_fresh_approval_fetches_the_decision_report() {
    let store = MemoryStore::default();
    let provider = ScriptedProvider {
      kyc: Some(KycFields {
        nationality: Some("ESP".into()),
        date_of_birth: NaiveDate::from_ymd_opt(1990, 5, 4),
        ..Default::default()
      }),
      ..Default::default()
    };
    let engine = engine(&store, &provider);
    engine.create_session(request()).await.unwrap();

    engine
      .ingest_webhook(&webhook_body("prov-1", "COMPLETED"), None)
      .await
      .unwrap();

    assert_eq!(provider.decision_calls(), 1);
    let record = store.by_external("prov-1").unwrap();
    assert_eq!(record.subject.nationality.as_deref(), Some("ESP"));
  }

  #[tokio::test]
  async fn redelivery_does_not_refetch_the_decision() {
    let (store, provider) = (MemoryStore::default(), ScriptedProvider::default());
    let engine = engine(&store, &provider);
    engine.create_session(request()).await.unwrap();

    let body = webhook_body("prov-1", "COMPLETED");
    engine.ingest_webhook(&body, None).await.unwrap();
    engine.ingest_webhook(&body, None).await.unwrap();

    assert_eq!(provider.decision_calls(), 1);
  }

  #[tokio::test]
  async fn rejections_skip_the_decision_fetch() {
    let (store, provider) = (MemoryStore::default(), ScriptedProvider::default());
    let engine = engine(&store, &provider);
    engine.create_session(request()).await.unwrap();

    engine
      .ingest_webhook(&webhook_body("prov-1", "REJECTED"), None)
      .await
      .unwrap();

    assert_eq!(provider.decision_calls(), 0);
  }

  #[tokio::test]
  async fn decision_fetch_failures_do_not_fail_the_webhook() {
    let store = MemoryStore::default();
    let provider = ScriptedProvider {
      fail_decision: true,
      ..Default::default()
    };
    let engine = engine(&store, &provider);
    engine.create_session(request()).await.unwrap();

    let outcome = engine
      .ingest_webhook(&webhook_body("prov-1", "COMPLETED"), None)
      .await
      .unwrap();

    assert_eq!(outcome.status, SessionStatus::Approved);
    assert_eq!(provider.decision_calls(), 1);
    assert_eq!(
      store.by_external("prov-1").unwrap().session.status,
      SessionStatus::Approved
    );
  }

  // ── Proxied calls ─────────────────────────────────────────────────────

  #[tokio::test]
  async fn override_status_proxies_without_touching_local_state() {
    let (store, provider) = (MemoryStore::default(), ScriptedProvider::default());
    let engine = engine(&store, &provider);
    engine.create_session(request()).await.unwrap();

    let remote = engine
      .override_status("prov-1", Some("Approved"), Some("manual review"))
      .await
      .unwrap();

    assert_eq!(remote.status.as_deref(), Some("Approved"));
    // Local state only moves when the provider's webhook lands.
    assert_eq!(
      store.by_external("prov-1").unwrap().session.status,
      SessionStatus::Pending
    );
  }

  #[tokio::test]
  async fn override_status_requires_a_status() {
    let (store, provider) = (MemoryStore::default(), ScriptedProvider::default());
    let result = engine(&store, &provider)
      .override_status("prov-1", None, None)
      .await;
    assert!(matches!(result, Err(Error::Validation(_))));
  }

  #[tokio::test]
  async fn fetch_decision_surfaces_provider_failures() {
    let store = MemoryStore::default();
    let provider = ScriptedProvider {
      fail_decision: true,
      ..Default::default()
    };
    let result = engine(&store, &provider).fetch_decision("prov-1").await;
    assert!(matches!(result, Err(Error::Provider(_))));
  }
}
