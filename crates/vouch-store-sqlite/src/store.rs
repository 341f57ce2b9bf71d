//! [`SqliteStore`], the SQLite implementation of [`SessionStore`].

use std::path::Path;

use chrono::Utc;
use rusqlite::OptionalExtension as _;
use tokio_rusqlite::Connection;
use uuid::Uuid;
use vouch_core::{
  session::{NewSession, SessionRecord, VerificationSession},
  status::{plan_transition, SessionStatus, Transition},
  store::{ConfirmOutcome, SessionStore, SessionUpdate, UpdateOutcome},
  subject::{Subject, SubjectRefinements},
};

use crate::{
  encode::{encode_date, encode_dt, encode_uuid, RawSession},
  error::{Error, Result},
  schema::SCHEMA,
};

/// A session row joined with its subject, in stored column order. Query
/// sites append their own `WHERE` clause; `RawSession::from_row` reads the
/// columns back positionally.
const SELECT_RECORD: &str = "
  SELECT s.session_id, s.external_id, s.status, s.created_at, s.updated_at,
         u.subject_id, u.first_name, u.last_name, u.document_id,
         u.document_type, u.nationality, u.date_of_birth
  FROM sessions s
  JOIN subjects u ON u.subject_id = s.subject_id";

/// A [`SessionStore`] backed by a SQLite database.
///
/// Cloning is cheap; clones share the same connection. All calls funnel
/// through the connection's single worker thread, and every
/// read-modify-write runs inside one transaction there, so concurrent
/// updates to the same session serialize instead of racing.
#[derive(Clone)]
pub struct SqliteStore {
  conn: Connection,
}

impl SqliteStore {
  /// Open (and create, if needed) a database at the given path.
  pub async fn open(path: impl AsRef<Path>) -> Result<Self> {
    let conn = Connection::open(path.as_ref().to_owned()).await?;
    let store = Self { conn };
    store.init_schema().await?;
    Ok(store)
  }

  /// Open a fresh in-memory database.
  pub async fn open_in_memory() -> Result<Self> {
    let conn = Connection::open_in_memory().await?;
    let store = Self { conn };
    store.init_schema().await?;
    Ok(store)
  }

  async fn init_schema(&self) -> Result<()> {
    self
      .conn
      .call(|conn| {
        conn.execute_batch(SCHEMA)?;
        Ok(())
      })
      .await?;
    Ok(())
  }
}

impl SessionStore for SqliteStore {
  type Error = Error;

  // ── Creation lifecycle ────────────────────────────────────────────────

  async fn create_session(&self, input: NewSession) -> Result<SessionRecord> {
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

    let session_id = encode_uuid(record.session.session_id);
    let subject_id = encode_uuid(record.subject.subject_id);
    let status     = record.session.status.as_str();
    let created_at = encode_dt(record.session.created_at);
    let updated_at = encode_dt(record.session.updated_at);
    let subject    = record.subject.clone();

    self
      .conn
      .call(move |conn| {
        let tx = conn.transaction()?;
        tx.execute(
          "INSERT INTO subjects (subject_id, first_name, last_name,
             document_id, document_type, nationality, date_of_birth)
           VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
          rusqlite::params![
            subject_id,
            subject.first_name,
            subject.last_name,
            subject.document_id,
            subject.document_type,
            subject.nationality,
            subject.date_of_birth.map(encode_date),
          ],
        )?;
        tx.execute(
          "INSERT INTO sessions (session_id, external_id, subject_id, status,
             created_at, updated_at)
           VALUES (?1, NULL, ?2, ?3, ?4, ?5)",
          rusqlite::params![session_id, subject_id, status, created_at, updated_at],
        )?;
        tx.commit()?;
        Ok(())
      })
      .await?;

    Ok(record)
  }

  async fn confirm_session(
    &self,
    session_id: Uuid,
    external_id: &str,
  ) -> Result<ConfirmOutcome> {
    let id_text    = encode_uuid(session_id);
    let ext        = external_id.to_owned();
    let updated_at = encode_dt(Utc::now());

    let result = self
      .conn
      .call(move |conn| {
        let tx = conn.transaction()?;
        let current: Option<Option<String>> = tx
          .query_row(
            "SELECT external_id FROM sessions WHERE session_id = ?1",
            rusqlite::params![id_text],
            |row| row.get(0),
          )
          .optional()?;
        let Some(current) = current else {
          return Err(other_err(Error::SessionNotFound(session_id)));
        };
        if let Some(existing) = current {
          // Immutable once set; a repeat of the same value is fine.
          return Ok(if existing == ext {
            ConfirmOutcome::Confirmed
          } else {
            ConfirmOutcome::AlreadyConfirmed
          });
        }
        let taken = tx
          .query_row(
            "SELECT 1 FROM sessions WHERE external_id = ?1",
            rusqlite::params![ext],
            |_| Ok(()),
          )
          .optional()?
          .is_some();
        if taken {
          return Ok(ConfirmOutcome::ExternalIdTaken);
        }
        tx.execute(
          "UPDATE sessions SET external_id = ?1, updated_at = ?2
           WHERE session_id = ?3",
          rusqlite::params![ext, updated_at, id_text],
        )?;
        tx.commit()?;
        Ok(ConfirmOutcome::Confirmed)
      })
      .await;

    match result {
      Ok(outcome) => Ok(outcome),
      // The UNIQUE constraint backs the in-transaction check.
      Err(e) if is_unique_violation(&e) => Ok(ConfirmOutcome::ExternalIdTaken),
      Err(e) => Err(from_call(e)),
    }
  }

  async fn delete_session(&self, session_id: Uuid) -> Result<bool> {
    let id_text = encode_uuid(session_id);
    let existed = self
      .conn
      .call(move |conn| {
        let tx = conn.transaction()?;
        let subject_id: Option<String> = tx
          .query_row(
            "SELECT subject_id FROM sessions WHERE session_id = ?1",
            rusqlite::params![id_text],
            |row| row.get(0),
          )
          .optional()?;
        let Some(subject_id) = subject_id else {
          return Ok(false);
        };
        tx.execute(
          "DELETE FROM sessions WHERE session_id = ?1",
          rusqlite::params![id_text],
        )?;
        tx.execute(
          "DELETE FROM subjects WHERE subject_id = ?1",
          rusqlite::params![subject_id],
        )?;
        tx.commit()?;
        Ok(true)
      })
      .await?;
    Ok(existed)
  }

  // ── Provider-driven mutation ──────────────────────────────────────────

  async fn apply_update(
    &self,
    external_id: &str,
    update: SessionUpdate,
  ) -> Result<Option<UpdateOutcome>> {
    let ext = external_id.to_owned();
    let now = Utc::now();
    let SessionUpdate {
      status,
      refinements,
    } = update;

    let outcome = self
      .conn
      .call(move |conn| {
        let tx = conn.transaction()?;
        let raw = tx
          .query_row(
            &format!("{SELECT_RECORD} WHERE s.external_id = ?1"),
            rusqlite::params![ext],
            RawSession::from_row,
          )
          .optional()?;
        let Some(raw) = raw else {
          return Ok(None);
        };
        let mut record = raw.into_record().map_err(other_err)?;

        let previous = record.session.status;
        let outcome = match plan_transition(previous, status) {
          Transition::Ignore => UpdateOutcome::Ignored { record },
          Transition::NoOp => {
            // Same status, but a redelivery can still carry fresher fields.
            if record.subject.refine(&refinements) {
              record.session.updated_at = now;
              update_subject_row(&tx, &record.subject)?;
              update_session_row(&tx, &record.session)?;
            }
            UpdateOutcome::NoOp { record }
          }
          transition @ (Transition::Enter | Transition::Correct) => {
            record.session.status = status;
            record.session.updated_at = now;
            record.subject.refine(&refinements);
            update_subject_row(&tx, &record.subject)?;
            update_session_row(&tx, &record.session)?;
            if transition == Transition::Enter {
              UpdateOutcome::Applied { previous, record }
            } else {
              UpdateOutcome::Corrected { previous, record }
            }
          }
        };
        tx.commit()?;
        Ok(Some(outcome))
      })
      .await
      .map_err(from_call)?;

    Ok(outcome)
  }

  async fn refine_subject(
    &self,
    external_id: &str,
    refinements: SubjectRefinements,
  ) -> Result<bool> {
    let ext = external_id.to_owned();
    let now = Utc::now();
    let found = self
      .conn
      .call(move |conn| {
        let tx = conn.transaction()?;
        let raw = tx
          .query_row(
            &format!("{SELECT_RECORD} WHERE s.external_id = ?1"),
            rusqlite::params![ext],
            RawSession::from_row,
          )
          .optional()?;
        let Some(raw) = raw else {
          return Ok(false);
        };
        let mut record = raw.into_record().map_err(other_err)?;
        if record.subject.refine(&refinements) {
          record.session.updated_at = now;
          update_subject_row(&tx, &record.subject)?;
          update_session_row(&tx, &record.session)?;
        }
        tx.commit()?;
        Ok(true)
      })
      .await
      .map_err(from_call)?;
    Ok(found)
  }

  // ── Reads ─────────────────────────────────────────────────────────────

  async fn get_by_external_id(
    &self,
    external_id: &str,
  ) -> Result<Option<SessionRecord>> {
    let ext = external_id.to_owned();
    let raw = self
      .conn
      .call(move |conn| {
        Ok(
          conn
            .query_row(
              &format!("{SELECT_RECORD} WHERE s.external_id = ?1"),
              rusqlite::params![ext],
              RawSession::from_row,
            )
            .optional()?,
        )
      })
      .await?;
    raw.map(RawSession::into_record).transpose()
  }

  async fn get_by_document_id(
    &self,
    document_id: &str,
  ) -> Result<Option<SessionRecord>> {
    let document = document_id.to_owned();
    let raw = self
      .conn
      .call(move |conn| {
        Ok(
          conn
            .query_row(
              &format!(
                "{SELECT_RECORD} WHERE u.document_id = ?1
                 ORDER BY s.created_at DESC LIMIT 1"
              ),
              rusqlite::params![document],
              RawSession::from_row,
            )
            .optional()?,
        )
      })
      .await?;
    raw.map(RawSession::into_record).transpose()
  }
}

// ─── Row writers ─────────────────────────────────────────────────────────────

fn update_subject_row(
  conn: &rusqlite::Connection,
  subject: &Subject,
) -> rusqlite::Result<()> {
  conn.execute(
    "UPDATE subjects SET last_name = ?1, document_id = ?2, document_type = ?3,
       nationality = ?4, date_of_birth = ?5
     WHERE subject_id = ?6",
    rusqlite::params![
      subject.last_name,
      subject.document_id,
      subject.document_type,
      subject.nationality,
      subject.date_of_birth.map(encode_date),
      encode_uuid(subject.subject_id),
    ],
  )?;
  Ok(())
}

fn update_session_row(
  conn: &rusqlite::Connection,
  session: &VerificationSession,
) -> rusqlite::Result<()> {
  conn.execute(
    "UPDATE sessions SET status = ?1, updated_at = ?2 WHERE session_id = ?3",
    rusqlite::params![
      session.status.as_str(),
      encode_dt(session.updated_at),
      encode_uuid(session.session_id),
    ],
  )?;
  Ok(())
}

// ─── Error plumbing ──────────────────────────────────────────────────────────

/// Carry a store error out of a connection closure.
fn other_err(e: Error) -> tokio_rusqlite::Error {
  tokio_rusqlite::Error::Other(Box::new(e))
}

/// Recover errors smuggled through [`other_err`]; everything else really is
/// a database error.
fn from_call(e: tokio_rusqlite::Error) -> Error {
  match e {
    tokio_rusqlite::Error::Other(inner) => match inner.downcast::<Error>() {
      Ok(err) => *err,
      Err(inner) => Error::Database(tokio_rusqlite::Error::Other(inner)),
    },
    e => Error::Database(e),
  }
}

fn is_unique_violation(e: &tokio_rusqlite::Error) -> bool {
  matches!(
    e,
    tokio_rusqlite::Error::Rusqlite(rusqlite::Error::SqliteFailure(err, _))
      if err.code == rusqlite::ErrorCode::ConstraintViolation
  )
}
