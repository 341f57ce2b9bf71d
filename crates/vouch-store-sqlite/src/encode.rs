//! Conversions between domain types and their stored TEXT forms.

use chrono::{DateTime, NaiveDate, Utc};
use uuid::Uuid;
use vouch_core::{
  session::{SessionRecord, VerificationSession},
  status::SessionStatus,
  subject::Subject,
};

use crate::error::{Error, Result};

pub fn encode_uuid(id: Uuid) -> String { id.hyphenated().to_string() }

pub fn decode_uuid(s: &str) -> Result<Uuid> { Ok(Uuid::parse_str(s)?) }

pub fn encode_dt(dt: DateTime<Utc>) -> String { dt.to_rfc3339() }

pub fn decode_dt(s: &str) -> Result<DateTime<Utc>> {
  Ok(DateTime::parse_from_rfc3339(s)?.with_timezone(&Utc))
}

pub fn encode_date(date: NaiveDate) -> String { date.to_string() }

pub fn decode_date(s: &str) -> Result<NaiveDate> { Ok(s.parse()?) }

pub fn decode_status(s: &str) -> Result<SessionStatus> {
  match s {
    "pending" => Ok(SessionStatus::Pending),
    "approved" => Ok(SessionStatus::Approved),
    "rejected" => Ok(SessionStatus::Rejected),
    "failed" => Ok(SessionStatus::Failed),
    "expired" => Ok(SessionStatus::Expired),
    other => Err(Error::UnknownStatus(other.to_owned())),
  }
}

/// A session row joined with its subject, still in stored form.
pub struct RawSession {
  pub session_id:    String,
  pub external_id:   Option<String>,
  pub status:        String,
  pub created_at:    String,
  pub updated_at:    String,
  pub subject_id:    String,
  pub first_name:    String,
  pub last_name:     String,
  pub document_id:   String,
  pub document_type: Option<String>,
  pub nationality:   Option<String>,
  pub date_of_birth: Option<String>,
}

impl RawSession {
  /// Reads the columns of the record SELECT in order.
  pub fn from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<Self> {
    Ok(Self {
      session_id:    row.get(0)?,
      external_id:   row.get(1)?,
      status:        row.get(2)?,
      created_at:    row.get(3)?,
      updated_at:    row.get(4)?,
      subject_id:    row.get(5)?,
      first_name:    row.get(6)?,
      last_name:     row.get(7)?,
      document_id:   row.get(8)?,
      document_type: row.get(9)?,
      nationality:   row.get(10)?,
      date_of_birth: row.get(11)?,
    })
  }

  pub fn into_record(self) -> Result<SessionRecord> {
    Ok(SessionRecord {
      session: VerificationSession {
        session_id:  decode_uuid(&self.session_id)?,
        external_id: self.external_id,
        status:      decode_status(&self.status)?,
        created_at:  decode_dt(&self.created_at)?,
        updated_at:  decode_dt(&self.updated_at)?,
      },
      subject: Subject {
        subject_id:    decode_uuid(&self.subject_id)?,
        first_name:    self.first_name,
        last_name:     self.last_name,
        document_id:   self.document_id,
        document_type: self.document_type,
        nationality:   self.nationality,
        date_of_birth: self.date_of_birth.as_deref().map(decode_date).transpose()?,
      },
    })
  }
}
