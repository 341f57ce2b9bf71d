//! Subject: the person whose identity is being verified.
//!
//! Caller-supplied fields are fixed at creation. Everything else on a subject
//! is only ever written from provider-confirmed data (webhook payloads and
//! decision reports), so a subject row cannot drift from what the provider
//! has actually verified.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// The person attached to a verification session.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Subject {
  pub subject_id:    Uuid,
  pub first_name:    String,
  pub last_name:     String,
  /// National identity document number; the lookup key for status queries.
  pub document_id:   String,
  pub document_type: Option<String>,
  pub nationality:   Option<String>,
  pub date_of_birth: Option<NaiveDate>,
}

/// Provider-verified field values extracted from a webhook or decision
/// payload. Absent or empty values leave the stored field untouched.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SubjectRefinements {
  pub last_name:     Option<String>,
  pub document_id:   Option<String>,
  pub document_type: Option<String>,
  pub nationality:   Option<String>,
  pub date_of_birth: Option<NaiveDate>,
}

impl SubjectRefinements {
  pub fn is_empty(&self) -> bool {
    self.last_name.is_none()
      && self.document_id.is_none()
      && self.document_type.is_none()
      && self.nationality.is_none()
      && self.date_of_birth.is_none()
  }
}

impl Subject {
  /// Merge provider-verified values field by field.
  ///
  /// A field is overwritten only when the incoming value is present and
  /// non-blank; a sparse payload can never blank out data captured earlier.
  /// Returns whether anything actually changed.
  pub fn refine(&mut self, incoming: &SubjectRefinements) -> bool {
    let mut changed = false;
    if let Some(v) = non_blank(incoming.last_name.as_deref())
      && self.last_name != v
    {
      self.last_name = v.to_owned();
      changed = true;
    }
    if let Some(v) = non_blank(incoming.document_id.as_deref())
      && self.document_id != v
    {
      self.document_id = v.to_owned();
      changed = true;
    }
    if let Some(v) = non_blank(incoming.document_type.as_deref())
      && self.document_type.as_deref() != Some(v)
    {
      self.document_type = Some(v.to_owned());
      changed = true;
    }
    if let Some(v) = non_blank(incoming.nationality.as_deref())
      && self.nationality.as_deref() != Some(v)
    {
      self.nationality = Some(v.to_owned());
      changed = true;
    }
    if let Some(d) = incoming.date_of_birth
      && self.date_of_birth != Some(d)
    {
      self.date_of_birth = Some(d);
      changed = true;
    }
    changed
  }
}

fn non_blank(value: Option<&str>) -> Option<&str> {
  value.filter(|v| !v.trim().is_empty())
}
