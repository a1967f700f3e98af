//! Access attempts, the immutable audit record of one completed scan cycle.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::{
  credential::DigitalId,
  decision::{Decision, ReasonCode},
};

/// Location recorded when the reader was configured without one.
pub const UNKNOWN_LOCATION: &str = "Unknown location";

// ─── Reader context ──────────────────────────────────────────────────────────

/// Who is scanning, and where. Fixed for the lifetime of a controller.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReaderContext {
  /// Name of the physical reader, e.g. `"lobby-east"`.
  pub reader_id:   String,
  /// The operator account attributed with every decision on this reader.
  pub operator_id: Uuid,
  pub location:    String,
}

impl ReaderContext {
  /// A blank location is replaced with [`UNKNOWN_LOCATION`].
  pub fn new(
    reader_id: impl Into<String>,
    operator_id: Uuid,
    location: impl AsRef<str>,
  ) -> Self {
    let location = match location.as_ref().trim() {
      "" => UNKNOWN_LOCATION.to_owned(),
      loc => loc.to_owned(),
    };
    Self { reader_id: reader_id.into(), operator_id, location }
  }
}

// ─── AccessAttempt ───────────────────────────────────────────────────────────

/// An append-only audit record. Once written, no field is ever updated.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AccessAttempt {
  /// Assigned before the first write so that a retried write is recognised
  /// as the same record.
  pub attempt_id:         Uuid,
  pub digital_id:         DigitalId,
  pub reader_id:          String,
  pub reader_operator_id: Uuid,
  pub granted:            bool,
  pub reason:             ReasonCode,
  pub location:           String,
  /// Identical to the decision's `evaluated_at`.
  pub timestamp:          DateTime<Utc>,
  /// The policy's own outcome, present only when the operator overrode it.
  pub computed_granted:   Option<bool>,
  pub computed_reason:    Option<ReasonCode>,
  pub operator_note:      Option<String>,
}

impl AccessAttempt {
  /// Build the audit record for a finalised decision.
  pub fn new(
    reader: &ReaderContext,
    digital_id: DigitalId,
    decision: &Decision,
    operator_note: Option<String>,
  ) -> Self {
    let computed = decision.operator_override.as_ref().map(|o| o.computed);
    let operator_note = decision
      .operator_override
      .as_ref()
      .map(|o| o.note.clone())
      .or(operator_note);
    Self {
      attempt_id: Uuid::new_v4(),
      digital_id,
      reader_id: reader.reader_id.clone(),
      reader_operator_id: reader.operator_id,
      granted: decision.granted,
      reason: decision.reason,
      location: reader.location.clone(),
      timestamp: decision.evaluated_at,
      computed_granted: computed.map(|v| v.granted),
      computed_reason: computed.map(|v| v.reason),
      operator_note,
    }
  }

  pub fn is_override(&self) -> bool { self.reason == ReasonCode::OperatorOverride }
}

// ─── Query type ──────────────────────────────────────────────────────────────

/// Parameters for [`crate::store::AuditSink::list_attempts`]. Results are newest first.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AttemptQuery {
  pub digital_id: Option<DigitalId>,
  pub reader_id:  Option<String>,
  pub granted:    Option<bool>,
  pub after:      Option<DateTime<Utc>>,
  pub before:     Option<DateTime<Utc>>,
  pub limit:      Option<usize>,
  pub offset:     Option<usize>,
}
