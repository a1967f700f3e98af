//! Decision types: the output of policy evaluation.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use strum::{AsRefStr, EnumString};

// ─── Reason codes ────────────────────────────────────────────────────────────

/// Why a decision came out the way it did. Always present on a decision.
#[derive(
  Debug, Clone, Copy, PartialEq, Eq, Hash, AsRefStr, EnumString, Serialize, Deserialize,
)]
#[strum(serialize_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum ReasonCode {
  InactiveCredential,
  InvalidRole,
  FullAccessGranted,
  WithinBusinessHours,
  OutsideBusinessHours,
  VisitorEscortRequired,
  OutsideVisitingHours,
  InvalidAccessLevel,
  OperatorOverride,
}

impl ReasonCode {
  /// The stable wire name, e.g. `"outside_business_hours"`.
  pub fn as_str(&self) -> &str { self.as_ref() }

  /// Human-readable explanation shown to the operator.
  pub fn message(&self) -> &'static str {
    match self {
      Self::InactiveCredential => "User account is inactive",
      Self::InvalidRole => "Credential carries an unrecognized role",
      Self::FullAccessGranted => "Full access granted",
      Self::WithinBusinessHours => {
        "Restricted access granted during business hours"
      }
      Self::OutsideBusinessHours => "Access denied outside business hours",
      Self::VisitorEscortRequired => "Visitor access granted - escort required",
      Self::OutsideVisitingHours => {
        "Visitor access denied outside visiting hours"
      }
      Self::InvalidAccessLevel => "Invalid access level",
      Self::OperatorOverride => "Decision overridden by reader",
    }
  }
}

// ─── Verdict ─────────────────────────────────────────────────────────────────

/// The bare outcome of a rule: grant or deny, and why.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Verdict {
  pub granted: bool,
  pub reason:  ReasonCode,
}

impl Verdict {
  pub fn grant(reason: ReasonCode) -> Self { Self { granted: true, reason } }

  pub fn deny(reason: ReasonCode) -> Self { Self { granted: false, reason } }
}

/// An operator's substitution of their own judgment for the computed verdict.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OperatorOverride {
  /// What the policy evaluator decided before the operator intervened.
  pub computed: Verdict,
  pub note:     String,
}

// ─── Decision ────────────────────────────────────────────────────────────────

/// The grant/deny outcome for one scan.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Decision {
  pub granted:           bool,
  pub reason:            ReasonCode,
  /// The instant the time-window check was made. Reused verbatim as the
  /// audit record's timestamp.
  pub evaluated_at:      DateTime<Utc>,
  /// Granted visitors must be escorted; the grant is not conditional on it.
  pub escort_required:   bool,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub operator_override: Option<OperatorOverride>,
}

impl Decision {
  pub(crate) fn from_verdict(verdict: Verdict, evaluated_at: DateTime<Utc>) -> Self {
    Self {
      granted: verdict.granted,
      reason: verdict.reason,
      evaluated_at,
      escort_required: verdict.granted
        && verdict.reason == ReasonCode::VisitorEscortRequired,
      operator_override: None,
    }
  }

  pub fn verdict(&self) -> Verdict {
    Verdict { granted: self.granted, reason: self.reason }
  }

  /// Replace the outcome with the operator's choice.
  ///
  /// The evaluated timestamp is kept and the computed verdict is retained for
  /// the audit trail. Overriding an already-overridden decision keeps the
  /// original computed verdict.
  pub fn overridden(self, granted: bool, note: impl Into<String>) -> Self {
    let computed = match &self.operator_override {
      Some(prior) => prior.computed,
      None => self.verdict(),
    };
    Self {
      granted,
      reason: ReasonCode::OperatorOverride,
      evaluated_at: self.evaluated_at,
      escort_required: granted && self.escort_required,
      operator_override: Some(OperatorOverride { computed, note: note.into() }),
    }
  }

  pub fn is_override(&self) -> bool { self.operator_override.is_some() }

  /// Human-readable outcome for the operator. Overrides show the
  /// operator's note.
  pub fn message(&self) -> String {
    match &self.operator_override {
      Some(o) => o.note.clone(),
      None => self.reason.message().to_owned(),
    }
  }
}
