//! Error types for `tappass-core`.

use std::time::Duration;

use thiserror::Error;

use crate::{attempt::AccessAttempt, credential::DigitalId};

/// A boxed error from a storage collaborator.
pub type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// The audit sink could not durably record an attempt.
#[derive(Debug, Error)]
pub enum PersistenceError {
  #[error("audit sink failed after {tries} tries: {source}")]
  Sink {
    tries:  u8,
    #[source]
    source: BoxError,
  },

  #[error("audit sink timed out after {tries} tries of {after:?}")]
  Timeout { tries: u8, after: Duration },
}

#[derive(Debug, Error)]
pub enum Error {
  #[error("digital id not found: {0}")]
  NotFound(DigitalId),

  #[error("digital id must not be empty")]
  EmptyDigitalId,

  #[error("invalid credential: {0}")]
  InvalidCredential(String),

  #[error("facility offset of {0} minutes is out of range")]
  InvalidOffset(i32),

  #[error("reader {0} already has a scan in flight")]
  Busy(String),

  #[error("no decision is awaiting confirmation for this scan")]
  NoPendingDecision,

  #[error("scan was cancelled")]
  Cancelled,

  #[error("operator override rejected: {0}")]
  OverrideRejected(&'static str),

  #[error("credential lookup failed: {0}")]
  Lookup(#[source] BoxError),

  #[error("credential lookup timed out after {0:?}")]
  LookupTimeout(Duration),

  /// The decision was made but could not be recorded. The attempt that was
  /// not persisted is attached for manual follow-up.
  #[error("access decision could not be recorded: {source}")]
  LogFailed {
    attempt: Box<AccessAttempt>,
    #[source]
    source:  PersistenceError,
  },
}

impl Error {
  /// A message suitable for showing to the reader operator.
  ///
  /// A recording failure is worded so it cannot be mistaken for a denial.
  pub fn operator_message(&self) -> String {
    match self {
      Self::NotFound(_) => "Digital ID not found".into(),
      Self::EmptyDigitalId => "Please enter a Digital ID".into(),
      Self::Busy(_) => "A scan is already in progress on this reader".into(),
      Self::NoPendingDecision => "There is no scan awaiting a decision".into(),
      Self::Cancelled => "Scan cancelled".into(),
      Self::OverrideRejected(why) => format!("Override not permitted: {why}"),
      Self::Lookup(_) => "Error looking up Digital ID".into(),
      Self::LookupTimeout(_) => "Digital ID lookup timed out".into(),
      Self::LogFailed { .. } => {
        "Access decision could NOT be recorded; hold entry and report to \
         security for manual follow-up"
          .into()
      }
      other => other.to_string(),
    }
  }

  /// Whether this error ended a scan in the `LogFailed` state.
  pub fn is_log_failure(&self) -> bool { matches!(self, Self::LogFailed { .. }) }
}

pub type Result<T, E = Error> = std::result::Result<T, E>;
