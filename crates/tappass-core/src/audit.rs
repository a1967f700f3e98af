//! [`AuditLogger`], a bounded-retry wrapper around an [`AuditSink`].

use std::{sync::Arc, time::Duration};

use crate::{PersistenceError, attempt::AccessAttempt, store::AuditSink};

/// Most immediate retries the logger will ever make after a failed append.
pub const MAX_RETRIES: u8 = 1;

/// Timeout and retry budget for audit appends.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AuditSettings {
  /// Deadline for each individual append.
  pub timeout: Duration,
  /// Immediate retries after the first failure; clamped to [`MAX_RETRIES`].
  pub retries: u8,
}

impl Default for AuditSettings {
  fn default() -> Self { Self { timeout: Duration::from_secs(5), retries: MAX_RETRIES } }
}

/// Appends access attempts to a sink with a per-call deadline and at most one
/// immediate retry.
///
/// Cloning is cheap; the sink is reference-counted.
pub struct AuditLogger<A> {
  sink:     Arc<A>,
  settings: AuditSettings,
}

impl<A> Clone for AuditLogger<A> {
  fn clone(&self) -> Self { Self { sink: Arc::clone(&self.sink), settings: self.settings } }
}

impl<A: AuditSink> AuditLogger<A> {
  pub fn new(sink: Arc<A>, settings: AuditSettings) -> Self {
    let settings = AuditSettings { retries: settings.retries.min(MAX_RETRIES), ..settings };
    Self { sink, settings }
  }

  pub fn sink(&self) -> &Arc<A> { &self.sink }

  /// Durably append `attempt`, or report why it could not be.
  ///
  /// Never retries beyond the configured budget.
  pub async fn record(&self, attempt: &AccessAttempt) -> Result<(), PersistenceError> {
    let budget = 1 + self.settings.retries;
    let mut tries = 0;
    loop {
      tries += 1;
      let failure = match tokio::time::timeout(self.settings.timeout, self.sink.record(attempt)).await
      {
        Ok(Ok(())) => {
          tracing::debug!(attempt_id = %attempt.attempt_id, tries, "access attempt recorded");
          return Ok(());
        }
        Ok(Err(e)) => PersistenceError::Sink { tries, source: Box::new(e) },
        Err(_) => PersistenceError::Timeout { tries, after: self.settings.timeout },
      };

      if tries >= budget {
        tracing::error!(
          attempt_id = %attempt.attempt_id,
          digital_id = %attempt.digital_id,
          error = %failure,
          "giving up on access attempt record"
        );
        return Err(failure);
      }
      tracing::warn!(
        attempt_id = %attempt.attempt_id,
        error = %failure,
        "access attempt record failed; retrying"
      );
    }
  }
}
