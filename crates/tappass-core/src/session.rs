//! [`AccessSessionController`]: one reader's scan-cycle state machine.
//!
//! ```text
//! Idle ──begin_scan──▶ Scanning ──found──▶ Evaluated ──finalize──▶ Logged
//!                         │                   │    └────────────▶ LogFailed
//!                         └──not found / error / timeout──▶ LookupFailed
//! ```
//!
//! A credential resolved by the store is evaluated under the same lock that
//! records it, so `Resolved` is never observable on its own. Terminal states
//! accept a new scan immediately. Only one cycle may be in flight per
//! controller; a second initiation is rejected with [`Error::Busy`] rather
//! than queued, so a decision can never be attributed to the wrong tap.
//!
//! The state lock is never held across a store or sink call. A caller that
//! goes away mid-cycle never wedges the reader: an abandoned lookup puts the
//! controller back to `Idle`, and the audit append runs on its own task so
//! the cycle still ends in `Logged` or `LogFailed`.

use std::{sync::Arc, time::Duration};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;
use uuid::Uuid;

use crate::{
  Error, PersistenceError, Result,
  attempt::{AccessAttempt, ReaderContext},
  audit::AuditLogger,
  clock::{Clock, SystemClock},
  credential::{Credential, DigitalId},
  decision::{Decision, ReasonCode},
  policy::AccessPolicy,
  store::{AuditSink, CredentialStore},
};

/// Note recorded for a manual denial when the operator gave no reason.
pub const DEFAULT_DENY_NOTE: &str = "Access manually denied by reader";

/// Note recorded for a manual grant when the operator gave no reason.
pub const DEFAULT_GRANT_NOTE: &str = "Access manually granted by reader";

/// Default deadline for a credential lookup.
pub const DEFAULT_LOOKUP_TIMEOUT: Duration = Duration::from_secs(5);

// ─── Public types ────────────────────────────────────────────────────────────

/// Where a controller is in its scan cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ScanPhase {
  Idle,
  Scanning,
  /// A decision is awaiting the operator (or being recorded).
  Evaluated,
  Logged,
  LookupFailed,
  LogFailed,
}

impl ScanPhase {
  pub fn as_str(&self) -> &'static str {
    match self {
      Self::Idle => "idle",
      Self::Scanning => "scanning",
      Self::Evaluated => "evaluated",
      Self::Logged => "logged",
      Self::LookupFailed => "lookup_failed",
      Self::LogFailed => "log_failed",
    }
  }

  pub fn is_terminal(&self) -> bool {
    matches!(self, Self::Logged | Self::LookupFailed | Self::LogFailed)
  }
}

/// A computed decision awaiting the operator's confirmation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PendingDecision {
  /// Identifies this cycle; must be echoed back to [`AccessSessionController::finalize`].
  pub cycle_id:   Uuid,
  pub reader_id:  String,
  pub credential: Credential,
  pub decision:   Decision,
  pub message:    String,
}

/// What the operator does with a pending decision.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "action", rename_all = "snake_case")]
pub enum OperatorAction {
  /// Let the computed decision stand, optionally with a note for the log.
  Accept {
    #[serde(default)]
    note: Option<String>,
  },
  /// Force a grant.
  ManualGrant {
    #[serde(default)]
    reason: Option<String>,
  },
  /// Force a denial.
  ManualDeny {
    #[serde(default)]
    reason: Option<String>,
  },
}

impl OperatorAction {
  pub fn accept() -> Self { Self::Accept { note: None } }

  pub fn deny(reason: impl Into<String>) -> Self { Self::ManualDeny { reason: Some(reason.into()) } }

  pub fn grant(reason: impl Into<String>) -> Self {
    Self::ManualGrant { reason: Some(reason.into()) }
  }
}

/// The outcome surfaced to the caller once a cycle is recorded.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScanResult {
  pub attempt_id:      Uuid,
  pub cycle_id:        Uuid,
  pub digital_id:      DigitalId,
  pub full_name:       String,
  pub granted:         bool,
  pub reason:          ReasonCode,
  pub message:         String,
  pub escort_required: bool,
  pub timestamp:       DateTime<Utc>,
}

// ─── State ───────────────────────────────────────────────────────────────────

#[derive(Debug)]
enum State {
  Idle,
  Scanning { cycle_id: Uuid },
  Evaluated { pending: PendingDecision },
  /// Still `Evaluated` to observers; the audit append is in progress.
  Recording { cycle_id: Uuid },
  Logged,
  LookupFailed,
  LogFailed,
}

impl State {
  fn phase(&self) -> ScanPhase {
    match self {
      Self::Idle => ScanPhase::Idle,
      Self::Scanning { .. } => ScanPhase::Scanning,
      Self::Evaluated { .. } | Self::Recording { .. } => ScanPhase::Evaluated,
      Self::Logged => ScanPhase::Logged,
      Self::LookupFailed => ScanPhase::LookupFailed,
      Self::LogFailed => ScanPhase::LogFailed,
    }
  }

  fn in_flight(&self) -> bool {
    matches!(self, Self::Scanning { .. } | Self::Evaluated { .. } | Self::Recording { .. })
  }
}

// ─── Controller ──────────────────────────────────────────────────────────────

/// Orchestrates lookup, evaluation, operator confirmation, and audit for one
/// physical reader.
pub struct AccessSessionController<C, A> {
  reader:         ReaderContext,
  store:          Arc<C>,
  audit:          AuditLogger<A>,
  policy:         AccessPolicy,
  clock:          Arc<dyn Clock>,
  lookup_timeout: Duration,
  state:          Arc<Mutex<State>>,
}

impl<C, A> AccessSessionController<C, A>
where
  C: CredentialStore,
  A: AuditSink,
{
  pub fn new(
    reader: ReaderContext,
    store: Arc<C>,
    audit: AuditLogger<A>,
    policy: AccessPolicy,
  ) -> Self {
    Self {
      reader,
      store,
      audit,
      policy,
      clock: Arc::new(SystemClock),
      lookup_timeout: DEFAULT_LOOKUP_TIMEOUT,
      state: Arc::new(Mutex::new(State::Idle)),
    }
  }

  pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
    self.clock = clock;
    self
  }

  pub fn with_lookup_timeout(mut self, timeout: Duration) -> Self {
    self.lookup_timeout = timeout;
    self
  }

  pub fn reader(&self) -> &ReaderContext { &self.reader }

  pub async fn phase(&self) -> ScanPhase { self.state.lock().await.phase() }

  /// The decision currently awaiting the operator, if any.
  pub async fn pending(&self) -> Option<PendingDecision> {
    match &*self.state.lock().await {
      State::Evaluated { pending } => Some(pending.clone()),
      _ => None,
    }
  }

  /// Start a cycle for `candidate` (from an NFC tap or typed by hand) and
  /// evaluate it.
  ///
  /// No audit record is written here. A blank candidate is rejected without
  /// leaving the current state.
  pub async fn begin_scan(&self, candidate: &str) -> Result<PendingDecision> {
    let digital_id = DigitalId::parse(candidate)?;
    let cycle_id = Uuid::new_v4();

    {
      let mut state = self.state.lock().await;
      if state.in_flight() {
        tracing::warn!(reader = %self.reader.reader_id, "scan rejected: reader busy");
        return Err(Error::Busy(self.reader.reader_id.clone()));
      }
      *state = State::Scanning { cycle_id };
    }
    let guard = ScanGuard { state: Arc::clone(&self.state), cycle_id, armed: true };

    tracing::debug!(reader = %self.reader.reader_id, %cycle_id, %digital_id, "scan started");
    let looked_up =
      tokio::time::timeout(self.lookup_timeout, self.store.find_by_digital_id(&digital_id)).await;

    let mut state = self.state.lock().await;
    guard.disarm();
    if !matches!(&*state, State::Scanning { cycle_id: current } if *current == cycle_id) {
      tracing::debug!(reader = %self.reader.reader_id, %cycle_id, "lookup finished after cancel");
      return Err(Error::Cancelled);
    }

    let credential = match looked_up {
      Ok(Ok(Some(credential))) => credential,
      failed => {
        *state = State::LookupFailed;
        let error = match failed {
          Ok(Ok(_)) => Error::NotFound(digital_id),
          Ok(Err(e)) => Error::Lookup(Box::new(e)),
          Err(_) => Error::LookupTimeout(self.lookup_timeout),
        };
        tracing::info!(reader = %self.reader.reader_id, %cycle_id, error = %error, "lookup failed");
        return Err(error);
      }
    };

    let decision = self.policy.evaluate(&credential, self.clock.now());
    tracing::debug!(
      reader = %self.reader.reader_id,
      %cycle_id,
      granted = decision.granted,
      reason = decision.reason.as_str(),
      "credential evaluated"
    );

    let pending = PendingDecision {
      cycle_id,
      reader_id: self.reader.reader_id.clone(),
      message: decision.message(),
      credential,
      decision,
    };
    *state = State::Evaluated { pending: pending.clone() };
    Ok(pending)
  }

  /// Apply the operator's action to the pending decision and record it.
  ///
  /// Exactly one audit append is attempted per cycle. A rejected override
  /// leaves the decision pending. The append finishes even if this future is
  /// dropped.
  pub async fn finalize(&self, cycle_id: Uuid, action: OperatorAction) -> Result<ScanResult>
  where
    A: 'static,
  {
    let mut state = self.state.lock().await;
    let pending = match &*state {
      State::Evaluated { pending } if pending.cycle_id == cycle_id => pending,
      _ => return Err(Error::NoPendingDecision),
    };

    let (decision, note) = apply_action(pending, action)?;
    let attempt =
      AccessAttempt::new(&self.reader, pending.credential.digital_id.clone(), &decision, note);
    let full_name = pending.credential.full_name.clone();
    *state = State::Recording { cycle_id };
    drop(state);

    let audit = self.audit.clone();
    let shared = Arc::clone(&self.state);
    let reader_id = self.reader.reader_id.clone();
    let unrecorded = attempt.clone();
    let task = tokio::spawn(async move {
      let recorded = audit.record(&attempt).await;
      let mut state = shared.lock().await;
      match &recorded {
        Ok(()) => {
          *state = State::Logged;
          tracing::info!(
            reader = %reader_id,
            digital_id = %attempt.digital_id,
            attempt_id = %attempt.attempt_id,
            granted = attempt.granted,
            reason = attempt.reason.as_str(),
            "access decision recorded"
          );
        }
        Err(_) => *state = State::LogFailed,
      }
      recorded
    });

    let recorded = match task.await {
      Ok(recorded) => recorded,
      Err(join) => {
        *self.state.lock().await = State::LogFailed;
        Err(PersistenceError::Sink { tries: 1, source: Box::new(join) })
      }
    };

    match recorded {
      Ok(()) => Ok(ScanResult {
        attempt_id: unrecorded.attempt_id,
        cycle_id,
        digital_id: unrecorded.digital_id,
        full_name,
        granted: decision.granted,
        reason: decision.reason,
        message: decision.message(),
        escort_required: decision.escort_required,
        timestamp: decision.evaluated_at,
      }),
      Err(source) => Err(Error::LogFailed { attempt: Box::new(unrecorded), source }),
    }
  }

  /// Look up, evaluate, and record in one step, accepting the computed
  /// decision.
  pub async fn scan(&self, candidate: &str) -> Result<ScanResult>
  where
    A: 'static,
  {
    let pending = self.begin_scan(candidate).await?;
    self.finalize(pending.cycle_id, OperatorAction::accept()).await
  }

  /// Abandon the current cycle without recording anything.
  ///
  /// Returns the controller to `Idle`. A cycle whose decision is already
  /// being recorded cannot be cancelled.
  pub async fn cancel(&self) -> Result<()> {
    let mut state = self.state.lock().await;
    if let State::Recording { .. } = &*state {
      return Err(Error::Busy(self.reader.reader_id.clone()));
    }
    if state.in_flight() {
      tracing::info!(reader = %self.reader.reader_id, "scan cancelled");
    }
    *state = State::Idle;
    Ok(())
  }
}

// ─── Abandoned lookups ───────────────────────────────────────────────────────

/// Puts the controller back to `Idle` if a `begin_scan` future is dropped
/// while its lookup is outstanding.
struct ScanGuard {
  state:    Arc<Mutex<State>>,
  cycle_id: Uuid,
  armed:    bool,
}

impl ScanGuard {
  /// Called with the state lock held once the lookup has returned.
  fn disarm(mut self) { self.armed = false; }
}

impl Drop for ScanGuard {
  fn drop(&mut self) {
    if !self.armed {
      return;
    }
    let cycle_id = self.cycle_id;
    let reset = move |state: &mut State| {
      if matches!(state, State::Scanning { cycle_id: current } if *current == cycle_id) {
        tracing::debug!(%cycle_id, "scan abandoned mid-lookup");
        *state = State::Idle;
      }
    };
    match self.state.try_lock() {
      Ok(mut state) => reset(&mut *state),
      Err(_) => {
        if let Ok(handle) = tokio::runtime::Handle::try_current() {
          let state = Arc::clone(&self.state);
          handle.spawn(async move { reset(&mut *state.lock().await) });
        }
      }
    }
  }
}

/// Turn the operator's action into the final decision plus any note to keep
/// alongside an accepted decision.
fn apply_action(
  pending: &PendingDecision,
  action: OperatorAction,
) -> Result<(Decision, Option<String>)> {
  let computed = pending.decision.clone();
  match action {
    OperatorAction::Accept { note } => Ok((computed, non_blank(note))),
    OperatorAction::ManualDeny { reason } => {
      let note = non_blank(reason).unwrap_or_else(|| DEFAULT_DENY_NOTE.to_owned());
      Ok((computed.overridden(false, note), None))
    }
    OperatorAction::ManualGrant { .. } if !pending.credential.is_active => Err(
      Error::OverrideRejected("an inactive credential cannot be granted entry"),
    ),
    OperatorAction::ManualGrant { reason } => {
      let note = non_blank(reason).unwrap_or_else(|| DEFAULT_GRANT_NOTE.to_owned());
      Ok((computed.overridden(true, note), None))
    }
  }
}

fn non_blank(text: Option<String>) -> Option<String> {
  text
    .map(|t| t.trim().to_owned())
    .filter(|t| !t.is_empty())
}
