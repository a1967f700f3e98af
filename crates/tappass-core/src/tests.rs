//! Scan-cycle tests for `AccessSessionController` against in-memory
//! collaborators.

use std::{
  collections::HashMap,
  sync::{
    Arc, Mutex,
    atomic::{AtomicUsize, Ordering},
  },
  time::Duration,
};

use chrono::{DateTime, TimeZone, Utc};
use uuid::Uuid;

use crate::{
  Error, PersistenceError,
  attempt::{AccessAttempt, AttemptQuery, ReaderContext},
  audit::{AuditLogger, AuditSettings},
  clock::FixedClock,
  credential::{AccessLevel, Credential, DigitalId, NewCredential, Role},
  decision::ReasonCode,
  policy::AccessPolicy,
  session::{AccessSessionController, OperatorAction, ScanPhase},
  store::{AuditSink, CredentialStore},
};

// ─── Fakes ───────────────────────────────────────────────────────────────────

#[derive(Debug, thiserror::Error)]
#[error("collaborator unavailable")]
struct Unavailable;

#[derive(Default)]
struct MemoryStore {
  credentials: Mutex<HashMap<DigitalId, Credential>>,
  delay:       Option<Duration>,
}

impl MemoryStore {
  fn with(credentials: impl IntoIterator<Item = Credential>) -> Self {
    let map = credentials.into_iter().map(|c| (c.digital_id.clone(), c)).collect();
    Self { credentials: Mutex::new(map), delay: None }
  }

  fn slow(mut self, delay: Duration) -> Self {
    self.delay = Some(delay);
    self
  }
}

impl CredentialStore for MemoryStore {
  type Error = Unavailable;

  async fn find_by_digital_id(&self, digital_id: &DigitalId) -> Result<Option<Credential>, Unavailable> {
    if let Some(delay) = self.delay {
      tokio::time::sleep(delay).await;
    }
    Ok(self.credentials.lock().unwrap().get(digital_id).cloned())
  }

  async fn find_by_user_id(&self, user_id: Uuid) -> Result<Option<Credential>, Unavailable> {
    Ok(self.credentials.lock().unwrap().values().find(|c| c.user_id == user_id).cloned())
  }

  async fn list_credentials(&self, active_only: bool) -> Result<Vec<Credential>, Unavailable> {
    Ok(
      self
        .credentials
        .lock()
        .unwrap()
        .values()
        .filter(|c| c.is_active || !active_only)
        .cloned()
        .collect(),
    )
  }

  async fn register(&self, input: NewCredential) -> Result<Credential, Unavailable> {
    let input = input.validate().map_err(|_| Unavailable)?;
    let credential = Credential {
      user_id: input.user_id,
      digital_id: input.digital_id.unwrap_or_else(DigitalId::generate),
      full_name: input.full_name,
      role: input.role,
      access_level: input.access_level,
      department: input.department,
      phone: input.phone,
      is_active: true,
      created_at: Utc::now(),
    };
    self
      .credentials
      .lock()
      .unwrap()
      .insert(credential.digital_id.clone(), credential.clone());
    Ok(credential)
  }

  async fn set_active(
    &self,
    digital_id: &DigitalId,
    active: bool,
  ) -> Result<Option<Credential>, Unavailable> {
    let mut map = self.credentials.lock().unwrap();
    Ok(map.get_mut(digital_id).map(|c| {
      c.is_active = active;
      c.clone()
    }))
  }
}

/// Records attempts in memory; fails the first `failures` calls.
#[derive(Default)]
struct MemorySink {
  attempts: Mutex<Vec<AccessAttempt>>,
  failures: AtomicUsize,
  calls:    AtomicUsize,
  delay:    Option<Duration>,
}

impl MemorySink {
  fn failing(failures: usize) -> Self {
    Self { failures: AtomicUsize::new(failures), ..Self::default() }
  }

  fn slow(delay: Duration) -> Self { Self { delay: Some(delay), ..Self::default() } }

  fn recorded(&self) -> Vec<AccessAttempt> { self.attempts.lock().unwrap().clone() }
}

impl AuditSink for MemorySink {
  type Error = Unavailable;

  async fn record(&self, attempt: &AccessAttempt) -> Result<(), Unavailable> {
    self.calls.fetch_add(1, Ordering::SeqCst);
    if let Some(delay) = self.delay {
      tokio::time::sleep(delay).await;
    }
    let remaining = self.failures.load(Ordering::SeqCst);
    if remaining > 0 {
      self.failures.store(remaining - 1, Ordering::SeqCst);
      return Err(Unavailable);
    }
    let mut attempts = self.attempts.lock().unwrap();
    if !attempts.iter().any(|a| a.attempt_id == attempt.attempt_id) {
      attempts.push(attempt.clone());
    }
    Ok(())
  }

  async fn list_attempts(&self, _query: &AttemptQuery) -> Result<Vec<AccessAttempt>, Unavailable> {
    Ok(self.recorded())
  }
}

// ─── Fixtures ────────────────────────────────────────────────────────────────

const FULL_ID: &str = "badge-full";
const RESTRICTED_ID: &str = "badge-restricted";
const VISITOR_ID: &str = "badge-visitor";
const INACTIVE_ID: &str = "badge-inactive";

fn credential(id: &str, access_level: AccessLevel, is_active: bool) -> Credential {
  Credential {
    user_id: Uuid::new_v4(),
    digital_id: DigitalId::parse(id).unwrap(),
    full_name: format!("Holder of {id}"),
    role: Role::Employee,
    access_level,
    department: Some("Facilities".into()),
    phone: None,
    is_active,
    created_at: Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap(),
  }
}

fn store() -> MemoryStore {
  MemoryStore::with([
    credential(FULL_ID, AccessLevel::Full, true),
    credential(RESTRICTED_ID, AccessLevel::Restricted, true),
    credential(VISITOR_ID, AccessLevel::Visitor, true),
    credential(INACTIVE_ID, AccessLevel::Full, false),
  ])
}

fn at_hour(hour: u32) -> DateTime<Utc> {
  Utc.with_ymd_and_hms(2024, 6, 3, hour, 0, 0).unwrap()
}

fn reader() -> ReaderContext { ReaderContext::new("lobby", Uuid::new_v4(), "Main Entrance") }

type Controller = AccessSessionController<MemoryStore, MemorySink>;

fn controller(store: MemoryStore, sink: MemorySink, now: DateTime<Utc>) -> (Controller, Arc<MemorySink>) {
  let sink = Arc::new(sink);
  let audit = AuditLogger::new(
    Arc::clone(&sink),
    AuditSettings { timeout: Duration::from_secs(1), retries: 1 },
  );
  let controller =
    AccessSessionController::new(reader(), Arc::new(store), audit, AccessPolicy::default())
      .with_clock(Arc::new(FixedClock(now)));
  (controller, sink)
}

// ─── End-to-end scenarios ────────────────────────────────────────────────────

#[tokio::test]
async fn full_access_at_three_am_is_granted_and_logged() {
  let (c, sink) = controller(store(), MemorySink::default(), at_hour(3));

  let result = c.scan(FULL_ID).await.unwrap();
  assert!(result.granted);
  assert_eq!(result.reason, ReasonCode::FullAccessGranted);
  assert_eq!(result.message, "Full access granted");
  assert_eq!(c.phase().await, ScanPhase::Logged);

  let recorded = sink.recorded();
  assert_eq!(recorded.len(), 1);
  assert!(recorded[0].granted);
  assert_eq!(recorded[0].attempt_id, result.attempt_id);
  assert_eq!(recorded[0].timestamp, at_hour(3));
  assert_eq!(recorded[0].location, "Main Entrance");
  assert_eq!(recorded[0].reader_id, "lobby");
}

#[tokio::test]
async fn restricted_after_hours_is_denied_and_logged() {
  let (c, sink) = controller(store(), MemorySink::default(), at_hour(19));

  let result = c.scan(RESTRICTED_ID).await.unwrap();
  assert!(!result.granted);
  assert_eq!(result.reason, ReasonCode::OutsideBusinessHours);

  let recorded = sink.recorded();
  assert_eq!(recorded.len(), 1);
  assert!(!recorded[0].granted);
  assert_eq!(recorded[0].reason, ReasonCode::OutsideBusinessHours);
}

#[tokio::test]
async fn inactive_full_access_is_denied() {
  let (c, sink) = controller(store(), MemorySink::default(), at_hour(12));

  let result = c.scan(INACTIVE_ID).await.unwrap();
  assert!(!result.granted);
  assert_eq!(result.reason, ReasonCode::InactiveCredential);
  assert_eq!(sink.recorded().len(), 1);
}

#[tokio::test]
async fn unknown_identifier_fails_lookup_without_audit() {
  let (c, sink) = controller(store(), MemorySink::default(), at_hour(12));

  let err = c.begin_scan("no-such-badge").await.unwrap_err();
  assert!(matches!(err, Error::NotFound(_)));
  assert_eq!(err.operator_message(), "Digital ID not found");
  assert_eq!(c.phase().await, ScanPhase::LookupFailed);
  assert!(sink.recorded().is_empty());
  assert_eq!(sink.calls.load(Ordering::SeqCst), 0);

  // The operator can retry straight away.
  assert!(c.scan(FULL_ID).await.unwrap().granted);
}

#[tokio::test]
async fn manual_deny_overrides_a_grant() {
  let (c, sink) = controller(store(), MemorySink::default(), at_hour(10));

  let pending = c.begin_scan(FULL_ID).await.unwrap();
  assert!(pending.decision.granted);
  assert_eq!(c.phase().await, ScanPhase::Evaluated);

  let result = c
    .finalize(pending.cycle_id, OperatorAction::deny("badge photo mismatch"))
    .await
    .unwrap();
  assert!(!result.granted);
  assert_eq!(result.reason, ReasonCode::OperatorOverride);
  assert_eq!(result.message, "badge photo mismatch");

  let recorded = sink.recorded();
  assert_eq!(recorded.len(), 1);
  let attempt = &recorded[0];
  assert!(!attempt.granted);
  assert_eq!(attempt.reason, ReasonCode::OperatorOverride);
  assert_eq!(attempt.computed_granted, Some(true));
  assert_eq!(attempt.computed_reason, Some(ReasonCode::FullAccessGranted));
  assert_eq!(attempt.operator_note.as_deref(), Some("badge photo mismatch"));
}

// ─── Operator actions ────────────────────────────────────────────────────────

#[tokio::test]
async fn manual_deny_without_reason_uses_default_note() {
  let (c, sink) = controller(store(), MemorySink::default(), at_hour(10));
  let pending = c.begin_scan(VISITOR_ID).await.unwrap();
  c.finalize(pending.cycle_id, OperatorAction::ManualDeny { reason: Some("  ".into()) })
    .await
    .unwrap();
  assert_eq!(
    sink.recorded()[0].operator_note.as_deref(),
    Some("Access manually denied by reader")
  );
}

#[tokio::test]
async fn manual_grant_after_hours_is_recorded_as_override() {
  let (c, sink) = controller(store(), MemorySink::default(), at_hour(22));
  let pending = c.begin_scan(RESTRICTED_ID).await.unwrap();
  assert!(!pending.decision.granted);

  let result = c.finalize(pending.cycle_id, OperatorAction::grant("night shift")).await.unwrap();
  assert!(result.granted);
  let attempt = &sink.recorded()[0];
  assert_eq!(attempt.reason, ReasonCode::OperatorOverride);
  assert_eq!(attempt.computed_reason, Some(ReasonCode::OutsideBusinessHours));
}

#[tokio::test]
async fn manual_grant_of_inactive_credential_is_rejected() {
  let (c, sink) = controller(store(), MemorySink::default(), at_hour(12));
  let pending = c.begin_scan(INACTIVE_ID).await.unwrap();

  let err = c.finalize(pending.cycle_id, OperatorAction::grant("I know them")).await.unwrap_err();
  assert!(matches!(err, Error::OverrideRejected(_)));
  assert_eq!(c.phase().await, ScanPhase::Evaluated);
  assert!(sink.recorded().is_empty());

  let result = c.finalize(pending.cycle_id, OperatorAction::accept()).await.unwrap();
  assert_eq!(result.reason, ReasonCode::InactiveCredential);
  assert_eq!(sink.recorded().len(), 1);
}

#[tokio::test]
async fn accept_keeps_operator_note() {
  let (c, sink) = controller(store(), MemorySink::default(), at_hour(12));
  let pending = c.begin_scan(VISITOR_ID).await.unwrap();
  let result = c
    .finalize(pending.cycle_id, OperatorAction::Accept { note: Some("escorted by J. Doe".into()) })
    .await
    .unwrap();
  assert!(result.escort_required);
  assert_eq!(result.reason, ReasonCode::VisitorEscortRequired);
  let attempt = &sink.recorded()[0];
  assert_eq!(attempt.operator_note.as_deref(), Some("escorted by J. Doe"));
  assert_eq!(attempt.computed_reason, None);
}

#[tokio::test]
async fn finalize_is_applied_at_most_once() {
  let (c, sink) = controller(store(), MemorySink::default(), at_hour(12));
  let pending = c.begin_scan(FULL_ID).await.unwrap();
  c.finalize(pending.cycle_id, OperatorAction::accept()).await.unwrap();

  let err = c.finalize(pending.cycle_id, OperatorAction::accept()).await.unwrap_err();
  assert!(matches!(err, Error::NoPendingDecision));
  assert_eq!(sink.recorded().len(), 1);
}

#[tokio::test]
async fn stale_cycle_id_is_rejected() {
  let (c, sink) = controller(store(), MemorySink::default(), at_hour(12));
  c.begin_scan(FULL_ID).await.unwrap();
  let err = c.finalize(Uuid::new_v4(), OperatorAction::accept()).await.unwrap_err();
  assert!(matches!(err, Error::NoPendingDecision));
  assert!(sink.recorded().is_empty());
}

// ─── Busy, cancel, and input ─────────────────────────────────────────────────

#[tokio::test]
async fn second_scan_while_pending_is_busy() {
  let (c, sink) = controller(store(), MemorySink::default(), at_hour(12));
  c.begin_scan(FULL_ID).await.unwrap();

  let err = c.begin_scan(VISITOR_ID).await.unwrap_err();
  assert!(matches!(err, Error::Busy(reader) if reader == "lobby"));

  c.cancel().await.unwrap();
  assert_eq!(c.phase().await, ScanPhase::Idle);
  assert!(sink.recorded().is_empty());

  assert!(c.begin_scan(VISITOR_ID).await.is_ok());
}

#[tokio::test]
async fn scan_while_lookup_in_flight_is_busy() {
  let store = store().slow(Duration::from_millis(200));
  let (c, _sink) = controller(store, MemorySink::default(), at_hour(12));
  let c = Arc::new(c);

  let first = tokio::spawn({
    let c = Arc::clone(&c);
    async move { c.begin_scan(FULL_ID).await }
  });
  tokio::time::sleep(Duration::from_millis(20)).await;
  assert_eq!(c.phase().await, ScanPhase::Scanning);
  assert!(matches!(c.begin_scan(VISITOR_ID).await, Err(Error::Busy(_))));

  assert!(first.await.unwrap().is_ok());
}

#[tokio::test]
async fn cancel_during_lookup_discards_the_result() {
  let store = store().slow(Duration::from_millis(200));
  let (c, sink) = controller(store, MemorySink::default(), at_hour(12));
  let c = Arc::new(c);

  let scan = tokio::spawn({
    let c = Arc::clone(&c);
    async move { c.begin_scan(FULL_ID).await }
  });
  tokio::time::sleep(Duration::from_millis(20)).await;
  c.cancel().await.unwrap();

  assert!(matches!(scan.await.unwrap(), Err(Error::Cancelled)));
  assert_eq!(c.phase().await, ScanPhase::Idle);
  assert!(c.pending().await.is_none());
  assert!(sink.recorded().is_empty());
}

#[tokio::test]
async fn abandoned_lookup_returns_reader_to_idle() {
  let store = store().slow(Duration::from_millis(300));
  let (c, sink) = controller(store, MemorySink::default(), at_hour(12));
  let c = Arc::new(c);

  let scan = tokio::spawn({
    let c = Arc::clone(&c);
    async move { c.begin_scan(FULL_ID).await }
  });
  tokio::time::sleep(Duration::from_millis(50)).await;
  assert_eq!(c.phase().await, ScanPhase::Scanning);
  scan.abort();
  assert!(scan.await.unwrap_err().is_cancelled());

  tokio::time::sleep(Duration::from_millis(20)).await;
  assert_eq!(c.phase().await, ScanPhase::Idle);
  assert!(sink.recorded().is_empty());
  assert!(c.begin_scan(VISITOR_ID).await.is_ok());
}

#[tokio::test]
async fn lookup_timeout_fails_lookup() {
  let store = store().slow(Duration::from_millis(500));
  let (c, sink) = controller(store, MemorySink::default(), at_hour(12));
  let c = c.with_lookup_timeout(Duration::from_millis(20));

  let err = c.begin_scan(FULL_ID).await.unwrap_err();
  assert!(matches!(err, Error::LookupTimeout(_)));
  assert_eq!(c.phase().await, ScanPhase::LookupFailed);
  assert!(sink.recorded().is_empty());
}

#[tokio::test]
async fn blank_identifier_is_rejected_in_place() {
  let (c, _sink) = controller(store(), MemorySink::default(), at_hour(12));
  assert!(matches!(c.begin_scan("   ").await, Err(Error::EmptyDigitalId)));
  assert_eq!(c.phase().await, ScanPhase::Idle);
}

#[tokio::test]
async fn identifier_is_trimmed_before_lookup() {
  let (c, _sink) = controller(store(), MemorySink::default(), at_hour(12));
  let pending = c.begin_scan(&format!("  {FULL_ID}\n")).await.unwrap();
  assert_eq!(pending.credential.digital_id.as_str(), FULL_ID);
}

// ─── Audit failures ──────────────────────────────────────────────────────────

#[tokio::test]
async fn one_failed_append_is_retried() {
  let (c, sink) = controller(store(), MemorySink::failing(1), at_hour(12));

  let result = c.scan(FULL_ID).await.unwrap();
  assert!(result.granted);
  assert_eq!(sink.calls.load(Ordering::SeqCst), 2);
  assert_eq!(sink.recorded().len(), 1);
  assert_eq!(c.phase().await, ScanPhase::Logged);
}

#[tokio::test]
async fn exhausted_retries_end_in_log_failed() {
  let (c, sink) = controller(store(), MemorySink::failing(5), at_hour(12));

  let err = c.scan(FULL_ID).await.unwrap_err();
  assert!(err.is_log_failure());
  assert_ne!(err.operator_message(), ReasonCode::InactiveCredential.message());
  match &err {
    Error::LogFailed { attempt, .. } => {
      assert!(attempt.granted);
      assert_eq!(attempt.reason, ReasonCode::FullAccessGranted);
    }
    other => panic!("unexpected error: {other}"),
  }
  assert_eq!(c.phase().await, ScanPhase::LogFailed);
  assert_eq!(sink.calls.load(Ordering::SeqCst), 2);
  assert!(sink.recorded().is_empty());

  // A failed cycle does not block the reader.
  assert!(c.begin_scan(FULL_ID).await.is_ok());
}

#[tokio::test]
async fn audit_timeout_ends_in_log_failed() {
  let sink = Arc::new(MemorySink::slow(Duration::from_millis(200)));
  let audit = AuditLogger::new(
    Arc::clone(&sink),
    AuditSettings { timeout: Duration::from_millis(20), retries: 1 },
  );
  let c = AccessSessionController::new(reader(), Arc::new(store()), audit, AccessPolicy::default())
    .with_clock(Arc::new(FixedClock(at_hour(12))));

  let err = c.scan(FULL_ID).await.unwrap_err();
  assert!(matches!(
    err,
    Error::LogFailed { source: PersistenceError::Timeout { tries: 2, .. }, .. }
  ));
  assert_eq!(c.phase().await, ScanPhase::LogFailed);
  assert_eq!(sink.calls.load(Ordering::SeqCst), 2);
  assert!(sink.recorded().is_empty());
}

#[tokio::test]
async fn dropped_finalize_still_records_and_frees_the_reader() {
  let (c, sink) = controller(store(), MemorySink::slow(Duration::from_millis(300)), at_hour(12));
  let c = Arc::new(c);
  let pending = c.begin_scan(FULL_ID).await.unwrap();

  let finalize = tokio::spawn({
    let c = Arc::clone(&c);
    async move { c.finalize(pending.cycle_id, OperatorAction::accept()).await }
  });
  tokio::time::sleep(Duration::from_millis(50)).await;
  finalize.abort();
  assert!(finalize.await.unwrap_err().is_cancelled());

  tokio::time::sleep(Duration::from_millis(500)).await;
  assert_eq!(c.phase().await, ScanPhase::Logged);
  assert_eq!(sink.recorded().len(), 1);
  assert!(c.begin_scan(VISITOR_ID).await.is_ok());
}

#[tokio::test]
async fn retry_budget_is_clamped_to_one() {
  let sink = Arc::new(MemorySink::failing(5));
  let audit = AuditLogger::new(
    Arc::clone(&sink),
    AuditSettings { timeout: Duration::from_secs(1), retries: 9 },
  );
  let c = AccessSessionController::new(reader(), Arc::new(store()), audit, AccessPolicy::default());

  assert!(c.scan(FULL_ID).await.unwrap_err().is_log_failure());
  assert_eq!(sink.calls.load(Ordering::SeqCst), 2);
}

// ─── Independent readers ─────────────────────────────────────────────────────

#[tokio::test]
async fn readers_scan_concurrently() {
  let store = Arc::new(store());
  let sink = Arc::new(MemorySink::default());
  let make = |name: &str| {
    AccessSessionController::new(
      ReaderContext::new(name, Uuid::new_v4(), ""),
      Arc::clone(&store),
      AuditLogger::new(Arc::clone(&sink), AuditSettings::default()),
      AccessPolicy::default(),
    )
    .with_clock(Arc::new(FixedClock(at_hour(12))))
  };
  let east = make("east");
  let west = make("west");

  let (a, b) = tokio::join!(east.scan(FULL_ID), west.scan(VISITOR_ID));
  assert!(a.unwrap().granted);
  assert!(b.unwrap().escort_required);

  let recorded = sink.recorded();
  assert_eq!(recorded.len(), 2);
  assert!(recorded.iter().all(|r| r.location == "Unknown location"));
  let mut readers: Vec<_> = recorded.iter().map(|r| r.reader_id.as_str()).collect();
  readers.sort();
  assert_eq!(readers, ["east", "west"]);
}
