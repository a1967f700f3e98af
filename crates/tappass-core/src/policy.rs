//! The access policy: a pure function from credential and time to decision.
//!
//! Rules are consulted in order and the first one to return a verdict wins.
//! Evaluation performs no I/O and never reads the clock; the caller supplies
//! the instant, so the same `(credential, instant)` always yields the same
//! decision.

use std::{fmt, sync::Arc};

use chrono::{DateTime, Utc};

use crate::{
  clock::FacilityClock,
  credential::{AccessLevel, Credential},
  decision::{Decision, ReasonCode, Verdict},
};

// ─── Hour windows ────────────────────────────────────────────────────────────

/// A half-open range of facility-local hours, `[start, end)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HourWindow {
  pub start: u32,
  pub end:   u32,
}

impl HourWindow {
  pub const fn new(start: u32, end: u32) -> Self { Self { start, end } }

  /// `end` itself is outside the window.
  pub fn contains(&self, hour: u32) -> bool { hour >= self.start && hour < self.end }
}

/// When restricted credentials may enter.
pub const BUSINESS_HOURS: HourWindow = HourWindow::new(8, 18);

/// When visitor credentials may enter.
pub const VISITING_HOURS: HourWindow = HourWindow::new(9, 17);

// ─── Rules ───────────────────────────────────────────────────────────────────

/// Facts about the scan that every rule may consult.
#[derive(Debug, Clone, Copy)]
pub struct RuleContext {
  /// Facility-local hour-of-day at the evaluation instant.
  pub local_hour: u32,
}

/// One entry in the policy's rule table.
pub trait Rule: fmt::Debug + Send + Sync {
  /// Return a verdict if this rule decides the credential, or `None` to defer
  /// to the next rule.
  fn apply(&self, credential: &Credential, ctx: &RuleContext) -> Option<Verdict>;
}

/// A deactivated credential is denied before anything else is considered.
#[derive(Debug, Clone, Copy)]
pub struct InactiveCredentialRule;

impl Rule for InactiveCredentialRule {
  fn apply(&self, credential: &Credential, _ctx: &RuleContext) -> Option<Verdict> {
    (!credential.is_active).then(|| Verdict::deny(ReasonCode::InactiveCredential))
  }
}

/// A role outside the known set is a data-integrity failure; deny.
#[derive(Debug, Clone, Copy)]
pub struct UnrecognizedRoleRule;

impl Rule for UnrecognizedRoleRule {
  fn apply(&self, credential: &Credential, _ctx: &RuleContext) -> Option<Verdict> {
    (!credential.role.is_recognized()).then(|| Verdict::deny(ReasonCode::InvalidRole))
  }
}

/// The time-window table keyed on access level.
#[derive(Debug, Clone, Copy)]
pub struct AccessLevelRule {
  pub business_hours: HourWindow,
  pub visiting_hours: HourWindow,
}

impl Default for AccessLevelRule {
  fn default() -> Self {
    Self { business_hours: BUSINESS_HOURS, visiting_hours: VISITING_HOURS }
  }
}

impl Rule for AccessLevelRule {
  fn apply(&self, credential: &Credential, ctx: &RuleContext) -> Option<Verdict> {
    let verdict = match &credential.access_level {
      AccessLevel::Full => Verdict::grant(ReasonCode::FullAccessGranted),
      AccessLevel::Restricted if self.business_hours.contains(ctx.local_hour) => {
        Verdict::grant(ReasonCode::WithinBusinessHours)
      }
      AccessLevel::Restricted => Verdict::deny(ReasonCode::OutsideBusinessHours),
      AccessLevel::Visitor if self.visiting_hours.contains(ctx.local_hour) => {
        Verdict::grant(ReasonCode::VisitorEscortRequired)
      }
      AccessLevel::Visitor => Verdict::deny(ReasonCode::OutsideVisitingHours),
      AccessLevel::Unrecognized(_) => Verdict::deny(ReasonCode::InvalidAccessLevel),
    };
    Some(verdict)
  }
}

// ─── Policy ──────────────────────────────────────────────────────────────────

/// An ordered rule table evaluated in the facility's timezone.
///
/// Cloning is cheap; rules are reference-counted.
#[derive(Debug, Clone)]
pub struct AccessPolicy {
  facility: FacilityClock,
  rules:    Vec<Arc<dyn Rule>>,
}

impl AccessPolicy {
  /// The standard table: inactive, unrecognized role, then access level.
  pub fn new(facility: FacilityClock) -> Self {
    Self::with_rules(
      facility,
      vec![
        Arc::new(InactiveCredentialRule),
        Arc::new(UnrecognizedRoleRule),
        Arc::new(AccessLevelRule::default()),
      ],
    )
  }

  pub fn with_rules(facility: FacilityClock, rules: Vec<Arc<dyn Rule>>) -> Self {
    Self { facility, rules }
  }

  pub fn facility(&self) -> FacilityClock { self.facility }

  /// Decide whether `credential` may enter at `now`.
  ///
  /// Never fails. If no rule produces a verdict the credential is denied as
  /// carrying an invalid access level.
  pub fn evaluate(&self, credential: &Credential, now: DateTime<Utc>) -> Decision {
    let ctx = RuleContext { local_hour: self.facility.local_hour(now) };
    let verdict = self
      .rules
      .iter()
      .find_map(|rule| rule.apply(credential, &ctx))
      .unwrap_or(Verdict::deny(ReasonCode::InvalidAccessLevel));
    Decision::from_verdict(verdict, now)
  }
}

impl Default for AccessPolicy {
  fn default() -> Self { Self::new(FacilityClock::utc()) }
}

#[cfg(test)]
mod tests {
  use chrono::TimeZone;
  use uuid::Uuid;

  use super::*;
  use crate::credential::{DigitalId, Role};

  fn credential(access_level: AccessLevel, is_active: bool) -> Credential {
    Credential {
      user_id: Uuid::new_v4(),
      digital_id: DigitalId::generate(),
      full_name: "Grace Hopper".into(),
      role: Role::Employee,
      access_level,
      department: None,
      phone: None,
      is_active,
      created_at: Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap(),
    }
  }

  fn at_hour(hour: u32) -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 6, 3, hour, 0, 0).unwrap()
  }

  const ALL_LEVELS: [AccessLevel; 3] =
    [AccessLevel::Full, AccessLevel::Restricted, AccessLevel::Visitor];

  #[test]
  fn inactive_always_denies() {
    let policy = AccessPolicy::default();
    for level in ALL_LEVELS {
      let cred = credential(level, false);
      for hour in 0..24 {
        let d = policy.evaluate(&cred, at_hour(hour));
        assert!(!d.granted);
        assert_eq!(d.reason, ReasonCode::InactiveCredential);
      }
    }
  }

  #[test]
  fn full_access_grants_at_any_hour() {
    let policy = AccessPolicy::default();
    let cred = credential(AccessLevel::Full, true);
    for hour in 0..24 {
      let d = policy.evaluate(&cred, at_hour(hour));
      assert!(d.granted);
      assert_eq!(d.reason, ReasonCode::FullAccessGranted);
      assert!(!d.escort_required);
    }
  }

  #[test]
  fn restricted_follows_business_hours() {
    let policy = AccessPolicy::default();
    let cred = credential(AccessLevel::Restricted, true);
    for hour in 0..24 {
      let d = policy.evaluate(&cred, at_hour(hour));
      assert_eq!(d.granted, (8..18).contains(&hour), "hour {hour}");
    }

    let open = policy.evaluate(&cred, at_hour(8));
    assert!(open.granted);
    assert_eq!(open.reason, ReasonCode::WithinBusinessHours);

    let closed = policy.evaluate(&cred, at_hour(18));
    assert!(!closed.granted);
    assert_eq!(closed.reason, ReasonCode::OutsideBusinessHours);

    let last_minute = Utc.with_ymd_and_hms(2024, 6, 3, 17, 59, 59).unwrap();
    assert!(policy.evaluate(&cred, last_minute).granted);
  }

  #[test]
  fn visitor_follows_visiting_hours_with_escort() {
    let policy = AccessPolicy::default();
    let cred = credential(AccessLevel::Visitor, true);
    for hour in 0..24 {
      let d = policy.evaluate(&cred, at_hour(hour));
      assert_eq!(d.granted, (9..17).contains(&hour), "hour {hour}");
      if d.granted {
        assert_eq!(d.reason, ReasonCode::VisitorEscortRequired);
        assert!(d.escort_required);
      } else {
        assert_eq!(d.reason, ReasonCode::OutsideVisitingHours);
        assert!(!d.escort_required);
      }
    }
    assert!(policy.evaluate(&cred, at_hour(9)).granted);
    assert!(!policy.evaluate(&cred, at_hour(17)).granted);
  }

  #[test]
  fn unrecognized_values_deny() {
    let policy = AccessPolicy::default();

    let level = credential(AccessLevel::Unrecognized("vip".into()), true);
    let d = policy.evaluate(&level, at_hour(12));
    assert!(!d.granted);
    assert_eq!(d.reason, ReasonCode::InvalidAccessLevel);

    let mut role = credential(AccessLevel::Full, true);
    role.role = Role::Unrecognized("contractor".into());
    let d = policy.evaluate(&role, at_hour(12));
    assert!(!d.granted);
    assert_eq!(d.reason, ReasonCode::InvalidRole);
  }

  #[test]
  fn evaluation_is_idempotent_and_stamps_the_instant() {
    let policy = AccessPolicy::default();
    let cred = credential(AccessLevel::Visitor, true);
    let now = at_hour(10);
    let first = policy.evaluate(&cred, now);
    for _ in 0..10 {
      assert_eq!(policy.evaluate(&cred, now), first);
    }
    assert_eq!(first.evaluated_at, now);
  }

  #[test]
  fn windows_use_facility_time() {
    // 14:00 UTC is 09:00 at UTC-5: restricted open, visitor open.
    // 13:00 UTC is 08:00 at UTC-5: restricted open, visitor still closed.
    let policy = AccessPolicy::new(FacilityClock::from_offset_minutes(-300).unwrap());
    let visitor = credential(AccessLevel::Visitor, true);
    assert!(policy.evaluate(&visitor, at_hour(14)).granted);
    assert!(!policy.evaluate(&visitor, at_hour(13)).granted);
    let restricted = credential(AccessLevel::Restricted, true);
    assert!(policy.evaluate(&restricted, at_hour(13)).granted);
  }

  #[test]
  fn empty_rule_table_denies() {
    let policy = AccessPolicy::with_rules(FacilityClock::utc(), Vec::new());
    let d = policy.evaluate(&credential(AccessLevel::Full, true), at_hour(12));
    assert!(!d.granted);
    assert_eq!(d.reason, ReasonCode::InvalidAccessLevel);
  }
}
