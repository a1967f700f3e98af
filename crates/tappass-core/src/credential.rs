//! The badge record a user carries and a reader scans.
//!
//! Roles and access levels are closed enumerations. Values outside the known
//! set are kept verbatim in an `Unrecognized` arm rather than coerced to a
//! default, so the policy can deny them explicitly.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use strum::EnumString;
use uuid::Uuid;

use crate::{Error, Result};

// ─── Digital ID ──────────────────────────────────────────────────────────────

/// The opaque unique identifier printed on (or transmitted by) a badge.
///
/// Never parsed. The only structural requirement is that it is non-blank.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct DigitalId(String);

impl DigitalId {
  /// Normalise a candidate identifier from a scan or manual entry.
  ///
  /// Surrounding whitespace is stripped; a blank candidate is rejected.
  pub fn parse(candidate: &str) -> Result<Self> {
    let trimmed = candidate.trim();
    if trimmed.is_empty() {
      return Err(Error::EmptyDigitalId);
    }
    Ok(Self(trimmed.to_owned()))
  }

  /// Issue a fresh identifier for a newly registered credential.
  pub fn generate() -> Self { Self(Uuid::new_v4().hyphenated().to_string()) }

  pub fn as_str(&self) -> &str { &self.0 }
}

impl fmt::Display for DigitalId {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.write_str(&self.0)
  }
}

// ─── Role ────────────────────────────────────────────────────────────────────

/// The organisational role of the badge holder.
#[derive(Debug, Clone, PartialEq, Eq, Hash, EnumString, Serialize, Deserialize)]
#[strum(serialize_all = "lowercase")]
#[serde(from = "String", into = "String")]
pub enum Role {
  Admin,
  Employee,
  Student,
  Guest,
  /// A stored value outside the known set.
  #[strum(default)]
  Unrecognized(String),
}

impl Role {
  pub fn as_str(&self) -> &str {
    match self {
      Self::Admin => "admin",
      Self::Employee => "employee",
      Self::Student => "student",
      Self::Guest => "guest",
      Self::Unrecognized(raw) => raw,
    }
  }

  pub fn is_recognized(&self) -> bool { !matches!(self, Self::Unrecognized(_)) }
}

impl From<String> for Role {
  fn from(raw: String) -> Self {
    match raw.parse() {
      Ok(role) => role,
      Err(_) => Self::Unrecognized(raw),
    }
  }
}

impl From<Role> for String {
  fn from(role: Role) -> Self { role.as_str().to_owned() }
}

impl fmt::Display for Role {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.write_str(self.as_str())
  }
}

// ─── Access level ────────────────────────────────────────────────────────────

/// The policy tier that selects which time-window rule applies.
#[derive(Debug, Clone, PartialEq, Eq, Hash, EnumString, Serialize, Deserialize)]
#[strum(serialize_all = "lowercase")]
#[serde(from = "String", into = "String")]
pub enum AccessLevel {
  /// Unrestricted, at any hour.
  Full,
  /// Business hours only.
  Restricted,
  /// Visiting hours only, escort required.
  Visitor,
  #[strum(default)]
  Unrecognized(String),
}

impl AccessLevel {
  pub fn as_str(&self) -> &str {
    match self {
      Self::Full => "full",
      Self::Restricted => "restricted",
      Self::Visitor => "visitor",
      Self::Unrecognized(raw) => raw,
    }
  }
}

impl From<String> for AccessLevel {
  fn from(raw: String) -> Self {
    match raw.parse() {
      Ok(level) => level,
      Err(_) => Self::Unrecognized(raw),
    }
  }
}

impl From<AccessLevel> for String {
  fn from(level: AccessLevel) -> Self { level.as_str().to_owned() }
}

impl fmt::Display for AccessLevel {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.write_str(self.as_str())
  }
}

// ─── Credential ──────────────────────────────────────────────────────────────

/// A badge record identifying a person and their access tier.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Credential {
  /// The user account that owns this badge.
  pub user_id:      Uuid,
  pub digital_id:   DigitalId,
  pub full_name:    String,
  pub role:         Role,
  pub access_level: AccessLevel,
  pub department:   Option<String>,
  pub phone:        Option<String>,
  /// A deactivated credential always denies.
  pub is_active:    bool,
  pub created_at:   DateTime<Utc>,
}

impl Credential {
  /// The shareable payload encoded into a badge QR code.
  pub fn badge_card(&self, issued_at: DateTime<Utc>) -> BadgeCard {
    BadgeCard {
      digital_id: self.digital_id.clone(),
      full_name: self.full_name.clone(),
      role: self.role.clone(),
      access_level: self.access_level.clone(),
      is_active: self.is_active,
      issued_at,
    }
  }
}

/// Public view of a credential, safe to hand to anyone holding the badge.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BadgeCard {
  pub digital_id:   DigitalId,
  pub full_name:    String,
  pub role:         Role,
  pub access_level: AccessLevel,
  pub is_active:    bool,
  pub issued_at:    DateTime<Utc>,
}

// ─── NewCredential ───────────────────────────────────────────────────────────

/// Input to [`crate::store::CredentialStore::register`].
/// `created_at` is always set by the store.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewCredential {
  pub user_id:      Uuid,
  /// Issued by the store when absent.
  #[serde(default)]
  pub digital_id:   Option<DigitalId>,
  pub full_name:    String,
  pub role:         Role,
  pub access_level: AccessLevel,
  #[serde(default)]
  pub department:   Option<String>,
  #[serde(default)]
  pub phone:        Option<String>,
}

impl NewCredential {
  pub fn new(
    user_id: Uuid,
    full_name: impl Into<String>,
    role: Role,
    access_level: AccessLevel,
  ) -> Self {
    Self {
      user_id,
      digital_id: None,
      full_name: full_name.into(),
      role,
      access_level,
      department: None,
      phone: None,
    }
  }

  /// Check the fields a store must not accept, and fill in the digital ID.
  pub fn validate(mut self) -> Result<Self> {
    let name = self.full_name.trim();
    if name.is_empty() {
      return Err(Error::InvalidCredential("full name must not be empty".into()));
    }
    self.full_name = name.to_owned();
    if self.digital_id.is_none() {
      self.digital_id = Some(DigitalId::generate());
    }
    Ok(self)
  }
}
