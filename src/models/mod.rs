mod chat;

pub use chat::{message_type, ArchivedChat, Conversation, Message, MessageSnapshot};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

// ─── STATE CONSTANTS ───────────────────────────────────────────────────────────

/// Availability states for a worker. `ASSIGNED` is the derived "occupied"
/// label; the rest can be set manually.
pub mod worker_state {
    pub const AVAILABLE: &str = "available";
    pub const ASSIGNED: &str = "assigned";
    pub const VACATION: &str = "vacation";
    pub const MEDICAL_LEAVE: &str = "medical_leave";
    pub const INACTIVE: &str = "inactive";
    pub const UNAVAILABLE: &str = "unavailable";

    /// States that block assignment to a crew.
    pub const NON_ASSIGNABLE: [&str; 3] = [VACATION, MEDICAL_LEAVE, UNAVAILABLE];

    /// States that only a manual override can hold; cleared back to
    /// automatic when the worker leaves a crew.
    pub const SPECIAL: [&str; 3] = [VACATION, MEDICAL_LEAVE, UNAVAILABLE];

    /// States an operator may set by hand. `assigned` is always derived.
    pub const MANUAL: [&str; 4] = [AVAILABLE, VACATION, MEDICAL_LEAVE, UNAVAILABLE];
}

pub mod worker_type {
    pub const WORKER: &str = "worker";
    pub const LEADER: &str = "leader";
    pub const CHIEF: &str = "chief";

    pub const ALL: [&str; 3] = [WORKER, LEADER, CHIEF];
}

pub mod request_status {
    pub const PENDING: &str = "pending";
    pub const ACCEPTED: &str = "accepted";
    pub const REJECTED: &str = "rejected";

    pub const ALL: [&str; 3] = [PENDING, ACCEPTED, REJECTED];
}

pub mod incident_severity {
    pub const LOW: &str = "low";
    pub const MEDIUM: &str = "medium";
    pub const HIGH: &str = "high";

    pub const ALL: [&str; 3] = [LOW, MEDIUM, HIGH];
}

// ─── CORE RECORDS ──────────────────────────────────────────────────────────────

/// A worker record. One authoritative `state` field plus `manual_override`;
/// the effective availability is resolved in `availability.rs`, never stored.
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct Worker {
    pub worker_id: String,
    /// Unique national id number, exactly 9 digits once cleaned.
    pub id_number: String,
    pub first_name: String,
    pub last_name: String,
    pub email: String,
    pub phone: Option<String>,
    pub address: Option<String>,
    pub worker_type: String,
    pub specialty: Option<String>,
    pub state: String,
    pub manual_override: bool,
    pub years_experience: i32,
    /// Login account backing this worker (see `Account`).
    pub user_id: String,
    /// Soft delete flag.
    pub active: bool,
    /// Set until the worker changes the generated first password.
    pub initial_password: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Worker {
    pub fn full_name(&self) -> String {
        format!("{} {}", self.first_name, self.last_name)
    }
}

/// Login identity for a worker. Join records (assignments, participants,
/// leadership) reference `user_id`, not the worker row.
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct Account {
    pub user_id: String,
    pub username: String,
    pub password: String,
    pub email: String,
    pub display_name: String,
    /// Mirrors the worker type for permission checks.
    pub role: String,
    pub active: bool,
}

/// A crew, optionally attached to a project and led by one account.
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct Crew {
    pub crew_id: String,
    pub name: String,
    pub project_id: Option<String>,
    pub leader_id: Option<String>,
    pub created_at: DateTime<Utc>,
}

/// Join record binding one worker (by account id) to one crew.
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct Assignment {
    pub assignment_id: String,
    pub worker_id: String,
    pub crew_id: String,
    pub role: Option<String>,
    pub created_at: DateTime<Utc>,
}

/// Role label applied to an assignment ("mason", "electrician", ...).
/// Seeded idempotently at provisioning time.
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct RoleLabel {
    pub role_id: String,
    pub name: String,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct Project {
    pub project_id: String,
    pub name: String,
    pub description: String,
    pub kind: String,
    pub complexity: String,
    pub start_date: DateTime<Utc>,
    pub end_date: Option<DateTime<Utc>>,
    pub chief_id: String,
    /// Flipping to false is the "finalized" transition: crews are released
    /// and their conversations archived.
    pub active: bool,
    pub created_at: DateTime<Utc>,
}

pub mod project_kind {
    pub const CONSTRUCTION: &str = "construction";
    pub const MAINTENANCE: &str = "maintenance";
    pub const INSTALLATION: &str = "installation";
    pub const OTHER: &str = "other";

    pub const ALL: [&str; 4] = [CONSTRUCTION, MAINTENANCE, INSTALLATION, OTHER];
}

pub mod project_complexity {
    pub const LOW: &str = "low";
    pub const MEDIUM: &str = "medium";
    pub const HIGH: &str = "high";

    pub const ALL: [&str; 3] = [LOW, MEDIUM, HIGH];
}

/// Internal system notification for one user.
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct Notification {
    pub notification_id: String,
    pub user_id: String,
    pub message: String,
    pub read: bool,
    pub created_at: DateTime<Utc>,
}

/// A request raised by a worker towards their leadership (crew change,
/// leave, HR matters).
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct WorkerRequest {
    pub request_id: String,
    pub worker_id: String,
    pub crew_id: Option<String>,
    pub subject: String,
    pub description: String,
    pub status: String,
    pub created_at: DateTime<Utc>,
}

/// Field incident reported by personnel.
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct IncidentNotice {
    pub incident_id: String,
    pub crew_id: Option<String>,
    pub reporter_id: Option<String>,
    pub description: String,
    pub severity: String,
    pub acknowledged: bool,
    pub created_at: DateTime<Utc>,
}

// ─── VALIDATION ────────────────────────────────────────────────────────────────

/// Strips separators from an id number; the remainder is used as the login
/// username.
pub fn clean_id_number(raw: &str) -> String {
    raw.chars().filter(|c| c.is_ascii_digit()).collect()
}

/// An id number is valid when it contains exactly 9 digits and nothing but
/// digits, dots and a dash.
pub fn valid_id_number(raw: &str) -> bool {
    let shape = regex::Regex::new(r"^[0-9.\-]+$").expect("static pattern");
    shape.is_match(raw) && clean_id_number(raw).len() == 9
}

pub fn valid_email(raw: &str) -> bool {
    let shape = regex::Regex::new(r"^[^@\s]+@[^@\s]+\.[^@\s]+$").expect("static pattern");
    shape.is_match(raw)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn id_number_requires_nine_digits() {
        assert!(valid_id_number("123456789"));
        assert!(valid_id_number("12.345.678-9"));
        assert!(!valid_id_number("12345678"));
        assert!(!valid_id_number("1234567890"));
        assert!(!valid_id_number("12345678X"));
        assert!(!valid_id_number(""));
    }

    #[test]
    fn clean_id_number_strips_separators() {
        assert_eq!(clean_id_number("12.345.678-9"), "123456789");
        assert_eq!(clean_id_number("123456789"), "123456789");
    }

    #[test]
    fn email_shape() {
        assert!(valid_email("worker@example.com"));
        assert!(!valid_email("worker@example"));
        assert!(!valid_email("not-an-email"));
        assert!(!valid_email("two words@example.com"));
    }
}
