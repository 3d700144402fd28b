//! Roles and capability checks.
//!
//! Authentication happens outside this crate; operations receive an
//! already-resolved [`Actor`]. Every operation entry point calls
//! [`authorize`] exactly once with the capability it needs, before touching
//! storage.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use wastetrack_storage::{ActorId, BarangayId, ParseEnumError};

use crate::error::TrackingError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    Admin,
    /// Member of a collection team.
    Collector,
    /// Barangay representative; registers and sorts items for one barangay.
    Barangay,
}

impl Role {
    pub fn as_str(self) -> &'static str {
        match self {
            Role::Admin => "admin",
            Role::Collector => "collector",
            Role::Barangay => "barangay",
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Role {
    type Err = ParseEnumError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "admin" => Ok(Role::Admin),
            "collector" | "collection_team" => Ok(Role::Collector),
            "barangay" => Ok(Role::Barangay),
            _ => Err(ParseEnumError {
                kind: "role",
                value: s.to_string(),
            }),
        }
    }
}

/// The authenticated user performing an operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Actor {
    pub id: ActorId,
    pub role: Role,
    /// Assigned barangay. Required for barangay representatives.
    pub barangay_id: Option<BarangayId>,
}

impl Actor {
    pub fn admin(id: ActorId) -> Self {
        Self {
            id,
            role: Role::Admin,
            barangay_id: None,
        }
    }

    pub fn collector(id: ActorId) -> Self {
        Self {
            id,
            role: Role::Collector,
            barangay_id: None,
        }
    }

    pub fn barangay(id: ActorId, barangay_id: BarangayId) -> Self {
        Self {
            id,
            role: Role::Barangay,
            barangay_id: Some(barangay_id),
        }
    }

    /// The only barangay this actor may see, or `None` for unrestricted actors.
    pub fn barangay_scope(&self) -> Option<BarangayId> {
        match self.role {
            Role::Barangay => self.barangay_id,
            Role::Admin | Role::Collector => None,
        }
    }
}

/// What an operation needs the actor to be allowed to do.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Capability {
    /// Register a new item in a barangay.
    Register { barangay_id: BarangayId },
    /// Mark an item sorted or unsorted.
    Sort { creator: Option<ActorId> },
    /// Attest that an item was picked up.
    Collect,
    /// Attest, as the beneficiary, that pickup occurred.
    Confirm { creator: Option<ActorId> },
    /// Set an arbitrary downstream status.
    AdvanceStatus,
    /// Report one's own device position.
    ReportPresence,
    /// See live collector positions for a barangay.
    ViewPresence { barangay_id: BarangayId },
    /// Read items and aggregates of a barangay.
    ViewBarangay { barangay_id: BarangayId },
    /// Read the cross-barangay pending collection queue.
    ViewQueue,
}

/// Check that `actor` holds `capability`.
pub fn authorize(actor: &Actor, capability: Capability) -> Result<(), TrackingError> {
    let is_creator = |creator: Option<ActorId>| creator == Some(actor.id);
    let own_barangay = |barangay_id: BarangayId| actor.barangay_id == Some(barangay_id);

    let allowed = match (capability, actor.role) {
        (_, Role::Admin) => true,

        (Capability::Register { barangay_id }, Role::Barangay) => own_barangay(barangay_id),
        (Capability::Register { .. }, Role::Collector) => false,

        (Capability::Sort { .. }, Role::Collector) => true,
        (Capability::Sort { creator }, Role::Barangay) => is_creator(creator),

        (Capability::Collect | Capability::AdvanceStatus, Role::Collector) => true,
        (Capability::Collect | Capability::AdvanceStatus, Role::Barangay) => false,

        (Capability::Confirm { creator }, _) => is_creator(creator),

        (Capability::ReportPresence, Role::Collector) => true,
        (Capability::ReportPresence, Role::Barangay) => false,

        (Capability::ViewPresence { barangay_id }, Role::Barangay) => own_barangay(barangay_id),
        (Capability::ViewPresence { .. }, Role::Collector) => false,

        (Capability::ViewBarangay { .. }, Role::Collector) => true,
        (Capability::ViewBarangay { barangay_id }, Role::Barangay) => own_barangay(barangay_id),

        (Capability::ViewQueue, Role::Collector) => true,
        (Capability::ViewQueue, Role::Barangay) => false,
    };

    if allowed {
        Ok(())
    } else {
        tracing::debug!(actor_id = actor.id, role = %actor.role, ?capability, "permission denied");
        Err(TrackingError::permission(denial_message(capability)))
    }
}

fn denial_message(capability: Capability) -> String {
    match capability {
        Capability::Register { barangay_id } => {
            format!("Not allowed to register items for barangay {barangay_id}")
        }
        Capability::Sort { .. } => {
            "Only the item's creator, collection teams, or admins may change sorting".into()
        }
        Capability::Collect => "Only collection teams may mark items collected".into(),
        Capability::Confirm { .. } => {
            "Only the item's creator or an admin may confirm collection".into()
        }
        Capability::AdvanceStatus => "Only collection teams may update item status".into(),
        Capability::ReportPresence => "Only collectors may report their location".into(),
        Capability::ViewPresence { barangay_id } => {
            format!("Not allowed to view collectors for barangay {barangay_id}")
        }
        Capability::ViewBarangay { barangay_id } => {
            format!("Not allowed to view barangay {barangay_id}")
        }
        Capability::ViewQueue => "Only collection teams may view the collection queue".into(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn admin_holds_every_capability() {
        let admin = Actor::admin(1);
        for cap in [
            Capability::Register { barangay_id: 9 },
            Capability::Confirm { creator: Some(42) },
            Capability::ViewPresence { barangay_id: 9 },
            Capability::ReportPresence,
            Capability::ViewQueue,
        ] {
            assert!(authorize(&admin, cap).is_ok(), "{cap:?}");
        }
    }

    #[test]
    fn confirmation_requires_creator() {
        let rep = Actor::barangay(5, 1);
        assert!(authorize(&rep, Capability::Confirm { creator: Some(5) }).is_ok());
        assert!(authorize(&rep, Capability::Confirm { creator: Some(6) }).is_err());
        assert!(authorize(&rep, Capability::Confirm { creator: None }).is_err());

        let collector = Actor::collector(5);
        let err = authorize(&collector, Capability::Confirm { creator: Some(6) }).unwrap_err();
        assert!(matches!(err, TrackingError::Permission(_)));
    }

    #[test]
    fn barangay_scope_is_own_barangay() {
        let rep = Actor::barangay(5, 1);
        assert!(authorize(&rep, Capability::ViewPresence { barangay_id: 1 }).is_ok());
        assert!(authorize(&rep, Capability::ViewPresence { barangay_id: 2 }).is_err());
        assert!(authorize(&rep, Capability::Register { barangay_id: 2 }).is_err());
        let crew = Actor::collector(7);
        assert!(authorize(&crew, Capability::ViewPresence { barangay_id: 1 }).is_err());
    }

    #[test]
    fn roles_parse_legacy_names() {
        assert_eq!("collection_team".parse::<Role>(), Ok(Role::Collector));
        assert_eq!(" Admin ".parse::<Role>(), Ok(Role::Admin));
        assert!("citizen".parse::<Role>().is_err());
    }
}
