use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// Staff roles. Every clinic user holds exactly one.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum StaffRole {
    Admin,
    Doctor,
    Nurse,
    Lab,
    Pharmacy,
    Billing,
    Accounting,
    FrontDesk,
}

impl StaffRole {
    pub const ALL: [StaffRole; 8] = [
        StaffRole::Admin,
        StaffRole::Doctor,
        StaffRole::Nurse,
        StaffRole::Lab,
        StaffRole::Pharmacy,
        StaffRole::Billing,
        StaffRole::Accounting,
        StaffRole::FrontDesk,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            StaffRole::Admin => "ADMIN",
            StaffRole::Doctor => "DOCTOR",
            StaffRole::Nurse => "NURSE",
            StaffRole::Lab => "LAB",
            StaffRole::Pharmacy => "PHARMACY",
            StaffRole::Billing => "BILLING",
            StaffRole::Accounting => "ACCOUNTING",
            StaffRole::FrontDesk => "FRONT_DESK",
        }
    }

    pub fn is_admin(&self) -> bool {
        matches!(self, StaffRole::Admin)
    }

    /// Roles allowed to touch money: invoices, payments, insurance.
    pub fn is_finance(&self) -> bool {
        matches!(self, StaffRole::Billing | StaffRole::Accounting | StaffRole::Admin)
    }
}

impl fmt::Display for StaffRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("Unknown staff role: {0}")]
pub struct UnknownRole(pub String);

impl FromStr for StaffRole {
    type Err = UnknownRole;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let normalized = s.trim().to_ascii_uppercase().replace(['-', ' '], "_");
        StaffRole::ALL
            .iter()
            .copied()
            .find(|role| role.as_str() == normalized)
            .ok_or_else(|| UnknownRole(s.to_string()))
    }
}
