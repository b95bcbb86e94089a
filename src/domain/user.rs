use serde::{Deserialize, Serialize};
use std::str::FromStr;

use crate::normalize;

/// Closed set of role tags carried in access tokens
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum UserRole {
    Admin,
    Manager,
    User,
}

impl UserRole {
    pub fn as_str(&self) -> &'static str {
        match self {
            UserRole::Admin => "ADMIN",
            UserRole::Manager => "MANAGER",
            UserRole::User => "USER",
        }
    }
}

impl FromStr for UserRole {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "ADMIN" => Ok(UserRole::Admin),
            "MANAGER" => Ok(UserRole::Manager),
            "USER" => Ok(UserRole::User),
            other => Err(format!("unknown role: {}", other)),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum UserStatus {
    Active,
    Inactive,
    Suspended,
    PendingVerification,
}

impl UserStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            UserStatus::Active => "ACTIVE",
            UserStatus::Inactive => "INACTIVE",
            UserStatus::Suspended => "SUSPENDED",
            UserStatus::PendingVerification => "PENDING_VERIFICATION",
        }
    }
}

impl FromStr for UserStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "ACTIVE" => Ok(UserStatus::Active),
            "INACTIVE" => Ok(UserStatus::Inactive),
            "SUSPENDED" => Ok(UserStatus::Suspended),
            "PENDING_VERIFICATION" => Ok(UserStatus::PendingVerification),
            other => Err(format!("unknown status: {}", other)),
        }
    }
}

/// Read-only snapshot of a user, as supplied by the user store
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserIdentity {
    pub id: i64,
    pub username: String,
    pub email: String,
    pub first_name: Option<String>,
    pub last_name: Option<String>,
    pub role: UserRole,
    pub status: UserStatus,
}

impl UserIdentity {
    /// Build a snapshot with normalized fields: username and email
    /// lowercased, names title-cased. Blank names become `None`.
    pub fn new(
        id: i64,
        username: &str,
        email: &str,
        first_name: Option<&str>,
        last_name: Option<&str>,
        role: UserRole,
        status: UserStatus,
    ) -> Self {
        let name = |value: Option<&str>| {
            value
                .map(normalize::title_case)
                .filter(|n| !n.is_empty())
        };

        Self {
            id,
            username: normalize::lowercase(username),
            email: normalize::lowercase(email),
            first_name: name(first_name),
            last_name: name(last_name),
            role,
            status,
        }
    }

    pub fn is_active(&self) -> bool {
        self.status == UserStatus::Active
    }
}
