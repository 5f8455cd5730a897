//! Organizational entities mirrored into the remote collaboration directory.
//!
//! Identifiers are the remote directory's own string identifiers.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use ts_rs::TS;

#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq, Default, TS)]
#[serde(rename_all = "lowercase")]
pub enum UserRole {
    #[default]
    Student,
    Teacher,
    Staff,
    Guest,
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq, TS)]
pub struct User {
    pub id: String,
    pub display_name: String,
    /// Sign-in name in the remote directory (unique).
    pub user_principal_name: String,
    #[serde(default)]
    pub department_id: Option<String>,
    #[serde(default)]
    pub role: UserRole,
    #[serde(default = "default_true")]
    pub active: bool,
    #[serde(default)]
    pub subject_ids: Vec<String>,
}

/// Attributes of a user that does not exist yet.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq, TS)]
pub struct NewUser {
    pub display_name: String,
    pub user_principal_name: String,
    pub department_id: String,
    #[serde(default)]
    pub role: UserRole,
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq, TS)]
pub struct Department {
    pub id: String,
    pub name: String,
}

#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq, Default, TS)]
#[serde(rename_all = "lowercase")]
pub enum TeamState {
    #[default]
    Active,
    Archived,
}

#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq, TS)]
#[serde(rename_all = "lowercase")]
pub enum MemberRole {
    Owner,
    Member,
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq, TS)]
pub struct Team {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub state: TeamState,
    #[serde(default)]
    pub school_year_id: Option<String>,
    #[serde(default)]
    pub department_id: Option<String>,
    #[serde(default)]
    pub owner_ids: Vec<String>,
    #[serde(default)]
    pub member_ids: Vec<String>,
}

impl Team {
    pub fn is_archived(&self) -> bool {
        self.state == TeamState::Archived
    }

    /// Owners and members, without duplicates, in insertion order.
    pub fn all_member_ids(&self) -> Vec<String> {
        let mut ids = self.owner_ids.clone();
        for id in &self.member_ids {
            if !ids.contains(id) {
                ids.push(id.clone());
            }
        }
        ids
    }
}

/// Template for a team created by a school-year transition.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq, TS)]
pub struct NewTeam {
    pub name: String,
    #[serde(default)]
    pub school_year_id: Option<String>,
    #[serde(default)]
    pub department_id: Option<String>,
    #[serde(default)]
    pub owner_ids: Vec<String>,
    #[serde(default)]
    pub member_ids: Vec<String>,
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq, TS)]
pub struct SchoolYear {
    pub id: String,
    pub name: String,
    #[ts(type = "string")]
    pub starts_on: NaiveDate,
    #[ts(type = "string")]
    pub ends_on: NaiveDate,
    #[serde(default)]
    pub active: bool,
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq, TS)]
pub struct NewSchoolYear {
    pub name: String,
    #[ts(type = "string")]
    pub starts_on: NaiveDate,
    #[ts(type = "string")]
    pub ends_on: NaiveDate,
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq, TS)]
pub struct Subject {
    pub id: String,
    pub name: String,
}

fn default_true() -> bool {
    true
}
