use serde::{Deserialize, Serialize};

/// A (permission-level, database-scope) pair attached to a principal.
/// The bootstrapper only ever grants one of these: readWrite on the
/// target database.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RoleGrant {
    pub role: String,
    pub db: String,
}

impl RoleGrant {
    pub fn read_write(db: &str) -> Self {
        RoleGrant {
            role: "readWrite".to_string(),
            db: db.to_string(),
        }
    }
}

/// A principal as reported by the server's usersInfo command.
#[derive(Debug, Deserialize)]
pub struct PrincipalInfo {
    #[serde(rename = "user")]
    pub username: String,
    pub db: String,
    #[serde(default)]
    pub roles: Vec<RoleGrant>,
}

/// What the ensure-user step should do given the server's current state.
#[derive(Debug, PartialEq, Eq)]
pub enum UserAction {
    Create,
    Skip,
    Conflict,
}

/// Decide between creating the principal, accepting it as already correct,
/// or rejecting the run. A pre-existing principal is only acceptable when it
/// carries exactly the requested grant and nothing else; anything wider or
/// narrower is a conflict, never silently reconciled.
pub fn plan_user_action(existing: Option<&PrincipalInfo>, grant: &RoleGrant) -> UserAction {
    match existing {
        None => UserAction::Create,
        Some(info) if info.roles.len() == 1 && info.roles[0] == *grant => UserAction::Skip,
        Some(_) => UserAction::Conflict,
    }
}
