use std::fmt;

use mongodb::{
    bson::{self, doc, Document},
    error::ErrorKind,
    Database,
};
use thiserror::Error;

use crate::config::Config;
use crate::db;
use crate::models::principal::{plan_user_action, PrincipalInfo, RoleGrant, UserAction};

// Server error codes the bootstrap steps care about.
const UNAUTHORIZED: i32 = 13;
const AUTHENTICATION_FAILED: i32 = 18;
const NAMESPACE_EXISTS: i32 = 48;
const USER_ALREADY_EXISTS: i32 = 51003;

/// Which bootstrap step an error came from. Every surfaced error names one,
/// so an operator can tell from the log line alone how far the run got.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Step {
    Authenticate,
    EnsureUser,
    EnsureCollection,
}

impl fmt::Display for Step {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Step::Authenticate => write!(f, "authenticating against the admin database"),
            Step::EnsureUser => write!(f, "ensuring the application user"),
            Step::EnsureCollection => write!(f, "ensuring the collection"),
        }
    }
}

#[derive(Debug, Error)]
pub enum BootstrapError {
    #[error("server unreachable while {step}: {message}")]
    Connection { step: Step, message: String },
    #[error("administrative credential rejected while {step}")]
    Authentication { step: Step },
    #[error("administrative credential lacks privileges while {step}")]
    Permission { step: Step },
    #[error("user '{username}' already exists with different role grants")]
    GrantConflict { username: String },
    #[error("server error while {step}: {message}")]
    Server { step: Step, message: String },
}

/// Translate a driver error into the bootstrap taxonomy. Command failures
/// are classified by server code; anything that never reached the server
/// (I/O, server selection) is a connection failure.
fn classify(step: Step, err: mongodb::error::Error) -> BootstrapError {
    match err.kind.as_ref() {
        ErrorKind::Command(cmd) => classify_code(step, cmd.code, &cmd.message),
        ErrorKind::Io(_) | ErrorKind::ServerSelection { .. } => BootstrapError::Connection {
            step,
            message: err.to_string(),
        },
        _ => BootstrapError::Server {
            step,
            message: err.to_string(),
        },
    }
}

fn classify_code(step: Step, code: i32, message: &str) -> BootstrapError {
    match code {
        UNAUTHORIZED => BootstrapError::Permission { step },
        AUTHENTICATION_FAILED => BootstrapError::Authentication { step },
        _ => BootstrapError::Server {
            step,
            message: message.to_string(),
        },
    }
}

fn command_error_code(err: &mongodb::error::Error) -> Option<i32> {
    match err.kind.as_ref() {
        ErrorKind::Command(cmd) => Some(cmd.code),
        _ => None,
    }
}

/// Run the full bootstrap sequence: authenticate, ensure the application
/// user, ensure the collection. Strictly linear; the first failure aborts
/// the rest. Each step is idempotent, so a partial run is safe to repeat.
pub async fn run(config: &Config) -> Result<(), BootstrapError> {
    let client = db::connect(&config.uri, &config.admin_username, &config.admin_password)
        .await
        .map_err(|e| classify(Step::Authenticate, e))?;
    log::info!(
        "authenticated as '{}' against {}",
        config.admin_username,
        config.uri
    );

    let database = client.database(&config.target_db);
    ensure_user(&database, config).await?;
    ensure_collection(&database, &config.collection).await?;

    Ok(())
}

/// Ensure the application principal exists with exactly one grant:
/// readWrite on the target database. An identical pre-existing principal is
/// a no-op; a differing one is a conflict and is never reconciled.
async fn ensure_user(database: &Database, config: &Config) -> Result<(), BootstrapError> {
    let grant = RoleGrant::read_write(&config.target_db);

    let reply = database
        .run_command(doc! { "usersInfo": &config.app_username }, None)
        .await
        .map_err(|e| classify(Step::EnsureUser, e))?;
    let existing = parse_users_info(&reply);

    match plan_user_action(existing.as_ref(), &grant) {
        UserAction::Skip => {
            log::info!(
                "user '{}' already has readWrite on '{}', leaving it untouched",
                config.app_username,
                config.target_db
            );
            Ok(())
        }
        UserAction::Conflict => {
            if let Some(info) = existing.as_ref() {
                log::warn!(
                    "user '{}' in '{}' currently has grants {:?}, wanted only readWrite on '{}'",
                    info.username,
                    info.db,
                    info.roles,
                    config.target_db
                );
            }
            Err(BootstrapError::GrantConflict {
                username: config.app_username.clone(),
            })
        }
        UserAction::Create => {
            let create = doc! {
                "createUser": &config.app_username,
                "pwd": &config.app_password,
                "roles": [ { "role": &grant.role, "db": &grant.db } ],
            };
            match database.run_command(create, None).await {
                Ok(_) => {
                    log::info!(
                        "created user '{}' with readWrite on '{}'",
                        config.app_username,
                        config.target_db
                    );
                    Ok(())
                }
                // The user appeared between usersInfo and createUser; its
                // grants are unknown, so treat it as a conflict rather than
                // assume they match.
                Err(e) if command_error_code(&e) == Some(USER_ALREADY_EXISTS) => {
                    Err(BootstrapError::GrantConflict {
                        username: config.app_username.clone(),
                    })
                }
                Err(e) => Err(classify(Step::EnsureUser, e)),
            }
        }
    }
}

/// Ensure the named collection exists, with no options. A schema-less
/// collection carries nothing that can conflict, so existence alone is
/// always a no-op success.
async fn ensure_collection(database: &Database, name: &str) -> Result<(), BootstrapError> {
    let existing = database
        .list_collection_names(doc! { "name": name })
        .await
        .map_err(|e| classify(Step::EnsureCollection, e))?;
    if existing.iter().any(|c| c == name) {
        log::info!("collection '{}' already exists, leaving it untouched", name);
        return Ok(());
    }

    match database.create_collection(name, None).await {
        Ok(()) => {
            log::info!("created collection '{}'", name);
            Ok(())
        }
        // Created concurrently since the listing; same end state.
        Err(e) if command_error_code(&e) == Some(NAMESPACE_EXISTS) => {
            log::info!("collection '{}' already exists, leaving it untouched", name);
            Ok(())
        }
        Err(e) => Err(classify(Step::EnsureCollection, e)),
    }
}

/// Pull the first (and only, since we query by name) principal out of a
/// usersInfo reply. An empty users array means the principal is absent.
fn parse_users_info(reply: &Document) -> Option<PrincipalInfo> {
    let users = reply.get_array("users").ok()?;
    let user = users.first()?.as_document()?;
    bson::from_document(user.clone()).ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn users_info_reply_with_a_match_is_parsed() {
        let reply = doc! {
            "users": [ {
                "_id": "files.user",
                "user": "user",
                "db": "files",
                "roles": [ { "role": "readWrite", "db": "files" } ],
            } ],
            "ok": 1.0,
        };
        let info = parse_users_info(&reply).unwrap();
        assert_eq!(info.username, "user");
        assert_eq!(info.db, "files");
        assert_eq!(info.roles, vec![RoleGrant::read_write("files")]);
    }

    #[test]
    fn empty_users_array_means_absent() {
        let reply = doc! { "users": [], "ok": 1.0 };
        assert!(parse_users_info(&reply).is_none());
    }

    #[test]
    fn reply_without_users_field_means_absent() {
        let reply = doc! { "ok": 1.0 };
        assert!(parse_users_info(&reply).is_none());
    }

    #[test]
    fn unauthorized_code_maps_to_permission() {
        let err = classify_code(Step::EnsureUser, UNAUTHORIZED, "not authorized");
        assert!(matches!(
            err,
            BootstrapError::Permission {
                step: Step::EnsureUser
            }
        ));
    }

    #[test]
    fn auth_failed_code_maps_to_authentication() {
        let err = classify_code(Step::Authenticate, AUTHENTICATION_FAILED, "auth failed");
        assert!(matches!(
            err,
            BootstrapError::Authentication {
                step: Step::Authenticate
            }
        ));
    }

    #[test]
    fn other_codes_map_to_server_with_the_message() {
        let err = classify_code(Step::EnsureCollection, 8000, "something else");
        match err {
            BootstrapError::Server { step, message } => {
                assert_eq!(step, Step::EnsureCollection);
                assert_eq!(message, "something else");
            }
            other => panic!("expected Server, got {:?}", other),
        }
    }

    #[test]
    fn io_errors_classify_as_connection() {
        let io = std::io::Error::new(std::io::ErrorKind::ConnectionRefused, "refused");
        let err = classify(Step::Authenticate, mongodb::error::Error::from(io));
        assert!(matches!(err, BootstrapError::Connection { .. }));
    }

    #[test]
    fn errors_name_the_failing_step() {
        let err = BootstrapError::Permission {
            step: Step::EnsureCollection,
        };
        assert_eq!(
            err.to_string(),
            "administrative credential lacks privileges while ensuring the collection"
        );
    }
}
