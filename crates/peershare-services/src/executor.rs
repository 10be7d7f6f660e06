//! Command executor: interprets control commands against the registry.
//!
//! Every command validates its arguments completely before touching the
//! store, and a successful mutation only ever touches one identity's entry.

use std::collections::HashSet;

use peershare_core::command::{DISCONNECT, LIST_FILES, LIST_USERS, REGISTER, UNREGISTER};
use peershare_core::{Command, PeerError, Response, UserIdentity};

use crate::store::{Registry, SessionId};

/// Message for `list-files` on an empty registry.
pub const EMPTY_LISTING: &str = "[]";

/// Stateless dispatcher over the five registry commands. Holds only a handle
/// to the shared registry, so one instance can be cloned into every
/// connection task.
#[derive(Clone)]
pub struct CommandExecutor {
    registry: Registry,
}

impl CommandExecutor {
    pub fn new(registry: Registry) -> Self {
        Self { registry }
    }

    pub fn registry(&self) -> &Registry {
        &self.registry
    }

    /// Execute `command` on behalf of `session`.
    pub fn execute(&self, session: SessionId, command: &Command) -> Response {
        let result = match command.name.as_str() {
            REGISTER => self.register(session, &command.arguments),
            UNREGISTER => self.unregister(&command.arguments),
            LIST_FILES => self.list_files(&command.arguments),
            LIST_USERS => self.list_users(&command.arguments),
            DISCONNECT => self.disconnect(session, &command.arguments),
            other => Err(PeerError::Validation(format!("Unknown command {other:?}"))),
        };

        match result {
            Ok(message) => Response::ok(message),
            Err(e) => {
                tracing::debug!(session, command = %command.name, error = %e, "command rejected");
                Response::error(e.to_string())
            }
        }
    }

    fn register(&self, session: SessionId, args: &[String]) -> Result<String, PeerError> {
        expect_at_least(REGISTER, args, 2)?;
        let user: UserIdentity = args[0].parse()?;

        // Claim first: a refused claim must leave the file table untouched.
        self.registry
            .sessions
            .add_values(session, &user)
            .map_err(|e| PeerError::Validation(e.to_string()))?;
        self.registry
            .files
            .add_values(&user, args[1..].iter().cloned());

        tracing::info!(session, user = %user, files = args.len() - 1, "registered files");
        Ok(format!(
            "Files are successfully registered for downloading for user: {user}"
        ))
    }

    fn unregister(&self, args: &[String]) -> Result<String, PeerError> {
        expect_at_least(UNREGISTER, args, 2)?;
        let user: UserIdentity = args[0].parse()?;
        if !self.registry.files.contains(&user) {
            return Err(PeerError::NotFound(format!("User {user} does not exist")));
        }

        self.registry.files.remove_values(&user, &args[1..]);

        tracing::info!(user = %user, files = args.len() - 1, "unregistered files");
        Ok(format!(
            "Files are successfully unregistered for downloading from user: {user}"
        ))
    }

    fn list_files(&self, args: &[String]) -> Result<String, PeerError> {
        expect_none(LIST_FILES, args)?;
        let entries = self.registry.files.snapshot();
        if entries.is_empty() {
            return Ok(EMPTY_LISTING.to_string());
        }
        let lines: Vec<String> = entries
            .iter()
            .map(|(user, files)| format!("{user} : {}", format_file_set(files)))
            .collect();
        Ok(lines.join("\n"))
    }

    fn list_users(&self, args: &[String]) -> Result<String, PeerError> {
        expect_none(LIST_USERS, args)?;
        let lines: Vec<String> = self
            .registry
            .files
            .keys()
            .iter()
            .map(ToString::to_string)
            .collect();
        Ok(lines.join("\n"))
    }

    fn disconnect(&self, session: SessionId, args: &[String]) -> Result<String, PeerError> {
        expect_none(DISCONNECT, args)?;
        let files = &self.registry.files;
        let user = self
            .registry
            .sessions
            .remove_with(session, |user| {
                files.remove(user);
            })
            .ok_or_else(|| PeerError::NotFound("no identity bound to this session".to_string()))?;

        tracing::info!(session, user = %user, "session terminated");
        Ok(format!("{user}'s session has been terminated!"))
    }
}

fn expect_at_least(command: &str, args: &[String], min: usize) -> Result<(), PeerError> {
    if args.len() < min {
        return Err(PeerError::Validation(format!(
            "Invalid count of arguments: \"{command}\" expects at least {min} arguments."
        )));
    }
    Ok(())
}

fn expect_none(command: &str, args: &[String]) -> Result<(), PeerError> {
    if !args.is_empty() {
        return Err(PeerError::Validation(format!(
            "{command} command does not require any arguments."
        )));
    }
    Ok(())
}

/// `[a, b, c]`, sorted so listings are deterministic.
fn format_file_set(files: &HashSet<String>) -> String {
    let mut sorted: Vec<&str> = files.iter().map(String::as_str).collect();
    sorted.sort_unstable();
    format!("[{}]", sorted.join(", "))
}
