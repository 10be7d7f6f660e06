//! Command line parsing shared by the registry server and the peer listener.

/// Control vocabulary of the registry server.
pub const REGISTER: &str = "register";
pub const UNREGISTER: &str = "unregister";
pub const LIST_FILES: &str = "list-files";
pub const LIST_USERS: &str = "list-users";
pub const DISCONNECT: &str = "disconnect";

/// Peer protocol vocabulary.
pub const DOWNLOAD: &str = "download";
pub const QUIT: &str = "quit";

/// A parsed command: first whitespace-separated token is the name, the rest
/// are arguments in order, verbatim.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Command {
    pub name: String,
    pub arguments: Vec<String>,
}

impl Command {
    /// Parse one line. Never fails; an empty line yields an empty name.
    pub fn parse(line: &str) -> Self {
        let mut tokens = line.split_whitespace().map(str::to_string);
        let name = tokens.next().unwrap_or_default();
        Self {
            name,
            arguments: tokens.collect(),
        }
    }

    /// Build a command with no arguments (e.g. a synthesized `disconnect`).
    pub fn bare(name: &str) -> Self {
        Self {
            name: name.to_string(),
            arguments: Vec::new(),
        }
    }
}
