//! Operator command types

use bytes::Bytes;
use memsync_core::Depth;

/// A parsed operator command
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Command {
    pub kind: CommandKind,
    pub key: Option<String>,
}

/// All supported operator commands
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CommandKind {
    /// GET <key>
    Get,

    /// SET <key> <value>
    Set { value: Bytes },

    /// DEL <key>
    Delete,

    /// ENTRY <key>
    Entry,

    /// KEYS [pattern]
    Keys { pattern: Option<String> },

    /// LIST [folder] [RECURSIVE]
    List { depth: Depth },

    /// PEERS
    Peers,

    /// SYNC [key | folder/]
    Sync,

    /// INFO
    Info,

    /// PING
    Ping,

    /// QUIT
    Quit,
}

impl Command {
    fn keyed(kind: CommandKind, key: String) -> Self {
        Command {
            kind,
            key: Some(key),
        }
    }

    fn bare(kind: CommandKind) -> Self {
        Command { kind, key: None }
    }

    pub fn get(key: String) -> Self {
        Self::keyed(CommandKind::Get, key)
    }

    pub fn set(key: String, value: impl Into<Bytes>) -> Self {
        Self::keyed(
            CommandKind::Set {
                value: value.into(),
            },
            key,
        )
    }

    pub fn delete(key: String) -> Self {
        Self::keyed(CommandKind::Delete, key)
    }

    pub fn entry(key: String) -> Self {
        Self::keyed(CommandKind::Entry, key)
    }

    pub fn keys(pattern: Option<String>) -> Self {
        Self::bare(CommandKind::Keys { pattern })
    }

    pub fn peers() -> Self {
        Self::bare(CommandKind::Peers)
    }

    /// `folder` of `None` lists the root
    pub fn list(folder: Option<String>, depth: Depth) -> Self {
        Command {
            kind: CommandKind::List { depth },
            key: folder,
        }
    }

    /// `scope` limits the round to one key or folder
    pub fn sync(scope: Option<String>) -> Self {
        Command {
            kind: CommandKind::Sync,
            key: scope,
        }
    }

    pub fn info() -> Self {
        Self::bare(CommandKind::Info)
    }

    pub fn ping() -> Self {
        Self::bare(CommandKind::Ping)
    }

    pub fn quit() -> Self {
        Self::bare(CommandKind::Quit)
    }

    /// Upper-case name as typed by operators
    pub fn name(&self) -> &'static str {
        match self.kind {
            CommandKind::Get => "GET",
            CommandKind::Set { .. } => "SET",
            CommandKind::Delete => "DEL",
            CommandKind::Entry => "ENTRY",
            CommandKind::Keys { .. } => "KEYS",
            CommandKind::List { .. } => "LIST",
            CommandKind::Peers => "PEERS",
            CommandKind::Sync => "SYNC",
            CommandKind::Info => "INFO",
            CommandKind::Ping => "PING",
            CommandKind::Quit => "QUIT",
        }
    }
}
