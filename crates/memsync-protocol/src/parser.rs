//! Operator command parser

use crate::command::Command;
use crate::error::{ProtocolError, ProtocolResult};
use bytes::BytesMut;
use memsync_core::{Depth, FolderPath, Key, KeyPath};

/// Maximum command line size (1MB)
const MAX_MESSAGE_SIZE: usize = 1024 * 1024;

/// Incremental line parser for operator commands
pub struct Parser {
    buffer: BytesMut,
}

impl Parser {
    pub fn new() -> Self {
        Self {
            buffer: BytesMut::with_capacity(4096),
        }
    }

    /// Add data to the parser buffer
    pub fn feed(&mut self, data: &[u8]) -> ProtocolResult<()> {
        if self.buffer.len() + data.len() > MAX_MESSAGE_SIZE {
            return Err(ProtocolError::MessageTooLarge {
                size: self.buffer.len() + data.len(),
                max: MAX_MESSAGE_SIZE,
            });
        }
        self.buffer.extend_from_slice(data);
        Ok(())
    }

    /// Try to parse a complete command from the buffer
    ///
    /// Returns `Ok(None)` until a full line has been fed. A bad line is
    /// consumed even when it fails to parse.
    pub fn parse(&mut self) -> ProtocolResult<Option<Command>> {
        let line_end = match self.buffer.iter().position(|&b| b == b'\n') {
            Some(pos) => pos,
            None => return Ok(None),
        };

        let line_len = if line_end > 0 && self.buffer[line_end - 1] == b'\r' {
            line_end - 1
        } else {
            line_end
        };

        let line = String::from_utf8_lossy(&self.buffer[..line_len]).to_string();
        let _ = self.buffer.split_to(line_end + 1);

        Self::parse_line(&line).map(Some)
    }

    /// Parse a single command line
    pub fn parse_line(line: &str) -> ProtocolResult<Command> {
        let line = line.trim();
        if line.is_empty() {
            return Err(ProtocolError::InvalidCommand("Empty command".into()));
        }

        let mut tokens = Tokenizer::new(line);
        let cmd = tokens
            .next()
            .ok_or_else(|| ProtocolError::InvalidCommand("Empty command".into()))?
            .to_uppercase();

        let command = match cmd.as_str() {
            "GET" => Command::get(Self::parse_key(&mut tokens)?),
            "SET" => Self::parse_set(&mut tokens)?,
            "DEL" | "DELETE" => Command::delete(Self::parse_key(&mut tokens)?),
            "ENTRY" => Command::entry(Self::parse_key(&mut tokens)?),
            "KEYS" => Command::keys(tokens.next().map(|s| s.to_string())),
            "PEERS" => Command::peers(),
            "LIST" => Self::parse_list(&mut tokens)?,
            "SYNC" => Command::sync(Self::parse_scope(&mut tokens)?),
            "INFO" => Command::info(),
            "PING" => Command::ping(),
            "QUIT" | "EXIT" => Command::quit(),
            _ => {
                return Err(ProtocolError::InvalidCommand(format!(
                    "Unknown command: {}",
                    cmd
                )))
            }
        };

        Self::expect_end(&mut tokens, &command)?;
        Ok(command)
    }

    fn parse_key(tokens: &mut Tokenizer) -> ProtocolResult<String> {
        let key = tokens
            .next()
            .ok_or_else(|| ProtocolError::MissingArgument("key".into()))?;
        Key::try_from(key)?;
        Ok(key.to_string())
    }

    fn parse_set(tokens: &mut Tokenizer) -> ProtocolResult<Command> {
        let key = Self::parse_key(tokens)?;
        let value = tokens
            .rest()
            .ok_or_else(|| ProtocolError::MissingArgument("value".into()))?;

        Ok(Command::set(key, unquote(value).to_string()))
    }

    fn parse_list(tokens: &mut Tokenizer) -> ProtocolResult<Command> {
        let mut folder = None;
        let mut depth = Depth::Simple;

        for token in [tokens.next(), tokens.next()].into_iter().flatten() {
            if token.eq_ignore_ascii_case("RECURSIVE") {
                depth = Depth::Recursive;
            } else if folder.is_none() {
                FolderPath::parse(token)?;
                folder = Some(token.to_string());
            } else {
                return Err(ProtocolError::InvalidArgument(format!(
                    "Unexpected argument for LIST: {}",
                    token
                )));
            }
        }

        Ok(Command::list(folder, depth))
    }

    fn parse_scope(tokens: &mut Tokenizer) -> ProtocolResult<Option<String>> {
        match tokens.next() {
            Some(scope) => {
                KeyPath::parse(scope)?;
                Ok(Some(scope.to_string()))
            }
            None => Ok(None),
        }
    }

    fn expect_end(tokens: &mut Tokenizer, command: &Command) -> ProtocolResult<()> {
        match tokens.next() {
            Some(extra) => Err(ProtocolError::InvalidArgument(format!(
                "Unexpected argument for {}: {}",
                command.name(),
                extra
            ))),
            None => Ok(()),
        }
    }
}

impl Default for Parser {
    fn default() -> Self {
        Self::new()
    }
}

/// Strip one pair of surrounding double quotes
fn unquote(value: &str) -> &str {
    value
        .strip_prefix('"')
        .and_then(|v| v.strip_suffix('"'))
        .unwrap_or(value)
}

/// Simple tokenizer that handles quoted strings
struct Tokenizer<'a> {
    input: &'a str,
    pos: usize,
}

impl<'a> Tokenizer<'a> {
    fn new(input: &'a str) -> Self {
        Self { input, pos: 0 }
    }

    fn skip_whitespace(&mut self) {
        while self.pos < self.input.len() && self.input[self.pos..].starts_with(' ') {
            self.pos += 1;
        }
    }

    fn next(&mut self) -> Option<&'a str> {
        self.skip_whitespace();

        if self.pos >= self.input.len() {
            return None;
        }

        let remaining = &self.input[self.pos..];

        if let Some(quoted) = remaining.strip_prefix('"') {
            if let Some(end) = quoted.find('"') {
                self.pos += end + 2;
                return Some(&quoted[..end]);
            }
        }

        let end = remaining.find(' ').unwrap_or(remaining.len());
        self.pos += end;

        Some(&remaining[..end])
    }

    /// Everything after the current position, verbatim
    fn rest(&mut self) -> Option<&'a str> {
        self.skip_whitespace();

        if self.pos >= self.input.len() {
            return None;
        }

        let remaining = &self.input[self.pos..];
        self.pos = self.input.len();
        Some(remaining)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::command::CommandKind;
    use bytes::Bytes;

    fn parse(line: &[u8]) -> ProtocolResult<Command> {
        let mut parser = Parser::new();
        parser.feed(line).unwrap();
        parser.parse().map(|cmd| cmd.unwrap())
    }

    #[test]
    fn test_parse_get() {
        let cmd = parse(b"GET user:123\r\n").unwrap();
        assert_eq!(cmd.kind, CommandKind::Get);
        assert_eq!(cmd.key, Some("user:123".to_string()));
    }

    #[test]
    fn test_parse_set() {
        let cmd = parse(b"SET greeting hello world\r\n").unwrap();
        assert_eq!(cmd.key.as_deref(), Some("greeting"));
        assert_eq!(
            cmd.kind,
            CommandKind::Set {
                value: Bytes::from("hello world")
            }
        );
    }

    #[test]
    fn test_parse_set_quoted() {
        let cmd = parse(b"set \"my key\" \"Alice\"\n").unwrap();
        assert_eq!(cmd.key.as_deref(), Some("my key"));
        assert_eq!(
            cmd.kind,
            CommandKind::Set {
                value: Bytes::from("Alice")
            }
        );
    }

    #[test]
    fn test_parse_set_json_kept_verbatim() {
        let cmd = parse(b"SET user:1 {\"age\": 30}\r\n").unwrap();
        assert_eq!(
            cmd.kind,
            CommandKind::Set {
                value: Bytes::from("{\"age\": 30}")
            }
        );
    }

    #[test]
    fn test_parse_delete_aliases() {
        assert_eq!(parse(b"DEL k\r\n").unwrap().kind, CommandKind::Delete);
        assert_eq!(parse(b"DELETE k\r\n").unwrap().kind, CommandKind::Delete);
    }

    #[test]
    fn test_parse_keys_optional_pattern() {
        assert_eq!(
            parse(b"KEYS\r\n").unwrap().kind,
            CommandKind::Keys { pattern: None }
        );
        assert_eq!(
            parse(b"KEYS user:*\r\n").unwrap().kind,
            CommandKind::Keys {
                pattern: Some("user:*".into())
            }
        );
    }

    #[test]
    fn test_parse_bare_commands() {
        assert_eq!(parse(b"PING\r\n").unwrap().kind, CommandKind::Ping);
        assert_eq!(parse(b"peers\r\n").unwrap().kind, CommandKind::Peers);
        assert_eq!(parse(b"SYNC\r\n").unwrap(), Command::sync(None));
        assert_eq!(parse(b"INFO\r\n").unwrap().kind, CommandKind::Info);
        assert_eq!(parse(b"QUIT\r\n").unwrap().kind, CommandKind::Quit);
    }

    #[test]
    fn test_errors() {
        assert!(matches!(
            parse(b"GET\r\n"),
            Err(ProtocolError::MissingArgument(_))
        ));
        assert!(matches!(
            parse(b"SET k\r\n"),
            Err(ProtocolError::MissingArgument(_))
        ));
        assert!(matches!(
            parse(b"FLY away\r\n"),
            Err(ProtocolError::InvalidCommand(_))
        ));
        assert!(matches!(
            parse(b"PING extra\r\n"),
            Err(ProtocolError::InvalidArgument(_))
        ));

        let long_key = format!("GET {}\r\n", "k".repeat(600));
        let err = parse(long_key.as_bytes()).unwrap_err();
        assert_eq!(err.code(), "INVALID_KEY");
    }

    #[test]
    fn test_incomplete_command() {
        let mut parser = Parser::new();
        parser.feed(b"GET user:123").unwrap();

        assert!(parser.parse().unwrap().is_none());

        parser.feed(b"\r\nPING\r\n").unwrap();
        assert!(parser.parse().unwrap().is_some());
        assert_eq!(parser.parse().unwrap().unwrap().kind, CommandKind::Ping);
        assert!(parser.parse().unwrap().is_none());
    }

    #[test]
    fn test_oversized_input_rejected() {
        let mut parser = Parser::new();
        let chunk = vec![b'a'; MAX_MESSAGE_SIZE];
        parser.feed(&chunk).unwrap();
        assert!(matches!(
            parser.feed(b"b"),
            Err(ProtocolError::MessageTooLarge { .. })
        ));
    }

    #[test]
    fn test_parse_scoped_sync() {
        assert_eq!(
            parse(b"SYNC folder/\r\n").unwrap(),
            Command::sync(Some("folder/".into()))
        );
        assert_eq!(
            parse(b"SYNC folder/item1\r\n").unwrap().key.as_deref(),
            Some("folder/item1")
        );
        assert!(parse(b"SYNC a//b/\r\n").is_err());
    }

    #[test]
    fn test_parse_list() {
        assert_eq!(parse(b"LIST\r\n").unwrap(), Command::list(None, Depth::Simple));
        assert_eq!(
            parse(b"LIST folder RECURSIVE\r\n").unwrap(),
            Command::list(Some("folder".into()), Depth::Recursive)
        );
        assert_eq!(
            parse(b"list recursive\r\n").unwrap(),
            Command::list(None, Depth::Recursive)
        );
        assert!(parse(b"LIST a b\r\n").is_err());
        assert!(parse(b"LIST a RECURSIVE extra\r\n").is_err());
    }
}
