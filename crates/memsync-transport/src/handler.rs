//! Connection handler - executes operator commands against the store

use crate::session::SessionRegistry;
use memsync_core::{Depth, FolderPath, Key, KeyPath, Store};
use memsync_protocol::{Command, CommandKind, Parser, ProtocolError, Response};
use std::sync::Arc;
use tracing::{debug, warn};

/// Message acknowledging `QUIT`; servers close the connection after it
pub const GOODBYE: &str = "Goodbye";

/// Handles a single operator connection
pub struct CommandHandler {
    /// Unique client ID
    pub client_id: String,
    store: Arc<Store>,
    sessions: Arc<SessionRegistry>,
    parser: Parser,
}

impl CommandHandler {
    pub fn new(client_id: String, store: Arc<Store>, sessions: Arc<SessionRegistry>) -> Self {
        Self {
            client_id,
            store,
            sessions,
            parser: Parser::new(),
        }
    }

    /// Process incoming data and return responses
    pub async fn process(&mut self, data: &[u8]) -> Vec<Response> {
        let mut responses = Vec::new();

        if let Err(e) = self.parser.feed(data) {
            responses.push(e.into());
            return responses;
        }

        loop {
            match self.parser.parse() {
                Ok(Some(cmd)) => {
                    let response = self.handle_command(cmd).await;
                    responses.push(response);
                }
                Ok(None) => break,
                Err(e) => {
                    debug!(client = %self.client_id, error = %e, "Rejected command line");
                    responses.push(e.into());
                }
            }
        }

        responses
    }

    /// Handle a single command
    pub async fn handle_command(&self, cmd: Command) -> Response {
        debug!(client = %self.client_id, cmd = cmd.name(), key = ?cmd.key, "Processing command");

        match (cmd.kind, cmd.key) {
            (CommandKind::Get, Some(key)) => self.handle_get(key).await,
            (CommandKind::Set { value }, Some(key)) => self.handle_set(key, value).await,
            (CommandKind::Delete, Some(key)) => self.handle_delete(key).await,
            (CommandKind::Entry, Some(key)) => self.handle_entry(key),
            (CommandKind::Keys { pattern }, _) => self.handle_keys(pattern),
            (CommandKind::Peers, _) => Response::json(&self.sessions.summaries()),
            (CommandKind::List { depth }, folder) => self.handle_list(folder, depth),
            (CommandKind::Sync, Some(scope)) => self.handle_scoped_sync(scope),
            (CommandKind::Sync, None) => Response::integer(self.sessions.sync_all() as i64),
            (CommandKind::Info, _) => self.handle_info(),
            (CommandKind::Ping, _) => Response::pong(),
            (CommandKind::Quit, _) => Response::ok_with_message(GOODBYE),
            (_, None) => Response::from(ProtocolError::MissingArgument("key".into())),
        }
    }

    async fn handle_get(&self, key: String) -> Response {
        match self.store.read(key).await {
            Some(payload) => Response::bulk(payload.to_vec()),
            None => Response::null(),
        }
    }

    async fn handle_set(&self, key: String, value: bytes::Bytes) -> Response {
        match self.store.insert(key, value).await {
            Ok(stamp) => Response::stamped(stamp),
            Err(e) => self.store_error(e),
        }
    }

    async fn handle_delete(&self, key: String) -> Response {
        match self.store.delete(key).await {
            Ok(stamp) => Response::stamped(stamp),
            Err(e) => self.store_error(e),
        }
    }

    fn handle_entry(&self, key: String) -> Response {
        match self.store.entry(key) {
            Some(value) => Response::json(&serde_json::json!({
                "stamp": value.stamp(),
                "tombstone": value.is_tombstone(),
                "size": value.payload().len(),
            })),
            None => Response::null(),
        }
    }

    fn handle_keys(&self, pattern: Option<String>) -> Response {
        let mut keys = self.store.keys(pattern.as_deref());
        keys.sort();
        key_array(keys)
    }

    fn handle_list(&self, folder: Option<String>, depth: Depth) -> Response {
        match folder.map_or(Ok(FolderPath::root()), |f| FolderPath::parse(f)) {
            Ok(folder) => key_array(self.store.list(&folder, depth)),
            Err(e) => ProtocolError::from(e).into(),
        }
    }

    fn handle_scoped_sync(&self, scope: String) -> Response {
        match KeyPath::parse(scope) {
            Ok(scope) => Response::integer(self.sessions.sync_scope_all(&scope) as i64),
            Err(e) => ProtocolError::from(e).into(),
        }
    }

    fn handle_info(&self) -> Response {
        Response::json(&serde_json::json!({
            "version": env!("CARGO_PKG_VERSION"),
            "client_id": self.client_id,
            "store": self.store.stats(),
            "cursors": self.store.cursors().snapshot(),
            "sessions": self.sessions.len(),
        }))
    }

    fn store_error(&self, e: memsync_core::Error) -> Response {
        warn!(client = %self.client_id, error = %e, "Write failed");
        ProtocolError::from(e).into()
    }
}

fn key_array(keys: Vec<Key>) -> Response {
    Response::array(
        keys.into_iter()
            .map(|key| Response::bulk(key.as_bytes().to_vec()))
            .collect(),
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    fn handler() -> (CommandHandler, Arc<Store>) {
        let store = Arc::new(Store::new());
        let handler = CommandHandler::new(
            "test".into(),
            store.clone(),
            Arc::new(SessionRegistry::new()),
        );
        (handler, store)
    }

    #[tokio::test]
    async fn test_set_then_get() {
        let (mut handler, store) = handler();

        let responses = handler.process(b"GET test\r\nSET test present\r\nGET test\r\n").await;
        assert_eq!(responses.len(), 3);
        assert_eq!(responses[0], Response::null());
        assert!(matches!(responses[1], Response::Ok(Some(_))));
        assert_eq!(responses[2], Response::bulk(b"present".to_vec()));
        assert_eq!(store.read("test").await, Some(bytes::Bytes::from("present")));
    }

    #[tokio::test]
    async fn test_delete_leaves_entry_visible() {
        let (mut handler, _) = handler();

        handler.process(b"SET k v\r\nDEL k\r\n").await;
        let responses = handler.process(b"GET k\r\nENTRY k\r\nKEYS\r\n").await;

        assert_eq!(responses[0], Response::null());
        match &responses[1] {
            Response::Bulk(json) => {
                let entry: serde_json::Value = serde_json::from_slice(json).unwrap();
                assert_eq!(entry["tombstone"], true);
                assert_eq!(entry["size"], 0);
            }
            other => panic!("unexpected response {:?}", other),
        }
        assert_eq!(responses[2], Response::array(vec![]));
    }

    #[tokio::test]
    async fn test_errors_do_not_stop_processing() {
        let (mut handler, _) = handler();

        let responses = handler.process(b"BOGUS\r\nPING\r\n").await;
        assert_eq!(responses.len(), 2);
        assert!(matches!(responses[0], Response::Error { ref code, .. } if code == "INVALID_CMD"));
        assert_eq!(responses[1], Response::pong());
    }

    #[tokio::test]
    async fn test_partial_lines_are_buffered() {
        let (mut handler, _) = handler();

        assert!(handler.process(b"PI").await.is_empty());
        assert_eq!(handler.process(b"NG\r\n").await, vec![Response::pong()]);
    }

    #[tokio::test]
    async fn test_keys_sorted_and_filtered() {
        let (mut handler, _) = handler();
        handler.process(b"SET user:2 b\r\nSET user:1 a\r\nSET cart:1 c\r\n").await;

        let responses = handler.process(b"KEYS user:*\r\n").await;
        assert_eq!(
            responses[0],
            Response::array(vec![
                Response::bulk(b"user:1".to_vec()),
                Response::bulk(b"user:2".to_vec()),
            ])
        );
    }

    #[tokio::test]
    async fn test_info_and_sync_without_sessions() {
        let (mut handler, _) = handler();
        let responses = handler.process(b"SYNC\r\nINFO\r\nQUIT\r\n").await;

        assert_eq!(responses[0], Response::integer(0));
        match &responses[1] {
            Response::Bulk(json) => {
                let info: serde_json::Value = serde_json::from_slice(json).unwrap();
                assert_eq!(info["sessions"], 0);
                assert_eq!(info["store"]["live_entries"], 0);
            }
            other => panic!("unexpected response {:?}", other),
        }
        assert_eq!(responses[2], Response::ok_with_message(GOODBYE));
    }

    #[tokio::test]
    async fn test_list_by_folder() {
        let (mut handler, _) = handler();
        handler
            .process(b"SET folder/item2 b\r\nSET folder/item1 a\r\nSET folder/sub/x c\r\nSET top t\r\n")
            .await;

        let responses = handler.process(b"LIST folder\r\nLIST folder RECURSIVE\r\nLIST\r\n").await;
        assert_eq!(
            responses[0],
            Response::array(vec![
                Response::bulk(b"folder/item1".to_vec()),
                Response::bulk(b"folder/item2".to_vec()),
            ])
        );
        match &responses[1] {
            Response::Array(items) => assert_eq!(items.len(), 3),
            other => panic!("unexpected response {:?}", other),
        }
        assert_eq!(responses[2], Response::array(vec![Response::bulk(b"top".to_vec())]));
    }

    #[tokio::test]
    async fn test_scoped_sync_without_sessions() {
        let (mut handler, _) = handler();
        let responses = handler.process(b"SYNC folder/\r\n").await;
        assert_eq!(responses[0], Response::integer(0));
    }
}
