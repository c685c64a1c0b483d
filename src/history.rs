//! Persisted conversations.

use std::fs;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::debug;
use uuid::Uuid;

use crate::config::ParleyConfig;
use crate::error::{ParleyError, Result};
use crate::mcp::ToolCallInfo;
use crate::session::ChatSettings;

/// A tool call as recorded in history.
///
/// Arguments are kept as JSON text so arbitrary values (including `null`)
/// survive the TOML round trip.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RecordedToolCall {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub provider: Option<String>,
    pub tool_name: String,
    pub arguments: String,
}

impl From<&ToolCallInfo> for RecordedToolCall {
    fn from(info: &ToolCallInfo) -> Self {
        Self {
            provider: info.provider.clone(),
            tool_name: info.tool_name.clone(),
            arguments: info.arguments.to_string(),
        }
    }
}

/// One prompt and the answer it got.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Exchange {
    pub prompt: String,
    pub response: String,
    pub model: String,
    #[serde(default)]
    pub images: usize,
    pub completed_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tool_calls: Vec<RecordedToolCall>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Conversation {
    pub id: Uuid,
    pub title: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    /// Continuation context of the last completion, when the server sent one.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub context: Option<Vec<i64>>,
    pub settings: ChatSettings,
    #[serde(default)]
    pub exchanges: Vec<Exchange>,
}

impl Conversation {
    pub fn new(settings: ChatSettings) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            title: String::new(),
            created_at: now,
            updated_at: now,
            context: None,
            settings,
            exchanges: Vec::new(),
        }
    }

    /// The newest `window` exchanges, oldest first.
    pub fn recent(&self, window: usize) -> &[Exchange] {
        let start = self.exchanges.len().saturating_sub(window);
        &self.exchanges[start..]
    }

    /// Append an exchange. The first prompt titles an untitled conversation.
    pub fn push(&mut self, exchange: Exchange) {
        if self.title.is_empty() {
            self.title = title_from(&exchange.prompt);
        }
        self.updated_at = exchange.completed_at;
        self.exchanges.push(exchange);
    }
}

fn title_from(prompt: &str) -> String {
    const MAX_TITLE_CHARS: usize = 60;
    let line = prompt.lines().next().unwrap_or_default().trim();
    if line.chars().count() <= MAX_TITLE_CHARS {
        return line.to_string();
    }
    let mut title: String = line.chars().take(MAX_TITLE_CHARS).collect();
    title.push('…');
    title
}

/// Storage for conversations.
pub trait ConversationStore: Send + Sync {
    fn load(&self, id: Uuid) -> Result<Option<Conversation>>;
    fn save(&self, conversation: &Conversation) -> Result<()>;
    fn delete(&self, id: Uuid) -> Result<()>;
    /// Ids of stored conversations, most recently updated first.
    fn list(&self) -> Result<Vec<Uuid>>;
}

/// One TOML file per conversation.
#[derive(Debug, Clone)]
pub struct FileConversationStore {
    base_dir: PathBuf,
}

impl FileConversationStore {
    pub fn new(base_dir: impl Into<PathBuf>) -> Self {
        Self {
            base_dir: base_dir.into(),
        }
    }

    pub fn from_config(config: &ParleyConfig) -> Self {
        Self::new(config.history_path())
    }

    pub fn base_dir(&self) -> &Path {
        &self.base_dir
    }

    fn conversation_path(&self, id: Uuid) -> PathBuf {
        self.base_dir.join(format!("{id}.toml"))
    }
}

#[derive(Debug, Serialize, Deserialize)]
struct ConversationFile {
    version: u32,
    conversation: Conversation,
}

const FILE_VERSION: u32 = 1;

impl ConversationStore for FileConversationStore {
    fn load(&self, id: Uuid) -> Result<Option<Conversation>> {
        let path = self.conversation_path(id);
        let raw = match fs::read_to_string(&path) {
            Ok(data) => data,
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(err) => return Err(err.into()),
        };
        let file: ConversationFile = toml::from_str(&raw).map_err(|e| {
            ParleyError::Configuration(format!("invalid conversation file {}: {e}", path.display()))
        })?;
        Ok(Some(file.conversation))
    }

    fn save(&self, conversation: &Conversation) -> Result<()> {
        fs::create_dir_all(&self.base_dir)?;
        let file = ConversationFile {
            version: FILE_VERSION,
            conversation: conversation.clone(),
        };
        let serialized = toml::to_string(&file)
            .map_err(|e| ParleyError::Configuration(format!("cannot store conversation: {e}")))?;
        let path = self.conversation_path(conversation.id);
        fs::write(&path, serialized)?;
        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            fs::set_permissions(&path, fs::Permissions::from_mode(0o600))?;
        }
        debug!(id = %conversation.id, exchanges = conversation.exchanges.len(), "conversation saved");
        Ok(())
    }

    fn delete(&self, id: Uuid) -> Result<()> {
        match fs::remove_file(self.conversation_path(id)) {
            Ok(()) => Ok(()),
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(err) => Err(err.into()),
        }
    }

    fn list(&self) -> Result<Vec<Uuid>> {
        let entries = match fs::read_dir(&self.base_dir) {
            Ok(entries) => entries,
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(err) => return Err(err.into()),
        };
        let mut found = Vec::new();
        for entry in entries {
            let path = entry?.path();
            if path.extension().and_then(|e| e.to_str()) != Some("toml") {
                continue;
            }
            let Some(id) = path
                .file_stem()
                .and_then(|s| s.to_str())
                .and_then(|s| Uuid::parse_str(s).ok())
            else {
                continue;
            };
            if let Some(conversation) = self.load(id)? {
                found.push((conversation.updated_at, id));
            }
        }
        found.sort_by(|a, b| b.0.cmp(&a.0));
        Ok(found.into_iter().map(|(_, id)| id).collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;
    use pretty_assertions::assert_eq;
    use serde_json::json;
    use tempfile::TempDir;

    fn exchange(prompt: &str, at: DateTime<Utc>) -> Exchange {
        Exchange {
            prompt: prompt.into(),
            response: format!("re: {prompt}"),
            model: "llama3".into(),
            images: 0,
            completed_at: at,
            tool_calls: Vec::new(),
        }
    }

    #[test]
    fn recent_returns_the_newest_window() {
        let mut conversation = Conversation::new(ChatSettings::new("llama3"));
        let now = Utc::now();
        for i in 0..5 {
            conversation.push(exchange(&format!("q{i}"), now));
        }
        let prompts: Vec<_> = conversation.recent(2).iter().map(|e| e.prompt.as_str()).collect();
        assert_eq!(prompts, vec!["q3", "q4"]);
        assert_eq!(conversation.recent(50).len(), 5);
        assert_eq!(conversation.title, "q0");
    }

    #[test]
    fn long_first_prompt_is_truncated_into_title() {
        let mut conversation = Conversation::new(ChatSettings::new("llama3"));
        conversation.push(exchange(&"x".repeat(100), Utc::now()));
        assert_eq!(conversation.title.chars().count(), 61);
        assert!(conversation.title.ends_with('…'));
    }

    #[test]
    fn file_store_round_trips_tool_calls_with_null_arguments() {
        let dir = TempDir::new().unwrap();
        let store = FileConversationStore::new(dir.path().join("chats"));

        let mut conversation = Conversation::new(ChatSettings::new("llama3"));
        let mut first = exchange("weather?", Utc::now());
        first.tool_calls.push(RecordedToolCall::from(&ToolCallInfo {
            provider: Some("web".into()),
            tool_name: "search".into(),
            arguments: json!({"q": "weather", "page": null}),
        }));
        conversation.push(first);
        conversation.context = Some(vec![1, 2, 3]);
        store.save(&conversation).unwrap();

        let loaded = store.load(conversation.id).unwrap().unwrap();
        assert_eq!(loaded, conversation);
        assert_eq!(
            serde_json::from_str::<serde_json::Value>(&loaded.exchanges[0].tool_calls[0].arguments)
                .unwrap(),
            json!({"q": "weather", "page": null})
        );
    }

    #[test]
    fn list_orders_by_update_and_delete_is_idempotent() {
        let dir = TempDir::new().unwrap();
        let store = FileConversationStore::new(dir.path());
        assert!(store.list().unwrap().is_empty());

        let now = Utc::now();
        let mut older = Conversation::new(ChatSettings::new("llama3"));
        older.push(exchange("old", now - Duration::hours(1)));
        let mut newer = Conversation::new(ChatSettings::new("llama3"));
        newer.push(exchange("new", now));
        store.save(&older).unwrap();
        store.save(&newer).unwrap();

        assert_eq!(store.list().unwrap(), vec![newer.id, older.id]);

        store.delete(older.id).unwrap();
        store.delete(older.id).unwrap();
        assert_eq!(store.list().unwrap(), vec![newer.id]);
        assert!(store.load(older.id).unwrap().is_none());
    }
}
