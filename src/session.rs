//! Chat sessions with an optional tool-selection phase.
//!
//! A turn with tools enabled runs in two phases. The tools model first gets
//! the merged tool catalog in a non-streamed call. Any calls it requests are
//! dispatched through the [`ToolOrchestrator`], and their results are folded
//! into the user prompt of a second, streamed call to the main (or vision)
//! model.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::error::Result;
use crate::history::{Conversation, ConversationStore, Exchange, RecordedToolCall};
use crate::mcp::client::DEFAULT_CONNECT_TIMEOUT;
use crate::mcp::translate::{invocation_requests, to_ollama_tools};
use crate::mcp::{
    ProviderConfigSource, StaticProviderConfig, ToolCallInfo, ToolInvocationResult,
    ToolOrchestrator,
};
use crate::notify::{Notice, NoticeLevel, NotificationSink, TracingSink};
use crate::ollama::{InferenceStream, OllamaClient};
use crate::types::{
    ChatMessage, Creativity, InferenceInput, InferenceOutput, InferenceRequest, ModelOptions,
};

pub const DEFAULT_HISTORY_WINDOW: usize = 10;

fn default_history_window() -> usize {
    DEFAULT_HISTORY_WINDOW
}

/// Per-chat model and tool choices.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ChatSettings {
    pub main_model: String,
    /// Model for the tool-selection call. Falls back to `main_model`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tools_model: Option<String>,
    /// Model used when a turn has images. Falls back to `main_model`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub vision_model: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub system: Option<String>,
    #[serde(default)]
    pub creativity: Creativity,
    /// Previous exchanges sent with each turn.
    #[serde(default = "default_history_window")]
    pub history_window: usize,
    #[serde(default)]
    pub use_tools: bool,
    /// Enabled MCP servers. `None` enables every configured server.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mcp_servers: Option<Vec<String>>,
}

impl ChatSettings {
    pub fn new(main_model: impl Into<String>) -> Self {
        Self {
            main_model: main_model.into(),
            tools_model: None,
            vision_model: None,
            system: None,
            creativity: Creativity::default(),
            history_window: DEFAULT_HISTORY_WINDOW,
            use_tools: false,
            mcp_servers: None,
        }
    }

    pub fn tools_model(&self) -> &str {
        self.tools_model.as_deref().unwrap_or(&self.main_model)
    }

    /// Model that answers a turn.
    pub fn answer_model(&self, has_images: bool) -> &str {
        match &self.vision_model {
            Some(vision) if has_images => vision,
            _ => &self.main_model,
        }
    }
}

/// What a started turn will record once its stream is drained.
#[derive(Debug, Clone, PartialEq)]
pub struct PendingExchange {
    pub prompt: String,
    pub model: String,
    pub images: usize,
    pub tool_calls: Vec<ToolCallInfo>,
    pub tool_results: Vec<ToolInvocationResult>,
}

/// A turn in progress.
///
/// Consume `stream`, then hand `pending` and the collected output to
/// [`ChatSession::complete_turn`].
#[derive(Debug)]
pub struct Turn {
    pub stream: InferenceStream,
    pub pending: PendingExchange,
}

struct ToolRound {
    calls: Vec<ToolCallInfo>,
    results: Vec<ToolInvocationResult>,
}

/// One conversation with the inference server and its tool providers.
///
/// The orchestrator is built lazily from the provider configuration on the
/// first turn that uses tools, and torn down by [`ChatSession::reconfigure_tools`].
pub struct ChatSession {
    client: OllamaClient,
    conversation: Conversation,
    provider_config: Arc<dyn ProviderConfigSource>,
    tool_connect_timeout: Duration,
    orchestrator: Option<ToolOrchestrator>,
    notifier: Arc<dyn NotificationSink>,
    store: Option<Arc<dyn ConversationStore>>,
}

impl ChatSession {
    pub fn new(client: OllamaClient, settings: ChatSettings) -> Self {
        Self::resume(client, Conversation::new(settings))
    }

    /// Continue a stored conversation.
    pub fn resume(client: OllamaClient, conversation: Conversation) -> Self {
        Self {
            client,
            conversation,
            provider_config: Arc::new(StaticProviderConfig::default()),
            tool_connect_timeout: DEFAULT_CONNECT_TIMEOUT,
            orchestrator: None,
            notifier: Arc::new(TracingSink),
            store: None,
        }
    }

    pub fn with_provider_config(mut self, source: Arc<dyn ProviderConfigSource>) -> Self {
        self.provider_config = source;
        self
    }

    pub fn with_tool_connect_timeout(mut self, timeout: Duration) -> Self {
        self.tool_connect_timeout = timeout;
        self
    }

    /// Use an already built orchestrator instead of the provider configuration.
    pub fn with_orchestrator(mut self, orchestrator: ToolOrchestrator) -> Self {
        self.orchestrator = Some(orchestrator);
        self
    }

    pub fn with_notifier(mut self, notifier: Arc<dyn NotificationSink>) -> Self {
        self.notifier = notifier;
        self
    }

    /// Save the conversation after every completed turn.
    pub fn with_store(mut self, store: Arc<dyn ConversationStore>) -> Self {
        self.store = Some(store);
        self
    }

    pub fn conversation(&self) -> &Conversation {
        &self.conversation
    }

    pub fn settings(&self) -> &ChatSettings {
        &self.conversation.settings
    }

    pub fn settings_mut(&mut self) -> &mut ChatSettings {
        &mut self.conversation.settings
    }

    pub fn client(&self) -> &OllamaClient {
        &self.client
    }

    pub fn has_orchestrator(&self) -> bool {
        self.orchestrator.is_some()
    }

    /// Drop every provider connection. The next tool turn rebuilds them
    /// from the provider configuration.
    pub async fn reconfigure_tools(&mut self) {
        if let Some(mut orchestrator) = self.orchestrator.take() {
            orchestrator.shutdown().await;
            info!("tool providers torn down");
        }
    }

    /// Replace the provider configuration and tear down current connections.
    pub async fn set_provider_config(&mut self, source: Arc<dyn ProviderConfigSource>) {
        self.provider_config = source;
        self.reconfigure_tools().await;
    }

    /// Start a turn and return its answer stream.
    ///
    /// Tool-phase problems (unreachable providers, a tools model that fails)
    /// are reported to the notification sink and the turn continues without
    /// tool results. Failures of the answering call are returned.
    pub async fn start_turn(
        &mut self,
        prompt: impl Into<String>,
        images: Vec<String>,
    ) -> Result<Turn> {
        let prompt = prompt.into();
        let settings = self.conversation.settings.clone();
        let model = settings.answer_model(!images.is_empty()).to_string();
        let mut messages = self.history_messages();

        let mut content = prompt.clone();
        let mut round = None;
        if settings.use_tools {
            round = self.tool_round(&settings, &messages, &prompt).await;
            if let Some(round) = &round {
                content = fold_tool_results(&prompt, &round.results);
            }
        }

        let image_count = images.len();
        messages.push(ChatMessage::user(content).with_images(images));
        let request = InferenceRequest::builder()
            .model(model.clone())
            .input(InferenceInput::Messages(messages))
            .options(ModelOptions::default().with_creativity(settings.creativity))
            .build();
        let stream = self.client.run_inference(&request).await?;

        let (tool_calls, tool_results) = round
            .map(|round| (round.calls, round.results))
            .unwrap_or_default();
        Ok(Turn {
            stream,
            pending: PendingExchange {
                prompt,
                model,
                images: image_count,
                tool_calls,
                tool_results,
            },
        })
    }

    /// Record a finished turn and save the conversation if a store is set.
    pub fn complete_turn(&mut self, pending: PendingExchange, output: &InferenceOutput) -> Result<()> {
        if output.done.context.is_some() {
            self.conversation.context = output.done.context.clone();
        }
        self.conversation.push(Exchange {
            prompt: pending.prompt,
            response: output.content.clone(),
            model: pending.model,
            images: pending.images,
            completed_at: Utc::now(),
            tool_calls: pending.tool_calls.iter().map(RecordedToolCall::from).collect(),
        });
        if let Some(store) = &self.store {
            store.save(&self.conversation)?;
        }
        Ok(())
    }

    /// Run a whole turn and return the collected answer.
    pub async fn send(
        &mut self,
        prompt: impl Into<String>,
        images: Vec<String>,
    ) -> Result<InferenceOutput> {
        let turn = self.start_turn(prompt, images).await?;
        let output = turn.stream.collect().await?;
        self.complete_turn(turn.pending, &output)?;
        Ok(output)
    }

    fn history_messages(&self) -> Vec<ChatMessage> {
        let settings = &self.conversation.settings;
        let mut messages = Vec::new();
        if let Some(system) = settings.system.as_deref().filter(|s| !s.is_empty()) {
            messages.push(ChatMessage::system(system));
        }
        for exchange in self.conversation.recent(settings.history_window) {
            messages.push(ChatMessage::user(&exchange.prompt));
            messages.push(ChatMessage::assistant(&exchange.response));
        }
        messages
    }

    async fn tool_round(
        &mut self,
        settings: &ChatSettings,
        history: &[ChatMessage],
        prompt: &str,
    ) -> Option<ToolRound> {
        if let Err(e) = self.ensure_orchestrator() {
            self.warn("Tools unavailable", e.to_string());
            return None;
        }
        let orchestrator = self.orchestrator.as_ref()?;

        let catalog = orchestrator
            .merged_tool_catalog_for(true, settings.mcp_servers.as_deref())
            .await;
        for failure in &catalog.failures {
            self.notifier.notify(Notice::warning(
                format!("Tool provider '{}' unavailable", failure.provider),
                failure.message.clone(),
            ));
        }
        if catalog.is_empty() {
            debug!("no tools available for this turn");
            return None;
        }

        let mut messages = history.to_vec();
        messages.push(ChatMessage::user(prompt));
        let request = InferenceRequest::builder()
            .model(settings.tools_model())
            .input(InferenceInput::Messages(messages))
            .options(ModelOptions::default().with_creativity(Creativity::None))
            .tools(to_ollama_tools(&catalog.tools))
            .build();
        let selection = match self.client.run_inference_sync(&request).await {
            Ok(output) => output,
            Err(e) => {
                self.notifier
                    .notify(Notice::from_failure(NoticeLevel::Warning, e.notice()));
                return None;
            }
        };

        let calls = selection.done.tool_calls;
        if calls.is_empty() {
            debug!(model = %settings.tools_model(), "tools model requested no calls");
            return None;
        }
        let requests = invocation_requests(&calls);
        let results = orchestrator.dispatch_calls(&requests).await;
        info!(
            calls = results.len(),
            failed = results.iter().filter(|r| !r.outcome.is_success()).count(),
            "tool calls dispatched"
        );
        Some(ToolRound {
            calls: orchestrator.tool_info(&calls),
            results,
        })
    }

    fn ensure_orchestrator(&mut self) -> Result<()> {
        if self.orchestrator.is_none() {
            let config = self.provider_config.load()?;
            self.orchestrator = Some(ToolOrchestrator::from_config(
                &config,
                self.tool_connect_timeout,
            )?);
        }
        Ok(())
    }

    fn warn(&self, title: &str, message: String) {
        self.notifier.notify(Notice::warning(title, message));
    }
}

impl std::fmt::Debug for ChatSession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ChatSession")
            .field("conversation", &self.conversation.id)
            .field("settings", &self.conversation.settings)
            .field("orchestrator", &self.orchestrator)
            .finish()
    }
}

/// Fold tool results into the user's prompt.
pub fn fold_tool_results(prompt: &str, results: &[ToolInvocationResult]) -> String {
    let mut folded = format!(
        "{prompt}\n\nAnswer using the tool results below as context. \
         Cite the tool each fact comes from as [provider/tool].\n"
    );
    for result in results {
        let source = match &result.provider {
            Some(provider) => format!("{provider}/{}", result.tool_name),
            None => result.tool_name.clone(),
        };
        folded.push_str(&format!("\n[{source}]\n{}\n", result.render()));
    }
    folded
}
