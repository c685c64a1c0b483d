//! Command line front end.

use std::io::{BufRead, Write};
use std::path::PathBuf;
use std::sync::Arc;

use clap::{Parser, Subcommand};
use futures::StreamExt;
use uuid::Uuid;

use crate::config::ParleyConfig;
use crate::error::{ParleyError, Result};
use crate::history::{ConversationStore, FileConversationStore};
use crate::mcp::{
    FileProviderConfigSource, McpServersConfig, ProviderConfigSource, ToolOrchestrator,
};
use crate::ollama::OllamaClient;
use crate::session::{ChatSession, ChatSettings};
use crate::types::{
    Creativity, ImageAttachment, InferenceEvent, InferenceInput, InferenceOutput,
    InferenceRequest, ModelOptions,
};

/// Chat with local Ollama models and MCP tools.
#[derive(Parser, Debug)]
#[command(name = "parley", version, about = "Ollama chat client with MCP tools")]
pub struct Cli {
    /// Settings file (TOML). Defaults to ~/.parley/config.toml.
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    /// Named Ollama server from the settings file.
    #[arg(long, global = true)]
    pub server: Option<String>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Chat, optionally with tools. Reads prompts from stdin without a prompt argument.
    Chat(ChatArgs),
    /// One-shot completion on the generate endpoint
    Generate(GenerateArgs),
    /// List installed models
    Models,
    /// List models loaded in memory
    Ps,
    /// Unload a model from memory
    Unload(UnloadArgs),
    /// Show the server version
    Version,
    /// Manage MCP servers
    Tools(ToolsArgs),
}

#[derive(Parser, Debug)]
pub struct ChatArgs {
    #[arg(short, long)]
    pub model: String,

    /// Model for choosing tools
    #[arg(long)]
    pub tools_model: Option<String>,

    /// Model for prompts with images
    #[arg(long)]
    pub vision_model: Option<String>,

    #[arg(short, long)]
    pub system: Option<String>,

    /// none, low, medium, high or maximum
    #[arg(long, default_value = "medium")]
    pub creativity: Creativity,

    /// Let the model call MCP tools
    #[arg(long)]
    pub tools: bool,

    /// Only use these MCP servers (repeatable)
    #[arg(long = "mcp-server")]
    pub mcp_servers: Vec<String>,

    /// PNG or JPEG file or http(s) URL to attach (repeatable)
    #[arg(long = "image")]
    pub images: Vec<String>,

    /// Continue a saved conversation
    #[arg(long)]
    pub resume: Option<Uuid>,

    pub prompt: Option<String>,
}

#[derive(Parser, Debug)]
pub struct GenerateArgs {
    #[arg(short, long)]
    pub model: String,

    #[arg(short, long)]
    pub system: Option<String>,

    #[arg(long, default_value = "medium")]
    pub creativity: Creativity,

    pub prompt: String,
}

#[derive(Parser, Debug)]
pub struct UnloadArgs {
    pub model: String,
}

#[derive(Parser, Debug)]
pub struct ToolsArgs {
    #[command(subcommand)]
    pub command: ToolsCommands,
}

#[derive(Subcommand, Debug)]
pub enum ToolsCommands {
    /// List configured servers and their tools
    List,
    /// Merge an `mcpServers` JSON file into the configuration
    Add { file: PathBuf },
    /// Remove a configured server
    Remove { name: String },
}

/// Run a parsed command line.
pub async fn run(cli: Cli) -> Result<()> {
    let config = load_config(cli.config.as_deref())?;
    let client = match &cli.server {
        Some(name) => OllamaClient::with_server(
            config.server_named(name)?,
            config.connect_timeout(),
            config.request_timeout(),
        )?,
        None => OllamaClient::from_config(&config)?,
    };

    match cli.command {
        Commands::Chat(args) => chat(&config, client, args).await,
        Commands::Generate(args) => generate(&client, args).await,
        Commands::Models => {
            for model in client.installed_models().await? {
                println!("{}\t{}", model.name, model.size);
            }
            Ok(())
        }
        Commands::Ps => {
            for model in client.loaded_models().await? {
                println!("{}\t{}", model.name, model.size);
            }
            Ok(())
        }
        Commands::Unload(args) => {
            client.unload_model(&args.model).await?;
            println!("unloaded {}", args.model);
            Ok(())
        }
        Commands::Version => {
            println!("{}", client.version().await?);
            Ok(())
        }
        Commands::Tools(args) => tools(&config, args.command).await,
    }
}

fn load_config(path: Option<&std::path::Path>) -> Result<ParleyConfig> {
    let path = path
        .map(PathBuf::from)
        .unwrap_or_else(|| ParleyConfig::default_dir().join("config.toml"));
    ParleyConfig::load(path)?.with_env()
}

async fn generate(client: &OllamaClient, args: GenerateArgs) -> Result<()> {
    let request = InferenceRequest::builder()
        .model(args.model)
        .input(InferenceInput::Prompt {
            prompt: args.prompt,
            system: args.system,
        })
        .options(ModelOptions::default().with_creativity(args.creativity))
        .build();
    let stream = client.run_inference(&request).await?;
    print_stream(stream).await?;
    Ok(())
}

async fn chat(config: &ParleyConfig, client: OllamaClient, args: ChatArgs) -> Result<()> {
    let store = Arc::new(FileConversationStore::from_config(config));
    let mut session = match args.resume {
        Some(id) => {
            let conversation = store.load(id)?.ok_or_else(|| {
                ParleyError::InvalidArgument(format!("no saved conversation {id}"))
            })?;
            ChatSession::resume(client, conversation)
        }
        None => {
            let mut settings = ChatSettings::new(args.model);
            settings.tools_model = args.tools_model;
            settings.vision_model = args.vision_model;
            settings.system = args.system;
            settings.creativity = args.creativity;
            settings.history_window = config.history_window;
            settings.use_tools = args.tools;
            if !args.mcp_servers.is_empty() {
                settings.mcp_servers = Some(args.mcp_servers);
            }
            ChatSession::new(client, settings)
        }
    }
    .with_store(store)
    .with_provider_config(Arc::new(FileProviderConfigSource::new(config.mcp_config_path())))
    .with_tool_connect_timeout(config.tool_connect_timeout());

    let mut images = Vec::new();
    for source in &args.images {
        let image = ImageAttachment::load(session.client().http_client(), source).await?;
        images.push(image.base64);
    }

    if let Some(prompt) = args.prompt {
        return turn(&mut session, prompt, images).await;
    }

    eprintln!("conversation {}", session.conversation().id);
    let stdin = std::io::stdin();
    for line in stdin.lock().lines() {
        let line = line?;
        if line.trim().is_empty() {
            continue;
        }
        if let Err(e) = turn(&mut session, line, std::mem::take(&mut images)).await {
            let notice = e.notice();
            eprintln!("{}", notice.title);
            if let Some(message) = notice.message {
                eprintln!("  {message}");
            }
        }
    }
    Ok(())
}

async fn turn(session: &mut ChatSession, prompt: String, images: Vec<String>) -> Result<()> {
    let turn = session.start_turn(prompt, images).await?;
    for call in &turn.pending.tool_calls {
        eprintln!(
            "tool {}/{} {}",
            call.provider.as_deref().unwrap_or("?"),
            call.tool_name,
            call.arguments
        );
    }
    let output = print_stream(turn.stream).await?;
    session.complete_turn(turn.pending, &output)
}

async fn print_stream(mut stream: crate::ollama::InferenceStream) -> Result<InferenceOutput> {
    let mut output = InferenceOutput::default();
    let mut stdout = std::io::stdout();
    while let Some(event) = stream.next().await {
        match event? {
            InferenceEvent::Delta(text) => {
                print!("{text}");
                stdout.flush()?;
                output.content.push_str(&text);
            }
            InferenceEvent::Done(record) => output.done = record,
        }
    }
    println!();
    Ok(output)
}

async fn tools(config: &ParleyConfig, command: ToolsCommands) -> Result<()> {
    let source = FileProviderConfigSource::new(config.mcp_config_path());
    match command {
        ToolsCommands::List => {
            let servers = source.load()?;
            list_tools(&servers, config).await
        }
        ToolsCommands::Add { file } => {
            let pasted = std::fs::read_to_string(&file)?;
            let merged = source.merge_and_save(&pasted)?;
            println!("{} MCP servers configured", merged.servers.len());
            Ok(())
        }
        ToolsCommands::Remove { name } => {
            let mut servers = source.load()?;
            if servers.remove(&name).is_none() {
                return Err(ParleyError::InvalidArgument(format!(
                    "no MCP server named '{name}'"
                )));
            }
            source.save(&servers)?;
            Ok(())
        }
    }
}

async fn list_tools(servers: &McpServersConfig, config: &ParleyConfig) -> Result<()> {
    let mut orchestrator = ToolOrchestrator::from_config(servers, config.tool_connect_timeout())?;
    let catalog = orchestrator.merged_tool_catalog(false).await;
    for tool in &catalog.tools {
        println!("{}\t{}", tool.qualified_name(), tool.description);
    }
    for failure in &catalog.failures {
        eprintln!("{}: {}", failure.provider, failure.message);
    }
    orchestrator.shutdown().await;
    Ok(())
}
