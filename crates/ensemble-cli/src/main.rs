use anyhow::{Context, Result, bail};
use clap::{Parser, Subcommand};
use std::io::Write;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing::{info, warn};
use tracing_subscriber::prelude::*;
use tracing_subscriber::{EnvFilter, fmt, reload};

use ensemble_core::catalog::{self, ModelManager, ModelTier};
use ensemble_core::agents::base::prepare_prompt;
use ensemble_core::{
    Agent, CoderAgent, CoordinatorAgent, DelegationMap, DelegationMode, GenerateRequest,
    InferenceTransport, OllamaClient, ResearcherAgent, TaskContext,
};

mod config;

use config::EnsembleConfig;

#[derive(Parser)]
#[command(name = "ensemble")]
#[command(version)]
#[command(about = "Ensemble: coordinate specialized local LLM agents")]
struct Cli {
    /// Path to config file
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Enable debug logging
    #[arg(short, long, global = true)]
    debug: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Check that the Ollama server is reachable
    Health,

    /// Inspect and download models
    Models {
        #[command(subcommand)]
        action: ModelsCommand,
    },

    /// Run a single task on one agent
    Ask {
        /// researcher, coder or coordinator
        #[arg(short, long, default_value = "coordinator")]
        agent: String,

        /// Extra context as key=value (repeatable)
        #[arg(long = "context", value_parser = parse_pair)]
        context: Vec<(String, String)>,

        /// Print the answer as it is generated
        #[arg(long)]
        stream: bool,

        /// The task to run
        task: String,
    },

    /// Interactive conversation with one agent
    Chat {
        #[arg(short, long, default_value = "coordinator")]
        agent: String,
    },

    /// Ask the coordinator for an execution plan
    Plan {
        task: String,

        /// Also print the subtasks extracted from the plan
        #[arg(long)]
        subtasks: bool,
    },

    /// Delegate subtasks to agents and synthesize the results
    Delegate {
        task: String,

        /// Agent=subtask (repeatable, order is kept)
        #[arg(short, long = "assign", value_parser = parse_pair)]
        assign: Vec<(String, String)>,

        /// Plan first and delegate the subtasks the plan names
        #[arg(long)]
        from_plan: bool,

        /// Run different agents concurrently
        #[arg(long)]
        concurrent: bool,
    },

    /// Initialize config directory and default config
    Init,

    /// Show current configuration
    Config,
}

#[derive(Subcommand)]
enum ModelsCommand {
    /// Models present on the server
    List,
    /// Known models, optionally filtered by tier
    Catalog {
        /// general, specialized or lightweight
        #[arg(long)]
        tier: Option<String>,
    },
    /// Suggest a model for a use case (coding, research, chat, ...)
    Recommend { use_case: String },
    /// Download a catalog model unless it is already present
    Pull { key: String },
    /// Catalog entry plus server-side details
    Info { key: String },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Set up logging before anything else logs; the configured level is
    // applied once the config is loaded
    let env_filter = EnvFilter::try_from_default_env().ok();
    let rust_log_set = env_filter.is_some();
    let initial = env_filter
        .unwrap_or_else(|| EnvFilter::new(if cli.debug { "debug" } else { "info" }));
    let (filter, filter_handle) = reload::Layer::new(initial);
    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer())
        .init();

    let cfg = EnsembleConfig::load(&cli.config);
    if let Some(level) = configured_level(cli.debug, rust_log_set, cfg.as_ref().ok()) {
        if let Err(e) = filter_handle.reload(EnvFilter::new(level)) {
            warn!("Failed to apply configured log level: {}", e);
        }
    }

    match cli.command {
        Commands::Init => cmd_init().await,
        Commands::Config => cmd_config(&cfg?),
        command => {
            let cfg = cfg?;
            let client = Arc::new(
                OllamaClient::new(&cfg.ollama.host, cfg.ollama.timeout())
                    .context("Failed to create Ollama client")?,
            );
            let result = run(command, &cfg, client.clone()).await;
            client.close();
            result
        }
    }
}

async fn run(command: Commands, cfg: &EnsembleConfig, client: Arc<OllamaClient>) -> Result<()> {
    match command {
        Commands::Health => cmd_health(&client).await,
        Commands::Models { action } => cmd_models(action, client).await,
        Commands::Ask {
            agent,
            context,
            stream,
            task,
        } => cmd_ask(cfg, client, &agent, context, stream, &task).await,
        Commands::Chat { agent } => cmd_chat(cfg, client, &agent).await,
        Commands::Plan { task, subtasks } => cmd_plan(cfg, client, &task, subtasks).await,
        Commands::Delegate {
            task,
            assign,
            from_plan,
            concurrent,
        } => cmd_delegate(cfg, client, &task, assign, from_plan, concurrent).await,
        Commands::Init | Commands::Config => Ok(()),
    }
}

async fn cmd_init() -> Result<()> {
    let config_dir = config::config_dir();
    tokio::fs::create_dir_all(&config_dir)
        .await
        .with_context(|| format!("Failed to create config dir: {}", config_dir.display()))?;

    let config_path = config_dir.join("config.toml");
    if config_path.exists() {
        warn!("Config already exists at {}", config_path.display());
    } else {
        let default_config = include_str!("../../../config/default.toml");
        tokio::fs::write(&config_path, default_config).await?;
        info!("Created default config at {}", config_path.display());
    }

    println!("Ensemble initialized at {}", config_dir.display());
    println!("Edit {} to point at your Ollama server and pick models.", config_path.display());
    Ok(())
}

fn cmd_config(cfg: &EnsembleConfig) -> Result<()> {
    println!("{}", toml::to_string_pretty(cfg)?);
    Ok(())
}

async fn cmd_health(client: &OllamaClient) -> Result<()> {
    if !client.check_health().await {
        bail!("Ollama is not reachable at {}", client.host());
    }
    println!("Ollama is running at {}", client.host());
    let models = client.list_models().await?;
    println!("{} models installed", models.len());
    Ok(())
}

async fn cmd_models(action: ModelsCommand, client: Arc<OllamaClient>) -> Result<()> {
    match action {
        ModelsCommand::List => {
            let models = client.list_models().await?;
            if models.is_empty() {
                println!("No models installed. Try `ensemble models pull llama3.2`.");
            }
            for model in models {
                println!("{:<32} {:>6.1} GB", model.name, model.size as f64 / 1e9);
            }
        }
        ModelsCommand::Catalog { tier } => {
            let models: Vec<&catalog::ModelInfo> = match tier.as_deref() {
                None => catalog::all_models().iter().collect(),
                Some(name) => catalog::models_by_tier(parse_tier(name)?),
            };
            for model in models {
                println!(
                    "{:<12} {:<16} {:>5.1} GB  {:>4.1} GB VRAM  {:<11} {}",
                    model.key,
                    model.display_name,
                    model.size_gb,
                    model.vram_gb,
                    model.tier,
                    model.description
                );
            }
        }
        ModelsCommand::Recommend { use_case } => {
            let model = catalog::recommended_for(&use_case);
            println!("{} ({})", model.display_name, model.ollama_name);
            println!("  {}", model.description);
            println!("  Good for: {}", model.use_cases.join(", "));
        }
        ModelsCommand::Pull { key } => {
            let manager = ModelManager::new(client);
            if !manager.ensure_available(&key).await? {
                bail!("Unknown model '{}'. See `ensemble models catalog`.", key);
            }
            println!("{} is available", key);
        }
        ModelsCommand::Info { key } => {
            let Some(model) = catalog::model_info(&key) else {
                bail!("Unknown model '{}'. See `ensemble models catalog`.", key);
            };
            println!("{}", serde_json::to_string_pretty(model)?);
            let manager = ModelManager::new(client);
            match manager.model_stats(&key).await {
                Ok(Some(stats)) => println!("{}", serde_json::to_string_pretty(&stats)?),
                Ok(None) => {}
                Err(e) => warn!("No server details for {}: {}", model.ollama_name, e),
            }
        }
    }
    Ok(())
}

async fn cmd_ask(
    cfg: &EnsembleConfig,
    client: Arc<OllamaClient>,
    agent: &str,
    context: Vec<(String, String)>,
    stream: bool,
    task: &str,
) -> Result<()> {
    let agent = build_agent(cfg, client.clone(), agent)?;
    let context = context
        .into_iter()
        .fold(TaskContext::new(), |ctx, (k, v)| ctx.with(k, v));
    let context = (!context.is_empty()).then_some(context);

    if !stream {
        let output = agent.run(task, context.as_ref()).await?;
        println!("{}", output);
        return Ok(());
    }

    let config = agent.config();
    let request = GenerateRequest {
        model: config.model.clone(),
        prompt: prepare_prompt(task, context.as_ref()),
        system: Some(config.instruction_preamble.clone()),
        temperature: config.temperature,
        max_tokens: config.max_tokens,
    };
    let mut chunks = client.generate_stream(request).await?;
    while let Some(chunk) = chunks.recv().await {
        print!("{}", chunk?);
        std::io::stdout().flush()?;
    }
    println!();
    Ok(())
}

async fn cmd_chat(cfg: &EnsembleConfig, client: Arc<OllamaClient>, agent: &str) -> Result<()> {
    let agent = build_agent(cfg, client, agent)?;
    println!(
        "Chatting with {} ({}). Commands: /reset, /history, /quit",
        agent.name(),
        agent.config().model
    );

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    loop {
        print!("> ");
        std::io::stdout().flush()?;
        let Some(line) = lines.next_line().await? else {
            break;
        };
        let line = line.trim();
        match line {
            "" => continue,
            "/quit" | "/exit" => break,
            "/reset" => {
                agent.reset_conversation().await;
                println!("Conversation cleared.");
            }
            "/history" => {
                for turn in agent.conversation_history().await {
                    println!("[{}] {}", turn.role, turn.content);
                }
            }
            message => match agent.chat(message).await {
                Ok(reply) => println!("{}", reply),
                Err(e) => eprintln!("error: {}", e),
            },
        }
    }
    Ok(())
}

async fn cmd_plan(
    cfg: &EnsembleConfig,
    client: Arc<OllamaClient>,
    task: &str,
    show_subtasks: bool,
) -> Result<()> {
    let coordinator = build_coordinator(cfg, client);
    let plan = coordinator.plan_task(task).await?;
    println!("{}", plan.plan);

    if show_subtasks {
        let subtasks = plan.subtasks();
        println!("\n--- {} subtasks ---", subtasks.len());
        for (i, subtask) in subtasks.iter().enumerate() {
            println!("{}. [{}] {}", i + 1, subtask.agent, subtask.description);
        }
    }
    Ok(())
}

async fn cmd_delegate(
    cfg: &EnsembleConfig,
    client: Arc<OllamaClient>,
    task: &str,
    assign: Vec<(String, String)>,
    from_plan: bool,
    concurrent: bool,
) -> Result<()> {
    let mut options = cfg.delegation.clone();
    if concurrent {
        options.mode = DelegationMode::Concurrent;
    }
    let coordinator = build_coordinator(cfg, client).with_delegation_options(options);

    let mut assignments = DelegationMap::new();
    if from_plan {
        let plan = coordinator.plan_task(task).await?;
        assignments = plan.delegation();
        info!("Plan produced {} subtasks", assignments.subtask_count());
    }
    for (agent, subtask) in assign {
        assignments.push(agent, subtask);
    }
    if assignments.is_empty() {
        bail!("Nothing to delegate. Pass --assign Agent=subtask or --from-plan.");
    }

    let output = coordinator.delegate_and_synthesize(task, &assignments).await?;
    println!("{}", output);
    Ok(())
}

fn build_coordinator(cfg: &EnsembleConfig, client: Arc<OllamaClient>) -> CoordinatorAgent {
    let transport: Arc<dyn InferenceTransport> = client;
    let mut coordinator = CoordinatorAgent::with_overrides(
        transport.clone(),
        cfg.agents.coordinator.clone(),
    )
    .with_delegation_options(cfg.delegation.clone());
    coordinator.register_agent(Arc::new(ResearcherAgent::with_overrides(
        transport.clone(),
        cfg.agents.researcher.clone(),
    )));
    coordinator.register_agent(Arc::new(CoderAgent::with_overrides(
        transport,
        cfg.agents.coder.clone(),
    )));
    coordinator
}

fn build_agent(cfg: &EnsembleConfig, client: Arc<OllamaClient>, name: &str) -> Result<Arc<dyn Agent>> {
    let transport: Arc<dyn InferenceTransport> = client;
    let agent: Arc<dyn Agent> = match name.to_lowercase().as_str() {
        "researcher" => Arc::new(ResearcherAgent::with_overrides(
            transport,
            cfg.agents.researcher.clone(),
        )),
        "coder" => Arc::new(CoderAgent::with_overrides(transport, cfg.agents.coder.clone())),
        "coordinator" => Arc::new(CoordinatorAgent::with_overrides(
            transport,
            cfg.agents.coordinator.clone(),
        )),
        other => bail!("Unknown agent '{}'. Choose researcher, coder or coordinator.", other),
    };
    Ok(agent)
}

/// Level from the config file, unless `RUST_LOG` or `--debug` already decided
fn configured_level(debug: bool, rust_log_set: bool, cfg: Option<&EnsembleConfig>) -> Option<&str> {
    if debug || rust_log_set {
        return None;
    }
    cfg.map(|c| c.logging.level.as_str())
}

fn parse_tier(name: &str) -> Result<ModelTier> {
    match name.to_lowercase().as_str() {
        "general" => Ok(ModelTier::General),
        "specialized" => Ok(ModelTier::Specialized),
        "lightweight" => Ok(ModelTier::Lightweight),
        other => bail!("Unknown tier '{}'. Choose general, specialized or lightweight.", other),
    }
}

/// `key=value`, both sides non-empty
fn parse_pair(s: &str) -> std::result::Result<(String, String), String> {
    let (key, value) = s
        .split_once('=')
        .ok_or_else(|| format!("expected KEY=VALUE, got '{}'", s))?;
    let (key, value) = (key.trim(), value.trim());
    if key.is_empty() || value.is_empty() {
        return Err(format!("expected KEY=VALUE, got '{}'", s));
    }
    Ok((key.to_string(), value.to_string()))
}
