use anyhow::Result;
use clap::Parser;
use mcp_scaffold::log_system::DestinationFactory;
use mcp_scaffold::pipeline::InvocationConfig;
use mcp_scaffold::tools::register_example_tools;
use mcp_scaffold::{
    ConfigLoader, McpServer, Pipeline, RuntimeInfo, ToolRegistry, UnifiedLayer, UnifiedLogger,
};
use std::path::PathBuf;
use tracing::{info, Level};
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{fmt, EnvFilter};

/// MCP server with instrumented tools and unified logging
///
/// Speaks MCP over stdio. Every tool invocation is recorded to the
/// configured log destinations.
#[derive(Parser, Debug)]
#[command(name = "mcp-scaffold")]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Config file (defaults to ./.mcp-scaffold.toml, $MCP_SCAFFOLD_CONFIG,
    /// then the user config directory)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Log level (trace, debug, info, warn, error); overrides the config file
    #[arg(short, long)]
    log_level: Option<String>,

    /// Log to file instead of stderr
    #[arg(long)]
    log_file: Option<PathBuf>,
}

fn setup_logging(log_level: &str, log_file: Option<PathBuf>) -> Result<()> {
    let level = match log_level.to_lowercase().as_str() {
        "trace" => Level::TRACE,
        "debug" => Level::DEBUG,
        "info" => Level::INFO,
        "warn" | "warning" => Level::WARN,
        "error" | "critical" => Level::ERROR,
        _ => Level::INFO,
    };

    let filter = EnvFilter::from_default_env().add_directive(level.into());

    let console = fmt::layer()
        .with_target(true)
        .with_thread_ids(true)
        .with_file(true)
        .with_line_number(true);

    // stdout carries protocol frames, so diagnostics never go there
    if let Some(log_path) = log_file {
        let file = std::fs::File::create(log_path)?;
        tracing_subscriber::registry()
            .with(filter)
            .with(console.with_ansi(false).with_writer(std::sync::Mutex::new(file)))
            .with(UnifiedLayer::global())
            .init();
    } else {
        tracing_subscriber::registry()
            .with(filter)
            .with(console.with_writer(std::io::stderr))
            .with(UnifiedLayer::global())
            .init();
    }

    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let config = match ConfigLoader::load(args.config.as_deref()) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("Failed to load configuration: {}", e);
            return Err(e.into());
        }
    };

    let log_level = args.log_level.as_deref().unwrap_or(&config.log_level);
    setup_logging(log_level, args.log_file.clone())?;

    info!("Starting MCP Scaffold v{}", env!("CARGO_PKG_VERSION"));

    let factory = DestinationFactory::with_builtin();
    let logger = UnifiedLogger::initialize(&config, &factory).await?;

    let server = {
        let startup = logger.begin_startup();
        info!("Startup correlation id: {}", startup.id());

        let runtime = RuntimeInfo::collect(&config, &factory);
        info!(
            pid = runtime.process_id,
            database = %runtime.database_path.display(),
            "Runtime info: {}",
            serde_json::to_string(&runtime)?
        );

        let pipeline = Pipeline::new(
            logger.clone(),
            InvocationConfig {
                summary_limit: config.summary_limit,
            },
        );
        let mut registry = ToolRegistry::new();
        register_example_tools(&mut registry, &pipeline)?;
        info!("Registered {} tools: {}", registry.len(), registry.names().join(", "));

        McpServer::new(registry, config.name.clone()).with_instructions(config.description.clone())
    };

    info!("MCP Scaffold server ready - accepting MCP requests on stdio");

    let outcome = server.run().await;
    match &outcome {
        Ok(()) => info!("MCP server stopped normally"),
        Err(e) => eprintln!("MCP server error: {}", e),
    }

    // drain every accepted entry before exit
    logger.close().await?;

    outcome
}
