//! AMPS Console - command line entry point

use amps_console::admin::{TopicDiscovery, DISCOVERY_TIMEOUT};
use amps_console::config::{ConsoleConfig, DEFAULT_CONFIG_PATHS};
use amps_console::grid::{
    default_export_file_name, derive_columns, expand_nvfix_row, export_rows_to_csv, export_rows_to_json,
    format_header_name, page, page_count, quick_filter, render_value,
};
use amps_console::protocol::topics::is_valid_topic_name;
use amps_console::ConsoleError;
use amps_console::observability::init_default_logging;
use amps_console::protocol::{CommandKind, QueryOptions, Row, TopicInfo};
use amps_console::session::{
    ControllerEvent, ControllerOptions, Notification, NotificationLevel, SessionController,
};
use amps_console::transport::websocket::connection::generate_client_name;
use amps_console::transport::WebSocketBrokerClient;
use clap::{Args, Parser, Subcommand};
use std::path::{Path, PathBuf};
use std::process;
use tokio::signal;
use tokio::sync::mpsc;
use tracing::{error, info, warn};

/// Operator console for AMPS pub/sub brokers
#[derive(Parser)]
#[command(name = "amps-console")]
#[command(about = "Query, subscribe to and inspect AMPS State-of-the-World topics")]
#[command(version)]
struct Cli {
    /// Configuration file path
    #[arg(short, long, value_name = "FILE", env = "AMPS_CONSOLE_CONFIG")]
    config: Option<PathBuf>,

    /// Developer mode: per-message tracing and session introspection
    #[arg(long)]
    dev: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// List configured servers
    Servers,
    /// List SOW topics of a server
    Topics {
        #[arg(short, long)]
        server: String,
    },
    /// Validate configuration
    Config {
        /// Show current configuration
        #[arg(long)]
        show: bool,
    },
    /// Execute one command and print the resulting rows
    Run(RunArgs),
}

#[derive(Args)]
struct RunArgs {
    #[arg(short, long)]
    server: String,
    #[arg(short, long)]
    topic: String,
    /// sow (query), subscribe, sow_and_subscribe (query-subscribe) or sow_stats (stats)
    #[arg(long, default_value = "sow")]
    command: CommandKind,
    /// Content filter, e.g. "/status = 'open'"
    #[arg(long)]
    filter: Option<String>,
    #[arg(long)]
    order_by: Option<String>,
    #[arg(long)]
    bookmark: Option<String>,
    /// Options string; defaults to the command's top_n
    #[arg(long)]
    options: Option<String>,
    /// Message format, skipping topic discovery
    #[arg(long)]
    format: Option<String>,
    /// Export rows to FILE (.json for JSON, CSV otherwise)
    #[arg(long, value_name = "FILE", num_args = 0..=1, default_missing_value = "")]
    export: Option<String>,
    /// Only keep rows containing this text
    #[arg(long)]
    quick_filter: Option<String>,
    /// Print only this page (1-based) of the configured page size
    #[arg(long)]
    page: Option<usize>,
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    init_default_logging();

    let config = match load_configuration(cli.config.as_deref()) {
        Ok(config) => config,
        Err(e) => {
            error!("Failed to load configuration: {}", e);
            process::exit(1);
        }
    };

    let result = match cli.command {
        Commands::Servers => list_servers(&config),
        Commands::Topics { server } => list_topics(&config, &server).await,
        Commands::Config { show } => handle_config_command(&config, show),
        Commands::Run(args) => run_command(&config, args, cli.dev).await,
    };

    if let Err(e) = result {
        error!("Command failed: {}", e);
        process::exit(1);
    }
}

fn load_configuration(config_path: Option<&Path>) -> Result<ConsoleConfig, Box<dyn std::error::Error>> {
    if let Some(path) = config_path {
        info!("Loading configuration from: {}", path.display());
        return Ok(ConsoleConfig::load_from_file(path)?);
    }
    for path_str in DEFAULT_CONFIG_PATHS {
        let path = PathBuf::from(path_str);
        if path.exists() {
            info!("Loading configuration from: {}", path.display());
            return Ok(ConsoleConfig::load_from_file(&path)?);
        }
    }
    info!("No configuration file found, using built-in servers");
    Ok(ConsoleConfig::default())
}

fn list_servers(config: &ConsoleConfig) -> Result<(), Box<dyn std::error::Error>> {
    let format = &config.connection.default_message_format;
    for server in &config.servers {
        println!(
            "{}\t{}\ttcp:{}\t{}\t{}",
            server.name,
            server.host,
            server.tcp_port,
            server.websocket_url(format)?,
            server.admin_url()
        );
    }
    Ok(())
}

async fn list_topics(config: &ConsoleConfig, server_name: &str) -> Result<(), Box<dyn std::error::Error>> {
    let server = config.find_server(server_name)?;
    let result = TopicDiscovery::new(DISCOVERY_TIMEOUT)?.fetch_topics(server).await;
    if let Some(reason) = &result.error {
        warn!("Topic discovery failed ({}), showing default topics", reason);
    }
    for topic in &result.topics {
        println!("{}\t{}\t{}", topic.name, topic.message_format(), topic.key);
    }
    Ok(())
}

fn handle_config_command(config: &ConsoleConfig, show: bool) -> Result<(), Box<dyn std::error::Error>> {
    config.validate()?;
    if show {
        println!("{}", toml::to_string_pretty(config)?);
    }
    info!("Configuration validation complete");
    Ok(())
}

async fn resolve_topic(config: &ConsoleConfig, args: &RunArgs) -> Result<TopicInfo, Box<dyn std::error::Error>> {
    if let Some(format) = &args.format {
        return Ok(TopicInfo::new(args.topic.clone(), format.clone(), ""));
    }
    let server = config.find_server(&args.server)?;
    let discovered = TopicDiscovery::new(DISCOVERY_TIMEOUT)?.fetch_topics(server).await;
    Ok(discovered
        .topics
        .into_iter()
        .find(|t| t.name == args.topic)
        .unwrap_or_else(|| {
            TopicInfo::new(
                args.topic.clone(),
                config.connection.default_message_format.clone(),
                "",
            )
        }))
}

async fn run_command(config: &ConsoleConfig, args: RunArgs, dev_mode: bool) -> Result<(), Box<dyn std::error::Error>> {
    let server = config.find_server(&args.server)?.clone();
    if !is_valid_topic_name(&args.topic) {
        warn!(topic = %args.topic, "Topic name contains unusual characters");
    }
    let topic = resolve_topic(config, &args).await?;

    let client = WebSocketBrokerClient::new(generate_client_name(), config.connect_timeout());
    let mut controller = SessionController::new(
        client,
        config,
        ControllerOptions {
            dev_mode,
            sync_interval: config.sync_interval(),
        },
    );
    let mut notifications = controller.take_notifications();

    controller.connect_with_format(&server, &topic.message_format()).await?;

    let options = QueryOptions {
        filter: args.filter.clone(),
        order_by: args.order_by.clone(),
        bookmark: args.bookmark.clone(),
        options: args.options.clone(),
    };
    controller
        .execute_command(args.command, &topic.name, options, Some(&topic))
        .await?;

    let shutdown = signal::ctrl_c();
    tokio::pin!(shutdown);

    loop {
        tokio::select! {
            _ = &mut shutdown => {
                info!("Interrupted, stopping execution");
                break;
            }
            event = controller.next_event() => {
                if let Some(rx) = notifications.as_mut() {
                    report_notifications(rx);
                }
                if event == ControllerEvent::ChannelClosed || !controller.is_locked() {
                    break;
                }
            }
        }
    }

    if let Some(info) = controller.debug_info() {
        info!(?info, "Session state");
    }
    controller.stop_execution().await;

    let execution = controller.execution_state();
    let field_error = controller.field_errors().summary();
    let rows: Vec<Row> = if topic.message_format() == "nvfix" {
        controller.rows().iter().map(expand_nvfix_row).collect()
    } else {
        controller.rows().to_vec()
    };
    controller.disconnect().await;

    if let Some(message) = execution.error.or(field_error) {
        return Err(ConsoleError::broker(message).into());
    }

    let visible = quick_filter(&rows, args.quick_filter.as_deref().unwrap_or_default());
    match args.page {
        Some(number) => {
            let size = config.grid.page_size;
            let pages = page_count(visible.len(), size);
            info!("Page {} of {}", number.min(pages).max(1), pages.max(1));
            print_rows(page(&visible, number.saturating_sub(1), size));
        }
        None => print_rows(&visible),
    }
    if let Some(path) = args.export {
        export(path, &visible)?;
    }
    Ok(())
}

fn report_notifications(rx: &mut mpsc::UnboundedReceiver<Notification>) {
    while let Ok(notification) = rx.try_recv() {
        match notification.level() {
            NotificationLevel::Error => error!("{}: {}", notification.title(), notification.message()),
            NotificationLevel::Warning => warn!("{}: {}", notification.title(), notification.message()),
            NotificationLevel::Success | NotificationLevel::Info => {
                info!("{}: {}", notification.title(), notification.message())
            }
        }
    }
}

fn print_rows(rows: &[&Row]) {
    let columns = derive_columns(rows);
    let header: Vec<String> = columns.iter().map(|c| format_header_name(c)).collect();
    println!("{}", header.join("\t"));
    for row in rows {
        let cells: Vec<String> = columns.iter().map(|c| render_value(row.get(c))).collect();
        println!("{}", cells.join("\t"));
    }
}

fn export(path: String, rows: &[&Row]) -> Result<(), Box<dyn std::error::Error>> {
    let path = if path.is_empty() {
        PathBuf::from(default_export_file_name(chrono::Local::now().date_naive(), "csv"))
    } else {
        PathBuf::from(path)
    };
    let written = match path.extension().and_then(|e| e.to_str()) {
        Some("json") => export_rows_to_json(&path, rows)?,
        _ => export_rows_to_csv(&path, rows)?,
    };
    info!("Exported {} rows to {}", written, path.display());
    Ok(())
}
