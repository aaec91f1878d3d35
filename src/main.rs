use clap::{Parser, ValueEnum};
use std::net::SocketAddr;
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

use dispatcher::api::client::DispatcherClient;
use dispatcher::config::{DispatcherConfig, Environment};
use dispatcher::node::Dispatcher;
use dispatcher::scheduler::WorkItem;
use dispatcher::shutdown::install_shutdown_handler;

#[derive(Parser, Debug)]
#[command(name = "dispatcher")]
#[command(version)]
#[command(about = "Test dispatch broker with a bounded slot queue and overflow eviction")]
#[command(propagate_version = true)]
struct Args {
    #[command(subcommand)]
    command: Commands,
}

#[derive(clap::Subcommand, Debug)]
enum Commands {
    /// Run the dispatcher service
    Serve(ServeArgs),

    /// Submit a test to a running dispatcher
    Submit {
        #[command(flatten)]
        client: ClientArgs,

        /// Source that issued the test
        #[arg(long)]
        source_id: u32,

        /// Request number within the source
        #[arg(long)]
        test_number: u32,
    },

    /// Show the queue of a running dispatcher
    Queue {
        #[command(flatten)]
        client: ClientArgs,
    },
}

// =============================================================================
// Server Arguments
// =============================================================================

#[derive(Parser, Debug)]
struct ServeArgs {
    /// Path to a TOML configuration file
    #[arg(long, env = "CONFIG_PATH")]
    config: Option<PathBuf>,

    /// Deployment environment (selects log format and level)
    #[arg(long, value_enum)]
    env: Option<Environment>,

    /// Address for the HTTP ingress
    #[arg(long)]
    listen: Option<SocketAddr>,

    /// gRPC endpoint of the device service
    #[arg(long)]
    device_addr: Option<String>,

    /// Number of queue slots
    #[arg(long)]
    max_size: Option<u32>,

    /// Snapshot file for the queue; omit to keep state in memory
    #[arg(long)]
    storage_path: Option<PathBuf>,

    /// Queue items whose direct dispatch failed instead of rejecting them
    #[arg(long)]
    fallback_on_dispatch_failure: bool,
}

impl ServeArgs {
    fn apply(&self, config: &mut DispatcherConfig) {
        if let Some(env) = self.env {
            config.env = env;
        }
        if let Some(listen) = self.listen {
            config.http_server.address = listen;
        }
        if let Some(ref addr) = self.device_addr {
            config.device.address = addr.clone();
        }
        if let Some(max_size) = self.max_size {
            config.cycle_buffer.max_size = max_size;
        }
        if let Some(ref path) = self.storage_path {
            config.storage.path = Some(path.clone());
        }
        if self.fallback_on_dispatch_failure {
            config.cycle_buffer.fallback_on_dispatch_failure = true;
        }
    }
}

// =============================================================================
// Client Arguments
// =============================================================================

#[derive(Parser, Debug)]
struct ClientArgs {
    /// Dispatcher base URL
    #[arg(long, short = 'a', default_value = "http://127.0.0.1:8080")]
    addr: String,

    /// Output format
    #[arg(long, short = 'o', default_value = "table")]
    output: OutputFormat,
}

#[derive(Debug, Clone, ValueEnum)]
enum OutputFormat {
    Table,
    Json,
}

fn init_logging(env: Environment) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(env.default_log_level()));

    if env.json_logs() {
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .json()
            .init();
    } else {
        tracing_subscriber::fmt().with_env_filter(filter).init();
    }
}

// =============================================================================
// Server Implementation
// =============================================================================

async fn run_server(args: ServeArgs) -> Result<(), Box<dyn std::error::Error>> {
    let mut config = match args.config {
        Some(ref path) => DispatcherConfig::load(path).await?,
        None => DispatcherConfig::default(),
    };
    args.apply(&mut config);

    init_logging(config.env);
    config.validate()?;

    tracing::info!(
        env = %config.env,
        listen_addr = %config.http_server.address,
        device_addr = %config.device.address,
        max_size = config.cycle_buffer.max_size,
        storage = ?config.storage.path,
        "Starting dispatcher"
    );

    let shutdown = install_shutdown_handler();
    let dispatcher = Dispatcher::new(config).await?;
    dispatcher.run(shutdown).await?;

    tracing::info!("Dispatcher stopped");
    Ok(())
}

// =============================================================================
// Client Command Handlers
// =============================================================================

async fn handle_submit(
    client: &ClientArgs,
    source_id: u32,
    test_number: u32,
) -> Result<(), Box<dyn std::error::Error>> {
    let response = DispatcherClient::new(&client.addr)
        .submit(WorkItem::new(source_id, test_number))
        .await?;

    match client.output {
        OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&response)?),
        OutputFormat::Table => {
            println!("Status:  {}", response.status);
            println!("Message: {}", response.message);
        }
    }

    if response.status != "success" {
        std::process::exit(1);
    }
    Ok(())
}

async fn handle_queue(client: &ClientArgs) -> Result<(), Box<dyn std::error::Error>> {
    let status = DispatcherClient::new(&client.addr).queue_status().await?;

    match client.output {
        OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&status)?),
        OutputFormat::Table => {
            println!(
                "Occupancy: {}/{} ({} free, {} pending overflow)",
                status.occupancy, status.max_size, status.available_space, status.pending_overflow
            );
            if status.entries.is_empty() {
                println!("Queue is empty.");
            } else {
                println!("{:<6} {:<10} {:<10} ARRIVED", "SLOT", "SOURCE", "REQUEST");
                println!("{}", "-".repeat(60));
                for entry in &status.entries {
                    println!(
                        "{:<6} {:<10} {:<10} {}",
                        entry.slot,
                        entry.source_id,
                        entry.request_id,
                        entry.arrival_time.to_rfc3339()
                    );
                }
            }
        }
    }
    Ok(())
}

// =============================================================================
// Main Entry Point
// =============================================================================

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();

    match args.command {
        Commands::Serve(serve_args) => run_server(serve_args).await?,
        Commands::Submit {
            client,
            source_id,
            test_number,
        } => handle_submit(&client, source_id, test_number).await?,
        Commands::Queue { client } => handle_queue(&client).await?,
    }

    Ok(())
}
