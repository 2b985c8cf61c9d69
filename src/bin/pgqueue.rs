//! pgqueue CLI — run the queue server or poke at queues directly.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use clap::{Parser, Subcommand};
use pgqueue::config::Config;
use pgqueue::config::secrets::ExposeSecret;
use pgqueue::db::Db;
use pgqueue::model::{MessageId, QueueMessage, Status};
use pgqueue::queue::{DEFAULT_LIST_LIMIT, QueueService, Reaper, ReaperConfig};
use pgqueue::telemetry::{TelemetryConfig, init_telemetry};
use tracing::info;

#[derive(Parser)]
#[command(name = "pgqueue", about = "Postgres-backed message queue")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Run the HTTP API and the reaper
    Serve {
        /// Address to listen on (overrides BIND_ADDR)
        #[arg(long)]
        bind: Option<SocketAddr>,
    },
    /// Queue operations
    Queue {
        #[command(subcommand)]
        action: QueueAction,
    },
}

#[derive(Subcommand)]
enum QueueAction {
    /// Enqueue a message
    Send {
        queue: String,
        /// JSON payload
        #[arg(long)]
        payload: Option<String>,
    },
    /// Claim the oldest pending message
    Receive { queue: String },
    /// Acknowledge a claimed message
    Complete { id: i64 },
    /// Dead-letter a claimed message
    Fail { id: i64 },
    /// Message counts by status
    Stats { queue: String },
    /// List messages
    List {
        queue: String,
        /// Filter by status
        #[arg(long)]
        status: Option<String>,
        /// Maximum messages to show
        #[arg(long, default_value_t = DEFAULT_LIST_LIMIT)]
        limit: i64,
    },
    /// Show a message
    Show { id: i64 },
    /// Requeue expired claims now
    Requeue {
        /// Only this queue (default: all queues)
        #[arg(long)]
        queue: Option<String>,
        /// Visibility timeout in seconds (default: VISIBILITY_TIMEOUT_SECS)
        #[arg(long)]
        timeout: Option<u64>,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    let cli = Cli::parse();

    match cli.command {
        Command::Serve { bind } => cmd_serve(bind).await,
        Command::Queue { action } => {
            let config = Config::from_env()?;
            let db = Db::connect(config.database_url.expose_secret(), config.db_max_connections)
                .await?;
            db.migrate().await?;
            let service = QueueService::new(Arc::new(db));

            match action {
                QueueAction::Send { queue, payload } => cmd_send(&service, queue, payload).await,
                QueueAction::Receive { queue } => cmd_receive(&service, queue).await,
                QueueAction::Complete { id } => {
                    let ok = service.complete(MessageId(id)).await?;
                    println!("completed: {ok}");
                    Ok(())
                }
                QueueAction::Fail { id } => {
                    let ok = service.fail(MessageId(id)).await?;
                    println!("failed: {ok}");
                    Ok(())
                }
                QueueAction::Stats { queue } => cmd_stats(&service, queue).await,
                QueueAction::List {
                    queue,
                    status,
                    limit,
                } => cmd_list(&service, queue, status, limit).await,
                QueueAction::Show { id } => cmd_show(&service, id).await,
                QueueAction::Requeue { queue, timeout } => {
                    let timeout = timeout
                        .map(Duration::from_secs)
                        .unwrap_or(config.queue.visibility_timeout);
                    let requeued = match queue {
                        Some(q) => service.requeue_stale(&q, timeout).await?,
                        None => service.requeue_stale_all(timeout).await?,
                    };
                    println!("requeued: {requeued}");
                    Ok(())
                }
            }
        }
    }
}

async fn cmd_serve(bind: Option<SocketAddr>) -> anyhow::Result<()> {
    let config = Config::from_env()?;

    let _guard = init_telemetry(TelemetryConfig {
        endpoint: config.otel_endpoint.clone(),
        service_name: "pgqueue".to_string(),
        default_level: config.log_level.clone(),
    })?;

    let db = Db::connect(config.database_url.expose_secret(), config.db_max_connections).await?;
    db.migrate().await?;
    let service = QueueService::new(Arc::new(db));

    let reaper = Reaper::new(service.clone(), ReaperConfig::from(config.queue.clone()));
    let reaper_task = {
        let reaper = reaper.clone();
        tokio::spawn(async move { reaper.run().await })
    };

    let addr = bind.unwrap_or(config.bind_addr);
    let listener = tokio::net::TcpListener::bind(addr).await?;
    info!(%addr, "listening");

    axum::serve(listener, pgqueue::http::create_router(service))
        .with_graceful_shutdown(async {
            tokio::signal::ctrl_c().await.ok();
        })
        .await?;

    reaper.shutdown();
    reaper_task.await??;
    Ok(())
}

async fn cmd_send(
    service: &QueueService,
    queue: String,
    payload: Option<String>,
) -> anyhow::Result<()> {
    let payload: serde_json::Value = match payload {
        Some(json) => serde_json::from_str(&json)?,
        None => serde_json::json!({}),
    };
    let id = service.send(&queue, &payload).await?;
    println!("Sent: {id} → {queue}");
    Ok(())
}

async fn cmd_receive(service: &QueueService, queue: String) -> anyhow::Result<()> {
    match service.receive(&queue).await? {
        Some(msg) => print_message(&msg)?,
        None => println!("No message available."),
    }
    Ok(())
}

async fn cmd_stats(service: &QueueService, queue: String) -> anyhow::Result<()> {
    let stats = service.stats(&queue).await?;
    if stats.is_empty() {
        println!("Queue '{queue}' is empty.");
        return Ok(());
    }
    println!("{:<12}  COUNT", "STATUS");
    for row in &stats {
        println!("{:<12}  {}", row.status, row.count);
    }
    Ok(())
}

async fn cmd_list(
    service: &QueueService,
    queue: String,
    status: Option<String>,
    limit: i64,
) -> anyhow::Result<()> {
    let status: Option<Status> = status.map(|s| s.parse()).transpose()?;
    let messages = service.list(&queue, status, limit).await?;

    if messages.is_empty() {
        println!("No messages found.");
        return Ok(());
    }

    println!(
        "{:<10}  {:<12}  {:<8}  {:<16}  PROCESSED",
        "ID", "STATUS", "ATTEMPTS", "CREATED"
    );
    println!("{}", "-".repeat(70));
    for msg in &messages {
        println!(
            "{:<10}  {:<12}  {:<8}  {:<16}  {}",
            msg.id,
            msg.status,
            msg.attempts,
            msg.created_at.format("%Y-%m-%d %H:%M"),
            msg.processed_at
                .map(|t| t.format("%Y-%m-%d %H:%M:%S").to_string())
                .unwrap_or_else(|| "-".to_string())
        );
    }
    println!("\n{} message(s)", messages.len());
    Ok(())
}

async fn cmd_show(service: &QueueService, id: i64) -> anyhow::Result<()> {
    let msg = service
        .get(MessageId(id))
        .await?
        .ok_or_else(|| anyhow::anyhow!("no message with id {id}"))?;
    print_message(&msg)
}

fn print_message(msg: &QueueMessage) -> anyhow::Result<()> {
    println!("ID:         {}", msg.id);
    println!("Queue:      {}", msg.queue);
    println!("Status:     {}", msg.status);
    println!("Attempts:   {}", msg.attempts);
    println!("Created:    {}", msg.created_at);
    if let Some(processed) = msg.processed_at {
        println!("Processed:  {processed}");
    }
    println!("Payload:    {}", serde_json::to_string_pretty(&msg.payload)?);
    Ok(())
}
