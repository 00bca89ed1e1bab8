use anyhow::{bail, Context as AnyhowContext, Result};
use chrono::NaiveDate;
use clap::{ArgAction, Parser, Subcommand};
use serde_json::Value;

#[derive(Parser)]
#[command(
    name = "his",
    about = "Read-only operations console for the HIS server",
    version,
    arg_required_else_help = true
)]
struct Cli {
    /// Base URL of the HIS server.
    #[arg(
        short,
        long,
        global = true,
        env = "HIS_SERVER_URL",
        default_value = "http://localhost:8080"
    )]
    server: String,
    /// Pretty-print JSON output.
    #[arg(short, long, global = true, action = ArgAction::SetTrue)]
    pretty: bool,
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Server liveness and store status.
    Health,

    /// Wards with their rooms and beds.
    Wards,

    /// List beds, optionally by status (Available, Occupied, Maintenance, Cleaning).
    Beds {
        #[arg(long)]
        status: Option<String>,
    },

    /// Active admissions.
    Admissions,

    /// Transfers, newest first.
    Transfers {
        #[arg(long)]
        admission_id: Option<i64>,
    },

    /// Batches at or below their reorder level.
    LowStock,

    /// Non-empty batches of a medication in dispensing order.
    Stock { medication_id: i64 },

    /// Prescriptions waiting to be dispensed.
    Queue,

    /// Movement journal of a medication, newest first.
    Movements {
        medication_id: i64,
        /// First day to include (YYYY-MM-DD).
        #[arg(long)]
        from: Option<NaiveDate>,
        /// Last day to include (YYYY-MM-DD).
        #[arg(long)]
        to: Option<NaiveDate>,
    },

    /// Compare batch quantities with the movement journal.
    Reconcile { medication_id: i64 },

    /// Print CLI version.
    Version,
}

impl Commands {
    /// Request path and query for a read command; `None` for local commands.
    fn endpoint(&self) -> Option<(String, Vec<(&'static str, String)>)> {
        let mut query = Vec::new();
        let path = match self {
            Commands::Version => return None,
            Commands::Health => "/health".to_string(),
            Commands::Wards => "/api/v1/wards".to_string(),
            Commands::Beds { status } => {
                if let Some(status) = status {
                    query.push(("status", status.clone()));
                }
                "/api/v1/beds".to_string()
            }
            Commands::Admissions => "/api/v1/admissions/active".to_string(),
            Commands::Transfers { admission_id } => {
                if let Some(id) = admission_id {
                    query.push(("admission_id", id.to_string()));
                }
                "/api/v1/transfers".to_string()
            }
            Commands::LowStock => "/api/v1/pharmacy/stock/low".to_string(),
            Commands::Stock { medication_id } => format!("/api/v1/pharmacy/stock/{medication_id}"),
            Commands::Queue => "/api/v1/pharmacy/dispensing-queue".to_string(),
            Commands::Movements {
                medication_id,
                from,
                to,
            } => {
                if let Some(from) = from {
                    query.push(("start_date", from.to_string()));
                }
                if let Some(to) = to {
                    query.push(("end_date", to.to_string()));
                }
                format!("/api/v1/pharmacy/movements/{medication_id}")
            }
            Commands::Reconcile { medication_id } => {
                format!("/api/v1/pharmacy/reconciliation/{medication_id}")
            }
        };
        Some((path, query))
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let Some((path, query)) = cli.command.endpoint() else {
        println!("{}", env!("CARGO_PKG_VERSION"));
        return Ok(());
    };

    let body = fetch(&cli.server, &path, &query).await?;
    print_json(&body, cli.pretty)?;

    if let Commands::Reconcile { medication_id } = cli.command {
        if body.get("consistent").and_then(Value::as_bool) == Some(false) {
            bail!("medication {medication_id} has batches that disagree with the journal");
        }
    }
    Ok(())
}

async fn fetch(server: &str, path: &str, query: &[(&str, String)]) -> Result<Value> {
    let url = format!("{}{}", server.trim_end_matches('/'), path);
    let response = reqwest::Client::new()
        .get(&url)
        .query(query)
        .send()
        .await
        .with_context(|| format!("Failed to reach {url}"))?;

    let status = response.status();
    let body: Value = response
        .json()
        .await
        .with_context(|| format!("Invalid JSON from {url}"))?;

    if !status.is_success() {
        let message = body
            .pointer("/error/message")
            .and_then(Value::as_str)
            .unwrap_or("request failed");
        bail!("{status}: {message}");
    }
    Ok(body)
}

fn print_json(value: &Value, pretty: bool) -> Result<()> {
    let out = if pretty {
        serde_json::to_string_pretty(value)?
    } else {
        serde_json::to_string(value)?
    };
    println!("{out}");
    Ok(())
}
