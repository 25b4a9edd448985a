use clap::{Parser, Subcommand};
use reqwest::header::{HeaderMap, HeaderValue, AUTHORIZATION};
use serde_json::{json, Value};

#[derive(Parser)]
#[command(name = "custody-cli")]
#[command(about = "Management CLI for the custody engine", long_about = None)]
struct Cli {
    #[arg(short, long, default_value = "http://localhost:8080")]
    url: String,

    /// Admin API key.
    #[arg(short, long, default_value = "CHANGE_ME_IN_PRODUCTION")]
    key: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Engine version and status
    Status,
    /// Entity counts by status
    Stats,
    /// Show one transaction
    Transaction { id: String },
    /// Approve a transaction
    Approve {
        id: String,
        #[arg(long)]
        approver: String,
        #[arg(long)]
        mfa: bool,
    },
    /// Reject a transaction
    Reject {
        id: String,
        #[arg(long)]
        approver: String,
        #[arg(long)]
        reason: String,
    },
    /// Retry a failed transaction
    Retry { id: String },
    /// Show a batch and its members
    Batch { id: String },
    /// Show a cold storage request
    ColdStorage { id: String },
    /// Effective policy of a wallet
    Policy { wallet: String },
    /// MPC threshold availability of a wallet
    Threshold { wallet: String },
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();
    let client = reqwest::Client::new();
    let api = format!("{}/api/v1", cli.url);

    let mut headers = HeaderMap::new();
    headers.insert(
        AUTHORIZATION,
        HeaderValue::from_str(&format!("Bearer {}", cli.key))?,
    );

    let request = match cli.command {
        Commands::Status => client.get(format!("{}/admin/status", cli.url)).headers(headers),
        Commands::Stats => client.get(format!("{}/admin/stats", cli.url)).headers(headers),
        Commands::Transaction { id } => client.get(format!("{}/transactions/{}", api, id)),
        Commands::Approve { id, approver, mfa } => client
            .post(format!("{}/transactions/{}/approve", api, id))
            .json(&json!({ "approver_id": approver, "mfa_verified": mfa })),
        Commands::Reject { id, approver, reason } => client
            .post(format!("{}/transactions/{}/reject", api, id))
            .json(&json!({ "approver_id": approver, "reason": reason })),
        Commands::Retry { id } => client.post(format!("{}/transactions/{}/retry", api, id)),
        Commands::Batch { id } => client.get(format!("{}/batches/{}", api, id)),
        Commands::ColdStorage { id } => client.get(format!("{}/cold-storage/requests/{}", api, id)),
        Commands::Policy { wallet } => client.get(format!("{}/wallets/{}/policy", api, wallet)),
        Commands::Threshold { wallet } => client.get(format!("{}/mpc/wallets/{}/threshold", api, wallet)),
    };

    print_response(request.send().await?).await
}

async fn print_response(res: reqwest::Response) -> Result<(), Box<dyn std::error::Error>> {
    let status = res.status();
    let text = res.text().await?;
    if !status.is_success() {
        eprintln!("Error: engine returned status {}", status);
        eprintln!("Response: {}", text);
        std::process::exit(1);
    }

    let json: Value = serde_json::from_str(&text)?;
    println!("{}", serde_json::to_string_pretty(&json)?);
    Ok(())
}
