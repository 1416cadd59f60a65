use clap::{Parser, Subcommand};
use reqwest::header::{HeaderMap, HeaderValue, AUTHORIZATION};
use serde_json::Value;

#[derive(Parser)]
#[command(name = "guard-cli")]
#[command(about = "Management CLI for the storefront guard service", long_about = None)]
struct Cli {
    #[arg(short, long, env = "GUARD_URL", default_value = "http://localhost:8080")]
    url: String,

    #[arg(short, long, env = "GUARD_ADMIN_KEY", default_value = "CHANGE_ME_IN_PRODUCTION")]
    key: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Version, uptime and live counters
    Status,
    /// Recent security events, newest first
    Events {
        #[arg(short, long, default_value_t = 20)]
        limit: usize,
    },
    /// Analytics aggregation summary
    Analytics,
    /// Tracked rate-limit keys and active presets
    RateLimits,
    /// Fetch a CSRF token, optionally for an existing session
    Token {
        #[arg(short, long)]
        session: Option<String>,
    },
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();
    let client = reqwest::Client::new();

    let mut headers = HeaderMap::new();
    headers.insert(
        AUTHORIZATION,
        HeaderValue::from_str(&format!("Bearer {}", cli.key))?,
    );

    let request = match cli.command {
        Commands::Status => client.get(format!("{}/admin/status", cli.url)).headers(headers),
        Commands::Events { limit } => client
            .get(format!("{}/admin/security-events", cli.url))
            .query(&[("limit", limit)])
            .headers(headers),
        Commands::Analytics => client.get(format!("{}/admin/analytics", cli.url)).headers(headers),
        Commands::RateLimits => client.get(format!("{}/admin/rate-limits", cli.url)).headers(headers),
        Commands::Token { session } => {
            let request = client.get(format!("{}/api/csrf-token", cli.url));
            match session {
                Some(session) => request.header("x-session-id", session),
                None => request,
            }
        }
    };

    print_response(request.send().await?).await
}

async fn print_response(res: reqwest::Response) -> Result<(), Box<dyn std::error::Error>> {
    let status = res.status();
    if !status.is_success() {
        eprintln!("Error: guard returned status {}", status);
        if let Ok(text) = res.text().await {
            eprintln!("Response: {}", text);
        }
        std::process::exit(1);
    }

    let json: Value = res.json().await?;
    println!("{}", serde_json::to_string_pretty(&json)?);
    Ok(())
}
