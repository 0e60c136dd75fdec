use clap::Parser;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use notepm_core::config::ConfigInputs;
use notepm_mcp_runtime::{McpCommands, run as run_mcp};

#[derive(Parser)]
#[command(
    name = "notepm-mcp",
    version,
    about = "NotePM MCP server: a NotePM team workspace as MCP tools over stdio"
)]
struct Cli {
    /// NotePM team subdomain (https://<team>.notepm.jp)
    #[arg(long, env = "NOTEPM_TEAM")]
    team: Option<String>,

    /// NotePM API access token
    #[arg(long, env = "NOTEPM_API_TOKEN", hide_env_values = true)]
    api_token: Option<String>,

    /// Full API base URL; overrides the one derived from --team
    #[arg(long, env = "NOTEPM_API_BASE")]
    api_base: Option<String>,

    /// Max characters kept per free-text field in search results
    #[arg(long, env = "NOTEPM_MAX_BODY_LENGTH")]
    max_body_length: Option<usize>,

    /// Per-request timeout for NotePM API calls, in seconds
    #[arg(long, env = "NOTEPM_REQUEST_TIMEOUT_SECS")]
    request_timeout_secs: Option<u64>,

    /// Reject tool arguments that are not declared in the tool's input schema
    #[arg(long, env = "NOTEPM_STRICT_ARGUMENTS")]
    strict_arguments: bool,

    #[command(subcommand)]
    command: Option<McpCommands>,
}

#[tokio::main]
async fn main() {
    let _ = dotenvy::dotenv();

    // stdout carries the protocol; logs go to stderr.
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "notepm_mcp=info,notepm_mcp_runtime=info".into()),
        )
        .with(
            tracing_subscriber::fmt::layer()
                .json()
                .with_writer(std::io::stderr),
        )
        .init();

    let cli = Cli::parse();
    let inputs = ConfigInputs {
        team: cli.team,
        api_token: cli.api_token,
        api_base: cli.api_base,
        max_body_length: cli.max_body_length,
        request_timeout_secs: cli.request_timeout_secs,
        strict_arguments: cli.strict_arguments,
    };

    let code = run_mcp(inputs, cli.command.unwrap_or_default()).await;
    std::process::exit(code);
}
