use std::io;
use std::path::PathBuf;

use clap::{Args, Parser, Subcommand, ValueEnum};
use futures_util::future::join_all;
use pipeline::config::{
    DEFAULT_API_URL, DEFAULT_CONNECT_TIMEOUT_SECS, DEFAULT_REQUEST_TIMEOUT_SECS, DEFAULT_STATE_DIR,
};
use pipeline::{ApiError, ApiRequest, Client, ConfigError, Method, PipelineConfig, RefreshOutcome, TransportError};
use serde_json::{Value, json};
use tracing::Level;

#[derive(Debug, thiserror::Error)]
enum CliError {
    #[error("invalid configuration: {0}")]
    Config(#[from] ConfigError),
    #[error(transparent)]
    Api(#[from] ApiError),
    #[error("request got no response: {0}")]
    Transport(#[from] TransportError),
    #[error("invalid JSON payload: {0}")]
    InvalidJson(#[from] serde_json::Error),
    #[error("server returned HTTP {status}: {body}")]
    Status { status: u16, body: Value },
    #[error("session refresh failed; log in again")]
    RefreshFailed,
}

#[derive(Parser, Debug)]
#[command(name = "skilltrack", about = "Skill tracker API client")]
struct Cli {
    #[arg(long, env = "SKILLTRACK_API_URL", default_value = DEFAULT_API_URL)]
    base_url: String,

    #[arg(long, env = "SKILLTRACK_STATE_DIR", default_value = DEFAULT_STATE_DIR)]
    state_dir: PathBuf,

    #[arg(long, env = "SKILLTRACK_REQUEST_TIMEOUT_SECS", default_value_t = DEFAULT_REQUEST_TIMEOUT_SECS)]
    request_timeout_secs: u64,

    #[arg(long, env = "SKILLTRACK_CONNECT_TIMEOUT_SECS", default_value_t = DEFAULT_CONNECT_TIMEOUT_SECS)]
    connect_timeout_secs: u64,

    #[arg(short, long, default_value_t = false)]
    verbose: bool,

    #[command(subcommand)]
    command: Command,
}

impl Cli {
    fn config(&self) -> PipelineConfig {
        let mut config = PipelineConfig::new(self.base_url.clone());
        config.state_dir.clone_from(&self.state_dir);
        config.request_timeout_secs = self.request_timeout_secs;
        config.connect_timeout_secs = self.connect_timeout_secs;
        config
    }
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Sign in and store the session.
    Login(LoginArgs),
    /// Revoke the server session and clear local state.
    Logout,
    /// Show the stored session.
    Whoami {
        /// Re-fetch profile and permissions first.
        #[arg(long, default_value_t = false)]
        sync: bool,
    },
    /// Exchange the refresh cookie for a new access token.
    Refresh,
    /// Send one request through the dispatcher.
    Api(ApiArgs),
    /// Send concurrent GETs through one dispatcher.
    Burst {
        path: String,
        #[arg(long, default_value_t = 3)]
        count: usize,
    },
    /// Set the persisted display theme.
    Theme { theme: Theme },
}

#[derive(Args, Debug)]
struct LoginArgs {
    #[arg(long)]
    email: String,

    #[arg(long, env = "SKILLTRACK_PASSWORD", hide_env_values = true)]
    password: String,
}

#[derive(Args, Debug)]
struct ApiArgs {
    method: HttpVerb,
    path: String,

    #[arg(long, help = "JSON request body")]
    data: Option<String>,
}

#[derive(ValueEnum, Clone, Copy, Debug)]
enum HttpVerb {
    Get,
    Post,
    Put,
    Patch,
    Delete,
}

impl From<HttpVerb> for Method {
    fn from(verb: HttpVerb) -> Self {
        match verb {
            HttpVerb::Get => Method::Get,
            HttpVerb::Post => Method::Post,
            HttpVerb::Put => Method::Put,
            HttpVerb::Patch => Method::Patch,
            HttpVerb::Delete => Method::Delete,
        }
    }
}

#[derive(ValueEnum, Clone, Copy, Debug)]
enum Theme {
    Dark,
    Light,
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<(), CliError> {
    let cli = Cli::parse();
    let level = if cli.verbose { Level::DEBUG } else { Level::INFO };
    tracing_subscriber::fmt().with_writer(io::stderr).with_max_level(level).with_target(false).init();

    let client = Client::from_config(&cli.config())?;

    match cli.command {
        Command::Login(args) => run_login(&client, args).await,
        Command::Logout => {
            client.logout().await;
            print_json(&json!({ "authenticated": false }))
        }
        Command::Whoami { sync } => run_whoami(&client, sync).await,
        Command::Refresh => run_refresh(&client).await,
        Command::Api(args) => run_api(&client, args).await,
        Command::Burst { path, count } => run_burst(&client, &path, count).await,
        Command::Theme { theme } => {
            client.session().set_dark_mode(matches!(theme, Theme::Dark));
            print_json(&serde_json::to_value(client.session().preferences())?)
        }
    }
}

async fn run_login(client: &Client, args: LoginArgs) -> Result<(), CliError> {
    let user = client.login(&args.email, &args.password).await?;
    print_json(&serde_json::to_value(user)?)
}

async fn run_whoami(client: &Client, sync: bool) -> Result<(), CliError> {
    if sync {
        client.sync_profile().await?;
        client.sync_permissions().await?;
    }
    let session = client.session().snapshot();
    print_json(&json!({
        "authenticated": session.is_authenticated(),
        "user": session.user,
        "permissions": session.permissions,
        "preferences": client.session().preferences(),
    }))
}

async fn run_refresh(client: &Client) -> Result<(), CliError> {
    match client.refresh_session().await {
        RefreshOutcome::Refreshed => print_json(&json!({ "refreshed": true })),
        RefreshOutcome::Failed => Err(CliError::RefreshFailed),
    }
}

async fn run_api(client: &Client, args: ApiArgs) -> Result<(), CliError> {
    let body = args.data.as_deref().map(serde_json::from_str::<Value>).transpose()?;
    let mut request = ApiRequest::new(args.method.into(), args.path);
    request.body = body;

    let response = client.dispatch(&request).await?;
    if !response.is_success() {
        return Err(CliError::Status { status: response.status, body: response.body });
    }
    print_json(&response.body)
}

async fn run_burst(client: &Client, path: &str, count: usize) -> Result<(), CliError> {
    let request = ApiRequest::get(path);
    let results = join_all((0..count).map(|_| client.dispatch(&request))).await;

    let statuses: Vec<Value> = results
        .into_iter()
        .enumerate()
        .map(|(index, result)| match result {
            Ok(response) => json!({ "index": index, "status": response.status }),
            Err(error) => json!({ "index": index, "error": error.to_string() }),
        })
        .collect();

    eprintln!(
        "burst complete: path={} count={} refresh_cycles={} reachable={}",
        path,
        count,
        client.refresh_cycles(),
        client.is_reachable()
    );
    print_json(&Value::Array(statuses))
}

fn print_json(value: &Value) -> Result<(), CliError> {
    let rendered = serde_json::to_string_pretty(value)?;
    println!("{rendered}");
    Ok(())
}

#[cfg(test)]
#[path = "main_test.rs"]
mod tests;
