use clap::{Parser, Subcommand};
use serde_json::Value;
use tracing_subscriber::EnvFilter;

use soundboard_client::events::PushEvent;
use soundboard_client::{ApiRequest, ClientConfig, ClientError, LoginProvider, SessionClient, SessionState, paths};

#[derive(Debug, thiserror::Error)]
enum CliError {
    #[error(transparent)]
    Client(#[from] ClientError),
    #[error("invalid HTTP method: {0}")]
    InvalidMethod(String),
    #[error("invalid argument `{0}`; expected {1}")]
    InvalidArg(String, &'static str),
    #[error("invalid JSON payload: {0}")]
    InvalidJson(#[from] serde_json::Error),
    #[error("io failed: {0}")]
    Io(#[from] std::io::Error),
}

#[derive(Parser, Debug)]
#[command(name = "soundboard-client", about = "Soundboard API and push-socket CLI")]
struct Cli {
    #[arg(long, env = "SOUNDBOARD_ENDPOINT")]
    endpoint: Option<String>,

    #[arg(long, env = "SOUNDBOARD_REFRESH_TOKEN", hide_env_values = true)]
    refresh_token: Option<String>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Verify the session is authenticated.
    Check,
    /// List configured OAuth providers.
    Capabilities,
    /// Print login and logout URLs.
    Urls,
    /// Call an arbitrary API path.
    Request {
        method: String,
        path: String,
        #[arg(long, help = "JSON request body")]
        data: Option<String>,
        #[arg(long = "header", value_name = "K:V")]
        headers: Vec<String>,
        #[arg(long = "query", value_name = "K=V")]
        query: Vec<String>,
    },
    /// Stream push events as JSON lines until Ctrl-C.
    Watch {
        #[arg(long, default_value_t = false, help = "Also print the folded session state")]
        project: bool,
    },
}

#[tokio::main]
async fn main() -> Result<(), CliError> {
    dotenvy::dotenv().ok();
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")))
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let mut config = ClientConfig::from_env()?;
    if let Some(endpoint) = cli.endpoint {
        config.endpoint = endpoint.trim_end_matches('/').to_string();
    }
    if let Some(token) = cli.refresh_token.filter(|t| !t.is_empty()) {
        config.refresh_token = Some(token);
    }
    config.validate()?;

    match cli.command {
        Command::Check => {
            let client = SessionClient::new_lazy(config)?;
            print_json(&serde_json::to_value(client.check_auth().await?)?)
        }
        Command::Capabilities => {
            let client = SessionClient::new_lazy(config)?;
            print_json(&serde_json::to_value(client.login_capabilities().await?)?)
        }
        Command::Urls => {
            let client = SessionClient::new_lazy(config)?;
            println!("discord: {}", client.login_url(LoginProvider::Discord));
            println!("twitch:  {}", client.login_url(LoginProvider::Twitch));
            println!("logout:  {}", client.logout_url());
            Ok(())
        }
        Command::Request { method, path, data, headers, query } => {
            let client = SessionClient::new_lazy(config)?;
            let req = build_request(&method, &path, data.as_deref(), &headers, &query)?;
            print_json(&client.request_value(req).await?)
        }
        Command::Watch { project } => run_watch(config, project).await,
    }
}

fn build_request(
    method: &str,
    path: &str,
    data: Option<&str>,
    headers: &[String],
    query: &[String],
) -> Result<ApiRequest, CliError> {
    let method = reqwest::Method::from_bytes(method.to_ascii_uppercase().as_bytes())
        .map_err(|_| CliError::InvalidMethod(method.to_string()))?;

    let pairs = query
        .iter()
        .map(|pair| pair.split_once('=').ok_or_else(|| CliError::InvalidArg(pair.clone(), "K=V")))
        .collect::<Result<Vec<_>, _>>()?;
    let mut req = ApiRequest::new(method, format!("{path}{}", paths::query_string(&pairs)));

    for header in headers {
        let (name, value) = header
            .split_once(':')
            .ok_or_else(|| CliError::InvalidArg(header.clone(), "K:V"))?;
        req = req.header(name.trim(), value.trim());
    }
    if let Some(data) = data {
        req = req.json(serde_json::from_str::<Value>(data)?);
    }
    Ok(req)
}

async fn run_watch(config: ClientConfig, project: bool) -> Result<(), CliError> {
    let client = SessionClient::new_lazy(config)?;
    let mut events = client.push_events();
    client.socket().connect();
    let mut state = SessionState::new();

    loop {
        tokio::select! {
            signal = tokio::signal::ctrl_c() => {
                signal?;
                break;
            }
            event = events.recv() => {
                let Some(event) = event else { break };
                print_event(&event)?;
                if project {
                    state.apply(&event);
                    println!("{}", serde_json::to_string(&state)?);
                }
            }
        }
    }

    client.close().await;
    Ok(())
}

fn print_event(event: &PushEvent) -> Result<(), CliError> {
    println!("{}", serde_json::to_string(&event.to_envelope())?);
    Ok(())
}

fn print_json(value: &Value) -> Result<(), CliError> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

#[cfg(test)]
#[path = "main_test.rs"]
mod tests;
