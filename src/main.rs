use std::path::PathBuf;

use clap::Parser;
use tracing::{debug, warn};

use google_auth_wizard::{
    ClientConfig, Config, ENV_PREFIX, LocalServerAuthorizer, OAuthClient, Result, ScopeClient,
    Session, SessionOutcome, TerminalSelector, TokenOrigin, TokenStorage, WizardError,
};

const DEFAULT_LOG_FILTER: &str = "warn";

/// Pick Google OAuth scopes interactively and obtain a token for them
#[derive(Debug, Parser)]
#[command(name = "google-auth-wizard", version, about)]
struct Cli {
    /// Path to the client secret JSON file
    #[arg(short = 'f', long, value_name = "PATH", required_unless_present = "clear_tokens")]
    file: Option<PathBuf>,

    /// Ignore the cached token and run a new authorization
    #[arg(short = 'n', long, env = "GOOGLE_AUTH_WIZARD_FORCE_NEW")]
    force_new: bool,

    /// Delete the cached token and exit
    #[arg(short = 'c', long)]
    clear_tokens: bool,

    /// Path to the YAML configuration file
    #[arg(long, value_name = "PATH", default_value = "config.yaml")]
    config: PathBuf,

    /// Log filter, e.g. `debug` or `google_auth_wizard=trace`
    #[arg(long, value_name = "FILTER", env = "RUST_LOG")]
    log_level: Option<String>,
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    let filter = log_filter(cli.log_level.as_deref(), |key| std::env::var(key).ok());
    init_tracing(&filter);

    if let Err(e) = run(cli, shows_token(&filter)).await {
        eprintln!("Error: {e}");
        std::process::exit(1);
    }
}

fn init_tracing(filter: &str) {
    use tracing_subscriber::EnvFilter;
    use tracing_subscriber::fmt;

    let filter =
        EnvFilter::try_new(filter).unwrap_or_else(|_| EnvFilter::new(DEFAULT_LOG_FILTER));
    fmt::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

/// Resolve the log filter; the silent switch wins over everything else
fn log_filter(cli_level: Option<&str>, env: impl Fn(&str) -> Option<String>) -> String {
    let enabled = |name: &str| {
        env(&format!("{ENV_PREFIX}{name}"))
            .is_some_and(|value| matches!(value.trim(), "true" | "1"))
    };

    if enabled("SILENT") {
        "off".to_string()
    } else if let Some(level) = cli_level.filter(|level| !level.trim().is_empty()) {
        level.to_string()
    } else if enabled("VERBOSE") {
        "trace".to_string()
    } else if enabled("DEBUG") {
        "debug".to_string()
    } else {
        DEFAULT_LOG_FILTER.to_string()
    }
}

fn shows_token(filter: &str) -> bool {
    filter.contains("debug") || filter.contains("trace")
}

async fn run(cli: Cli, show_token: bool) -> Result<()> {
    let storage = TokenStorage::new(TokenStorage::default_path());

    if cli.clear_tokens {
        storage.delete()?;
        println!("Token cache cleared: {}", storage.path().display());
        return Ok(());
    }

    let Some(file) = cli.file else {
        return Err(WizardError::Credentials(
            "client secret file is required (--file)".to_string(),
        ));
    };

    let config = Config::load_with_defaults(&cli.config);
    let config = match config.validate() {
        Ok(()) => config,
        Err(e) => {
            warn!("{}, using default configuration", e);
            Config::default()
        }
    };
    debug!("Using configuration: {:?}", config);

    let client = OAuthClient::new(ClientConfig::load(&file)?);
    let scopes = ScopeClient::new()
        .with_timeout(config.oauth.scope_timeout)
        .with_base_url(config.oauth.oauth_playground_url.clone())
        .with_scope_endpoint(config.oauth.scope_endpoint.clone());
    let picker = TerminalSelector::new().with_list_height(config.terminal.height);
    let authorizer = LocalServerAuthorizer::new(client, &config);

    let session = Session::new(scopes, picker, authorizer, storage).with_force_new(cli.force_new);

    match session.run().await? {
        SessionOutcome::Cancelled => {
            println!("Selection cancelled, no token requested.");
        }
        SessionOutcome::Authorized(auth) => {
            print!("{}", auth.report(show_token));
            match auth.origin {
                TokenOrigin::Cache => println!("Reused cached token."),
                TokenOrigin::Refreshed => println!("Refreshed cached token."),
                TokenOrigin::Handshake => {}
            }
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;

    fn env(vars: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let vars: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| vars.get(key).cloned()
    }

    #[test]
    fn test_log_filter_defaults_to_warn() {
        assert_eq!(log_filter(None, env(&[])), "warn");
        assert_eq!(log_filter(Some(" "), env(&[])), "warn");
    }

    #[test]
    fn test_log_filter_switches() {
        assert_eq!(
            log_filter(None, env(&[("GOOGLE_AUTH_WIZARD_DEBUG", "true")])),
            "debug"
        );
        assert_eq!(
            log_filter(
                None,
                env(&[
                    ("GOOGLE_AUTH_WIZARD_DEBUG", "1"),
                    ("GOOGLE_AUTH_WIZARD_VERBOSE", "1")
                ])
            ),
            "trace"
        );
        assert_eq!(
            log_filter(Some("info"), env(&[("GOOGLE_AUTH_WIZARD_DEBUG", "true")])),
            "info"
        );
        assert_eq!(
            log_filter(Some("debug"), env(&[("GOOGLE_AUTH_WIZARD_SILENT", "true")])),
            "off"
        );
        assert_eq!(
            log_filter(None, env(&[("GOOGLE_AUTH_WIZARD_DEBUG", "yes")])),
            "warn"
        );
    }

    #[test]
    fn test_shows_token_only_when_debugging() {
        assert!(shows_token("debug"));
        assert!(shows_token("google_auth_wizard=trace"));
        assert!(!shows_token("warn"));
        assert!(!shows_token("off"));
    }

    #[test]
    fn test_cli_requires_file_unless_clearing() {
        assert!(Cli::try_parse_from(["google-auth-wizard"]).is_err());

        let cli = Cli::try_parse_from(["google-auth-wizard", "--clear-tokens"]).unwrap();
        assert!(cli.clear_tokens);
        assert!(cli.file.is_none());

        let cli = Cli::try_parse_from(["google-auth-wizard", "-f", "secret.json", "-n"]).unwrap();
        assert_eq!(cli.file, Some(PathBuf::from("secret.json")));
        assert!(cli.force_new);
        assert_eq!(cli.config, PathBuf::from("config.yaml"));
    }
}
