//! skm - Command line interface for the secret key manager.
//!
//! This tool resolves secrets from the configured providers (environment,
//! dotenv/JSON/YAML files, password manager CLIs, the OS keyring), stores
//! them in writable providers, and manages which providers are active.

use anyhow::{Context, Result};
use clap::{CommandFactory, Parser, Subcommand};
use clap_complete::Shell;
use serde_json::Value;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::time::Duration;
use tracing::{error, warn, Level};
use tracing_subscriber::FmtSubscriber;

use skm_common::{Params, SecretValue};
use skm_manager::{KeyManager, LookupOptions, ManagerConfig, ProviderStatus};

#[derive(Parser)]
#[command(name = "skm")]
#[command(about = "Secret Key Manager - resolve secrets from multiple providers")]
#[command(version)]
struct Cli {
    /// Enable verbose logging.
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Configuration file (default: $SKM_CONFIG or the user config dir).
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Per-provider time budget in seconds.
    #[arg(long, global = true)]
    timeout: Option<u64>,

    /// Fail on duplicate provider registrations instead of replacing.
    #[arg(long, global = true)]
    strict: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Get a key.
    Get {
        /// Name of the key to get.
        key: String,

        /// Specific provider(s) to use, queried in the given order.
        #[arg(short, long = "provider")]
        providers: Vec<String>,

        /// Provider parameter as NAME=VALUE (e.g. file_path=./keys.json).
        #[arg(long = "param", value_parser = parse_param)]
        params: Vec<(String, String)>,
    },

    /// Set a key value and optionally persist it to providers.
    Set {
        /// Name of the key to set.
        key: String,

        /// Value to set the key to.
        value: String,

        /// Specific provider(s) to persist to.
        #[arg(short, long = "provider")]
        providers: Vec<String>,

        /// Do not persist the key to any provider.
        #[arg(long)]
        no_persist: bool,

        /// Provider parameter as NAME=VALUE.
        #[arg(long = "param", value_parser = parse_param)]
        params: Vec<(String, String)>,
    },

    /// Exit successfully only if a key can be resolved.
    Ensure {
        /// Name of the required key.
        key: String,

        /// Specific provider(s) to use.
        #[arg(short, long = "provider")]
        providers: Vec<String>,

        /// Provider parameter as NAME=VALUE.
        #[arg(long = "param", value_parser = parse_param)]
        params: Vec<(String, String)>,
    },

    /// Manage key providers.
    Providers {
        #[command(subcommand)]
        command: ProvidersCommand,
    },

    /// Generate shell completions.
    Completions {
        /// Target shell.
        shell: Shell,
    },
}

#[derive(Subcommand)]
enum ProvidersCommand {
    /// List active providers in resolution order.
    List,

    /// Show status of every registered provider.
    Status {
        /// Emit JSON instead of a table.
        #[arg(long)]
        json: bool,
    },

    /// List providers that support writing keys.
    Writable,

    /// Enable a provider and remember it in the configuration file.
    Enable {
        /// Name of the provider to enable.
        name: String,
    },

    /// Disable a provider and remember it in the configuration file.
    Disable {
        /// Name of the provider to disable.
        name: String,
    },
}

fn parse_param(pair: &str) -> skm_common::Result<(String, String)> {
    Params::parse_pair(pair)
}

/// Loaded configuration plus the file it came from.
struct App {
    manager: KeyManager,
    config: ManagerConfig,
    config_path: PathBuf,
    timeout: Option<Duration>,
}

impl App {
    /// Build the manager from `config` with command-line overrides applied.
    ///
    /// Overrides only shape this process; `config` is kept as loaded so
    /// saving it never persists them.
    fn new(
        config: ManagerConfig,
        config_path: PathBuf,
        strict: bool,
        timeout: Option<Duration>,
    ) -> Result<Self> {
        let mut effective = config.clone();
        if strict {
            effective.strict_registration = true;
        }
        let manager =
            KeyManager::from_config(&effective).context("Failed to register providers")?;
        Ok(Self {
            manager,
            config,
            config_path,
            timeout,
        })
    }

    fn options(&self, providers: Vec<String>, params: Vec<(String, String)>) -> LookupOptions {
        LookupOptions {
            providers: (!providers.is_empty()).then_some(providers),
            params: params.into_iter().collect(),
            timeout: self.timeout,
        }
    }
}

#[tokio::main]
async fn main() -> Result<ExitCode> {
    let cli = Cli::parse();

    // Setup logging
    let level = if cli.verbose {
        Level::DEBUG
    } else {
        Level::INFO
    };

    let subscriber = FmtSubscriber::builder()
        .with_max_level(level)
        .with_target(false)
        .with_writer(std::io::stderr)
        .compact()
        .finish();
    tracing::subscriber::set_global_default(subscriber)?;

    if let Commands::Completions { shell } = cli.command {
        clap_complete::generate(shell, &mut Cli::command(), "skm", &mut std::io::stdout());
        return Ok(ExitCode::SUCCESS);
    }

    let config_path = ManagerConfig::resolve_path(cli.config.as_deref());
    let config = ManagerConfig::load(&config_path)
        .await
        .with_context(|| format!("Failed to load configuration from {}", config_path.display()))?;
    let mut app = App::new(
        config,
        config_path,
        cli.strict,
        cli.timeout.map(Duration::from_secs),
    )?;

    let ok = match cli.command {
        Commands::Get {
            key,
            providers,
            params,
        } => cmd_get(&app, &key, providers, params).await?,

        Commands::Set {
            key,
            value,
            providers,
            no_persist,
            params,
        } => cmd_set(&app, &key, value, providers, no_persist, params).await?,

        Commands::Ensure {
            key,
            providers,
            params,
        } => cmd_ensure(&app, &key, providers, params).await?,

        Commands::Providers { command } => match command {
            ProvidersCommand::List => cmd_providers_list(&app),
            ProvidersCommand::Status { json } => cmd_providers_status(&app, json)?,
            ProvidersCommand::Writable => cmd_providers_writable(&app),
            ProvidersCommand::Enable { name } => cmd_toggle(&mut app, &name, true).await?,
            ProvidersCommand::Disable { name } => cmd_toggle(&mut app, &name, false).await?,
        },

        Commands::Completions { .. } => true,
    };

    Ok(if ok { ExitCode::SUCCESS } else { ExitCode::FAILURE })
}

/// Print a key's value.
async fn cmd_get(
    app: &App,
    key: &str,
    providers: Vec<String>,
    params: Vec<(String, String)>,
) -> Result<bool> {
    let options = app.options(providers, params);
    let report = app.manager.lookup(key, &options).await?;

    if let Some(value) = &report.value {
        println!("{}", value.expose());
        return Ok(true);
    }

    let tried = report.tried().join(", ");
    if report.all_faulted() {
        error!("Key '{}' not found: every provider failed ({})", key, tried);
    } else {
        error!("Key '{}' not found in any of the providers: {}", key, tried);
    }
    Ok(false)
}

/// Set a key, persisting it to writable providers unless told otherwise.
async fn cmd_set(
    app: &App,
    key: &str,
    value: String,
    providers: Vec<String>,
    no_persist: bool,
    params: Vec<(String, String)>,
) -> Result<bool> {
    let mut persist = !no_persist;

    if persist {
        let writable = app.manager.get_writable_providers();
        let any_target = if providers.is_empty() {
            !writable.is_empty()
        } else {
            providers.iter().any(|p| writable.contains(p))
        };

        if !any_target {
            warn!("No writable providers available");
            if !providers.is_empty() {
                error!("Specified providers {:?} do not support writing", providers);
                return Ok(false);
            }
            warn!("Key will not be persisted");
            persist = false;
        }
    }

    let options = app.options(providers, params);
    let report = app
        .manager
        .write(key, &SecretValue::new(value), persist, &options)
        .await?;

    for target in &report.targets {
        eprintln!("  {}: {}", target.provider, target.outcome);
    }

    if !report.succeeded() {
        error!("Failed to persist key '{}'", key);
        return Ok(false);
    }

    println!("Key '{}' set successfully", key);
    if persist {
        println!("Key persisted to providers: {}", report.written().join(", "));
    } else {
        println!("Key not persisted to any provider");
    }
    Ok(true)
}

/// Check a key is resolvable.
async fn cmd_ensure(
    app: &App,
    key: &str,
    providers: Vec<String>,
    params: Vec<(String, String)>,
) -> Result<bool> {
    let options = app.options(providers, params);
    let present = app.manager.ensure_key(key, &options).await?;
    if present {
        println!("Key '{}' is available", key);
    }
    Ok(present)
}

fn cmd_providers_list(app: &App) -> bool {
    let providers = app.manager.get_providers();
    if providers.is_empty() {
        println!("No active providers");
        return true;
    }

    println!("Active providers:");
    for provider in providers {
        println!("  - {}", provider);
    }
    true
}

fn cmd_providers_status(app: &App, json: bool) -> Result<bool> {
    let status = app.manager.get_provider_status();
    if json {
        println!("{}", serde_json::to_string_pretty(&status)?);
        return Ok(true);
    }

    if status.is_empty() {
        println!("No providers registered");
    } else {
        println!("Provider status:");
        print!("{}", render_status(&status));
    }
    Ok(true)
}

fn cmd_providers_writable(app: &App) -> bool {
    let writable = app.manager.get_writable_providers();
    if writable.is_empty() {
        println!("No writable providers available");
        return true;
    }

    println!("Writable providers:");
    for provider in writable {
        println!("  - {}", provider);
    }
    true
}

/// Enable or disable a provider and persist the choice.
async fn cmd_toggle(app: &mut App, name: &str, enabled: bool) -> Result<bool> {
    let known = if enabled {
        app.manager.enable_provider(name)
    } else {
        app.manager.disable_provider(name)
    };
    if !known {
        error!("Provider '{}' not found", name);
        return Ok(false);
    }

    app.config.set_provider_enabled(name, enabled);
    save_config(&app.config, &app.config_path).await?;

    println!(
        "Provider '{}' {}",
        name,
        if enabled { "enabled" } else { "disabled" }
    );
    Ok(true)
}

async fn save_config(config: &ManagerConfig, path: &Path) -> Result<()> {
    config
        .save(path)
        .await
        .with_context(|| format!("Failed to save configuration to {}", path.display()))
}

/// Render provider status as an aligned table sorted by priority.
fn render_status(status: &BTreeMap<String, ProviderStatus>) -> String {
    let mut rows: Vec<(&String, &ProviderStatus)> = status.iter().collect();
    rows.sort_by(|a, b| (a.1.priority, a.0).cmp(&(b.1.priority, b.0)));

    let width = rows
        .iter()
        .map(|(name, _)| name.len())
        .max()
        .unwrap_or(0)
        .max("PROVIDER".len());

    let mut out = format!(
        "  {:width$}  {:<10}  {:<10}  {:<10}  {}\n",
        "PROVIDER",
        "PRIORITY",
        "STATUS",
        "WRITABLE",
        "DETAILS",
        width = width
    );
    out.push_str(&format!(
        "  {}  {}  {}  {}  {}\n",
        "-".repeat(width),
        "-".repeat(10),
        "-".repeat(10),
        "-".repeat(10),
        "-".repeat(20)
    ));

    for (name, s) in rows {
        let state = if s.enabled { "Enabled" } else { "Disabled" };
        let writable = if s.supports_write { "Yes" } else { "No" };
        out.push_str(&format!(
            "  {:width$}  {:<10}  {:<10}  {:<10}  {}\n",
            name,
            s.priority,
            state,
            writable,
            describe(&s.capabilities),
            width = width
        ));
    }
    out
}

fn describe(capabilities: &serde_json::Map<String, Value>) -> String {
    capabilities
        .iter()
        .filter(|(k, _)| k.as_str() != "supports_write")
        .map(|(k, v)| match v {
            Value::String(s) => format!("{}={}", k, s),
            other => format!("{}={}", k, other),
        })
        .collect::<Vec<_>>()
        .join(", ")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cli_definition_is_valid() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_parse_get_with_providers_and_params() {
        let cli = Cli::try_parse_from([
            "skm",
            "get",
            "API_KEY",
            "-p",
            "json_file",
            "--provider",
            "keyring",
            "--param",
            "file_path=/tmp/k.json",
        ])
        .unwrap();

        match cli.command {
            Commands::Get {
                key,
                providers,
                params,
            } => {
                assert_eq!(key, "API_KEY");
                assert_eq!(providers, vec!["json_file", "keyring"]);
                assert_eq!(
                    params,
                    vec![("file_path".to_string(), "/tmp/k.json".to_string())]
                );
            }
            _ => panic!("expected get"),
        }
    }

    #[test]
    fn test_malformed_param_rejected() {
        assert!(Cli::try_parse_from(["skm", "get", "K", "--param", "novalue"]).is_err());
    }

    #[test]
    fn test_global_flags_after_subcommand() {
        let cli = Cli::try_parse_from([
            "skm",
            "providers",
            "status",
            "--json",
            "--strict",
            "--timeout",
            "5",
        ])
        .unwrap();
        assert!(cli.strict);
        assert_eq!(cli.timeout, Some(5));
    }

    #[test]
    fn test_render_status_sorted_by_priority() {
        let mut status = BTreeMap::new();
        let mut caps = serde_json::Map::new();
        caps.insert("supports_write".into(), Value::Bool(true));
        caps.insert("file_path".into(), Value::from("/tmp/keys.json"));
        status.insert(
            "json_file".to_string(),
            ProviderStatus {
                enabled: true,
                priority: 30,
                supports_write: true,
                capabilities: caps,
            },
        );
        status.insert(
            "environment".to_string(),
            ProviderStatus {
                enabled: false,
                priority: 10,
                supports_write: false,
                capabilities: serde_json::Map::new(),
            },
        );

        let table = render_status(&status);
        let lines: Vec<&str> = table.lines().collect();
        assert_eq!(lines.len(), 4);
        assert!(lines[2].trim_start().starts_with("environment"));
        assert!(lines[2].contains("Disabled"));
        assert!(lines[3].contains("file_path=/tmp/keys.json"));
        assert!(!lines[3].contains("supports_write"));
    }

    #[tokio::test]
    async fn test_toggle_persists_to_config() {
        let dir = tempfile::TempDir::new().unwrap();
        let config_path = dir.path().join("config.json");
        let mut app =
            App::new(ManagerConfig::default(), config_path.clone(), false, None).unwrap();

        assert!(cmd_toggle(&mut app, "environment", false).await.unwrap());
        assert!(!app.manager.get_providers().contains(&"environment".to_string()));

        let saved = ManagerConfig::load(&config_path).await.unwrap();
        assert_eq!(saved.providers["environment"].enabled, Some(false));

        assert!(!cmd_toggle(&mut app, "ghost", true).await.unwrap());
    }

    #[tokio::test]
    async fn test_strict_flag_is_not_saved_by_toggle() {
        let dir = tempfile::TempDir::new().unwrap();
        let config_path = dir.path().join("config.json");
        let mut app =
            App::new(ManagerConfig::default(), config_path.clone(), true, None).unwrap();

        assert!(cmd_toggle(&mut app, "environment", false).await.unwrap());

        let saved = ManagerConfig::load(&config_path).await.unwrap();
        assert!(!saved.strict_registration);
        assert_eq!(saved.providers["environment"].enabled, Some(false));
        assert_eq!(
            app.manager.registry().policy(),
            skm_providers::ConflictPolicy::Reject
        );
    }
}
