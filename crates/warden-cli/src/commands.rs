use clap::{CommandFactory, Parser, Subcommand};
use clap_complete::{Shell, generate};
use std::path::PathBuf;
use std::sync::Arc;
use uuid::Uuid;

use warden_config::{ConfigLoader, WardenConfig};
use warden_core::{ActionRequest, ActorRole, Classification, Result, WardenError};
use warden_ledger::{AuditLedger, SqliteStore};
use warden_policy::{PolicyEngine, PolicyRule};

/// Warden — governance kernel for autonomous agents
#[derive(Parser)]
#[command(name = "warden", version, about, long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    /// Path to warden.toml config file
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Log level override (e.g. debug, info, warn, error)
    #[arg(short, long, global = true)]
    log_level: Option<String>,

    /// Enable verbose output (debug logging)
    #[arg(short, long, global = true, conflicts_with = "quiet")]
    verbose: bool,

    /// Suppress all log output (errors only)
    #[arg(short, long, global = true, conflicts_with = "verbose")]
    quiet: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Show current configuration
    Config {
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Validate the configuration and report warnings
    Doctor,
    /// Inspect the persisted audit ledger
    Ledger {
        #[command(subcommand)]
        action: LedgerAction,
    },
    /// Evaluate policy rules against a hypothetical action
    Policy {
        #[command(subcommand)]
        action: PolicyAction,
    },
    /// Initialize a new warden.toml in the current or home directory
    Init {
        /// Create in current directory instead of ~/.warden/
        #[arg(long)]
        local: bool,
    },
    /// Generate shell completions for bash, zsh, or fish
    Completions {
        /// Shell to generate completions for
        #[arg(value_enum)]
        shell: Shell,
    },
}

#[derive(Subcommand)]
enum LedgerAction {
    /// Replay the hash chain and report the first break, if any
    Verify,
    /// Print audit entries, newest last
    Export {
        /// Only entries from this correlation id
        #[arg(long)]
        correlation: Option<Uuid>,
        /// Limit to the most recent N entries
        #[arg(short = 'n', long)]
        limit: Option<usize>,
        /// Output as JSON lines
        #[arg(long)]
        json: bool,
    },
}

#[derive(Subcommand)]
enum PolicyAction {
    /// Run the configured rules against one hypothetical request
    Eval {
        /// Capability being invoked, e.g. "fs.delete"
        action_kind: String,
        /// What the action operates on
        target: String,
        /// Data classification: public, internal, sensitive, mandatory
        #[arg(long, default_value = "internal")]
        classification: String,
        /// Acting agent id
        #[arg(long, default_value = "agent")]
        actor: String,
    },
}

impl Cli {
    pub async fn run(self) -> Result<()> {
        let config_loader = ConfigLoader::load(self.config.as_deref())?;
        let config = config_loader.get();

        // Resolve log level: --verbose > --quiet > --log-level > config default
        let log_level = if self.verbose {
            "debug"
        } else if self.quiet {
            "error"
        } else {
            self.log_level.as_deref().unwrap_or(&config.logging.level)
        };

        if config.logging.format == "json" {
            tracing_subscriber::fmt()
                .with_env_filter(
                    tracing_subscriber::EnvFilter::try_from_default_env()
                        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(log_level)),
                )
                .json()
                .with_target(true)
                .init();
        } else {
            tracing_subscriber::fmt()
                .with_env_filter(
                    tracing_subscriber::EnvFilter::try_from_default_env()
                        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(log_level)),
                )
                .with_target(false)
                .init();
        }

        match self.command {
            Commands::Config { json } => Self::cmd_config(config, json),
            Commands::Doctor => Self::cmd_doctor(config),
            Commands::Ledger { action } => Self::cmd_ledger(config, action),
            Commands::Policy { action } => Self::cmd_policy(config, action),
            Commands::Init { local } => Self::cmd_init(local),
            Commands::Completions { shell } => {
                generate(shell, &mut Cli::command(), "warden", &mut std::io::stdout());
                Ok(())
            }
        }
    }

    fn cmd_config(config: WardenConfig, json: bool) -> Result<()> {
        if json {
            println!("{}", serde_json::to_string_pretty(&config)?);
        } else {
            let rendered = toml::to_string_pretty(&config)
                .map_err(|e| WardenError::Config(format!("failed to render config: {e}")))?;
            println!("{rendered}");
        }
        Ok(())
    }

    fn cmd_doctor(config: WardenConfig) -> Result<()> {
        match config.validate() {
            Ok(warnings) if warnings.is_empty() => {
                println!("configuration ok");
            }
            Ok(warnings) => {
                for w in &warnings {
                    println!("warning: {w}");
                }
            }
            Err(e) => {
                println!("{e}");
                return Err(WardenError::Config(e));
            }
        }
        Ok(())
    }

    fn cmd_ledger(config: WardenConfig, action: LedgerAction) -> Result<()> {
        let ledger = open_persisted_ledger(&config)?;
        match action {
            LedgerAction::Verify => {
                let report = ledger.verify_integrity()?;
                if report.valid {
                    println!("audit chain valid ({} entries)", ledger.len());
                    Ok(())
                } else {
                    let broken_at = report.broken_at.unwrap_or_default();
                    println!("audit chain BROKEN at index {broken_at}");
                    Err(WardenError::IntegrityFailure { broken_at })
                }
            }
            LedgerAction::Export {
                correlation,
                limit,
                json,
            } => {
                let mut entries = match correlation {
                    Some(id) => ledger.by_correlation(id)?,
                    None => ledger.export()?,
                };
                if let Some(n) = limit {
                    let skip = entries.len().saturating_sub(n);
                    entries.drain(..skip);
                }
                for entry in &entries {
                    if json {
                        println!("{}", serde_json::to_string(entry)?);
                    } else {
                        println!(
                            "#{:<6} {} {:<18} {:<16} {} — {}",
                            entry.index,
                            entry.timestamp.format("%Y-%m-%d %H:%M:%S"),
                            entry.decision.as_str(),
                            entry.actor_id,
                            entry.action_kind,
                            entry.reasoning,
                        );
                    }
                }
                Ok(())
            }
        }
    }

    fn cmd_policy(config: WardenConfig, action: PolicyAction) -> Result<()> {
        let PolicyAction::Eval {
            action_kind,
            target,
            classification,
            actor,
        } = action;

        let engine = PolicyEngine::new();
        for rule in &config.policy.rules {
            engine.register(Arc::new(rule.clone()) as Arc<dyn PolicyRule>);
        }

        let request = ActionRequest::new(
            actor,
            ActorRole::Agent,
            action_kind,
            target,
            parse_classification(&classification)?,
            serde_json::json!({}),
        );
        let verdict = engine.evaluate(&request);

        println!("decision:  {}", verdict.decision);
        println!("reasoning: {}", verdict.reasoning);
        if let Some(rule_id) = &verdict.rule_id {
            println!("rule:      {rule_id}");
        }
        if let Some(prompt) = &verdict.attestation_prompt {
            println!("attest:    {prompt}");
        }
        Ok(())
    }

    fn cmd_init(local: bool) -> Result<()> {
        let path = if local {
            PathBuf::from("warden.toml")
        } else {
            let dir = dirs::home_dir()
                .unwrap_or_else(|| PathBuf::from("."))
                .join(".warden");
            std::fs::create_dir_all(&dir)?;
            dir.join("warden.toml")
        };
        if path.exists() {
            return Err(WardenError::Config(format!(
                "{} already exists",
                path.display()
            )));
        }
        let rendered = toml::to_string_pretty(&WardenConfig::default())
            .map_err(|e| WardenError::Config(format!("failed to render config: {e}")))?;
        std::fs::write(&path, rendered)?;
        println!("wrote {}", path.display());
        Ok(())
    }
}

/// The ledger commands only make sense against a persisted backend.
fn open_persisted_ledger(config: &WardenConfig) -> Result<AuditLedger> {
    if config.ledger.backend != "sqlite" {
        return Err(WardenError::Config(
            "ledger commands require the sqlite backend (set ledger.backend = \"sqlite\")".into(),
        ));
    }
    let store = SqliteStore::open(&config.ledger.path)?;
    AuditLedger::open(Arc::new(store))
}

fn parse_classification(s: &str) -> Result<Classification> {
    match s {
        "public" => Ok(Classification::Public),
        "internal" => Ok(Classification::Internal),
        "sensitive" => Ok(Classification::Sensitive),
        "mandatory" => Ok(Classification::Mandatory),
        other => Err(WardenError::Config(format!(
            "unknown classification '{other}' (expected public, internal, sensitive, mandatory)"
        ))),
    }
}
