//! Operator CLI for a creditgate database.
//!
//! Credentials can be passed with `--credential` or the
//! `CREDITGATE_CREDENTIAL` environment variable; only their digest is used.

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{bail, Context};
use clap::{Args, Parser, Subcommand};
use serde_json::Value;
use tracing_subscriber::EnvFilter;

use creditgate::core::{Credential, IdentityDigest, RequestId};
use creditgate::store::SqliteStore;
use creditgate::{
    Admin, Auditor, ChargeRequest, ChainStatus, ConsumeGate, GateConfig, GateResponse,
};

#[derive(Parser)]
#[command(name = "creditgate-admin", about = "Administer a creditgate database")]
struct Cli {
    /// TOML configuration file.
    #[arg(long, global = true, env = "CREDITGATE_CONFIG")]
    config: Option<PathBuf>,

    /// Database path, overriding the configuration.
    #[arg(long, global = true)]
    db: Option<PathBuf>,

    #[command(subcommand)]
    cmd: Command,
}

#[derive(Args)]
struct Identity {
    /// Plaintext credential; digested immediately.
    #[arg(long, env = "CREDITGATE_CREDENTIAL", hide_env_values = true)]
    credential: Option<String>,

    /// Identity digest as 64 hex characters.
    #[arg(long, conflicts_with = "credential")]
    digest: Option<IdentityDigest>,
}

impl Identity {
    fn resolve(self) -> anyhow::Result<IdentityDigest> {
        match (self.credential, self.digest) {
            (_, Some(digest)) => Ok(digest),
            (Some(secret), None) if !secret.is_empty() => Ok(Credential::new(secret).into_digest()),
            _ => bail!("pass --credential or --digest"),
        }
    }
}

#[derive(Subcommand)]
enum Command {
    /// Create the database and apply migrations.
    Init,
    /// Provision a new identity.
    Create {
        #[command(flatten)]
        identity: Identity,
        #[arg(long)]
        contact: String,
        #[arg(long, default_value_t = 0)]
        credits: u64,
    },
    /// Add credits to an identity.
    Issue {
        #[command(flatten)]
        identity: Identity,
        #[arg(long)]
        amount: u64,
    },
    Deactivate {
        #[command(flatten)]
        identity: Identity,
    },
    Reactivate {
        #[command(flatten)]
        identity: Identity,
    },
    /// Show an identity's account.
    Balance {
        #[command(flatten)]
        identity: Identity,
    },
    /// List an identity's most recent ledger entries.
    Recent {
        #[command(flatten)]
        identity: Identity,
        #[arg(long)]
        limit: Option<usize>,
    },
    /// Compare an identity's balance with its ledger entries.
    Reconcile {
        #[command(flatten)]
        identity: Identity,
    },
    /// Totals across the whole ledger.
    Totals,
    /// Walk the ledger hash chain.
    Verify,
    /// Charge one invocation at the configured price.
    Consume {
        #[command(flatten)]
        identity: Identity,
        #[arg(long)]
        operation: String,
        /// Idempotency key; a fresh one is generated if omitted.
        #[arg(long)]
        request_id: Option<String>,
        /// JSON object recorded on the ledger entry.
        #[arg(long)]
        metadata: Option<String>,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let config = GateConfig::load(cli.config.as_deref()).context("loading configuration")?;
    let path = cli.db.unwrap_or_else(|| config.store.path.clone());
    let store = Arc::new(
        SqliteStore::open(&path, config.store.busy_timeout())
            .with_context(|| format!("opening {}", path.display()))?,
    );

    let admin = Admin::new(store.clone());
    let auditor = Auditor::new(store.clone(), config.ledger.recent_limit);

    match cli.cmd {
        Command::Init => {
            println!("initialized {}", path.display());
        }
        Command::Create {
            identity,
            contact,
            credits,
        } => {
            let digest = identity.resolve()?;
            let account = admin
                .create_identity_for_digest(&digest, &contact, credits)
                .await?;
            print_json(&account)?;
        }
        Command::Issue { identity, amount } => {
            let account = admin.issue_credits(&identity.resolve()?, amount).await?;
            print_json(&account)?;
        }
        Command::Deactivate { identity } => {
            print_json(&admin.deactivate(&identity.resolve()?).await?)?;
        }
        Command::Reactivate { identity } => {
            print_json(&admin.reactivate(&identity.resolve()?).await?)?;
        }
        Command::Balance { identity } => {
            let digest = identity.resolve()?;
            match admin.account(&digest).await? {
                Some(account) => print_json(&account)?,
                None => bail!("identity {digest} not found"),
            }
        }
        Command::Recent { identity, limit } => {
            print_json(&auditor.recent(&identity.resolve()?, limit).await?)?;
        }
        Command::Reconcile { identity } => {
            let report = auditor.reconcile(&identity.resolve()?).await?;
            print_json(&report)?;
            if !report.balanced {
                bail!("ledger does not reconcile");
            }
        }
        Command::Totals => {
            print_json(&auditor.totals().await?)?;
        }
        Command::Verify => {
            let report = auditor.verify_chain().await?;
            print_json(&report)?;
            if let ChainStatus::Broken { id, reason } = report.status {
                bail!("ledger chain broken at {id}: {reason}");
            }
        }
        Command::Consume {
            identity,
            operation,
            request_id,
            metadata,
        } => {
            let digest = identity.resolve()?;
            let Some((operation, cost)) = config.operations.lookup(&operation) else {
                bail!("unknown operation {operation}");
            };
            let request_id = match request_id {
                Some(id) => RequestId::parse(&id)?,
                None => RequestId::new_v4(),
            };
            let metadata: Value = match metadata {
                Some(text) => serde_json::from_str(&text).context("parsing --metadata")?,
                None => Value::Null,
            };

            let request =
                ChargeRequest::new(digest, cost, operation, request_id)?.with_metadata(metadata)?;
            let gate = ConsumeGate::new(store, config.usage_fee);
            let decision = gate.consume(&request).await;
            print_json(&GateResponse::from(&decision))?;
        }
    }

    Ok(())
}

fn print_json<T: serde::Serialize>(value: &T) -> anyhow::Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::error::ErrorKind;
    use clap::CommandFactory;

    const DIGEST: &str = "abababababababababababababababababababababababababababababababab";

    fn parse(args: &[&str]) -> Result<Cli, clap::Error> {
        Cli::try_parse_from(std::iter::once("creditgate-admin").chain(args.iter().copied()))
    }

    fn identity_of(cli: Cli) -> Identity {
        match cli.cmd {
            Command::Balance { identity } => identity,
            _ => panic!("expected balance command"),
        }
    }

    #[test]
    fn test_command_definition_is_consistent() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_credential_and_digest_conflict() {
        let err = parse(&["balance", "--credential", "sk-x", "--digest", DIGEST])
            .err()
            .unwrap();
        assert_eq!(err.kind(), ErrorKind::ArgumentConflict);
    }

    #[test]
    fn test_malformed_digest_rejected_at_parse() {
        let err = parse(&["balance", "--digest", "plaintext-key"]).err().unwrap();
        assert_eq!(err.kind(), ErrorKind::ValueValidation);
    }

    #[test]
    fn test_identity_resolution() {
        let by_digest = identity_of(parse(&["balance", "--digest", DIGEST]).unwrap());
        assert_eq!(by_digest.resolve().unwrap().to_hex(), DIGEST);

        let by_credential = identity_of(parse(&["balance", "--credential", "abc"]).unwrap());
        assert_eq!(
            by_credential.resolve().unwrap(),
            Credential::new("abc").digest()
        );

        let empty = identity_of(parse(&["balance", "--credential", ""]).unwrap());
        assert!(empty.resolve().is_err());
    }

    #[test]
    fn test_global_flags_and_defaults() {
        let cli = parse(&["create", "--digest", DIGEST, "--contact", "ops@example.com", "--db", "x.db"])
            .unwrap();
        assert_eq!(cli.db, Some(PathBuf::from("x.db")));
        let Command::Create { contact, credits, .. } = cli.cmd else {
            panic!("expected create command");
        };
        assert_eq!(contact, "ops@example.com");
        assert_eq!(credits, 0);

        assert!(matches!(parse(&["totals"]).unwrap().cmd, Command::Totals));
        assert!(parse(&["issue", "--digest", DIGEST]).is_err());
    }
}
