//! twscrape
//!
//! Command-line front end for the account pool and query engine:
//! 1. Manages the account directory (add, lock, unlock, inspect)
//! 2. Logs inactive accounts in
//! 3. Streams raw search pages as JSON lines on stdout
//!
//! Logs go to stderr as JSON.

mod config;

use std::sync::Arc;

use anyhow::{Context, Result, bail};
use futures_util::StreamExt;
use tracing::info;
use tracing_subscriber::EnvFilter;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};
use twitter_api::Api;
use twitter_auth::{Account, AccountStore, Authenticator};
use twitter_pool::Pool;

use crate::config::Config;

const USAGE: &str = "usage: twscrape [--config PATH] <command>

commands:
  accounts                                   print pool health as JSON
  add-account <username> <password> <email> <email_password> [mfa_secret]
  login                                      log in every inactive account
  lock <username> <queue>
  unlock <username> <queue>
  search <query> [--limit N]                 print raw pages as JSON lines";

#[derive(Debug, PartialEq, Eq)]
enum Command {
    Accounts,
    AddAccount {
        username: String,
        password: String,
        email: String,
        email_password: String,
        mfa_secret: Option<String>,
    },
    Login,
    Lock {
        username: String,
        queue: String,
    },
    Unlock {
        username: String,
        queue: String,
    },
    Search {
        query: String,
        limit: i64,
    },
}

/// Split `--config PATH` out of the argument list.
fn split_config_flag(args: &[String]) -> Result<(Option<&str>, Vec<&str>)> {
    let mut config_path = None;
    let mut rest = Vec::new();
    let mut iter = args.iter();
    while let Some(arg) = iter.next() {
        if arg == "--config" {
            let Some(path) = iter.next() else {
                bail!("--config requires a path");
            };
            config_path = Some(path.as_str());
        } else {
            rest.push(arg.as_str());
        }
    }
    Ok((config_path, rest))
}

impl Command {
    fn parse(args: &[&str]) -> Result<Self> {
        let command = match args {
            ["accounts"] => Command::Accounts,
            ["add-account", username, password, email, email_password, mfa @ ..]
                if mfa.len() <= 1 =>
            {
                Command::AddAccount {
                    username: (*username).to_owned(),
                    password: (*password).to_owned(),
                    email: (*email).to_owned(),
                    email_password: (*email_password).to_owned(),
                    mfa_secret: mfa.first().map(|s| (*s).to_owned()),
                }
            }
            ["login"] => Command::Login,
            ["lock", username, queue] => Command::Lock {
                username: (*username).to_owned(),
                queue: (*queue).to_owned(),
            },
            ["unlock", username, queue] => Command::Unlock {
                username: (*username).to_owned(),
                queue: (*queue).to_owned(),
            },
            ["search", query] => Command::Search {
                query: (*query).to_owned(),
                limit: -1,
            },
            ["search", query, "--limit", limit] => Command::Search {
                query: (*query).to_owned(),
                limit: limit
                    .parse()
                    .with_context(|| format!("invalid --limit value: {limit}"))?,
            },
            _ => bail!("{USAGE}"),
        };
        Ok(command)
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    // JSON logs on stderr; stdout carries command output
    tracing_subscriber::registry()
        .with(
            EnvFilter::try_from_env("LOG_LEVEL")
                .or_else(|_| EnvFilter::try_from_default_env())
                .unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with(
            tracing_subscriber::fmt::layer()
                .json()
                .with_writer(std::io::stderr),
        )
        .init();

    let args: Vec<String> = std::env::args().skip(1).collect();
    let (cli_config_path, rest) = split_config_flag(&args)?;
    let command = Command::parse(&rest)?;

    let config_path = Config::resolve_path(cli_config_path);
    info!(path = %config_path.display(), "loading configuration");
    let config = Config::load(&config_path)
        .with_context(|| format!("failed to load config from {}", config_path.display()))?;

    run(command, &config).await
}

async fn run(command: Command, config: &Config) -> Result<()> {
    let store = AccountStore::open(config.store.accounts_dir.clone())
        .await
        .with_context(|| {
            format!(
                "failed to open account directory {}",
                config.store.accounts_dir.display()
            )
        })?;
    let client = config.client_config();
    let http = client
        .build_http_client()
        .context("failed to build HTTP client")?;
    let pool = Pool::load(
        Arc::new(store),
        http.clone(),
        client.clone(),
        config.pool_config(),
    )
    .await
    .context("failed to load account pool")?;

    match command {
        Command::Accounts => {
            println!("{}", serde_json::to_string_pretty(&pool.health())?);
        }
        Command::AddAccount {
            username,
            password,
            email,
            email_password,
            mfa_secret,
        } => {
            let mut account = Account::new(&username, password, email, email_password);
            if let Some(secret) = mfa_secret {
                account = account.with_mfa_secret(secret);
            }
            pool.add_account(account)
                .await
                .with_context(|| format!("failed to add account {username}"))?;
            info!(%username, "account added");
        }
        Command::Login => {
            let authenticator = Authenticator::new(http, client, config.login_config());
            let summary = pool.login_all(&authenticator).await?;
            println!(
                "{}",
                serde_json::json!({
                    "total": summary.total,
                    "succeeded": summary.succeeded,
                    "failed": summary.failed,
                })
            );
        }
        Command::Lock { username, queue } => {
            pool.lock(&username, &queue)
                .await
                .with_context(|| format!("failed to lock {username} for {queue}"))?;
        }
        Command::Unlock { username, queue } => {
            pool.unlock(&username, &queue)
                .await
                .with_context(|| format!("failed to unlock {username} for {queue}"))?;
        }
        Command::Search { query, limit } => {
            let api = Api::new(pool, client, config.api_config());
            let mut pages = Box::pin(api.search_raw(&query, limit));
            let mut entries = 0;
            while let Some(page) = pages.next().await {
                let page = page.context("search failed")?;
                entries += page.entry_count;
                println!("{}", page.json);
            }
            info!(%query, entries, "search finished");
        }
    }

    Ok(())
}
