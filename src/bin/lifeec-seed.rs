//! Operator tool that resets the privileged accounts.
//!
//! Every existing account is deleted and the Owner and Admin seed accounts are inserted
//! with freshly salted bcrypt hashes.  Because this is destructive it refuses to run
//! without `--confirm`.

use std::process::ExitCode;

use arrrg::CommandLine;
use arrrg_derive::CommandLine;

use lifeec::cli_utils;
use lifeec::sql::account::PgAccountStore;
use lifeec::{Config, SeedOutcome, default_seed_accounts, seed_privileged_accounts};

#[derive(CommandLine, Default, PartialEq, Eq)]
struct Options {
    #[arrrg(optional, "PostgreSQL database URL (overrides DATABASE_URL)")]
    database_url: Option<String>,
    #[arrrg(flag, "Confirm that every existing account may be deleted")]
    confirm: bool,
}

const USAGE: &str = r#"Usage: lifeec-seed [--database-url <URL>] --confirm

Reset the privileged accounts of a LIFEEC database.

DELETES EVERY ACCOUNT, then inserts:
  Owner User <owner@example.com>   (Owner)
  Admin User <admin@example.com>   (Admin)
with the password from SEED_PASSWORD (default 12345), hashed at BCRYPT_COST.

Arguments:
  --database-url <URL>    PostgreSQL database connection URL [default: $DATABASE_URL]
  --confirm               Required; acknowledges that existing accounts are deleted"#;

#[tokio::main(flavor = "current_thread")]
async fn main() -> ExitCode {
    let (options, free) = Options::from_command_line(USAGE);
    cli_utils::reject_free_arguments(&free, USAGE);
    if !options.confirm {
        cli_utils::exit_with_usage_error("refusing to delete accounts without --confirm", USAGE);
    }
    cli_utils::init_tracing(cli_utils::DEFAULT_LOG_FILTER);

    let config = match Config::from_env() {
        Ok(config) => config,
        Err(err) => cli_utils::exit_with_error(&err.to_string()),
    };
    let Some(url) = options.database_url.or(config.database_url) else {
        cli_utils::exit_with_usage_error("no database URL given", USAGE);
    };

    let pool = match sqlx::PgPool::connect(&url).await {
        Ok(pool) => pool,
        Err(err) => cli_utils::exit_with_error(&format!("could not connect: {}", err)),
    };
    let store = PgAccountStore::new(pool.clone());
    let seeds = default_seed_accounts(&config.seed_password);
    let outcome = seed_privileged_accounts(&store, &seeds, config.bcrypt_cost).await;
    pool.close().await;

    match outcome {
        SeedOutcome::Seeded(report) => {
            println!(
                "Seeded {} accounts ({} removed)",
                report.inserted, report.removed
            );
            ExitCode::SUCCESS
        }
        SeedOutcome::Failed => ExitCode::FAILURE,
    }
}
