use std::process::ExitCode;

use arrrg::CommandLine;
use arrrg_derive::CommandLine;

use lifeec::cli_utils;
use lifeec::{Config, StartupError};

#[derive(CommandLine, Default, PartialEq, Eq)]
struct Args {
    #[arrrg(optional, "Host to bind the HTTP server (overrides HOST)")]
    host: Option<String>,
    #[arrrg(optional, "Port to bind the HTTP server (overrides PORT)")]
    port: Option<u16>,
}

const USAGE: &str = "USAGE: lifeecd [OPTIONS]";

const HELP_TEXT: &str = r#"lifeecd - LIFEEC care-facility API server

USAGE:
    lifeecd [OPTIONS]

OPTIONS:
    --host <HOST>        Host to bind the HTTP server [default: $HOST or 0.0.0.0]
    --port <PORT>        Port to bind the HTTP server [default: $PORT or 10000]

ENVIRONMENT:
    DATABASE_URL                 PostgreSQL connection URI
    APP_ENV                      "development" exposes error detail in 500 responses
    JWT_SECRET                   Checked for presence only
    CORS_ORIGINS                 Comma separated allow-list of origins
    HEALTH_CHECK_INTERVAL_SECS   Datastore probe interval [default: 30]
    SEED_ON_BOOT                 Reset privileged accounts during boot [default: false]
    SEED_PASSWORD                Password of the seeded accounts [default: 12345]
    BCRYPT_COST                  bcrypt cost factor [default: 10]
    RUST_LOG                     Log filter [default: lifeec=info,tower_http=info]

DESCRIPTION:
    Connects to the datastore, then serves the API under /api/v1/.  GET / lists
    the mounted resources.  Ctrl+C stops accepting connections, drains in-flight
    requests, closes the datastore connection and exits 0.  Startup failures and
    failed background tasks exit 1.

    Apply schema migrations with lifeec-migrate before the first start."#;

#[tokio::main(flavor = "current_thread")]
async fn main() -> ExitCode {
    let (args, free) = Args::from_command_line(USAGE);
    if free.first().map(String::as_str) == Some("help") {
        println!("{}", HELP_TEXT);
        return ExitCode::SUCCESS;
    }
    cli_utils::reject_free_arguments(&free, USAGE);
    cli_utils::init_tracing(cli_utils::DEFAULT_LOG_FILTER);

    let mut config = match Config::from_env() {
        Ok(config) => config,
        Err(err) => {
            let err = StartupError::from(err);
            tracing::error!(error = %err, "lifeecd exiting");
            return ExitCode::from(err.exit_status());
        }
    };
    if let Some(host) = args.host {
        config.host = host;
    }
    if let Some(port) = args.port {
        config.port = port;
    }

    lifeec::server::run(config).await
}
