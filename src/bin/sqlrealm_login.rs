//!
//! sqlrealm login probe
//! --------------------
//! Authenticates one user against the configured identity source and prints the
//! resolved identity (roles, canonical name, version) as JSON. Useful for checking
//! a realm deployment before wiring it into a host.

use std::env;
use std::fs;

use anyhow::{Context, Result};
use tracing::info;

use sqlrealm::identity::{AuthProvider, Dialect, RealmConfig, SqlRealm};

fn print_usage(program: &str) {
    eprintln!(
        "Usage:\n  {program} --user <u> [--password <p>] [--descriptor <url>] [--dialect postgres|snowflake] [--config <file.json>]\n\nFlags:\n  --user <u>               Login name, passed to the source verbatim\n  --password <p>           Secret; falls back to SQLREALM_PASSWORD\n  --descriptor <url>       Connection descriptor; falls back to the env var named in config (default JDBCURL)\n  --dialect <d>            Query dialect (default postgres)\n  --config <file>          JSON realm config; SQLREALM_* environment overrides apply when absent\n  -h, --help               Show this help\n\nExit status: 0 on login, 1 on rejection, 2 on usage errors."
    );
}

fn take_value(args: &[String], i: usize, flag: &str, program: &str) -> String {
    if i + 1 >= args.len() {
        eprintln!("{} requires a value", flag);
        print_usage(program);
        std::process::exit(2);
    }
    args[i + 1].clone()
}

#[tokio::main]
async fn main() -> Result<()> {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .or_else(|_| tracing_subscriber::EnvFilter::try_new("info"))?,
        )
        .try_init();

    let mut args: Vec<String> = env::args().collect();
    let program = args.remove(0);

    let mut user: Option<String> = None;
    let mut password: Option<String> = None;
    let mut descriptor: Option<String> = None;
    let mut dialect: Option<String> = None;
    let mut config_path: Option<String> = None;

    let mut i = 0;
    while i < args.len() {
        match args[i].as_str() {
            "--user" => { user = Some(take_value(&args, i, "--user", &program)); i += 2; }
            "--password" => { password = Some(take_value(&args, i, "--password", &program)); i += 2; }
            "--descriptor" => { descriptor = Some(take_value(&args, i, "--descriptor", &program)); i += 2; }
            "--dialect" => { dialect = Some(take_value(&args, i, "--dialect", &program)); i += 2; }
            "--config" => { config_path = Some(take_value(&args, i, "--config", &program)); i += 2; }
            "-h" | "--help" => { print_usage(&program); return Ok(()); }
            other => {
                eprintln!("unknown argument: {}", other);
                print_usage(&program);
                std::process::exit(2);
            }
        }
    }

    let Some(user) = user else {
        eprintln!("--user is required");
        print_usage(&program);
        std::process::exit(2);
    };
    let password = match password {
        Some(p) => p,
        None => env::var("SQLREALM_PASSWORD").context("no --password given and SQLREALM_PASSWORD is unset")?,
    };

    let mut cfg = match config_path {
        Some(p) => {
            let text = fs::read_to_string(&p).with_context(|| format!("reading config {}", p))?;
            RealmConfig::from_json_str(&text)?
        }
        None => RealmConfig::from_env()?,
    };
    if let Some(d) = descriptor { cfg.descriptor = Some(d); }
    if let Some(d) = dialect { cfg.dialect = d.parse::<Dialect>().map_err(anyhow::Error::msg)?; }

    info!(target: "sqlrealm", "login probe: user='{}' dialect={:?} env_var={}", user, cfg.dialect, cfg.descriptor_env_var);

    let realm = SqlRealm::postgres(&cfg);
    match realm.authenticate(&user, &password).await {
        Some(identity) => {
            println!("{}", serde_json::to_string_pretty(&identity.summary())?);
            Ok(())
        }
        None => {
            eprintln!("login rejected for '{}' (run with RUST_LOG=sqlrealm=debug for details)", user);
            std::process::exit(1);
        }
    }
}
