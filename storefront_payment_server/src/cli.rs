use std::{env, env::VarError};

const HELP: &str = include_str!("./cli-help.txt");

/// Configuration variables that are safe to echo. API keys, the card token key and the webhook secret are left out.
const PUBLIC_ENVS: &[&str] = &[
    "RUST_LOG",
    "SPG_HOST",
    "SPG_PORT",
    "SPG_DATABASE_URL",
    "SPG_USE_X_FORWARDED_FOR",
    "SPG_USE_FORWARDED",
    "SPG_GATEWAY_URL",
    "SPG_GATEWAY_TIMEOUT",
    "SPG_GATEWAY_MAX_ATTEMPTS",
    "SPG_WEBHOOK_HMAC_CHECKS",
    "SPG_POSTBACK_URL",
    "SPG_PIX_EXPIRY_DAYS",
    "SPG_BOLETO_EXPIRY_DAYS",
    "SPG_MAX_INSTALLMENTS",
    "SPG_INTEREST_RATE",
    "SPG_POLL_INTERVAL",
    "SPG_SCAN_INTERVAL",
    "SPG_MAX_POLL_ATTEMPTS",
];

/// The server is configured entirely through the environment. `--version` prints the version; any other argument
/// prints the help text and the current public configuration. Returns `true` when the process should exit.
pub fn handle_command_line_args() -> bool {
    let Some(arg) = env::args().nth(1) else {
        return false;
    };
    if arg == "--version" || arg == "-V" {
        println!("{} {}", env!("CARGO_PKG_NAME"), env!("CARGO_PKG_VERSION"));
        return true;
    }
    println!("\n{HELP}\n");
    println!("Current environment values (EXCLUDING variables that contain secrets):");
    for name in PUBLIC_ENVS {
        println!("  {name:<35} {:<15}", describe_env(name));
    }
    true
}

fn describe_env(name: &str) -> String {
    match env::var(name) {
        Ok(s) => s,
        Err(VarError::NotPresent) => "Not set".into(),
        Err(VarError::NotUnicode(s)) => format!("Invalid value: {}", s.to_string_lossy()),
    }
}
