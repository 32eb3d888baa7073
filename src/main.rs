// Copyright (c) 2024-2025 Jesse Morgan / Morgan Forge
// SPDX-License-Identifier: AGPL-3.0-or-later

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use colored::Colorize;
use std::io::{self, IsTerminal, Read};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use stockgate::activity::{InputPump, TerminalCapture};
use stockgate::config::{default_config_path, load_config_from, save_config_to, Config};
use stockgate::error::format_error;
use stockgate::logging::{init_logging, Verbosity};
use stockgate::routes::{ForbiddenPage, Route, RouteTable};
use stockgate::runtime::{self, SessionDriver, SessionOutcome};
use stockgate::security::{
    decode_claims, AuthorizationGate, Decision, ExpiryReason, Guarded, RoleSet, TokenStore,
};
use stockgate::ui::{self, TerminalNavigator, TerminalPresenter};
use stockgate::utils::mask_token;

const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Exit codes following sysexits.h conventions
mod exit_codes {
    /// Success - operation completed successfully
    pub const SUCCESS: i32 = 0;
    /// General error - unspecified error
    pub const ERROR: i32 = 1;
    /// Usage error - unknown route or bad arguments
    pub const USAGE: i32 = 64;
    /// Data error - token could not be decoded
    pub const DATA_ERR: i32 = 65;
    /// No user - not logged in, or the session ended
    pub const NO_USER: i32 = 67;
    /// I/O error - token or config file operation failed
    pub const IO_ERR: i32 = 74;
    /// Permission denied - role does not grant the route
    pub const NO_PERM: i32 = 77;
    /// Configuration error - invalid config file
    pub const CONFIG: i32 = 78;
}

use exit_codes::*;

#[derive(Parser)]
#[command(name = "stockgate")]
#[command(version = VERSION)]
#[command(about = "Session and role gate for the materials inventory dashboard.")]
#[command(long_about = "stockgate - session and role gate for the materials dashboard\n\n\
    Store a token:       stockgate login --token <JWT>\n\
    Who am I:            stockgate whoami\n\
    Can I open a screen: stockgate check /stock\n\
    Open a screen:       stockgate open /stock\n\
    Configure:           stockgate config show")]
#[command(propagate_version = true)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Config file (defaults to ~/.stockgate/config.json)
    #[arg(long, global = true, value_name = "FILE")]
    config: Option<PathBuf>,

    /// Quiet mode: errors only
    #[arg(short = 'q', long, global = true)]
    quiet: bool,

    /// Verbose mode: debug logging
    #[arg(short = 'v', long, global = true)]
    verbose: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Store a session token issued by the backend
    ///
    /// Examples:
    ///   stockgate login --token eyJhbGciOi...
    ///   echo "$TOKEN" | stockgate login
    Login {
        /// Raw token (read from stdin when omitted)
        #[arg(long)]
        token: Option<String>,
    },

    /// Forget the stored token
    Logout,

    /// Show the user and roles of the stored token
    Whoami,

    /// Check whether a screen would render
    ///
    /// Exit status: 0 render, 77 forbidden, 67 login required.
    ///
    /// Examples:
    ///   stockgate check /stock
    Check {
        /// Route path, e.g. /materials
        path: String,
    },

    /// List the screens your roles can open
    Menu,

    /// Open a screen with a live session clock
    ///
    /// Keys: c continue, l log out, q leave. Any other input counts as activity.
    Open {
        /// Route path, e.g. /materials
        path: String,
    },

    /// Configuration
    ///
    /// Examples:
    ///   stockgate config show
    ///   stockgate config init
    Config {
        #[command(subcommand)]
        command: Option<ConfigCommands>,
    },
}

#[derive(Subcommand)]
enum ConfigCommands {
    /// Print the effective configuration
    Show,
    /// Write a config file with default values
    Init {
        /// Overwrite an existing file
        #[arg(long)]
        force: bool,
    },
    /// Print the config file location
    Path,
}

fn main() {
    let cli = Cli::parse();

    let config_path = match cli.config.clone().map(Ok).unwrap_or_else(default_config_path) {
        Ok(path) => path,
        Err(e) => {
            eprint!("{}", format_error(&e.to_string(), &[], &["Pass a config file with --config"]));
            std::process::exit(CONFIG);
        }
    };

    let config = match load_config_from(&config_path) {
        Ok(config) => config,
        Err(e) => {
            eprint!(
                "{}",
                format_error(
                    &format!("{:#}", e),
                    &["The file is not valid JSON", "A field has the wrong type"],
                    &["Run: stockgate config init --force"],
                )
            );
            std::process::exit(CONFIG);
        }
    };

    init_logging(&config.log_level, Verbosity::from_flags(cli.quiet, cli.verbose));

    let code = match run(cli.command, &config, &config_path) {
        Ok(code) => code,
        Err(e) => {
            tracing::error!("{:#}", e);
            eprintln!("{} {:#}", "[X]".red(), e);
            ERROR
        }
    };
    std::process::exit(code);
}

fn run(command: Commands, config: &Config, config_path: &Path) -> Result<i32> {
    match command {
        Commands::Login { token } => handle_login(&build_gate(config)?, token),
        Commands::Logout => handle_logout(&build_gate(config)?),
        Commands::Whoami => handle_whoami(&build_gate(config)?),
        Commands::Check { path } => handle_check(&build_gate(config)?, &config.route_table(), &path),
        Commands::Menu => handle_menu(&build_gate(config)?, &config.route_table()),
        Commands::Open { path } => {
            let rt = tokio::runtime::Runtime::new().context("Failed to create Tokio runtime")?;
            rt.block_on(handle_open(&build_gate(config)?, &config.route_table(), &path))
        }
        Commands::Config { command } => {
            handle_config(command.unwrap_or(ConfigCommands::Show), config, config_path)
        }
    }
}

fn build_gate(config: &Config) -> Result<AuthorizationGate> {
    let store: Arc<dyn TokenStore> = Arc::new(config.token_store()?);
    Ok(AuthorizationGate::new(store, config.gate_config()))
}

fn read_stdin_token() -> Result<String> {
    if io::stdin().is_terminal() {
        eprintln!("Paste the token and press Ctrl+D:");
    }
    let mut input = String::new();
    io::stdin()
        .read_to_string(&mut input)
        .context("Failed to read token from stdin")?;
    Ok(input)
}

fn handle_login(gate: &AuthorizationGate, token: Option<String>) -> Result<i32> {
    let raw = match token {
        Some(token) => token,
        None => read_stdin_token()?,
    };

    let claims = match decode_claims(&raw) {
        Ok(claims) => claims,
        Err(e) => {
            eprint!(
                "{}",
                format_error(
                    &e.to_string(),
                    &["The token was truncated when copying", "The value is not a JWT"],
                    &["Copy the full token from the login response"],
                )
            );
            return Ok(DATA_ERR);
        }
    };

    if gate.config().reject_expired_tokens && claims.is_expired_at(chrono::Utc::now().timestamp()) {
        eprintln!("{} Token has already expired; not stored", "[!]".yellow());
        return Ok(DATA_ERR);
    }

    let raw = raw.trim();
    let raw = raw.strip_prefix("Bearer ").unwrap_or(raw).trim();
    if let Err(e) = gate.store().set_token(raw) {
        eprintln!("{} Failed to store token: {}", "[X]".red(), e);
        return Ok(IO_ERR);
    }

    tracing::info!("LOGIN | user={} token={}", claims.user_id().unwrap_or("-"), mask_token(raw));
    println!(
        "{} Logged in as {} ({})",
        "[OK]".green(),
        claims.user_id().unwrap_or("unknown user").bold(),
        claims.roles
    );
    Ok(SUCCESS)
}

fn handle_logout(gate: &AuthorizationGate) -> Result<i32> {
    if let Err(e) = gate.store().clear_token() {
        eprintln!("{} Failed to clear token: {}", "[X]".red(), e);
        return Ok(IO_ERR);
    }
    println!("{} Logged out", "[OK]".green());
    Ok(SUCCESS)
}

fn not_logged_in() -> i32 {
    eprintln!("{} Not logged in. Run: stockgate login", "[!]".yellow());
    NO_USER
}

fn handle_whoami(gate: &AuthorizationGate) -> Result<i32> {
    if gate.authorize(&RoleSet::new()) == Decision::RedirectToLogin {
        return Ok(not_logged_in());
    }

    let (Some(raw), Ok(claims)) = (gate.store().get_token(), gate.store().claims()) else {
        return Ok(not_logged_in());
    };

    let format_time = |t: Option<chrono::DateTime<chrono::Utc>>| {
        t.map(|t| t.format("%Y-%m-%d %H:%M:%S UTC").to_string())
            .unwrap_or_else(|| "-".to_string())
    };

    println!("{:<8} {}", "User:".bold(), claims.user_id().unwrap_or("-"));
    println!("{:<8} {}", "Roles:".bold(), claims.roles);
    println!("{:<8} {}", "Issued:".bold(), format_time(claims.issued_at()));
    println!("{:<8} {}", "Expires:".bold(), format_time(claims.expires_at()));
    println!("{:<8} {}", "Token:".bold(), mask_token(&raw).dimmed());
    Ok(SUCCESS)
}

fn find_route<'a>(routes: &'a RouteTable, path: &str) -> Option<&'a Route> {
    let route = routes.find(path);
    if route.is_none() {
        eprint!(
            "{}",
            format_error(
                &format!("No screen at {}", path),
                &[],
                &["List the screens you can open: stockgate menu"],
            )
        );
    }
    route
}

fn exit_code_for(decision: Decision) -> i32 {
    match decision {
        Decision::Render => SUCCESS,
        Decision::RedirectToForbidden => NO_PERM,
        Decision::RedirectToLogin => NO_USER,
    }
}

fn show_forbidden(gate: &AuthorizationGate, route: &Route) {
    let page = ForbiddenPage::for_route(route, &gate.store().roles(), gate.config());
    println!();
    print!("{}", ui::render_forbidden(&page));
}

fn handle_check(gate: &AuthorizationGate, routes: &RouteTable, path: &str) -> Result<i32> {
    let Some(route) = find_route(routes, path) else {
        return Ok(USAGE);
    };

    let decision = gate.authorize(&route.allowed_roles);
    println!("{}", ui::render_decision(&route.path, decision, gate.redirect_route(decision)));
    if decision == Decision::RedirectToForbidden {
        show_forbidden(gate, route);
    }
    Ok(exit_code_for(decision))
}

fn handle_menu(gate: &AuthorizationGate, routes: &RouteTable) -> Result<i32> {
    if gate.authorize(&RoleSet::new()) == Decision::RedirectToLogin {
        return Ok(not_logged_in());
    }

    let roles = gate.store().roles();
    println!("{} {}\n", "Screens for".bold(), roles);
    print!("{}", ui::render_menu(&routes.navigation_menu(&roles)));
    Ok(SUCCESS)
}

async fn handle_open(gate: &AuthorizationGate, routes: &RouteTable, path: &str) -> Result<i32> {
    let Some(route) = find_route(routes, path) else {
        return Ok(USAGE);
    };

    let presenter = Arc::new(TerminalPresenter::new());
    let navigator = Arc::new(TerminalNavigator::new(&route.path));

    let view = match gate.guard(&route.allowed_roles, presenter, navigator.clone(), runtime::clock_now()) {
        Guarded::Render(view) => view,
        Guarded::Redirected(decision) => {
            if decision == Decision::RedirectToForbidden {
                show_forbidden(gate, route);
            } else {
                eprintln!("{} Not logged in. Run: stockgate login", "[!]".yellow());
            }
            return Ok(exit_code_for(decision));
        }
    };

    println!("{} {}", route.title.bold(), format!("({})", route.path).dimmed());
    println!(
        "{} {}  {} {}",
        "User:".dimmed(),
        view.user_id().unwrap_or("-"),
        "Roles:".dimmed(),
        view.roles()
    );
    println!("\n{}", "Screens:".dimmed());
    print!("{}", ui::render_menu(&routes.navigation_menu(view.roles())));
    println!(
        "\nSession times out after {}s of inactivity. {} continue  {} log out  {} leave (not during the warning)\n",
        gate.config().clock.session_timeout.as_secs(),
        "[c]".bold(),
        "[l]".bold(),
        "[q]".bold()
    );

    let capture = TerminalCapture::enable().context("Failed to enter raw terminal mode")?;
    let mut driver = SessionDriver::spawn(view);
    let pump = InputPump::start(driver.sender()).context("Failed to start input reader")?;

    let outcome = driver.wait().await;

    if let Err(e) = pump.stop() {
        tracing::warn!("Input reader ended with error: {}", e);
    }
    drop(capture);

    tracing::debug!("OPEN_FINISHED | route={} at={}", route.path, navigator.current_route());
    Ok(match outcome {
        SessionOutcome::Unmounted | SessionOutcome::Expired(ExpiryReason::Logout) => SUCCESS,
        SessionOutcome::Expired(ExpiryReason::Timeout) => NO_USER,
    })
}

fn handle_config(command: ConfigCommands, config: &Config, path: &Path) -> Result<i32> {
    match command {
        ConfigCommands::Show => {
            println!("{} {}\n", "Config:".bold(), path.display());
            println!("{}", serde_json::to_string_pretty(config)?);
            println!("\n{} {}", "Token file:".bold(), config.token_path()?.display());
        }
        ConfigCommands::Init { force } => {
            if path.exists() && !force {
                eprintln!(
                    "{} {} already exists (use --force to overwrite)",
                    "[!]".yellow(),
                    path.display()
                );
                return Ok(CONFIG);
            }
            save_config_to(&Config::default(), path)?;
            println!("{} Wrote {}", "[OK]".green(), path.display());
        }
        ConfigCommands::Path => println!("{}", path.display()),
    }
    Ok(SUCCESS)
}
