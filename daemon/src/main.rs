mod broker;
mod hook_client;
mod logging;
mod route;

use std::io::BufRead;
use std::path::PathBuf;

use banjo_core::session_id::generate_session_id;
use banjo_core::settings::register_permission_hook;
use clap::{Parser, Subcommand};
use tracing::{info, warn};

use broker::Session;
use route::Route;

#[derive(Debug, Parser)]
#[command(name = "banjo", version, about = "Local agent-mediation broker between Claude Code and Codex")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Run one broker session, reading prompts from stdin (one per line)
    /// and emitting normalized turn events on stdout until EOF.
    Run {
        /// Which engine(s) to route prompts to.
        #[arg(long, env = "BANJO_ROUTE", default_value = "claude")]
        route: Route,

        /// Working directory the subprocess(es) run in.
        #[arg(long, env = "BANJO_CWD")]
        cwd: Option<PathBuf>,

        /// Resume this session id instead of generating a fresh one.
        #[arg(long, env = "BANJO_SESSION_ID")]
        session_id: Option<String>,

        /// Which engine's stop reason wins ties in duet mode.
        #[arg(long, env = "BANJO_PRIMARY_AGENT", default_value = "claude")]
        primary_agent: Route,

        /// Resume each engine's most recent session instead of starting fresh.
        #[arg(long, env = "BANJO_AUTO_RESUME", default_value_t = false)]
        auto_resume: bool,
    },

    /// Hook entry points invoked by the coding-assistant subprocess.
    Hook {
        #[command(subcommand)]
        hook: HookCommand,
    },

    /// Idempotently register the `PreToolUse` permission hook in
    /// `$HOME/.claude/settings.json`.
    InstallHook,
}

#[derive(Debug, Subcommand)]
enum HookCommand {
    /// `PreToolUse` hook: read a tool-call request on stdin, ask the daemon
    /// over `BANJO_PERMISSION_SOCKET` for a decision, print it back.
    Permission,
}

fn main() -> anyhow::Result<()> {
    logging::init();
    let cli = Cli::parse();

    match cli.command {
        Command::Run {
            route,
            cwd,
            session_id,
            primary_agent,
            auto_resume,
        } => run_session(route, cwd, session_id, primary_agent, auto_resume),
        Command::Hook { hook: HookCommand::Permission } => hook_client::run(),
        Command::InstallHook => install_hook(),
    }
}

fn run_session(
    route: Route,
    cwd: Option<PathBuf>,
    session_id: Option<String>,
    primary_agent: Route,
    auto_resume: bool,
) -> anyhow::Result<()> {
    let cwd = cwd
        .or_else(|| std::env::current_dir().ok())
        .unwrap_or_else(|| PathBuf::from("."));
    let session_id = session_id.unwrap_or_else(|| generate_session_id(Some("banjo")));

    info!(%session_id, route = ?route, cwd = %cwd.display(), "starting broker session");

    let mut session = Session::new(route, cwd, session_id)
        .with_auto_resume(auto_resume)
        .with_primary(primary_agent);
    let stdin = std::io::stdin();
    for line in stdin.lock().lines() {
        let line = line?;
        let prompt = line.trim();
        if prompt.is_empty() {
            continue;
        }
        match session.run_prompt(prompt) {
            Ok(reason) => info!(stop_reason = ?reason, "prompt finished"),
            Err(err) => warn!(error = %err, "prompt failed"),
        }
    }

    session.shutdown();
    Ok(())
}

fn install_hook() -> anyhow::Result<()> {
    let home = dirs::home_dir().ok_or_else(|| anyhow::anyhow!("could not resolve $HOME"))?;
    register_permission_hook(&home)?;
    println!("permission hook registered in {}", home.join(".claude").join("settings.json").display());
    Ok(())
}
