mod app;
mod chat_commands;
mod interactive;
mod login;
mod prefs_commands;
mod prompt;
mod session_commands;

use {
    anyhow::Result,
    clap::{Parser, Subcommand},
    std::path::PathBuf,
    teletrim_sessions::SessionName,
    tracing::{info, warn},
    tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt},
};

use crate::app::App;

#[derive(Parser)]
#[command(
    name = "teletrim",
    version,
    about = "Teletrim: leave Telegram chats and delete their history in bulk"
)]
struct Cli {
    /// Defaults to the interactive menu.
    #[command(subcommand)]
    command: Option<Commands>,

    /// Log level (trace, debug, info, warn, error).
    #[arg(long, global = true, default_value = "warn")]
    log_level: String,

    /// Output logs as JSON instead of human-readable.
    #[arg(long, global = true, default_value_t = false)]
    json_logs: bool,

    /// Directory holding teletrim.toml.
    #[arg(long, global = true, env = "TELETRIM_CONFIG_DIR")]
    config_dir: Option<PathBuf>,
}

#[derive(Subcommand)]
enum Commands {
    /// Menu-driven session manager and chat browser.
    Interactive,
    /// Saved session management.
    Sessions {
        #[command(subcommand)]
        action: session_commands::SessionAction,
    },
    /// Log in to a new or existing session.
    Login {
        #[arg(long, short)]
        session: Option<String>,
    },
    /// Browse conversations.
    Chats {
        #[command(subcommand)]
        action: chat_commands::ChatAction,
    },
    /// Leave conversations and delete their history.
    Purge(chat_commands::PurgeArgs),
    /// Confirmation preferences.
    Prefs {
        #[command(subcommand)]
        action: prefs_commands::PrefsAction,
    },
}

fn init_telemetry(cli: &Cli) {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&cli.log_level));

    // stdout carries command output, so logs go to stderr.
    if cli.json_logs {
        tracing_subscriber::registry()
            .with(filter)
            .with(
                fmt::layer()
                    .json()
                    .with_target(true)
                    .with_thread_ids(false)
                    .with_writer(std::io::stderr),
            )
            .init();
    } else {
        tracing_subscriber::registry()
            .with(filter)
            .with(
                fmt::layer()
                    .with_target(false)
                    .with_thread_ids(false)
                    .with_ansi(true)
                    .with_writer(std::io::stderr),
            )
            .init();
    }
}

async fn login_command(app: &App, session: Option<String>) -> Result<()> {
    let name = session.as_deref().map(SessionName::parse).transpose()?;
    let Some(session) = login::login(app, name.as_ref()).await? else {
        return Ok(());
    };
    println!("Session {} is ready.", session.name);
    if let Err(e) = session.client.close().await {
        warn!(error = %e, "failed to close session cleanly");
    }
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    let cli = Cli::parse();
    init_telemetry(&cli);

    info!(version = env!("CARGO_PKG_VERSION"), "teletrim starting");
    prompt::install_interrupt_handler();

    if let Some(dir) = cli.config_dir.clone() {
        teletrim_config::set_config_dir(dir);
    }
    let mut app = App::new(teletrim_config::discover_and_load());

    match cli.command.unwrap_or(Commands::Interactive) {
        Commands::Interactive => interactive::run(&mut app).await,
        Commands::Sessions { action } => session_commands::handle_sessions(&mut app, action).await,
        Commands::Login { session } => login_command(&app, session).await,
        Commands::Chats { action } => chat_commands::handle_chats(&app, action).await,
        Commands::Purge(args) => chat_commands::handle_purge(&mut app, args).await,
        Commands::Prefs { action } => prefs_commands::handle_prefs(&mut app, action).await,
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use {super::*, clap::CommandFactory};

    #[test]
    fn cli_definition_is_valid() {
        Cli::command().debug_assert();
    }

    #[test]
    fn no_subcommand_means_interactive() {
        let cli = Cli::try_parse_from(["teletrim"]).unwrap();
        assert!(cli.command.is_none());
        assert_eq!(cli.log_level, "warn");
    }

    #[test]
    fn purge_takes_ids_and_flags() {
        let cli = Cli::try_parse_from([
            "teletrim",
            "purge",
            "--session",
            "work",
            "--yes",
            "--include-saved",
            "12",
            "-1001234",
        ])
        .unwrap();
        let Some(Commands::Purge(args)) = cli.command else {
            panic!("expected purge");
        };
        assert_eq!(args.ids, vec![12, -1001234]);
        assert!(args.yes);
        assert!(args.include_saved);
    }

    #[test]
    fn chats_show_requires_an_id() {
        assert!(Cli::try_parse_from(["teletrim", "chats", "show", "--session", "work"]).is_err());
    }
}
