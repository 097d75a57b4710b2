use {anyhow::Result, clap::Subcommand, teletrim_config::Preferences};

use crate::{app::App, prompt};

#[derive(Subcommand)]
pub enum PrefsAction {
    /// Print the current preferences.
    Show,
    /// Change one or more preferences.
    Set {
        /// Ask before deleting a saved session.
        #[arg(long)]
        warn_session_delete: Option<bool>,
        /// Ask before leaving chats and deleting their history.
        #[arg(long)]
        warn_chat_delete: Option<bool>,
    },
}

pub async fn handle_prefs(app: &mut App, action: PrefsAction) -> Result<()> {
    match action {
        PrefsAction::Show => {
            print_prefs(&app.config.preferences);
            println!(
                "\nConfig file: {}",
                teletrim_config::find_or_default_config_path().display()
            );
        },
        PrefsAction::Set {
            warn_session_delete,
            warn_chat_delete,
        } => {
            if warn_session_delete.is_none() && warn_chat_delete.is_none() {
                return edit_interactive(app).await;
            }
            app.update_preferences(|p| apply(p, warn_session_delete, warn_chat_delete))?;
            print_prefs(&app.config.preferences);
        },
    }
    Ok(())
}

fn apply(prefs: &mut Preferences, warn_session_delete: Option<bool>, warn_chat_delete: Option<bool>) {
    if let Some(v) = warn_session_delete {
        prefs.warn_session_delete = v;
    }
    if let Some(v) = warn_chat_delete {
        prefs.warn_chat_delete = v;
    }
}

fn print_prefs(prefs: &Preferences) {
    println!("warn_session_delete = {}", prefs.warn_session_delete);
    println!("warn_chat_delete    = {}", prefs.warn_chat_delete);
}

/// Ask for each preference in turn and save the answers.
pub async fn edit_interactive(app: &mut App) -> Result<()> {
    let current = app.config.preferences.clone();
    let session = prompt::confirm(
        "Warn before deleting a session?",
        current.warn_session_delete,
    )
    .await?;
    let chat = prompt::confirm(
        "Warn before leaving and deleting chats?",
        current.warn_chat_delete,
    )
    .await?;

    if session == current.warn_session_delete && chat == current.warn_chat_delete {
        println!("Preferences unchanged.");
        return Ok(());
    }
    app.update_preferences(|p| apply(p, Some(session), Some(chat)))?;
    println!("Preferences saved.");
    Ok(())
}
