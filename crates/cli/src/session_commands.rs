use {
    anyhow::Result,
    clap::Subcommand,
    teletrim_sessions::{DeleteOutcome, SessionName},
    tracing::info,
};

use crate::{app::App, prompt};

#[derive(Subcommand)]
pub enum SessionAction {
    /// List saved sessions.
    List,
    /// Delete a saved session and its credentials.
    Delete {
        name: String,
        /// Skip the confirmation prompt.
        #[arg(long, short)]
        yes: bool,
    },
}

pub async fn handle_sessions(app: &mut App, action: SessionAction) -> Result<()> {
    match action {
        SessionAction::List => list(app),
        SessionAction::Delete { name, yes } => {
            let name = SessionName::parse(&name)?;
            delete(app, &name, yes).await.map(|_| ())
        },
    }
}

fn list(app: &App) -> Result<()> {
    let names = app.sessions.list()?;
    if names.is_empty() {
        println!("No saved sessions in {}.", app.sessions.root().display());
        return Ok(());
    }
    println!("{:<24} PHONE", "SESSION");
    for name in &names {
        println!("{:<24} {}", name.as_str(), session_phone(app, name));
    }
    Ok(())
}

/// Phone number saved for `name`, or a note that credentials are missing.
pub fn session_phone(app: &App, name: &SessionName) -> String {
    app.store
        .load(name)
        .map_or_else(|| "(no saved credentials)".to_string(), |creds| creds.phone)
}

/// Delete a session after confirming when the preference asks for it.
///
/// Returns whether anything was deleted.
pub async fn delete(app: &mut App, name: &SessionName, assume_yes: bool) -> Result<bool> {
    if !app.sessions.exists(name) && app.store.load(name).is_none() {
        println!("No session named {name}.");
        return Ok(false);
    }

    if app.config.preferences.warn_session_delete && !assume_yes {
        let answer = prompt::confirm_with_opt_out(format!(
            "Delete session {name}? You will have to log in again to use it."
        ))
        .await?;
        if answer.silence {
            app.update_preferences(|p| p.warn_session_delete = false)?;
        }
        if !answer.proceed {
            return Ok(false);
        }
    }

    let outcome = app.sessions.delete(name)?;
    println!("{}", describe_delete(name, outcome));
    info!(session = %name, "session deleted");
    Ok(outcome.removed_anything())
}

fn describe_delete(name: &SessionName, outcome: DeleteOutcome) -> String {
    match (outcome.session_file, outcome.credentials_file) {
        (true, true) => format!("Deleted session {name} and its credentials."),
        (true, false) => format!("Deleted session {name}."),
        (false, true) => format!("Deleted saved credentials of {name}."),
        (false, false) => format!("Nothing to delete for {name}."),
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use {super::*, rstest::rstest};

    #[rstest]
    #[case(true, true, "Deleted session work and its credentials.")]
    #[case(true, false, "Deleted session work.")]
    #[case(false, true, "Deleted saved credentials of work.")]
    #[case(false, false, "Nothing to delete for work.")]
    fn delete_messages(#[case] session_file: bool, #[case] credentials_file: bool, #[case] expected: &str) {
        let name = SessionName::parse("work").unwrap();
        let outcome = DeleteOutcome {
            session_file,
            credentials_file,
        };
        assert_eq!(describe_delete(&name, outcome), expected);
    }

    #[tokio::test]
    async fn delete_without_prompt_removes_files() {
        let tmp = tempfile::tempdir().unwrap();
        let mut config = teletrim_config::TeletrimConfig::default();
        config.storage.sessions_dir = Some(tmp.path().to_path_buf());
        let mut app = App::new(config);

        let name = SessionName::parse("work").unwrap();
        app.sessions.ensure().unwrap();
        std::fs::write(app.sessions.paths(&name).session_file, b"opaque").unwrap();

        assert!(delete(&mut app, &name, true).await.unwrap());
        assert!(!app.sessions.exists(&name));
        assert!(!delete(&mut app, &name, true).await.unwrap());
    }
}
