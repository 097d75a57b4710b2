//! Menu-driven mode: pick or create a session, then browse and purge chats.

use {
    anyhow::Result,
    teletrim_chat::ChatList,
    teletrim_sessions::SessionName,
    teletrim_telegram::ClientHandle,
    tracing::warn,
};

use crate::{
    app::App,
    chat_commands::{fetch_chats, pick_chats, print_chats, purge, show_preview},
    login, prefs_commands, prompt,
    session_commands::{self, session_phone},
};

const ABOUT: &str = "\
Teletrim leaves unwanted Telegram chats and channels and wipes their message history.
Source: https://github.com/2high4schooltoday/Teletrim
Distributed under the GNU GPL v3 or later.";

enum ManagerChoice {
    Open(SessionName),
    New,
    Delete,
    Preferences,
    Quit,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Exit {
    /// Return to the session manager.
    Back,
    Quit,
}

pub async fn run(app: &mut App) -> Result<()> {
    loop {
        let choice = session_manager(app).await?;
        let session = match choice {
            ManagerChoice::Open(name) => login::login(app, Some(&name)).await?,
            ManagerChoice::New => login::login(app, None).await?,
            ManagerChoice::Delete => {
                delete_session(app).await?;
                continue;
            },
            ManagerChoice::Preferences => {
                prefs_commands::edit_interactive(app).await?;
                continue;
            },
            ManagerChoice::Quit => return Ok(()),
        };
        let Some(session) = session else {
            continue;
        };

        let exit = main_menu(app, &session.client).await;
        if let Err(e) = session.client.close().await {
            warn!(session = %session.name, error = %e, "failed to close session cleanly");
        }
        match exit {
            Ok(Exit::Quit) => return Ok(()),
            Ok(Exit::Back) => {},
            Err(e) => eprintln!("{e:#}"),
        }
    }
}

async fn session_manager(app: &App) -> Result<ManagerChoice> {
    let names = app.sessions.list()?;
    let mut items: Vec<String> = names
        .iter()
        .map(|name| format!("{name}  ({})", session_phone(app, name)))
        .collect();
    items.extend(
        ["New session", "Delete a session", "Preferences", "Quit"].map(String::from),
    );

    let picked = prompt::select("Session manager", items, 0).await?;
    let choice = match picked.checked_sub(names.len()) {
        None => ManagerChoice::Open(names[picked].clone()),
        Some(0) => ManagerChoice::New,
        Some(1) => ManagerChoice::Delete,
        Some(2) => ManagerChoice::Preferences,
        Some(_) => ManagerChoice::Quit,
    };
    Ok(choice)
}

async fn delete_session(app: &mut App) -> Result<()> {
    let names = app.sessions.list()?;
    if names.is_empty() {
        println!("No saved sessions.");
        return Ok(());
    }
    let mut items: Vec<String> = names.iter().map(ToString::to_string).collect();
    items.push("Cancel".into());
    let picked = prompt::select("Delete which session?", items, names.len()).await?;
    if let Some(name) = names.get(picked) {
        session_commands::delete(app, name, false).await?;
    }
    Ok(())
}

async fn main_menu(app: &mut App, client: &ClientHandle) -> Result<Exit> {
    let mut list = fetch_chats(client).await?;
    println!("{} conversations loaded.", list.len());

    const ITEMS: [&str; 7] = [
        "List chats",
        "Preview a chat",
        "Leave and delete chats",
        "Preferences",
        "About",
        "Back to session manager",
        "Quit",
    ];
    loop {
        let picked = prompt::select("Main menu", ITEMS.map(String::from).into(), 0).await?;
        match picked {
            0 => print_chats(&list),
            1 => preview_one(app, client, &list).await?,
            2 => {
                let Some(selection) = pick_chats(&list).await? else {
                    continue;
                };
                let plan = selection.plan();
                let report = purge(app, client, plan, false).await?;
                if report.is_some() {
                    list = fetch_chats(client).await?;
                }
            },
            3 => prefs_commands::edit_interactive(app).await?,
            4 => println!("{ABOUT}\nVersion {}", env!("CARGO_PKG_VERSION")),
            5 => return Ok(Exit::Back),
            _ => return Ok(Exit::Quit),
        }
    }
}

async fn preview_one(app: &App, client: &ClientHandle, list: &ChatList) -> Result<()> {
    if list.is_empty() {
        println!("No conversations.");
        return Ok(());
    }
    let items = list.iter().map(|e| format!("{} ({})", e.label, e.kind())).collect();
    let picked = prompt::select("Preview which chat?", items, 0).await?;
    let entry = &list.entries()[picked];
    // Preview errors keep the menu open.
    if let Err(e) = show_preview(client, entry, app.preview_limit()).await {
        eprintln!("{e:#}");
    }
    Ok(())
}
