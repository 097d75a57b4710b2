use {
    anyhow::{Context, Result, bail},
    clap::{Args, Subcommand},
    teletrim_chat::{ChatEntry, ChatList, PurgePlan, PurgeReport, load_chats, preview},
    teletrim_sessions::SessionName,
    teletrim_telegram::ClientHandle,
};

use crate::{
    app::App,
    login,
    prompt::{self, cancel_on_ctrl_c},
};

#[derive(Subcommand)]
pub enum ChatAction {
    /// List the conversations of a session.
    List {
        #[arg(long, short)]
        session: String,
    },
    /// Show the latest messages of a conversation.
    Show {
        #[arg(long, short)]
        session: String,
        /// Conversation id, as printed by `chats list`.
        #[arg(allow_negative_numbers = true)]
        id: i64,
        /// Number of messages; defaults to `client.preview_limit`.
        #[arg(long)]
        limit: Option<usize>,
    },
}

#[derive(Args)]
pub struct PurgeArgs {
    #[arg(long, short)]
    pub session: String,
    /// Conversation ids. Without ids, a picker is shown.
    #[arg(allow_negative_numbers = true)]
    pub ids: Vec<i64>,
    /// Skip the confirmation prompt.
    #[arg(long, short)]
    pub yes: bool,
    /// Also clear Saved Messages when its id is given.
    #[arg(long)]
    pub include_saved: bool,
}

pub async fn handle_chats(app: &App, action: ChatAction) -> Result<()> {
    match action {
        ChatAction::List { session } => {
            let client = open(app, &session).await?;
            let result = fetch_chats(&client).await.map(|list| print_chats(&list));
            close(client).await;
            result
        },
        ChatAction::Show { session, id, limit } => {
            let client = open(app, &session).await?;
            let limit = limit.unwrap_or_else(|| app.preview_limit());
            let result = async {
                let list = fetch_chats(&client).await?;
                let entry = list
                    .get(id)
                    .with_context(|| format!("no conversation with id {id}"))?;
                show_preview(&client, entry, limit).await
            }
            .await;
            close(client).await;
            result
        },
    }
}

pub async fn handle_purge(app: &mut App, args: PurgeArgs) -> Result<()> {
    let client = open(app, &args.session).await?;
    let result = async {
        let list = fetch_chats(&client).await?;
        let plan = if args.ids.is_empty() {
            let Some(selection) = pick_chats(&list).await? else {
                return Ok(None);
            };
            selection.plan()
        } else {
            PurgePlan::build(&list, &args.ids, args.include_saved)
        };
        purge(app, &client, plan, args.yes).await
    }
    .await;
    close(client).await;
    result.map(|_| ())
}

async fn open(app: &App, session: &str) -> Result<ClientHandle> {
    let name = SessionName::parse(session)?;
    let session = login::resume(app.login_flow(), &name).await?;
    Ok(session.client)
}

async fn close(client: ClientHandle) {
    if let Err(e) = client.close().await {
        tracing::warn!(error = %e, "failed to close session cleanly");
    }
}

pub async fn fetch_chats(client: &ClientHandle) -> Result<ChatList> {
    let scoped = client.scoped();
    let list = cancel_on_ctrl_c(scoped.cancellation_token(), load_chats(&scoped))
        .await
        .context("failed to load chats")?;
    Ok(list)
}

pub fn print_chats(list: &ChatList) {
    if list.is_empty() {
        println!("No conversations.");
        return;
    }
    println!("{:>16}  {:<10}  NAME", "ID", "KIND");
    for entry in list.iter() {
        println!("{}", chat_row(entry));
    }
}

fn chat_row(entry: &ChatEntry) -> String {
    format!("{:>16}  {:<10}  {}", entry.id(), entry.kind().as_str(), entry.label)
}

pub async fn show_preview(client: &ClientHandle, entry: &ChatEntry, limit: usize) -> Result<()> {
    let scoped = client.scoped();
    let messages = cancel_on_ctrl_c(
        scoped.cancellation_token(),
        preview(&scoped, entry.peer(), limit),
    )
    .await
    .with_context(|| format!("failed to load messages of {}", entry.label))?;

    println!("--- {} ({}) ---", entry.label, entry.kind());
    if messages.is_empty() {
        println!("(no messages)");
    }
    for message in &messages {
        println!("{}", message.render());
    }
    Ok(())
}

/// Conversations ticked in the picker.
pub struct Selection<'a> {
    pub entries: Vec<&'a ChatEntry>,
    pub include_saved: bool,
}

impl Selection<'_> {
    pub fn plan(&self) -> PurgePlan {
        PurgePlan::for_entries(self.entries.iter().copied(), self.include_saved)
    }
}

/// Let the user tick conversations. `None` when nothing was picked.
pub async fn pick_chats(list: &ChatList) -> Result<Option<Selection<'_>>> {
    if list.is_empty() {
        println!("No conversations.");
        return Ok(None);
    }
    let items = list.iter().map(chat_row).collect();
    let picked = prompt::multi_select("Select conversations (space to tick, enter to confirm)", items).await?;
    if picked.is_empty() {
        println!("Nothing selected.");
        return Ok(None);
    }
    let entries = list.entries();
    let include_saved = if picked.iter().any(|&i| entries[i].is_saved) {
        prompt::confirm(
            "Saved Messages cannot be left, only cleared. Clear its history?",
            false,
        )
        .await?
    } else {
        false
    };
    Ok(Some(Selection {
        entries: picked.into_iter().map(|i| &entries[i]).collect(),
        include_saved,
    }))
}

/// Confirm and run a purge. `None` when nothing ran.
pub async fn purge(
    app: &mut App,
    client: &ClientHandle,
    plan: PurgePlan,
    assume_yes: bool,
) -> Result<Option<PurgeReport>> {
    if !plan.unknown.is_empty() {
        let unknown: Vec<String> = plan.unknown.iter().map(i64::to_string).collect();
        eprintln!("Unknown conversation ids: {}", unknown.join(", "));
    }
    if plan.skipped_saved {
        eprintln!("Skipping Saved Messages.");
    }
    if plan.is_empty() {
        if !plan.unknown.is_empty() {
            bail!("nothing to purge");
        }
        println!("Nothing to purge.");
        return Ok(None);
    }

    println!("About to purge:");
    for target in &plan.targets {
        let steps: Vec<String> = target.steps.iter().map(ToString::to_string).collect();
        println!("  {}: {}", target.label, steps.join(" then "));
    }

    if app.config.preferences.warn_chat_delete && !assume_yes {
        let answer = prompt::confirm_with_opt_out(format!(
            "Leave and delete {} conversation(s)? This cannot be undone.",
            plan.targets.len()
        ))
        .await?;
        if answer.silence {
            app.update_preferences(|p| p.warn_chat_delete = false)?;
        }
        if !answer.proceed {
            return Ok(None);
        }
    }

    let scoped = client.scoped();
    let purger = app.purger(scoped.cancellation_token());
    let report = cancel_on_ctrl_c(scoped.cancellation_token(), purger.run(&scoped, &plan)).await;
    print_report(&report);
    Ok(Some(report))
}

fn print_report(report: &PurgeReport) {
    for target in &report.targets {
        for step in &target.steps {
            if let Err(e) = &step.result {
                eprintln!("  {}: could not {}: {e}", target.label, step.step);
            }
        }
    }
    println!(
        "Done: {} succeeded, {} failed{}.",
        report.succeeded(),
        report.failed(),
        if report.cancelled { ", cancelled" } else { "" }
    );
}
