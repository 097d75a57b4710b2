//! Terminal prompts.
//!
//! dialoguer blocks on stdin, so every prompt runs on the blocking pool and
//! the client worker keeps being polled meanwhile.

use std::sync::{Mutex, MutexGuard, PoisonError};

use {
    anyhow::{Context, Result},
    dialoguer::{Confirm, Input, MultiSelect, Password, Select},
    secrecy::Secret,
    tokio_util::sync::CancellationToken,
};

async fn blocking<T, F>(f: F) -> Result<T>
where
    T: Send + 'static,
    F: FnOnce() -> Result<T, dialoguer::Error> + Send + 'static,
{
    let answer = tokio::task::spawn_blocking(f)
        .await
        .context("prompt task failed")?;
    Ok(answer?)
}

pub async fn select(prompt: impl Into<String>, items: Vec<String>, default: usize) -> Result<usize> {
    let prompt = prompt.into();
    blocking(move || {
        Select::new()
            .with_prompt(prompt)
            .items(&items)
            .default(default)
            .interact()
    })
    .await
}

/// Indices of the checked items, in list order.
pub async fn multi_select(prompt: impl Into<String>, items: Vec<String>) -> Result<Vec<usize>> {
    let prompt = prompt.into();
    blocking(move || MultiSelect::new().with_prompt(prompt).items(&items).interact()).await
}

pub async fn confirm(prompt: impl Into<String>, default: bool) -> Result<bool> {
    let prompt = prompt.into();
    blocking(move || Confirm::new().with_prompt(prompt).default(default).interact()).await
}

pub async fn input(
    prompt: impl Into<String>,
    default: Option<String>,
    allow_empty: bool,
) -> Result<String> {
    let prompt = prompt.into();
    blocking(move || {
        let mut input = Input::<String>::new()
            .with_prompt(prompt)
            .allow_empty(allow_empty);
        if let Some(default) = default {
            input = input.default(default);
        }
        input.interact_text()
    })
    .await
}

pub async fn password(prompt: impl Into<String>, allow_empty: bool) -> Result<Secret<String>> {
    let prompt = prompt.into();
    let value = blocking(move || {
        Password::new()
            .with_prompt(prompt)
            .allow_empty_password(allow_empty)
            .interact()
    })
    .await?;
    Ok(Secret::new(value))
}

/// Answer to a destructive-action warning.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Confirmation {
    pub proceed: bool,
    /// The user asked not to see this warning again.
    pub silence: bool,
}

pub async fn confirm_with_opt_out(prompt: impl Into<String>) -> Result<Confirmation> {
    let proceed = confirm(prompt, false).await?;
    let silence = proceed && confirm("Don't show this warning again?", false).await?;
    Ok(Confirmation { proceed, silence })
}

/// Token of the operation Ctrl-C should cancel, if one is running.
static ACTIVE: Mutex<Option<CancellationToken>> = Mutex::new(None);

fn active() -> MutexGuard<'static, Option<CancellationToken>> {
    ACTIVE.lock().unwrap_or_else(PoisonError::into_inner)
}

/// What a Ctrl-C press did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Interrupt {
    /// The running operation was cancelled.
    Cancelled,
    /// Nothing was running, so the program should quit.
    Quit,
}

/// Route a Ctrl-C press to the running operation, if any.
pub fn interrupt() -> Interrupt {
    match active().as_ref() {
        Some(token) => {
            token.cancel();
            Interrupt::Cancelled
        },
        None => Interrupt::Quit,
    }
}

/// Listen for Ctrl-C for the rest of the process.
///
/// Once tokio has installed its SIGINT handler the default action is gone
/// for good, including while a prompt is reading stdin. Ctrl-C therefore
/// cancels the running operation, and quits with status 130 otherwise.
pub fn install_interrupt_handler() {
    tokio::spawn(async {
        while tokio::signal::ctrl_c().await.is_ok() {
            match interrupt() {
                Interrupt::Cancelled => eprintln!("\nCancelling..."),
                Interrupt::Quit => {
                    let _ = console::Term::stderr().show_cursor();
                    eprintln!();
                    std::process::exit(130);
                },
            }
        }
    });
}

/// Restores the previously active token on drop.
struct ActiveGuard {
    previous: Option<CancellationToken>,
}

impl ActiveGuard {
    fn register(token: CancellationToken) -> Self {
        Self {
            previous: active().replace(token),
        }
    }
}

impl Drop for ActiveGuard {
    fn drop(&mut self) {
        *active() = self.previous.take();
    }
}

/// Await `fut`, cancelling `token` if Ctrl-C is pressed meanwhile.
pub async fn cancel_on_ctrl_c<F: IntoFuture>(token: CancellationToken, fut: F) -> F::Output {
    let _guard = ActiveGuard::register(token);
    fut.await
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn ctrl_c_cancels_running_operation_then_quits() {
        assert_eq!(interrupt(), Interrupt::Quit);

        let outer = CancellationToken::new();
        let inner = CancellationToken::new();
        let seen = cancel_on_ctrl_c(outer.clone(), async {
            cancel_on_ctrl_c(inner.clone(), async { interrupt() }).await
        })
        .await;

        assert_eq!(seen, Interrupt::Cancelled);
        assert!(inner.is_cancelled());
        assert!(!outer.is_cancelled());
        assert_eq!(interrupt(), Interrupt::Quit);
    }
}
