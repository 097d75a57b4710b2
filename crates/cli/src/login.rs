use {
    anyhow::{Result, bail},
    secrecy::ExposeSecret,
    teletrim_auth::{AuthorizedSession, LoginError, LoginFlow, LoginRequest, LoginState, Prefill},
    teletrim_sessions::SessionName,
    teletrim_telegram::Connector,
    tracing::debug,
};

use crate::{
    app::App,
    prompt::{self, cancel_on_ctrl_c},
};

const API_WALKTHROUGH: &[&str] = &[
    "Open https://my.telegram.org in a browser and log in with your phone number.",
    "Choose \"API development tools\".",
    "Create an application. Any title and short name will do.",
    "Copy the \"App api_id\" and \"App api_hash\" values into the form below.",
];

/// Log in interactively. `session` is resumed first when given.
///
/// Returns `None` when the user gives up.
pub async fn login(app: &App, session: Option<&SessionName>) -> Result<Option<AuthorizedSession>> {
    let mut flow = app.login_flow();
    if let Some(name) = session {
        let token = flow.cancellation_token();
        report(cancel_on_ctrl_c(token, flow.resume(name)).await.map(|_| ()));
    }

    loop {
        match flow.state().clone() {
            LoginState::NeedCredentials { prefill } => {
                if prefill.credentials.is_none() && prompt::confirm("Show how to get API credentials?", true).await? {
                    print_walkthrough();
                }
                let Some(request) = credentials_form(&prefill).await? else {
                    return Ok(None);
                };
                let token = flow.cancellation_token();
                report(
                    cancel_on_ctrl_c(token, flow.submit_credentials(request))
                        .await
                        .map(|_| ()),
                );
            },
            LoginState::AwaitingCode { phone } => {
                let code =
                    prompt::input(format!("Login code sent to {phone} via Telegram"), None, true).await?;
                let token = flow.cancellation_token();
                report(cancel_on_ctrl_c(token, flow.submit_code(&code)).await.map(|_| ()));
            },
            LoginState::AwaitingTwoFactor { hint } => {
                let label = match hint {
                    Some(hint) => format!("Two-factor password (hint: {hint})"),
                    None => "Two-factor password".to_string(),
                };
                let password = prompt::password(label, true).await?;
                let token = flow.cancellation_token();
                report(
                    cancel_on_ctrl_c(token, flow.submit_password(&password))
                        .await
                        .map(|_| ()),
                );
            },
            LoginState::Authorized { account } => {
                println!("Logged in as {account}.");
                return Ok(Some(flow.into_session()?));
            },
            LoginState::Failed { error } => {
                eprintln!("Login failed: {error}");
                if !prompt::confirm("Try again?", true).await? {
                    return Ok(None);
                }
                flow.reset()?;
            },
        }
    }
}

/// Resume a saved session without prompting.
pub async fn resume<C: Connector>(
    mut flow: LoginFlow<C>,
    name: &SessionName,
) -> Result<AuthorizedSession> {
    let token = flow.cancellation_token();
    cancel_on_ctrl_c(token, flow.resume(name)).await?;
    if !matches!(flow.state(), LoginState::Authorized { .. }) {
        bail!("session {name} is not logged in; run `teletrim login --session {name}` first");
    }
    Ok(flow.into_session()?)
}

/// Print recoverable errors. Fatal ones show up as the `Failed` state.
fn report(result: Result<(), LoginError>) {
    match result {
        Ok(()) => {},
        Err(e) if e.is_recoverable() => eprintln!("{e}"),
        Err(e) => debug!(error = %e, "login step failed"),
    }
}

fn print_walkthrough() {
    println!();
    println!("Getting API credentials:");
    for (i, step) in API_WALKTHROUGH.iter().enumerate() {
        println!("  {}. {step}", i + 1);
    }
    println!();
}

/// Ask for the login details. `None` when the user backs out.
async fn credentials_form(prefill: &Prefill) -> Result<Option<LoginRequest>> {
    let saved = prefill.credentials.as_ref();

    let session = prompt::input(
        "Session name",
        prefill.session.as_ref().map(ToString::to_string),
        false,
    )
    .await?;
    let api_id = prompt::input("API ID", saved.map(|c| c.api_id.to_string()), false).await?;

    let api_hash = match saved {
        Some(saved) => {
            let typed = prompt::password("API hash (empty keeps the saved one)", true).await?;
            if typed.expose_secret().is_empty() {
                saved.api_hash.clone()
            } else {
                typed
            }
        },
        None => prompt::password("API hash", false).await?,
    };

    let phone = prompt::input(
        "Phone number (international format)",
        saved.map(|c| c.phone.clone()),
        false,
    )
    .await?;

    let twofa_prompt = if saved.is_some_and(|c| c.twofa.is_some()) {
        "Two-factor password (optional, empty keeps the saved one)"
    } else {
        "Two-factor password (optional)"
    };
    let typed = prompt::password(twofa_prompt, true).await?;
    let twofa = if typed.expose_secret().is_empty() {
        saved.and_then(|c| c.twofa.clone())
    } else {
        Some(typed)
    };

    if !prompt::confirm("Connect now?", true).await? {
        return Ok(None);
    }
    Ok(Some(LoginRequest {
        session,
        api_id,
        api_hash,
        phone,
        twofa,
    }))
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use {
        super::*,
        secrecy::Secret,
        std::time::Duration,
        teletrim_auth::ConnectPolicy,
        teletrim_sessions::{CredentialStore, SessionCredentials, SessionDir},
        teletrim_telegram::{
            MessengerClient,
            fake::{FakeClient, FakeConnector},
        },
    };

    fn flow(store: &CredentialStore, client: FakeClient) -> LoginFlow<FakeConnector> {
        LoginFlow::new(FakeConnector::new(client), store.clone(), ConnectPolicy {
            attempts: 1,
            delay: Duration::from_millis(1),
            timeout: Duration::from_secs(5),
        })
    }

    fn saved(store: &CredentialStore, name: &SessionName) {
        store
            .save(name, &SessionCredentials {
                api_id: 1,
                api_hash: Secret::new("hash".into()),
                phone: "+15550100".into(),
                twofa: None,
            })
            .unwrap();
    }

    #[tokio::test]
    async fn resume_hands_over_a_logged_in_session() {
        let tmp = tempfile::tempdir().unwrap();
        let store = CredentialStore::new(SessionDir::new(tmp.path()));
        let name = SessionName::parse("work").unwrap();
        saved(&store, &name);

        let session = resume(flow(&store, FakeClient::authorized(9)), &name)
            .await
            .unwrap();
        assert_eq!(session.account.id, 9);
        assert_eq!(session.client.me().await.unwrap().id, 9);
    }

    #[tokio::test]
    async fn resume_refuses_a_logged_out_session() {
        let tmp = tempfile::tempdir().unwrap();
        let store = CredentialStore::new(SessionDir::new(tmp.path()));
        let name = SessionName::parse("work").unwrap();
        saved(&store, &name);

        let err = resume(flow(&store, FakeClient::new(9)), &name)
            .await
            .err()
            .unwrap();
        assert!(err.to_string().contains("teletrim login --session work"));
    }
}
