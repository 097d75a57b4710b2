//! Dedicated task that owns a client and serves calls one at a time.

use std::time::Duration;

use {
    async_trait::async_trait,
    secrecy::Secret,
    tokio::{
        sync::{mpsc, oneshot},
        task::JoinHandle,
        time::Instant,
    },
    tokio_util::sync::CancellationToken,
    tracing::{debug, trace, warn},
};

use crate::{
    client::MessengerClient,
    error::ClientError,
    types::{Account, Conversation, MessagePreview, PeerRef},
};

type Reply<T> = oneshot::Sender<Result<T, ClientError>>;

enum Request {
    IsAuthorized(Reply<bool>),
    RequestLoginCode {
        phone: String,
        reply: Reply<()>,
    },
    SignIn {
        code: String,
        reply: Reply<Account>,
    },
    CheckPassword {
        password: Secret<String>,
        reply: Reply<Account>,
    },
    Me(Reply<Account>),
    Dialogs(Reply<Vec<Conversation>>),
    RecentMessages {
        peer: PeerRef,
        limit: usize,
        reply: Reply<Vec<MessagePreview>>,
    },
    DeleteHistory {
        peer: PeerRef,
        reply: Reply<()>,
    },
    Leave {
        peer: PeerRef,
        reply: Reply<()>,
    },
    Disconnect(Reply<()>),
}

impl Request {
    fn op(&self) -> &'static str {
        match self {
            Self::IsAuthorized(_) => "is_authorized",
            Self::RequestLoginCode { .. } => "request_login_code",
            Self::SignIn { .. } => "sign_in",
            Self::CheckPassword { .. } => "check_password",
            Self::Me(_) => "me",
            Self::Dialogs(_) => "dialogs",
            Self::RecentMessages { .. } => "recent_messages",
            Self::DeleteHistory { .. } => "delete_history",
            Self::Leave { .. } => "leave",
            Self::Disconnect(_) => "disconnect",
        }
    }

    /// The caller stopped waiting for the answer.
    fn reply_closed(&self) -> bool {
        match self {
            Self::IsAuthorized(reply) => reply.is_closed(),
            Self::RequestLoginCode { reply, .. }
            | Self::DeleteHistory { reply, .. }
            | Self::Leave { reply, .. }
            | Self::Disconnect(reply) => reply.is_closed(),
            Self::SignIn { reply, .. } | Self::CheckPassword { reply, .. } | Self::Me(reply) => {
                reply.is_closed()
            },
            Self::Dialogs(reply) => reply.is_closed(),
            Self::RecentMessages { reply, .. } => reply.is_closed(),
        }
    }
}

/// A request plus the token of the handle that submitted it.
struct Envelope {
    request: Request,
    cancel: CancellationToken,
    /// Submission time plus the call timeout.
    deadline: Instant,
}

#[derive(Debug, Clone, Copy)]
pub struct WorkerOptions {
    /// Upper bound for each call, measured from submission. Time spent
    /// queued behind other calls counts against it.
    pub call_timeout: Duration,
    /// Requests that may wait in front of the worker.
    pub queue_depth: usize,
}

impl Default for WorkerOptions {
    fn default() -> Self {
        Self {
            call_timeout: Duration::from_secs(30),
            queue_depth: 16,
        }
    }
}

/// Owns a [`MessengerClient`] on its own task.
///
/// Calls are served strictly in submission order, one at a time. A call
/// whose handle is cancelled is abandoned and the worker moves on. Calls
/// whose caller already gave up, or whose deadline passed while queued, are
/// never started. Cancelling the root token (see [`ClientHandle::shutdown`])
/// stops the worker.
pub struct ClientWorker {
    client: Box<dyn MessengerClient>,
    rx: mpsc::Receiver<Envelope>,
    root: CancellationToken,
}

impl ClientWorker {
    pub fn spawn(
        client: Box<dyn MessengerClient>,
        options: WorkerOptions,
    ) -> (ClientHandle, JoinHandle<()>) {
        let (tx, rx) = mpsc::channel(options.queue_depth.max(1));
        let root = CancellationToken::new();
        let worker = Self {
            client,
            rx,
            root: root.clone(),
        };
        let task = tokio::spawn(worker.run());
        let handle = ClientHandle {
            tx,
            root: root.clone(),
            cancel: root,
            call_timeout: options.call_timeout,
        };
        (handle, task)
    }

    async fn run(mut self) {
        debug!("client worker started");
        loop {
            let envelope = tokio::select! {
                biased;
                _ = self.root.cancelled() => break,
                next = self.rx.recv() => match next {
                    Some(envelope) => envelope,
                    None => break,
                },
            };

            let Envelope {
                request,
                cancel,
                deadline,
            } = envelope;
            let op = request.op();
            if cancel.is_cancelled() || request.reply_closed() {
                trace!(op, "dropping request from departed caller");
                continue;
            }
            if Instant::now() >= deadline {
                debug!(op, "dropping request that expired in the queue");
                continue;
            }

            trace!(op, "serving client call");
            tokio::select! {
                biased;
                _ = cancel.cancelled() => {
                    debug!(op, "client call cancelled");
                },
                served = tokio::time::timeout_at(deadline, Self::serve(self.client.as_ref(), request)) => {
                    if served.is_err() {
                        warn!(op, "abandoned client call after timeout");
                    }
                },
            }
        }
        debug!("client worker stopped");
    }

    async fn serve(client: &dyn MessengerClient, request: Request) {
        // A send error means the caller gave up; nothing to do.
        match request {
            Request::IsAuthorized(reply) => {
                let _ = reply.send(client.is_authorized().await);
            },
            Request::RequestLoginCode { phone, reply } => {
                let _ = reply.send(client.request_login_code(&phone).await);
            },
            Request::SignIn { code, reply } => {
                let _ = reply.send(client.sign_in(&code).await);
            },
            Request::CheckPassword { password, reply } => {
                let _ = reply.send(client.check_password(&password).await);
            },
            Request::Me(reply) => {
                let _ = reply.send(client.me().await);
            },
            Request::Dialogs(reply) => {
                let _ = reply.send(client.dialogs().await);
            },
            Request::RecentMessages { peer, limit, reply } => {
                let _ = reply.send(client.recent_messages(&peer, limit).await);
            },
            Request::DeleteHistory { peer, reply } => {
                let _ = reply.send(client.delete_history(&peer).await);
            },
            Request::Leave { peer, reply } => {
                let _ = reply.send(client.leave(&peer).await);
            },
            Request::Disconnect(reply) => {
                let _ = reply.send(client.disconnect().await);
            },
        }
    }
}

/// Cloneable front end to a [`ClientWorker`].
#[derive(Clone)]
pub struct ClientHandle {
    tx: mpsc::Sender<Envelope>,
    root: CancellationToken,
    cancel: CancellationToken,
    call_timeout: Duration,
}

impl ClientHandle {
    /// A handle whose calls can be cancelled without stopping the worker.
    pub fn scoped(&self) -> Self {
        Self {
            cancel: self.cancel.child_token(),
            ..self.clone()
        }
    }

    /// Token observed by calls made through this handle.
    pub fn cancellation_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    pub fn call_timeout(&self) -> Duration {
        self.call_timeout
    }

    /// Stop the worker. Pending and future calls fail with `Cancelled`.
    pub fn shutdown(&self) {
        self.root.cancel();
    }

    /// Persist the session, then stop the worker.
    pub async fn close(self) -> Result<(), ClientError> {
        let result = self.disconnect().await;
        self.shutdown();
        result
    }

    async fn call<T>(
        &self,
        make: impl FnOnce(Reply<T>) -> Request,
    ) -> Result<T, ClientError> {
        if self.cancel.is_cancelled() {
            return Err(ClientError::Cancelled);
        }

        let (tx, rx) = oneshot::channel();
        let deadline = Instant::now() + self.call_timeout;
        let envelope = Envelope {
            request: make(tx),
            cancel: self.cancel.clone(),
            deadline,
        };
        let op = envelope.request.op();

        let wait = async {
            if self.tx.send(envelope).await.is_err() {
                return Err(ClientError::WorkerGone);
            }
            match rx.await {
                Ok(result) => result,
                Err(_) => Err(ClientError::WorkerGone),
            }
        };

        tokio::select! {
            biased;
            _ = self.cancel.cancelled() => Err(ClientError::Cancelled),
            result = tokio::time::timeout_at(deadline, wait) => match result {
                Ok(result) => result,
                Err(_) => {
                    warn!(op, timeout = ?self.call_timeout, "client call timed out");
                    Err(ClientError::Timeout(self.call_timeout))
                },
            },
        }
    }
}

#[async_trait]
impl MessengerClient for ClientHandle {
    async fn is_authorized(&self) -> Result<bool, ClientError> {
        self.call(Request::IsAuthorized).await
    }

    async fn request_login_code(&self, phone: &str) -> Result<(), ClientError> {
        let phone = phone.to_string();
        self.call(|reply| Request::RequestLoginCode { phone, reply })
            .await
    }

    async fn sign_in(&self, code: &str) -> Result<Account, ClientError> {
        let code = code.to_string();
        self.call(|reply| Request::SignIn { code, reply }).await
    }

    async fn check_password(&self, password: &Secret<String>) -> Result<Account, ClientError> {
        let password = password.clone();
        self.call(|reply| Request::CheckPassword { password, reply })
            .await
    }

    async fn me(&self) -> Result<Account, ClientError> {
        self.call(Request::Me).await
    }

    async fn dialogs(&self) -> Result<Vec<Conversation>, ClientError> {
        self.call(Request::Dialogs).await
    }

    async fn recent_messages(
        &self,
        peer: &PeerRef,
        limit: usize,
    ) -> Result<Vec<MessagePreview>, ClientError> {
        let peer = peer.clone();
        self.call(|reply| Request::RecentMessages { peer, limit, reply })
            .await
    }

    async fn delete_history(&self, peer: &PeerRef) -> Result<(), ClientError> {
        let peer = peer.clone();
        self.call(|reply| Request::DeleteHistory { peer, reply })
            .await
    }

    async fn leave(&self, peer: &PeerRef) -> Result<(), ClientError> {
        let peer = peer.clone();
        self.call(|reply| Request::Leave { peer, reply }).await
    }

    async fn disconnect(&self) -> Result<(), ClientError> {
        self.call(Request::Disconnect).await
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use crate::{
        fake::{FakeClient, Op},
        types::PeerKind,
    };

    fn spawn(fake: &FakeClient, call_timeout: Duration) -> ClientHandle {
        let (handle, _task) = ClientWorker::spawn(
            Box::new(fake.clone()),
            WorkerOptions {
                call_timeout,
                queue_depth: 4,
            },
        );
        handle
    }

    #[tokio::test]
    async fn forwards_calls_in_order() {
        let fake = FakeClient::authorized(7);
        let handle = spawn(&fake, Duration::from_secs(5));

        assert!(handle.is_authorized().await.unwrap());
        assert_eq!(handle.me().await.unwrap().id, 7);
        let peer = PeerRef::new(9, PeerKind::User, vec![]);
        handle.delete_history(&peer).await.unwrap();
        handle.leave(&peer).await.unwrap();

        assert_eq!(
            fake.calls(),
            vec![
                "is_authorized".to_string(),
                "me".into(),
                "delete_history:9".into(),
                "leave:9".into(),
            ]
        );
    }

    #[tokio::test]
    async fn concurrent_callers_are_serialized() {
        let fake = FakeClient::authorized(1).with_delay(Duration::from_millis(20));
        let handle = spawn(&fake, Duration::from_secs(5));

        let peers: Vec<PeerRef> = (1..=3)
            .map(|id| PeerRef::new(id, PeerKind::Group, vec![]))
            .collect();
        let results = leave_all(&handle, &peers).await;
        assert!(results.iter().all(Result::is_ok));
        assert_eq!(fake.max_in_flight(), 1);
    }

    async fn leave_all(handle: &ClientHandle, peers: &[PeerRef]) -> Vec<Result<(), ClientError>> {
        let mut tasks = Vec::new();
        for peer in peers {
            let handle = handle.clone();
            let peer = peer.clone();
            tasks.push(tokio::spawn(async move { handle.leave(&peer).await }));
        }
        let mut results = Vec::new();
        for task in tasks {
            results.push(task.await.unwrap());
        }
        results
    }

    #[tokio::test(start_paused = true)]
    async fn slow_call_times_out_and_worker_recovers() {
        let fake = FakeClient::authorized(1).with_delay(Duration::from_secs(60));
        let handle = spawn(&fake, Duration::from_secs(1));

        let err = handle.dialogs().await.unwrap_err();
        assert!(matches!(err, ClientError::Timeout(_)));

        fake.set_delay(None);
        assert!(handle.is_authorized().await.unwrap());
    }

    #[tokio::test(start_paused = true)]
    async fn call_that_expires_while_queued_never_runs() {
        let fake = FakeClient::authorized(1).with_delay(Duration::from_secs(6));
        let handle = spawn(&fake, Duration::from_secs(5));

        let first = handle.clone();
        let slow = tokio::spawn(async move { first.dialogs().await });
        tokio::task::yield_now().await;
        let peer = PeerRef::new(5, PeerKind::Group, vec![]);
        let err = handle.leave(&peer).await.unwrap_err();
        assert!(matches!(err, ClientError::Timeout(_)));
        assert!(matches!(slow.await.unwrap(), Err(ClientError::Timeout(_))));

        fake.set_delay(None);
        assert!(handle.is_authorized().await.unwrap());
        assert_eq!(fake.count(Op::Leave), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn abandoned_caller_is_skipped() {
        let fake = FakeClient::authorized(1).with_delay(Duration::from_secs(10));
        let handle = spawn(&fake, Duration::from_secs(30));

        let first = handle.clone();
        let slow = tokio::spawn(async move { first.dialogs().await });
        tokio::task::yield_now().await;
        let second = handle.clone();
        let gone = tokio::spawn(async move {
            let peer = PeerRef::new(5, PeerKind::Group, vec![]);
            second.leave(&peer).await
        });
        tokio::time::sleep(Duration::from_secs(1)).await;
        gone.abort();
        assert!(gone.await.unwrap_err().is_cancelled());

        slow.await.unwrap().unwrap();
        fake.set_delay(None);
        assert!(handle.is_authorized().await.unwrap());
        assert!(!fake.calls().contains(&"leave:5".to_string()));
    }

    #[tokio::test(start_paused = true)]
    async fn scoped_cancel_keeps_worker_alive() {
        let fake = FakeClient::authorized(1).with_delay(Duration::from_secs(10));
        let handle = spawn(&fake, Duration::from_secs(30));

        let scoped = handle.scoped();
        let token = scoped.cancellation_token();
        let pending = tokio::spawn(async move { scoped.dialogs().await });
        tokio::time::sleep(Duration::from_secs(1)).await;
        token.cancel();
        assert!(matches!(
            pending.await.unwrap(),
            Err(ClientError::Cancelled)
        ));

        fake.set_delay(None);
        assert!(handle.is_authorized().await.unwrap());
    }

    #[tokio::test]
    async fn shutdown_fails_later_calls() {
        let fake = FakeClient::authorized(1);
        let handle = spawn(&fake, Duration::from_secs(5));
        handle.shutdown();
        assert!(matches!(
            handle.me().await,
            Err(ClientError::Cancelled)
        ));
    }

    #[tokio::test]
    async fn close_persists_then_stops() {
        let fake = FakeClient::authorized(1);
        let handle = spawn(&fake, Duration::from_secs(5));
        let other = handle.clone();
        handle.close().await.unwrap();
        assert_eq!(fake.count(Op::Disconnect), 1);
        assert!(matches!(other.me().await, Err(ClientError::Cancelled)));
    }

    #[tokio::test]
    async fn errors_pass_through() {
        let fake = FakeClient::authorized(1);
        fake.fail_next(Op::Dialogs, ClientError::FloodWait { seconds: 3 });
        let handle = spawn(&fake, Duration::from_secs(5));
        assert!(matches!(
            handle.dialogs().await,
            Err(ClientError::FloodWait { seconds: 3 })
        ));
        assert!(handle.dialogs().await.is_ok());
    }
}
