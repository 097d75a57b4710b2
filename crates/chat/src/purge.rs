//! Leaving conversations and deleting their history in bulk.

use std::{fmt, time::Duration};

use {
    teletrim_telegram::{ClientError, MessengerClient, PeerKind, PeerRef},
    tokio_util::sync::CancellationToken,
    tracing::{info, warn},
};

use crate::list::{ChatEntry, ChatList};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PurgeStep {
    DeleteHistory,
    Leave,
}

impl fmt::Display for PurgeStep {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::DeleteHistory => "delete history",
            Self::Leave => "leave",
        })
    }
}

/// One conversation and what will be done to it, in order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PurgeTarget {
    pub peer: PeerRef,
    pub label: String,
    pub steps: Vec<PurgeStep>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PurgePlan {
    pub targets: Vec<PurgeTarget>,
    /// Saved Messages was selected but left out.
    pub skipped_saved: bool,
    /// Selected ids that are not in the list.
    pub unknown: Vec<i64>,
}

impl PurgePlan {
    /// Plan the purge of the conversations with the `selected` marked ids,
    /// in selection order. Ids missing from `list` are reported in
    /// `unknown`.
    pub fn build(list: &ChatList, selected: &[i64], include_saved: bool) -> Self {
        let mut unknown = Vec::new();
        let entries: Vec<&ChatEntry> = selected
            .iter()
            .filter_map(|&id| {
                let entry = list.get(id);
                if entry.is_none() && !unknown.contains(&id) {
                    unknown.push(id);
                }
                entry
            })
            .collect();
        Self {
            unknown,
            ..Self::for_entries(entries, include_saved)
        }
    }

    /// Plan the purge of exactly these entries, in order.
    ///
    /// Saved Messages is only ever cleared, and only with `include_saved`.
    /// Broadcast channels are left without touching history. Everything else
    /// has its history deleted and is then left.
    pub fn for_entries<'a>(
        entries: impl IntoIterator<Item = &'a ChatEntry>,
        include_saved: bool,
    ) -> Self {
        let mut plan = Self::default();
        for entry in entries {
            if plan.targets.iter().any(|t| &t.peer == entry.peer()) {
                continue;
            }

            let steps = if entry.is_saved {
                if !include_saved {
                    plan.skipped_saved = true;
                    continue;
                }
                vec![PurgeStep::DeleteHistory]
            } else if entry.kind() == PeerKind::Channel {
                vec![PurgeStep::Leave]
            } else {
                vec![PurgeStep::DeleteHistory, PurgeStep::Leave]
            };

            plan.targets.push(PurgeTarget {
                peer: entry.peer().clone(),
                label: entry.label.clone(),
                steps,
            });
        }
        plan
    }

    pub fn is_empty(&self) -> bool {
        self.targets.is_empty()
    }
}

#[derive(Debug)]
pub struct StepOutcome {
    pub step: PurgeStep,
    pub result: Result<(), ClientError>,
}

#[derive(Debug)]
pub struct TargetReport {
    pub peer: PeerRef,
    pub label: String,
    pub steps: Vec<StepOutcome>,
}

impl TargetReport {
    pub fn succeeded(&self) -> bool {
        self.steps.iter().all(|s| s.result.is_ok())
    }
}

#[derive(Debug, Default)]
pub struct PurgeReport {
    pub targets: Vec<TargetReport>,
    /// The run was cancelled before every target was processed.
    pub cancelled: bool,
}

impl PurgeReport {
    pub fn succeeded(&self) -> usize {
        self.targets.iter().filter(|t| t.succeeded()).count()
    }

    pub fn failed(&self) -> usize {
        self.targets.len() - self.succeeded()
    }
}

/// Executes a [`PurgePlan`] one call at a time.
#[derive(Debug, Clone)]
pub struct Purger {
    flood_wait_max: Duration,
    cancel: CancellationToken,
}

impl Purger {
    /// Flood waits up to `flood_wait_max` are slept through and the step is
    /// retried once.
    pub fn new(flood_wait_max: Duration) -> Self {
        Self {
            flood_wait_max,
            cancel: CancellationToken::new(),
        }
    }

    pub fn with_cancellation(mut self, cancel: CancellationToken) -> Self {
        self.cancel = cancel;
        self
    }

    /// Run every step of every target. Failures are recorded and the run
    /// moves on; only cancellation stops it early.
    pub async fn run<C: MessengerClient + ?Sized>(&self, client: &C, plan: &PurgePlan) -> PurgeReport {
        let mut report = PurgeReport::default();

        'targets: for target in &plan.targets {
            let mut outcome = TargetReport {
                peer: target.peer.clone(),
                label: target.label.clone(),
                steps: Vec::with_capacity(target.steps.len()),
            };

            for &step in &target.steps {
                let result = self.run_step(client, &target.peer, step).await;
                let cancelled = matches!(result, Err(ClientError::Cancelled));
                match &result {
                    Ok(()) => info!(peer = ?target.peer, chat = %target.label, %step, "purge step done"),
                    Err(e) => warn!(peer = ?target.peer, chat = %target.label, %step, error = %e, "purge step failed"),
                }
                outcome.steps.push(StepOutcome { step, result });
                if cancelled {
                    report.targets.push(outcome);
                    report.cancelled = true;
                    break 'targets;
                }
            }
            report.targets.push(outcome);
        }

        info!(
            succeeded = report.succeeded(),
            failed = report.failed(),
            cancelled = report.cancelled,
            "purge finished"
        );
        report
    }

    async fn run_step<C: MessengerClient + ?Sized>(
        &self,
        client: &C,
        peer: &PeerRef,
        step: PurgeStep,
    ) -> Result<(), ClientError> {
        if self.cancel.is_cancelled() {
            return Err(ClientError::Cancelled);
        }
        match call(client, peer, step).await {
            Err(e) => match e.retry_after() {
                Some(wait) if wait <= self.flood_wait_max => {
                    warn!(peer = ?peer, %step, wait = ?wait, "flood wait, retrying once");
                    tokio::select! {
                        biased;
                        _ = self.cancel.cancelled() => return Err(ClientError::Cancelled),
                        _ = tokio::time::sleep(wait) => {},
                    }
                    call(client, peer, step).await
                },
                _ => Err(e),
            },
            ok => ok,
        }
    }
}

async fn call<C: MessengerClient + ?Sized>(
    client: &C,
    peer: &PeerRef,
    step: PurgeStep,
) -> Result<(), ClientError> {
    match step {
        PurgeStep::DeleteHistory => client.delete_history(peer).await,
        PurgeStep::Leave => client.leave(peer).await,
    }
}

#[cfg(test)]
mod tests {
    use {
        super::*,
        teletrim_telegram::{
            Account,
            fake::{FakeClient, Op, conversation},
        },
    };

    fn chats() -> ChatList {
        let me = Account {
            id: 1,
            display_name: "Me".into(),
            username: None,
        };
        ChatList::build(
            vec![
                conversation(1, PeerKind::User, "Me"),
                conversation(2, PeerKind::User, "Ada"),
                conversation(3, PeerKind::Group, "Family"),
                conversation(4, PeerKind::Supergroup, "Rustaceans"),
                conversation(5, PeerKind::Channel, "News"),
                conversation(6, PeerKind::Bot, "Helper"),
            ],
            Some(&me),
        )
    }

    fn client() -> FakeClient {
        FakeClient::authorized(1).with_dialogs(chats().iter().map(|e| e.conversation.clone()).collect())
    }

    fn steps_for(plan: &PurgePlan, id: i64) -> Vec<PurgeStep> {
        plan.targets
            .iter()
            .find(|t| t.peer.id == id)
            .map(|t| t.steps.clone())
            .unwrap_or_default()
    }

    #[test]
    fn plan_actions_per_kind() {
        let plan = PurgePlan::build(&chats(), &[2, 3, 4, 5, 6], false);
        let both = vec![PurgeStep::DeleteHistory, PurgeStep::Leave];
        assert_eq!(steps_for(&plan, 2), both);
        assert_eq!(steps_for(&plan, 3), both);
        assert_eq!(steps_for(&plan, 4), both);
        assert_eq!(steps_for(&plan, 5), vec![PurgeStep::Leave]);
        assert_eq!(steps_for(&plan, 6), both);
        assert!(!plan.skipped_saved);
        assert!(plan.unknown.is_empty());
    }

    #[test]
    fn saved_messages_needs_opt_in() {
        let plan = PurgePlan::build(&chats(), &[1, 2], false);
        assert_eq!(plan.targets.len(), 1);
        assert!(plan.skipped_saved);

        let plan = PurgePlan::build(&chats(), &[1], true);
        assert_eq!(steps_for(&plan, 1), vec![PurgeStep::DeleteHistory]);
        assert_eq!(plan.targets[0].label, "Saved Messages");
    }

    #[test]
    fn unknown_and_duplicate_ids() {
        let plan = PurgePlan::build(&chats(), &[3, 99, 3, 2], false);
        let order: Vec<i64> = plan.targets.iter().map(|t| t.peer.id).collect();
        assert_eq!(order, vec![3, 2]);
        assert_eq!(plan.unknown, vec![99]);
    }

    #[test]
    fn overlapping_raw_ids_stay_apart() {
        let list = ChatList::build(
            vec![
                conversation(PeerKind::User.marked_id(5), PeerKind::User, "Alice"),
                conversation(PeerKind::Group.marked_id(5), PeerKind::Group, "Family"),
            ],
            None,
        );

        let plan = PurgePlan::build(&list, &[PeerKind::Group.marked_id(5)], false);
        assert_eq!(plan.targets.len(), 1);
        assert_eq!(plan.targets[0].label, "Family");
        assert_eq!(plan.targets[0].peer.kind, PeerKind::Group);

        let plan = PurgePlan::build(&list, &[5], false);
        assert_eq!(plan.targets.len(), 1);
        assert_eq!(plan.targets[0].label, "Alice");
    }

    #[test]
    fn entries_are_planned_as_picked() {
        let list = chats();
        let picked = [&list.entries()[2], &list.entries()[4], &list.entries()[2]];
        let plan = PurgePlan::for_entries(picked, false);
        let labels: Vec<&str> = plan.targets.iter().map(|t| t.label.as_str()).collect();
        assert_eq!(labels, vec!["Family", "News"]);
        assert!(plan.unknown.is_empty());

        let plan = PurgePlan::for_entries([&list.entries()[0]], false);
        assert!(plan.is_empty());
        assert!(plan.skipped_saved);
    }

    #[tokio::test]
    async fn runs_steps_in_order() {
        let client = client();
        let plan = PurgePlan::build(&chats(), &[2, 5], false);

        let report = Purger::new(Duration::from_secs(60)).run(&client, &plan).await;
        assert_eq!(report.succeeded(), 2);
        assert_eq!(report.failed(), 0);
        assert_eq!(client.calls(), vec![
            "delete_history:2".to_string(),
            "leave:2".into(),
            "leave:5".into(),
        ]);
        assert_eq!(client.dialog_ids(), vec![1, 3, 4, 6]);
    }

    #[tokio::test]
    async fn failures_do_not_stop_the_run() {
        let client = client();
        client.fail_next(Op::DeleteHistory, ClientError::Rpc {
            code: 400,
            name: "CHAT_ADMIN_REQUIRED".into(),
        });
        let plan = PurgePlan::build(&chats(), &[3, 4], false);

        let report = Purger::new(Duration::from_secs(60)).run(&client, &plan).await;
        assert_eq!(report.failed(), 1);
        assert_eq!(report.succeeded(), 1);
        // The failed history delete is followed by the leave step.
        assert_eq!(client.count(Op::Leave), 2);
        assert!(!report.targets[0].succeeded());
        assert!(report.targets[0].steps[1].result.is_ok());
    }

    #[tokio::test(start_paused = true)]
    async fn short_flood_wait_is_retried_once() {
        let client = client();
        client.fail_next(Op::Leave, ClientError::FloodWait { seconds: 5 });
        let plan = PurgePlan::build(&chats(), &[5], false);

        let started = tokio::time::Instant::now();
        let report = Purger::new(Duration::from_secs(60)).run(&client, &plan).await;
        assert_eq!(report.succeeded(), 1);
        assert_eq!(client.count(Op::Leave), 2);
        assert!(started.elapsed() >= Duration::from_secs(5));
    }

    #[tokio::test]
    async fn long_flood_wait_is_reported() {
        let client = client();
        client.fail_next(Op::Leave, ClientError::FloodWait { seconds: 3600 });
        let plan = PurgePlan::build(&chats(), &[5], false);

        let report = Purger::new(Duration::from_secs(60)).run(&client, &plan).await;
        assert_eq!(report.failed(), 1);
        assert_eq!(client.count(Op::Leave), 1);
        assert!(matches!(
            report.targets[0].steps[0].result,
            Err(ClientError::FloodWait { seconds: 3600 })
        ));
    }

    #[tokio::test]
    async fn cancellation_stops_the_run() {
        let client = client();
        let cancel = CancellationToken::new();
        cancel.cancel();
        let plan = PurgePlan::build(&chats(), &[2, 3], false);

        let report = Purger::new(Duration::from_secs(60))
            .with_cancellation(cancel)
            .run(&client, &plan)
            .await;
        assert!(report.cancelled);
        assert_eq!(report.targets.len(), 1);
        assert!(client.calls().is_empty());
    }
}
