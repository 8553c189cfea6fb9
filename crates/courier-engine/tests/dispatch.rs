// SPDX-FileCopyrightText: 2026 Courier Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Campaign dispatch: caps, windows, retries and resumability.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::Duration;
use courier_core::types::{
    ActivityStatus, AlertKind, CampaignStatus, EventType, MemberStatus, RetryEntry,
};
use courier_core::{Clock, CourierError, StorageAdapter};
use courier_engine::dispatch::campaign_lease;
use courier_engine::{
    CampaignSendHandler, ConfirmationSendHandler, ErrorRecoveryQueue, HandlerOutcome,
    IngestReplayHandler, NewCampaign, RetryHandler, RetryHandlers, RetryPolicy, RetryScheduler,
};
use courier_test_utils::harness::outbound_text;
use courier_test_utils::{ScriptedSend, TestHarness};
use proptest::prelude::*;

fn contacts(n: usize) -> Vec<String> {
    (1..=n).map(|i| format!("+1555000{i:04}")).collect()
}

fn campaign(daily_cap: u32, batch_size: Option<u32>) -> NewCampaign {
    NewCampaign {
        name: "launch".into(),
        body: "We just launched".into(),
        daily_cap,
        batch_size,
        business_hours: None,
    }
}

async fn active_campaign(h: &TestHarness, members: usize, cap: u32, batch: Option<u32>) -> String {
    let dispatch = &h.services.dispatch;
    let c = dispatch.create_campaign(campaign(cap, batch)).await.unwrap();
    dispatch.add_members(&c.id, &contacts(members)).await.unwrap();
    dispatch.activate(&c.id).await.unwrap();
    c.id
}

#[tokio::test]
async fn ten_members_cap_three_batch_three() {
    let h = TestHarness::builder().build().await.unwrap();
    let id = active_campaign(&h, 10, 3, Some(3)).await;

    let first = h.services.dispatch.tick().await.unwrap();
    assert_eq!(first.sent, 3);

    let capped = h.services.dispatch.tick().await.unwrap();
    assert_eq!(capped.sent, 0);
    assert_eq!(capped.capped, 1);

    for (day, expected_sent) in [(1, 3), (2, 3), (3, 1)] {
        h.clock.advance(Duration::days(1));
        let stats = h.services.dispatch.tick().await.unwrap();
        assert_eq!(stats.sent, expected_sent, "day {day}");
    }

    let c = h.storage.get_campaign(&id).await.unwrap().unwrap();
    assert_eq!(c.status, CampaignStatus::Completed);
    assert_eq!(c.last_dispatch_pointer, 10);
    assert_eq!(h.provider.sent().await.len(), 10);
}

#[tokio::test]
async fn sends_follow_member_order() {
    let h = TestHarness::builder().build().await.unwrap();
    active_campaign(&h, 5, 100, None).await;

    h.services.dispatch.tick().await.unwrap();

    let recipients: Vec<String> = h.provider.sent().await.into_iter().map(|m| m.to).collect();
    assert_eq!(recipients, contacts(5));
}

#[tokio::test]
async fn nothing_is_sent_outside_business_hours() {
    // Saturday.
    let h = TestHarness::builder()
        .with_start("2026-03-07T15:00:00Z")
        .build()
        .await
        .unwrap();
    active_campaign(&h, 3, 100, None).await;

    let stats = h.services.dispatch.tick().await.unwrap();
    assert_eq!(stats.outside_hours, 1);
    assert!(h.provider.sent().await.is_empty());

    h.clock.advance(Duration::days(2));
    assert_eq!(h.services.dispatch.tick().await.unwrap().sent, 3);
}

#[tokio::test]
async fn global_cap_spans_campaigns() {
    let h = TestHarness::builder()
        .with_config(|c| c.dispatch.global_daily_cap = Some(4))
        .build()
        .await
        .unwrap();
    active_campaign(&h, 3, 100, None).await;
    active_campaign(&h, 3, 100, None).await;

    let stats = h.services.dispatch.tick().await.unwrap();
    assert_eq!(stats.sent, 4);
}

#[tokio::test]
async fn invalid_numbers_are_skipped() {
    let h = TestHarness::builder().build().await.unwrap();
    let dispatch = &h.services.dispatch;
    let c = dispatch.create_campaign(campaign(100, None)).await.unwrap();
    dispatch
        .add_members(&c.id, &["12".to_string(), "(555) 000-1234".to_string()])
        .await
        .unwrap();
    dispatch.activate(&c.id).await.unwrap();

    let stats = dispatch.tick().await.unwrap();
    assert_eq!(stats.skipped_invalid, 1);
    assert_eq!(stats.sent, 1);
    let skipped = h.storage.get_member(&c.id, 1).await.unwrap().unwrap();
    assert_eq!(skipped.status, MemberStatus::SkippedInvalid);
    assert_eq!(h.provider.sent().await[0].to, "+15550001234");
}

#[tokio::test]
async fn permanent_failure_moves_past_the_member() {
    let h = TestHarness::builder().build().await.unwrap();
    h.provider
        .script_sends([ScriptedSend::Permanent("unreachable destination".into())])
        .await;
    let id = active_campaign(&h, 2, 100, None).await;

    let stats = h.services.dispatch.tick().await.unwrap();
    assert_eq!(stats.failed, 1);
    assert_eq!(stats.sent, 1);
    let failed = h.storage.get_member(&id, 1).await.unwrap().unwrap();
    assert_eq!(failed.status, MemberStatus::Failed);
    assert!(failed.last_error.unwrap().contains("unreachable destination"));
}

#[tokio::test]
async fn transient_failure_holds_the_pointer_until_the_retry_succeeds() {
    let h = TestHarness::builder().build().await.unwrap();
    h.provider
        .script_sends([ScriptedSend::Transient("provider 503".into())])
        .await;
    let id = active_campaign(&h, 3, 100, None).await;

    let stats = h.services.dispatch.tick().await.unwrap();
    assert_eq!(stats.deferred, 1);
    assert_eq!(stats.sent, 0);
    let c = h.storage.get_campaign(&id).await.unwrap().unwrap();
    assert_eq!(c.last_dispatch_pointer, 0);
    let head = h.storage.get_member(&id, 1).await.unwrap().unwrap();
    assert_eq!(head.status, MemberStatus::Pending);
    assert_eq!(head.attempt_count, 1);

    // The head member waits for its retry entry.
    let waiting = h.services.dispatch.tick().await.unwrap();
    assert_eq!(waiting.deferred, 1);
    assert_eq!(h.provider.attempts(), 1);

    h.clock.advance(Duration::seconds(60));
    let retried = h.services.retry_queue.process_due().await.unwrap();
    assert_eq!(retried.succeeded, 1);

    let stats = h.services.dispatch.tick().await.unwrap();
    assert_eq!(stats.sent, 2);
    let recipients: Vec<String> = h.provider.sent().await.into_iter().map(|m| m.to).collect();
    assert_eq!(recipients, contacts(3));
}

#[tokio::test]
async fn exhausted_retries_fail_the_member_and_alert() {
    let h = TestHarness::builder()
        .with_config(|c| c.dispatch.max_send_attempts = 2)
        .build()
        .await
        .unwrap();
    h.provider
        .script_sends([
            ScriptedSend::Transient("503".into()),
            ScriptedSend::Transient("503".into()),
            ScriptedSend::Transient("503".into()),
        ])
        .await;
    let id = active_campaign(&h, 2, 100, None).await;

    h.services.dispatch.tick().await.unwrap();
    h.clock.advance(Duration::seconds(60));
    let first = h.services.retry_queue.process_due().await.unwrap();
    assert_eq!(first.rescheduled, 1);

    h.clock.advance(Duration::seconds(120));
    let second = h.services.retry_queue.process_due().await.unwrap();
    assert_eq!(second.dead_lettered, 1);

    let member = h.storage.get_member(&id, 1).await.unwrap().unwrap();
    assert_eq!(member.status, MemberStatus::Failed);
    assert_eq!(h.alerts.count(AlertKind::DeadLetter).await, 1);
    assert_eq!(h.services.retry_queue.dead_letters(10).await.unwrap().len(), 1);

    let stats = h.services.dispatch.tick().await.unwrap();
    assert_eq!(stats.sent, 1);
    let c = h.storage.get_campaign(&id).await.unwrap().unwrap();
    assert_eq!(c.status, CampaignStatus::Completed);
}

/// Runs the real campaign handler, then lets another worker take the
/// campaign lease before the queue settles the attempt.
struct LeaseTakenAfterAttempt {
    inner: CampaignSendHandler,
    store: Arc<dyn StorageAdapter>,
    clock: Arc<dyn Clock>,
    lease: String,
}

#[async_trait]
impl RetryHandler for LeaseTakenAfterAttempt {
    async fn handle(&self, entry: &RetryEntry) -> Result<HandlerOutcome, CourierError> {
        let result = self.inner.handle(entry).await;
        let now = self.clock.now();
        assert!(
            self.store
                .try_acquire_lease(&self.lease, "worker-b", now, now + Duration::minutes(5))
                .await?
        );
        result
    }

    async fn on_dead_letter(&self, entry: &RetryEntry, error: &str) -> Result<(), CourierError> {
        self.inner.on_dead_letter(entry, error).await
    }
}

#[tokio::test]
async fn member_dead_lettered_while_locked_fails_on_next_tick() {
    let h = TestHarness::builder()
        .with_config(|c| c.dispatch.max_send_attempts = 2)
        .build()
        .await
        .unwrap();
    h.provider
        .script_sends([
            ScriptedSend::Transient("503".into()),
            ScriptedSend::Transient("503".into()),
            ScriptedSend::Transient("503".into()),
        ])
        .await;
    let id = active_campaign(&h, 2, 100, None).await;
    let lease = campaign_lease(&id);

    let store = h.services.adapters.store.clone();
    let clock = h.services.adapters.clock.clone();
    let scheduler = RetryScheduler::new(
        store.clone(),
        clock.clone(),
        RetryPolicy::from_config(&h.config.retry),
    );
    let handlers = RetryHandlers {
        ingest_event: Arc::new(IngestReplayHandler::new(h.services.ingestor.clone())),
        campaign_send: Arc::new(LeaseTakenAfterAttempt {
            inner: CampaignSendHandler::new(h.services.dispatch.clone()),
            store: store.clone(),
            clock: clock.clone(),
            lease: lease.clone(),
        }),
        confirmation_send: Arc::new(ConfirmationSendHandler::new(h.services.compliance.clone())),
    };
    let queue = ErrorRecoveryQueue::new(
        store,
        clock,
        h.services.adapters.alerts.clone(),
        scheduler,
        handlers,
    );

    h.services.dispatch.tick().await.unwrap();
    h.clock.advance(Duration::seconds(60));
    assert_eq!(h.services.retry_queue.process_due().await.unwrap().rescheduled, 1);

    // The final attempt fails and worker-b holds the campaign when it is dead-lettered.
    h.clock.advance(Duration::seconds(120));
    assert_eq!(queue.process_due().await.unwrap().dead_lettered, 1);
    let member = h.storage.get_member(&id, 1).await.unwrap().unwrap();
    assert_eq!(member.status, MemberStatus::Pending);
    assert_eq!(h.alerts.count(AlertKind::DeadLetter).await, 1);

    let locked = h.services.dispatch.tick().await.unwrap();
    assert_eq!(locked.locked, 1);
    h.storage.release_lease(&lease, "worker-b").await.unwrap();

    let stats = h.services.dispatch.tick().await.unwrap();
    assert_eq!(stats.failed, 1);
    assert_eq!(stats.sent, 1);
    let member = h.storage.get_member(&id, 1).await.unwrap().unwrap();
    assert_eq!(member.status, MemberStatus::Failed);
    assert!(member.last_error.is_some());
    assert_eq!(h.provider.attempts(), 4);
    assert_eq!(h.provider.sent_to(&contacts(2)[0]).await, 0);
    let c = h.storage.get_campaign(&id).await.unwrap().unwrap();
    assert_eq!(c.status, CampaignStatus::Completed);
}

#[tokio::test]
async fn slow_provider_counts_as_transient() {
    let h = TestHarness::builder()
        .with_config(|c| c.dispatch.send_timeout_secs = 1)
        .build()
        .await
        .unwrap();
    h.provider
        .script_sends([ScriptedSend::Stall(std::time::Duration::from_secs(5))])
        .await;
    let id = active_campaign(&h, 1, 100, None).await;

    let stats = h.services.dispatch.tick().await.unwrap();
    assert_eq!(stats.deferred, 1);
    let head = h.storage.get_member(&id, 1).await.unwrap().unwrap();
    assert!(head.last_error.unwrap().contains("timed out"));
}

#[tokio::test]
async fn delivery_callbacks_update_members() {
    let h = TestHarness::builder().build().await.unwrap();
    let id = active_campaign(&h, 2, 100, None).await;
    h.services.dispatch.tick().await.unwrap();

    let first = h.storage.get_member(&id, 1).await.unwrap().unwrap();
    let external_id = first.sent_activity_ref.unwrap();
    let to = first.contact_identity.clone();
    h.deliver(
        EventType::MessageStatus,
        outbound_text(&external_id, &to, "We just launched", ActivityStatus::Delivered, h.now()),
    )
    .await
    .unwrap();
    let second = h.storage.get_member(&id, 2).await.unwrap().unwrap();
    h.deliver(
        EventType::MessageStatus,
        outbound_text(
            second.sent_activity_ref.as_deref().unwrap(),
            &second.contact_identity,
            "We just launched",
            ActivityStatus::Undelivered,
            h.now(),
        ),
    )
    .await
    .unwrap();

    assert_eq!(h.storage.get_member(&id, 1).await.unwrap().unwrap().status, MemberStatus::Delivered);
    assert_eq!(h.storage.get_member(&id, 2).await.unwrap().unwrap().status, MemberStatus::Failed);
}

#[tokio::test]
async fn competing_workers_never_send_twice() {
    let h = TestHarness::builder().build().await.unwrap();
    active_campaign(&h, 12, 100, Some(4)).await;
    let peer = h.peer("peer-holder");

    for _ in 0..4 {
        let (a, b) = tokio::join!(h.services.dispatch.tick(), peer.dispatch.tick());
        a.unwrap();
        b.unwrap();
    }

    let mut recipients: Vec<String> = h.provider.sent().await.into_iter().map(|m| m.to).collect();
    assert_eq!(recipients.len(), 12);
    recipients.dedup();
    assert_eq!(recipients, contacts(12));
}

#[tokio::test]
async fn state_machine_rejects_invalid_transitions() {
    let h = TestHarness::builder().build().await.unwrap();
    let dispatch = &h.services.dispatch;
    let c = dispatch.create_campaign(campaign(10, None)).await.unwrap();

    assert!(matches!(dispatch.pause(&c.id).await, Err(CourierError::InvalidTransition { .. })));
    assert!(matches!(dispatch.resume(&c.id).await, Err(CourierError::InvalidTransition { .. })));
    assert!(matches!(dispatch.activate("missing").await, Err(CourierError::NotFound { .. })));
    assert!(matches!(
        dispatch.create_campaign(campaign(0, None)).await,
        Err(CourierError::InvalidInput(_))
    ));

    dispatch.activate(&c.id).await.unwrap();
    dispatch.pause(&c.id).await.unwrap();
    assert!(matches!(dispatch.activate(&c.id).await, Err(CourierError::InvalidTransition { .. })));
    let resumed = dispatch.resume(&c.id).await.unwrap();
    assert_eq!(resumed.status, CampaignStatus::Active);
}

#[tokio::test]
async fn paused_campaigns_keep_their_pointer() {
    let h = TestHarness::builder().build().await.unwrap();
    let id = active_campaign(&h, 6, 100, Some(2)).await;

    h.services.dispatch.tick().await.unwrap();
    h.services.dispatch.pause(&id).await.unwrap();
    let paused = h.services.dispatch.tick().await.unwrap();
    assert_eq!(paused.sent, 0);
    assert_eq!(h.storage.get_campaign(&id).await.unwrap().unwrap().last_dispatch_pointer, 2);

    h.services.dispatch.resume(&id).await.unwrap();
    h.services.dispatch.tick().await.unwrap();
    assert_eq!(h.storage.get_campaign(&id).await.unwrap().unwrap().last_dispatch_pointer, 4);
}

#[derive(Debug, Clone, Copy)]
enum Step {
    Tick,
    Pause,
    Resume,
}

fn step() -> impl Strategy<Value = Step> {
    prop_oneof![
        3 => Just(Step::Tick),
        1 => Just(Step::Pause),
        1 => Just(Step::Resume),
    ]
}

async fn interrupted_run(members: usize, batch: u32, steps: &[Step]) -> Vec<String> {
    let h = TestHarness::builder().build().await.unwrap();
    let id = active_campaign(&h, members, 1_000, Some(batch)).await;
    let dispatch = &h.services.dispatch;

    for step in steps {
        match step {
            Step::Tick => {
                dispatch.tick().await.unwrap();
            }
            Step::Pause => {
                let _ = dispatch.pause(&id).await;
            }
            Step::Resume => {
                let _ = dispatch.resume(&id).await;
            }
        }
    }
    let _ = dispatch.resume(&id).await;
    for _ in 0..members {
        dispatch.tick().await.unwrap();
    }

    let c = h.storage.get_campaign(&id).await.unwrap().unwrap();
    assert_eq!(c.status, CampaignStatus::Completed);
    h.provider.sent().await.into_iter().map(|m| m.to).collect()
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(16))]

    #[test]
    fn pause_and_resume_never_skip_or_repeat(
        members in 1usize..8,
        batch in 1u32..4,
        steps in proptest::collection::vec(step(), 0..12),
    ) {
        let rt = tokio::runtime::Runtime::new().unwrap();
        let sent = rt.block_on(interrupted_run(members, batch, &steps));
        prop_assert_eq!(sent, contacts(members));
    }
}
