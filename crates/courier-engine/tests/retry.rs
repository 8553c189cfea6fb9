// SPDX-FileCopyrightText: 2026 Courier Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Error recovery queue behavior across item types.

use chrono::Duration;
use courier_core::types::{AlertKind, RetryItemType, RetryStatus};
use courier_core::StorageAdapter;
use courier_test_utils::{ScriptedSend, TestHarness};

#[tokio::test]
async fn transient_failures_back_off_then_dead_letter() {
    let h = TestHarness::builder()
        .with_config(|c| c.retry.max_attempts = 3)
        .build()
        .await
        .unwrap();
    h.provider
        .script_sends(std::iter::repeat_n(ScriptedSend::Transient("503".into()), 4))
        .await;
    h.services
        .compliance
        .process_inbound_text("+15550001111", "STOP")
        .await
        .unwrap();
    let queue = &h.services.retry_queue;

    // attempt 1 at +1m, attempt 2 at +2m, attempt 3 at +4m
    for (wait, rescheduled) in [(60, 1), (120, 1)] {
        h.clock.advance(Duration::seconds(wait - 1));
        assert_eq!(queue.process_due().await.unwrap().claimed, 0);
        h.clock.advance(Duration::seconds(1));
        assert_eq!(queue.process_due().await.unwrap().rescheduled, rescheduled);
    }
    h.clock.advance(Duration::seconds(240));
    let last = queue.process_due().await.unwrap();
    assert_eq!(last.dead_lettered, 1);

    let dead = queue.dead_letters(10).await.unwrap();
    assert_eq!(dead.len(), 1);
    assert_eq!(dead[0].item_type, RetryItemType::ConfirmationSend);
    assert_eq!(dead[0].status, RetryStatus::DeadLetter);
    assert_eq!(dead[0].attempt_count, 3);
    assert_eq!(h.alerts.count(AlertKind::DeadLetter).await, 1);

    h.clock.advance(Duration::days(1));
    assert_eq!(queue.process_due().await.unwrap().claimed, 0);
}

#[tokio::test]
async fn permanent_failures_dead_letter_immediately() {
    let h = TestHarness::builder().build().await.unwrap();
    let queue = &h.services.retry_queue;
    queue
        .enqueue(RetryItemType::IngestEvent, "evt_1", Some("{not json".into()), "boom")
        .await
        .unwrap();

    h.clock.advance(Duration::seconds(60));
    let stats = queue.process_due().await.unwrap();

    assert_eq!(stats.dead_lettered, 1);
    assert_eq!(queue.dead_letters(10).await.unwrap()[0].attempt_count, 1);
}

#[tokio::test]
async fn enqueue_refreshes_an_open_entry() {
    let h = TestHarness::builder().build().await.unwrap();
    let queue = &h.services.retry_queue;
    let first = queue
        .enqueue(RetryItemType::IngestEvent, "evt_1", Some("{}".into()), "first")
        .await
        .unwrap();
    let second = queue
        .enqueue(RetryItemType::IngestEvent, "evt_1", Some("{}".into()), "second")
        .await
        .unwrap();

    assert_eq!(first, second);
    let open = h
        .storage
        .find_open_retry(RetryItemType::IngestEvent, "evt_1")
        .await
        .unwrap()
        .unwrap();
    assert_eq!(open.last_error.as_deref(), Some("second"));
}

#[tokio::test]
async fn claimed_entries_are_invisible_to_a_second_worker() {
    let h = TestHarness::builder().build().await.unwrap();
    let now = h.now();
    h.services
        .retry_queue
        .enqueue(RetryItemType::IngestEvent, "evt_1", Some("{}".into()), "boom")
        .await
        .unwrap();

    let later = now + Duration::minutes(5);
    let claimed = h
        .storage
        .claim_due_retries(later, later + Duration::minutes(2), 10)
        .await
        .unwrap();
    assert_eq!(claimed.len(), 1);
    let again = h
        .storage
        .claim_due_retries(later, later + Duration::minutes(2), 10)
        .await
        .unwrap();
    assert!(again.is_empty());
}
