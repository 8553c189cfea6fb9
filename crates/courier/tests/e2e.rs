// SPDX-FileCopyrightText: 2026 Courier Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! End-to-end flows across the gateway, scheduler and engine.
//!
//! Each test builds an isolated TestHarness (temp SQLite, mock provider,
//! manual clock) and drives it the way `courier serve` would.

use std::time::Instant;

use axum::body::{to_bytes, Body};
use axum::http::{Request, StatusCode};
use axum::Router;
use courier_core::types::{ActivityPage, ActivityStatus, CampaignStatus, EventType, MemberStatus};
use courier_core::StorageAdapter;
use courier_cron::{DispatchJob, ReconcileJob, Scheduler, TaskRun};
use courier_engine::NewCampaign;
use courier_gateway::{router, AuthConfig, GatewayState, HealthState};
use courier_test_utils::harness::{inbound_text, outbound_text, webhook_body};
use courier_test_utils::TestHarness;
use tower::ServiceExt;

const TOKEN: &str = "e2e-token";
const ALICE: &str = "+15550001111";
const BOB: &str = "+15550002222";
const CAROL: &str = "+15550003333";

fn app(h: &TestHarness) -> Router {
    router(GatewayState {
        services: h.services.clone(),
        auth: AuthConfig {
            bearer_token: Some(TOKEN.into()),
        },
        health: HealthState {
            start_time: Instant::now(),
            prometheus_render: None,
        },
    })
}

async fn post_webhook(h: &TestHarness, raw: &str) -> StatusCode {
    let (sig, ts) = h.sign(raw);
    let request = Request::builder()
        .method("POST")
        .uri("/webhooks/provider")
        .header("x-signature", sig)
        .header("x-timestamp", ts)
        .body(Body::from(raw.to_string()))
        .unwrap();
    app(h).oneshot(request).await.unwrap().status()
}

async fn admin(h: &TestHarness, method: &str, uri: &str) -> (StatusCode, serde_json::Value) {
    let request = Request::builder()
        .method(method)
        .uri(uri)
        .header("authorization", format!("Bearer {TOKEN}"))
        .body(Body::empty())
        .unwrap();
    let response = app(h).oneshot(request).await.unwrap();
    let status = response.status();
    let bytes = to_bytes(response.into_body(), 1024 * 1024).await.unwrap();
    (status, serde_json::from_slice(&bytes).unwrap_or_default())
}

#[tokio::test]
async fn campaign_day_with_stop_reply_and_delivery_callback() {
    let h = TestHarness::builder().build().await.unwrap();
    let campaign = h
        .services
        .dispatch
        .create_campaign(NewCampaign {
            name: "reminders".into(),
            body: "Your appointment is tomorrow".into(),
            daily_cap: 10,
            batch_size: Some(1),
            business_hours: None,
        })
        .await
        .unwrap();
    h.services
        .dispatch
        .add_members(&campaign.id, &[ALICE.into(), BOB.into(), CAROL.into()])
        .await
        .unwrap();

    let (status, body) = admin(&h, "POST", &format!("/v1/campaigns/{}/activate", campaign.id)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "active");

    let scheduler = Scheduler::for_services(&h.config, &h.services, "e2e-worker");
    let dispatch_job = DispatchJob(h.services.dispatch.clone());

    let first = scheduler.run_once(&dispatch_job).await.unwrap();
    assert!(matches!(first, TaskRun::Completed { .. }));
    assert_eq!(h.provider.sent_to(ALICE).await, 1);

    // Bob opts out before his turn.
    let stop = webhook_body(EventType::MessageReceived, inbound_text("in_bob", BOB, "STOP", h.now()));
    assert_eq!(post_webhook(&h, &stop).await, StatusCode::OK);

    for _ in 0..5 {
        scheduler.run_once(&dispatch_job).await.unwrap();
    }

    // Bob only ever receives the opt-out confirmation.
    assert_eq!(h.provider.sent_to(BOB).await, 1);
    assert_eq!(h.provider.sent_to(CAROL).await, 1);
    assert_eq!(h.provider.sent_to(ALICE).await, 1);
    let bob = h.storage.get_member(&campaign.id, 2).await.unwrap().unwrap();
    assert_eq!(bob.status, MemberStatus::SkippedCompliance);

    let alice = h.storage.get_member(&campaign.id, 1).await.unwrap().unwrap();
    let delivered = webhook_body(
        EventType::MessageStatus,
        outbound_text(
            alice.sent_activity_ref.as_deref().unwrap(),
            ALICE,
            "Your appointment is tomorrow",
            ActivityStatus::Delivered,
            h.now(),
        ),
    );
    assert_eq!(post_webhook(&h, &delivered).await, StatusCode::OK);
    let alice = h.storage.get_member(&campaign.id, 1).await.unwrap().unwrap();
    assert_eq!(alice.status, MemberStatus::Delivered);

    let done = h.storage.get_campaign(&campaign.id).await.unwrap().unwrap();
    assert_eq!(done.status, CampaignStatus::Completed);

    let (status, counts) = admin(&h, "GET", "/v1/status").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(counts["opted_out_contacts"], 1);
    assert_eq!(counts["campaigns"]["completed"], 1);
}

#[tokio::test]
async fn missed_webhook_is_backfilled_by_scheduled_reconcile() {
    let h = TestHarness::builder().build().await.unwrap();
    let missed = inbound_text("in_missed", ALICE, "are you open saturday?", h.now());
    h.provider
        .push_page(ActivityPage {
            data: vec![missed.clone()],
            next_cursor: None,
        })
        .await;

    let scheduler = Scheduler::for_services(&h.config, &h.services, "e2e-worker");
    let run = scheduler
        .run_once(&ReconcileJob(h.services.reconciliation.clone()))
        .await
        .unwrap();
    assert!(matches!(run, TaskRun::Completed { .. }));
    assert!(h.storage.get_activity("in_missed").await.unwrap().is_some());

    // The late webhook for the same message changes nothing.
    let raw = webhook_body(EventType::MessageReceived, missed);
    assert_eq!(post_webhook(&h, &raw).await, StatusCode::OK);
    assert_eq!(h.storage.activity_count().await.unwrap(), 1);
}

#[tokio::test]
async fn two_workers_share_one_dispatch_lease() {
    let h = TestHarness::builder().build().await.unwrap();
    let campaign = h
        .services
        .dispatch
        .create_campaign(NewCampaign {
            name: "launch".into(),
            body: "We just launched".into(),
            daily_cap: 100,
            batch_size: None,
            business_hours: None,
        })
        .await
        .unwrap();
    let contacts: Vec<String> = (0..6).map(|i| format!("+1555000200{i}")).collect();
    h.services.dispatch.add_members(&campaign.id, &contacts).await.unwrap();
    h.services.dispatch.activate(&campaign.id).await.unwrap();

    let peer = h.peer("worker-b");
    let a = Scheduler::for_services(&h.config, &h.services, "worker-a");
    let b = Scheduler::for_services(&h.config, &peer, "worker-b");
    let job_a = DispatchJob(h.services.dispatch.clone());
    let job_b = DispatchJob(peer.dispatch.clone());

    let (ra, rb) = tokio::join!(a.run_once(&job_a), b.run_once(&job_b));
    ra.unwrap();
    rb.unwrap();

    for contact in &contacts {
        assert_eq!(h.provider.sent_to(contact).await, 1, "{contact}");
    }
}
