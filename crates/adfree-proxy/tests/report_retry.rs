#![allow(clippy::unwrap_used)]
#![allow(clippy::expect_used)]
#![allow(clippy::panic)]

mod support;

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;

use adfree_core::error::{DeliveryError, ErrorKind};
use adfree_core::policy::Mode;
use adfree_core::protocol::report::{ViolationAction, ViolationEvent, ViolationType};
use adfree_proxy::obs::ProxyMetrics;
use adfree_proxy::report::{ReportClient, ReportJob, ReportQueue};

use support::*;

fn event() -> ViolationEvent {
    ViolationEvent {
        kind: ViolationType::IframeBlocked,
        url: "https://ads.example.com/slot".into(),
        domain: "ads.example.com".into(),
        action: ViolationAction::Removed,
        timestamp: Utc::now(),
    }
}

fn client(transport: Arc<ScriptedTransport>, metrics: &Arc<ProxyMetrics>) -> ReportClient {
    ReportClient::new(
        transport,
        Arc::clone(metrics),
        Duration::from_secs(10),
        Duration::from_secs(1),
    )
}

/// Paused-clock timers resolve on millisecond ticks.
fn assert_close(actual: Duration, expected: Duration) {
    assert!(
        actual >= expected && actual <= expected + Duration::from_millis(5),
        "expected ~{expected:?}, got {actual:?}"
    );
}

fn drain(rx: &mut tokio::sync::mpsc::UnboundedReceiver<Posted>) -> Vec<Posted> {
    let mut out = Vec::new();
    while let Ok(p) = rx.try_recv() {
        out.push(p);
    }
    out
}

#[tokio::test(start_paused = true)]
async fn failing_endpoint_is_tried_max_retries_plus_one_times_with_doubling_backoff() {
    let metrics = Arc::new(ProxyMetrics::default());
    let (transport, mut rx) = ScriptedTransport::new(Vec::new(), Ok(500), None);
    let c = client(transport, &metrics);

    let ok = c
        .send_violation(Some(COLLECTOR), ORIGIN, "https://news.example.com/", Mode::Strict, event(), 3)
        .await;
    assert!(!ok);

    let posts = drain(&mut rx);
    assert_eq!(posts.len(), 4);
    let gaps: Vec<Duration> = posts.windows(2).map(|w| w[1].at - w[0].at).collect();
    for (gap, secs) in gaps.iter().zip([1, 2, 4]) {
        assert_close(*gap, Duration::from_secs(secs));
    }

    assert_eq!(
        metrics
            .reports_failed
            .get(&[("endpoint", COLLECTOR), ("reason", "HTTP_500")]),
        4
    );
    assert_eq!(metrics.reports_sent.total(), 0);
    assert_eq!(metrics.reports_in_flight.get(&[("endpoint", COLLECTOR)]), 0);
}

#[tokio::test(start_paused = true)]
async fn recovers_after_transient_failures() {
    let metrics = Arc::new(ProxyMetrics::default());
    let script = vec![
        Err(DeliveryError::Network("connection reset".into())),
        Ok(503),
    ];
    let (transport, mut rx) = ScriptedTransport::new(script, Ok(202), None);
    let c = client(transport, &metrics);

    let ok = c
        .send_violation(Some(COLLECTOR), ORIGIN, "https://news.example.com/", Mode::ReportOnly, event(), 3)
        .await;
    assert!(ok);
    assert_eq!(drain(&mut rx).len(), 3);

    assert_eq!(
        metrics
            .reports_failed
            .get(&[("endpoint", COLLECTOR), ("reason", "network_error")]),
        1
    );
    assert_eq!(
        metrics
            .reports_failed
            .get(&[("endpoint", COLLECTOR), ("reason", "HTTP_503")]),
        1
    );
    assert_eq!(
        metrics
            .reports_sent
            .get(&[("endpoint", COLLECTOR), ("status", "202")]),
        1
    );
}

#[tokio::test(start_paused = true)]
async fn only_listed_success_statuses_count_as_delivered() {
    for (status, delivered) in [(200, true), (201, true), (202, true), (204, true), (203, false), (301, false)] {
        let metrics = Arc::new(ProxyMetrics::default());
        let (transport, _rx) = ScriptedTransport::new(Vec::new(), Ok(status), None);
        let c = client(transport, &metrics);

        let ok = c
            .send_violation(Some(COLLECTOR), ORIGIN, "https://news.example.com/", Mode::Strict, event(), 0)
            .await;
        assert_eq!(ok, delivered, "status {status}");
    }
}

#[tokio::test(start_paused = true)]
async fn slow_endpoint_times_out_per_attempt() {
    let metrics = Arc::new(ProxyMetrics::default());
    let (transport, mut rx) =
        ScriptedTransport::new(Vec::new(), Ok(200), Some(Duration::from_secs(60)));
    let c = client(transport, &metrics);

    let started = tokio::time::Instant::now();
    let ok = c
        .send_violation(Some(COLLECTOR), ORIGIN, "https://news.example.com/", Mode::Strict, event(), 1)
        .await;
    assert!(!ok);
    assert_eq!(drain(&mut rx).len(), 2);

    // 10s timeout, 1s backoff, 10s timeout
    assert_close(started.elapsed(), Duration::from_secs(21));
    assert_eq!(
        metrics
            .reports_failed
            .get(&[("endpoint", COLLECTOR), ("reason", "timeout")]),
        2
    );
}

#[tokio::test(start_paused = true)]
async fn missing_endpoint_is_a_local_no_op() {
    let metrics = Arc::new(ProxyMetrics::default());
    let (transport, mut rx) = ScriptedTransport::accepting();
    let c = client(transport, &metrics);

    assert!(!c
        .send_violation(None, ORIGIN, "https://news.example.com/", Mode::Strict, event(), 3)
        .await);
    assert!(!c
        .send_invalid_policy(None, ORIGIN, "https://news.example.com/", ErrorKind::Signature, "bad sig", 3)
        .await);
    assert!(drain(&mut rx).is_empty());
    assert_eq!(metrics.reports_failed.total(), 0);
}

#[tokio::test(start_paused = true)]
async fn invalid_policy_report_carries_error_type() {
    let metrics = Arc::new(ProxyMetrics::default());
    let (transport, mut rx) = ScriptedTransport::accepting();
    let c = client(transport, &metrics);

    assert!(c
        .send_invalid_policy(Some(COLLECTOR), ORIGIN, "https://news.example.com/", ErrorKind::KeyFetch, "404", 0)
        .await);

    let posted = drain(&mut rx);
    assert_eq!(posted[0].body["type"], "invalid_policy");
    assert_eq!(posted[0].body["error_type"], "key_fetch_error");
    assert_eq!(posted[0].body["detail"], "404");
}

#[tokio::test(start_paused = true)]
async fn full_queue_drops_and_counts() {
    let metrics = Arc::new(ProxyMetrics::default());
    let (transport, _rx) = ScriptedTransport::accepting();
    let c = Arc::new(client(transport, &metrics));
    let (queue, _workers) = ReportQueue::start(c, Arc::clone(&metrics), 1, 1, 0);

    let job = || ReportJob::Violation {
        endpoint: Some(COLLECTOR.to_string()),
        origin: ORIGIN.to_string(),
        page_url: "https://news.example.com/".to_string(),
        mode: Mode::Strict,
        event: event(),
    };

    // Workers have not been polled yet on this single-threaded runtime.
    assert!(queue.submit(job()));
    assert!(!queue.submit(job()));
    assert_eq!(metrics.reports_dropped.get(&[("reason", "queue_full")]), 1);
    assert_eq!(queue.depth(), 1);
}

#[tokio::test(start_paused = true)]
async fn workers_deliver_queued_jobs_and_stop_when_queue_is_dropped() {
    let metrics = Arc::new(ProxyMetrics::default());
    let (transport, mut rx) = ScriptedTransport::accepting();
    let c = Arc::new(client(transport, &metrics));
    let (queue, workers) = ReportQueue::start(c, Arc::clone(&metrics), 8, 2, 0);
    assert_eq!(workers.len(), 2);

    for _ in 0..3 {
        assert!(queue.submit(ReportJob::Violation {
            endpoint: Some(COLLECTOR.to_string()),
            origin: ORIGIN.to_string(),
            page_url: "https://news.example.com/".to_string(),
            mode: Mode::Strict,
            event: event(),
        }));
    }

    // No endpoint: handled inline, never queued.
    assert!(!queue.submit(ReportJob::InvalidPolicy {
        endpoint: None,
        origin: ORIGIN.to_string(),
        page_url: "https://news.example.com/".to_string(),
        error_type: ErrorKind::Signature,
        detail: "bad".to_string(),
    }));

    drop(queue);
    workers.join().await;

    assert_eq!(drain(&mut rx).len(), 3);
    assert_eq!(
        metrics
            .reports_sent
            .get(&[("endpoint", COLLECTOR), ("status", "200")]),
        3
    );
    assert_eq!(metrics.reports_dropped.total(), 0);
}
