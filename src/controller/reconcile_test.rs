use super::*;
use crate::controller::clock::{Clock, MockClock};
use crate::controller::heartbeat::{MockHeartbeat, Ping};
use crate::controller::notifier::{MockNotifier, ServiceStatus};
use crate::controller::probe::MockProber;
use crate::controller::tracker::{MockTracker, Ticket, TrackerOp};
use crate::incident::{IncidentDocument, IssueLinkage};
use chrono::{TimeZone, Utc};
use std::sync::Arc;

const LABEL: &str = "status-api-outage";
const SERVICE: &str = "Status API";

struct Harness {
    tracker: Arc<MockTracker>,
    prober: Arc<MockProber>,
    notifier: Arc<MockNotifier>,
    heartbeat: Arc<MockHeartbeat>,
    clock: Arc<MockClock>,
    ctx: Context,
}

impl Harness {
    fn new(prober: MockProber) -> Self {
        let tracker = Arc::new(MockTracker::new());
        let prober = Arc::new(prober);
        let notifier = Arc::new(MockNotifier::new());
        let heartbeat = Arc::new(MockHeartbeat::new());
        let clock = Arc::new(MockClock::new(
            Utc.with_ymd_and_hms(2026, 10, 15, 12, 30, 5).unwrap(),
        ));

        let ctx = Context {
            settings: ReconcileSettings {
                service_name: SERVICE.to_string(),
                issue_label: LABEL.to_string(),
                content_dir: "content/issues".to_string(),
            },
            tracker: tracker.clone(),
            prober: prober.clone(),
            notifier: notifier.clone(),
            heartbeat: heartbeat.clone(),
            clock: clock.clone(),
        };

        Harness {
            tracker,
            prober,
            notifier,
            heartbeat,
            clock,
            ctx,
        }
    }

    /// Seed an open incident the way a previous pass would have left it
    fn seed_open_incident(&self) -> (u64, String) {
        let filename = "2026-10-15-status-api-outage-11-00-00.md".to_string();
        let started = Utc.with_ymd_and_hms(2026, 10, 15, 11, 0, 0).unwrap();
        let content = IncidentDocument::open_outage(SERVICE, started)
            .render()
            .unwrap();
        let hash = self
            .tracker
            .put_file(&format!("content/issues/{}", filename), &content);
        let body = IssueLinkage {
            filename: filename.clone(),
            hash,
        }
        .to_issue_body(started)
        .unwrap();
        let number = self.tracker.open_ticket("Status API Down", &body, LABEL);
        (number, filename)
    }

    fn document(&self, filename: &str) -> IncidentDocument {
        let text = self
            .tracker
            .file(&format!("content/issues/{}", filename))
            .expect("incident file should exist");
        IncidentDocument::parse(&text).unwrap()
    }
}

#[test]
fn test_plan_covers_all_states() {
    let ticket = Ticket {
        number: 7,
        title: "Status API Down".to_string(),
        body: None,
    };

    assert_eq!(plan(None, false), Transition::OpenIncident);
    assert_eq!(plan(None, true), Transition::NoOpUp);
    assert_eq!(
        plan(Some(ticket.clone()), true),
        Transition::CloseIncident(ticket.clone())
    );
    assert_eq!(plan(Some(ticket.clone()), false), Transition::NoOpDown(ticket));
}

#[test]
fn test_content_path_joins_dir() {
    let settings = ReconcileSettings {
        service_name: SERVICE.to_string(),
        issue_label: LABEL.to_string(),
        content_dir: "content/issues/".to_string(),
    };
    assert_eq!(settings.content_path("a.md"), "content/issues/a.md");
}

#[tokio::test]
async fn test_down_without_ticket_opens_incident() {
    let h = Harness::new(MockProber::down());

    let outcome = run_once(&h.ctx).await.unwrap();

    let filename = "2026-10-15-status-api-outage-12-30-05.md".to_string();
    assert_eq!(
        outcome,
        ReconcileOutcome::Opened {
            ticket: 1,
            filename: filename.clone()
        }
    );

    // Exactly one file, exactly one ticket, file before ticket
    assert_eq!(h.tracker.file_paths(), vec![format!("content/issues/{}", filename)]);
    assert_eq!(
        h.tracker.write_calls(),
        vec![TrackerOp::CreateFile, TrackerOp::CreateTicket]
    );

    let doc = h.document(&filename);
    assert_eq!(doc.front_matter.severity, "down");
    assert!(!doc.front_matter.resolved);
    assert_eq!(doc.front_matter.resolved_when, "");
    assert_eq!(doc.front_matter.date, "2026-10-15T12:30:05.000Z");

    let open = h.tracker.open_tickets();
    assert_eq!(open.len(), 1);
    assert_eq!(open[0].ticket.title, "Status API Down");
    assert_eq!(open[0].labels, vec![LABEL.to_string()]);

    // Ticket links to the created file and its revision
    let linkage = IssueLinkage::from_issue_body(open[0].ticket.body.as_deref().unwrap()).unwrap();
    assert_eq!(linkage.filename, filename);
    assert_eq!(linkage.hash, "sha-1");

    assert_eq!(h.notifier.sent(), vec![ServiceStatus::Offline]);
    assert_eq!(h.heartbeat.pings(), vec![Ping::Start, Ping::Success]);
}

#[tokio::test]
async fn test_up_with_ticket_resolves_incident() {
    let h = Harness::new(MockProber::up());
    let (number, filename) = h.seed_open_incident();

    let outcome = run_once(&h.ctx).await.unwrap();

    assert_eq!(
        outcome,
        ReconcileOutcome::Resolved {
            ticket: number,
            filename: filename.clone()
        }
    );

    let doc = h.document(&filename);
    assert!(doc.front_matter.resolved);
    assert_eq!(doc.front_matter.resolved_when, "2026-10-15T12:30:05.000Z");
    assert!(doc.narrative.starts_with("*Resolved*"));
    assert!(doc.narrative.contains("*Investigating*"));

    assert!(h.tracker.open_tickets().is_empty());
    assert_eq!(
        h.tracker.write_calls(),
        vec![TrackerOp::UpdateFile, TrackerOp::CloseTicket]
    );
    assert_eq!(h.notifier.sent(), vec![ServiceStatus::Online]);
    assert_eq!(h.heartbeat.pings(), vec![Ping::Start, Ping::Success]);
}

#[tokio::test]
async fn test_up_without_ticket_writes_nothing() {
    let h = Harness::new(MockProber::up());

    let outcome = run_once(&h.ctx).await.unwrap();

    assert_eq!(outcome, ReconcileOutcome::StillUp);
    assert!(h.tracker.write_calls().is_empty());
    assert!(h.notifier.sent().is_empty());
    assert_eq!(h.heartbeat.pings(), vec![Ping::Start, Ping::Success]);
}

#[tokio::test]
async fn test_down_with_ticket_writes_nothing() {
    let h = Harness::new(MockProber::down());
    let (number, _) = h.seed_open_incident();

    let outcome = run_once(&h.ctx).await.unwrap();

    assert_eq!(outcome, ReconcileOutcome::AlreadyDown { ticket: number });
    assert!(h.tracker.write_calls().is_empty());
    assert!(h.notifier.sent().is_empty());
    assert_eq!(h.tracker.open_tickets().len(), 1);
}

#[tokio::test]
async fn test_repeated_down_passes_open_one_ticket() {
    let h = Harness::new(MockProber::down());

    let first = run_once(&h.ctx).await.unwrap();
    h.clock.advance(chrono::Duration::minutes(1));
    let second = run_once(&h.ctx).await.unwrap();
    h.clock.advance(chrono::Duration::minutes(1));
    let third = run_once(&h.ctx).await.unwrap();

    assert!(matches!(first, ReconcileOutcome::Opened { ticket: 1, .. }));
    assert_eq!(second, ReconcileOutcome::AlreadyDown { ticket: 1 });
    assert_eq!(third, ReconcileOutcome::AlreadyDown { ticket: 1 });
    assert_eq!(h.tracker.open_tickets().len(), 1);
    assert_eq!(h.tracker.file_paths().len(), 1);
    assert_eq!(h.notifier.sent(), vec![ServiceStatus::Offline]);
}

#[tokio::test]
async fn test_outage_then_recovery_full_cycle() {
    let h = Harness::new(MockProber::down());

    let opened = run_once(&h.ctx).await.unwrap();
    let ReconcileOutcome::Opened { ticket, filename } = opened else {
        panic!("expected Opened, got {:?}", opened);
    };

    h.prober.set_up(true);
    h.clock.advance(chrono::Duration::minutes(17));
    let resolved = run_once(&h.ctx).await.unwrap();

    assert_eq!(
        resolved,
        ReconcileOutcome::Resolved {
            ticket,
            filename: filename.clone()
        }
    );
    let doc = h.document(&filename);
    assert!(doc.front_matter.resolved);
    assert_eq!(doc.front_matter.resolved_when, "2026-10-15T12:47:05.000Z");
    assert!(h.tracker.open_tickets().is_empty());

    // Back to steady state
    let steady = run_once(&h.ctx).await.unwrap();
    assert_eq!(steady, ReconcileOutcome::StillUp);
    assert_eq!(
        h.notifier.sent(),
        vec![ServiceStatus::Offline, ServiceStatus::Online]
    );
}

#[tokio::test]
async fn test_query_failure_skips_probe_and_writes() {
    let h = Harness::new(MockProber::down());
    h.tracker.fail_on(TrackerOp::ListOpen);

    let result = run_once(&h.ctx).await;

    assert!(matches!(result, Err(ReconcileError::QueryTickets(_))));
    assert_eq!(h.prober.probe_count(), 0);
    assert!(h.tracker.write_calls().is_empty());
    let pings = h.heartbeat.pings();
    assert_eq!(pings.len(), 3);
    assert_eq!(pings[0], Ping::Start);
    assert!(matches!(&pings[1], Ping::Log(msg) if msg.starts_with("Unable to retrieve issues")));
    assert_eq!(pings[2], Ping::Fail);
}

#[tokio::test]
async fn test_authentication_failure_is_reported() {
    let h = Harness::new(MockProber::down());
    h.tracker.fail_on(TrackerOp::Authenticate);

    let result = run_once(&h.ctx).await;

    assert!(matches!(result, Err(ReconcileError::Authentication(_))));
    assert_eq!(h.tracker.calls(), vec![TrackerOp::Authenticate]);
    assert_eq!(h.heartbeat.pings().last(), Some(&Ping::Fail));
}

#[tokio::test]
async fn test_file_create_failure_opens_no_ticket() {
    let h = Harness::new(MockProber::down());
    h.tracker.fail_on(TrackerOp::CreateFile);

    let result = run_once(&h.ctx).await;

    assert!(matches!(result, Err(ReconcileError::CreateFile { .. })));
    assert!(h.tracker.tickets().is_empty());
    assert!(h.notifier.sent().is_empty());
    assert_eq!(h.heartbeat.pings().last(), Some(&Ping::Fail));
}

#[tokio::test]
async fn test_ticket_create_failure_leaves_orphan_file() {
    let h = Harness::new(MockProber::down());
    h.tracker.fail_on(TrackerOp::CreateTicket);

    let result = run_once(&h.ctx).await;

    match result {
        Err(ReconcileError::CreateTicket { filename, .. }) => {
            assert_eq!(filename, "2026-10-15-status-api-outage-12-30-05.md")
        }
        other => panic!("expected CreateTicket error, got {:?}", other),
    }
    assert_eq!(h.tracker.file_paths().len(), 1);
    assert!(h.tracker.tickets().is_empty());
    assert!(h.notifier.sent().is_empty());

    // Next tick starts over with a fresh file
    h.tracker.recover(TrackerOp::CreateTicket);
    h.clock.advance(chrono::Duration::minutes(1));
    let retried = run_once(&h.ctx).await.unwrap();
    assert!(matches!(retried, ReconcileOutcome::Opened { .. }));
    assert_eq!(h.tracker.file_paths().len(), 2);
    assert_eq!(h.tracker.open_tickets().len(), 1);
}

#[tokio::test]
async fn test_update_failure_keeps_ticket_open() {
    let h = Harness::new(MockProber::up());
    let (_, filename) = h.seed_open_incident();
    h.tracker.fail_on(TrackerOp::UpdateFile);

    let result = run_once(&h.ctx).await;

    assert!(matches!(result, Err(ReconcileError::UpdateFile { .. })));
    assert!(!h.tracker.calls().contains(&TrackerOp::CloseTicket));
    assert_eq!(h.tracker.open_tickets().len(), 1);
    assert!(!h.document(&filename).front_matter.resolved);
    assert!(h.notifier.sent().is_empty());

    let pings = h.heartbeat.pings();
    assert!(matches!(&pings[1], Ping::Log(msg) if msg.contains("Failed to update incident file")));
    assert_eq!(pings[2], Ping::Fail);
}

#[tokio::test]
async fn test_fetch_failure_keeps_ticket_open() {
    let h = Harness::new(MockProber::up());
    h.seed_open_incident();
    h.tracker.fail_on(TrackerOp::GetFile);

    let result = run_once(&h.ctx).await;

    assert!(matches!(result, Err(ReconcileError::FetchFile { .. })));
    assert!(h.tracker.write_calls().is_empty());
    assert_eq!(h.tracker.open_tickets().len(), 1);
}

#[tokio::test]
async fn test_close_failure_then_retry_resolves_once() {
    let h = Harness::new(MockProber::up());
    let (number, filename) = h.seed_open_incident();
    h.tracker.fail_on(TrackerOp::CloseTicket);

    let result = run_once(&h.ctx).await;
    assert!(matches!(result, Err(ReconcileError::CloseTicket { ticket, .. }) if ticket == number));
    let after_first = h.document(&filename);
    assert!(after_first.front_matter.resolved);

    // Next tick closes without resolving the file a second time
    h.tracker.recover(TrackerOp::CloseTicket);
    h.clock.advance(chrono::Duration::minutes(1));
    let outcome = run_once(&h.ctx).await.unwrap();

    assert_eq!(
        outcome,
        ReconcileOutcome::Resolved {
            ticket: number,
            filename: filename.clone()
        }
    );
    assert_eq!(h.document(&filename), after_first);
    assert_eq!(
        h.tracker.write_calls(),
        vec![
            TrackerOp::UpdateFile,
            TrackerOp::CloseTicket,
            TrackerOp::CloseTicket
        ]
    );
    assert!(h.tracker.open_tickets().is_empty());
}

#[tokio::test]
async fn test_ticket_without_linkage_is_reported() {
    let h = Harness::new(MockProber::up());
    let number = h
        .tracker
        .open_ticket("Status API Down", "opened by hand, no metadata", LABEL);

    let result = run_once(&h.ctx).await;

    assert!(
        matches!(result, Err(ReconcileError::MalformedLinkage { ticket, .. }) if ticket == number)
    );
    assert!(h.tracker.write_calls().is_empty());
    assert_eq!(h.tracker.open_tickets().len(), 1);
}

#[tokio::test]
async fn test_malformed_file_is_reported() {
    let h = Harness::new(MockProber::up());
    let hash = h
        .tracker
        .put_file("content/issues/broken.md", "no front matter here");
    let body = IssueLinkage {
        filename: "broken.md".to_string(),
        hash,
    }
    .to_issue_body(h.clock.now())
    .unwrap();
    h.tracker.open_ticket("Status API Down", &body, LABEL);

    let result = run_once(&h.ctx).await;

    assert!(matches!(result, Err(ReconcileError::MalformedDocument { .. })));
    assert!(h.tracker.write_calls().is_empty());
}

#[tokio::test]
async fn test_hand_edited_file_still_resolves() {
    let h = Harness::new(MockProber::up());
    let (_, filename) = h.seed_open_incident();

    // Someone adds an update to the post after the ticket was opened
    let path = format!("content/issues/{}", filename);
    let mut doc = h.document(&filename);
    doc.narrative = format!("*Identified* - Database failover.\n\n{}", doc.narrative);
    let edited = doc.render().unwrap();
    h.tracker.put_file(&path, &edited);

    let outcome = run_once(&h.ctx).await.unwrap();

    assert!(matches!(outcome, ReconcileOutcome::Resolved { .. }));
    let resolved = h.document(&filename);
    assert!(resolved.front_matter.resolved);
    assert!(resolved.narrative.contains("*Identified* - Database failover."));
}

#[tokio::test]
async fn test_multiple_open_tickets_tracks_newest() {
    let h = Harness::new(MockProber::down());
    h.seed_open_incident();
    let newest = h
        .tracker
        .open_ticket("Status API Down", "duplicate opened by hand", LABEL);

    let outcome = run_once(&h.ctx).await.unwrap();

    assert_eq!(outcome, ReconcileOutcome::AlreadyDown { ticket: newest });
    assert!(h.tracker.write_calls().is_empty());
}

#[tokio::test]
async fn test_tickets_with_other_labels_are_ignored() {
    let h = Harness::new(MockProber::up());
    h.tracker
        .open_ticket("Unrelated bug", "```json\n{}\n```", "bug");

    let outcome = run_once(&h.ctx).await.unwrap();

    assert_eq!(outcome, ReconcileOutcome::StillUp);
    assert!(h.tracker.write_calls().is_empty());
}

#[tokio::test]
async fn test_failing_notifier_does_not_change_outcome() {
    let mut h = Harness::new(MockProber::down());
    let notifier = Arc::new(MockNotifier::failing());
    h.ctx.notifier = notifier.clone();

    let outcome = run_once(&h.ctx).await.unwrap();

    assert!(matches!(outcome, ReconcileOutcome::Opened { .. }));
    assert_eq!(notifier.sent(), vec![ServiceStatus::Offline]);
    assert_eq!(h.heartbeat.pings(), vec![Ping::Start, Ping::Success]);
}

#[tokio::test]
async fn test_unconfigured_webhook_and_heartbeat_do_not_affect_outcome() {
    use crate::controller::heartbeat::HealthchecksClient;
    use crate::controller::notifier::WebhookNotifier;

    let mut h = Harness::new(MockProber::down());
    h.ctx.notifier = Arc::new(WebhookNotifier::new(None, SERVICE.to_string()));
    h.ctx.heartbeat = Arc::new(HealthchecksClient::new(None));

    let outcome = run_once(&h.ctx).await.unwrap();

    assert!(matches!(outcome, ReconcileOutcome::Opened { .. }));
    assert_eq!(h.tracker.open_tickets().len(), 1);
    assert_eq!(h.tracker.file_paths().len(), 1);
}
