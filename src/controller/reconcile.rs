use crate::controller::clock::Clock;
use crate::controller::heartbeat::Heartbeat;
use crate::controller::notifier::{Notifier, ServiceStatus};
use crate::controller::probe::Prober;
use crate::controller::report::RunReport;
use crate::controller::tracker::{IssueTracker, NewTicket, Ticket, TrackerError};
use crate::incident::{outage_filename, DocumentError, IncidentDocument, IssueLinkage, LinkageError};
use std::sync::Arc;
use thiserror::Error;
use tracing::{debug, error, info, warn};

/// A reportable failure that aborts the current pass
///
/// Nothing is retried within a pass; the next tick re-evaluates from scratch.
#[derive(Debug, Error)]
pub enum ReconcileError {
    #[error("Failed to authenticate to the issue tracker: {0}")]
    Authentication(#[source] TrackerError),

    #[error("Unable to retrieve issues: {0}")]
    QueryTickets(#[source] TrackerError),

    #[error("Failed to render incident post: {0}")]
    RenderDocument(#[source] DocumentError),

    #[error("Failed to encode ticket linkage: {0}")]
    EncodeLinkage(#[source] LinkageError),

    #[error("Failed to create incident file {path}: {source}")]
    CreateFile {
        path: String,
        #[source]
        source: TrackerError,
    },

    #[error("Failed to open ticket for {filename}: {source}")]
    CreateTicket {
        filename: String,
        #[source]
        source: TrackerError,
    },

    #[error("Ticket #{ticket} has no usable file linkage: {source}")]
    MalformedLinkage {
        ticket: u64,
        #[source]
        source: LinkageError,
    },

    #[error("Failed to fetch incident file {path}: {source}")]
    FetchFile {
        path: String,
        #[source]
        source: TrackerError,
    },

    #[error("Incident file {path} is malformed: {source}")]
    MalformedDocument {
        path: String,
        #[source]
        source: DocumentError,
    },

    #[error("Failed to update incident file {path}: {source}")]
    UpdateFile {
        path: String,
        #[source]
        source: TrackerError,
    },

    #[error("Failed to close ticket #{ticket}: {source}")]
    CloseTicket {
        ticket: u64,
        #[source]
        source: TrackerError,
    },
}

/// What a successful pass did
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReconcileOutcome {
    /// Endpoint went down: post created and ticket opened
    Opened { ticket: u64, filename: String },
    /// Endpoint came back: post resolved and ticket closed
    Resolved { ticket: u64, filename: String },
    /// Endpoint is down and the incident is already tracked
    AlreadyDown { ticket: u64 },
    /// Endpoint is up and there is no incident
    StillUp,
}

/// Transition selected from (open ticket, probe result)
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Transition {
    OpenIncident,
    CloseIncident(Ticket),
    NoOpDown(Ticket),
    NoOpUp,
}

/// Pick the transition for the current state
pub fn plan(open_ticket: Option<Ticket>, is_up: bool) -> Transition {
    match (open_ticket, is_up) {
        (None, false) => Transition::OpenIncident,
        (Some(ticket), true) => Transition::CloseIncident(ticket),
        (Some(ticket), false) => Transition::NoOpDown(ticket),
        (None, true) => Transition::NoOpUp,
    }
}

/// Per-deployment values the reconciler needs
#[derive(Debug, Clone)]
pub struct ReconcileSettings {
    pub service_name: String,
    pub issue_label: String,
    /// Repository directory holding incident posts
    pub content_dir: String,
}

impl ReconcileSettings {
    pub fn content_path(&self, filename: &str) -> String {
        format!("{}/{}", self.content_dir.trim_end_matches('/'), filename)
    }
}

pub struct Context {
    pub settings: ReconcileSettings,
    pub tracker: Arc<dyn IssueTracker>,
    pub prober: Arc<dyn Prober>,
    pub notifier: Arc<dyn Notifier>,
    pub heartbeat: Arc<dyn Heartbeat>,
    pub clock: Arc<dyn Clock>,
}

/// Run one pass with its best-effort side effects
///
/// Pings the heartbeat on start, sends a chat notification when an incident
/// opens or resolves, and reports success or the failure diagnostic. All side
/// effects are drained before returning.
pub async fn run_once(ctx: &Context) -> Result<ReconcileOutcome, ReconcileError> {
    let mut report = RunReport::begin(ctx.heartbeat.clone());
    let result = reconcile(ctx).await;

    match &result {
        Ok(outcome) => {
            match outcome {
                ReconcileOutcome::Opened { ticket, filename } => {
                    info!(ticket, file = %filename, "Incident opened");
                    report.notify(ctx.notifier.clone(), ServiceStatus::Offline);
                }
                ReconcileOutcome::Resolved { ticket, filename } => {
                    info!(ticket, file = %filename, "Incident resolved");
                    report.notify(ctx.notifier.clone(), ServiceStatus::Online);
                }
                ReconcileOutcome::AlreadyDown { ticket } => {
                    info!(ticket, "Service still down, incident already tracked");
                }
                ReconcileOutcome::StillUp => {
                    info!("Service up, no incident");
                }
            }
            report.succeed().await;
        }
        Err(e) => {
            error!(error = %e, "Reconciliation failed");
            report.fail(e.to_string()).await;
        }
    }

    result
}

/// Reconcile the incident record against the endpoint's reachability
///
/// 1. Authenticates to the tracker
/// 2. Lists open tickets with the incident label
/// 3. Probes the endpoint
/// 4. Opens an incident, resolves it, or does nothing
///
/// Writes happen only in the open and resolve transitions, and the content
/// file is always written before the ticket is touched.
pub async fn reconcile(ctx: &Context) -> Result<ReconcileOutcome, ReconcileError> {
    let identity = ctx
        .tracker
        .authenticate()
        .await
        .map_err(ReconcileError::Authentication)?;
    debug!(identity = %identity, "Authenticated to issue tracker");

    let tickets = ctx
        .tracker
        .list_open_tickets(&ctx.settings.issue_label)
        .await
        .map_err(ReconcileError::QueryTickets)?;

    if tickets.len() > 1 {
        warn!(
            label = %ctx.settings.issue_label,
            count = tickets.len(),
            tracked = tickets[0].number,
            "More than one open incident ticket; tracking the newest"
        );
    }
    let open_ticket = tickets.into_iter().next();

    let probe = ctx.prober.probe().await;
    info!(
        service = %ctx.settings.service_name,
        up = probe.is_up(),
        probe = ?probe,
        open_ticket = ?open_ticket.as_ref().map(|t| t.number),
        "Probed endpoint"
    );

    match plan(open_ticket, probe.is_up()) {
        Transition::OpenIncident => open_incident(ctx).await,
        Transition::CloseIncident(ticket) => close_incident(ctx, &ticket).await,
        Transition::NoOpDown(ticket) => Ok(ReconcileOutcome::AlreadyDown {
            ticket: ticket.number,
        }),
        Transition::NoOpUp => Ok(ReconcileOutcome::StillUp),
    }
}

/// Create the incident post, then the ticket that links to it
///
/// A failed ticket create leaves the post behind; the next pass starts over
/// with a new post.
async fn open_incident(ctx: &Context) -> Result<ReconcileOutcome, ReconcileError> {
    let service = &ctx.settings.service_name;
    let now = ctx.clock.now();

    let filename = outage_filename(service, now);
    let path = ctx.settings.content_path(&filename);
    let content = IncidentDocument::open_outage(service, now)
        .render()
        .map_err(ReconcileError::RenderDocument)?;

    let hash = ctx
        .tracker
        .create_file(&path, &content, &format!("Report outage for {}", service))
        .await
        .map_err(|source| ReconcileError::CreateFile {
            path: path.clone(),
            source,
        })?;
    info!(path = %path, hash = %hash, "Created incident file");

    let linkage = IssueLinkage {
        filename: filename.clone(),
        hash,
    };
    let body = linkage
        .to_issue_body(now)
        .map_err(ReconcileError::EncodeLinkage)?;

    let ticket = ctx
        .tracker
        .create_ticket(&NewTicket {
            title: format!("{} Down", service),
            body,
            labels: vec![ctx.settings.issue_label.clone()],
        })
        .await
        .map_err(|source| ReconcileError::CreateTicket {
            filename: filename.clone(),
            source,
        })?;
    info!(ticket = ticket.number, "Created incident ticket");

    Ok(ReconcileOutcome::Opened {
        ticket: ticket.number,
        filename,
    })
}

/// Resolve the linked post, then close the ticket
///
/// The ticket is only closed once the post update succeeded. A post that is
/// already resolved (an earlier pass updated it but failed to close) goes
/// straight to the close.
async fn close_incident(
    ctx: &Context,
    ticket: &Ticket,
) -> Result<ReconcileOutcome, ReconcileError> {
    let service = &ctx.settings.service_name;

    let linkage = IssueLinkage::from_issue_body(ticket.body.as_deref().unwrap_or_default())
        .map_err(|source| ReconcileError::MalformedLinkage {
            ticket: ticket.number,
            source,
        })?;
    let path = ctx.settings.content_path(&linkage.filename);

    let file = ctx
        .tracker
        .get_file(&path)
        .await
        .map_err(|source| ReconcileError::FetchFile {
            path: path.clone(),
            source,
        })?;
    if file.sha != linkage.hash {
        debug!(
            path = %path,
            linked = %linkage.hash,
            current = %file.sha,
            "Incident file changed since the ticket was opened"
        );
    }

    let mut document =
        IncidentDocument::parse(&file.content).map_err(|source| ReconcileError::MalformedDocument {
            path: path.clone(),
            source,
        })?;

    match document.resolve(service, ctx.clock.now()) {
        Ok(()) => {
            let content = document.render().map_err(ReconcileError::RenderDocument)?;
            let hash = ctx
                .tracker
                .update_file(
                    &path,
                    &content,
                    &format!("Report uptime for {}", service),
                    &file.sha,
                )
                .await
                .map_err(|source| ReconcileError::UpdateFile {
                    path: path.clone(),
                    source,
                })?;
            info!(path = %path, hash = %hash, "Resolved incident file");
        }
        Err(DocumentError::AlreadyResolved { resolved_when }) => {
            warn!(
                path = %path,
                resolved_when = %resolved_when,
                "Incident file already resolved, closing ticket"
            );
        }
        Err(source) => {
            return Err(ReconcileError::MalformedDocument { path, source });
        }
    }

    ctx.tracker
        .close_ticket(ticket.number)
        .await
        .map_err(|source| ReconcileError::CloseTicket {
            ticket: ticket.number,
            source,
        })?;
    info!(ticket = ticket.number, "Closed incident ticket");

    Ok(ReconcileOutcome::Resolved {
        ticket: ticket.number,
        filename: linkage.filename,
    })
}
