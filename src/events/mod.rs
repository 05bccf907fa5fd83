use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;
use tokio::task::JoinHandle;

use crate::providers::CheckpointAction;
use crate::types::{AgentId, Finding, SessionId, StoppedReason};

const DEFAULT_CAPACITY: usize = 256;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum DomainEvent {
    SessionStarted {
        session_id: SessionId,
        agent_id: AgentId,
        url: String,
    },
    SessionEnded {
        session_id: SessionId,
        agent_id: AgentId,
        stopped_reason: StoppedReason,
        total_steps: usize,
        findings: usize,
    },
    StepCompleted {
        session_id: SessionId,
        step_number: u32,
        action: String,
        url: String,
        success: bool,
    },
    CheckpointTriggered {
        session_id: SessionId,
        reason: String,
    },
    GuidanceReceived {
        session_id: SessionId,
        action: CheckpointAction,
        guidance: Option<String>,
    },
    FindingDiscovered {
        session_id: SessionId,
        finding: Finding,
    },
}

impl DomainEvent {
    pub fn name(&self) -> &str {
        match self {
            DomainEvent::SessionStarted { .. } => "session_started",
            DomainEvent::SessionEnded { .. } => "session_ended",
            DomainEvent::StepCompleted { .. } => "step_completed",
            DomainEvent::CheckpointTriggered { .. } => "checkpoint_triggered",
            DomainEvent::GuidanceReceived { .. } => "guidance_received",
            DomainEvent::FindingDiscovered { .. } => "finding_discovered",
        }
    }
}

/// Fire-and-forget event publishing. Implementations must not block or fail the caller.
pub trait EventSink: Send + Sync {
    fn publish(&self, event: DomainEvent);
}

/// In-process fan-out over a tokio broadcast channel.
///
/// Each subscriber has its own cursor, so a slow or dropped subscriber only
/// loses its own events.
#[derive(Clone)]
pub struct EventBus {
    sender: broadcast::Sender<DomainEvent>,
}

impl EventBus {
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity.max(1));
        Self { sender }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<DomainEvent> {
        self.sender.subscribe()
    }

    pub fn subscriber_count(&self) -> usize {
        self.sender.receiver_count()
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new(DEFAULT_CAPACITY)
    }
}

impl EventSink for EventBus {
    fn publish(&self, event: DomainEvent) {
        let name = event.name().to_string();
        if self.sender.send(event).is_err() {
            log::debug!("no subscribers for {} event", name);
        }
    }
}

pub fn spawn_event_logger(bus: &EventBus) -> JoinHandle<()> {
    let mut receiver = bus.subscribe();
    tokio::spawn(async move {
        loop {
            match receiver.recv().await {
                Ok(event) => log_event(&event),
                Err(broadcast::error::RecvError::Lagged(skipped)) => {
                    log::warn!("event logger lagged, skipped {} events", skipped);
                }
                Err(broadcast::error::RecvError::Closed) => break,
            }
        }
    })
}

fn log_event(event: &DomainEvent) {
    match event {
        DomainEvent::SessionStarted { agent_id, url, .. } => {
            log::info!("[{}] session started at {}", agent_id, url)
        }
        DomainEvent::SessionEnded {
            agent_id,
            stopped_reason,
            total_steps,
            findings,
            ..
        } => log::info!(
            "[{}] session ended ({}) after {} steps with {} findings",
            agent_id,
            stopped_reason.as_str(),
            total_steps,
            findings
        ),
        DomainEvent::StepCompleted {
            step_number,
            action,
            url,
            success,
            ..
        } => log::debug!(
            "step {} {} on {} ({})",
            step_number,
            action,
            url,
            if *success { "ok" } else { "failed" }
        ),
        DomainEvent::CheckpointTriggered { reason, .. } => log::info!("checkpoint: {}", reason),
        DomainEvent::GuidanceReceived { action, guidance, .. } => {
            log::info!("guidance {:?}: {}", action, guidance.as_deref().unwrap_or("-"))
        }
        DomainEvent::FindingDiscovered { finding, .. } => {
            log::info!("finding {}", finding.summary_line())
        }
    }
}
