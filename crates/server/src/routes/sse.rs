use std::collections::VecDeque;
use std::convert::Infallible;
use std::sync::{Arc, RwLock};
use std::time::Duration;

use axum::extract::{Query, State};
use axum::response::sse::{Event, KeepAlive, Sse};
use events::{EventBus, EventEnvelope};
use futures::stream::{Stream, StreamExt};
use serde::Deserialize;
use tokio_stream::wrappers::BroadcastStream;
use uuid::Uuid;

use crate::state::AppState;

pub const DEFAULT_EVENT_BUFFER_SIZE: usize = 1000;
pub const SSE_KEEP_ALIVE_INTERVAL: Duration = Duration::from_secs(15);

#[derive(Debug, Deserialize)]
pub struct EventsQuery {
    /// Comma-separated phase numbers; events without a phase always pass
    pub phases: Option<String>,
}

/// Recent events kept for `Last-Event-ID` replay.
pub struct EventBuffer {
    events: VecDeque<EventEnvelope>,
    max_size: usize,
}

impl EventBuffer {
    pub fn new(max_size: usize) -> Self {
        Self {
            events: VecDeque::with_capacity(max_size),
            max_size,
        }
    }

    pub fn push(&mut self, envelope: EventEnvelope) {
        if self.events.len() >= self.max_size {
            self.events.pop_front();
        }
        self.events.push_back(envelope);
    }

    pub fn events_after(&self, event_id: Uuid) -> Vec<EventEnvelope> {
        self.events
            .iter()
            .skip_while(|envelope| envelope.id != event_id)
            .skip(1)
            .cloned()
            .collect()
    }

    pub fn len(&self) -> usize {
        self.events.len()
    }

    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }
}

pub type SharedEventBuffer = Arc<RwLock<EventBuffer>>;

/// Copies every bus event into `buffer` until the bus is dropped.
pub fn spawn_event_recorder(bus: &EventBus, buffer: SharedEventBuffer) {
    let Ok(handle) = tokio::runtime::Handle::try_current() else {
        tracing::warn!("No runtime available, SSE replay buffer disabled");
        return;
    };

    let mut rx = bus.subscribe();
    handle.spawn(async move {
        loop {
            match rx.recv().await {
                Ok(envelope) => buffer
                    .write()
                    .unwrap_or_else(|poisoned| poisoned.into_inner())
                    .push(envelope),
                Err(tokio::sync::broadcast::error::RecvError::Lagged(skipped)) => {
                    tracing::warn!(skipped, "Event recorder lagged");
                }
                Err(tokio::sync::broadcast::error::RecvError::Closed) => break,
            }
        }
    });
}

fn parse_phases(phases: Option<&str>) -> Option<Vec<i64>> {
    phases.map(|s| {
        s.split(',')
            .filter_map(|p| p.trim().parse().ok())
            .collect()
    })
}

fn matches_phases(envelope: &EventEnvelope, phases: Option<&[i64]>) -> bool {
    match (phases, envelope.event.phase_number()) {
        (Some(phases), Some(phase)) => phases.contains(&phase),
        _ => true,
    }
}

fn envelope_to_sse_event(envelope: &EventEnvelope) -> Result<Event, Infallible> {
    let data = serde_json::to_string(&envelope).unwrap_or_else(|_| "{}".to_string());

    Ok(Event::default()
        .id(envelope.id.to_string())
        .event(envelope.event.event_type())
        .data(data))
}

#[utoipa::path(
    get,
    path = "/api/events",
    params(
        ("phases" = Option<String>, Query, description = "Comma-separated phase numbers to filter events"),
    ),
    responses(
        (status = 200, description = "SSE event stream"),
    ),
    tag = "events"
)]
pub async fn events_stream(
    State(state): State<AppState>,
    Query(query): Query<EventsQuery>,
    headers: axum::http::HeaderMap,
) -> Sse<impl Stream<Item = Result<Event, Infallible>>> {
    let phases = parse_phases(query.phases.as_deref());
    let last_event_id = headers
        .get("Last-Event-ID")
        .and_then(|v| v.to_str().ok())
        .and_then(|s| s.parse::<Uuid>().ok());

    let rx = state.event_bus.subscribe();

    let missed_events = match last_event_id {
        Some(event_id) => state
            .event_buffer
            .read()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .events_after(event_id),
        None => vec![],
    };

    let replay_phases = phases.clone();
    let missed_stream = futures::stream::iter(
        missed_events
            .into_iter()
            .filter(move |e| matches_phases(e, replay_phases.as_deref()))
            .map(|e| envelope_to_sse_event(&e)),
    );

    let live_stream = BroadcastStream::new(rx).filter_map(move |result| {
        let phases = phases.clone();
        async move {
            match result {
                Ok(envelope) if matches_phases(&envelope, phases.as_deref()) => {
                    Some(envelope_to_sse_event(&envelope))
                }
                Ok(_) => None,
                Err(e) => {
                    tracing::warn!("SSE broadcast error: {:?}", e);
                    None
                }
            }
        }
    });

    Sse::new(missed_stream.chain(live_stream)).keep_alive(
        KeepAlive::new()
            .interval(SSE_KEEP_ALIVE_INTERVAL)
            .text("keep-alive"),
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use events::Event as BusEvent;

    fn started(phase_number: i64) -> EventEnvelope {
        EventEnvelope::new(BusEvent::PhaseStarted {
            phase_number,
            model: "o3-mini".to_string(),
        })
    }

    #[test]
    fn test_parse_phases() {
        assert!(parse_phases(None).is_none());
        assert!(parse_phases(Some("")).unwrap().is_empty());
        assert_eq!(parse_phases(Some("0, 3,x,12")).unwrap(), vec![0, 3, 12]);
    }

    #[test]
    fn test_phase_filter_passes_global_events() {
        let cleared = EventEnvelope::new(BusEvent::ResultsCleared { count: 2 });
        assert!(matches_phases(&cleared, Some(&[1])));
        assert!(matches_phases(&started(1), Some(&[1, 2])));
        assert!(!matches_phases(&started(3), Some(&[1, 2])));
        assert!(matches_phases(&started(3), None));
    }

    #[test]
    fn test_event_buffer_events_after() {
        let mut buffer = EventBuffer::new(3);
        let (e1, e2, e3) = (started(0), started(1), started(2));
        let (id1, id2, id3) = (e1.id, e2.id, e3.id);

        buffer.push(e1);
        buffer.push(e2);
        buffer.push(e3);

        let after_first = buffer.events_after(id1);
        assert_eq!(after_first.len(), 2);
        assert_eq!(after_first[0].id, id2);
        assert_eq!(buffer.events_after(id2)[0].id, id3);
        assert!(buffer.events_after(id3).is_empty());
        assert!(buffer.events_after(Uuid::new_v4()).is_empty());
    }

    #[test]
    fn test_event_buffer_evicts_oldest() {
        let mut buffer = EventBuffer::new(2);
        let (e1, e2, e3) = (started(0), started(1), started(2));
        let (id1, id2, id3) = (e1.id, e2.id, e3.id);

        buffer.push(e1);
        buffer.push(e2);
        buffer.push(e3);

        assert_eq!(buffer.len(), 2);
        assert!(buffer.events_after(id1).is_empty());
        let after_e2 = buffer.events_after(id2);
        assert_eq!(after_e2.len(), 1);
        assert_eq!(after_e2[0].id, id3);
    }

    #[tokio::test]
    async fn test_recorder_buffers_bus_events() {
        let bus = EventBus::new();
        let buffer = Arc::new(RwLock::new(EventBuffer::new(10)));
        spawn_event_recorder(&bus, Arc::clone(&buffer));

        bus.emit(BusEvent::ResultsCleared { count: 1 });
        bus.emit(BusEvent::ResultsCleared { count: 2 });

        for _ in 0..50 {
            if buffer.read().unwrap().len() == 2 {
                break;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        assert_eq!(buffer.read().unwrap().len(), 2);
    }

    #[test]
    fn test_envelope_to_sse_event_does_not_panic() {
        let _event = envelope_to_sse_event(&started(0)).unwrap();
    }
}
