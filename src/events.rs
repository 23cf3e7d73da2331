use crate::error::{OdioError, Result};
use crate::host::HostEvent;
use crate::orchestrator::Inner;
use futures_util::StreamExt;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::broadcast;
use tokio::time::{sleep, timeout};

/// Exponential reconnect backoff
///
/// Delays strictly double from `base` up to `cap`; `reset` returns the next
/// delay to `base` after a successful reconnect.
#[derive(Debug)]
pub(crate) struct Backoff {
    base: Duration,
    cap: Duration,
    current: Option<Duration>,
}

impl Backoff {
    pub(crate) fn new(base: Duration, cap: Duration) -> Self {
        Self {
            base,
            cap,
            current: None,
        }
    }

    pub(crate) fn next_delay(&mut self) -> Duration {
        let next = match self.current {
            None => self.base,
            Some(current) => (current * 2).min(self.cap),
        };
        self.current = Some(next);
        next
    }

    pub(crate) fn reset(&mut self) {
        self.current = None;
    }
}

/// Event-stream consumer loop
///
/// Holds one persistent subscription per integration instance, reconnecting
/// with exponential backoff. Stops immediately when the stop signal fires:
/// the in-flight connection or backoff sleep is dropped, so nothing runs
/// after shutdown.
pub(crate) async fn run_event_stream(inner: Arc<Inner>, mut stop_rx: broadcast::Receiver<()>) {
    let mut backoff = Backoff::new(inner.config.reconnect_base, inner.config.reconnect_cap);

    loop {
        tokio::select! {
            _ = stop_rx.recv() => {
                tracing::debug!("Event stream task stopped");
                return;
            }
            result = consume_stream(&inner, &mut backoff) => {
                match result {
                    Ok(()) => tracing::info!("Event stream ended cleanly, reconnecting"),
                    Err(e) => tracing::warn!("Event stream error: {}", e),
                }
            }
        }

        let delay = backoff.next_delay();
        tracing::debug!("Reconnecting event stream in {:?}", delay);
        tokio::select! {
            _ = stop_rx.recv() => return,
            _ = sleep(delay) => {}
        }
    }
}

/// Open one subscription and process events until it ends
async fn consume_stream(inner: &Inner, backoff: &mut Backoff) -> Result<()> {
    let backends = inner.subscribed_backends();
    let mut stream = inner.api.events(&backends).await?;

    // Connection established: the next failure starts over from the base delay
    backoff.reset();
    tracing::info!("Event stream connected (backends: {})", backends.join(","));

    loop {
        match timeout(inner.config.event_keepalive_timeout, stream.next()).await {
            Err(_) => {
                tracing::warn!("Event stream keepalive timeout");
                return Err(OdioError::Timeout);
            }
            Ok(None) => return Ok(()),
            Ok(Some(Err(e))) => return Err(e),
            Ok(Some(Ok(event))) => handle_event(inner, event),
        }
    }
}

/// Route one pushed event
///
/// Backend updates only trigger an immediate re-poll; state is always
/// re-derived from a fresh full fetch rather than from event payloads.
fn handle_event(inner: &Inner, event: HostEvent) {
    match event {
        HostEvent::AudioUpdated => {
            tracing::debug!("audio.updated received, scheduling refresh");
            inner.audio_refresh.notify_one();
        }
        HostEvent::ServiceUpdated => {
            tracing::debug!("service.updated received, scheduling refresh");
            inner.service_refresh.notify_one();
        }
        HostEvent::Control(msg) => match msg.as_str() {
            "connected" => tracing::info!("Event stream handshake complete"),
            "love" => tracing::debug!("Keepalive received"),
            "bye" => tracing::info!("Server is closing the event stream"),
            other => tracing::debug!("server.info: {}", other),
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn delays_strictly_increase_up_to_the_cap() {
        let mut backoff = Backoff::new(Duration::from_secs(1), Duration::from_secs(300));

        let mut delays = Vec::new();
        for _ in 0..12 {
            delays.push(backoff.next_delay());
        }

        for pair in delays.windows(2) {
            assert!(
                pair[1] > pair[0] || pair[0] == Duration::from_secs(300),
                "delays must strictly increase until the cap: {:?}",
                delays
            );
        }
        assert_eq!(delays[0], Duration::from_secs(1));
        assert_eq!(*delays.last().unwrap(), Duration::from_secs(300));
    }

    #[test]
    fn reset_returns_to_the_base_delay() {
        let mut backoff = Backoff::new(Duration::from_secs(1), Duration::from_secs(300));
        backoff.next_delay();
        backoff.next_delay();
        assert_eq!(backoff.next_delay(), Duration::from_secs(4));

        backoff.reset();
        assert_eq!(backoff.next_delay(), Duration::from_secs(1));
    }

    #[test]
    fn cap_is_respected_for_odd_bases() {
        let mut backoff = Backoff::new(Duration::from_secs(7), Duration::from_secs(20));
        assert_eq!(backoff.next_delay(), Duration::from_secs(7));
        assert_eq!(backoff.next_delay(), Duration::from_secs(14));
        assert_eq!(backoff.next_delay(), Duration::from_secs(20));
        assert_eq!(backoff.next_delay(), Duration::from_secs(20));
    }
}
