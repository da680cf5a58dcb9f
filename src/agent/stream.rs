//! Stream supervision: drains the event channel with a timeout and owns
//! cancellation/cleanup of the background worker.

use crate::agent::types::AgentEvent;
use crate::control::ControlRegistry;
use futures::Stream;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

/// Supervise one background task invocation.
///
/// Creates the event channel, starts the worker via `produce`, and yields
/// events in production order until a terminal one arrives. If no event shows
/// up within `event_timeout`, a timeout `error` event is synthesized and the
/// worker is cancelled. Whatever path ends the loop, the worker is aborted
/// and awaited before the stream closes, and the task's control context is
/// finished and released, so no background work outlives the stream.
pub fn run_stream<F>(
    registry: Arc<ControlRegistry>,
    task_id: String,
    event_timeout: Duration,
    produce: F,
) -> impl Stream<Item = AgentEvent>
where
    F: FnOnce(mpsc::UnboundedSender<AgentEvent>) -> JoinHandle<()>,
{
    async_stream::stream! {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let worker = produce(tx);

        loop {
            match tokio::time::timeout(event_timeout, rx.recv()).await {
                Ok(Some(event)) => {
                    let terminal = event.is_terminal();
                    yield event;
                    if terminal {
                        break;
                    }
                }
                Ok(None) => {
                    // Worker dropped the channel without a terminal event
                    tracing::error!("Agent task ended without reporting a result");
                    yield AgentEvent::Error {
                        message: "Agent task ended without a result".to_string(),
                    };
                    break;
                }
                Err(_) => {
                    tracing::warn!(
                        "No agent event within {}s, cancelling task",
                        event_timeout.as_secs()
                    );
                    yield AgentEvent::Error {
                        message: "Agent timed out".to_string(),
                    };
                    worker.abort();
                    break;
                }
            }
        }

        // The worker must not outlive the stream
        if !worker.is_finished() {
            worker.abort();
        }
        match worker.await {
            Ok(()) => {}
            Err(e) if e.is_cancelled() => {}
            Err(e) => tracing::error!("Agent task panicked: {}", e),
        }

        // A forcibly cancelled worker cannot run its own cleanup
        registry.finish(&task_id);
    }
}
