//! # Broadcast Fan-out
//!
//! Best-effort delivery of one text frame to a snapshot of connections.
//!
//! ## Guarantees:
//! - Every send is dispatched concurrently, so one slow client cannot delay
//!   the others
//! - Each send is bounded by a timeout
//! - A failed send is reported, never propagated: the remaining recipients are
//!   still served
//! - The registry is not touched here; failed ids are returned so the owner
//!   can prune them once the pass has finished
//!
//! Whether to broadcast at all (the cooldown) is the caller's decision.

use crate::error::RelayError;
use crate::relay::registry::ConnectionId;
use actix::prelude::*;
use futures_util::future::{join_all, LocalBoxFuture};
use std::sync::Arc;
use std::time::Duration;

/// Work queued for one WebSocket connection.
#[derive(Message, Debug, Clone)]
#[rtype(result = "()")]
pub enum OutboundFrame {
    /// Text frame to write as-is
    Text(Arc<str>),
    /// The hub has dropped this connection; close the socket
    Close,
}

/// Anything a frame can be delivered to.
pub trait FrameSink: Clone + 'static {
    fn deliver(&self, frame: Arc<str>, timeout: Duration) -> LocalBoxFuture<'static, Result<(), RelayError>>;

    /// Ask the far end to shut down. Best effort: a sink that is already gone
    /// is left alone.
    fn close(&self);
}

/// Connection actors are reached through their mailbox. Delivery fails when
/// the actor has stopped or does not accept the frame within `timeout`.
impl FrameSink for Recipient<OutboundFrame> {
    fn deliver(&self, frame: Arc<str>, timeout: Duration) -> LocalBoxFuture<'static, Result<(), RelayError>> {
        let request = self.send(OutboundFrame::Text(frame)).timeout(timeout);
        Box::pin(async move { request.await.map_err(|e| RelayError::Send(e.to_string())) })
    }

    fn close(&self) {
        self.do_send(OutboundFrame::Close);
    }
}

/// Outcome of one broadcast pass.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct BroadcastReport {
    /// Successful deliveries
    pub sent: usize,
    /// Recipients whose delivery failed and should be pruned
    pub failed: Vec<ConnectionId>,
}

/// Deliver `frame` to every recipient in the snapshot, skipping `exclude`.
///
/// `exclude = None` includes everyone (playback to all, sender included);
/// `Some(sender)` relays to everyone else.
pub async fn broadcast<S: FrameSink>(
    frame: Arc<str>,
    recipients: Vec<(ConnectionId, S)>,
    exclude: Option<ConnectionId>,
    timeout: Duration,
) -> BroadcastReport {
    let deliveries = recipients
        .into_iter()
        .filter(|(id, _)| Some(*id) != exclude)
        .map(|(id, sink)| {
            let delivery = sink.deliver(Arc::clone(&frame), timeout);
            async move { (id, delivery.await) }
        });

    let mut report = BroadcastReport::default();
    for (id, result) in join_all(deliveries).await {
        match result {
            Ok(()) => report.sent += 1,
            Err(err) => {
                tracing::debug!(connection = %id, error = %err, "Broadcast delivery failed");
                report.failed.push(id);
            }
        }
    }

    report
}
