//! Ping/pong liveness checking
//!
//! Every `period` the heartbeat looks at whether the peer sent anything
//! (other than a pong) since the last check. If it did, the connection is
//! evidently alive and nothing is sent. Otherwise a ping with a fresh
//! payload goes out and the matching pong must arrive within `timeout`.
//! A missed pong ends the heartbeat with [`Error::HeartbeatTimeout`]; the
//! session turns that into a `1001 ping timeout` close.
//!
//! The payload of the ping in flight lives in [`Outstanding`]. The reader
//! offers every pong to it; only an exact match settles the ping, so
//! unsolicited or stale pongs can neither satisfy nor crowd out the real one.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use bytes::Bytes;
use log::{debug, trace, warn};
use tokio::sync::{mpsc, watch};
use tokio::time::sleep;
use tokio_util::sync::CancellationToken;

use crate::error::{Error, Result};

/// Count of inbound frames that prove the peer is alive
#[derive(Debug, Default)]
pub(crate) struct Activity(AtomicU64);

impl Activity {
    #[inline]
    pub(crate) fn bump(&self) {
        self.0.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    fn snapshot(&self) -> u64 {
        self.0.load(Ordering::Relaxed)
    }
}

/// Payload of the ping awaiting its pong, if any
#[derive(Debug)]
pub(crate) struct Outstanding(watch::Sender<Option<Bytes>>);

impl Default for Outstanding {
    fn default() -> Self {
        Self(watch::Sender::new(None))
    }
}

impl Outstanding {
    /// Offer a received pong; returns true if it settled the ping in flight
    pub(crate) fn pong(&self, payload: &[u8]) -> bool {
        self.0.send_if_modified(|pending| {
            if pending.as_deref() == Some(payload) {
                *pending = None;
                true
            } else {
                false
            }
        })
    }

    fn arm(&self, payload: Bytes) {
        self.0.send_replace(Some(payload));
    }

    /// Resolves once no ping is outstanding
    async fn settled(&self) {
        let mut rx = self.0.subscribe();
        // The sender lives in `self`, so this cannot fail
        let _ = rx.wait_for(Option::is_none).await.map(|_| ());
    }
}

/// Heartbeat controller for one session
pub(crate) struct Heartbeat {
    period: Duration,
    timeout: Duration,
    activity: Arc<Activity>,
    outstanding: Arc<Outstanding>,
    pings: mpsc::Sender<Bytes>,
    cancel: CancellationToken,
    sent: u64,
}

impl Heartbeat {
    pub(crate) fn new(
        period: Duration,
        timeout: Duration,
        activity: Arc<Activity>,
        outstanding: Arc<Outstanding>,
        pings: mpsc::Sender<Bytes>,
        cancel: CancellationToken,
    ) -> Self {
        Self {
            period,
            timeout,
            activity,
            outstanding,
            pings,
            cancel,
            sent: 0,
        }
    }

    fn next_payload(&mut self) -> Bytes {
        self.sent += 1;
        Bytes::from(format!("[ping {}]", self.sent))
    }

    /// Run until cancelled, the writer goes away, or a pong is missed
    pub(crate) async fn run(mut self) -> Result<()> {
        let mut seen = self.activity.snapshot();

        loop {
            tokio::select! {
                _ = self.cancel.cancelled() => return Ok(()),
                _ = sleep(self.period) => {}
            }

            let now = self.activity.snapshot();
            if now != seen {
                trace!("peer active, skipping ping");
                seen = now;
                continue;
            }

            // Armed before sending so an immediate pong is not missed
            let payload = self.next_payload();
            self.outstanding.arm(payload.clone());
            if self.pings.send(payload.clone()).await.is_err() {
                return Ok(());
            }
            debug!("sent ping {:?}", payload);

            tokio::select! {
                biased;
                _ = self.cancel.cancelled() => return Ok(()),
                _ = self.outstanding.settled() => trace!("pong {:?} received", payload),
                _ = sleep(self.timeout) => {
                    warn!("no pong within {:?}", self.timeout);
                    return Err(Error::HeartbeatTimeout(self.timeout));
                }
            }

            seen = self.activity.snapshot();
        }
    }
}
