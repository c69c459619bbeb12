use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use axum::extract::ws::Message;
use tokio::sync::mpsc;
use tokio::time::{timeout, Duration};

use relaywire_core::error::{RelayError, Result};

use crate::realtime::types::{OutFrame, PreparedMsg, QoS, WireMode};

/// Outcome of a lossy push.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PushOutcome {
    Queued,
    /// Queue full; the frame was discarded.
    Dropped,
    /// Session is gone.
    Closed,
}

/// One session's outbound queue plus its negotiated wire mode.
#[derive(Clone)]
pub struct Connection {
    id: u64,
    tx: mpsc::Sender<Message>,
    text_mode: Arc<AtomicBool>,
}

impl Connection {
    pub fn new(id: u64, tx: mpsc::Sender<Message>) -> Self {
        Self {
            id,
            tx,
            text_mode: Arc::new(AtomicBool::new(false)),
        }
    }

    pub fn id(&self) -> u64 {
        self.id
    }

    /// Replies follow the mode of the client's most recent frame.
    pub fn set_mode(&self, mode: WireMode) {
        self.text_mode.store(mode == WireMode::Text, Ordering::Relaxed);
    }

    pub fn mode(&self) -> WireMode {
        if self.text_mode.load(Ordering::Relaxed) {
            WireMode::Text
        } else {
            WireMode::Binary
        }
    }

    /// Control frames (ping/pong) that bypass wire-mode encoding.
    pub(crate) fn raw(&self) -> &mpsc::Sender<Message> {
        &self.tx
    }

    pub fn is_closed(&self) -> bool {
        self.tx.is_closed()
    }

    /// Fire-and-forget push; never waits on a slow client.
    pub fn push(&self, frame: &OutFrame) -> Result<PushOutcome> {
        let msg = PreparedMsg::prepare(frame, self.mode())?.into_ws_message();
        Ok(match self.tx.try_send(msg) {
            Ok(()) => PushOutcome::Queued,
            Err(mpsc::error::TrySendError::Full(_)) => PushOutcome::Dropped,
            Err(mpsc::error::TrySendError::Closed(_)) => PushOutcome::Closed,
        })
    }

    /// Send honoring `qos`.
    pub async fn send(&self, frame: &OutFrame, qos: QoS) -> Result<()> {
        match qos {
            QoS::Lossy => match self.push(frame)? {
                PushOutcome::Queued => Ok(()),
                PushOutcome::Dropped => Err(RelayError::Internal("outbound queue full".into())),
                PushOutcome::Closed => Err(RelayError::Internal("connection closed".into())),
            },
            QoS::Reliable { timeout_ms } => {
                let msg = PreparedMsg::prepare(frame, self.mode())?.into_ws_message();
                let send = self.tx.send(msg);
                let res = if timeout_ms > 0 {
                    timeout(Duration::from_millis(timeout_ms), send)
                        .await
                        .map_err(|_| RelayError::Internal("outbound send timed out".into()))?
                } else {
                    send.await
                };
                res.map_err(|_| RelayError::Internal("connection closed".into()))
            }
        }
    }
}
