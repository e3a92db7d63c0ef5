//! In-process message broker.
//!
//! Numbers every message, keeps the full ordered log and fans envelopes out
//! over a tokio broadcast channel. Good enough to run several sessions in
//! one process, which is what the tests and embedders do.

use std::collections::VecDeque;
use std::future::Future;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use tokio::sync::broadcast::{self, error::RecvError, error::TryRecvError};
use tracing::{debug, warn};

use crate::config::CollabConfig;
use crate::error::CollabError;
use crate::message::{Envelope, Message, Seq};
use crate::transport::Transport;

struct BrokerLog {
    envelopes: Vec<Envelope>,
    sender: broadcast::Sender<Envelope>,
}

impl BrokerLog {
    fn seq(&self) -> Seq {
        self.envelopes.last().map_or(0, |envelope| envelope.seq)
    }

    fn after(&self, seq: Seq) -> impl Iterator<Item = &Envelope> {
        self.envelopes.iter().filter(move |envelope| envelope.seq > seq)
    }
}

/// Shared handle to one broker; clones talk to the same log
#[derive(Clone)]
pub struct LocalBroker {
    inner: Arc<Mutex<BrokerLog>>,
}

impl LocalBroker {
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity.max(1));
        Self {
            inner: Arc::new(Mutex::new(BrokerLog {
                envelopes: Vec::new(),
                sender,
            })),
        }
    }

    /// Broker sized by `config.channel_capacity`
    pub fn from_config(config: &CollabConfig) -> Self {
        Self::new(config.channel_capacity)
    }

    fn lock(&self) -> MutexGuard<'_, BrokerLog> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Connection that sees every message published from now on
    pub fn connect(&self) -> BrokerConnection {
        let seq = self.seq();
        self.connect_from(seq)
    }

    /// Connection that first replays the log after `seq`, then goes live
    pub fn connect_from(&self, seq: Seq) -> BrokerConnection {
        let log = self.lock();
        // Subscribing under the lock leaves no gap between backlog and live
        let receiver = log.sender.subscribe();
        let backlog: VecDeque<Envelope> = log.after(seq).cloned().collect();
        BrokerConnection {
            broker: self.clone(),
            receiver,
            last_seq: log.seq(),
            skip_through: log.seq(),
            backlog,
        }
    }

    /// Last assigned sequence number
    pub fn seq(&self) -> Seq {
        self.lock().seq()
    }

    pub fn log(&self) -> Vec<Envelope> {
        self.lock().envelopes.clone()
    }

    /// Send everything after `seq` again, as a flaky network would
    pub fn redeliver(&self, seq: Seq) -> usize {
        let log = self.lock();
        let mut count = 0;
        for envelope in log.after(seq) {
            let _ = log.sender.send(envelope.clone());
            count += 1;
        }
        debug!(count, from = seq, "redelivered");
        count
    }

    fn publish(&self, message: Message) -> Seq {
        let mut log = self.lock();
        let envelope = Envelope {
            seq: log.seq() + 1,
            message,
        };
        let seq = envelope.seq;
        log.envelopes.push(envelope.clone());
        // Nobody listening is fine
        let _ = log.sender.send(envelope);
        seq
    }
}

impl std::fmt::Debug for LocalBroker {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let log = self.lock();
        f.debug_struct("LocalBroker")
            .field("seq", &log.seq())
            .field("receivers", &log.sender.receiver_count())
            .finish()
    }
}

/// One client's end of a [`LocalBroker`]
pub struct BrokerConnection {
    broker: LocalBroker,
    receiver: broadcast::Receiver<Envelope>,
    backlog: VecDeque<Envelope>,
    /// Highest sequence handed out so far
    last_seq: Seq,
    /// Live envelopes up to here were already read from the log
    skip_through: Seq,
}

impl BrokerConnection {
    pub fn broker(&self) -> &LocalBroker {
        &self.broker
    }

    fn accept(&mut self, envelope: Envelope) -> Option<Envelope> {
        if envelope.seq <= self.skip_through {
            return None;
        }
        self.last_seq = self.last_seq.max(envelope.seq);
        Some(envelope)
    }

    /// Refill from the log after falling behind the channel
    fn catch_up(&mut self, missed: u64) {
        warn!(missed, last_seq = self.last_seq, "connection lagged, catching up from the log");
        let log = self.broker.lock();
        self.backlog.extend(log.after(self.last_seq).cloned());
        self.skip_through = log.seq();
        self.last_seq = log.seq();
    }
}

impl Transport for BrokerConnection {
    fn send(&mut self, message: Message) -> Result<(), CollabError> {
        self.broker.publish(message);
        Ok(())
    }

    fn try_receive(&mut self) -> Result<Option<Envelope>, CollabError> {
        loop {
            if let Some(envelope) = self.backlog.pop_front() {
                return Ok(Some(envelope));
            }
            match self.receiver.try_recv() {
                Ok(envelope) => {
                    if let Some(envelope) = self.accept(envelope) {
                        return Ok(Some(envelope));
                    }
                }
                Err(TryRecvError::Empty) => return Ok(None),
                Err(TryRecvError::Lagged(missed)) => self.catch_up(missed),
                Err(TryRecvError::Closed) => return Err(CollabError::Closed),
            }
        }
    }

    fn receive(&mut self) -> impl Future<Output = Result<Envelope, CollabError>> + Send {
        async move {
            loop {
                if let Some(envelope) = self.backlog.pop_front() {
                    return Ok(envelope);
                }
                match self.receiver.recv().await {
                    Ok(envelope) => {
                        if let Some(envelope) = self.accept(envelope) {
                            return Ok(envelope);
                        }
                    }
                    Err(RecvError::Lagged(missed)) => self.catch_up(missed),
                    Err(RecvError::Closed) => return Err(CollabError::Closed),
                }
            }
        }
    }
}
