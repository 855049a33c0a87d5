//! Event fan-out between chain monitors and the notification sink.
//!
//! Every chain family owns one bounded event stream. Monitors only publish
//! and wait when the stream is full, so a slow sink slows polling down
//! instead of losing events. A single handler drains all streams, drops
//! repeats inside a bounded window, attaches a fresh balance and hands the
//! payload to the sink.

use log::{debug, info, warn};
use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use crate::logging::{LogContext, MetricsLogger};
use crate::models::{ChainFamily, ChainKind, NotificationPayload, TransactionEvent};
use crate::monitor::ChainMonitor;
use crate::notifications::NotificationSink;

struct EventStream {
    sender: mpsc::Sender<TransactionEvent>,
    receiver: Option<mpsc::Receiver<TransactionEvent>>,
}

impl EventStream {
    fn new(capacity: usize) -> Self {
        let (sender, receiver) = mpsc::channel(capacity);
        Self {
            sender,
            receiver: Some(receiver),
        }
    }
}

/// One bounded stream per chain family
pub struct EventBus {
    evm: EventStream,
    solana: EventStream,
    bitcoin: EventStream,
}

impl EventBus {
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            evm: EventStream::new(capacity),
            solana: EventStream::new(capacity),
            bitcoin: EventStream::new(capacity),
        }
    }

    fn stream(&self, family: ChainFamily) -> &EventStream {
        match family {
            ChainFamily::Evm => &self.evm,
            ChainFamily::Solana => &self.solana,
            ChainFamily::Bitcoin => &self.bitcoin,
        }
    }

    fn stream_mut(&mut self, family: ChainFamily) -> &mut EventStream {
        match family {
            ChainFamily::Evm => &mut self.evm,
            ChainFamily::Solana => &mut self.solana,
            ChainFamily::Bitcoin => &mut self.bitcoin,
        }
    }

    /// Publishing side, handed to the monitors of `family`
    pub fn sender(&self, family: ChainFamily) -> mpsc::Sender<TransactionEvent> {
        self.stream(family).sender.clone()
    }

    /// The consuming side of `family`. There is only one, later calls get `None`.
    pub fn take_receiver(&mut self, family: ChainFamily) -> Option<mpsc::Receiver<TransactionEvent>> {
        self.stream_mut(family).receiver.take()
    }
}

type EventKey = (ChainKind, String, String);

/// Bounded memory of recently delivered `(chain, wallet, hash)` triples
struct RecentEvents {
    capacity: usize,
    order: VecDeque<EventKey>,
    seen: HashSet<EventKey>,
}

impl RecentEvents {
    fn new(capacity: usize) -> Self {
        Self {
            capacity,
            order: VecDeque::with_capacity(capacity),
            seen: HashSet::with_capacity(capacity),
        }
    }

    /// `false` if the key is still inside the window
    fn insert(&mut self, key: EventKey) -> bool {
        if self.capacity == 0 {
            return true;
        }
        if self.seen.contains(&key) {
            return false;
        }
        if self.order.len() == self.capacity {
            if let Some(oldest) = self.order.pop_front() {
                self.seen.remove(&oldest);
            }
        }
        self.order.push_back(key.clone());
        self.seen.insert(key);
        true
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Delivery {
    Delivered,
    Failed,
    Duplicate,
}

/// Turns events into payloads and pushes them to the sink
pub struct EventHandler {
    monitors: HashMap<ChainKind, Arc<ChainMonitor>>,
    sink: Arc<dyn NotificationSink>,
    recent: RecentEvents,
}

impl EventHandler {
    pub fn new(
        monitors: HashMap<ChainKind, Arc<ChainMonitor>>,
        sink: Arc<dyn NotificationSink>,
        dedup_window: usize,
    ) -> Self {
        Self {
            monitors,
            sink,
            recent: RecentEvents::new(dedup_window),
        }
    }

    pub async fn handle(&mut self, event: TransactionEvent) -> Delivery {
        let TransactionEvent { wallet, transaction } = event;
        let key = (
            transaction.chain,
            wallet.address.to_lowercase(),
            transaction.hash.clone(),
        );
        if !self.recent.insert(key) {
            debug!("Duplicate event {} for {} dropped", transaction.hash, wallet.display_name());
            return Delivery::Duplicate;
        }

        let balance = self.balance(transaction.chain, &wallet.address).await;
        let payload = NotificationPayload {
            wallet,
            transaction,
            balance,
        };

        match self.sink.send(&payload).await {
            Ok(()) => {
                MetricsLogger::log_notification(&payload.transaction, true, None);
                Delivery::Delivered
            }
            Err(e) => {
                MetricsLogger::log_notification(&payload.transaction, false, Some(&e.to_string()));
                Delivery::Failed
            }
        }
    }

    /// `"<amount> <SYMBOL>"`, or `None` when the lookup fails
    async fn balance(&self, chain: ChainKind, address: &str) -> Option<String> {
        let monitor = self.monitors.get(&chain)?;
        match monitor.try_balance(address).await {
            Ok(amount) => Some(format!("{} {}", amount, monitor.native_currency())),
            Err(e) => {
                LogContext::new("events", "balance")
                    .with_chain(chain)
                    .with_address(address)
                    .warn(&format!("Could not fetch balance: {}", e));
                None
            }
        }
    }
}

/// Running forwarders plus the handler task
pub struct Dispatcher {
    forwarders: Vec<JoinHandle<()>>,
    handler: Option<JoinHandle<()>>,
}

impl Dispatcher {
    /// Take every family stream off the bus and start delivering.
    ///
    /// Forwarders wait on the shared `buffer` when the handler falls behind,
    /// which in turn holds the publishing monitors back. Events queued
    /// before this call are delivered too.
    pub fn spawn(bus: &mut EventBus, handler: EventHandler, buffer: usize) -> Self {
        let (tx, mut rx) = mpsc::channel::<TransactionEvent>(buffer.max(1));

        let forwarders = ChainFamily::ALL
            .into_iter()
            .filter_map(|family| {
                let Some(mut stream) = bus.take_receiver(family) else {
                    warn!("{} event stream already has a consumer", family);
                    return None;
                };
                let tx = tx.clone();
                Some(tokio::spawn(async move {
                    while let Some(event) = stream.recv().await {
                        if tx.send(event).await.is_err() {
                            break;
                        }
                    }
                    debug!("{} event stream closed", family);
                }))
            })
            .collect();
        drop(tx);

        let mut handler = handler;
        let handler = tokio::spawn(async move {
            while let Some(event) = rx.recv().await {
                handler.handle(event).await;
            }
            debug!("Event handler finished");
        });

        Self {
            forwarders,
            handler: Some(handler),
        }
    }

    /// Stop listening and give queued events up to `grace` to be delivered
    pub async fn shutdown(mut self, grace: Duration) {
        for forwarder in self.forwarders.drain(..) {
            forwarder.abort();
        }
        if let Some(mut handler) = self.handler.take() {
            if tokio::time::timeout(grace, &mut handler).await.is_err() {
                warn!("Event handler did not drain within {:?}, aborting", grace);
                handler.abort();
            }
        }
        info!("Event dispatcher stopped");
    }
}

impl Drop for Dispatcher {
    fn drop(&mut self) {
        for forwarder in &self.forwarders {
            forwarder.abort();
        }
        if let Some(handler) = &self.handler {
            handler.abort();
        }
    }
}
