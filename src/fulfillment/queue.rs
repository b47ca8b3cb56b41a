use crate::types::Order;
use alloy::primitives::B256;
use std::{
    collections::{HashMap, HashSet},
    sync::{Mutex, MutexGuard, PoisonError},
    time::Duration,
};
use tokio::{
    sync::{self, mpsc, watch},
    time::{Instant, MissedTickBehavior, interval},
};
use tracing::{debug, trace};

/// Bounded queue of orders waiting to be filled.
///
/// An order is accepted at most once until it is dequeued. A dequeued order then stays in
/// cooldown for the requeue delay, and is rejected until the cooldown passed.
#[derive(Debug)]
pub struct OrderQueue {
    sender: mpsc::Sender<Order>,
    receiver: sync::Mutex<mpsc::Receiver<Order>>,
    state: Mutex<QueueState>,
    requeue_delay: Duration,
}

#[derive(Debug, Default)]
struct QueueState {
    /// Orders in the buffer.
    enqueued: HashSet<B256>,
    /// Dequeued orders, with the instant their cooldown ends.
    cooldowns: HashMap<B256, Instant>,
}

impl OrderQueue {
    /// Creates a queue holding at most `capacity` orders.
    pub fn new(capacity: usize, requeue_delay: Duration) -> Self {
        let (sender, receiver) = mpsc::channel(capacity.max(1));
        Self {
            sender,
            receiver: sync::Mutex::new(receiver),
            state: Default::default(),
            requeue_delay,
        }
    }

    fn state(&self) -> MutexGuard<'_, QueueState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Adds `order` to the queue without waiting.
    ///
    /// Returns false if the order is already queued, in cooldown, or the queue is full.
    pub fn enqueue(&self, order: Order) -> bool {
        let mut state = self.state();
        let order_id = order.order_id;

        if state.enqueued.contains(&order_id) {
            trace!(%order_id, "Order already queued");
            return false;
        }
        if state.cooldowns.get(&order_id).is_some_and(|until| *until > Instant::now()) {
            trace!(%order_id, "Order in cooldown");
            return false;
        }
        if self.sender.try_send(order).is_err() {
            debug!(%order_id, "Order queue full");
            return false;
        }

        state.enqueued.insert(order_id);
        true
    }

    /// Waits for the next order, starting its cooldown.
    ///
    /// Returns `None` if the queue was closed.
    pub async fn dequeue(&self) -> Option<Order> {
        let order = self.receiver.lock().await.recv().await?;

        let mut state = self.state();
        state.enqueued.remove(&order.order_id);
        state.cooldowns.insert(order.order_id, Instant::now() + self.requeue_delay);

        Some(order)
    }

    /// Drops cooldowns that passed, returning how many were dropped.
    pub fn sweep(&self) -> usize {
        let now = Instant::now();
        let mut state = self.state();
        let before = state.cooldowns.len();
        state.cooldowns.retain(|_, until| *until > now);
        before - state.cooldowns.len()
    }

    /// Number of queued orders.
    pub fn len(&self) -> usize {
        self.state().enqueued.len()
    }

    /// Whether no order is queued.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Sweeps cooldowns every `period` until `shutdown` fires.
    pub async fn run_sweeper(&self, period: Duration, mut shutdown: watch::Receiver<bool>) {
        let mut timer = interval(period);
        timer.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = timer.tick() => {}
                _ = shutdown.changed() => break,
            }

            let swept = self.sweep();
            if swept > 0 {
                debug!(swept, "Swept order cooldowns");
            }
        }
    }
}
