//! Keyed FIFO serialization of store operations.
//!
//! Each key has its own ticket counter. A ticket is taken when an operation
//! is issued and the operation proceeds once every earlier ticket for the
//! same key has been dropped. Keys never wait on each other.

use std::collections::{BTreeSet, HashMap};
use std::hash::Hash;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tokio::sync::watch;

struct Lane {
    next: u64,
    serving: watch::Sender<u64>,
    /// Tickets dropped before their turn came.
    abandoned: BTreeSet<u64>,
}

impl Lane {
    fn new() -> Self {
        let (serving, _) = watch::channel(0);
        Self {
            next: 0,
            serving,
            abandoned: BTreeSet::new(),
        }
    }
}

type Lanes<K> = Arc<Mutex<HashMap<K, Lane>>>;

fn lock<K>(lanes: &Mutex<HashMap<K, Lane>>) -> MutexGuard<'_, HashMap<K, Lane>> {
    lanes.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Per-key ticket dispenser.
pub struct KeyedQueue<K> {
    lanes: Lanes<K>,
}

impl<K> Default for KeyedQueue<K> {
    fn default() -> Self {
        Self {
            lanes: Arc::new(Mutex::new(HashMap::new())),
        }
    }
}

impl<K: Eq + Hash + Clone> KeyedQueue<K> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Take the next ticket for `key`. Issue order is service order.
    pub fn ticket(&self, key: K) -> Ticket<K> {
        let mut lanes = lock(&self.lanes);
        let lane = lanes.entry(key.clone()).or_insert_with(Lane::new);
        let number = lane.next;
        lane.next += 1;
        let receiver = lane.serving.subscribe();
        Ticket {
            key,
            number,
            receiver,
            lanes: Arc::clone(&self.lanes),
        }
    }

    /// Tickets outstanding for `key`, including the one being served.
    pub fn outstanding(&self, key: &K) -> usize {
        let lanes = lock(&self.lanes);
        lanes.get(key).map_or(0, |lane| {
            let serving = *lane.serving.borrow();
            (lane.next - serving) as usize - lane.abandoned.len()
        })
    }

    /// Whether no key has outstanding tickets.
    pub fn is_idle(&self) -> bool {
        lock(&self.lanes).is_empty()
    }
}

/// A place in a key's line. Dropping it releases the turn, or gives up the
/// place if the turn has not come yet.
pub struct Ticket<K: Eq + Hash> {
    key: K,
    number: u64,
    receiver: watch::Receiver<u64>,
    lanes: Lanes<K>,
}

impl<K: Eq + Hash> Ticket<K> {
    /// Wait until every earlier ticket for this key has been dropped.
    pub async fn ready(&mut self) {
        let number = self.number;
        // The sender outlives every ticket of its lane.
        let _ = self.receiver.wait_for(|serving| *serving == number).await;
    }

    pub fn number(&self) -> u64 {
        self.number
    }

    pub fn key(&self) -> &K {
        &self.key
    }
}

impl<K: Eq + Hash> Drop for Ticket<K> {
    fn drop(&mut self) {
        let mut lanes = lock(&self.lanes);
        let Some(lane) = lanes.get_mut(&self.key) else {
            return;
        };
        let serving = *lane.serving.borrow();
        if serving != self.number {
            lane.abandoned.insert(self.number);
            return;
        }
        let mut next = serving + 1;
        while lane.abandoned.remove(&next) {
            next += 1;
        }
        lane.serving.send_replace(next);
        if next == lane.next {
            lanes.remove(&self.key);
        }
    }
}
