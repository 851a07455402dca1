//! Two-queue LRU cache
//!
//! Entries are admitted through a small "recent" queue and promoted to
//! the "frequent" queue on re-access. Keys evicted from the recent
//! queue leave a ghost marker behind; re-adding a ghosted key goes
//! straight to the frequent queue. This keeps one-shot scans (a burst
//! of events about short-lived objects) from flushing the hot set.

use std::collections::{HashMap, HashSet, VecDeque};
use std::hash::Hash;

// Queue proportions of the total size.
const RECENT_RATIO: usize = 4; // recent holds up to size/4
const GHOST_RATIO: usize = 2; // ghost remembers up to size/2 evicted keys

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Queue {
    Recent,
    Frequent,
}

#[derive(Debug)]
struct Slot<V> {
    value: V,
    queue: Queue,
}

/// Bounded two-queue LRU. Not internally synchronized; callers wrap it
/// in a lock.
#[derive(Debug)]
pub struct TwoQueueCache<K: Hash + Eq + Clone, V> {
    size: usize,
    recent_cap: usize,
    ghost_cap: usize,
    map: HashMap<K, Slot<V>>,
    recent: VecDeque<K>,
    frequent: VecDeque<K>,
    ghost: VecDeque<K>,
    ghost_keys: HashSet<K>,
}

impl<K: Hash + Eq + Clone, V: Clone> TwoQueueCache<K, V> {
    /// Create a cache holding at most `size` live entries.
    pub fn new(size: usize) -> Self {
        let size = size.max(1);
        Self {
            size,
            recent_cap: (size / RECENT_RATIO).max(1),
            ghost_cap: (size / GHOST_RATIO).max(1),
            map: HashMap::with_capacity(size),
            recent: VecDeque::new(),
            frequent: VecDeque::new(),
            ghost: VecDeque::new(),
            ghost_keys: HashSet::new(),
        }
    }

    pub fn len(&self) -> usize {
        self.map.len()
    }

    pub fn is_empty(&self) -> bool {
        self.map.is_empty()
    }

    pub fn contains(&self, key: &K) -> bool {
        self.map.contains_key(key)
    }

    /// Look up a key. A hit in the recent queue promotes the entry to
    /// the frequent queue; a frequent hit refreshes its recency.
    pub fn get(&mut self, key: &K) -> Option<V> {
        let queue = self.map.get(key)?.queue;
        match queue {
            Queue::Frequent => move_to_front(&mut self.frequent, key),
            Queue::Recent => {
                remove_key(&mut self.recent, key);
                self.frequent.push_front(key.clone());
                if let Some(slot) = self.map.get_mut(key) {
                    slot.queue = Queue::Frequent;
                }
            }
        }
        self.map.get(key).map(|slot| slot.value.clone())
    }

    /// Insert or update a key.
    pub fn add(&mut self, key: K, value: V) {
        if let Some(slot) = self.map.get_mut(&key) {
            slot.value = value;
            match slot.queue {
                Queue::Frequent => move_to_front(&mut self.frequent, &key),
                Queue::Recent => {
                    slot.queue = Queue::Frequent;
                    remove_key(&mut self.recent, &key);
                    self.frequent.push_front(key);
                }
            }
            return;
        }

        // A ghosted key was recently evicted from the admission queue;
        // seeing it again is the frequency signal.
        if self.ghost_keys.remove(&key) {
            remove_key(&mut self.ghost, &key);
            self.ensure_space(true);
            self.frequent.push_front(key.clone());
            self.map.insert(key, Slot { value, queue: Queue::Frequent });
            return;
        }

        self.ensure_space(false);
        self.recent.push_front(key.clone());
        self.map.insert(key, Slot { value, queue: Queue::Recent });
    }

    /// Drop a key outright (no ghost marker).
    pub fn remove(&mut self, key: &K) -> bool {
        match self.map.remove(key) {
            Some(slot) => {
                match slot.queue {
                    Queue::Recent => remove_key(&mut self.recent, key),
                    Queue::Frequent => remove_key(&mut self.frequent, key),
                }
                true
            }
            None => false,
        }
    }

    fn ensure_space(&mut self, for_ghosted: bool) {
        if self.map.len() < self.size {
            return;
        }

        let recent_len = self.recent.len();
        // Prefer evicting from the admission queue; an insert replacing
        // a ghosted key may instead take room from the frequent queue.
        if recent_len > 0 && (recent_len > self.recent_cap || (recent_len == self.recent_cap && !for_ghosted)) {
            if let Some(old) = self.recent.pop_back() {
                self.map.remove(&old);
                self.ghost.push_front(old.clone());
                self.ghost_keys.insert(old);
                while self.ghost.len() > self.ghost_cap {
                    if let Some(expired) = self.ghost.pop_back() {
                        self.ghost_keys.remove(&expired);
                    }
                }
            }
        } else if let Some(old) = self.frequent.pop_back() {
            self.map.remove(&old);
        }
    }
}

fn remove_key<K: Eq>(queue: &mut VecDeque<K>, key: &K) {
    if let Some(pos) = queue.iter().position(|k| k == key) {
        queue.remove(pos);
    }
}

fn move_to_front<K: Eq + Clone>(queue: &mut VecDeque<K>, key: &K) {
    if let Some(pos) = queue.iter().position(|k| k == key) {
        queue.remove(pos);
        queue.push_front(key.clone());
    }
}
