//! Priority queue for tracking position health (min-heap by ICR)

use crate::health::PositionHealth;
use cdp_engine::AccountId;
use priority_queue::PriorityQueue;
use std::cmp::Reverse;
use std::collections::HashMap;

/// ICR-ordered queue (min-heap: lowest collateral ratio first)
pub struct HealthQueue {
    /// Priority queue (using Reverse for min-heap)
    queue: PriorityQueue<AccountId, Reverse<u128>>,
    /// Map for O(1) lookups
    map: HashMap<AccountId, PositionHealth>,
}

impl HealthQueue {
    pub fn new() -> Self {
        Self {
            queue: PriorityQueue::new(),
            map: HashMap::new(),
        }
    }

    /// Push or update a position's health
    pub fn push(&mut self, health: PositionHealth) {
        let owner = health.owner;
        let icr = health.icr;
        self.map.insert(owner, health);
        self.queue.push(owner, Reverse(icr));
    }

    /// Pop the position with the lowest ICR
    pub fn pop(&mut self) -> Option<PositionHealth> {
        let (owner, _priority) = self.queue.pop()?;
        self.map.remove(&owner)
    }

    /// Peek at the position with the lowest ICR without removing it
    pub fn peek(&self) -> Option<&PositionHealth> {
        let (owner, _priority) = self.queue.peek()?;
        self.map.get(owner)
    }

    pub fn remove(&mut self, owner: &AccountId) -> Option<PositionHealth> {
        self.queue.remove(owner);
        self.map.remove(owner)
    }

    pub fn get(&self, owner: &AccountId) -> Option<&PositionHealth> {
        self.map.get(owner)
    }

    pub fn contains(&self, owner: &AccountId) -> bool {
        self.map.contains_key(owner)
    }

    pub fn len(&self) -> usize {
        self.map.len()
    }

    pub fn is_empty(&self) -> bool {
        self.map.is_empty()
    }

    /// Pop up to `limit` positions needing liquidation, lowest ICR first.
    /// Stops at the first position that does not.
    pub fn take_liquidatable(&mut self, limit: usize) -> Vec<PositionHealth> {
        let mut out = Vec::new();
        while out.len() < limit {
            match self.peek() {
                Some(h) if h.needs_liquidation() => {}
                _ => break,
            }
            match self.pop() {
                Some(h) => out.push(h),
                None => break,
            }
        }
        out
    }

    /// Replace the contents with a fresh scan
    pub fn rebuild(&mut self, healths: Vec<PositionHealth>) {
        self.clear();
        for health in healths {
            self.push(health);
        }
    }

    pub fn clear(&mut self) {
        self.queue.clear();
        self.map.clear();
    }
}

impl Default for HealthQueue {
    fn default() -> Self {
        Self::new()
    }
}
