use std::sync::{Condvar, Mutex};

use adforge_contracts::credentials::{Credential, CredentialSet};
use log::debug;

/// Hands out image-edit credentials to units.
///
/// Every credential returned by `acquire` must be given back through
/// `release` once the unit's remote job is finished.
pub trait CredentialPool: Send + Sync {
    fn acquire(&self, unit_index: usize) -> Option<Credential>;
    fn release(&self, credential: Credential);
}

/// Fixed index-range partition over the configured slots.
#[derive(Debug, Clone)]
pub struct PartitionedPool {
    credentials: CredentialSet,
}

impl PartitionedPool {
    pub fn new(credentials: CredentialSet) -> Self {
        Self { credentials }
    }
}

impl CredentialPool for PartitionedPool {
    fn acquire(&self, unit_index: usize) -> Option<Credential> {
        self.credentials.for_unit(unit_index)
    }

    fn release(&self, _credential: Credential) {}
}

/// Rate-limit aware pool: each credential admits at most `max_in_flight`
/// concurrent units, and `acquire` blocks while every credential is full.
#[derive(Debug)]
pub struct LeastLoadedPool {
    max_in_flight: usize,
    slots: Mutex<Vec<(Credential, usize)>>,
    freed: Condvar,
}

impl LeastLoadedPool {
    pub fn new(credentials: Vec<Credential>, max_in_flight: usize) -> Self {
        Self {
            max_in_flight: max_in_flight.max(1),
            slots: Mutex::new(credentials.into_iter().map(|credential| (credential, 0)).collect()),
            freed: Condvar::new(),
        }
    }
}

impl CredentialPool for LeastLoadedPool {
    fn acquire(&self, unit_index: usize) -> Option<Credential> {
        let mut slots = self.slots.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
        if slots.is_empty() {
            return None;
        }
        loop {
            let candidate = slots
                .iter_mut()
                .filter(|(_, count)| *count < self.max_in_flight)
                .min_by_key(|(_, count)| *count);
            if let Some((credential, count)) = candidate {
                *count += 1;
                debug!(
                    "unit {unit_index}: credential {} ({} in flight)",
                    credential.label, count
                );
                return Some(credential.clone());
            }
            debug!("unit {unit_index}: all credentials saturated; waiting");
            slots = self
                .freed
                .wait(slots)
                .unwrap_or_else(|poisoned| poisoned.into_inner());
        }
    }

    fn release(&self, credential: Credential) {
        let mut slots = self.slots.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
        if let Some((_, count)) = slots
            .iter_mut()
            .find(|(held, _)| held.secret() == credential.secret())
        {
            *count = count.saturating_sub(1);
        }
        drop(slots);
        self.freed.notify_one();
    }
}

#[cfg(test)]
mod tests {
    use std::sync::mpsc;
    use std::sync::Arc;
    use std::thread;
    use std::time::Duration;

    use adforge_contracts::credentials::credential_slot;

    use super::*;

    fn keys(count: usize) -> Vec<Credential> {
        (1..=count)
            .map(|idx| Credential::new(format!("slot-{idx}"), format!("sk-{idx}")))
            .collect()
    }

    #[test]
    fn partitioned_pool_follows_fixed_slots() {
        let set = CredentialSet::new(
            Some("sk-default".to_string()),
            vec![
                Some("sk-1".to_string()),
                Some("sk-2".to_string()),
                Some("sk-3".to_string()),
            ],
        );
        let pool = PartitionedPool::new(set);
        for index in 0..12 {
            let credential = pool.acquire(index);
            let expected = format!("slot-{}", credential_slot(index));
            assert_eq!(credential.map(|c| c.label), Some(expected), "{index}");
        }
        for _ in 0..3 {
            assert_eq!(pool.acquire(5).map(|c| c.label), Some("slot-2".to_string()));
        }
    }

    #[test]
    fn least_loaded_spreads_across_credentials() {
        let pool = LeastLoadedPool::new(keys(3), 2);
        let first: Vec<String> = (0..3)
            .filter_map(|idx| pool.acquire(idx))
            .map(|credential| credential.label)
            .collect();
        assert_eq!(first, vec!["slot-1", "slot-2", "slot-3"]);

        pool.release(Credential::new("slot-2", "sk-2"));
        assert_eq!(pool.acquire(3).map(|c| c.label), Some("slot-2".to_string()));
        assert_eq!(pool.acquire(4).map(|c| c.label), Some("slot-1".to_string()));
    }

    #[test]
    fn acquire_blocks_until_release() {
        let pool = Arc::new(LeastLoadedPool::new(keys(1), 1));
        let held = pool.acquire(0);
        assert!(held.is_some());

        let (tx, rx) = mpsc::channel();
        let waiter = {
            let pool = Arc::clone(&pool);
            thread::spawn(move || {
                let credential = pool.acquire(1);
                let _ = tx.send(credential.map(|c| c.label));
            })
        };
        assert!(rx.recv_timeout(Duration::from_millis(100)).is_err());

        if let Some(credential) = held {
            pool.release(credential);
        }
        let label = rx.recv_timeout(Duration::from_secs(5)).ok().flatten();
        assert_eq!(label.as_deref(), Some("slot-1"));
        assert!(waiter.join().is_ok());
    }

    #[test]
    fn empty_pool_yields_nothing() {
        let pool = LeastLoadedPool::new(Vec::new(), 2);
        assert!(pool.acquire(0).is_none());
        assert!(PartitionedPool::new(CredentialSet::default()).acquire(0).is_none());
    }
}
