use std::collections::HashSet;

use parking_lot::{Condvar, Mutex};
use tracing::debug;

use crate::wallet::WalletId;

/// Per-wallet exclusive sections.
///
/// Wallets are always taken in ascending id order, so two callers that need the
/// same pair of wallets (a transfer and its reverse) cannot wait on each other.
#[derive(Debug, Default)]
pub struct WalletLocks {
    held: Mutex<HashSet<WalletId>>,
    released: Condvar,
}

/// Holds its wallets until dropped.
#[must_use = "wallets are released as soon as the guard is dropped"]
#[derive(Debug)]
pub struct WalletGuard<'a> {
    locks: &'a WalletLocks,
    wallet_ids: Vec<WalletId>,
}

impl WalletLocks {
    pub fn acquire(&self, wallet_ids: &[WalletId]) -> WalletGuard<'_> {
        let mut wallet_ids = wallet_ids.to_vec();
        wallet_ids.sort_unstable();
        wallet_ids.dedup();

        let mut held = self.held.lock();
        for wallet_id in &wallet_ids {
            while held.contains(wallet_id) {
                self.released.wait(&mut held);
            }
            held.insert(*wallet_id);
        }
        debug!(?wallet_ids, "wallets locked");
        WalletGuard {
            locks: self,
            wallet_ids,
        }
    }

    #[cfg(test)]
    fn is_held(&self, wallet_id: WalletId) -> bool {
        self.held.lock().contains(&wallet_id)
    }
}

impl Drop for WalletGuard<'_> {
    fn drop(&mut self) {
        let mut held = self.locks.held.lock();
        for wallet_id in &self.wallet_ids {
            held.remove(wallet_id);
        }
        self.locks.released.notify_all();
    }
}

#[cfg(test)]
mod tests {
    use std::{
        sync::atomic::{AtomicUsize, Ordering},
        thread,
        time::Duration,
    };

    use super::*;

    #[test]
    fn guard_releases_on_drop() {
        let locks = WalletLocks::default();
        {
            let _guard = locks.acquire(&[2, 1, 2]);
            assert!(locks.is_held(1));
            assert!(locks.is_held(2));
            assert!(!locks.is_held(3));
        }
        assert!(!locks.is_held(1));
        assert!(!locks.is_held(2));
    }

    #[test]
    fn same_wallet_is_exclusive() {
        let locks = WalletLocks::default();
        let inside = AtomicUsize::new(0);
        let max_inside = AtomicUsize::new(0);

        thread::scope(|s| {
            for _ in 0..8 {
                s.spawn(|| {
                    let _guard = locks.acquire(&[7]);
                    let now = inside.fetch_add(1, Ordering::SeqCst) + 1;
                    max_inside.fetch_max(now, Ordering::SeqCst);
                    thread::sleep(Duration::from_millis(2));
                    inside.fetch_sub(1, Ordering::SeqCst);
                });
            }
        });
        assert_eq!(max_inside.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn crossing_pairs_do_not_deadlock() {
        let locks = WalletLocks::default();
        thread::scope(|s| {
            for i in 0..16 {
                let locks = &locks;
                s.spawn(move || {
                    let pair = if i % 2 == 0 { [1, 2] } else { [2, 1] };
                    for _ in 0..50 {
                        let _guard = locks.acquire(&pair);
                    }
                });
            }
        });
        assert!(!locks.is_held(1));
        assert!(!locks.is_held(2));
    }
}
