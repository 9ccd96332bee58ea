use std::collections::BTreeSet;
use std::time::Instant;

use crossbeam_channel::{Receiver, RecvTimeoutError};

/// How a bounded wait ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WaitOutcome<K> {
    AllSettled,
    /// The deadline passed first. `not_ready` are the keys still outstanding;
    /// they are not errors.
    DeadlineElapsed { not_ready: Vec<K> },
}

impl<K> WaitOutcome<K> {
    pub fn not_ready(&self) -> &[K] {
        match self {
            Self::AllSettled => &[],
            Self::DeadlineElapsed { not_ready } => not_ready,
        }
    }
}

/// Receives until every key in `pending` has settled or `deadline` passes,
/// whichever comes first.
///
/// `settle` handles each message and returns the key it settles. Messages
/// for keys outside `pending` are still handed to `settle`.
pub fn wait_all_or_deadline<T, K: Ord + Copy>(
    rx: &Receiver<T>,
    mut pending: BTreeSet<K>,
    deadline: Instant,
    mut settle: impl FnMut(T) -> K,
) -> WaitOutcome<K> {
    while !pending.is_empty() {
        match rx.recv_deadline(deadline) {
            Ok(msg) => {
                let key = settle(msg);
                pending.remove(&key);
            }
            Err(RecvTimeoutError::Timeout) | Err(RecvTimeoutError::Disconnected) => {
                return WaitOutcome::DeadlineElapsed {
                    not_ready: pending.into_iter().collect(),
                };
            }
        }
    }
    WaitOutcome::AllSettled
}

#[cfg(test)]
mod tests {
    use std::thread;
    use std::time::Duration;

    use crossbeam_channel::unbounded;

    use super::*;

    #[test]
    fn returns_as_soon_as_everything_settles() {
        let (tx, rx) = unbounded();
        tx.send(1u32).unwrap();
        tx.send(2u32).unwrap();

        let started = Instant::now();
        let outcome = wait_all_or_deadline(
            &rx,
            BTreeSet::from([1, 2]),
            started + Duration::from_secs(5),
            |k| k,
        );
        assert_eq!(outcome, WaitOutcome::AllSettled);
        assert!(started.elapsed() < Duration::from_secs(1));
    }

    #[test]
    fn stragglers_are_reported_at_the_deadline() {
        let (tx, rx) = unbounded();
        let budget = Duration::from_millis(30);
        let started = Instant::now();
        thread::spawn(move || {
            tx.send(1u32).unwrap();
            thread::sleep(Duration::from_secs(2));
            let _ = tx.send(2u32);
        });

        let mut seen = Vec::new();
        let outcome = wait_all_or_deadline(&rx, BTreeSet::from([1, 2]), started + budget, |k| {
            seen.push(k);
            k
        });

        assert_eq!(outcome.not_ready(), &[2]);
        assert_eq!(seen, [1]);
        assert!(started.elapsed() < budget + Duration::from_millis(500));
    }

    #[test]
    fn unrelated_messages_are_settled_but_do_not_count() {
        let (tx, rx) = unbounded();
        tx.send(9u32).unwrap();

        let mut seen = Vec::new();
        let outcome = wait_all_or_deadline(
            &rx,
            BTreeSet::from([1]),
            Instant::now() + Duration::from_millis(20),
            |k| {
                seen.push(k);
                k
            },
        );
        assert_eq!(seen, [9]);
        assert_eq!(outcome.not_ready(), &[1]);
    }
}
