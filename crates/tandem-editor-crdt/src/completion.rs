//! Cycle completion signalling.
//!
//! Every cycle of the controller ends by firing exactly one [`CycleReport`]:
//! to all callbacks registered with `on_cycle_complete`, and to every
//! [`Settlement`] handed out since the previous cycle.

use std::future::Future;
use std::pin::Pin;
use std::task::{Context, Poll};
use std::time::Duration;

use tokio::sync::oneshot;

use crate::guard::Direction;

/// Summary of one finished cycle.
#[derive(Clone, Debug, PartialEq)]
pub struct CycleReport {
    /// Cycle number, starting at 1.
    pub cycle: u64,
    pub direction: Direction,
    /// Operations applied to the target side.
    pub operations: usize,
    /// Observed batches recognised as our own echo and skipped.
    pub suppressed_batches: usize,
    /// Whether the cycle ended with an error.
    pub aborted: bool,
    pub elapsed: Duration,
}

/// Resolves with the report of the next cycle to finish.
///
/// Yields `None` if the controller is dropped first.
#[derive(Debug)]
#[must_use = "a settlement does nothing unless awaited"]
pub struct Settlement {
    rx: oneshot::Receiver<CycleReport>,
}

impl Future for Settlement {
    type Output = Option<CycleReport>;

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        Pin::new(&mut self.rx).poll(cx).map(Result::ok)
    }
}

type Callback = Box<dyn FnMut(&CycleReport) + Send>;

#[derive(Default)]
pub(crate) struct Completion {
    waiters: Vec<oneshot::Sender<CycleReport>>,
    callbacks: Vec<Callback>,
}

impl Completion {
    pub fn settled(&mut self) -> Settlement {
        let (tx, rx) = oneshot::channel();
        self.waiters.push(tx);
        Settlement { rx }
    }

    pub fn on_complete(&mut self, callback: Callback) {
        self.callbacks.push(callback);
    }

    pub fn fire(&mut self, report: &CycleReport) {
        for callback in &mut self.callbacks {
            callback(report);
        }
        for waiter in self.waiters.drain(..) {
            // Receiver may have been dropped.
            let _ = waiter.send(report.clone());
        }
    }
}

impl std::fmt::Debug for Completion {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Completion")
            .field("waiters", &self.waiters.len())
            .field("callbacks", &self.callbacks.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::{Arc, Mutex};

    fn report(cycle: u64) -> CycleReport {
        CycleReport {
            cycle,
            direction: Direction::Local,
            operations: 1,
            suppressed_batches: 1,
            aborted: false,
            elapsed: Duration::ZERO,
        }
    }

    #[tokio::test]
    async fn test_settlement_resolves_once() {
        let mut completion = Completion::default();
        let first = completion.settled();
        completion.fire(&report(1));
        let second = completion.settled();
        completion.fire(&report(2));

        assert_eq!(first.await.map(|r| r.cycle), Some(1));
        assert_eq!(second.await.map(|r| r.cycle), Some(2));
    }

    #[tokio::test]
    async fn test_dropped_source_yields_none() {
        let settlement = {
            let mut completion = Completion::default();
            completion.settled()
        };
        assert_eq!(settlement.await, None);
    }

    #[test]
    fn test_callbacks_see_every_cycle() {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = seen.clone();
        let mut completion = Completion::default();
        completion.on_complete(Box::new(move |r| sink.lock().unwrap().push(r.cycle)));
        completion.fire(&report(1));
        completion.fire(&report(2));
        assert_eq!(*seen.lock().unwrap(), vec![1, 2]);
    }
}
