//! Quote providers.
//!
//! The pricing core only needs one capability from a carrier integration:
//! "given this account and this shipment, what does it cost (if anything)?".
//! Carrier-specific request/response mapping lives behind `QuoteProvider`.

use std::sync::Arc;
use std::sync::mpsc;
use std::thread;
use std::time::{Duration, Instant};

use parking_lot::{Condvar, Mutex};
use tracing::warn;

use crate::domain::{AccountRecord, CarrierQuote, QuoteOutcome, ShipmentRequest};

pub mod rate_table;

pub use rate_table::RateTableProvider;

/// A source of carrier costs.
///
/// Implementations may block (network, disk). Any failure should come back as
/// `None`; the core never inspects carrier error details.
pub trait QuoteProvider: Send + Sync {
    fn quote(&self, account: &AccountRecord, shipment: &ShipmentRequest) -> Option<f64>;

    /// `quote`, normalized so zero/negative/non-finite costs become `NoQuote`.
    fn quote_outcome(&self, account: &AccountRecord, shipment: &ShipmentRequest) -> QuoteOutcome {
        QuoteOutcome::from_provider(self.quote(account, shipment))
    }
}

/// Ask every account for a quote on one shipment, in account order.
pub fn collect_quotes(
    provider: &dyn QuoteProvider,
    accounts: &[AccountRecord],
    shipment: &ShipmentRequest,
) -> Vec<CarrierQuote> {
    accounts
        .iter()
        .map(|account| CarrierQuote {
            account: account.name.clone(),
            outcome: provider.quote_outcome(account, shipment),
        })
        .collect()
}

/// Wraps a provider with a per-call deadline and a cap on in-flight calls.
///
/// Each call runs on its own thread; if it does not answer within `timeout`
/// the call counts as "no quote". An abandoned call keeps its slot until the
/// inner provider actually returns, so at most `max_in_flight` inner calls are
/// ever running. A call that cannot get a slot before its deadline is also a
/// "no quote".
pub struct TimeoutProvider {
    inner: Arc<dyn QuoteProvider>,
    timeout: Duration,
    slots: Arc<Slots>,
}

struct Slots {
    in_flight: Mutex<usize>,
    freed: Condvar,
    max: usize,
}

impl Slots {
    fn acquire_until(self: &Arc<Self>, deadline: Instant) -> Option<SlotGuard> {
        let mut in_flight = self.in_flight.lock();
        while *in_flight >= self.max {
            if self.freed.wait_until(&mut in_flight, deadline).timed_out() && *in_flight >= self.max {
                return None;
            }
        }
        *in_flight += 1;
        Some(SlotGuard(Arc::clone(self)))
    }
}

/// Releases one slot when dropped.
struct SlotGuard(Arc<Slots>);

impl Drop for SlotGuard {
    fn drop(&mut self) {
        *self.0.in_flight.lock() -= 1;
        self.0.freed.notify_one();
    }
}

impl TimeoutProvider {
    pub fn new(inner: Arc<dyn QuoteProvider>, timeout: Duration, max_in_flight: usize) -> Self {
        Self {
            inner,
            timeout,
            slots: Arc::new(Slots {
                in_flight: Mutex::new(0),
                freed: Condvar::new(),
                max: max_in_flight.max(1),
            }),
        }
    }
}

impl QuoteProvider for TimeoutProvider {
    fn quote(&self, account: &AccountRecord, shipment: &ShipmentRequest) -> Option<f64> {
        let deadline = Instant::now() + self.timeout;
        let Some(slot) = self.slots.acquire_until(deadline) else {
            warn!(
                account = %account.name,
                shipment = %shipment.label(),
                max_in_flight = self.slots.max,
                "no free provider slot before deadline"
            );
            return None;
        };

        let (tx, rx) = mpsc::channel();
        let inner = Arc::clone(&self.inner);
        let account_owned = account.clone();
        let shipment_owned = shipment.clone();

        thread::spawn(move || {
            let cost = inner.quote(&account_owned, &shipment_owned);
            drop(slot);
            let _ = tx.send(cost);
        });

        match rx.recv_timeout(deadline.saturating_duration_since(Instant::now())) {
            Ok(cost) => cost,
            Err(_) => {
                warn!(
                    account = %account.name,
                    shipment = %shipment.label(),
                    timeout_ms = self.timeout.as_millis() as u64,
                    "quote timed out"
                );
                None
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};

    use super::*;
    use crate::domain::FreightClass;

    struct Fixed(Option<f64>);

    impl QuoteProvider for Fixed {
        fn quote(&self, _: &AccountRecord, _: &ShipmentRequest) -> Option<f64> {
            self.0
        }
    }

    struct Slow(Duration);

    impl QuoteProvider for Slow {
        fn quote(&self, _: &AccountRecord, _: &ShipmentRequest) -> Option<f64> {
            thread::sleep(self.0);
            Some(100.0)
        }
    }

    fn shipment() -> ShipmentRequest {
        let class: FreightClass = "85".parse().unwrap();
        ShipmentRequest::new("60601", "94105", 250.0, class, None).unwrap()
    }

    #[test]
    fn zero_cost_normalizes_to_no_quote() {
        let account = AccountRecord::new("a");
        assert_eq!(Fixed(Some(0.0)).quote_outcome(&account, &shipment()), QuoteOutcome::NoQuote);
        assert_eq!(Fixed(Some(42.0)).quote_outcome(&account, &shipment()), QuoteOutcome::Cost(42.0));
    }

    #[test]
    fn collect_quotes_keeps_account_order() {
        let accounts = vec![AccountRecord::new("x"), AccountRecord::new("y")];
        let quotes = collect_quotes(&Fixed(Some(10.0)), &accounts, &shipment());
        let names: Vec<&str> = quotes.iter().map(|q| q.account.as_str()).collect();
        assert_eq!(names, vec!["x", "y"]);
    }

    #[test]
    fn slow_provider_times_out_as_no_quote() {
        let provider = TimeoutProvider::new(Arc::new(Slow(Duration::from_millis(500))), Duration::from_millis(20), 1);
        let started = Instant::now();
        let outcome = provider.quote_outcome(&AccountRecord::new("a"), &shipment());
        assert_eq!(outcome, QuoteOutcome::NoQuote);
        assert!(started.elapsed() < Duration::from_millis(400));
    }

    /// Sleeps, recording how many calls overlap.
    #[derive(Default)]
    struct Overlap {
        running: AtomicUsize,
        peak: AtomicUsize,
    }

    impl QuoteProvider for Overlap {
        fn quote(&self, _: &AccountRecord, _: &ShipmentRequest) -> Option<f64> {
            let now = self.running.fetch_add(1, Ordering::SeqCst) + 1;
            self.peak.fetch_max(now, Ordering::SeqCst);
            thread::sleep(Duration::from_millis(60));
            self.running.fetch_sub(1, Ordering::SeqCst);
            Some(100.0)
        }
    }

    #[test]
    fn abandoned_calls_hold_their_slot() {
        let inner = Arc::new(Overlap::default());
        let provider = TimeoutProvider::new(inner.clone(), Duration::from_millis(5), 2);
        let account = AccountRecord::new("a");

        thread::scope(|s| {
            for _ in 0..6 {
                s.spawn(|| {
                    for _ in 0..3 {
                        assert_eq!(provider.quote(&account, &shipment()), None);
                    }
                });
            }
        });

        assert!(inner.peak.load(Ordering::SeqCst) <= 2);
    }

    #[test]
    fn freed_slot_is_reused() {
        let inner = Arc::new(Overlap::default());
        let provider = TimeoutProvider::new(inner.clone(), Duration::from_secs(2), 1);
        let account = AccountRecord::new("a");
        for _ in 0..3 {
            assert_eq!(provider.quote(&account, &shipment()), Some(100.0));
        }
        assert_eq!(inner.peak.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn fast_provider_passes_through_deadline() {
        let provider = TimeoutProvider::new(Arc::new(Fixed(Some(77.0))), Duration::from_secs(5), 1);
        assert_eq!(provider.quote(&AccountRecord::new("a"), &shipment()), Some(77.0));
    }
}
