//! Single-flight coordination of refresh-token exchanges
//!
//! When an access token expires, every request that was in flight with it will
//! be rejected at roughly the same time. Only one of them should exchange the
//! refresh token; the others must wait for that exchange and reuse its result.
//! A [`RefreshCoordinator`] owns that in-flight exchange.
//!
//! Callers take a [`Generation`] stamp before sending a request. If the request
//! is rejected, the stamp tells the coordinator whether the token that was
//! rejected has already been replaced, in which case no new exchange is
//! needed at all.

use std::{
    fmt,
    panic::AssertUnwindSafe,
    sync::{Arc, Weak},
};

use async_trait::async_trait;
use futures::future::{BoxFuture, FutureExt, Shared, WeakShared};
use parking_lot::Mutex;

/// The result of attempting to exchange a refresh token
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum RefreshOutcome {
    /// A new access token has been stored
    Refreshed,
    /// There was no refresh token to exchange; no request was made
    MissingRefreshToken,
    /// The authority rejected the refresh token and the stored tokens were cleared
    Rejected,
    /// The exchange failed for a reason that does not invalidate the session
    Failed,
}

impl RefreshOutcome {
    /// Whether a new access token is available
    #[inline]
    pub fn is_refreshed(self) -> bool {
        self == Self::Refreshed
    }
}

/// A procedure that exchanges the stored refresh token for new tokens
#[async_trait]
pub trait TokenRefresher: Send + Sync {
    /// Performs one exchange, persisting any new tokens before returning
    async fn refresh(&self) -> RefreshOutcome;
}

/// A point in the sequence of successful refreshes
///
/// Obtained from [`RefreshCoordinator::generation()`] before sending a request
/// with the current access token.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord)]
pub struct Generation(u64);

type SharedOutcome = Shared<BoxFuture<'static, RefreshOutcome>>;

/// The slot only holds a weak handle; the exchange lives as long as someone awaits it
struct InFlight {
    id: u64,
    outcome: WeakShared<BoxFuture<'static, RefreshOutcome>>,
}

#[derive(Default)]
struct FlightState {
    generation: u64,
    next_flight: u64,
    in_flight: Option<InFlight>,
}

impl FlightState {
    fn land(&mut self, id: u64) {
        if self.in_flight.as_ref().map(|f| f.id) == Some(id) {
            self.in_flight = None;
        }
    }
}

/// Clears the in-flight slot however the exchange ends
///
/// Completion bumps the generation on success. If the exchange is dropped
/// before completing because every waiter was cancelled, the slot is still
/// cleared so the next caller can start a fresh exchange.
struct FlightGuard {
    state: Weak<Mutex<FlightState>>,
    id: u64,
    landed: bool,
}

impl FlightGuard {
    fn complete(mut self, outcome: RefreshOutcome) {
        if let Some(state) = self.state.upgrade() {
            let mut state = state.lock();
            if outcome.is_refreshed() {
                state.generation += 1;
            }
            state.land(self.id);
        }
        self.landed = true;
    }
}

impl Drop for FlightGuard {
    fn drop(&mut self) {
        if self.landed {
            return;
        }

        tracing::warn!(flight = self.id, "refresh abandoned before completing");
        if let Some(state) = self.state.upgrade() {
            state.lock().land(self.id);
        }
    }
}

/// Ensures at most one refresh exchange is in flight at any time
///
/// Clones share the same in-flight state.
#[derive(Clone)]
pub struct RefreshCoordinator {
    refresher: Arc<dyn TokenRefresher>,
    state: Arc<Mutex<FlightState>>,
}

impl RefreshCoordinator {
    /// Constructs a coordinator around a refresh procedure
    pub fn new(refresher: impl TokenRefresher + 'static) -> Self {
        Self::from_arc(Arc::new(refresher))
    }

    /// Constructs a coordinator around a shared refresh procedure
    pub fn from_arc(refresher: Arc<dyn TokenRefresher>) -> Self {
        Self {
            refresher,
            state: Arc::default(),
        }
    }

    /// Stamps the current point in the refresh sequence
    pub fn generation(&self) -> Generation {
        Generation(self.state.lock().generation)
    }

    /// Whether an exchange is currently in flight
    pub fn is_refreshing(&self) -> bool {
        self.state.lock().in_flight.is_some()
    }

    /// Obtains a new access token after one was rejected
    ///
    /// `observed` is the stamp taken before the rejected request was sent.
    /// Joins the exchange already in flight if there is one. Otherwise, if a
    /// refresh has succeeded since `observed`, returns
    /// [`Refreshed`](RefreshOutcome::Refreshed) immediately. Only if neither
    /// holds does this start a new exchange.
    pub async fn refresh(&self, observed: Generation) -> RefreshOutcome {
        let flight = {
            let mut state = self.state.lock();

            let joined = state
                .in_flight
                .as_ref()
                .and_then(|flight| Some((flight.id, flight.outcome.upgrade()?)));

            if let Some((id, outcome)) = joined {
                tracing::debug!(flight = id, "joining refresh already in flight");
                outcome
            } else if state.generation > observed.0 {
                tracing::debug!(
                    observed = observed.0,
                    current = state.generation,
                    "token already refreshed since request was sent"
                );
                return RefreshOutcome::Refreshed;
            } else {
                let id = state.next_flight;
                state.next_flight += 1;

                let guard = FlightGuard {
                    state: Arc::downgrade(&self.state),
                    id,
                    landed: false,
                };
                let refresher = Arc::clone(&self.refresher);
                let outcome: SharedOutcome = async move {
                    tracing::debug!(flight = id, "starting refresh");
                    let outcome = AssertUnwindSafe(refresher.refresh())
                        .catch_unwind()
                        .await
                        .unwrap_or_else(|_| {
                            tracing::error!(flight = id, "refresh panicked");
                            RefreshOutcome::Failed
                        });
                    tracing::debug!(flight = id, ?outcome, "refresh landed");
                    guard.complete(outcome);
                    outcome
                }
                .boxed()
                .shared();

                state.in_flight = outcome
                    .downgrade()
                    .map(|outcome| InFlight { id, outcome });
                outcome
            }
        };

        flight.await
    }
}

impl fmt::Debug for RefreshCoordinator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = self.state.lock();
        f.debug_struct("RefreshCoordinator")
            .field("generation", &state.generation)
            .field("in_flight", &state.in_flight.as_ref().map(|f| f.id))
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use std::{
        sync::atomic::{AtomicUsize, Ordering},
        time::Duration,
    };

    use tokio::sync::Notify;

    use super::*;

    /// Counts exchanges and holds each one open until released
    struct GatedRefresher {
        calls: AtomicUsize,
        gate: Notify,
        outcome: RefreshOutcome,
    }

    impl GatedRefresher {
        fn new(outcome: RefreshOutcome) -> Arc<Self> {
            Arc::new(Self {
                calls: AtomicUsize::new(0),
                gate: Notify::new(),
                outcome,
            })
        }

        fn calls(&self) -> usize {
            self.calls.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl TokenRefresher for GatedRefresher {
        async fn refresh(&self) -> RefreshOutcome {
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.gate.notified().await;
            self.outcome
        }
    }

    struct ImmediateRefresher {
        calls: AtomicUsize,
        outcome: RefreshOutcome,
    }

    #[async_trait]
    impl TokenRefresher for ImmediateRefresher {
        async fn refresh(&self) -> RefreshOutcome {
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.outcome
        }
    }

    fn immediate(outcome: RefreshOutcome) -> Arc<ImmediateRefresher> {
        Arc::new(ImmediateRefresher {
            calls: AtomicUsize::new(0),
            outcome,
        })
    }

    async fn wait_until_refreshing(coordinator: &RefreshCoordinator) {
        while !coordinator.is_refreshing() {
            tokio::time::sleep(Duration::from_millis(1)).await;
        }
    }

    mod when_many_callers_are_rejected_together {
        use super::*;

        #[tokio::test]
        async fn only_one_exchange_is_performed() {
            let refresher = GatedRefresher::new(RefreshOutcome::Refreshed);
            let coordinator = RefreshCoordinator::from_arc(refresher.clone());
            let observed = coordinator.generation();

            let waiters: Vec<_> = (0..8)
                .map(|_| {
                    let coordinator = coordinator.clone();
                    tokio::spawn(async move { coordinator.refresh(observed).await })
                })
                .collect();

            wait_until_refreshing(&coordinator).await;
            tokio::time::sleep(Duration::from_millis(20)).await;
            refresher.gate.notify_one();

            for waiter in waiters {
                assert_eq!(waiter.await.unwrap(), RefreshOutcome::Refreshed);
            }
            assert_eq!(refresher.calls(), 1);
            assert!(!coordinator.is_refreshing());
        }

        #[tokio::test]
        async fn every_waiter_sees_the_same_failure() {
            let refresher = GatedRefresher::new(RefreshOutcome::Rejected);
            let coordinator = RefreshCoordinator::from_arc(refresher.clone());
            let observed = coordinator.generation();

            let first = tokio::spawn({
                let coordinator = coordinator.clone();
                async move { coordinator.refresh(observed).await }
            });
            wait_until_refreshing(&coordinator).await;
            let second = tokio::spawn({
                let coordinator = coordinator.clone();
                async move { coordinator.refresh(observed).await }
            });
            tokio::time::sleep(Duration::from_millis(20)).await;
            refresher.gate.notify_one();

            assert_eq!(first.await.unwrap(), RefreshOutcome::Rejected);
            assert_eq!(second.await.unwrap(), RefreshOutcome::Rejected);
            assert_eq!(refresher.calls(), 1);
        }
    }

    mod when_the_rejected_token_was_already_replaced {
        use super::*;

        #[tokio::test]
        async fn no_new_exchange_is_started() {
            let refresher = immediate(RefreshOutcome::Refreshed);
            let coordinator = RefreshCoordinator::from_arc(refresher.clone());
            let stale = coordinator.generation();

            assert_eq!(coordinator.refresh(stale).await, RefreshOutcome::Refreshed);
            assert_eq!(coordinator.refresh(stale).await, RefreshOutcome::Refreshed);

            assert_eq!(refresher.calls.load(Ordering::SeqCst), 1);
        }

        #[tokio::test]
        async fn a_rejection_of_the_new_token_starts_another_exchange() {
            let refresher = immediate(RefreshOutcome::Refreshed);
            let coordinator = RefreshCoordinator::from_arc(refresher.clone());

            coordinator.refresh(coordinator.generation()).await;
            coordinator.refresh(coordinator.generation()).await;

            assert_eq!(refresher.calls.load(Ordering::SeqCst), 2);
        }
    }

    mod when_an_exchange_fails {
        use super::*;

        #[tokio::test]
        async fn the_generation_does_not_advance() {
            let refresher = immediate(RefreshOutcome::Failed);
            let coordinator = RefreshCoordinator::from_arc(refresher.clone());
            let before = coordinator.generation();

            assert_eq!(coordinator.refresh(before).await, RefreshOutcome::Failed);

            assert_eq!(coordinator.generation(), before);
        }

        #[tokio::test]
        async fn a_later_caller_may_try_again() {
            let refresher = immediate(RefreshOutcome::Failed);
            let coordinator = RefreshCoordinator::from_arc(refresher.clone());
            let observed = coordinator.generation();

            coordinator.refresh(observed).await;
            coordinator.refresh(observed).await;

            assert_eq!(refresher.calls.load(Ordering::SeqCst), 2);
            assert!(!coordinator.is_refreshing());
        }
    }

    mod when_every_waiter_is_cancelled {
        use super::*;

        #[tokio::test]
        async fn the_slot_is_cleared_for_the_next_caller() {
            let refresher = GatedRefresher::new(RefreshOutcome::Refreshed);
            let coordinator = RefreshCoordinator::from_arc(refresher.clone());
            let observed = coordinator.generation();

            let abandoned = tokio::time::timeout(
                Duration::from_millis(20),
                coordinator.refresh(observed),
            )
            .await;
            assert!(abandoned.is_err());
            assert!(!coordinator.is_refreshing());

            let retry = tokio::spawn({
                let coordinator = coordinator.clone();
                async move { coordinator.refresh(observed).await }
            });
            wait_until_refreshing(&coordinator).await;
            refresher.gate.notify_one();

            assert_eq!(retry.await.unwrap(), RefreshOutcome::Refreshed);
            assert_eq!(refresher.calls(), 2);
            assert!(!coordinator.is_refreshing());
        }
    }

    mod when_the_refresher_panics {
        use super::*;

        struct PanickingRefresher;

        #[async_trait]
        impl TokenRefresher for PanickingRefresher {
            async fn refresh(&self) -> RefreshOutcome {
                panic!("authority client exploded");
            }
        }

        #[tokio::test]
        async fn the_exchange_fails_and_the_slot_is_cleared() {
            let coordinator = RefreshCoordinator::new(PanickingRefresher);

            let outcome = coordinator.refresh(coordinator.generation()).await;

            assert_eq!(outcome, RefreshOutcome::Failed);
            assert!(!coordinator.is_refreshing());
        }
    }

    #[test]
    fn outcome_reports_success_only_for_refreshed() {
        assert!(RefreshOutcome::Refreshed.is_refreshed());
        assert!(!RefreshOutcome::MissingRefreshToken.is_refreshed());
        assert!(!RefreshOutcome::Rejected.is_refreshed());
        assert!(!RefreshOutcome::Failed.is_refreshed());
    }
}
