//! Latest-request-wins search state
//!
//! Every search issued through a session gets a sequence number and its own
//! cancellation token. Issuing a new search cancels the previous token, and
//! a completing search may only write state if its sequence number is still
//! the latest one issued.

use super::{FilterEngine, SearchRequest};
use crate::view::ListingView;
use baanboard_common::errors::{AppError, Result};
use moka::future::Cache;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;
use tokio::sync::watch;
use tokio_util::sync::CancellationToken;
use tracing::debug;

/// Visible state of a search session
#[derive(Debug, Clone, Default)]
pub struct SearchState {
    pub results: Vec<ListingView>,
    /// User-facing message of the latest failed search
    pub error: Option<String>,
    pub loading: bool,
    /// Sequence number of the search that produced this state
    pub generation: u64,
}

/// Handle for one issued search
#[derive(Debug, Clone)]
pub struct SearchTicket {
    seq: u64,
    cancel: CancellationToken,
}

impl SearchTicket {
    pub fn seq(&self) -> u64 {
        self.seq
    }

    pub fn cancel_token(&self) -> &CancellationToken {
        &self.cancel
    }
}

/// Latest issued search. Sequence and token always change together.
struct InFlight {
    seq: u64,
    cancel: CancellationToken,
}

/// One logical filter session, e.g. a browse page
///
/// Lock order is `in_flight` then the watch channel.
pub struct SearchSession {
    in_flight: Mutex<InFlight>,
    state: watch::Sender<SearchState>,
}

impl Default for SearchSession {
    fn default() -> Self {
        Self::new()
    }
}

impl SearchSession {
    pub fn new() -> Self {
        let (state, _) = watch::channel(SearchState::default());
        Self {
            in_flight: Mutex::new(InFlight {
                seq: 0,
                cancel: CancellationToken::new(),
            }),
            state,
        }
    }

    fn in_flight(&self) -> MutexGuard<'_, InFlight> {
        self.in_flight.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Sequence number of the most recently issued search
    pub fn latest(&self) -> u64 {
        self.in_flight().seq
    }

    /// Issue a new search, superseding and cancelling the previous one
    pub fn begin(&self) -> SearchTicket {
        self.issue(CancellationToken::new())
    }

    /// Like [`begin`](Self::begin), but the search is also cancelled with `scope`
    pub fn begin_within(&self, scope: &CancellationToken) -> SearchTicket {
        self.issue(scope.child_token())
    }

    fn issue(&self, cancel: CancellationToken) -> SearchTicket {
        let mut current = self.in_flight();
        current.seq += 1;
        let previous = std::mem::replace(&mut current.cancel, cancel.clone());
        previous.cancel();

        self.state.send_modify(|state| state.loading = true);
        SearchTicket {
            seq: current.seq,
            cancel,
        }
    }

    /// Apply a finished search. Returns whether visible state changed.
    ///
    /// Superseded searches and cancelled searches never touch state. A
    /// failure of the latest search replaces results with the error.
    pub fn publish(&self, ticket: &SearchTicket, outcome: Result<Vec<ListingView>>) -> bool {
        self.apply(ticket, &outcome)
    }

    fn apply(&self, ticket: &SearchTicket, outcome: &Result<Vec<ListingView>>) -> bool {
        let current = self.in_flight();
        if ticket.seq != current.seq {
            debug!(seq = ticket.seq, latest = current.seq, "Discarding superseded search");
            return false;
        }

        self.state.send_if_modified(|state| {
            match outcome {
                Ok(results) => {
                    state.results = results.clone();
                    state.error = None;
                }
                Err(AppError::Cancelled) => return false,
                Err(e) => {
                    state.results.clear();
                    state.error = Some(e.user_message());
                }
            }
            state.loading = false;
            state.generation = ticket.seq;
            true
        })
    }

    /// Issue `request` through `engine` and publish its outcome
    pub async fn run(&self, engine: &FilterEngine, request: &SearchRequest) -> bool {
        let ticket = self.begin();
        let outcome = engine.search(request, &ticket.cancel).await;
        self.publish(&ticket, outcome)
    }

    /// Run `request` as this session's latest search and return its results.
    ///
    /// The search is cancelled when `scope` is or when a newer search begins.
    /// A search superseded before it finished yields `Cancelled`.
    pub async fn search_within(
        &self,
        engine: &FilterEngine,
        request: &SearchRequest,
        scope: &CancellationToken,
    ) -> Result<Vec<ListingView>> {
        let ticket = self.begin_within(scope);
        let outcome = engine.search(request, &ticket.cancel).await;

        if !self.apply(&ticket, &outcome) && self.latest() != ticket.seq {
            return Err(AppError::Cancelled);
        }
        outcome
    }

    /// Cancel the in-flight search, keeping the last published results
    pub fn cancel(&self) {
        let current = self.in_flight();
        current.cancel.cancel();
        self.state
            .send_if_modified(|state| std::mem::replace(&mut state.loading, false));
    }

    pub fn subscribe(&self) -> watch::Receiver<SearchState> {
        self.state.subscribe()
    }

    /// Snapshot of the current state
    pub fn state(&self) -> SearchState {
        self.state.borrow().clone()
    }
}

/// Search sessions keyed by a client-chosen id, dropped once idle
#[derive(Clone)]
pub struct SearchSessions {
    sessions: Cache<String, Arc<SearchSession>>,
}

impl SearchSessions {
    pub fn new(max_sessions: u64, idle: Duration) -> Self {
        Self {
            sessions: Cache::builder()
                .max_capacity(max_sessions)
                .time_to_idle(idle)
                .build(),
        }
    }

    /// Session for `id`, created on first use
    pub async fn get(&self, id: &str) -> Arc<SearchSession> {
        self.sessions
            .get_with_by_ref(id, async { Arc::new(SearchSession::new()) })
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::filter::Filters;
    use crate::fixtures::Fixture;
    use baanboard_common::db::models::ListingKind;
    use baanboard_common::db::StoreOp;
    use std::sync::Arc;
    use std::time::Duration;

    fn ids(views: &[ListingView]) -> Vec<uuid::Uuid> {
        views.iter().map(|v| v.listing.id).collect()
    }

    #[tokio::test(start_paused = true)]
    async fn test_newer_search_supersedes_slower_one() {
        let fx = Fixture::new();
        let offer = fx.seed_offer(12_000.0, 30.0, fx.studio, 10);
        let request_id = fx.seed_request(Default::default(), vec![fx.studio], 10);

        let engine = Arc::new(fx.engine());
        let session = Arc::new(SearchSession::new());
        let search_a = SearchRequest::new(Filters::new(ListingKind::Offer));
        let search_b = SearchRequest::new(Filters::new(ListingKind::Request));

        // Warm the catalog so both searches go straight to the listing select
        engine.search(&search_b, &fx.cancel).await.unwrap();

        fx.store.set_latency(StoreOp::SelectListings, Duration::from_millis(200));
        let slow = {
            let session = session.clone();
            let engine = engine.clone();
            tokio::spawn(async move { session.run(&engine, &search_a).await })
        };
        tokio::task::yield_now().await;
        fx.store.clear_latency();

        assert!(session.run(&engine, &search_b).await);
        tokio::time::advance(Duration::from_millis(250)).await;
        assert!(!slow.await.unwrap());

        let state = session.state();
        assert_eq!(ids(&state.results), vec![request_id]);
        assert!(!ids(&state.results).contains(&offer));
        assert_eq!(state.generation, 2);
        assert!(!state.loading);
    }

    #[tokio::test(start_paused = true)]
    async fn test_superseded_search_within_yields_cancelled() {
        let fx = Fixture::new();
        let offer = fx.seed_offer(12_000.0, 30.0, fx.studio, 10);

        let engine = Arc::new(fx.engine());
        let session = Arc::new(SearchSession::new());
        let request = SearchRequest::new(Filters::new(ListingKind::Offer));
        engine.search(&request, &fx.cancel).await.unwrap();

        fx.store.set_latency(StoreOp::SelectListings, Duration::from_millis(200));
        let slow = {
            let session = session.clone();
            let engine = engine.clone();
            let request = request.clone();
            tokio::spawn(async move {
                session
                    .search_within(&engine, &request, &CancellationToken::new())
                    .await
            })
        };
        tokio::time::sleep(Duration::from_millis(10)).await;
        fx.store.clear_latency();

        let latest = session.search_within(&engine, &request, &fx.cancel).await.unwrap();
        assert_eq!(ids(&latest), vec![offer]);
        assert!(slow.await.unwrap().is_err_and(|e| e.is_cancelled()));
        assert_eq!(session.state().generation, 2);
    }

    #[tokio::test]
    async fn test_search_within_follows_scope_cancellation() {
        let fx = Fixture::new();
        let session = SearchSession::new();
        let scope = CancellationToken::new();
        scope.cancel();

        let outcome = session
            .search_within(
                &fx.engine(),
                &SearchRequest::new(Filters::new(ListingKind::Offer)),
                &scope,
            )
            .await;
        assert!(outcome.is_err_and(|e| e.is_cancelled()));
        assert_eq!(session.state().generation, 0);
    }

    #[test]
    fn test_concurrent_begin_keeps_newest_live() {
        for _ in 0..2_000 {
            let session = Arc::new(SearchSession::new());
            let barrier = Arc::new(std::sync::Barrier::new(2));

            let handles: Vec<_> = (0..2)
                .map(|_| {
                    let session = session.clone();
                    let barrier = barrier.clone();
                    std::thread::spawn(move || {
                        barrier.wait();
                        session.begin()
                    })
                })
                .collect();
            let tickets: Vec<SearchTicket> =
                handles.into_iter().map(|h| h.join().unwrap()).collect();

            let newest = tickets.iter().max_by_key(|t| t.seq()).unwrap();
            assert_eq!(newest.seq(), session.latest());
            assert!(!newest.cancel_token().is_cancelled());
            assert_eq!(
                tickets.iter().filter(|t| t.cancel_token().is_cancelled()).count(),
                1
            );
        }
    }

    #[tokio::test]
    async fn test_sessions_are_shared_per_id() {
        let sessions = SearchSessions::new(100, Duration::from_secs(60));

        let a = sessions.get("tab-1").await;
        let b = sessions.get("tab-1").await;
        let c = sessions.get("tab-2").await;

        assert!(Arc::ptr_eq(&a, &b));
        assert!(!Arc::ptr_eq(&a, &c));
    }

    #[test]
    fn test_stale_completion_is_discarded() {
        let session = SearchSession::new();
        let first = session.begin();
        let second = session.begin();

        assert!(first.cancel_token().is_cancelled());
        assert!(!second.cancel_token().is_cancelled());

        assert!(session.publish(&second, Ok(Vec::new())));
        assert!(!session.publish(&first, Err(AppError::Internal { message: "late".into() })));

        let state = session.state();
        assert_eq!(state.generation, second.seq());
        assert!(state.error.is_none());
    }

    #[tokio::test]
    async fn test_cancellation_keeps_prior_results() {
        let fx = Fixture::new();
        let offer = fx.seed_offer(12_000.0, 30.0, fx.studio, 10);
        let engine = fx.engine();
        let session = SearchSession::new();
        let request = SearchRequest::new(Filters::new(ListingKind::Offer));

        assert!(session.run(&engine, &request).await);

        let ticket = session.begin();
        session.cancel();
        let outcome = engine.search(&request, ticket.cancel_token()).await;
        assert!(outcome.as_ref().is_err_and(|e| e.is_cancelled()));
        assert!(!session.publish(&ticket, outcome));

        let state = session.state();
        assert_eq!(ids(&state.results), vec![offer]);
        assert!(!state.loading);
    }

    #[tokio::test]
    async fn test_latest_failure_replaces_results() {
        let fx = Fixture::new();
        fx.seed_offer(12_000.0, 30.0, fx.studio, 10);
        let engine = fx.engine();
        let session = SearchSession::new();
        let request = SearchRequest::new(Filters::new(ListingKind::Offer));
        assert!(session.run(&engine, &request).await);

        fx.store.fail_on(StoreOp::SelectListings);
        assert!(session.run(&engine, &request).await);

        let state = session.state();
        assert!(state.results.is_empty());
        assert_eq!(
            state.error.as_deref(),
            Some(baanboard_common::errors::GENERIC_USER_MESSAGE)
        );
    }

    #[tokio::test]
    async fn test_subscribers_see_published_state() {
        let fx = Fixture::new();
        fx.seed_offer(12_000.0, 30.0, fx.studio, 10);
        let engine = fx.engine();
        let session = SearchSession::new();
        let mut rx = session.subscribe();

        session
            .run(&engine, &SearchRequest::new(Filters::new(ListingKind::Offer)))
            .await;

        assert!(rx.has_changed().unwrap());
        assert_eq!(rx.borrow_and_update().results.len(), 1);
    }
}
