//! The single mutable session: current reading, loading/error flags and the
//! location they belong to.
//!
//! [`SessionState`] holds the data and its transitions; [`Session`] drives
//! them from the resolver and the provider. Nothing else mutates the state,
//! observers get cloned snapshots.

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use std::sync::Arc;
use tokio::sync::watch;

use crate::{
    error::{FailureKind, FetchError},
    location::LocationResolver,
    model::{FetchOutcome, LocationDescriptor, LocationMethod, Reading},
    provider::{AirQualityProvider, normalize_place_query},
};

pub mod refresh;

pub use refresh::refresh_periodically;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionError {
    pub kind: FailureKind,
    pub message: String,
}

impl From<FetchError> for SessionError {
    fn from(err: FetchError) -> Self {
        Self { kind: err.kind(), message: err.to_string() }
    }
}

/// Identifies one issued fetch. Only the most recently issued ticket may
/// change the session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct RequestTicket(u64);

#[derive(Debug, Clone, PartialEq)]
pub struct SessionState {
    pub reading: Option<Reading>,
    pub loading: bool,
    pub error: Option<SessionError>,
    pub location_method: LocationMethod,
    /// The resolved location, or the last search that produced a reading.
    /// Reused by refresh and retry.
    pub location: Option<LocationDescriptor>,
    /// A failed search that retry repeats. Cleared once any fetch succeeds.
    pending_search: Option<LocationDescriptor>,
    latest_request: u64,
}

impl Default for SessionState {
    fn default() -> Self {
        Self {
            reading: None,
            loading: true,
            error: None,
            location_method: LocationMethod::Detecting,
            location: None,
            pending_search: None,
            latest_request: 0,
        }
    }
}

/// What the presentation layer should show for a state.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum SessionView<'a> {
    Loading,
    /// Nothing to display: block the report, offer search and retry.
    HardError(&'a SessionError),
    /// A reading to display, possibly stale with a non-blocking banner.
    Ready {
        reading: &'a Reading,
        banner: Option<&'a SessionError>,
        refreshing: bool,
    },
}

impl SessionState {
    pub fn new() -> Self {
        Self::default()
    }

    /// Mark a fetch as in flight. The current reading stays visible.
    pub fn start_fetch(&mut self) -> RequestTicket {
        self.latest_request += 1;
        self.loading = true;
        RequestTicket(self.latest_request)
    }

    /// Apply a fetch result. Outcomes of superseded tickets are dropped;
    /// returns whether the state changed.
    pub fn apply_outcome(&mut self, ticket: RequestTicket, outcome: FetchOutcome) -> bool {
        if !self.is_current(ticket) {
            tracing::debug!(
                ticket = ticket.0,
                latest = self.latest_request,
                "discarding outcome of superseded request"
            );
            return false;
        }

        match outcome {
            Ok(reading) => {
                self.reading = Some(reading);
                self.error = None;
            }
            Err(err) => {
                self.error = Some(err.into());
            }
        }

        self.loading = false;
        true
    }

    /// Close a ticket that produced no outcome (blank search).
    pub fn abandon(&mut self, ticket: RequestTicket) {
        if self.is_current(ticket) {
            self.loading = false;
        }
    }

    pub fn set_location(&mut self, location: LocationDescriptor, method: LocationMethod) {
        self.location = Some(location);
        self.location_method = method;
    }

    pub fn pending_search(&self) -> Option<&LocationDescriptor> {
        self.pending_search.as_ref()
    }

    pub fn last_updated(&self) -> Option<DateTime<Utc>> {
        self.reading.as_ref().map(|r| r.observed_at)
    }

    pub fn is_hard_failure(&self) -> bool {
        self.error.is_some() && self.reading.is_none()
    }

    pub fn is_soft_failure(&self) -> bool {
        self.error.is_some() && self.reading.is_some()
    }

    pub fn view(&self) -> SessionView<'_> {
        match (&self.reading, &self.error) {
            (Some(reading), banner) => SessionView::Ready {
                reading,
                banner: banner.as_ref(),
                refreshing: self.loading,
            },
            (None, _) if self.loading => SessionView::Loading,
            (None, Some(err)) => SessionView::HardError(err),
            (None, None) => SessionView::Loading,
        }
    }

    fn is_current(&self, ticket: RequestTicket) -> bool {
        ticket.0 == self.latest_request
    }
}

/// Owns the session state and runs the operations that change it.
#[derive(Debug)]
pub struct Session {
    state: Mutex<SessionState>,
    provider: Arc<dyn AirQualityProvider>,
    resolver: LocationResolver,
    location_tx: watch::Sender<Option<LocationDescriptor>>,
}

impl Session {
    pub fn new(provider: Arc<dyn AirQualityProvider>, resolver: LocationResolver) -> Self {
        let (location_tx, _) = watch::channel(None);

        Self {
            state: Mutex::new(SessionState::new()),
            provider,
            resolver,
            location_tx,
        }
    }

    pub fn snapshot(&self) -> SessionState {
        self.state.lock().clone()
    }

    /// Notified whenever the session's location changes.
    pub fn subscribe_location(&self) -> watch::Receiver<Option<LocationDescriptor>> {
        self.location_tx.subscribe()
    }

    /// Resolve the location from scratch, then fetch for it.
    pub async fn start(&self) -> SessionState {
        {
            let mut state = self.state.lock();
            state.location_method = LocationMethod::Detecting;
            state.pending_search = None;
            state.loading = true;
        }

        let resolution = self.resolver.resolve().await;
        self.set_location(resolution.location.clone(), resolution.method);
        self.fetch(resolution.location, resolution.method).await;

        self.snapshot()
    }

    /// Re-fetch the known location. Returns `false` when there is none yet.
    pub async fn refresh(&self) -> bool {
        let known = {
            let state = self.state.lock();
            state.location.clone().map(|location| (location, state.location_method))
        };

        match known {
            Some((location, method)) => {
                self.fetch(location, method).await;
                true
            }
            None => false,
        }
    }

    /// Search by place name. Blank input is ignored and returns `false`.
    ///
    /// The session keeps its previous location until the search yields a
    /// reading; a failed search is only remembered for [`Session::retry`].
    pub async fn manual_search(&self, text: &str) -> bool {
        let Some(query) = normalize_place_query(text) else {
            return false;
        };

        self.search(LocationDescriptor::PlaceName(query.to_string())).await;
        true
    }

    /// Repeat a failed search, else re-fetch the known location, else re-run
    /// resolution.
    pub async fn retry(&self) -> SessionState {
        let pending = self.state.lock().pending_search.clone();

        if let Some(location) = pending {
            self.search(location).await;
        } else if !self.refresh().await {
            return self.start().await;
        }
        self.snapshot()
    }

    async fn search(&self, location: LocationDescriptor) {
        self.state.lock().pending_search = Some(location.clone());

        if self.fetch(location.clone(), LocationMethod::Manual).await {
            self.set_location(location, LocationMethod::Manual);
        }
    }

    fn set_location(&self, location: LocationDescriptor, method: LocationMethod) {
        self.state.lock().set_location(location.clone(), method);
        self.location_tx.send_replace(Some(location));
    }

    /// Fetch `location` and apply the outcome. Returns whether it produced
    /// the current reading.
    async fn fetch(&self, location: LocationDescriptor, method: LocationMethod) -> bool {
        let ticket = self.state.lock().start_fetch();

        let Some(outcome) = self.provider.fetch(&location).await else {
            self.state.lock().abandon(ticket);
            return false;
        };

        let outcome = match (outcome, method) {
            (Err(FetchError::Api(_)), LocationMethod::Fallback) => Err(FetchError::Api(format!(
                "Could not detect your location and no data was found for the default city \"{}\". \
                 Search for your city manually.",
                self.resolver.default_place()
            ))),
            (outcome, _) => outcome,
        };

        let succeeded = outcome.is_ok();
        let mut state = self.state.lock();
        if !state.apply_outcome(ticket, outcome) {
            return false;
        }
        if succeeded {
            state.pending_search = None;
        }
        succeeded
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        error::TIMEOUT_MESSAGE,
        location::{FixedGeolocation, IpLocator, NoGeolocation},
        model::{Coordinates, Measurement},
    };
    use async_trait::async_trait;
    use std::{
        collections::{HashMap, VecDeque},
        time::Duration,
    };

    fn reading(aqi: i32, station: &str) -> Reading {
        Reading {
            aqi,
            station_name: station.to_string(),
            measurements: HashMap::from([("pm25".to_string(), Measurement { value: 80.0 })]),
            observed_at: Utc::now(),
        }
    }

    /// Answers each call with the next scripted outcome after its delay.
    #[derive(Debug, Default)]
    struct ScriptedProvider {
        script: Mutex<VecDeque<(Duration, FetchOutcome)>>,
        requests: Mutex<Vec<LocationDescriptor>>,
    }

    impl ScriptedProvider {
        fn new(script: Vec<(Duration, FetchOutcome)>) -> Arc<Self> {
            Arc::new(Self {
                script: Mutex::new(script.into()),
                requests: Mutex::default(),
            })
        }

        async fn answer(&self, location: LocationDescriptor) -> FetchOutcome {
            self.requests.lock().push(location);
            let next = self.script.lock().pop_front();
            match next {
                Some((delay, outcome)) => {
                    tokio::time::sleep(delay).await;
                    outcome
                }
                None => Err(FetchError::network("script exhausted")),
            }
        }
    }

    #[async_trait]
    impl AirQualityProvider for ScriptedProvider {
        async fn fetch_by_coordinates(&self, coords: Coordinates) -> FetchOutcome {
            self.answer(LocationDescriptor::Coordinates(coords)).await
        }

        async fn fetch_by_place_name(&self, text: &str) -> Option<FetchOutcome> {
            let query = normalize_place_query(text)?;
            Some(self.answer(LocationDescriptor::PlaceName(query.to_string())).await)
        }
    }

    #[derive(Debug)]
    struct FailingIp;

    #[async_trait]
    impl IpLocator for FailingIp {
        async fn locate(&self) -> Result<Coordinates, FetchError> {
            Err(FetchError::Api("no latitude".into()))
        }
    }

    fn session_with_gps(provider: Arc<ScriptedProvider>) -> Session {
        let resolver = LocationResolver::new(
            Arc::new(FixedGeolocation(Coordinates::new(11.0, 77.0))),
            Arc::new(FailingIp),
            "Coimbatore",
        );
        Session::new(provider, resolver)
    }

    fn session_without_location(provider: Arc<ScriptedProvider>) -> Session {
        let resolver =
            LocationResolver::new(Arc::new(NoGeolocation), Arc::new(FailingIp), "Coimbatore");
        Session::new(provider, resolver)
    }

    #[test]
    fn initial_state_is_detecting_and_loading() {
        let state = SessionState::new();
        assert!(state.loading);
        assert_eq!(state.location_method, LocationMethod::Detecting);
        assert!(state.reading.is_none());
        assert_eq!(state.view(), SessionView::Loading);
    }

    #[test]
    fn start_fetch_keeps_stale_reading() {
        let mut state = SessionState::new();
        let ticket = state.start_fetch();
        state.apply_outcome(ticket, Ok(reading(42, "A")));

        state.start_fetch();

        assert!(state.loading);
        assert_eq!(state.reading.as_ref().map(|r| r.aqi), Some(42));
    }

    #[test]
    fn failure_after_success_is_soft() {
        let mut state = SessionState::new();
        let ticket = state.start_fetch();
        state.apply_outcome(ticket, Ok(reading(42, "A")));
        let before = state.reading.clone();

        let ticket = state.start_fetch();
        state.apply_outcome(ticket, Err(FetchError::network("offline")));

        assert_eq!(state.reading, before);
        assert!(!state.loading);
        assert_eq!(state.error.as_ref().map(|e| e.kind), Some(FailureKind::Network));
        assert!(state.is_soft_failure());
        assert!(!state.is_hard_failure());
        assert!(matches!(state.view(), SessionView::Ready { banner: Some(_), .. }));
    }

    #[test]
    fn failure_without_reading_is_hard() {
        let mut state = SessionState::new();
        let ticket = state.start_fetch();
        state.apply_outcome(ticket, Err(FetchError::Timeout));

        assert!(state.is_hard_failure());
        match state.view() {
            SessionView::HardError(err) => assert_eq!(err.message, TIMEOUT_MESSAGE),
            other => panic!("expected hard error, got {other:?}"),
        }
    }

    #[test]
    fn success_clears_error() {
        let mut state = SessionState::new();
        let ticket = state.start_fetch();
        state.apply_outcome(ticket, Err(FetchError::Timeout));

        let ticket = state.start_fetch();
        state.apply_outcome(ticket, Ok(reading(10, "B")));

        assert!(state.error.is_none());
        assert!(state.last_updated().is_some());
        assert!(matches!(state.view(), SessionView::Ready { banner: None, refreshing: false, .. }));
    }

    #[test]
    fn superseded_outcome_is_discarded() {
        let mut state = SessionState::new();
        let older = state.start_fetch();
        let newer = state.start_fetch();

        assert!(state.apply_outcome(newer, Ok(reading(10, "new"))));
        assert!(!state.apply_outcome(older, Ok(reading(300, "old"))));

        assert_eq!(state.reading.as_ref().map(|r| r.station_name.as_str()), Some("new"));
    }

    #[test]
    fn abandoning_stale_ticket_keeps_loading() {
        let mut state = SessionState::new();
        let older = state.start_fetch();
        let _newer = state.start_fetch();

        state.abandon(older);
        assert!(state.loading);
    }

    #[tokio::test]
    async fn start_resolves_and_fetches() {
        let provider = ScriptedProvider::new(vec![(Duration::ZERO, Ok(reading(142, "Coimbatore")))]);
        let session = session_with_gps(provider.clone());

        let state = session.start().await;

        assert_eq!(state.location_method, LocationMethod::Gps);
        assert!(!state.loading);
        assert_eq!(state.reading.map(|r| r.station_name), Some("Coimbatore".to_string()));
        assert_eq!(
            provider.requests.lock().as_slice(),
            &[LocationDescriptor::Coordinates(Coordinates::new(11.0, 77.0))]
        );
    }

    #[tokio::test]
    async fn fallback_failure_suggests_manual_search() {
        let provider = ScriptedProvider::new(vec![(
            Duration::ZERO,
            Err(FetchError::Api("Unknown station".into())),
        )]);
        let session = session_without_location(provider.clone());

        let state = session.start().await;

        assert_eq!(state.location_method, LocationMethod::Fallback);
        assert_eq!(
            provider.requests.lock().as_slice(),
            &[LocationDescriptor::PlaceName("Coimbatore".into())]
        );
        let err = state.error.expect("hard failure expected");
        assert_eq!(err.kind, FailureKind::ApiError);
        assert!(err.message.contains("Search for your city manually"));
    }

    #[tokio::test]
    async fn blank_manual_search_is_a_no_op() {
        let provider = ScriptedProvider::new(vec![]);
        let session = session_with_gps(provider.clone());

        assert!(!session.manual_search("").await);
        assert!(!session.manual_search("   ").await);

        assert!(provider.requests.lock().is_empty());
        assert_eq!(session.snapshot(), SessionState::new());
    }

    #[tokio::test]
    async fn manual_search_switches_location() {
        let provider = ScriptedProvider::new(vec![(Duration::ZERO, Ok(reading(55, "Chennai")))]);
        let session = session_with_gps(provider);
        let mut location = session.subscribe_location();

        assert!(session.manual_search("  Chennai, India ").await);

        let state = session.snapshot();
        assert_eq!(state.location_method, LocationMethod::Manual);
        assert_eq!(state.location, Some(LocationDescriptor::PlaceName("Chennai, India".into())));
        assert!(location.has_changed().expect("sender alive"));
        assert_eq!(
            *location.borrow_and_update(),
            Some(LocationDescriptor::PlaceName("Chennai, India".into()))
        );
    }

    #[tokio::test]
    async fn failed_search_keeps_previous_location() {
        let provider = ScriptedProvider::new(vec![
            (Duration::ZERO, Ok(reading(80, "Coimbatore"))),
            (Duration::ZERO, Err(FetchError::Api("Unknown station".into()))),
            (Duration::ZERO, Ok(reading(85, "Coimbatore"))),
        ]);
        let session = session_with_gps(provider.clone());
        let gps = LocationDescriptor::Coordinates(Coordinates::new(11.0, 77.0));
        session.start().await;
        let location = session.subscribe_location();

        assert!(session.manual_search("Atlantis").await);

        let state = session.snapshot();
        assert!(state.is_soft_failure());
        assert_eq!(state.location, Some(gps.clone()));
        assert_eq!(state.location_method, LocationMethod::Gps);
        assert_eq!(state.pending_search(), Some(&LocationDescriptor::PlaceName("Atlantis".into())));
        assert!(!location.has_changed().expect("sender alive"));

        assert!(session.refresh().await);

        let state = session.snapshot();
        assert!(state.pending_search().is_none());
        assert!(state.error.is_none());
        assert_eq!(state.reading.map(|r| r.aqi), Some(85));
        assert_eq!(provider.requests.lock().last(), Some(&gps));
    }

    #[tokio::test]
    async fn retry_repeats_failed_search() {
        let provider = ScriptedProvider::new(vec![
            (Duration::ZERO, Ok(reading(80, "Coimbatore"))),
            (Duration::ZERO, Err(FetchError::Timeout)),
            (Duration::ZERO, Ok(reading(30, "Chennai"))),
        ]);
        let session = session_with_gps(provider.clone());
        session.start().await;

        session.manual_search("Chennai, India").await;
        let state = session.retry().await;

        let chennai = LocationDescriptor::PlaceName("Chennai, India".into());
        assert!(state.pending_search().is_none());
        assert_eq!(provider.requests.lock().last(), Some(&chennai));
        assert_eq!(state.location, Some(chennai));
        assert_eq!(state.location_method, LocationMethod::Manual);
        assert_eq!(state.reading.map(|r| r.station_name), Some("Chennai".to_string()));
    }

    #[tokio::test]
    async fn retry_reuses_known_location() {
        let provider = ScriptedProvider::new(vec![
            (Duration::ZERO, Err(FetchError::Timeout)),
            (Duration::ZERO, Ok(reading(20, "Coimbatore"))),
        ]);
        let session = session_with_gps(provider.clone());

        assert!(session.start().await.is_hard_failure());
        let state = session.retry().await;

        assert!(state.error.is_none());
        assert_eq!(provider.requests.lock().len(), 2);
    }

    #[tokio::test]
    async fn retry_without_location_resolves_again() {
        let provider = ScriptedProvider::new(vec![(Duration::ZERO, Ok(reading(20, "Coimbatore")))]);
        let session = session_with_gps(provider);

        let state = session.retry().await;

        assert_eq!(state.location_method, LocationMethod::Gps);
        assert!(state.reading.is_some());
    }

    #[tokio::test]
    async fn refresh_without_location_does_nothing() {
        let provider = ScriptedProvider::new(vec![]);
        let session = session_with_gps(provider.clone());

        assert!(!session.refresh().await);
        assert!(provider.requests.lock().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn slow_older_fetch_does_not_overwrite_newer_search() {
        let provider = ScriptedProvider::new(vec![
            (Duration::ZERO, Ok(reading(80, "Coimbatore"))),
            (Duration::from_secs(5), Ok(reading(400, "stale refresh"))),
            (Duration::from_secs(1), Ok(reading(30, "Chennai"))),
        ]);
        let session = session_with_gps(provider);
        session.start().await;

        tokio::join!(session.refresh(), async {
            tokio::time::sleep(Duration::from_millis(100)).await;
            session.manual_search("Chennai").await;
        });

        let state = session.snapshot();
        assert_eq!(state.reading.map(|r| r.station_name), Some("Chennai".to_string()));
        assert!(!state.loading);
    }
}
