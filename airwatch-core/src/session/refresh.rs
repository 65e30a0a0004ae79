use std::time::Duration;
use tokio::time::{Instant, MissedTickBehavior, interval_at};

use super::{Session, SessionState};

/// Refresh `session` every `period`. Runs until the returned future is dropped.
///
/// The timer is armed only while the session has a location and is re-armed
/// from zero whenever the location changes, so a new search is not refreshed
/// on the previous location's schedule. `on_refresh` sees the state after
/// each refresh.
pub async fn refresh_periodically<F>(session: &Session, period: Duration, mut on_refresh: F)
where
    F: FnMut(&SessionState),
{
    let mut location = session.subscribe_location();

    loop {
        if location.wait_for(Option::is_some).await.is_err() {
            return;
        }

        let mut ticker = interval_at(Instant::now() + period, period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    if session.refresh().await {
                        on_refresh(&session.snapshot());
                    }
                }
                changed = location.changed() => {
                    if changed.is_err() {
                        return;
                    }
                    tracing::debug!("location changed, re-arming refresh timer");
                    break;
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        error::FetchError,
        location::{FixedGeolocation, IpLocator, LocationResolver},
        model::{Coordinates, FetchOutcome, LocationDescriptor, Reading},
        provider::AirQualityProvider,
    };
    use async_trait::async_trait;
    use chrono::Utc;
    use parking_lot::Mutex;
    use std::{collections::HashMap, sync::Arc};
    use tokio::time::sleep;

    #[derive(Debug, Default)]
    struct RecordingProvider {
        calls: Mutex<Vec<(Instant, LocationDescriptor)>>,
    }

    impl RecordingProvider {
        fn record(&self, location: LocationDescriptor) -> FetchOutcome {
            self.calls.lock().push((Instant::now(), location));
            Ok(Reading {
                aqi: 40,
                station_name: "Station".into(),
                measurements: HashMap::new(),
                observed_at: Utc::now(),
            })
        }
    }

    #[async_trait]
    impl AirQualityProvider for RecordingProvider {
        async fn fetch_by_coordinates(&self, coords: Coordinates) -> FetchOutcome {
            self.record(LocationDescriptor::Coordinates(coords))
        }

        async fn fetch_by_place_name(&self, text: &str) -> Option<FetchOutcome> {
            Some(self.record(LocationDescriptor::PlaceName(text.to_string())))
        }
    }

    #[derive(Debug)]
    struct NoIp;

    #[async_trait]
    impl IpLocator for NoIp {
        async fn locate(&self) -> Result<Coordinates, FetchError> {
            Err(FetchError::Api("unavailable".into()))
        }
    }

    fn session(provider: Arc<RecordingProvider>) -> Session {
        let resolver = LocationResolver::new(
            Arc::new(FixedGeolocation(Coordinates::new(11.0, 77.0))),
            Arc::new(NoIp),
            "Coimbatore",
        );
        Session::new(provider, resolver)
    }

    const PERIOD: Duration = Duration::from_secs(15 * 60);

    #[tokio::test(start_paused = true)]
    async fn timer_is_idle_until_a_location_exists() {
        let provider = Arc::new(RecordingProvider::default());
        let session = session(provider.clone());
        let mut refreshes = 0;

        tokio::select! {
            _ = refresh_periodically(&session, PERIOD, |_| refreshes += 1) => {}
            _ = sleep(PERIOD * 3) => {}
        }

        assert_eq!(refreshes, 0);
        assert!(provider.calls.lock().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn refreshes_every_period() {
        let provider = Arc::new(RecordingProvider::default());
        let session = session(provider.clone());
        let started = Instant::now();
        session.start().await;

        let mut refreshes = 0;
        tokio::select! {
            _ = refresh_periodically(&session, PERIOD, |state| {
                assert!(!state.loading);
                refreshes += 1;
            }) => {}
            _ = sleep(PERIOD * 2 + Duration::from_secs(60)) => {}
        }

        assert_eq!(refreshes, 2);
        let calls = provider.calls.lock();
        assert_eq!(calls.len(), 3);
        assert_eq!((calls[1].0 - started).as_secs(), PERIOD.as_secs());
        assert_eq!((calls[2].0 - started).as_secs(), PERIOD.as_secs() * 2);
    }

    #[tokio::test(start_paused = true)]
    async fn location_change_rearms_timer() {
        let provider = Arc::new(RecordingProvider::default());
        let session = session(provider.clone());
        let started = Instant::now();
        session.start().await;

        tokio::select! {
            _ = refresh_periodically(&session, PERIOD, |_| {}) => {}
            _ = async {
                sleep(Duration::from_secs(10 * 60)).await;
                session.manual_search("Chennai, India").await;
                sleep(Duration::from_secs(20 * 60)).await;
            } => {}
        }

        let calls = provider.calls.lock();
        let minutes: Vec<_> = calls.iter().map(|(at, _)| (*at - started).as_secs() / 60).collect();
        assert_eq!(minutes, vec![0, 10, 25]);
        assert_eq!(calls[2].1, LocationDescriptor::PlaceName("Chennai, India".into()));
    }
}
