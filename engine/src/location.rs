use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use crisis_shared::GeoPoint;
use futures::future::{self, BoxFuture, FutureExt, Shared};
use tracing::{debug, info};

use crate::error::CapabilityError;

pub type LocationResult = Result<GeoPoint, CapabilityError>;
pub type LocationFuture = BoxFuture<'static, LocationResult>;

/// Host platform location capability. Single-shot, no cancellation.
pub trait LocationProvider: Send + Sync {
    fn is_supported(&self) -> bool;
    fn current_position(&self) -> LocationFuture;
}

/// Always answers with the same fix.
#[derive(Debug, Clone, Copy)]
pub struct FixedLocationProvider(pub GeoPoint);

impl LocationProvider for FixedLocationProvider {
    fn is_supported(&self) -> bool {
        true
    }

    fn current_position(&self) -> LocationFuture {
        future::ready(Ok(self.0)).boxed()
    }
}

/// Host without a location capability.
#[derive(Debug, Clone, Copy, Default)]
pub struct UnsupportedProvider;

impl LocationProvider for UnsupportedProvider {
    fn is_supported(&self) -> bool {
        false
    }

    fn current_position(&self) -> LocationFuture {
        future::ready(Err(CapabilityError::Unsupported)).boxed()
    }
}

#[derive(Default)]
struct Inner {
    cached: Option<GeoPoint>,
    in_flight: Option<(u64, Shared<LocationFuture>)>,
    requests: u64,
}

fn lock(inner: &Mutex<Inner>) -> MutexGuard<'_, Inner> {
    inner.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Session-wide location acquisition.
///
/// At most one provider request is outstanding; concurrent callers share
/// it. A successful fix is cached for the rest of the session, including
/// fixes whose original caller has since lost interest.
#[derive(Clone)]
pub struct LocationService {
    provider: Arc<dyn LocationProvider>,
    timeout: Duration,
    inner: Arc<Mutex<Inner>>,
}

impl LocationService {
    pub fn new(provider: Arc<dyn LocationProvider>, timeout: Duration) -> Self {
        Self {
            provider,
            timeout,
            inner: Arc::new(Mutex::new(Inner::default())),
        }
    }

    pub fn cached(&self) -> Option<GeoPoint> {
        lock(&self.inner).cached
    }

    /// Provider requests issued so far. Joined and cached calls do not count.
    pub fn requests_issued(&self) -> u64 {
        lock(&self.inner).requests
    }

    pub fn is_in_flight(&self) -> bool {
        lock(&self.inner).in_flight.is_some()
    }

    /// Cached fix if there is one, otherwise the shared in-flight request.
    pub fn acquire(&self) -> LocationFuture {
        if let Some(point) = self.cached() {
            debug!("location served from session cache");
            return future::ready(Ok(point)).boxed();
        }
        self.request()
    }

    /// Skip the cache. Still joins a request that is already outstanding,
    /// since that one started after the cached fix was taken.
    pub fn acquire_fresh(&self) -> LocationFuture {
        self.request()
    }

    fn request(&self) -> LocationFuture {
        if !self.provider.is_supported() {
            return future::ready(Err(CapabilityError::Unsupported)).boxed();
        }

        let mut inner = lock(&self.inner);
        if let Some((ticket, shared)) = &inner.in_flight {
            debug!(ticket, "joining in-flight location request");
            return shared.clone().boxed();
        }

        inner.requests += 1;
        let ticket = inner.requests;
        let request = self.provider.current_position();
        let timeout = self.timeout;
        let state = Arc::clone(&self.inner);
        let shared = async move {
            let result = match tokio::time::timeout(timeout, request).await {
                Ok(result) => result,
                Err(_) => Err(CapabilityError::Unavailable(format!(
                    "no position fix within {}ms",
                    timeout.as_millis()
                ))),
            };
            {
                let mut inner = lock(&state);
                if inner.in_flight.as_ref().map(|(current, _)| *current) == Some(ticket) {
                    inner.in_flight = None;
                }
                if let Ok(point) = &result {
                    inner.cached = Some(*point);
                }
            }
            match &result {
                Ok(point) => info!(ticket, lat = point.lat, lng = point.lng, "location acquired"),
                Err(err) => debug!(ticket, error = %err, "location request failed"),
            }
            result
        }
        .boxed()
        .shared();

        inner.in_flight = Some((ticket, shared.clone()));
        debug!(ticket, "issued location request");
        shared.boxed()
    }
}
