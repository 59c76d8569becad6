//! Resolver abstraction and the adapter the discovery loop talks to

use crate::config::DiscoveryConfig;
use crate::error::{DiscoveryError, Result};
use async_trait::async_trait;
use oscq_core::ServiceAnnouncement;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{debug, trace};

/// Slack the adapter grants a resolver beyond its collection window, so
/// announcements collected right up to the deadline are still delivered.
pub const RESOLVE_GRACE: Duration = Duration::from_millis(250);

/// Parameters of one resolver query
#[derive(Debug, Clone, Copy)]
pub struct Query<'a> {
    /// DNS-SD service type to browse
    pub service_type: &'a str,
    /// Instance name prefix; a resolver may stop early once it sees a match
    pub instance_prefix: &'a str,
    /// Collection window
    pub timeout: Duration,
}

/// A service discovery primitive.
///
/// Returns whatever announcements it collected within `query.timeout`, or
/// earlier once one matching `query.instance_prefix` has arrived.
/// Implementations should return [`DiscoveryError::Cancelled`] once `cancel`
/// fires and must release any in-flight query when their future is dropped.
#[async_trait]
pub trait Resolver: Send + Sync {
    async fn query(
        &self,
        query: &Query<'_>,
        cancel: &CancellationToken,
    ) -> Result<Vec<ServiceAnnouncement>>;
}

#[async_trait]
impl<R: Resolver + ?Sized> Resolver for Arc<R> {
    async fn query(
        &self,
        query: &Query<'_>,
        cancel: &CancellationToken,
    ) -> Result<Vec<ServiceAnnouncement>> {
        (**self).query(query, cancel).await
    }
}

/// Outcome of one resolve attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Lookup {
    /// A matching instance advertised this port (may be 0)
    Found(u16),
    /// Nothing usable this attempt
    NotFound,
    /// The attempt was interrupted by cancellation
    Cancelled,
}

/// Wraps a [`Resolver`] with the service type, instance prefix and timeout
/// the discovery loop needs. Errors never leave the adapter: they become
/// [`Lookup::NotFound`].
pub struct ResolverAdapter<R> {
    resolver: R,
    service_type: String,
    instance_prefix: String,
    timeout: Duration,
}

impl<R: Resolver> ResolverAdapter<R> {
    pub fn new(resolver: R, config: &DiscoveryConfig) -> Self {
        Self {
            resolver,
            service_type: config.service_type.clone(),
            instance_prefix: config.instance_prefix.clone(),
            timeout: config.resolve_timeout(),
        }
    }

    pub fn service_type(&self) -> &str {
        &self.service_type
    }

    pub fn instance_prefix(&self) -> &str {
        &self.instance_prefix
    }

    /// Runs one bounded query.
    ///
    /// The resolver gets the configured timeout as its collection window; the
    /// query future is dropped once `cancel` fires or that window plus
    /// [`RESOLVE_GRACE`] has elapsed, so no query outlives the call.
    pub async fn resolve(&self, cancel: &CancellationToken) -> Lookup {
        if cancel.is_cancelled() {
            return Lookup::Cancelled;
        }

        let query = Query {
            service_type: &self.service_type,
            instance_prefix: &self.instance_prefix,
            timeout: self.timeout,
        };
        let pending = self.resolver.query(&query, cancel);

        let result = tokio::select! {
            biased;
            _ = cancel.cancelled() => return Lookup::Cancelled,
            result = tokio::time::timeout(self.timeout + RESOLVE_GRACE, pending) => result,
        };

        match result {
            Ok(Ok(announcements)) => {
                trace!(count = announcements.len(), "Resolver returned announcements");
                match select_port(&announcements, &self.instance_prefix) {
                    Some(port) => Lookup::Found(port),
                    None => Lookup::NotFound,
                }
            }
            Ok(Err(DiscoveryError::Cancelled)) => Lookup::Cancelled,
            Ok(Err(e)) => {
                debug!(error = %e, service_type = %self.service_type, "Resolve attempt failed");
                if cancel.is_cancelled() {
                    Lookup::Cancelled
                } else {
                    Lookup::NotFound
                }
            }
            Err(_) => {
                debug!(
                    timeout_ms = self.timeout.as_millis() as u64,
                    "Resolve attempt timed out"
                );
                Lookup::NotFound
            }
        }
    }
}

/// Picks the port of the first announcement whose instance name starts with
/// `prefix`, in the order the resolver returned them.
pub fn select_port(announcements: &[ServiceAnnouncement], prefix: &str) -> Option<u16> {
    announcements
        .iter()
        .find(|announcement| announcement.matches_prefix(prefix))
        .map(|announcement| announcement.port)
}
