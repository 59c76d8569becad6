//! mDNS resolver backed by the `mdns-sd` daemon

use crate::error::{DiscoveryError, Result};
use crate::resolver::{Query, Resolver};
use async_trait::async_trait;
use mdns_sd::{ServiceDaemon, ServiceEvent as MdnsEvent, ServiceInfo};
use oscq_core::ServiceAnnouncement;
use std::net::IpAddr;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, trace, warn};

/// Resolver issuing one mDNS browse per query
pub struct MdnsResolver {
    /// mDNS service daemon
    mdns: ServiceDaemon,
}

impl MdnsResolver {
    /// Creates the resolver and its mDNS daemon
    pub fn new() -> Result<Self> {
        let mdns = ServiceDaemon::new().map_err(|e| {
            DiscoveryError::MdnsInitFailed(format!("Failed to create mDNS daemon: {}", e))
        })?;

        info!("mDNS resolver created");
        Ok(Self { mdns })
    }

    /// Converts ServiceInfo from mdns-sd into an announcement
    fn convert_service_info(info: &ServiceInfo, service_type: &str) -> ServiceAnnouncement {
        let addresses: Vec<IpAddr> = info.get_addresses().iter().copied().collect();

        ServiceAnnouncement::new(
            instance_name(info.get_fullname(), service_type),
            info.get_port(),
            addresses,
        )
    }
}

impl Drop for MdnsResolver {
    fn drop(&mut self) {
        if let Err(e) = self.mdns.shutdown() {
            debug!(error = %e, "mDNS daemon shutdown failed");
        }
    }
}

/// Stops the browse when the query finishes, is cancelled, or is dropped.
struct BrowseGuard<'a> {
    mdns: &'a ServiceDaemon,
    service_type: &'a str,
}

impl Drop for BrowseGuard<'_> {
    fn drop(&mut self) {
        if let Err(e) = self.mdns.stop_browse(self.service_type) {
            debug!(error = %e, service_type = self.service_type, "Failed to stop browse");
        }
    }
}

/// What a browse does after one daemon event
#[derive(Debug, PartialEq, Eq)]
enum Progress {
    /// Keep collecting
    Continue,
    /// A matching instance resolved or the search ended
    Done,
}

impl MdnsResolver {
    /// Folds one daemon event into `announcements`.
    fn absorb(
        event: MdnsEvent,
        query: &Query<'_>,
        announcements: &mut Vec<ServiceAnnouncement>,
    ) -> Progress {
        match event {
            MdnsEvent::ServiceResolved(info) => {
                let announcement = Self::convert_service_info(&info, query.service_type);
                debug!(
                    service = info.get_fullname(),
                    hostname = info.get_hostname(),
                    address = ?announcement.primary_address(),
                    port = announcement.port,
                    "Service resolved"
                );
                let matched = announcement.matches_prefix(query.instance_prefix);
                announcements.push(announcement);
                if matched {
                    Progress::Done
                } else {
                    Progress::Continue
                }
            }
            MdnsEvent::SearchStopped(typ) => {
                debug!(typ = %typ, "Search stopped");
                Progress::Done
            }
            other => {
                trace!(event = ?other, "Ignoring mDNS event");
                Progress::Continue
            }
        }
    }
}

#[async_trait]
impl Resolver for MdnsResolver {
    async fn query(
        &self,
        query: &Query<'_>,
        cancel: &CancellationToken,
    ) -> Result<Vec<ServiceAnnouncement>> {
        let service_type = query.service_type;
        let receiver = self
            .mdns
            .browse(service_type)
            .map_err(|e| DiscoveryError::BrowseFailed {
                service_type: service_type.to_string(),
                reason: e.to_string(),
            })?;
        let _guard = BrowseGuard {
            mdns: &self.mdns,
            service_type,
        };

        let deadline = tokio::time::sleep(query.timeout);
        tokio::pin!(deadline);

        let mut announcements = Vec::new();
        loop {
            tokio::select! {
                biased;
                _ = cancel.cancelled() => return Err(DiscoveryError::Cancelled),
                _ = &mut deadline => break,
                event = receiver.recv_async() => match event {
                    Ok(event) => {
                        if Self::absorb(event, query, &mut announcements) == Progress::Done {
                            break;
                        }
                    }
                    Err(e) => {
                        warn!(error = %e, "mDNS event channel closed");
                        return Err(DiscoveryError::BrowseFailed {
                            service_type: service_type.to_string(),
                            reason: e.to_string(),
                        });
                    }
                }
            }
        }

        Ok(announcements)
    }
}

/// Strips the `.<service type>` suffix from a full service name.
fn instance_name(fullname: &str, service_type: &str) -> String {
    fullname
        .strip_suffix(service_type)
        .map(|name| name.trim_end_matches('.'))
        .unwrap_or(fullname)
        .to_string()
}
