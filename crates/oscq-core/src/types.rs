//! Types produced by a resolver query

use serde::{Deserialize, Serialize};
use std::net::IpAddr;

/// One service instance returned by a resolver query.
///
/// Announcements are short-lived: the discovery loop extracts the port and
/// drops the rest.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServiceAnnouncement {
    /// Instance name without the service type suffix (e.g. "VRChat-Client-3F2A1B")
    pub instance_name: String,

    /// Advertised port
    pub port: u16,

    /// Addresses the instance is reachable on
    pub host_addresses: Vec<IpAddr>,
}

impl ServiceAnnouncement {
    pub fn new(instance_name: impl Into<String>, port: u16, host_addresses: Vec<IpAddr>) -> Self {
        Self {
            instance_name: instance_name.into(),
            port,
            host_addresses,
        }
    }

    /// Checks whether the instance name starts with `prefix`
    pub fn matches_prefix(&self, prefix: &str) -> bool {
        self.instance_name.starts_with(prefix)
    }

    /// Returns the primary address (prefer IPv4)
    pub fn primary_address(&self) -> Option<IpAddr> {
        self.host_addresses
            .iter()
            .find(|addr| addr.is_ipv4())
            .or_else(|| self.host_addresses.first())
            .copied()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::net::{Ipv4Addr, Ipv6Addr};

    #[test]
    fn test_prefix_match_is_case_sensitive() {
        let announcement = ServiceAnnouncement::new("VRChat-Client-5", 9000, vec![]);
        assert!(announcement.matches_prefix("VRChat-Client"));
        assert!(!announcement.matches_prefix("vrchat-client"));
        assert!(!announcement.matches_prefix("VRChat-Client-50"));
    }

    #[test]
    fn test_primary_address_prefers_ipv4() {
        let announcement = ServiceAnnouncement::new(
            "VRChat-Client-5",
            9000,
            vec![
                IpAddr::V6(Ipv6Addr::LOCALHOST),
                IpAddr::V4(Ipv4Addr::new(192, 168, 1, 20)),
            ],
        );
        assert_eq!(
            announcement.primary_address(),
            Some(IpAddr::V4(Ipv4Addr::new(192, 168, 1, 20)))
        );

        let none = ServiceAnnouncement::new("VRChat-Client-5", 9000, vec![]);
        assert_eq!(none.primary_address(), None);
    }
}
