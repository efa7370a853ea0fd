//! Network Monitoring Implementation

use async_trait::async_trait;
use bridge_traits::{
    error::Result,
    network::{NetworkChangeStream, NetworkInfo, NetworkMonitor, NetworkStatus, NetworkType},
};
use std::net::SocketAddr;
use std::time::Duration;
use tracing::debug;

const DEFAULT_PROBE: &str = "1.1.1.1:443";

/// Probe settings for [`DesktopNetworkMonitor`]
#[derive(Debug, Clone)]
pub struct ProbeConfig {
    /// Address a TCP connect is attempted against
    pub address: SocketAddr,
    pub connect_timeout: Duration,
    /// Delay between probes in the change stream
    pub poll_interval: Duration,
}

impl Default for ProbeConfig {
    fn default() -> Self {
        Self {
            address: DEFAULT_PROBE
                .parse()
                .unwrap_or_else(|_| SocketAddr::from(([1, 1, 1, 1], 443))),
            connect_timeout: Duration::from_secs(3),
            poll_interval: Duration::from_secs(5),
        }
    }
}

/// Desktop network monitor
///
/// Reachability is decided by a TCP connect to a well-known address. A
/// refused or timed-out connect counts as disconnected. Platform APIs
/// (netlink, SystemConfiguration, NLM) would react faster but need extra
/// dependencies.
#[derive(Debug, Clone, Default)]
pub struct DesktopNetworkMonitor {
    probe: ProbeConfig,
}

impl DesktopNetworkMonitor {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_probe(probe: ProbeConfig) -> Self {
        Self { probe }
    }

    async fn check_connectivity(&self) -> NetworkStatus {
        match tokio::time::timeout(
            self.probe.connect_timeout,
            tokio::net::TcpStream::connect(self.probe.address),
        )
        .await
        {
            Ok(Ok(_)) => NetworkStatus::Connected,
            Ok(Err(_)) | Err(_) => NetworkStatus::Disconnected,
        }
    }
}

#[async_trait]
impl NetworkMonitor for DesktopNetworkMonitor {
    async fn get_network_info(&self) -> Result<NetworkInfo> {
        let status = self.check_connectivity().await;
        debug!(status = ?status, probe = %self.probe.address, "Network probe finished");

        Ok(NetworkInfo {
            status,
            // The probe cannot tell WiFi from Ethernet.
            network_type: (status == NetworkStatus::Connected).then_some(NetworkType::Other),
            is_metered: false,
        })
    }

    async fn subscribe_changes(&self) -> Result<Box<dyn NetworkChangeStream>> {
        Ok(Box::new(DesktopNetworkChangeStream {
            monitor: self.clone(),
            last_status: None,
            first: true,
        }))
    }
}

/// Polls the probe and yields only when the status differs from the last
/// one reported. The first observation is yielded immediately.
struct DesktopNetworkChangeStream {
    monitor: DesktopNetworkMonitor,
    last_status: Option<NetworkStatus>,
    first: bool,
}

#[async_trait]
impl NetworkChangeStream for DesktopNetworkChangeStream {
    async fn next(&mut self) -> Option<NetworkInfo> {
        loop {
            if !std::mem::take(&mut self.first) {
                tokio::time::sleep(self.monitor.probe.poll_interval).await;
            }

            if let Ok(info) = self.monitor.get_network_info().await {
                if self.last_status != Some(info.status) {
                    self.last_status = Some(info.status);
                    return Some(info);
                }
            }
        }
    }
}
