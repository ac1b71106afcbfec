use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;
use tracing::info;

use crate::api::HttpTaskApi;

/// Synchronous "is online" oracle, read before every mutation attempt.
pub trait Connectivity: Send + Sync {
    fn is_online(&self) -> bool;
}

/// Something that can find out whether the server is reachable.
#[async_trait]
pub trait ConnectivityProbe: Send + Sync {
    async fn probe(&self) -> bool;
}

#[async_trait]
impl ConnectivityProbe for HttpTaskApi {
    async fn probe(&self) -> bool {
        HttpTaskApi::probe(self).await
    }
}

/// Last known connectivity. Probes write it, the coordinator reads it.
#[derive(Debug)]
pub struct ConnectivityFlag {
    online: AtomicBool,
    forced_offline: bool,
}

impl ConnectivityFlag {
    pub fn new(online: bool) -> Self {
        Self {
            online: AtomicBool::new(online),
            forced_offline: false,
        }
    }

    /// A flag that never reports online, whatever probes say.
    pub fn forced_offline() -> Self {
        Self {
            online: AtomicBool::new(false),
            forced_offline: true,
        }
    }

    pub fn set_online(&self, online: bool) {
        let was = self.online.swap(online, Ordering::SeqCst);
        if was != online {
            info!(online, "connectivity changed");
        }
    }

    /// Probes and records the result.
    pub async fn refresh(&self, probe: &dyn ConnectivityProbe) -> bool {
        if self.forced_offline {
            return false;
        }
        let online = probe.probe().await;
        self.set_online(online);
        online
    }
}

impl Connectivity for ConnectivityFlag {
    fn is_online(&self) -> bool {
        !self.forced_offline && self.online.load(Ordering::SeqCst)
    }
}
