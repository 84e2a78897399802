//! Discovery responder
//!
//! Announces the core once at startup, then on every announce interval and
//! whenever a query for its service is heard.

use std::sync::Arc;
use std::time::Duration;

use futures::StreamExt;
use tokio_util::sync::CancellationToken;

use anchor_common::discovery::{Announcement, DiscoveryBeacon};
use anchor_common::Ticker;

/// Run the responder until `cancel` fires
pub async fn run_announcer(
    beacon: Arc<dyn DiscoveryBeacon>,
    announcement: Announcement,
    interval: Duration,
    cancel: CancellationToken,
) {
    let mut events = beacon.subscribe();
    let mut ticker = Ticker::new(interval);
    let mut listening = true;

    tracing::info!(
        "Advertising {} at {} via discovery",
        announcement.instance,
        announcement.base_url()
    );

    loop {
        tokio::select! {
            _ = cancel.cancelled() => break,
            _ = ticker.tick() => {
                announce(beacon.as_ref(), &announcement).await;
            }
            event = events.next(), if listening => match event {
                Some(event) if event.asks_for(&announcement.service) => {
                    tracing::debug!("Answering discovery query for {}", announcement.service);
                    announce(beacon.as_ref(), &announcement).await;
                }
                Some(_) => {}
                None => {
                    tracing::warn!("Discovery stream ended; continuing with periodic announcements");
                    listening = false;
                }
            },
        }
    }

    tracing::debug!("Announcer stopped");
}

async fn announce(beacon: &dyn DiscoveryBeacon, announcement: &Announcement) {
    if let Err(e) = beacon.announce(announcement).await {
        tracing::warn!("Failed to send discovery announcement: {}", e);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use anchor_common::discovery::{DiscoveryEvent, MemoryBeacon};
    use std::net::{IpAddr, Ipv4Addr};

    fn announcement() -> Announcement {
        Announcement {
            service: "_anchor._tcp.local".to_string(),
            instance: "anchor-core._anchor._tcp.local".to_string(),
            host: "anchor-core.local".to_string(),
            address: IpAddr::V4(Ipv4Addr::new(10, 0, 0, 2)),
            port: 3333,
            ttl_secs: 300,
        }
    }

    async fn next_announcement(
        events: &mut anchor_common::discovery::DiscoveryStream,
    ) -> Announcement {
        loop {
            match events.next().await {
                Some(DiscoveryEvent::Announce(a)) => return a,
                Some(_) => continue,
                None => panic!("discovery stream ended"),
            }
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_announces_at_startup_and_periodically() {
        let beacon = MemoryBeacon::new();
        let mut heard = beacon.subscribe();
        let cancel = CancellationToken::new();

        let task = tokio::spawn(run_announcer(
            Arc::new(beacon.clone()),
            announcement(),
            Duration::from_secs(30),
            cancel.clone(),
        ));

        assert_eq!(next_announcement(&mut heard).await, announcement());
        assert_eq!(next_announcement(&mut heard).await, announcement());

        cancel.cancel();
        task.await.unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn test_answers_matching_query() {
        let beacon = MemoryBeacon::new();
        let mut heard = beacon.subscribe();
        let cancel = CancellationToken::new();

        let task = tokio::spawn(run_announcer(
            Arc::new(beacon.clone()),
            announcement(),
            Duration::from_secs(3600),
            cancel.clone(),
        ));

        // Startup announcement
        next_announcement(&mut heard).await;

        let seeker = beacon.clone();
        seeker.query("_other._tcp.local").await.unwrap();
        seeker.query("_anchor._tcp.local").await.unwrap();

        let answer = tokio::time::timeout(Duration::from_secs(5), next_announcement(&mut heard))
            .await
            .expect("query should be answered before the next periodic tick");
        assert_eq!(answer.port, 3333);

        cancel.cancel();
        task.await.unwrap();
    }
}
