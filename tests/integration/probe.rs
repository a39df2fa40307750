//! Health probe against real sockets

use db_warden::health::{HealthProbe, HealthStatus};

use crate::{connector, dead_endpoint, live_endpoint, skip_if_not_enabled, TIMEOUT};

#[tokio::test]
async fn test_refused_endpoint_is_down_every_time() {
    let probe = HealthProbe::new(connector(), TIMEOUT);
    let endpoint = dead_endpoint();

    for _ in 0..3 {
        match probe.probe(&endpoint).await {
            HealthStatus::Down { reason } => {
                assert!(!reason.is_empty());
                assert!(!reason.contains("dead-secret"));
            }
            HealthStatus::Up => panic!("nothing listens on port 1"),
        }
    }
}

#[tokio::test]
async fn test_live_endpoint_is_up_every_time() {
    skip_if_not_enabled!();

    let probe = HealthProbe::new(connector(), TIMEOUT);
    let endpoint = live_endpoint();

    for _ in 0..3 {
        assert_eq!(probe.probe(&endpoint).await, HealthStatus::Up);
    }
}

#[tokio::test]
async fn test_wrong_password_is_down_and_redacted() {
    skip_if_not_enabled!();

    let live = live_endpoint();
    let endpoint = db_warden::config::EndpointConfig::new(
        live.host.clone(),
        live.port,
        live.user.clone(),
        "definitely-not-the-password",
        live.database.clone(),
    );

    let status = HealthProbe::new(connector(), TIMEOUT).probe(&endpoint).await;
    match status {
        HealthStatus::Down { reason } => {
            assert!(!reason.contains("definitely-not-the-password"))
        }
        HealthStatus::Up => panic!("server accepted a bad password"),
    }
}
