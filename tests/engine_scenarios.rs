use std::sync::Arc;
use std::time::Duration;

use assert_matches::assert_matches;
use pretty_assertions::assert_eq;

use zonelink::{
    Attribute, BridgeError, BridgeRuntime, Connector, EncodeError, EngineConfig, FakeConnector,
    FakeLinkConfig, LinkConfig, ProtocolFamily, ZoneChange,
};

const WAIT: Duration = Duration::from_secs(5);

fn audio_config(zones: u16) -> EngineConfig {
    EngineConfig::builder()
        .family(ProtocolFamily::Audio)
        .zone_count(zones)
        .build()
}

fn lighting_config(zones: u16) -> EngineConfig {
    EngineConfig::builder()
        .family(ProtocolFamily::Lighting)
        .zone_count(zones)
        .build()
}

fn fast_reconnect() -> LinkConfig {
    LinkConfig::builder()
        .reconnect_delay(Duration::from_millis(10))
        .max_reconnect_delay(Duration::from_millis(50))
        .build()
}

fn start(config: &EngineConfig, connector: &Arc<FakeConnector>) -> BridgeRuntime {
    let connector: Arc<dyn Connector> = connector.clone();
    BridgeRuntime::start(config, connector, fast_reconnect()).expect("config should be valid")
}

async fn eventually(mut condition: impl FnMut() -> bool) -> bool {
    let poll = async {
        while !condition() {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    };
    tokio::time::timeout(WAIT, poll).await.is_ok()
}

fn count(sent: &[String], frame: &str) -> usize {
    sent.iter().filter(|sent| sent.as_str() == frame).count()
}

#[tokio::test]
async fn audio_link_up_queries_every_configured_zone() {
    let connector = Arc::new(FakeConnector::new(FakeLinkConfig::default()));
    let mut runtime = start(&audio_config(3), &connector);

    assert!(runtime.wait_connected(WAIT).await);
    assert!(eventually(|| connector.sent().len() >= 3).await);
    assert_eq!(vec!["?1ZS+", "?2ZS+", "?3ZS+"], connector.sent());

    runtime.shutdown().await;
}

#[tokio::test]
async fn lighting_link_up_sends_interface_setup_before_status_queries() {
    let connector = Arc::new(FakeConnector::new(FakeLinkConfig::default()));
    let mut runtime = start(&lighting_config(64), &connector);

    assert!(runtime.wait_connected(WAIT).await);
    assert!(eventually(|| connector.sent().len() >= 11).await);
    let sent = connector.sent();
    assert_eq!(vec!["@A3210038", "@A3420002", "@A3300059"], sent[..3].to_vec());
    assert_eq!("\\05FF00730738004A", sent[3]);
    assert_eq!(11, sent.len());

    runtime.shutdown().await;
}

#[tokio::test]
async fn reports_fill_the_mirror_and_make_the_engine_ready() {
    let connector = Arc::new(FakeConnector::new(
        FakeLinkConfig::builder()
            .frames("#1ZS PR1 SS2 VO19 MU0+;#2ZS PR0 VO0+".parse().expect("valid fixture"))
            .build(),
    ));
    let runtime = start(&audio_config(2), &connector);

    assert!(runtime.wait_ready(WAIT).await);
    let engine = runtime.engine();
    assert_eq!(Some(true), engine.power(1));
    assert_eq!(Some(50), engine.level(1));
    assert_eq!(Some(2), engine.source(1));
    assert_eq!(Some(false), engine.mute(1));
    assert_eq!(Some(false), engine.power(2));

    runtime.shutdown().await;
}

#[tokio::test]
async fn injected_frames_are_published_as_changes() {
    let connector = Arc::new(FakeConnector::new(FakeLinkConfig::default()));
    let mut runtime = start(&audio_config(4), &connector);
    let mut changes = runtime.engine().subscribe();
    assert!(runtime.wait_connected(WAIT).await);

    assert!(connector.inject("#3ZS VO38+"));
    let change = tokio::time::timeout(WAIT, changes.recv())
        .await
        .expect("change should arrive")
        .expect("change channel should stay open");
    assert_eq!(
        ZoneChange {
            attribute: Attribute::Level,
            zone: 3,
            value: 100,
        },
        change
    );
    assert!(!runtime.engine().is_ready());

    runtime.shutdown().await;
}

#[tokio::test]
async fn reconnect_repeats_the_link_up_queries() {
    let connector = Arc::new(FakeConnector::new(FakeLinkConfig::default()));
    let mut runtime = start(&audio_config(2), &connector);

    assert!(runtime.wait_connected(WAIT).await);
    assert!(eventually(|| count(&connector.sent(), "?2ZS+") == 1).await);

    connector.drop_connection();
    assert!(eventually(|| connector.connections() == 2).await);
    assert!(eventually(|| count(&connector.sent(), "?2ZS+") == 2).await);
    assert_eq!(2, count(&connector.sent(), "?1ZS+"));

    runtime.shutdown().await;
}

#[tokio::test]
async fn out_of_range_commands_send_nothing() {
    let connector = Arc::new(FakeConnector::new(FakeLinkConfig::default()));
    let mut runtime = start(&audio_config(2), &connector);
    assert!(runtime.wait_connected(WAIT).await);
    assert!(eventually(|| connector.sent().len() == 2).await);

    let result = runtime.engine().set_power(3, true).await;
    assert_matches!(
        result,
        Err(BridgeError::Encode(error))
            if matches!(*error, EncodeError::OutOfRangeTarget { zone: 3, .. })
    );
    let result = runtime.engine().set_mute(0, true).await;
    assert_matches!(result, Err(BridgeError::Encode(_)));

    runtime.engine().set_power(2, true).await.expect("zone 2 is configured");
    assert!(eventually(|| connector.sent().len() == 3).await);
    assert_eq!("!2PR1+", connector.sent()[2]);

    runtime.shutdown().await;
}

#[tokio::test]
async fn lighting_bus_commands_update_the_mirror_when_echoed() {
    let connector = Arc::new(FakeConnector::new(FakeLinkConfig::default()));
    let mut runtime = start(&lighting_config(64), &connector);
    let mut changes = runtime.engine().subscribe();
    assert!(runtime.wait_connected(WAIT).await);

    assert!(connector.inject("\\051238007925000103000F"));
    let mut received = Vec::new();
    while received.len() < 4 {
        let change = tokio::time::timeout(WAIT, changes.recv())
            .await
            .expect("change should arrive")
            .expect("change channel should stay open");
        received.push(change);
    }

    assert_eq!(Some(true), runtime.engine().power(37));
    assert_eq!(Some(100), runtime.engine().level(37));
    assert_eq!(Some(false), runtime.engine().power(3));
    assert_eq!(Some(0), runtime.engine().level(3));

    runtime.shutdown().await;
}

#[tokio::test]
async fn all_mute_is_rejected_on_the_lighting_bus_before_sending() {
    let connector = Arc::new(FakeConnector::new(FakeLinkConfig::default()));
    let mut runtime = start(&lighting_config(8), &connector);
    assert!(runtime.wait_connected(WAIT).await);
    assert!(eventually(|| connector.sent().len() == 11).await);

    let result = runtime.engine().all_mute(true).await;
    assert_matches!(result, Err(BridgeError::Encode(_)));
    tokio::time::sleep(Duration::from_millis(20)).await;
    assert_eq!(11, connector.sent().len());

    runtime.shutdown().await;
}
