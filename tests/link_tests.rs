//! Integration tests for DeviceLink

use spectator::link::{DeviceLink, LinkError, LinkEvent, LinkState, SimPeripheral, SimTransport};
use spectator::protocol::{GattProfile, Pattern};
use tokio::sync::broadcast;
use tokio::time::{timeout, Duration};

fn link() -> (DeviceLink<SimTransport>, SimPeripheral) {
    let pad = SimPeripheral::new("Pad-1");
    (
        DeviceLink::new(SimTransport::new(pad.clone()), GattProfile::default()),
        pad,
    )
}

async fn next_event(events: &mut broadcast::Receiver<LinkEvent>) -> anyhow::Result<LinkEvent> {
    Ok(timeout(Duration::from_secs(1), events.recv()).await??)
}

fn disconnected() -> LinkEvent {
    LinkEvent::ConnectionChanged {
        connected: false,
        device_name: None,
    }
}

#[tokio::test]
async fn test_hidden_pad_is_not_found() -> anyhow::Result<()> {
    let (link, pad) = link();
    let mut events = link.subscribe();
    pad.set_hidden(true);

    let err = link.connect().await.unwrap_err();

    assert!(matches!(err, LinkError::Connection(_)));
    assert_eq!(link.state(), LinkState::Disconnected);
    assert_eq!(next_event(&mut events).await?, disconnected());
    Ok(())
}

#[tokio::test]
async fn test_unsolicited_close_notifies_once() -> anyhow::Result<()> {
    let (link, pad) = link();
    let mut events = link.subscribe();
    link.connect().await?;
    next_event(&mut events).await?;

    pad.drop_connection();

    assert_eq!(next_event(&mut events).await?, disconnected());
    assert!(!link.is_connected());
    assert!(matches!(
        link.send_pattern(Pattern::Normal).await,
        Err(LinkError::NotConnected)
    ));
    assert!(events.try_recv().is_err());
    Ok(())
}

#[tokio::test]
async fn test_voluntary_disconnect_notifies_once() -> anyhow::Result<()> {
    let (link, pad) = link();
    let mut events = link.subscribe();
    link.connect().await?;
    next_event(&mut events).await?;

    link.disconnect().await;

    assert_eq!(next_event(&mut events).await?, disconnected());
    assert!(!pad.is_connected());
    tokio::time::sleep(Duration::from_millis(20)).await;
    assert!(events.try_recv().is_err());
    Ok(())
}

#[tokio::test]
async fn test_writes_leave_in_call_order() -> anyhow::Result<()> {
    let (link, pad) = link();
    link.connect().await?;

    let (a, b, c) = tokio::join!(
        link.send_pattern(Pattern::Chance),
        link.send_pattern(Pattern::Pinch),
        link.send_pattern(Pattern::Normal),
    );
    a?;
    b?;
    c?;

    assert_eq!(pad.written(), vec![1, 2, 0]);
    Ok(())
}

#[tokio::test]
async fn test_reconnect_reopens_known_device() -> anyhow::Result<()> {
    let (link, pad) = link();
    let mut events = link.subscribe();
    link.connect().await?;
    pad.drop_connection();
    next_event(&mut events).await?;
    assert_eq!(next_event(&mut events).await?, disconnected());

    link.reconnect().await?;

    assert_eq!(link.state(), LinkState::Connected);
    assert_eq!(pad.open_count(), 2);
    assert_eq!(
        next_event(&mut events).await?,
        LinkEvent::ConnectionChanged {
            connected: true,
            device_name: Some("Pad-1".into())
        }
    );
    link.send_pattern(Pattern::Pinch).await?;
    assert_eq!(pad.written(), vec![2]);
    Ok(())
}

#[tokio::test]
async fn test_failed_reconnect_ends_disconnected() -> anyhow::Result<()> {
    let (link, pad) = link();
    link.connect().await?;
    link.disconnect().await;
    let mut events = link.subscribe();

    pad.fail_next_open();
    let err = link.reconnect().await.unwrap_err();

    assert!(matches!(err, LinkError::Transport(_)));
    assert_eq!(link.state(), LinkState::Disconnected);
    assert_eq!(next_event(&mut events).await?, disconnected());
    Ok(())
}

#[tokio::test]
async fn test_taps_reach_every_subscriber() -> anyhow::Result<()> {
    let (link, pad) = link();
    link.connect().await?;
    let mut first = link.subscribe();
    let mut second = link.subscribe();

    assert!(pad.tap());

    assert_eq!(next_event(&mut first).await?, LinkEvent::Tap);
    assert_eq!(next_event(&mut second).await?, LinkEvent::Tap);
    Ok(())
}

#[tokio::test]
async fn test_stale_signals_after_reconnect_are_ignored() -> anyhow::Result<()> {
    let (link, pad) = link();
    link.connect().await?;
    link.connect().await?;
    let mut events = link.subscribe();

    // Only the newest connection's receiver is live
    assert!(pad.tap());

    assert_eq!(next_event(&mut events).await?, LinkEvent::Tap);
    assert_eq!(pad.open_count(), 2);
    assert!(link.is_connected());
    Ok(())
}

#[tokio::test]
async fn test_stale_attempt_leaves_newer_connection_alone() -> anyhow::Result<()> {
    let (link, pad) = link();
    let link = std::sync::Arc::new(link);
    pad.delay_next_open(Duration::from_millis(200));

    let slow = {
        let link = std::sync::Arc::clone(&link);
        tokio::spawn(async move { link.connect().await })
    };
    tokio::time::sleep(Duration::from_millis(50)).await;
    link.disconnect().await;
    link.connect().await?;
    assert!(link.is_connected());

    let stale = slow.await?;
    assert!(matches!(stale, Err(LinkError::Connection(_))));

    assert!(link.is_connected());
    assert!(pad.is_connected());
    link.send_pattern(Pattern::Chance).await?;
    assert_eq!(pad.written(), vec![1]);
    Ok(())
}

#[tokio::test]
async fn test_stale_attempt_on_idle_link_is_closed() -> anyhow::Result<()> {
    let (link, pad) = link();
    let link = std::sync::Arc::new(link);
    pad.delay_next_open(Duration::from_millis(100));

    let slow = {
        let link = std::sync::Arc::clone(&link);
        tokio::spawn(async move { link.connect().await })
    };
    tokio::time::sleep(Duration::from_millis(30)).await;
    link.disconnect().await;

    assert!(slow.await?.is_err());
    assert_eq!(link.state(), LinkState::Disconnected);
    assert!(!pad.is_connected());
    Ok(())
}
