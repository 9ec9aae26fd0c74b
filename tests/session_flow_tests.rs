//! End-to-end session flows over a simulated pad

use spectator::link::{DeviceLink, LinkError, LinkEvent, SimPeripheral, SimTransport};
use spectator::protocol::{EventType, GattProfile, StatusSignal};
use spectator::session::{SessionController, SessionCounts, SessionError};
use spectator::store::{DataStore, MemoryBackend, SessionStatus};
use std::sync::Arc;
use tokio::sync::broadcast;
use tokio::time::{timeout, Duration};

struct Rig {
    pad: SimPeripheral,
    link: Arc<DeviceLink<SimTransport>>,
    store: DataStore<MemoryBackend>,
    controller: SessionController<SimTransport, MemoryBackend>,
}

fn rig() -> Rig {
    let pad = SimPeripheral::new("Pad-1");
    let link = Arc::new(DeviceLink::new(
        SimTransport::new(pad.clone()),
        GattProfile::default(),
    ));
    let store = DataStore::new(MemoryBackend::new());
    let controller = SessionController::new(Arc::clone(&link), store.clone());
    Rig {
        pad,
        link,
        store,
        controller,
    }
}

async fn next_event(events: &mut broadcast::Receiver<LinkEvent>) -> anyhow::Result<LinkEvent> {
    Ok(timeout(Duration::from_secs(1), events.recv()).await??)
}

/// Wait until the pad's tap has gone through the link
async fn wait_for_tap(events: &mut broadcast::Receiver<LinkEvent>) -> anyhow::Result<()> {
    loop {
        if next_event(events).await? == LinkEvent::Tap {
            return Ok(());
        }
    }
}

#[tokio::test]
async fn test_taps_and_chance_are_counted() -> anyhow::Result<()> {
    let mut rig = rig();
    let mut events = rig.link.subscribe();
    rig.link.connect().await?;

    let session = rig.controller.start_session()?;
    assert_eq!(session.device_name.as_deref(), Some("Pad-1"));

    for _ in 0..2 {
        assert!(rig.pad.tap());
        wait_for_tap(&mut events).await?;
        rig.controller.record_tap()?;
    }
    rig.controller.record_status(StatusSignal::Chance).await?;

    assert_eq!(
        rig.controller.counts(),
        SessionCounts {
            tap: 2,
            chance: 1,
            pinch: 0,
            normal: 0
        }
    );
    assert_eq!(rig.pad.written(), vec![1]);

    let stored = rig.store.get_session(&session.id)?.expect("session stored");
    assert_eq!(stored.tap_count_total, 2);
    assert_eq!(stored.chance_count_total, 1);
    assert_eq!(stored.pinch_count_total, 0);

    let types: Vec<EventType> = rig
        .store
        .get_session_events(&session.id)?
        .into_iter()
        .map(|e| e.event_type)
        .collect();
    assert_eq!(types, vec![EventType::Tap, EventType::Tap, EventType::Chance]);
    Ok(())
}

#[tokio::test]
async fn test_failed_send_records_nothing() -> anyhow::Result<()> {
    let mut rig = rig();
    rig.link.connect().await?;
    let session = rig.controller.start_session()?;

    rig.pad.set_fail_writes(true);
    let err = rig
        .controller
        .record_status(StatusSignal::Pinch)
        .await
        .unwrap_err();

    assert!(matches!(
        err,
        SessionError::Link(LinkError::Transport(_))
    ));
    assert_eq!(rig.controller.counts(), SessionCounts::default());
    assert!(rig.store.get_session_events(&session.id)?.is_empty());
    let stored = rig.store.get_session(&session.id)?.expect("session stored");
    assert_eq!(stored.pinch_count_total, 0);
    Ok(())
}

#[tokio::test]
async fn test_status_signal_without_session() -> anyhow::Result<()> {
    let mut rig = rig();
    rig.link.connect().await?;

    let err = rig
        .controller
        .record_status(StatusSignal::Normal)
        .await
        .unwrap_err();

    assert!(matches!(err, SessionError::NoActiveSession));
    assert!(rig.pad.written().is_empty());
    Ok(())
}

#[tokio::test]
async fn test_only_tap_byte_is_published() -> anyhow::Result<()> {
    let rig = rig();
    let mut events = rig.link.subscribe();
    rig.link.connect().await?;
    assert!(matches!(
        next_event(&mut events).await?,
        LinkEvent::ConnectionChanged { connected: true, .. }
    ));

    assert!(rig.pad.notify(&[0x00]));
    assert!(rig.pad.notify(&[]));
    assert!(rig.pad.notify(&[0x01]));

    // Signals are forwarded in order, so the first event seen must be the tap
    assert_eq!(next_event(&mut events).await?, LinkEvent::Tap);
    assert!(events.try_recv().is_err());
    Ok(())
}

#[tokio::test]
async fn test_end_session_persists_completion() -> anyhow::Result<()> {
    let mut rig = rig();
    rig.link.connect().await?;
    let session = rig.controller.start_session()?;

    let ended = rig.controller.end_session()?;

    assert!(rig.controller.current().is_none());
    let stored = rig.store.get_session(&session.id)?.expect("session stored");
    assert_eq!(stored, ended);
    assert_eq!(stored.status, SessionStatus::Completed);
    assert!(stored.end_time.expect("end time set") >= stored.start_time);
    Ok(())
}

#[tokio::test]
async fn test_session_survives_disconnect() -> anyhow::Result<()> {
    let mut rig = rig();
    let mut events = rig.link.subscribe();
    rig.link.connect().await?;
    let session = rig.controller.start_session()?;

    rig.pad.drop_connection();
    loop {
        if let LinkEvent::ConnectionChanged { connected: false, .. } =
            next_event(&mut events).await?
        {
            break;
        }
    }

    let err = rig
        .controller
        .record_status(StatusSignal::Chance)
        .await
        .unwrap_err();
    assert!(matches!(err, SessionError::Link(LinkError::NotConnected)));
    assert_eq!(
        rig.controller.current().map(|s| s.id.clone()),
        Some(session.id)
    );
    Ok(())
}
