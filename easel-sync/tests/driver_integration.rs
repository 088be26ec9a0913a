//! Two drivers wired back to back under tokio's paused clock.

use std::time::Duration;

use easel_core::{DrawableObject, EditPhase, ObjectId};
use easel_sync::{outbound_channel, run, Inbound, LocalCommand, SessionState, SyncConfig, SyncSession};
use futures_util::stream::{self, StreamExt};
use tokio::sync::mpsc;
use uuid::Uuid;

fn receiver_stream<T>(rx: mpsc::Receiver<T>) -> impl futures_util::Stream<Item = T> {
    stream::unfold(rx, |mut rx| async move { rx.recv().await.map(|item| (item, rx)) })
}

fn rect(id: &str, left: f64) -> DrawableObject {
    let mut obj = DrawableObject::rectangle(left, 10.0, 40.0, 40.0);
    obj.assign_id(ObjectId::new(id));
    obj
}

#[tokio::test(start_paused = true)]
async fn test_edits_reach_the_other_driver_without_echo() {
    let doc_id = Uuid::new_v4();
    let mut alice = SyncSession::new(SyncConfig::default().with_doc_id(doc_id));
    let mut bob = SyncSession::new(SyncConfig::default().with_doc_id(doc_id));

    let (alice_cmd_tx, alice_cmd_rx) = mpsc::channel::<Inbound>(64);
    let (alice_out_tx, alice_out_rx) = outbound_channel(alice.config());
    let (bob_out_tx, mut bob_out_rx) = outbound_channel(bob.config());

    let alice_inbound = Box::pin(receiver_stream(alice_cmd_rx));
    let bob_inbound = Box::pin(
        stream::iter(vec![Inbound::DocumentAttached { initial_state: Vec::new() }])
            .chain(receiver_stream(alice_out_rx).map(Inbound::Payload)),
    );

    let script = async move {
        alice_cmd_tx
            .send(Inbound::DocumentAttached { initial_state: Vec::new() })
            .await
            .unwrap();

        alice_cmd_tx
            .send(Inbound::Local(LocalCommand::Upsert(rect("r1", 10.0))))
            .await
            .unwrap();
        for step in 1..=5 {
            alice_cmd_tx
                .send(Inbound::Local(LocalCommand::Update {
                    id: ObjectId::new("r1"),
                    props: rect("r1", 10.0 + step as f64 * 8.0).serialize(),
                    phase: EditPhase::Continuous,
                }))
                .await
                .unwrap();
            tokio::time::sleep(Duration::from_millis(20)).await;
        }
        tokio::time::sleep(Duration::from_millis(400)).await;
        drop(alice_cmd_tx);
    };

    let (alice_stats, bob_stats, ()) = tokio::join!(
        run(&mut alice, alice_inbound, alice_out_tx),
        run(&mut bob, bob_inbound, bob_out_tx),
        script,
    );
    let alice_stats = alice_stats.unwrap();
    let bob_stats = bob_stats.unwrap();

    // The add, then a single write for the whole drag.
    assert_eq!(alice_stats.sent, 2);
    assert_eq!(alice_stats.timer_flushes, 1);
    assert_eq!(bob_stats.applied, 2);
    assert_eq!(bob_stats.sent, 0);
    assert!(bob_out_rx.try_recv().is_err());

    assert_eq!(bob.state(), SessionState::Synced);
    let r1 = bob.scene().get("r1").unwrap();
    assert_eq!(r1.props().base.left, 50.0);
    assert_eq!(alice.snapshot().by_id(), bob.snapshot().by_id());
    assert_eq!(bob.document().unwrap().stats().local, 0);
}

#[tokio::test(start_paused = true)]
async fn test_detach_flushes_pending_writes_to_the_transport() {
    let mut session = SyncSession::new(SyncConfig::default());
    let (out_tx, mut out_rx) = outbound_channel(session.config());

    let inbound = stream::iter(vec![
        Inbound::DocumentAttached { initial_state: Vec::new() },
        Inbound::Local(LocalCommand::Upsert(rect("r1", 0.0))),
        Inbound::Local(LocalCommand::Update {
            id: ObjectId::new("r1"),
            props: rect("r1", 99.0).serialize(),
            phase: EditPhase::Continuous,
        }),
        Inbound::DocumentDetached,
    ]);
    let stats = run(&mut session, inbound, out_tx).await.unwrap();

    assert_eq!(stats.sent, 2);
    assert_eq!(session.state(), SessionState::Uninitialized);
    let mut received = 0;
    while out_rx.try_recv().is_ok() {
        received += 1;
    }
    assert_eq!(received, 2);
}

#[tokio::test(start_paused = true)]
async fn test_state_request_answers_with_full_state() {
    let mut session = SyncSession::new(SyncConfig::default());
    let (out_tx, mut out_rx) = outbound_channel(session.config());

    let inbound = stream::iter(vec![
        Inbound::DocumentAttached { initial_state: Vec::new() },
        Inbound::Local(LocalCommand::Upsert(rect("r1", 0.0))),
        Inbound::StateRequested,
    ]);
    run(&mut session, inbound, out_tx).await.unwrap();

    let mut kinds = Vec::new();
    while let Ok(bytes) = out_rx.try_recv() {
        kinds.push(easel_sync::UpdateEnvelope::decode(&bytes).unwrap().kind);
    }
    assert_eq!(
        kinds,
        vec![easel_sync::EnvelopeKind::Update, easel_sync::EnvelopeKind::FullState]
    );
}
