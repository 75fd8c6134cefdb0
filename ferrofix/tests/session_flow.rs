//! End-to-end session flows: two real engines talking to each other,
//! either directly (frames handed across in-process) or over a duplex
//! transport with full runners.

use async_trait::async_trait;
use bytes::BytesMut;
use ferrofix::prelude::*;
use ferrofix::session::RejectReason;
use std::sync::Arc;
use std::sync::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;
use tokio::sync::Notify;

#[derive(Default)]
struct RecordingApp {
    logons: AtomicUsize,
    app_seqs: Mutex<Vec<u64>>,
    logged_on: Notify,
}

#[async_trait]
impl Application for RecordingApp {
    async fn on_logon(&self, _session_id: &SessionId) {
        self.logons.fetch_add(1, Ordering::SeqCst);
        self.logged_on.notify_one();
    }

    async fn on_app_message(
        &self,
        _session_id: &SessionId,
        message: &OwnedMessage,
    ) -> Result<(), RejectReason> {
        self.app_seqs
            .lock()
            .expect("lock")
            .push(message.msg_seq_num().unwrap_or(0));
        Ok(())
    }
}

fn config(sender: &str, target: &str) -> SessionConfig {
    SessionConfig::builder(SessionId::new(
        CompId::new(sender).expect("comp id"),
        CompId::new(target).expect("comp id"),
    ))
    .heartbeat_interval_secs(30)
    .build()
}

async fn session_pair() -> (Session, Session, Arc<RecordingApp>, Arc<RecordingApp>) {
    let app_a = Arc::new(RecordingApp::default());
    let app_b = Arc::new(RecordingApp::default());
    let a = EngineBuilder::new(config("BUY", "SELL"))
        .application(app_a.clone())
        .build()
        .await
        .expect("session a");
    let b = EngineBuilder::new(config("SELL", "BUY"))
        .application(app_b.clone())
        .build()
        .await
        .expect("session b");
    (a, b, app_a, app_b)
}

/// Hands frames back and forth until neither side has anything to say.
async fn settle(a: &mut Session, b: &mut Session, first_from_a: Vec<BytesMut>) {
    let mut to_b = first_from_a;
    loop {
        let mut to_a = Vec::new();
        for frame in to_b.drain(..) {
            to_a.extend(b.on_message(&frame).await.expect("b on_message"));
        }
        if to_a.is_empty() {
            break;
        }
        for frame in to_a.drain(..) {
            to_b.extend(a.on_message(&frame).await.expect("a on_message"));
        }
        if to_b.is_empty() {
            break;
        }
    }
}

async fn logged_on_pair() -> (Session, Session, Arc<RecordingApp>, Arc<RecordingApp>) {
    let (mut a, mut b, app_a, app_b) = session_pair().await;
    b.accept().expect("accept");
    let logon = a.initiate().await.expect("initiate");
    settle(&mut a, &mut b, logon).await;
    assert_eq!(a.state(), SessionState::Active);
    assert_eq!(b.state(), SessionState::Active);
    (a, b, app_a, app_b)
}

#[tokio::test]
async fn logon_handshake_completes_both_sides() {
    let (_, _, app_a, app_b) = logged_on_pair().await;
    assert_eq!(app_a.logons.load(Ordering::SeqCst), 1);
    assert_eq!(app_b.logons.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn app_messages_arrive_in_order() {
    let (mut a, mut b, _, app_b) = logged_on_pair().await;

    for i in 1..=3u64 {
        let frame = a
            .send_app(&MsgType::NewOrderSingle, |enc| {
                enc.put_uint(11, i);
            })
            .await
            .expect("send");
        let responses = b.on_message(&frame).await.expect("deliver");
        assert!(responses.is_empty());
    }

    assert_eq!(*app_b.app_seqs.lock().expect("lock"), vec![2, 3, 4]);
    assert_eq!(b.expected_inbound_seq(), 5);
}

#[tokio::test]
async fn gap_is_recovered_by_resend() {
    let (mut a, mut b, _, app_b) = logged_on_pair().await;

    let mut orders = Vec::new();
    for i in 1..=3u64 {
        orders.push(
            a.send_app(&MsgType::NewOrderSingle, |enc| {
                enc.put_uint(11, i);
            })
            .await
            .expect("send"),
        );
    }

    // Orders carry sequence numbers 2, 3, 4; only the last one arrives.
    let resend_req = b.on_message(&orders[2]).await.expect("gapped delivery");
    assert_eq!(resend_req.len(), 1);
    assert_eq!(b.state(), SessionState::ResendPending { begin: 2, end: 3 });

    let replays = a.on_message(&resend_req[0]).await.expect("serve resend");
    assert_eq!(replays.len(), 2);

    for frame in &replays {
        let responses = b.on_message(frame).await.expect("replay delivery");
        assert!(responses.is_empty());
    }

    assert_eq!(b.state(), SessionState::Active);
    assert_eq!(b.expected_inbound_seq(), 5);
    // All three orders applied exactly once, in sequence order.
    assert_eq!(*app_b.app_seqs.lock().expect("lock"), vec![2, 3, 4]);
}

#[tokio::test]
async fn graceful_logout_ends_both_sides() {
    let (mut a, mut b, _, _) = logged_on_pair().await;

    let logout = a.request_logout(Some("end of day")).await.expect("logout");
    settle(&mut a, &mut b, logout).await;

    assert_eq!(a.state(), SessionState::Disconnected);
    assert_eq!(b.state(), SessionState::Disconnected);
    assert_eq!(a.disconnect_reason(), Some(&DisconnectReason::LocalLogout));
    assert_eq!(b.disconnect_reason(), Some(&DisconnectReason::PeerLogout));
}

#[tokio::test]
async fn file_store_counters_survive_restart() {
    let dir = tempfile::tempdir().expect("tempdir");

    {
        let mut a = EngineBuilder::new(config("BUY", "SELL"))
            .store(Arc::new(FileStore::new(dir.path())))
            .build()
            .await
            .expect("session a");
        let mut b = EngineBuilder::new(config("SELL", "BUY"))
            .build()
            .await
            .expect("session b");
        b.accept().expect("accept");
        let logon = a.initiate().await.expect("initiate");
        settle(&mut a, &mut b, logon).await;

        for i in 1..=2u64 {
            let frame = a
                .send_app(&MsgType::NewOrderSingle, |enc| {
                    enc.put_uint(11, i);
                })
                .await
                .expect("send");
            b.on_message(&frame).await.expect("deliver");
        }
        a.on_connection_lost("simulated crash").await;
        a.close().await.expect("close");
    }

    let a = EngineBuilder::new(config("BUY", "SELL"))
        .store(Arc::new(FileStore::new(dir.path())))
        .build()
        .await
        .expect("reopened session");
    // Logon consumed 1, two orders consumed 2 and 3.
    assert_eq!(a.next_outbound_seq(), 4);
    assert_eq!(a.expected_inbound_seq(), 2);
}

#[tokio::test]
async fn reset_on_logon_starts_numbering_over() {
    let store = Arc::new(MemoryStore::new());
    {
        let mut a = EngineBuilder::new(config("BUY", "SELL"))
            .store(store.clone())
            .build()
            .await
            .expect("session a");
        let mut b = EngineBuilder::new(config("SELL", "BUY"))
            .build()
            .await
            .expect("session b");
        b.accept().expect("accept");
        let logon = a.initiate().await.expect("initiate");
        settle(&mut a, &mut b, logon).await;
        a.send_app(&MsgType::NewOrderSingle, |enc| {
            enc.put_uint(11, 1);
        })
        .await
        .expect("send");
        a.on_connection_lost("reconnect test").await;
    }
    assert!(store.next_sender_seq() > 1);

    let reset_config = SessionConfig::builder(SessionId::new(
        CompId::new("BUY").expect("comp id"),
        CompId::new("SELL").expect("comp id"),
    ))
    .reset_on_logon(true)
    .build();
    let mut a = EngineBuilder::new(reset_config)
        .store(store.clone())
        .build()
        .await
        .expect("reset session");

    assert_eq!(store.record_count(), 0);
    assert_eq!(a.next_outbound_seq(), 1);

    let logon = a.initiate().await.expect("initiate");
    let msg = ferrofix::tagvalue::Decoder::new(&logon[0])
        .decode()
        .expect("decode logon");
    assert_eq!(msg.get_field_str(141), Some("Y"));
    assert_eq!(msg.msg_seq_num().expect("seq"), 1);
}

#[tokio::test]
async fn runners_complete_full_session_over_duplex_transport() {
    let (chan_a, chan_b) = MemoryChannel::pair(64 * 1024);
    let app_a = Arc::new(RecordingApp::default());
    let app_b = Arc::new(RecordingApp::default());

    let (runner_a, handle_a) = EngineBuilder::new(config("BUY", "SELL"))
        .application(app_a.clone())
        .connect(chan_a, SessionRole::Initiator)
        .await
        .expect("runner a");
    let (runner_b, _handle_b) = EngineBuilder::new(config("SELL", "BUY"))
        .application(app_b.clone())
        .connect(chan_b, SessionRole::Acceptor)
        .await
        .expect("runner b");

    let task_a = tokio::spawn(runner_a.with_tick_interval(Duration::from_millis(20)).run());
    let task_b = tokio::spawn(runner_b.with_tick_interval(Duration::from_millis(20)).run());

    tokio::time::timeout(Duration::from_secs(5), app_a.logged_on.notified())
        .await
        .expect("logon");

    handle_a
        .send(MsgType::NewOrderSingle, vec![(11, b"ORDER-1".to_vec())])
        .await
        .expect("send order");
    handle_a.logout(None).await.expect("request logout");

    let reason_a = tokio::time::timeout(Duration::from_secs(5), task_a)
        .await
        .expect("a finished")
        .expect("a join")
        .expect("a result");
    let reason_b = tokio::time::timeout(Duration::from_secs(5), task_b)
        .await
        .expect("b finished")
        .expect("b join")
        .expect("b result");

    assert_eq!(reason_a, DisconnectReason::LocalLogout);
    assert_eq!(reason_b, DisconnectReason::PeerLogout);
    assert_eq!(*app_b.app_seqs.lock().expect("lock"), vec![2]);
}
