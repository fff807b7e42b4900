//! Dispatcher and transport over WebSocket, against an in-memory peer.

mod common;

use std::net::{IpAddr, Ipv4Addr};
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::{Duration, Instant};

use anyhow::Result;
use driver_wire::protocol::names;
use driver_wire::transport::{Outbound, PendingServer, Transport};
use driver_wire::{Command, Dispatcher, ErrorKind, Event, TransportOptions};
use futures_util::future::join_all;
use futures_util::{SinkExt, StreamExt};
use proptest::prelude::*;
use serde_json::json;
use tokio::time::timeout;
use tokio_tungstenite::tungstenite::Message;

use common::{WsPeer, ws_pair, ws_transport};

async fn handshake(dispatcher: &Dispatcher, peer: &mut WsPeer) -> Result<()> {
    let (result, request) = tokio::join!(
        dispatcher.execute(Command::new(names::SESSION_NEW).with_param("capabilities", json!({}))),
        async {
            let request = peer.read_request().await?;
            peer.send(&json!({"id": request["id"], "result": {"sessionId": "bidi-1"}}))
                .await?;
            anyhow::Ok(request)
        }
    );
    result?;
    let request = request?;
    assert_eq!(request["method"], "session.new");
    assert!(request.get("sessionId").is_none());
    Ok(())
}

#[tokio::test]
async fn test_session_id_stamped_on_later_commands() -> Result<()> {
    let (dispatcher, mut peer) = ws_pair(TransportOptions::new()).await?;
    handshake(&dispatcher, &mut peer).await?;

    let command = dispatcher
        .command("browsingContext.navigate")
        .with_browsing_context("top")
        .with_param("url", json!("https://example.com"));
    let (result, request) = tokio::join!(dispatcher.execute(command), async {
        let request = peer.read_request().await?;
        peer.send(&json!({"id": request["id"], "result": {"navigation": "n-1"}}))
            .await?;
        anyhow::Ok(request)
    });

    assert_eq!(result?, json!({"navigation": "n-1"}));
    let request = request?;
    assert_eq!(request["sessionId"], "bidi-1");
    assert_eq!(request["params"]["context"], "top");
    assert!(request["id"].as_u64().is_some_and(|id| id >= 2));
    Ok(())
}

#[tokio::test]
async fn test_error_member_is_translated() -> Result<()> {
    let (dispatcher, mut peer) = ws_pair(TransportOptions::new()).await?;
    handshake(&dispatcher, &mut peer).await?;

    let (result, _) = tokio::join!(
        dispatcher.execute(dispatcher.command("browsingContext.activate")),
        async {
            let request = peer.read_request().await?;
            peer.send(&json!({
                "id": request["id"],
                "error": "no such frame",
                "message": "Frame with id 7 not found"
            }))
            .await?;
            anyhow::Ok(())
        }
    );

    let envelope = result.unwrap_err();
    assert_eq!(envelope.kind, ErrorKind::NoSuchFrame);
    assert_eq!(envelope.message, "Frame with id 7 not found");
    Ok(())
}

#[tokio::test]
async fn test_timeout_removes_pending_request() -> Result<()> {
    let (transport, mut peer) = ws_transport(100).await;
    let command = Command::new("script.evaluate");

    let deadline = Duration::from_millis(100);
    let started = Instant::now();
    let err = transport
        .send(Outbound::new(&command, "null"), deadline)
        .await
        .unwrap_err();
    let elapsed = started.elapsed();

    assert_eq!(err.kind(), ErrorKind::Timeout);
    assert!(elapsed >= deadline);
    assert!(elapsed < deadline + Duration::from_secs(1));
    assert_eq!(transport.pending_count(), 0);

    // A reply arriving after the deadline is discarded.
    let stale = peer.read_request().await?;
    peer.send(&json!({"id": stale["id"], "result": "late"})).await?;

    let (reply, _) = tokio::join!(
        transport.send(Outbound::new(&command, "null"), Duration::from_secs(5)),
        async {
            let request = peer.read_request().await?;
            assert_ne!(request["id"], stale["id"]);
            peer.send(&json!({"id": request["id"], "result": "fresh"})).await?;
            anyhow::Ok(())
        }
    );
    assert_eq!(reply?.into_value(), json!("fresh"));
    Ok(())
}

#[tokio::test]
async fn test_pending_ceiling() -> Result<()> {
    let (transport, _peer) = ws_transport(2).await;
    let transport = Arc::new(transport);
    let command = Command::new("script.evaluate");

    let blocked: Vec<_> = (0..2)
        .map(|_| {
            let transport = Arc::clone(&transport);
            let command = command.clone();
            tokio::spawn(async move {
                transport
                    .send(Outbound::new(&command, "null"), Duration::from_secs(5))
                    .await
            })
        })
        .collect();

    while transport.pending_count() < 2 {
        tokio::task::yield_now().await;
    }

    let err = transport
        .send(Outbound::new(&command, "null"), Duration::from_secs(5))
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::ProtocolViolation);

    transport.close().await?;
    for task in blocked {
        assert_eq!(task.await?.unwrap_err().kind(), ErrorKind::TransportClosed);
    }
    Ok(())
}

#[tokio::test]
async fn test_events_reach_subscribers() -> Result<()> {
    let (dispatcher, mut peer) = ws_pair(TransportOptions::new()).await?;

    let (_load, mut loads) = dispatcher.subscribe_stream("browsingContext.load")?;
    let everything = Arc::new(AtomicUsize::new(0));
    let counter = Arc::clone(&everything);
    let wildcard = dispatcher.subscribe(
        "*",
        Arc::new(move |_event: &Event| {
            counter.fetch_add(1, Ordering::SeqCst);
        }),
    )?;

    peer.send(&json!({"method": "log.entryAdded", "params": {"text": "hi"}}))
        .await?;
    peer.send(&json!({"method": "browsingContext.load", "params": {"context": "top"}}))
        .await?;

    let event = timeout(Duration::from_secs(5), loads.recv())
        .await?
        .expect("event");
    assert_eq!(event.method, "browsingContext.load");
    assert_eq!(event.get_string("context"), "top");
    assert_eq!(everything.load(Ordering::SeqCst), 2);

    assert!(dispatcher.unsubscribe(wildcard));
    assert!(!dispatcher.unsubscribe(wildcard));
    Ok(())
}

#[tokio::test]
async fn test_peer_close_invalidates_session() -> Result<()> {
    let (dispatcher, mut peer) = ws_pair(TransportOptions::new()).await?;
    handshake(&dispatcher, &mut peer).await?;

    let (result, _) = tokio::join!(dispatcher.execute(dispatcher.command("script.evaluate")), async {
        peer.read_request().await?;
        peer.close().await?;
        anyhow::Ok(())
    });

    assert_eq!(result.unwrap_err().kind, ErrorKind::TransportClosed);
    assert!(dispatcher.session().is_none());

    let replay = dispatcher
        .execute(Command::new("script.evaluate").with_session("bidi-1"))
        .await
        .unwrap_err();
    assert_eq!(replay.kind, ErrorKind::TransportClosed);
    Ok(())
}

#[tokio::test]
async fn test_extension_mode_round_trip() -> Result<()> {
    common::init_logging();
    let server = PendingServer::bind(IpAddr::V4(Ipv4Addr::LOCALHOST), 0).await?;
    let url = server.ws_url();

    let extension = tokio::spawn(async move {
        let (mut ws, _) = tokio_tungstenite::connect_async(url).await?;
        while let Some(Ok(message)) = ws.next().await {
            if let Message::Text(text) = message {
                let request: serde_json::Value = serde_json::from_str(&text)?;
                let reply = json!({"id": request["id"], "result": {"echo": request["method"]}});
                ws.send(Message::Text(reply.to_string().into())).await?;
            }
        }
        anyhow::Ok(())
    });

    let transport = server.accept(Duration::from_secs(5), 10).await?;
    let dispatcher = Dispatcher::builder().transport(transport).build().await?;

    let value = dispatcher
        .execute(Command::new(names::SESSION_NEW))
        .await?;
    assert_eq!(value, json!({"echo": "session.new"}));

    dispatcher.close().await?;
    timeout(Duration::from_secs(5), extension).await???;
    Ok(())
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(16))]

    #[test]
    fn prop_reverse_order_replies_pair_correctly(callers in 1usize..16) {
        let runtime = tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()
            .expect("runtime");

        runtime.block_on(async move {
            let (dispatcher, mut peer) = ws_pair(TransportOptions::new()).await.expect("pair");
            handshake(&dispatcher, &mut peer).await.expect("handshake");

            let calls = (0..callers).map(|tag| {
                let command = dispatcher.command("echo").with_param("tag", json!(tag));
                let dispatcher = dispatcher.clone();
                async move { (tag, dispatcher.execute(command).await) }
            });

            let peer_task = async {
                let mut requests = Vec::with_capacity(callers);
                for _ in 0..callers {
                    requests.push(peer.read_request().await.expect("request"));
                }
                for request in requests.iter().rev() {
                    peer.send(&json!({"id": request["id"], "result": request["params"]["tag"]}))
                        .await
                        .expect("reply");
                }
            };

            let (results, ()) = tokio::join!(join_all(calls), peer_task);
            for (tag, result) in results {
                assert_eq!(result.expect("reply"), json!(tag));
            }
        });
    }
}
