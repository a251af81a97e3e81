use super::*;
use crate::net::credentials::{CredentialError, StaticCredential};
use async_trait::async_trait;
use serde_json::json;
use std::time::Duration;
use tokio::net::TcpListener;
use tokio::sync::oneshot;
use tokio_tungstenite::tungstenite::handshake::server::{ErrorResponse, Request as ServerRequest, Response};
use tokio_tungstenite::tungstenite::http::StatusCode;

struct FailingCredential;

#[async_trait]
impl CredentialProvider for FailingCredential {
    async fn token(&self) -> Result<String, CredentialError> {
        Err(CredentialError::Provider("refresh failed".to_owned()))
    }
}

async fn listen() -> (TcpListener, ClientConfig) {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let config = ClientConfig::new(&format!("http://{addr}")).unwrap();
    (listener, config)
}

fn token(value: &str) -> Arc<dyn CredentialProvider> {
    Arc::new(StaticCredential::new(value))
}

async fn next_event(rx: &mut mpsc::UnboundedReceiver<ChannelEvent>) -> Option<ChannelEvent> {
    tokio::time::timeout(Duration::from_secs(5), rx.recv()).await.expect("channel event timed out")
}

#[tokio::test]
async fn delivers_envelopes_and_opaque_frames_then_reports_close() {
    let (listener, config) = listen().await;
    tokio::spawn(async move {
        let (tcp, _) = listener.accept().await.unwrap();
        let mut ws = tokio_tungstenite::accept_async(tcp).await.unwrap();
        let envelope = json!({ "type": "notify", "event": "agent.thoughts", "payload": { "content": "hmm" } });
        ws.send(WsMessage::Text(envelope.to_string().into())).await.unwrap();
        ws.send(WsMessage::Text("not json".into())).await.unwrap();
        ws.close(None).await.unwrap();
    });

    let (_channel, mut rx) = EventChannel::open(&config, "c1", token("t"));

    assert_eq!(next_event(&mut rx).await, Some(ChannelEvent::Connected));
    assert_eq!(
        next_event(&mut rx).await,
        Some(ChannelEvent::Envelope(Envelope::new("agent.thoughts", json!({ "content": "hmm" }))))
    );
    assert_eq!(next_event(&mut rx).await, Some(ChannelEvent::Opaque("not json".to_owned())));
    assert_eq!(next_event(&mut rx).await, Some(ChannelEvent::Disconnected(DisconnectReason::Closed)));
    assert_eq!(next_event(&mut rx).await, None);
}

#[tokio::test]
async fn query_auth_puts_token_on_the_url() {
    let (listener, config) = listen().await;
    let (uri_tx, uri_rx) = oneshot::channel();
    tokio::spawn(async move {
        let (tcp, _) = listener.accept().await.unwrap();
        let callback = |request: &ServerRequest, response: Response| {
            let _ = uri_tx.send(request.uri().to_string());
            Ok::<_, ErrorResponse>(response)
        };
        let _ws = tokio_tungstenite::accept_hdr_async(tcp, callback).await.unwrap();
        tokio::time::sleep(Duration::from_millis(200)).await;
    });

    let (_channel, mut rx) = EventChannel::open(&config, "c1", token("abc"));
    assert_eq!(next_event(&mut rx).await, Some(ChannelEvent::Connected));
    assert_eq!(uri_rx.await.unwrap(), "/ws/conversations/c1/?token=abc");
}

#[tokio::test]
async fn header_auth_sends_bearer_token() {
    let (listener, mut config) = listen().await;
    config.ws_auth = WsAuthMethod::Header;
    let (header_tx, header_rx) = oneshot::channel();
    tokio::spawn(async move {
        let (tcp, _) = listener.accept().await.unwrap();
        let callback = |request: &ServerRequest, response: Response| {
            let header = request
                .headers()
                .get("authorization")
                .and_then(|v| v.to_str().ok())
                .map(str::to_owned);
            let _ = header_tx.send((request.uri().to_string(), header));
            Ok::<_, ErrorResponse>(response)
        };
        let _ws = tokio_tungstenite::accept_hdr_async(tcp, callback).await.unwrap();
        tokio::time::sleep(Duration::from_millis(200)).await;
    });

    let (_channel, mut rx) = EventChannel::open(&config, "c1", token("abc"));
    assert_eq!(next_event(&mut rx).await, Some(ChannelEvent::Connected));
    let (uri, header) = header_rx.await.unwrap();
    assert_eq!(uri, "/ws/conversations/c1/");
    assert_eq!(header.as_deref(), Some("Bearer abc"));
}

#[tokio::test]
async fn rejected_handshake_is_an_auth_failure() {
    let (listener, config) = listen().await;
    tokio::spawn(async move {
        let (tcp, _) = listener.accept().await.unwrap();
        let callback = |_: &ServerRequest, _: Response| {
            let mut rejection = ErrorResponse::new(Some("invalid token".to_owned()));
            *rejection.status_mut() = StatusCode::UNAUTHORIZED;
            Err::<Response, _>(rejection)
        };
        let _ = tokio_tungstenite::accept_hdr_async(tcp, callback).await;
    });

    let (_channel, mut rx) = EventChannel::open(&config, "c1", token("stale"));
    match next_event(&mut rx).await {
        Some(ChannelEvent::Disconnected(reason)) => assert!(reason.is_auth(), "{reason}"),
        other => panic!("expected auth disconnect, got {other:?}"),
    }
}

#[tokio::test]
async fn credential_failure_is_an_auth_failure() {
    let (_listener, config) = listen().await;
    let (channel, mut rx) = EventChannel::open(&config, "c1", Arc::new(FailingCredential));
    assert!(!channel.send(&json!({ "ping": true })));
    match next_event(&mut rx).await {
        Some(ChannelEvent::Disconnected(DisconnectReason::Auth(detail))) => assert!(detail.contains("refresh failed")),
        other => panic!("expected auth disconnect, got {other:?}"),
    }
    assert!(!channel.is_connected());
}

#[tokio::test]
async fn refused_connection_is_a_transport_failure() {
    let (listener, config) = listen().await;
    drop(listener);

    let (_channel, mut rx) = EventChannel::open(&config, "c1", token("t"));
    assert!(matches!(
        next_event(&mut rx).await,
        Some(ChannelEvent::Disconnected(DisconnectReason::Transport(_)))
    ));
}

#[tokio::test]
async fn close_before_connect_emits_nothing() {
    let (listener, config) = listen().await;
    tokio::spawn(async move {
        if let Ok((tcp, _)) = listener.accept().await {
            let _ = tokio_tungstenite::accept_async(tcp).await;
            tokio::time::sleep(Duration::from_millis(200)).await;
        }
    });

    let (channel, mut rx) = EventChannel::open(&config, "c1", token("t"));
    channel.close();
    channel.close();

    assert!(channel.is_closed());
    assert!(!channel.send(&json!({ "ping": true })));
    assert_eq!(next_event(&mut rx).await, None);
}

#[tokio::test]
async fn close_after_connect_stops_delivery() {
    let (listener, config) = listen().await;
    tokio::spawn(async move {
        let (tcp, _) = listener.accept().await.unwrap();
        let mut ws = tokio_tungstenite::accept_async(tcp).await.unwrap();
        for n in 0..50 {
            let frame = json!({ "event": "agent.step", "payload": { "n": n } });
            if ws.send(WsMessage::Text(frame.to_string().into())).await.is_err() {
                break;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    });

    let (channel, mut rx) = EventChannel::open(&config, "c1", token("t"));
    assert_eq!(next_event(&mut rx).await, Some(ChannelEvent::Connected));
    channel.close();

    // Whatever was queued before close may still drain; after that, nothing.
    while let Some(event) = next_event(&mut rx).await {
        assert!(matches!(event, ChannelEvent::Envelope(_)), "unexpected {event:?}");
    }
}

#[tokio::test]
async fn send_writes_outbound_frames() {
    let (listener, config) = listen().await;
    let (frame_tx, frame_rx) = oneshot::channel();
    tokio::spawn(async move {
        let (tcp, _) = listener.accept().await.unwrap();
        let mut ws = tokio_tungstenite::accept_async(tcp).await.unwrap();
        if let Some(Ok(WsMessage::Text(text))) = ws.next().await {
            let _ = frame_tx.send(text.to_string());
        }
    });

    let (channel, mut rx) = EventChannel::open(&config, "c1", token("t"));
    assert_eq!(next_event(&mut rx).await, Some(ChannelEvent::Connected));
    assert!(channel.send(&json!({ "action": "ping" })));

    let sent = tokio::time::timeout(Duration::from_secs(5), frame_rx).await.unwrap().unwrap();
    assert_eq!(serde_json::from_str::<Value>(&sent).unwrap(), json!({ "action": "ping" }));
}
