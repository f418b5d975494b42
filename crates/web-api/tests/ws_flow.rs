//! WebSocket 网关链路测试：真实监听端口 + 进程内总线。

mod support;

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use futures_util::{SinkExt, StreamExt};
use serde_json::{json, Value};
use tokio::net::TcpListener;
use tokio::sync::oneshot;
use tokio::time::timeout;
use tokio_tungstenite::{
    connect_async, tungstenite::Message as TungsteniteMessage, MaybeTlsStream, WebSocketStream,
};
use web_api::JwtService;

type WsClient = WebSocketStream<MaybeTlsStream<tokio::net::TcpStream>>;

async fn serve(router: axum::Router) -> (SocketAddr, oneshot::Sender<()>) {
    let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind");
    let addr = listener.local_addr().expect("addr");
    let (shutdown_tx, shutdown_rx) = oneshot::channel::<()>();

    tokio::spawn(async move {
        axum::serve(listener, router.into_make_service())
            .with_graceful_shutdown(async {
                let _ = shutdown_rx.await;
            })
            .await
            .ok();
    });

    (addr, shutdown_tx)
}

async fn connect(addr: SocketAddr, jwt: &JwtService, uid: &str) -> WsClient {
    let token = jwt.generate_token(uid).expect("token");
    let (ws, _) = connect_async(format!("ws://{addr}/ws?token={token}"))
        .await
        .expect("ws connect");
    ws
}

async fn send_event(ws: &mut WsClient, event: Value) {
    ws.send(TungsteniteMessage::Text(event.to_string().into()))
        .await
        .expect("send frame");
}

async fn next_event(ws: &mut WsClient) -> Value {
    loop {
        let frame = timeout(Duration::from_secs(2), ws.next())
            .await
            .expect("frame within deadline")
            .expect("socket open")
            .expect("ws frame");
        match frame {
            TungsteniteMessage::Text(payload) => {
                return serde_json::from_str(&payload).expect("json frame")
            }
            TungsteniteMessage::Ping(_) | TungsteniteMessage::Pong(_) => continue,
            other => panic!("unexpected frame: {other:?}"),
        }
    }
}

async fn assert_silent(ws: &mut WsClient) {
    let outcome = timeout(Duration::from_millis(300), ws.next()).await;
    assert!(outcome.is_err(), "expected no frame, got {outcome:?}");
}

fn join(room: &str) -> Value {
    json!({"event": "joinRoom", "data": {"roomName": room}})
}

#[tokio::test]
async fn join_notice_and_messages_reach_all_room_members() {
    let (router, jwt) = support::build_router();
    let (addr, shutdown) = serve(router).await;

    let mut alice = connect(addr, &jwt, "u1").await;
    send_event(&mut alice, join("team1")).await;
    let notice = next_event(&mut alice).await;
    assert_eq!(notice["event"], "chatMessage");
    assert_eq!(notice["data"]["user"], "System");
    assert_eq!(notice["data"]["message"], "u1 has joined the room.");

    let mut bob = connect(addr, &jwt, "u2").await;
    send_event(&mut bob, join("team1")).await;
    let bob_notice = next_event(&mut bob).await;
    assert_eq!(bob_notice["data"]["message"], "u2 has joined the room.");
    let alice_sees = next_event(&mut alice).await;
    assert_eq!(alice_sees["data"]["message"], "u2 has joined the room.");

    send_event(
        &mut alice,
        json!({"event": "sendMessage", "data": {"uid": "u1", "message": "hello", "roomName": "team1"}}),
    )
    .await;

    for ws in [&mut alice, &mut bob] {
        let frame = next_event(ws).await;
        assert_eq!(frame["event"], "chatMessage");
        assert_eq!(frame["data"]["uid"], "u1");
        assert_eq!(frame["data"]["message"], "hello");
        assert_eq!(frame["data"]["roomName"], "team1");
        assert_eq!(frame["data"]["mediaType"], "none");
    }

    let _ = shutdown.send(());
}

#[tokio::test]
async fn messages_do_not_leak_into_other_rooms() {
    let (router, jwt) = support::build_router();
    let (addr, shutdown) = serve(router).await;

    let mut alice = connect(addr, &jwt, "u1").await;
    send_event(&mut alice, join("team1")).await;
    next_event(&mut alice).await; // 自己的加入通知

    let mut carol = connect(addr, &jwt, "u3").await;
    send_event(&mut carol, join("team2")).await;
    next_event(&mut carol).await;

    send_event(
        &mut alice,
        json!({"event": "sendMessage", "data": {"uid": "u1", "message": "team1 only", "roomName": "team1"}}),
    )
    .await;

    let frame = next_event(&mut alice).await;
    assert_eq!(frame["data"]["message"], "team1 only");
    assert_silent(&mut carol).await;

    let _ = shutdown.send(());
}

#[tokio::test]
async fn append_failure_reports_error_to_sender_only() {
    let (router, jwt) = support::build_app_with(Arc::new(support::FailingRepository));
    let (addr, shutdown) = serve(router).await;

    let mut alice = connect(addr, &jwt, "u1").await;
    send_event(&mut alice, join("team1")).await;
    next_event(&mut alice).await;

    let mut bob = connect(addr, &jwt, "u2").await;
    send_event(&mut bob, join("team1")).await;
    next_event(&mut bob).await;
    next_event(&mut alice).await; // bob 的加入通知

    send_event(
        &mut alice,
        json!({"event": "sendMessage", "data": {"uid": "u1", "message": "hello", "roomName": "team1"}}),
    )
    .await;

    let frame = next_event(&mut alice).await;
    assert_eq!(frame["event"], "error");
    let message = frame["data"]["message"].as_str().unwrap();
    assert!(message.contains("database offline"), "got: {message}");

    // 房间其他成员既没有 chatMessage 也没有 error
    assert_silent(&mut bob).await;

    let _ = shutdown.send(());
}

#[tokio::test]
async fn sending_as_another_user_yields_error_event() {
    let (router, jwt) = support::build_router();
    let (addr, shutdown) = serve(router).await;

    let mut alice = connect(addr, &jwt, "u1").await;
    send_event(&mut alice, join("team1")).await;
    next_event(&mut alice).await;

    send_event(
        &mut alice,
        json!({"event": "sendMessage", "data": {"uid": "u2", "message": "hi", "roomName": "team1"}}),
    )
    .await;

    let frame = next_event(&mut alice).await;
    assert_eq!(frame["event"], "error");
    assert_eq!(
        frame["data"]["message"],
        "uid does not match authenticated account"
    );

    let _ = shutdown.send(());
}

#[tokio::test]
async fn upgrade_requires_valid_token() {
    let (router, jwt) = support::build_router();
    let (addr, shutdown) = serve(router).await;

    assert!(connect_async(format!("ws://{addr}/ws")).await.is_err());
    assert!(connect_async(format!("ws://{addr}/ws?token=garbage"))
        .await
        .is_err());

    // 合法 token 正常升级
    let _ws = connect(addr, &jwt, "u1").await;

    let _ = shutdown.send(());
}
