//! RPC client tests against an in-process WebSocket node

use dev_automine::config::AutomineConfig;
use dev_automine::control::Controller;
use dev_automine::ledger::{
    EventKind, EventSource, LedgerError, MiningService, Notification, RpcClient, RpcError, TxPool,
};
use futures::{SinkExt, StreamExt};
use serde_json::{json, Value};
use std::num::NonZeroU32;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;
use tokio::net::TcpListener;
use tokio::sync::mpsc;
use tokio_tungstenite::accept_async;
use tokio_tungstenite::tungstenite::Message;

/// Reply that makes the fake node close the socket
const CLOSE: Value = Value::Null;

fn result(id: u64, value: Value) -> Value {
    json!({ "jsonrpc": "2.0", "id": id, "result": value })
}

fn notice(subscription: &str, value: Value) -> Value {
    json!({
        "jsonrpc": "2.0",
        "method": "eth_subscription",
        "params": { "subscription": subscription, "result": value }
    })
}

/// Serve one connection, answering each request with `handler`'s replies.
/// Every received (method, params) pair is forwarded to the returned channel.
async fn spawn_node<H>(handler: H) -> (String, mpsc::UnboundedReceiver<(String, Value)>)
where
    H: Fn(u64, &str, &Value) -> Vec<Value> + Send + 'static,
{
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let (seen_tx, seen_rx) = mpsc::unbounded_channel();

    tokio::spawn(async move {
        let (stream, _) = listener.accept().await.unwrap();
        let mut ws = accept_async(stream).await.unwrap();

        while let Some(Ok(msg)) = ws.next().await {
            let Message::Text(text) = msg else {
                continue;
            };
            let request: Value = serde_json::from_str(text.as_str()).unwrap();
            let id = request["id"].as_u64().unwrap();
            let method = request["method"].as_str().unwrap().to_string();
            let params = request["params"].clone();
            let _ = seen_tx.send((method.clone(), params.clone()));

            for reply in handler(id, &method, &params) {
                if reply == CLOSE {
                    let _ = ws.close(None).await;
                    return;
                }
                if ws.send(Message::Text(reply.to_string().into())).await.is_err() {
                    return;
                }
            }
        }
    });

    (format!("ws://{}", addr), seen_rx)
}

fn config(endpoint: String, timeout_ms: u64) -> AutomineConfig {
    AutomineConfig {
        endpoint,
        request_timeout_ms: timeout_ms,
        ..Default::default()
    }
}

#[tokio::test]
async fn test_reads_pool_and_miner() {
    let (endpoint, _seen) = spawn_node(|id, method, _| match method {
        "eth_pendingTransactions" => vec![result(id, json!([{ "hash": "0x1" }, { "hash": "0x2" }]))],
        "eth_mining" => vec![result(id, json!(false))],
        _ => vec![],
    })
    .await;
    let client = RpcClient::connect(&config(endpoint, 2_000)).await.unwrap();

    assert_eq!(client.pending_count().await.unwrap(), 2);
    assert!(!client.is_mining().await.unwrap());
}

#[tokio::test]
async fn test_miner_commands_on_the_wire() {
    let (endpoint, mut seen) = spawn_node(|id, _, _| vec![result(id, Value::Null)]).await;
    let client = RpcClient::connect(&config(endpoint, 2_000)).await.unwrap();

    client.start_mining(NonZeroU32::new(4).unwrap()).await.unwrap();
    client.stop_mining().await.unwrap();

    assert_eq!(seen.recv().await.unwrap(), ("miner_start".to_string(), json!([4])));
    assert_eq!(seen.recv().await.unwrap(), ("miner_stop".to_string(), json!([])));
}

#[tokio::test]
async fn test_remote_error() {
    let (endpoint, _seen) = spawn_node(|id, method, _| {
        vec![json!({
            "jsonrpc": "2.0",
            "id": id,
            "error": { "code": -32601, "message": format!("the method {} does not exist/is not available", method) }
        })]
    })
    .await;
    let client = RpcClient::connect(&config(endpoint, 2_000)).await.unwrap();

    match client.start_mining(NonZeroU32::MIN).await {
        Err(LedgerError::Rpc(RpcError::Remote { code, message })) => {
            assert_eq!(code, -32601);
            assert!(message.contains("miner_start"));
        }
        other => panic!("Expected remote error, got {:?}", other),
    }
}

#[tokio::test]
async fn test_request_timeout() {
    let (endpoint, _seen) = spawn_node(|_, _, _| vec![]).await;
    let client = RpcClient::connect(&config(endpoint, 100)).await.unwrap();

    assert!(matches!(
        client.is_mining().await,
        Err(LedgerError::Rpc(RpcError::Timeout { .. }))
    ));
}

#[tokio::test]
async fn test_subscription_delivers_immediate_notice() {
    // The node pushes a header right behind the subscription id
    let (endpoint, mut seen) = spawn_node(|id, method, _| match method {
        "eth_subscribe" => vec![
            result(id, json!("0xsub1")),
            notice("0xsub1", json!({ "number": "0x2", "hash": "0xhead" })),
        ],
        _ => vec![],
    })
    .await;
    let client = RpcClient::connect(&config(endpoint, 2_000)).await.unwrap();

    let (sink, mut events) = mpsc::channel(8);
    client.subscribe(EventKind::LatestBlock, sink).await.unwrap();

    assert_eq!(
        seen.recv().await.unwrap(),
        ("eth_subscribe".to_string(), json!(["newHeads"]))
    );
    let event = tokio::time::timeout(Duration::from_secs(5), events.recv())
        .await
        .unwrap()
        .unwrap();
    assert_eq!(event, Notification::new(EventKind::LatestBlock, "0xhead"));
    assert_eq!(client.subscription_count().await, 1);
}

#[tokio::test]
async fn test_bad_subscription_id() {
    let (endpoint, _seen) = spawn_node(|id, _, _| vec![result(id, json!(42))]).await;
    let client = RpcClient::connect(&config(endpoint, 2_000)).await.unwrap();

    let (sink, _events) = mpsc::channel(8);
    assert!(matches!(
        client.subscribe(EventKind::PendingTransaction, sink).await,
        Err(LedgerError::Rpc(RpcError::InvalidSubscription(_)))
    ));
    assert_eq!(client.subscription_count().await, 0);
}

#[tokio::test]
async fn test_close_fails_requests_and_ends_subscriptions() {
    let (endpoint, _seen) = spawn_node(|id, method, _| match method {
        "eth_subscribe" => vec![result(id, json!("0xsub2"))],
        _ => vec![CLOSE],
    })
    .await;
    let client = RpcClient::connect(&config(endpoint, 2_000)).await.unwrap();

    let (sink, mut events) = mpsc::channel(8);
    client
        .subscribe(EventKind::PendingTransaction, sink)
        .await
        .unwrap();

    assert!(matches!(
        client.is_mining().await,
        Err(LedgerError::Rpc(RpcError::ConnectionClosed))
    ));

    // Later requests fail fast instead of waiting out the timeout
    let second = tokio::time::timeout(Duration::from_millis(500), client.pending_count())
        .await
        .expect("request after close should not wait for the timeout");
    assert!(matches!(
        second,
        Err(LedgerError::Rpc(RpcError::ConnectionClosed))
    ));

    let closed = tokio::time::timeout(Duration::from_secs(5), events.recv())
        .await
        .unwrap();
    assert!(closed.is_none());
}

#[tokio::test]
async fn test_controller_starts_miner_over_rpc() {
    let (endpoint, mut seen) = spawn_node(|id, method, params| match method {
        "eth_subscribe" => {
            let topic = params[0].as_str().unwrap_or_default();
            vec![result(id, json!(format!("0x{}", topic)))]
        }
        "eth_pendingTransactions" => vec![result(id, json!([{ "hash": "0x1" }]))],
        "eth_mining" => vec![result(id, json!(false))],
        _ => vec![result(id, Value::Null)],
    })
    .await;
    let config = config(endpoint, 2_000);
    let client = RpcClient::connect(&config).await.unwrap();

    let (stop_tx, stop_rx) = tokio::sync::oneshot::channel::<()>();
    let handle = tokio::spawn(Controller::new(client, &config).run(async move {
        let _ = stop_rx.await;
    }));

    let mut methods = Vec::new();
    while methods.last().map(String::as_str) != Some("miner_start") {
        let (method, params) = tokio::time::timeout(Duration::from_secs(5), seen.recv())
            .await
            .unwrap()
            .unwrap();
        if method == "miner_start" {
            assert_eq!(params, json!([1]));
        }
        methods.push(method);
    }

    stop_tx.send(()).unwrap();
    handle.await.unwrap().unwrap();

    assert_eq!(
        methods,
        vec![
            "eth_subscribe",
            "eth_subscribe",
            "eth_pendingTransactions",
            "eth_mining",
            "miner_start"
        ]
    );
}

#[tokio::test]
async fn test_slow_subscriber_does_not_block_responses() {
    // 300 pushes land ahead of the eth_mining answer
    let (endpoint, _seen) = spawn_node(|id, method, _| match method {
        "eth_subscribe" => vec![result(id, json!("0xsub3"))],
        "eth_mining" => {
            let mut replies: Vec<Value> = (0..300)
                .map(|n| notice("0xsub3", json!(format!("0x{:x}", n))))
                .collect();
            replies.push(result(id, json!(true)));
            replies
        }
        _ => vec![],
    })
    .await;
    let client = RpcClient::connect(&config(endpoint, 1_000)).await.unwrap();

    // Nobody drains this channel while the request is in flight
    let (sink, mut events) = mpsc::channel(1);
    client
        .subscribe(EventKind::PendingTransaction, sink)
        .await
        .unwrap();

    assert!(client.is_mining().await.unwrap());

    // Every push is still delivered, in order
    for n in 0..300 {
        let event = tokio::time::timeout(Duration::from_secs(5), events.recv())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(event.id, format!("0x{:x}", n));
    }
}

#[tokio::test]
async fn test_controller_survives_notice_burst() {
    let burst_sent = AtomicBool::new(false);
    let (endpoint, mut seen) = spawn_node(move |id, method, params| match method {
        "eth_subscribe" => {
            let topic = params[0].as_str().unwrap_or_default();
            vec![result(id, json!(format!("0x{}", topic)))]
        }
        "eth_pendingTransactions" => {
            let mut replies = Vec::new();
            if !burst_sent.swap(true, Ordering::SeqCst) {
                replies.extend(
                    (0..300).map(|n| notice("0xnewPendingTransactions", json!(format!("0x{:x}", n)))),
                );
            }
            replies.push(result(id, json!([{ "hash": "0x1" }])));
            replies
        }
        "eth_mining" => vec![result(id, json!(false))],
        _ => vec![result(id, Value::Null)],
    })
    .await;
    let config = config(endpoint, 1_000);
    let client = RpcClient::connect(&config).await.unwrap();

    let (stop_tx, stop_rx) = tokio::sync::oneshot::channel::<()>();
    let handle = tokio::spawn(Controller::new(client, &config).run(async move {
        let _ = stop_rx.await;
    }));

    loop {
        let (method, _) = tokio::time::timeout(Duration::from_secs(5), seen.recv())
            .await
            .expect("miner_start never sent")
            .unwrap();
        if method == "miner_start" {
            break;
        }
    }

    stop_tx.send(()).unwrap();
    tokio::time::timeout(Duration::from_secs(30), handle)
        .await
        .unwrap()
        .unwrap()
        .unwrap();
}
