//! WebSocket JSON-RPC client
//!
//! One socket carries both request/response traffic and subscription pushes.
//! A writer task drains an outbound channel into the socket; a reader task
//! routes responses to waiting callers by request id and hands notices to a
//! per-subscription forwarder. The reader never waits on a subscriber, so a
//! slow consumer cannot hold back responses.

use crate::config::AutomineConfig;
use crate::ledger::event::{EventKind, Notification};
use crate::ledger::rpc::types::{
    Incoming, JsonRpcRequest, JsonRpcResponse, SubscriptionNotice, METHOD_MINER_START,
    METHOD_MINER_STOP, METHOD_MINING, METHOD_PENDING_TRANSACTIONS, METHOD_SUBSCRIBE,
    METHOD_SUBSCRIPTION,
};
use crate::ledger::{EventSource, LedgerError, MiningService, TxPool};
use futures::{SinkExt, StreamExt};
use log::{debug, info, trace, warn};
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::{json, Value};
use std::collections::HashMap;
use std::num::NonZeroU32;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::sync::{mpsc, oneshot, Mutex};
use tokio_tungstenite::connect_async;
use tokio_tungstenite::tungstenite::{self, Message};

/// Maximum number of queued outbound frames
const OUTBOUND_CAPACITY: usize = 64;

/// RPC client errors
#[derive(Error, Debug)]
pub enum RpcError {
    #[error("WebSocket error: {0}")]
    WebSocket(#[from] tungstenite::Error),
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
    #[error("Node returned error {code}: {message}")]
    Remote { code: i64, message: String },
    #[error("{method} timed out after {timeout_ms}ms")]
    Timeout { method: String, timeout_ms: u128 },
    #[error("Unexpected subscription id: {0}")]
    InvalidSubscription(Value),
    #[error("Connection closed")]
    ConnectionClosed,
}

type Reply = oneshot::Sender<Result<Value, RpcError>>;

/// A caller waiting on a response
enum Waiter {
    Call(Reply),
    /// `eth_subscribe` in flight; the sink is registered by the reader as soon
    /// as the subscription id arrives so no early notice is lost
    Subscribe {
        kind: EventKind,
        sink: mpsc::Sender<Notification>,
        reply: Reply,
    },
}

/// In-flight requests. `closed` is set by the reader under the same lock it
/// drains `pending` with, so no request can be registered after the drain.
#[derive(Default)]
struct Waiters {
    pending: HashMap<u64, Waiter>,
    closed: bool,
}

type WaiterMap = Arc<Mutex<Waiters>>;
/// Subscription id to the queue of its forwarder task
type SinkMap = Arc<Mutex<HashMap<String, mpsc::UnboundedSender<Value>>>>;

/// JSON-RPC client for a single node connection
#[derive(Clone)]
pub struct RpcClient {
    endpoint: String,
    outbound: mpsc::Sender<Message>,
    waiters: WaiterMap,
    sinks: SinkMap,
    next_id: Arc<AtomicU64>,
    timeout: Duration,
}

impl std::fmt::Debug for RpcClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RpcClient")
            .field("endpoint", &self.endpoint)
            .field("timeout", &self.timeout)
            .finish()
    }
}

impl RpcClient {
    /// Connect to the node at `config.endpoint`
    pub async fn connect(config: &AutomineConfig) -> Result<Self, RpcError> {
        let (stream, _) = connect_async(config.endpoint.as_str()).await?;
        info!("Connected to node at {}", config.endpoint);

        let (mut writer, mut reader) = stream.split();
        let (outbound, mut outbound_rx) = mpsc::channel::<Message>(OUTBOUND_CAPACITY);
        let waiters: WaiterMap = Arc::new(Mutex::new(Waiters::default()));
        let sinks: SinkMap = Arc::new(Mutex::new(HashMap::new()));

        // Writer: runs until every client handle is dropped or the socket fails
        tokio::spawn(async move {
            while let Some(msg) = outbound_rx.recv().await {
                if let Err(e) = writer.send(msg).await {
                    warn!("WebSocket write failed: {}", e);
                    break;
                }
            }
            let _ = writer.close().await;
        });

        // Reader: routes responses and notices until the socket closes
        let reader_waiters = waiters.clone();
        let reader_sinks = sinks.clone();
        let endpoint = config.endpoint.clone();
        tokio::spawn(async move {
            while let Some(frame) = reader.next().await {
                match frame {
                    Ok(Message::Text(text)) => {
                        dispatch(text.as_str(), &reader_waiters, &reader_sinks).await;
                    }
                    Ok(Message::Close(_)) => break,
                    Ok(_) => {}
                    Err(e) => {
                        warn!("WebSocket error: {}", e);
                        break;
                    }
                }
            }

            {
                let mut waiters = reader_waiters.lock().await;
                waiters.closed = true;
                for (_, waiter) in waiters.pending.drain() {
                    let reply = match waiter {
                        Waiter::Call(reply) => reply,
                        Waiter::Subscribe { reply, .. } => reply,
                    };
                    let _ = reply.send(Err(RpcError::ConnectionClosed));
                }
            }
            // Forwarders flush what they hold, then close their subscriber
            reader_sinks.lock().await.clear();

            info!("Connection to {} closed", endpoint);
        });

        Ok(Self {
            endpoint: config.endpoint.clone(),
            outbound,
            waiters,
            sinks,
            next_id: Arc::new(AtomicU64::new(1)),
            timeout: config.request_timeout(),
        })
    }

    /// Get the endpoint for logging
    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    /// Number of live subscriptions
    pub async fn subscription_count(&self) -> usize {
        self.sinks.lock().await.len()
    }

    /// Call `method` and decode its result
    pub async fn request<P, R>(&self, method: &str, params: P) -> Result<R, RpcError>
    where
        P: Serialize,
        R: DeserializeOwned,
    {
        let (reply, response) = oneshot::channel();
        let value = self.call(method, params, Waiter::Call(reply), response).await?;
        Ok(serde_json::from_value(value)?)
    }

    async fn call<P: Serialize>(
        &self,
        method: &str,
        params: P,
        waiter: Waiter,
        response: oneshot::Receiver<Result<Value, RpcError>>,
    ) -> Result<Value, RpcError> {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let text = serde_json::to_string(&JsonRpcRequest::new(id, method, params))?;

        {
            let mut waiters = self.waiters.lock().await;
            if waiters.closed {
                return Err(RpcError::ConnectionClosed);
            }
            waiters.pending.insert(id, waiter);
        }
        trace!("Sending JSON-RPC request: method={}, id={}", method, id);

        if self.outbound.send(Message::Text(text.into())).await.is_err() {
            self.waiters.lock().await.pending.remove(&id);
            return Err(RpcError::ConnectionClosed);
        }

        match tokio::time::timeout(self.timeout, response).await {
            Ok(Ok(result)) => result,
            Ok(Err(_)) => Err(RpcError::ConnectionClosed),
            Err(_) => {
                self.waiters.lock().await.pending.remove(&id);
                Err(RpcError::Timeout {
                    method: method.to_string(),
                    timeout_ms: self.timeout.as_millis(),
                })
            }
        }
    }
}

/// Route one incoming text frame
async fn dispatch(text: &str, waiters: &WaiterMap, sinks: &SinkMap) {
    trace!("Received JSON-RPC message: {}", text);

    match Incoming::parse(text) {
        Ok(Incoming::Response(response)) => complete(response, waiters, sinks).await,
        Ok(Incoming::Notice(notice)) => deliver(notice, sinks).await,
        Err(e) => warn!("Unparseable message from node: {}", e),
    }
}

async fn complete(response: JsonRpcResponse, waiters: &WaiterMap, sinks: &SinkMap) {
    let id = response.id;
    let Some(waiter) = waiters.lock().await.pending.remove(&id) else {
        debug!("Response for unknown request id {}", id);
        return;
    };

    let result = response.into_result().map_err(|e| RpcError::Remote {
        code: e.code,
        message: e.message,
    });

    match waiter {
        Waiter::Call(reply) => {
            let _ = reply.send(result);
        }
        Waiter::Subscribe { kind, sink, reply } => {
            if let Ok(Value::String(subscription)) = &result {
                debug!("Subscribed to {} as {}", kind, subscription);
                let queue = spawn_forwarder(kind, sink);
                sinks.lock().await.insert(subscription.clone(), queue);
            }
            let _ = reply.send(result);
        }
    }
}

async fn deliver(notice: SubscriptionNotice, sinks: &SinkMap) {
    if notice.method != METHOD_SUBSCRIPTION {
        debug!("Ignoring server message {}", notice.method);
        return;
    }

    let subscription = notice.params.subscription;
    let mut sinks = sinks.lock().await;
    let Some(queue) = sinks.get(&subscription) else {
        debug!("Notice for unknown subscription {}", subscription);
        return;
    };

    if queue.send(notice.params.result).is_err() {
        debug!("Subscriber for {} went away", subscription);
        sinks.remove(&subscription);
    }
}

/// Move payloads from the reader into `sink`, waiting on the subscriber as
/// needed. Ends when the reader drops the queue or the subscriber goes away.
fn spawn_forwarder(
    kind: EventKind,
    sink: mpsc::Sender<Notification>,
) -> mpsc::UnboundedSender<Value> {
    let (queue, mut payloads) = mpsc::unbounded_channel::<Value>();
    tokio::spawn(async move {
        while let Some(payload) = payloads.recv().await {
            if sink.send(Notification::from_payload(kind, &payload)).await.is_err() {
                break;
            }
        }
    });
    queue
}

impl TxPool for RpcClient {
    async fn pending_count(&self) -> Result<usize, LedgerError> {
        let pending: Vec<Value> = self.request(METHOD_PENDING_TRANSACTIONS, json!([])).await?;
        Ok(pending.len())
    }
}

impl MiningService for RpcClient {
    async fn is_mining(&self) -> Result<bool, LedgerError> {
        Ok(self.request(METHOD_MINING, json!([])).await?)
    }

    async fn start_mining(&self, threads: NonZeroU32) -> Result<(), LedgerError> {
        let _: Value = self.request(METHOD_MINER_START, json!([threads.get()])).await?;
        Ok(())
    }

    async fn stop_mining(&self) -> Result<(), LedgerError> {
        let _: Value = self.request(METHOD_MINER_STOP, json!([])).await?;
        Ok(())
    }
}

impl EventSource for RpcClient {
    async fn subscribe(
        &self,
        kind: EventKind,
        sink: mpsc::Sender<Notification>,
    ) -> Result<(), LedgerError> {
        let (reply, response) = oneshot::channel();
        let waiter = Waiter::Subscribe { kind, sink, reply };
        let params = json!([kind.subscription_topic()]);

        match self.call(METHOD_SUBSCRIBE, params, waiter, response).await? {
            Value::String(_) => Ok(()),
            other => Err(RpcError::InvalidSubscription(other).into()),
        }
    }
}
