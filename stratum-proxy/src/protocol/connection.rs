use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use serde_json::Value;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::TcpStream;
use tokio::sync::Mutex;
use tokio::time::timeout;

use crate::config::{IDLE_TIMEOUT_SECS, MAX_LINE_BYTES, SUBMIT_STALE_SECS};
use crate::control_client::ControlClient;
use crate::errors::ProxyError;
use crate::hashrate::{unix_now, HashrateRegistry};
use crate::session::{SessionHandle, SessionStore};

use super::dialect::{self, Dialect};
use super::handshake::{self, Established};
use super::message::RpcMessage;

struct PendingSubmit {
    difficulty: f64,
    submitted_at: f64,
}

struct Shared {
    pending_submits: Mutex<HashMap<String, PendingSubmit>>,
    difficulty: Mutex<f64>,
}

/// Drives one miner connection end to end: handshake, bidirectional
/// streaming, and the single terminal `disconnect` callback (§4.4, §5).
pub async fn handle(
    miner_stream: TcpStream,
    peer_ip: String,
    control: ControlClient,
    sessions: SessionStore,
    hashrate: HashrateRegistry,
) {
    let (miner_read, mut miner_write) = miner_stream.into_split();
    let mut miner_read = BufReader::new(miner_read);

    let established = match handshake::perform(&mut miner_read, &mut miner_write, &control).await {
        Ok(est) => est,
        Err(e) => {
            tracing::warn!(peer_ip, error = %e, "handshake failed");
            return;
        }
    };

    let Established {
        dialect,
        worker_id,
        user_agent,
        order,
        pool_stream,
    } = established;

    let handle = SessionHandle::from_order(worker_id.clone(), order.clone(), peer_ip.clone());
    sessions.insert(handle);
    hashrate.register(&worker_id, order.ordered_hashrate);

    tokio::spawn({
        let control = control.clone();
        let worker_id = worker_id.clone();
        let peer_ip = peer_ip.clone();
        let user_agent = user_agent.clone();
        async move {
            control.connect(&worker_id, &peer_ip, &user_agent).await;
        }
    });

    let (pool_read, pool_write) = pool_stream.into_split();
    let pool_read = BufReader::new(pool_read);

    let shared = Arc::new(Shared {
        pending_submits: Mutex::new(HashMap::new()),
        difficulty: Mutex::new(1.0),
    });

    let pool_wallet = order.pool_wallet.clone();
    let pool_worker = order.pool_worker.clone();
    let pool_password = order.pool_password.clone();

    let m2p = tokio::spawn(miner_to_pool(
        miner_read,
        pool_write,
        shared.clone(),
        dialect,
        pool_wallet,
        pool_worker,
        pool_password,
    ));
    let p2m = tokio::spawn(pool_to_miner(
        pool_read,
        miner_write,
        shared.clone(),
        dialect,
        control.clone(),
        sessions.clone(),
        hashrate.clone(),
        worker_id.clone(),
    ));
    let sweep = tokio::spawn(stale_sweep(shared.clone(), control.clone(), worker_id.clone()));

    // Either half finishing (EOF, error, idle timeout) ends the session;
    // the other half and the sweep task are cancelled on drop.
    tokio::select! {
        _ = m2p => {}
        _ = p2m => {}
    }
    sweep.abort();

    sessions.remove(&worker_id);
    hashrate.unregister(&worker_id);
    control.disconnect(&worker_id, "session closed").await;
}

async fn miner_to_pool(
    mut reader: BufReader<tokio::net::tcp::OwnedReadHalf>,
    mut writer: tokio::net::tcp::OwnedWriteHalf,
    shared: Arc<Shared>,
    dialect: Dialect,
    pool_wallet: String,
    pool_worker: String,
    pool_password: String,
) -> Result<(), ProxyError> {
    let idle = Duration::from_secs(IDLE_TIMEOUT_SECS);
    loop {
        let mut line = String::new();
        let read = timeout(idle, reader.read_line(&mut line))
            .await
            .map_err(|_| ProxyError::IdleTimeout)??;
        if read == 0 {
            return Ok(());
        }
        if line.len() > MAX_LINE_BYTES {
            return Err(ProxyError::LineTooLong);
        }
        if line.trim().is_empty() {
            continue;
        }

        let forwarded = match RpcMessage::parse(&line) {
            Ok(mut msg) => {
                let is_submit = matches!(msg.method.as_deref(), Some("mining.submit") | Some("submit"));
                if is_submit {
                    dialect::rewrite_credentials(dialect, &mut msg, &pool_wallet, &pool_worker, &pool_password);
                    if let Some(id) = msg.id.as_ref() {
                        let difficulty = *shared.difficulty.lock().await;
                        shared.pending_submits.lock().await.insert(
                            id_key(id),
                            PendingSubmit {
                                difficulty,
                                submitted_at: unix_now(),
                            },
                        );
                    }
                }
                msg.to_line()
            }
            Err(_) => line,
        };

        writer.write_all(forwarded.as_bytes()).await?;
        writer.flush().await?;
    }
}

#[allow(clippy::too_many_arguments)]
async fn pool_to_miner(
    mut reader: BufReader<tokio::net::tcp::OwnedReadHalf>,
    mut writer: tokio::net::tcp::OwnedWriteHalf,
    shared: Arc<Shared>,
    dialect: Dialect,
    control: ControlClient,
    sessions: SessionStore,
    hashrate: HashrateRegistry,
    worker_id: String,
) -> Result<(), ProxyError> {
    let idle = Duration::from_secs(IDLE_TIMEOUT_SECS);
    loop {
        let mut line = String::new();
        let read = timeout(idle, reader.read_line(&mut line))
            .await
            .map_err(|_| ProxyError::IdleTimeout)??;
        if read == 0 {
            return Ok(());
        }
        if line.len() > MAX_LINE_BYTES {
            return Err(ProxyError::LineTooLong);
        }
        if line.trim().is_empty() {
            continue;
        }

        if let Ok(msg) = RpcMessage::parse(&line) {
            if msg.method.as_deref() == Some("mining.set_difficulty") {
                if let Some(params) = msg.params.as_ref().and_then(Value::as_array) {
                    if let Some(d) = params.first().and_then(Value::as_f64) {
                        *shared.difficulty.lock().await = d;
                    }
                }
            }

            if dialect == Dialect::B {
                if let Some(target) = msg
                    .result
                    .as_ref()
                    .and_then(|r| r.get("job"))
                    .and_then(|j| j.get("target"))
                    .and_then(Value::as_str)
                {
                    if let Some(d) = dialect::difficulty_from_target_hex(target) {
                        *shared.difficulty.lock().await = d;
                    }
                }
            }

            if msg.is_reply() {
                if let Some(id) = msg.id.as_ref() {
                    let entry = shared.pending_submits.lock().await.remove(&id_key(id));
                    if let Some(entry) = entry {
                        let accepted = !msg.has_error() && msg.result_is_truthy();
                        sessions.record_share(&worker_id, accepted);
                        if accepted {
                            hashrate.record_accepted(&worker_id, entry.difficulty).await;
                        } else {
                            hashrate.record_rejected(&worker_id).await;
                        }

                        let worker_id = worker_id.clone();
                        let control = control.clone();
                        let hashrate = hashrate.clone();
                        tokio::spawn(async move {
                            let rate = hashrate.instantaneous_hashrate(&worker_id).await;
                            let outcome = if accepted { "accepted" } else { "rejected" };
                            control.share(&worker_id, outcome, entry.difficulty, rate).await;
                        });
                    }
                }
            }
        }

        writer.write_all(line.as_bytes()).await?;
        writer.flush().await?;
    }
}

/// Evicts submits whose reply never arrived within 120s and records them
/// as `stale` (§4.4 "entries older than 120s are dropped as stale").
async fn stale_sweep(shared: Arc<Shared>, control: ControlClient, worker_id: String) {
    let mut ticker = tokio::time::interval(Duration::from_secs(30));
    loop {
        ticker.tick().await;
        let now = unix_now();
        let mut stale_ids = Vec::new();
        {
            let mut pending = shared.pending_submits.lock().await;
            pending.retain(|id, entry| {
                let is_stale = now - entry.submitted_at > SUBMIT_STALE_SECS as f64;
                if is_stale {
                    stale_ids.push((id.clone(), entry.difficulty));
                }
                !is_stale
            });
        }
        for (_, difficulty) in stale_ids {
            control.share(&worker_id, "stale", difficulty, 0.0).await;
        }
    }
}

fn id_key(id: &Value) -> String {
    serde_json::to_string(id).unwrap_or_default()
}
