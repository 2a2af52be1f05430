use std::time::Duration;

use serde_json::{json, Value};
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::net::TcpStream;
use tokio::time::timeout;

use crate::config::{HANDSHAKE_TIMEOUT_SECS, MAX_LINE_BYTES};
use crate::control_client::{ControlClient, OrderForWorker};
use crate::errors::ProxyError;

use super::dialect::{self, Dialect};
use super::message::{error_reply, ok_reply, RpcMessage};

/// Must match `ORDER_CODE_PREFIX` in the control plane's order-code generator;
/// duplicated here since this crate has no dependency on that one.
const ORDER_CODE_PREFIX: &str = "hb_ord_";

pub struct Established {
    pub dialect: Dialect,
    pub worker_id: String,
    pub user_agent: String,
    pub order: OrderForWorker,
    pub pool_stream: TcpStream,
}

/// Runs §4.4 steps 1-5: read subscribe/authorize within 30s, resolve the
/// worker id against the control plane, dial the destination pool, and
/// replay the authorize with substituted credentials.
pub async fn perform(
    miner_read: &mut BufReader<OwnedReadHalf>,
    miner_write: &mut OwnedWriteHalf,
    control: &ControlClient,
) -> Result<Established, ProxyError> {
    let deadline = Duration::from_secs(HANDSHAKE_TIMEOUT_SECS);
    let mut user_agent = String::from("unknown");

    loop {
        let line = read_line_with_limit(miner_read, deadline)
            .await?
            .ok_or(ProxyError::HandshakeTimeout)?;

        if line.trim().is_empty() {
            continue;
        }

        let Ok(msg) = RpcMessage::parse(&line) else {
            continue;
        };

        match msg.method.as_deref() {
            Some("mining.subscribe") => {
                if let Some(ua) = msg.params.as_ref().and_then(Value::as_array).and_then(|a| a.first()).and_then(Value::as_str) {
                    user_agent = ua.to_string();
                }
                let sub_id = format!("proxy-sub-{:08x}", rand::random::<u32>());
                let extranonce1 = hex::encode(rand::random::<[u8; 4]>());
                let reply = ok_reply(
                    msg.id.clone(),
                    json!([["mining.notify", sub_id], extranonce1, 4]),
                );
                write_line(miner_write, &reply).await?;
            }
            Some("mining.authorize") | Some("login") | Some("submit") => {
                let dialect = dialect::detect(&msg).ok_or_else(|| {
                    crate::errors::DialectError::UnknownDialect(
                        msg.method.clone().unwrap_or_default(),
                    )
                })?;

                let fields = dialect::parse_login(dialect, &msg.params)?;

                if !fields.worker_id.starts_with(ORDER_CODE_PREFIX) {
                    let reply = error_reply(msg.id.clone(), "unknown worker or order not active");
                    write_line(miner_write, &reply).await?;
                    return Err(ProxyError::UnknownWorker(fields.worker_id));
                }

                let Some(order) = control.get_order_by_worker(&fields.worker_id).await else {
                    let reply = error_reply(msg.id.clone(), "unknown worker or order not active");
                    write_line(miner_write, &reply).await?;
                    return Err(ProxyError::UnknownWorker(fields.worker_id));
                };

                let pool_stream = dial_pool(&order).await?;
                replay_authorize(&pool_stream, dialect, &msg, &order).await?;

                let ack = ok_reply(msg.id.clone(), Value::Bool(true));
                write_line(miner_write, &ack).await?;

                return Ok(Established {
                    dialect,
                    worker_id: fields.worker_id,
                    user_agent: user_agent.clone(),
                    order,
                    pool_stream,
                });
            }
            _ => continue,
        }
    }
}

async fn dial_pool(order: &OrderForWorker) -> Result<TcpStream, ProxyError> {
    match TcpStream::connect((order.pool_host.as_str(), order.pool_port)).await {
        Ok(stream) => Ok(stream),
        Err(primary_err) => {
            if let (Some(host), Some(port)) = (&order.backup_host, order.backup_port) {
                TcpStream::connect((host.as_str(), port))
                    .await
                    .map_err(|source| ProxyError::PoolConnect {
                        host: host.clone(),
                        port,
                        source,
                    })
            } else {
                Err(ProxyError::PoolConnect {
                    host: order.pool_host.clone(),
                    port: order.pool_port,
                    source: primary_err,
                })
            }
        }
    }
}

async fn replay_authorize(
    pool_stream: &TcpStream,
    dialect: Dialect,
    original: &RpcMessage,
    order: &OrderForWorker,
) -> Result<(), ProxyError> {
    let mut msg = original.clone();
    dialect::rewrite_credentials(
        dialect,
        &mut msg,
        &order.pool_wallet,
        &order.pool_worker,
        &order.pool_password,
    );
    let line = msg.to_line();
    loop {
        pool_stream.writable().await?;
        match pool_stream.try_write(line.as_bytes()) {
            Ok(_) => return Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::WouldBlock => continue,
            Err(e) => return Err(ProxyError::Io(e)),
        }
    }
}

async fn write_line(writer: &mut OwnedWriteHalf, msg: &RpcMessage) -> Result<(), ProxyError> {
    writer.write_all(msg.to_line().as_bytes()).await?;
    writer.flush().await?;
    Ok(())
}

/// Reads one line bounded by `MAX_LINE_BYTES`, or `None` on EOF before any
/// bytes arrived, or a timeout error.
async fn read_line_with_limit(
    reader: &mut BufReader<OwnedReadHalf>,
    bound: Duration,
) -> Result<Option<String>, ProxyError> {
    let mut line = String::new();
    let read = timeout(bound, reader.read_line(&mut line))
        .await
        .map_err(|_| ProxyError::HandshakeTimeout)??;

    if read == 0 {
        return Ok(None);
    }
    if line.len() > MAX_LINE_BYTES {
        return Err(ProxyError::LineTooLong);
    }
    Ok(Some(line))
}
