//! HTTP client for the five Control-Plane Ingress endpoints (§4.6).
//!
//! Every callback is advisory: failures are logged and swallowed so they
//! never block share forwarding (§4.6, §7 "Callback failures are never
//! fatal").

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::config::CALLBACK_TIMEOUT_SECS;

#[derive(Clone)]
pub struct ControlClient {
    http: reqwest::Client,
    base_url: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct OrderForWorker {
    pub order_id: String,
    pub status: String,
    pub algorithm: String,
    pub hours: u32,
    pub ordered_hashrate: f64,
    pub pool_host: String,
    pub pool_port: u16,
    pub pool_wallet: String,
    pub pool_worker: String,
    pub pool_password: String,
    pub backup_host: Option<String>,
    pub backup_port: Option<u16>,
}

impl ControlClient {
    pub fn new(base_url: impl Into<String>) -> Self {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(CALLBACK_TIMEOUT_SECS))
            .build()
            .expect("building reqwest client");
        Self {
            http,
            base_url: base_url.into(),
        }
    }

    /// Returns `None` when the worker id does not resolve to an order in
    /// `paid|active` (§4.6 "NOT_FOUND").
    pub async fn get_order_by_worker(&self, worker_id: &str) -> Option<OrderForWorker> {
        let url = format!("{}/api/ingress/orders/{worker_id}", self.base_url);
        match self.http.get(&url).send().await {
            Ok(resp) if resp.status().is_success() => resp.json().await.ok(),
            Ok(_) => None,
            Err(e) => {
                tracing::warn!(worker_id, error = %e, "get_order_by_worker failed");
                None
            }
        }
    }

    pub async fn connect(&self, worker_id: &str, miner_ip: &str, user_agent: &str) {
        #[derive(Serialize)]
        struct Body<'a> {
            worker_id: &'a str,
            miner_ip: &'a str,
            user_agent: &'a str,
        }
        self.post_fire_and_forget(
            "/api/ingress/connect",
            &Body {
                worker_id,
                miner_ip,
                user_agent,
            },
        )
        .await;
    }

    pub async fn share(&self, worker_id: &str, outcome: &str, difficulty: f64, instantaneous_hashrate: f64) {
        #[derive(Serialize)]
        struct Body<'a> {
            worker_id: &'a str,
            outcome: &'a str,
            difficulty: f64,
            instantaneous_hashrate: f64,
        }
        self.post_fire_and_forget(
            "/api/ingress/share",
            &Body {
                worker_id,
                outcome,
                difficulty,
                instantaneous_hashrate,
            },
        )
        .await;
    }

    pub async fn hashrate(&self, worker_id: &str, hashrate: f64, unit: &str, accepted: i64, rejected: i64) {
        #[derive(Serialize)]
        struct Body<'a> {
            worker_id: &'a str,
            hashrate: f64,
            unit: &'a str,
            accepted: i64,
            rejected: i64,
        }
        self.post_fire_and_forget(
            "/api/ingress/hashrate",
            &Body {
                worker_id,
                hashrate,
                unit,
                accepted,
                rejected,
            },
        )
        .await;
    }

    pub async fn disconnect(&self, worker_id: &str, reason: &str) {
        #[derive(Serialize)]
        struct Body<'a> {
            worker_id: &'a str,
            reason: &'a str,
        }
        self.post_fire_and_forget("/api/ingress/disconnect", &Body { worker_id, reason })
            .await;
    }

    async fn post_fire_and_forget<T: Serialize>(&self, path: &str, body: &T) {
        let url = format!("{}{path}", self.base_url);
        if let Err(e) = self.http.post(&url).json(body).send().await {
            tracing::warn!(path, error = %e, "control-plane callback failed");
        }
    }
}
