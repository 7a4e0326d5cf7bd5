//! One HTTP round-trip per zone against a single pod's admin port.
//!
//! Owns a connection pool sized per spec: 100 idle total / 10 idle per
//! host, 90s idle timeout, 5s dial timeout, 30s TCP keepalive, 10s TLS
//! handshake, 10s per-request timeout (all overridable via [`PodClientConfig`]).

use std::time::Duration;

use reqwest::{Client, Url};

use crate::codec::{decode_zone, encode_zone};
use crate::error::PodClientError;
use crate::model::Zone;

pub const DEFAULT_ADMIN_PORT: u16 = 8800;

#[derive(Debug, Clone)]
pub struct PodClientConfig {
    pub admin_port: u16,
    pub request_timeout: Duration,
    pub connect_timeout: Duration,
    pub pool_idle_timeout: Duration,
    pub tcp_keepalive: Duration,
    pub pool_max_idle_per_host: usize,
}

impl Default for PodClientConfig {
    fn default() -> Self {
        Self {
            admin_port: DEFAULT_ADMIN_PORT,
            request_timeout: Duration::from_secs(10),
            connect_timeout: Duration::from_secs(5),
            pool_idle_timeout: Duration::from_secs(90),
            tcp_keepalive: Duration::from_secs(30),
            pool_max_idle_per_host: 10,
        }
    }
}

/// Talks to a single pod's admin port. One instance is owned per pod
/// worker; `reqwest::Client` is itself cheaply cloneable and internally
/// pooled, so this does not need to be shared further.
#[derive(Debug, Clone)]
pub struct PodClient {
    base_url: Url,
    http: Client,
}

impl PodClient {
    /// `pod_ip` may or may not carry a scheme/port; `config.admin_port` is
    /// used when omitted.
    pub fn new(pod_ip: &str, config: &PodClientConfig) -> Result<Self, PodClientError> {
        let base_url = normalize_base_url(pod_ip, config.admin_port)?;

        let http = Client::builder()
            .timeout(config.request_timeout)
            .connect_timeout(config.connect_timeout)
            .pool_idle_timeout(config.pool_idle_timeout)
            .pool_max_idle_per_host(config.pool_max_idle_per_host)
            .tcp_keepalive(config.tcp_keepalive)
            .build()?;

        Ok(Self { base_url, http })
    }

    /// `GET /rate-limit/<zone>[?last_greater_equal=<watermark-1>]`.
    pub async fn fetch(
        &self,
        zone: &str,
        last_greater_equal: Option<i64>,
    ) -> Result<Zone, PodClientError> {
        let mut url = self
            .base_url
            .join(&format!("rate-limit/{zone}"))
            .expect("zone name forms a valid URL path segment");

        if let Some(watermark) = last_greater_equal {
            url.query_pairs_mut()
                .append_pair("last_greater_equal", &(watermark - 1).to_string());
        }

        let resp = self.http.get(url).send().await.map_err(map_transport_error)?;
        if !resp.status().is_success() {
            return Err(PodClientError::BadStatus(resp.status()));
        }
        let body = resp.bytes().await.map_err(map_transport_error)?;
        decode_zone(zone, &body)
    }

    /// `POST /rate-limit/<zone>` with the aggregated view, entry
    /// timestamps converted back to monotonic.
    pub async fn push(&self, zone: &Zone) -> Result<(), PodClientError> {
        let url = self
            .base_url
            .join(&format!("rate-limit/{}", zone.name))
            .expect("zone name forms a valid URL path segment");

        let body = encode_zone(zone)?;

        let resp = self
            .http
            .post(url)
            .header("Content-Type", "application/x-msgpack")
            .body(body)
            .send()
            .await
            .map_err(map_transport_error)?;

        if !resp.status().is_success() {
            return Err(PodClientError::BadStatus(resp.status()));
        }
        Ok(())
    }
}

/// Distinguishes a timed-out request from other transport failures, since
/// `reqwest::Error`'s `#[from]` conversion would otherwise collapse both
/// into [`PodClientError::Transport`].
fn map_transport_error(err: reqwest::Error) -> PodClientError {
    if err.is_timeout() {
        PodClientError::Timeout
    } else {
        PodClientError::Transport(err)
    }
}

fn normalize_base_url(pod_ip: &str, admin_port: u16) -> Result<Url, PodClientError> {
    let with_scheme = if pod_ip.contains("://") {
        pod_ip.to_string()
    } else {
        format!("http://{pod_ip}")
    };

    let mut url = Url::parse(&with_scheme)
        .map_err(|e| PodClientError::InvalidAddress(format!("{pod_ip:?}: {e}")))?;

    if url.port().is_none() {
        let _ = url.set_port(Some(admin_port));
    }
    if !url.path().ends_with('/') {
        url.set_path(&format!("{}/", url.path()));
    }

    Ok(url)
}
