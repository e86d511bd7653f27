//! HTTP client for the rendezvous (signaling) service.
//!
//! The service is a stateless registry: `POST /client` upserts the caller's
//! discovered endpoint, `GET /clients` returns the full peer set as a JSON
//! object whose values may be `null`. Entries that are `null` or fail to
//! decode are skipped rather than failing the whole snapshot.

use std::collections::HashMap;
use std::net::{Ipv4Addr, SocketAddrV4};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::Result;
use crate::peer::PeerRecord;

#[derive(Serialize, Deserialize, Debug)]
struct WireRecord {
    name: String,
    address: Ipv4Addr,
    port: u16,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    id: Option<u64>,
}

#[derive(Clone)]
pub struct RendezvousClient {
    http: reqwest::Client,
    base_url: String,
    upsert_retries: usize,
    retry_backoff: Duration,
}

impl RendezvousClient {
    pub fn new(
        base_url: &str,
        timeout: Duration,
        upsert_retries: usize,
        retry_backoff: Duration,
    ) -> Result<Self> {
        let http = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self {
            http,
            base_url: base_url.trim_end_matches('/').to_string(),
            upsert_retries,
            retry_backoff,
        })
    }

    /// Publishes the caller's endpoint. Retries a bounded number of times
    /// with linear backoff; the caller treats a final failure as non-fatal.
    pub async fn upsert(&self, name: &str, endpoint: SocketAddrV4, id: u64) -> Result<()> {
        let record = WireRecord {
            name: name.to_string(),
            address: *endpoint.ip(),
            port: endpoint.port(),
            id: Some(id),
        };
        let url = format!("{}/client", self.base_url);
        let mut attempt = 0;
        loop {
            match self.try_upsert(&url, &record).await {
                Ok(()) => return Ok(()),
                Err(e) if attempt < self.upsert_retries => {
                    attempt += 1;
                    log::debug!("upsert retry {attempt}: {e:?}");
                    tokio::time::sleep(self.retry_backoff * attempt as u32).await;
                }
                Err(e) => return Err(e.into()),
            }
        }
    }

    async fn try_upsert(&self, url: &str, record: &WireRecord) -> reqwest::Result<()> {
        self.http
            .post(url)
            .json(record)
            .send()
            .await?
            .error_for_status()?;
        Ok(())
    }

    /// Fetches the full peer set. Errors are per-call; the sync loop simply
    /// retries on its next tick.
    pub async fn fetch(&self) -> Result<Vec<PeerRecord>> {
        let url = format!("{}/clients", self.base_url);
        let body: HashMap<String, serde_json::Value> = self
            .http
            .get(&url)
            .send()
            .await?
            .error_for_status()?
            .json()
            .await?;
        Ok(decode_directory(body))
    }
}

fn decode_directory(body: HashMap<String, serde_json::Value>) -> Vec<PeerRecord> {
    let mut records = Vec::with_capacity(body.len());
    for (key, value) in body {
        if value.is_null() {
            continue;
        }
        match serde_json::from_value::<WireRecord>(value) {
            Ok(wire) => records.push(PeerRecord {
                name: wire.name,
                address: wire.address,
                port: wire.port,
                id: wire.id.unwrap_or(0),
            }),
            Err(e) => log::debug!("skipping malformed registry entry {key}: {e:?}"),
        }
    }
    records
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn directory_skips_null_and_malformed_entries() {
        let body: HashMap<String, serde_json::Value> = serde_json::from_str(
            r#"{
                "a": {"name": "a", "address": "1.2.3.4", "port": 1000, "id": 100},
                "b": {"name": "b", "address": "5.6.7.8", "port": 2000},
                "c": null,
                "d": {"name": "d", "address": "not-an-ip", "port": 1}
            }"#,
        )
        .unwrap();
        let mut records = decode_directory(body);
        records.sort_by(|x, y| x.name.cmp(&y.name));
        assert_eq!(records.len(), 2);
        assert_eq!(records[0].name, "a");
        assert_eq!(records[0].id, 100);
        // missing id decodes as 0
        assert_eq!(records[1].name, "b");
        assert_eq!(records[1].id, 0);
    }

    #[test]
    fn null_id_is_tolerated() {
        let body: HashMap<String, serde_json::Value> = serde_json::from_str(
            r#"{"b": {"name": "b", "address": "5.6.7.8", "port": 2000, "id": null}}"#,
        )
        .unwrap();
        let records = decode_directory(body);
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].id, 0);
    }
}
