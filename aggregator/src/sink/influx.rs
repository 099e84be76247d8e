//! InfluxDB v2 sink
//!
//! [`InfluxClient`] verifies (and optionally creates or recreates) the
//! destination bucket at startup. [`InfluxWriteSession`] batches points as
//! line protocol and posts each full batch on a background task, so inserts
//! never wait for the server. Failed writes are reported back over a channel,
//! logged and counted; they are not retried.

use super::line_protocol;
use super::{SessionSummary, SinkError, StatPoint, WriteSession};
use crate::config::SinkConfig;
use crate::metrics;
use crate::retry::retry_with_backoff;
use async_trait::async_trait;
use reqwest::header::{HeaderMap, HeaderValue, AUTHORIZATION, CONTENT_TYPE};
use serde::Deserialize;
use std::time::{Duration, Instant};
use tokio::sync::mpsc;
use tokio::task::{JoinError, JoinSet};
use tracing::{debug, info, warn};

/// Write requests allowed in flight before `insert` waits for one to finish.
const MAX_IN_FLIGHT_WRITES: usize = 4;

const BUCKET_DESCRIPTION: &str = "Flow data bucket";

#[derive(Debug, Clone, Deserialize)]
pub struct Organization {
    pub id: String,
    pub name: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Bucket {
    pub id: String,
    pub name: String,
    #[serde(rename = "orgID", default)]
    pub org_id: Option<String>,
}

#[derive(Deserialize)]
struct OrgList {
    #[serde(default)]
    orgs: Vec<Organization>,
}

#[derive(Deserialize)]
struct BucketList {
    #[serde(default)]
    buckets: Vec<Bucket>,
}

/// Client for the InfluxDB v2 HTTP API.
#[derive(Clone)]
pub struct InfluxClient {
    http: reqwest::Client,
    base_url: String,
    org: String,
}

impl InfluxClient {
    pub fn new(config: &SinkConfig) -> Result<Self, SinkError> {
        let mut auth = HeaderValue::from_str(&format!("Token {}", config.token))
            .map_err(|_| SinkError::InvalidToken)?;
        auth.set_sensitive(true);
        let mut headers = HeaderMap::new();
        headers.insert(AUTHORIZATION, auth);

        let http = reqwest::Client::builder()
            .default_headers(headers)
            .connect_timeout(Duration::from_secs(10))
            .timeout(Duration::from_secs(30))
            .build()?;

        Ok(Self {
            http,
            base_url: config.url.trim_end_matches('/').to_string(),
            org: config.org.clone(),
        })
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    /// Look up the configured organisation.
    pub async fn find_org(&self) -> Result<Organization, SinkError> {
        let resp = self
            .http
            .get(self.url("/api/v2/orgs"))
            .query(&[("org", self.org.as_str())])
            .send()
            .await?;
        let list: OrgList = check(resp).await?.json().await?;
        list.orgs
            .into_iter()
            .find(|o| o.name == self.org)
            .ok_or_else(|| SinkError::OrgNotFound(self.org.clone()))
    }

    /// Look up a bucket by name. `Ok(None)` when it does not exist.
    pub async fn find_bucket(&self, name: &str) -> Result<Option<Bucket>, SinkError> {
        let resp = self
            .http
            .get(self.url("/api/v2/buckets"))
            .query(&[("name", name), ("org", self.org.as_str())])
            .send()
            .await?;
        if resp.status() == reqwest::StatusCode::NOT_FOUND {
            return Ok(None);
        }
        let list: BucketList = check(resp).await?.json().await?;
        Ok(list.buckets.into_iter().find(|b| b.name == name))
    }

    async fn delete_bucket(&self, bucket: &Bucket) -> Result<(), SinkError> {
        let resp = self
            .http
            .delete(self.url(&format!("/api/v2/buckets/{}", bucket.id)))
            .send()
            .await?;
        check(resp).await?;
        Ok(())
    }

    async fn create_bucket(&self, org: &Organization, name: &str) -> Result<Bucket, SinkError> {
        // An empty retention rule list keeps data forever.
        let body = serde_json::json!({
            "orgID": org.id,
            "name": name,
            "description": BUCKET_DESCRIPTION,
            "retentionRules": [],
        });
        let resp = self
            .http
            .post(self.url("/api/v2/buckets"))
            .json(&body)
            .send()
            .await?;
        Ok(check(resp).await?.json().await?)
    }

    /// Make sure `bucket` exists before anything is written.
    ///
    /// With `delete_existing` the bucket is dropped and recreated, which
    /// implies `create_missing`.
    pub async fn verify_bucket(
        &self,
        bucket: &str,
        create_missing: bool,
        delete_existing: bool,
    ) -> Result<Bucket, SinkError> {
        let org = retry_with_backoff(
            "InfluxDB organisation lookup",
            3,
            Duration::from_secs(1),
            || self.find_org(),
        )
        .await?;
        debug!(org = %org.name, id = %org.id, "Resolved InfluxDB organisation");

        let mut create_missing = create_missing;
        if delete_existing {
            if let Some(existing) = self.find_bucket(bucket).await? {
                self.delete_bucket(&existing).await?;
                info!(bucket, "Deleted existing bucket");
            }
            create_missing = true;
        }

        match self.find_bucket(bucket).await? {
            Some(found) => Ok(found),
            None if create_missing => {
                let created = self.create_bucket(&org, bucket).await?;
                info!(bucket, id = %created.id, "Created bucket");
                Ok(created)
            }
            None => Err(SinkError::BucketNotFound(bucket.to_string())),
        }
    }

    /// Open the write session for `bucket`.
    pub fn start_write(&self, bucket: &str, batch_size: usize) -> InfluxWriteSession {
        let (errors_tx, errors_rx) = mpsc::unbounded_channel();
        InfluxWriteSession {
            http: self.http.clone(),
            write_url: self.url("/api/v2/write"),
            org: self.org.clone(),
            bucket: bucket.to_string(),
            batch: String::new(),
            batch_points: 0,
            batch_size: batch_size.max(1),
            in_flight: JoinSet::new(),
            errors_tx,
            errors_rx,
            points: 0,
            write_errors: 0,
        }
    }
}

/// Turn a non-2xx response into [`SinkError::Api`].
async fn check(resp: reqwest::Response) -> Result<reqwest::Response, SinkError> {
    let status = resp.status();
    if status.is_success() {
        return Ok(resp);
    }
    let message = resp.text().await.unwrap_or_default();
    Err(SinkError::Api {
        status: status.as_u16(),
        message,
    })
}

/// Batching, non-blocking writer for one bucket.
pub struct InfluxWriteSession {
    http: reqwest::Client,
    write_url: String,
    org: String,
    bucket: String,
    batch: String,
    batch_points: usize,
    batch_size: usize,
    in_flight: JoinSet<()>,
    errors_tx: mpsc::UnboundedSender<SinkError>,
    errors_rx: mpsc::UnboundedReceiver<SinkError>,
    points: u64,
    write_errors: u64,
}

impl InfluxWriteSession {
    /// Post the current batch on a background task.
    async fn dispatch(&mut self) {
        if self.batch_points == 0 {
            return;
        }
        while self.in_flight.len() >= MAX_IN_FLIGHT_WRITES {
            if let Some(joined) = self.in_flight.join_next().await {
                self.reap(joined);
            }
        }

        let body = std::mem::take(&mut self.batch);
        let count = std::mem::take(&mut self.batch_points);
        let request = self
            .http
            .post(&self.write_url)
            .query(&[
                ("org", self.org.as_str()),
                ("bucket", self.bucket.as_str()),
                ("precision", "ms"),
            ])
            .header(CONTENT_TYPE, "text/plain; charset=utf-8")
            .body(body);
        let errors = self.errors_tx.clone();

        self.in_flight.spawn(async move {
            let start = Instant::now();
            let result = match request.send().await {
                Ok(resp) => check(resp).await.map(|_| ()),
                Err(e) => Err(SinkError::from(e)),
            };
            metrics::SINK_WRITE_DURATION.observe(start.elapsed().as_secs_f64());
            match result {
                Ok(()) => debug!("Wrote {} points to InfluxDB", count),
                Err(e) => {
                    // The session owns the receiver for as long as tasks can run.
                    let _ = errors.send(e);
                }
            }
        });
        self.collect_errors();
    }

    /// A write task that panicked or was cancelled lost its batch.
    fn reap(&mut self, joined: Result<(), JoinError>) {
        if let Err(e) = joined {
            self.count_error(SinkError::from(e));
        }
    }

    fn collect_errors(&mut self) {
        while let Ok(e) = self.errors_rx.try_recv() {
            self.count_error(e);
        }
    }

    fn count_error(&mut self, e: SinkError) {
        self.write_errors += 1;
        metrics::SINK_WRITE_ERRORS.inc();
        warn!("write error: {}", e);
    }
}

#[async_trait]
impl WriteSession for InfluxWriteSession {
    async fn insert(&mut self, point: StatPoint) {
        line_protocol::write_point(&mut self.batch, &point);
        self.batch_points += 1;
        self.points += 1;
        metrics::POINTS_WRITTEN.inc();
        if self.batch_points >= self.batch_size {
            self.dispatch().await;
        }
    }

    async fn flush(&mut self) {
        self.dispatch().await;
        while let Some(joined) = self.in_flight.join_next().await {
            self.reap(joined);
        }
        self.collect_errors();
    }

    async fn end(mut self) -> SessionSummary {
        self.flush().await;
        info!(
            bucket = %self.bucket,
            points = self.points,
            write_errors = self.write_errors,
            "Write session closed"
        );
        SessionSummary {
            points: self.points,
            write_errors: self.write_errors,
        }
    }
}
