//! Redis-backed job and results stores.
//!
//! Layout, with `P` the configured key prefix:
//! - `P:job:<id>`: hash, one field per job attribute
//! - `P:video:<filename>`: set of job ids whose external video for that file is ready
//! - `P:results:<id>`: list of JSON-encoded analysis results
//!
//! Every write runs as a Lua script so existence checks and field updates are
//! atomic. Scripts that update a job refuse to run once the hash is gone.

use std::collections::HashMap;
use std::fmt::Display;
use std::str::FromStr;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use redis::aio::MultiplexedConnection;
use redis::{AsyncCommands, Script};
use tracing::{debug, info};
use vidmeta_models::{
    AnalysisKind, AnalysisResult, IndexingUpdate, Job, JobId, JobStatus,
};

use crate::error::{StoreError, StoreResult};
use crate::traits::{JobStore, ResultsStore};

// KEYS: job, filename index. ARGV: ready flag, then field pairs starting with id
const CREATE_JOB_SCRIPT: &str = r#"
if redis.call('EXISTS', KEYS[1]) == 1 then
    return 0
end
redis.call('HSET', KEYS[1], unpack(ARGV, 2))
if ARGV[1] == '1' then
    redis.call('SADD', KEYS[2], ARGV[3])
end
return 1
"#;

const UPDATE_STATUS_SCRIPT: &str = r#"
if redis.call('EXISTS', KEYS[1]) == 0 then
    return 0
end
local current = redis.call('HGET', KEYS[1], 'status')
if current == 'completed' then
    return 2
end
if current == 'failed' then
    return 3
end
redis.call('HSET', KEYS[1], unpack(ARGV))
return 1
"#;

// ARGV: n, n set-pairs, m, m setnx-pairs, index prefix, job id.
// The job stays in its filename index only while it holds a ready video id.
const UPDATE_FIELDS_SCRIPT: &str = r#"
if redis.call('EXISTS', KEYS[1]) == 0 then
    return 0
end
local i = 2
for _ = 1, tonumber(ARGV[1]) do
    redis.call('HSET', KEYS[1], ARGV[i], ARGV[i + 1])
    i = i + 2
end
local m = tonumber(ARGV[i])
i = i + 1
for _ = 1, m do
    redis.call('HSETNX', KEYS[1], ARGV[i], ARGV[i + 1])
    i = i + 2
end
local filename = redis.call('HGET', KEYS[1], 'filename')
if filename then
    local index_key = ARGV[i] .. filename
    local ready = redis.call('HGET', KEYS[1], 'indexing_status') == 'ready'
    if ready and redis.call('HEXISTS', KEYS[1], 'video_id') == 1 then
        redis.call('SADD', index_key, ARGV[i + 1])
    else
        redis.call('SREM', index_key, ARGV[i + 1])
    end
end
return 1
"#;

const DELETE_JOB_SCRIPT: &str = r#"
local filename = redis.call('HGET', KEYS[1], 'filename')
local existed = redis.call('DEL', KEYS[1])
if filename then
    redis.call('SREM', ARGV[1] .. filename, ARGV[2])
end
return existed
"#;

const PUSH_RESULT_SCRIPT: &str = r#"
if redis.call('EXISTS', KEYS[1]) == 0 then
    return -1
end
return redis.call('RPUSH', KEYS[2], ARGV[1])
"#;

/// Store configuration.
#[derive(Debug, Clone)]
pub struct StoreConfig {
    /// Redis URL
    pub redis_url: String,
    /// Prefix for every key this store writes
    pub key_prefix: String,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            redis_url: "redis://localhost:6379".to_string(),
            key_prefix: "vidmeta".to_string(),
        }
    }
}

impl StoreConfig {
    /// Create config from environment variables.
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            redis_url: std::env::var("REDIS_URL").unwrap_or(defaults.redis_url),
            key_prefix: std::env::var("STORE_KEY_PREFIX").unwrap_or(defaults.key_prefix),
        }
    }
}

/// Job and results store on a single Redis instance.
#[derive(Clone)]
pub struct RedisStore {
    client: redis::Client,
    config: StoreConfig,
    create_script: Script,
    status_script: Script,
    update_script: Script,
    delete_script: Script,
    push_result_script: Script,
}

impl RedisStore {
    pub fn new(config: StoreConfig) -> StoreResult<Self> {
        let client = redis::Client::open(config.redis_url.as_str())?;
        Ok(Self {
            client,
            config,
            create_script: Script::new(CREATE_JOB_SCRIPT),
            status_script: Script::new(UPDATE_STATUS_SCRIPT),
            update_script: Script::new(UPDATE_FIELDS_SCRIPT),
            delete_script: Script::new(DELETE_JOB_SCRIPT),
            push_result_script: Script::new(PUSH_RESULT_SCRIPT),
        })
    }

    /// Create from environment variables.
    pub fn from_env() -> StoreResult<Self> {
        Self::new(StoreConfig::from_env())
    }

    /// Round-trip a PING, for health checks.
    pub async fn ping(&self) -> StoreResult<()> {
        let mut conn = self.conn().await?;
        redis::cmd("PING").query_async::<String>(&mut conn).await?;
        Ok(())
    }

    async fn conn(&self) -> StoreResult<MultiplexedConnection> {
        Ok(self.client.get_multiplexed_async_connection().await?)
    }

    fn job_key(&self, id: &JobId) -> String {
        format!("{}:job:{}", self.config.key_prefix, id)
    }

    fn results_key(&self, id: &JobId) -> String {
        format!("{}:results:{}", self.config.key_prefix, id)
    }

    fn video_index_prefix(&self) -> String {
        format!("{}:video:", self.config.key_prefix)
    }

    fn video_index_key(&self, filename: &str) -> String {
        format!("{}{}", self.video_index_prefix(), filename)
    }
}

#[async_trait]
impl JobStore for RedisStore {
    async fn create(&self, job: &Job) -> StoreResult<()> {
        let mut conn = self.conn().await?;
        let fields = encode_job(job)?;

        let mut invocation = self.create_script.prepare_invoke();
        invocation
            .key(self.job_key(&job.id))
            .key(self.video_index_key(&job.filename))
            .arg(if job.has_ready_video() { "1" } else { "0" });
        for (name, value) in &fields {
            invocation.arg(*name).arg(value);
        }

        let created: i64 = invocation.invoke_async(&mut conn).await?;
        if created == 0 {
            return Err(StoreError::already_exists(job.id.as_str()));
        }

        info!(job_id = %job.id, filename = %job.filename, "Created job record");
        Ok(())
    }

    async fn get(&self, id: &JobId) -> StoreResult<Job> {
        let mut conn = self.conn().await?;
        let map: HashMap<String, String> = conn.hgetall(self.job_key(id)).await?;
        if map.is_empty() {
            return Err(StoreError::not_found(id.as_str()));
        }
        decode_job(id, map)
    }

    async fn update_status(
        &self,
        id: &JobId,
        status: JobStatus,
        error: Option<&str>,
    ) -> StoreResult<()> {
        let mut conn = self.conn().await?;
        let now = Utc::now().to_rfc3339();

        let mut invocation = self.status_script.prepare_invoke();
        invocation.key(self.job_key(id));
        invocation
            .arg("status")
            .arg(status.as_str())
            .arg("updated_at")
            .arg(&now);
        if let Some(error) = error {
            invocation.arg("error").arg(error);
        }
        if status.is_terminal() {
            invocation.arg("processing_end_time").arg(&now);
        }

        let outcome: i64 = invocation.invoke_async(&mut conn).await?;
        match outcome {
            1 => {
                debug!(job_id = %id, status = %status, "Updated job status");
                Ok(())
            }
            0 => Err(StoreError::not_found(id.as_str())),
            2 => Err(StoreError::AlreadyTerminal {
                job_id: id.to_string(),
                status: JobStatus::Completed,
            }),
            _ => Err(StoreError::AlreadyTerminal {
                job_id: id.to_string(),
                status: JobStatus::Failed,
            }),
        }
    }

    async fn update_indexing(&self, id: &JobId, update: &IndexingUpdate) -> StoreResult<()> {
        let mut conn = self.conn().await?;
        let now = Utc::now().to_rfc3339();

        let mut sets: Vec<(&str, String)> = vec![("updated_at", now.clone())];
        let mut set_if_absent: Vec<(&str, String)> = Vec::new();
        if let Some(video_id) = &update.video_id {
            sets.push(("video_id", video_id.clone()));
        }
        if let Some(index_id) = &update.index_id {
            sets.push(("index_id", index_id.clone()));
        }
        if let Some(task_id) = &update.task_id {
            sets.push(("task_id", task_id.clone()));
        }
        if let Some(progress) = update.progress {
            sets.push(("indexing_progress", progress.clamp(0.0, 1.0).to_string()));
        }
        if let Some(status) = update.status {
            sets.push(("indexing_status", status.as_str().to_string()));
            if status.is_in_flight() {
                set_if_absent.push(("indexing_start_time", now.clone()));
            }
            if status.is_terminal() {
                sets.push(("indexing_end_time", now.clone()));
            }
        }

        let mut invocation = self.update_script.prepare_invoke();
        invocation.key(self.job_key(id));
        invocation.arg(sets.len());
        for (name, value) in &sets {
            invocation.arg(*name).arg(value);
        }
        invocation.arg(set_if_absent.len());
        for (name, value) in &set_if_absent {
            invocation.arg(*name).arg(value);
        }
        invocation.arg(self.video_index_prefix()).arg(id.as_str());

        let updated: i64 = invocation.invoke_async(&mut conn).await?;
        if updated == 0 {
            return Err(StoreError::not_found(id.as_str()));
        }

        debug!(
            job_id = %id,
            indexing_status = ?update.status,
            progress = ?update.progress,
            "Updated indexing metadata"
        );
        Ok(())
    }

    async fn find_by_filename(&self, filename: &str) -> StoreResult<Job> {
        let mut conn = self.conn().await?;
        let index_key = self.video_index_key(filename);
        let owners: Vec<String> = conn.smembers(&index_key).await?;

        let mut latest: Option<Job> = None;
        for owner in owners {
            let job = match self.get(&JobId::from_string(owner.clone())).await {
                Ok(job) => job,
                Err(e) if e.is_not_found() => {
                    // Expired or removed outside the store.
                    let _: i64 = conn.srem(&index_key, &owner).await?;
                    continue;
                }
                Err(e) => return Err(e),
            };
            if !job.has_ready_video() {
                continue;
            }
            if latest.as_ref().map_or(true, |best| job.updated_at > best.updated_at) {
                latest = Some(job);
            }
        }

        latest.ok_or_else(|| StoreError::not_found(filename))
    }

    async fn delete(&self, id: &JobId) -> StoreResult<bool> {
        let mut conn = self.conn().await?;
        let existed: i64 = self
            .delete_script
            .key(self.job_key(id))
            .arg(self.video_index_prefix())
            .arg(id.as_str())
            .invoke_async(&mut conn)
            .await?;

        if existed > 0 {
            info!(job_id = %id, "Deleted job record");
        }
        Ok(existed > 0)
    }
}

#[async_trait]
impl ResultsStore for RedisStore {
    async fn store(
        &self,
        job_id: &JobId,
        kind: AnalysisKind,
        payload: serde_json::Value,
        processing_time: f64,
    ) -> StoreResult<AnalysisResult> {
        let mut conn = self.conn().await?;
        let result = AnalysisResult::new(job_id.clone(), kind, payload, processing_time);
        let encoded = serde_json::to_string(&result)?;

        let pushed: i64 = self
            .push_result_script
            .key(self.job_key(job_id))
            .key(self.results_key(job_id))
            .arg(encoded)
            .invoke_async(&mut conn)
            .await?;
        if pushed < 0 {
            return Err(StoreError::not_found(job_id.as_str()));
        }

        info!(
            job_id = %job_id,
            analysis = %kind,
            processing_time = processing_time,
            "Stored analysis result"
        );
        Ok(result)
    }

    async fn get_all(&self, job_id: &JobId) -> StoreResult<Vec<AnalysisResult>> {
        let mut conn = self.conn().await?;
        let raw: Vec<String> = conn.lrange(self.results_key(job_id), 0, -1).await?;
        raw.iter()
            .map(|entry| serde_json::from_str(entry).map_err(StoreError::from))
            .collect()
    }

    async fn delete_all(&self, job_id: &JobId) -> StoreResult<u64> {
        let mut conn = self.conn().await?;
        let key = self.results_key(job_id);
        let (count, _): (u64, u64) = redis::pipe()
            .atomic()
            .llen(&key)
            .del(&key)
            .query_async(&mut conn)
            .await?;
        Ok(count)
    }
}

fn encode_job(job: &Job) -> StoreResult<Vec<(&'static str, String)>> {
    let mut fields = vec![
        ("id", job.id.to_string()),
        ("filename", job.filename.clone()),
        ("video_path", job.video_path.clone()),
        ("analysis_types", serde_json::to_string(&job.analysis_types)?),
        ("status", job.status.as_str().to_string()),
        ("created_at", job.created_at.to_rfc3339()),
        ("updated_at", job.updated_at.to_rfc3339()),
    ];

    let mut push = |name: &'static str, value: Option<String>| {
        if let Some(value) = value {
            fields.push((name, value));
        }
    };
    push("temp_dir", job.temp_dir.clone());
    push("content_type", job.content_type.clone());
    push("video_size", job.video_size.map(|v| v.to_string()));
    push("error", job.error.clone());
    push("processing_start_time", job.processing_start_time.map(|t| t.to_rfc3339()));
    push("processing_end_time", job.processing_end_time.map(|t| t.to_rfc3339()));
    push("video_id", job.video_id.clone());
    push("index_id", job.index_id.clone());
    push("task_id", job.task_id.clone());
    push("indexing_status", job.indexing_status.map(|s| s.as_str().to_string()));
    push("indexing_progress", job.indexing_progress.map(|p| p.to_string()));
    push("indexing_start_time", job.indexing_start_time.map(|t| t.to_rfc3339()));
    push("indexing_end_time", job.indexing_end_time.map(|t| t.to_rfc3339()));

    Ok(fields)
}

/// Hash fields of one job, consumed while decoding.
struct Fields<'a> {
    job_id: &'a JobId,
    map: HashMap<String, String>,
}

impl Fields<'_> {
    fn optional(&mut self, name: &str) -> Option<String> {
        self.map.remove(name).filter(|v| !v.is_empty())
    }

    fn required(&mut self, name: &str) -> StoreResult<String> {
        self.optional(name)
            .ok_or_else(|| StoreError::corrupt(self.job_id.as_str(), format!("missing {}", name)))
    }

    fn parse<T>(&self, name: &str, value: &str) -> StoreResult<T>
    where
        T: FromStr,
        T::Err: Display,
    {
        value.parse().map_err(|e: T::Err| {
            StoreError::corrupt(self.job_id.as_str(), format!("{}: {}", name, e))
        })
    }

    fn time(&self, name: &str, value: &str) -> StoreResult<DateTime<Utc>> {
        DateTime::parse_from_rfc3339(value)
            .map(|t| t.with_timezone(&Utc))
            .map_err(|e| StoreError::corrupt(self.job_id.as_str(), format!("{}: {}", name, e)))
    }

    fn optional_parse<T>(&mut self, name: &str) -> StoreResult<Option<T>>
    where
        T: FromStr,
        T::Err: Display,
    {
        match self.optional(name) {
            Some(value) => self.parse(name, &value).map(Some),
            None => Ok(None),
        }
    }

    fn optional_time(&mut self, name: &str) -> StoreResult<Option<DateTime<Utc>>> {
        match self.optional(name) {
            Some(value) => self.time(name, &value).map(Some),
            None => Ok(None),
        }
    }
}

fn decode_job(id: &JobId, map: HashMap<String, String>) -> StoreResult<Job> {
    let mut f = Fields { job_id: id, map };

    let analysis_types: Vec<AnalysisKind> = serde_json::from_str(&f.required("analysis_types")?)?;
    let status_raw = f.required("status")?;
    let created_raw = f.required("created_at")?;
    let updated_raw = f.required("updated_at")?;

    Ok(Job {
        id: id.clone(),
        filename: f.required("filename")?,
        video_path: f.required("video_path")?,
        temp_dir: f.optional("temp_dir"),
        content_type: f.optional("content_type"),
        video_size: f.optional_parse("video_size")?,
        analysis_types,
        status: f.parse("status", &status_raw)?,
        error: f.optional("error"),
        created_at: f.time("created_at", &created_raw)?,
        updated_at: f.time("updated_at", &updated_raw)?,
        processing_start_time: f.optional_time("processing_start_time")?,
        processing_end_time: f.optional_time("processing_end_time")?,
        video_id: f.optional("video_id"),
        index_id: f.optional("index_id"),
        task_id: f.optional("task_id"),
        indexing_status: f.optional_parse("indexing_status")?,
        indexing_progress: f.optional_parse("indexing_progress")?,
        indexing_start_time: f.optional_time("indexing_start_time")?,
        indexing_end_time: f.optional_time("indexing_end_time")?,
    })
}
