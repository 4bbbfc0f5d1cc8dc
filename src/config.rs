//!
//! smartquery server configuration
//! --------------------------------
//! Settings are resolved per field as CLI flag, then environment variable, then
//! built-in default. Unparseable values fall through to the next source.

use std::env;

pub const USAGE: &str = "smartquery\n\nUSAGE:\n  smartquery [--http-port N] [--data-root PATH] [--bucket NAME] [--snapshot-interval-ms N] [--max-upload-bytes N]\n\nOPTIONS:\n  --http-port N             HTTP API port (env: SMARTQUERY_HTTP_PORT, default 5000)\n  --data-root PATH          Folder holding bucket data (env: SMARTQUERY_DATA_ROOT, default data)\n  --bucket NAME             Bucket to serve (env: SMARTQUERY_BUCKET or S3_BUCKET, default files)\n  --snapshot-interval-ms N  Snapshot flush period, 0 disables (env: SMARTQUERY_SNAPSHOT_INTERVAL_MS, default 5000)\n  --max-upload-bytes N      Request body limit (env: SMARTQUERY_MAX_UPLOAD_BYTES, default 67108864)\n";

pub const DEFAULT_HTTP_PORT: u16 = 5000;
pub const DEFAULT_DATA_ROOT: &str = "data";
pub const DEFAULT_BUCKET: &str = "files";
pub const DEFAULT_SNAPSHOT_INTERVAL_MS: u64 = 5_000;
pub const DEFAULT_MAX_UPLOAD_BYTES: usize = 64 * 1024 * 1024;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServerConfig {
    pub http_port: u16,
    pub data_root: String,
    pub bucket: String,
    /// 0 disables the periodic flush; a final flush still runs at shutdown.
    pub snapshot_interval_ms: u64,
    pub max_upload_bytes: usize,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            http_port: DEFAULT_HTTP_PORT,
            data_root: DEFAULT_DATA_ROOT.to_string(),
            bucket: DEFAULT_BUCKET.to_string(),
            snapshot_interval_ms: DEFAULT_SNAPSHOT_INTERVAL_MS,
            max_upload_bytes: DEFAULT_MAX_UPLOAD_BYTES,
        }
    }
}

fn arg_value<'a>(args: &'a [String], flag: &str) -> Option<&'a str> {
    let mut i = 0;
    while i < args.len() {
        if args[i] == flag {
            return args.get(i + 1).map(String::as_str);
        }
        i += 1;
    }
    None
}

fn parse_arg<T: std::str::FromStr>(args: &[String], flag: &str) -> Option<T> {
    arg_value(args, flag).and_then(|v| v.parse::<T>().ok())
}

fn non_empty(v: Option<String>) -> Option<String> {
    v.map(|s| s.trim().to_string()).filter(|s| !s.is_empty())
}

pub fn has_flag(args: &[String], flag: &str) -> bool {
    args.iter().any(|a| a == flag)
}

impl ServerConfig {
    /// Resolve from process arguments and environment.
    pub fn from_env_and_args(args: &[String]) -> Self {
        Self::resolve(args, |name| env::var(name).ok())
    }

    /// Resolve with an injectable environment lookup.
    pub fn resolve(args: &[String], env_var: impl Fn(&str) -> Option<String>) -> Self {
        let env_parse = |name: &str| -> Option<u64> { env_var(name).and_then(|v| v.trim().parse::<u64>().ok()) };

        let http_port = parse_arg::<u16>(args, "--http-port")
            .or_else(|| env_var("SMARTQUERY_HTTP_PORT").and_then(|v| v.trim().parse::<u16>().ok()))
            .unwrap_or(DEFAULT_HTTP_PORT);
        let data_root = non_empty(arg_value(args, "--data-root").map(str::to_string))
            .or_else(|| non_empty(env_var("SMARTQUERY_DATA_ROOT")))
            .unwrap_or_else(|| DEFAULT_DATA_ROOT.to_string());
        let bucket = non_empty(arg_value(args, "--bucket").map(str::to_string))
            .or_else(|| non_empty(env_var("SMARTQUERY_BUCKET")))
            .or_else(|| non_empty(env_var("S3_BUCKET")))
            .unwrap_or_else(|| DEFAULT_BUCKET.to_string());
        let snapshot_interval_ms = parse_arg::<u64>(args, "--snapshot-interval-ms")
            .or_else(|| env_parse("SMARTQUERY_SNAPSHOT_INTERVAL_MS"))
            .unwrap_or(DEFAULT_SNAPSHOT_INTERVAL_MS);
        let max_upload_bytes = parse_arg::<usize>(args, "--max-upload-bytes")
            .filter(|v| *v > 0)
            .or_else(|| env_parse("SMARTQUERY_MAX_UPLOAD_BYTES").map(|v| v as usize).filter(|v| *v > 0))
            .unwrap_or(DEFAULT_MAX_UPLOAD_BYTES);

        Self { http_port, data_root, bucket, snapshot_interval_ms, max_upload_bytes }
    }
}
