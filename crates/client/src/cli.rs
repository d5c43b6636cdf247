use clap::Parser;

fn parse_byte_size(input: &str) -> Result<u64, String> {
    let s = input.trim();
    if s.is_empty() {
        return Err("size must not be empty".to_string());
    }

    let lower = s.to_ascii_lowercase();
    let (num, scale) = if let Some(raw) = lower.strip_suffix("kib") {
        (raw, 1024u64)
    } else if let Some(raw) = lower.strip_suffix("mib") {
        (raw, 1024u64 * 1024)
    } else if let Some(raw) = lower.strip_suffix("gib") {
        (raw, 1024u64 * 1024 * 1024)
    } else if let Some(raw) = lower.strip_suffix("kb") {
        (raw, 1000u64)
    } else if let Some(raw) = lower.strip_suffix("mb") {
        (raw, 1000u64 * 1000)
    } else if let Some(raw) = lower.strip_suffix("gb") {
        (raw, 1000u64 * 1000 * 1000)
    } else if let Some(raw) = lower.strip_suffix('b') {
        (raw, 1u64)
    } else {
        (lower.as_str(), 1024u64 * 1024)
    };

    let num = num.trim();
    if num.is_empty() {
        return Err(format!("invalid size: {input:?}"));
    }

    let value: u64 = num.parse().map_err(|_| format!("invalid size number: {input:?}"))?;
    value.checked_mul(scale).ok_or_else(|| format!("size too large: {input:?}"))
}

fn default_concurrency() -> usize {
    std::thread::available_parallelism()
        .map(|n| n.get())
        .unwrap_or(1)
        .clamp(1, 32)
}

/// Command-line options. Credential and region *discovery* stay an external
/// collaborator (the standard AWS environment/profile chain); these flags
/// only steer which endpoint/region/profile that chain is pointed at and how
/// the transfer engine is sized.
#[derive(Debug, Clone, Parser)]
#[command(name = "s3term", version, about = "Interactive terminal client for S3-compatible object storage")]
pub struct Cli {
    /// Override endpoint, for S3-compatible stores that aren't AWS itself.
    #[arg(long, env = "S3TERM_ENDPOINT_URL")]
    pub endpoint_url: Option<String>,

    /// Region passed to the SDK config; falls back to the standard AWS
    /// discovery chain (env var, profile, instance metadata) when unset.
    #[arg(long, env = "S3TERM_REGION")]
    pub region: Option<String>,

    /// Named credentials profile to use.
    #[arg(long, env = "S3TERM_PROFILE")]
    pub profile: Option<String>,

    /// Use path-style bucket addressing instead of virtual-hosted style;
    /// required by most non-AWS S3-compatible stores.
    #[arg(long, env = "S3TERM_PATH_STYLE", default_value_t = false)]
    pub path_style: bool,

    /// Number of concurrent part/range jobs per transfer.
    #[arg(
        long,
        env = "S3TERM_CONCURRENCY",
        default_value_t = default_concurrency(),
        value_parser = clap::value_parser!(usize).range(1..=512)
    )]
    pub concurrency: usize,

    /// Multipart part size, e.g. `8MiB`.
    #[arg(long, env = "S3TERM_PART_SIZE", default_value = "5MiB", value_parser = parse_byte_size)]
    pub part_size_bytes: u64,

    /// Tracing filter directive, e.g. `info` or `s3term=debug`.
    #[arg(long, env = "S3TERM_LOG", default_value = "info")]
    pub log_level: String,
}
