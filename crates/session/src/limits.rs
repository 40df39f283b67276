const MAX_SESSION_CONCURRENCY: usize = 16;

/// Parse a session concurrency override, clamped to a sane range.
pub(crate) fn parse_session_concurrency(raw: Option<&str>, default_value: usize) -> usize {
    raw.map(str::trim)
        .filter(|v| !v.is_empty())
        .and_then(|v| v.parse::<usize>().ok())
        .unwrap_or(default_value)
        .clamp(1, MAX_SESSION_CONCURRENCY)
}

pub(crate) fn session_concurrency_from_env(default_value: usize) -> usize {
    let raw = std::env::var("SYMKG_SESSION_CONCURRENCY").ok();
    parse_session_concurrency(raw.as_deref(), default_value)
}
