//! Logger setup

pub const LOG_LEVEL_VAR: &str = "LOG_LEVEL";
const FALLBACK_VAR: &str = "RUST_LOG";
const DEFAULT_FILTER: &str = "info";

/// Install env_logger with the filter from `LOG_LEVEL`, then `RUST_LOG`
pub fn init() {
    let filter = log_filter(|name| std::env::var(name).ok());
    let result = env_logger::Builder::new()
        .parse_filters(&filter)
        .format_timestamp_millis()
        .try_init();
    if let Err(e) = result {
        eprintln!("Logger already initialized: {}", e);
    }
}

fn log_filter<F>(lookup: F) -> String
where
    F: Fn(&str) -> Option<String>,
{
    [LOG_LEVEL_VAR, FALLBACK_VAR]
        .into_iter()
        .filter_map(|name| lookup(name))
        .map(|value| value.trim().to_ascii_lowercase())
        .find(|value| !value.is_empty())
        .map(|value| match value.as_str() {
            "warning" => "warn".to_string(),
            "critical" | "fatal" => "error".to_string(),
            _ => value,
        })
        .unwrap_or_else(|| DEFAULT_FILTER.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_log_level_wins() {
        let filter = log_filter(|name| match name {
            "LOG_LEVEL" => Some("DEBUG".to_string()),
            "RUST_LOG" => Some("warn".to_string()),
            _ => None,
        });
        assert_eq!(filter, "debug");
    }

    #[test]
    fn test_falls_back_to_rust_log_then_info() {
        let filter =
            log_filter(|name| (name == "RUST_LOG").then(|| "routemirror_core=trace".to_string()));
        assert_eq!(filter, "routemirror_core=trace");

        assert_eq!(log_filter(|_| None), "info");
        assert_eq!(log_filter(|_| Some(" ".to_string())), "info");
    }

    #[test]
    fn test_python_level_names() {
        assert_eq!(log_filter(|_| Some("WARNING".to_string())), "warn");
        assert_eq!(log_filter(|_| Some("CRITICAL".to_string())), "error");
    }
}
