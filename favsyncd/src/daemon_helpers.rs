fn expand_with_home(value: &str, home: &Path) -> PathBuf {
    if value == "~" {
        return home.to_path_buf();
    }
    if let Some(rest) = value.strip_prefix("~/") {
        return home.join(rest);
    }
    PathBuf::from(value)
}

fn default_data_root(home: &Path) -> PathBuf {
    dirs::data_dir()
        .unwrap_or_else(|| home.join(".local").join("share"))
        .join(DEFAULT_DATA_DIR_NAME)
}

fn read_u64_env(name: &str, default: u64) -> u64 {
    parse_positive_u64(std::env::var(name).ok().as_deref(), default)
}

fn parse_positive_u64(value: Option<&str>, default: u64) -> u64 {
    value
        .and_then(|value| value.trim().parse::<u64>().ok())
        .filter(|value| *value > 0)
        .unwrap_or(default)
}

fn next_pass_delay(failures: u32, interval: Duration, backoff: &Backoff) -> Duration {
    if failures == 0 {
        return interval;
    }
    backoff.delay(failures).min(interval)
}
