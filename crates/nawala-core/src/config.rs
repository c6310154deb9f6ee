use std::{
    env, fs,
    path::{Path, PathBuf},
    time::Duration,
};

use crate::{errors::Error, Result};

pub const DEFAULT_DESTINATION_FILE: &str = "telegram_chat_id.txt";
pub const DEFAULT_DOMAIN_LIST_FILE: &str = "list.txt";
pub const DEFAULT_BACKUP_MAPPING_FILE: &str = "target-backup.txt";

/// Description attached to every shortlink rewritten by the guard.
pub const REMEDIATION_DESCRIPTION: &str = "Automatic Domain Replacement";

/// Typed configuration for the guard.
#[derive(Clone, Debug)]
pub struct Config {
    // Telegram
    pub telegram_bot_token: String,
    pub telegram_long_poll: Duration,

    // Shortlink provider (Kutt)
    pub kutt_api_key: String,
    pub kutt_base_url: String,
    pub kutt_page_size: usize,
    pub kutt_timeout: Duration,

    // Blocklist checker
    pub checker_program: PathBuf,
    pub checker_args: Vec<String>,
    pub checker_timeout: Duration,

    // Persistent state
    pub destination_file: PathBuf,
    pub domain_list_file: PathBuf,
    pub backup_mapping_file: PathBuf,

    // Monitor loop
    pub batch_size: usize,
    pub check_interval: Duration,
    pub safe_notify_interval: Duration,

    // Command loop
    pub command_poll_tick: Duration,

    pub remediation_description: String,
}

impl Config {
    /// Built-in defaults with all state files rooted at `data_dir`.
    ///
    /// Credentials are left empty; `load()` fills them from the environment.
    pub fn defaults(data_dir: impl AsRef<Path>) -> Self {
        let data_dir = data_dir.as_ref();
        Self {
            telegram_bot_token: String::new(),
            telegram_long_poll: Duration::from_secs(30),
            kutt_api_key: String::new(),
            kutt_base_url: "https://kutt.it".to_string(),
            kutt_page_size: 50,
            kutt_timeout: Duration::from_secs(30),
            checker_program: PathBuf::from("nawala-check"),
            checker_args: Vec::new(),
            checker_timeout: Duration::from_secs(120),
            destination_file: data_dir.join(DEFAULT_DESTINATION_FILE),
            domain_list_file: data_dir.join(DEFAULT_DOMAIN_LIST_FILE),
            backup_mapping_file: data_dir.join(DEFAULT_BACKUP_MAPPING_FILE),
            batch_size: 5,
            check_interval: Duration::from_secs(120),
            safe_notify_interval: Duration::from_secs(3600),
            command_poll_tick: Duration::from_millis(1000),
            remediation_description: REMEDIATION_DESCRIPTION.to_string(),
        }
    }

    pub fn load() -> Result<Self> {
        load_dotenv_if_present(Path::new(".env"));

        let data_dir = env_path("NAWALA_DATA_DIR").unwrap_or_else(|| PathBuf::from("."));
        let mut cfg = Self::defaults(&data_dir);

        // Required env vars
        cfg.telegram_bot_token = env_str("TELEGRAM_BOT_TOKEN")
            .and_then(non_empty)
            .ok_or_else(|| {
                Error::Config("TELEGRAM_BOT_TOKEN environment variable is required".to_string())
            })?;
        cfg.kutt_api_key = env_str("KUTT_API_KEY").and_then(non_empty).ok_or_else(|| {
            Error::Config("KUTT_API_KEY environment variable is required".to_string())
        })?;

        if let Some(url) = env_str("KUTT_BASE_URL").and_then(non_empty) {
            cfg.kutt_base_url = url.trim_end_matches('/').to_string();
        }
        if let Some(n) = env_usize("KUTT_PAGE_SIZE") {
            cfg.kutt_page_size = n.max(1);
        }
        if let Some(s) = env_u64("KUTT_TIMEOUT_SECS") {
            cfg.kutt_timeout = Duration::from_secs(s);
        }
        if let Some(s) = env_u64("TELEGRAM_LONG_POLL_SECS") {
            cfg.telegram_long_poll = Duration::from_secs(s);
        }

        if let Some(raw) = env_str("NAWALA_CHECKER_COMMAND") {
            let (program, args) = parse_command_line(&raw)?;
            cfg.checker_program = program;
            cfg.checker_args = args;
        }
        if let Some(s) = env_u64("NAWALA_CHECKER_TIMEOUT_SECS") {
            cfg.checker_timeout = Duration::from_secs(s.max(1));
        }

        // State files are resolved relative to the data dir unless absolute.
        if let Some(p) = env_path("NAWALA_DESTINATION_FILE") {
            cfg.destination_file = data_dir.join(p);
        }
        if let Some(p) = env_path("NAWALA_DOMAIN_LIST_FILE") {
            cfg.domain_list_file = data_dir.join(p);
        }
        if let Some(p) = env_path("NAWALA_BACKUP_MAPPING_FILE") {
            cfg.backup_mapping_file = data_dir.join(p);
        }

        if let Some(n) = env_usize("NAWALA_BATCH_SIZE") {
            cfg.batch_size = n.max(1);
        }
        if let Some(s) = env_u64("NAWALA_CHECK_INTERVAL_SECS") {
            cfg.check_interval = Duration::from_secs(s);
        }
        if let Some(s) = env_u64("NAWALA_SAFE_NOTIFY_INTERVAL_SECS") {
            cfg.safe_notify_interval = Duration::from_secs(s);
        }
        if let Some(ms) = env_u64("NAWALA_COMMAND_POLL_MS") {
            cfg.command_poll_tick = Duration::from_millis(ms);
        }

        if !data_dir.exists() {
            fs::create_dir_all(&data_dir)?;
        }

        Ok(cfg)
    }
}

/// Split a checker command line into program + args (whitespace separated, no quoting).
pub fn parse_command_line(raw: &str) -> Result<(PathBuf, Vec<String>)> {
    let mut parts = raw.split_whitespace().map(|s| s.to_string());
    let program = parts.next().ok_or_else(|| {
        Error::Config("NAWALA_CHECKER_COMMAND must name a program".to_string())
    })?;
    Ok((PathBuf::from(program), parts.collect()))
}

fn env_str(key: &str) -> Option<String> {
    env::var(key).ok()
}

fn load_dotenv_if_present(path: &Path) {
    let Ok(contents) = fs::read_to_string(path) else {
        return;
    };

    for raw in contents.lines() {
        let line = raw.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }

        let Some((k, v)) = line.split_once('=') else {
            continue;
        };

        let key = k.trim();
        if key.is_empty() {
            continue;
        }
        if env::var_os(key).is_some() {
            continue; // do not override existing env
        }

        env::set_var(key, strip_quotes(v.trim()));
    }
}

fn strip_quotes(val: &str) -> &str {
    if val.len() >= 2
        && ((val.starts_with('"') && val.ends_with('"'))
            || (val.starts_with('\'') && val.ends_with('\'')))
    {
        return &val[1..val.len() - 1];
    }
    val
}

fn env_u64(key: &str) -> Option<u64> {
    env_str(key).and_then(|s| s.trim().parse::<u64>().ok())
}

fn env_usize(key: &str) -> Option<usize> {
    env_str(key).and_then(|s| s.trim().parse::<usize>().ok())
}

fn env_path(key: &str) -> Option<PathBuf> {
    env::var_os(key)
        .filter(|v| !v.is_empty())
        .map(PathBuf::from)
}

fn non_empty(s: String) -> Option<String> {
    if s.trim().is_empty() {
        None
    } else {
        Some(s.trim().to_string())
    }
}
