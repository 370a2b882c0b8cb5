use std::{
    env, fs,
    path::{Path, PathBuf},
    time::Duration,
};

use crate::{errors::Error, Result};

/// Typed configuration, loaded from the environment (with `.env` fallback).
#[derive(Clone, Debug)]
pub struct Config {
    pub bot_token: String,
    pub admin_ids: Vec<i64>,

    /// Snapshot store location.
    pub store_path: PathBuf,

    /// Fixed delay between broadcast recipients (transport rate-limit policy).
    pub broadcast_delay: Duration,
    /// Emit a progress report every N broadcast recipients.
    pub broadcast_progress_every: usize,

    /// Maximum tickets shown per list view.
    pub ticket_list_limit: usize,
    /// Outbound message length we stay under (Telegram hard limit is 4096).
    pub safe_message_limit: usize,
}

impl Config {
    pub fn load() -> Result<Self> {
        load_dotenv_if_present(Path::new(".env"));

        let bot_token = env_str("BOT_TOKEN").and_then(non_empty).ok_or_else(|| {
            Error::Config("BOT_TOKEN environment variable is required".to_string())
        })?;

        let admin_ids = parse_csv_i64(env_str("ADMIN_IDS"));
        if admin_ids.is_empty() {
            return Err(Error::Config(
                "ADMIN_IDS environment variable is required (comma-separated ids)".to_string(),
            ));
        }

        let store_path = PathBuf::from(
            env_str("STORE_PATH").unwrap_or_else(|| "support-bot.json".to_string()),
        );

        let broadcast_delay =
            Duration::from_millis(env_u64("BROADCAST_DELAY_MS").unwrap_or(100));
        let broadcast_progress_every = env_usize("BROADCAST_PROGRESS_EVERY").unwrap_or(10);

        let ticket_list_limit = env_usize("TICKET_LIST_LIMIT").unwrap_or(25);
        let safe_message_limit = env_usize("TELEGRAM_SAFE_LIMIT").unwrap_or(4000);

        Ok(Self {
            bot_token,
            admin_ids,
            store_path,
            broadcast_delay,
            broadcast_progress_every,
            ticket_list_limit,
            safe_message_limit,
        })
    }

    /// Membership check for the configured admin set.
    pub fn is_admin(&self, id: i64) -> bool {
        self.admin_ids.contains(&id)
    }
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

        let mut val = v.trim().to_string();
        // Strip optional surrounding quotes.
        if val.len() >= 2
            && ((val.starts_with('"') && val.ends_with('"'))
                || (val.starts_with('\'') && val.ends_with('\'')))
        {
            val = val[1..val.len() - 1].to_string();
        }

        env::set_var(key, val);
    }
}

fn env_str(key: &str) -> Option<String> {
    env::var(key).ok()
}

fn env_u64(key: &str) -> Option<u64> {
    env_str(key).and_then(|s| s.trim().parse::<u64>().ok())
}

fn env_usize(key: &str) -> Option<usize> {
    env_str(key).and_then(|s| s.trim().parse::<usize>().ok())
}

fn parse_csv_i64(v: Option<String>) -> Vec<i64> {
    v.unwrap_or_default()
        .split(',')
        .map(|s| s.trim())
        .filter(|s| !s.is_empty())
        .filter_map(|s| s.parse::<i64>().ok())
        .collect()
}

fn non_empty(s: String) -> Option<String> {
    if s.trim().is_empty() {
        None
    } else {
        Some(s)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn csv_admin_ids_skip_garbage() {
        let ids = parse_csv_i64(Some(" 123, ,abc, -7 ,42".to_string()));
        assert_eq!(ids, vec![123, -7, 42]);
    }

    #[test]
    fn empty_csv_is_empty() {
        assert!(parse_csv_i64(None).is_empty());
        assert!(parse_csv_i64(Some("  ".to_string())).is_empty());
    }
}
