//! Durable guard state: notification destination, monitored domains, backup mapping.
//!
//! Contract shared by every implementation:
//! - writes replace the whole value (no partial writes, no retries)
//! - absent or unreadable state reads as empty / unset, never as an error

use std::{
    fs, io,
    path::{Path, PathBuf},
};

use tracing::warn;

use crate::{config::Config, domain::ChatId, Result};

const OLD_DOMAIN_PREFIX: &str = "old domain : ";
const NEW_DOMAIN_PREFIX: &str = "new domain : ";

pub trait StateStore: Send + Sync {
    fn load_destination(&self) -> Option<ChatId>;
    fn save_destination(&self, chat_id: ChatId) -> Result<()>;

    fn read_domains(&self) -> Vec<String>;
    fn write_domains(&self, domains: &[String]) -> Result<()>;

    /// Replacement registered for `domain` in the backup mapping, first match wins.
    fn lookup_replacement(&self, domain: &str) -> Option<String>;
}

/// Plain-text file store (one file per value).
#[derive(Clone, Debug)]
pub struct FileStore {
    destination_file: PathBuf,
    domain_list_file: PathBuf,
    backup_mapping_file: PathBuf,
}

impl FileStore {
    pub fn new(
        destination_file: impl Into<PathBuf>,
        domain_list_file: impl Into<PathBuf>,
        backup_mapping_file: impl Into<PathBuf>,
    ) -> Self {
        Self {
            destination_file: destination_file.into(),
            domain_list_file: domain_list_file.into(),
            backup_mapping_file: backup_mapping_file.into(),
        }
    }

    pub fn from_config(cfg: &Config) -> Self {
        Self::new(
            cfg.destination_file.clone(),
            cfg.domain_list_file.clone(),
            cfg.backup_mapping_file.clone(),
        )
    }
}

impl StateStore for FileStore {
    fn load_destination(&self) -> Option<ChatId> {
        let txt = read_optional(&self.destination_file)?;
        let raw = txt.trim();
        if raw.is_empty() {
            return None;
        }
        match raw.parse::<i64>() {
            Ok(id) => Some(ChatId(id)),
            Err(e) => {
                warn!(
                    path = %self.destination_file.display(),
                    "ignoring malformed destination id {raw:?}: {e}"
                );
                None
            }
        }
    }

    fn save_destination(&self, chat_id: ChatId) -> Result<()> {
        fs::write(&self.destination_file, chat_id.0.to_string())?;
        Ok(())
    }

    fn read_domains(&self) -> Vec<String> {
        read_optional(&self.domain_list_file)
            .map(|txt| parse_domain_list(&txt))
            .unwrap_or_default()
    }

    fn write_domains(&self, domains: &[String]) -> Result<()> {
        fs::write(&self.domain_list_file, domains.join("\n"))?;
        Ok(())
    }

    fn lookup_replacement(&self, domain: &str) -> Option<String> {
        let txt = read_optional(&self.backup_mapping_file)?;
        find_replacement(&txt, domain)
    }
}

/// Read a state file; missing is silent, other failures are logged. Both read as `None`.
fn read_optional(path: &Path) -> Option<String> {
    match fs::read_to_string(path) {
        Ok(txt) => Some(txt),
        Err(e) if e.kind() == io::ErrorKind::NotFound => None,
        Err(e) => {
            warn!(path = %path.display(), "state file unreadable, treating as absent: {e}");
            None
        }
    }
}

pub fn parse_domain_list(txt: &str) -> Vec<String> {
    txt.lines()
        .map(str::trim)
        .filter(|l| !l.is_empty())
        .map(str::to_string)
        .collect()
}

/// Scan backup-mapping text for `old domain : <domain>, ..., new domain : <new>`.
///
/// Fields are comma-separated; whitespace around each field is ignored.
/// The `old domain` match is a prefix match on the trimmed line, so `a.com` also
/// qualifies a line for `a.com.au`; lines are scanned in file order and the first one
/// carrying a non-empty `new domain` field wins.
pub fn find_replacement(mapping: &str, domain: &str) -> Option<String> {
    let needle = format!("{OLD_DOMAIN_PREFIX}{domain}");
    mapping
        .lines()
        .map(str::trim)
        .filter(|line| line.starts_with(&needle))
        .find_map(|line| {
            line.split(',').find_map(|field| {
                let value = field.trim().strip_prefix(NEW_DOMAIN_PREFIX)?.trim();
                (!value.is_empty()).then(|| value.to_string())
            })
        })
}

/// Replace every entry equal to `old` with `new`, keeping order.
///
/// Returns the number of entries replaced.
pub fn replace_domain(domains: &mut [String], old: &str, new: &str) -> usize {
    let mut replaced = 0;
    for d in domains.iter_mut().filter(|d| d.as_str() == old) {
        *d = new.to_string();
        replaced += 1;
    }
    replaced
}
