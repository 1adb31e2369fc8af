//! Host interface naming utilities.
//!
//! This library provides helpers for:
//! - Validating kernel interface names (IFNAMSIZ limits)
//! - Deriving deterministic interface names from guest identities
//! - Normalizing VLAN tags for bridge attachments
//! - Allocating collision-free `prefix.N` interface names

use std::collections::BTreeSet;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use thiserror::Error;

/// Networking errors.
#[derive(Debug, Error)]
pub enum NetworkError {
    /// Interface name rejected by the kernel naming rules.
    #[error("invalid interface name '{name}': {reason}")]
    InvalidName { name: String, reason: String },

    /// Allocator prefix leaves no room for a numeric suffix.
    #[error("invalid interface prefix: {0}")]
    InvalidPrefix(String),

    /// VLAN tag outside the 802.1Q range.
    #[error("invalid VLAN tag: {0} (must be at most {max})", max = VLAN_TAG_MAX)]
    InvalidVlanTag(i64),

    /// Every name in the allocator's range is taken.
    #[error("interface names exhausted for prefix '{prefix}' ({capacity} names in use)")]
    AllocationExhausted { prefix: String, capacity: u64 },

    /// The host link table could not be read.
    #[error("failed to read link table at {}: {source}", .path.display())]
    LinkTable { path: PathBuf, source: io::Error },
}

// ============================================================================
// Interface Names
// ============================================================================

/// Longest interface name the kernel accepts (IFNAMSIZ - 1).
pub const IFNAME_MAX_LEN: usize = 15;

/// Separator between an allocator prefix and its numeric suffix.
pub const NAME_SEPARATOR: char = '.';

/// Validate an interface name against the kernel's `dev_valid_name` rules.
///
/// Names end up joined into filesystem paths, so anything that could escape
/// a directory is rejected here.
pub fn validate_iface_name(name: &str) -> Result<&str, NetworkError> {
    let reject = |reason: &str| NetworkError::InvalidName {
        name: name.to_string(),
        reason: reason.to_string(),
    };

    if name.is_empty() {
        return Err(reject("name is empty"));
    }
    if name.len() > IFNAME_MAX_LEN {
        return Err(reject(&format!(
            "name is longer than {} bytes",
            IFNAME_MAX_LEN
        )));
    }
    if name == "." || name == ".." {
        return Err(reject("name is a relative path component"));
    }
    if name
        .chars()
        .any(|c| c == '/' || c == ':' || c.is_whitespace())
    {
        return Err(reject("name contains '/', ':' or whitespace"));
    }

    Ok(name)
}

/// Derive an interface name from a guest identity and nic position.
///
/// The name is `<stem>.<index>`, where the stem is the leading ASCII
/// alphanumerics of the guest id, truncated so the whole name fits
/// [`IFNAME_MAX_LEN`].
pub fn derive_iface_name(guest_id: &str, index: usize) -> Result<String, NetworkError> {
    let suffix = index.to_string();
    let room = IFNAME_MAX_LEN.saturating_sub(suffix.len() + 1);

    let stem: String = guest_id
        .chars()
        .filter(|c| c.is_ascii_alphanumeric())
        .take(room)
        .collect();

    if stem.is_empty() {
        return Err(NetworkError::InvalidName {
            name: guest_id.to_string(),
            reason: "guest id has no characters usable in an interface name".to_string(),
        });
    }

    Ok(format!("{stem}{NAME_SEPARATOR}{suffix}"))
}

// ============================================================================
// VLAN Tags
// ============================================================================

/// Tag applied when the caller does not ask for one.
pub const VLAN_TAG_DEFAULT: u16 = 1;

/// Largest 802.1Q VLAN id.
pub const VLAN_TAG_MAX: u16 = 4095;

/// Normalize a requested VLAN tag.
///
/// Zero and negative tags mean "not specified" and map to
/// [`VLAN_TAG_DEFAULT`]; attachments are never left untagged.
pub fn normalize_vlan_tag(tag: i64) -> Result<u16, NetworkError> {
    if tag <= 0 {
        return Ok(VLAN_TAG_DEFAULT);
    }
    if tag > i64::from(VLAN_TAG_MAX) {
        return Err(NetworkError::InvalidVlanTag(tag));
    }
    Ok(tag as u16)
}

// ============================================================================
// Link Table
// ============================================================================

/// Default location of the kernel's interface list.
pub const SYSFS_NET_DIR: &str = "/sys/class/net";

/// Read access to the host's live interfaces.
pub trait LinkTable: Send + Sync {
    /// Names of every interface currently present.
    fn link_names(&self) -> Result<Vec<String>, NetworkError>;

    /// Whether an interface with this exact name exists.
    fn link_exists(&self, name: &str) -> Result<bool, NetworkError>;
}

/// Link table backed by a sysfs-style directory (one entry per interface).
#[derive(Debug, Clone)]
pub struct SysfsLinks {
    root: PathBuf,
}

impl SysfsLinks {
    /// Create a link table rooted at `root`.
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// Link table for the running host.
    pub fn host() -> Self {
        Self::new(SYSFS_NET_DIR)
    }

    /// Directory being read.
    pub fn root(&self) -> &Path {
        &self.root
    }

    fn io_error(&self, source: io::Error) -> NetworkError {
        NetworkError::LinkTable {
            path: self.root.clone(),
            source,
        }
    }
}

impl LinkTable for SysfsLinks {
    fn link_names(&self) -> Result<Vec<String>, NetworkError> {
        let entries = std::fs::read_dir(&self.root).map_err(|e| self.io_error(e))?;

        let mut names = Vec::new();
        for entry in entries {
            let entry = entry.map_err(|e| self.io_error(e))?;
            if let Some(name) = entry.file_name().to_str() {
                names.push(name.to_string());
            }
        }
        names.sort();
        Ok(names)
    }

    fn link_exists(&self, name: &str) -> Result<bool, NetworkError> {
        // sysfs entries are symlinks; don't follow them
        match std::fs::symlink_metadata(self.root.join(name)) {
            Ok(_) => Ok(true),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(false),
            Err(e) => Err(self.io_error(e)),
        }
    }
}

/// In-memory link table for tests and dry runs.
#[derive(Debug, Default)]
pub struct MemoryLinks {
    names: Mutex<BTreeSet<String>>,
}

impl MemoryLinks {
    /// Create an empty table.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a table holding the given names.
    pub fn with_names<I, S>(names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            names: Mutex::new(names.into_iter().map(Into::into).collect()),
        }
    }

    /// Add an interface.
    pub fn insert(&self, name: &str) {
        self.lock().insert(name.to_string());
    }

    /// Remove an interface.
    pub fn remove(&self, name: &str) -> bool {
        self.lock().remove(name)
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, BTreeSet<String>> {
        // The set holds plain strings; a poisoned guard is still consistent.
        self.names.lock().unwrap_or_else(|p| p.into_inner())
    }
}

impl LinkTable for MemoryLinks {
    fn link_names(&self) -> Result<Vec<String>, NetworkError> {
        Ok(self.lock().iter().cloned().collect())
    }

    fn link_exists(&self, name: &str) -> Result<bool, NetworkError> {
        Ok(self.lock().contains(name))
    }
}

// ============================================================================
// Name Allocation
// ============================================================================

/// Widest numeric suffix the allocator will use.
const MAX_SUFFIX_DIGITS: usize = 18;

/// Sequential `prefix.N` interface name allocator.
///
/// The counter wraps to 0 after `max_value` and every candidate is probed
/// against the live link table, so names created out-of-band are skipped.
pub struct NameAllocator {
    /// Name prefix (e.g., "tap").
    prefix: String,

    /// Most recently issued suffix.
    last_issued: u64,

    /// Largest suffix that keeps names within [`IFNAME_MAX_LEN`].
    max_value: u64,

    /// Live interfaces.
    links: Arc<dyn LinkTable>,
}

impl std::fmt::Debug for NameAllocator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("NameAllocator")
            .field("prefix", &self.prefix)
            .field("last_issued", &self.last_issued)
            .field("max_value", &self.max_value)
            .finish_non_exhaustive()
    }
}

impl NameAllocator {
    /// Largest suffix usable with `prefix`.
    pub fn max_value_for(prefix: &str) -> Result<u64, NetworkError> {
        if prefix.is_empty() {
            return Err(NetworkError::InvalidPrefix("prefix is empty".to_string()));
        }
        if prefix.contains(NAME_SEPARATOR) {
            return Err(NetworkError::InvalidPrefix(format!(
                "prefix '{}' contains '{}'",
                prefix, NAME_SEPARATOR
            )));
        }
        validate_iface_name(prefix)
            .map_err(|e| NetworkError::InvalidPrefix(e.to_string()))?;

        let digits = IFNAME_MAX_LEN
            .checked_sub(prefix.len() + 1)
            .filter(|d| *d > 0)
            .ok_or_else(|| {
                NetworkError::InvalidPrefix(format!(
                    "prefix '{}' leaves no room for a numeric suffix",
                    prefix
                ))
            })?
            .min(MAX_SUFFIX_DIGITS);

        Ok(10u64.pow(digits as u32) - 1)
    }

    /// Create an allocator seeded from the live link table.
    ///
    /// The counter resumes after the highest `prefix.N` already present. With
    /// no such interface it starts so that the first name issued is `prefix.0`.
    pub fn seed(prefix: &str, links: Arc<dyn LinkTable>) -> Result<Self, NetworkError> {
        let max_value = Self::max_value_for(prefix)?;

        let highest = links
            .link_names()?
            .iter()
            .filter_map(|name| parse_suffix(prefix, name))
            .filter(|n| *n <= max_value)
            .max();

        Ok(Self {
            prefix: prefix.to_string(),
            last_issued: highest.unwrap_or(max_value),
            max_value,
            links,
        })
    }

    /// Create an allocator with explicit bounds.
    ///
    /// `max_value` may be narrower than the prefix allows.
    pub fn with_bounds(
        prefix: &str,
        last_issued: u64,
        max_value: u64,
        links: Arc<dyn LinkTable>,
    ) -> Result<Self, NetworkError> {
        let limit = Self::max_value_for(prefix)?;
        if max_value > limit {
            return Err(NetworkError::InvalidPrefix(format!(
                "max value {} exceeds {} for prefix '{}'",
                max_value, limit, prefix
            )));
        }
        if last_issued > max_value {
            return Err(NetworkError::InvalidPrefix(format!(
                "last issued {} exceeds max value {}",
                last_issued, max_value
            )));
        }

        Ok(Self {
            prefix: prefix.to_string(),
            last_issued,
            max_value,
            links,
        })
    }

    /// Issue the next free name.
    pub fn next(&mut self) -> Result<String, NetworkError> {
        let start = self.peek_next();
        let mut candidate = start;

        loop {
            let name = self.name_for(candidate);
            if !self.links.link_exists(&name)? {
                self.last_issued = candidate;
                return Ok(name);
            }

            candidate = self.successor(candidate);
            if candidate == start {
                return Err(NetworkError::AllocationExhausted {
                    prefix: self.prefix.clone(),
                    capacity: self.max_value + 1,
                });
            }
        }
    }

    /// Name for a given suffix.
    pub fn name_for(&self, n: u64) -> String {
        format!("{}{}{}", self.prefix, NAME_SEPARATOR, n)
    }

    /// Name prefix.
    pub fn prefix(&self) -> &str {
        &self.prefix
    }

    /// Most recently issued suffix.
    pub fn last_issued(&self) -> u64 {
        self.last_issued
    }

    /// Largest suffix in the range.
    pub fn max_value(&self) -> u64 {
        self.max_value
    }

    /// Suffix the next allocation starts probing from.
    pub fn peek_next(&self) -> u64 {
        self.successor(self.last_issued)
    }

    fn successor(&self, n: u64) -> u64 {
        if n >= self.max_value {
            0
        } else {
            n + 1
        }
    }
}

/// Parse `N` out of `prefix.N`.
fn parse_suffix(prefix: &str, name: &str) -> Option<u64> {
    let digits = name.strip_prefix(prefix)?.strip_prefix(NAME_SEPARATOR)?;
    if digits.is_empty() || !digits.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    digits.parse().ok()
}
