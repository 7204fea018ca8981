//! Three-tier size policy applied to advertised sizes before download.

use serde::{Deserialize, Serialize};

use crate::filter::format_file_size;

pub const DEFAULT_WARN_BYTES: u64 = 100 * 1024 * 1024;
pub const DEFAULT_REJECT_BYTES: u64 = 500 * 1024 * 1024;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SizeVerdict {
    pub acceptable: bool,
    pub should_warn: bool,
    pub reason: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SizeGuard {
    warn_bytes: u64,
    reject_bytes: u64,
}

impl Default for SizeGuard {
    fn default() -> Self {
        Self {
            warn_bytes: DEFAULT_WARN_BYTES,
            reject_bytes: DEFAULT_REJECT_BYTES,
        }
    }
}

impl SizeGuard {
    /// A warn threshold at or above the reject threshold never warns.
    pub fn new(warn_bytes: u64, reject_bytes: u64) -> Self {
        Self {
            warn_bytes: warn_bytes.min(reject_bytes),
            reject_bytes,
        }
    }

    pub fn warn_bytes(&self) -> u64 {
        self.warn_bytes
    }

    pub fn reject_bytes(&self) -> u64 {
        self.reject_bytes
    }

    pub fn check(&self, size: u64) -> SizeVerdict {
        if size >= self.reject_bytes {
            return SizeVerdict {
                acceptable: false,
                should_warn: false,
                reason: Some(format!(
                    "File size {} exceeds maximum of {}",
                    format_file_size(size),
                    format_file_size(self.reject_bytes)
                )),
            };
        }
        if size >= self.warn_bytes {
            return SizeVerdict {
                acceptable: true,
                should_warn: true,
                reason: Some(format!(
                    "Large file ({}), processing may take longer",
                    format_file_size(size)
                )),
            };
        }
        SizeVerdict {
            acceptable: true,
            should_warn: false,
            reason: None,
        }
    }
}
