//! Build version information
//!
//! The commit hash and dirty flag are baked in by the build script.

/// Length of the abbreviated commit hash.
const SHORT_COMMIT_LEN: usize = 7;

/// Version information for this build.
#[derive(Debug, Clone, Copy)]
pub struct Info {
    pub version: &'static str,
    pub commit: &'static str,
    pub modified: bool,
}

/// The version information baked into this build.
pub fn get() -> Info {
    Info {
        version: env!("CARGO_PKG_VERSION"),
        commit: env!("GIT_HASH"),
        modified: env!("GIT_DIRTY") == "true",
    }
}

impl Info {
    fn short_commit(&self) -> &str {
        if self.commit.len() > SHORT_COMMIT_LEN {
            &self.commit[..SHORT_COMMIT_LEN]
        } else {
            self.commit
        }
    }
}

impl std::fmt::Display for Info {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        if self.commit.is_empty() || self.commit == "unknown" {
            return write!(f, "{}", self.version);
        }

        write!(f, "{} ({}", self.version, self.short_commit())?;
        if self.modified {
            write!(f, "-dirty")?;
        }
        write!(f, ")")
    }
}
