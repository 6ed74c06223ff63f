//! Daemon state file paths, rooted at `WOPR_HOME`.

use std::path::PathBuf;

/// Well-known file locations under a daemon's home directory.
pub struct DaemonPaths {
    base_dir: PathBuf,
}

impl DaemonPaths {
    /// Root paths at `base_dir` (a resolved `WOPR_HOME`).
    #[must_use]
    pub fn new(base_dir: PathBuf) -> Self {
        Self { base_dir }
    }

    /// The home directory itself.
    #[must_use]
    pub fn base_dir(&self) -> &PathBuf {
        &self.base_dir
    }

    /// PID file, written on startup and removed on clean shutdown.
    #[must_use]
    pub fn pid_file(&self) -> PathBuf {
        self.base_dir.join("daemon.pid")
    }

    /// Port file, written once the HTTP listener is bound so the CLI can
    /// discover a daemon that picked an OS-assigned port.
    #[must_use]
    pub fn port_file(&self) -> PathBuf {
        self.base_dir.join("daemon.port")
    }

    /// Directory the daemon's cryptographic identity is loaded from/persisted to.
    #[must_use]
    pub fn identity_dir(&self) -> PathBuf {
        std::env::var("GLOBAL_IDENTITY_DIR")
            .map(PathBuf::from)
            .unwrap_or_else(|_| self.base_dir.join("identity"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn paths_nest_under_base_dir() {
        let paths = DaemonPaths::new(PathBuf::from("/tmp/wopr-test-home"));
        assert_eq!(paths.pid_file(), PathBuf::from("/tmp/wopr-test-home/daemon.pid"));
        assert_eq!(paths.port_file(), PathBuf::from("/tmp/wopr-test-home/daemon.port"));
    }
}
