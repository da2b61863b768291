use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Where the proxied object lives.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Mode {
    /// Owned by a worker on its own thread.
    #[default]
    Isolated,
    /// Owned by the dispatcher; tasks run in the caller's thread when results are read.
    Local,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Options {
    pub mode: Mode,
    /// Name given to the isolated worker's thread.
    pub thread_name: String,
    /// Applied to waits that do not pass their own timeout. `None` waits forever.
    pub default_timeout_ms: Option<u64>,
}

impl Default for Options {
    fn default() -> Self {
        Options {
            mode: Mode::Isolated,
            thread_name: "mirror-worker".to_string(),
            default_timeout_ms: None,
        }
    }
}

impl Options {
    pub fn local() -> Options {
        Options {
            mode: Mode::Local,
            ..Options::default()
        }
    }

    pub fn default_timeout(&self) -> Option<Duration> {
        self.default_timeout_ms.map(Duration::from_millis)
    }
}
