//! Controller configuration.

use std::env;
use std::path::{Path, PathBuf};

use oomify_proto::LIBRARY_NAME;
use tracing::debug;

/// Environment variable naming the interception library explicitly.
pub const LIBRARY_ENV: &str = "OOMIFY_LIBRARY";

/// Configuration for [`Controller`](crate::Controller)
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ControllerConfig {
    /// Interception library preloaded into every target.
    pub library: PathBuf,
}

impl Default for ControllerConfig {
    /// The bare library name, resolved by the dynamic loader's search path.
    fn default() -> Self {
        Self {
            library: PathBuf::from(LIBRARY_NAME),
        }
    }
}

impl ControllerConfig {
    pub fn with_library(library: impl Into<PathBuf>) -> Self {
        Self {
            library: library.into(),
        }
    }

    /// Pick the interception library: an explicit path wins, then a copy
    /// installed alongside the running executable, then the bare name.
    pub fn locate(explicit: Option<PathBuf>) -> Self {
        if let Some(library) = explicit {
            return Self::with_library(library);
        }

        let exe = env::current_exe().ok();
        let found = exe
            .as_deref()
            .and_then(Path::parent)
            .and_then(installed_library);

        match found {
            Some(library) => {
                debug!("Using interception library at {}", library.display());
                Self::with_library(library)
            }
            None => Self::default(),
        }
    }
}

/// Look for the library next to `bin_dir` or in a sibling `lib/` directory.
fn installed_library(bin_dir: &Path) -> Option<PathBuf> {
    let candidates = [
        bin_dir.join(LIBRARY_NAME),
        bin_dir.join("..").join("lib").join(LIBRARY_NAME),
    ];
    candidates.into_iter().find(|path| path.is_file())
}
