use std::collections::BTreeMap;
use std::path::PathBuf;

/// Token that ends the foreground clip and returns to the background loop
pub const STOP_TOKEN: &str = "STOP";

/// What the controller should do in response to one command line
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FadeRequest {
    /// Crossfade to the given clip on the foreground channel
    ToForeground(PathBuf),
    /// Fade the foreground out and hand audio back to the background loop
    ToBackground,
}

/// Maps normalized command lines to fade requests. Pure lookup, no state
/// beyond the clip table.
#[derive(Debug, Clone)]
pub struct Dispatcher {
    clips: BTreeMap<String, PathBuf>,
}

impl Dispatcher {
    pub fn new(clips: BTreeMap<String, PathBuf>) -> Self {
        Self { clips }
    }

    /// Resolve one normalized line. Unrecognized tokens are ignored.
    pub fn dispatch(&self, line: &str) -> Option<FadeRequest> {
        if line == STOP_TOKEN {
            return Some(FadeRequest::ToBackground);
        }
        match self.clips.get(line) {
            Some(path) => Some(FadeRequest::ToForeground(path.clone())),
            None => {
                log::debug!("Ignoring unrecognized command: {:?}", line);
                None
            }
        }
    }
}
