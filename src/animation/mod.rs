//! Animation states, their image-sequence bindings and the looping handle

pub mod driver;
pub mod motion;

use crate::error::ResourceMissing;
use std::collections::HashMap;
use std::fmt;
use std::path::{Path, PathBuf};

pub use driver::{AnimationDriver, Priority, RecoveryStrategy, Scheduled, TransitionKind};
pub use motion::{Point, Pose, Rect, Size};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AnimationState {
    Idle,
    WalkLeft,
    WalkRight,
    PhoneWalkLeft,
    PhoneWalkRight,
    Jump,
    Touch,
    Shake,
}

impl AnimationState {
    pub const ALL: [AnimationState; 8] = [
        AnimationState::Idle,
        AnimationState::WalkLeft,
        AnimationState::WalkRight,
        AnimationState::PhoneWalkLeft,
        AnimationState::PhoneWalkRight,
        AnimationState::Jump,
        AnimationState::Touch,
        AnimationState::Shake,
    ];

    /// Symbolic name, also the resource file stem
    pub fn name(self) -> &'static str {
        match self {
            AnimationState::Idle => "idle",
            AnimationState::WalkLeft => "walkleft",
            AnimationState::WalkRight => "walkright",
            AnimationState::PhoneWalkLeft => "phonewalkleft",
            AnimationState::PhoneWalkRight => "phonewalkright",
            AnimationState::Jump => "jump",
            AnimationState::Touch => "touch",
            AnimationState::Shake => "shake",
        }
    }

    pub fn from_name(name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|s| s.name() == name)
    }
}

impl fmt::Display for AnimationState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// State → looping image sequence, fixed for the life of the process
#[derive(Debug, Clone, Default)]
pub struct AnimationBindings {
    paths: HashMap<AnimationState, PathBuf>,
}

impl AnimationBindings {
    /// Binds every state to `<dir>/<name>.gif`
    pub fn from_dir(dir: &Path) -> Self {
        let paths = AnimationState::ALL
            .into_iter()
            .map(|state| (state, dir.join(format!("{}.gif", state.name()))))
            .collect();
        Self { paths }
    }

    pub fn bind(mut self, state: AnimationState, path: impl Into<PathBuf>) -> Self {
        self.paths.insert(state, path.into());
        self
    }

    /// The resource for `state`, if it is bound and present on disk
    pub fn resolve(&self, state: AnimationState) -> Result<&Path, ResourceMissing> {
        match self.paths.get(&state) {
            Some(path) if path.exists() => Ok(path),
            Some(path) => Err(ResourceMissing {
                name: state.name().to_string(),
                path: path.clone(),
            }),
            None => Err(ResourceMissing {
                name: state.name().to_string(),
                path: PathBuf::new(),
            }),
        }
    }

    /// Every state whose resource cannot be found
    pub fn missing(&self) -> Vec<ResourceMissing> {
        AnimationState::ALL
            .into_iter()
            .filter_map(|state| self.resolve(state).err())
            .collect()
    }
}

/// What the visible loop is showing
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LoopSource {
    Resource(PathBuf),
    /// Stand-in visual used when the resource is unavailable
    Fallback,
}

/// The active looping sequence
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoopHandle {
    state: AnimationState,
    source: LoopSource,
    running: bool,
}

impl LoopHandle {
    pub(crate) fn start(state: AnimationState, source: LoopSource) -> Self {
        Self {
            state,
            source,
            running: true,
        }
    }

    pub fn state(&self) -> AnimationState {
        self.state
    }

    pub fn source(&self) -> &LoopSource {
        &self.source
    }

    pub fn is_running(&self) -> bool {
        self.running
    }

    /// Marks the loop as stopped, as reported by whatever renders it.
    pub fn stall(&mut self) {
        self.running = false;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn names_round_trip() {
        for state in AnimationState::ALL {
            assert_eq!(AnimationState::from_name(state.name()), Some(state));
        }
        assert_eq!(AnimationState::from_name("dance"), None);
    }

    #[test]
    fn bindings_report_missing_files() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("idle.gif"), b"GIF89a").unwrap();
        let bindings = AnimationBindings::from_dir(dir.path());

        assert_eq!(bindings.resolve(AnimationState::Idle).unwrap(), dir.path().join("idle.gif"));
        let missing = bindings.resolve(AnimationState::Jump).unwrap_err();
        assert_eq!(missing.name, "jump");
        assert_eq!(bindings.missing().len(), AnimationState::ALL.len() - 1);
    }
}
