//! Finite state machine for the installation sequence

use serde::{Deserialize, Serialize};

/// Installation state, in the only order they can be reached
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InstallState {
    /// Nothing done yet
    Initial,

    /// Host checked, prerequisites present
    PrerequisitesChecked,

    /// Application sources available in the install dir
    RepositoryAcquired,

    /// Data directories exist
    DirectoriesPrepared,

    /// Environment file written
    ConfigResolved,

    /// Deployment descriptor and proxy config written
    TopologyRendered,

    /// Images built
    ServicesBuilt,

    /// Containers started
    ServicesStarted,
}

impl InstallState {
    /// The state that must follow this one
    pub fn successor(&self) -> Option<InstallState> {
        match self {
            InstallState::Initial => Some(InstallState::PrerequisitesChecked),
            InstallState::PrerequisitesChecked => Some(InstallState::RepositoryAcquired),
            InstallState::RepositoryAcquired => Some(InstallState::DirectoriesPrepared),
            InstallState::DirectoriesPrepared => Some(InstallState::ConfigResolved),
            InstallState::ConfigResolved => Some(InstallState::TopologyRendered),
            InstallState::TopologyRendered => Some(InstallState::ServicesBuilt),
            InstallState::ServicesBuilt => Some(InstallState::ServicesStarted),
            InstallState::ServicesStarted => None,
        }
    }

    /// Services are running from this state on, so failures stop being fatal
    pub fn is_post_start(&self) -> bool {
        *self >= InstallState::ServicesStarted
    }
}

/// Installation FSM
#[derive(Debug, Clone)]
pub struct InstallFsm {
    state: InstallState,
    history: Vec<InstallState>,
}

impl InstallFsm {
    pub fn new() -> Self {
        Self {
            state: InstallState::Initial,
            history: vec![InstallState::Initial],
        }
    }

    pub fn state(&self) -> InstallState {
        self.state
    }

    /// Every state reached so far, in order
    pub fn history(&self) -> &[InstallState] {
        &self.history
    }

    /// Move to `next`, which must be the direct successor of the current state
    pub fn advance(&mut self, next: InstallState) -> Result<(), String> {
        if self.state.successor() != Some(next) {
            return Err(format!(
                "Invalid transition: {:?} -> {:?}",
                self.state, next
            ));
        }
        self.state = next;
        self.history.push(next);
        Ok(())
    }
}

impl Default for InstallFsm {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fsm_transitions() {
        let mut fsm = InstallFsm::new();
        assert_eq!(fsm.state(), InstallState::Initial);

        let mut state = InstallState::Initial;
        while let Some(next) = state.successor() {
            fsm.advance(next).unwrap();
            state = next;
        }

        assert_eq!(fsm.state(), InstallState::ServicesStarted);
        assert_eq!(fsm.history().len(), 8);
        assert!(fsm.state().is_post_start());
    }

    #[test]
    fn test_fsm_rejects_skipping() {
        let mut fsm = InstallFsm::new();
        fsm.advance(InstallState::PrerequisitesChecked).unwrap();

        let err = fsm.advance(InstallState::ConfigResolved).unwrap_err();
        assert!(err.contains("PrerequisitesChecked -> ConfigResolved"));
        assert_eq!(fsm.state(), InstallState::PrerequisitesChecked);
    }

    #[test]
    fn test_fsm_rejects_going_back() {
        let mut fsm = InstallFsm::new();
        fsm.advance(InstallState::PrerequisitesChecked).unwrap();
        assert!(fsm.advance(InstallState::PrerequisitesChecked).is_err());
        assert!(fsm.advance(InstallState::Initial).is_err());
        assert!(!fsm.state().is_post_start());
    }
}
