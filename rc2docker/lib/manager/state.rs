use std::fmt;

//--------------------------------------------------------------------------------------------------
// Types
//--------------------------------------------------------------------------------------------------

/// The coarse state of a [`DockerManager`](super::DockerManager).
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum ManagerState {
    /// `initialize` has not been called.
    #[default]
    Uninitialized,

    /// Loading and checking the engine version.
    VersionChecking,

    /// Refreshing the required image manifest.
    ImageInfoChecking,

    /// Ensuring the network and volumes exist and loading containers and images.
    ContainerInitializing,

    /// Initialized. Operations can be dispatched.
    Ready,

    /// Initialization failed.
    NotReady {
        /// The stage that failed.
        stage: ManagerStage,

        /// Why it failed.
        reason: String,
    },
}

/// The orchestration stage an error occurred in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ManagerStage {
    /// Connecting to the engine and checking its api version.
    VersionCheck,

    /// Refreshing the required image manifest.
    ImageInfoCheck,

    /// Creating the network, volumes or containers, or loading them.
    ContainerInit,

    /// Pulling images.
    Pull,

    /// A lifecycle operation, exec or backup on a ready manager.
    Operation,
}

//--------------------------------------------------------------------------------------------------
// Methods
//--------------------------------------------------------------------------------------------------

impl ManagerState {
    /// Returns true once initialization succeeded.
    pub fn is_ready(&self) -> bool {
        *self == ManagerState::Ready
    }
}

//--------------------------------------------------------------------------------------------------
// Trait Implementations
//--------------------------------------------------------------------------------------------------

impl fmt::Display for ManagerState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ManagerState::Uninitialized => f.write_str("uninitialized"),
            ManagerState::VersionChecking => f.write_str("checking engine version"),
            ManagerState::ImageInfoChecking => f.write_str("checking image info"),
            ManagerState::ContainerInitializing => f.write_str("initializing containers"),
            ManagerState::Ready => f.write_str("ready"),
            ManagerState::NotReady { stage, reason } => {
                write!(f, "not ready ({stage} failed: {reason})")
            }
        }
    }
}

impl fmt::Display for ManagerStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ManagerStage::VersionCheck => "version check",
            ManagerStage::ImageInfoCheck => "image info check",
            ManagerStage::ContainerInit => "container initialization",
            ManagerStage::Pull => "image pull",
            ManagerStage::Operation => "container operation",
        };
        f.write_str(s)
    }
}
