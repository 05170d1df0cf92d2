/// Windows backend — volume enumeration and raw handle probing.
pub mod prober;
pub mod volumes;

pub use prober::WindowsProber;
pub use volumes::{VolumeEnumerator, VolumeKind};

use super::{Backend, OpenProbeBuilder};
use std::sync::Arc;

/// Collaborators for the local machine.
pub fn backend() -> Backend {
    let prober = Arc::new(WindowsProber);
    Backend::new(
        Arc::new(VolumeEnumerator::new()),
        Arc::new(OpenProbeBuilder::new(prober.clone())),
        prober,
    )
}
