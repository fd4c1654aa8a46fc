use serde::Serialize;
use tracing::warn;

use super::error::RemeshError;

/// Default number of target faces
pub const DEFAULT_FACE_COUNT: u32 = 500;

/// Face counts above this are allowed but usually slow
pub const SOFT_MAX_FACE_COUNT: u32 = 2000;

/// User-chosen options for a single remesh run.
///
/// Built once per invocation and never mutated afterwards. The `with_*`
/// methods consume and return the value so a run can be described fluently:
///
/// ```ignore
/// let options = RemeshOptions::new(800)?.with_adaptive(true).with_acceleration(false);
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct RemeshOptions {
    sharp: bool,
    adaptive: bool,
    minimum_cost_flow: bool,
    target_face_count: u32,
    use_hardware_acceleration: bool,
}

impl Default for RemeshOptions {
    fn default() -> Self {
        Self {
            sharp: false,
            adaptive: false,
            minimum_cost_flow: false,
            target_face_count: DEFAULT_FACE_COUNT,
            use_hardware_acceleration: true,
        }
    }
}

impl RemeshOptions {
    /// Create options targeting `target_face_count` faces. Zero is rejected.
    pub fn new(target_face_count: u32) -> Result<Self, RemeshError> {
        if target_face_count == 0 {
            return Err(RemeshError::InvalidOptions(
                "target face count must be greater than zero".to_string(),
            ));
        }

        if target_face_count > SOFT_MAX_FACE_COUNT {
            warn!(
                target_face_count,
                soft_max = SOFT_MAX_FACE_COUNT,
                "Target face count is above the recommended maximum"
            );
        }

        Ok(Self {
            target_face_count,
            ..Self::default()
        })
    }

    /// Try to follow sharp edges
    pub fn with_sharp(mut self, sharp: bool) -> Self {
        self.sharp = sharp;
        self
    }

    pub fn with_adaptive(mut self, adaptive: bool) -> Self {
        self.adaptive = adaptive;
        self
    }

    pub fn with_minimum_cost_flow(mut self, minimum_cost_flow: bool) -> Self {
        self.minimum_cost_flow = minimum_cost_flow;
        self
    }

    /// Prefer the CUDA build of the remesher
    pub fn with_acceleration(mut self, use_hardware_acceleration: bool) -> Self {
        self.use_hardware_acceleration = use_hardware_acceleration;
        self
    }

    pub fn sharp(&self) -> bool {
        self.sharp
    }

    pub fn adaptive(&self) -> bool {
        self.adaptive
    }

    pub fn minimum_cost_flow(&self) -> bool {
        self.minimum_cost_flow
    }

    pub fn target_face_count(&self) -> u32 {
        self.target_face_count
    }

    pub fn use_hardware_acceleration(&self) -> bool {
        self.use_hardware_acceleration
    }
}
