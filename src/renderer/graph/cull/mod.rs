//! GPU culling: the hierarchical depth pyramid and the late occlusion culler.

mod hzb;
mod occlusion;

pub use hzb::{HZB_FORMAT, HzbBuilder, HzbPyramid, mip_count, mip_size};
pub use occlusion::{CullSkip, LateOcclusionCuller, skip_reason};
