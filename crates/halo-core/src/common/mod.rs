pub mod config;
pub mod constants;
pub mod grid;
pub mod naming;

pub use config::{
    HaloModelConfig, ProfileParameters, TransformConfig, TransformSolverKind, load_config,
};
pub use grid::LogGrid;
pub use naming::{checkpoint_prefix, profile_prefix, surface_prefix, table_prefix};
