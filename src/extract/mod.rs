//! Structural extraction: component tags per file, plus repository-level
//! dependency and CI metadata.

mod ci;
mod classify;
mod manifest;

pub use ci::{detect_ci, CiInfo};
pub use classify::{classify, is_entry_point, ComponentTag};
pub use manifest::{
    extract_dependencies, extract_package_name, parse_pom, parse_pyproject, parse_requirements,
    DependencyInfo, FrameworkInfo, PomInfo,
};
