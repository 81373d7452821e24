//! Build context for kiteplan
//!
//! Resolves every environment-dependent parameter the plan builder needs
//! (runtime matrix, primary runtime, image names, build id, queues) from a
//! single [`EnvSnapshot`] and the project's version file.
//!
//! # Environment
//!
//! | Variable | Used for |
//! |----------|----------|
//! | `BUILDKITE`, `CI` | CI detection |
//! | `BUILDKITE_PIPELINE_NAME` | project root selection |
//! | `BUILDKITE_BUILD_ID`, `BUILD_ID` | build id |
//! | `BUILDKITE_AGENT_META_DATA_QUEUE` | agent queue |
//! | `BUILD_QUEUE`, `RUN_QUEUE` | queue overrides |
//! | `DOCKER_IMAGE` | image base override |

pub mod context;
pub mod env;
pub mod probe;
pub mod runtime;

pub use context::BuildContext;
pub use env::EnvSnapshot;
pub use probe::{FileProbe, FsProbe, MemoryProbe};
pub use runtime::RuntimeConfig;
