//! Automated game-prototype pipeline driven by an external coding agent.
//!
//! Given a handful of Steam-style tags, the pipeline walks a fixed sequence
//! of phases (concept → design guides → guide review → detailed specs →
//! spec review → implementation), invoking the `claude` CLI once per phase
//! inside a dated workspace directory and publishing the artifacts to a
//! GitHub repository as phases complete. The architecture keeps a strict
//! separation:
//!
//! - **[`io`]**: Side-effecting operations (filesystem, git, agent process
//!   execution). Isolated behind small adapters to enable scripting in tests.
//! - **Orchestration ([`pipeline`], [`refine`])**: sequencing, checkpointing,
//!   and the bounded refinement loop for the final phase. Fail-fast: the
//!   first phase failure halts the run; publishing failures never do.

pub mod config;
pub mod exit_codes;
pub mod io;
pub mod logging;
pub mod phase;
pub mod pipeline;
pub mod prompt;
pub mod refine;
pub mod tags;
#[cfg(any(test, feature = "test-support"))]
pub mod test_support;
