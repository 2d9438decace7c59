// ABOUTME: Library crate for robodeploy exposing the deploy core for testing and reuse
//
// Leaf-first: transport capabilities, then the directory synchronizer, the
// remote runner and fan-out coordinator, and the pipeline that ties them together.

#![allow(missing_docs)]

pub mod build_hook;
pub mod config;
pub mod console;
pub mod credentials;
pub mod deploy;
pub mod error;
pub mod fanout;
pub mod hosts;
pub mod runner;
pub mod sync;
pub mod transport;

pub use config::{ConfigLayer, DeployConfig, RobotConfig};
pub use console::{Console, ConsoleLine, ConsoleWriter, LineKind};
pub use deploy::{DeployReport, Deployer, HostFailure, Stage, Stages};
pub use error::{DeployError, RemoteOp, Result};
pub use fanout::{FanOut, FanoutReport, HostRun};
pub use hosts::{HostTarget, RunSet, Selector};
pub use runner::{OutputLines, RunOutcome};
pub use sync::{FileEntry, SyncReport, Synchronizer};
