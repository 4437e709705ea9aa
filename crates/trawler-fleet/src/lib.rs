//! trawler-fleet — worker instance lifecycle.
//!
//! [`FleetManager`] drives the lifecycle operations the orchestrator
//! needs (create, poll to a final status, bootstrap the queue
//! consumer, terminate) over two pluggable seams:
//!
//! ```text
//! FleetManager
//!   ├── ComputeBackend    instance CRUD + status + credit balance
//!   │     └── SimCompute  (in-tree; vendor adapters out of tree)
//!   └── RemoteExec        command channel onto a booted instance
//!         ├── SshExec     (system ssh client)
//!         └── SimExec     (in-tree, records calls)
//! ```
//!
//! Instances created here are tagged orchestrator-owned; automatic
//! scale-down only ever touches owned instances, so machines somebody
//! provisioned by hand are never terminated out from under them.

pub mod backend;
pub mod error;
pub mod manager;
pub mod sim;
pub mod ssh;

pub use backend::{ComputeBackend, ExecOutput, InstanceFilter, RemoteExec, StateTransition};
pub use error::{FleetError, FleetResult};
pub use manager::{FleetManager, TerminateTarget};
pub use sim::{SimCompute, SimExec};
pub use ssh::SshExec;
