pub mod cancel;
pub mod error;
pub mod kill_tree;
pub mod launcher;
pub mod orphan_sweep;
pub mod process_table;
pub mod registry;
pub mod supervisor;
pub mod timeout_kill;

pub use cancel::{cancel_all, CancelReport};
pub use error::SupervisorError;
pub use kill_tree::{Disposition, KillReport, KillTree, ProcessOutcome};
pub use launcher::{JobConfig, JobExit, JobInvocation, JobLauncher, RunningJob};
pub use orphan_sweep::sweep_orphans;
pub use process_table::{ProcessIdentity, ProcessTable};
pub use registry::{SubprocessRegistry, TrackedProcess};
pub use supervisor::{ScanOutcome, ScanSupervisor, SupervisorConfig, WILDFIRE_MODULE};
