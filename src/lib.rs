//! shiplane - data-driven release lane runner
//!
//! Replaces per-app release automation scripts with a single inventory of
//! apps, signing variants, and lanes. A lane run is an explicit ordered
//! plan of typed action steps dispatched to an external automation tool,
//! each step carrying a declared failure policy so keychain cleanup runs
//! even when packaging or upload fails.

pub mod action;
pub mod inventory;
pub mod keychain;
pub mod lane;
pub mod plan;
pub mod secret;
pub mod settings;
pub mod signal;
pub mod state;
pub mod summary;

pub use inventory::{LaneSelection, ReleaseInventory};
pub use plan::LanePlan;
pub use summary::{ExitCode, LaneSummary};
