//! ember-watchdog — on-node cluster burnout.
//!
//! Runs next to the scheduler it watches. After every worker has
//! reported zero executing tasks for a full grace period, the watchdog
//! sends a farewell notification and deletes the cluster it is running
//! on. A run is one-shot; a watchdog that has deleted its cluster has
//! nothing left to watch.

pub mod activity;
pub mod watchdog;

pub use activity::{
    ActivityError, ActivityResult, ActivitySource, HttpActivitySource, ScriptedActivity,
};
pub use watchdog::{IdleWatchdog, WatchdogError, WatchdogOutcome, WatchdogResult};
