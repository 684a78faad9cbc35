//! Event-triggered builds
//!
//! An external receiver drops files named after projects into a watched
//! directory. [`TriggerWatcher`] wakes up on changes, [`Dispatcher`]
//! consumes each file and runs the named project's build out of process.

pub mod dispatch_log;
pub mod dispatcher;
pub mod watcher;

pub use dispatch_log::DispatchLog;
pub use dispatcher::{
    is_valid_trigger_name, BuildInvoker, DispatchOutcome, Dispatcher, Invocation, ProcessInvoker,
};
pub use watcher::{Burst, ChangeStream, NotifyWatchSource, TriggerWatcher, WatchError, WatchSource};
