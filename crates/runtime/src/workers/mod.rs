//! Background tasks owned by the runtime.
//!
//! Each loaded creature gets a [`Watcher`] that folds store changes into its
//! session cache and schedules debounced recomputes.

mod watcher;

pub(crate) use watcher::Watcher;
