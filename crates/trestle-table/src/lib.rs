//! Trestle Table
//!
//! The table layer users and actions write through. It validates rows against
//! a table's fields, persists them via a [`Store`](trestle_store::Store), and
//! runs every trigger registered for the mutated table and event before the
//! write call returns.
//!
//! - [`Tables`]: create, find and delete tables; entry point for everything else
//! - [`Table`]: row reads and the three mutating operations that dispatch triggers
//! - [`Triggers`]: trigger record management
//!
//! Dispatch is sequential, in trigger creation order. What happens when an
//! action fails is governed by [`FailurePolicy`](trestle_config::FailurePolicy).

mod error;
mod notifier;
mod table;
mod triggers;

pub use error::TableError;
pub use table::{Table, Tables};
pub use triggers::Triggers;
