//! Selective Naive Bayes weighted-selection optimiser.
//!
//! See the module-level docs of each submodule for the corresponding
//! component: [`partition`] and [`attribute`] (C1), [`slice_set`] (C2),
//! [`schema`] (C3), [`selection`] (C4), [`cost`] (C5), [`scorer`] (C6),
//! [`driver`] (C7), [`io`] and [`report`] (C8).

pub mod attribute;
pub mod cost;
pub mod driver;
pub mod error;
pub mod io;
pub mod layout;
pub mod partition;
pub mod report;
pub mod schema;
pub mod scorer;
pub mod selection;
pub mod slice_set;

pub use error::{Error, Result};
