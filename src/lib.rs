//! Core library for the plan-extract command line application.
//!
//! Data flows in one direction: the API clients under [`api`] pull paged
//! records from the portfolio and task services, [`reconcile`] links projects
//! across the two by portfolio key, [`flatten`] reshapes records into sheet
//! tables, and the publishers in [`io`] write those tables to a workbook file
//! or a cloud spreadsheet. [`export`] strings the steps together.

pub mod api;
pub mod config;
pub mod error;
pub mod export;
pub mod flatten;
pub mod io;
pub mod model;
pub mod reconcile;

pub use error::{ExtractError, Result};
