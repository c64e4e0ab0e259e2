//! Query functions, one module per table group.
//!
//! Every entity type has an insert/update path plus a project-scoped
//! listing used to assemble a planning snapshot.

pub mod actions;
pub mod artifacts;
pub mod cards;
pub mod knowledge;
pub mod planned_files;
pub mod projects;
pub mod workflows;
