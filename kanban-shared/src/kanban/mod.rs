/// Board, column and card domain logic
///
/// - [`rules`]: pure decisions (WIP limits, positions, column order, seeding)
/// - [`service`]: the [`service::Kanban`] operations built on a [`crate::store::Store`]

pub mod rules;
pub mod service;
