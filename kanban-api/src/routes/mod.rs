/// API route handlers
///
/// - `health`: Health check endpoint
/// - `auth`: Register, login, refresh and logout
/// - `boards`: Board listing, detail and owner mutations
/// - `columns`: Column creation and owner mutations
/// - `cards`: Card detail, mutations and moves
/// - `history`: Card and board history

pub mod auth;
pub mod boards;
pub mod cards;
pub mod columns;
pub mod health;
pub mod history;

use serde::{Deserialize, Deserializer};

/// Distinguishes an absent field (`None`) from an explicit `null` (`Some(None)`)
///
/// Use with `#[serde(default, deserialize_with = "double_option")]`.
pub(crate) fn double_option<'de, D, T>(deserializer: D) -> Result<Option<Option<T>>, D::Error>
where
    D: Deserializer<'de>,
    T: Deserialize<'de>,
{
    Option::<T>::deserialize(deserializer).map(Some)
}
