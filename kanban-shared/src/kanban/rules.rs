//! Board rules shared by every storage backend
//!
//! Everything here is a pure function of already-loaded state. The stores
//! call these while holding their locks, so a decision and the write that
//! follows it always see the same data.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::{KanbanError, KanbanResult};
use crate::models::{board, card, column};
use crate::models::card::Card;
use crate::models::column::Column;

/// WIP limit used for columns that should never fill up in practice
pub const UNLIMITED_WIP: i32 = 999;

/// A column created together with every new board
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ColumnSeed {
    pub name: &'static str,
    pub wip_limit: i32,
    pub order: i32,
}

/// Columns every board starts with, left to right
pub const DEFAULT_COLUMNS: [ColumnSeed; 3] = [
    ColumnSeed {
        name: "To Do",
        wip_limit: UNLIMITED_WIP,
        order: 1,
    },
    ColumnSeed {
        name: "Doing",
        wip_limit: 3,
        order: 2,
    },
    ColumnSeed {
        name: "Done",
        wip_limit: UNLIMITED_WIP,
        order: 3,
    },
];

/// Where a moved card lands in its new column
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Placement {
    Top,
    Bottom,
}

/// Live card count and position bounds of one column
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Occupancy {
    pub count: i64,
    pub min_position: Option<i64>,
    pub max_position: Option<i64>,
}

impl Occupancy {
    pub fn of<'a>(cards: impl IntoIterator<Item = &'a Card>) -> Self {
        cards.into_iter().fold(Occupancy::default(), |acc, card| Occupancy {
            count: acc.count + 1,
            min_position: Some(acc.min_position.map_or(card.position, |p| p.min(card.position))),
            max_position: Some(acc.max_position.map_or(card.position, |p| p.max(card.position))),
        })
    }
}

/// Rejects the insert when the column already holds `wip_limit` cards
///
/// A count above the limit (after the limit was lowered) is rejected too.
pub fn ensure_capacity(column: &Column, occupancy: &Occupancy) -> KanbanResult<()> {
    if occupancy.count >= i64::from(column.wip_limit) {
        return Err(KanbanError::WipLimitReached {
            column_id: column.id,
            wip_limit: column.wip_limit,
        });
    }
    Ok(())
}

/// Position for a card entering a column
///
/// Top goes one above the current minimum, bottom one below the current
/// maximum; an empty column starts at 1 either way.
pub fn position_for(placement: Placement, occupancy: &Occupancy) -> i64 {
    match placement {
        Placement::Top => occupancy.min_position.map_or(1, |min| min - 1),
        Placement::Bottom => occupancy.max_position.map_or(1, |max| max + 1),
    }
}

/// `order` for a column appended to a board; freed values are never reused
pub fn next_order(existing: impl IntoIterator<Item = i32>) -> i32 {
    existing.into_iter().max().map_or(1, |max| max + 1)
}

/// The column must belong to the board the card is being created on
pub fn ensure_column_in_board(column: &Column, board_id: Uuid) -> KanbanResult<()> {
    if column.board_id != board_id {
        return Err(KanbanError::validation(
            "column_id",
            "The selected column does not belong to this board.",
        ));
    }
    Ok(())
}

/// Structural checks for a move, run before the WIP check
pub fn check_move(card: &Card, target: &Column) -> KanbanResult<()> {
    if card.column_id == target.id {
        return Err(KanbanError::SameColumnMove {
            card_id: card.id,
            column_id: target.id,
        });
    }

    if card.board_id != target.board_id {
        return Err(KanbanError::validation(
            "to_column_id",
            "Cards can only move between columns of the same board.",
        ));
    }

    Ok(())
}

fn check_text(field: &str, value: &str, max_len: usize) -> KanbanResult<()> {
    if value.trim().is_empty() {
        return Err(KanbanError::validation(field, format!("The {} field is required.", field)));
    }
    if value.chars().count() > max_len {
        return Err(KanbanError::validation(
            field,
            format!("The {} may not be greater than {} characters.", field, max_len),
        ));
    }
    Ok(())
}

fn check_optional_text(field: &str, value: Option<&str>, max_len: usize) -> KanbanResult<()> {
    match value {
        Some(value) if value.chars().count() > max_len => Err(KanbanError::validation(
            field,
            format!("The {} may not be greater than {} characters.", field, max_len),
        )),
        _ => Ok(()),
    }
}

pub fn validate_board_title(title: &str) -> KanbanResult<()> {
    check_text("title", title, board::TITLE_MAX_LEN)
}

pub fn validate_board_description(description: Option<&str>) -> KanbanResult<()> {
    check_optional_text("description", description, board::DESCRIPTION_MAX_LEN)
}

pub fn validate_column_name(name: &str) -> KanbanResult<()> {
    check_text("name", name, column::NAME_MAX_LEN)
}

pub fn validate_wip_limit(wip_limit: i32) -> KanbanResult<()> {
    if wip_limit < 0 {
        return Err(KanbanError::validation(
            "wip_limit",
            "The wip limit must be at least 0.",
        ));
    }
    Ok(())
}

pub fn validate_card_title(title: &str) -> KanbanResult<()> {
    check_text("title", title, card::TITLE_MAX_LEN)
}
