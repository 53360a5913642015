/// End-to-end board flows against the in-memory store
///
/// Run with: cargo test --test kanban_flow_tests

use std::sync::Arc;

use kanban_shared::error::{Entity, KanbanError};
use kanban_shared::kanban::rules::{Placement, UNLIMITED_WIP};
use kanban_shared::kanban::service::{Kanban, NewBoard, NewCard};
use kanban_shared::models::board::{BoardWithColumns, UpdateBoard};
use kanban_shared::models::column::{CreateColumn, UpdateColumn};
use kanban_shared::models::history::HistoryAction;
use kanban_shared::models::user::{CreateUser, User};
use kanban_shared::store::{memory::MemoryStore, Store};
use uuid::Uuid;

struct Fixture {
    kanban: Kanban,
    owner: User,
    other: User,
    board: BoardWithColumns,
}

impl Fixture {
    fn column(&self, name: &str) -> Uuid {
        self.board
            .columns
            .iter()
            .find(|c| c.name == name)
            .map(|c| c.id)
            .expect("seeded column")
    }

    async fn card(&self, actor: &User, column: &str, title: &str) -> Uuid {
        self.kanban
            .create_card(
                actor,
                self.board.board.id,
                NewCard {
                    column_id: self.column(column),
                    title: title.to_string(),
                    description: None,
                },
            )
            .await
            .expect("create card")
            .id
    }
}

async fn register(store: &Arc<dyn Store>, name: &str) -> User {
    store
        .create_user(CreateUser {
            name: name.to_string(),
            email: format!("{}@example.com", name.to_lowercase()),
            password_hash: "hash".to_string(),
        })
        .await
        .expect("create user")
}

async fn fixture() -> Fixture {
    let store: Arc<dyn Store> = Arc::new(MemoryStore::new());
    let kanban = Kanban::new(store.clone());

    let owner = register(&store, "Ada").await;
    let other = register(&store, "Grace").await;

    let board = kanban
        .create_board(
            &owner,
            NewBoard {
                title: "Launch".to_string(),
                description: Some("Q3 launch".to_string()),
            },
        )
        .await
        .expect("create board");

    Fixture {
        kanban,
        owner,
        other,
        board,
    }
}

#[tokio::test]
async fn test_new_board_is_seeded_with_three_columns() {
    let f = fixture().await;

    let seeded: Vec<(&str, i32, i32)> = f
        .board
        .columns
        .iter()
        .map(|c| (c.name.as_str(), c.wip_limit, c.order))
        .collect();

    assert_eq!(
        seeded,
        vec![("To Do", UNLIMITED_WIP, 1), ("Doing", 3, 2), ("Done", UNLIMITED_WIP, 3)]
    );
    assert_eq!(f.board.board.owner_id, f.owner.id);
}

#[tokio::test]
async fn test_fourth_card_into_doing_hits_wip_limit() {
    let f = fixture().await;

    for title in ["a", "b", "c"] {
        f.card(&f.owner, "Doing", title).await;
    }

    let rejected = f
        .kanban
        .create_card(
            &f.other,
            f.board.board.id,
            NewCard {
                column_id: f.column("Doing"),
                title: "d".to_string(),
                description: None,
            },
        )
        .await;

    match rejected {
        Err(KanbanError::WipLimitReached { column_id, wip_limit }) => {
            assert_eq!(column_id, f.column("Doing"));
            assert_eq!(wip_limit, 3);
        }
        other => panic!("expected WIP rejection, got {other:?}"),
    }

    // Moving into the full column is rejected the same way
    let todo_card = f.card(&f.owner, "To Do", "e").await;
    assert!(matches!(
        f.kanban
            .move_card(&f.owner, todo_card, f.column("Doing"), Placement::Bottom)
            .await,
        Err(KanbanError::WipLimitReached { .. })
    ));

    let detail = f.kanban.board_detail(f.board.board.id).await.unwrap();
    let doing = detail.columns.iter().find(|c| c.column.name == "Doing").unwrap();
    assert_eq!(doing.cards.len(), 3);
}

#[tokio::test]
async fn test_move_to_top_places_card_above_existing_cards() {
    let f = fixture().await;

    f.card(&f.owner, "Doing", "existing").await;
    let moving = f.card(&f.owner, "To Do", "urgent").await;

    let moved = f
        .kanban
        .move_card(&f.other, moving, f.column("Doing"), Placement::Top)
        .await
        .unwrap();
    assert_eq!(moved.column_id, f.column("Doing"));

    let detail = f.kanban.board_detail(f.board.board.id).await.unwrap();
    let doing = detail.columns.iter().find(|c| c.column.name == "Doing").unwrap();
    let titles: Vec<&str> = doing.cards.iter().map(|c| c.card.title.as_str()).collect();
    assert_eq!(titles, vec!["urgent", "existing"]);

    let history = f.kanban.card_history(moving).await.unwrap();
    let last = history.last().unwrap();
    assert_eq!(last.action, HistoryAction::Moved);
    assert_eq!(last.from_column.as_ref().unwrap().name, "To Do");
    assert_eq!(last.to_column.as_ref().unwrap().name, "Doing");
    assert_eq!(last.by_user.as_ref().unwrap().id, f.other.id);
}

#[tokio::test]
async fn test_same_column_move_is_rejected() {
    let f = fixture().await;
    let card = f.card(&f.owner, "To Do", "stay").await;

    assert!(matches!(
        f.kanban
            .move_card(&f.owner, card, f.column("To Do"), Placement::Top)
            .await,
        Err(KanbanError::SameColumnMove { .. })
    ));

    let history = f.kanban.card_history(card).await.unwrap();
    assert_eq!(history.len(), 1);
}

#[tokio::test]
async fn test_move_to_another_boards_column_is_rejected() {
    let f = fixture().await;
    let card = f.card(&f.owner, "To Do", "stay").await;

    let elsewhere = f
        .kanban
        .create_board(
            &f.other,
            NewBoard {
                title: "Other".to_string(),
                description: None,
            },
        )
        .await
        .unwrap();

    assert!(matches!(
        f.kanban
            .move_card(&f.owner, card, elsewhere.columns[0].id, Placement::Bottom)
            .await,
        Err(KanbanError::Validation { ref field, .. }) if field == "to_column_id"
    ));
}

#[tokio::test]
async fn test_column_delete_removes_cards_but_keeps_history() {
    let f = fixture().await;
    let card = f.card(&f.owner, "Doing", "doomed").await;

    f.kanban.delete_column(&f.owner, f.column("Doing")).await.unwrap();

    assert!(matches!(
        f.kanban.card_detail(card).await,
        Err(KanbanError::NotFound { entity: Entity::Card, .. })
    ));

    let history = f.kanban.card_history(card).await.unwrap();
    let actions: Vec<HistoryAction> = history.iter().map(|h| h.action).collect();
    assert_eq!(actions, vec![HistoryAction::Created, HistoryAction::Deleted]);
    assert_eq!(history[1].from_column.as_ref().unwrap().name, "Doing");

    let board_history = f.kanban.board_history(f.board.board.id).await.unwrap();
    assert_eq!(board_history.len(), 2);
}

#[tokio::test]
async fn test_history_of_unknown_card_is_not_found() {
    let f = fixture().await;

    assert!(matches!(
        f.kanban.card_history(Uuid::new_v4()).await,
        Err(KanbanError::NotFound { entity: Entity::Card, .. })
    ));
}

#[tokio::test]
async fn test_non_owner_cannot_change_board_structure() {
    let f = fixture().await;
    let board_id = f.board.board.id;

    let attempts = [
        f.kanban
            .update_board(
                &f.other,
                board_id,
                UpdateBoard {
                    title: Some("Mine now".to_string()),
                    description: None,
                },
            )
            .await
            .map(|_| ()),
        f.kanban
            .add_column(
                &f.other,
                board_id,
                CreateColumn {
                    name: "Review".to_string(),
                    wip_limit: 2,
                },
            )
            .await
            .map(|_| ()),
        f.kanban
            .update_column(
                &f.other,
                f.column("Doing"),
                UpdateColumn {
                    name: None,
                    wip_limit: Some(10),
                },
            )
            .await
            .map(|_| ()),
        f.kanban.delete_column(&f.other, f.column("Done")).await,
        f.kanban.delete_board(&f.other, board_id).await,
    ];

    for attempt in attempts {
        assert!(matches!(attempt, Err(KanbanError::Forbidden)));
    }

    let detail = f.kanban.board_detail(board_id).await.unwrap();
    assert_eq!(detail.board.title, "Launch");
    assert_eq!(detail.columns.len(), 3);
}

#[tokio::test]
async fn test_non_owner_is_forbidden_before_input_is_checked() {
    let f = fixture().await;
    let board_id = f.board.board.id;

    let update = f
        .kanban
        .update_board(
            &f.other,
            board_id,
            UpdateBoard {
                title: Some(String::new()),
                description: None,
            },
        )
        .await;
    assert!(matches!(update, Err(KanbanError::Forbidden)));

    let added = f
        .kanban
        .add_column(
            &f.other,
            board_id,
            CreateColumn {
                name: "x".repeat(41),
                wip_limit: -1,
            },
        )
        .await;
    assert!(matches!(added, Err(KanbanError::Forbidden)));

    let renamed = f
        .kanban
        .update_column(
            &f.other,
            f.column("Doing"),
            UpdateColumn {
                name: Some(String::new()),
                wip_limit: Some(-5),
            },
        )
        .await;
    assert!(matches!(renamed, Err(KanbanError::Forbidden)));

    // The owner sending the same input is told what is wrong with it
    let owner_update = f
        .kanban
        .update_board(
            &f.owner,
            board_id,
            UpdateBoard {
                title: Some(String::new()),
                description: None,
            },
        )
        .await;
    assert!(matches!(
        owner_update,
        Err(KanbanError::Validation { ref field, .. }) if field == "title"
    ));
}

#[tokio::test]
async fn test_added_column_goes_to_the_right() {
    let f = fixture().await;

    let review = f
        .kanban
        .add_column(
            &f.owner,
            f.board.board.id,
            CreateColumn {
                name: "Review".to_string(),
                wip_limit: 2,
            },
        )
        .await
        .unwrap();
    assert_eq!(review.order, 4);

    let detail = f.kanban.board_detail(f.board.board.id).await.unwrap();
    let names: Vec<&str> = detail.columns.iter().map(|c| c.column.name.as_str()).collect();
    assert_eq!(names, vec!["To Do", "Doing", "Done", "Review"]);
}

#[tokio::test]
async fn test_lowering_wip_limit_keeps_existing_cards() {
    let f = fixture().await;
    for title in ["a", "b", "c"] {
        f.card(&f.owner, "Doing", title).await;
    }

    let column = f
        .kanban
        .update_column(
            &f.owner,
            f.column("Doing"),
            UpdateColumn {
                name: None,
                wip_limit: Some(1),
            },
        )
        .await
        .unwrap();
    assert_eq!(column.wip_limit, 1);

    let summaries = f.kanban.list_boards().await.unwrap();
    let doing = summaries[0]
        .columns
        .iter()
        .find(|c| c.column.name == "Doing")
        .unwrap();
    assert_eq!(doing.count, 3);
}

#[tokio::test]
async fn test_card_leaves_column_over_its_wip_limit() {
    let f = fixture().await;
    let mut doing = Vec::new();
    for title in ["a", "b", "c"] {
        doing.push(f.card(&f.owner, "Doing", title).await);
    }

    f.kanban
        .update_column(
            &f.owner,
            f.column("Doing"),
            UpdateColumn {
                name: None,
                wip_limit: Some(1),
            },
        )
        .await
        .unwrap();

    let moved = f
        .kanban
        .move_card(&f.other, doing[0], f.column("Done"), Placement::Bottom)
        .await
        .expect("leaving an over-limit column never fails");
    assert_eq!(moved.column_id, f.column("Done"));

    // Still at 2 of 1, so nothing may come back in
    let todo_card = f.card(&f.owner, "To Do", "d").await;
    assert!(matches!(
        f.kanban
            .move_card(&f.owner, todo_card, f.column("Doing"), Placement::Top)
            .await,
        Err(KanbanError::WipLimitReached { .. })
    ));

    let detail = f.kanban.board_detail(f.board.board.id).await.unwrap();
    let counts: Vec<(&str, usize)> = detail
        .columns
        .iter()
        .map(|c| (c.column.name.as_str(), c.cards.len()))
        .collect();
    assert_eq!(counts, vec![("To Do", 1), ("Doing", 2), ("Done", 1)]);
}

#[tokio::test]
async fn test_card_leaves_full_column() {
    let f = fixture().await;
    let mut doing = Vec::new();
    for title in ["a", "b", "c"] {
        doing.push(f.card(&f.owner, "Doing", title).await);
    }

    f.kanban
        .move_card(&f.owner, doing[2], f.column("Done"), Placement::Top)
        .await
        .expect("leaving a full column never fails");

    // The freed slot can be taken again
    f.kanban
        .move_card(&f.owner, doing[2], f.column("Doing"), Placement::Bottom)
        .await
        .expect("column is below its limit again");

    let history = f.kanban.card_history(doing[2]).await.unwrap();
    let moves: Vec<(&str, &str)> = history
        .iter()
        .filter(|e| e.action == HistoryAction::Moved)
        .map(|e| {
            (
                e.from_column.as_ref().unwrap().name.as_str(),
                e.to_column.as_ref().unwrap().name.as_str(),
            )
        })
        .collect();
    assert_eq!(moves, vec![("Doing", "Done"), ("Done", "Doing")]);
}

#[tokio::test]
async fn test_board_list_is_newest_first_with_owner() {
    let f = fixture().await;
    let newer = f
        .kanban
        .create_board(
            &f.other,
            NewBoard {
                title: "Newer".to_string(),
                description: None,
            },
        )
        .await
        .unwrap();

    let summaries = f.kanban.list_boards().await.unwrap();
    assert_eq!(summaries.len(), 2);
    assert_eq!(summaries[0].board.id, newer.board.id);
    assert_eq!(summaries[0].owner.as_ref().unwrap().id, f.other.id);
    assert_eq!(summaries[1].owner.as_ref().unwrap().name, "Ada");
}

#[tokio::test]
async fn test_invalid_input_is_rejected_before_storage() {
    let f = fixture().await;

    assert!(matches!(
        f.kanban
            .create_board(
                &f.owner,
                NewBoard {
                    title: "x".repeat(81),
                    description: None,
                },
            )
            .await,
        Err(KanbanError::Validation { ref field, .. }) if field == "title"
    ));

    assert!(matches!(
        f.kanban
            .add_column(
                &f.owner,
                f.board.board.id,
                CreateColumn {
                    name: "Review".to_string(),
                    wip_limit: -1,
                },
            )
            .await,
        Err(KanbanError::Validation { ref field, .. }) if field == "wip_limit"
    ));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_creates_never_exceed_wip_limit() {
    let f = Arc::new(fixture().await);
    let doing = f.column("Doing");

    let handles: Vec<_> = (0..10)
        .map(|i| {
            let f = f.clone();
            tokio::spawn(async move {
                f.kanban
                    .create_card(
                        &f.owner,
                        f.board.board.id,
                        NewCard {
                            column_id: doing,
                            title: format!("card {i}"),
                            description: None,
                        },
                    )
                    .await
            })
        })
        .collect();

    let mut accepted = 0;
    let mut rejected = 0;
    for handle in handles {
        match handle.await.unwrap() {
            Ok(_) => accepted += 1,
            Err(KanbanError::WipLimitReached { .. }) => rejected += 1,
            Err(e) => panic!("unexpected error: {e}"),
        }
    }

    assert_eq!(accepted, 3);
    assert_eq!(rejected, 7);

    let detail = f.kanban.board_detail(f.board.board.id).await.unwrap();
    let positions: Vec<i64> = detail
        .columns
        .iter()
        .find(|c| c.column.id == doing)
        .unwrap()
        .cards
        .iter()
        .map(|c| c.card.position)
        .collect();
    assert_eq!(positions, vec![1, 2, 3]);
}
