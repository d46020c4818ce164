//! Insert, read and raw SQL against SQLite.

mod common;

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use chrono::NaiveDate;
use common::{engine, recorded_engine};
use futures::TryStreamExt;
use oxide_orm::{args, Cond, HookError, Hooks, OrmError, Pk, Record, SqlValue};

#[derive(Debug, Clone, Default, PartialEq, Record)]
struct User {
    #[orm("pk autoincr")]
    id: i64,
    name: String,
}

#[derive(Debug, Clone, Default, PartialEq, Record)]
struct Contact {
    #[orm("pk autoincr")]
    id: i64,
    #[orm("varchar(64) notnull")]
    name: String,
    age: i32,
    score: f64,
    active: bool,
    nickname: Option<String>,
    #[orm("json")]
    tags: Vec<String>,
    joined: chrono::NaiveDateTime,
    #[orm("->")]
    secret: String,
}

#[derive(Debug, Clone, Default, PartialEq, Record)]
struct Membership {
    #[orm("pk")]
    group_id: i64,
    #[orm("pk")]
    user_id: i64,
    role: String,
}

static INSERTED: AtomicUsize = AtomicUsize::new(0);

#[derive(Debug, Clone, Default, PartialEq, Record)]
#[orm(hooks)]
struct Ticket {
    #[orm("pk autoincr")]
    id: i64,
    title: String,
    #[orm("-")]
    loaded: bool,
}

impl Hooks for Ticket {
    fn before_insert(&mut self) -> Result<(), HookError> {
        if self.title.is_empty() {
            return Err("ticket needs a title".into());
        }
        self.title = self.title.trim().to_string();
        Ok(())
    }

    fn after_insert(&self) {
        INSERTED.fetch_add(1, Ordering::SeqCst);
    }

    fn after_load(&mut self) {
        self.loaded = true;
    }
}

async fn users(engine: &oxide_orm::Engine, n: usize) {
    engine.sync::<User>().await.unwrap();
    let mut batch: Vec<User> = (1..=n)
        .map(|i| User {
            name: format!("user{i}"),
            ..User::default()
        })
        .collect();
    engine.insert_multi(&mut batch).await.unwrap();
}

#[tokio::test]
async fn test_insert_then_get() {
    let engine = engine().await;
    engine.create_tables(&[User::descriptor()]).await.unwrap();

    let mut user = User {
        name: "lunny".into(),
        ..User::default()
    };
    assert_eq!(engine.insert(&mut user).await.unwrap(), 1);
    assert_eq!(user.id, 1);

    let mut found = User {
        id: 1,
        ..User::default()
    };
    assert!(engine.get(&mut found).await.unwrap());
    assert_eq!(found.name, "lunny");

    let mut missing = User {
        id: 42,
        ..User::default()
    };
    assert!(!engine.get(&mut missing).await.unwrap());
    assert_eq!(missing.name, "");
}

#[tokio::test]
async fn test_round_trip_keeps_field_values() {
    let engine = engine().await;
    engine.sync::<Contact>().await.unwrap();
    let joined = NaiveDate::from_ymd_opt(2024, 5, 6)
        .unwrap()
        .and_hms_opt(7, 8, 9)
        .unwrap();
    let mut contact = Contact {
        name: "ada".into(),
        age: 36,
        score: 9.5,
        active: true,
        nickname: Some("countess".into()),
        tags: vec!["math".into(), "engines".into()],
        joined,
        secret: "s3cret".into(),
        ..Contact::default()
    };
    engine.insert(&mut contact).await.unwrap();

    let mut loaded = Contact {
        id: contact.id,
        ..Contact::default()
    };
    assert!(engine.get(&mut loaded).await.unwrap());
    // write-only columns are never read back
    assert_eq!(loaded.secret, "");
    assert_eq!(
        loaded,
        Contact {
            secret: String::new(),
            ..contact.clone()
        }
    );

    let stored = engine
        .query("SELECT secret FROM contact WHERE id = ?", args![contact.id])
        .await
        .unwrap();
    assert_eq!(stored.scalar(), Some(&SqlValue::Text("s3cret".into())));
}

#[tokio::test]
async fn test_multi_insert_writes_back_ids() {
    let (engine, logger) = recorded_engine().await;
    engine.sync::<User>().await.unwrap();
    logger.clear();

    let mut batch = vec![
        User {
            name: "a".into(),
            ..User::default()
        },
        User {
            name: "b".into(),
            ..User::default()
        },
        User {
            name: "c".into(),
            ..User::default()
        },
    ];
    assert_eq!(engine.insert_multi(&mut batch).await.unwrap(), 3);
    assert_eq!(logger.matching("INSERT").len(), 1);

    let ids: Vec<i64> = batch.iter().map(|u| u.id).collect();
    assert!(ids.iter().all(|&id| id > 0));
    assert!(ids.windows(2).all(|w| w[0] < w[1]));

    let rows: Vec<User> = engine.asc(&["id"]).find().await.unwrap();
    assert_eq!(rows, batch);
    assert_eq!(engine.insert_multi::<User>(&mut []).await.unwrap(), 0);
}

#[tokio::test]
async fn test_condition_bean_uses_only_non_zero_fields() {
    let (engine, logger) = recorded_engine().await;
    engine.sync::<Contact>().await.unwrap();
    logger.clear();

    let cond = Contact {
        name: "ada".into(),
        age: 36,
        ..Contact::default()
    };
    let found: Vec<Contact> = engine.new_session().find_by(&cond).await.unwrap();
    assert!(found.is_empty());

    let select = logger.matching("SELECT").pop().unwrap();
    let where_clause = select.split(" WHERE ").nth(1).unwrap();
    assert_eq!(where_clause, "\"name\"=? AND \"age\"=?");
}

#[tokio::test]
async fn test_paging_window() {
    let engine = engine().await;
    users(&engine, 10).await;

    let page: Vec<User> = engine.asc(&["id"]).limit(2, 3).find().await.unwrap();
    let ids: Vec<i64> = page.iter().map(|u| u.id).collect();
    assert_eq!(ids, vec![4, 5]);

    let (rows, total) = engine
        .where_("id > ?", args![5])
        .limit(2, 0)
        .find_and_count::<User>()
        .await
        .unwrap();
    assert_eq!(rows.len(), 2);
    assert_eq!(total, 5);
}

#[tokio::test]
async fn test_composite_primary_key() {
    let (engine, logger) = recorded_engine().await;
    engine.sync::<Membership>().await.unwrap();
    let mut m = Membership {
        group_id: 7,
        user_id: 3,
        role: "owner".into(),
    };
    engine.insert(&mut m).await.unwrap();
    logger.clear();

    let mut found = Membership::default();
    assert!(engine.id((7_i64, 3_i64)).get(&mut found).await.unwrap());
    assert_eq!(found, m);
    let select = logger.matching("SELECT").pop().unwrap();
    assert!(
        select.ends_with("WHERE \"group_id\"=? AND \"user_id\"=? LIMIT 1"),
        "{select}"
    );

    let err = engine
        .id(7_i64)
        .get(&mut Membership::default())
        .await
        .unwrap_err();
    assert!(matches!(err, OrmError::IdCondition { expected: 2, got: 1 }));

    let by_pk = engine.new_session().find_map::<Membership>().await.unwrap();
    assert_eq!(by_pk.get(&Pk::from((7_i64, 3_i64))), Some(&m));
}

#[tokio::test]
async fn test_aggregates() {
    let engine = engine().await;
    users(&engine, 4).await;

    assert_eq!(engine.count::<User>().await.unwrap(), 4);
    assert_eq!(
        engine.where_("id > ?", args![2]).count::<User>().await.unwrap(),
        2
    );
    assert_eq!(
        engine.new_session().sum::<User>("id").await.unwrap(),
        10.0
    );
    assert_eq!(
        engine.new_session().sum_int::<User>("id").await.unwrap(),
        10
    );
    assert_eq!(
        engine
            .in_("id", args![1, 2])
            .sums::<User>(&["id", "id"])
            .await
            .unwrap(),
        vec![3.0, 3.0]
    );
    let lookup = User {
        name: "user3".into(),
        ..User::default()
    };
    assert!(engine.exist(&lookup).await.unwrap());
    assert!(!engine
        .where_("name = ?", args!["nobody"])
        .exist::<User>()
        .await
        .unwrap());
}

#[tokio::test]
async fn test_conditions_compose() {
    let engine = engine().await;
    users(&engine, 6).await;

    let rows: Vec<User> = engine
        .where_("id > ?", args![1])
        .and("id < ?", args![6])
        .cond(Cond::ne("name", "user3"))
        .not_in("id", args![4])
        .desc(&["id"])
        .find()
        .await
        .unwrap();
    let ids: Vec<i64> = rows.iter().map(|u| u.id).collect();
    assert_eq!(ids, vec![5, 2]);

    let rows: Vec<User> = engine
        .where_("id = ?", args![1])
        .or("id = ?", args![6])
        .asc(&["id"])
        .find()
        .await
        .unwrap();
    assert_eq!(rows.len(), 2);
}

#[tokio::test]
async fn test_missing_arguments_are_rejected() {
    let engine = engine().await;
    users(&engine, 1).await;
    let err = engine
        .where_("id = ? AND name = ?", args![1])
        .find::<User>()
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        OrmError::NeedMoreArguments {
            expected: 2,
            got: 1
        }
    ));
}

#[tokio::test]
async fn test_iterate_in_pages() {
    let (engine, logger) = recorded_engine().await;
    users(&engine, 7).await;
    logger.clear();

    let mut seen = Vec::new();
    engine
        .asc(&["id"])
        .buffer_size(3)
        .iterate(|idx, user: User| {
            seen.push((idx, user.id));
            Ok(())
        })
        .await
        .unwrap();
    assert_eq!(seen.len(), 7);
    assert_eq!(seen[6], (6, 7));
    assert_eq!(logger.matching("SELECT").len(), 3);

    let mut count = 0;
    let err = engine
        .new_session()
        .iterate(|_, _: User| {
            count += 1;
            if count == 2 {
                Err(OrmError::ParamsFormat("stop".into()))
            } else {
                Ok(())
            }
        })
        .await
        .unwrap_err();
    assert!(matches!(err, OrmError::ParamsFormat(_)));
    assert_eq!(count, 2);
}

#[tokio::test]
async fn test_cursor_streams_rows() {
    let engine = engine().await;
    users(&engine, 5).await;

    let mut session = engine.new_session();
    let mut cursor = session
        .where_("id <= ?", args![3])
        .asc(&["id"])
        .rows::<User>()
        .await
        .unwrap();
    let mut names = Vec::new();
    while let Some(user) = cursor.try_next().await.unwrap() {
        names.push(user.name);
    }
    assert_eq!(names, vec!["user1", "user2", "user3"]);
}

#[tokio::test]
async fn test_raw_sql() {
    let engine = engine().await;
    users(&engine, 2).await;

    let result = engine
        .exec("UPDATE user SET name = ? WHERE id = ?", args!["renamed", 2])
        .await
        .unwrap();
    assert_eq!(result.rows_affected, 1);

    let rows = engine
        .query_string("SELECT id, name FROM user ORDER BY id", args![])
        .await
        .unwrap();
    assert_eq!(rows.len(), 2);
    assert_eq!(rows[1]["id"], "2");
    assert_eq!(rows[1]["name"], "renamed");

    let maps: Vec<HashMap<String, SqlValue>> = engine
        .new_session()
        .query_maps("SELECT count(*) AS n FROM user", args![])
        .await
        .unwrap();
    assert_eq!(maps[0]["n"], SqlValue::Int(2));

    let typed: Vec<User> = engine
        .sql("SELECT * FROM user WHERE name = ?", args!["renamed"])
        .find()
        .await
        .unwrap();
    assert_eq!(typed[0].id, 2);
}

#[tokio::test]
async fn test_hooks_and_closures() {
    let engine = engine().await;
    engine.sync::<Ticket>().await.unwrap();

    let err = engine.insert(&mut Ticket::default()).await.unwrap_err();
    assert!(matches!(err, OrmError::Hook(_)));

    let before_calls = Arc::new(AtomicUsize::new(0));
    let counter = Arc::clone(&before_calls);
    let mut ticket = Ticket {
        title: "  broken build ".into(),
        ..Ticket::default()
    };
    let inserted_before = INSERTED.load(Ordering::SeqCst);
    engine
        .new_session()
        .before(move |bean| {
            assert!(bean.downcast_ref::<Ticket>().is_some());
            counter.fetch_add(1, Ordering::SeqCst);
        })
        .insert(&mut ticket)
        .await
        .unwrap();
    assert_eq!(before_calls.load(Ordering::SeqCst), 1);
    assert_eq!(INSERTED.load(Ordering::SeqCst), inserted_before + 1);

    let mut loaded = Ticket {
        id: ticket.id,
        ..Ticket::default()
    };
    assert!(engine.get(&mut loaded).await.unwrap());
    assert_eq!(loaded.title, "broken build");
    assert!(loaded.loaded);
}

#[tokio::test]
async fn test_closed_auto_session_is_rejected() {
    let engine = engine().await;
    users(&engine, 1).await;
    let mut session = engine.where_("id = ?", args![1]);
    assert_eq!(session.count::<User>().await.unwrap(), 1);
    assert!(session.is_closed());
    let err = session.count::<User>().await.unwrap_err();
    assert!(matches!(err, OrmError::SessionClosed));
}
