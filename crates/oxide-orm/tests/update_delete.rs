//! Updates, optimistic locking and soft deletes.

mod common;

use chrono::NaiveDateTime;
use common::{engine, recorded_engine};
use oxide_orm::{args, OrmError, Record, SqlValue};

#[derive(Debug, Clone, Default, PartialEq, Record)]
struct Account {
    #[orm("pk autoincr")]
    id: i64,
    name: String,
    balance: i64,
    note: Option<String>,
    #[orm("version")]
    ver: i32,
    #[orm("updated")]
    updated_at: Option<NaiveDateTime>,
}

#[derive(Debug, Clone, Default, PartialEq, Record)]
struct Post {
    #[orm("pk autoincr")]
    id: i64,
    body: String,
    #[orm("deleted")]
    deleted_at: Option<NaiveDateTime>,
}

async fn account(engine: &oxide_orm::Engine, name: &str, balance: i64) -> Account {
    let mut account = Account {
        name: name.into(),
        balance,
        ..Account::default()
    };
    engine.insert(&mut account).await.unwrap();
    account
}

#[tokio::test]
async fn test_insert_sets_version_and_update_bumps_it() {
    let engine = engine().await;
    engine.sync::<Account>().await.unwrap();
    let mut acc = account(&engine, "ada", 10).await;
    assert_eq!(acc.ver, 1);

    acc.balance = 20;
    assert_eq!(engine.update(&mut acc).await.unwrap(), 1);
    assert_eq!(acc.ver, 2);
    assert!(acc.updated_at.is_some());

    let mut stored = Account {
        id: acc.id,
        ..Account::default()
    };
    engine.get(&mut stored).await.unwrap();
    assert_eq!(stored.balance, 20);
    assert_eq!(stored.ver, 2);
}

#[tokio::test]
async fn test_stale_version_fails() {
    let engine = engine().await;
    engine.sync::<Account>().await.unwrap();
    let created = account(&engine, "ada", 10).await;

    let mut a = Account {
        id: created.id,
        ..Account::default()
    };
    let mut b = a.clone();
    engine.get(&mut a).await.unwrap();
    engine.get(&mut b).await.unwrap();
    assert_eq!((a.ver, b.ver), (1, 1));

    a.name = "first".into();
    assert_eq!(engine.new_session().update(&mut a).await.unwrap(), 1);
    assert_eq!(a.ver, 2);

    b.name = "second".into();
    let err = engine.new_session().update(&mut b).await.unwrap_err();
    assert!(matches!(err, OrmError::OptimisticLock));
    assert_eq!(b.ver, 1);

    let mut stored = Account {
        id: created.id,
        ..Account::default()
    };
    engine.get(&mut stored).await.unwrap();
    assert_eq!(stored.name, "first");
}

#[tokio::test]
async fn test_update_uses_record_primary_key() {
    let (engine, logger) = recorded_engine().await;
    engine.sync::<Account>().await.unwrap();
    let mut first = account(&engine, "ada", 10).await;
    let second = account(&engine, "bob", 10).await;
    logger.clear();

    first.balance = 99;
    engine.no_versioning().update(&mut first).await.unwrap();
    let update = logger.matching("UPDATE").pop().unwrap();
    assert!(update.ends_with("WHERE \"id\"=?"), "{update}");

    let mut other = Account {
        id: second.id,
        ..Account::default()
    };
    engine.get(&mut other).await.unwrap();
    assert_eq!(other.balance, 10);
}

#[tokio::test]
async fn test_column_selection_and_expressions() {
    let engine = engine().await;
    engine.sync::<Account>().await.unwrap();
    let acc = account(&engine, "ada", 10).await;
    let id = acc.id;

    let mut change = Account {
        note: Some("x".into()),
        ..Account::default()
    };
    engine
        .id(id)
        .no_versioning()
        .incr("balance", 5_i64)
        .update(&mut change)
        .await
        .unwrap();

    // zero fields are only written when asked for
    let mut clear = Account::default();
    engine
        .id(id)
        .no_versioning()
        .nullable(&["note"])
        .update(&mut clear)
        .await
        .unwrap();

    let mut stored = Account {
        id,
        ..Account::default()
    };
    engine.get(&mut stored).await.unwrap();
    assert_eq!(stored.balance, 15);
    assert_eq!(stored.name, "ada");
    assert_eq!(stored.note, None);

    engine
        .id(id)
        .no_versioning()
        .set_expr("balance", "balance * 2")
        .update(&mut Account::default())
        .await
        .unwrap();
    let rows = engine
        .query("SELECT balance FROM account WHERE id = ?", args![id])
        .await
        .unwrap();
    assert_eq!(rows.scalar(), Some(&SqlValue::Int(30)));
}

#[tokio::test]
async fn test_update_with_condition_record() {
    let engine = engine().await;
    engine.sync::<Account>().await.unwrap();
    account(&engine, "ada", 1).await;
    account(&engine, "bob", 1).await;
    account(&engine, "bob", 2).await;

    let mut change = Account {
        balance: 50,
        ..Account::default()
    };
    let cond = Account {
        name: "bob".into(),
        ..Account::default()
    };
    let affected = engine
        .new_session()
        .no_versioning()
        .update_with(&mut change, &cond)
        .await
        .unwrap();
    assert_eq!(affected, 2);
    assert_eq!(
        engine
            .where_("balance = ?", args![50])
            .count::<Account>()
            .await
            .unwrap(),
        2
    );
}

#[tokio::test]
async fn test_empty_update_is_rejected() {
    let engine = engine().await;
    engine.sync::<Account>().await.unwrap();
    let acc = account(&engine, "ada", 1).await;
    let err = engine
        .id(acc.id)
        .no_versioning()
        .no_auto_time()
        .update(&mut Account::default())
        .await
        .unwrap_err();
    assert!(matches!(err, OrmError::NoContentFound));
}

#[tokio::test]
async fn test_soft_delete() {
    let engine = engine().await;
    engine.sync::<Post>().await.unwrap();
    for body in ["one", "two"] {
        let mut post = Post {
            body: body.into(),
            ..Post::default()
        };
        engine.insert(&mut post).await.unwrap();
    }

    let mut target = Post {
        id: 1,
        ..Post::default()
    };
    assert_eq!(engine.delete(&mut target).await.unwrap(), 1);
    assert!(target.deleted_at.is_some());

    let rows = engine
        .query("SELECT count(*) FROM post", args![])
        .await
        .unwrap();
    assert_eq!(rows.scalar(), Some(&SqlValue::Int(2)));

    let visible: Vec<Post> = engine.new_session().find().await.unwrap();
    assert_eq!(visible.len(), 1);
    assert_eq!(visible[0].body, "two");
    let all: Vec<Post> = engine.unscoped().find().await.unwrap();
    assert_eq!(all.len(), 2);

    let mut lookup = Post {
        id: 1,
        ..Post::default()
    };
    assert!(!engine.get(&mut lookup).await.unwrap());
    assert!(engine.unscoped().get(&mut lookup).await.unwrap());
    assert_eq!(lookup.body, "one");

    // unscoped deletes physically
    let mut gone = Post {
        id: 1,
        ..Post::default()
    };
    engine.unscoped().delete(&mut gone).await.unwrap();
    assert_eq!(engine.unscoped().count::<Post>().await.unwrap(), 1);
}

#[tokio::test]
async fn test_delete_needs_a_condition() {
    let engine = engine().await;
    engine.sync::<Post>().await.unwrap();
    let err = engine.delete(&mut Post::default()).await.unwrap_err();
    assert!(matches!(err, OrmError::NeedDeletedCond));

    let mut post = Post {
        body: "kept".into(),
        ..Post::default()
    };
    engine.insert(&mut post).await.unwrap();
    let affected = engine
        .where_("body = ?", args!["kept"])
        .unscoped()
        .delete(&mut Post::default())
        .await
        .unwrap();
    assert_eq!(affected, 1);
}
