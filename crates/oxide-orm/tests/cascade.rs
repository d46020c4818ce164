//! Loading related records through cascade fields.

mod common;

use common::{engine, recorded_engine};
use oxide_orm::{args, OrmError, Record};

#[derive(Debug, Clone, Default, PartialEq, Record)]
struct Author {
    #[orm("pk autoincr")]
    id: i64,
    name: String,
}

#[derive(Debug, Clone, Default, PartialEq, Record)]
struct Article {
    #[orm("pk autoincr")]
    id: i64,
    title: String,
    #[orm(tag = "", cascade)]
    author: Option<Author>,
}

#[derive(Debug, Clone, Default, PartialEq, Record)]
struct Membership {
    #[orm("pk")]
    group_id: i64,
    #[orm("pk")]
    user_id: i64,
}

#[derive(Debug, Clone, Default, PartialEq, Record)]
struct Assignment {
    #[orm("pk autoincr")]
    id: i64,
    #[orm(tag = "", cascade)]
    membership: Option<Membership>,
}

#[tokio::test]
async fn test_cascade_loads_related_record() {
    let (engine, logger) = recorded_engine().await;
    engine.sync::<Author>().await.unwrap();
    engine.sync::<Article>().await.unwrap();

    let mut author = Author {
        name: "Ada".into(),
        ..Author::default()
    };
    engine.insert(&mut author).await.unwrap();
    let mut article = Article {
        title: "Engines".into(),
        author: Some(author.clone()),
        ..Article::default()
    };
    engine.insert(&mut article).await.unwrap();
    logger.clear();

    let mut loaded = Article::default();
    assert!(engine.cascade(true).id(article.id).get(&mut loaded).await.unwrap());
    assert_eq!(loaded.author, Some(author.clone()));
    // One query for the article, one for its author.
    assert_eq!(logger.matching("SELECT").len(), 2);

    let found: Vec<Article> = engine.find().await.unwrap();
    assert_eq!(found[0].author.as_ref().map(|a| a.name.as_str()), Some("Ada"));
}

#[tokio::test]
async fn test_without_cascade_only_the_key_is_set() {
    let (engine, logger) = recorded_engine().await;
    engine.sync::<Author>().await.unwrap();
    engine.sync::<Article>().await.unwrap();

    let mut author = Author {
        name: "Ada".into(),
        ..Author::default()
    };
    engine.insert(&mut author).await.unwrap();
    let mut article = Article {
        title: "Engines".into(),
        author: Some(author.clone()),
        ..Article::default()
    };
    engine.insert(&mut article).await.unwrap();
    logger.clear();

    let mut loaded = Article::default();
    assert!(engine.cascade(false).id(article.id).get(&mut loaded).await.unwrap());
    assert_eq!(
        loaded.author,
        Some(Author {
            id: author.id,
            name: String::new(),
        })
    );
    assert_eq!(logger.matching("SELECT").len(), 1);
}

#[tokio::test]
async fn test_null_related_key_stays_none() {
    let engine = engine().await;
    engine.sync::<Author>().await.unwrap();
    engine.sync::<Article>().await.unwrap();

    let mut article = Article {
        title: "Orphan".into(),
        ..Article::default()
    };
    engine.insert(&mut article).await.unwrap();
    let mut loaded = Article::default();
    assert!(engine.cascade(true).id(article.id).get(&mut loaded).await.unwrap());
    assert_eq!(loaded.author, None);
}

#[tokio::test]
async fn test_cascade_rejects_composite_key() {
    let engine = engine().await;
    engine.sync::<Assignment>().await.unwrap();
    engine.insert(&mut Assignment::default()).await.unwrap();
    engine
        .exec("UPDATE assignment SET membership = ?", args![5_i64])
        .await
        .unwrap();

    let err = engine.cascade(true).find::<Assignment>().await.unwrap_err();
    assert!(matches!(err, OrmError::UnsupportedCascade(ref name) if name == "membership"));
}
