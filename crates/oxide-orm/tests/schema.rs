//! Schema creation, synchronization and introspection.

mod common;

use common::{engine, recorded_engine};
use oxide_orm::{args, Record};

#[derive(Debug, Clone, Default, Record)]
#[orm(table = "article")]
struct Article {
    #[orm("pk autoincr")]
    id: i64,
    #[orm("varchar(200) notnull index")]
    title: String,
    #[orm("unique")]
    slug: String,
}

/// Later revision of [`Article`]: one more column, one index fewer.
#[derive(Debug, Clone, Default, Record)]
#[orm(table = "article")]
struct ArticleV2 {
    #[orm("pk autoincr")]
    id: i64,
    #[orm("varchar(200) notnull")]
    title: String,
    #[orm("unique")]
    slug: String,
    summary: Option<String>,
}

#[derive(Debug, Clone, Default, Record)]
struct Label {
    #[orm("pk autoincr")]
    id: i64,
    #[orm("unique(owner_name) notnull")]
    owner: i64,
    #[orm("unique(owner_name)")]
    name: String,
}

fn index_names(table: &oxide_orm::Table) -> Vec<String> {
    let mut names: Vec<String> = table.indexes.iter().map(|i| i.name.clone()).collect();
    names.sort();
    names
}

#[tokio::test]
async fn test_sync_creates_table_and_indexes() {
    let engine = engine().await;
    assert!(!engine.is_table_exist::<Article>().await.unwrap());
    engine.sync::<Article>().await.unwrap();
    assert!(engine.is_table_exist::<Article>().await.unwrap());

    let metas = engine.db_metas().await.unwrap();
    let article = metas.iter().find(|t| t.name == "article").unwrap();
    let columns: Vec<&str> = article.columns.iter().map(|c| c.name.as_str()).collect();
    assert_eq!(columns, vec!["id", "title", "slug"]);
    assert_eq!(article.primary_keys, vec!["id".to_string()]);
    assert_eq!(
        index_names(article),
        vec!["IDX_article_title", "UQE_article_slug"]
    );
}

#[tokio::test]
async fn test_sync_is_idempotent() {
    let (engine, logger) = recorded_engine().await;
    engine.sync::<Article>().await.unwrap();
    logger.clear();

    engine.sync::<Article>().await.unwrap();
    let statements = logger.statements();
    assert!(
        statements
            .iter()
            .all(|s| !s.starts_with("CREATE") && !s.starts_with("ALTER") && !s.starts_with("DROP")),
        "{statements:?}"
    );
}

#[tokio::test]
async fn test_sync_evolves_existing_table() {
    let (engine, logger) = recorded_engine().await;
    engine.sync::<Article>().await.unwrap();
    engine
        .exec(
            "INSERT INTO article (title, slug) VALUES (?, ?)",
            args!["hello", "hello"],
        )
        .await
        .unwrap();
    logger.clear();

    engine.sync::<ArticleV2>().await.unwrap();
    assert_eq!(logger.matching("ALTER TABLE").len(), 1);
    assert_eq!(logger.matching("DROP INDEX").len(), 1);

    let metas = engine.db_metas().await.unwrap();
    let article = metas.iter().find(|t| t.name == "article").unwrap();
    assert!(article.column("summary").is_some());
    assert_eq!(index_names(article), vec!["UQE_article_slug"]);

    let mut stored = ArticleV2 {
        id: 1,
        ..ArticleV2::default()
    };
    assert!(engine.get(&mut stored).await.unwrap());
    assert_eq!(stored.title, "hello");
    assert_eq!(stored.summary, None);
}

#[tokio::test]
async fn test_composite_unique_index() {
    let engine = engine().await;
    engine.sync::<Label>().await.unwrap();
    let metas = engine.db_metas().await.unwrap();
    let label = metas.iter().find(|t| t.name == "label").unwrap();
    let index = label.index("UQE_label_owner_name").unwrap();
    assert_eq!(index.columns, vec!["owner".to_string(), "name".to_string()]);

    let mut first = Label {
        owner: 1,
        name: "red".into(),
        ..Label::default()
    };
    engine.insert(&mut first).await.unwrap();
    let mut duplicate = Label {
        owner: 1,
        name: "red".into(),
        ..Label::default()
    };
    assert!(engine.insert(&mut duplicate).await.is_err());
}

#[tokio::test]
async fn test_create_and_drop_tables() {
    let engine = engine().await;
    let records = [Article::descriptor(), Label::descriptor()];
    engine.create_tables(&records).await.unwrap();
    // existing tables are skipped
    engine.create_tables(&records).await.unwrap();
    assert!(engine.is_table_exist::<Label>().await.unwrap());

    let mut session = engine.new_session();
    assert!(session.is_table_empty::<Label>().await.unwrap());
    session.close();

    engine.drop_tables(&records).await.unwrap();
    assert!(!engine.is_table_exist::<Article>().await.unwrap());
    assert!(engine.db_metas().await.unwrap().is_empty());
}
