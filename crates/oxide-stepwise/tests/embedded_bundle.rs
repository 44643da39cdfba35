//! Scripts compiled into the binary through `rust_embed`.

mod common;

use common::{memory_pool, table_exists};
use oxide_stepwise::prelude::*;
use rust_embed::RustEmbed;

#[derive(RustEmbed)]
#[folder = "tests/fixtures/bundle/"]
struct Fixtures;

#[test]
fn embedded_tree_is_read_recursively() {
    let bundle = ScriptBundle::from_embed::<Fixtures>().unwrap();
    let paths: Vec<&str> = bundle.entries().iter().map(|s| s.path.as_str()).collect();
    assert_eq!(
        paths,
        vec![
            "sql/001_create_authors.sql",
            "sql/002_create_books.sql",
            "sql/archive/003_seed_authors.sql",
            "sql/notes.sql",
        ]
    );

    let set = MigrationSetBuilder::bundle(bundle).build().unwrap();
    assert_eq!(set.versions(), vec![1, 2, 3]);
    assert_eq!(
        set.tail().unwrap().statement().filename,
        "sql/archive/003_seed_authors.sql"
    );
}

#[tokio::test]
async fn embedded_scripts_apply_and_drop() {
    let set = MigrationSetBuilder::bundle(ScriptBundle::from_embed::<Fixtures>().unwrap())
        .build()
        .unwrap();
    let pool = memory_pool().await;
    let migrator = Migrator::new(pool.clone(), set);

    migrator.up().await.unwrap();
    let (count,): (i64,) = sqlx::query_as("SELECT COUNT(*) FROM authors")
        .fetch_one(&pool)
        .await
        .unwrap();
    assert_eq!(count, 2);

    let report = migrator.drop_all().await.unwrap();
    assert_eq!(report.executed(), &[3, 2, 1]);
    assert!(!table_exists(&pool, "authors").await);
    assert!(!table_exists(&pool, "books").await);
    assert_eq!(migrator.position().await.unwrap(), Position::Unwound);
}
