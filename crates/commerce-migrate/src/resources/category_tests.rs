//! Tests for the category adapter.

use super::*;
use crate::connectors::TargetProfile;
use crate::mapping::MappingStore;
use crate::progress::{Budget, Progress, ProgressState};
use crate::resources::test_support::Harness;
use serde_json::json;
use std::time::Duration;

fn tree() -> serde_json::Value {
    json!({
        "categories": [
            {"categoryID": "1", "description": "Root"},
            {"categoryID": "2", "parentID": "1", "description": "Child", "meta_title": "Kids"},
            {"categoryID": "3", "parentID": "2", "description": "Leaf"}
        ]
    })
}

// =========================================================================
// Category tree
// =========================================================================

#[tokio::test]
async fn test_root_and_child_are_linked() {
    // Arrange
    let harness = Harness::new(json!({
        "categories": [
            {"categoryID": "1", "description": "Root"},
            {"categoryID": "2", "parentID": "1", "description": "Child"}
        ]
    }));

    // Act
    let (progress, diagnostics) = harness.run_to_end(Step::Categories).await;

    // Assert
    assert_eq!(progress.state, ProgressState::Done);
    assert!(diagnostics.is_empty());
    assert_eq!(harness.mappings.entries(EntityType::Category).await.unwrap().len(), 2);

    let root = harness.mapping(EntityType::CategoryTarget, "1").await.unwrap();
    let child = harness.mapping(EntityType::CategoryTarget, "2").await.unwrap();
    let state = harness.target.snapshot();
    assert_eq!(state.categories[&child].parent.as_deref(), Some(root.as_str()));
}

#[tokio::test]
async fn test_done_enables_article_categories() {
    let harness = Harness::new(tree());
    let (progress, _) = harness.run_to_end(Step::Categories).await;
    assert_eq!(progress.params.get("article_categories"), Some(&json!(true)));
}

#[tokio::test]
async fn test_meta_title_is_patched() {
    let harness = Harness::new(tree());
    harness.run_to_end(Step::Categories).await;

    let child = harness.mapping(EntityType::Category, "2").await.unwrap();
    let state = harness.target.snapshot();
    assert_eq!(state.categories[&child].meta_title.as_deref(), Some("Kids"));
}

#[tokio::test]
async fn test_empty_description_is_skipped() {
    let harness = Harness::new(json!({
        "categories": [
            {"categoryID": "1", "description": ""},
            {"categoryID": "2", "description": "Kept"}
        ]
    }));

    let (progress, diagnostics) = harness.run_to_end(Step::Categories).await;

    assert_eq!(progress.offset, 2);
    assert_eq!(diagnostics.len(), 1);
    assert_eq!(diagnostics[0].offset, 0);
    assert!(harness.mapping(EntityType::Category, "1").await.is_none());
    assert!(harness.mapping(EntityType::Category, "2").await.is_some());
}

#[tokio::test]
async fn test_unresolvable_parent_is_skipped() {
    let harness = Harness::new(json!({
        "categories": [
            {"categoryID": "9", "parentID": "404", "description": "Orphan"}
        ]
    }));

    let (progress, diagnostics) = harness.run_to_end(Step::Categories).await;

    assert_eq!(progress.state, ProgressState::Done);
    assert_eq!(progress.offset, 1);
    assert!(diagnostics[0].message.contains("404"));
    assert!(harness.mapping(EntityType::Category, "9").await.is_none());
}

// =========================================================================
// Languages
// =========================================================================

#[tokio::test]
async fn test_language_rows_use_composite_keys_and_locale_root() {
    // Arrange
    let mut harness = Harness::new(json!({
        "categories": [
            {"categoryID": "1", "languageID": "2", "description": "Start"},
            {"categoryID": "5", "parentID": "1", "languageID": "2", "description": "Shirts"}
        ]
    }));
    harness.config.language.insert("2".to_string(), "1".to_string());

    // Act
    harness.run_to_end(Step::Categories).await;

    // Assert
    let root = harness.mapping(EntityType::Category, "1_LANG_2").await.unwrap();
    let shirts = harness.mapping(EntityType::Category, "5_LANG_2").await.unwrap();
    let state = harness.target.snapshot();
    assert_eq!(state.categories[&root].parent.as_deref(), Some("3"));
    assert_eq!(state.categories[&shirts].parent.as_deref(), Some(root.as_str()));
}

#[tokio::test]
async fn test_parent_falls_back_to_other_language() {
    // Parent only exists in language 1, child is in language 2
    let harness = Harness::new(json!({
        "categories": [
            {"categoryID": "1", "languageID": "1", "description": "Root"},
            {"categoryID": "2", "parentID": "1", "languageID": "2", "description": "Child"}
        ]
    }));

    let (_, diagnostics) = harness.run_to_end(Step::Categories).await;

    assert!(diagnostics.is_empty());
    let root = harness.mapping(EntityType::CategoryTarget, "1_LANG_1").await.unwrap();
    let child = harness.mapping(EntityType::CategoryTarget, "2_LANG_2").await.unwrap();
    assert_eq!(
        harness.target.snapshot().categories[&child].parent.as_deref(),
        Some(root.as_str())
    );
}

#[tokio::test]
async fn test_parent_falls_back_to_raw_id() {
    let harness = Harness::new(json!({
        "categories": [
            {"categoryID": "1", "description": "Shared root"},
            {"categoryID": "2", "parentID": "1", "languageID": "3", "description": "Child"}
        ]
    }));

    let (_, diagnostics) = harness.run_to_end(Step::Categories).await;

    assert!(diagnostics.is_empty());
    assert!(harness.mapping(EntityType::Category, "2_LANG_3").await.is_some());
}

// =========================================================================
// Resumability
// =========================================================================

#[tokio::test]
async fn test_zero_budget_yields_after_each_row() {
    let mut harness = Harness::new(tree());
    harness.budget = Budget::time(Duration::ZERO);

    let first = harness.invoke(Step::Categories, Progress::new()).await;
    assert_eq!(first.progress.state, ProgressState::Running);
    assert_eq!(first.progress.offset, 1);
    assert_eq!(first.progress.count, 3);

    let second = harness.invoke(Step::Categories, first.progress).await;
    assert_eq!(second.progress.offset, 2);
    assert_eq!(second.progress.count, 3);
    // no reset on continuation
    assert!(harness.mapping(EntityType::Category, "1").await.is_some());
}

#[tokio::test]
async fn test_restart_at_zero_resets_category_mappings() {
    let harness = Harness::new(json!({"categories": []}));
    harness
        .mappings
        .put(EntityType::Category, "stale", "1")
        .await
        .unwrap();
    harness
        .mappings
        .put(EntityType::Article, "kept", "2")
        .await
        .unwrap();

    harness.run_to_end(Step::Categories).await;

    assert!(harness.mapping(EntityType::Category, "stale").await.is_none());
    assert!(harness.mapping(EntityType::Article, "kept").await.is_some());
}

// =========================================================================
// Article categories
// =========================================================================

#[tokio::test]
async fn test_article_is_assigned_to_every_language_variant() {
    // Arrange
    let harness = Harness::new(json!({
        "categories": [
            {"categoryID": "7", "languageID": "1", "description": "Sale"},
            {"categoryID": "7", "languageID": "2", "description": "Angebote"}
        ],
        "product_categories": [
            {"productID": "p1", "categoryID": "7"},
            {"productID": "unknown", "categoryID": "7"}
        ]
    }));
    harness.run_to_end(Step::Categories).await;
    let ids = harness
        .target
        .import(
            ImportKind::Article,
            json!({"ordernumber": "SW-1"}).as_object().unwrap().clone(),
        )
        .await
        .unwrap();
    let detail = ids["detail_id"].as_str().unwrap();
    let article = ids["article_id"].as_str().unwrap().to_string();
    harness.mappings.put(EntityType::Article, "p1", detail).await.unwrap();

    // Act
    let (progress, diagnostics) = harness.run_to_end(Step::ArticleCategories).await;

    // Assert
    assert_eq!(progress.offset, 2);
    assert_eq!(diagnostics.len(), 1);
    let links: Vec<_> = harness
        .target
        .snapshot()
        .article_categories
        .into_iter()
        .filter(|(a, _)| *a == article)
        .collect();
    assert_eq!(links.len(), 2);
}
