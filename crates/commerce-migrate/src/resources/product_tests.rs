//! Tests for the product adapter.

use super::*;
use crate::mapping::MappingStore;
use crate::progress::{Progress, ProgressState};
use crate::resources::test_support::Harness;
use proptest::prelude::*;
use serde_json::json;

// =========================================================================
// Order numbers
// =========================================================================

#[test]
fn test_order_number_validity() {
    assert!(is_valid_order_number("SW-10001.blue_XL 2"));
    assert!(!is_valid_order_number(""));
    assert!(!is_valid_order_number("SW/10001"));
    assert!(!is_valid_order_number("Ä1"));
    assert!(!is_valid_order_number(&"A".repeat(31)));
    assert!(is_valid_order_number(&"A".repeat(30)));
}

#[test]
fn test_make_valid_examples() {
    assert_eq!(make_valid_order_number("SW/1", "7"), "SW-1");
    assert_eq!(make_valid_order_number("", "7"), "sw-7");

    let long = make_valid_order_number(&"X".repeat(40), "123");
    assert_eq!(long.len(), 30);
    assert!(long.ends_with("-123"));
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(256))]

    #[test]
    fn prop_make_valid_output_is_valid(number in ".{0,60}", id in "[a-z0-9/]{0,40}") {
        let valid = make_valid_order_number(&number, &id);
        prop_assert!(is_valid_order_number(&valid), "{:?}", valid);
    }

    #[test]
    fn prop_make_valid_is_deterministic(number in ".{0,60}", id in "[0-9]{1,10}") {
        prop_assert_eq!(
            make_valid_order_number(&number, &id),
            make_valid_order_number(&number, &id)
        );
    }

    #[test]
    fn prop_make_valid_keeps_valid_numbers(number in "[a-zA-Z0-9._ -]{1,30}") {
        prop_assert_eq!(make_valid_order_number(&number, "1"), number);
    }
}

// =========================================================================
// Validation modes
// =========================================================================

fn products(rows: serde_json::Value) -> Harness {
    Harness::new(json!({ "products": rows }))
}

#[tokio::test]
async fn test_complain_stops_at_invalid_number() {
    // Arrange
    let mut harness = products(json!([
        {"productID": "1", "ordernumber": "SW-1"},
        {"productID": "2", "ordernumber": "SW/2"},
        {"productID": "3", "ordernumber": "SW-3"}
    ]));
    harness.config.number_validation_mode = NumberValidationMode::Complain;

    // Act
    let (progress, _) = harness.run_to_end(Step::Products).await;

    // Assert
    assert_eq!(progress.state, ProgressState::Error);
    assert_eq!(progress.offset, 1);
    assert!(progress.error_message.unwrap().contains("SW/2"));
    assert!(harness.mapping(EntityType::Article, "1").await.is_some());
    assert!(harness.mapping(EntityType::Article, "3").await.is_none());
}

#[tokio::test]
async fn test_make_valid_imports_without_mapping() {
    let mut harness = products(json!([
        {"productID": "2", "ordernumber": "SW/2"}
    ]));
    harness.config.number_validation_mode = NumberValidationMode::MakeValid;

    let (progress, _) = harness.run_to_end(Step::Products).await;

    assert_eq!(progress.state, ProgressState::Done);
    assert!(harness.mapping(EntityType::Article, "2").await.is_none());
    let state = harness.target.snapshot();
    assert_eq!(state.details.values().next().unwrap().ordernumber, "SW-2");
}

#[tokio::test]
async fn test_ignore_skips_rows_without_number() {
    let mut harness = products(json!([
        {"productID": "1"},
        {"productID": "2", "ordernumber": "anything/goes"}
    ]));
    harness.config.number_validation_mode = NumberValidationMode::Ignore;

    let (progress, diagnostics) = harness.run_to_end(Step::Products).await;

    assert_eq!(progress.state, ProgressState::Done);
    assert_eq!(diagnostics.len(), 1);
    assert!(harness.mapping(EntityType::Article, "2").await.is_some());
}

// =========================================================================
// Field transformations
// =========================================================================

#[tokio::test]
async fn test_fields_are_remapped() {
    // Arrange
    let mut harness = Harness::new(json!({
        "products": [{
            "productID": "1",
            "ordernumber": "SW-1",
            "color": "red",
            "legacy": "x",
            "taxID": "9",
            "description": "<p>Soft</p>",
            "description_long": "<p>Long text</p>",
            "meta_title": "Shirt",
            "additionaltext": "DARK blue"
        }],
        "product_info": {"1": {"weight": 2}}
    }));
    harness.config.attribute.insert("color".to_string(), "attr1".to_string());
    harness.config.attribute.insert("legacy".to_string(), String::new());
    harness.config.tax_rate.insert("9".to_string(), "4".to_string());
    harness
        .config
        .configurator_mapping
        .insert("Dark Blue".to_string(), "Color".to_string());
    harness.config.supplier = Some("Default".to_string());

    // Act
    harness.run_to_end(Step::Products).await;

    // Assert
    let state = harness.target.snapshot();
    let article = state.articles.values().next().unwrap();
    assert_eq!(article.fields["attr1"], json!("red"));
    assert!(!article.fields.contains_key("color"));
    assert!(!article.fields.contains_key("legacy"));
    assert_eq!(article.tax_id.as_deref(), Some("4"));
    assert_eq!(article.fields["description"], json!("Soft"));
    assert_eq!(article.fields["description_long"], json!("<p>Long text</p>"));
    assert_eq!(article.fields["metaTitle"], json!("Shirt"));
    assert_eq!(article.fields["supplier"], json!("Default"));
    assert_eq!(article.fields["weight"], json!(2));
    assert_eq!(article.fields["variant_group_names"], json!("Color"));
}

#[tokio::test]
async fn test_unmapped_tax_class_is_dropped() {
    let mut harness = products(json!([
        {"productID": "1", "ordernumber": "SW-1", "taxID": "77"}
    ]));
    harness.config.tax_rate.insert("9".to_string(), "4".to_string());

    harness.run_to_end(Step::Products).await;

    let state = harness.target.snapshot();
    assert_eq!(state.articles.values().next().unwrap().tax_id, None);
}

#[tokio::test]
async fn test_product_price_and_link() {
    let harness = products(json!([
        {"productID": "1", "ordernumber": "SW-1", "net_price": 10, "tax": 19,
         "link": "https://example.com/manual", "link_description": "Manual"}
    ]));

    harness.run_to_end(Step::Products).await;

    let state = harness.target.snapshot();
    let tier = state.prices.values().next().unwrap();
    assert_eq!(tier.price, 11.9);
    let article = state.articles.values().next().unwrap();
    assert_eq!(
        article.links,
        vec![("https://example.com/manual".to_string(), "Manual".to_string())]
    );
}

// =========================================================================
// Variant promotion
// =========================================================================

fn master_with_children() -> serde_json::Value {
    json!({
        "products": [
            {"productID": "P", "ordernumber": "SHIRT"},
            {"productID": "C1", "parentID": "P", "ordernumber": "SHIRT.S", "additionaltext": "S"},
            {"productID": "C2", "parentID": "P", "ordernumber": "SHIRT.M", "additionaltext": "M"}
        ]
    })
}

#[tokio::test]
async fn test_first_child_replaces_placeholder() {
    // Arrange
    let harness = Harness::new(master_with_children());

    // Act
    let (progress, diagnostics) = harness.run_to_end(Step::Products).await;

    // Assert
    assert_eq!(progress.state, ProgressState::Done);
    assert!(diagnostics.is_empty());

    let state = harness.target.snapshot();
    assert_eq!(state.articles.len(), 1);
    assert_eq!(state.details.len(), 2);

    let c1 = harness.mapping(EntityType::Article, "C1").await.unwrap();
    let c2 = harness.mapping(EntityType::Article, "C2").await.unwrap();
    let article = state.articles.values().next().unwrap();
    assert_eq!(article.main_detail_id, c1);
    assert_eq!(state.details[&c1].kind, 1);
    assert_eq!(state.details[&c2].kind, 2);

    // the master now resolves to the promoted variant
    assert_eq!(harness.mapping(EntityType::Article, "P").await.unwrap(), c1);
    let entries = harness.mappings.entries(EntityType::Article).await.unwrap();
    assert!(entries
        .iter()
        .all(|entry| state.details.contains_key(&entry.target_id)));
}

#[tokio::test]
async fn test_promotion_survives_rerun() {
    // Arrange
    let harness = Harness::new(master_with_children());
    let (first, _) = harness.run_to_end(Step::Products).await;
    assert_eq!(first.state, ProgressState::Done);

    // Act: run the rows after the master again
    let mut resume = Progress::new();
    resume.offset = 1;
    let mut progress = resume;
    loop {
        let invocation = harness.invoke(Step::Products, progress).await;
        progress = invocation.progress;
        if progress.is_terminal() {
            break;
        }
    }

    // Assert
    assert_eq!(progress.state, ProgressState::Done);
    let state = harness.target.snapshot();
    assert_eq!(state.details.len(), 2);
    let entries = harness.mappings.entries(EntityType::Article).await.unwrap();
    assert!(entries
        .iter()
        .all(|entry| state.details.contains_key(&entry.target_id)));
}

#[tokio::test]
async fn test_master_with_options_is_kept() {
    let harness = Harness::new(json!({
        "products": [
            {"productID": "P", "ordernumber": "CUP", "additionaltext": "White"},
            {"productID": "C", "parentID": "P", "ordernumber": "CUP.B", "additionaltext": "Black"}
        ]
    }));

    harness.run_to_end(Step::Products).await;

    let state = harness.target.snapshot();
    assert_eq!(state.details.len(), 2);
    let p = harness.mapping(EntityType::Article, "P").await.unwrap();
    assert_eq!(state.articles.values().next().unwrap().main_detail_id, p);
}
