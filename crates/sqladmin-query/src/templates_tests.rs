//! Tests for the template store

use crate::templates::{QueryTemplate, TemplateStore, default_templates};
use pretty_assertions::assert_eq;

#[tokio::test]
async fn test_first_open_writes_defaults() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("query_templates.json");

    let store = TemplateStore::open(&path).await;

    assert_eq!(store.templates(), default_templates().as_slice());
    assert!(path.exists());
    let on_disk: Vec<QueryTemplate> =
        serde_json::from_str(&std::fs::read_to_string(&path).unwrap()).unwrap();
    assert_eq!(on_disk.len(), default_templates().len());
}

#[tokio::test]
async fn test_saved_template_survives_reopen() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("query_templates.json");

    {
        let mut store = TemplateStore::open(&path).await;
        store
            .save_template(
                QueryTemplate::new("Late orders", "SELECT id FROM dbo.Orders WHERE shipped IS NULL")
                    .with_category("Sales"),
            )
            .await;
    }

    let store = TemplateStore::open(&path).await;
    let template = store.find("late ORDERS").unwrap();
    assert_eq!(template.category, "Sales");
    assert_eq!(store.templates().len(), default_templates().len() + 1);
}

#[tokio::test]
async fn test_same_name_replaces_existing_template() {
    let mut store = TemplateStore::in_memory();
    let count = store.templates().len();

    store
        .save_template(QueryTemplate::new("Database size", "SELECT 1"))
        .await;

    assert_eq!(store.templates().len(), count);
    assert_eq!(store.find("Database size").unwrap().query, "SELECT 1");
}

#[tokio::test]
async fn test_remove_template() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("query_templates.json");
    let mut store = TemplateStore::open(&path).await;

    assert!(store.remove("Active connections").await);
    assert!(!store.remove("Active connections").await);

    let reopened = TemplateStore::open(&path).await;
    assert!(reopened.find("Active connections").is_none());
}

#[tokio::test]
async fn test_malformed_file_starts_empty_without_overwriting() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("query_templates.json");
    std::fs::write(&path, "{ not json").unwrap();

    let store = TemplateStore::open(&path).await;

    assert!(store.templates().is_empty());
    assert_eq!(std::fs::read_to_string(&path).unwrap(), "{ not json");
}

#[test]
fn test_default_templates_pass_validation() {
    let validator = crate::QueryValidator::new();
    for template in default_templates() {
        assert!(
            validator.validate(&template.query).is_ok(),
            "template {:?} should validate",
            template.name
        );
    }
}
