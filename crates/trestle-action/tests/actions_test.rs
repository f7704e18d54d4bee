//! Tests for the built-in actions run through the registry.

use std::sync::Arc;

use async_trait::async_trait;
use serde_json::json;
use trestle_action::{
  ActionContext, ActionError, ActionRegistry, Counter, INCREMENT_COUNTER, RowWriter, SET_COUNTER,
  TableRef, WEBHOOK, WebhookAction, counter_plugin,
};
use trestle_config::{WebhookConfig, WhenTrigger};
use wiremock::matchers::{body_json, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

/// Row writer for actions that never write.
struct NoRows;

#[async_trait]
impl RowWriter for NoRows {
  async fn insert_row(&self, table: &str, _data: serde_json::Value) -> Result<i64, ActionError> {
    panic!("unexpected insert into {}", table)
  }

  async fn update_row(
    &self,
    table: &str,
    _id: i64,
    _data: serde_json::Value,
  ) -> Result<(), ActionError> {
    panic!("unexpected update of {}", table)
  }

  async fn delete_rows(
    &self,
    table: &str,
    _criteria: serde_json::Value,
  ) -> Result<u64, ActionError> {
    panic!("unexpected delete from {}", table)
  }
}

fn context(configuration: serde_json::Value) -> ActionContext {
  ActionContext {
    trigger_id: 1,
    table: TableRef {
      id: 1,
      name: "books".to_string(),
    },
    when: WhenTrigger::Update,
    row: json!({"id": 3, "author": "Giuseppe Tomasi", "pages": 210}),
    configuration,
    rows: Arc::new(NoRows),
  }
}

fn registry(counter: &Counter) -> ActionRegistry {
  let config = WebhookConfig {
    timeout_ms: 500,
    retries: 0,
    allowed_hosts: Vec::new(),
  };

  let mut registry = ActionRegistry::new();
  registry.register(
    WEBHOOK,
    Arc::new(WebhookAction::from_config(&config).expect("failed to build webhook")),
  );
  registry.register_plugin(counter_plugin(counter.clone()));
  registry
}

#[tokio::test]
async fn test_increment_counter() {
  let counter = Counter::new();
  let action = registry(&counter).lookup(INCREMENT_COUNTER).unwrap();

  action.run(&context(json!({}))).await.unwrap();
  action.run(&context(json!({}))).await.unwrap();

  assert_eq!(counter.get(), 2);
}

#[tokio::test]
async fn test_set_counter() {
  let counter = Counter::new();
  counter.set(5);
  let action = registry(&counter).lookup(SET_COUNTER).unwrap();

  action.run(&context(json!({"number": 17}))).await.unwrap();

  assert_eq!(counter.get(), 17);
}

#[tokio::test]
async fn test_set_counter_requires_number() {
  let counter = Counter::new();
  let action = registry(&counter).lookup(SET_COUNTER).unwrap();

  let result = action.run(&context(json!({"numbr": 17}))).await;

  assert!(matches!(
    result,
    Err(ActionError::InvalidConfiguration { action, .. }) if action == SET_COUNTER
  ));
  assert_eq!(counter.get(), 0);
}

#[tokio::test]
async fn test_webhook_posts_row() {
  let server = MockServer::start().await;

  Mock::given(method("POST"))
    .and(path("/hook"))
    .and(body_json(json!({"id": 3, "author": "Giuseppe Tomasi", "pages": 210})))
    .respond_with(ResponseTemplate::new(200))
    .expect(1)
    .mount(&server)
    .await;

  let action = registry(&Counter::new()).lookup(WEBHOOK).unwrap();
  action
    .run(&context(json!({"url": format!("{}/hook", server.uri())})))
    .await
    .expect("webhook should succeed");
}

#[tokio::test]
async fn test_webhook_failure_is_a_warning_by_default() {
  let server = MockServer::start().await;

  Mock::given(method("POST"))
    .respond_with(ResponseTemplate::new(500))
    .mount(&server)
    .await;

  let action = registry(&Counter::new()).lookup(WEBHOOK).unwrap();
  let result = action
    .run(&context(json!({"url": format!("{}/hook", server.uri())})))
    .await;

  assert!(result.is_ok());
}

#[tokio::test]
async fn test_webhook_strict_failure() {
  let server = MockServer::start().await;

  Mock::given(method("POST"))
    .respond_with(ResponseTemplate::new(500))
    .mount(&server)
    .await;

  let action = registry(&Counter::new()).lookup(WEBHOOK).unwrap();
  let result = action
    .run(&context(
      json!({"url": format!("{}/hook", server.uri()), "strict": true}),
    ))
    .await;

  assert!(matches!(result, Err(ActionError::Http(_))));
}

#[tokio::test]
async fn test_webhook_requires_url() {
  let action = registry(&Counter::new()).lookup(WEBHOOK).unwrap();
  let result = action.run(&context(json!({}))).await;

  assert!(matches!(
    result,
    Err(ActionError::InvalidConfiguration { .. })
  ));
}

#[tokio::test]
async fn test_webhook_bad_url_always_fails() {
  let action = registry(&Counter::new()).lookup(WEBHOOK).unwrap();
  let result = action.run(&context(json!({"url": "not a url"}))).await;

  assert!(matches!(result, Err(ActionError::Http(_))));
}
