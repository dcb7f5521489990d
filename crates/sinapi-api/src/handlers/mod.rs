mod history;
mod notifications;
mod search;
mod stats;
pub mod validate;

pub use history::{HistoryResponse, history};
pub use notifications::{NotificationRequest, NotificationResponse, notifications};
pub use search::search;
pub use stats::stats;

use axum::Json;
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};

/// `GET /health`. No authentication.
pub async fn health() -> Json<Value> { Json(json!({ "status": "ok" })) }

/// A SINAPI code in a request body. Older clients send numbers.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum CodeParam {
  Text(String),
  Number(i64),
}

impl From<CodeParam> for String {
  fn from(c: CodeParam) -> Self {
    match c {
      CodeParam::Text(s) => s,
      CodeParam::Number(n) => n.to_string(),
    }
  }
}
