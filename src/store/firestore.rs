//! Cloud Firestore REST adapter
//!
//! Documents are plain JSON on our side and Firestore typed values on the
//! wire (`stringValue`, `integerValue`, `mapValue`, ...).

use anyhow::Result;
use async_trait::async_trait;
use reqwest::{Client, RequestBuilder};
use serde_json::{json, Map, Value};
use std::sync::Arc;
use tracing::debug;

use super::auth::FirebaseAuth;
use super::remote::{Direction, RemoteDocument, RemoteQuery, RemoteStore};
use crate::error::RemoteStoreError;

const FIRESTORE_URL: &str = "https://firestore.googleapis.com/v1";

pub struct FirestoreStore {
    client: Client,
    api_key: String,
    documents_url: String,
    auth: Option<Arc<FirebaseAuth>>,
}

impl FirestoreStore {
    /// Request deadlines are applied by the conversation store
    pub fn new(project_id: &str, api_key: impl Into<String>) -> Result<Self> {
        Ok(Self {
            client: Client::builder().build()?,
            api_key: api_key.into(),
            documents_url: format!(
                "{}/projects/{}/databases/(default)/documents",
                FIRESTORE_URL, project_id
            ),
            auth: None,
        })
    }

    /// Authorize requests with the signed-in user's ID token
    pub fn with_auth(mut self, auth: Arc<FirebaseAuth>) -> Self {
        self.auth = Some(auth);
        self
    }

    fn authorize(&self, request: RequestBuilder) -> RequestBuilder {
        let request = request.query(&[("key", self.api_key.as_str())]);
        match self.auth.as_ref().and_then(|auth| auth.id_token()) {
            Some(token) => request.bearer_auth(token),
            None => request,
        }
    }

    async fn send(&self, request: RequestBuilder) -> Result<Value, RemoteStoreError> {
        let response = self
            .authorize(request)
            .send()
            .await
            .map_err(|e| RemoteStoreError::Request(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(RemoteStoreError::Request(format!(
                "HTTP {}: {}",
                status.as_u16(),
                body
            )));
        }

        response
            .json()
            .await
            .map_err(|e| RemoteStoreError::Decode(e.to_string()))
    }
}

#[async_trait]
impl RemoteStore for FirestoreStore {
    /// Any HTTP answer means the service is reachable
    async fn ping(&self) -> Result<(), RemoteStoreError> {
        let response = self
            .authorize(self.client.head(&self.documents_url))
            .send()
            .await
            .map_err(|e| RemoteStoreError::Request(e.to_string()))?;
        debug!("Firestore ping answered {}", response.status());
        Ok(())
    }

    async fn create(&self, collection: &str, data: Value) -> Result<String, RemoteStoreError> {
        let url = format!("{}/{}", self.documents_url, collection);
        let fields = match encode_value(data) {
            Value::Object(wrapper) => wrapper
                .get("mapValue")
                .and_then(|m| m.get("fields"))
                .cloned()
                .unwrap_or_else(|| json!({})),
            _ => {
                return Err(RemoteStoreError::Request(
                    "documents must be JSON objects".to_string(),
                ))
            }
        };

        let body = self
            .send(self.client.post(&url).json(&json!({ "fields": fields })))
            .await?;

        let name = body
            .get("name")
            .and_then(Value::as_str)
            .ok_or_else(|| RemoteStoreError::Decode("created document has no name".to_string()))?;

        let id = document_id(name);
        debug!("Created {}/{}", collection, id);
        Ok(id)
    }

    async fn query(&self, query: &RemoteQuery) -> Result<Vec<RemoteDocument>, RemoteStoreError> {
        let url = format!("{}:runQuery", self.documents_url);
        let body = self
            .send(self.client.post(&url).json(&structured_query(query)))
            .await?;

        let rows = body
            .as_array()
            .ok_or_else(|| RemoteStoreError::Decode("runQuery did not return an array".to_string()))?;

        // Rows without a document only carry read metadata
        rows.iter()
            .filter_map(|row| row.get("document"))
            .map(|doc| {
                let name = doc
                    .get("name")
                    .and_then(Value::as_str)
                    .ok_or_else(|| RemoteStoreError::Decode("document has no name".to_string()))?;
                let fields = doc.get("fields").cloned().unwrap_or_else(|| json!({}));
                Ok(RemoteDocument {
                    id: document_id(name),
                    data: decode_fields(&fields),
                })
            })
            .collect()
    }
}

fn document_id(name: &str) -> String {
    name.rsplit('/').next().unwrap_or(name).to_string()
}

fn structured_query(query: &RemoteQuery) -> Value {
    let mut structured = Map::new();
    structured.insert(
        "from".to_string(),
        json!([{ "collectionId": query.collection }]),
    );

    let filters: Vec<Value> = query
        .filters
        .iter()
        .map(|f| {
            json!({
                "fieldFilter": {
                    "field": { "fieldPath": f.field },
                    "op": "EQUAL",
                    "value": encode_value(f.value.clone()),
                }
            })
        })
        .collect();

    match filters.len() {
        0 => {}
        1 => {
            structured.insert("where".to_string(), filters[0].clone());
        }
        _ => {
            structured.insert(
                "where".to_string(),
                json!({ "compositeFilter": { "op": "AND", "filters": filters } }),
            );
        }
    }

    if let Some(order) = &query.order_by {
        let direction = match order.direction {
            Direction::Ascending => "ASCENDING",
            Direction::Descending => "DESCENDING",
        };
        structured.insert(
            "orderBy".to_string(),
            json!([{ "field": { "fieldPath": order.field }, "direction": direction }]),
        );
    }

    if let Some(limit) = query.limit {
        structured.insert("limit".to_string(), json!(limit));
    }

    json!({ "structuredQuery": structured })
}

/// Plain JSON to a Firestore typed value
fn encode_value(value: Value) -> Value {
    match value {
        Value::Null => json!({ "nullValue": null }),
        Value::Bool(b) => json!({ "booleanValue": b }),
        Value::Number(n) => match n.as_i64() {
            Some(i) => json!({ "integerValue": i.to_string() }),
            None => json!({ "doubleValue": n.as_f64().unwrap_or(0.0) }),
        },
        Value::String(s) => json!({ "stringValue": s }),
        Value::Array(items) => {
            let values: Vec<Value> = items.into_iter().map(encode_value).collect();
            json!({ "arrayValue": { "values": values } })
        }
        Value::Object(fields) => {
            let fields: Map<String, Value> = fields
                .into_iter()
                .map(|(k, v)| (k, encode_value(v)))
                .collect();
            json!({ "mapValue": { "fields": fields } })
        }
    }
}

/// Firestore typed value back to plain JSON
fn decode_value(value: &Value) -> Value {
    let Some(object) = value.as_object() else {
        return Value::Null;
    };

    if let Some(s) = object.get("stringValue") {
        return s.clone();
    }
    if let Some(b) = object.get("booleanValue") {
        return b.clone();
    }
    if let Some(i) = object.get("integerValue") {
        return match i {
            Value::String(s) => s.parse::<i64>().map(Value::from).unwrap_or(Value::Null),
            other => other.clone(),
        };
    }
    if let Some(d) = object.get("doubleValue") {
        return d.clone();
    }
    if let Some(t) = object.get("timestampValue") {
        return t.clone();
    }
    if let Some(array) = object.get("arrayValue") {
        let items = array
            .get("values")
            .and_then(Value::as_array)
            .map(|values| values.iter().map(decode_value).collect())
            .unwrap_or_default();
        return Value::Array(items);
    }
    if let Some(map) = object.get("mapValue") {
        return decode_fields(map.get("fields").unwrap_or(&Value::Null));
    }
    Value::Null
}

fn decode_fields(fields: &Value) -> Value {
    let decoded: Map<String, Value> = fields
        .as_object()
        .map(|fields| {
            fields
                .iter()
                .map(|(k, v)| (k.clone(), decode_value(v)))
                .collect()
        })
        .unwrap_or_default();
    Value::Object(decoded)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_value_encoding_round_trips() {
        let doc = json!({
            "user_id": "u1",
            "timestamp": 1_700_000_000_000i64,
            "emotion_snapshot": { "dominant": "sad", "mean_scores": { "sad": 0.75 } },
            "tags": ["a", "b"],
            "flag": true
        });

        let encoded = encode_value(doc.clone());
        assert_eq!(
            encoded["mapValue"]["fields"]["timestamp"],
            json!({ "integerValue": "1700000000000" })
        );
        assert_eq!(decode_value(&encoded), doc);
    }

    #[test]
    fn test_structured_query_shape() {
        let query = RemoteQuery::collection("conversations")
            .where_eq("user_id", json!("u1"))
            .order_by("timestamp", Direction::Descending)
            .limit(100);

        let body = structured_query(&query);
        let sq = &body["structuredQuery"];
        assert_eq!(sq["from"][0]["collectionId"], "conversations");
        assert_eq!(sq["where"]["fieldFilter"]["field"]["fieldPath"], "user_id");
        assert_eq!(sq["orderBy"][0]["direction"], "DESCENDING");
        assert_eq!(sq["limit"], 100);
    }

    #[test]
    fn test_document_id_is_last_segment() {
        assert_eq!(
            document_id("projects/p/databases/(default)/documents/conversations/abc123"),
            "abc123"
        );
    }
}
