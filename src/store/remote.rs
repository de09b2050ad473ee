use async_trait::async_trait;
use serde_json::Value;

use crate::error::RemoteStoreError;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    Ascending,
    Descending,
}

/// Equality filter on one field
#[derive(Debug, Clone, PartialEq)]
pub struct QueryFilter {
    pub field: String,
    pub value: Value,
}

#[derive(Debug, Clone, PartialEq)]
pub struct OrderBy {
    pub field: String,
    pub direction: Direction,
}

#[derive(Debug, Clone, PartialEq)]
pub struct RemoteQuery {
    pub collection: String,
    pub filters: Vec<QueryFilter>,
    pub order_by: Option<OrderBy>,
    pub limit: Option<usize>,
}

impl RemoteQuery {
    pub fn collection(name: impl Into<String>) -> Self {
        Self {
            collection: name.into(),
            filters: Vec::new(),
            order_by: None,
            limit: None,
        }
    }

    pub fn where_eq(mut self, field: impl Into<String>, value: Value) -> Self {
        self.filters.push(QueryFilter {
            field: field.into(),
            value,
        });
        self
    }

    pub fn order_by(mut self, field: impl Into<String>, direction: Direction) -> Self {
        self.order_by = Some(OrderBy {
            field: field.into(),
            direction,
        });
        self
    }

    pub fn limit(mut self, limit: usize) -> Self {
        self.limit = Some(limit);
        self
    }
}

/// A document returned by a query
#[derive(Debug, Clone, PartialEq)]
pub struct RemoteDocument {
    pub id: String,
    pub data: Value,
}

/// Remote document store capability
#[async_trait]
pub trait RemoteStore: Send + Sync {
    /// Create a document and return its id
    async fn create(&self, collection: &str, data: Value) -> Result<String, RemoteStoreError>;

    async fn query(&self, query: &RemoteQuery) -> Result<Vec<RemoteDocument>, RemoteStoreError>;

    /// Check that the backend answers at all
    async fn ping(&self) -> Result<(), RemoteStoreError> {
        Ok(())
    }
}
