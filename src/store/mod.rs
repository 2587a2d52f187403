//! # Store Adapter
//!
//! Inserts reading documents into the remote MongoDB collection.
//!
//! This module handles:
//! - The `DocumentStore` seam the scheduler uploads through
//! - A driver-backed client bound to one collection
//! - BSON encoding with native dates and ObjectIds
//! - Mapping driver failures to typed `StoreError`s

use async_trait::async_trait;
use mongodb::bson::{doc, oid::ObjectId, Bson, DateTime as BsonDateTime, Document};
use mongodb::error::ErrorKind;
use mongodb::options::ClientOptions;
use mongodb::{Client, Collection};
use std::time::Duration;
use thiserror::Error;
use tracing::debug;

use crate::config::StoreConfig;
use crate::sensor::ReadingDocument;

/// Application name reported to the server
const APP_NAME: &str = "sensor-uplink";

/// Errors reported by a document store
#[derive(Debug, Error)]
pub enum StoreError {
    /// Connection string could not be parsed or resolved
    #[error("invalid store connection string: {0}")]
    InvalidConnectionString(String),

    /// No server could be selected (DNS, TCP, TLS failure)
    #[error("store unreachable: {0}")]
    Connection(String),

    /// No answer within the configured timeout
    #[error("store request timed out after {0:?}")]
    Timeout(Duration),

    /// Server refused the write (auth, validation, duplicate key, ...)
    #[error("store rejected write: {0}")]
    Rejected(String),

    /// Any other driver failure
    #[error("store request failed: {0}")]
    Request(String),
}

impl From<mongodb::error::Error> for StoreError {
    fn from(e: mongodb::error::Error) -> Self {
        match e.kind.as_ref() {
            ErrorKind::ServerSelection { .. } | ErrorKind::DnsResolve { .. } | ErrorKind::Io(_) => {
                StoreError::Connection(e.to_string())
            }
            ErrorKind::Authentication { .. } | ErrorKind::Write(_) | ErrorKind::InsertMany(_) => {
                StoreError::Rejected(e.to_string())
            }
            _ => StoreError::Request(e.to_string()),
        }
    }
}

/// Remote store the uploader writes to
///
/// Implementations own their connection handling and must report every
/// failure as a `StoreError`; no existence check is needed before inserting.
#[async_trait]
pub trait DocumentStore: Send + Sync {
    async fn insert_one(&self, document: &ReadingDocument) -> Result<(), StoreError>;

    async fn insert_many(&self, documents: &[ReadingDocument]) -> Result<(), StoreError>;
}

/// Send a batch using the insert that matches its size
///
/// An empty batch is a no-op.
pub async fn forward(store: &dyn DocumentStore, documents: &[ReadingDocument]) -> Result<(), StoreError> {
    match documents {
        [] => Ok(()),
        [document] => store.insert_one(document).await,
        many => store.insert_many(many).await,
    }
}

/// MongoDB collection client
///
/// The driver keeps its own connection pool and reconnects on demand, so
/// one instance lives for the whole run.
#[derive(Debug, Clone)]
pub struct MongoStore {
    collection: Collection<Document>,
    timeout: Duration,
}

impl MongoStore {
    /// Build a client from configuration
    ///
    /// Only the connection string is parsed here (plus the DNS lookup a
    /// `mongodb+srv://` string needs); no server is contacted, since the
    /// store may well be unreachable at startup.
    ///
    /// # Errors
    ///
    /// Returns error if the connection string is invalid
    pub async fn connect(config: &StoreConfig) -> Result<Self, StoreError> {
        let mut options = ClientOptions::parse(config.connection_string.as_str())
            .await
            .map_err(|e| StoreError::InvalidConnectionString(e.to_string()))?;
        options.app_name.get_or_insert_with(|| APP_NAME.to_string());
        options.server_selection_timeout.get_or_insert(config.timeout());
        options.connect_timeout.get_or_insert(config.timeout());

        let client = Client::with_options(options)?;
        let collection = client
            .database(&config.database)
            .collection::<Document>(&config.collection);

        Ok(Self {
            collection,
            timeout: config.timeout(),
        })
    }

    pub fn namespace(&self) -> String {
        self.collection.namespace().to_string()
    }
}

#[async_trait]
impl DocumentStore for MongoStore {
    async fn insert_one(&self, document: &ReadingDocument) -> Result<(), StoreError> {
        let encoded = to_bson_document(document);
        tokio::time::timeout(self.timeout, self.collection.insert_one(encoded))
            .await
            .map_err(|_| StoreError::Timeout(self.timeout))??;

        debug!("Inserted 1 document into {}", self.collection.namespace());
        Ok(())
    }

    async fn insert_many(&self, documents: &[ReadingDocument]) -> Result<(), StoreError> {
        let encoded: Vec<Document> = documents.iter().map(to_bson_document).collect();
        let result = tokio::time::timeout(self.timeout, self.collection.insert_many(encoded))
            .await
            .map_err(|_| StoreError::Timeout(self.timeout))??;

        debug!(
            "Inserted {} documents into {}",
            result.inserted_ids.len(),
            self.collection.namespace()
        );
        Ok(())
    }
}

/// Encode a reading as a BSON document
///
/// `recorded_at` becomes a BSON date, and an installation id that parses as
/// an ObjectId is stored as one, so the collection keeps native types.
pub fn to_bson_document(document: &ReadingDocument) -> Document {
    let mut encoded = doc! {
        "kind": document.kind.as_str(),
        "index": document.index.as_str(),
        "value": document.value,
        "unit": document.unit.as_str(),
        "recorded_at": BsonDateTime::from_millis(document.recorded_at.timestamp_millis()),
    };

    if let Some(owner) = &document.owner_ref {
        let id = match ObjectId::parse_str(&owner.id) {
            Ok(oid) => Bson::ObjectId(oid),
            Err(_) => Bson::String(owner.id.clone()),
        };
        encoded.insert("owner_ref", doc! { "id": id, "name": owner.name.as_str() });
    }

    encoded
}
