//! The transport contract and its store-backed implementation.
//!
//! A transport moves documents addressed by `(id, band)` in and out of a
//! backing store and reports changes to them. Values travel as
//! [`Document`]s; errors travel in the `Result` of each call.

mod builder;
mod list;
mod notify;
mod store_transport;
pub use builder::*;
pub use notify::Updates;
pub use store_transport::*;

#[cfg(test)]
mod notify_test;

use async_trait::async_trait;
use futures::stream::BoxStream;

use crate::Document;
use crate::Error;
use crate::Result;

/// Addresses one entity, or one band of it.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct EntityRef {
    pub id: String,
    pub band: Option<String>,
}

impl EntityRef {
    pub fn new(
        id: impl Into<String>,
        band: impl Into<String>,
    ) -> Self {
        Self {
            id: id.into(),
            band: Some(band.into()),
        }
    }

    /// A reference to every band of `id`.
    pub fn entity(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            band: None,
        }
    }

    pub(crate) fn require_id(&self) -> Result<&str> {
        if self.id.is_empty() {
            return Err(Error::InvalidRequest("entity id cannot be empty".into()));
        }
        Ok(&self.id)
    }

    pub(crate) fn require_band(&self) -> Result<(&str, &str)> {
        let id = self.require_id()?;
        match self.band.as_deref() {
            Some(band) if !band.is_empty() => Ok((id, band)),
            _ => Err(Error::InvalidRequest(format!("band required for entity {id:?}"))),
        }
    }
}

/// What a [`Record`] carries in place of a value.
#[derive(Debug, Clone, PartialEq)]
pub enum Payload {
    /// Nothing is stored under the channel
    Missing,
    /// A change notice; fetch the value with `get`
    Deferred,
    Present(Document),
}

#[derive(Debug, Clone, PartialEq)]
pub struct Record {
    pub id: String,
    pub band: String,
    pub value: Payload,
}

impl Record {
    pub fn value(&self) -> Option<&Document> {
        match &self.value {
            Payload::Present(value) => Some(value),
            _ => None,
        }
    }

    pub fn into_value(self) -> Option<Document> {
        match self.value {
            Payload::Present(value) => Some(value),
            _ => None,
        }
    }

    pub fn entity(&self) -> EntityRef {
        EntityRef::new(self.id.clone(), self.band.clone())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ListItem {
    Entity { id: String },
    /// Enumeration finished. Always the last item of a successful listing.
    End,
}

pub type ListStream = BoxStream<'static, Result<ListItem>>;

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ListFilter {
    /// Restrict to one entity
    pub id: Option<String>,
}

impl ListFilter {
    pub fn all() -> Self {
        Self::default()
    }

    pub fn id(id: impl Into<String>) -> Self {
        Self { id: Some(id.into()) }
    }
}

/// Exact-match filter for change notices. `None` matches anything.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct UpdateFilter {
    pub id: Option<String>,
    pub band: Option<String>,
}

impl UpdateFilter {
    pub fn all() -> Self {
        Self::default()
    }

    pub fn new(
        id: Option<&str>,
        band: Option<&str>,
    ) -> Self {
        Self {
            id: id.map(str::to_string),
            band: band.map(str::to_string),
        }
    }

    pub fn matches(
        &self,
        id: &str,
        band: &str,
    ) -> bool {
        self.id.as_deref().map_or(true, |want| want == id)
            && self.band.as_deref().map_or(true, |want| want == band)
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PutOptions {
    /// Overrides `write.check_timestamp` for this call
    pub check_timestamp: Option<bool>,
}

impl PutOptions {
    pub fn unchecked() -> Self {
        Self {
            check_timestamp: Some(false),
        }
    }
}

/// Key-addressable transport.
///
/// Every call completes with a value or an error, waiting for the connection
/// to settle first if needed. Nothing is retried.
#[async_trait]
pub trait Transport: Send + Sync {
    /// Distinct entity ids, each once, followed by [`ListItem::End`].
    ///
    /// The stream is lazy: no store traffic happens until it is polled. A
    /// scan failure is yielded as an error and ends the stream; ids already
    /// yielded stay valid.
    fn list(
        &self,
        filter: ListFilter,
    ) -> ListStream;

    /// Signals that an entity may have gained data. This transport keeps no
    /// index, so it only validates the reference.
    async fn added(
        &self,
        entity: &EntityRef,
    ) -> Result<()>;

    /// Distinct bands stored for one entity.
    async fn bands(
        &self,
        id: &str,
    ) -> Result<Vec<String>>;

    async fn get(
        &self,
        entity: &EntityRef,
    ) -> Result<Record>;

    /// Writes `value`, stamping and checking its timestamp as configured.
    /// Returns the value as stored.
    async fn put(
        &self,
        entity: &EntityRef,
        value: Document,
        options: PutOptions,
    ) -> Result<Record>;

    /// Always fails with [`Error::NotImplemented`].
    async fn remove(
        &self,
        entity: &EntityRef,
    ) -> Result<Record>;

    /// Change notices matching `filter` until the returned stream is dropped.
    async fn updated(
        &self,
        filter: UpdateFilter,
    ) -> Result<Updates>;
}
