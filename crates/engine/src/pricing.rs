//! Flow pricing and the listing catalog collaborator
//!
//! Registration and report deposits are fixed by configuration; a purchase
//! costs whatever the listing says. The catalog also holds the secret CID a
//! confirmed purchase reveals.

use async_trait::async_trait;
use bdtp_types::{AssetAmount, ChainAddress, SubjectId, TransferRequirement};
use std::collections::HashMap;
use std::sync::RwLock;
use thiserror::Error;

use crate::config::EngineConfig;

#[derive(Debug, Clone, Error)]
pub enum CatalogError {
    #[error("catalog unavailable: {0}")]
    Unavailable(String),
}

/// One listed item.
#[derive(Debug, Clone)]
pub struct Listing {
    pub price: AssetAmount,
    /// The content identifier being sold; revealed only after payment.
    pub cid: String,
    pub seller: ChainAddress,
}

/// Read-only view of the marketplace listings.
#[async_trait]
pub trait ListingCatalog: Send + Sync {
    /// The active listing for a subject, or `None` when it is not for sale.
    async fn listing(&self, subject: &SubjectId) -> Result<Option<Listing>, CatalogError>;
}

/// In-memory catalog for tests and local wiring.
#[derive(Default)]
pub struct InMemoryCatalog {
    listings: RwLock<HashMap<SubjectId, Listing>>,
}

impl InMemoryCatalog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn list(&self, subject: SubjectId, listing: Listing) {
        self.listings
            .write()
            .expect("catalog lock poisoned")
            .insert(subject, listing);
    }

    pub fn unlist(&self, subject: &SubjectId) {
        self.listings
            .write()
            .expect("catalog lock poisoned")
            .remove(subject);
    }
}

#[async_trait]
impl ListingCatalog for InMemoryCatalog {
    async fn listing(&self, subject: &SubjectId) -> Result<Option<Listing>, CatalogError> {
        Ok(self
            .listings
            .read()
            .map_err(|_| CatalogError::Unavailable("catalog lock poisoned".into()))?
            .get(subject)
            .cloned())
    }
}

/// Build the transfer requirement for a flow from its pricing rule.
pub(crate) fn fixed_requirement(config: &EngineConfig, amount: AssetAmount) -> TransferRequirement {
    TransferRequirement::new(config.treasury_address.clone(), amount)
}
