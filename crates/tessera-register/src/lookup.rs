//! # Product Lookup
//!
//! Local catalog snapshot in front of the catalog source.
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  term ──► validate ──► resolve(term, snapshot)                          │
//! │                            │ hit ──────────────────────────► Product    │
//! │                            │ miss with structured id                    │
//! │                            ▼                                            │
//! │                     CatalogSource::fetch_by_id                          │
//! │                            │ found: cache in snapshot, resolve again    │
//! │                            │ empty / error                              │
//! │                            ▼                                            │
//! │                     ProductNotFound { term }                            │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use std::sync::Arc;

use tracing::{debug, info, warn};

use tessera_core::resolver::{resolve, Resolved, Unresolved};
use tessera_core::validation::validate_search_term;
use tessera_core::Product;

use crate::error::{RegisterError, RegisterResult};
use crate::ports::CatalogSource;

pub struct ProductLookup {
    source: Arc<dyn CatalogSource>,
    snapshot: Vec<Product>,
}

impl ProductLookup {
    pub fn new(source: Arc<dyn CatalogSource>) -> Self {
        ProductLookup {
            source,
            snapshot: Vec::new(),
        }
    }

    pub fn snapshot(&self) -> &[Product] {
        &self.snapshot
    }

    /// Replaces the snapshot with a fresh listing. On failure the previous
    /// snapshot stays in use.
    pub async fn refresh_catalog(&mut self) -> RegisterResult<usize> {
        match self.source.list().await {
            Ok(products) => {
                info!(count = products.len(), "Catalog snapshot refreshed");
                self.snapshot = products;
                Ok(self.snapshot.len())
            }
            Err(e) => {
                warn!(error = %e, kept = self.snapshot.len(), "Catalog refresh failed");
                Err(RegisterError::CatalogUnavailable(e.to_string()))
            }
        }
    }

    /// Resolves a scan payload or search term to a product.
    pub async fn resolve(&mut self, input: &str) -> RegisterResult<Product> {
        let term = validate_search_term(input).map_err(tessera_core::CoreError::from)?;

        let miss = match resolve(&term, &self.snapshot) {
            Ok(resolved) => return Ok(self.accept(resolved)),
            Err(miss) => miss,
        };

        let Some(remote_id) = miss.remote_id.clone() else {
            debug!(term = %miss.term, "No local match");
            return Err(not_found(miss));
        };

        match self.source.fetch_by_id(&remote_id).await {
            Ok(Some(product)) => {
                debug!(product_id = %product.id, "Fetched product missing from snapshot");
                self.cache(product);
            }
            Ok(None) => {
                debug!(%remote_id, "Remote catalog has no such product");
                return Err(not_found(miss));
            }
            Err(e) => {
                warn!(%remote_id, error = %e, "Remote product fetch failed");
                return Err(not_found(miss));
            }
        }

        resolve(&term, &self.snapshot)
            .map(|resolved| self.accept(resolved))
            .map_err(not_found)
    }

    fn accept(&self, resolved: Resolved) -> Product {
        if let Resolved::Transient(product) = &resolved {
            debug!(product_id = %product.id, "Structured payload used as transient product");
        }
        resolved.into_product()
    }

    fn cache(&mut self, product: Product) {
        match self.snapshot.iter_mut().find(|p| p.id == product.id) {
            Some(existing) => *existing = product,
            None => self.snapshot.push(product),
        }
    }
}

fn not_found(miss: Unresolved) -> RegisterError {
    RegisterError::ProductNotFound { term: miss.term }
}
