//! # In-Memory Collaborators
//!
//! Process-local implementations of every port, with failure injection.
//! Used by the test suites and by the `simulate` binary.

use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};

use async_trait::async_trait;
use uuid::Uuid;

use tessera_core::{Address, BusinessProfile, Customer, JurisdictionRate, Product, Transaction};

use crate::error::CollaboratorError;
use crate::ports::{
    AccountingSink, CatalogSource, Collaborators, CustomerDirectory, GatewayOutcome,
    PaymentGateway, PaymentRequest, PortResult, ReceiptRenderer, SinkReceipt, TaxSettingsStore,
};

/// A poisoned lock only means another test thread panicked.
fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

fn offline(name: &str) -> CollaboratorError {
    CollaboratorError::Unavailable(format!("{} offline", name))
}

// =============================================================================
// Catalog
// =============================================================================

#[derive(Default)]
pub struct MemoryCatalog {
    /// Returned by `list`.
    listed: Mutex<Vec<Product>>,
    /// Reachable only through `fetch_by_id`.
    remote: Mutex<Vec<Product>>,
    failing: AtomicBool,
    fetches: AtomicUsize,
}

impl MemoryCatalog {
    pub fn new(products: Vec<Product>) -> Self {
        MemoryCatalog {
            listed: Mutex::new(products),
            ..Default::default()
        }
    }

    /// Adds a product that is missing from the listed snapshot.
    pub fn with_remote(self, product: Product) -> Self {
        lock(&self.remote).push(product);
        self
    }

    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }

    pub fn fetches(&self) -> usize {
        self.fetches.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl CatalogSource for MemoryCatalog {
    async fn list(&self) -> PortResult<Vec<Product>> {
        if self.failing.load(Ordering::SeqCst) {
            return Err(offline("catalog"));
        }
        Ok(lock(&self.listed).clone())
    }

    async fn fetch_by_id(&self, id: &str) -> PortResult<Option<Product>> {
        self.fetches.fetch_add(1, Ordering::SeqCst);
        if self.failing.load(Ordering::SeqCst) {
            return Err(offline("catalog"));
        }
        let listed = lock(&self.listed);
        let remote = lock(&self.remote);
        Ok(listed
            .iter()
            .chain(remote.iter())
            .find(|p| p.id == id)
            .cloned())
    }
}

// =============================================================================
// Customers
// =============================================================================

#[derive(Default)]
pub struct MemoryCustomers {
    customers: Mutex<HashMap<String, Customer>>,
    failing: AtomicBool,
}

impl MemoryCustomers {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_customer(self, customer: Customer) -> Self {
        lock(&self.customers).insert(customer.id.clone(), customer);
        self
    }

    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }
}

#[async_trait]
impl CustomerDirectory for MemoryCustomers {
    async fn customer(&self, id: &str) -> PortResult<Option<Customer>> {
        if self.failing.load(Ordering::SeqCst) {
            return Err(offline("customer directory"));
        }
        Ok(lock(&self.customers).get(id).cloned())
    }
}

// =============================================================================
// Tax Settings
// =============================================================================

/// Exact-match rate table keyed by normalized address.
#[derive(Default)]
pub struct MemoryTaxSettings {
    rates: Mutex<HashMap<Address, JurisdictionRate>>,
    failing: AtomicBool,
    calls: AtomicUsize,
}

impl MemoryTaxSettings {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_rate(self, address: Address, rate: JurisdictionRate) -> Self {
        lock(&self.rates).insert(address.normalized(), rate);
        self
    }

    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }

    /// Number of `rate` calls that reached the table.
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl TaxSettingsStore for MemoryTaxSettings {
    async fn rate(&self, address: &Address) -> PortResult<Option<JurisdictionRate>> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if self.failing.load(Ordering::SeqCst) {
            return Err(CollaboratorError::Timeout { after_ms: 2_000 });
        }
        Ok(lock(&self.rates).get(&address.normalized()).cloned())
    }
}

// =============================================================================
// Payment Gateway
// =============================================================================

/// Plays back queued outcomes; confirms with a fresh token once the queue is
/// empty. A held gateway never answers, which leaves the interaction to be
/// cancelled or resolved externally.
#[derive(Default)]
pub struct ScriptedGateway {
    script: Mutex<VecDeque<PortResult<GatewayOutcome>>>,
    requests: Mutex<Vec<PaymentRequest>>,
    hold: AtomicBool,
}

impl ScriptedGateway {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&self, outcome: PortResult<GatewayOutcome>) {
        lock(&self.script).push_back(outcome);
    }

    pub fn set_hold(&self, hold: bool) {
        self.hold.store(hold, Ordering::SeqCst);
    }

    pub fn requests(&self) -> Vec<PaymentRequest> {
        lock(&self.requests).clone()
    }
}

#[async_trait]
impl PaymentGateway for ScriptedGateway {
    async fn authorize(&self, request: &PaymentRequest) -> PortResult<GatewayOutcome> {
        lock(&self.requests).push(request.clone());
        if self.hold.load(Ordering::SeqCst) {
            std::future::pending::<()>().await;
        }
        let scripted = lock(&self.script).pop_front();
        scripted.unwrap_or_else(|| {
            Ok(GatewayOutcome::Confirmed {
                token: format!("tok_{}", Uuid::new_v4().simple()),
            })
        })
    }
}

// =============================================================================
// Accounting Sink
// =============================================================================

#[derive(Default)]
pub struct MemorySink {
    committed: Mutex<Vec<Transaction>>,
    payloads: Mutex<Vec<String>>,
    failures_left: AtomicUsize,
    rejecting: AtomicBool,
}

impl MemorySink {
    pub fn new() -> Self {
        Self::default()
    }

    /// The next `count` submissions fail as unavailable.
    pub fn fail_next(&self, count: usize) {
        self.failures_left.store(count, Ordering::SeqCst);
    }

    /// Every submission is refused until cleared.
    pub fn set_rejecting(&self, rejecting: bool) {
        self.rejecting.store(rejecting, Ordering::SeqCst);
    }

    pub fn committed(&self) -> Vec<Transaction> {
        lock(&self.committed).clone()
    }

    /// JSON bodies as they would go over the wire, one per commit.
    pub fn payloads(&self) -> Vec<String> {
        lock(&self.payloads).clone()
    }
}

#[async_trait]
impl AccountingSink for MemorySink {
    async fn submit(&self, transaction: &Transaction) -> PortResult<SinkReceipt> {
        if self.rejecting.load(Ordering::SeqCst) {
            return Err(CollaboratorError::Rejected("ledger closed".into()));
        }
        let failing = self
            .failures_left
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();
        if failing {
            return Err(offline("accounting sink"));
        }

        let payload = serde_json::to_string(transaction)
            .map_err(|e| CollaboratorError::Rejected(format!("unencodable payload: {}", e)))?;

        let mut committed = lock(&self.committed);
        if committed.iter().any(|t| t.id == transaction.id) {
            return Err(CollaboratorError::Rejected(format!(
                "transaction {} already recorded",
                transaction.id
            )));
        }
        committed.push(transaction.clone());
        lock(&self.payloads).push(payload);

        Ok(SinkReceipt {
            record_id: format!("rec-{}", committed.len()),
            inventory_updated: true,
            accounting_entries_created: true,
            backorders_created: transaction.backordered_lines().count(),
        })
    }
}

// =============================================================================
// Receipt Renderer
// =============================================================================

/// Renders plain-text receipts into memory.
#[derive(Default)]
pub struct TextReceipts {
    rendered: Mutex<Vec<String>>,
    failing: AtomicBool,
}

impl TextReceipts {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }

    pub fn rendered(&self) -> Vec<String> {
        lock(&self.rendered).clone()
    }
}

#[async_trait]
impl ReceiptRenderer for TextReceipts {
    async fn render(&self, transaction: &Transaction, business: &BusinessProfile) -> PortResult<()> {
        if self.failing.load(Ordering::SeqCst) {
            return Err(offline("printer"));
        }

        let mut out = format!("{}\n", business.name);
        for line in &transaction.lines {
            out.push_str(&format!(
                "{} x{} @ {} = {}\n",
                line.product.name,
                line.quantity,
                line.unit_price,
                line.line_total()
            ));
        }
        let shown = &transaction.presented;
        out.push_str(&format!("Subtotal {}\n", shown.subtotal));
        if !shown.discount.is_zero() {
            out.push_str(&format!("Discount -{}\n", shown.discount));
        }
        out.push_str(&format!("Tax {}\n", shown.tax));
        out.push_str(&format!("Total {}\n", shown.total));
        if let Some(cash) = &transaction.cash {
            out.push_str(&format!("Cash {}\nChange {}\n", cash.tendered, cash.change));
        }

        lock(&self.rendered).push(out);
        Ok(())
    }
}

// =============================================================================
// Bundle
// =============================================================================

/// Concrete handles to every in-memory collaborator.
#[derive(Clone)]
pub struct MemoryCollaborators {
    pub catalog: Arc<MemoryCatalog>,
    pub customers: Arc<MemoryCustomers>,
    pub tax_settings: Arc<MemoryTaxSettings>,
    pub gateway: Arc<ScriptedGateway>,
    pub sink: Arc<MemorySink>,
    pub receipts: Arc<TextReceipts>,
}

impl MemoryCollaborators {
    pub fn new(catalog: MemoryCatalog, customers: MemoryCustomers, tax_settings: MemoryTaxSettings) -> Self {
        MemoryCollaborators {
            catalog: Arc::new(catalog),
            customers: Arc::new(customers),
            tax_settings: Arc::new(tax_settings),
            gateway: Arc::new(ScriptedGateway::new()),
            sink: Arc::new(MemorySink::new()),
            receipts: Arc::new(TextReceipts::new()),
        }
    }

    pub fn ports(&self) -> Collaborators {
        Collaborators {
            catalog: self.catalog.clone(),
            customers: self.customers.clone(),
            tax_settings: self.tax_settings.clone(),
            gateway: self.gateway.clone(),
            sink: self.sink.clone(),
            receipts: self.receipts.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_catalog_remote_only_reachable_by_fetch() {
        let catalog = MemoryCatalog::new(vec![Product::new("p-1", "Oil Filter", 1200)])
            .with_remote(Product::new("p-9", "Spark Plug", 450));

        assert_eq!(catalog.list().await.unwrap().len(), 1);
        assert!(catalog.fetch_by_id("p-9").await.unwrap().is_some());
        assert!(catalog.fetch_by_id("p-404").await.unwrap().is_none());
        assert_eq!(catalog.fetches(), 2);
    }

    #[tokio::test]
    async fn test_scripted_gateway_plays_queue_then_confirms() {
        let gateway = ScriptedGateway::new();
        gateway.push(Ok(GatewayOutcome::Declined {
            reason: "insufficient funds".into(),
        }));
        let request = PaymentRequest {
            attempt_id: "a-1".into(),
            amount: tessera_core::Money::from_cents(100),
            currency: "USD".into(),
            customer_id: None,
        };

        assert!(matches!(
            gateway.authorize(&request).await.unwrap(),
            GatewayOutcome::Declined { .. }
        ));
        assert!(matches!(
            gateway.authorize(&request).await.unwrap(),
            GatewayOutcome::Confirmed { .. }
        ));
        assert_eq!(gateway.requests().len(), 2);
    }
}
