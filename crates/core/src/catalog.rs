use std::collections::BTreeMap;
use std::sync::atomic::{AtomicUsize, Ordering};

use rust_decimal::Decimal;

use crate::domain::product::{normalize_code, Product};

pub trait ProductCatalog: Send + Sync {
    /// Resolves a code typed by the operator. Implementations compare codes
    /// case-insensitively.
    fn lookup(&self, code: &str) -> Option<Product>;
}

#[derive(Clone, Debug, Default)]
pub struct InMemoryCatalog {
    products: BTreeMap<String, Product>,
}

impl InMemoryCatalog {
    pub fn new(products: Vec<Product>) -> Self {
        let mut catalog = Self::default();
        for product in products {
            catalog.insert(product);
        }
        catalog
    }

    pub fn insert(&mut self, product: Product) {
        self.products.insert(normalize_code(&product.code), product);
    }

    pub fn len(&self) -> usize {
        self.products.len()
    }

    pub fn is_empty(&self) -> bool {
        self.products.is_empty()
    }
}

impl ProductCatalog for InMemoryCatalog {
    fn lookup(&self, code: &str) -> Option<Product> {
        self.products.get(&normalize_code(code)).cloned()
    }
}

/// Placeholder products handed out, in order, for codes the catalog cannot resolve.
///
/// Consecutive misses receive different entries so manual overrides stay visually
/// distinguishable. The cursor is shared by every editor holding the same instance.
#[derive(Debug)]
pub struct FallbackCycle {
    pool: Vec<Product>,
    cursor: AtomicUsize,
}

impl FallbackCycle {
    /// An empty pool is replaced by the default one.
    pub fn new(pool: Vec<Product>) -> Self {
        let pool = if pool.is_empty() { default_pool() } else { pool };
        Self { pool, cursor: AtomicUsize::new(0) }
    }

    pub fn next_product(&self) -> Product {
        let index = self.cursor.fetch_add(1, Ordering::Relaxed) % self.pool.len();
        self.pool[index].clone()
    }

    pub fn reset(&self) {
        self.cursor.store(0, Ordering::Relaxed);
    }

    pub fn position(&self) -> usize {
        self.cursor.load(Ordering::Relaxed) % self.pool.len()
    }

    pub fn pool(&self) -> &[Product] {
        &self.pool
    }
}

impl Default for FallbackCycle {
    fn default() -> Self {
        Self::new(default_pool())
    }
}

fn default_pool() -> Vec<Product> {
    vec![
        Product::new("FALLBACK-01", "Standard component", Decimal::new(1250, 2)),
        Product::new("FALLBACK-02", "Generic fastener set", Decimal::new(2490, 2)),
        Product::new("FALLBACK-03", "Unlisted accessory", Decimal::new(875, 2)),
        Product::new("FALLBACK-04", "Custom fitting", Decimal::new(4500, 2)),
        Product::new("FALLBACK-05", "Miscellaneous supply", Decimal::new(320, 2)),
    ]
}

#[cfg(test)]
mod tests {
    use rust_decimal::Decimal;

    use super::{FallbackCycle, InMemoryCatalog, ProductCatalog};
    use crate::domain::product::Product;

    #[test]
    fn catalog_lookup_is_case_insensitive() {
        let catalog = InMemoryCatalog::new(vec![Product::new(
            "HX-100",
            "Hex bolt M10",
            Decimal::new(45, 2),
        )]);

        let product = catalog.lookup(" hx-100 ").expect("product should resolve");
        assert_eq!(product.code, "HX-100");
        assert!(catalog.lookup("HX-101").is_none());
    }

    #[test]
    fn fallback_cycle_wraps_and_resets() {
        let cycle = FallbackCycle::new(vec![
            Product::new("F-A", "First", Decimal::ONE),
            Product::new("F-B", "Second", Decimal::new(2, 0)),
        ]);

        assert_eq!(cycle.next_product().name, "First");
        assert_eq!(cycle.next_product().name, "Second");
        assert_eq!(cycle.next_product().name, "First");

        cycle.reset();
        assert_eq!(cycle.position(), 0);
        assert_eq!(cycle.next_product().name, "First");
    }

    #[test]
    fn empty_pool_uses_defaults() {
        let cycle = FallbackCycle::new(Vec::new());
        assert_eq!(cycle.pool().len(), 5);
    }
}
