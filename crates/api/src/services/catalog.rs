//! Catalog reads: cached product list, rating summaries and the listing
//! views built on top of them.
//!
//! The full product list and the rating summaries are cached with `moka`
//! under fixed keys; any write to products, claims, reviews or stock calls
//! [`CatalogCache::invalidate`].

use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use moka::future::Cache;
use serde::Serialize;
use tracing::instrument;

use marketplace_core::catalog::Product;
use marketplace_core::claim::Claim;
use marketplace_core::listing::{Listing, ListingQuery, Page};
use marketplace_core::review::RatingSummary;
use marketplace_core::{ProductId, UserId};

use crate::db::{MarketplaceStore, RepositoryError};

const PRODUCTS_KEY: &str = "products";
const RATINGS_KEY: &str = "ratings";

#[derive(Clone)]
enum CacheValue {
    Products(Arc<Vec<Product>>),
    Ratings(Arc<HashMap<ProductId, RatingSummary>>),
}

/// TTL cache over the catalog reads every listing needs.
///
/// Every invalidation bumps a generation counter. A fill records the
/// generation before it reads the store and is dropped if an invalidation
/// ran in between, so a write is never hidden behind a stale entry.
#[derive(Clone)]
pub struct CatalogCache {
    cache: Cache<&'static str, CacheValue>,
    generation: Arc<AtomicU64>,
}

impl CatalogCache {
    #[must_use]
    pub fn new(ttl: Duration) -> Self {
        let cache = Cache::builder().max_capacity(16).time_to_live(ttl).build();
        Self {
            cache,
            generation: Arc::new(AtomicU64::new(0)),
        }
    }

    /// Drop every cached entry and any fill still in flight.
    pub fn invalidate(&self) {
        self.generation.fetch_add(1, Ordering::AcqRel);
        self.cache.invalidate_all();
    }

    fn generation(&self) -> u64 {
        self.generation.load(Ordering::Acquire)
    }

    /// Store `value` read at `generation`, unless the cache was invalidated
    /// since.
    async fn fill(&self, generation: u64, key: &'static str, value: CacheValue) {
        if self.generation() != generation {
            return;
        }
        self.cache.insert(key, value).await;
        // An invalidation between the check and the insert may have run
        // `invalidate_all` before our entry landed.
        if self.generation() != generation {
            self.cache.invalidate(key).await;
        }
    }
}

/// A listing as returned by the API, with its rating summary.
#[derive(Debug, Clone, Serialize)]
pub struct ProductCard {
    #[serde(flatten)]
    pub listing: Listing,
    pub rating: RatingSummary,
}

/// Catalog reads over a store and its cache.
pub struct CatalogService<'a> {
    store: &'a dyn MarketplaceStore,
    cache: &'a CatalogCache,
}

impl<'a> CatalogService<'a> {
    #[must_use]
    pub const fn new(store: &'a dyn MarketplaceStore, cache: &'a CatalogCache) -> Self {
        Self { store, cache }
    }

    /// Every product, newest first.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError` if the store read fails.
    pub async fn products(&self) -> Result<Arc<Vec<Product>>, RepositoryError> {
        if let Some(CacheValue::Products(products)) = self.cache.cache.get(PRODUCTS_KEY).await {
            tracing::debug!("catalog cache hit");
            return Ok(products);
        }

        let generation = self.cache.generation();
        let products = Arc::new(self.store.products().await?);
        self.cache
            .fill(
                generation,
                PRODUCTS_KEY,
                CacheValue::Products(Arc::clone(&products)),
            )
            .await;
        Ok(products)
    }

    /// Rating summaries keyed by product.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError` if the store read fails.
    pub async fn ratings(&self) -> Result<Arc<HashMap<ProductId, RatingSummary>>, RepositoryError> {
        if let Some(CacheValue::Ratings(ratings)) = self.cache.cache.get(RATINGS_KEY).await {
            return Ok(ratings);
        }

        let generation = self.cache.generation();
        let ratings = Arc::new(self.store.rating_summaries().await?);
        self.cache
            .fill(
                generation,
                RATINGS_KEY,
                CacheValue::Ratings(Arc::clone(&ratings)),
            )
            .await;
        Ok(ratings)
    }

    /// Rating summary for one product.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError` if the store read fails.
    pub async fn rating(&self, product_id: ProductId) -> Result<RatingSummary, RepositoryError> {
        Ok(self
            .ratings()
            .await?
            .get(&product_id)
            .copied()
            .unwrap_or_default())
    }

    /// Filter, sort and paginate `listings`, attaching rating summaries.
    async fn page(
        &self,
        listings: Vec<Listing>,
        query: &ListingQuery,
    ) -> Result<Page<ProductCard>, RepositoryError> {
        let ratings = self.ratings().await?;
        Ok(query.apply(listings).map(|listing| ProductCard {
            rating: ratings
                .get(&listing.product.id)
                .copied()
                .unwrap_or_default(),
            listing,
        }))
    }

    /// Public catalog.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError` if a store read fails.
    #[instrument(skip(self, query))]
    pub async fn catalog(&self, query: &ListingQuery) -> Result<Page<ProductCard>, RepositoryError> {
        let listings = self
            .products()
            .await?
            .iter()
            .cloned()
            .map(Listing::direct)
            .collect();
        self.page(listings, query).await
    }

    /// A seller's own products.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError` if a store read fails.
    #[instrument(skip(self, query))]
    pub async fn seller_products(
        &self,
        seller_id: UserId,
        query: &ListingQuery,
    ) -> Result<Page<ProductCard>, RepositoryError> {
        let listings = self
            .products()
            .await?
            .iter()
            .filter(|p| p.seller_id == seller_id)
            .cloned()
            .map(Listing::direct)
            .collect();
        self.page(listings, query).await
    }

    /// Products an affiliate could still claim: not their own and not
    /// already claimed by them.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError` if a store read fails.
    #[instrument(skip(self, query))]
    pub async fn claimable(
        &self,
        affiliate_id: UserId,
        query: &ListingQuery,
    ) -> Result<Page<ProductCard>, RepositoryError> {
        let claimed: HashSet<ProductId> = self
            .store
            .claims_by_affiliate(affiliate_id)
            .await?
            .into_iter()
            .map(|c| c.product_id)
            .collect();
        let listings = self
            .products()
            .await?
            .iter()
            .filter(|p| p.seller_id != affiliate_id && !claimed.contains(&p.id))
            .cloned()
            .map(Listing::direct)
            .collect();
        self.page(listings, query).await
    }

    /// An affiliate's storefront: their claims, priced with the override.
    /// Claims the seller has since priced out of a markup are hidden.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError` if a store read fails.
    #[instrument(skip(self, query))]
    pub async fn storefront(
        &self,
        affiliate_id: UserId,
        query: &ListingQuery,
    ) -> Result<Page<ProductCard>, RepositoryError> {
        let claims = self.store.claims_by_affiliate(affiliate_id).await?;
        let products = self.products().await?;
        let listings = storefront_listings(&products, &claims);
        self.page(listings, query).await
    }

    /// A user's favorite products.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError` if a store read fails.
    #[instrument(skip(self, query))]
    pub async fn favorites(
        &self,
        user_id: UserId,
        query: &ListingQuery,
    ) -> Result<Page<ProductCard>, RepositoryError> {
        let favorites: HashSet<ProductId> = self
            .store
            .favorite_product_ids(user_id)
            .await?
            .into_iter()
            .collect();
        let listings = self
            .products()
            .await?
            .iter()
            .filter(|p| favorites.contains(&p.id))
            .cloned()
            .map(Listing::direct)
            .collect();
        self.page(listings, query).await
    }
}

fn storefront_listings(products: &[Product], claims: &[Claim]) -> Vec<Listing> {
    let by_id: HashMap<ProductId, &Product> = products.iter().map(|p| (p.id, p)).collect();
    claims
        .iter()
        .filter_map(|claim| {
            let product = by_id.get(&claim.product_id)?;
            claim
                .is_marked_up(product)
                .then(|| Listing::claimed((*product).clone(), claim))
        })
        .collect()
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use chrono::Utc;
    use marketplace_core::catalog::ProductDraft;
    use marketplace_core::claim::ClaimDraft;
    use marketplace_core::{ClaimId, Money};

    use crate::db::MemoryStore;

    fn money(s: &str) -> Money {
        Money::new(s.parse().unwrap()).unwrap()
    }

    fn product(seller: UserId, title: &str, price: &str) -> Product {
        let draft = ProductDraft {
            title: title.to_string(),
            description: String::new(),
            category: "Shirts".to_string(),
            regular_price: money(price),
            sale_price: None,
            stock: 5,
            colors: vec![],
            sizes: vec![],
            images: vec![],
        };
        Product::create(
            ProductId::generate(),
            seller,
            draft.validate().unwrap(),
            Utc::now(),
        )
    }

    fn claim(affiliate: UserId, product: &Product, price: &str) -> Claim {
        Claim::create(
            ClaimId::generate(),
            affiliate,
            product,
            ClaimDraft {
                title: Some("Curated tee".to_string()),
                description: None,
                sale_price: money(price),
                regular_price: None,
            },
            Utc::now(),
        )
        .unwrap()
    }

    #[tokio::test]
    async fn test_products_are_cached_until_invalidated() {
        let store = MemoryStore::new();
        let cache = CatalogCache::new(Duration::from_secs(60));
        let catalog = CatalogService::new(&store, &cache);
        let seller = UserId::generate();

        store
            .insert_product(&product(seller, "Tee", "10.00"))
            .await
            .unwrap();
        assert_eq!(catalog.products().await.unwrap().len(), 1);

        store
            .insert_product(&product(seller, "Hoodie", "40.00"))
            .await
            .unwrap();
        assert_eq!(catalog.products().await.unwrap().len(), 1);

        cache.invalidate();
        assert_eq!(catalog.products().await.unwrap().len(), 2);
    }

    #[tokio::test]
    async fn test_fill_racing_an_invalidation_is_dropped() {
        let store = MemoryStore::new();
        let cache = CatalogCache::new(Duration::from_secs(60));
        let catalog = CatalogService::new(&store, &cache);
        let seller = UserId::generate();
        store
            .insert_product(&product(seller, "Tee", "10.00"))
            .await
            .unwrap();

        // A reader takes its snapshot, then a writer lands before it fills.
        let generation = cache.generation();
        let snapshot = Arc::new(store.products().await.unwrap());
        store
            .insert_product(&product(seller, "Hoodie", "40.00"))
            .await
            .unwrap();
        cache.invalidate();
        cache
            .fill(generation, PRODUCTS_KEY, CacheValue::Products(snapshot))
            .await;

        assert!(cache.cache.get(PRODUCTS_KEY).await.is_none());
        assert_eq!(catalog.products().await.unwrap().len(), 2);
    }

    #[tokio::test]
    async fn test_fill_at_current_generation_is_kept() {
        let store = MemoryStore::new();
        let cache = CatalogCache::new(Duration::from_secs(60));
        store
            .insert_product(&product(UserId::generate(), "Tee", "10.00"))
            .await
            .unwrap();

        cache.invalidate();
        let generation = cache.generation();
        let snapshot = Arc::new(store.products().await.unwrap());
        cache
            .fill(generation, PRODUCTS_KEY, CacheValue::Products(snapshot))
            .await;

        assert!(matches!(
            cache.cache.get(PRODUCTS_KEY).await,
            Some(CacheValue::Products(p)) if p.len() == 1
        ));
    }

    #[tokio::test]
    async fn test_claimable_excludes_own_and_claimed() {
        let store = MemoryStore::new();
        let cache = CatalogCache::new(Duration::from_secs(60));
        let catalog = CatalogService::new(&store, &cache);
        let seller = UserId::generate();
        let affiliate = UserId::generate();

        let tee = product(seller, "Tee", "10.00");
        let hoodie = product(seller, "Hoodie", "40.00");
        let own = product(affiliate, "Own", "5.00");
        for p in [&tee, &hoodie, &own] {
            store.insert_product(p).await.unwrap();
        }
        store
            .insert_claim(&claim(affiliate, &tee, "12.00"))
            .await
            .unwrap();

        let page = catalog
            .claimable(affiliate, &ListingQuery::default())
            .await
            .unwrap();
        let ids: Vec<ProductId> = page.items.iter().map(|c| c.listing.product.id).collect();
        assert_eq!(ids, vec![hoodie.id]);
    }

    #[test]
    fn test_storefront_uses_override_and_hides_stale_claims() {
        let seller = UserId::generate();
        let affiliate = UserId::generate();
        let tee = product(seller, "Tee", "10.00");
        let mut hoodie = product(seller, "Hoodie", "40.00");
        let tee_claim = claim(affiliate, &tee, "12.00");
        let hoodie_claim = claim(affiliate, &hoodie, "45.00");
        // Seller raised the price past the affiliate's
        hoodie.sale_price = money("50.00");
        hoodie.regular_price = money("50.00");

        let listings = storefront_listings(&[tee, hoodie], &[tee_claim, hoodie_claim]);
        assert_eq!(listings.len(), 1);
        let first = listings.first().unwrap();
        assert_eq!(first.display_title, "Curated tee");
        assert_eq!(first.display_price, money("12.00"));
    }
}
