//! Product listings: filter, sort, paginate.
//!
//! Every product view in the marketplace (the public catalog, a seller's own
//! products, an affiliate's claimable products, a storefront, favorites) is
//! the same pipeline over an in-memory list:
//!
//! 1. text match on title or category (case-insensitive substring)
//! 2. facet filters: category, color, size, price bracket, in-stock
//! 3. sort: price ascending/descending, newest, or relevance (units sold)
//! 4. slice into a page window
//!
//! All active predicates are combined conjunctively, so a result set is
//! always a subset of its input.

use std::cmp::Ordering;
use std::collections::BTreeMap;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Deserializer, Serialize};

use crate::catalog::{Product, fold_label, same_label};
use crate::claim::{AffiliateInfo, Claim};
use crate::types::Money;

/// Page size used when the client does not ask for one.
pub const DEFAULT_PER_PAGE: u32 = 12;
/// Largest page size a client may request.
pub const MAX_PER_PAGE: u32 = 100;

/// A product as shown to a buyer, optionally through an affiliate claim.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Listing {
    #[serde(flatten)]
    pub product: Product,
    /// Present when the product is listed through an affiliate storefront.
    pub affiliate_info: Option<AffiliateInfo>,
    /// Title the buyer sees.
    pub display_title: String,
    /// Price the buyer pays.
    pub display_price: Money,
}

impl Listing {
    /// List a product under its seller's own terms.
    #[must_use]
    pub fn direct(product: Product) -> Self {
        Self {
            display_title: product.title.clone(),
            display_price: product.sale_price,
            product,
            affiliate_info: None,
        }
    }

    /// List a product through an affiliate claim.
    #[must_use]
    pub fn claimed(product: Product, claim: &Claim) -> Self {
        Self {
            display_title: claim
                .title
                .clone()
                .unwrap_or_else(|| product.title.clone()),
            display_price: claim.sale_price,
            affiliate_info: Some(AffiliateInfo::from(claim)),
            product,
        }
    }

    /// When this listing appeared: claim time for storefronts, product
    /// creation time otherwise.
    #[must_use]
    pub fn listed_at(&self) -> DateTime<Utc> {
        self.affiliate_info
            .as_ref()
            .map_or(self.product.created_at, |info| info.created_at)
    }
}

/// Errors parsing listing parameters.
#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum QueryError {
    #[error("invalid price range '{0}', expected 'min-max' or 'min+'")]
    BadPriceBracket(String),
}

/// A price range facet. `min` is inclusive, `max` exclusive.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PriceBracket {
    pub min: Money,
    pub max: Option<Money>,
}

impl PriceBracket {
    #[must_use]
    pub fn contains(&self, price: Money) -> bool {
        price >= self.min && self.max.is_none_or(|max| price < max)
    }
}

impl FromStr for PriceBracket {
    type Err = QueryError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let bad = || QueryError::BadPriceBracket(s.to_owned());
        let parse = |part: &str| -> Result<Money, QueryError> {
            let amount: Decimal = part.trim().parse().map_err(|_| bad())?;
            Money::new(amount).map_err(|_| bad())
        };

        let s = s.trim();
        if let Some(min) = s.strip_suffix('+') {
            return Ok(Self {
                min: parse(min)?,
                max: None,
            });
        }
        let (min, max) = s.split_once('-').ok_or_else(bad)?;
        let (min, max) = (parse(min)?, parse(max)?);
        if max <= min {
            return Err(bad());
        }
        Ok(Self {
            min,
            max: Some(max),
        })
    }
}

/// Sort orders offered to clients.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SortOrder {
    PriceAsc,
    PriceDesc,
    Newest,
    /// Best sellers first.
    #[default]
    Relevance,
}

impl SortOrder {
    fn compare(self, a: &Listing, b: &Listing) -> Ordering {
        let newest = || b.listed_at().cmp(&a.listed_at());
        let primary = match self {
            Self::PriceAsc => a.display_price.cmp(&b.display_price),
            Self::PriceDesc => b.display_price.cmp(&a.display_price),
            Self::Newest => Ordering::Equal,
            Self::Relevance => b.product.sales.cmp(&a.product.sales),
        };
        primary
            .then_with(newest)
            .then_with(|| a.product.id.cmp(&b.product.id))
    }
}

/// Listing parameters, usually read from a query string.
///
/// Blank string parameters (`?color=`) are treated as absent.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct ListingQuery {
    #[serde(deserialize_with = "blank_as_none")]
    pub q: Option<String>,
    #[serde(deserialize_with = "blank_as_none")]
    pub category: Option<String>,
    #[serde(deserialize_with = "blank_as_none")]
    pub color: Option<String>,
    #[serde(deserialize_with = "blank_as_none")]
    pub size: Option<String>,
    #[serde(deserialize_with = "price_bracket")]
    pub price: Option<PriceBracket>,
    pub in_stock: bool,
    pub sort: SortOrder,
    pub page: Option<u32>,
    pub per_page: Option<u32>,
}

fn blank_as_none<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    let s: Option<String> = Option::deserialize(deserializer)?;
    Ok(s.map(|s| s.trim().to_owned()).filter(|s| !s.is_empty()))
}

fn price_bracket<'de, D>(deserializer: D) -> Result<Option<PriceBracket>, D::Error>
where
    D: Deserializer<'de>,
{
    match blank_as_none(deserializer)? {
        None => Ok(None),
        Some(s) => s.parse().map(Some).map_err(serde::de::Error::custom),
    }
}

impl ListingQuery {
    /// Whether a listing satisfies every active predicate.
    #[must_use]
    pub fn matches(&self, listing: &Listing) -> bool {
        let product = &listing.product;

        if let Some(q) = &self.q {
            let needle = fold_label(q);
            let hit = fold_label(&listing.display_title).contains(&needle)
                || fold_label(&product.category).contains(&needle);
            if !hit {
                return false;
            }
        }
        if let Some(category) = &self.category
            && !same_label(&product.category, category)
        {
            return false;
        }
        if let Some(color) = &self.color
            && product.color(color).is_none()
        {
            return false;
        }
        if let Some(size) = &self.size
            && product.size(size).is_none()
        {
            return false;
        }
        if let Some(bracket) = &self.price
            && !bracket.contains(listing.display_price)
        {
            return false;
        }
        if self.in_stock && !product.in_stock() {
            return false;
        }
        true
    }

    /// Run the whole pipeline and return one page with facets.
    #[must_use]
    pub fn apply(&self, listings: Vec<Listing>) -> Page<Listing> {
        let facets = Facets::collect(&listings);
        let mut matched: Vec<Listing> = listings
            .into_iter()
            .filter(|listing| self.matches(listing))
            .collect();
        matched.sort_by(|a, b| self.sort.compare(a, b));

        Page::paginate(
            matched,
            self.page.unwrap_or(1),
            self.per_page.unwrap_or(DEFAULT_PER_PAGE),
        )
        .with_facets(facets)
    }
}

/// Filter values present in an unfiltered listing set.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct Facets {
    pub categories: Vec<String>,
    pub colors: Vec<String>,
    pub sizes: Vec<String>,
}

impl Facets {
    /// Collect distinct categories, colors and sizes, ignoring case.
    #[must_use]
    pub fn collect(listings: &[Listing]) -> Self {
        let mut categories = BTreeMap::new();
        let mut colors = BTreeMap::new();
        let mut sizes = BTreeMap::new();
        for listing in listings {
            let p = &listing.product;
            categories
                .entry(fold_label(&p.category))
                .or_insert_with(|| p.category.clone());
            for color in &p.colors {
                colors
                    .entry(fold_label(color))
                    .or_insert_with(|| color.clone());
            }
            for size in &p.sizes {
                sizes
                    .entry(fold_label(size))
                    .or_insert_with(|| size.clone());
            }
        }
        Self {
            categories: categories.into_values().collect(),
            colors: colors.into_values().collect(),
            sizes: sizes.into_values().collect(),
        }
    }
}

/// One page of results.
#[derive(Debug, Clone, Serialize)]
pub struct Page<T> {
    pub items: Vec<T>,
    /// 1-based page number, always within `1..=total_pages`.
    pub page: u32,
    pub per_page: u32,
    pub total_items: u64,
    /// Never zero: an empty result has one empty page.
    pub total_pages: u32,
    pub has_next: bool,
    pub has_prev: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub facets: Option<Facets>,
}

impl<T> Page<T> {
    /// Slice `items` into the requested window.
    ///
    /// `per_page` is clamped to `1..=MAX_PER_PAGE` and `page` to
    /// `1..=total_pages`, so out-of-range requests land on the nearest
    /// valid page rather than returning an error.
    #[must_use]
    pub fn paginate(items: Vec<T>, page: u32, per_page: u32) -> Self {
        let per_page = per_page.clamp(1, MAX_PER_PAGE);
        let per_page_usize = per_page as usize;
        let total = items.len();
        let total_pages = u32::try_from(total.div_ceil(per_page_usize).max(1)).unwrap_or(u32::MAX);
        let page = page.clamp(1, total_pages);
        let start = (page as usize - 1).saturating_mul(per_page_usize);

        let items = items
            .into_iter()
            .skip(start)
            .take(per_page_usize)
            .collect();

        Self {
            items,
            page,
            per_page,
            total_items: total as u64,
            total_pages,
            has_next: page < total_pages,
            has_prev: page > 1,
            facets: None,
        }
    }

    #[must_use]
    pub fn with_facets(mut self, facets: Facets) -> Self {
        self.facets = Some(facets);
        self
    }

    /// Transform the items, keeping the window.
    #[must_use]
    pub fn map<U>(self, f: impl FnMut(T) -> U) -> Page<U> {
        Page {
            items: self.items.into_iter().map(f).collect(),
            page: self.page,
            per_page: self.per_page,
            total_items: self.total_items,
            total_pages: self.total_pages,
            has_next: self.has_next,
            has_prev: self.has_prev,
            facets: self.facets,
        }
    }
}
