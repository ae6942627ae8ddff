//! Seller products.
//!
//! A [`Product`] is the base listing owned by a seller. Sellers submit a
//! [`ProductDraft`]; the draft is validated and normalized before it becomes
//! (or updates) a product.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::types::{Money, ProductId, UserId};

/// Maximum title length, in characters.
pub const MAX_TITLE_LEN: usize = 200;
/// Maximum description length, in characters.
pub const MAX_DESCRIPTION_LEN: usize = 5000;
/// Maximum category length, in characters.
pub const MAX_CATEGORY_LEN: usize = 60;
/// Maximum length of a single color or size label.
pub const MAX_VARIANT_LEN: usize = 40;
/// Maximum number of colors or sizes on one product.
pub const MAX_VARIANTS: usize = 30;
/// Maximum number of images on one product.
pub const MAX_IMAGES: usize = 10;

/// Reasons a product draft is rejected.
#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum ProductError {
    #[error("title is required")]
    MissingTitle,
    #[error("title must be at most {MAX_TITLE_LEN} characters")]
    TitleTooLong,
    #[error("description must be at most {MAX_DESCRIPTION_LEN} characters")]
    DescriptionTooLong,
    #[error("category is required")]
    MissingCategory,
    #[error("category must be at most {MAX_CATEGORY_LEN} characters")]
    CategoryTooLong,
    #[error("price must be greater than zero")]
    ZeroPrice,
    #[error("sale price {sale} cannot exceed regular price {regular}")]
    SaleAboveRegular { sale: Money, regular: Money },
    #[error("{kind} label '{label}' is invalid")]
    BadVariant { kind: &'static str, label: String },
    #[error("at most {MAX_VARIANTS} {kind} are allowed")]
    TooManyVariants { kind: &'static str },
    #[error("at most {MAX_IMAGES} images are allowed")]
    TooManyImages,
    #[error("image url '{0}' must be an http(s) url")]
    BadImageUrl(String),
}

/// A product listed by a seller.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Product {
    pub id: ProductId,
    pub seller_id: UserId,
    pub title: String,
    pub description: String,
    pub category: String,
    pub regular_price: Money,
    pub sale_price: Money,
    pub stock: u32,
    pub colors: Vec<String>,
    pub sizes: Vec<String>,
    pub images: Vec<String>,
    /// Units sold across all orders. Drives "relevance" sorting.
    pub sales: u32,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Seller-submitted product fields, before validation.
#[derive(Debug, Clone, Deserialize)]
pub struct ProductDraft {
    pub title: String,
    #[serde(default)]
    pub description: String,
    pub category: String,
    pub regular_price: Money,
    /// Defaults to the regular price.
    #[serde(default)]
    pub sale_price: Option<Money>,
    #[serde(default)]
    pub stock: u32,
    #[serde(default)]
    pub colors: Vec<String>,
    #[serde(default)]
    pub sizes: Vec<String>,
    #[serde(default)]
    pub images: Vec<String>,
}

/// A draft that passed validation, with whitespace trimmed and variants
/// de-duplicated.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidDraft {
    pub title: String,
    pub description: String,
    pub category: String,
    pub regular_price: Money,
    pub sale_price: Money,
    pub stock: u32,
    pub colors: Vec<String>,
    pub sizes: Vec<String>,
    pub images: Vec<String>,
}

impl ProductDraft {
    /// Validate and normalize the draft.
    ///
    /// # Errors
    ///
    /// Returns the first [`ProductError`] the draft violates.
    pub fn validate(self) -> Result<ValidDraft, ProductError> {
        let title = self.title.trim().to_owned();
        if title.is_empty() {
            return Err(ProductError::MissingTitle);
        }
        if title.chars().count() > MAX_TITLE_LEN {
            return Err(ProductError::TitleTooLong);
        }

        let description = self.description.trim().to_owned();
        if description.chars().count() > MAX_DESCRIPTION_LEN {
            return Err(ProductError::DescriptionTooLong);
        }

        let category = self.category.trim().to_owned();
        if category.is_empty() {
            return Err(ProductError::MissingCategory);
        }
        if category.chars().count() > MAX_CATEGORY_LEN {
            return Err(ProductError::CategoryTooLong);
        }

        let regular_price = self.regular_price;
        let sale_price = self.sale_price.unwrap_or(regular_price);
        if regular_price.is_zero() || sale_price.is_zero() {
            return Err(ProductError::ZeroPrice);
        }
        if sale_price > regular_price {
            return Err(ProductError::SaleAboveRegular {
                sale: sale_price,
                regular: regular_price,
            });
        }

        let colors = normalize_variants(self.colors, "colors")?;
        let sizes = normalize_variants(self.sizes, "sizes")?;

        if self.images.len() > MAX_IMAGES {
            return Err(ProductError::TooManyImages);
        }
        let images = self
            .images
            .into_iter()
            .map(|url| {
                let url = url.trim().to_owned();
                if url.starts_with("https://") || url.starts_with("http://") {
                    Ok(url)
                } else {
                    Err(ProductError::BadImageUrl(url))
                }
            })
            .collect::<Result<Vec<_>, _>>()?;

        Ok(ValidDraft {
            title,
            description,
            category,
            regular_price,
            sale_price,
            stock: self.stock,
            colors,
            sizes,
            images,
        })
    }
}

/// Trim labels and drop case-insensitive duplicates, keeping first spelling.
fn normalize_variants(
    labels: Vec<String>,
    kind: &'static str,
) -> Result<Vec<String>, ProductError> {
    let mut out: Vec<String> = Vec::with_capacity(labels.len());
    for label in labels {
        let label = label.trim().to_owned();
        if label.is_empty() || label.chars().count() > MAX_VARIANT_LEN {
            return Err(ProductError::BadVariant { kind, label });
        }
        if !out.iter().any(|seen| same_label(seen, &label)) {
            out.push(label);
        }
    }
    if out.len() > MAX_VARIANTS {
        return Err(ProductError::TooManyVariants { kind });
    }
    Ok(out)
}

impl Product {
    /// Build a new product from a validated draft.
    #[must_use]
    pub fn create(id: ProductId, seller_id: UserId, draft: ValidDraft, now: DateTime<Utc>) -> Self {
        Self {
            id,
            seller_id,
            title: draft.title,
            description: draft.description,
            category: draft.category,
            regular_price: draft.regular_price,
            sale_price: draft.sale_price,
            stock: draft.stock,
            colors: draft.colors,
            sizes: draft.sizes,
            images: draft.images,
            sales: 0,
            created_at: now,
            updated_at: now,
        }
    }

    /// Replace the editable fields. Ownership, sales and creation time stay.
    pub fn revise(&mut self, draft: ValidDraft, now: DateTime<Utc>) {
        self.title = draft.title;
        self.description = draft.description;
        self.category = draft.category;
        self.regular_price = draft.regular_price;
        self.sale_price = draft.sale_price;
        self.stock = draft.stock;
        self.colors = draft.colors;
        self.sizes = draft.sizes;
        self.images = draft.images;
        self.updated_at = now;
    }

    #[must_use]
    pub const fn in_stock(&self) -> bool {
        self.stock > 0
    }

    /// Find the product's own spelling of a color, ignoring case.
    #[must_use]
    pub fn color(&self, wanted: &str) -> Option<&str> {
        find_label(&self.colors, wanted)
    }

    /// Find the product's own spelling of a size, ignoring case.
    #[must_use]
    pub fn size(&self, wanted: &str) -> Option<&str> {
        find_label(&self.sizes, wanted)
    }
}

/// Case-folded form of a label. Every case-insensitive comparison of
/// categories, colors and sizes goes through here.
#[must_use]
pub fn fold_label(label: &str) -> String {
    label.chars().flat_map(char::to_lowercase).collect()
}

/// Whether two labels are equal ignoring case.
#[must_use]
pub fn same_label(a: &str, b: &str) -> bool {
    a.chars()
        .flat_map(char::to_lowercase)
        .eq(b.chars().flat_map(char::to_lowercase))
}

pub(crate) fn find_label<'a>(labels: &'a [String], wanted: &str) -> Option<&'a str> {
    let wanted = wanted.trim();
    labels
        .iter()
        .find(|label| same_label(label, wanted))
        .map(String::as_str)
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
pub(crate) mod tests {
    use super::*;

    pub(crate) fn money(s: &str) -> Money {
        Money::new(s.parse().unwrap()).unwrap()
    }

    pub(crate) fn draft(title: &str, price: &str) -> ProductDraft {
        ProductDraft {
            title: title.to_owned(),
            description: String::new(),
            category: "Shoes".to_owned(),
            regular_price: money(price),
            sale_price: None,
            stock: 5,
            colors: vec![],
            sizes: vec![],
            images: vec![],
        }
    }

    #[test]
    fn test_sale_defaults_to_regular() {
        let valid = draft("Runner", "80").validate().unwrap();
        assert_eq!(valid.sale_price, money("80"));
    }

    #[test]
    fn test_sale_above_regular_rejected() {
        let mut d = draft("Runner", "80");
        d.sale_price = Some(money("90"));
        assert!(matches!(
            d.validate(),
            Err(ProductError::SaleAboveRegular { .. })
        ));
    }

    #[test]
    fn test_blank_title_and_category_rejected() {
        assert_eq!(
            draft("   ", "10").validate(),
            Err(ProductError::MissingTitle)
        );
        let mut d = draft("Runner", "10");
        d.category = " ".to_owned();
        assert_eq!(d.validate(), Err(ProductError::MissingCategory));
    }

    #[test]
    fn test_zero_price_rejected() {
        assert_eq!(draft("Runner", "0").validate(), Err(ProductError::ZeroPrice));
    }

    #[test]
    fn test_variants_trimmed_and_deduplicated() {
        let mut d = draft("Runner", "10");
        d.colors = vec![" Red".into(), "red".into(), "Blue ".into()];
        let valid = d.validate().unwrap();
        assert_eq!(valid.colors, vec!["Red".to_owned(), "Blue".to_owned()]);
    }

    #[test]
    fn test_image_urls_must_be_http() {
        let mut d = draft("Runner", "10");
        d.images = vec!["javascript:alert(1)".into()];
        assert!(matches!(d.validate(), Err(ProductError::BadImageUrl(_))));
    }

    #[test]
    fn test_revise_keeps_sales_and_owner() {
        let now = Utc::now();
        let seller = UserId::generate();
        let mut product = Product::create(
            ProductId::generate(),
            seller,
            draft("Runner", "10").validate().unwrap(),
            now,
        );
        product.sales = 7;
        product.revise(draft("Trail Runner", "12").validate().unwrap(), now);
        assert_eq!(product.title, "Trail Runner");
        assert_eq!(product.sales, 7);
        assert_eq!(product.seller_id, seller);
    }

    #[test]
    fn test_variant_lookup_ignores_case() {
        let mut d = draft("Runner", "10");
        d.sizes = vec!["XL".into()];
        let product = Product::create(
            ProductId::generate(),
            UserId::generate(),
            d.validate().unwrap(),
            Utc::now(),
        );
        assert_eq!(product.size("xl"), Some("XL"));
        assert_eq!(product.size("m"), None);
    }

    #[test]
    fn test_non_ascii_labels_fold_like_ascii() {
        let mut d = draft("Runner", "10");
        d.colors = vec!["Écru".into(), "écru".into(), "ÉCRU ".into()];
        let product = Product::create(
            ProductId::generate(),
            UserId::generate(),
            d.validate().unwrap(),
            Utc::now(),
        );
        assert_eq!(product.colors, vec!["Écru".to_owned()]);
        assert_eq!(product.color("écru"), Some("Écru"));
        assert_eq!(fold_label("ÉCRU"), "écru");
        assert!(same_label("ÉCRU", " écru".trim()));
    }
}
