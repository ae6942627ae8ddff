//! Affiliate claims.
//!
//! An affiliate "claims" a seller's product by recording an override: their
//! own title, description and prices for the same underlying item. The one
//! hard rule is the markup rule: the affiliate's sale price must be strictly
//! greater than the product's own sale price. Matching or undercutting the
//! seller is rejected.
//!
//! A claim is unique per (affiliate, product); the store enforces that, this
//! module only validates the override itself.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::catalog::{MAX_DESCRIPTION_LEN, MAX_TITLE_LEN, Product};
use crate::types::{ClaimId, Money, ProductId, UserId};

/// Reasons a claim is rejected.
#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum ClaimError {
    /// The affiliate price does not mark the product up.
    #[error("affiliate sale price {proposed} must be greater than the original sale price {original}")]
    NoMarkup { original: Money, proposed: Money },
    /// The affiliate regular price is below the affiliate sale price.
    #[error("regular price {regular} cannot be below sale price {sale}")]
    RegularBelowSale { sale: Money, regular: Money },
    /// Affiliates cannot claim their own products.
    #[error("you cannot claim your own product")]
    OwnProduct,
    #[error("title must be at most {MAX_TITLE_LEN} characters")]
    TitleTooLong,
    #[error("description must be at most {MAX_DESCRIPTION_LEN} characters")]
    DescriptionTooLong,
}

/// Check the markup rule on its own.
///
/// # Errors
///
/// Returns [`ClaimError::NoMarkup`] when `proposed <= original`.
pub fn check_markup(original: Money, proposed: Money) -> Result<(), ClaimError> {
    if proposed <= original {
        return Err(ClaimError::NoMarkup { original, proposed });
    }
    Ok(())
}

/// An affiliate's override of a seller product.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Claim {
    pub id: ClaimId,
    pub affiliate_id: UserId,
    pub product_id: ProductId,
    /// Override title; `None` shows the product's own title.
    pub title: Option<String>,
    /// Override description; `None` shows the product's own description.
    pub description: Option<String>,
    pub sale_price: Money,
    pub regular_price: Money,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Affiliate-submitted override fields.
#[derive(Debug, Clone, Deserialize)]
pub struct ClaimDraft {
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
    pub sale_price: Money,
    /// Defaults to the larger of the product's regular price and `sale_price`.
    #[serde(default)]
    pub regular_price: Option<Money>,
}

struct Override {
    title: Option<String>,
    description: Option<String>,
    sale_price: Money,
    regular_price: Money,
}

impl ClaimDraft {
    fn resolve(self, product: &Product) -> Result<Override, ClaimError> {
        check_markup(product.sale_price, self.sale_price)?;

        let title = non_blank(self.title);
        if title
            .as_ref()
            .is_some_and(|t| t.chars().count() > MAX_TITLE_LEN)
        {
            return Err(ClaimError::TitleTooLong);
        }
        let description = non_blank(self.description);
        if description
            .as_ref()
            .is_some_and(|d| d.chars().count() > MAX_DESCRIPTION_LEN)
        {
            return Err(ClaimError::DescriptionTooLong);
        }

        let regular_price = match self.regular_price {
            Some(regular) if regular < self.sale_price => {
                return Err(ClaimError::RegularBelowSale {
                    sale: self.sale_price,
                    regular,
                });
            }
            Some(regular) => regular,
            None => product.regular_price.max(self.sale_price),
        };

        Ok(Override {
            title,
            description,
            sale_price: self.sale_price,
            regular_price,
        })
    }
}

fn non_blank(value: Option<String>) -> Option<String> {
    value
        .map(|v| v.trim().to_owned())
        .filter(|v| !v.is_empty())
}

impl Claim {
    /// Validate a draft against the product and build a new claim.
    ///
    /// # Errors
    ///
    /// Returns a [`ClaimError`] if the affiliate owns the product or the
    /// override breaks the markup or text rules.
    pub fn create(
        id: ClaimId,
        affiliate_id: UserId,
        product: &Product,
        draft: ClaimDraft,
        now: DateTime<Utc>,
    ) -> Result<Self, ClaimError> {
        if product.seller_id == affiliate_id {
            return Err(ClaimError::OwnProduct);
        }
        let o = draft.resolve(product)?;
        Ok(Self {
            id,
            affiliate_id,
            product_id: product.id,
            title: o.title,
            description: o.description,
            sale_price: o.sale_price,
            regular_price: o.regular_price,
            created_at: now,
            updated_at: now,
        })
    }

    /// Re-apply a draft. The markup rule is checked against the product's
    /// current sale price, not the one at claim time.
    ///
    /// # Errors
    ///
    /// Returns a [`ClaimError`] if the new override is invalid; the claim
    /// is left untouched in that case.
    pub fn revise(
        &mut self,
        product: &Product,
        draft: ClaimDraft,
        now: DateTime<Utc>,
    ) -> Result<(), ClaimError> {
        let o = draft.resolve(product)?;
        self.title = o.title;
        self.description = o.description;
        self.sale_price = o.sale_price;
        self.regular_price = o.regular_price;
        self.updated_at = now;
        Ok(())
    }

    /// Whether the claim still marks up the product. A seller may raise
    /// their price after a claim was made; such claims stop being sellable.
    #[must_use]
    pub fn is_marked_up(&self, product: &Product) -> bool {
        check_markup(product.sale_price, self.sale_price).is_ok()
    }

    /// Affiliate earnings per unit sold through this claim.
    #[must_use]
    pub fn commission_per_unit(&self, product: &Product) -> Money {
        self.sale_price
            .checked_sub(product.sale_price)
            .unwrap_or(Money::ZERO)
    }
}

/// Override fields nested under a product when it is viewed through an
/// affiliate storefront.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AffiliateInfo {
    pub claim_id: ClaimId,
    pub affiliate_id: UserId,
    pub title: Option<String>,
    pub description: Option<String>,
    pub sale_price: Money,
    pub regular_price: Money,
    pub created_at: DateTime<Utc>,
}

impl From<&Claim> for AffiliateInfo {
    fn from(claim: &Claim) -> Self {
        Self {
            claim_id: claim.id,
            affiliate_id: claim.affiliate_id,
            title: claim.title.clone(),
            description: claim.description.clone(),
            sale_price: claim.sale_price,
            regular_price: claim.regular_price,
            created_at: claim.created_at,
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::catalog::tests::{draft, money};

    fn product(price: &str) -> Product {
        Product::create(
            ProductId::generate(),
            UserId::generate(),
            draft("Runner", price).validate().unwrap(),
            Utc::now(),
        )
    }

    fn claim_draft(sale: &str) -> ClaimDraft {
        ClaimDraft {
            title: None,
            description: None,
            sale_price: money(sale),
            regular_price: None,
        }
    }

    #[test]
    fn test_markup_rule_boundaries() {
        assert!(check_markup(money("10"), money("10.01")).is_ok());
        assert!(check_markup(money("10"), money("10")).is_err());
        assert!(check_markup(money("10"), money("9.99")).is_err());
    }

    #[test]
    fn test_markup_rule_holds_across_a_price_grid() {
        for original_cents in (1..2000).step_by(37) {
            for proposed_cents in (0..2100).step_by(41) {
                let original = Money::from_cents(original_cents).unwrap();
                let proposed = Money::from_cents(proposed_cents).unwrap();
                assert_eq!(
                    check_markup(original, proposed).is_ok(),
                    proposed_cents > original_cents
                );
            }
        }
    }

    #[test]
    fn test_equal_price_claim_rejected() {
        let p = product("25");
        let err = Claim::create(
            ClaimId::generate(),
            UserId::generate(),
            &p,
            claim_draft("25"),
            Utc::now(),
        )
        .unwrap_err();
        assert_eq!(
            err,
            ClaimError::NoMarkup {
                original: money("25"),
                proposed: money("25")
            }
        );
    }

    #[test]
    fn test_own_product_rejected() {
        let p = product("25");
        let err = Claim::create(
            ClaimId::generate(),
            p.seller_id,
            &p,
            claim_draft("30"),
            Utc::now(),
        )
        .unwrap_err();
        assert_eq!(err, ClaimError::OwnProduct);
    }

    #[test]
    fn test_regular_price_defaults_and_commission() {
        let p = product("25");
        let claim = Claim::create(
            ClaimId::generate(),
            UserId::generate(),
            &p,
            claim_draft("40"),
            Utc::now(),
        )
        .unwrap();
        // Product regular is 25, so the affiliate regular follows the sale price.
        assert_eq!(claim.regular_price, money("40"));
        assert_eq!(claim.commission_per_unit(&p), money("15"));
    }

    #[test]
    fn test_regular_below_sale_rejected() {
        let p = product("25");
        let mut d = claim_draft("40");
        d.regular_price = Some(money("35"));
        assert!(matches!(
            Claim::create(ClaimId::generate(), UserId::generate(), &p, d, Utc::now()),
            Err(ClaimError::RegularBelowSale { .. })
        ));
    }

    #[test]
    fn test_blank_overrides_fall_back() {
        let p = product("25");
        let mut d = claim_draft("30");
        d.title = Some("   ".into());
        d.description = Some(" Great pick ".into());
        let claim =
            Claim::create(ClaimId::generate(), UserId::generate(), &p, d, Utc::now()).unwrap();
        assert_eq!(claim.title, None);
        assert_eq!(claim.description.as_deref(), Some("Great pick"));
    }

    #[test]
    fn test_revise_checks_current_price_and_is_atomic() {
        let mut p = product("25");
        let mut claim = Claim::create(
            ClaimId::generate(),
            UserId::generate(),
            &p,
            claim_draft("30"),
            Utc::now(),
        )
        .unwrap();

        p.sale_price = money("28");
        p.regular_price = money("28");
        assert!(claim.revise(&p, claim_draft("27"), Utc::now()).is_err());
        assert_eq!(claim.sale_price, money("30"));

        p.sale_price = money("35");
        assert!(!claim.is_marked_up(&p));
        assert_eq!(claim.commission_per_unit(&p), Money::ZERO);
    }
}
