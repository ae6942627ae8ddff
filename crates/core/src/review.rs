//! Product reviews.

use chrono::{DateTime, Utc};
use rust_decimal::{Decimal, RoundingStrategy};
use serde::{Deserialize, Serialize};

use crate::types::{ProductId, ReviewId, UserId};

/// Maximum comment length, in characters.
pub const MAX_COMMENT_LEN: usize = 2000;

/// Reasons a review is rejected.
#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum ReviewError {
    #[error("rating must be between 1 and 5")]
    RatingOutOfRange,
    #[error("comment must be at most {MAX_COMMENT_LEN} characters")]
    CommentTooLong,
}

/// A star rating, 1 through 5.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "u8", into = "u8")]
pub struct Rating(u8);

impl Rating {
    /// # Errors
    ///
    /// Returns [`ReviewError::RatingOutOfRange`] outside `1..=5`.
    pub const fn new(stars: u8) -> Result<Self, ReviewError> {
        if matches!(stars, 1..=5) {
            Ok(Self(stars))
        } else {
            Err(ReviewError::RatingOutOfRange)
        }
    }

    #[must_use]
    pub const fn stars(self) -> u8 {
        self.0
    }
}

impl TryFrom<u8> for Rating {
    type Error = ReviewError;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl From<Rating> for u8 {
    fn from(rating: Rating) -> Self {
        rating.0
    }
}

/// A submitted review, before validation.
#[derive(Debug, Clone, Deserialize)]
pub struct ReviewDraft {
    pub rating: u8,
    #[serde(default)]
    pub comment: String,
}

/// A customer's review of a product.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Review {
    pub id: ReviewId,
    pub product_id: ProductId,
    pub author_id: UserId,
    /// Display name of the author at the time of writing.
    pub author_name: String,
    pub rating: Rating,
    pub comment: String,
    pub created_at: DateTime<Utc>,
}

impl Review {
    /// Validate a draft and build the review.
    ///
    /// # Errors
    ///
    /// Returns a [`ReviewError`] for an out-of-range rating or an overlong
    /// comment.
    pub fn create(
        id: ReviewId,
        product_id: ProductId,
        author_id: UserId,
        author_name: String,
        draft: ReviewDraft,
        now: DateTime<Utc>,
    ) -> Result<Self, ReviewError> {
        let rating = Rating::new(draft.rating)?;
        let comment = draft.comment.trim().to_owned();
        if comment.chars().count() > MAX_COMMENT_LEN {
            return Err(ReviewError::CommentTooLong);
        }
        Ok(Self {
            id,
            product_id,
            author_id,
            author_name,
            rating,
            comment,
            created_at: now,
        })
    }
}

/// Review count and average for one product.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct RatingSummary {
    pub count: u32,
    /// Mean rating rounded to one decimal; `None` without reviews.
    pub average: Option<Decimal>,
}

impl RatingSummary {
    /// Build a summary from raw totals, as returned by an aggregate query.
    #[must_use]
    pub fn from_totals(count: u32, star_sum: u64) -> Self {
        if count == 0 {
            return Self::default();
        }
        let average = (Decimal::from(star_sum) / Decimal::from(count))
            .round_dp_with_strategy(1, RoundingStrategy::MidpointAwayFromZero);
        Self {
            count,
            average: Some(average),
        }
    }
}

/// Summarize a set of ratings.
#[must_use]
pub fn summarize<'a>(ratings: impl IntoIterator<Item = &'a Rating>) -> RatingSummary {
    let (count, sum) = ratings
        .into_iter()
        .fold((0_u32, 0_u64), |(n, s), r| (n + 1, s + u64::from(r.stars())));
    RatingSummary::from_totals(count, sum)
}
