use crate::domain::coupon::{Coupon, CouponDraft, DiscountType};
use crate::domain::money::Money;
use crate::error::Result;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::Deserialize;
use std::io::Read;

/// One row of a coupon seed file.
///
/// ```text
/// code, discount_type, discount_value, min_amount, max_discount, valid_from, valid_until, max_uses, active, description
/// PROMO10, PERCENTAGE, 10, , 10.00, 2025-01-01T00:00:00Z, , 100, true, Ten percent off
/// ```
#[derive(Debug, Deserialize)]
struct CouponRow {
    code: String,
    discount_type: DiscountType,
    discount_value: Decimal,
    #[serde(default)]
    min_amount: Option<Money>,
    #[serde(default)]
    max_discount: Option<Money>,
    #[serde(default)]
    valid_from: Option<DateTime<Utc>>,
    #[serde(default)]
    valid_until: Option<DateTime<Utc>>,
    #[serde(default)]
    max_uses: Option<u32>,
    #[serde(default)]
    active: Option<bool>,
    #[serde(default)]
    description: Option<String>,
}

impl From<CouponRow> for CouponDraft {
    fn from(row: CouponRow) -> Self {
        Self {
            code: row.code,
            description: row.description,
            discount_type: row.discount_type,
            discount_value: row.discount_value,
            min_amount: row.min_amount,
            max_discount: row.max_discount,
            valid_from: row.valid_from,
            valid_until: row.valid_until,
            max_uses: row.max_uses,
            is_active: row.active.unwrap_or(true),
        }
    }
}

/// Reads coupon definitions from a CSV source.
///
/// Rows go through the same definition rules as operator-created coupons.
/// Empty cells count as absent optional columns.
pub struct CouponReader<R: Read> {
    reader: csv::Reader<R>,
    now: DateTime<Utc>,
}

impl<R: Read> CouponReader<R> {
    /// `now` becomes the start of validity for rows without `valid_from`.
    pub fn new(source: R, now: DateTime<Utc>) -> Self {
        let reader = csv::ReaderBuilder::new()
            .trim(csv::Trim::All)
            .flexible(true)
            .from_reader(source);
        Self { reader, now }
    }

    pub fn coupons(self) -> impl Iterator<Item = Result<Coupon>> {
        let now = self.now;
        self.reader
            .into_deserialize::<CouponRow>()
            .map(move |row| Coupon::from_draft(row?.into(), now))
    }
}
