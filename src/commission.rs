//! Brokerage commission rules for sale and rent transactions.
//!
//! All amounts are in Toman. The functions are pure and never round; the
//! CLI rounds to whole Toman at display time only.

/// Statutory tier boundary for sale commissions.
const TIER_THRESHOLD: f64 = 700_000_000.0;
const LOW_TIER_RATE: f64 = 0.005;
const HIGH_TIER_RATE: f64 = 0.0025;
const VAT_RATE: f64 = 0.1;
const DEPOSIT_RATE: f64 = 0.01;
const RENT_DIVISOR: f64 = 4.0;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SaleCommission {
    pub base: f64,
    /// Always `base * 0.1`. Included in `total` only for the statutory
    /// tiered rate; with a negotiated rate it is reported but not charged.
    pub tax: f64,
    pub total: f64,
    pub buyer_share: f64,
    pub seller_share: f64,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RentCommission {
    pub base: f64,
    pub tax: f64,
    pub total: f64,
    pub owner_share: f64,
    pub tenant_share: f64,
}

/// Commission for a sale at `price`, either with a negotiated fractional
/// `manual_rate` or the statutory tiered default.
pub fn sale_commission(price: f64, manual_rate: Option<f64>) -> SaleCommission {
    let (base, total) = match manual_rate {
        Some(rate) => {
            let base = price * rate;
            (base, base)
        }
        None => {
            let base = if price <= TIER_THRESHOLD {
                price * LOW_TIER_RATE
            } else {
                TIER_THRESHOLD * LOW_TIER_RATE + (price - TIER_THRESHOLD) * HIGH_TIER_RATE
            };
            (base, base + base * VAT_RATE)
        }
    };

    SaleCommission {
        base,
        tax: base * VAT_RATE,
        total,
        buyer_share: total / 2.0,
        seller_share: total / 2.0,
    }
}

/// Commission for a rental with `deposit` (rahn) and `monthly_rent`
/// (ejareh).
pub fn rent_commission(deposit: f64, monthly_rent: f64) -> RentCommission {
    let base = deposit * DEPOSIT_RATE + monthly_rent / RENT_DIVISOR;
    let tax = base * VAT_RATE;
    let total = base + tax;

    RentCommission {
        base,
        tax,
        total,
        owner_share: total / 2.0,
        tenant_share: total / 2.0,
    }
}
