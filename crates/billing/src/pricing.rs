//! Checkout pricing
//!
//! Turns a plan or campaign selection into the exact amounts charged:
//! base + add-ons, minus any special offer, plus tax. Special offers are a
//! data table keyed by the marketing plan name, so adding one is a new row.

use std::collections::HashMap;

use leadforge_shared::PlanTier;
use rust_decimal::{Decimal, RoundingStrategy};
use serde::{Deserialize, Serialize};

use crate::error::{BillingError, BillingResult, PaymentField};

/// A plan the user picked on the pricing page
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlanSelection {
    /// Marketing name shown on the pricing page ("Pro Plan")
    pub name: String,
    /// Tier the purchase grants
    pub tier: PlanTier,
    /// Explicit base price; falls back to the pricing table when absent
    pub base_price: Option<Decimal>,
    #[serde(default)]
    pub additional_slots_cost: Decimal,
    #[serde(default)]
    pub integration_costs: Decimal,
    /// Total precomputed by the UI. Only cross-checked, never charged.
    pub total_cost: Option<Decimal>,
    /// Contact credits granted; the tier's catalog ceiling when absent
    pub contact_slots: Option<u64>,
}

/// A one-off campaign purchase
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CampaignSelection {
    pub campaign_id: String,
    pub name: String,
    pub cost: Decimal,
}

/// What is being bought: exactly one of a plan or a campaign
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum PurchaseSelection {
    Plan(PlanSelection),
    Campaign(CampaignSelection),
}

impl PurchaseSelection {
    /// Stable reference stored with the transaction
    pub fn reference(&self) -> String {
        match self {
            PurchaseSelection::Plan(plan) => format!("plan:{}", plan.tier),
            PurchaseSelection::Campaign(campaign) => format!("campaign:{}", campaign.campaign_id),
        }
    }

    pub fn display_name(&self) -> &str {
        match self {
            PurchaseSelection::Plan(plan) => &plan.name,
            PurchaseSelection::Campaign(campaign) => &campaign.name,
        }
    }
}

/// Discount granted by a special offer
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "value", rename_all = "lowercase")]
pub enum Discount {
    /// Percent off the subtotal (50 = half price)
    Percentage(Decimal),
    /// Fixed amount off, capped at the subtotal
    Fixed(Decimal),
}

impl Discount {
    fn amount_off(&self, subtotal: Decimal) -> Decimal {
        match *self {
            Discount::Percentage(pct) => subtotal * pct / Decimal::ONE_HUNDRED,
            Discount::Fixed(amount) => amount.min(subtotal),
        }
    }
}

/// Promotional pricing attached to a plan name
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SpecialOffer {
    pub plan_name: String,
    pub discount: Discount,
    /// Billing cycles the offer runs for, `None` for a one-time discount
    pub cycles: Option<u32>,
}

/// Base prices, offers and tax rate
#[derive(Debug, Clone)]
pub struct PricingTable {
    pub base_prices: HashMap<PlanTier, Decimal>,
    pub offers: Vec<SpecialOffer>,
    /// Fraction, 0.10 = 10%
    pub tax_rate: Decimal,
}

impl Default for PricingTable {
    fn default() -> Self {
        Self {
            base_prices: HashMap::from([
                (PlanTier::Free, Decimal::ZERO),
                (PlanTier::Essentials, Decimal::from(29)),
                (PlanTier::Standard, Decimal::from(59)),
                (PlanTier::Premium, Decimal::from(99)),
            ]),
            offers: vec![
                SpecialOffer {
                    plan_name: "Pro Plan".to_string(),
                    discount: Discount::Percentage(Decimal::from(50)),
                    cycles: Some(12),
                },
                SpecialOffer {
                    plan_name: "Growth Plan".to_string(),
                    discount: Discount::Fixed(Decimal::from(20)),
                    cycles: None,
                },
            ],
            tax_rate: Decimal::new(10, 2),
        }
    }
}

impl PricingTable {
    pub fn with_tax_rate(mut self, tax_rate: Decimal) -> Self {
        self.tax_rate = tax_rate;
        self
    }

    /// Offer for an exact plan-name match
    pub fn offer_for(&self, plan_name: &str) -> Option<&SpecialOffer> {
        self.offers.iter().find(|offer| offer.plan_name == plan_name)
    }

    /// Price a selection
    pub fn quote(&self, selection: &PurchaseSelection) -> BillingResult<PriceQuote> {
        match selection {
            PurchaseSelection::Plan(plan) => self.quote_plan(plan),
            PurchaseSelection::Campaign(campaign) => {
                ensure_non_negative(campaign.cost)?;
                Ok(self.finish(campaign.cost, Decimal::ZERO, Decimal::ZERO, None, None))
            }
        }
    }

    fn quote_plan(&self, plan: &PlanSelection) -> BillingResult<PriceQuote> {
        let base_price = match plan.base_price {
            Some(price) => price,
            None => *self.base_prices.get(&plan.tier).ok_or_else(|| {
                BillingError::validation(
                    PaymentField::Selection,
                    format!("no base price for plan tier {}", plan.tier),
                )
            })?,
        };
        for amount in [base_price, plan.additional_slots_cost, plan.integration_costs] {
            ensure_non_negative(amount)?;
        }

        let quote = self.finish(
            base_price,
            plan.additional_slots_cost,
            plan.integration_costs,
            self.offer_for(&plan.name).cloned(),
            plan.total_cost,
        );

        if let Some(supplied) = quote.supplied_total_mismatch {
            tracing::warn!(
                plan = %plan.name,
                supplied_total = %supplied,
                computed_subtotal = %quote.subtotal,
                "Supplied plan total disagrees with component prices, charging component sum"
            );
        }
        Ok(quote)
    }

    fn finish(
        &self,
        base_price: Decimal,
        additional_cost: Decimal,
        integration_cost: Decimal,
        offer: Option<SpecialOffer>,
        supplied_total: Option<Decimal>,
    ) -> PriceQuote {
        let subtotal = base_price + additional_cost + integration_cost;
        let discount = offer
            .as_ref()
            .map(|offer| offer.discount.amount_off(subtotal))
            .unwrap_or(Decimal::ZERO);
        let taxable_amount = (subtotal - discount).max(Decimal::ZERO);
        let tax = round_currency(taxable_amount * self.tax_rate);
        let final_total = round_currency(taxable_amount + tax);

        PriceQuote {
            base_price,
            additional_cost,
            integration_cost,
            subtotal,
            discount_amount: round_currency(discount),
            taxable_amount,
            tax,
            final_total,
            offer,
            supplied_total_mismatch: supplied_total.filter(|total| *total != subtotal),
        }
    }
}

/// Computed amounts for one purchase
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PriceQuote {
    pub base_price: Decimal,
    pub additional_cost: Decimal,
    pub integration_cost: Decimal,
    pub subtotal: Decimal,
    pub discount_amount: Decimal,
    pub taxable_amount: Decimal,
    pub tax: Decimal,
    pub final_total: Decimal,
    pub offer: Option<SpecialOffer>,
    /// The UI-supplied total, when it differs from `subtotal`
    pub supplied_total_mismatch: Option<Decimal>,
}

impl PriceQuote {
    /// Final total in minor units (cents, paise) for gateway APIs
    pub fn final_total_minor(&self) -> i64 {
        use rust_decimal::prelude::ToPrimitive;
        (self.final_total * Decimal::ONE_HUNDRED)
            .round()
            .to_i64()
            .unwrap_or(i64::MAX)
    }
}

/// Round half away from zero to two places
pub fn round_currency(amount: Decimal) -> Decimal {
    amount.round_dp_with_strategy(2, RoundingStrategy::MidpointAwayFromZero)
}

fn ensure_non_negative(amount: Decimal) -> BillingResult<()> {
    if amount.is_sign_negative() && !amount.is_zero() {
        return Err(BillingError::validation(
            PaymentField::Selection,
            format!("amount {} must not be negative", amount),
        ));
    }
    Ok(())
}
