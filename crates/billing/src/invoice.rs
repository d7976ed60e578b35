//! Invoice construction
//!
//! An invoice is derived entirely from a recorded transaction and the priced
//! selection, so rebuilding it on a retry yields exactly the same document.

use leadforge_shared::{GatewayKind, TransactionId};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use time::Date;

use crate::pricing::{Discount, PriceQuote, PurchaseSelection};
use crate::transaction::Transaction;

/// Biller or payer identity
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Party {
    pub name: String,
    pub email: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub address: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct InvoiceLine {
    pub description: String,
    pub amount: Decimal,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct InvoiceRecord {
    pub invoice_number: String,
    pub transaction_id: TransactionId,
    pub payment_id: String,
    pub gateway: GatewayKind,
    pub issue_date: Date,
    pub biller: Party,
    pub payer: Party,
    pub lines: Vec<InvoiceLine>,
    pub subtotal: Decimal,
    pub discount: Decimal,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub offer_note: Option<String>,
    pub tax: Decimal,
    pub total: Decimal,
    pub currency: String,
}

impl InvoiceRecord {
    pub fn build(
        transaction: &Transaction,
        selection: &PurchaseSelection,
        quote: &PriceQuote,
        biller: &Party,
        payer: &Party,
    ) -> Self {
        let id = transaction.transaction_id.as_str();
        let invoice_number = format!("INV-{}", id.strip_prefix("TXN-").unwrap_or(id));

        InvoiceRecord {
            invoice_number,
            transaction_id: transaction.transaction_id.clone(),
            payment_id: transaction.payment_id.clone(),
            gateway: transaction.gateway,
            issue_date: transaction.created_at.date(),
            biller: biller.clone(),
            payer: payer.clone(),
            lines: line_items(selection, quote),
            subtotal: quote.subtotal,
            discount: quote.discount_amount,
            offer_note: quote.offer.as_ref().map(|offer| match offer.discount {
                Discount::Percentage(pct) => match offer.cycles {
                    Some(cycles) => format!("{}% off for {} billing cycles", pct, cycles),
                    None => format!("{}% off", pct),
                },
                Discount::Fixed(amount) => format!("{} off", amount),
            }),
            tax: quote.tax,
            total: quote.final_total,
            currency: transaction.currency.clone(),
        }
    }
}

fn line_items(selection: &PurchaseSelection, quote: &PriceQuote) -> Vec<InvoiceLine> {
    match selection {
        PurchaseSelection::Plan(plan) => {
            let mut lines = vec![InvoiceLine {
                description: format!("{} plan", plan.name),
                amount: quote.base_price,
            }];
            if !quote.additional_cost.is_zero() {
                lines.push(InvoiceLine {
                    description: match plan.contact_slots {
                        Some(slots) => format!("Additional contact slots ({} total)", slots),
                        None => "Additional contact slots".to_string(),
                    },
                    amount: quote.additional_cost,
                });
            }
            if !quote.integration_cost.is_zero() {
                lines.push(InvoiceLine {
                    description: "Integrations".to_string(),
                    amount: quote.integration_cost,
                });
            }
            lines
        }
        PurchaseSelection::Campaign(campaign) => vec![InvoiceLine {
            description: format!("Campaign: {}", campaign.name),
            amount: quote.base_price,
        }],
    }
}
