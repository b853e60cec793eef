//! # Checkout Arithmetic
//!
//! Turns a cart of catalog references into priced lines and totals.
//!
//! ## Totals Flow
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  CartLine { kind, ref_id, quantity }                                    │
//! │       │  catalog lookup (nautilus-ledger)                               │
//! │       ▼                                                                 │
//! │  PricedLine { unit_price, quantity, taxable, sku, name }               │
//! │       │                                                                 │
//! │       ▼  compute_totals                                                 │
//! │  per line:  line_total = unit_price × quantity                          │
//! │             tax        = line_total × rate   (taxable lines, half up)   │
//! │                                                                         │
//! │  subtotal = Σ line_total                                                │
//! │  tax      = Σ line tax                                                  │
//! │  discount = Fixed | Percentage of subtotal   (≤ subtotal)               │
//! │  total    = subtotal + tax − discount                                   │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use ts_rs::TS;

use crate::error::{CoreError, CoreResult, ValidationError};
use crate::money::Money;
use crate::types::{CatalogItem, ItemKind, TaxRate};
use crate::validation::{validate_cart_size, validate_quantity, validate_ref_id};

/// One requested line of a checkout.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct CartLine {
    pub kind: ItemKind,
    pub ref_id: String,
    pub quantity: i64,
}

impl CartLine {
    pub fn new(kind: ItemKind, ref_id: impl Into<String>, quantity: i64) -> Self {
        CartLine {
            kind,
            ref_id: ref_id.into(),
            quantity,
        }
    }
}

/// Transaction-level discount.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export)]
#[serde(tag = "type", content = "value", rename_all = "snake_case")]
pub enum Discount {
    /// Flat amount off.
    Fixed(Money),
    /// Basis points of the subtotal (1000 = 10%).
    Percentage(u32),
}

impl Discount {
    /// Resolves the discount against a subtotal.
    ///
    /// Fails if the discount is negative, the percentage exceeds 100%, or the
    /// resolved amount is larger than the subtotal.
    pub fn resolve(&self, subtotal: Money) -> CoreResult<Money> {
        let amount = match *self {
            Discount::Fixed(amount) => {
                if amount.is_negative() {
                    return Err(ValidationError::MustNotBeNegative {
                        field: "discount".to_string(),
                    }
                    .into());
                }
                amount
            }
            Discount::Percentage(bps) => {
                if bps > 10000 {
                    return Err(ValidationError::OutOfRange {
                        field: "discount".to_string(),
                        min: 0,
                        max: 10000,
                    }
                    .into());
                }
                subtotal.percentage(bps)
            }
        };

        if amount > subtotal {
            return Err(ValidationError::OutOfRange {
                field: "discount".to_string(),
                min: 0,
                max: subtotal.cents(),
            }
            .into());
        }

        Ok(amount)
    }
}

/// A cart line after catalog resolution. Price, SKU and name are the
/// snapshot stored on the line item.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PricedLine {
    pub kind: ItemKind,
    pub ref_id: String,
    pub sku: String,
    pub name: String,
    pub unit_price: Money,
    pub quantity: i64,
    pub taxable: bool,
}

impl PricedLine {
    pub fn from_catalog(item: &CatalogItem, quantity: i64) -> Self {
        PricedLine {
            kind: item.kind,
            ref_id: item.ref_id.clone(),
            sku: item.sku.clone(),
            name: item.name.clone(),
            unit_price: item.unit_price(),
            quantity,
            taxable: item.taxable,
        }
    }
}

/// Per-line amounts, in the same order as the priced lines.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LineTotals {
    pub line_total: Money,
    pub tax: Money,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Totals {
    pub subtotal: Money,
    pub tax: Money,
    pub discount: Money,
    pub total: Money,
    pub lines: Vec<LineTotals>,
}

/// Checks cart shape: line count, quantities and reference ids.
pub fn validate_cart(lines: &[CartLine]) -> CoreResult<()> {
    validate_cart_size(lines.len())?;
    for line in lines {
        validate_ref_id(&line.ref_id)?;
        validate_quantity(line.quantity)?;
    }
    Ok(())
}

/// Sums quantities per catalog item, keeping first-seen order.
///
/// Duplicate lines for the same item are legal; capacity is checked against
/// the combined quantity.
pub fn aggregate_quantities(lines: &[CartLine]) -> Vec<(ItemKind, String, i64)> {
    let mut index: HashMap<(ItemKind, &str), usize> = HashMap::new();
    let mut totals: Vec<(ItemKind, String, i64)> = Vec::new();

    for line in lines {
        match index.get(&(line.kind, line.ref_id.as_str())) {
            Some(&i) => totals[i].2 += line.quantity,
            None => {
                index.insert((line.kind, line.ref_id.as_str()), totals.len());
                totals.push((line.kind, line.ref_id.clone(), line.quantity));
            }
        }
    }

    totals
}

/// Fails with `InsufficientStock` if `item` cannot cover `requested` units.
pub fn ensure_available(item: &CatalogItem, requested: i64) -> CoreResult<()> {
    if !item.can_supply(requested) {
        return Err(CoreError::InsufficientStock {
            sku: item.sku.clone(),
            available: item.available_quantity,
            requested,
        });
    }
    Ok(())
}

/// Computes line, subtotal, tax, discount and grand totals.
///
/// Tax is rounded per line, so the transaction tax always equals the sum of
/// the stored line taxes.
pub fn compute_totals(
    lines: &[PricedLine],
    rate: TaxRate,
    discount: Option<Discount>,
) -> CoreResult<Totals> {
    let line_totals: Vec<LineTotals> = lines
        .iter()
        .map(|line| {
            let line_total = line.unit_price.multiply_quantity(line.quantity);
            let tax = if line.taxable {
                line_total.calculate_tax(rate)
            } else {
                Money::zero()
            };
            LineTotals { line_total, tax }
        })
        .collect();

    let subtotal: Money = line_totals.iter().map(|l| l.line_total).sum();
    let tax: Money = line_totals.iter().map(|l| l.tax).sum();
    let discount = match discount {
        Some(d) => d.resolve(subtotal)?,
        None => Money::zero(),
    };

    Ok(Totals {
        subtotal,
        tax,
        discount,
        total: subtotal + tax - discount,
        lines: line_totals,
    })
}
