//! Per-subtype totals reconciliation policies.
//!
//! The authority applies different total rules to ordinary invoices
//! (tax-exclusive), exempt invoices (no tax at all), and receipt-style
//! documents (tax-inclusive). Each rule is an explicit, separately tested
//! policy; no single formula is inferred across subtypes.

use rust_decimal::Decimal;
use tributo_shared::types::round_peso;
use tributo_shared::DteError;

use crate::dte::types::{DteType, LineItem, Totals};

/// IVA rate applied to taxed amounts (19%).
pub const IVA_RATE: Decimal = Decimal::from_parts(19, 0, 0, false, 2);

/// Totals reconciliation rule for a document subtype.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TotalsPolicy {
    /// Tax-exclusive: `tax = round(rate * (net - discount))`,
    /// `total = net + tax - discount`.
    Invoice,
    /// No tax: exempt amount minus discount is the total.
    Exempt,
    /// Tax-inclusive: the grand total carries IVA;
    /// `net = round(total / (1 + rate))`, `tax = total - net`.
    Receipt,
}

impl TotalsPolicy {
    /// The policy governing a document type.
    #[must_use]
    pub const fn for_type(dte_type: DteType) -> Self {
        match dte_type {
            DteType::Invoice | DteType::DebitNote | DteType::CreditNote => Self::Invoice,
            DteType::ExemptInvoice => Self::Exempt,
            DteType::Receipt => Self::Receipt,
        }
    }

    /// Computes reconciled totals from line items and a global discount.
    ///
    /// Line totals are summed exactly; rounding to whole pesos happens
    /// once per aggregate, never per line, so the figures match what the
    /// stamp will carry.
    ///
    /// # Errors
    ///
    /// Returns `DteError::Reconciliation` when the policy cannot produce
    /// consistent totals (e.g., taxed lines on an exempt document).
    pub fn compute(self, items: &[LineItem], discount: Decimal) -> Result<Totals, DteError> {
        if items.is_empty() {
            return Err(DteError::Reconciliation(
                "Document has no line items".to_string(),
            ));
        }
        if discount.is_sign_negative() {
            return Err(DteError::Reconciliation(format!(
                "Negative discount: {discount}"
            )));
        }

        let taxed: Decimal = items.iter().filter(|i| !i.exempt).map(|i| i.total).sum();
        let exempt: Decimal = items.iter().filter(|i| i.exempt).map(|i| i.total).sum();
        let taxed = round_peso(taxed);
        let exempt = round_peso(exempt);
        let discount = round_peso(discount);

        match self {
            Self::Invoice => {
                let base = taxed - discount;
                if base.is_sign_negative() {
                    return Err(DteError::Reconciliation(format!(
                        "Discount {discount} exceeds net amount {taxed}"
                    )));
                }
                let tax = round_peso(base * IVA_RATE);
                Ok(Totals {
                    net: taxed,
                    exempt,
                    tax,
                    discount,
                    total: base + tax + exempt,
                })
            }
            Self::Exempt => {
                if !taxed.is_zero() {
                    return Err(DteError::Reconciliation(format!(
                        "Exempt document carries taxed lines totaling {taxed}"
                    )));
                }
                let total = exempt - discount;
                if total.is_sign_negative() {
                    return Err(DteError::Reconciliation(format!(
                        "Discount {discount} exceeds exempt amount {exempt}"
                    )));
                }
                Ok(Totals {
                    net: Decimal::ZERO,
                    exempt,
                    tax: Decimal::ZERO,
                    discount,
                    total,
                })
            }
            Self::Receipt => {
                // Receipt line prices already include IVA.
                let gross = taxed - discount;
                if gross.is_sign_negative() {
                    return Err(DteError::Reconciliation(format!(
                        "Discount {discount} exceeds gross amount {taxed}"
                    )));
                }
                let net = round_peso(gross / (Decimal::ONE + IVA_RATE));
                Ok(Totals {
                    net,
                    exempt,
                    tax: gross - net,
                    discount,
                    total: gross + exempt,
                })
            }
        }
    }

    /// Validates totals handed over by the invoice layer against this
    /// policy. Documents whose totals do not reconcile must never be
    /// signed or submitted.
    ///
    /// # Errors
    ///
    /// Returns `DteError::Reconciliation` describing the first violated
    /// invariant.
    pub fn validate(self, items: &[LineItem], totals: &Totals) -> Result<(), DteError> {
        let expected = self.compute(items, totals.discount)?;
        if *totals != expected {
            return Err(DteError::Reconciliation(format!(
                "Totals do not reconcile: declared {totals:?}, computed {expected:?}"
            )));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn item(total: Decimal, exempt: bool) -> LineItem {
        LineItem {
            description: "Item".to_string(),
            quantity: dec!(1),
            unit_price: total,
            total,
            exempt,
        }
    }

    #[test]
    fn test_invoice_no_discount() {
        let totals = TotalsPolicy::Invoice
            .compute(&[item(dec!(10000), false)], Decimal::ZERO)
            .unwrap();
        assert_eq!(totals.net, dec!(10000));
        assert_eq!(totals.tax, dec!(1900));
        assert_eq!(totals.discount, dec!(0));
        assert_eq!(totals.total, dec!(11900));
    }

    #[test]
    fn test_invoice_with_discount() {
        let totals = TotalsPolicy::Invoice
            .compute(&[item(dec!(10000), false)], dec!(1000))
            .unwrap();
        // tax = round((10000 - 1000) * 0.19) = 1710
        assert_eq!(totals.tax, dec!(1710));
        assert_eq!(totals.total, dec!(10710));
    }

    #[test]
    fn test_invoice_reconciliation_identity() {
        let totals = TotalsPolicy::Invoice
            .compute(&[item(dec!(12345), false)], dec!(345))
            .unwrap();
        assert_eq!(
            totals.total,
            totals.net + totals.tax - totals.discount + totals.exempt
        );
    }

    #[test]
    fn test_exempt_lines_contribute_zero_tax() {
        let totals = TotalsPolicy::Invoice
            .compute(
                &[item(dec!(10000), false), item(dec!(99999), true)],
                Decimal::ZERO,
            )
            .unwrap();
        assert_eq!(totals.tax, dec!(1900));
        assert_eq!(totals.exempt, dec!(99999));
        assert_eq!(totals.total, dec!(11900) + dec!(99999));
    }

    #[test]
    fn test_exempt_document() {
        let totals = TotalsPolicy::Exempt
            .compute(&[item(dec!(5000), true)], Decimal::ZERO)
            .unwrap();
        assert_eq!(totals.tax, dec!(0));
        assert_eq!(totals.net, dec!(0));
        assert_eq!(totals.total, dec!(5000));
    }

    #[test]
    fn test_exempt_document_rejects_taxed_lines() {
        let result = TotalsPolicy::Exempt.compute(&[item(dec!(5000), false)], Decimal::ZERO);
        assert!(matches!(result, Err(DteError::Reconciliation(_))));
    }

    #[test]
    fn test_receipt_is_tax_inclusive() {
        let totals = TotalsPolicy::Receipt
            .compute(&[item(dec!(11900), false)], Decimal::ZERO)
            .unwrap();
        assert_eq!(totals.net, dec!(10000));
        assert_eq!(totals.tax, dec!(1900));
        assert_eq!(totals.total, dec!(11900));
    }

    #[test]
    fn test_empty_items_rejected() {
        let result = TotalsPolicy::Invoice.compute(&[], Decimal::ZERO);
        assert!(matches!(result, Err(DteError::Reconciliation(_))));
    }

    #[test]
    fn test_excess_discount_rejected() {
        let result = TotalsPolicy::Invoice.compute(&[item(dec!(100), false)], dec!(200));
        assert!(matches!(result, Err(DteError::Reconciliation(_))));
    }

    #[test]
    fn test_validate_accepts_computed_totals() {
        let items = [item(dec!(10000), false)];
        let totals = TotalsPolicy::Invoice.compute(&items, dec!(1000)).unwrap();
        assert!(TotalsPolicy::Invoice.validate(&items, &totals).is_ok());
    }

    #[test]
    fn test_validate_rejects_drifted_totals() {
        let items = [item(dec!(10000), false)];
        let mut totals = TotalsPolicy::Invoice.compute(&items, Decimal::ZERO).unwrap();
        totals.tax += dec!(1);
        assert!(matches!(
            TotalsPolicy::Invoice.validate(&items, &totals),
            Err(DteError::Reconciliation(_))
        ));
    }

    #[rstest::rstest]
    #[case(DteType::Invoice, TotalsPolicy::Invoice)]
    #[case(DteType::DebitNote, TotalsPolicy::Invoice)]
    #[case(DteType::CreditNote, TotalsPolicy::Invoice)]
    #[case(DteType::ExemptInvoice, TotalsPolicy::Exempt)]
    #[case(DteType::Receipt, TotalsPolicy::Receipt)]
    fn test_policy_for_type(#[case] dte_type: DteType, #[case] expected: TotalsPolicy) {
        assert_eq!(TotalsPolicy::for_type(dte_type), expected);
    }

    #[test]
    fn test_iva_rate_value() {
        assert_eq!(IVA_RATE, dec!(0.19));
    }
}

#[cfg(test)]
mod props {
    use super::*;
    use proptest::prelude::*;
    use rust_decimal_macros::dec;

    fn line_strategy() -> impl Strategy<Value = LineItem> {
        (1i64..10_000_000, any::<bool>()).prop_map(|(total, exempt)| LineItem {
            description: "Item".to_string(),
            quantity: dec!(1),
            unit_price: Decimal::from(total),
            total: Decimal::from(total),
            exempt,
        })
    }

    proptest! {
        /// For any taxed line set, invoice totals satisfy
        /// net + tax - discount + exempt == total.
        #[test]
        fn prop_invoice_reconciliation(
            lines in proptest::collection::vec(line_strategy(), 1..10),
        ) {
            let totals = TotalsPolicy::Invoice.compute(&lines, Decimal::ZERO).unwrap();
            prop_assert_eq!(
                totals.total,
                totals.net + totals.tax - totals.discount + totals.exempt
            );
        }

        /// Exempt lines never influence the tax amount.
        #[test]
        fn prop_exempt_lines_never_taxed(
            taxed_total in 1i64..1_000_000,
            exempt_total in 1i64..1_000_000,
        ) {
            let with_exempt = TotalsPolicy::Invoice
                .compute(
                    &[
                        LineItem {
                            description: "Taxed".to_string(),
                            quantity: dec!(1),
                            unit_price: Decimal::from(taxed_total),
                            total: Decimal::from(taxed_total),
                            exempt: false,
                        },
                        LineItem {
                            description: "Exempt".to_string(),
                            quantity: dec!(1),
                            unit_price: Decimal::from(exempt_total),
                            total: Decimal::from(exempt_total),
                            exempt: true,
                        },
                    ],
                    Decimal::ZERO,
                )
                .unwrap();
            let without_exempt = TotalsPolicy::Invoice
                .compute(
                    &[LineItem {
                        description: "Taxed".to_string(),
                        quantity: dec!(1),
                        unit_price: Decimal::from(taxed_total),
                        total: Decimal::from(taxed_total),
                        exempt: false,
                    }],
                    Decimal::ZERO,
                )
                .unwrap();
            prop_assert_eq!(with_exempt.tax, without_exempt.tax);
        }

        /// Receipt totals always split the gross amount exactly.
        #[test]
        fn prop_receipt_split_is_exact(gross in 1i64..10_000_000) {
            let totals = TotalsPolicy::Receipt
                .compute(
                    &[LineItem {
                        description: "Item".to_string(),
                        quantity: dec!(1),
                        unit_price: Decimal::from(gross),
                        total: Decimal::from(gross),
                        exempt: false,
                    }],
                    Decimal::ZERO,
                )
                .unwrap();
            prop_assert_eq!(totals.net + totals.tax, Decimal::from(gross));
        }
    }
}
