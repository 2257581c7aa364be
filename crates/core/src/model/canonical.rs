//! Canonical records produced by the extractor
//!
//! A canonical record holds resolved, coerced source values under normalized
//! field names. Optional fields are absent rather than null, and every record
//! keeps the identifier of the row it came from.

use serde::{Deserialize, Serialize};

/// Fields shared by buyers and producers
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PartyFields {
    /// Identifier of the origin row
    pub source_id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub code: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sub_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub vat_number: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub fiscal_code: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sdi_code: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub pec: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub phone: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub fax: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub website: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub address: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub po_box: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub city: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub province: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub postal_code: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub country: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub main_contact: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub notes: Option<String>,
    /// Raw status token as found in the source
    #[serde(skip_serializing_if = "Option::is_none")]
    pub status: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub enabled: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub created_at: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub updated_at: Option<String>,
}

/// Buyer record
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CanonicalBuyer {
    #[serde(flatten)]
    pub party: PartyFields,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub payment_method: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub payment_terms: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub bank_details: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub currency: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub preferred_language: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub vat_exempt: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub industrial_group: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sector: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub default_operator: Option<String>,
}

/// Producer record
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CanonicalProducer {
    #[serde(flatten)]
    pub party: PartyFields,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub revenue_percentage: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub quality_assurance: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub production_area: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub markets: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub materials: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub products: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub payment_terms: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub currency: Option<String>,
}

/// Sale header with its lines
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CanonicalSale {
    pub source_id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sale_number: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reg_number: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub doc_type: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sale_date: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub buyer_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub buyer_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub producer_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub producer_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub subtotal: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub discount_amount: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tax_amount: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub total: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub vat_rate: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub vat_exempt: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub currency: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub payment_method: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub payment_terms: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub payment_date: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub payment_note: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub bank: Option<String>,
    /// Bank account the buyer pays into
    #[serde(skip_serializing_if = "Option::is_none")]
    pub co_bank_description: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub co_bank_iban: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub delivery_method: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub delivery_date: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub delivery_note: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reference_number: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub po_number: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub po_date: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub printed_note: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub package: Option<String>,
    /// Delivery notes (DDT) covering the sale, up to three
    #[serde(skip_serializing_if = "Option::is_none")]
    pub dn_number: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub dn_date: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub dn_number2: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub dn_date2: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub dn_number3: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub dn_date3: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cup_code: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cig_code: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub notes: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub internal_notes: Option<String>,
    /// Raw status token as found in the source
    #[serde(skip_serializing_if = "Option::is_none")]
    pub status: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub invoice_generated: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub invoice_number: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub number_t: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub year: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub created_at: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub updated_at: Option<String>,
    /// Lines ordered by line number
    #[serde(default)]
    pub lines: Vec<CanonicalSaleLine>,
}

/// One line of a sale
///
/// The amount fields are only present when the source supplied them; the
/// transformer derives the missing ones.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CanonicalSaleLine {
    pub source_id: String,
    pub line_number: i64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub product_code: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub product_description: Option<String>,
    pub quantity: f64,
    pub unit_price: f64,
    /// Discount percentage
    pub discount: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub discount_amount: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub net_amount: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tax_rate: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tax_amount: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub total_amount: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub unit_of_measure: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub notes: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub created_at: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub updated_at: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_absent_fields_not_serialized() {
        let buyer = CanonicalBuyer {
            party: PartyFields {
                source_id: "7".to_string(),
                name: Some("Acme".to_string()),
                ..Default::default()
            },
            currency: Some("EUR".to_string()),
            ..Default::default()
        };

        let value = serde_json::to_value(&buyer).unwrap();
        assert_eq!(
            value,
            json!({"source_id": "7", "name": "Acme", "currency": "EUR"})
        );
    }

    #[test]
    fn test_sale_lines_default_empty() {
        let sale: CanonicalSale = serde_json::from_value(json!({"source_id": "1"})).unwrap();
        assert!(sale.lines.is_empty());
        assert!(sale.total.is_none());
    }
}
