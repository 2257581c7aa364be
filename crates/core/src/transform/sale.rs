use std::collections::HashMap;

use serde_json::Value;
use tracing::warn;

use super::TransformOptions;
use super::financial::{SaleTotals, derive_line_amounts};
use super::party::set_audit;
use super::status::SaleStatus;
use crate::model::keys::{GSI1, GSI2, GSI3, GSI4, METADATA_SK, entity_pk, line_sk, status_key, type_key};
use crate::model::{CanonicalSale, CanonicalSaleLine, Entity, SaleRecord, TargetItem};

/// Display fields of a party copied into each sale that references it
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PartySnapshot {
    pub id: String,
    pub name: Option<String>,
    pub vat_number: Option<String>,
    pub fiscal_code: Option<String>,
    pub address: Option<String>,
    pub city: Option<String>,
    pub province: Option<String>,
    pub postal_code: Option<String>,
    pub country: Option<String>,
}

impl PartySnapshot {
    fn from_item(item: &TargetItem, id_attribute: &str) -> Option<Self> {
        let text = |name: &str| item.get_str(name).map(str::to_string);
        Some(Self {
            id: item.get_str(id_attribute)?.to_string(),
            name: text("companyName"),
            vat_number: text("vatNumber"),
            fiscal_code: text("fiscalCode"),
            address: text("address"),
            city: text("city"),
            province: text("province"),
            postal_code: text("postalCode"),
            country: text("country"),
        })
    }
}

/// Transformed buyers and producers keyed by source id
#[derive(Debug, Clone, Default)]
pub struct PartyIndex {
    buyers: HashMap<String, PartySnapshot>,
    producers: HashMap<String, PartySnapshot>,
}

impl PartyIndex {
    pub fn new() -> Self {
        Self::default()
    }

    /// Index transformed party items of one entity
    pub fn insert_items(&mut self, entity: Entity, items: &[TargetItem]) {
        let (index, id_attribute) = match entity {
            Entity::Buyers => (&mut self.buyers, "buyerId"),
            Entity::Producers => (&mut self.producers, "producerId"),
            Entity::Sales => return,
        };
        for item in items {
            let Some(source_id) = item.get_str("sourceId") else {
                continue;
            };
            if let Some(snapshot) = PartySnapshot::from_item(item, id_attribute) {
                index.insert(source_id.to_string(), snapshot);
            }
        }
    }

    pub fn buyer(&self, source_id: &str) -> Option<&PartySnapshot> {
        self.buyers.get(source_id)
    }

    pub fn producer(&self, source_id: &str) -> Option<&PartySnapshot> {
        self.producers.get(source_id)
    }

    pub fn len(&self) -> usize {
        self.buyers.len() + self.producers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

pub(super) fn transform_sale(
    sale: &CanonicalSale,
    id: &str,
    parties: &PartyIndex,
    options: &TransformOptions,
) -> SaleRecord {
    let pk = entity_pk(Entity::Sales, id);
    let status = SaleStatus::from_token(sale.status.as_deref());
    let sale_date = sale
        .sale_date
        .clone()
        .unwrap_or_else(|| options.run_date().to_string());

    // Sort keys follow the position in line order, so tied line numbers
    // still get distinct keys
    let mut ordered: Vec<&CanonicalSaleLine> = sale.lines.iter().collect();
    ordered.sort_by_key(|line| line.line_number);

    let mut lines = Vec::with_capacity(ordered.len());
    let mut totals = SaleTotals::default();
    for (index, line) in ordered.into_iter().enumerate() {
        let position = index as i64 + 1;
        let (item, amounts) = line_item(line, position, &pk, id, sale, options);
        totals.add(&amounts);
        lines.push(item);
    }

    let mut item = TargetItem::new(pk, METADATA_SK);
    item.set("entityType", type_key(Entity::Sales));
    item.set("saleId", id);
    item.set_opt("saleNumber", sale.sale_number);
    item.set_opt("regNumber", sale.reg_number.clone());
    item.set_opt("docType", sale.doc_type.clone());
    item.set("saleDate", sale_date.as_str());

    let buyer_id = embed_party(
        &mut item,
        "buyer",
        Entity::Buyers,
        sale,
        sale.buyer_id.as_deref(),
        sale.buyer_name.as_deref(),
        |source_id| parties.buyer(source_id),
    );
    let producer_id = embed_party(
        &mut item,
        "producer",
        Entity::Producers,
        sale,
        sale.producer_id.as_deref(),
        sale.producer_name.as_deref(),
        |source_id| parties.producer(source_id),
    );

    // Totals come either all from the header or all from the lines; mixing
    // the two would break `total = subtotal - discountAmount + taxAmount`
    let header = [sale.subtotal, sale.discount_amount, sale.tax_amount, sale.total];
    if header.iter().any(Option::is_some) || lines.is_empty() {
        item.set_opt("subtotal", sale.subtotal);
        item.set_opt("discountAmount", sale.discount_amount);
        item.set_opt("taxAmount", sale.tax_amount);
        item.set_opt("total", sale.total);
    } else {
        item.set("subtotal", totals.subtotal);
        item.set("discountAmount", totals.discount_amount);
        item.set("taxAmount", totals.tax_amount);
        item.set("total", totals.total);
    }
    item.set_opt("vatRate", sale.vat_rate);
    item.set_opt("vatExempt", sale.vat_exempt);
    item.set_opt("currency", sale.currency.clone());
    item.set_opt("paymentMethod", sale.payment_method.clone());
    item.set_opt("paymentTerms", sale.payment_terms.clone());
    item.set_opt("paymentDate", sale.payment_date.clone());
    item.set_opt("paymentNote", sale.payment_note.clone());
    item.set_opt("bank", sale.bank.clone());
    item.set_opt("coBankDescription", sale.co_bank_description.clone());
    item.set_opt("coBankIban", sale.co_bank_iban.clone());
    item.set_opt("deliveryMethod", sale.delivery_method.clone());
    item.set_opt("deliveryDate", sale.delivery_date.clone());
    item.set_opt("deliveryNote", sale.delivery_note.clone());
    item.set_opt("referenceNumber", sale.reference_number.clone());
    item.set_opt("poNumber", sale.po_number.clone());
    item.set_opt("poDate", sale.po_date.clone());
    item.set_opt("printedNote", sale.printed_note.clone());
    item.set_opt("package", sale.package.clone());
    item.set_opt("dnNumber", sale.dn_number.clone());
    item.set_opt("dnDate", sale.dn_date.clone());
    item.set_opt("dnNumber2", sale.dn_number2.clone());
    item.set_opt("dnDate2", sale.dn_date2.clone());
    item.set_opt("dnNumber3", sale.dn_number3.clone());
    item.set_opt("dnDate3", sale.dn_date3.clone());
    item.set_opt("cupCode", sale.cup_code.clone());
    item.set_opt("cigCode", sale.cig_code.clone());
    item.set_opt("notes", sale.notes.clone());
    item.set_opt("internalNotes", sale.internal_notes.clone());
    item.set("status", status.name());
    item.set(
        "invoiceGenerated",
        sale.invoice_generated.unwrap_or_else(|| status.implies_invoice()),
    );
    item.set_opt("invoiceNumber", sale.invoice_number.clone());
    item.set_opt("numberT", sale.number_t.clone());
    item.set_opt("year", sale.year);
    item.set("linesCount", lines.len());

    item.set(GSI1.0, status_key(status.name()));
    item.set(GSI1.1, sale_date.as_str());
    if let Some(buyer_id) = buyer_id {
        item.set(GSI2.0, entity_pk(Entity::Buyers, &buyer_id));
        item.set(GSI2.1, sale_date.as_str());
    }
    if let Some(producer_id) = producer_id {
        item.set(GSI3.0, entity_pk(Entity::Producers, &producer_id));
        item.set(GSI3.1, sale_date.as_str());
    }
    item.set(GSI4.0, type_key(Entity::Sales));
    item.set(GSI4.1, sale_date.as_str());

    set_audit(&mut item, sale.created_at.as_deref(), sale.updated_at.as_deref(), options);
    item.set("sourceId", sale.source_id.as_str());

    SaleRecord { sale: item, lines }
}

/// Embed a party snapshot under `<prefix>Id`, `<prefix>Name`, ...
///
/// Returns the id the sale refers to: the surrogate id when the reference
/// resolves, the source id otherwise.
fn embed_party<'p>(
    item: &mut TargetItem,
    prefix: &str,
    entity: Entity,
    sale: &CanonicalSale,
    source_id: Option<&str>,
    source_name: Option<&str>,
    lookup: impl Fn(&str) -> Option<&'p PartySnapshot>,
) -> Option<String> {
    let source_id = source_id.filter(|id| !id.trim().is_empty())?;
    let attr = |field: &str| format!("{prefix}{field}");

    match lookup(source_id) {
        Some(snapshot) => {
            item.set(&attr("Id"), snapshot.id.as_str());
            item.set_opt(&attr("Name"), snapshot.name.clone().or(source_name.map(str::to_string)));
            item.set_opt(&attr("VatNumber"), snapshot.vat_number.clone());
            item.set_opt(&attr("FiscalCode"), snapshot.fiscal_code.clone());
            item.set_opt(&attr("Address"), snapshot.address.clone());
            item.set_opt(&attr("City"), snapshot.city.clone());
            item.set_opt(&attr("Province"), snapshot.province.clone());
            item.set_opt(&attr("PostalCode"), snapshot.postal_code.clone());
            item.set_opt(&attr("Country"), snapshot.country.clone());
            Some(snapshot.id.clone())
        }
        None => {
            warn!(
                sale = %sale.source_id,
                entity = %entity,
                reference = %source_id,
                "Unresolved party reference, keeping source id"
            );
            item.set(&attr("Id"), source_id);
            item.set_opt(&attr("Name"), source_name);
            Some(source_id.to_string())
        }
    }
}

fn line_item(
    line: &CanonicalSaleLine,
    position: i64,
    pk: &str,
    sale_id: &str,
    sale: &CanonicalSale,
    options: &TransformOptions,
) -> (TargetItem, super::financial::LineAmounts) {
    let amounts = derive_line_amounts(line, options.default_tax_rate);

    let mut item = TargetItem::new(pk, line_sk(position));
    item.set("entityType", "SALE_LINE");
    item.set("saleId", sale_id);
    item.set("lineId", line.source_id.as_str());
    item.set("lineNumber", line.line_number);
    item.set_opt("productCode", line.product_code.clone());
    item.set_opt("productDescription", line.product_description.clone());
    item.set("quantity", number(line.quantity));
    item.set("unitPrice", number(line.unit_price));
    item.set("discount", number(line.discount));
    item.set("discountAmount", number(amounts.discount_amount));
    item.set("netAmount", number(amounts.net_amount));
    item.set("taxRate", number(amounts.tax_rate));
    item.set("taxAmount", number(amounts.tax_amount));
    item.set("totalAmount", number(amounts.total_amount));
    item.set_opt("unitOfMeasure", line.unit_of_measure.clone());
    item.set_opt("notes", line.notes.clone());

    let created_at = line.created_at.as_deref().or(sale.created_at.as_deref());
    let updated_at = line.updated_at.as_deref().or(sale.updated_at.as_deref());
    set_audit(&mut item, created_at, updated_at, options);

    (item, amounts)
}

/// JSON number, or null for values JSON cannot carry
fn number(value: f64) -> Value {
    serde_json::Number::from_f64(value)
        .map(Value::Number)
        .unwrap_or(Value::Null)
}
