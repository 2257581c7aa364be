//! Structural and business-rule validation of target items
//!
//! Checks never mutate their input. Failed checks become error messages,
//! except the sale total reconciliation, which only warns. A record is valid
//! when it produced no errors; a sale counts together with its lines.

mod report;
pub mod schema;

pub use report::{EntityStats, EntityValidation, ValidationReport, ValidationSummary};
pub use schema::{ItemSchema, KeyRule};

use std::collections::HashSet;

use serde_json::Value;
use tracing::{info, warn};

use crate::dates::parse_datetime;
use crate::model::{Entity, SaleRecord, TargetItem, is_empty_value};

/// Validates the target items of one entity at a time
#[derive(Debug, Clone, Copy)]
pub struct Validator {
    /// Absolute tolerance of the sale total check
    tolerance: f64,
}

impl Validator {
    pub fn new(tolerance: f64) -> Self {
        Self { tolerance }
    }

    /// Validate buyer or producer items
    pub fn validate_parties(&self, entity: Entity, items: &[TargetItem]) -> EntityValidation {
        let schema = match entity {
            Entity::Producers => &schema::PRODUCER,
            _ => &schema::BUYER,
        };
        let mut result = EntityValidation::new(entity);
        let mut keys = HashSet::new();

        for item in items {
            let mut errors = Vec::new();
            check_item(schema, item, &mut errors);
            check_unique(schema, item, &mut keys, &mut errors);
            result.record(errors, Vec::new());
        }

        log_result(&result);
        result
    }

    /// Validate sales together with their lines
    pub fn validate_sales(&self, records: &[SaleRecord]) -> EntityValidation {
        let mut result = EntityValidation::new(Entity::Sales);
        let mut keys = HashSet::new();

        for record in records {
            let mut errors = Vec::new();
            let mut warnings = Vec::new();

            check_item(&schema::SALE, &record.sale, &mut errors);
            check_unique(&schema::SALE, &record.sale, &mut keys, &mut errors);
            self.check_total(&record.sale, &mut warnings);

            for line in &record.lines {
                check_item(&schema::SALE_LINE, line, &mut errors);
                check_unique(&schema::SALE_LINE, line, &mut keys, &mut errors);
                if line.pk() != record.sale.pk() {
                    errors.push(format!(
                        "{}: PK {} does not match its sale {}",
                        record_label(&schema::SALE_LINE, line),
                        line.pk().unwrap_or("<missing>"),
                        record.sale.pk().unwrap_or("<missing>"),
                    ));
                }
            }

            result.record(errors, warnings);
        }

        log_result(&result);
        result
    }

    /// `total ≈ subtotal − discountAmount + taxAmount`
    fn check_total(&self, sale: &TargetItem, warnings: &mut Vec<String>) {
        let (Some(subtotal), Some(total)) = (sale.get_f64("subtotal"), sale.get_f64("total")) else {
            return;
        };
        let discount = sale.get_f64("discountAmount").unwrap_or(0.0);
        let tax = sale.get_f64("taxAmount").unwrap_or(0.0);
        let expected = subtotal - discount + tax;

        if (expected - total).abs() > self.tolerance {
            warnings.push(format!(
                "{}: Total mismatch. Expected {:.2}, got {:.2}",
                record_label(&schema::SALE, sale),
                expected,
                total
            ));
        }
    }
}

fn log_result(result: &EntityValidation) {
    if result.has_errors() {
        warn!(
            entity = %result.entity,
            count = result.stats.count,
            invalid = result.stats.invalid,
            errors = result.errors.len(),
            warnings = result.warnings.len(),
            "Validation found errors"
        );
    } else {
        info!(
            entity = %result.entity,
            count = result.stats.count,
            warnings = result.warnings.len(),
            "Validation passed"
        );
    }
}

/// `Sale s-0001` style label for messages
fn record_label(schema: &ItemSchema, item: &TargetItem) -> String {
    let id = item
        .get_str(schema.id_attribute)
        .or_else(|| item.get_str("sourceId"))
        .or_else(|| item.pk())
        .unwrap_or("<unknown>");
    format!("{} {}", schema.label, id)
}

fn check_item(schema: &ItemSchema, item: &TargetItem, errors: &mut Vec<String>) {
    let label = record_label(schema, item);

    for attribute in schema.required {
        if item.get(attribute).is_none_or(is_empty_value) {
            errors.push(format!("{label}: missing required field '{attribute}'"));
        }
    }

    check_key(&label, "PK", item.pk(), schema.pk, errors);
    check_key(&label, "SK", item.sk(), schema.sk, errors);

    for (attribute, rule) in schema.index_keys {
        if let Some(value) = item.get(attribute) {
            match value.as_str() {
                Some(s) if rule.matches(s) => {}
                _ => errors.push(format!(
                    "{label}: {attribute} must {}, got {}",
                    rule.describe(),
                    value
                )),
            }
        }
    }

    if !schema.statuses.is_empty() {
        if let Some(status) = item.get("status").filter(|v| !is_empty_value(v)) {
            let known = status.as_str().is_some_and(|s| schema.statuses.contains(&s));
            if !known {
                errors.push(format!(
                    "{label}: invalid status {} (expected one of: {})",
                    status,
                    schema.statuses.join(", ")
                ));
            }
        }
    }

    for attribute in schema.non_negative {
        match item.get(attribute) {
            None | Some(Value::Null) => {}
            Some(Value::Number(n)) => {
                if n.as_f64().is_some_and(|f| f < 0.0) {
                    errors.push(format!("{label}: {attribute} cannot be negative"));
                }
            }
            Some(other) => errors.push(format!("{label}: {attribute} must be a number, got {other}")),
        }
    }

    for attribute in schema.numeric {
        match item.get(attribute) {
            None | Some(Value::Null) | Some(Value::Number(_)) => {}
            Some(other) => errors.push(format!("{label}: {attribute} must be a number, got {other}")),
        }
    }

    for attribute in schema.dates {
        match item.get(attribute) {
            None | Some(Value::Null) => {}
            Some(Value::String(s)) if s.trim().is_empty() => {}
            Some(Value::String(s)) if parse_datetime(s).is_some() => {}
            Some(other) => errors.push(format!("{label}: {attribute} is not a valid date: {other}")),
        }
    }
}

fn check_key(label: &str, name: &str, value: Option<&str>, rule: KeyRule, errors: &mut Vec<String>) {
    // Absence is reported by the required-field check
    if let Some(value) = value {
        if !rule.matches(value) {
            errors.push(format!("{label}: {name} must {}, got '{value}'", rule.describe()));
        }
    }
}

fn check_unique(
    schema: &ItemSchema,
    item: &TargetItem,
    seen: &mut HashSet<(String, String)>,
    errors: &mut Vec<String>,
) {
    if let (Some(pk), Some(sk)) = (item.pk(), item.sk()) {
        if !seen.insert((pk.to_string(), sk.to_string())) {
            errors.push(format!(
                "{}: duplicate key PK={pk} SK={sk}",
                record_label(schema, item)
            ));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn sale_item(subtotal: f64, discount: f64, tax: f64, total: f64) -> TargetItem {
        let mut item = TargetItem::new("SALE#s-0001", "METADATA");
        for (name, value) in [
            ("entityType", json!("SALE")),
            ("saleId", json!("s-0001")),
            ("saleDate", json!("2024-03-15")),
            ("status", json!("confirmed")),
            ("createdAt", json!("2024-03-15T10:00:00Z")),
            ("updatedAt", json!("2024-03-15T10:00:00Z")),
            ("createdBy", json!("migration")),
            ("updatedBy", json!("migration")),
            ("GSI1PK", json!("STATUS#confirmed")),
            ("GSI1SK", json!("2024-03-15")),
            ("GSI4PK", json!("SALE")),
            ("GSI4SK", json!("2024-03-15")),
            ("subtotal", json!(subtotal)),
            ("discountAmount", json!(discount)),
            ("taxAmount", json!(tax)),
            ("total", json!(total)),
        ] {
            item.set(name, value);
        }
        item
    }

    fn line_item(pk: &str, sk: &str) -> TargetItem {
        let mut item = TargetItem::new(pk, sk);
        for (name, value) in [
            ("entityType", json!("SALE_LINE")),
            ("saleId", json!("s-0001")),
            ("lineId", json!("L1")),
            ("lineNumber", json!(1)),
            ("quantity", json!(-1.0)),
            ("unitPrice", json!(100.0)),
            ("netAmount", json!(-100.0)),
            ("taxAmount", json!(-22.0)),
            ("totalAmount", json!(-122.0)),
            ("createdAt", json!("2024-03-15T10:00:00Z")),
            ("updatedAt", json!("2024-03-15T10:00:00Z")),
            ("createdBy", json!("migration")),
            ("updatedBy", json!("migration")),
        ] {
            item.set(name, value);
        }
        item
    }

    fn record(sale: TargetItem) -> SaleRecord {
        SaleRecord {
            sale,
            lines: Vec::new(),
        }
    }

    #[test]
    fn test_consistent_total_passes() {
        let result = Validator::new(0.01).validate_sales(&[record(sale_item(100.0, 0.0, 22.0, 122.0))]);
        assert!(result.errors.is_empty(), "{:?}", result.errors);
        assert!(result.warnings.is_empty());
        assert_eq!(result.stats.valid, 1);
    }

    #[test]
    fn test_total_mismatch_warns_only() {
        let result = Validator::new(0.01).validate_sales(&[record(sale_item(100.0, 0.0, 22.0, 999.0))]);
        assert!(result.errors.is_empty());
        assert_eq!(result.warnings.len(), 1);
        assert!(result.warnings[0].contains("Total mismatch. Expected 122.00, got 999.00"));
        assert_eq!(result.stats.valid, 1);
        assert!(!result.has_errors());
    }

    #[test]
    fn test_negative_total_is_error() {
        let result = Validator::new(0.01).validate_sales(&[record(sale_item(100.0, 0.0, 22.0, -5.0))]);
        assert!(result.errors.iter().any(|e| e == "Sale s-0001: total cannot be negative"));
        assert_eq!(result.stats.invalid, 1);
        assert!(result.has_errors());
    }

    #[test]
    fn test_tolerance_is_absolute() {
        let sale = sale_item(100.0, 0.0, 22.0, 122.4);
        assert_eq!(Validator::new(0.5).validate_sales(&[record(sale.clone())]).warnings.len(), 0);
        assert_eq!(Validator::new(0.01).validate_sales(&[record(sale)]).warnings.len(), 1);
    }

    #[test]
    fn test_line_checks() {
        let mut sale = record(sale_item(100.0, 0.0, 22.0, 122.0));
        sale.lines.push(line_item("SALE#s-0001", "LINE#001"));
        let result = Validator::new(0.01).validate_sales(&[sale.clone()]);
        assert!(result.errors.is_empty(), "{:?}", result.errors);

        sale.lines.push(line_item("SALE#other", "LINE#001"));
        sale.lines.push(line_item("SALE#s-0001", "LINE#001"));
        let result = Validator::new(0.01).validate_sales(&[sale]);
        assert!(result.errors.iter().any(|e| e.contains("does not match its sale")));
        assert!(result.errors.iter().any(|e| e.contains("duplicate key")));
        assert_eq!(result.stats.count, 1);
        assert_eq!(result.stats.invalid, 1);
    }

    #[test]
    fn test_party_structure() {
        let mut item = TargetItem::new("SALE#x", "LINE#001");
        item.set("status", "sleeping");
        item.set("createdAt", "yesterday");
        item.set("GSI3PK", "SELLER");

        let result = Validator::new(0.01).validate_parties(Entity::Buyers, &[item]);
        let errors = result.errors.join("\n");
        assert!(errors.contains("missing required field 'companyName'"));
        assert!(errors.contains("PK must start with 'BUYER#'"));
        assert!(errors.contains("SK must equal 'METADATA'"));
        assert!(errors.contains("invalid status"));
        assert!(errors.contains("createdAt is not a valid date"));
        assert!(errors.contains("GSI3PK must equal 'BUYER'"));
        assert_eq!(result.stats.invalid, 1);
    }

    #[test]
    fn test_blank_required_field_is_missing() {
        let mut item = sale_item(1.0, 0.0, 0.0, 1.0);
        item.set("saleDate", "  ");
        let result = Validator::new(0.01).validate_sales(&[record(item)]);
        assert!(result.errors.iter().any(|e| e.contains("missing required field 'saleDate'")));
    }
}
