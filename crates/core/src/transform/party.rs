use super::TransformOptions;
use super::status::PartyStatus;
use crate::model::keys::{GSI1, GSI2, GSI3, METADATA_SK, country_key, entity_pk, status_key, type_key};
use crate::model::{CanonicalBuyer, CanonicalProducer, Entity, PartyFields, TargetItem};

/// Build the item of one buyer
pub fn transform_buyer(buyer: &CanonicalBuyer, id: &str, options: &TransformOptions) -> TargetItem {
    let mut item = party_item(Entity::Buyers, "buyerId", &buyer.party, id, options);

    item.set_opt("defaultPaymentMethod", buyer.payment_method.clone());
    item.set_opt("defaultPaymentTerms", buyer.payment_terms.clone());
    item.set_opt("bankDetails", buyer.bank_details.clone());
    item.set_opt("currency", buyer.currency.clone());
    item.set_opt("preferredLanguage", buyer.preferred_language.clone());
    item.set_opt("vatExempt", buyer.vat_exempt);
    item.set_opt("industrialGroup", buyer.industrial_group.clone());
    item.set_opt("sector", buyer.sector.clone());
    item.set_opt("defaultOperator", buyer.default_operator.clone());
    item.set("totalSales", 0);
    item.set("totalRevenue", 0);

    item
}

/// Build the item of one producer
pub fn transform_producer(
    producer: &CanonicalProducer,
    id: &str,
    options: &TransformOptions,
) -> TargetItem {
    let mut item = party_item(Entity::Producers, "producerId", &producer.party, id, options);

    item.set_opt("revenuePercentage", producer.revenue_percentage);
    item.set_opt("qualityAssurance", producer.quality_assurance.clone());
    item.set_opt("productionArea", producer.production_area.clone());
    item.set_opt("markets", producer.markets.clone());
    item.set_opt("materials", producer.materials.clone());
    item.set_opt("products", producer.products.clone());
    item.set_opt("defaultPaymentTerms", producer.payment_terms.clone());
    item.set_opt("currency", producer.currency.clone());
    item.set("totalSales", 0);

    item
}

fn party_item(
    entity: Entity,
    id_attribute: &str,
    party: &PartyFields,
    id: &str,
    options: &TransformOptions,
) -> TargetItem {
    let mut item = TargetItem::new(entity_pk(entity, id), METADATA_SK);
    let status = PartyStatus::from_token(party.status.as_deref(), party.enabled);
    let company_name = party.name.as_deref().map(str::trim).filter(|n| !n.is_empty());

    item.set("entityType", type_key(entity));
    item.set(id_attribute, id);
    item.set_opt("code", party.code.clone());
    item.set_opt("companyName", company_name);
    item.set_opt("subName", party.sub_name.clone());
    item.set_opt("vatNumber", party.vat_number.clone());
    item.set_opt("fiscalCode", party.fiscal_code.clone());
    item.set_opt("sdiCode", party.sdi_code.clone());
    item.set_opt("pec", party.pec.clone());
    item.set_opt("email", party.email.clone());
    item.set_opt("phone", party.phone.clone());
    item.set_opt("fax", party.fax.clone());
    item.set_opt("website", party.website.clone());
    item.set_opt("address", party.address.clone());
    item.set_opt("poBox", party.po_box.clone());
    item.set_opt("city", party.city.clone());
    item.set_opt("province", party.province.clone());
    item.set_opt("postalCode", party.postal_code.clone());
    item.set_opt("country", party.country.clone());
    item.set_opt("mainContact", party.main_contact.clone());
    item.set_opt("notes", party.notes.clone());
    item.set("status", status.name());

    item.set(GSI1.0, status_key(status.name()));
    if let Some(country) = party.country.as_deref().filter(|c| !c.trim().is_empty()) {
        item.set(GSI2.0, country_key(country));
    }
    item.set(GSI3.0, type_key(entity));
    if let Some(name) = company_name {
        item.set(GSI1.1, name);
        if item.contains(GSI2.0) {
            item.set(GSI2.1, name);
        }
        item.set(GSI3.1, name);
    }

    set_audit(&mut item, party.created_at.as_deref(), party.updated_at.as_deref(), options);
    item.set("sourceId", party.source_id.as_str());
    item
}

/// Audit attributes shared by every item kind
pub(super) fn set_audit(
    item: &mut TargetItem,
    created_at: Option<&str>,
    updated_at: Option<&str>,
    options: &TransformOptions,
) {
    let created = created_at.unwrap_or(&options.run_timestamp);
    let updated = updated_at.unwrap_or(created);
    item.set("createdAt", created);
    item.set("updatedAt", updated);
    item.set("createdBy", options.migration_user.as_str());
    item.set("updatedBy", options.migration_user.as_str());
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn options() -> TransformOptions {
        TransformOptions {
            migration_user: "migration".to_string(),
            default_tax_rate: 22.0,
            run_timestamp: "2024-06-01T00:00:00Z".to_string(),
        }
    }

    fn buyer() -> CanonicalBuyer {
        CanonicalBuyer {
            party: PartyFields {
                source_id: "42".to_string(),
                name: Some("Rossi Srl".to_string()),
                vat_number: Some("IT01234567890".to_string()),
                city: Some("Milano".to_string()),
                country: Some("IT".to_string()),
                phone: Some(String::new()),
                status: Some("online".to_string()),
                ..Default::default()
            },
            currency: Some("EUR".to_string()),
            vat_exempt: Some(false),
            ..Default::default()
        }
    }

    #[test]
    fn test_buyer_keys_and_indexes() {
        let item = transform_buyer(&buyer(), "b-0001", &options());

        assert_eq!(item.pk(), Some("BUYER#b-0001"));
        assert_eq!(item.sk(), Some("METADATA"));
        assert_eq!(item.get_str("entityType"), Some("BUYER"));
        assert_eq!(item.get_str("buyerId"), Some("b-0001"));
        assert_eq!(item.get_str("GSI1PK"), Some("STATUS#active"));
        assert_eq!(item.get_str("GSI1SK"), Some("Rossi Srl"));
        assert_eq!(item.get_str("GSI2PK"), Some("COUNTRY#IT"));
        assert_eq!(item.get_str("GSI3PK"), Some("BUYER"));
        assert_eq!(item.get_str("GSI3SK"), Some("Rossi Srl"));
        assert_eq!(item.get_str("sourceId"), Some("42"));
    }

    #[test]
    fn test_buyer_prunes_empty_and_audits() {
        let item = transform_buyer(&buyer(), "b-0001", &options());

        assert!(!item.contains("phone"));
        assert!(!item.contains("fax"));
        assert_eq!(item.get("vatExempt"), Some(&json!(false)));
        assert_eq!(item.get_str("createdAt"), Some("2024-06-01T00:00:00Z"));
        assert_eq!(item.get_str("updatedAt"), Some("2024-06-01T00:00:00Z"));
        assert_eq!(item.get_str("createdBy"), Some("migration"));
        assert_eq!(item.get_str("updatedBy"), Some("migration"));
    }

    #[test]
    fn test_producer_inactive_without_name() {
        let producer = CanonicalProducer {
            party: PartyFields {
                source_id: "7".to_string(),
                status: Some("offline".to_string()),
                created_at: Some("2020-01-01T10:00:00Z".to_string()),
                ..Default::default()
            },
            revenue_percentage: Some(12.5),
            ..Default::default()
        };
        let item = transform_producer(&producer, "p-0001", &options());

        assert_eq!(item.pk(), Some("PRODUCER#p-0001"));
        assert_eq!(item.get_str("status"), Some("inactive"));
        assert_eq!(item.get_str("GSI1PK"), Some("STATUS#inactive"));
        assert!(!item.contains("companyName"));
        assert!(!item.contains("GSI1SK"));
        assert!(!item.contains("GSI2PK"));
        assert_eq!(item.get_f64("revenuePercentage"), Some(12.5));
        assert_eq!(item.get_str("createdAt"), Some("2020-01-01T10:00:00Z"));
        assert_eq!(item.get_str("updatedAt"), Some("2020-01-01T10:00:00Z"));
    }
}
