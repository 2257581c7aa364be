//! Field resolution tables
//!
//! The legacy schema changed column names over the years, so each canonical
//! field lists the columns it may come from, in order of preference.
//! [`resolve_field`] picks the first candidate holding a usable value, coerces
//! it to the field's kind, and falls back to the declared default.

use serde_json::{Map, Value};

use super::source::Row;
use crate::dates::{date_from_packed, format_date, format_timestamp, parse_date, parse_datetime};
use crate::error::FieldError;

/// How a source value is interpreted
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldKind {
    /// Identifier; integral numbers are rendered without a fraction
    Id,
    Text,
    Number,
    Integer,
    Bool,
    /// `YYYY-MM-DD`
    Date,
    /// ISO-8601 UTC timestamp
    Timestamp,
}

impl FieldKind {
    fn expected(&self) -> &'static str {
        match self {
            Self::Id => "an identifier",
            Self::Text => "text",
            Self::Number => "a number",
            Self::Integer => "an integer",
            Self::Bool => "a boolean",
            Self::Date => "a date",
            Self::Timestamp => "a timestamp",
        }
    }
}

/// Value used when no candidate column holds one
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum FieldDefault {
    Text(&'static str),
    Number(f64),
    Integer(i64),
    Bool(bool),
}

impl FieldDefault {
    fn to_value(self) -> Value {
        match self {
            Self::Text(s) => Value::String(s.to_string()),
            Self::Number(n) => Value::from(n),
            Self::Integer(n) => Value::from(n),
            Self::Bool(b) => Value::Bool(b),
        }
    }
}

/// Canonical field with its ordered candidate columns
#[derive(Debug, Clone, Copy)]
pub struct FieldSpec {
    pub name: &'static str,
    pub candidates: &'static [&'static str],
    pub kind: FieldKind,
    pub default: Option<FieldDefault>,
}

const fn field(name: &'static str, candidates: &'static [&'static str], kind: FieldKind) -> FieldSpec {
    FieldSpec {
        name,
        candidates,
        kind,
        default: None,
    }
}

const fn with_default(spec: FieldSpec, default: FieldDefault) -> FieldSpec {
    FieldSpec {
        default: Some(default),
        ..spec
    }
}

use FieldKind::{Bool, Date, Id, Integer, Number, Text, Timestamp};

/// Identifier of the origin row
///
/// `first_id` is the identifier other tables refer to; the row's own `id`
/// only stands in when it is absent.
pub const SOURCE_ID: FieldSpec = field("source_id", &["first_id", "id"], Id);

pub const PARTY_FIELDS: &[FieldSpec] = &[
    SOURCE_ID,
    field("code", &["code", "codice", "first_id"], Text),
    field("name", &["name", "ragione_sociale", "company_name"], Text),
    field("sub_name", &["sub_name", "indirizzo2"], Text),
    field("vat_number", &["vat_number", "piva", "partita_iva"], Text),
    field("fiscal_code", &["fiscal_code", "cod_fiscale", "codice_fiscale"], Text),
    field("sdi_code", &["sdi_code", "sdi", "codice_sdi"], Text),
    field("pec", &["pec", "email_pec"], Text),
    field("email", &["email", "mail"], Text),
    field("phone", &["phone", "telefono", "tel"], Text),
    field("fax", &["fax"], Text),
    field("website", &["website", "sito_web", "web"], Text),
    field("address", &["address", "indirizzo"], Text),
    field("po_box", &["po_box", "casella_postale"], Text),
    field("city", &["city", "citta", "comune"], Text),
    field("province", &["province", "provincia"], Text),
    field("postal_code", &["postal_code", "cap", "zip"], Text),
    with_default(field("country", &["country", "nazione"], Text), FieldDefault::Text("IT")),
    field("main_contact", &["main_contact", "referente"], Text),
    field("notes", &["notes", "note"], Text),
    field("status", &["status", "stato"], Text),
    with_default(field("enabled", &["enabled", "attivo"], Bool), FieldDefault::Bool(true)),
    field("created_at", &["created_at", "data_creazione"], Timestamp),
    field("updated_at", &["updated_at", "data_modifica"], Timestamp),
];

pub const BUYER_FIELDS: &[FieldSpec] = &[
    field("payment_method", &["payment_method", "pagamento"], Text),
    field("payment_terms", &["payment_terms", "condizioni_pagamento"], Text),
    field("bank_details", &["bank_details", "banca"], Text),
    with_default(field("currency", &["currency", "valuta"], Text), FieldDefault::Text("EUR")),
    with_default(
        field("preferred_language", &["preferred_language", "lingua"], Text),
        FieldDefault::Text("it"),
    ),
    field("vat_exempt", &["vat_exempt", "esenzione_iva"], Bool),
    field("industrial_group", &["industrial_group", "gruppo"], Text),
    field("sector", &["sector", "settore"], Text),
    field("default_operator", &["default_operator", "operatore"], Text),
];

pub const PRODUCER_FIELDS: &[FieldSpec] = &[
    field("revenue_percentage", &["revenue_percentage", "percentuale"], Number),
    field("quality_assurance", &["quality_assurance", "certificazioni"], Text),
    field("production_area", &["production_area", "area_produzione"], Text),
    field("markets", &["markets", "mercati"], Text),
    field("materials", &["materials", "materiali"], Text),
    field("products", &["products", "prodotti"], Text),
    field("payment_terms", &["payment_terms", "condizioni_pagamento"], Text),
    with_default(field("currency", &["currency", "valuta"], Text), FieldDefault::Text("EUR")),
];

pub const SALE_FIELDS: &[FieldSpec] = &[
    SOURCE_ID,
    field("sale_number", &["sale_number", "numero", "num"], Integer),
    field("reg_number", &["reg_number", "numero_reg"], Text),
    with_default(field("doc_type", &["doc_type", "tipo_doc"], Text), FieldDefault::Text("invoice")),
    field("sale_date", &["sale_date", "data", "reg_date"], Date),
    field("buyer_id", &["buyer_id", "cliente_id", "anag_id"], Id),
    field("buyer_name", &["buyer_name", "cliente", "ragione_sociale_cliente"], Text),
    field("producer_id", &["producer_id", "fornitore_id"], Id),
    field("producer_name", &["producer_name", "fornitore"], Text),
    field("subtotal", &["subtotal", "imponibile"], Number),
    field("discount_amount", &["discount_amount", "sconto", "importo_sconto"], Number),
    field("tax_amount", &["tax_amount", "iva"], Number),
    field("total", &["total", "totale"], Number),
    field("vat_rate", &["iva_percentage", "aliquota_iva", "vat_rate"], Number),
    field("vat_exempt", &["vat_off", "esente_iva"], Bool),
    with_default(field("currency", &["currency", "valuta"], Text), FieldDefault::Text("EUR")),
    field("payment_method", &["payment_method", "pagamento"], Text),
    field("payment_terms", &["payment_terms", "condizioni_pagamento"], Text),
    field("payment_date", &["payment_date", "data_pagamento"], Date),
    field("payment_note", &["payment_note", "nota_pagamento"], Text),
    field("bank", &["bank", "banca"], Text),
    field("co_bank_description", &["co_bank_description", "banca_co"], Text),
    field("co_bank_iban", &["co_bank_iban", "iban_co"], Text),
    field("delivery_method", &["delivery_method", "spedizione"], Text),
    field("delivery_date", &["delivery_date", "data_consegna"], Date),
    field("delivery_note", &["delivery_note", "note_consegna"], Text),
    field("reference_number", &["reference_number", "riferimento"], Text),
    field("po_number", &["po_number", "numero_ordine"], Text),
    field("po_date", &["po_date", "data_ordine"], Date),
    field("printed_note", &["printed_note", "nota_stampa"], Text),
    field("package", &["package", "imballo"], Text),
    field("dn_number", &["dn_number", "ddt_numero"], Text),
    field("dn_date", &["dn_date"], Date),
    field("dn_number2", &["dn_number2", "ddt_numero2"], Text),
    field("dn_date2", &["dn_date2"], Date),
    field("dn_number3", &["dn_number3", "ddt_numero3"], Text),
    field("dn_date3", &["dn_date3"], Date),
    field("cup_code", &["pa_cup_number", "cup"], Text),
    field("cig_code", &["pa_cig_number", "cig"], Text),
    field("notes", &["notes", "note"], Text),
    field("internal_notes", &["internal_notes", "note_interne"], Text),
    field("status", &["status", "stato"], Text),
    field("invoice_generated", &["invoice_generated", "fattura_generata"], Bool),
    field("invoice_number", &["invoice_number", "numero_fattura"], Text),
    field("number_t", &["number_t", "numero_t"], Text),
    field("year", &["year", "anno"], Integer),
    field("created_at", &["created_at", "data_creazione"], Timestamp),
    field("updated_at", &["updated_at", "data_modifica"], Timestamp),
];

/// Line number column; missing values fall back to the line's position
pub const LINE_NUMBER: FieldSpec = field("line_number", &["line_number", "riga", "numero_riga"], Integer);

pub const SALE_LINE_FIELDS: &[FieldSpec] = &[
    SOURCE_ID,
    LINE_NUMBER,
    field("product_code", &["product_code", "codice", "codice_articolo"], Text),
    field("product_description", &["product_description", "descrizione"], Text),
    with_default(field("quantity", &["quantity", "quantita", "qta"], Number), FieldDefault::Number(1.0)),
    with_default(field("unit_price", &["unit_price", "prezzo"], Number), FieldDefault::Number(0.0)),
    with_default(field("discount", &["discount", "sconto"], Number), FieldDefault::Number(0.0)),
    field("discount_amount", &["discount_amount", "importo_sconto"], Number),
    field("net_amount", &["net_amount", "imponibile"], Number),
    field("tax_rate", &["tax_rate", "aliquota_iva"], Number),
    field("tax_amount", &["tax_amount", "iva"], Number),
    field("total_amount", &["total_amount", "totale"], Number),
    field("unit_of_measure", &["unit_of_measure", "um"], Text),
    field("notes", &["notes", "note"], Text),
    field("created_at", &["created_at", "data_creazione"], Timestamp),
    field("updated_at", &["updated_at", "data_modifica"], Timestamp),
];

/// First candidate column holding a usable value, with its name
///
/// Null values and blank strings count as absent.
pub fn first_present<'r>(row: &'r Row, candidates: &[&'static str]) -> Option<(&'static str, &'r Value)> {
    candidates.iter().find_map(|column| match row.get(*column) {
        None | Some(Value::Null) => None,
        Some(Value::String(s)) if s.trim().is_empty() => None,
        Some(value) => Some((*column, value)),
    })
}

/// Resolve one canonical field from a row
///
/// Returns `Ok(None)` when no candidate holds a value and the field has no
/// default.
pub fn resolve_field(row: &Row, spec: &FieldSpec) -> Result<Option<Value>, FieldError> {
    match first_present(row, spec.candidates) {
        Some((column, value)) => coerce(value, spec.kind)
            .map(Some)
            .ok_or_else(|| FieldError {
                field: spec.name,
                column,
                value: value.to_string(),
                expected: spec.kind.expected(),
            }),
        None => Ok(spec.default.map(FieldDefault::to_value)),
    }
}

/// Resolve a list of fields into a canonical field map
pub fn resolve_fields(row: &Row, specs: &[FieldSpec], into: &mut Map<String, Value>) -> Result<(), FieldError> {
    for spec in specs {
        if let Some(value) = resolve_field(row, spec)? {
            into.insert(spec.name.to_string(), value);
        }
    }
    Ok(())
}

fn coerce(value: &Value, kind: FieldKind) -> Option<Value> {
    match kind {
        FieldKind::Id => identifier(value).map(Value::String),
        FieldKind::Text => match value {
            Value::String(s) => Some(Value::String(s.trim().to_string())),
            Value::Number(n) => Some(Value::String(n.to_string())),
            Value::Bool(b) => Some(Value::String(b.to_string())),
            _ => None,
        },
        FieldKind::Number => number(value).map(Value::from),
        FieldKind::Integer => integer(value).map(Value::from),
        FieldKind::Bool => boolean(value).map(Value::Bool),
        FieldKind::Date => date(value).map(Value::String),
        FieldKind::Timestamp => match value {
            Value::String(s) => parse_datetime(s).map(|ts| Value::String(format_timestamp(ts))),
            _ => None,
        },
    }
}

fn identifier(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => Some(s.trim().to_string()),
        Value::Number(n) => {
            if let Some(i) = n.as_i64() {
                Some(i.to_string())
            } else if let Some(u) = n.as_u64() {
                Some(u.to_string())
            } else {
                let f = n.as_f64()?;
                if f.fract() == 0.0 && f.abs() < 9.0e15 {
                    Some(format!("{}", f as i64))
                } else {
                    Some(n.to_string())
                }
            }
        }
        _ => None,
    }
}

fn number(value: &Value) -> Option<f64> {
    match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => {
            let s = s.trim();
            // Decimal comma, as written by Italian locales
            let normalized = if s.contains(',') && !s.contains('.') {
                s.replace(',', ".")
            } else {
                s.to_string()
            };
            normalized.parse::<f64>().ok().filter(|f| f.is_finite())
        }
        _ => None,
    }
}

fn integer(value: &Value) -> Option<i64> {
    match value {
        Value::Number(n) => n.as_i64().or_else(|| {
            let f = n.as_f64()?;
            (f.fract() == 0.0).then_some(f as i64)
        }),
        Value::String(s) => {
            let s = s.trim();
            s.parse::<i64>().ok().or_else(|| {
                let f = number(&Value::String(s.to_string()))?;
                (f.fract() == 0.0).then_some(f as i64)
            })
        }
        _ => None,
    }
}

fn boolean(value: &Value) -> Option<bool> {
    match value {
        Value::Bool(b) => Some(*b),
        Value::Number(n) => n.as_f64().map(|f| f != 0.0),
        Value::String(s) => match s.trim().to_lowercase().as_str() {
            "1" | "true" | "yes" | "y" | "si" | "s" | "t" => Some(true),
            "0" | "false" | "no" | "n" | "f" => Some(false),
            _ => None,
        },
        _ => None,
    }
}

fn date(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => parse_date(s).map(format_date),
        Value::Number(n) => n.as_i64().and_then(date_from_packed).map(format_date),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn row(value: Value) -> Row {
        value.as_object().cloned().unwrap()
    }

    #[test]
    fn test_first_candidate_wins() {
        let spec = field("vat_number", &["vat_number", "piva"], Text);
        let r = row(json!({"vat_number": "IT111", "piva": "IT222"}));
        assert_eq!(resolve_field(&r, &spec).unwrap(), Some(json!("IT111")));
    }

    #[test]
    fn test_null_and_blank_fall_through() {
        let spec = field("vat_number", &["vat_number", "piva", "vat"], Text);
        let r = row(json!({"vat_number": null, "piva": "   ", "vat": "IT333"}));
        assert_eq!(resolve_field(&r, &spec).unwrap(), Some(json!("IT333")));
    }

    #[test]
    fn test_default_applies_when_absent() {
        let spec = with_default(field("country", &["country", "nazione"], Text), FieldDefault::Text("IT"));
        assert_eq!(resolve_field(&row(json!({})), &spec).unwrap(), Some(json!("IT")));
        assert_eq!(
            resolve_field(&row(json!({"nazione": "FR"})), &spec).unwrap(),
            Some(json!("FR"))
        );
    }

    #[test]
    fn test_absent_without_default() {
        let spec = field("fax", &["fax"], Text);
        assert_eq!(resolve_field(&row(json!({"fax": null})), &spec).unwrap(), None);
    }

    #[test]
    fn test_numeric_zero_is_present() {
        let spec = with_default(field("quantity", &["quantity"], Number), FieldDefault::Number(1.0));
        assert_eq!(
            resolve_field(&row(json!({"quantity": 0})), &spec).unwrap(),
            Some(json!(0.0))
        );
    }

    #[test]
    fn test_number_coercion() {
        let spec = field("unit_price", &["unit_price"], Number);
        assert_eq!(
            resolve_field(&row(json!({"unit_price": "12,50"})), &spec).unwrap(),
            Some(json!(12.5))
        );
        assert_eq!(
            resolve_field(&row(json!({"unit_price": " 7.25 "})), &spec).unwrap(),
            Some(json!(7.25))
        );

        let err = resolve_field(&row(json!({"unit_price": "abc"})), &spec).unwrap_err();
        assert_eq!(err.field, "unit_price");
        assert_eq!(err.column, "unit_price");
        assert_eq!(err.expected, "a number");
    }

    #[test]
    fn test_identifier_coercion() {
        assert_eq!(
            resolve_field(&row(json!({"id": 42})), &SOURCE_ID).unwrap(),
            Some(json!("42"))
        );
        assert_eq!(
            resolve_field(&row(json!({"id": 42.0})), &SOURCE_ID).unwrap(),
            Some(json!("42"))
        );
        assert_eq!(
            resolve_field(&row(json!({"first_id": "B-9"})), &SOURCE_ID).unwrap(),
            Some(json!("B-9"))
        );
    }

    #[test]
    fn test_first_id_preferred_over_row_id() {
        let r = row(json!({"id": 7, "first_id": 5001}));
        assert_eq!(resolve_field(&r, &SOURCE_ID).unwrap(), Some(json!("5001")));
        assert_eq!(first_present(&r, SOURCE_ID.candidates), Some(("first_id", &json!(5001))));

        let r = row(json!({"id": 7, "first_id": null}));
        assert_eq!(resolve_field(&r, &SOURCE_ID).unwrap(), Some(json!("7")));
    }

    #[test]
    fn test_sale_document_fields_from_legacy_columns() {
        let mut map = Map::new();
        resolve_fields(
            &row(json!({
                "id": 12,
                "nota_stampa": "Fragile",
                "imballo": "Pallet",
                "ddt_numero": "DDT-1",
                "dn_date": "2024-02-01",
                "ddt_numero2": 77,
                "ddt_numero3": "DDT-3",
                "dn_date3": 20240210,
                "nota_pagamento": "30gg",
                "banca_co": "Banca Sella",
                "iban_co": "IT60X0542811101000000123456",
                "numero_t": "T-4"
            })),
            SALE_FIELDS,
            &mut map,
        )
        .unwrap();

        assert_eq!(map["printed_note"], json!("Fragile"));
        assert_eq!(map["package"], json!("Pallet"));
        assert_eq!(map["dn_number"], json!("DDT-1"));
        assert_eq!(map["dn_date"], json!("2024-02-01"));
        assert_eq!(map["dn_number2"], json!("77"));
        assert!(!map.contains_key("dn_date2"));
        assert_eq!(map["dn_number3"], json!("DDT-3"));
        assert_eq!(map["dn_date3"], json!("2024-02-10"));
        assert_eq!(map["payment_note"], json!("30gg"));
        assert_eq!(map["co_bank_description"], json!("Banca Sella"));
        assert_eq!(map["co_bank_iban"], json!("IT60X0542811101000000123456"));
        assert_eq!(map["number_t"], json!("T-4"));
    }

    #[test]
    fn test_bool_coercion() {
        let spec = field("enabled", &["enabled"], Bool);
        assert_eq!(resolve_field(&row(json!({"enabled": 1})), &spec).unwrap(), Some(json!(true)));
        assert_eq!(resolve_field(&row(json!({"enabled": "no"})), &spec).unwrap(), Some(json!(false)));
        assert!(resolve_field(&row(json!({"enabled": "maybe"})), &spec).is_err());
    }

    #[test]
    fn test_date_coercion() {
        let spec = field("sale_date", &["sale_date", "reg_date"], Date);
        assert_eq!(
            resolve_field(&row(json!({"sale_date": "2024-01-05 10:00:00"})), &spec).unwrap(),
            Some(json!("2024-01-05"))
        );
        assert_eq!(
            resolve_field(&row(json!({"reg_date": 20240105})), &spec).unwrap(),
            Some(json!("2024-01-05"))
        );
    }

    #[test]
    fn test_timestamp_coercion() {
        let spec = field("created_at", &["created_at"], Timestamp);
        assert_eq!(
            resolve_field(&row(json!({"created_at": "2023-06-01 08:15:00"})), &spec).unwrap(),
            Some(json!("2023-06-01T08:15:00Z"))
        );
    }

    #[test]
    fn test_resolve_fields_omits_absent() {
        let mut map = Map::new();
        resolve_fields(
            &row(json!({"id": 3, "ragione_sociale": "Rossi Srl", "fax": ""})),
            PARTY_FIELDS,
            &mut map,
        )
        .unwrap();

        assert_eq!(map["source_id"], json!("3"));
        assert_eq!(map["name"], json!("Rossi Srl"));
        assert_eq!(map["country"], json!("IT"));
        assert_eq!(map["enabled"], json!(true));
        assert!(!map.contains_key("fax"));
        assert!(!map.contains_key("vat_number"));
    }

    #[test]
    fn test_field_names_unique_per_table() {
        for table in [PARTY_FIELDS, BUYER_FIELDS, PRODUCER_FIELDS, SALE_FIELDS, SALE_LINE_FIELDS] {
            let mut names: Vec<_> = table.iter().map(|spec| spec.name).collect();
            names.sort();
            let before = names.len();
            names.dedup();
            assert_eq!(before, names.len());
        }
    }
}
