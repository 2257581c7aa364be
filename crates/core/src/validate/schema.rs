//! Declarative item schemas
//!
//! One [`ItemSchema`] per item kind lists the attributes the validator checks.
//! Keeping the rules as data lets every kind share the same checking code.

/// Expected shape of a key attribute
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeyRule {
    Prefix(&'static str),
    Exact(&'static str),
}

impl KeyRule {
    pub fn matches(&self, value: &str) -> bool {
        match self {
            Self::Prefix(prefix) => value.starts_with(prefix) && value.len() > prefix.len(),
            Self::Exact(expected) => value == *expected,
        }
    }

    pub fn describe(&self) -> String {
        match self {
            Self::Prefix(prefix) => format!("start with '{prefix}'"),
            Self::Exact(expected) => format!("equal '{expected}'"),
        }
    }
}

/// Rules for one item kind
#[derive(Debug, Clone, Copy)]
pub struct ItemSchema {
    /// Used in messages (`Sale <id>: ...`)
    pub label: &'static str,
    /// Attribute identifying the record in messages
    pub id_attribute: &'static str,
    pub required: &'static [&'static str],
    pub pk: KeyRule,
    pub sk: KeyRule,
    /// Allowed status values; empty when the kind has no status
    pub statuses: &'static [&'static str],
    /// Numbers that must not be negative
    pub non_negative: &'static [&'static str],
    /// Numbers that may be negative
    pub numeric: &'static [&'static str],
    pub dates: &'static [&'static str],
    /// Secondary index partition keys, checked when present
    pub index_keys: &'static [(&'static str, KeyRule)],
}

const AUDIT_DATES: &[&str] = &["createdAt", "updatedAt"];

pub const BUYER: ItemSchema = ItemSchema {
    label: "Buyer",
    id_attribute: "buyerId",
    required: &[
        "PK", "SK", "entityType", "buyerId", "companyName", "status", "createdAt", "updatedAt",
        "createdBy", "updatedBy", "GSI1PK", "GSI1SK", "GSI3PK",
    ],
    pk: KeyRule::Prefix("BUYER#"),
    sk: KeyRule::Exact("METADATA"),
    statuses: crate::transform::PartyStatus::NAMES,
    non_negative: &["totalSales", "totalRevenue"],
    numeric: &[],
    dates: AUDIT_DATES,
    index_keys: &[
        ("GSI1PK", KeyRule::Prefix("STATUS#")),
        ("GSI2PK", KeyRule::Prefix("COUNTRY#")),
        ("GSI3PK", KeyRule::Exact("BUYER")),
    ],
};

pub const PRODUCER: ItemSchema = ItemSchema {
    label: "Producer",
    id_attribute: "producerId",
    required: &[
        "PK", "SK", "entityType", "producerId", "companyName", "status", "createdAt", "updatedAt",
        "createdBy", "updatedBy", "GSI1PK", "GSI1SK", "GSI3PK",
    ],
    pk: KeyRule::Prefix("PRODUCER#"),
    sk: KeyRule::Exact("METADATA"),
    statuses: crate::transform::PartyStatus::NAMES,
    non_negative: &["totalSales", "revenuePercentage"],
    numeric: &[],
    dates: AUDIT_DATES,
    index_keys: &[
        ("GSI1PK", KeyRule::Prefix("STATUS#")),
        ("GSI2PK", KeyRule::Prefix("COUNTRY#")),
        ("GSI3PK", KeyRule::Exact("PRODUCER")),
    ],
};

pub const SALE: ItemSchema = ItemSchema {
    label: "Sale",
    id_attribute: "saleId",
    required: &[
        "PK", "SK", "entityType", "saleId", "saleDate", "status", "createdAt", "updatedAt",
        "createdBy", "updatedBy", "GSI1PK", "GSI1SK", "GSI4PK", "GSI4SK",
    ],
    pk: KeyRule::Prefix("SALE#"),
    sk: KeyRule::Exact("METADATA"),
    statuses: crate::transform::SaleStatus::NAMES,
    non_negative: &["subtotal", "discountAmount", "taxAmount", "total", "vatRate", "linesCount"],
    numeric: &["saleNumber", "year"],
    dates: &[
        "saleDate",
        "paymentDate",
        "deliveryDate",
        "poDate",
        "dnDate",
        "dnDate2",
        "dnDate3",
        "createdAt",
        "updatedAt",
    ],
    index_keys: &[
        ("GSI1PK", KeyRule::Prefix("STATUS#")),
        ("GSI2PK", KeyRule::Prefix("BUYER#")),
        ("GSI3PK", KeyRule::Prefix("PRODUCER#")),
        ("GSI4PK", KeyRule::Exact("SALE")),
    ],
};

pub const SALE_LINE: ItemSchema = ItemSchema {
    label: "Sale line",
    id_attribute: "lineId",
    required: &[
        "PK", "SK", "entityType", "saleId", "lineId", "lineNumber", "quantity", "unitPrice",
        "netAmount", "taxAmount", "totalAmount", "createdAt", "updatedAt", "createdBy",
        "updatedBy",
    ],
    pk: KeyRule::Prefix("SALE#"),
    sk: KeyRule::Prefix("LINE#"),
    statuses: &[],
    non_negative: &["unitPrice", "discount", "taxRate", "lineNumber"],
    // Credit notes carry negative quantities
    numeric: &["quantity", "discountAmount", "netAmount", "taxAmount", "totalAmount"],
    dates: AUDIT_DATES,
    index_keys: &[],
};
