//! # Receipt Translations
//!
//! Fixed label tables for English, Sinhala and Tamil receipts.
//!
//! Every [`ReceiptLabel`] has text in every [`Language`]; the match in
//! [`translate`] is exhaustive so a missing translation is a compile error.

use serde::{Deserialize, Serialize};
use ts_rs::TS;

use crate::types::{OrderType, PaymentMethod, SaleStatus};

/// Receipt language.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize, TS)]
#[ts(export)]
#[serde(rename_all = "lowercase")]
pub enum Language {
    #[default]
    En,
    Si,
    Ta,
}

impl Language {
    pub const ALL: [Language; 3] = [Language::En, Language::Si, Language::Ta];

    /// ISO 639-1 code, also used as the HTML `lang` attribute.
    pub fn code(&self) -> &'static str {
        match self {
            Language::En => "en",
            Language::Si => "si",
            Language::Ta => "ta",
        }
    }

    /// Name of the language written in that language.
    pub fn native_name(&self) -> &'static str {
        match self {
            Language::En => "English",
            Language::Si => "සිංහල",
            Language::Ta => "தமிழ்",
        }
    }

    /// Parses a language code, falling back to English for anything unknown.
    pub fn from_code(code: &str) -> Language {
        match code.trim().to_lowercase().as_str() {
            "si" | "sin" | "sinhala" => Language::Si,
            "ta" | "tam" | "tamil" => Language::Ta,
            _ => Language::En,
        }
    }
}

/// Every fixed string printed on a receipt.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ReceiptLabel {
    Receipt,
    ReceiptNumber,
    Date,
    Cashier,
    Table,
    OrderType,
    Customer,
    Item,
    Qty,
    Amount,
    Subtotal,
    Discount,
    ServiceCharge,
    Vat,
    Total,
    Paid,
    Change,
    BalanceDue,
    VatRegNo,
    Tel,
    ThankYou,
    Void,
    Refunded,
}

impl ReceiptLabel {
    pub const ALL: [ReceiptLabel; 23] = [
        ReceiptLabel::Receipt,
        ReceiptLabel::ReceiptNumber,
        ReceiptLabel::Date,
        ReceiptLabel::Cashier,
        ReceiptLabel::Table,
        ReceiptLabel::OrderType,
        ReceiptLabel::Customer,
        ReceiptLabel::Item,
        ReceiptLabel::Qty,
        ReceiptLabel::Amount,
        ReceiptLabel::Subtotal,
        ReceiptLabel::Discount,
        ReceiptLabel::ServiceCharge,
        ReceiptLabel::Vat,
        ReceiptLabel::Total,
        ReceiptLabel::Paid,
        ReceiptLabel::Change,
        ReceiptLabel::BalanceDue,
        ReceiptLabel::VatRegNo,
        ReceiptLabel::Tel,
        ReceiptLabel::ThankYou,
        ReceiptLabel::Void,
        ReceiptLabel::Refunded,
    ];
}

/// Returns the text for a label in a language.
pub fn translate(label: ReceiptLabel, lang: Language) -> &'static str {
    use Language::*;
    use ReceiptLabel::*;

    match (label, lang) {
        (Receipt, En) => "Receipt",
        (Receipt, Si) => "රිසිට්පත",
        (Receipt, Ta) => "ரசீது",

        (ReceiptNumber, En) => "Receipt No",
        (ReceiptNumber, Si) => "රිසිට්පත් අංකය",
        (ReceiptNumber, Ta) => "ரசீது எண்",

        (Date, En) => "Date",
        (Date, Si) => "දිනය",
        (Date, Ta) => "தேதி",

        (Cashier, En) => "Cashier",
        (Cashier, Si) => "මුදල් අයකැමි",
        (Cashier, Ta) => "காசாளர்",

        (Table, En) => "Table",
        (Table, Si) => "මේසය",
        (Table, Ta) => "மேசை",

        (OrderType, En) => "Order Type",
        (OrderType, Si) => "ඇණවුම් වර්ගය",
        (OrderType, Ta) => "ஆர்டர் வகை",

        (Customer, En) => "Customer",
        (Customer, Si) => "පාරිභෝගිකයා",
        (Customer, Ta) => "வாடிக்கையாளர்",

        (Item, En) => "Item",
        (Item, Si) => "අයිතමය",
        (Item, Ta) => "பொருள்",

        (Qty, En) => "Qty",
        (Qty, Si) => "ප්‍රමාණය",
        (Qty, Ta) => "அளவு",

        (Amount, En) => "Amount",
        (Amount, Si) => "මුදල",
        (Amount, Ta) => "தொகை",

        (Subtotal, En) => "Subtotal",
        (Subtotal, Si) => "උප එකතුව",
        (Subtotal, Ta) => "துணை மொத்தம்",

        (Discount, En) => "Discount",
        (Discount, Si) => "වට්ටම",
        (Discount, Ta) => "தள்ளுபடி",

        (ServiceCharge, En) => "Service Charge",
        (ServiceCharge, Si) => "සේවා ගාස්තුව",
        (ServiceCharge, Ta) => "சேவைக் கட்டணம்",

        (Vat, En) => "VAT",
        (Vat, Si) => "වැට්",
        (Vat, Ta) => "வற்",

        (Total, En) => "Total",
        (Total, Si) => "මුළු එකතුව",
        (Total, Ta) => "மொத்தம்",

        (Paid, En) => "Paid",
        (Paid, Si) => "ගෙවූ මුදල",
        (Paid, Ta) => "செலுத்தியது",

        (Change, En) => "Change",
        (Change, Si) => "ඉතිරි මුදල",
        (Change, Ta) => "மீதி",

        (BalanceDue, En) => "Balance Due",
        (BalanceDue, Si) => "ගෙවිය යුතු ශේෂය",
        (BalanceDue, Ta) => "செலுத்த வேண்டியது",

        (VatRegNo, En) => "VAT Reg. No",
        (VatRegNo, Si) => "වැට් ලියාපදිංචි අංකය",
        (VatRegNo, Ta) => "வற் பதிவு எண்",

        (Tel, En) => "Tel",
        (Tel, Si) => "දුරකථන",
        (Tel, Ta) => "தொலைபேசி",

        (ThankYou, En) => "Thank you! Please come again.",
        (ThankYou, Si) => "ස්තූතියි! නැවත එන්න.",
        (ThankYou, Ta) => "நன்றி! மீண்டும் வருக.",

        (Void, En) => "VOID",
        (Void, Si) => "අවලංගුයි",
        (Void, Ta) => "ரத்து",

        (Refunded, En) => "REFUNDED",
        (Refunded, Si) => "මුදල් ආපසු ගෙවා ඇත",
        (Refunded, Ta) => "பணம் திருப்பி வழங்கப்பட்டது",
    }
}

pub fn payment_method_name(method: PaymentMethod, lang: Language) -> &'static str {
    match (method, lang) {
        (PaymentMethod::Cash, Language::En) => "Cash",
        (PaymentMethod::Cash, Language::Si) => "මුදල්",
        (PaymentMethod::Cash, Language::Ta) => "பணம்",
        (PaymentMethod::Card, Language::En) => "Card",
        (PaymentMethod::Card, Language::Si) => "කාඩ්පත",
        (PaymentMethod::Card, Language::Ta) => "அட்டை",
        (PaymentMethod::MobileWallet, Language::En) => "Mobile Wallet",
        (PaymentMethod::MobileWallet, Language::Si) => "ජංගම පසුම්බිය",
        (PaymentMethod::MobileWallet, Language::Ta) => "மொபைல் வாலட்",
    }
}

pub fn order_type_name(order_type: OrderType, lang: Language) -> &'static str {
    match (order_type, lang) {
        (OrderType::DineIn, Language::En) => "Dine In",
        (OrderType::DineIn, Language::Si) => "ආපනශාලාවේදී",
        (OrderType::DineIn, Language::Ta) => "உணவகத்தில்",
        (OrderType::Takeaway, Language::En) => "Takeaway",
        (OrderType::Takeaway, Language::Si) => "රැගෙන යාම",
        (OrderType::Takeaway, Language::Ta) => "எடுத்துச் செல்ல",
        (OrderType::Delivery, Language::En) => "Delivery",
        (OrderType::Delivery, Language::Si) => "බෙදාහැරීම",
        (OrderType::Delivery, Language::Ta) => "விநியோகம்",
    }
}

/// Banner printed across voided / refunded receipts.
pub fn status_banner(status: SaleStatus, lang: Language) -> Option<&'static str> {
    match status {
        SaleStatus::Voided => Some(translate(ReceiptLabel::Void, lang)),
        SaleStatus::Refunded => Some(translate(ReceiptLabel::Refunded, lang)),
        SaleStatus::Open | SaleStatus::Completed => None,
    }
}

/// Columns a string occupies on a thermal printer.
///
/// Sinhala and Tamil vowel signs, viramas and joiners combine with the
/// preceding consonant and take no column of their own.
pub fn display_width(s: &str) -> usize {
    s.chars().filter(|c| !is_combining(*c)).count()
}

fn is_combining(c: char) -> bool {
    matches!(
        c as u32,
        0x200C..=0x200D          // ZWNJ, ZWJ
        | 0x0D81..=0x0D83        // Sinhala signs
        | 0x0DCA..=0x0DDF        // Sinhala al-lakuna, vowel signs
        | 0x0DF2..=0x0DF3
        | 0x0B82                 // Tamil anusvara
        | 0x0BBE..=0x0BCD        // Tamil vowel signs, virama
        | 0x0BD7
    )
}
