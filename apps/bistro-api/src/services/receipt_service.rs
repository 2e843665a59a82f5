//! Receipt rendering for stored sales.

use serde::Deserialize;

use bistro_core::i18n::Language;
use bistro_core::receipt::{
    render_html, render_text, ReceiptDocument, MAX_RECEIPT_WIDTH, MIN_RECEIPT_WIDTH,
};
use bistro_core::validation::validate_language_code;

use crate::error::{ApiError, ApiResult};
use crate::state::AppState;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ReceiptFormat {
    #[default]
    Text,
    Html,
    Json,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct ReceiptQuery {
    pub lang: Option<String>,
    #[serde(default)]
    pub format: ReceiptFormat,
    pub width: Option<usize>,
}

/// A rendered receipt, ready to be written to the response.
#[derive(Debug, Clone)]
pub enum RenderedReceipt {
    Text(String),
    Html(String),
    Json(ReceiptDocument),
}

pub struct ReceiptService<'a> {
    state: &'a AppState,
}

impl<'a> ReceiptService<'a> {
    pub fn new(state: &'a AppState) -> Self {
        ReceiptService { state }
    }

    pub async fn document(&self, sale_id: &str, lang: Option<&str>) -> ApiResult<ReceiptDocument> {
        let language = match lang {
            Some(code) => {
                validate_language_code(code)?;
                Language::from_code(code)
            }
            None => self.state.config.store.language(),
        };

        let db = &self.state.db;
        let sale = db
            .sales()
            .get_by_id(sale_id)
            .await?
            .ok_or_else(|| ApiError::not_found("Sale", sale_id))?;
        let items = db.sales().items(sale_id).await?;
        let payments = db.payments().transactions_for_sale(sale_id).await?;
        let vat_registration = db.vat().active().await?.and_then(|s| s.registration_number);

        let store = self.state.config.store.store_info(vat_registration);
        Ok(ReceiptDocument::build(store, &sale, &items, &payments, language))
    }

    pub async fn render(&self, sale_id: &str, query: &ReceiptQuery) -> ApiResult<RenderedReceipt> {
        let doc = self.document(sale_id, query.lang.as_deref()).await?;
        let width = query.width.unwrap_or(self.state.config.store.receipt_width);
        if !(MIN_RECEIPT_WIDTH..=MAX_RECEIPT_WIDTH).contains(&width) {
            return Err(ApiError::validation(format!(
                "width must be between {MIN_RECEIPT_WIDTH} and {MAX_RECEIPT_WIDTH}"
            )));
        }

        Ok(match query.format {
            ReceiptFormat::Text => RenderedReceipt::Text(render_text(&doc, width)),
            ReceiptFormat::Html => RenderedReceipt::Html(render_html(&doc)),
            ReceiptFormat::Json => RenderedReceipt::Json(doc),
        })
    }
}
