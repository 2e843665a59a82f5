//! VAT settings management and bill previews.

use chrono::Utc;
use serde::{Deserialize, Serialize};
use tracing::info;

use bistro_core::validation::{validate_name, validate_optional_text, validate_quantity};
use bistro_core::vat::{
    compute_bill, find_preset, validate_settings, BillBreakdown, BillLine, VatConfig,
    DEFAULT_SERVICE_CHARGE_BPS,
};
use bistro_core::{Money, OrderType, TaxMode, ValidationError, VatSettings};
use bistro_db::new_id;

use crate::error::{ApiError, ApiResult};
use crate::state::AppState;

#[derive(Debug, Clone, Deserialize)]
pub struct VatSettingsRequest {
    pub name: String,
    /// Preset code; supplies the rate when `rate_bps` is omitted.
    pub preset: Option<String>,
    pub rate_bps: Option<i64>,
    #[serde(default)]
    pub mode: TaxMode,
    pub service_charge_bps: Option<i64>,
    #[serde(default = "default_true")]
    pub vat_on_service_charge: bool,
    pub registration_number: Option<String>,
}

fn default_true() -> bool {
    true
}

#[derive(Debug, Clone, Deserialize)]
pub struct PreviewLine {
    pub price_cents: i64,
    pub quantity: i64,
    #[serde(default = "default_true")]
    pub vat_applicable: bool,
}

#[derive(Debug, Clone, Deserialize)]
pub struct PreviewRequest {
    pub lines: Vec<PreviewLine>,
    #[serde(default)]
    pub discount_cents: i64,
    #[serde(default)]
    pub order_type: OrderType,
    /// Settings row to preview with; the active row when omitted.
    pub settings_id: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct PreviewResponse {
    pub settings_id: Option<String>,
    #[serde(flatten)]
    pub bill: BillBreakdown,
}

pub struct VatService<'a> {
    state: &'a AppState,
}

impl<'a> VatService<'a> {
    pub fn new(state: &'a AppState) -> Self {
        VatService { state }
    }

    /// Rules for a new bill: the active settings, or standard VAT when none
    /// are configured.
    pub async fn active_config(&self) -> ApiResult<(Option<VatSettings>, VatConfig)> {
        let active = self.state.db.vat().active().await?;
        let config = active
            .as_ref()
            .map(VatConfig::from)
            .unwrap_or_else(VatConfig::standard);
        Ok((active, config))
    }

    pub async fn create(&self, request: VatSettingsRequest) -> ApiResult<VatSettings> {
        let now = Utc::now();
        let mut settings = VatSettings {
            id: new_id(),
            name: String::new(),
            preset: None,
            rate_bps: 0,
            mode: TaxMode::Exclusive,
            service_charge_bps: 0,
            vat_on_service_charge: true,
            registration_number: None,
            is_active: false,
            created_at: now,
            updated_at: now,
        };
        apply_request(&mut settings, request)?;

        let created = self.state.db.vat().insert(&settings).await?;
        info!(id = %created.id, rate_bps = created.rate_bps, "VAT settings created");
        Ok(created)
    }

    pub async fn update(&self, id: &str, request: VatSettingsRequest) -> ApiResult<VatSettings> {
        let mut settings = self
            .state
            .db
            .vat()
            .get(id)
            .await?
            .ok_or_else(|| ApiError::not_found("VAT settings", id))?;
        apply_request(&mut settings, request)?;
        Ok(self.state.db.vat().update(&settings).await?)
    }

    pub async fn preview(&self, request: PreviewRequest) -> ApiResult<PreviewResponse> {
        if request.lines.is_empty() {
            return Err(ValidationError::required("lines").into());
        }

        let (settings_id, config) = match &request.settings_id {
            Some(id) => {
                let settings = self
                    .state
                    .db
                    .vat()
                    .get(id)
                    .await?
                    .ok_or_else(|| ApiError::not_found("VAT settings", id))?;
                (Some(settings.id.clone()), VatConfig::from(&settings))
            }
            None => {
                let (active, config) = self.active_config().await?;
                (active.map(|s| s.id), config)
            }
        };

        let mut lines = Vec::with_capacity(request.lines.len());
        for line in &request.lines {
            validate_quantity(line.quantity)?;
            if line.price_cents < 0 {
                return Err(ApiError::validation("price_cents must not be negative"));
            }
            lines.push(BillLine {
                line_total: Money::from_cents(line.price_cents) * line.quantity,
                vat_applicable: line.vat_applicable,
            });
        }

        let bill = compute_bill(
            &lines,
            Money::from_cents(request.discount_cents),
            &config.for_order(request.order_type),
        )?;

        Ok(PreviewResponse { settings_id, bill })
    }
}

fn apply_request(settings: &mut VatSettings, request: VatSettingsRequest) -> ApiResult<()> {
    validate_name("name", &request.name)?;
    validate_optional_text(
        "registration_number",
        request.registration_number.as_deref(),
        32,
    )?;

    let preset = match request.preset.as_deref() {
        Some(code) => Some(find_preset(code).ok_or_else(|| ValidationError::NotAllowed {
            field: "preset".to_string(),
            allowed: bistro_core::vat::VAT_PRESETS
                .iter()
                .map(|p| p.code.to_string())
                .collect(),
        })?),
        None => None,
    };

    let rate_bps = match (request.rate_bps, preset) {
        (Some(rate), _) => rate,
        (None, Some(p)) => i64::from(p.rate_bps),
        (None, None) => return Err(ValidationError::required("rate_bps").into()),
    };
    let service_charge_bps = request
        .service_charge_bps
        .unwrap_or(i64::from(DEFAULT_SERVICE_CHARGE_BPS));
    validate_settings(rate_bps, service_charge_bps)?;

    settings.name = request.name.trim().to_string();
    settings.preset = preset.map(|p| p.code.to_string());
    settings.rate_bps = rate_bps;
    settings.mode = request.mode;
    settings.service_charge_bps = service_charge_bps;
    settings.vat_on_service_charge = request.vat_on_service_charge;
    settings.registration_number = request.registration_number;
    Ok(())
}
