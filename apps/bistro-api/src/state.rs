//! Shared application state handed to every handler.

use std::sync::Arc;

use bistro_db::Database;

use crate::config::ApiConfig;
use crate::services::gateway::{
    CardGateway, SimulatedCardGateway, SimulatedWalletGateway, WalletGateway,
};

pub struct AppState {
    pub db: Database,
    pub config: ApiConfig,
    pub card_gateway: Arc<dyn CardGateway>,
    pub wallet_gateway: Arc<dyn WalletGateway>,
}

pub type SharedState = Arc<AppState>;

impl AppState {
    /// State backed by the simulated gateways configured in `[payments]`.
    pub fn new(db: Database, config: ApiConfig) -> Self {
        let card_gateway = Arc::new(SimulatedCardGateway::new(config.payments.card_decline_all));
        let wallet_gateway =
            Arc::new(SimulatedWalletGateway::new(config.payments.wallet_decline_all));
        AppState {
            db,
            config,
            card_gateway,
            wallet_gateway,
        }
    }
}
