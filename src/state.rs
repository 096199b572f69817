use std::sync::Arc;

use crate::services::mpesa_service::MpesaService;
use crate::store::TransactionStore;

#[derive(Clone)]
pub struct AppState {
    pub gateway: Arc<MpesaService>,
    pub transactions: TransactionStore,
}

impl AppState {
    pub fn new(gateway: Arc<MpesaService>, transactions: TransactionStore) -> Self {
        AppState {
            gateway,
            transactions,
        }
    }
}
