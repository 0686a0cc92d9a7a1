use std::sync::Arc;

use ferry_bundle::Ferry;

/// Shared handler state
#[derive(Clone)]
pub struct FerryState {
    pub ferry: Arc<Ferry>,
}

impl FerryState {
    pub fn new(ferry: Ferry) -> Self {
        Self {
            ferry: Arc::new(ferry),
        }
    }
}

impl From<Arc<Ferry>> for FerryState {
    fn from(ferry: Arc<Ferry>) -> Self {
        Self { ferry }
    }
}
