use std::sync::Arc;

use crate::db::{DbPool, OrmConn};
use crate::payments::PaymentClient;
use crate::tasks::{CheckoutLocks, TaskRegistry};

#[derive(Clone)]
pub struct AppState {
    pub pool: DbPool,
    pub orm: OrmConn,
    pub payments: PaymentClient,
    pub tasks: Arc<TaskRegistry>,
    pub checkout_locks: Arc<CheckoutLocks>,
}

impl AppState {
    pub fn new(pool: DbPool, orm: OrmConn, payments: PaymentClient) -> Self {
        Self {
            pool,
            orm,
            payments,
            tasks: Arc::new(TaskRegistry::new()),
            checkout_locks: Arc::new(CheckoutLocks::new()),
        }
    }
}
