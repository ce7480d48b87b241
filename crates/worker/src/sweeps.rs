//! Expiry sweeps over invites and password resets

use std::sync::Arc;

use async_trait::async_trait;
use patos_api::store::{OrganizationStore, PasswordResetStore};
use patos_shared::AuthResult;

use crate::scheduler::Task;

pub struct InviteSweep {
    store: Arc<dyn OrganizationStore>,
}

impl InviteSweep {
    pub fn new(store: Arc<dyn OrganizationStore>) -> Self {
        Self { store }
    }
}

#[async_trait]
impl Task for InviteSweep {
    fn name(&self) -> &'static str {
        "expired-invite-sweep"
    }

    async fn run(&self) -> AuthResult<u64> {
        self.store.sweep_expired_invites().await
    }
}

pub struct PasswordResetSweep {
    store: Arc<dyn PasswordResetStore>,
}

impl PasswordResetSweep {
    pub fn new(store: Arc<dyn PasswordResetStore>) -> Self {
        Self { store }
    }
}

#[async_trait]
impl Task for PasswordResetSweep {
    fn name(&self) -> &'static str {
        "expired-password-reset-sweep"
    }

    async fn run(&self) -> AuthResult<u64> {
        self.store.sweep_expired_resets().await
    }
}
