//! JSON seed for the demo: provider accounts plus membership rows.

use std::path::Path;

use anyhow::Context;
use serde::Deserialize;

use schoolgate_core::{Identity, IdentityId};
use schoolgate_infra::{InMemoryIdentityProvider, InMemoryMembershipStore, MembershipRecord};

const DEMO_SEED: &str = include_str!("../data/demo_seed.json");

#[derive(Debug, Clone, Deserialize)]
pub struct SeedAccount {
    pub identity_id: IdentityId,
    pub email: String,
    pub password: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Seed {
    /// Email of the account the demo signs in as.
    pub actor: String,
    pub accounts: Vec<SeedAccount>,
    #[serde(default)]
    pub memberships: Vec<MembershipRecord>,
}

impl Seed {
    /// Seed bundled with the binary.
    pub fn demo() -> anyhow::Result<Self> {
        Self::from_json(DEMO_SEED).context("bundled demo seed is malformed")
    }

    pub fn from_json(raw: &str) -> anyhow::Result<Self> {
        let seed: Seed = serde_json::from_str(raw)?;
        anyhow::ensure!(
            seed.account(&seed.actor).is_some(),
            "actor '{}' has no account in the seed",
            seed.actor
        );
        Ok(seed)
    }

    pub fn load(path: impl AsRef<Path>) -> anyhow::Result<Self> {
        let path = path.as_ref();
        let raw = std::fs::read_to_string(path)
            .with_context(|| format!("reading seed file {}", path.display()))?;
        Self::from_json(&raw).with_context(|| format!("parsing seed file {}", path.display()))
    }

    pub fn account(&self, email: &str) -> Option<&SeedAccount> {
        self.accounts
            .iter()
            .find(|a| a.email.eq_ignore_ascii_case(email))
    }

    /// Register every account with the provider and every row with the store.
    pub fn install(
        &self,
        provider: &InMemoryIdentityProvider,
        memberships: &InMemoryMembershipStore,
    ) -> anyhow::Result<()> {
        for account in &self.accounts {
            let identity = Identity::parse(account.identity_id, account.email.clone())
                .with_context(|| format!("seed account {}", account.identity_id))?;
            provider.register_identity(identity, account.password.clone());
        }
        for record in &self.memberships {
            memberships
                .upsert(record.clone())
                .with_context(|| format!("storing membership {}", record.membership_id))?;
        }
        tracing::debug!(
            accounts = self.accounts.len(),
            memberships = self.memberships.len(),
            "seed installed"
        );
        Ok(())
    }
}
