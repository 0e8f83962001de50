use std::sync::Arc;

use anyhow::Context;
use tracing::{info, warn};

use schoolgate_app::{Seed, dashboard};
use schoolgate_infra::{
    Credentials, IdentityProvider, InMemoryIdentityProvider, InMemoryMembershipStore,
    SessionStore, SessionStoreConfig,
};

const ENV_SEED: &str = "SCHOOLGATE_SEED";

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    schoolgate_observability::init();

    let seed = match std::env::var(ENV_SEED) {
        Ok(path) => Seed::load(&path)?,
        Err(_) => {
            info!("{ENV_SEED} not set; using the bundled demo seed");
            Seed::demo()?
        }
    };
    let config = SessionStoreConfig::from_env().context("reading session store configuration")?;
    let screens = dashboard().context("declaring dashboard screens")?;

    let provider = Arc::new(InMemoryIdentityProvider::new());
    let memberships = Arc::new(InMemoryMembershipStore::new());
    seed.install(&provider, &memberships)?;

    let store = SessionStore::start(provider.clone(), memberships, config)?;
    let state = store.settled().await;
    info!(lifecycle = %state.lifecycle(), "session store settled");

    let actor = seed
        .account(&seed.actor)
        .context("seed actor has no account")?;
    provider
        .sign_in(&Credentials::new(actor.email.clone(), actor.password.clone()))
        .await
        .with_context(|| format!("signing in as {}", actor.email))?;

    let state = store.settled().await;
    match state.role_assignment() {
        Some(assignment) => info!(
            actor = %actor.email,
            role = %assignment.role,
            tenant = assignment.tenant_name.as_deref().unwrap_or("-"),
            "role resolved"
        ),
        None => warn!(actor = %actor.email, "actor has no usable role"),
    }

    for (path, requirement) in screens.screens() {
        let explanation = store.explain(requirement);
        info!(
            screen = path,
            decision = ?explanation.decision,
            reason = %explanation.reason,
            "gate evaluated"
        );
    }

    let mut navigation = store.navigation();
    store.sign_out();
    if let Ok(signal) = navigation.recv().await {
        info!(reason = ?signal.reason(), "left protected views");
    }
    let state = store.settled().await;
    info!(lifecycle = %state.lifecycle(), "signed out");

    store.shutdown();
    Ok(())
}
