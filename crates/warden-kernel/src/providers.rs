use async_trait::async_trait;
use serde_json::{Value, json};
use std::collections::HashMap;
use warden_core::{ActionRequest, Result, SessionActor};

/// A capability the kernel can invoke once a request clears governance.
///
/// Providers perform the effect and nothing else: admission, policy, approval,
/// and audit all happen in the kernel before `invoke` is reached.
#[async_trait]
pub trait EffectProvider: Send + Sync {
    /// Stable provider name for logs and mode checks.
    fn name(&self) -> &str;

    /// Whether this provider performs real side effects. A live kernel
    /// refuses non-live providers so a stub never runs in production.
    fn is_live(&self) -> bool {
        false
    }

    /// Perform the effect. Only called after the request was admitted,
    /// allowed by policy, and (when escalated) approved by a human.
    async fn invoke(&self, request: &ActionRequest) -> Result<Value>;
}

/// Resolves actor ids to session actors for separation-of-duties checks and
/// audit attribution. The kernel never creates or destroys actors.
pub trait IdentityProvider: Send + Sync {
    fn resolve(&self, actor_id: &str) -> Option<SessionActor>;
}

/// Identity provider over a fixed roster.
#[derive(Default)]
pub struct StaticIdentityProvider {
    actors: HashMap<String, SessionActor>,
}

impl StaticIdentityProvider {
    pub fn new(actors: impl IntoIterator<Item = SessionActor>) -> Self {
        Self {
            actors: actors
                .into_iter()
                .map(|a| (a.id.clone(), a))
                .collect(),
        }
    }
}

impl IdentityProvider for StaticIdentityProvider {
    fn resolve(&self, actor_id: &str) -> Option<SessionActor> {
        self.actors.get(actor_id).cloned()
    }
}

/// Effect provider that echoes the request instead of acting on it.
///
/// Deliberately not live: a dry kernel runs the full governance pipeline
/// against it without touching the outside world.
pub struct DryRunEffect;

#[async_trait]
impl EffectProvider for DryRunEffect {
    fn name(&self) -> &str {
        "dry-run"
    }

    async fn invoke(&self, request: &ActionRequest) -> Result<Value> {
        Ok(json!({
            "dry_run": true,
            "action_kind": request.action_kind,
            "target": request.target,
        }))
    }
}
