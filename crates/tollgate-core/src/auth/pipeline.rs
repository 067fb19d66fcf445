//! Ordered per-request security stages.

use chrono::{DateTime, Utc};
use tracing::debug;

use super::context::{AuthOutcome, RequestAuthenticator, SecurityContext};
use super::policy::{AccessPolicy, Decision};

/// A named step of the security pipeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    /// Resolve the bearer token into a security context.
    Authenticate,
    /// Evaluate the access policy against the context.
    Authorize,
}

impl Stage {
    /// Execution order. Authentication always precedes authorization.
    pub const ORDER: [Self; 2] = [Self::Authenticate, Self::Authorize];
}

/// Result of running the pipeline for one request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Verdict {
    /// The handler may run with this context.
    Allow(SecurityContext),
    /// The request is refused.
    Reject {
        /// Stage that refused it.
        stage: Stage,
        /// Policy decision behind the refusal.
        decision: Decision,
    },
}

/// Runs authentication then authorization, exactly once per request.
#[derive(Debug, Clone)]
pub struct SecurityPipeline {
    authenticator: RequestAuthenticator,
    policy: AccessPolicy,
}

impl SecurityPipeline {
    /// Create a pipeline.
    #[must_use]
    pub const fn new(authenticator: RequestAuthenticator, policy: AccessPolicy) -> Self {
        Self {
            authenticator,
            policy,
        }
    }

    /// Access policy in use.
    #[must_use]
    pub const fn policy(&self) -> &AccessPolicy {
        &self.policy
    }

    /// Process a request.
    #[must_use]
    pub fn process(&self, path: &str, authorization: Option<&str>, now: DateTime<Utc>) -> Verdict {
        let mut context = SecurityContext::empty();

        for stage in Stage::ORDER {
            match stage {
                Stage::Authenticate => {
                    let (resolved, outcome) = self.authenticator.authenticate(authorization, now);
                    if let AuthOutcome::Rejected(kind) = outcome {
                        debug!(path = %path, kind = ?kind, "Bearer token not accepted");
                    }
                    context = resolved;
                }
                Stage::Authorize => match self.policy.evaluate(path, &context) {
                    Decision::Allow => {}
                    decision => {
                        debug!(path = %path, decision = ?decision, "Request rejected by policy");
                        return Verdict::Reject { stage, decision };
                    }
                },
            }
        }

        Verdict::Allow(context)
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::time::Duration;

    use super::*;
    use crate::auth::store::{MemoryUserStore, UserRecord};
    use crate::auth::token::TokenCodec;
    use crate::secrets::SigningSecret;

    fn t0() -> DateTime<Utc> {
        DateTime::from_timestamp(1_700_000_000, 0).unwrap()
    }

    fn setup() -> (SecurityPipeline, Arc<TokenCodec>) {
        let codec = Arc::new(
            TokenCodec::new(
                &SigningSecret::new("secret").derive_key(),
                Duration::from_secs(3_600),
                &[],
            )
            .unwrap(),
        );
        let store = Arc::new(MemoryUserStore::with_users([
            UserRecord::new("victor", "unused", ["USER"]),
            UserRecord::new("root", "unused", ["ADMIN"]),
        ]));
        let pipeline = SecurityPipeline::new(
            RequestAuthenticator::new(Arc::clone(&codec), store),
            AccessPolicy::default(),
        );
        (pipeline, codec)
    }

    fn bearer(codec: &TokenCodec, user: &str, role: &str) -> String {
        let token = codec
            .issue_access_token(user, [role], t0(), "http://localhost")
            .unwrap();
        format!("Bearer {token}")
    }

    #[test]
    fn test_stage_order() {
        assert_eq!(Stage::ORDER, [Stage::Authenticate, Stage::Authorize]);
    }

    #[test]
    fn test_api_requires_token() {
        let (pipeline, codec) = setup();

        assert_eq!(
            pipeline.process("/api/person/v1", None, t0()),
            Verdict::Reject {
                stage: Stage::Authorize,
                decision: Decision::Unauthenticated
            }
        );

        let header = bearer(&codec, "victor", "USER");
        let Verdict::Allow(ctx) = pipeline.process("/api/person/v1", Some(&header), t0()) else {
            panic!("valid token should be allowed");
        };
        assert_eq!(ctx.principal().unwrap().username, "victor");
    }

    #[test]
    fn test_users_always_denied() {
        let (pipeline, codec) = setup();
        let header = bearer(&codec, "root", "ADMIN");

        assert_eq!(
            pipeline.process("/users", Some(&header), t0()),
            Verdict::Reject {
                stage: Stage::Authorize,
                decision: Decision::Forbidden
            }
        );
    }

    #[test]
    fn test_invalid_token_on_open_route() {
        let (pipeline, _) = setup();
        assert_eq!(
            pipeline.process("/auth/signin", Some("Bearer junk"), t0()),
            Verdict::Allow(SecurityContext::empty())
        );
    }
}
