//! The relay object shared by every ingestion worker

use serde_json::Value;
use std::collections::BTreeSet;
use tracing::{debug, info, warn};

use super::RelayConfig;
use super::channel::{Connector, NvimConnector};
use super::classify::{ToolEvent, classify};
use super::conversation::{ConversationResolver, SessionStore};
use super::envelope::flatten;
use super::hints::resolve_hints;
use super::patch::match_roots;
use super::router::{Rendezvous, Router};
use super::workspace::{WorkspaceRegistry, WorkspaceRoot};

/// Which resolver produced an event's targets.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Resolution {
    /// Conversation id mapped through the session store
    Conversation,
    /// Paths named by an `apply_patch` payload
    Patch,
    /// Path-like attributes on the event
    Hint,
}

/// Tally of one export request.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct IngestReport {
    /// Log records seen
    pub records: usize,
    /// Records classified as agent tool activity
    pub relevant: usize,
    /// Relevant records no workspace could be found for
    pub unresolved: usize,
    /// Single-record envelopes delivered
    pub forwarded: usize,
    /// Deliveries that failed or had no destination
    pub failed: usize,
}

/// Routing state for the life of the process.
pub struct Relay {
    config: RelayConfig,
    conversations: ConversationResolver,
    router: Router,
}

impl Relay {
    /// Create a relay that reaches editors through `connector`.
    pub fn new(config: RelayConfig, connector: Box<dyn Connector>) -> Self {
        let conversations = ConversationResolver::new(
            SessionStore::new(config.session_dir.clone()),
            config.negative_ttl(),
        );
        let router = Router::new(Rendezvous::new(config.runtime_dir.clone()), connector);
        Self {
            config,
            conversations,
            router,
        }
    }

    /// Create a relay talking msgpack-RPC to real editors.
    pub fn with_editor_channels(config: RelayConfig) -> Self {
        let connector = NvimConnector::new(config.forward_timeout());
        Self::new(config, Box::new(connector))
    }

    /// Get the current configuration
    pub fn config(&self) -> &RelayConfig {
        &self.config
    }

    /// Conversation cache
    pub fn conversations(&self) -> &ConversationResolver {
        &self.conversations
    }

    /// Channel router
    pub fn router(&self) -> &Router {
        &self.router
    }

    /// Route every record of an export request. Never fails: problems are
    /// logged and counted.
    pub fn ingest(&self, payload: &Value) -> IngestReport {
        let mut report = IngestReport::default();

        for event in flatten(payload) {
            report.records += 1;

            let Some(tool) = classify(&event) else {
                debug!("ignoring record outside the agent namespace");
                continue;
            };
            report.relevant += 1;

            let Some((resolution, targets)) = self.targets_for(&tool) else {
                warn!(
                    event = tool.event_name,
                    conversation = tool.conversation_id,
                    "no workspace for event, dropping"
                );
                report.unresolved += 1;
                continue;
            };

            let single = event.single_record_envelope();
            for root in &targets {
                match self.router.forward(root, &single) {
                    Ok(()) => {
                        report.forwarded += 1;
                        info!(
                            event = tool.event_name,
                            root = %root,
                            via = ?resolution,
                            "forwarded event"
                        );
                    }
                    Err(err) => {
                        report.failed += 1;
                        warn!(
                            event = tool.event_name,
                            root = %root,
                            error = %err,
                            "event not delivered"
                        );
                    }
                }
            }
        }

        report
    }

    /// Workspace roots an event belongs to.
    ///
    /// Resolvers run in priority order and the first non-empty answer wins.
    pub fn targets_for(&self, tool: &ToolEvent<'_>) -> Option<(Resolution, BTreeSet<WorkspaceRoot>)> {
        if let Some(root) = tool
            .conversation_id
            .and_then(|id| self.conversations.resolve(id))
        {
            return Some((Resolution::Conversation, BTreeSet::from([root])));
        }

        if let Some(patch_text) = tool.patch_text {
            let registry = WorkspaceRegistry::load(&self.config.state_file);
            let roots = match_roots(patch_text, &registry);
            if !roots.is_empty() {
                return Some((Resolution::Patch, roots));
            }
            debug!(
                registered = registry.roots().len(),
                "patch paths matched no registered workspace"
            );
        }

        resolve_hints(&tool.hints).map(|root| (Resolution::Hint, BTreeSet::from([root])))
    }
}
