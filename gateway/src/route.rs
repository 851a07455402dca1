//! Hierarchical routing
//!
//! Routes form a tree. At each node the drop rules run first - a hit
//! ends evaluation for the whole subtree. Surviving events are checked
//! against the match rules, each hit dispatching to that rule's
//! receiver, and then handed to every child route regardless of whether
//! a match fired at this level. Only a drop stops descent.

use serde::Deserialize;

use crate::error::ConfigError;
use crate::event::EnhancedEvent;
use crate::rule::Rule;

/// Dispatch seam between the route engine and the receiver fabric.
///
/// The production implementation is the receiver registry; tests use
/// recording registries to observe routing decisions.
pub trait EventDispatch: Send + Sync {
    fn send_event(&self, receiver: &str, event: &EnhancedEvent);
}

/// A node in the routing tree.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Route {
    pub drop: Vec<Rule>,
    #[serde(rename = "match")]
    pub match_: Vec<Rule>,
    pub routes: Vec<Route>,
}

impl Route {
    /// Walk the tree for one event. Rules and children are evaluated in
    /// config order; dispatch order is observable only in logs.
    pub fn process_event(&self, event: &EnhancedEvent, registry: &dyn EventDispatch) {
        for rule in &self.drop {
            if rule.matches(event) {
                return;
            }
        }

        for rule in &self.match_ {
            if rule.matches(event) && !rule.receiver.is_empty() {
                registry.send_event(&rule.receiver, event);
            }
        }

        for child in &self.routes {
            child.process_event(event, registry);
        }
    }

    /// Precompile every rule in this subtree.
    pub fn compile_patterns(&mut self) -> Result<(), ConfigError> {
        for rule in &mut self.drop {
            rule.compile_patterns()?;
        }
        for rule in &mut self.match_ {
            rule.compile_patterns()?;
        }
        for child in &mut self.routes {
            child.compile_patterns()?;
        }
        Ok(())
    }

    /// Visit every rule reachable from this node.
    pub fn visit_rules<F: FnMut(&Rule)>(&self, visit: &mut F) {
        for rule in self.drop.iter().chain(self.match_.iter()) {
            visit(rule);
        }
        for child in &self.routes {
            child.visit_rules(visit);
        }
    }

    /// Visit every match rule reachable from this node. Only match
    /// rules dispatch, so only their receiver fields name destinations.
    pub fn visit_match_rules<F: FnMut(&Rule)>(&self, visit: &mut F) {
        for rule in &self.match_ {
            visit(rule);
        }
        for child in &self.routes {
            child.visit_match_rules(visit);
        }
    }
}
