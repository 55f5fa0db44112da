//! The five execution agents. Each owns one domain service and executes
//! one action at a time; agents never call other agents.

mod cart;
mod memory;
mod order;
mod params;
mod product;
mod support;

use std::collections::HashMap;
use std::sync::Arc;

use oc_domain::action::{AgentAction, AgentName};
use oc_domain::context::AgentContext;
use oc_domain::response::AgentExecutionResult;

pub use cart::CartAgent;
pub use memory::MemoryAgent;
pub use order::OrderAgent;
pub use product::ProductAgent;
pub use support::SupportAgent;

/// Shared agent contract: execute one action against this agent's
/// service. Business failures return `success: false`; the request never
/// aborts for them.
pub trait Agent: Send + Sync {
    fn name(&self) -> AgentName;
    fn execute(&self, action: &AgentAction, context: &AgentContext) -> AgentExecutionResult;
}

/// Agent lookup by name, built once at the composition root.
#[derive(Clone)]
pub struct AgentRegistry {
    agents: HashMap<AgentName, Arc<dyn Agent>>,
}

impl AgentRegistry {
    pub fn new(agents: Vec<Arc<dyn Agent>>) -> Self {
        Self {
            agents: agents
                .into_iter()
                .map(|agent| (agent.name(), agent))
                .collect(),
        }
    }

    pub fn get(&self, name: AgentName) -> Option<Arc<dyn Agent>> {
        self.agents.get(&name).cloned()
    }
}
