use crate::adapters::tools::ToolRegistry;
use crate::config::Config;
use crate::domain::agent::{AgentOptions, TrainerAgent};
use crate::domain::context::ContextBuilder;
use crate::domain::ports::{Authenticator, ModelAdapter, TrainerStore};
use std::sync::Arc;

/// Shared by every request handler. Everything inside is immutable after
/// startup; the store does its own locking.
#[derive(Clone)]
pub struct AppState {
    pub agent: Arc<TrainerAgent>,
    pub tools: Arc<ToolRegistry>,
    pub store: Arc<dyn TrainerStore>,
    pub auth: Arc<dyn Authenticator>,
    pub expose_error_details: bool,
}

impl AppState {
    pub fn new<S>(
        store: Arc<S>,
        model: Arc<dyn ModelAdapter>,
        context: ContextBuilder,
        options: AgentOptions,
    ) -> Self
    where
        S: TrainerStore + Authenticator + 'static,
    {
        let tools = Arc::new(ToolRegistry::standard(store.clone()));
        let agent = TrainerAgent::new(model, tools.clone(), store.clone(), context, options);
        Self {
            agent: Arc::new(agent),
            tools,
            store: store.clone(),
            auth: store,
            expose_error_details: false,
        }
    }

    pub fn from_config<S>(config: &Config, store: Arc<S>, model: Arc<dyn ModelAdapter>) -> Self
    where
        S: TrainerStore + Authenticator + 'static,
    {
        let context = ContextBuilder::new(config.instructions.clone());
        Self {
            expose_error_details: config.expose_error_details(),
            ..Self::new(store, model, context, config.agent_options())
        }
    }
}
