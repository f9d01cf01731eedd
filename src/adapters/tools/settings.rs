use super::args;
use super::{reply, reply_with};
use crate::domain::models::{ToolDefinition, ToolResult};
use crate::domain::ports::{Tool, ToolContext, TrainerStore};
use async_trait::async_trait;
use serde::Deserialize;
use serde_json::{json, Value};
use std::sync::Arc;

/// Custom trainer instructions appended to the system prompt.
pub struct ManageSettingsTool {
    store: Arc<dyn TrainerStore>,
}

impl ManageSettingsTool {
    pub fn new(store: Arc<dyn TrainerStore>) -> Self {
        Self { store }
    }
}

#[derive(Debug, Deserialize)]
#[serde(tag = "action", rename_all = "snake_case")]
enum SettingsCommand {
    Get,
    Update {
        #[serde(default)]
        system_instructions: Option<String>,
    },
}

#[async_trait]
impl Tool for ManageSettingsTool {
    fn name(&self) -> &'static str {
        "manage_settings"
    }

    fn definition(&self) -> ToolDefinition {
        ToolDefinition {
            name: self.name().to_string(),
            description: "Read or change the user's standing instructions for the trainer, \
                          such as preferred units or injuries to work around."
                .to_string(),
            parameters: json!({
                "type": "object",
                "properties": {
                    "action": { "type": "string", "enum": ["get", "update"] },
                    "system_instructions": { "type": "string", "description": "Empty or omitted clears them" }
                },
                "required": ["action"]
            }),
        }
    }

    async fn execute(&self, ctx: &ToolContext, input: Value) -> ToolResult {
        let command: SettingsCommand = match args::parse(input) {
            Ok(command) => command,
            Err(invalid) => return invalid,
        };

        match command {
            SettingsCommand::Get => reply(self.store.get_settings(ctx.user_id)),
            SettingsCommand::Update {
                system_instructions,
            } => {
                let instructions = system_instructions
                    .map(|text| text.trim().to_string())
                    .filter(|text| !text.is_empty());
                reply_with(
                    self.store.update_settings(ctx.user_id, instructions),
                    |_| "Settings updated".to_string(),
                )
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::tools::tests::fixture;

    #[tokio::test]
    async fn test_update_and_clear_instructions() {
        let (storage, ctx) = fixture();
        let tool = ManageSettingsTool::new(storage);

        let updated = tool
            .execute(&ctx, json!({ "action": "update", "system_instructions": "Use kilograms" }))
            .await;
        assert_eq!(updated.data.unwrap()["system_instructions"], "Use kilograms");

        tool.execute(&ctx, json!({ "action": "update", "system_instructions": "  " }))
            .await;
        let current = tool.execute(&ctx, json!({ "action": "get" })).await;
        assert!(current.data.unwrap()["system_instructions"].is_null());
    }
}
