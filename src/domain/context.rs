use chrono::NaiveDate;

const BASE_PROMPT: &str = "You are an expert personal fitness trainer AI assistant with complete access to the user's fitness data. You can help with:

- Creating and managing workout programs (list, create, update, delete workouts and exercises)
- Building training plans (create, update plans)
- Logging workout sessions (start sessions, log sets, track progress)
- Analyzing training history (view past sessions, completed sets, progress)
- Providing fitness advice and recommendations

You have tools to perform ALL CRUD operations on workouts, exercises, plans, sessions, and completed sets. When users ask about their data, always use the appropriate tools to fetch current information.

Be conversational, encouraging, and provide specific, actionable advice based on their actual data.";

/// Assembles the system prompt for one turn: the trainer persona, any
/// operator instructions from config, then the user's saved instructions.
#[derive(Debug, Clone, Default)]
pub struct ContextBuilder {
    instructions: Vec<String>,
}

impl ContextBuilder {
    pub fn new(instructions: Vec<String>) -> Self {
        Self {
            instructions: instructions
                .into_iter()
                .map(|text| text.trim().to_string())
                .filter(|text| !text.is_empty())
                .collect(),
        }
    }

    pub fn build(&self, today: NaiveDate, custom: Option<&str>) -> String {
        let mut prompt = String::from(BASE_PROMPT);

        // Relative dates ("start next Monday") need an anchor.
        prompt.push_str(&format!("\n\nToday's date is {}.", today.format("%Y-%m-%d")));

        for text in &self.instructions {
            prompt.push_str("\n\n");
            prompt.push_str(text);
        }

        if let Some(custom) = custom.map(str::trim).filter(|c| !c.is_empty()) {
            prompt.push_str("\n\nCustom Instructions: ");
            prompt.push_str(custom);
        }

        prompt
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn day() -> NaiveDate {
        NaiveDate::from_ymd_opt(2026, 10, 18).unwrap()
    }

    #[test]
    fn test_custom_instructions_come_last() {
        let builder = ContextBuilder::new(vec!["Answer in metric units.".into(), "  ".into()]);
        let prompt = builder.build(day(), Some("I have a bad left knee"));

        assert!(prompt.starts_with("You are an expert personal fitness trainer"));
        assert!(prompt.contains("Today's date is 2026-10-18."));
        assert!(prompt.ends_with("Answer in metric units.\n\nCustom Instructions: I have a bad left knee"));
    }

    #[test]
    fn test_blank_custom_instructions_are_skipped() {
        let prompt = ContextBuilder::default().build(day(), Some("   "));
        assert!(!prompt.contains("Custom Instructions"));
    }
}
