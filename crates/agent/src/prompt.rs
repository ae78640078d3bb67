//! System prompt rendering.

use chrono::NaiveDate;
use scout_core::expense::ExpenseCategory;

/// A system prompt template with `{name}`, `{customer_id}`, `{date}` and
/// `{categories}` placeholders. Unknown placeholders are left as written.
#[derive(Debug, Clone)]
pub struct PromptTemplate {
    agent_name: String,
    template: String,
}

impl PromptTemplate {
    pub fn new(agent_name: impl Into<String>, template: impl Into<String>) -> Self {
        Self {
            agent_name: agent_name.into(),
            template: template.into(),
        }
    }

    pub fn agent_name(&self) -> &str {
        &self.agent_name
    }

    /// Render for one session on a given day.
    pub fn render(&self, customer_id: &str, today: NaiveDate) -> String {
        self.template
            .replace("{name}", &self.agent_name)
            .replace("{customer_id}", customer_id)
            .replace("{date}", &today.format("%Y-%m-%d").to_string())
            .replace("{categories}", &ExpenseCategory::names().join(", "))
    }
}

impl Default for PromptTemplate {
    fn default() -> Self {
        let settings = scout_config::AgentSettings::default();
        Self::new(settings.name, settings.system_prompt)
    }
}
