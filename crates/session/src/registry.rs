use chrono::Utc;
use shared::domain::{AgentCapability, AgentRecord, AgentStatus};
use thiserror::Error;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum RegistryError {
    #[error("agent name and url are both required")]
    MissingField,
    #[error("no agent at position {index} (registry holds {len})")]
    IndexOutOfRange { index: usize, len: usize },
}

/// Inert bookkeeping of remote agent endpoints. Nothing here ever contacts
/// the stored url.
#[derive(Debug, Clone, Default)]
pub struct AgentRegistry {
    agents: Vec<AgentRecord>,
}

impl AgentRegistry {
    pub fn register(
        &mut self,
        name: &str,
        url: &str,
        capability: AgentCapability,
    ) -> Result<(usize, &AgentRecord), RegistryError> {
        let name = name.trim();
        let url = url.trim();
        if name.is_empty() || url.is_empty() {
            return Err(RegistryError::MissingField);
        }

        self.agents.push(AgentRecord {
            name: name.to_string(),
            url: url.to_string(),
            capability,
            status: AgentStatus::Active,
            registered_at: Utc::now(),
        });
        let index = self.agents.len() - 1;
        Ok((index, &self.agents[index]))
    }

    pub fn list(&self) -> &[AgentRecord] {
        &self.agents
    }

    pub fn delete(&mut self, index: usize) -> Result<AgentRecord, RegistryError> {
        if index >= self.agents.len() {
            return Err(RegistryError::IndexOutOfRange {
                index,
                len: self.agents.len(),
            });
        }
        Ok(self.agents.remove(index))
    }

    pub fn len(&self) -> usize {
        self.agents.len()
    }

    pub fn is_empty(&self) -> bool {
        self.agents.is_empty()
    }

    pub fn clear(&mut self) {
        self.agents.clear();
    }
}
