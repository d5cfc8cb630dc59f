use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::{ConfigError, PatternCompileError};
use crate::event::EventKind;
use crate::matcher::{Listener, Matcher};

/// A mission as written by the authoring layer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MissionDefinition {
    pub title: String,
    pub prompt: String,
    pub description: String,
    pub listener: Listener,
}

/// The public face of a mission sent to browser clients. Listener patterns
/// stay on the server.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MissionSummary {
    pub title: String,
    pub prompt: String,
    pub description: String,
}

#[derive(Debug, Clone)]
pub struct Mission {
    definition: MissionDefinition,
    matcher: Matcher,
}

impl Mission {
    pub fn title(&self) -> &str {
        &self.definition.title
    }

    pub fn target(&self) -> EventKind {
        self.definition.listener.target
    }

    pub fn matcher(&self) -> &Matcher {
        &self.matcher
    }

    pub fn summary(&self) -> MissionSummary {
        MissionSummary {
            title: self.definition.title.clone(),
            prompt: self.definition.prompt.clone(),
            description: self.definition.description.clone(),
        }
    }
}

/// Ordered, immutable mission list with every listener compiled up front.
#[derive(Debug, Clone, Default)]
pub struct MissionSet {
    missions: Vec<Mission>,
}

impl MissionSet {
    pub fn compile(definitions: Vec<MissionDefinition>) -> Result<Self, PatternCompileError> {
        let missions = definitions
            .into_iter()
            .enumerate()
            .map(|(index, definition)| {
                match Matcher::compile(definition.listener.kind, &definition.listener.pattern) {
                    Ok(matcher) => Ok(Mission {
                        definition,
                        matcher,
                    }),
                    Err(source) => Err(PatternCompileError {
                        index,
                        title: definition.title,
                        pattern: definition.listener.pattern,
                        source,
                    }),
                }
            })
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Self { missions })
    }

    pub fn len(&self) -> usize {
        self.missions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.missions.is_empty()
    }

    pub fn get(&self, index: usize) -> Option<&Mission> {
        self.missions.get(index)
    }

    pub fn summaries(&self) -> Vec<MissionSummary> {
        self.missions.iter().map(Mission::summary).collect()
    }
}

fn default_program() -> Vec<String> {
    vec!["bash".to_string()]
}

/// Everything the session needs from the mission configuration file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionDefinition {
    #[serde(default = "default_program")]
    pub program: Vec<String>,
    #[serde(default)]
    pub setup_commands: Vec<String>,
    #[serde(default)]
    pub missions: Vec<MissionDefinition>,
}

impl SessionDefinition {
    /// Reads a JSON file, or TOML when the extension is `.toml`.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let raw = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        let is_toml = path
            .extension()
            .is_some_and(|ext| ext.eq_ignore_ascii_case("toml"));
        let definition: SessionDefinition = if is_toml {
            toml::from_str(&raw).map_err(|err| ConfigError::Parse {
                path: path.to_path_buf(),
                message: err.to_string(),
            })?
        } else {
            serde_json::from_str(&raw).map_err(|err| ConfigError::Parse {
                path: path.to_path_buf(),
                message: err.to_string(),
            })?
        };
        if definition.program.is_empty() {
            return Err(ConfigError::EmptyProgram {
                path: path.to_path_buf(),
            });
        }
        Ok(definition)
    }

    pub fn compile_missions(&self) -> Result<MissionSet, PatternCompileError> {
        MissionSet::compile(self.missions.clone())
    }
}
