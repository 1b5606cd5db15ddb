//! Persona definitions and the read-only catalog they are loaded into.
//!
//! Personas are configuration, not state: the catalog is built once at
//! process start from YAML files and shared immutably across every
//! concurrent request. There is no runtime mutation path; hot-reload, if
//! ever needed, would replace the whole catalog atomically.

use crate::error::CoreError;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;
use tracing::warn;

/// Voice configuration for text-to-speech, fixed per persona.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VoiceSettings {
    #[serde(default = "default_language_code")]
    pub language_code: String,
    /// Cloud TTS voice name (e.g., "en-US-Neural2-F").
    pub voice_name: String,
    #[serde(default)]
    pub pitch: f32,
    #[serde(default = "default_speaking_rate")]
    pub speaking_rate: f32,
}

fn default_language_code() -> String {
    "en-US".to_string()
}

fn default_speaking_rate() -> f32 {
    1.0
}

/// Personality and behavioral traits of a simulated student.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PersonaTraits {
    /// Confidence bias in [0, 1].
    pub confidence_level: f32,
    /// Likelihood of volunteering, in [0, 1].
    pub participation_willingness: f32,
    /// How quickly the student processes new information (free text).
    pub processing_speed: String,
}

/// A complete simulated-student identity with a fixed trait profile.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Persona {
    pub id: String,
    pub name: String,
    pub learning_style: String,
    pub description: String,
    pub traits: PersonaTraits,
    pub strengths: Vec<String>,
    pub challenges: Vec<String>,
    pub response_patterns: Vec<String>,
    pub thinking_approach: String,
    pub voice: VoiceSettings,
}

/// The immutable, ordered set of personas known to the service.
///
/// The `Vec` order is the canonical display order used by every aggregate
/// result; clients that match responses by position rely on it being
/// stable across requests.
#[derive(Debug, Clone)]
pub struct PersonaCatalog {
    personas: Vec<Arc<Persona>>,
    by_id: HashMap<String, usize>,
}

impl PersonaCatalog {
    /// Builds a catalog from an ordered list of personas.
    ///
    /// Rejects an empty list and duplicate ids; both indicate broken
    /// configuration rather than a recoverable runtime condition.
    pub fn new(personas: Vec<Persona>) -> Result<Self, CoreError> {
        if personas.is_empty() {
            return Err(CoreError::InvalidInput(
                "persona catalog must contain at least one persona".to_string(),
            ));
        }
        let mut by_id = HashMap::with_capacity(personas.len());
        for (idx, persona) in personas.iter().enumerate() {
            validate_traits(persona)?;
            if by_id.insert(persona.id.clone(), idx).is_some() {
                return Err(CoreError::InvalidInput(format!(
                    "duplicate persona id '{}'",
                    persona.id
                )));
            }
        }
        Ok(Self {
            personas: personas.into_iter().map(Arc::new).collect(),
            by_id,
        })
    }

    /// Loads every `*.yaml` file in `dir`, sorted by file name.
    ///
    /// The sort gives the catalog a deterministic canonical order that is
    /// independent of directory iteration order. Files that fail to parse
    /// are skipped with a warning so one bad profile does not take the
    /// whole service down.
    pub fn load_from_dir(dir: impl AsRef<Path>) -> Result<Self, CoreError> {
        let dir = dir.as_ref();
        let entries = std::fs::read_dir(dir).map_err(|e| {
            CoreError::InvalidInput(format!("cannot read persona dir {}: {}", dir.display(), e))
        })?;

        let mut paths: Vec<_> = entries
            .filter_map(|entry| entry.ok().map(|e| e.path()))
            .filter(|p| {
                p.is_file()
                    && matches!(
                        p.extension().and_then(|s| s.to_str()),
                        Some("yaml") | Some("yml")
                    )
            })
            .collect();
        paths.sort();

        let mut personas = Vec::with_capacity(paths.len());
        for path in paths {
            let contents = std::fs::read_to_string(&path).map_err(|e| {
                CoreError::InvalidInput(format!("cannot read {}: {}", path.display(), e))
            })?;
            match serde_yaml::from_str::<Persona>(&contents) {
                Ok(persona) => personas.push(persona),
                Err(e) => {
                    warn!(path = %path.display(), error = %e, "Skipping unparsable persona file");
                }
            }
        }

        Self::new(personas)
    }

    /// Personas in canonical order.
    pub fn iter(&self) -> impl Iterator<Item = &Arc<Persona>> {
        self.personas.iter()
    }

    pub fn get(&self, id: &str) -> Option<&Arc<Persona>> {
        self.by_id.get(id).map(|&idx| &self.personas[idx])
    }

    pub fn contains(&self, id: &str) -> bool {
        self.by_id.contains_key(id)
    }

    pub fn len(&self) -> usize {
        self.personas.len()
    }

    pub fn is_empty(&self) -> bool {
        self.personas.is_empty()
    }
}

fn validate_traits(persona: &Persona) -> Result<(), CoreError> {
    let t = &persona.traits;
    if !(0.0..=1.0).contains(&t.confidence_level) {
        return Err(CoreError::InvalidInput(format!(
            "persona '{}': confidence_level {} outside [0, 1]",
            persona.id, t.confidence_level
        )));
    }
    if !(0.0..=1.0).contains(&t.participation_willingness) {
        return Err(CoreError::InvalidInput(format!(
            "persona '{}': participation_willingness {} outside [0, 1]",
            persona.id, t.participation_willingness
        )));
    }
    Ok(())
}

#[cfg(test)]
pub(crate) fn test_persona(id: &str, name: &str) -> Persona {
    Persona {
        id: id.to_string(),
        name: name.to_string(),
        learning_style: "visual".to_string(),
        description: format!("{} is a test student", name),
        traits: PersonaTraits {
            confidence_level: 0.5,
            participation_willingness: 0.5,
            processing_speed: "moderate".to_string(),
        },
        strengths: vec!["pattern recognition".to_string()],
        challenges: vec!["abstract notation".to_string()],
        response_patterns: vec!["asks clarifying questions".to_string()],
        thinking_approach: "works from concrete examples".to_string(),
        voice: VoiceSettings {
            language_code: "en-US".to_string(),
            voice_name: "en-US-Neural2-F".to_string(),
            pitch: 0.0,
            speaking_rate: 1.0,
        },
    }
}
