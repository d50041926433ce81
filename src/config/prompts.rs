//! Prompt templates for the LLM-backed chunker (C5) and topic classifier (C7).

use serde::{Deserialize, Serialize};

/// Collection of prompt templates.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct Prompts {
    pub chunking: ChunkingPrompts,
    pub classification: ClassificationPrompts,
}

/// Prompts for LLM-based topic chunking (§4.5).
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ChunkingPrompts {
    pub system: String,
    pub user: String,
}

impl Default for ChunkingPrompts {
    fn default() -> Self {
        Self {
            system: r#"You split a transcript into topic-coherent sections. Each section gets a short topic label, a handful of keywords, and a confidence score.

Respond with strict JSON only, no commentary, no markdown fences:
{"chunks":[{"start_pos":int,"end_pos":int,"topic":str,"keywords":[str],"confidence":float}, ...]}

Coverage rules, all mandatory:
- The first chunk's start_pos is 0.
- The last chunk's end_pos is the transcript length in characters.
- Adjacent chunks share a boundary exactly: no gaps, no overlaps.
- Positions are character offsets into the transcript as given, not token indices."#
                .to_string(),

            user: r#"Target section size: {{min_tokens}}-{{max_tokens}} tokens (approximately {{min_chars}}-{{max_chars}} characters).

Transcript ({{length}} characters):
{{transcript}}"#
                .to_string(),
        }
    }
}

/// Prompts for topic classification against a canonical taxonomy (§4.7).
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ClassificationPrompts {
    pub system: String,
    pub user: String,
}

impl Default for ClassificationPrompts {
    fn default() -> Self {
        Self {
            system: r#"You assign canonical topic labels to a transcript. You must choose only from the provided list of topic names; if none apply, answer "Unknown". Respond with a comma-separated list of topic names and nothing else."#
                .to_string(),

            user: r#"Canonical topics: {{topics}}

Chunk summaries for this transcript:
{{summaries}}

Which canonical topics apply? Answer with a comma-separated list drawn only from the canonical topics above."#
                .to_string(),
        }
    }
}

impl Prompts {
    /// Render a prompt template with the given variables.
    pub fn render(template: &str, vars: &std::collections::HashMap<String, String>) -> String {
        let mut result = template.to_string();
        for (key, value) in vars {
            result = result.replace(&format!("{{{{{}}}}}", key), value);
        }
        result
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_prompts_nonempty() {
        let prompts = Prompts::default();
        assert!(!prompts.chunking.system.is_empty());
        assert!(!prompts.classification.system.is_empty());
    }

    #[test]
    fn render_template() {
        let template = "Hello {{name}}, {{count}} chunks.";
        let mut vars = std::collections::HashMap::new();
        vars.insert("name".to_string(), "Alice".to_string());
        vars.insert("count".to_string(), "5".to_string());
        assert_eq!(Prompts::render(template, &vars), "Hello Alice, 5 chunks.");
    }
}
