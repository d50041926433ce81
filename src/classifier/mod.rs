//! Canonical topic classification (C7).
//!
//! Grounded on `topic_assignment.py`'s `assign_topics_activity`: gather chunk
//! topic summaries, ask the LLM to choose among the canonical taxonomy
//! (falling back to "Unknown"), then map the chosen names back to topic ids
//! and persist the assignment.

use crate::chunker::llm::LlmClient;
use crate::config::ClassificationPrompts;
use crate::db::models::{Topic, TranscriptionTopic, UNKNOWN_TOPIC_NAME};
use crate::db::Db;
use crate::error::Result;
use regex::RegexBuilder;
use std::collections::HashMap;
use tracing::{info, warn};
use uuid::Uuid;

const AI_REASONING: &str = "assigned by LLM from chunk summaries";

/// Assign canonical topics to `transcription_id` based on its chunks'
/// `topic_summary` values (§4.7).
pub async fn classify(
    db: &Db,
    transcription_id: Uuid,
    prompts: &ClassificationPrompts,
    llm: &LlmClient,
    on_heartbeat: &mut (dyn FnMut() + Send),
) -> Result<Vec<Uuid>> {
    let chunks = db.list_chunks(transcription_id)?;
    let summaries: Vec<String> = chunks.into_iter().filter_map(|c| c.topic_summary).collect();

    let canonical = db.list_topics()?;
    let unknown = db.seed_default_topics()?;

    if summaries.is_empty() {
        db.assign_topics(
            transcription_id,
            &[TranscriptionTopic {
                transcription_id,
                topic_id: unknown,
                ai_confidence: None,
                ai_reasoning: Some("no chunk topic summaries available".to_string()),
                assigned_by: None,
                user_reviewed: false,
            }],
        )?;
        return Ok(vec![unknown]);
    }

    let chosen_names = match classify_with_llm(&summaries, &canonical, prompts, llm, on_heartbeat).await {
        Ok(names) if !names.is_empty() => names,
        Ok(_) => vec![UNKNOWN_TOPIC_NAME.to_string()],
        Err(e) => {
            warn!(error = %e, "topic classification failed, defaulting to Unknown");
            vec![UNKNOWN_TOPIC_NAME.to_string()]
        }
    };

    let by_name: HashMap<String, Uuid> = canonical.iter().map(|t| (t.name.to_lowercase(), t.id)).collect();
    let mut topic_ids: Vec<Uuid> = chosen_names
        .iter()
        .filter_map(|name| by_name.get(&name.to_lowercase()).copied())
        .collect();
    topic_ids.dedup();
    let matched_any = !topic_ids.is_empty();
    if !matched_any {
        topic_ids.push(unknown);
    }

    let assignments: Vec<TranscriptionTopic> = topic_ids
        .iter()
        .map(|&topic_id| TranscriptionTopic {
            transcription_id,
            topic_id,
            ai_confidence: matched_any.then_some(1.0),
            ai_reasoning: Some(AI_REASONING.to_string()),
            assigned_by: None,
            user_reviewed: false,
        })
        .collect();
    db.assign_topics(transcription_id, &assignments)?;

    info!(transcription_id = %transcription_id, topic_count = topic_ids.len(), "assigned topics");
    Ok(topic_ids)
}

async fn classify_with_llm(
    summaries: &[String],
    canonical: &[Topic],
    prompts: &ClassificationPrompts,
    llm: &LlmClient,
    on_heartbeat: &mut (dyn FnMut() + Send),
) -> Result<Vec<String>> {
    llm.check_liveness().await?;

    let topics_list = canonical.iter().map(|t| t.name.as_str()).collect::<Vec<_>>().join(", ");
    let summaries_list = summaries.iter().map(|s| format!("- {s}")).collect::<Vec<_>>().join("\n");

    let mut vars = HashMap::new();
    vars.insert("topics".to_string(), topics_list);
    vars.insert("summaries".to_string(), summaries_list);
    let user_prompt = crate::config::Prompts::render(&prompts.user, &vars);

    let response = llm.complete(&prompts.system, &user_prompt, on_heartbeat).await?;
    Ok(match_topic_names(&response, canonical))
}

/// Match canonical topic names against the model's full reply (§4.7 step 6).
///
/// Primary stage: for each canonical name, scan the whole response with a
/// case-insensitive `['"]?<name>['"]?` regex; this tolerates a reply like
/// "The topics are Databases and Rust Programming." matching both names.
/// Only falls back to a comma-split + exact-name lookup when that scan
/// matches nothing.
fn match_topic_names(response: &str, canonical: &[Topic]) -> Vec<String> {
    let mut matched = Vec::new();
    for topic in canonical {
        let pattern = format!(r#"['"]?{}['"]?"#, regex::escape(&topic.name));
        let Ok(re) = RegexBuilder::new(&pattern).case_insensitive(true).build() else {
            continue;
        };
        if re.is_match(response) {
            matched.push(topic.name.clone());
        }
    }
    if !matched.is_empty() {
        return matched;
    }
    parse_topic_names(response)
}

/// Parse a comma-separated list of topic names from the model's reply,
/// tolerant of stray whitespace or a trailing period.
fn parse_topic_names(response: &str) -> Vec<String> {
    response
        .split(',')
        .map(|s| s.trim().trim_end_matches('.').to_string())
        .filter(|s| !s.is_empty())
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_comma_separated_names() {
        let names = parse_topic_names("Rust Programming, Databases, Unknown.");
        assert_eq!(names, vec!["Rust Programming", "Databases", "Unknown"]);
    }

    #[test]
    fn parses_single_name() {
        assert_eq!(parse_topic_names("Unknown"), vec!["Unknown"]);
    }

    #[test]
    fn matches_canonical_names_embedded_in_a_sentence() {
        let canonical = vec![
            Topic { id: Uuid::new_v4(), name: "Databases".into(), description: None, parent_id: None },
            Topic { id: Uuid::new_v4(), name: "Rust Programming".into(), description: None, parent_id: None },
            Topic { id: Uuid::new_v4(), name: "Cooking".into(), description: None, parent_id: None },
        ];
        let names = match_topic_names("The topics are Databases and Rust Programming.", &canonical);
        assert_eq!(names.len(), 2);
        assert!(names.contains(&"Databases".to_string()));
        assert!(names.contains(&"Rust Programming".to_string()));
    }

    #[test]
    fn falls_back_to_comma_split_when_no_canonical_name_matches() {
        let canonical = vec![Topic { id: Uuid::new_v4(), name: "Databases".into(), description: None, parent_id: None }];
        let names = match_topic_names("Unknown", &canonical);
        assert_eq!(names, vec!["Unknown"]);
    }

    #[tokio::test]
    async fn empty_summaries_assigns_unknown() {
        let db = Db::in_memory().unwrap();
        let unknown = db.seed_default_topics().unwrap();
        let transcription_id = Uuid::new_v4();
        db.insert_media_file(&crate::db::models::MediaFile {
            id: Uuid::new_v4(),
            owner_id: "u1".into(),
            stored_path: "/tmp/x.mp3".into(),
            display_name: "x.mp3".into(),
            byte_size: 1,
            mime: None,
            duration_seconds: None,
            content_hash: "h".into(),
            origin: crate::db::models::Origin::Upload,
            origin_url: None,
            origin_platform: None,
            created_at: chrono::Utc::now(),
        })
        .unwrap();
        let media_file_id = db.list_media_files("u1").unwrap()[0].id;
        db.insert_pending_transcription(transcription_id, media_file_id, "u1").unwrap();

        let llm = LlmClient::new(crate::config::LlmSettings::default()).unwrap();
        let assigned = classify(&db, transcription_id, &ClassificationPrompts::default(), &llm, &mut || {})
            .await
            .unwrap();
        assert_eq!(assigned, vec![unknown]);
    }
}
