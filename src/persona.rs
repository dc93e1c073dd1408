use anyhow::Context as _;

use crate::cli::PersonaAnalyzeArgs;
use crate::config::LlmConfig;
use crate::llm::{LlmClient, Prompt, build_client, extract_json};
use crate::model::{PersonaAnalysis, PersonaPreferences, WritingPersona, new_id};
use crate::store::{LocalFsStore, PersonaStore};

/// Samples longer than this are truncated before analysis.
const MAX_SAMPLE_CHARS: usize = 12_000;

pub async fn analyze_writing_sample(
    llm: &dyn LlmClient,
    name: &str,
    sample: &str,
) -> anyhow::Result<WritingPersona> {
    let sample = sample.trim();
    if sample.is_empty() {
        anyhow::bail!("writing sample is empty");
    }
    let sample = truncate_chars(sample, MAX_SAMPLE_CHARS);

    let prompt = Prompt::new(format!(
        "Analyze the writing style of the sample below.\n\
\n\
BEGIN_SAMPLE\n\
{sample}\n\
END_SAMPLE\n\
\n\
Output ONLY a single JSON object (no commentary) with this schema:\n\
{{\"tone\":\"...\",\"vocabulary_level\":\"...\",\"sentence_structure\":\"...\",\"pacing\":\"...\",\"voice\":\"...\",\"themes\":[\"...\"],\"signature_phrases\":[\"...\"],\"summary\":\"one paragraph describing how to imitate this style\"}}\n"
    ))
    .with_system("You are a literary editor who describes prose style precisely.")
    .with_temperature(0.2);

    tracing::info!(persona = name, sample_chars = sample.len(), "analyze writing sample");
    let raw = llm.complete(&prompt).await.context("call llm for style analysis")?;
    let analysis: PersonaAnalysis = extract_json(&raw).context("parse style analysis")?;
    if analysis.summary.trim().is_empty() {
        anyhow::bail!("style analysis summary is empty");
    }

    Ok(WritingPersona {
        id: new_id(),
        name: name.to_owned(),
        description: analysis.summary.clone(),
        analysis: Some(analysis),
        preferences: PersonaPreferences::default(),
    })
}

/// Analyzes a sample file, saves the persona and prints its id.
pub async fn analyze(args: PersonaAnalyzeArgs) -> anyhow::Result<()> {
    let sample = tokio::fs::read_to_string(&args.sample)
        .await
        .with_context(|| format!("read sample: {}", args.sample.display()))?;
    let llm = build_client(args.engine, &LlmConfig::from_env()?)?;

    let persona = analyze_writing_sample(llm.as_ref(), &args.name, &sample).await?;
    LocalFsStore::new(&args.store.data_dir)
        .put_persona(&persona)
        .await
        .context("save persona")?;
    println!("{}", persona.id);
    Ok(())
}

/// Renders a persona into prompt instructions.
pub fn style_instructions(persona: &WritingPersona) -> String {
    let mut out = format!("Write in the voice of the persona \"{}\".\n", persona.name);
    if !persona.description.trim().is_empty() {
        out.push_str(&format!("Persona: {}\n", persona.description.trim()));
    }
    if let Some(analysis) = &persona.analysis {
        out.push_str(&format!(
            "Style: tone {}; vocabulary {}; sentences {}; pacing {}; voice {}.\n",
            analysis.tone,
            analysis.vocabulary_level,
            analysis.sentence_structure,
            analysis.pacing,
            analysis.voice
        ));
        if !analysis.signature_phrases.is_empty() {
            out.push_str(&format!(
                "Occasionally echo phrasing like: {}.\n",
                analysis.signature_phrases.join("; ")
            ));
        }
    }
    let prefs = &persona.preferences;
    if !prefs.avoided_topics.is_empty() {
        out.push_str(&format!("Never cover: {}.\n", prefs.avoided_topics.join(", ")));
    }
    if !prefs.instructions.trim().is_empty() {
        out.push_str(&format!("Extra instructions: {}\n", prefs.instructions.trim()));
    }
    out
}

pub(crate) fn truncate_chars(input: &str, max_chars: usize) -> &str {
    match input.char_indices().nth(max_chars) {
        Some((idx, _)) => &input[..idx],
        None => input,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn style_instructions_include_analysis_and_preferences() {
        let persona = WritingPersona {
            id: "p1".to_owned(),
            name: "Noir".to_owned(),
            description: "Hard-boiled narrator.".to_owned(),
            analysis: Some(PersonaAnalysis {
                tone: "cynical".to_owned(),
                signature_phrases: vec!["the rain never stops".to_owned()],
                summary: "Short, punchy.".to_owned(),
                ..PersonaAnalysis::default()
            }),
            preferences: PersonaPreferences {
                avoided_topics: vec!["politics".to_owned()],
                instructions: "Use present tense.".to_owned(),
                ..PersonaPreferences::default()
            },
        };

        let text = style_instructions(&persona);
        assert!(text.contains("\"Noir\""));
        assert!(text.contains("tone cynical"));
        assert!(text.contains("the rain never stops"));
        assert!(text.contains("Never cover: politics."));
        assert!(text.contains("Use present tense."));
    }

    #[test]
    fn truncate_chars_respects_utf8() {
        assert_eq!(truncate_chars("héllo", 2), "hé");
        assert_eq!(truncate_chars("hi", 10), "hi");
    }
}
