//! Prompt templates for correction and translation.
//!
//! Centralising every prompt here means changing the editorial guidelines
//! requires editing exactly one place, and unit tests can inspect the
//! rendered prompts without calling a model.
//!
//! The templates are parameterised by language names taken from
//! [`crate::config::BatchConfig`]; the defaults target early 16th-century
//! Latin correspondence translated into modern Dutch.

/// System message for the correction pass.
pub fn correction_system_prompt(source_language: &str) -> String {
    format!("You are an expert in early 16th century {source_language} manuscripts.")
}

/// User message for the correction pass.
pub fn correction_prompt(source_language: &str, text: &str) -> String {
    format!(
        r#"You are an expert in early 16th century {source_language} manuscripts. Your task is to correct transcription errors in the following {source_language} text while staying very close to the original.

Guidelines:
1. Focus only on fixing obvious transcription errors
2. Preserve period-specific abbreviations and spelling characteristics
3. Make minimal changes to the text
4. Do not modernize or standardize the {source_language}
5. Preserve the original style and tone

Original {source_language} text:
{text}

Provide only the corrected {source_language} text without any explanations or comments:"#
    )
}

/// System message for the translation pass.
pub fn translation_system_prompt(source_language: &str, target_language: &str) -> String {
    format!(
        "You are an expert translator of early 16th century {source_language} to modern {target_language}."
    )
}

/// User message for the translation pass.
pub fn translation_prompt(source_language: &str, target_language: &str, text: &str) -> String {
    format!(
        r#"You are an expert translator of early 16th century {source_language} to modern {target_language}. Translate the following {source_language} text into convivial, accessible {target_language}.

Guidelines:
1. Create natural, conversational {target_language} that modern readers can easily understand
2. Maintain fidelity to the original {source_language} meaning and tone
3. Preserve the warmth and personality of the original correspondence
4. Use accessible language while respecting the historical context

{source_language} text to translate:
{text}

Provide only the {target_language} translation without any explanations or comments:"#
    )
}
