//! Prompts sent to the translation model.
//!
//! Kept apart from [`crate::pipeline::translate`] so wording can change
//! without touching request handling.

/// System prompt for one page of translation.
///
/// Scanned books come with OCR noise (broken hyphenation, stray symbols,
/// running heads). The model is asked to translate what is there and leave
/// page furniture alone, never to summarise or comment.
pub fn translation_system_prompt(source_language: &str, target_language: &str) -> String {
    format!(
        "You are a careful translator of historical documents.\n\
         Translate the user's text from the language with tag '{source_language}' \
         into the language with tag '{target_language}'.\n\
         Rules:\n\
         1. Output ONLY the translation, with no preface, notes or quotation marks.\n\
         2. Preserve line breaks and paragraph structure.\n\
         3. The text comes from OCR; silently repair obvious recognition errors \
            and hyphenation across line ends.\n\
         4. Keep proper names, numerals and page numbers as they are.\n\
         5. If a fragment is illegible, reproduce it unchanged."
    )
}
