use crate::defaults;
use crate::error::{PipelineError, Result};
use serde::Serialize;
use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

/// One translated sentence or paragraph.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TranslationResult {
    pub source_text: String,
    pub translated_text: String,
    pub source_lang: String,
    pub target_lang: String,
}

impl TranslationResult {
    pub fn new(source_text: impl Into<String>, translated_text: impl Into<String>) -> Self {
        Self {
            source_text: source_text.into(),
            translated_text: translated_text.into(),
            source_lang: defaults::SOURCE_LANGUAGE.to_string(),
            target_lang: defaults::TARGET_LANGUAGE.to_string(),
        }
    }
}

/// Trait for text translation.
///
/// A translator wraps one loaded model for a single language pair.
pub trait Translator: Send + Sync {
    /// Translate `text` from the model's source to its target language.
    ///
    /// Empty or whitespace-only input fails with `EmptyInput`.
    fn translate(&self, text: &str) -> Result<TranslationResult>;

    fn model_name(&self) -> &str;

    /// Source and target language codes of the loaded model.
    fn language_pair(&self) -> (&str, &str) {
        (defaults::SOURCE_LANGUAGE, defaults::TARGET_LANGUAGE)
    }

    /// Translate with an explicit language pair, rejecting pairs the model
    /// was not trained for.
    fn translate_between(
        &self,
        text: &str,
        source_lang: &str,
        target_lang: &str,
    ) -> Result<TranslationResult> {
        let (source, target) = self.language_pair();
        if source != source_lang || target != target_lang {
            return Err(PipelineError::TranslationFailure {
                message: format!(
                    "model {} translates {}->{}, not {}->{}",
                    self.model_name(),
                    source,
                    target,
                    source_lang,
                    target_lang
                ),
            });
        }
        self.translate(text)
    }
}

impl<T: Translator + ?Sized> Translator for Arc<T> {
    fn translate(&self, text: &str) -> Result<TranslationResult> {
        (**self).translate(text)
    }

    fn model_name(&self) -> &str {
        (**self).model_name()
    }

    fn language_pair(&self) -> (&str, &str) {
        (**self).language_pair()
    }
}

/// Trim `text` and reject it when nothing is left.
pub fn validate_input(text: &str) -> Result<&str> {
    let trimmed = text.trim();
    if trimmed.is_empty() {
        return Err(PipelineError::EmptyInput);
    }
    Ok(trimmed)
}

/// Mock translator for testing.
///
/// Unless a fixed response or a phrase table entry matches, it answers
/// `"en: <input>"` so tests can trace which input produced which output.
#[derive(Debug, Clone, Default)]
pub struct MockTranslator {
    response: Option<String>,
    phrases: HashMap<String, String>,
    failure: Option<String>,
    panics: bool,
    calls: Arc<AtomicUsize>,
}

impl MockTranslator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Always answer with `response`.
    pub fn with_response(mut self, response: &str) -> Self {
        self.response = Some(response.to_string());
        self
    }

    /// Answer `target` when the trimmed input equals `source`.
    pub fn with_phrase(mut self, source: &str, target: &str) -> Self {
        self.phrases.insert(source.to_string(), target.to_string());
        self
    }

    /// Configure the mock to fail on translate
    pub fn with_failure(mut self, message: &str) -> Self {
        self.failure = Some(message.to_string());
        self
    }

    /// Configure the mock to panic on translate
    pub fn with_panic(mut self) -> Self {
        self.panics = true;
        self
    }

    pub fn call_count(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

impl Translator for MockTranslator {
    fn translate(&self, text: &str) -> Result<TranslationResult> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let text = validate_input(text)?;
        if self.panics {
            panic!("mock translator panic");
        }
        if let Some(message) = &self.failure {
            return Err(PipelineError::TranslationFailure {
                message: message.clone(),
            });
        }
        let translated = self
            .phrases
            .get(text)
            .cloned()
            .or_else(|| self.response.clone())
            .unwrap_or_else(|| format!("en: {}", text));
        Ok(TranslationResult::new(text, translated))
    }

    fn model_name(&self) -> &str {
        "mock-translator"
    }
}
