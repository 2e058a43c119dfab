use crate::config::TranslationConfig;
use crate::models::chat::ChatMessage;
use crate::services::ChatProvider;
use crate::utils::error::ApiError;
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};

/// Segment marker used by the frontend for DOM-based translation. The
/// translated output must contain exactly as many markers as the input.
pub const SEPARATOR: &str = "|||SEP|||";

const TRANSLATION_TEMPERATURE: f32 = 0.3;

const TRANSLATE_SYSTEM_PROMPT: &str = "You are an expert translator specializing in translating
technical content from English to Urdu. Produce natural, fluent Urdu
translations while preserving code blocks, technical terms, and markdown
formatting.";

fn language_name(code: &str) -> &'static str {
    match code {
        "ur" | "اردو" => "Urdu",
        _ => "Urdu",
    }
}

/// Chapter translator. Long content is packed into batches under a
/// character budget, and separator-format content keeps its segment
/// structure intact across the model boundary.
pub struct TranslateAgent {
    chat: Arc<dyn ChatProvider>,
    config: TranslationConfig,
}

impl TranslateAgent {
    pub fn new(chat: Arc<dyn ChatProvider>, config: TranslationConfig) -> Self {
        Self { chat, config }
    }

    fn check_language(&self, target_language: &str) -> Result<(), ApiError> {
        if self
            .config
            .supported_languages
            .iter()
            .any(|l| l == target_language)
        {
            Ok(())
        } else {
            Err(ApiError::UnsupportedLanguage(format!(
                "{}. Supported languages: {:?}",
                target_language, self.config.supported_languages
            )))
        }
    }

    async fn pause(&self) {
        let delay = Duration::from_secs(self.config.inter_call_delay_seconds);
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }
    }

    /// Translates one piece of content in a single model call.
    pub async fn translate(
        &self,
        content: &str,
        target_language: &str,
    ) -> Result<String, ApiError> {
        self.check_language(target_language)?;

        if content.trim().is_empty() {
            return Ok(String::new());
        }

        info!(
            "Translating content (length {}) to {}",
            content.len(),
            target_language
        );

        let messages = [
            ChatMessage::system(TRANSLATE_SYSTEM_PROMPT),
            ChatMessage::user(content),
        ];
        self.chat.complete(&messages, TRANSLATION_TEMPERATURE).await
    }

    /// Translates long content by chunking. Separator-format input goes
    /// through the segment-preserving path; plain prose is split on blank
    /// lines into batches under the character budget.
    pub async fn translate_chunked(
        &self,
        content: &str,
        target_language: &str,
    ) -> Result<String, ApiError> {
        self.check_language(target_language)?;
        let chunk_size = self.config.chunk_size;

        if content.contains(SEPARATOR) {
            return self
                .translate_with_separator(content, target_language, chunk_size)
                .await;
        }

        if content.len() <= chunk_size {
            return self.translate(content, target_language).await;
        }

        let chunks = pack_paragraphs(content, chunk_size);
        let mut translated = Vec::with_capacity(chunks.len());
        for (i, chunk) in chunks.iter().enumerate() {
            if i > 0 {
                self.pause().await;
            }
            translated.push(self.translate(chunk, target_language).await?);
        }

        Ok(translated.join("\n\n"))
    }

    async fn translate_with_separator(
        &self,
        content: &str,
        target_language: &str,
        chunk_size: usize,
    ) -> Result<String, ApiError> {
        let segments: Vec<&str> = content.split(SEPARATOR).collect();

        let mut translated_segments: Vec<String> = Vec::with_capacity(segments.len());
        let mut batch: Vec<&str> = Vec::new();
        let mut batch_size = 0;

        for segment in segments {
            let segment_size = segment.len() + SEPARATOR.len();

            if batch_size + segment_size > chunk_size && !batch.is_empty() {
                let batch_text = batch.join(SEPARATOR);
                let translated = self
                    .translate_preserving_separator(&batch_text, target_language)
                    .await?;
                translated_segments.extend(translated.split(SEPARATOR).map(String::from));
                self.pause().await;
                batch = vec![segment];
                batch_size = segment_size;
            } else {
                batch.push(segment);
                batch_size += segment_size;
            }
        }

        if !batch.is_empty() {
            let batch_text = batch.join(SEPARATOR);
            let translated = self
                .translate_preserving_separator(&batch_text, target_language)
                .await?;
            translated_segments.extend(translated.split(SEPARATOR).map(String::from));
        }

        Ok(translated_segments.join(SEPARATOR))
    }

    /// Translates one separator batch. If the model's output does not hold
    /// the same number of markers, falls back to translating each segment
    /// on its own.
    async fn translate_preserving_separator(
        &self,
        content: &str,
        target_language: &str,
    ) -> Result<String, ApiError> {
        let prompt = format!(
            "Translate the following text to {}.\n\n\
CRITICAL RULES:\n\
1. Keep all {sep} markers EXACTLY as they are - do not translate or modify them\n\
2. Translate ONLY the text between the markers\n\
3. Maintain the EXACT same number of {sep} markers in your output\n\
4. Do not add or remove any {sep} markers\n\
5. Output ONLY the translated text with markers, no explanations\n\n\
Text to translate:\n{}",
            language_name(target_language),
            content,
            sep = SEPARATOR,
        );

        let messages = [
            ChatMessage::system(TRANSLATE_SYSTEM_PROMPT),
            ChatMessage::user(prompt),
        ];
        let response = self.chat.complete(&messages, TRANSLATION_TEMPERATURE).await?;

        let expected = content.matches(SEPARATOR).count();
        let actual = response.matches(SEPARATOR).count();
        if actual == expected {
            return Ok(response);
        }

        warn!(
            "Separator count mismatch ({} expected, {} returned), translating segments individually",
            expected, actual
        );

        let segments: Vec<&str> = content.split(SEPARATOR).collect();
        let last = segments.len().saturating_sub(1);
        let mut translated = Vec::with_capacity(segments.len());
        for (i, segment) in segments.iter().enumerate() {
            if segment.trim().is_empty() {
                translated.push(segment.to_string());
                continue;
            }
            translated.push(self.translate(segment.trim(), target_language).await?);
            if i < last {
                self.pause().await;
            }
        }

        Ok(translated.join(SEPARATOR))
    }
}

/// Greedy blank-line packing: paragraphs accumulate until the next one
/// would push the batch over the budget.
fn pack_paragraphs(content: &str, chunk_size: usize) -> Vec<String> {
    let mut chunks = Vec::new();
    let mut current: Vec<&str> = Vec::new();
    let mut current_size = 0;

    for para in content.split("\n\n") {
        if current_size + para.len() > chunk_size && !current.is_empty() {
            chunks.push(current.join("\n\n"));
            current = vec![para];
            current_size = para.len();
        } else {
            current.push(para);
            current_size += para.len();
        }
    }

    if !current.is_empty() {
        chunks.push(current.join("\n\n"));
    }

    chunks
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use std::collections::VecDeque;
    use std::sync::Mutex;

    /// Chat fake that replays queued responses and records every prompt.
    struct ScriptedChat {
        responses: Mutex<VecDeque<String>>,
        prompts: Mutex<Vec<String>>,
    }

    impl ScriptedChat {
        fn new(responses: Vec<&str>) -> Self {
            Self {
                responses: Mutex::new(responses.into_iter().map(String::from).collect()),
                prompts: Mutex::new(Vec::new()),
            }
        }

        fn calls(&self) -> usize {
            self.prompts.lock().unwrap().len()
        }
    }

    #[async_trait]
    impl ChatProvider for ScriptedChat {
        async fn complete(
            &self,
            messages: &[ChatMessage],
            _temperature: f32,
        ) -> Result<String, ApiError> {
            let prompt = messages
                .last()
                .map(|m| m.content.clone())
                .unwrap_or_default();
            self.prompts.lock().unwrap().push(prompt);
            self.responses
                .lock()
                .unwrap()
                .pop_front()
                .ok_or_else(|| ApiError::Internal("Scripted responses exhausted".to_string()))
        }
    }

    fn config(chunk_size: usize) -> TranslationConfig {
        TranslationConfig {
            supported_languages: vec!["ur".to_string()],
            chunk_size,
            inter_call_delay_seconds: 0,
        }
    }

    fn agent(chat: Arc<ScriptedChat>, chunk_size: usize) -> TranslateAgent {
        TranslateAgent::new(chat, config(chunk_size))
    }

    #[tokio::test]
    async fn test_unsupported_language_is_rejected() {
        let chat = Arc::new(ScriptedChat::new(vec![]));
        let err = agent(chat.clone(), 4000)
            .translate("hello", "fr")
            .await
            .unwrap_err();
        assert!(matches!(err, ApiError::UnsupportedLanguage(_)));
        assert_eq!(chat.calls(), 0);
    }

    #[tokio::test]
    async fn test_blank_content_translates_to_empty() {
        let chat = Arc::new(ScriptedChat::new(vec![]));
        let result = agent(chat.clone(), 4000)
            .translate("   \n  ", "ur")
            .await
            .unwrap();
        assert_eq!(result, "");
        assert_eq!(chat.calls(), 0);
    }

    #[tokio::test]
    async fn test_separator_count_preserved_on_clean_response() {
        let chat = Arc::new(ScriptedChat::new(vec!["الف|||SEP|||ب|||SEP|||ج"]));
        let result = agent(chat.clone(), 4000)
            .translate_chunked("A|||SEP|||B|||SEP|||C", "ur")
            .await
            .unwrap();

        assert_eq!(result, "الف|||SEP|||ب|||SEP|||ج");
        assert_eq!(result.matches(SEPARATOR).count(), 2);
        assert_eq!(chat.calls(), 1);
    }

    #[tokio::test]
    async fn test_corrupt_separator_response_falls_back_per_segment() {
        // Batch response loses the markers, then each segment is retried.
        let chat = Arc::new(ScriptedChat::new(vec![
            "الف ب ج",
            "الف",
            "ب",
            "ج",
        ]));
        let result = agent(chat.clone(), 4000)
            .translate_chunked("A|||SEP|||B|||SEP|||C", "ur")
            .await
            .unwrap();

        assert_eq!(result, "الف|||SEP|||ب|||SEP|||ج");
        assert_eq!(chat.calls(), 4);
    }

    #[tokio::test]
    async fn test_whitespace_segments_pass_through_fallback_unchanged() {
        let chat = Arc::new(ScriptedChat::new(vec!["broken", "الف"]));
        let result = agent(chat.clone(), 4000)
            .translate_chunked("A|||SEP|||  ", "ur")
            .await
            .unwrap();

        assert_eq!(result, "الف|||SEP|||  ");
        // one batch call plus one fallback call for the non-blank segment
        assert_eq!(chat.calls(), 2);
    }

    #[tokio::test]
    async fn test_oversized_separator_content_is_batched() {
        let a = "a".repeat(30);
        let b = "b".repeat(30);
        let c = "c".repeat(30);
        let content = format!("{}|||SEP|||{}|||SEP|||{}", a, b, c);

        // budget of 60 chars forces one batch per segment
        let chat = Arc::new(ScriptedChat::new(vec!["x", "y", "z"]));
        let result = agent(chat.clone(), 60)
            .translate_chunked(&content, "ur")
            .await
            .unwrap();

        assert_eq!(result, "x|||SEP|||y|||SEP|||z");
        assert_eq!(chat.calls(), 3);
    }

    #[tokio::test]
    async fn test_short_prose_translates_in_one_call() {
        let chat = Arc::new(ScriptedChat::new(vec!["ترجمہ"]));
        let result = agent(chat.clone(), 4000)
            .translate_chunked("Short paragraph.", "ur")
            .await
            .unwrap();
        assert_eq!(result, "ترجمہ");
        assert_eq!(chat.calls(), 1);
    }

    #[tokio::test]
    async fn test_long_prose_is_split_on_paragraphs() {
        let para = "word ".repeat(20);
        let content = format!("{}\n\n{}", para.trim(), para.trim());

        let chat = Arc::new(ScriptedChat::new(vec!["ایک", "دو"]));
        let result = agent(chat.clone(), 120)
            .translate_chunked(&content, "ur")
            .await
            .unwrap();

        assert_eq!(result, "ایک\n\nدو");
        assert_eq!(chat.calls(), 2);
    }

    #[test]
    fn test_paragraph_packing_respects_budget() {
        let content = "aaaa\n\nbbbb\n\ncccc";
        let chunks = pack_paragraphs(content, 9);
        assert_eq!(chunks, vec!["aaaa\n\nbbbb", "cccc"]);

        let single = pack_paragraphs(content, 1000);
        assert_eq!(single, vec![content.to_string()]);
    }
}
