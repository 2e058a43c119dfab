use crate::database::models::ConversationMode;
use crate::models::chat::{ChatMessage, SourceReference};
use crate::services::ChatProvider;
use crate::utils::error::ApiError;
use std::sync::Arc;
use tracing::info;

/// Stock reply when retrieval found nothing above the confidence threshold
/// in full-book mode. Returned verbatim, without calling the model.
pub const NOT_COVERED_RESPONSE: &str = "This topic is not covered in this book. The book focuses on the \
specific technical content that has been indexed. You might want \
to consult other resources for information about this topic.";

/// Stock reply for the selected-text mode equivalent.
pub const NOT_IN_SELECTION_RESPONSE: &str = "This is not mentioned in the selected text. The selection focuses on \
specific content that doesn't cover this topic. Please select \
additional text if you need information about this.";

const FULL_BOOK_SYSTEM_PROMPT: &str = "You are an expert AI assistant specialized in answering questions
about technical book content. Base your answers ONLY on the provided context.
If the question cannot be answered from the context, say \"This topic is not
covered in this book.\" Always cite your sources with chapter and page numbers.";

const SELECTED_TEXT_SYSTEM_PROMPT: &str = "You are an expert AI assistant helping users understand
selected text. Base your answers ONLY on the selected text provided.
If the question cannot be answered from the selection, say \"This is not
mentioned in the selected text.\"";

const ANSWER_TEMPERATURE: f32 = 0.3;

/// Mode-aware response generator. Grounding is enforced twice: the gate
/// short-circuits uncovered questions, and the prompts restrict the model
/// to the supplied context.
pub struct RagAgent {
    chat: Arc<dyn ChatProvider>,
    history_limit: usize,
}

impl RagAgent {
    pub fn new(chat: Arc<dyn ChatProvider>, history_limit: usize) -> Self {
        Self { chat, history_limit }
    }

    pub async fn generate_response(
        &self,
        query: &str,
        context: Option<&str>,
        history: &[ChatMessage],
        is_covered: bool,
        mode: ConversationMode,
        personalization: Option<&str>,
    ) -> Result<String, ApiError> {
        let context = context.filter(|c| !c.is_empty());

        if !is_covered || context.is_none() {
            info!(
                "Returning stock response (covered: {}, mode: {})",
                is_covered,
                mode.as_str()
            );
            return Ok(match mode {
                ConversationMode::SelectedText => NOT_IN_SELECTION_RESPONSE.to_string(),
                ConversationMode::FullBook => NOT_COVERED_RESPONSE.to_string(),
            });
        }

        let context = context.unwrap_or_default();
        let messages = self.build_messages(query, context, history, mode, personalization);

        info!(
            "Generating answer with {} messages (mode: {})",
            messages.len(),
            mode.as_str()
        );
        self.chat.complete(&messages, ANSWER_TEMPERATURE).await
    }

    fn build_messages(
        &self,
        query: &str,
        context: &str,
        history: &[ChatMessage],
        mode: ConversationMode,
        personalization: Option<&str>,
    ) -> Vec<ChatMessage> {
        let base_prompt = match mode {
            ConversationMode::SelectedText => SELECTED_TEXT_SYSTEM_PROMPT,
            ConversationMode::FullBook => FULL_BOOK_SYSTEM_PROMPT,
        };
        let system_prompt = match personalization {
            Some(p) => format!("{}\n\n{}", base_prompt, p),
            None => base_prompt.to_string(),
        };

        let mut messages = vec![ChatMessage::system(system_prompt)];

        // Last N messages only; older turns fall out of the token budget.
        let start = history.len().saturating_sub(self.history_limit);
        messages.extend_from_slice(&history[start..]);

        let context_block = match mode {
            ConversationMode::SelectedText => format_selected_text_prompt(context),
            ConversationMode::FullBook => format_context_prompt(context),
        };
        let user_note = personalization
            .map(|p| format!("\n\n[User Context: {}]", p))
            .unwrap_or_default();

        messages.push(ChatMessage::user(format!(
            "{}{}\n\nQuestion: {}",
            context_block, user_note, query
        )));

        messages
    }
}

fn format_context_prompt(context: &str) -> String {
    format!(
        "Here is the relevant content from the book that you should use to answer the question:\n\n\
<book_context>\n{}\n</book_context>\n\n\
Please answer the following question based ONLY on the context provided above.\n\
If the answer is not in the context, say \"This topic is not covered in this book.\"\n\
Always cite the specific chapter, section, and page numbers from the sources.",
        context
    )
}

fn format_selected_text_prompt(selected_text: &str) -> String {
    format!(
        "Here is the text that the user has selected and wants to discuss:\n\n\
<selected_text>\n{}\n</selected_text>\n\n\
Please answer the following question based ONLY on the selected text provided above.\n\
Do not use any external knowledge or content from outside the selection.\n\
If the question asks about something not mentioned in the selected text,\n\
say \"This is not mentioned in the selected text.\"",
        selected_text
    )
}

/// Renders source references as a citation line, e.g.
/// `Sources: [Ch 3, Synapses, Page 41], [Ch 4]`.
pub fn format_source_citations(sources: &[SourceReference]) -> String {
    if sources.is_empty() {
        return String::new();
    }

    let citations: Vec<String> = sources
        .iter()
        .map(|s| {
            let mut citation = format!("[{}", s.chapter);
            if let Some(section) = &s.section {
                citation.push_str(&format!(", {}", section));
            }
            if let Some(page) = s.page {
                citation.push_str(&format!(", Page {}", page));
            }
            citation.push(']');
            citation
        })
        .collect();

    format!("Sources: {}", citations.join(", "))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::services::MockChatProvider;

    fn agent(mock: MockChatProvider) -> RagAgent {
        RagAgent::new(Arc::new(mock), 20)
    }

    #[tokio::test]
    async fn test_uncovered_full_book_returns_stock_response_without_model_call() {
        let mut mock = MockChatProvider::new();
        mock.expect_complete().times(0);

        let response = agent(mock)
            .generate_response(
                "what about quantum computing?",
                Some("irrelevant context"),
                &[],
                false,
                ConversationMode::FullBook,
                None,
            )
            .await
            .unwrap();

        assert_eq!(response, NOT_COVERED_RESPONSE);
    }

    #[tokio::test]
    async fn test_uncovered_selection_returns_selection_response() {
        let mut mock = MockChatProvider::new();
        mock.expect_complete().times(0);

        let response = agent(mock)
            .generate_response(
                "who wrote this?",
                Some("some selection"),
                &[],
                false,
                ConversationMode::SelectedText,
                None,
            )
            .await
            .unwrap();

        assert_eq!(response, NOT_IN_SELECTION_RESPONSE);
    }

    #[tokio::test]
    async fn test_empty_context_short_circuits_even_when_covered() {
        let mut mock = MockChatProvider::new();
        mock.expect_complete().times(0);

        let response = agent(mock)
            .generate_response(
                "anything",
                None,
                &[],
                true,
                ConversationMode::FullBook,
                None,
            )
            .await
            .unwrap();

        assert_eq!(response, NOT_COVERED_RESPONSE);
    }

    #[tokio::test]
    async fn test_covered_query_calls_model_with_system_prompt_first() {
        let mut mock = MockChatProvider::new();
        mock.expect_complete()
            .withf(|messages, temperature| {
                *temperature == 0.3
                    && messages[0].role.as_str() == "system"
                    && messages
                        .last()
                        .map(|m| m.content.contains("Question: how do neurons fire?"))
                        .unwrap_or(false)
            })
            .times(1)
            .returning(|_, _| Ok("Neurons fire via action potentials.".to_string()));

        let response = agent(mock)
            .generate_response(
                "how do neurons fire?",
                Some("[Source: Ch 2]\nAction potentials..."),
                &[],
                true,
                ConversationMode::FullBook,
                None,
            )
            .await
            .unwrap();

        assert_eq!(response, "Neurons fire via action potentials.");
    }

    #[tokio::test]
    async fn test_history_is_trimmed_to_limit() {
        let history: Vec<ChatMessage> = (0..30)
            .map(|i| ChatMessage::user(format!("message {}", i)))
            .collect();

        let mut mock = MockChatProvider::new();
        mock.expect_complete()
            // system + 20 history + 1 user turn
            .withf(|messages, _| {
                messages.len() == 22 && messages[1].content == "message 10"
            })
            .times(1)
            .returning(|_, _| Ok("ok".to_string()));

        agent(mock)
            .generate_response(
                "q",
                Some("context"),
                &history,
                true,
                ConversationMode::FullBook,
                None,
            )
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn test_personalization_appended_to_system_prompt() {
        let mut mock = MockChatProvider::new();
        mock.expect_complete()
            .withf(|messages, _| {
                messages[0].content.contains("Explain concepts thoroughly")
                    && messages
                        .last()
                        .map(|m| m.content.contains("[User Context:"))
                        .unwrap_or(false)
            })
            .times(1)
            .returning(|_, _| Ok("ok".to_string()));

        agent(mock)
            .generate_response(
                "q",
                Some("context"),
                &[],
                true,
                ConversationMode::FullBook,
                Some("Explain concepts thoroughly, assuming no prior background."),
            )
            .await
            .unwrap();
    }

    #[test]
    fn test_citation_formatting() {
        let sources = vec![
            SourceReference {
                chapter: "Ch 3".to_string(),
                section: Some("Synapses".to_string()),
                page: Some(41),
                relevance: 0.9,
            },
            SourceReference {
                chapter: "Ch 4".to_string(),
                section: None,
                page: None,
                relevance: 0.8,
            },
        ];

        assert_eq!(
            format_source_citations(&sources),
            "Sources: [Ch 3, Synapses, Page 41], [Ch 4]"
        );
        assert_eq!(format_source_citations(&[]), "");
    }
}
