use std::sync::Arc;

use crate::error::{RagError, Result};
use crate::indexer::document::ScoredDocument;
use crate::llm::LanguageModel;

/// Returned verbatim when nothing was retrieved; the prompt asks the model for it too.
pub const FALLBACK_PHRASE: &str = "No exact match found, but here are related options.";

const CONTEXT_SEPARATOR: &str = "\n\n---\n\n";

/// Single-pass render: user text and document text are never rescanned for placeholders.
fn advisor_prompt(context: &str, question: &str) -> String {
    format!(
        "\
You are a helpful **Course Advisor** assisting students in finding the most suitable courses.
Use only the provided course data to answer. If the information is not available in the context, say so.
Be clear, concise, and student-friendly in your response.

---
### Context (retrieved data):
{context}

### Student's Question:
{question}

### Your Response (structured and helpful):
- Provide a direct answer to the student's question.
- If relevant, list matching courses with **Title, Code, Department, Professor, and Meeting Time**.
- Summarize in a way that makes it easy for students to decide.
- If no relevant course is found, say: *\"{FALLBACK_PHRASE}\"*
"
    )
}

#[derive(Debug, Clone)]
pub struct Answer {
    pub answer: String,
    pub sources: Vec<ScoredDocument>,
}

pub struct AnswerSynthesizer {
    model: Arc<dyn LanguageModel>,
}

impl AnswerSynthesizer {
    pub fn new(model: Arc<dyn LanguageModel>) -> Self {
        Self { model }
    }

    pub async fn synthesize(&self, question: &str, documents: Vec<ScoredDocument>) -> Result<Answer> {
        if documents.is_empty() {
            tracing::info!("no documents retrieved, skipping generation");
            return Ok(Answer {
                answer: FALLBACK_PHRASE.to_string(),
                sources: documents,
            });
        }

        let prompt = build_prompt(question, &documents);
        let answer = self.model.generate(&prompt).await?;
        if answer.trim().is_empty() {
            return Err(RagError::Generation("model returned an empty answer".to_string()));
        }

        Ok(Answer { answer, sources: documents })
    }
}

/// Render one context block per document: metadata lines, score, then content.
pub fn build_context(documents: &[ScoredDocument]) -> String {
    documents
        .iter()
        .map(|doc| {
            let mut block = String::from("Metadata:\n");
            for (key, value) in doc.document.metadata.entries() {
                block.push_str(&key);
                block.push_str(": ");
                block.push_str(&value);
                block.push('\n');
            }
            block.push_str(&format!("score: {}\nContent:\n{}", doc.score, doc.document.content));
            block
        })
        .collect::<Vec<_>>()
        .join(CONTEXT_SEPARATOR)
}

pub fn build_prompt(question: &str, documents: &[ScoredDocument]) -> String {
    advisor_prompt(&build_context(documents), question)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::indexer::document::{CourseFields, Document, Metadata, SourceFamily};
    use async_trait::async_trait;
    use std::sync::Mutex;

    /// Replays a fixed reply and records every prompt it was given.
    struct ScriptedModel {
        reply: std::result::Result<String, String>,
        prompts: Mutex<Vec<String>>,
    }

    impl ScriptedModel {
        fn replying(reply: &str) -> Arc<Self> {
            Arc::new(Self { reply: Ok(reply.to_string()), prompts: Mutex::new(Vec::new()) })
        }

        fn failing(message: &str) -> Arc<Self> {
            Arc::new(Self { reply: Err(message.to_string()), prompts: Mutex::new(Vec::new()) })
        }
    }

    #[async_trait]
    impl LanguageModel for ScriptedModel {
        async fn generate(&self, prompt: &str) -> Result<String> {
            self.prompts.lock().unwrap().push(prompt.to_string());
            self.reply.clone().map_err(RagError::Generation)
        }
    }

    fn scored(code: &str, content: &str, score: f32) -> ScoredDocument {
        let mut meta = Metadata::new("fall_2025_courses.json", SourceFamily::StructuredCourseJson);
        meta.course = Some(CourseFields {
            code: code.into(),
            title: "Intro to Software Engineering".into(),
            ..Default::default()
        });
        ScoredDocument { document: Document::new(content, meta), score }
    }

    #[tokio::test]
    async fn test_no_documents_returns_fallback_without_calling_model() {
        let model = ScriptedModel::replying("unused");
        let synthesizer = AnswerSynthesizer::new(model.clone());
        let answer = synthesizer.synthesize("quantum basket weaving", Vec::new()).await.unwrap();
        assert!(answer.answer.contains(FALLBACK_PHRASE));
        assert!(model.prompts.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_prompt_contains_context_and_question() {
        let model = ScriptedModel::replying("Take CSCI0320.");
        let synthesizer = AnswerSynthesizer::new(model.clone());
        let docs = vec![scored("CSCI0320", "Build software in teams.", 0.75), scored("MATH0100", "Limits.", 0.1)];

        let answer = synthesizer.synthesize("software engineering?", docs).await.unwrap();
        assert_eq!(answer.answer, "Take CSCI0320.");
        assert_eq!(answer.sources.len(), 2);

        let prompts = model.prompts.lock().unwrap();
        let prompt = &prompts[0];
        assert!(prompt.contains("### Student's Question:\nsoftware engineering?"));
        assert!(prompt.contains("code: CSCI0320\n"));
        assert!(prompt.contains("score: 0.75\nContent:\nBuild software in teams."));
        assert!(prompt.contains(CONTEXT_SEPARATOR));
        assert!(prompt.contains(FALLBACK_PHRASE));
    }

    #[test]
    fn test_context_block_layout() {
        let context = build_context(&[scored("CSCI0320", "Body", 0.5)]);
        assert!(context.starts_with("Metadata:\nsource: fall_2025_courses.json\n"));
        assert!(context.ends_with("score: 0.5\nContent:\nBody"));
    }

    #[test]
    fn test_placeholders_in_user_text_stay_literal() {
        let docs = [scored("CSCI0320", "Covers {question} templating.", 0.5)];
        let prompt = build_prompt("what is {context}? also {fallback}", &docs);

        assert!(prompt.contains("### Student's Question:\nwhat is {context}? also {fallback}\n"));
        assert!(prompt.contains("Content:\nCovers {question} templating."));
        assert_eq!(prompt.matches("Metadata:\n").count(), 1);
        assert_eq!(prompt.matches(FALLBACK_PHRASE).count(), 1);
    }

    #[tokio::test]
    async fn test_model_failure_and_blank_output_are_generation_errors() {
        let docs = vec![scored("CSCI0320", "Body", 0.5)];

        let synthesizer = AnswerSynthesizer::new(ScriptedModel::failing("quota exceeded"));
        let err = synthesizer.synthesize("q", docs.clone()).await.unwrap_err();
        assert!(matches!(err, RagError::Generation(ref m) if m.contains("quota")));

        let synthesizer = AnswerSynthesizer::new(ScriptedModel::replying("  \n "));
        let err = synthesizer.synthesize("q", docs).await.unwrap_err();
        assert!(matches!(err, RagError::Generation(_)));
    }
}
