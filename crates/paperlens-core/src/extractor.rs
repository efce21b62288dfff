//! Schema-driven record extraction through a completion service.

use std::sync::Arc;

use crate::DocumentError;
use crate::completion::{CompletionClient, CompletionRequest};
use crate::record::PaperRecord;
use crate::retry::{RetryPolicy, complete_with_retry};
use crate::schema::Schema;

const EXTRACTION_TEMPLATE: &str = "You are an expert in extracting relevant information from a paper.

Extract all the following values given in {format_instructions} from the paper with the following text:

'''{pages}'''.

Do not come up with other values than the ones given to you. Think really hard and in a methodical way to only extract the relevant information.
";

/// The prompt pieces for one document. Lives for a single completion call.
#[derive(Debug, Clone)]
pub struct ExtractionRequest<'a> {
    pub document_text: &'a str,
    pub instructions: &'a str,
}

impl ExtractionRequest<'_> {
    /// Render the full prompt. The document text is embedded verbatim.
    pub fn render(&self) -> String {
        // Single pass over the template: substituted text is never rescanned
        // for placeholders.
        let mut prompt = String::with_capacity(
            EXTRACTION_TEMPLATE.len() + self.instructions.len() + self.document_text.len(),
        );
        let mut rest = EXTRACTION_TEMPLATE;
        while let Some(open) = rest.find('{') {
            let (before, tail) = rest.split_at(open);
            prompt.push_str(before);
            if let Some(after) = tail.strip_prefix("{format_instructions}") {
                prompt.push_str(self.instructions);
                rest = after;
            } else if let Some(after) = tail.strip_prefix("{pages}") {
                prompt.push_str(self.document_text);
                rest = after;
            } else {
                prompt.push('{');
                rest = &tail[1..];
            }
        }
        prompt.push_str(rest);
        prompt
    }
}

/// Model settings for extraction calls.
#[derive(Debug, Clone, PartialEq)]
pub struct ModelSettings {
    pub model: String,
    pub temperature: f32,
    pub json_mode: bool,
}

impl Default for ModelSettings {
    fn default() -> Self {
        Self {
            model: crate::DEFAULT_MODEL.to_string(),
            temperature: crate::DEFAULT_TEMPERATURE,
            json_mode: true,
        }
    }
}

/// Turns document text into a [`PaperRecord`] with one completion call.
pub struct RecordExtractor {
    schema: Arc<Schema>,
    client: Arc<dyn CompletionClient>,
    settings: ModelSettings,
    retry: RetryPolicy,
    /// Rendered once; the schema never changes after startup.
    instructions: String,
}

impl RecordExtractor {
    pub fn new(schema: Arc<Schema>, client: Arc<dyn CompletionClient>) -> Self {
        let instructions = schema.format_instructions();
        Self {
            schema,
            client,
            settings: ModelSettings::default(),
            retry: RetryPolicy::default(),
            instructions,
        }
    }

    pub fn with_settings(mut self, settings: ModelSettings) -> Self {
        self.settings = settings;
        self
    }

    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    pub fn schema(&self) -> &Arc<Schema> {
        &self.schema
    }

    /// Build the completion request for `text` without sending it.
    pub fn build_request(&self, text: &str) -> CompletionRequest {
        let prompt = ExtractionRequest {
            document_text: text,
            instructions: &self.instructions,
        }
        .render();
        CompletionRequest {
            model: self.settings.model.clone(),
            temperature: self.settings.temperature,
            prompt,
            json_mode: self.settings.json_mode,
        }
    }

    /// Extract a record from the full text of one document.
    pub async fn extract_record(&self, text: &str) -> Result<PaperRecord, DocumentError> {
        let request = self.build_request(text);
        tracing::debug!(
            provider = self.client.name(),
            model = %request.model,
            prompt_chars = request.prompt.len(),
            "submitting extraction request"
        );
        let completion = complete_with_retry(self.client.as_ref(), &request, &self.retry).await?;
        let record = self.schema.parse_record(&completion)?;
        Ok(record)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::completion::CompletionError;
    use crate::completion::mock::{MockCompletion, MockReply};

    fn extractor(mock: Arc<MockCompletion>) -> RecordExtractor {
        RecordExtractor::new(Arc::new(Schema::academic_paper()), mock)
    }

    #[test]
    fn prompt_embeds_text_and_instructions() {
        let mock = Arc::new(MockCompletion::new(MockReply::text("{}")));
        let ex = extractor(mock);
        let text = "Attention Is All You Need. {not a placeholder} {pages}";
        let request = ex.build_request(text);
        assert!(request.prompt.contains(&format!("'''{text}'''")));
        assert!(request.prompt.contains("\"How_Are_We_Different\""));
        assert!(request.prompt.starts_with("You are an expert"));
        assert!(!request.prompt.contains("{format_instructions}"));
    }

    #[test]
    fn placeholders_in_instructions_are_not_substituted() {
        let request = ExtractionRequest {
            document_text: "Deep residual learning.",
            instructions: "Put the {pages} count in Extra_Info.",
        };
        let prompt = request.render();
        assert!(prompt.contains("given in Put the {pages} count in Extra_Info. from"));
        assert!(prompt.contains("'''Deep residual learning.'''"));
        assert_eq!(prompt.matches("Deep residual learning.").count(), 1);
    }

    #[test]
    fn request_uses_model_settings() {
        let mock = Arc::new(MockCompletion::new(MockReply::text("{}")));
        let ex = extractor(mock).with_settings(ModelSettings {
            model: "gpt-4o-mini".into(),
            temperature: 0.0,
            json_mode: false,
        });
        let request = ex.build_request("text");
        assert_eq!(request.model, "gpt-4o-mini");
        assert_eq!(request.temperature, 0.0);
        assert!(!request.json_mode);
    }

    #[test]
    fn default_settings_are_low_temperature() {
        let settings = ModelSettings::default();
        assert_eq!(settings.model, "gpt-4-1106-preview");
        assert!((settings.temperature - 0.1).abs() < f32::EPSILON);
    }

    #[tokio::test]
    async fn extract_record_makes_one_call() {
        let mock = Arc::new(MockCompletion::new(MockReply::text(
            r#"{"Title": "Foo", "Authors": "Bar"}"#,
        )));
        let ex = extractor(Arc::clone(&mock));
        let record = ex.extract_record("Title: Foo. Authors: Bar.").await.unwrap();
        assert_eq!(record.get("Title"), Some("Foo"));
        assert_eq!(record.get("Authors"), Some("Bar"));
        assert_eq!(mock.call_count(), 1);
        assert!(mock.requests()[0].prompt.contains("Title: Foo. Authors: Bar."));
    }

    #[tokio::test]
    async fn malformed_output_is_not_retried() {
        let mock = Arc::new(MockCompletion::new(MockReply::text("not json at all")));
        let ex = extractor(Arc::clone(&mock)).with_retry(RetryPolicy::with_max_retries(3));
        let err = ex.extract_record("text").await.unwrap_err();
        assert!(matches!(err, DocumentError::SchemaParseFailed(_)));
        assert_eq!(mock.call_count(), 1);
    }

    #[tokio::test]
    async fn completion_errors_propagate() {
        let mock = Arc::new(MockCompletion::new(MockReply::Fail(
            CompletionError::MissingApiKey,
        )));
        let err = extractor(mock).extract_record("text").await.unwrap_err();
        assert!(matches!(
            err,
            DocumentError::Completion(CompletionError::MissingApiKey)
        ));
    }
}
