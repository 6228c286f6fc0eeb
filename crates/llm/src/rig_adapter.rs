use futures::StreamExt;
use rig::completion::{CompletionModel, Message as RigMessage};
use rig::prelude::CompletionClient;
use rig::providers::openai;
use rig::streaming::StreamedAssistantContent;
use snafu::{ResultExt, ensure};

use super::provider::{
    BoxFuture, CompletionProvider, CompletionRequest, CompletionsFailedSnafu,
    DEFAULT_OPENAI_MODEL, EmptyCompletionSnafu, EmptyMessageSetSnafu, HttpClientSnafu,
    MissingApiKeySnafu, ProviderConfig, ProviderError, ProviderMessage, ProviderResult, Role,
};

pub const RIG_OPENAI_PROVIDER_ID: &str = "openai";

type RigStreamingResponse = rig::streaming::StreamingCompletionResponse<
    rig::providers::openai::responses_api::streaming::StreamingCompletionResponse,
>;

pub struct RigProviderAdapter {
    config: ProviderConfig,
}

impl RigProviderAdapter {
    pub fn new(config: ProviderConfig) -> ProviderResult<Self> {
        ensure!(
            !config.api_key.is_empty(),
            MissingApiKeySnafu {
                stage: "rig-adapter-new",
                provider_id: config.provider_id.clone(),
            }
        );

        Ok(Self { config })
    }

    fn build_client(config: &ProviderConfig) -> ProviderResult<openai::Client> {
        let mut builder = openai::Client::builder().api_key(config.api_key.as_str());
        if !config.endpoint.is_empty() {
            builder = builder.base_url(config.endpoint.as_str());
        }
        builder.build().context(HttpClientSnafu {
            stage: "build-client",
        })
    }

    fn to_rig_message(message: &ProviderMessage) -> Option<RigMessage> {
        match message.role {
            Role::System => None,
            Role::User => Some(RigMessage::user(message.content.clone())),
            Role::Assistant => Some(RigMessage::assistant(message.content.clone())),
        }
    }

    fn merged_preamble(request: &CompletionRequest) -> Option<String> {
        let mut preamble_parts = Vec::new();

        if let Some(preamble) = &request.preamble
            && !preamble.trim().is_empty()
        {
            preamble_parts.push(preamble.clone());
        }

        // Rig exposes a single preamble field, so system-role messages are folded into it.
        for message in &request.messages {
            if matches!(message.role, Role::System) && !message.content.trim().is_empty() {
                preamble_parts.push(message.content.clone());
            }
        }

        if preamble_parts.is_empty() {
            None
        } else {
            Some(preamble_parts.join("\n\n"))
        }
    }

    async fn open_stream(
        config: &ProviderConfig,
        request: &CompletionRequest,
    ) -> ProviderResult<RigStreamingResponse> {
        let client = Self::build_client(config)?;
        let model = client.completion_model(request.model_id.clone());

        let mut messages = request
            .messages
            .iter()
            .filter_map(Self::to_rig_message)
            .collect::<Vec<_>>();

        let Some(prompt) = messages.pop() else {
            tracing::warn!(
                model_id = %request.model_id,
                total_message_count = request.messages.len(),
                "cannot open stream because no user/assistant messages remain after filtering"
            );
            return EmptyMessageSetSnafu {
                stage: "open-stream-pop-prompt",
            }
            .fail();
        };
        let mut builder = model.completion_request(prompt).messages(messages);

        if let Some(preamble) = Self::merged_preamble(request) {
            builder = builder.preamble(preamble);
        }

        if let Some(temperature) = request.temperature {
            builder = builder.temperature(temperature);
        }

        if let Some(max_tokens) = request.max_tokens {
            builder = builder.max_tokens(max_tokens);
        }

        builder.stream().await.context(CompletionsFailedSnafu {
            stage: "open-stream",
        })
    }

    async fn collect_completion(
        config: &ProviderConfig,
        request: CompletionRequest,
    ) -> ProviderResult<String> {
        let mut stream = Self::open_stream(config, &request).await?;
        let mut text = String::new();

        // Dropping this future drops the stream, which stops provider IO.
        while let Some(item) = stream.next().await {
            match item {
                Ok(StreamedAssistantContent::Text(chunk)) => text.push_str(&chunk.text),
                Ok(_) => {}
                Err(source) => {
                    tracing::warn!(
                        provider_id = %config.provider_id,
                        model_id = %request.model_id,
                        error = %source,
                        "provider stream emitted an error chunk"
                    );
                    return Err(ProviderError::CompletionsFailed {
                        stage: "stream-chunk",
                        source,
                    });
                }
            }
        }

        ensure!(
            !text.trim().is_empty(),
            EmptyCompletionSnafu {
                stage: "collect-completion",
            }
        );
        Ok(text.trim().to_string())
    }
}

impl CompletionProvider for RigProviderAdapter {
    fn id(&self) -> &str {
        &self.config.provider_id
    }

    fn name(&self) -> &str {
        "Rig OpenAI"
    }

    fn default_model(&self) -> &str {
        DEFAULT_OPENAI_MODEL
    }

    fn complete<'a>(&'a self, request: CompletionRequest) -> BoxFuture<'a, ProviderResult<String>> {
        Box::pin(async move {
            ensure!(
                !request.messages.is_empty(),
                EmptyMessageSetSnafu {
                    stage: "complete",
                }
            );
            Self::collect_completion(&self.config, request).await
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn system_messages_fold_into_preamble() {
        let request = CompletionRequest::new(
            DEFAULT_OPENAI_MODEL,
            vec![
                ProviderMessage::new(Role::System, "Be brief."),
                ProviderMessage::new(Role::User, "Hello"),
            ],
        )
        .with_preamble("You are the Acme assistant.");

        assert_eq!(
            RigProviderAdapter::merged_preamble(&request).as_deref(),
            Some("You are the Acme assistant.\n\nBe brief.")
        );
        assert!(RigProviderAdapter::to_rig_message(&request.messages[0]).is_none());
    }

    #[test]
    fn adapter_requires_api_key() {
        let result = RigProviderAdapter::new(ProviderConfig::new("openai", "  ", ""));
        assert!(matches!(result, Err(ProviderError::MissingApiKey { .. })));
    }
}
