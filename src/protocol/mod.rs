pub mod anthropic;
pub mod chunk;
pub mod gemini;
pub mod mapping;
pub mod openai_chat;
pub mod openai_responses;

/// Which ingress API the request arrived on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum IngressApi {
    OpenAiChat,
    OpenAiResponses,
    Anthropic,
}
