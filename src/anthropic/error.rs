//! Erros do cliente da API Anthropic usado pelo gerador de amostras.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum AnthropicError {
    /// Nenhuma chave de API configurada (arquivo ou `ANTHROPIC_API_KEY`).
    #[error("no API key configured; set ANTHROPIC_API_KEY or api_key in petrigen.toml")]
    MissingApiKey,

    /// HTTP 429. O gerador não repete a chamada; a execução segue para o
    /// próximo candidato.
    #[error("rate limited, retry after {retry_after_ms}ms")]
    RateLimited { retry_after_ms: u64 },

    #[error("API error (status {status}): {message}")]
    ApiError { status: u16, message: String },

    /// A resposta parou em `max_tokens`; o JSON da rede vem cortado.
    #[error("reply truncated at {max_tokens} tokens")]
    Truncated { max_tokens: u32 },

    #[error("network error: {0}")]
    NetworkError(#[from] reqwest::Error),
}
