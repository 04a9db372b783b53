//! Configuração do petrigen carregada a partir de `petrigen.toml`.
//!
//! A struct [`PetrigenConfig`] contém todos os parâmetros configuráveis.
//! Valores não presentes no arquivo usam defaults sensíveis.
//! A variável de ambiente `ANTHROPIC_API_KEY` tem precedência sobre o arquivo.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde::Deserialize;

use crate::error::PetrigenError;
use crate::generator::GeneratorSettings;
use crate::net::StructuralPolicy;
use crate::store::RepositoryStore;

pub const DEFAULT_CONFIG_FILE: &str = "petrigen.toml";

/// Configuração de nível superior carregada de `petrigen.toml`.
#[derive(Debug, Clone, Deserialize)]
pub struct PetrigenConfig {
    /// Chave da API Anthropic.
    #[serde(default)]
    pub api_key: String,

    /// Identificador do modelo usado na geração e nas paráfrases.
    #[serde(default = "default_model")]
    pub model: String,

    /// Limite de tokens por resposta do modelo.
    #[serde(default = "default_max_tokens")]
    pub max_tokens: u32,

    #[serde(default = "default_generation_temperature")]
    pub generation_temperature: f32,

    #[serde(default = "default_paraphrase_temperature")]
    pub paraphrase_temperature: f32,

    /// Raiz dos dados de entrada (contém `hand_made/`).
    #[serde(default = "default_data_dir")]
    pub data_dir: PathBuf,

    /// Raiz das saídas (`synthesized_data/` e `review_temp/`).
    #[serde(default = "default_outputs_dir")]
    pub outputs_dir: PathBuf,

    /// Executável do Graphviz.
    #[serde(default = "default_dot_binary")]
    pub dot_binary: PathBuf,

    /// Mantém o diagrama PDF de amostras rejeitadas na revisão.
    #[serde(default)]
    pub keep_rejected_diagrams: bool,

    /// Regras da análise estrutural.
    #[serde(default)]
    pub validation: StructuralPolicy,
}

// Valor padrão para o modelo.
fn default_model() -> String {
    "claude-sonnet-4-5-20250929".to_string()
}

fn default_max_tokens() -> u32 {
    4096
}

fn default_generation_temperature() -> f32 {
    1.0
}

fn default_paraphrase_temperature() -> f32 {
    0.7
}

fn default_data_dir() -> PathBuf {
    PathBuf::from("data")
}

fn default_outputs_dir() -> PathBuf {
    PathBuf::from("outputs")
}

fn default_dot_binary() -> PathBuf {
    PathBuf::from("dot")
}

impl Default for PetrigenConfig {
    fn default() -> Self {
        Self {
            api_key: String::new(),
            model: default_model(),
            max_tokens: default_max_tokens(),
            generation_temperature: default_generation_temperature(),
            paraphrase_temperature: default_paraphrase_temperature(),
            data_dir: default_data_dir(),
            outputs_dir: default_outputs_dir(),
            dot_binary: default_dot_binary(),
            keep_rejected_diagrams: false,
            validation: StructuralPolicy::default(),
        }
    }
}

impl PetrigenConfig {
    /// Carrega a configuração de `petrigen.toml` no diretório atual.
    /// Usa valores padrão se o arquivo não existir.
    pub fn load() -> Result<Self> {
        Self::load_from(Path::new(DEFAULT_CONFIG_FILE), false)
    }

    /// Carrega a configuração de `path`. Com `required`, a ausência do
    /// arquivo é um erro; caso contrário valem os defaults.
    pub fn load_from(path: &Path, required: bool) -> Result<Self> {
        let mut config = if path.exists() {
            let contents = std::fs::read_to_string(path)
                .map_err(PetrigenError::from)
                .with_context(|| format!("reading {}", path.display()))?;
            Self::parse(&contents).with_context(|| format!("parsing {}", path.display()))?
        } else if required {
            return Err(PetrigenError::Config(format!("{} not found", path.display())).into());
        } else {
            Self::default()
        };

        // Variável de ambiente tem precedência sobre o arquivo de configuração para a chave API.
        if let Ok(key) = std::env::var("ANTHROPIC_API_KEY")
            && !key.is_empty()
        {
            config.api_key = key;
        }

        Ok(config)
    }

    fn parse(contents: &str) -> Result<Self, PetrigenError> {
        Ok(toml::from_str(contents)?)
    }

    pub fn generator_settings(&self) -> GeneratorSettings {
        GeneratorSettings {
            model: self.model.clone(),
            max_tokens: self.max_tokens,
            generation_temperature: self.generation_temperature,
            paraphrase_temperature: self.paraphrase_temperature,
        }
    }

    pub fn store(&self) -> RepositoryStore {
        RepositoryStore::new(&self.data_dir, &self.outputs_dir)
    }
}
