//! Interface de linha de comando do petrigen baseada em clap.
//!
//! Define a struct [`Cli`] com subcomandos [`Command`] (forward_gen,
//! paraphrase, validate_sample, visualize_sample, status) e flags globais
//! (--model, --config, --verbose). Os nomes com hífen também são aceitos.

use std::path::PathBuf;

use clap::{Parser, Subcommand, ValueEnum};

/// petrigen: curadoria de pares (cenário, rede de Petri) gerados por LLM.
#[derive(Debug, Parser)]
#[command(name = "petrigen", version, about)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,

    /// Identificador do modelo a usar nesta sessão.
    #[arg(long, global = true)]
    pub model: Option<String>,

    /// Caminho para o arquivo de configuração (padrão: `petrigen.toml`).
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    /// Habilita saída detalhada (verbose).
    #[arg(long, short, global = true, default_value_t = false)]
    pub verbose: bool,
}

/// Origem de uma amostra existente.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum DataType {
    /// Amostras escritas à mão em `<data_dir>/hand_made/`.
    #[value(name = "hand_made", alias = "hand-made")]
    HandMade,
    /// Amostras sintetizadas em `approved/` ou `rejected_manual/`.
    Synthesized,
}

impl DataType {
    pub fn as_str(self) -> &'static str {
        match self {
            DataType::HandMade => "hand_made",
            DataType::Synthesized => "synthesized",
        }
    }
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Gera novos candidatos e os conduz pela revisão.
    #[command(name = "forward_gen", alias = "forward-gen")]
    ForwardGen {
        /// Quantos candidatos gerar.
        #[arg(long, alias = "num_forward_samples", default_value_t = 1)]
        num_forward_samples: usize,

        /// Quantos exemplos escritos à mão mostrar ao modelo.
        #[arg(long, alias = "num_few_shot", default_value_t = 2)]
        num_few_shot: usize,

        /// Tema opcional para o cenário.
        #[arg(long)]
        theme: Option<String>,
    },

    /// Gera paráfrases de uma amostra escrita à mão, aprovadas direto.
    Paraphrase {
        /// Id da amostra escrita à mão (ex.: `sample_01`).
        #[arg(long, alias = "sample_id")]
        sample_id: String,

        #[arg(long, alias = "num_paraphrases", default_value_t = 3)]
        num_paraphrases: usize,
    },

    /// Valida uma amostra existente.
    #[command(name = "validate_sample", alias = "validate-sample")]
    ValidateSample {
        /// `sample_01` para escritas à mão; para sintetizadas, o stem ou
        /// `<bucket>/<id>` (ex.: `approved/0003`).
        #[arg(long, alias = "sample_id")]
        sample_id: String,

        #[arg(long, alias = "data_type", value_enum)]
        data_type: DataType,
    },

    /// Valida uma amostra e desenha seu diagrama em `review_temp/`.
    #[command(name = "visualize_sample", alias = "visualize-sample")]
    VisualizeSample {
        #[arg(long, alias = "sample_id")]
        sample_id: String,

        #[arg(long, alias = "data_type", value_enum)]
        data_type: DataType,
    },

    /// Mostra a contagem de amostras por bucket.
    Status,
}
