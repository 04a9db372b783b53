//! Interface de terminal do petrigen: spinners, revisão interativa e saída colorida.
//!
//! Usa as crates `indicatif` para spinners de progresso e `console` para
//! estilização com cores. O [`ConsoleObserver`] acompanha visualmente a
//! geração de candidatos e o [`ConsoleReviewer`] pergunta ao revisor humano
//! se cada candidato válido deve ser aprovado.

use std::cell::RefCell;
use std::io::{self, BufRead, Write};
use std::path::Path;

use console::Style;
use indicatif::{ProgressBar, ProgressStyle};

use crate::generator::GenerationFailure;
use crate::lifecycle::{
    CandidateState, DispositionRecord, LifecycleError, ReviewDecision, ReviewPacket, Reviewer,
};
use crate::net::{ValidatedNet, ValidationFailure};
use crate::pipeline::{RunObserver, RunSummary};
use crate::store::{Bucket, BucketCensus, PersistedSample, PersistenceFailure};

/// Estilos compartilhados pela saída do terminal.
struct Palette {
    green: Style,
    red: Style,
    yellow: Style,
    cyan: Style,
}

impl Palette {
    fn new() -> Self {
        Self {
            green: Style::new().green().bold(),
            red: Style::new().red().bold(),
            yellow: Style::new().yellow(),
            cyan: Style::new().cyan().bold(),
        }
    }
}

/// Indicador visual de progresso para uma execução de geração.
///
/// Exibe um spinner animado enquanto o modelo responde e uma linha colorida
/// para cada disposição final.
pub struct ConsoleObserver {
    // Spinner ativo durante a chamada ao gerador.
    spinner: RefCell<Option<ProgressBar>>,
    palette: Palette,
}

impl ConsoleObserver {
    pub fn new() -> Self {
        Self {
            spinner: RefCell::new(None),
            palette: Palette::new(),
        }
    }
}

impl Default for ConsoleObserver {
    fn default() -> Self {
        Self::new()
    }
}

impl RunObserver for ConsoleObserver {
    fn generating(&self, index: usize, total: usize) {
        let pb = ProgressBar::new_spinner();
        pb.set_style(
            ProgressStyle::default_spinner()
                .template("{spinner:.cyan} {msg}")
                .unwrap_or_else(|_| ProgressStyle::default_spinner()),
        );
        pb.set_message(format!("Generating candidate {index}/{total}..."));
        pb.enable_steady_tick(std::time::Duration::from_millis(100));
        *self.spinner.borrow_mut() = Some(pb);
    }

    fn generation_finished(&self, result: Result<(), &GenerationFailure>) {
        if let Some(pb) = self.spinner.borrow_mut().take() {
            pb.finish_and_clear();
        }
        if let Err(e) = result {
            println!("  {} Generation failed: {e}", self.palette.red.apply_to("✗"));
        }
    }

    fn disposed(&self, record: &DispositionRecord) {
        let (mark, style) = match record.final_state {
            CandidateState::Approved => ("✓", &self.palette.green),
            CandidateState::RejectedManual => ("✗", &self.palette.yellow),
            _ => ("✗", &self.palette.red),
        };
        println!(
            "  {} {} → {} ({}/{})",
            style.apply_to(mark),
            record.candidate_id,
            style.apply_to(record.final_state),
            record.bucket,
            record.sample_id
        );
        for error in &record.errors {
            println!("      {error}");
        }
    }

    fn lifecycle_failed(&self, error: &LifecycleError) {
        println!("  {} {error}", self.palette.red.apply_to("✗"));
        if let Some(failure) = error.persistence_failure() {
            print_recovery_hint(failure);
        }
    }
}

/// Revisor humano no console.
///
/// Lê as respostas de `input` e escreve o pacote de revisão em `output`,
/// repetindo a pergunta até receber sim ou não. Fim da entrada aborta a
/// revisão com `UnexpectedEof`.
pub struct ConsoleReviewer<I, O> {
    input: I,
    output: O,
    palette: Palette,
}

impl ConsoleReviewer<io::StdinLock<'static>, io::Stdout> {
    pub fn stdio() -> Self {
        Self::new(io::stdin().lock(), io::stdout())
    }
}

impl<I: BufRead, O: Write> ConsoleReviewer<I, O> {
    pub fn new(input: I, output: O) -> Self {
        Self {
            input,
            output,
            palette: Palette::new(),
        }
    }

    fn show(&mut self, packet: &ReviewPacket<'_>) -> io::Result<()> {
        let out = &mut self.output;
        writeln!(out)?;
        writeln!(
            out,
            "{}",
            self.palette
                .cyan
                .apply_to(format!("─── Review {} ───", packet.candidate_id))
        )?;
        writeln!(out, "Scenario text:\n{}\n", packet.scenario_text.trim())?;
        let net = serde_json::to_string_pretty(&packet.net.to_json()).map_err(io::Error::other)?;
        writeln!(out, "Petri net JSON:\n{net}\n")?;
        for warning in packet.warnings {
            writeln!(out, "  {} {warning}", self.palette.yellow.apply_to("!"))?;
        }
        if !packet.staged_files.is_empty() {
            writeln!(out, "Staged for review:")?;
            for file in packet.staged_files {
                writeln!(out, "  {}", file.display())?;
            }
        }
        match packet.diagram {
            Some(path) => writeln!(out, "Diagram: {}", path.display())?,
            None => writeln!(out, "{}", self.palette.yellow.apply_to("No diagram available."))?,
        }
        Ok(())
    }
}

impl<I: BufRead, O: Write> Reviewer for ConsoleReviewer<I, O> {
    fn decide(&mut self, packet: &ReviewPacket<'_>) -> io::Result<ReviewDecision> {
        self.show(packet)?;
        let mut line = String::new();
        loop {
            write!(self.output, "Approve this sample? (yes/no): ")?;
            self.output.flush()?;
            line.clear();
            if self.input.read_line(&mut line)? == 0 {
                return Err(io::Error::new(
                    io::ErrorKind::UnexpectedEof,
                    "input closed before a review decision",
                ));
            }
            match line.trim().to_ascii_lowercase().as_str() {
                "yes" | "y" => return Ok(ReviewDecision::Accept),
                "no" | "n" => return Ok(ReviewDecision::Reject),
                _ => writeln!(self.output, "Please answer 'yes' or 'no'.")?,
            }
        }
    }
}

/// Imprime o resultado da validação de uma amostra.
pub fn print_validation(name: &str, result: &Result<ValidatedNet, ValidationFailure>) {
    let palette = Palette::new();
    match result {
        Ok(validated) => {
            let net = &validated.net;
            println!(
                "{} {name}: valid ({} places, {} transitions, {} arcs)",
                palette.green.apply_to("✓"),
                net.places().len(),
                net.transitions().len(),
                net.arcs().len()
            );
            for warning in &validated.warnings {
                println!("  {} {warning}", palette.yellow.apply_to("!"));
            }
        }
        Err(failure) => {
            println!(
                "{} {name}: {} error(s)",
                palette.red.apply_to("✗"),
                failure.error_count()
            );
            for message in failure.messages() {
                println!("  - {message}");
            }
        }
    }
}

pub fn print_summary(summary: &RunSummary) {
    let palette = Palette::new();
    println!();
    println!("{}", palette.cyan.apply_to("─── Run Summary ───"));
    println!("  requested:           {}", summary.requested);
    println!("  approved:            {}", palette.green.apply_to(summary.approved));
    println!("  rejected (manual):   {}", palette.yellow.apply_to(summary.rejected_manual));
    println!("  auto-rejected:       {}", palette.red.apply_to(summary.auto_rejected));
    println!("  generation failures: {}", summary.generation_failures);
    if summary.has_failures() {
        println!(
            "  {} {} candidate(s) could not be persisted",
            palette.red.apply_to("✗"),
            summary.lifecycle_failures
        );
    }
}

pub fn print_paraphrases(source: &str, saved: &[PersistedSample]) {
    let palette = Palette::new();
    for sample in saved {
        println!(
            "  {} {} ({}/{})",
            palette.green.apply_to("✓"),
            sample.manifest.stem,
            sample.manifest.bucket,
            sample.manifest.id
        );
    }
    println!("Saved {} paraphrase(s) of {source}.", saved.len());
}

pub fn print_diagram_written(path: &Path) {
    let palette = Palette::new();
    println!("{} Diagram written to {}", palette.green.apply_to("✓"), path.display());
}

/// Lista o que ficou em disco depois de uma gravação que falhou.
pub fn print_recovery_hint(failure: &PersistenceFailure) {
    let palette = Palette::new();
    if failure.partial_artifacts.is_empty() {
        return;
    }
    if failure.rolled_back {
        println!("      partial artifacts were removed again:");
    } else {
        println!(
            "      {} rollback incomplete, remove or recover by hand:",
            palette.yellow.apply_to("!")
        );
    }
    for path in &failure.partial_artifacts {
        println!("        {}", path.display());
    }
}

/// Imprime a contagem de amostras por bucket.
pub fn print_status(rows: &[(Bucket, BucketCensus)], abandoned_staging: usize) {
    let palette = Palette::new();
    println!("{}", palette.cyan.apply_to("─── Dataset Status ───"));
    for (bucket, census) in rows {
        let note = if census.incomplete > 0 {
            format!(" ({} incomplete)", census.incomplete)
        } else {
            String::new()
        };
        println!("  {:<22} {:>5}{note}", bucket.dir_name(), census.complete);
    }
    if abandoned_staging > 0 {
        println!(
            "  {} {abandoned_staging} abandoned review staging file(s)",
            palette.yellow.apply_to("!")
        );
    }
}
