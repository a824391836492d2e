//! CLI commands implementation.

use std::path::Path;
use std::sync::Arc;

use console::style;
use indicatif::{ProgressBar, ProgressStyle};
use serde::Serialize;
use uuid::Uuid;

use crate::config::PipelineConfig;
use crate::engine::{RecognitionEngine, TesseractEngine};
use crate::models::PageStatus;
use crate::pipeline::{DocumentRun, PipelineController, PipelineEvent, PipelinePhase};
use crate::source::required_tools;

/// Recognize a document, streaming progress to the terminal.
pub async fn cmd_run(
    config: PipelineConfig,
    input: &Path,
    output: Option<&Path>,
    json: bool,
) -> anyhow::Result<()> {
    let engine = TesseractEngine::new();
    if !engine.is_available() {
        anyhow::bail!("{}", engine.availability_hint());
    }

    let (controller, mut events) = PipelineController::new(Arc::new(engine), config);
    let document = controller.open(input)?;

    println!("{} Recognizing {}", style("→").cyan(), input.display());

    let mut progress: Option<ProgressBar> = None;
    loop {
        tokio::select! {
            event = events.recv() => {
                let Some(event) = event else {
                    anyhow::bail!("pipeline event stream closed unexpectedly");
                };
                if event.document() != document {
                    continue;
                }
                match event {
                    PipelineEvent::PageCount { total, .. } => {
                        let bar = ProgressBar::new(total as u64);
                        bar.set_style(
                            ProgressStyle::default_bar()
                                .template(
                                    "{spinner:.green} [{bar:30.cyan/blue}] {pos}/{len} {wide_msg}",
                                )
                                .unwrap()
                                .progress_chars("█▓░"),
                        );
                        bar.set_message("Recognizing pages...");
                        progress = Some(bar);
                    }
                    PipelineEvent::Progress { completed, .. } => {
                        if let Some(ref bar) = progress {
                            bar.set_position(completed as u64);
                        }
                    }
                    PipelineEvent::PageFailed { index, reason, .. } => {
                        let line = format!(
                            "  {} Page {} failed: {}",
                            style("✗").red(),
                            index + 1,
                            reason
                        );
                        match progress {
                            Some(ref bar) => bar.suspend(|| eprintln!("{line}")),
                            None => eprintln!("{line}"),
                        }
                    }
                    PipelineEvent::DocumentComplete { .. } => {
                        if let Some(ref bar) = progress {
                            bar.finish_and_clear();
                        }
                        break;
                    }
                    PipelineEvent::DocumentFailed { reason, .. } => {
                        if let Some(ref bar) = progress {
                            bar.finish_and_clear();
                        }
                        anyhow::bail!("document failed: {reason}");
                    }
                    PipelineEvent::DocumentCancelled { .. } => {
                        if let Some(ref bar) = progress {
                            bar.finish_and_clear();
                        }
                        println!("{} Cancelled", style("!").yellow());
                        return Ok(());
                    }
                    _ => {}
                }
            }
            _ = tokio::signal::ctrl_c() => {
                controller.cancel(document);
            }
        }
    }

    let run = controller
        .current()
        .ok_or_else(|| anyhow::anyhow!("no document run"))?;
    report(&run, output, json)
}

/// Print or export the finished run.
fn report(run: &DocumentRun, output: Option<&Path>, json: bool) -> anyhow::Result<()> {
    let (completed, total) = run.progress();
    let total = total.unwrap_or(0);
    let failed = run
        .pages()
        .iter()
        .filter(|p| p.status == PageStatus::Failed)
        .count();
    let failed_note = if failed > 0 {
        format!(", {failed} failed")
    } else {
        String::new()
    };
    println!(
        "{} {} of {} pages recognized{}",
        style("✓").green(),
        completed - failed,
        total,
        failed_note
    );

    if json {
        let summary = RunSummary::from_run(run);
        println!("{}", serde_json::to_string_pretty(&summary)?);
        return Ok(());
    }

    let text = export_text(run);
    match output {
        Some(path) => {
            std::fs::write(path, &text)?;
            println!(
                "{} Text exported to {}",
                style("✓").green(),
                path.display()
            );
        }
        None => print!("{text}"),
    }
    Ok(())
}

/// Concatenate page text in index order with page separators. Failed pages
/// get a bracketed placeholder so numbering in the artifact stays stable.
fn export_text(run: &DocumentRun) -> String {
    let (_, total) = run.progress();
    let total = total.unwrap_or(0);

    let mut pages = Vec::with_capacity(total);
    for index in 0..total {
        match run.display_text(index) {
            Some(text) => pages.push((index, text)),
            None => {
                let reason = run
                    .page_error(index)
                    .unwrap_or_else(|| "no result".to_string());
                pages.push((index, format!("[page {} failed: {}]", index + 1, reason)));
            }
        }
    }

    if pages.len() == 1 {
        let mut text = pages.remove(0).1;
        if !text.ends_with('\n') {
            text.push('\n');
        }
        return text;
    }

    let mut out = String::new();
    for (index, text) in pages {
        out.push_str(&format!("=== Page {} ===\n{}\n\n", index + 1, text));
    }
    out
}

#[derive(Serialize)]
struct PageSummary {
    index: usize,
    status: PageStatus,
    words: usize,
    edited: bool,
    error: Option<String>,
}

#[derive(Serialize)]
struct RunSummary {
    document: Uuid,
    phase: PipelinePhase,
    total: usize,
    pages: Vec<PageSummary>,
}

impl RunSummary {
    fn from_run(run: &DocumentRun) -> Self {
        let pages = run
            .pages()
            .iter()
            .map(|page| PageSummary {
                index: page.index,
                status: page.status,
                words: run
                    .result(page.index)
                    .map(|r| r.words.len())
                    .unwrap_or(0),
                edited: run.store().is_edited(page.index),
                error: run.page_error(page.index),
            })
            .collect();
        Self {
            document: run.id(),
            phase: run.phase(),
            total: run.progress().1.unwrap_or(0),
            pages,
        }
    }
}

/// Check recognition tool availability.
pub fn cmd_tools() -> anyhow::Result<()> {
    println!("\n{}", style("Recognition Tool Status").bold());
    println!("{}", "-".repeat(50));

    let engine = TesseractEngine::new();
    let tesseract_status = if engine.is_available() {
        style("✓ found").green()
    } else {
        style("✗ not found").red()
    };
    println!("  {:<15} {}", "tesseract", tesseract_status);
    if !engine.is_available() {
        println!("                  {}", style(engine.availability_hint()).dim());
    }

    let tools = required_tools();
    for (tool, available) in &tools {
        let status = if *available {
            style("✓ found").green()
        } else {
            style("✗ not found").red()
        };
        println!("  {:<15} {}", tool, status);
    }
    if !tools.iter().all(|(_, available)| *available) {
        println!(
            "\n  {}",
            style("Install poppler-utils for PDF input support").dim()
        );
    }

    Ok(())
}
