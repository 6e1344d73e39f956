//! Colored terminal rendering for cadence types.

use cadence_core::availability::BusySource;
use cadence_core::decision::{Outcome, SchedulingDecision};
use cadence_core::planner::{Agenda, CommitEntry, CommitStatus, ReconciliationReport};
use chrono_tz::Tz;
use owo_colors::OwoColorize;

pub trait Render {
    fn render(&self) -> String;
}

impl Render for Outcome {
    fn render(&self) -> String {
        match self {
            Outcome::Accepted => "+".green().to_string(),
            Outcome::Conflict { .. } => "!".red().to_string(),
            Outcome::Capped { .. } => "~".yellow().to_string(),
            Outcome::OutOfWindow => "-".dimmed().to_string(),
        }
    }
}

fn source_label(source: BusySource) -> &'static str {
    match source {
        BusySource::OwnActivity => "own activity",
        BusySource::ExternalCalendar => "calendar",
    }
}

fn render_decision(decision: &SchedulingDecision, tz: Tz) -> String {
    let occurrence = &decision.occurrence;
    let start = occurrence.start_at.with_timezone(&tz);
    let end = occurrence.end_at.with_timezone(&tz);
    let time = format!("{} {}-{}", start.format("%a %b %-d"), start.format("%H:%M"), end.format("%H:%M"));

    let detail = match &decision.outcome {
        Outcome::Accepted => String::new(),
        Outcome::Conflict {
            conflicting_interval,
        } => format!(
            "busy {}-{} ({})",
            conflicting_interval.start_at.with_timezone(&tz).format("%H:%M"),
            conflicting_interval.end_at.with_timezone(&tz).format("%H:%M"),
            source_label(conflicting_interval.source)
        )
        .red()
        .to_string(),
        Outcome::Capped { blocked_by } => format!(
            "too soon after {}",
            blocked_by.with_timezone(&tz).format("%b %-d %H:%M")
        )
        .yellow()
        .to_string(),
        Outcome::OutOfWindow => "outside window".dimmed().to_string(),
    };

    format!(
        "{} {} {} {}",
        decision.outcome.render(),
        occurrence.title,
        time.dimmed(),
        detail
    )
    .trim_end()
    .to_string()
}

fn pluralize(word: &str, count: usize) -> String {
    if count == 1 {
        word.to_string()
    } else {
        format!("{word}s")
    }
}

impl Render for Agenda {
    fn render(&self) -> String {
        let tz: Tz = self.timezone.parse().unwrap_or(Tz::UTC);
        let (first, last) = self.window.local_dates(tz);
        let mut lines = Vec::new();

        lines.push(format!(
            "🗓  {} {}",
            self.user_id.bold(),
            format!("{first} to {last} ({})", self.timezone).dimmed()
        ));

        if !self.verified {
            lines.push(format!(
                "   {}",
                "Unverified: external calendar was not checked".yellow()
            ));
        }

        if self.decisions.is_empty() {
            lines.push(format!("   {}", "Nothing to schedule".dimmed()));
            return lines.join("\n");
        }

        for decision in &self.decisions {
            lines.push(format!("   {}", render_decision(decision, tz)));
        }

        let (accepted, conflicts, capped, out_of_window) = self.outcome_counts();
        let mut summary = vec![format!("{accepted} accepted").green().to_string()];
        if conflicts > 0 {
            summary.push(format!("{conflicts} {}", pluralize("conflict", conflicts)).red().to_string());
        }
        if capped > 0 {
            summary.push(format!("{capped} capped").yellow().to_string());
        }
        if out_of_window > 0 {
            summary.push(format!("{out_of_window} outside window").dimmed().to_string());
        }
        lines.push(String::new());
        lines.push(format!("   {}", summary.join(", ")));

        lines.join("\n")
    }
}

impl Render for CommitEntry {
    fn render(&self) -> String {
        match &self.status {
            CommitStatus::Created { event_id } => {
                format!("{} {} {}", "+".green(), self.key, event_id.dimmed())
            }
            CommitStatus::Updated { event_id } => {
                format!("{} {} {}", "~".yellow(), self.key, event_id.dimmed())
            }
            CommitStatus::Unchanged { event_id } => {
                format!("{} {} {}", "=".dimmed(), self.key.dimmed(), event_id.dimmed())
            }
            CommitStatus::Failed { error } => {
                format!("{} {} {}", "✗".red(), self.key, error.red())
            }
        }
    }
}

/// Threshold for listing unchanged entries individually.
const COMPACT_THRESHOLD: usize = 5;

impl Render for ReconciliationReport {
    fn render(&self) -> String {
        let (created, updated, unchanged, failed) = self.counts();
        let mut lines = vec!["   Calendar:".dimmed().to_string()];

        for entry in &self.entries {
            if matches!(entry.status, CommitStatus::Unchanged { .. }) && unchanged > COMPACT_THRESHOLD {
                continue;
            }
            lines.push(format!("   {}", entry.render()));
        }
        if unchanged > COMPACT_THRESHOLD {
            lines.push(format!(
                "   {} {}",
                "=".dimmed(),
                format!("({unchanged} unchanged {})", pluralize("event", unchanged)).dimmed()
            ));
        }

        lines.push(String::new());
        let summary = format!(
            "{created} created, {updated} updated, {unchanged} unchanged, {failed} failed"
        );
        if failed > 0 {
            lines.push(format!("   {}", summary.red()));
        } else {
            lines.push(format!("   {}", summary.green()));
        }

        lines.join("\n")
    }
}
