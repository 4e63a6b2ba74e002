use std::io::IsTerminal;
use std::time::{Duration, Instant};

use anstyle::{AnsiColor, Effects, Style};
use indicatif::{ProgressBar, ProgressStyle};

#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub(crate) enum OutputStyle {
    Plain,
    Rich,
}

pub(crate) fn resolve_output_style(is_terminal: bool, no_color: bool) -> OutputStyle {
    match (is_terminal, no_color) {
        (true, false) => OutputStyle::Rich,
        _ => OutputStyle::Plain,
    }
}

/// Prints command output as `status: message` lines, with coloured badges on
/// an interactive terminal.
#[derive(Copy, Clone, Debug)]
pub(crate) struct TerminalRenderer {
    style: OutputStyle,
}

impl TerminalRenderer {
    pub(crate) fn from_style(style: OutputStyle) -> Self {
        Self { style }
    }

    pub(crate) fn current() -> Self {
        let no_color = std::env::var_os("NO_COLOR").is_some();
        Self::from_style(resolve_output_style(std::io::stdout().is_terminal(), no_color))
    }

    pub(crate) fn print_status(self, status: &str, message: &str) {
        println!("{}", render_status_line(self.style, status, message));
    }

    pub(crate) fn print_lines(self, lines: &[String]) {
        lines.iter().for_each(|line| println!("{line}"));
    }

    pub(crate) fn start_progress(self, label: &str, total: u64) -> TerminalProgress {
        TerminalProgress {
            style: self.style,
            label: label.to_string(),
            total,
            done: 0,
            bar: (self.style == OutputStyle::Rich).then(|| step_bar(label, total)),
            started_at: Instant::now(),
        }
    }
}

fn step_bar(label: &str, total: u64) -> ProgressBar {
    let bar = ProgressBar::new(total.max(1));
    if let Ok(style) =
        ProgressStyle::with_template("{prefix:>8.cyan.bold} [{bar:24.blue}] {pos}/{len} {wide_msg}")
    {
        bar.set_style(style.progress_chars("#>."));
    }
    bar.set_prefix(label.to_string());
    bar.enable_steady_tick(Duration::from_millis(100));
    bar
}

/// Progress over migration steps. Plain output gets one line per step.
pub(crate) struct TerminalProgress {
    style: OutputStyle,
    label: String,
    total: u64,
    done: u64,
    bar: Option<ProgressBar>,
    started_at: Instant,
}

impl TerminalProgress {
    /// Marks `done` steps complete; `message` names the last one.
    pub(crate) fn advance(&mut self, done: u64, message: &str) {
        self.done = done.min(self.total);
        match &self.bar {
            Some(bar) => {
                bar.set_position(self.done);
                bar.set_message(message.to_string());
            }
            None => println!(
                "{}",
                render_status_line(
                    self.style,
                    "step",
                    &format!("{}/{} {message}", self.done, self.total)
                )
            ),
        }
    }

    pub(crate) fn finish_success(mut self) {
        if let Some(bar) = self.bar.take() {
            bar.finish_and_clear();
            println!(
                "{}",
                render_status_line(
                    self.style,
                    "ok",
                    &format!(
                        "{} {}/{} steps in {}",
                        self.label,
                        self.done,
                        self.total,
                        format_elapsed(self.started_at.elapsed())
                    )
                )
            );
        }
    }

    /// Leaves the bar on screen at the step that failed.
    pub(crate) fn finish_abandon(mut self) {
        if let Some(bar) = self.bar.take() {
            bar.abandon();
        }
    }
}

pub(crate) fn render_status_line(style: OutputStyle, status: &str, message: &str) -> String {
    if style == OutputStyle::Plain {
        return format!("{status}: {message}");
    }
    let badge = badge_style(status);
    format!(
        "{}{status:>6}{} {message}",
        badge.render(),
        badge.render_reset()
    )
}

fn badge_style(status: &str) -> Style {
    let color = match status {
        "ok" => AnsiColor::Green,
        "warn" => AnsiColor::Yellow,
        "error" => AnsiColor::Red,
        _ => AnsiColor::Cyan,
    };
    Style::new()
        .fg_color(Some(color.into()))
        .effects(Effects::BOLD)
}

fn format_elapsed(elapsed: Duration) -> String {
    format!("{:.2}s", elapsed.as_secs_f64())
}
