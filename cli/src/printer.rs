use std::env::{self, VarError};
use std::fmt::Display;
use std::io::{stderr, stdout, Write};

use crossterm::queue;
use crossterm::style::{Color, ContentStyle, Print, PrintStyledContent, StyledContent, Stylize};
use crossterm::tty::IsTty;

use apkprobe::events::{AnalysisEvent, EventMonitor};

#[cfg(feature = "unicode")]
mod constants {
    pub static SUCCESS_MARKER: &'static str = "✔";
    pub static FAIL_MARKER: &'static str = "✘";
    pub static WARN_MARKER: &'static str = "!";
    pub static INFO_MARKER: &'static str = "•";
}

#[cfg(not(feature = "unicode"))]
mod constants {
    pub static SUCCESS_MARKER: &'static str = "+";
    pub static FAIL_MARKER: &'static str = "x";
    pub static WARN_MARKER: &'static str = "!";
    pub static INFO_MARKER: &'static str = "*";
}

pub use constants::*;

pub(crate) fn no_color_set() -> bool {
    match env::var("NO_COLOR") {
        Err(VarError::NotPresent) => false,
        _ => true,
    }
}

#[derive(Clone, Copy)]
enum Target {
    Stdout,
    Stderr,
}

/// Prints optionally styled lines. Styling is only applied when writing to a
/// terminal and `NO_COLOR` is unset.
pub struct Printer {
    target: Target,
    style_enabled: bool,
}

impl Printer {
    pub fn new() -> Self {
        Self {
            target: Target::Stdout,
            style_enabled: stdout().is_tty() && !no_color_set(),
        }
    }

    /// A printer for narration that must stay out of the way of machine
    /// readable output on stdout
    pub fn stderr() -> Self {
        Self {
            target: Target::Stderr,
            style_enabled: stderr().is_tty() && !no_color_set(),
        }
    }

    pub fn println(&self, content: impl Display) {
        self.println_styled(content, ContentStyle::default())
    }

    pub fn println_colored(&self, content: impl Display, color: Color) {
        let style = ContentStyle::default().with(color);
        self.println_styled(content, style)
    }

    pub fn println_styled(&self, content: impl Display, style: ContentStyle) {
        match self.target {
            Target::Stdout => emit(&mut stdout(), content, style, self.style_enabled),
            Target::Stderr => emit(&mut stderr(), content, style, self.style_enabled),
        }
    }

    /// Print a line with a colored marker in front of it
    pub fn println_marked(&self, marker: &str, color: Color, content: impl Display) {
        let style = ContentStyle::default().with(color);
        let line = format!("{} {}", marker, content);
        if self.style_enabled {
            self.println_styled(StyledContent::new(style, line), ContentStyle::default())
        } else {
            self.println(line)
        }
    }
}

fn emit<W: Write>(w: &mut W, content: impl Display, style: ContentStyle, styled: bool) {
    if styled {
        _ = queue!(w, PrintStyledContent(StyledContent::new(style, content)));
    } else {
        _ = queue!(w, Print(content));
    }
    _ = queue!(w, Print("\n"));
    _ = w.flush();
}

/// How an event is presented
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Mark {
    Success,
    Fail,
    Warn,
    Info,
}

impl Mark {
    pub fn for_event(evt: &AnalysisEvent) -> Option<Self> {
        Some(match evt {
            AnalysisEvent::StateChanged(_) => return None,
            AnalysisEvent::Failed { .. } => Self::Fail,
            AnalysisEvent::Degraded { .. } => Self::Warn,
            AnalysisEvent::DeviceSettled { verified: false } => Self::Warn,
            AnalysisEvent::FuzzFinished { exit_ok: false, .. } => Self::Warn,
            AnalysisEvent::DeviceOnline(_)
            | AnalysisEvent::DeviceSettled { verified: true }
            | AnalysisEvent::Installed { .. }
            | AnalysisEvent::PackageDetected(_)
            | AnalysisEvent::FuzzFinished { .. }
            | AnalysisEvent::TelemetryCollected { .. }
            | AnalysisEvent::Uninstalled(_) => Self::Success,
            _ => Self::Info,
        })
    }

    fn marker(&self) -> (&'static str, Color) {
        match self {
            Self::Success => (SUCCESS_MARKER, Color::Green),
            Self::Fail => (FAIL_MARKER, Color::Red),
            Self::Warn => (WARN_MARKER, Color::Yellow),
            Self::Info => (INFO_MARKER, Color::Blue),
        }
    }
}

/// Narrates a session as it runs
pub struct EventPrinter {
    printer: Printer,
}

impl EventPrinter {
    pub fn new(printer: Printer) -> Self {
        Self { printer }
    }
}

impl EventMonitor<AnalysisEvent> for EventPrinter {
    fn on_event(&self, evt: AnalysisEvent) {
        log::debug!("event: {:?}", evt);
        if let Some(mark) = Mark::for_event(&evt) {
            let (marker, color) = mark.marker();
            self.printer.println_marked(marker, color, &evt);
        }
    }
}
