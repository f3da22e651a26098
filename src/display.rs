//! Status display utilities.

use crate::link::LinkState;
use crate::operations::OrderObserver;
use crate::protocol::OrderRequest;
use atty::Stream;
use colored::*;
use lazy_static::lazy_static;
use std::io::Write;
use std::sync::Mutex;

lazy_static! {
    static ref DISPLAY: Mutex<Option<Box<dyn StatusDisplay>>> = Mutex::new(None);
}

/// Something worth showing on the status line.
#[derive(Clone, Debug, Eq, PartialEq)]
pub enum DispenserStatus {
    Link(LinkState),
    /// An order was sent; readings are shown against this target.
    Ordered(u8),
    Weight(String),
}

/// Initializes the global display based on the TERM and COLORTERM environment variables.
pub fn initialize_display() {
    let term = std::env::var("TERM").ok();
    let colorterm = std::env::var("COLORTERM").ok();

    let display: Box<dyn StatusDisplay> =
        if term.is_none() || !atty::is(Stream::Stdout) || !atty::is(Stream::Stderr) {
            Box::<NoTtyStatusDisplay>::default()
        } else if colorterm.is_some() {
            Box::new(ColouredStatusDisplay::new(60))
        } else {
            Box::new(BasicStatusDisplay::new(60))
        };
    if let Ok(mut current) = DISPLAY.lock() {
        *current = Some(display);
    }
}

/// Displays the [`DispenserStatus`] according to the current mode.
pub fn display_status(status: DispenserStatus) {
    if let Ok(mut display) = DISPLAY.lock() {
        if let Some(ref mut display) = *display {
            display.display(status);
            return;
        }
    }
    println!("[default] {:?}", status);
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum LogLevel {
    Trace,
    Info,
    Warning,
    Error,
}

impl LogLevel {
    pub fn prefix(&self) -> &'static str {
        match self {
            LogLevel::Trace => "[TRACE] ",
            LogLevel::Warning => "[WARNING] ",
            LogLevel::Error => "[ERROR] ",
            LogLevel::Info => "",
        }
    }
}

/// Logs a line without clobbering the status line.
pub fn log(level: LogLevel, s: &str) {
    if let Ok(mut display) = DISPLAY.lock() {
        if let Some(ref mut display) = *display {
            display.log(level, s);
            return;
        }
    }
    eprintln!("{}{}", level.prefix(), s);
}

/// Prints an input prompt on its own line.
pub fn prompt(s: &str) {
    if let Ok(mut display) = DISPLAY.lock() {
        if let Some(ref mut display) = *display {
            display.break_status();
        }
    }
    print!("{}", s);
    let _ = std::io::stdout().flush();
}

/// The presentation side of an order: renders errors and readings on the terminal.
#[derive(Default)]
pub struct TerminalObserver;

impl OrderObserver for TerminalObserver {
    fn on_weight_update(&self, text: &str) {
        display_status(DispenserStatus::Weight(text.to_owned()));
    }

    fn on_auth_failure(&self) {
        log(
            LogLevel::Error,
            "Authentication failed: only authorized use of the dispenser is allowed. Please authenticate again.",
        );
    }

    fn on_validation_error(&self, message: &str) {
        log(LogLevel::Error, &format!("Invalid weight: {}", message));
    }

    fn on_connection_state(&self, state: &LinkState) {
        display_status(DispenserStatus::Link(state.clone()));
    }

    fn on_order_sent(&self, order: &OrderRequest) {
        display_status(DispenserStatus::Ordered(order.quantity()));
    }
}

trait StatusDisplay: Send + Sync {
    fn display(&mut self, status: DispenserStatus);
    fn log(&mut self, level: LogLevel, s: &str);
    /// Ends an in-progress status line, if there is one.
    fn break_status(&mut self) {}
}

/// What the status line currently shows.
#[derive(Default)]
struct StatusLine {
    link: Option<LinkState>,
    target: Option<u8>,
    weight: Option<String>,
}

impl StatusLine {
    fn update(&mut self, status: DispenserStatus) {
        match status {
            DispenserStatus::Link(state) => self.link = Some(state),
            DispenserStatus::Ordered(target) => {
                self.target = Some(target);
                self.weight = None;
            }
            DispenserStatus::Weight(weight) => self.weight = Some(weight),
        }
    }

    fn link_text(&self) -> String {
        self.link
            .as_ref()
            .map(|s| s.to_string())
            .unwrap_or_else(|| "Starting...".to_owned())
    }

    fn weight_text(&self) -> Option<String> {
        self.weight.as_ref().map(|w| format!("{} g", w))
    }

    /// Progress towards the ordered quantity, if both the target and a numeric reading are known.
    fn percent(&self) -> Option<usize> {
        let target = self.target? as f32;
        let weight: f32 = self.weight.as_ref()?.trim().parse().ok()?;
        if target <= 0.0 {
            return None;
        }
        Some(((weight / target) * 100.0).clamp(0.0, 100.0) as usize)
    }
}

/// [`StatusDisplay`] for basic terminals, or non-TTY stdio.
#[derive(Default)]
struct NoTtyStatusDisplay {}

impl StatusDisplay for NoTtyStatusDisplay {
    fn display(&mut self, status: DispenserStatus) {
        match status {
            DispenserStatus::Link(state) => println!("{}", state),
            DispenserStatus::Ordered(target) => println!("Dispensing {} g", target),
            DispenserStatus::Weight(weight) => println!("Weight: {} g", weight),
        }
    }

    fn log(&mut self, level: LogLevel, s: &str) {
        if level == LogLevel::Info {
            println!("{}", s);
        } else {
            eprintln!("{}{}", level.prefix(), s);
        }
    }
}

struct ColouredStatusDisplay {
    line: StatusLine,
    width: usize,
    last_was_status: bool,
}

impl ColouredStatusDisplay {
    pub fn new(width: usize) -> Self {
        Self {
            line: StatusLine::default(),
            width,
            last_was_status: false,
        }
    }
}

impl StatusDisplay for ColouredStatusDisplay {
    fn log(&mut self, level: LogLevel, s: &str) {
        self.break_status();
        match level {
            LogLevel::Info => println!("{}", s),
            LogLevel::Error => eprintln!("{}{}", level.prefix().red(), s),
            _ => eprintln!("{}{}", level.prefix().yellow(), s),
        }
    }

    fn break_status(&mut self) {
        if std::mem::take(&mut self.last_was_status) {
            println!();
        }
    }

    fn display(&mut self, status: DispenserStatus) {
        self.line.update(status);

        let link = self.line.link_text();
        let link = match self.line.link {
            Some(LinkState::Connected(..)) => format!("🔗 {}", link).green(),
            Some(LinkState::Disconnected(..)) => format!("⛔ {}", link).red(),
            _ => format!("📡 {}", link).yellow(),
        };
        let weight = self
            .line
            .weight_text()
            .map(|w| format!("⚖ {}", w))
            .unwrap_or_default();
        let bar = match self.line.percent() {
            Some(percent) => {
                let width = self.width / 3;
                let count = (width * percent) / 100;
                format!(
                    " {}{}",
                    " ".repeat(count).on_truecolor(183, 161, 129),
                    " ".repeat(width - count).on_truecolor(92, 69, 6)
                )
            }
            None => String::new(),
        };

        print!("\r\x1b[2K{}  {}{}", link, weight.bold(), bar);
        let _ = std::io::stdout().flush();
        self.last_was_status = true;
    }
}

struct BasicStatusDisplay {
    line: StatusLine,
    activity: u8,
    width: usize,
    last_was_status: bool,
}

fn make_bar(s: &str, width: usize, percent: Option<usize>) -> String {
    let mut s = s.to_owned();
    if let Some(percent) = percent {
        let percent = percent.clamp(0, 100);
        s += " [";
        let remaining = width.saturating_sub(s.len() + 1);
        let count = (remaining * percent) / 100;
        s += &"#".repeat(count);
        s += &"=".repeat(remaining - count);
        s += "]";
        s
    } else {
        // No bar, just pad w/spaces
        let pad = width.saturating_sub(s.len());
        s + &" ".repeat(pad)
    }
}

impl BasicStatusDisplay {
    pub fn new(width: usize) -> Self {
        Self {
            line: StatusLine::default(),
            activity: 0,
            width,
            last_was_status: false,
        }
    }
}

impl StatusDisplay for BasicStatusDisplay {
    fn log(&mut self, level: LogLevel, s: &str) {
        self.break_status();
        if level == LogLevel::Info {
            println!("{}", s);
        } else {
            eprintln!("{}{}", level.prefix(), s);
        }
    }

    fn break_status(&mut self) {
        if std::mem::take(&mut self.last_was_status) {
            println!();
        }
    }

    fn display(&mut self, status: DispenserStatus) {
        self.line.update(status);
        let text = match self.line.weight_text() {
            Some(weight) => format!("{} | {}", self.line.link_text(), weight),
            None => self.line.link_text(),
        };

        self.activity = (self.activity + 1) % 8;
        print!(
            "\r{} {}",
            make_bar(&text, self.width - 2, self.line.percent()),
            &"/-\\|/-\\|"[self.activity as usize..self.activity as usize + 1]
        );
        let _ = std::io::stdout().flush();
        self.last_was_status = true;
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn format_bar() {
        let none: Option<usize> = None;
        let test_cases = [
            // 123456789012345678901234567890123456789
            (
                "Description                             ",
                ("Description", none),
            ),
            (
                "Description [######====================]",
                ("Description", Some(25)),
            ),
            (
                "Description [#############=============]",
                ("Description", Some(50)),
            ),
            (
                "Description [##########################]",
                ("Description", Some(100)),
            ),
            (
                "Description [##########################]",
                ("Description", Some(250)),
            ),
        ];

        for (expected, (description, progress)) in test_cases.into_iter() {
            assert_eq!(expected, make_bar(description, 40, progress));
        }
    }

    #[test]
    fn narrow_bar_does_not_underflow() {
        assert_eq!("A long description []", make_bar("A long description", 5, Some(50)));
        assert_eq!("A long description", make_bar("A long description", 5, None));
    }

    #[test]
    fn status_line_progress() {
        let mut line = StatusLine::default();
        line.update(DispenserStatus::Weight("40".to_owned()));
        assert_eq!(None, line.percent());
        line.update(DispenserStatus::Ordered(80));
        assert_eq!(None, line.weight_text());
        line.update(DispenserStatus::Weight("40".to_owned()));
        assert_eq!(Some(50), line.percent());
        assert_eq!(Some("40 g".to_owned()), line.weight_text());
        line.update(DispenserStatus::Weight("4\u{fffd}".to_owned()));
        assert_eq!(None, line.percent());
        line.update(DispenserStatus::Weight("95".to_owned()));
        assert_eq!(Some(100), line.percent());
    }

    #[test]
    fn format_rich() {
        let mut display = ColouredStatusDisplay::new(60);
        display.display(DispenserStatus::Link(LinkState::Scanning));
        display.display(DispenserStatus::Ordered(150));
        for i in 0..=150 {
            display.display(DispenserStatus::Weight(i.to_string()));
        }
        display.log(LogLevel::Warning, "done");
    }
}
