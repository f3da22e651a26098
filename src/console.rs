use crate::prelude::*;

use tokio::sync::{mpsc, Mutex};

/// Line-oriented access to the operator's terminal. Clones share one input queue, so the order prompt and the
/// passcode prompt never race for the same line.
#[derive(Clone)]
pub struct Console {
    lines: Arc<Mutex<mpsc::Receiver<String>>>,
}

impl Console {
    /// Reads lines from stdin on a background thread.
    pub fn stdin() -> Self {
        let (tx, rx) = mpsc::channel(1);
        std::thread::spawn(move || {
            for line in std::io::stdin().lines() {
                let Ok(line) = line else {
                    break;
                };
                if tx.blocking_send(line).is_err() {
                    break;
                }
            }
        });
        Console {
            lines: Arc::new(Mutex::new(rx)),
        }
    }

    /// A console that replays the given lines, then reports end-of-input.
    pub fn from_lines<I: IntoIterator<Item = String>>(lines: I) -> Self {
        let lines: Vec<String> = lines.into_iter().collect();
        let (tx, rx) = mpsc::channel(lines.len().max(1));
        for line in lines {
            let _ = tx.try_send(line);
        }
        Console {
            lines: Arc::new(Mutex::new(rx)),
        }
    }

    /// Shows the prompt and waits for the next line. Returns `None` at end-of-input.
    pub async fn read_line(&self, prompt: &str) -> Option<String> {
        let mut lines = self.lines.lock().await;
        if !prompt.is_empty() {
            crate::display::prompt(prompt);
        }
        lines.recv().await
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[tokio::test]
    async fn replays_lines() {
        let console = Console::from_lines(["a".to_owned(), "b".to_owned()]);
        let other = console.clone();
        assert_eq!(Some("a".to_owned()), console.read_line("").await);
        assert_eq!(Some("b".to_owned()), other.read_line("").await);
        assert_eq!(None, console.read_line("").await);
    }
}
