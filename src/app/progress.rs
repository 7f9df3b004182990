use std::io::{self, Write};

use crossterm::{cursor, execute, terminal, tty::IsTty};

use crate::sweep::driver::SweepProgress;

/// Single status line redrawn in place while the sweep runs.
pub struct ProgressLine {
    enabled: bool,
    drawn: bool,
}

impl ProgressLine {
    pub fn new() -> Self {
        ProgressLine {
            enabled: io::stdout().is_tty(),
            drawn: false,
        }
    }

    pub fn update(&mut self, progress: &SweepProgress) {
        if !self.enabled {
            return;
        }
        let mut stdout = io::stdout();
        if clear_line(&mut stdout).is_err() {
            self.enabled = false;
            return;
        }
        print!("{}", render(progress));
        let _ = stdout.flush();
        self.drawn = true;
    }

    pub fn finish(&mut self) {
        if self.drawn {
            println!();
            self.drawn = false;
        }
    }
}

impl Default for ProgressLine {
    fn default() -> Self {
        Self::new()
    }
}

pub fn render(progress: &SweepProgress) -> String {
    format!(
        "[{}/{}] locales in use {}/{}",
        progress.submitted, progress.total, progress.used_capacity, progress.ceiling
    )
}

fn clear_line(stdout: &mut io::Stdout) -> io::Result<()> {
    execute!(
        stdout,
        cursor::MoveToColumn(0),
        terminal::Clear(terminal::ClearType::CurrentLine)
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn render_shows_submissions_and_capacity() {
        let progress = SweepProgress {
            submitted: 3,
            total: 108,
            used_capacity: 28,
            ceiling: 32,
        };
        assert_eq!(render(&progress), "[3/108] locales in use 28/32");
    }
}
