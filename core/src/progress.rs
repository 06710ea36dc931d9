use std::fmt;
use std::io::{self, IsTerminal, Write};

const BAR_WIDTH: usize = 50;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    Verify,
    Download,
    Build,
}

impl Phase {
    pub fn as_str(&self) -> &'static str {
        match self {
            Phase::Verify => "Verify",
            Phase::Download => "Download",
            Phase::Build => "Build",
        }
    }

    /// Padded so the three bars line up column-wise.
    fn padded(&self) -> &'static str {
        match self {
            Phase::Verify => "Verify  ",
            Phase::Download => "Download",
            Phase::Build => "Build   ",
        }
    }
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Single-writer progress sink. Workers never touch it directly; completion
/// events are funneled to the invoking thread, which ticks the active phase.
/// Percentages are clamped monotonic non-decreasing and reset per phase.
pub struct ProgressReporter {
    sink: Box<dyn Write + Send>,
    interactive: bool,
    phase: Option<Phase>,
    total: usize,
    done: usize,
    percent: u64,
}

impl ProgressReporter {
    pub fn stdout() -> Self {
        let interactive = io::stdout().is_terminal();
        Self::with_sink(Box::new(io::stdout()), interactive)
    }

    pub fn with_sink(sink: Box<dyn Write + Send>, interactive: bool) -> Self {
        Self {
            sink,
            interactive,
            phase: None,
            total: 0,
            done: 0,
            percent: 0,
        }
    }

    pub fn start_phase(&mut self, phase: Phase, total: usize) {
        self.phase = Some(phase);
        self.total = total;
        self.done = 0;
        self.percent = 0;
        if self.interactive {
            self.render();
        }
    }

    /// Records one completed unit of the active phase.
    pub fn tick(&mut self) {
        self.done = (self.done + 1).min(self.total.max(1));
        let percent = self.current_percent();
        if percent > self.percent {
            self.percent = percent;
            self.render();
        }
    }

    /// Drives the active phase to 100% and terminates its line.
    pub fn finish_phase(&mut self) {
        if self.phase.is_none() {
            return;
        }
        self.done = self.total;
        if self.percent < 100 {
            self.percent = 100;
            self.render();
        }
        if self.interactive {
            let _ = writeln!(self.sink);
            let _ = self.sink.flush();
        }
        self.phase = None;
    }

    fn current_percent(&self) -> u64 {
        if self.total == 0 {
            100
        } else {
            (self.done as u64 * 100) / self.total as u64
        }
    }

    fn render(&mut self) {
        let Some(phase) = self.phase else {
            return;
        };
        if self.interactive {
            let cells = (self.percent / 2) as usize;
            let bar = "#".repeat(cells.min(BAR_WIDTH));
            let _ = write!(
                self.sink,
                "\r{}: [{:<width$}] {}%",
                phase.padded(),
                bar,
                self.percent,
                width = BAR_WIDTH
            );
        } else {
            let _ = writeln!(self.sink, "{}: {}%", phase.as_str(), self.percent);
        }
        let _ = self.sink.flush();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::{Arc, Mutex};

    #[derive(Clone, Default)]
    struct SharedSink(Arc<Mutex<Vec<u8>>>);

    impl Write for SharedSink {
        fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
            self.0.lock().unwrap().extend_from_slice(buf);
            Ok(buf.len())
        }

        fn flush(&mut self) -> io::Result<()> {
            Ok(())
        }
    }

    fn percents(raw: &str, label: &str) -> Vec<u64> {
        raw.lines()
            .filter_map(|line| line.strip_prefix(&format!("{label}: ")))
            .filter_map(|rest| rest.strip_suffix('%'))
            .filter_map(|digits| digits.parse().ok())
            .collect()
    }

    #[test]
    fn percentages_are_monotonic_and_reach_100() {
        let sink = SharedSink::default();
        let mut reporter = ProgressReporter::with_sink(Box::new(sink.clone()), false);
        reporter.start_phase(Phase::Download, 7);
        for _ in 0..7 {
            reporter.tick();
        }
        reporter.finish_phase();

        let raw = String::from_utf8(sink.0.lock().unwrap().clone()).unwrap();
        let seen = percents(&raw, "Download");
        assert!(!seen.is_empty());
        assert!(seen.windows(2).all(|pair| pair[0] <= pair[1]));
        assert_eq!(*seen.last().unwrap(), 100);
    }

    #[test]
    fn phases_reset_between_runs() {
        let sink = SharedSink::default();
        let mut reporter = ProgressReporter::with_sink(Box::new(sink.clone()), false);
        reporter.start_phase(Phase::Verify, 2);
        reporter.tick();
        reporter.tick();
        reporter.finish_phase();
        reporter.start_phase(Phase::Build, 4);
        reporter.tick();
        reporter.finish_phase();

        let raw = String::from_utf8(sink.0.lock().unwrap().clone()).unwrap();
        assert_eq!(*percents(&raw, "Verify").last().unwrap(), 100);
        assert_eq!(percents(&raw, "Build").first().copied(), Some(25));
        assert_eq!(*percents(&raw, "Build").last().unwrap(), 100);
    }

    #[test]
    fn empty_phase_completes_immediately() {
        let sink = SharedSink::default();
        let mut reporter = ProgressReporter::with_sink(Box::new(sink.clone()), false);
        reporter.start_phase(Phase::Build, 0);
        reporter.finish_phase();
        let raw = String::from_utf8(sink.0.lock().unwrap().clone()).unwrap();
        assert_eq!(*percents(&raw, "Build").last().unwrap(), 100);
    }

    #[test]
    fn interactive_bar_is_fifty_cells() {
        let sink = SharedSink::default();
        let mut reporter = ProgressReporter::with_sink(Box::new(sink.clone()), true);
        reporter.start_phase(Phase::Download, 1);
        reporter.tick();
        reporter.finish_phase();
        let raw = String::from_utf8(sink.0.lock().unwrap().clone()).unwrap();
        assert!(raw.contains(&format!("[{}] 100%", "#".repeat(50))));
    }
}
