// Released under MIT License.
// Copyright (c) 2023-2025 Ladislav Bartos

//! Implementation of ProgressPrinter structure for printing the progress of trajectory reading.

use colored::{ColoredString, Colorize};
use std::io::Write;

/// Progress of trajectory reading.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ProgressStatus {
    /// Trajectory reading is in progress.
    Running,
    /// Trajectory has been read completely.
    Completed,
    /// Trajectory reading failed.
    Failed,
}

/// String that can be used inside `ProgressPrinter`.
#[derive(Debug, Clone, PartialEq)]
struct ProgressMessage {
    msg: ColoredString,
}

impl ProgressMessage {
    /// Create new `ProgressMessage`.
    ///
    /// ## Panics
    /// Panics if the string is longer than 9 characters.
    fn new(string: ColoredString) -> Self {
        if string.chars().count() > 9 {
            panic!("FATAL TRAJSTREAM ERROR | ProgressMessage::new | `ProgressMessage` can not be longer than 9 characters.");
        }

        ProgressMessage { msg: string }
    }

    /// Format the `ProgressMessage`.
    fn format(&self, colored: bool) -> String {
        if colored {
            format!("[{: ^9}]   ", self.msg)
        } else {
            format!("[{: ^9}]   ", self.msg.as_ref() as &str)
        }
    }
}

/// Structure handling printing of progress of reading a trajectory file.
/// Constructed using `ProgressPrinter::new()` and associated with a frame iterator
/// using `FrameIterator::print_progress()`.
///
/// Progress output is best-effort: failures to write into the output stream are ignored
/// and never interrupt the reading of the trajectory.
pub struct ProgressPrinter {
    /// Stream to write the progress info to.
    output: Box<dyn Write>,
    /// Current status of reading. Default: ProgressStatus::Running.
    status: ProgressStatus,
    /// Frequency of printing. Print every `print_freq`th frame. Default: 100 frames.
    print_freq: usize,
    /// If true, the output will be colored. Default: true.
    colored: bool,
    /// String to be printed with the index of the frame. Default: "Frame".blue().
    frame_msg: ColoredString,
    /// String to be printed with the current simulation step. Default: "Step".cyan().
    step_msg: ColoredString,
    /// String to be printed with the current simulation time. Default: "Time".bright_purple().
    time_msg: ColoredString,
    /// String to be printed when the trajectory reading is in progress. Default: "RUNNING".yellow().
    running_msg: ProgressMessage,
    /// String to be printed when the trajectory reading is completed. Default: "COMPLETED".green().
    completed_msg: ProgressMessage,
    /// String to be printed when the trajectory reading failed. Default: "FAILED!".red().
    failed_msg: ProgressMessage,
    /// String terminating the progress message. Default: `\r` (carriage return).
    terminating: String,
}

impl ProgressPrinter {
    /// Create an instance of `ProgressPrinter` with default parameters.
    ///
    /// The default values of the `ProgressPrinter` parameters.
    /// - `output`: `std::io::stdout()` (stream to write the progress info to)
    /// - `status`: `ProgressStatus::Running` (current status of trajectory file reading)
    /// - `print_freq`: `100` (progress info will be printed out every 100 trajectory frames read)
    /// - `colored`: `true` (should the output be colored?)
    /// - `frame_msg`: `"Frame".blue()` (string associated with the index of the frame)
    /// - `step_msg`: `"Step".cyan()` (string associated with the simulation step of the frame)
    /// - `time_msg`: `"Time".bright_purple()` (string associated with the time of the frame)
    /// - `running_msg`: `"RUNNING".yellow()` (string printed when the trajectory reading is running)
    /// - `completed_msg`: `"COMPLETED".green()` (string printed when the trajectory reading is completed)
    /// - `failed_msg`: `"FAILED!".red()` (string printed when the trajectory reading failed)
    /// - `terminating`: `\r` (string terminating the progress message; useful to set to `\n` when printing to a file)
    ///
    /// ## Example
    /// ```no_run
    /// use trajstream::prelude::*;
    /// use colored::Colorize;
    ///
    /// // print info every 200th trajectory frame read
    /// let printer = ProgressPrinter::new()
    ///     .with_print_freq(200)
    ///     .with_running_msg("ANALYZING".yellow())
    ///     .with_completed_msg("DONE".blue());
    ///
    /// let mut traj = XtcReader::open("trajectory.xtc").unwrap();
    /// for frame in traj.frames().print_progress(printer) {
    ///     let frame = frame.unwrap();
    ///     // analyze the frame
    /// }
    /// ```
    ///
    /// Printing into a file.
    /// ```no_run
    /// use trajstream::prelude::*;
    ///
    /// let file = std::fs::File::create("progress.log").unwrap();
    /// let printer = ProgressPrinter::new()
    ///     .with_output(Box::from(file))
    ///     .with_colored(false)
    ///     .with_terminating("\n");
    /// ```
    pub fn new() -> Self {
        ProgressPrinter {
            output: Box::from(std::io::stdout()),
            status: ProgressStatus::Running,
            print_freq: 100,
            colored: true,
            frame_msg: "Frame".blue(),
            step_msg: "Step".cyan(),
            time_msg: "Time".bright_purple(),
            running_msg: ProgressMessage::new("RUNNING".yellow()),
            completed_msg: ProgressMessage::new("COMPLETED".green()),
            failed_msg: ProgressMessage::new("FAILED!".red()),
            terminating: String::from("\r"),
        }
    }

    /// Create new `ProgressPrinter` with specific `output` stream.
    pub fn with_output(mut self, stream: Box<dyn Write>) -> Self {
        self.output = stream;
        self
    }

    /// Create new `ProgressPrinter` with specific value for `status`.
    pub fn with_status(mut self, status: ProgressStatus) -> Self {
        self.status = status;
        self
    }

    /// Set new status to an already constructed `ProgressPrinter`.
    pub fn set_status(&mut self, status: ProgressStatus) {
        self.status = status;
    }

    /// Create new `ProgressPrinter` with specific value for `print_freq`.
    /// Frequency of 0 is treated as 1.
    pub fn with_print_freq(mut self, print_freq: usize) -> Self {
        self.print_freq = print_freq.max(1);
        self
    }

    /// Create new `ProgressPrinter` with specific value for `colored`.
    pub fn with_colored(mut self, colored: bool) -> Self {
        self.colored = colored;
        self
    }

    /// Create new `ProgressPrinter` with specific value for `frame_msg`.
    pub fn with_frame_msg(mut self, frame_msg: ColoredString) -> Self {
        self.frame_msg = frame_msg;
        self
    }

    /// Create new `ProgressPrinter` with specific value for `step_msg`.
    pub fn with_step_msg(mut self, step_msg: ColoredString) -> Self {
        self.step_msg = step_msg;
        self
    }

    /// Create new `ProgressPrinter` with specific value for `time_msg`.
    pub fn with_time_msg(mut self, time_msg: ColoredString) -> Self {
        self.time_msg = time_msg;
        self
    }

    /// Create new `ProgressPrinter` with specific value for `running_msg`.
    ///
    /// ## Panics
    /// Panics if the `running_msg` is longer than 9 characters.
    pub fn with_running_msg(mut self, running_msg: ColoredString) -> Self {
        self.running_msg = ProgressMessage::new(running_msg);
        self
    }

    /// Create new `ProgressPrinter` with specific value for `completed_msg`.
    ///
    /// ## Panics
    /// Panics if the `completed_msg` is longer than 9 characters.
    pub fn with_completed_msg(mut self, completed_msg: ColoredString) -> Self {
        self.completed_msg = ProgressMessage::new(completed_msg);
        self
    }

    /// Create new `ProgressPrinter` with specific value for `failed_msg`.
    ///
    /// ## Panics
    /// Panics if the `failed_msg` is longer than 9 characters.
    pub fn with_failed_msg(mut self, failed_msg: ColoredString) -> Self {
        self.failed_msg = ProgressMessage::new(failed_msg);
        self
    }

    /// Create new `ProgressPrinter` with specific value for `terminating`.
    pub fn with_terminating(mut self, string: &str) -> Self {
        self.terminating = string.to_string();
        self
    }

    /// Print progress info about trajectory reading.
    /// While running, only every `print_freq`th frame is printed.
    pub fn print(&mut self, frame_number: usize, sim_step: i64, sim_time: f32) {
        if self.status == ProgressStatus::Running && frame_number % self.print_freq != 0 {
            return;
        }

        let status = match self.status {
            ProgressStatus::Running => self.running_msg.format(self.colored),
            ProgressStatus::Completed => self.completed_msg.format(self.colored),
            ProgressStatus::Failed => self.failed_msg.format(self.colored),
        };

        let (frame_msg, step_msg, time_msg) = if self.colored {
            (
                self.frame_msg.to_string(),
                self.step_msg.to_string(),
                self.time_msg.to_string(),
            )
        } else {
            (
                (self.frame_msg.as_ref() as &str).to_owned(),
                (self.step_msg.as_ref() as &str).to_owned(),
                (self.time_msg.as_ref() as &str).to_owned(),
            )
        };

        let end = match self.status {
            ProgressStatus::Running => "",
            ProgressStatus::Completed | ProgressStatus::Failed => "\n",
        };

        let _ = write!(
            self.output,
            "{}{} {:8} | {} {:12} | {} {:12.3} ps{}{}",
            status, frame_msg, frame_number, step_msg, sim_step, time_msg, sim_time, self.terminating, end
        );
        let _ = self.output.flush();
    }
}

impl Default for ProgressPrinter {
    fn default() -> Self {
        Self::new()
    }
}

/******************************/
/*         UNIT TESTS         */
/******************************/

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::NamedTempFile;

    #[test]
    fn new() {
        let printer = ProgressPrinter::new();

        assert_eq!(printer.status, ProgressStatus::Running);
        assert_eq!(printer.print_freq, 100);
        assert!(printer.colored);
        assert_eq!(printer.frame_msg, "Frame".blue());
        assert_eq!(printer.step_msg, "Step".cyan());
        assert_eq!(printer.time_msg, "Time".bright_purple());
        assert_eq!(
            printer.running_msg,
            ProgressMessage::new("RUNNING".yellow())
        );
        assert_eq!(
            printer.completed_msg,
            ProgressMessage::new("COMPLETED".green())
        );
        assert_eq!(printer.failed_msg, ProgressMessage::new("FAILED!".red()));
        assert_eq!(printer.terminating, "\r");
    }

    #[test]
    fn set_status() {
        let mut printer = ProgressPrinter::default();

        printer.set_status(ProgressStatus::Failed);
        assert_eq!(printer.status, ProgressStatus::Failed);

        printer.set_status(ProgressStatus::Completed);
        assert_eq!(printer.status, ProgressStatus::Completed);

        printer.set_status(ProgressStatus::Running);
        assert_eq!(printer.status, ProgressStatus::Running);
    }

    #[test]
    fn new_complex() {
        let printer = ProgressPrinter::new()
            .with_output(Box::from(std::io::sink()))
            .with_status(ProgressStatus::Completed)
            .with_print_freq(0)
            .with_colored(false)
            .with_frame_msg("FRAME".into())
            .with_step_msg("STEP".into())
            .with_time_msg("time".yellow())
            .with_running_msg("ANALYZING".red())
            .with_completed_msg("DONE".green())
            .with_failed_msg("FAILURE".on_bright_red());

        assert_eq!(printer.status, ProgressStatus::Completed);
        assert_eq!(printer.print_freq, 1);
        assert!(!printer.colored);
        assert_eq!(printer.frame_msg, "FRAME".into());
        assert_eq!(printer.step_msg, "STEP".into());
        assert_eq!(printer.time_msg, "time".yellow());
        assert_eq!(printer.running_msg, ProgressMessage::new("ANALYZING".red()));
        assert_eq!(printer.completed_msg, ProgressMessage::new("DONE".green()));
        assert_eq!(
            printer.failed_msg,
            ProgressMessage::new("FAILURE".on_bright_red())
        );
    }

    #[test]
    #[should_panic(
        expected = "FATAL TRAJSTREAM ERROR | ProgressMessage::new | `ProgressMessage` can not be longer than 9 characters."
    )]
    fn progress_message_panic() {
        let _msg = ProgressMessage::new("SHOULD_PANIC".red());
    }

    #[test]
    fn print() {
        let output = NamedTempFile::new().unwrap();
        let path_to_output = output.path().to_owned();

        let mut printer = ProgressPrinter::new()
            .with_output(Box::from(output.reopen().unwrap()))
            .with_colored(false)
            .with_print_freq(2)
            .with_terminating("\n");

        printer.print(0, 0, 0.0);
        printer.print(1, 10, 0.5);
        printer.print(2, 20, 1.0);
        printer.print(3, 30, 1.5);
        printer.set_status(ProgressStatus::Completed);
        printer.print(3, 30, 1.5);
        printer.set_status(ProgressStatus::Failed);
        printer.print(7, -70, -3.5);

        let result = std::fs::read_to_string(path_to_output).unwrap();
        let expected = "\
[ RUNNING ]   Frame        0 | Step            0 | Time        0.000 ps
[ RUNNING ]   Frame        2 | Step           20 | Time        1.000 ps
[COMPLETED]   Frame        3 | Step           30 | Time        1.500 ps

[ FAILED! ]   Frame        7 | Step          -70 | Time       -3.500 ps

";
        assert_eq!(result, expected);
    }

    #[test]
    fn print_with_carriage_return() {
        let output = NamedTempFile::new().unwrap();
        let path_to_output = output.path().to_owned();

        let mut printer = ProgressPrinter::new()
            .with_output(Box::from(output.reopen().unwrap()))
            .with_colored(false);

        printer.print(0, 0, 0.0);
        printer.print(50, 500, 5.0);
        printer.print(100, 1000, 10.0);
        printer.set_status(ProgressStatus::Completed);
        printer.print(150, 1500, 15.0);

        let result = std::fs::read_to_string(path_to_output).unwrap();
        let expected = "[ RUNNING ]   Frame        0 | Step            0 | Time        0.000 ps\r\
[ RUNNING ]   Frame      100 | Step         1000 | Time       10.000 ps\r\
[COMPLETED]   Frame      150 | Step         1500 | Time       15.000 ps\r\n";
        assert_eq!(result, expected);
    }
}
