use crate::error::{Result, SamplerError};

/// Placeholder replaced by the current process id when a template is rendered.
pub const PID_PLACEHOLDER: &str = "{pid}";

/// An external command and the shape of its output.
///
/// The reading lives on line `line` (zero-based) of stdout, in
/// whitespace-delimited column `field`, and is divided by `divisor` to get
/// the recorded unit.
#[derive(Debug, Clone, PartialEq)]
pub struct CommandTemplate {
    pub command: String,
    pub line: usize,
    pub field: usize,
    pub divisor: f64,
    pub unit: String,
}

impl CommandTemplate {
    /// A template reading the first field of the second line, unscaled.
    pub fn new(command: impl Into<String>) -> Self {
        Self {
            command: command.into(),
            line: 1,
            field: 0,
            divisor: 1.0,
            unit: String::new(),
        }
    }

    pub fn with_line(mut self, line: usize) -> Self {
        self.line = line;
        self
    }

    pub fn with_field(mut self, field: usize) -> Self {
        self.field = field;
        self
    }

    pub fn with_divisor(mut self, divisor: f64) -> Self {
        self.divisor = divisor;
        self
    }

    pub fn with_unit(mut self, unit: impl Into<String>) -> Self {
        self.unit = unit.into();
        self
    }

    pub fn validate(&self) -> Result<()> {
        if self.command.trim().is_empty() {
            return Err(SamplerError::InvalidTemplate("command is empty".to_string()));
        }
        if !self.divisor.is_finite() || self.divisor <= 0.0 {
            return Err(SamplerError::InvalidTemplate(format!(
                "divisor must be a positive number, got {}",
                self.divisor
            )));
        }
        Ok(())
    }

    pub fn render(&self, pid: u32) -> String {
        self.command.replace(PID_PLACEHOLDER, &pid.to_string())
    }

    /// Extracts the reading from command output.
    ///
    /// A missing line or column, or a token that is not a number, reads as
    /// `0.0`.
    ///
    /// # Examples
    ///
    /// ```
    /// use apmon_collector::template::CommandTemplate;
    ///
    /// let template = CommandTemplate::new("ps -o rsz {pid}").with_divisor(1024.0);
    /// assert_eq!(template.parse_reading("RSZ\n 2048\n"), 2.0);
    /// assert_eq!(template.parse_reading("RSZ\n"), 0.0);
    /// assert_eq!(template.parse_reading("RSZ\n n/a\n"), 0.0);
    /// ```
    pub fn parse_reading(&self, output: &str) -> f64 {
        output
            .lines()
            .nth(self.line)
            .and_then(|line| line.split_whitespace().nth(self.field))
            .and_then(|token| token.parse::<f64>().ok())
            .map_or(0.0, |value| value / self.divisor)
    }
}
