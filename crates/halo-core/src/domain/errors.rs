use std::error::Error;
use std::fmt::{Display, Formatter};
use std::path::Path;

pub type HaloResult<T> = Result<T, HaloError>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum HaloErrorCategory {
    Configuration,
    OutOfRange,
    IoConflict,
    IoSystem,
    Format,
    Computation,
    Internal,
}

impl HaloErrorCategory {
    pub const fn exit_code(self) -> i32 {
        match self {
            Self::Configuration => 2,
            Self::OutOfRange => 3,
            Self::IoConflict => 4,
            Self::IoSystem => 5,
            Self::Format => 6,
            Self::Computation => 7,
            Self::Internal => 8,
        }
    }

    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Configuration => "ConfigurationError",
            Self::OutOfRange => "OutOfRangeError",
            Self::IoConflict => "IoConflictError",
            Self::IoSystem => "IoSystemError",
            Self::Format => "FormatError",
            Self::Computation => "ComputationError",
            Self::Internal => "InternalError",
        }
    }
}

impl Display for HaloErrorCategory {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str((*self).as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HaloError {
    category: HaloErrorCategory,
    placeholder: &'static str,
    message: String,
}

impl HaloError {
    pub fn new(
        category: HaloErrorCategory,
        placeholder: &'static str,
        message: impl Into<String>,
    ) -> Self {
        Self {
            category,
            placeholder,
            message: message.into(),
        }
    }

    pub fn configuration(placeholder: &'static str, message: impl Into<String>) -> Self {
        Self::new(HaloErrorCategory::Configuration, placeholder, message)
    }

    pub fn out_of_range(placeholder: &'static str, message: impl Into<String>) -> Self {
        Self::new(HaloErrorCategory::OutOfRange, placeholder, message)
    }

    pub fn io_conflict(placeholder: &'static str, message: impl Into<String>) -> Self {
        Self::new(HaloErrorCategory::IoConflict, placeholder, message)
    }

    pub fn io_system(placeholder: &'static str, message: impl Into<String>) -> Self {
        Self::new(HaloErrorCategory::IoSystem, placeholder, message)
    }

    pub fn format(placeholder: &'static str, message: impl Into<String>) -> Self {
        Self::new(HaloErrorCategory::Format, placeholder, message)
    }

    pub fn computation(placeholder: &'static str, message: impl Into<String>) -> Self {
        Self::new(HaloErrorCategory::Computation, placeholder, message)
    }

    pub fn internal(placeholder: &'static str, message: impl Into<String>) -> Self {
        Self::new(HaloErrorCategory::Internal, placeholder, message)
    }

    /// Wraps an I/O failure on `path` with the operation that was attempted.
    pub fn io_at(
        placeholder: &'static str,
        action: &str,
        path: &Path,
        source: std::io::Error,
    ) -> Self {
        Self::io_system(
            placeholder,
            format!("failed to {} '{}': {}", action, path.display(), source),
        )
    }

    pub const fn category(&self) -> HaloErrorCategory {
        self.category
    }

    pub const fn placeholder(&self) -> &'static str {
        self.placeholder
    }

    pub fn message(&self) -> &str {
        &self.message
    }

    pub const fn exit_code(&self) -> i32 {
        self.category.exit_code()
    }

    pub fn diagnostic_line(&self) -> String {
        format!("ERROR: [{}] {}", self.placeholder, self.message)
    }
}

impl Display for HaloError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{} [{}] {}",
            self.category.as_str(),
            self.placeholder,
            self.message
        )
    }
}

impl Error for HaloError {}
