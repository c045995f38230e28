use crate::lang::span::SourceRange;

/// An exception raised while a Step executes.
///
/// `exception` is the class name the program sees (`ArithmeticException`,
/// `NullPointerException`, ...), `call_stack` is filled innermost-first as the
/// error unwinds through frames.
#[derive(Debug, Clone, PartialEq)]
pub struct RuntimeError {
    pub exception: String,
    pub message: String,
    pub range: Option<SourceRange>,
    pub call_stack: Vec<String>,
}

impl std::fmt::Display for RuntimeError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.exception, self.message)?;

        if let Some(range) = &self.range {
            write!(f, " (at {})", range)?;
        }

        if !self.call_stack.is_empty() {
            write!(f, "\n  call stack:")?;

            for (i, frame) in self.call_stack.iter().enumerate() {
                write!(f, "\n    {}: {}", i, frame)?;
            }
        }
        Ok(())
    }
}

impl std::error::Error for RuntimeError {}

impl RuntimeError {
    pub fn new(exception: &str, msg: &str) -> Self {
        RuntimeError {
            exception: exception.to_string(),
            message: msg.to_string(),
            range: None,
            call_stack: Vec::new(),
        }
    }

    pub fn with_context(mut self, context: &str) -> Self {
        self.call_stack.push(context.to_string());
        self
    }

    pub fn with_range(mut self, range: Option<SourceRange>) -> Self {
        if self.range.is_none() {
            self.range = range;
        }
        self
    }

    /// The text a catch block receives.
    pub fn describe(&self) -> String {
        format!("{}: {}", self.exception, self.message)
    }
}

// Constructors for the exceptions the runtime raises itself.

pub fn division_by_zero() -> RuntimeError {
    RuntimeError::new("ArithmeticException", "/ by zero")
}

pub fn null_pointer(what: &str) -> RuntimeError {
    RuntimeError::new(
        "NullPointerException",
        &format!("cannot use null as {}", what),
    )
}

pub fn type_error(operation: &str, got: &str) -> RuntimeError {
    RuntimeError::new(
        "ClassCastException",
        &format!("operator {} cannot be applied to {}", operation, got),
    )
}

pub fn stack_underflow() -> RuntimeError {
    RuntimeError::new("StackUnderflow", "operand stack is empty")
}

pub fn unknown_method(name: &str) -> RuntimeError {
    RuntimeError::new("UnknownMethod", &format!("no program registered as '{}'", name))
}

pub fn unknown_native(name: &str) -> RuntimeError {
    RuntimeError::new("UnknownNative", &format!("no native function '{}'", name))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_display_with_call_stack() {
        let err = division_by_zero()
            .with_range(Some(SourceRange::line(4, 9, 14)))
            .with_context("Main.divide")
            .with_context("Main.main");

        let text = err.to_string();
        assert!(text.starts_with("ArithmeticException: / by zero (at 4:9-4:14)"));
        assert!(text.contains("0: Main.divide"));
        assert!(text.contains("1: Main.main"));
    }

    #[test]
    fn test_with_range_keeps_innermost() {
        let err = stack_underflow()
            .with_range(Some(SourceRange::line(1, 1, 2)))
            .with_range(Some(SourceRange::line(9, 1, 2)));
        assert_eq!(err.range, Some(SourceRange::line(1, 1, 2)));
    }
}
